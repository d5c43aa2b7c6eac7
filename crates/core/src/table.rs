//! Open-addressed, linear-probed hash table with tombstones.
//!
//! Used identically for two purposes: the VM's string-interning set (key =
//! an interned string object, value unused) and the globals map (key = an
//! interned name, value = the binding). Keys are always the `String` variant
//! of [`Obj`]. Because every key that ever reaches this table has first
//! passed through [`intern`], two keys with equal bytes are always the same
//! `Rc` — so the table can use pointer identity for its "is this the same
//! key" check instead of comparing bytes.

use std::rc::Rc;

use crate::object::{fnv1a_hash, Obj, ObjString};
use crate::value::Value;

const MIN_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

enum Slot {
    Empty,
    Tombstone,
    Occupied { key: Rc<Obj>, value: Value },
}

fn as_string(key: &Obj) -> &ObjString {
    key.as_string().expect("table keys are always interned strings")
}

pub struct Table {
    entries: Vec<Slot>,
    /// Live entries *and* tombstones, so tombstones contribute to load.
    count: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Probe from `hash(key) mod capacity`: on an empty, non-tombstone slot
    /// return the first tombstone seen (if any) else that slot; on a
    /// matching key return it; otherwise keep probing.
    fn find_slot(entries: &[Slot], key_hash: u32, is_match: impl Fn(&Rc<Obj>) -> bool) -> usize {
        let capacity = entries.len();
        let mut index = key_hash as usize % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied { key, .. } if is_match(key) => return index,
                Slot::Occupied { .. } => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries: Vec<Slot> = (0..new_capacity).map(|_| Slot::Empty).collect();
        let mut new_count = 0;
        for slot in self.entries.drain(..) {
            if let Slot::Occupied { key, value } = slot {
                let hash = as_string(&key).hash;
                let idx = Self::find_slot(&new_entries, hash, |k| Rc::ptr_eq(k, &key));
                new_entries[idx] = Slot::Occupied { key, value };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    fn ensure_capacity_for_insert(&mut self) {
        let capacity = self.entries.len();
        if self.count + 1 > (capacity as f64 * MAX_LOAD) as usize {
            let new_capacity = if capacity == 0 { MIN_CAPACITY } else { capacity * 2 };
            self.grow(new_capacity);
        }
    }

    /// Insert or overwrite `key -> value`. Returns `true` iff `key` was not
    /// already present.
    pub fn set(&mut self, key: Rc<Obj>, value: Value) -> bool {
        self.ensure_capacity_for_insert();
        let hash = as_string(&key).hash;
        let idx = Self::find_slot(&self.entries, hash, |k| Rc::ptr_eq(k, &key));
        let is_new = !matches!(self.entries[idx], Slot::Occupied { .. });
        if is_new && !matches!(self.entries[idx], Slot::Tombstone) {
            self.count += 1;
        }
        self.entries[idx] = Slot::Occupied { key, value };
        is_new
    }

    #[must_use]
    pub fn get(&self, key: &Rc<Obj>) -> Option<&Value> {
        if self.entries.is_empty() {
            return None;
        }
        let hash = as_string(key).hash;
        let idx = Self::find_slot(&self.entries, hash, |k| Rc::ptr_eq(k, key));
        match &self.entries[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Install a tombstone. Returns `true` iff `key` was present.
    pub fn delete(&mut self, key: &Rc<Obj>) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let hash = as_string(key).hash;
        let idx = Self::find_slot(&self.entries, hash, |k| Rc::ptr_eq(k, key));
        if matches!(self.entries[idx], Slot::Occupied { .. }) {
            self.entries[idx] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    /// Look up an interned string by its raw bytes and precomputed hash,
    /// comparing `length && hash && bytes` rather than identity — this is
    /// the only place a new allocation's bytes are checked against what's
    /// already interned, since there is no `Rc` to compare pointers with yet.
    #[must_use]
    pub fn find_string(&self, bytes: &str, hash: u32) -> Option<Rc<Obj>> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = hash as usize % capacity;
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Occupied { key, .. } => {
                    let s = as_string(key);
                    if s.hash == hash && s.bytes == bytes {
                        return Some(Rc::clone(key));
                    }
                }
                Slot::Tombstone => {}
            }
            index = (index + 1) % capacity;
        }
    }
}

/// Convenience for callers that only need the hash, without building an
/// `ObjString` first (e.g. probing before deciding whether to intern).
#[must_use]
pub fn hash_str(s: &str) -> u32 {
    fnv1a_hash(s.as_bytes())
}

/// Intern `bytes` into `table`, returning the canonical `Obj::String`
/// handle: an existing one on a hit, a freshly allocated one (inserted into
/// `table`) on a miss. Every string reachable from the VM — constants,
/// globals keys, runtime concatenation results — is produced by this
/// function, which is what makes reference equality sufficient for string
/// equality.
#[must_use]
pub fn intern(table: &mut Table, bytes: &str) -> Rc<Obj> {
    let hash = fnv1a_hash(bytes.as_bytes());
    if let Some(existing) = table.find_string(bytes, hash) {
        return existing;
    }
    let obj = Rc::new(Obj::String(ObjString::new(bytes.to_string())));
    table.set(Rc::clone(&obj), Value::Nil);
    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Rc<Obj> {
        Rc::new(Obj::String(ObjString::new(s.to_string())))
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut t = Table::new();
        let k = key("a");
        assert!(t.set(Rc::clone(&k), Value::Number(1.0)));
        assert_eq!(t.get(&k), Some(&Value::Number(1.0)));
    }

    #[test]
    fn set_on_existing_key_overwrites_and_reports_not_new() {
        let mut t = Table::new();
        let k = key("a");
        assert!(t.set(Rc::clone(&k), Value::Number(1.0)));
        assert!(!t.set(Rc::clone(&k), Value::Number(2.0)));
        assert_eq!(t.get(&k), Some(&Value::Number(2.0)));
    }

    #[test]
    fn delete_then_get_is_absent_but_slot_is_reusable() {
        let mut t = Table::new();
        let k = key("a");
        t.set(Rc::clone(&k), Value::Number(1.0));
        assert!(t.delete(&k));
        assert_eq!(t.get(&k), None);
        // tombstone counts toward load but the key can be reinserted.
        assert!(t.set(Rc::clone(&k), Value::Number(3.0)));
        assert_eq!(t.get(&k), Some(&Value::Number(3.0)));
    }

    #[test]
    fn delete_of_absent_key_returns_false() {
        let mut t = Table::new();
        assert!(!t.delete(&key("missing")));
    }

    #[test]
    fn find_string_locates_by_bytes_not_identity() {
        let mut t = Table::new();
        let k = key("hello");
        t.set(Rc::clone(&k), Value::Nil);
        let found = t.find_string("hello", hash_str("hello")).unwrap();
        assert!(Rc::ptr_eq(&found, &k));
        assert!(t.find_string("goodbye", hash_str("goodbye")).is_none());
    }

    #[test]
    fn grows_past_load_factor_and_survives_many_inserts() {
        let mut t = Table::new();
        let keys: Vec<Rc<Obj>> = (0..1000).map(|i| key(&format!("key{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            t.set(Rc::clone(k), Value::Number(i as f64));
        }
        assert_eq!(t.len(), 1000);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.get(k), Some(&Value::Number(i as f64)));
        }
    }

    #[test]
    fn intern_deduplicates_equal_bytes() {
        let mut t = Table::new();
        let a = intern(&mut t, "hello");
        let b = intern(&mut t, "hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(t.len(), 1);
        let c = intern(&mut t, "world");
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(t.len(), 2);
    }
}
