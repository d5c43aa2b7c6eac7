//! Heap-allocated object variants.
//!
//! Every `Obj` is reference-counted: instead of the intrusive next-pointer
//! list a non-tracing VM would thread through its heap objects for
//! eventual free-all-on-exit, an `Rc<Obj>` handle is the ownership anchor
//! here, and `Rc` already frees a payload the moment its last reference
//! drops. A heap reference stays alive exactly as long as it's reachable
//! from the stack, call frames, globals, or the strings table — which is
//! the same liveness invariant an intrusive sweep list would enforce
//! manually.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::value::Value;

/// FNV-1a, used both to hash interned strings and as the table's bucket hash.
#[must_use]
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// An interned, immutable byte string.
#[derive(Debug)]
pub struct ObjString {
    pub bytes: String,
    pub hash: u32,
}

impl ObjString {
    #[must_use]
    pub fn new(bytes: String) -> Self {
        let hash = fnv1a_hash(bytes.as_bytes());
        ObjString { bytes, hash }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.bytes
    }
}

/// A compiled function: its arity, chunk, and (for closures) how many
/// upvalue slots it needs. The top-level script is a function with
/// `name == None`.
#[derive(Debug)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    /// The interned `Obj::String` naming this function, shared with every
    /// other reference to the same identifier. `None` marks the top-level
    /// script.
    pub name: Option<Rc<Obj>>,
}

impl ObjFunction {
    #[must_use]
    pub fn new(name: Option<Rc<Obj>>) -> Self {
        ObjFunction {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name.as_string().map_or("script", ObjString::as_str),
            None => "script",
        }
    }
}

/// A reference to a runtime upvalue cell: open while it still points into a
/// live stack slot, closed once the value has been copied out.
#[derive(Debug)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct ObjUpvalue {
    pub state: RefCell<UpvalueState>,
}

impl ObjUpvalue {
    #[must_use]
    pub fn new_open(stack_slot: usize) -> Self {
        ObjUpvalue {
            state: RefCell::new(UpvalueState::Open(stack_slot)),
        }
    }
}

/// A function paired with the upvalues it closed over. `function` is always
/// the same `Rc<Obj>` (an `Obj::Function`) that lives in whichever constant
/// pool produced it — closures never copy function payloads, only refer to
/// them.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: Rc<Obj>,
    pub upvalues: Vec<Rc<ObjUpvalue>>,
}

/// A native function's call signature: receives the argument slice, returns
/// a value or a runtime error message.
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

pub struct ObjNative {
    pub name: &'static str,
    pub arity: u8,
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative").field("name", &self.name).finish()
    }
}

/// The union of all heap payload kinds.
#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Native(ObjNative),
}

impl Obj {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "closure",
            Obj::Upvalue(_) => "upvalue",
            Obj::Native(_) => "native function",
        }
    }

    #[must_use]
    pub fn as_string(&self) -> Option<&ObjString> {
        match self {
            Obj::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_closure(&self) -> Option<&ObjClosure> {
        match self {
            Obj::Closure(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&ObjFunction> {
        match self {
            Obj::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_native(&self) -> Option<&ObjNative> {
        match self {
            Obj::Native(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_upvalue(&self) -> Option<&ObjUpvalue> {
        match self {
            Obj::Upvalue(u) => Some(u),
            _ => None,
        }
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::String(s) => write!(f, "{}", s.bytes),
            Obj::Function(func) => write!(f, "<fn {}>", func.display_name()),
            Obj::Closure(c) => {
                let name = c.function.as_function().map_or("script", ObjFunction::display_name);
                write!(f, "<fn {name}>")
            }
            Obj::Upvalue(_) => write!(f, "<upvalue>"),
            Obj::Native(n) => write!(f, "<native fn {}>", n.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_vector() {
        // "" hashes to the FNV-1a offset basis.
        assert_eq!(fnv1a_hash(b""), 2_166_136_261);
    }

    #[test]
    fn same_bytes_hash_identically() {
        assert_eq!(fnv1a_hash(b"hello"), fnv1a_hash(b"hello"));
        assert_ne!(fnv1a_hash(b"hello"), fnv1a_hash(b"world"));
    }

    #[test]
    fn script_function_displays_as_script() {
        let f = ObjFunction::new(None);
        assert_eq!(f.display_name(), "script");
    }
}
