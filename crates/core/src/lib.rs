//! loxi-core: the shared data model for the loxi bytecode VM.
//!
//! Key design principles:
//! - `Value`: what the language talks about (numbers, booleans, nil, objects).
//! - `Obj`: heap-allocated payloads (strings, functions, closures, upvalues,
//!   natives), reference-counted and chained onto the VM's object list.
//! - `Chunk`: a compiled unit of bytecode plus its constant pool and line table.
//! - `Table`: the open-addressed hash table used for both string interning
//!   and globals.
//!
//! # Modules
//!
//! - `value`: the tagged `Value` union and truthiness/equality rules.
//! - `object`: heap object variants and the interning-friendly `ObjString`.
//! - `chunk`: bytecode buffer, constant pool, run-length line table.
//! - `opcode`: the instruction set.
//! - `table`: open-addressed, tombstoned hash table.

pub mod chunk;
pub mod object;
pub mod opcode;
pub mod table;
pub mod value;

pub use chunk::Chunk;
pub use object::{Obj, ObjClosure, ObjFunction, ObjNative, ObjString, ObjUpvalue, UpvalueState};
pub use opcode::OpCode;
pub use table::{intern, Table};
pub use value::Value;

/// Maximum number of constants a single chunk may hold: 2^24 entries, fitting
/// the 3-byte operand of the `_LONG` constant-indexing opcodes.
pub const MAX_CONSTANTS: usize = 1 << 24;
