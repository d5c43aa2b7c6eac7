//! loxi-vm: the stack-based bytecode interpreter.
//!
//! `Vm` owns the value stack, call frames, globals table, and string
//! interning table, and drives a compiled chunk to completion via
//! [`Vm::interpret`].

pub mod error;
pub mod natives;
pub mod vm;

pub use error::{InterpretResult, RuntimeError};
pub use vm::Vm;
