//! loxi-compiler: scanner, single-pass Pratt compiler and disassembler.
//!
//! [`compile`] turns source text into a top-level script [`ObjFunction`],
//! interning every identifier and string literal it encounters into the
//! caller-supplied [`Table`] along the way. [`disassemble`] exposes the
//! on-demand bytecode dump used for both `dump_code` and `trace_execution`.

pub mod compiler;
pub mod disassemble;
pub mod error;
pub mod scanner;

pub use compiler::compile;
pub use disassemble::{disassemble_chunk, disassemble_instruction};
pub use error::CompileError;
pub use loxi_core::{ObjFunction, Table};
