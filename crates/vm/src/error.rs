//! Runtime diagnostics and the VM's three-way result.

use std::fmt;

use loxi_compiler::CompileError;

#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    /// One line per active call frame at the moment of the error, innermost
    /// first, with each frame's source line resolved via its chunk's line
    /// table.
    pub trace: Vec<String>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        for line in &self.trace {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// The tri-state outcome of `Vm::interpret`, mapping to process exit codes
/// 0, 65, and 70 respectively.
#[derive(Debug)]
pub enum InterpretResult {
    Ok,
    CompileError(Vec<CompileError>),
    RuntimeError(RuntimeError),
}

impl InterpretResult {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError(_) => 65,
            InterpretResult::RuntimeError(_) => 70,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, InterpretResult::Ok)
    }
}
