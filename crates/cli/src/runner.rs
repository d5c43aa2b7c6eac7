//! Shared "compile (and maybe dump), then run" plumbing used by both the
//! file driver and the REPL.

use loxi_core::Table;
use loxi_vm::{InterpretResult, Vm};

use crate::config::RunConfig;
use crate::dump::dump_function_tree;

/// Run one chunk of source text against `vm`, honoring `config`'s debug
/// switches. A `--dump-code` dump recompiles `source` against a throwaway
/// string table purely for display — the disassembler is an on-demand,
/// read-only collaborator, not wired into the VM's real execution path, so
/// this costs an extra parse but touches none of the VM's actual
/// interning/globals state.
pub fn run(vm: &mut Vm, source: &str, config: RunConfig) -> InterpretResult {
    if config.dump_code {
        let mut scratch = Table::new();
        match loxi_compiler::compile(source, &mut scratch) {
            Ok(function) => dump_function_tree(&function, config.const_table_extra),
            Err(_) => {
                // Compile errors are reported the normal way by the real
                // `vm.interpret` call below; don't double-report here.
            }
        }
    }
    vm.set_trace_execution(config.trace_execution);
    vm.interpret(source)
}

/// Print a finished [`InterpretResult`]'s diagnostics to stderr. Returns the
/// process exit code that outcome maps to.
pub fn report(result: &InterpretResult) -> i32 {
    match result {
        InterpretResult::Ok => 0,
        InterpretResult::CompileError(errors) => {
            for error in errors {
                eprintln!("{error}");
            }
            65
        }
        InterpretResult::RuntimeError(error) => {
            eprintln!("{error}");
            70
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_program_reports_exit_zero() {
        let mut vm = Vm::new();
        let result = run(&mut vm, "print 1 + 1;", RunConfig::new());
        assert_eq!(report(&result), 0);
    }

    #[test]
    fn compile_error_reports_exit_65() {
        let mut vm = Vm::new();
        let result = run(&mut vm, "var = ;", RunConfig::new());
        assert_eq!(report(&result), 65);
    }

    #[test]
    fn runtime_error_reports_exit_70() {
        let mut vm = Vm::new();
        let result = run(&mut vm, "print a;", RunConfig::new());
        assert_eq!(report(&result), 70);
    }

    #[test]
    fn dump_code_does_not_disturb_real_execution() {
        let mut vm = Vm::new();
        let config = RunConfig::new().with_dump_code(true).with_const_table_extra(true);
        let result = run(&mut vm, "var a = 1; print a;", config);
        assert_eq!(report(&result), 0);
    }
}
