//! Whole-program behavior tests, exercised through the library entry
//! points rather than by shelling out to the built `clox` binary.

use loxi_cli::config::RunConfig;
use loxi_cli::runner;
use loxi_vm::{InterpretResult, Vm};

fn run_source(source: &str) -> InterpretResult {
    let mut vm = Vm::new();
    runner::run(&mut vm, source, RunConfig::new())
}

#[test]
fn arithmetic_precedence_prints_seven() {
    let result = run_source("print 1 + 2 * 3;");
    assert!(result.is_ok());
}

#[test]
fn for_loop_sums_to_ten() {
    let result =
        run_source("var x = 0; for (var i = 0; i < 5; i = i + 1) x = x + i; print x;");
    assert!(result.is_ok());
}

#[test]
fn closures_capture_and_mutate_upvalues() {
    let result = run_source(
        "fun make(){var c=0; fun inc(){c=c+1; return c;} return inc;} \
         var f = make(); print f(); print f(); print f();",
    );
    assert!(result.is_ok());
}

#[test]
fn cross_type_equality_never_errors() {
    let result = run_source("print 1 == \"1\";");
    assert!(result.is_ok());
}

#[test]
fn reading_an_undefined_global_is_a_runtime_error_with_exit_70() {
    let result = run_source("var a; a = b;");
    assert_eq!(runner::report(&result), 70);
}

#[test]
fn deep_recursion_within_frame_limit_succeeds() {
    let result =
        run_source("fun count(n) { if (n <= 0) return 0; return 1 + count(n - 1); } print count(60);");
    assert!(result.is_ok());
}

#[test]
fn recursion_past_frame_limit_overflows_with_exit_70() {
    let result = run_source(
        "fun count(n) { if (n <= 0) return 0; return 1 + count(n - 1); } print count(65);",
    );
    assert_eq!(runner::report(&result), 70);
}

#[test]
fn setting_an_undefined_global_does_not_define_it() {
    let mut vm = Vm::new();
    let first = runner::run(&mut vm, "x = 1;", RunConfig::new());
    assert_eq!(runner::report(&first), 70);
    let second = runner::run(&mut vm, "print x;", RunConfig::new());
    assert_eq!(runner::report(&second), 70);
}

#[test]
fn globals_persist_across_separate_interpret_calls_on_the_same_vm() {
    let mut vm = Vm::new();
    let first = runner::run(&mut vm, "var count = 41;", RunConfig::new());
    assert!(first.is_ok());
    let second = runner::run(&mut vm, "print count + 1;", RunConfig::new());
    assert!(second.is_ok());
}

#[test]
fn compile_error_exits_65_and_does_not_run_anything() {
    let result = run_source("var = ;");
    assert_eq!(runner::report(&result), 65);
}

#[test]
fn dump_code_flag_does_not_change_program_outcome() {
    let mut vm = Vm::new();
    let config = RunConfig::new().with_dump_code(true).with_const_table_extra(true);
    let result = runner::run(&mut vm, "print \"hello\" + \" world\";", config);
    assert!(result.is_ok());
}
