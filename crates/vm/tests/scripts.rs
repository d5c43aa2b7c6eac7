//! Whole-program behavior tests against `Vm` directly, independent of the
//! CLI crate's `RunConfig`/runner plumbing. Covers cross-module behavior
//! that a single opcode-level unit test can't exercise on its own:
//! closures, global persistence across separate `interpret()` calls, and
//! runtime-error recovery.

use loxi_vm::{InterpretResult, Vm};

#[test]
fn closures_capture_independent_upvalues_per_call() {
    let mut vm = Vm::new();
    let result = vm.interpret(
        "fun make(start){ var c = start; fun inc(){ c = c + 1; return c; } return inc; } \
         var a = make(0); var b = make(100); \
         print a(); print a(); print b();",
    );
    assert!(matches!(result, InterpretResult::Ok));
}

#[test]
fn globals_persist_across_separate_interpret_calls_on_the_same_vm() {
    let mut vm = Vm::new();
    let first = vm.interpret("var total = 0; fun add(n) { total = total + n; } add(4); add(5);");
    assert!(matches!(first, InterpretResult::Ok));

    let second = vm.interpret("print total;");
    assert!(matches!(second, InterpretResult::Ok));
}

#[test]
fn a_runtime_error_resets_the_stack_but_leaves_the_vm_usable() {
    let mut vm = Vm::new();
    let first = vm.interpret("print 1 + nil;");
    assert!(matches!(first, InterpretResult::RuntimeError(_)));

    let second = vm.interpret("print 1 + 2;");
    assert!(matches!(second, InterpretResult::Ok));
}

#[test]
fn escaped_closure_survives_its_crashing_frames_stack_reset() {
    // `inner`'s upvalue over `c` is still open when `outer()` raises a
    // runtime error on the undefined `bogus`. The escaped closure in `g`
    // must still read back `c`'s value afterward rather than a stale
    // stack slot from the VM's post-error stack reset.
    let mut vm = Vm::new();
    let first = vm.interpret(
        "var g; \
         fun outer(){ var c = 10; fun inner(){ return c; } g = inner; return bogus + 1; } \
         outer();",
    );
    assert!(matches!(first, InterpretResult::RuntimeError(_)));

    let second = vm.interpret("print g();");
    assert!(matches!(second, InterpretResult::Ok));
}

#[test]
fn compile_error_reports_source_line_and_does_not_touch_the_vm() {
    let mut vm = Vm::new();
    let result = vm.interpret("var = ;");
    match result {
        InterpretResult::CompileError(errors) => assert!(!errors.is_empty()),
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn deep_recursion_past_the_frame_limit_is_a_runtime_error() {
    let mut vm = Vm::new();
    let result = vm.interpret(
        "fun count(n) { if (n <= 0) return 0; return 1 + count(n - 1); } print count(65);",
    );
    assert!(matches!(result, InterpretResult::RuntimeError(_)));
}
