//! The stack-based bytecode interpreter.

use std::rc::Rc;

use loxi_core::{intern, Obj, ObjClosure, ObjNative, ObjUpvalue, OpCode, Table, UpvalueState, Value};
use loxi_compiler::disassemble_instruction;
use tracing::{debug, warn};

use crate::error::{InterpretResult, RuntimeError};
use crate::natives;

const MAX_FRAMES: usize = 64;
const STACK_MAX: usize = MAX_FRAMES * 256;

struct CallFrame {
    /// Always an `Obj::Closure`.
    closure: Rc<Obj>,
    ip: usize,
    /// Index into `Vm::stack` of this invocation's slot 0 (the callee
    /// itself; locals and parameters follow).
    base: usize,
}

/// Owns the value stack, call-frame stack, globals, string-interning table,
/// and the list of still-open upvalues.
pub struct Vm {
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: Table,
    strings: Table,
    /// Sorted ascending by captured stack slot, so the highest (most
    /// recently pushed) address is always `.last()` — the one closed first
    /// on scope exit.
    open_upvalues: Vec<Rc<ObjUpvalue>>,
    trace_execution: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        let mut vm = Vm {
            frames: Vec::with_capacity(MAX_FRAMES),
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            strings: Table::new(),
            open_upvalues: Vec::new(),
            trace_execution: false,
        };
        vm.define_native("clock", 0, natives::clock);
        vm
    }

    pub fn set_trace_execution(&mut self, enabled: bool) {
        self.trace_execution = enabled;
    }

    fn define_native(&mut self, name: &'static str, arity: u8, function: loxi_core::object::NativeFn) {
        let name_obj = intern(&mut self.strings, name);
        let native_obj = Rc::new(Obj::Native(ObjNative { name, arity, function }));
        self.globals.set(name_obj, Value::Obj(native_obj));
    }

    /// Compile and run `source` to completion. Each call starts with a
    /// clean value/frame stack; globals and interned strings persist across
    /// calls on the same `Vm`, matching the REPL's per-line interpret loop.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = match loxi_compiler::compile(source, &mut self.strings) {
            Ok(function) => function,
            Err(errors) => return InterpretResult::CompileError(errors),
        };

        let function_obj = Rc::new(Obj::Function(function));
        let closure_obj =
            Rc::new(Obj::Closure(ObjClosure { function: function_obj, upvalues: Vec::new() }));
        self.stack.push(Value::Obj(Rc::clone(&closure_obj)));
        self.frames.push(CallFrame { closure: closure_obj, ip: 0, base: 0 });

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(error) => InterpretResult::RuntimeError(error),
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.trace_execution {
                self.print_trace();
            }

            let instruction = self.read_byte();
            match OpCode::from_byte(instruction) {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::ConstantLong => {
                    let value = self.read_constant_long();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => match self.peek(0).as_number() {
                    Some(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    None => return Err(self.runtime_error("Operand must be a number.")),
                },
                OpCode::Add => self.binary_add()?,
                OpCode::Subtract => self.binary_numeric(|a, b| a - b)?,
                OpCode::Multiply => self.binary_numeric(|a, b| a * b)?,
                OpCode::Divide => self.binary_numeric(|a, b| a / b)?,
                OpCode::Greater => self.binary_compare(|a, b| a > b)?,
                OpCode::Less => self.binary_compare(|a, b| a < b)?,
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{value}");
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::PopN => {
                    let n = usize::from(self.read_byte());
                    let new_len = self.stack.len() - n;
                    self.stack.truncate(new_len);
                }
                OpCode::DefineGlobal => self.define_global(false),
                OpCode::DefineGlobalLong => self.define_global(true),
                OpCode::GetGlobal => self.get_global(false)?,
                OpCode::GetGlobalLong => self.get_global(true)?,
                OpCode::SetGlobal => self.set_global(false)?,
                OpCode::SetGlobalLong => self.set_global(true)?,
                OpCode::GetLocal => {
                    let slot = usize::from(self.read_byte());
                    let base = self.current_frame().base;
                    self.push(self.stack[base + slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = usize::from(self.read_byte());
                    let base = self.current_frame().base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                OpCode::GetUpvalue => {
                    let slot = usize::from(self.read_byte());
                    let value = self.read_upvalue(slot);
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = usize::from(self.read_byte());
                    let value = self.peek(0).clone();
                    self.write_upvalue(slot, value);
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsey() {
                        self.current_frame_mut().ip += usize::from(offset);
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.current_frame_mut().ip += usize::from(offset);
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.current_frame_mut().ip -= usize::from(offset);
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    self.call_value(arg_count)?;
                }
                OpCode::Closure => self.closure(false)?,
                OpCode::ClosureLong => self.closure(true)?,
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("return always has an active frame");
                    debug!(depth = self.frames.len() + 1, "returning from frame");
                    self.close_upvalues(frame.base);
                    if self.frames.is_empty() {
                        self.stack.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    self.push(result);
                }
            }
        }
    }

    // -- fetch helpers --

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("dispatch loop always has an active frame");
        let byte = frame
            .closure
            .as_closure()
            .expect("call frames always hold a closure")
            .function
            .as_function()
            .expect("closures always wrap a function")
            .chunk
            .code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant_idx_short(&mut self) -> u32 {
        u32::from(self.read_byte())
    }

    fn read_constant_idx_long(&mut self) -> u32 {
        let hi = self.read_byte();
        let mid = self.read_byte();
        let lo = self.read_byte();
        u32::from_be_bytes([0, hi, mid, lo])
    }

    fn constant_at(&self, idx: u32) -> Value {
        self.current_frame()
            .closure
            .as_closure()
            .expect("call frames always hold a closure")
            .function
            .as_function()
            .expect("closures always wrap a function")
            .chunk
            .constants[idx as usize]
            .clone()
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_constant_idx_short();
        self.constant_at(idx)
    }

    fn read_constant_long(&mut self) -> Value {
        let idx = self.read_constant_idx_long();
        self.constant_at(idx)
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("dispatch loop always has an active frame")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("dispatch loop always has an active frame")
    }

    // -- stack helpers --

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("dispatch loop never pops an empty stack")
    }

    fn peek(&self, distance: usize) -> &Value {
        let len = self.stack.len();
        &self.stack[len - 1 - distance]
    }

    // -- arithmetic/comparison --

    fn binary_numeric(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        match (self.peek(1).as_number(), self.peek(0).as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(op(a, b)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    fn binary_compare(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        match (self.peek(1).as_number(), self.peek(0).as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(op(a, b)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    /// `ADD` is overloaded: number+number sums, string+string concatenates
    /// into a freshly interned string, anything else is a type error.
    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        if let (Some(a), Some(b)) = (self.peek(1).as_number(), self.peek(0).as_number()) {
            self.pop();
            self.pop();
            self.push(Value::Number(a + b));
            return Ok(());
        }
        let both_strings = self.peek(1).as_obj().and_then(|o| o.as_string()).is_some()
            && self.peek(0).as_obj().and_then(|o| o.as_string()).is_some();
        if both_strings {
            let b = self.pop();
            let a = self.pop();
            let a_str = a.as_obj().and_then(|o| o.as_string()).expect("checked above");
            let b_str = b.as_obj().and_then(|o| o.as_string()).expect("checked above");
            let concatenated = format!("{}{}", a_str.as_str(), b_str.as_str());
            let interned = intern(&mut self.strings, &concatenated);
            self.push(Value::Obj(interned));
            return Ok(());
        }
        Err(self.runtime_error("Operands must be two numbers or two strings."))
    }

    // -- globals --

    fn define_global(&mut self, long: bool) {
        let idx = if long { self.read_constant_idx_long() } else { self.read_constant_idx_short() };
        let name = self.constant_at(idx);
        let value = self.pop();
        let Value::Obj(name_obj) = name else {
            unreachable!("global name constants are always interned strings")
        };
        self.globals.set(name_obj, value);
    }

    fn get_global(&mut self, long: bool) -> Result<(), RuntimeError> {
        let idx = if long { self.read_constant_idx_long() } else { self.read_constant_idx_short() };
        let name = self.constant_at(idx);
        let Value::Obj(name_obj) = name else {
            unreachable!("global name constants are always interned strings")
        };
        match self.globals.get(&name_obj) {
            Some(value) => {
                let value = value.clone();
                self.push(value);
                Ok(())
            }
            None => {
                let message = format!(
                    "Undefined variable '{}'.",
                    name_obj.as_string().expect("global names are strings").as_str()
                );
                Err(self.runtime_error(&message))
            }
        }
    }

    fn set_global(&mut self, long: bool) -> Result<(), RuntimeError> {
        let idx = if long { self.read_constant_idx_long() } else { self.read_constant_idx_short() };
        let name = self.constant_at(idx);
        let Value::Obj(name_obj) = name else {
            unreachable!("global name constants are always interned strings")
        };
        let value = self.peek(0).clone();
        if self.globals.set(Rc::clone(&name_obj), value) {
            self.globals.delete(&name_obj);
            let message = format!(
                "Undefined variable '{}'.",
                name_obj.as_string().expect("global names are strings").as_str()
            );
            return Err(self.runtime_error(&message));
        }
        Ok(())
    }

    // -- calls --

    fn call_value(&mut self, arg_count: u8) -> Result<(), RuntimeError> {
        let callee = self.peek(usize::from(arg_count)).clone();
        let Value::Obj(obj) = callee else {
            return Err(self.runtime_error("Can only call functions and classes."));
        };
        match &*obj {
            Obj::Closure(_) => self.call_closure(Rc::clone(&obj), arg_count),
            Obj::Native(native) => {
                let function = native.function;
                let arity = native.arity;
                self.call_native(function, arity, arg_count)
            }
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure_obj: Rc<Obj>, arg_count: u8) -> Result<(), RuntimeError> {
        let function_obj = &closure_obj
            .as_closure()
            .expect("caller checked this is a closure")
            .function;
        let arity = function_obj.as_function().expect("closures always wrap a function").arity;
        if arg_count != arity {
            let message = format!("Expected {arity} arguments but got {arg_count}.");
            return Err(self.runtime_error(&message));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(self.runtime_error("Stack overflow."));
        }
        let base = self.stack.len() - usize::from(arg_count) - 1;
        debug!(depth = self.frames.len() + 1, base, "entering frame");
        self.frames.push(CallFrame { closure: closure_obj, ip: 0, base });
        Ok(())
    }

    fn call_native(
        &mut self,
        function: loxi_core::object::NativeFn,
        arity: u8,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        if arg_count != arity {
            let message = format!("Expected {arity} arguments but got {arg_count}.");
            return Err(self.runtime_error(&message));
        }
        let start = self.stack.len() - usize::from(arg_count);
        let args: Vec<Value> = self.stack[start..].to_vec();
        match function(&args) {
            Ok(result) => {
                self.stack.truncate(start - 1);
                self.push(result);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(&message)),
        }
    }

    fn closure(&mut self, long: bool) -> Result<(), RuntimeError> {
        let idx = if long { self.read_constant_idx_long() } else { self.read_constant_idx_short() };
        let function_value = self.constant_at(idx);
        let Value::Obj(function_obj) = function_value else {
            unreachable!("closure operand is always a function constant")
        };
        let upvalue_count = function_obj
            .as_function()
            .expect("closure operand resolves to a function")
            .upvalue_count;

        let mut upvalues = Vec::with_capacity(usize::from(upvalue_count));
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = usize::from(self.read_byte());
            if is_local {
                let base = self.current_frame().base;
                upvalues.push(self.capture_upvalue(base + index));
            } else {
                let enclosing = self
                    .current_frame()
                    .closure
                    .as_closure()
                    .expect("call frames always hold a closure");
                upvalues.push(Rc::clone(&enclosing.upvalues[index]));
            }
        }

        let closure_obj = Rc::new(Obj::Closure(ObjClosure { function: function_obj, upvalues }));
        self.push(Value::Obj(closure_obj));
        Ok(())
    }

    // -- upvalues --

    fn capture_upvalue(&mut self, absolute_slot: usize) -> Rc<ObjUpvalue> {
        for existing in &self.open_upvalues {
            if let UpvalueState::Open(slot) = *existing.state.borrow() {
                if slot == absolute_slot {
                    return Rc::clone(existing);
                }
            }
        }
        let created = Rc::new(ObjUpvalue::new_open(absolute_slot));
        let pos = self.open_upvalues.partition_point(|u| match *u.state.borrow() {
            UpvalueState::Open(slot) => slot < absolute_slot,
            UpvalueState::Closed(_) => true,
        });
        self.open_upvalues.insert(pos, Rc::clone(&created));
        created
    }

    fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(last) = self.open_upvalues.last() {
            let slot = match *last.state.borrow() {
                UpvalueState::Open(slot) => slot,
                UpvalueState::Closed(_) => break,
            };
            if slot < from_slot {
                break;
            }
            let value = self.stack[slot].clone();
            *last.state.borrow_mut() = UpvalueState::Closed(value);
            self.open_upvalues.pop();
            debug!(slot, "closing upvalue");
        }
    }

    fn read_upvalue(&self, slot: usize) -> Value {
        let closure =
            self.current_frame().closure.as_closure().expect("call frames always hold a closure");
        match *closure.upvalues[slot].state.borrow() {
            UpvalueState::Open(stack_slot) => self.stack[stack_slot].clone(),
            UpvalueState::Closed(ref value) => value.clone(),
        }
    }

    fn write_upvalue(&mut self, slot: usize, value: Value) {
        let upvalue = {
            let closure = self
                .current_frame()
                .closure
                .as_closure()
                .expect("call frames always hold a closure");
            Rc::clone(&closure.upvalues[slot])
        };
        let target = match *upvalue.state.borrow() {
            UpvalueState::Open(stack_slot) => Some(stack_slot),
            UpvalueState::Closed(_) => None,
        };
        match target {
            Some(stack_slot) => self.stack[stack_slot] = value,
            None => *upvalue.state.borrow_mut() = UpvalueState::Closed(value),
        }
    }

    // -- diagnostics --

    fn runtime_error(&mut self, message: &str) -> RuntimeError {
        warn!("runtime error: {message}");
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            let closure = frame.closure.as_closure().expect("call frames always hold a closure");
            let function =
                closure.function.as_function().expect("closures always wrap a function");
            let line = function.chunk.read_line(frame.ip.saturating_sub(1));
            if function.name.is_none() {
                trace.push(format!("[line {line}] in script"));
            } else {
                trace.push(format!("[line {line}] in {}()", function.display_name()));
            }
        }
        // Runtime errors reset the stack before returning to the caller, but
        // a closure that escaped the crashing frame (stored into a global,
        // say) may still hold an open upvalue pointing at a slot in this
        // stack. Close every open upvalue down to the bottom before
        // clearing, so such a closure reads back its captured value instead
        // of a stale slot index into whatever the next `interpret()` call
        // leaves on the reused stack.
        self.close_upvalues(0);
        self.stack.clear();
        self.frames.clear();
        RuntimeError { message: message.to_string(), trace }
    }

    fn print_trace(&self) {
        print!("          ");
        for value in &self.stack {
            print!("[ {value} ]");
        }
        println!();
        let frame = self.current_frame();
        let closure = frame.closure.as_closure().expect("call frames always hold a closure");
        let function = closure.function.as_function().expect("closures always wrap a function");
        disassemble_instruction(&function.chunk, frame.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ok(source: &str) -> Vm {
        let mut vm = Vm::new();
        match vm.interpret(source) {
            InterpretResult::Ok => vm,
            InterpretResult::CompileError(errors) => panic!("compile error: {errors:?}"),
            InterpretResult::RuntimeError(error) => panic!("runtime error: {error}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        run_ok("print 1 + 2 * 3;");
    }

    #[test]
    fn string_concatenation_interns_the_result_once() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            r#"var a = "he"; var b = "llo"; print a + b; print a + b;"#,
        );
        assert!(result.is_ok());
        // both concatenations produce byte-identical strings, so only one
        // "hello" should ever exist in the intern table.
        assert_eq!(vm.strings.len(), 3); // "he", "llo", "hello"
    }

    #[test]
    fn for_loop_accumulates() {
        run_ok("var x = 0; for (var i = 0; i < 5; i = i + 1) x = x + i; print x;");
    }

    #[test]
    fn closure_captures_and_mutates_upvalue_across_calls() {
        run_ok(
            "fun make(){var c=0; fun inc(){c=c+1; return c;} return inc;} \
             var f = make(); print f(); print f(); print f();",
        );
    }

    #[test]
    fn cross_type_equality_never_errors() {
        run_ok(r#"print 1 == "1";"#);
    }

    #[test]
    fn escaped_upvalue_survives_the_crashing_frames_stack_reset() {
        // `inner`'s upvalue over `c` is still open (its frame hasn't
        // returned) when `outer()` hits an undefined-variable error. The
        // error must close that upvalue before resetting the stack, or the
        // next `interpret()` call reuses the same stack storage and `g()`
        // reads whatever garbage now lives at that stale slot index.
        let mut vm = Vm::new();
        let first = vm.interpret(
            "var g; \
             fun outer(){ var c = 10; fun inner(){ return c; } g = inner; return bogus + 1; } \
             outer();",
        );
        assert!(matches!(first, InterpretResult::RuntimeError(_)));

        let second = vm.interpret("print g();");
        match second {
            InterpretResult::Ok => {}
            InterpretResult::RuntimeError(error) => {
                panic!("expected g() to still return 10, got a runtime error: {error}")
            }
            InterpretResult::CompileError(errors) => panic!("unexpected compile error: {errors:?}"),
        }
    }

    #[test]
    fn undefined_global_assignment_is_a_runtime_error() {
        let mut vm = Vm::new();
        let result = vm.interpret("var a; a = b;");
        match result {
            InterpretResult::RuntimeError(error) => {
                assert_eq!(error.message, "Undefined variable 'b'.");
            }
            _ => panic!("expected a runtime error"),
        }
    }

    #[test]
    fn deep_recursion_within_frame_limit_succeeds() {
        // Each nested call costs one real call frame (no tail-call
        // optimization), so this must stay comfortably under MAX_FRAMES (64).
        run_ok(
            "fun count(n) { if (n <= 0) return 0; return count(n - 1); } print count(50);",
        );
    }

    #[test]
    fn recursion_past_frame_limit_overflows() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            "fun count(n) { if (n <= 0) return 0; return 1 + count(n - 1); } print count(65);",
        );
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }
}
