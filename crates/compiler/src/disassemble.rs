//! On-demand opcode-to-text dump, used both for `dump_code` (finished
//! functions, as soon as the compiler closes them) and for
//! `trace_execution` (one instruction at a time, from the VM's dispatch
//! loop).

use loxi_core::{Chunk, OpCode, Value};

/// Print every instruction in `chunk` under a `== name ==` header.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Print the instruction at `offset` and return the offset of the next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");
    let line = chunk.read_line(offset);
    if offset > 0 && line == chunk.read_line(offset - 1) {
        print!("   | ");
    } else {
        print!("{line:4} ");
    }

    let op = OpCode::from_byte(chunk.code[offset]);
    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset, false),
        OpCode::ConstantLong => constant_instruction("OP_CONSTANT_LONG", chunk, offset, true),
        OpCode::Nil => simple_instruction("OP_NIL", offset),
        OpCode::True => simple_instruction("OP_TRUE", offset),
        OpCode::False => simple_instruction("OP_FALSE", offset),
        OpCode::Not => simple_instruction("OP_NOT", offset),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset),
        OpCode::Add => simple_instruction("OP_ADD", offset),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset),
        OpCode::Greater => simple_instruction("OP_GREATER", offset),
        OpCode::Less => simple_instruction("OP_LESS", offset),
        OpCode::Print => simple_instruction("OP_PRINT", offset),
        OpCode::Pop => simple_instruction("OP_POP", offset),
        OpCode::PopN => byte_instruction("OP_POPN", chunk, offset),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset, false),
        OpCode::DefineGlobalLong => {
            constant_instruction("OP_DEFINE_GLOBAL_LONG", chunk, offset, true)
        }
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset, false),
        OpCode::GetGlobalLong => constant_instruction("OP_GET_GLOBAL_LONG", chunk, offset, true),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset, false),
        OpCode::SetGlobalLong => constant_instruction("OP_SET_GLOBAL_LONG", chunk, offset, true),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        OpCode::GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        OpCode::SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        OpCode::CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset),
        OpCode::Closure | OpCode::ClosureLong => closure_instruction(op, chunk, offset),
        OpCode::Return => simple_instruction("OP_RETURN", offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{name:<16} {slot:4}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
    let target = (offset as i32) + 3 + sign * i32::from(jump);
    println!("{name:<16} {offset:4} -> {target}");
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, is_long: bool) -> usize {
    let (idx, len) = if is_long {
        let idx = u32::from_be_bytes([
            0,
            chunk.code[offset + 1],
            chunk.code[offset + 2],
            chunk.code[offset + 3],
        ]);
        (idx, 4)
    } else {
        (u32::from(chunk.code[offset + 1]), 2)
    };
    let value = &chunk.constants[idx as usize];
    println!("{name:<16} {idx:4} '{value}'");
    offset + len
}

fn closure_instruction(op: OpCode, chunk: &Chunk, offset: usize) -> usize {
    let is_long = op == OpCode::ClosureLong;
    let (idx, mut next) = if is_long {
        let idx = u32::from_be_bytes([
            0,
            chunk.code[offset + 1],
            chunk.code[offset + 2],
            chunk.code[offset + 3],
        ]);
        (idx, offset + 4)
    } else {
        (u32::from(chunk.code[offset + 1]), offset + 2)
    };
    let name = if is_long { "OP_CLOSURE_LONG" } else { "OP_CLOSURE" };
    let value = &chunk.constants[idx as usize];
    println!("{name:<16} {idx:4} '{value}'");

    if let Value::Obj(obj) = value {
        if let Some(function) = obj.as_function() {
            for _ in 0..function.upvalue_count {
                let is_local = chunk.code[next];
                let index = chunk.code[next + 1];
                let kind = if is_local != 0 { "local" } else { "upvalue" };
                println!("{next:04}      |                     {kind} {index}");
                next += 2;
            }
        }
    }
    next
}
