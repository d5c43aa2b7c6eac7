//! `--dump-code` / `--dump-constants`: walk a compiled function tree and
//! print every chunk, recursively into nested function constants, since
//! `loxi_compiler::disassemble_chunk` only covers one chunk at a time and a
//! program's nested `fun` declarations each compile to their own chunk.

use loxi_core::{ObjFunction, Value};
use loxi_compiler::disassemble_chunk;

/// Disassemble `function`'s chunk, then recurse into any nested
/// `ObjFunction` constants its pool holds (the bytecode a `fun` declaration
/// compiles to).
pub fn dump_function_tree(function: &ObjFunction, const_table_extra: bool) {
    disassemble_chunk(&function.chunk, function.display_name());
    if const_table_extra {
        dump_constant_table(function);
    }
    for constant in &function.chunk.constants {
        if let Value::Obj(obj) = constant {
            if let Some(nested) = obj.as_function() {
                println!();
                dump_function_tree(nested, const_table_extra);
            }
        }
    }
}

fn dump_constant_table(function: &ObjFunction) {
    println!("-- constants ({}) --", function.display_name());
    for (i, value) in function.chunk.constants.iter().enumerate() {
        let kind = match value {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::Obj(obj) => obj.type_name(),
        };
        println!("{i:4} : {kind:<14} '{value}'");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxi_core::Table;

    #[test]
    fn dumps_nested_function_without_panicking() {
        let mut strings = Table::new();
        let function =
            loxi_compiler::compile("fun outer() { fun inner() { return 1; } return inner; }", &mut strings)
                .unwrap();
        dump_function_tree(&function, true);
    }
}
