//! The interactive REPL: no script argument means read lines from stdin,
//! interpret each one, and print the `> ` prompt again.
//!
//! Line editing and history go through `rustyline` rather than a hand-rolled
//! fixed-size line buffer, giving the prompt real cursor movement, history
//! recall, and Ctrl-C/Ctrl-D handling for free.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use loxi_vm::Vm;

use crate::config::RunConfig;
use crate::runner;

const PROMPT: &str = "> ";

/// Run the REPL until EOF (Ctrl-D) or an explicit interrupt (Ctrl-C).
///
/// Each line is interpreted against the same `Vm`, so globals and
/// previously-defined functions persist across lines — a compile or
/// runtime error on one line is reported and the REPL continues at the
/// next prompt rather than exiting.
pub fn run(config: RunConfig) {
    let mut vm = Vm::new();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("clox: could not start line editor: {e}");
            return;
        }
    };

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                let result = runner::run(&mut vm, &line, config);
                runner::report(&result);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("clox: read error: {e}");
                break;
            }
        }
    }
}
