//! clox: `clox [path]` — REPL with no argument, single-file interpreter
//! when a path is given.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use loxi_cli::config::{self, RunConfig};
use loxi_cli::{repl, runner};
use loxi_vm::Vm;

#[derive(Parser)]
#[command(name = "clox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "loxi: a bytecode compiler and VM for Lox", long_about = None)]
struct Args {
    /// Script to run; omit for an interactive REPL.
    path: Option<PathBuf>,

    /// Disassemble every compiled function before running it.
    #[arg(long)]
    dump_code: bool,

    /// Trace each executed instruction and the value stack.
    #[arg(long)]
    trace_execution: bool,

    /// Annotate disassembled constant pools with each entry's runtime type.
    #[arg(long)]
    dump_constants: bool,

    /// Path to a `clox.toml` config file (defaults to `./clox.toml` if present).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from("clox.toml"));
    let file_config = match config::load_config_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("clox: {e}");
            process::exit(74);
        }
    };
    let flags = RunConfig::new()
        .with_dump_code(args.dump_code)
        .with_trace_execution(args.trace_execution)
        .with_const_table_extra(args.dump_constants);
    let config = file_config.merge(flags);

    match args.path {
        None => repl::run(config),
        Some(path) => {
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("clox: could not read '{}': {e}", path.display());
                    process::exit(74);
                }
            };
            let mut vm = Vm::new();
            let result = runner::run(&mut vm, &source, config);
            let code = runner::report(&result);
            process::exit(code);
        }
    }
}
