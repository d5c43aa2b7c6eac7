//! loxi-cli: the `clox` REPL/file driver.
//!
//! This crate is a thin shell over [`loxi_vm::Vm`]: argument parsing,
//! logging setup, the `clox.toml` config loader, the on-demand bytecode
//! dump, and the REPL/file-driver exit-code contract all live here so the
//! core/compiler/vm crates stay free of CLI concerns.

pub mod config;
pub mod dump;
pub mod repl;
pub mod runner;

pub use config::RunConfig;
