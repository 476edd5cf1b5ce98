//! # MyPL
//!
//! A lexer, parser, semantic checker, bytecode compiler, and virtual machine for
//! MyPL: a small statically typed imperative language with structs, arrays,
//! dictionaries, and first-class functions.
//!
//! ## Installation
//!
//! ```bash
//! cargo install mypl
//! ```

/// The four pipeline error taxonomies.
pub mod error;

/// Token kinds and the `Token` type.
pub mod token;

/// Converts source text into a token stream.
pub mod lexer;

/// The abstract syntax tree.
pub mod ast;

/// The recursive-descent parser.
pub mod parser;

/// The semantic checker's scoped `name -> DataType` table.
pub mod symbol_table;

/// The semantic checker.
pub mod checker;

/// The code generator's scoped `name -> slot` table.
pub mod var_table;

/// Bytecode instructions and frame templates.
pub mod opcode;

/// The bytecode code generator.
pub mod codegen;

/// The stack-based virtual machine.
pub mod vm;

/// The fixed built-in function registry.
pub mod builtins;

/// The CLI module: argument parsing, subcommands, and pipeline-stage reporting.
pub mod cli;

use clap::Parser as _;

use crate::cli::commands::{MyplCommand as _, SubCommand};

/// The command-line arguments for the compiler.
#[derive(clap::Parser)]
pub struct MyplArguments {
	/// The subcommand to run: `run`, `check`, or `tokens`.
	#[command(subcommand)]
	pub command: SubCommand,
}

/// The main entry point: parses the command line and runs the chosen subcommand.
fn main() -> anyhow::Result<()> {
	MyplArguments::parse().command.execute()
}
