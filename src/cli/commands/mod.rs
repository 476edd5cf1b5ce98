//! The CLI's subcommands, dispatched through an `enum_dispatch` trait so each
//! variant's `execute` can be called directly on the `SubCommand` enum.

use check::CheckCommand;
use colored::Colorize as _;
use run::RunCommand;
use tokens::TokensCommand;

pub mod check;
pub mod run;
pub mod tokens;

#[enum_dispatch::enum_dispatch]
pub trait MyplCommand {
	/// Executes this subcommand.
	fn execute(self) -> anyhow::Result<()>;
}

#[derive(clap::Subcommand)]
#[enum_dispatch::enum_dispatch(MyplCommand)]
pub enum SubCommand {
	Run(RunCommand),
	Check(CheckCommand),
	Tokens(TokensCommand),
}

/// Prints a `"<Action> <file>..."` banner before a pipeline stage starts.
pub fn start(action: &str, filename: &str) {
	println!("{} {}...", action.bold().green(), filename);
}

/// Reads the given source file into a string, reporting the path on failure.
pub fn read_source(filename: &str) -> anyhow::Result<String> {
	use anyhow::Context as _;
	std::fs::read_to_string(filename).with_context(|| format!("failed to read source file '{filename}'"))
}

/// Wraps a pipeline-stage failure in a colored, stage-labeled `anyhow::Error`.
pub fn report_stage_error(stage: &str, error: impl std::fmt::Display) -> anyhow::Error {
	anyhow::anyhow!("{} {error}", format!("{stage} error:").bold().red())
}
