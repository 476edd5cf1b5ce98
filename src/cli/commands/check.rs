//! The `check` subcommand: lex, parse, and type-check a source file without
//! running it, reporting the first error encountered or `ok`.

use colored::Colorize as _;

use crate::{checker, lexer::tokenize, parser::parse};

use super::{read_source, report_stage_error, start, MyplCommand};

#[derive(clap::Parser)]
pub struct CheckCommand {
	/// The MyPL source file to check.
	pub filename: String,
}

impl MyplCommand for CheckCommand {
	fn execute(self) -> anyhow::Result<()> {
		start("Checking", &self.filename);
		let source = read_source(&self.filename)?;

		let tokens = tokenize(&source).map_err(|e| report_stage_error("Lexer", e))?;
		let program = parse(tokens).map_err(|e| report_stage_error("Parser", e))?;
		checker::check(&program).map_err(|e| report_stage_error("Static", e))?;

		println!("{}", "ok".bold().green());
		Ok(())
	}
}
