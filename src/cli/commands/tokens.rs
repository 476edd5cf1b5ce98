//! The `tokens` subcommand: dumps the lexer's token stream, for debugging the
//! lexer independently of the rest of the pipeline.

use crate::lexer::tokenize;

use super::{read_source, report_stage_error, start, MyplCommand};

#[derive(clap::Parser)]
pub struct TokensCommand {
	/// The MyPL source file to tokenize.
	pub filename: String,
}

impl MyplCommand for TokensCommand {
	fn execute(self) -> anyhow::Result<()> {
		start("Tokenizing", &self.filename);
		let source = read_source(&self.filename)?;

		let tokens = tokenize(&source).map_err(|e| report_stage_error("Lexer", e))?;
		for token in &tokens {
			println!("{token}");
		}
		Ok(())
	}
}
