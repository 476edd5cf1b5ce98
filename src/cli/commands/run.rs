//! The `run` subcommand: the full lex → parse → check → codegen → execute pipeline.

use colored::Colorize as _;

use crate::{checker, codegen, lexer::tokenize, parser::parse, vm};

use super::{read_source, report_stage_error, start, MyplCommand};

#[derive(clap::Parser)]
pub struct RunCommand {
	/// The MyPL source file to run.
	pub filename: String,

	/// Print the lexer's token stream before continuing.
	#[arg(long)]
	pub dump_tokens: bool,

	/// Print the parsed abstract syntax tree before continuing.
	#[arg(long)]
	pub dump_ast: bool,

	/// Print each function's generated bytecode before continuing.
	#[arg(long)]
	pub dump_bytecode: bool,
}

impl MyplCommand for RunCommand {
	fn execute(self) -> anyhow::Result<()> {
		start("Running", &self.filename);
		let source = read_source(&self.filename)?;

		let tokens = tokenize(&source).map_err(|e| report_stage_error("Lexer", e))?;
		if self.dump_tokens {
			dump("tokens", tokens.iter().map(ToString::to_string));
		}

		let program = parse(tokens).map_err(|e| report_stage_error("Parser", e))?;
		if self.dump_ast {
			dump("ast", std::iter::once(format!("{program:#?}")));
		}

		checker::check(&program).map_err(|e| report_stage_error("Static", e))?;

		let templates = codegen::generate(&program);
		if self.dump_bytecode {
			dump(
				"bytecode",
				templates.iter().map(|template| {
					let mut rendered = format!("{}({} args):", template.function_name, template.arg_count);
					for (i, instr) in template.instructions.iter().enumerate() {
						rendered.push_str(&format!("\n  {i:>4}  {instr:?}"));
					}
					rendered
				}),
			);
		}

		vm::run(templates).map_err(|e| report_stage_error("VM", e))
	}
}

fn dump(label: &str, lines: impl Iterator<Item = String>) {
	println!("{}", format!("-- {label} --").bold().cyan());
	for line in lines {
		println!("{line}");
	}
}
