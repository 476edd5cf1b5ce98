//! The four fatal error taxonomies of the pipeline: one struct per stage, each carrying
//! a human-readable message and the source position (or instruction location, for the VM)
//! where the failure was detected. Every stage fails fast on its first error.

use std::fmt;

fn with_position(msg: &str, line: usize, column: usize) -> String {
	format!("{msg} near line {line}, column {column}")
}

macro_rules! position_error {
	($name:ident) => {
		#[derive(Debug, Clone)]
		pub struct $name {
			pub message: String,
		}

		impl $name {
			#[must_use]
			pub fn new(message: impl Into<String>) -> Self {
				Self { message: message.into() }
			}

			#[must_use]
			pub fn at(message: impl AsRef<str>, line: usize, column: usize) -> Self {
				Self { message: with_position(message.as_ref(), line, column) }
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.message)
			}
		}

		impl std::error::Error for $name {}
	};
}

position_error!(LexerError);
position_error!(ParserError);
position_error!(StaticError);

/// A fatal runtime error, carrying the function and instruction where it was detected.
#[derive(Debug, Clone)]
pub struct VMError {
	pub message: String,
}

impl VMError {
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	#[must_use]
	pub fn at(message: impl AsRef<str>, function_name: &str, pc: usize) -> Self {
		Self {
			message: format!("{} in function '{}' at instruction {}", message.as_ref(), function_name, pc),
		}
	}
}

impl fmt::Display for VMError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl std::error::Error for VMError {}
