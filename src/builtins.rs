//! The fixed table of built-in functions. Checked against by name in `checker.rs`
//! (which also enforces each one's exact arity and argument types) and consulted by
//! `codegen.rs` to pick the opcode a built-in call lowers to. A `phf::Map` constant
//! name-to-opcode map, since each built-in lowers to exactly one runtime operation.

use phf::phf_map;

use crate::opcode::Opcode;

/// Which runtime opcode a built-in call lowers to. `Print`/`Read`/`Len`/`Getc`/
/// `Keys`/`In`/`Toint`/`Todbl`/`Tostr` mirror [`Opcode`] variants of the same
/// intent; `codegen.rs` emits the listed opcode after pushing the call's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
	Print,
	Input,
	Itos,
	Dtos,
	Stoi,
	Dtoi,
	Stod,
	Itod,
	Length,
	Get,
	Keys,
	In,
}

impl Builtin {
	/// The opcode emitted for a call to this built-in, after its arguments have
	/// been pushed onto the operand stack in order.
	#[must_use]
	pub const fn opcode(self) -> Opcode {
		match self {
			Self::Print => Opcode::Write,
			Self::Input => Opcode::Read,
			Self::Itos | Self::Dtos => Opcode::Tostr,
			Self::Stoi | Self::Dtoi => Opcode::Toint,
			Self::Stod | Self::Itod => Opcode::Todbl,
			Self::Length => Opcode::Len,
			Self::Get => Opcode::Getc,
			Self::Keys => Opcode::Keys,
			Self::In => Opcode::In,
		}
	}
}

pub static BUILTINS: phf::Map<&'static str, Builtin> = phf_map! {
	"print" => Builtin::Print,
	"input" => Builtin::Input,
	"itos" => Builtin::Itos,
	"dtos" => Builtin::Dtos,
	"stoi" => Builtin::Stoi,
	"dtoi" => Builtin::Dtoi,
	"stod" => Builtin::Stod,
	"itod" => Builtin::Itod,
	"length" => Builtin::Length,
	"get" => Builtin::Get,
	"keys" => Builtin::Keys,
	"in" => Builtin::In,
};

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_builtin_name_resolves() {
		for name in ["print", "input", "itos", "dtos", "stoi", "dtoi", "stod", "itod", "length", "get", "keys", "in"] {
			assert!(BUILTINS.get(name).is_some(), "missing builtin: {name}");
		}
	}

	#[test]
	fn unknown_name_is_absent() {
		assert!(BUILTINS.get("not_a_builtin").is_none());
	}
}
