//! Converts MyPL source text into a stream of [`Token`]s.
//!
//! A cursor over the source exposes `read` (consuming) and `peek` (non-consuming),
//! tracking 1-based line and column. Two-character operators are recognized by
//! peeking past the first character; identifiers are scanned greedily and then
//! looked up against the fixed keyword table.

use crate::error::LexerError;
use crate::token::{Token, TokenKind};

struct Cursor {
	chars: Vec<char>,
	pos: usize,
	line: usize,
	column: usize,
}

impl Cursor {
	fn new(source: &str) -> Self {
		Self { chars: source.chars().collect(), pos: 0, line: 1, column: 0 }
	}

	/// Consumes and returns the next character, or `None` at end of input.
	fn read(&mut self) -> Option<char> {
		let ch = self.chars.get(self.pos).copied();
		if ch.is_some() {
			self.pos += 1;
			self.column += 1;
		}
		ch
	}

	/// Returns the next character without consuming it.
	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn error(&self, message: impl AsRef<str>, line: usize, column: usize) -> LexerError {
		LexerError::at(message, line, column)
	}
}

fn is_identifier_continue(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_'
}

/// Tokenizes an entire source string, returning every token including a trailing
/// [`TokenKind::Eos`]. Whitespace is consumed silently (newlines advance `line` and
/// reset `column`); `//` line comments are emitted as [`TokenKind::Comment`] tokens so
/// callers that want them (e.g. a `tokens` CLI dump) can see them, though the parser
/// skips them transparently.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
	let mut cursor = Cursor::new(source);
	let mut tokens = Vec::new();
	loop {
		let token = next_token(&mut cursor)?;
		let is_eos = token.kind == TokenKind::Eos;
		tokens.push(token);
		if is_eos {
			break;
		}
	}
	Ok(tokens)
}

fn next_token(cursor: &mut Cursor) -> Result<Token, LexerError> {
	let Some(ch) = cursor.read() else {
		return Ok(Token::new(TokenKind::Eos, "", cursor.line, cursor.column));
	};

	if ch.is_whitespace() {
		if ch == '\n' {
			cursor.line += 1;
			cursor.column = 0;
		}
		return next_token(cursor);
	}

	let line = cursor.line;
	let column = cursor.column;

	match ch {
		'.' => Ok(Token::new(TokenKind::Dot, ".", line, column)),
		';' => Ok(Token::new(TokenKind::Semicolon, ";", line, column)),
		',' => Ok(Token::new(TokenKind::Comma, ",", line, column)),
		'+' => Ok(Token::new(TokenKind::Plus, "+", line, column)),
		'-' => Ok(Token::new(TokenKind::Minus, "-", line, column)),
		'*' => Ok(Token::new(TokenKind::Times, "*", line, column)),
		'(' => Ok(Token::new(TokenKind::LParen, "(", line, column)),
		')' => Ok(Token::new(TokenKind::RParen, ")", line, column)),
		'[' => Ok(Token::new(TokenKind::LBracket, "[", line, column)),
		']' => Ok(Token::new(TokenKind::RBracket, "]", line, column)),
		'{' => Ok(Token::new(TokenKind::LBrace, "{", line, column)),
		'}' => Ok(Token::new(TokenKind::RBrace, "}", line, column)),
		'/' if cursor.peek() == Some('/') => Ok(read_comment(cursor, line, column)),
		'/' => Ok(Token::new(TokenKind::Divide, "/", line, column)),
		'=' if cursor.peek() == Some('=') => {
			cursor.read();
			Ok(Token::new(TokenKind::Equal, "==", line, column))
		}
		'=' => Ok(Token::new(TokenKind::Assign, "=", line, column)),
		'<' if cursor.peek() == Some('=') => {
			cursor.read();
			Ok(Token::new(TokenKind::LessEq, "<=", line, column))
		}
		'<' => Ok(Token::new(TokenKind::Less, "<", line, column)),
		'>' if cursor.peek() == Some('=') => {
			cursor.read();
			Ok(Token::new(TokenKind::GreaterEq, ">=", line, column))
		}
		'>' => Ok(Token::new(TokenKind::Greater, ">", line, column)),
		'!' if cursor.peek() == Some('=') => {
			cursor.read();
			Ok(Token::new(TokenKind::NotEqual, "!=", line, column))
		}
		'!' => Err(cursor.error("invalid use of '!'", line, column)),
		'"' => read_string(cursor, line, column),
		_ if ch.is_ascii_digit() => read_number(cursor, ch, line, column),
		_ if ch.is_alphabetic() => read_word(cursor, ch, line, column),
		other => Err(cursor.error(format!("unknown symbol '{other}'"), line, column)),
	}
}

fn read_comment(cursor: &mut Cursor, line: usize, column: usize) -> Token {
	cursor.read(); // consume the second '/'
	let mut lexeme = String::new();
	while let Some(next) = cursor.peek() {
		if next == '\n' {
			break;
		}
		lexeme.push(next);
		cursor.read();
	}
	Token::new(TokenKind::Comment, lexeme, line, column)
}

fn read_string(cursor: &mut Cursor, line: usize, column: usize) -> Result<Token, LexerError> {
	let mut lexeme = String::new();
	loop {
		match cursor.read() {
			None => return Err(cursor.error("unterminated string literal", line, column)),
			Some('"') => return Ok(Token::new(TokenKind::StringVal, lexeme, line, column)),
			Some('\n') => return Err(cursor.error("unterminated string literal (embedded newline)", line, column)),
			Some(c) => lexeme.push(c),
		}
	}
}

fn read_number(cursor: &mut Cursor, first: char, line: usize, column: usize) -> Result<Token, LexerError> {
	let mut lexeme = String::from(first);
	let mut is_double = false;

	if first == '0' && cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
		return Err(cursor.error("leading zero in integer literal", line, column));
	}

	loop {
		match cursor.peek() {
			Some(c) if c.is_ascii_digit() => {
				lexeme.push(c);
				cursor.read();
			}
			Some('.') if !is_double => {
				is_double = true;
				lexeme.push('.');
				cursor.read();
				match cursor.peek() {
					Some(c) if c.is_ascii_digit() => {}
					_ => return Err(cursor.error("double literal missing fractional digits", line, column)),
				}
			}
			_ => break,
		}
	}

	if cursor.peek().is_some_and(char::is_alphabetic) {
		return Err(cursor.error("invalid numeric literal", line, column));
	}

	let kind = if is_double { TokenKind::DoubleVal } else { TokenKind::IntVal };
	Ok(Token::new(kind, lexeme, line, column))
}

fn read_word(cursor: &mut Cursor, first: char, line: usize, column: usize) -> Result<Token, LexerError> {
	let mut lexeme = String::from(first);
	while let Some(c) = cursor.peek() {
		if !is_identifier_continue(c) {
			break;
		}
		lexeme.push(c);
		cursor.read();
	}

	let kind = match lexeme.as_str() {
		"true" | "false" => TokenKind::BoolVal,
		"null" => TokenKind::NullVal,
		_ => TokenKind::keyword_from_lexeme(&lexeme).unwrap_or(TokenKind::Id),
	};
	Ok(Token::new(kind, lexeme, line, column))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(source: &str) -> Vec<TokenKind> {
		tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn skips_whitespace_and_tracks_eos() {
		assert_eq!(kinds("   \n\t "), vec![TokenKind::Eos]);
	}

	#[test]
	fn two_character_operators() {
		assert_eq!(
			kinds("== != <= >= = < >"),
			vec![
				TokenKind::Equal,
				TokenKind::NotEqual,
				TokenKind::LessEq,
				TokenKind::GreaterEq,
				TokenKind::Assign,
				TokenKind::Less,
				TokenKind::Greater,
				TokenKind::Eos,
			]
		);
	}

	#[test]
	fn bare_bang_is_an_error() {
		assert!(tokenize("!x").is_err());
	}

	#[test]
	fn keywords_and_identifiers() {
		let tokens = tokenize("struct Node int x").unwrap();
		assert_eq!(tokens[0].kind, TokenKind::Struct);
		assert_eq!(tokens[1].kind, TokenKind::Id);
		assert_eq!(tokens[1].lexeme, "Node");
		assert_eq!(tokens[2].kind, TokenKind::Int);
		assert_eq!(tokens[3].kind, TokenKind::Id);
	}

	#[test]
	fn leading_zero_is_an_error() {
		assert!(tokenize("03").is_err());
		assert!(tokenize("0").is_ok());
	}

	#[test]
	fn trailing_letter_on_number_is_an_error() {
		assert!(tokenize("3a").is_err());
	}

	#[test]
	fn double_literal() {
		let tokens = tokenize("3.14").unwrap();
		assert_eq!(tokens[0].kind, TokenKind::DoubleVal);
		assert_eq!(tokens[0].lexeme, "3.14");
	}

	#[test]
	fn trailing_decimal_point_is_an_error() {
		assert!(tokenize("3. ").is_err());
	}

	#[test]
	fn unterminated_string_across_newline_is_an_error() {
		assert!(tokenize("\"abc\ndef\"").is_err());
	}

	#[test]
	fn empty_string_literal() {
		let tokens = tokenize("\"\"").unwrap();
		assert_eq!(tokens[0].kind, TokenKind::StringVal);
		assert_eq!(tokens[0].lexeme, "");
	}

	#[test]
	fn line_comment_is_emitted() {
		let tokens = tokenize("// hi\n1").unwrap();
		assert_eq!(tokens[0].kind, TokenKind::Comment);
		assert_eq!(tokens[0].lexeme, " hi");
		assert_eq!(tokens[1].kind, TokenKind::IntVal);
	}

	#[test]
	fn line_and_column_tracking() {
		let tokens = tokenize("1\n22").unwrap();
		assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
		assert_eq!((tokens[1].line, tokens[1].column), (2, 1));
	}
}
