//! Recursive-descent parser: one token of lookahead via `curr()`, turning a token
//! stream into a [`Program`](crate::ast::Program), using a small `match`/`match_any`/
//! `eat` helper vocabulary over the token cursor.

use crate::ast::{
	AssignStmt, BasicIf, CallExpr, DataType, Expr, ForStmt, FunDef, IfStmt, NewRValue, Program, RValue, ReturnStmt, Stmt, StructDef, Term, VarDecl, VarDef, VarRef,
	WhileStmt,
};
use crate::error::ParserError;
use crate::token::{Token, TokenKind};

const BIN_OPS: &[TokenKind] = &[
	TokenKind::Plus,
	TokenKind::Minus,
	TokenKind::Times,
	TokenKind::Divide,
	TokenKind::And,
	TokenKind::Or,
	TokenKind::Equal,
	TokenKind::Less,
	TokenKind::Greater,
	TokenKind::LessEq,
	TokenKind::GreaterEq,
	TokenKind::NotEqual,
];

const BASE_TYPES: &[TokenKind] = &[TokenKind::Int, TokenKind::Double, TokenKind::Bool, TokenKind::String];

pub struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

/// Parses a complete token stream (as produced by [`crate::lexer::tokenize`]) into a
/// [`Program`]. The parser never consumes past `EOS`.
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParserError> {
	Parser::new(tokens).parse_program()
}

impl Parser {
	fn new(tokens: Vec<Token>) -> Self {
		let tokens = tokens.into_iter().filter(|t| t.kind != TokenKind::Comment).collect();
		Self { tokens, pos: 0 }
	}

	fn curr(&self) -> &Token {
		&self.tokens[self.pos.min(self.tokens.len() - 1)]
	}

	fn advance(&mut self) -> Token {
		let token = self.curr().clone();
		if self.pos < self.tokens.len() - 1 {
			self.pos += 1;
		}
		token
	}

	fn is(&self, kind: TokenKind) -> bool {
		self.curr().kind == kind
	}

	fn is_any(&self, kinds: &[TokenKind]) -> bool {
		kinds.contains(&self.curr().kind)
	}

	fn is_bin_op(&self) -> bool {
		self.is_any(BIN_OPS)
	}

	fn error(&self, message: impl Into<String>) -> ParserError {
		let token = self.curr();
		ParserError::new(format!("{} found \"{}\" at line {}, column {}", message.into(), token.lexeme, token.line, token.column))
	}

	fn eat(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParserError> {
		if !self.is(kind) {
			return Err(self.error(message));
		}
		Ok(self.advance())
	}

	fn parse_program(&mut self) -> Result<Program, ParserError> {
		let mut program = Program { structs: Vec::new(), functions: Vec::new() };
		while !self.is(TokenKind::Eos) {
			if self.is(TokenKind::Struct) {
				program.structs.push(self.parse_struct_def()?);
			} else {
				program.functions.push(self.parse_fun_def()?);
			}
		}
		self.eat(TokenKind::Eos, "expecting EOF")?;
		Ok(program)
	}

	fn parse_struct_def(&mut self) -> Result<StructDef, ParserError> {
		self.eat(TokenKind::Struct, "expecting 'struct'")?;
		let name = self.eat(TokenKind::Id, "expecting struct name")?;
		self.eat(TokenKind::LBrace, "expecting '{'")?;
		let mut fields = Vec::new();
		while !self.is(TokenKind::RBrace) {
			let data_type = self.parse_data_type()?;
			let field_name = self.eat(TokenKind::Id, "expecting field name")?;
			self.eat(TokenKind::Semicolon, "expecting ';' after field")?;
			fields.push(VarDef { data_type, name: field_name });
		}
		self.eat(TokenKind::RBrace, "expecting '}'")?;
		Ok(StructDef { name, fields })
	}

	fn parse_fun_def(&mut self) -> Result<FunDef, ParserError> {
		let return_type = if self.is(TokenKind::Void) {
			let token = self.advance();
			DataType::scalar(token)
		} else {
			self.parse_data_type()?
		};
		let name = self.eat(TokenKind::Id, "expecting function name")?;
		self.eat(TokenKind::LParen, "expecting '(' in function definition")?;
		let mut params = Vec::new();
		if !self.is(TokenKind::RParen) {
			params = self.parse_params()?;
		}
		self.eat(TokenKind::RParen, "expecting ')' in function definition")?;
		self.eat(TokenKind::LBrace, "expecting '{' in function definition")?;
		let mut body = Vec::new();
		while !self.is(TokenKind::RBrace) {
			body.push(self.parse_stmt()?);
		}
		self.eat(TokenKind::RBrace, "expecting '}' in function definition")?;
		Ok(FunDef { return_type, name, params, body })
	}

	fn parse_base_type(&mut self) -> Result<Token, ParserError> {
		if !self.is_any(BASE_TYPES) {
			return Err(self.error("expecting a base type"));
		}
		Ok(self.advance())
	}

	/// `data_type := ID | base_type | 'array' (ID | base_type) | 'dict' '(' base_type ',' base_type ')'`.
	/// Unlike the source, this consumes every token the type spans (including the
	/// trailing `)` on `dict`) so every caller can treat it uniformly.
	fn parse_data_type(&mut self) -> Result<DataType, ParserError> {
		if self.is(TokenKind::Id) {
			let type_name = self.advance();
			Ok(DataType::scalar(type_name))
		} else if self.is(TokenKind::Array) {
			self.advance();
			let element_type = if self.is(TokenKind::Id) { self.advance() } else { self.parse_base_type()? };
			Ok(DataType::array(element_type))
		} else if self.is(TokenKind::Dict) {
			self.advance();
			self.eat(TokenKind::LParen, "expecting '(' in dict type")?;
			let key_type = self.parse_base_type()?;
			self.eat(TokenKind::Comma, "expecting ',' in dict type")?;
			let element_type = self.parse_base_type()?;
			self.eat(TokenKind::RParen, "expecting ')' in dict type")?;
			Ok(DataType::dict(key_type, element_type))
		} else {
			let type_name = self.parse_base_type()?;
			Ok(DataType::scalar(type_name))
		}
	}

	fn parse_params(&mut self) -> Result<Vec<VarDef>, ParserError> {
		let mut params = Vec::new();
		loop {
			let data_type = self.parse_data_type()?;
			let name = self.eat(TokenKind::Id, "expecting parameter name")?;
			params.push(VarDef { data_type, name });
			if self.is(TokenKind::Comma) {
				self.advance();
			} else {
				break;
			}
		}
		Ok(params)
	}

	fn parse_stmt(&mut self) -> Result<Stmt, ParserError> {
		if self.is(TokenKind::While) {
			return Ok(Stmt::While(self.parse_while_stmt()?));
		}
		if self.is(TokenKind::If) {
			return Ok(Stmt::If(self.parse_if_stmt()?));
		}
		if self.is(TokenKind::For) {
			return Ok(Stmt::For(self.parse_for_stmt()?));
		}
		if self.is(TokenKind::Return) {
			self.advance();
			let expr = self.parse_expr()?;
			self.eat(TokenKind::Semicolon, "expecting ';' after return")?;
			return Ok(Stmt::Return(ReturnStmt { expr }));
		}
		if self.is(TokenKind::Id) {
			return self.parse_id_lead_stmt();
		}
		let var_decl = self.parse_vdecl()?;
		self.eat(TokenKind::Semicolon, "expecting ';' after variable declaration")?;
		Ok(Stmt::VarDecl(var_decl))
	}

	/// After consuming a leading ID, branches on the next token: `(` is a
	/// call-expression statement; a second bare `ID` means the first one was actually
	/// a struct type name, i.e. this is a struct-typed variable declaration in
	/// disguise; anything else is an assignment path.
	fn parse_id_lead_stmt(&mut self) -> Result<Stmt, ParserError> {
		let id = self.advance();

		if self.is(TokenKind::LParen) {
			let call = self.parse_call_args(id)?;
			self.eat(TokenKind::Semicolon, "expecting ';' after call statement")?;
			return Ok(Stmt::Call(call));
		}

		if self.is(TokenKind::Id) {
			let name = self.advance();
			let mut expr = None;
			if self.is(TokenKind::Assign) {
				self.advance();
				expr = Some(self.parse_expr()?);
			}
			self.eat(TokenKind::Semicolon, "expecting ';' after variable declaration")?;
			return Ok(Stmt::VarDecl(VarDecl { var_def: VarDef { data_type: DataType::scalar(id), name }, expr }));
		}

		let mut lvalue = vec![self.parse_var_ref(id)?];
		while self.is(TokenKind::Dot) {
			self.advance();
			let step_name = self.eat(TokenKind::Id, "expecting field name after '.'")?;
			lvalue.push(self.parse_var_ref(step_name)?);
		}
		self.eat(TokenKind::Assign, "expecting '=' in assignment")?;
		let expr = self.parse_expr()?;
		self.eat(TokenKind::Semicolon, "expecting ';' after assignment")?;
		Ok(Stmt::Assign(AssignStmt { lvalue, expr }))
	}

	/// Parses one path step's optional `[expr]` suffix given its already-consumed name.
	fn parse_var_ref(&mut self, name: Token) -> Result<VarRef, ParserError> {
		let array_expr = if self.is(TokenKind::LBracket) {
			self.advance();
			let expr = self.parse_expr()?;
			self.eat(TokenKind::RBracket, "expecting ']'")?;
			Some(Box::new(expr))
		} else {
			None
		};
		Ok(VarRef { name, array_expr })
	}

	fn parse_vdecl(&mut self) -> Result<VarDecl, ParserError> {
		let data_type = self.parse_data_type()?;
		let name = self.eat(TokenKind::Id, "expecting variable name")?;
		let mut expr = None;
		if self.is(TokenKind::Assign) {
			self.advance();
			expr = Some(self.parse_expr()?);
		}
		Ok(VarDecl { var_def: VarDef { data_type, name }, expr })
	}

	fn parse_call_args(&mut self, function_name: Token) -> Result<CallExpr, ParserError> {
		self.eat(TokenKind::LParen, "expecting '(' in call")?;
		let mut args = Vec::new();
		if !self.is(TokenKind::RParen) {
			args.push(self.parse_expr()?);
			while self.is(TokenKind::Comma) {
				self.advance();
				args.push(self.parse_expr()?);
			}
		}
		self.eat(TokenKind::RParen, "expecting ')' in call")?;
		Ok(CallExpr { function_name, args })
	}

	fn parse_expr(&mut self) -> Result<Expr, ParserError> {
		let not_op = if self.is(TokenKind::Not) {
			self.advance();
			true
		} else {
			false
		};

		let first = if self.is(TokenKind::LParen) {
			self.advance();
			let inner = self.parse_expr()?;
			self.eat(TokenKind::RParen, "expecting ')' to close expression")?;
			Term::ComplexTerm(Box::new(inner))
		} else {
			Term::SimpleTerm(self.parse_rvalue()?)
		};

		let (op, rest) = if self.is_bin_op() {
			let op = self.advance();
			let rest = self.parse_expr()?;
			(Some(op), Some(Box::new(rest)))
		} else {
			(None, None)
		};

		Ok(Expr { not_op, first, op, rest })
	}

	fn parse_rvalue(&mut self) -> Result<RValue, ParserError> {
		if self.is_any(&[TokenKind::IntVal, TokenKind::DoubleVal, TokenKind::BoolVal, TokenKind::StringVal, TokenKind::NullVal]) {
			return Ok(RValue::SimpleRValue(self.advance()));
		}
		if self.is(TokenKind::New) {
			return Ok(RValue::NewRValue(self.parse_new_rvalue()?));
		}

		let id = self.eat(TokenKind::Id, "expecting an identifier, literal, or 'new'")?;
		if self.is(TokenKind::LParen) {
			return Ok(RValue::CallExpr(self.parse_call_args(id)?));
		}

		let mut path = vec![self.parse_var_ref(id)?];
		while self.is(TokenKind::Dot) {
			self.advance();
			let step_name = self.eat(TokenKind::Id, "expecting field name after '.'")?;
			path.push(self.parse_var_ref(step_name)?);
		}
		Ok(RValue::VarRValue(path))
	}

	/// `new_rvalue := 'new' (ID ( '(' arg_list? ')' | '[' expr ']' ) | base_type '[' expr ']' | 'dict' '(' ')')`.
	fn parse_new_rvalue(&mut self) -> Result<NewRValue, ParserError> {
		self.eat(TokenKind::New, "expecting 'new'")?;

		if self.is(TokenKind::Id) {
			let type_name = self.advance();
			if self.is(TokenKind::LParen) {
				self.advance();
				let mut args = Vec::new();
				if !self.is(TokenKind::RParen) {
					args.push(self.parse_expr()?);
					while self.is(TokenKind::Comma) {
						self.advance();
						args.push(self.parse_expr()?);
					}
				}
				self.eat(TokenKind::RParen, "expecting ')' in struct construction")?;
				return Ok(NewRValue::Struct { type_name, args });
			}
			self.eat(TokenKind::LBracket, "expecting '[' in array construction")?;
			let size_expr = Box::new(self.parse_expr()?);
			self.eat(TokenKind::RBracket, "expecting ']' in array construction")?;
			return Ok(NewRValue::Array { type_name, size_expr });
		}

		if self.is(TokenKind::Dict) {
			self.advance();
			self.eat(TokenKind::LParen, "expecting '(' in dict construction")?;
			self.eat(TokenKind::RParen, "expecting ')' in dict construction")?;
			return Ok(NewRValue::Dict);
		}

		let type_name = self.parse_base_type()?;
		self.eat(TokenKind::LBracket, "expecting '[' in array construction")?;
		let size_expr = Box::new(self.parse_expr()?);
		self.eat(TokenKind::RBracket, "expecting ']' in array construction")?;
		Ok(NewRValue::Array { type_name, size_expr })
	}

	fn parse_while_stmt(&mut self) -> Result<WhileStmt, ParserError> {
		self.eat(TokenKind::While, "expecting 'while'")?;
		self.eat(TokenKind::LParen, "expecting '(' in while statement")?;
		let condition = self.parse_expr()?;
		self.eat(TokenKind::RParen, "expecting ')' in while statement")?;
		let stmts = self.parse_block()?;
		Ok(WhileStmt { condition, stmts })
	}

	fn parse_block(&mut self) -> Result<Vec<Stmt>, ParserError> {
		self.eat(TokenKind::LBrace, "expecting '{'")?;
		let mut stmts = Vec::new();
		while !self.is(TokenKind::RBrace) {
			stmts.push(self.parse_stmt()?);
		}
		self.eat(TokenKind::RBrace, "expecting '}'")?;
		Ok(stmts)
	}

	fn parse_if_stmt(&mut self) -> Result<IfStmt, ParserError> {
		self.eat(TokenKind::If, "expecting 'if'")?;
		self.eat(TokenKind::LParen, "expecting '(' in if statement")?;
		let condition = self.parse_expr()?;
		self.eat(TokenKind::RParen, "expecting ')' in if statement")?;
		let stmts = self.parse_block()?;
		let if_part = BasicIf { condition, stmts };

		let mut else_ifs = Vec::new();
		let mut else_stmts = Vec::new();
		loop {
			if self.is(TokenKind::Elseif) {
				self.advance();
				self.eat(TokenKind::LParen, "expecting '(' in elseif")?;
				let condition = self.parse_expr()?;
				self.eat(TokenKind::RParen, "expecting ')' in elseif")?;
				let stmts = self.parse_block()?;
				else_ifs.push(BasicIf { condition, stmts });
			} else if self.is(TokenKind::Else) {
				self.advance();
				else_stmts = self.parse_block()?;
				break;
			} else {
				break;
			}
		}

		Ok(IfStmt { if_part, else_ifs, else_stmts })
	}

	fn parse_for_stmt(&mut self) -> Result<ForStmt, ParserError> {
		self.eat(TokenKind::For, "expecting 'for'")?;
		self.eat(TokenKind::LParen, "expecting '(' in for statement")?;
		let var_decl = self.parse_vdecl()?;
		self.eat(TokenKind::Semicolon, "expecting ';' after for-loop initializer")?;
		let condition = self.parse_expr()?;
		self.eat(TokenKind::Semicolon, "expecting ';' after for-loop condition")?;
		let assign_stmt = self.parse_assign_stmt()?;
		self.eat(TokenKind::RParen, "expecting ')' in for statement")?;
		let stmts = self.parse_block()?;
		Ok(ForStmt { var_decl, condition, assign_stmt, stmts })
	}

	/// A bare assignment (no trailing `;`), used only by the for-loop update clause.
	fn parse_assign_stmt(&mut self) -> Result<AssignStmt, ParserError> {
		let head = self.eat(TokenKind::Id, "expecting identifier in for-loop update")?;
		let mut lvalue = vec![self.parse_var_ref(head)?];
		while self.is(TokenKind::Dot) {
			self.advance();
			let step_name = self.eat(TokenKind::Id, "expecting field name after '.'")?;
			lvalue.push(self.parse_var_ref(step_name)?);
		}
		self.eat(TokenKind::Assign, "expecting '=' in for-loop update")?;
		let expr = self.parse_expr()?;
		Ok(AssignStmt { lvalue, expr })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;

	fn parse_source(source: &str) -> Program {
		parse(tokenize(source).unwrap()).unwrap()
	}

	#[test]
	fn parses_empty_main() {
		let program = parse_source("void main() { }");
		assert_eq!(program.functions.len(), 1);
		assert_eq!(program.functions[0].name.lexeme, "main");
	}

	#[test]
	fn parses_struct_with_fields() {
		let program = parse_source("struct Node { int val; Node next; }");
		assert_eq!(program.structs.len(), 1);
		assert_eq!(program.structs[0].fields.len(), 2);
	}

	#[test]
	fn parses_right_associative_expression_chain() {
		let program = parse_source("void main() { print(3 + (6 - 5) + (5 * 2) + (2 / 2)); }");
		let Stmt::Call(call) = &program.functions[0].body[0] else { panic!("expected call") };
		assert_eq!(call.function_name.lexeme, "print");
		assert!(call.args[0].rest.is_some());
	}

	#[test]
	fn struct_typed_var_decl_disguised_as_assignment() {
		let program = parse_source("void main() { Node r = new Node(10, null); }");
		assert!(matches!(program.functions[0].body[0], Stmt::VarDecl(_)));
	}

	#[test]
	fn while_loop_and_assignment() {
		let program = parse_source("void main() { int i = 0; while (i < 5) { i = i + 1; } }");
		assert_eq!(program.functions[0].body.len(), 2);
	}

	#[test]
	fn dict_declaration_roundtrip() {
		let program = parse_source(r#"void main() { dict(string,int) d = new dict(); d["k"] = 5; }"#);
		assert_eq!(program.functions[0].body.len(), 2);
	}

	#[test]
	fn if_elseif_else_chain() {
		let program = parse_source("void main() { if (true) { } elseif (false) { } else { } }");
		let Stmt::If(if_stmt) = &program.functions[0].body[0] else { panic!("expected if") };
		assert_eq!(if_stmt.else_ifs.len(), 1);
		assert!(if_stmt.else_stmts.is_empty());
	}

	#[test]
	fn for_loop() {
		let program = parse_source("void main() { for (int i = 0; i < 5; i = i + 1) { } }");
		assert!(matches!(program.functions[0].body[0], Stmt::For(_)));
	}

	#[test]
	fn missing_semicolon_is_a_parser_error() {
		assert!(parse(tokenize("void main() { int x = 1 }").unwrap()).is_err());
	}
}
