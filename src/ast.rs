//! The MyPL abstract syntax tree.
//!
//! Represented as tagged sum types (one variant per node kind) rather than a class
//! hierarchy walked by a visitor: this gives exhaustive case coverage at compile time
//! via `match`, and every later stage (checker, codegen) dispatches with a plain
//! `match` instead of double-dispatch.

use crate::token::Token;

/// A type annotation: either a base type, a declared struct name, `array T`, or
/// `dict(K, V)`. At most one of `is_array`/`is_dict` may be set; for dicts both
/// `key_type` and `element_type` (here reused as the value type) are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
	pub is_array: bool,
	pub is_dict: bool,
	pub key_type: Option<Token>,
	pub element_type: Option<Token>,
	pub type_name: Token,
}

impl DataType {
	#[must_use]
	pub fn scalar(type_name: Token) -> Self {
		Self { is_array: false, is_dict: false, key_type: None, element_type: None, type_name }
	}

	#[must_use]
	pub fn array(element_type: Token) -> Self {
		Self {
			is_array: true,
			is_dict: false,
			key_type: None,
			element_type: Some(element_type.clone()),
			type_name: element_type,
		}
	}

	/// `type_name` is a synthetic `dict` token rather than the value type, so that
	/// generic type-compatibility checks (binary expressions, return/assignment
	/// matching) see a dict as its own distinct type instead of colliding with
	/// whatever its value type happens to be.
	#[must_use]
	pub fn dict(key_type: Token, element_type: Token) -> Self {
		let type_name = Token::new(crate::token::TokenKind::Dict, "dict", key_type.line, key_type.column);
		Self { is_array: false, is_dict: true, key_type: Some(key_type), element_type: Some(element_type), type_name }
	}

	/// A human-readable rendering used in error messages, e.g. `array int` or
	/// `dict(string, int)`.
	#[must_use]
	pub fn display_name(&self) -> String {
		if self.is_array {
			format!("array {}", self.type_name.lexeme)
		} else if self.is_dict {
			format!(
				"dict({}, {})",
				self.key_type.as_ref().map_or("?", |t| t.lexeme.as_str()),
				self.element_type.as_ref().map_or("?", |t| t.lexeme.as_str())
			)
		} else {
			self.type_name.lexeme.clone()
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDef {
	pub data_type: DataType,
	pub name: Token,
}

#[derive(Debug, Clone)]
pub struct StructDef {
	pub name: Token,
	pub fields: Vec<VarDef>,
}

#[derive(Debug, Clone)]
pub struct FunDef {
	pub return_type: DataType,
	pub name: Token,
	pub params: Vec<VarDef>,
	pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Program {
	pub structs: Vec<StructDef>,
	pub functions: Vec<FunDef>,
}

/// One step of an lvalue/rvalue path: a bare name, optionally indexed by `[expr]`.
/// A sequence of these joined by `.` forms a full path.
#[derive(Debug, Clone)]
pub struct VarRef {
	pub name: Token,
	pub array_expr: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct AssignStmt {
	pub lvalue: Vec<VarRef>,
	pub expr: Expr,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
	pub var_def: VarDef,
	pub expr: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct BasicIf {
	pub condition: Expr,
	pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
	pub if_part: BasicIf,
	pub else_ifs: Vec<BasicIf>,
	pub else_stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
	pub condition: Expr,
	pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
	pub var_decl: VarDecl,
	pub condition: Expr,
	pub assign_stmt: AssignStmt,
	pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
	pub expr: Expr,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
	pub function_name: Token,
	pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
	VarDecl(VarDecl),
	Assign(AssignStmt),
	If(IfStmt),
	While(WhileStmt),
	For(ForStmt),
	Return(ReturnStmt),
	Call(CallExpr),
}

/// An rvalue: something that produces a value. `VarRValue` is a non-empty path of
/// [`VarRef`] steps; `NewRValue` covers struct/array/dict construction.
#[derive(Debug, Clone)]
pub enum RValue {
	SimpleRValue(Token),
	NewRValue(NewRValue),
	CallExpr(CallExpr),
	VarRValue(Vec<VarRef>),
}

#[derive(Debug, Clone)]
pub enum NewRValue {
	Struct { type_name: Token, args: Vec<Expr> },
	Array { type_name: Token, size_expr: Box<Expr> },
	/// `new dict()` carries no type arguments of its own; the checker resolves its
	/// key/value types from the declared type of whatever it's assigned into.
	Dict,
}

/// A term in an expression chain: either a bare rvalue, or a fully parenthesized
/// sub-expression. The grammar admits only explicit grouping, never operator
/// precedence.
#[derive(Debug, Clone)]
pub enum Term {
	SimpleTerm(RValue),
	ComplexTerm(Box<Expr>),
}

/// A right-associative chain of operators: `not? term (op expr)?`. There is no
/// precedence climbing; every binary operator has exactly the same "tightness", and
/// grouping is only ever explicit via parentheses (a `ComplexTerm`).
#[derive(Debug, Clone)]
pub struct Expr {
	pub not_op: bool,
	pub first: Term,
	pub op: Option<Token>,
	pub rest: Option<Box<Expr>>,
}
