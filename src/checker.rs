//! The semantic checker: registers every struct/function signature, then walks each
//! struct's fields and each function's body checking names and types, as a plain
//! `match`-dispatching set of methods over a `Checker` struct.
//!
//! Expression-checking methods set `self.curr_type` as a side effect rather than
//! returning it: several call sites need the type of a just-checked sub-expression
//! without threading it back through every recursive call (e.g. a binary expression
//! needs both operands' types before it can decide the result type).

use std::collections::HashMap;

use crate::ast::{
	AssignStmt, CallExpr, DataType, Expr, ForStmt, FunDef, IfStmt, NewRValue, Program, RValue, ReturnStmt, Stmt, StructDef, Term, VarDecl, VarDef,
	VarRef, WhileStmt,
};
use crate::error::StaticError;
use crate::symbol_table::SymbolTable;
use crate::token::{Token, TokenKind};

const BUILT_INS: &[&str] = &["print", "input", "itos", "itod", "dtos", "dtoi", "stoi", "stod", "length", "get", "keys", "in"];

/// Names accepted as a bare `data_type` lexeme besides `void` and a known struct name.
/// `dict` is included because a dict `DataType`'s `type_name` is the synthetic `dict`
/// marker token (see `ast::DataType::dict`), not its value type.
const BASE_TYPE_NAMES: &[&str] = &["int", "double", "bool", "string", "dict"];

const MATH_OPS: &[TokenKind] = &[TokenKind::Plus, TokenKind::Minus, TokenKind::Times, TokenKind::Divide];
const COMPARISON_OPS: &[TokenKind] = &[TokenKind::Less, TokenKind::Greater, TokenKind::LessEq, TokenKind::GreaterEq, TokenKind::NotEqual, TokenKind::Equal];
const BOOL_OPS: &[TokenKind] = &[TokenKind::And, TokenKind::Or, TokenKind::NotEqual, TokenKind::Equal];

/// Checks a whole program, returning the first `StaticError` encountered. Like the
/// rest of the pipeline, checking fails fast: there is no error recovery or
/// accumulation of multiple diagnostics.
pub fn check(program: &Program) -> Result<(), StaticError> {
	Checker::new().check_program(program)
}

struct Checker {
	structs: HashMap<String, StructDef>,
	functions: HashMap<String, FunDef>,
	symbol_table: SymbolTable,
	curr_type: Option<DataType>,
}

impl Checker {
	fn new() -> Self {
		Self { structs: HashMap::new(), functions: HashMap::new(), symbol_table: SymbolTable::new(), curr_type: None }
	}

	fn error(&self, msg: impl Into<String>, token: &Token) -> StaticError {
		StaticError::at(msg.into(), token.line, token.column)
	}

	fn curr_type(&self) -> DataType {
		self.curr_type.clone().expect("a prior check_expr/check_rvalue call always sets curr_type before it is read")
	}

	fn check_program(&mut self, program: &Program) -> Result<(), StaticError> {
		for struct_def in &program.structs {
			if self.structs.contains_key(&struct_def.name.lexeme) {
				return Err(self.error(format!("duplicate {} definition", struct_def.name.lexeme), &struct_def.name));
			}
			self.structs.insert(struct_def.name.lexeme.clone(), struct_def.clone());
		}
		for fun_def in &program.functions {
			let fun_name = fun_def.name.lexeme.clone();
			if self.functions.contains_key(&fun_name) {
				return Err(self.error(format!("duplicate {fun_name} definition"), &fun_def.name));
			}
			if BUILT_INS.contains(&fun_name.as_str()) {
				return Err(self.error("redefining built-in function", &fun_def.name));
			}
			if fun_name == "main" && fun_def.return_type.type_name.lexeme != "void" {
				return Err(self.error("main without void type", &fun_def.return_type.type_name));
			}
			if fun_name == "main" && !fun_def.params.is_empty() {
				return Err(self.error("main function with parameters", &fun_def.name));
			}
			self.functions.insert(fun_name, fun_def.clone());
		}
		if !self.functions.contains_key("main") {
			return Err(StaticError::new("missing main function"));
		}

		for struct_def in self.structs.values().cloned().collect::<Vec<_>>() {
			self.check_struct_def(&struct_def)?;
		}
		for fun_def in self.functions.values().cloned().collect::<Vec<_>>() {
			self.check_fun_def(&fun_def)?;
		}
		Ok(())
	}

	fn check_struct_def(&mut self, struct_def: &StructDef) -> Result<(), StaticError> {
		self.symbol_table.push_environment();
		for field in &struct_def.fields {
			self.check_var_def(field)?;
		}
		self.symbol_table.pop_environment();
		Ok(())
	}

	/// Registers a struct field or the declared type of a for-loop/var-decl name,
	/// checking both that the type is known and that the name isn't already bound
	/// in the current scope. Not used for function parameters, which the source
	/// only checks for duplicate names (see `check_fun_def`).
	fn check_var_def(&mut self, var_def: &VarDef) -> Result<(), StaticError> {
		let typ = var_def.data_type.type_name.lexeme.as_str();
		let name = &var_def.name.lexeme;
		if !BASE_TYPE_NAMES.contains(&typ) && !self.structs.contains_key(typ) {
			return Err(self.error(format!("Unknown Type {typ}"), &var_def.data_type.type_name));
		}
		if self.symbol_table.exists_in_curr_env(name) {
			return Err(self.error(format!("Duplicate name {name}"), &var_def.name));
		}
		self.symbol_table.add(name.clone(), var_def.data_type.clone());
		Ok(())
	}

	fn check_fun_def(&mut self, fun_def: &FunDef) -> Result<(), StaticError> {
		self.symbol_table.push_environment();

		let return_name = fun_def.return_type.type_name.lexeme.as_str();
		let return_ok = return_name == "void" || BASE_TYPE_NAMES.contains(&return_name) || self.structs.contains_key(return_name);
		if !return_ok {
			return Err(self.error(format!("Invalid return type {return_name}"), &fun_def.return_type.type_name));
		}
		self.symbol_table.add("return", fun_def.return_type.clone());

		for param in &fun_def.params {
			if self.symbol_table.exists_in_curr_env(&param.name.lexeme) {
				return Err(self.error(format!("duplicate param name used in {}", fun_def.name.lexeme), &param.name));
			}
			self.symbol_table.add(param.name.lexeme.clone(), param.data_type.clone());
		}

		for stmt in &fun_def.body {
			self.check_stmt(stmt)?;
		}

		self.symbol_table.pop_environment();
		Ok(())
	}

	fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), StaticError> {
		match stmt {
			Stmt::VarDecl(var_decl) => self.check_var_decl(var_decl),
			Stmt::Assign(assign) => self.check_assign_stmt(assign),
			Stmt::If(if_stmt) => self.check_if_stmt(if_stmt),
			Stmt::While(while_stmt) => self.check_while_stmt(while_stmt),
			Stmt::For(for_stmt) => self.check_for_stmt(for_stmt),
			Stmt::Return(return_stmt) => self.check_return_stmt(return_stmt),
			Stmt::Call(call) => self.check_call_expr(call).map(|()| ()),
		}
	}

	fn check_return_stmt(&mut self, return_stmt: &ReturnStmt) -> Result<(), StaticError> {
		let return_type = self.symbol_table.get("return").cloned().expect("check_fun_def always binds 'return' first");
		self.check_expr(&return_stmt.expr)?;
		let expr_type = self.curr_type();
		if return_type.type_name.kind != expr_type.type_name.kind && expr_type.type_name.kind != TokenKind::Void {
			return Err(self.error(
				format!("Return type mismatch. Received {}, expecting {}", expr_type.type_name.lexeme, return_type.type_name.lexeme),
				&expr_type.type_name,
			));
		}
		Ok(())
	}

	fn check_var_decl(&mut self, var_decl: &VarDecl) -> Result<(), StaticError> {
		let lhs_type = &var_decl.var_def.data_type;
		let name = var_decl.var_def.name.lexeme.clone();

		let Some(expr) = &var_decl.expr else {
			if self.symbol_table.exists_in_curr_env(&name) {
				return Err(self.error(format!("Duplicate variable declarations for {} {name}", lhs_type.display_name()), &var_decl.var_def.name));
			}
			self.symbol_table.add(name, lhs_type.clone());
			return Ok(());
		};

		self.check_expr(expr)?;
		let rhs_type = self.curr_type();
		if lhs_type.type_name.kind != rhs_type.type_name.kind && rhs_type.type_name.kind != TokenKind::Void {
			return Err(self.error(
				format!("Mismatch of types {} and {}", lhs_type.type_name.lexeme, rhs_type.type_name.lexeme),
				&lhs_type.type_name,
			));
		}
		// Cross-assigning one already-typed dict variable into a declared dict of
		// different key/value types is rejected outright (a fresh `new dict()`
		// literal has no key/value types of its own yet — `rhs_type.is_dict` is
		// false for it — so this never fires for that case; see DESIGN.md).
		if lhs_type.is_dict && rhs_type.is_dict {
			let keys_match = lhs_type.key_type.as_ref().map(|t| t.kind) == rhs_type.key_type.as_ref().map(|t| t.kind);
			let elems_match = lhs_type.element_type.as_ref().map(|t| t.kind) == rhs_type.element_type.as_ref().map(|t| t.kind);
			if !keys_match || !elems_match {
				return Err(self.error(
					format!("Mismatch of dict key/value types for {} and {}", lhs_type.display_name(), rhs_type.display_name()),
					&lhs_type.type_name,
				));
			}
		}

		if self.symbol_table.exists_in_curr_env(&name) {
			let existing = self.symbol_table.get(&name).cloned().expect("just checked exists_in_curr_env");
			if existing.type_name.kind != lhs_type.type_name.kind {
				return Err(self.error(format!("Duplicate variable declarations for {} {name}", lhs_type.type_name.lexeme), &lhs_type.type_name));
			}
			self.symbol_table.add(name, existing);
		} else {
			if !lhs_type.is_dict && lhs_type.is_array != rhs_type.is_array && rhs_type.type_name.kind != TokenKind::Void {
				return Err(self.error("Mismatch of array declaration", &rhs_type.type_name));
			}
			self.symbol_table.add(name, lhs_type.clone());
		}
		Ok(())
	}

	fn check_assign_stmt(&mut self, assign: &AssignStmt) -> Result<(), StaticError> {
		let first = &assign.lvalue[0];
		if !self.symbol_table.exists(&first.name.lexeme) {
			return Err(self.error(format!("Use before def {}", first.name.lexeme), &first.name));
		}
		let mut lhs_type = self.symbol_table.get(&first.name.lexeme).cloned().expect("just checked exists");

		if lhs_type.is_dict {
			if let Some(array_expr) = &first.array_expr {
				self.check_expr(array_expr)?;
				let idx_type = self.curr_type();
				let key_kind = lhs_type.key_type.as_ref().map(|t| t.kind);
				if Some(idx_type.type_name.kind) != key_kind {
					return Err(self.error("Invalid type for indexing dictionary", &idx_type.type_name));
				}
				let element_type = lhs_type.element_type.clone().expect("dict DataType always carries an element type");
				lhs_type = DataType::scalar(element_type);
			}
		}

		for step in &assign.lvalue[1..] {
			if let Some(array_expr) = &step.array_expr {
				self.check_expr(array_expr)?;
				let idx_type = self.curr_type();
				if idx_type.type_name.kind != TokenKind::Int {
					return Err(self.error("Invalid type for indexing array", &idx_type.type_name));
				}
			}
			if let Some(struct_def) = self.structs.get(&lhs_type.type_name.lexeme).cloned() {
				let Some(field) = struct_def.fields.iter().find(|f| f.name.lexeme == step.name.lexeme) else {
					return Err(self.error(format!("field {} not in struct type {}", step.name.lexeme, struct_def.name.lexeme), &step.name));
				};
				lhs_type = field.data_type.clone();
				let assigns_fresh_array = matches!(&assign.expr.first, Term::SimpleTerm(RValue::NewRValue(_)));
				if lhs_type.is_array && step.array_expr.is_none() && !assigns_fresh_array {
					return Err(self.error(format!("No array expression given for array type {}", step.name.lexeme), &step.name));
				}
			}
		}

		self.check_expr(&assign.expr)?;
		let rhs_type = self.curr_type();
		if lhs_type.type_name.kind != rhs_type.type_name.kind && rhs_type.type_name.kind != TokenKind::Void {
			return Err(self.error(format!("Mismatch of types {} and {}", lhs_type.type_name.lexeme, rhs_type.type_name.lexeme), &rhs_type.type_name));
		}
		Ok(())
	}

	fn check_while_stmt(&mut self, while_stmt: &WhileStmt) -> Result<(), StaticError> {
		self.symbol_table.push_environment();
		self.check_condition(&while_stmt.condition, "while")?;
		for stmt in &while_stmt.stmts {
			self.check_stmt(stmt)?;
		}
		self.symbol_table.pop_environment();
		Ok(())
	}

	fn check_for_stmt(&mut self, for_stmt: &ForStmt) -> Result<(), StaticError> {
		self.symbol_table.push_environment();
		self.check_var_decl(&for_stmt.var_decl)?;
		self.check_condition(&for_stmt.condition, "for")?;
		// The update clause (`for_stmt.assign_stmt`) is never type-checked here.
		for stmt in &for_stmt.stmts {
			self.check_stmt(stmt)?;
		}
		self.symbol_table.pop_environment();
		Ok(())
	}

	fn check_if_stmt(&mut self, if_stmt: &IfStmt) -> Result<(), StaticError> {
		self.symbol_table.push_environment();
		self.check_condition(&if_stmt.if_part.condition, "if")?;
		for stmt in &if_stmt.if_part.stmts {
			self.check_stmt(stmt)?;
		}
		self.symbol_table.pop_environment();

		for else_if in &if_stmt.else_ifs {
			self.symbol_table.push_environment();
			self.check_condition(&else_if.condition, "elseif")?;
			for stmt in &else_if.stmts {
				self.check_stmt(stmt)?;
			}
			self.symbol_table.pop_environment();
		}

		if !if_stmt.else_stmts.is_empty() {
			self.symbol_table.push_environment();
			for stmt in &if_stmt.else_stmts {
				self.check_stmt(stmt)?;
			}
			self.symbol_table.pop_environment();
		}
		Ok(())
	}

	fn check_condition(&mut self, condition: &Expr, stmt_kind: &str) -> Result<(), StaticError> {
		self.check_expr(condition)?;
		let cond_type = self.curr_type();
		if cond_type.type_name.kind != TokenKind::Bool || cond_type.is_array {
			return Err(self.error(format!("non boolean expression in condition of {stmt_kind} statement"), &cond_type.type_name));
		}
		Ok(())
	}

	fn check_call_expr(&mut self, call: &CallExpr) -> Result<(), StaticError> {
		let name = call.function_name.lexeme.as_str();
		if !self.functions.contains_key(name) && !BUILT_INS.contains(&name) {
			return Err(self.error(format!("Undeclared Function {name}"), &call.function_name));
		}

		if BUILT_INS.contains(&name) {
			return self.check_builtin_call(call);
		}

		let func = self.functions.get(name).cloned().expect("just checked exists");
		if call.args.len() != func.params.len() {
			return Err(self.error(format!("Arguments do not match function definition of {}", func.name.lexeme), &call.function_name));
		}
		for (arg, param) in call.args.iter().zip(&func.params) {
			self.check_expr(arg)?;
			let arg_type = self.curr_type();
			if param.data_type.type_name.kind != arg_type.type_name.kind && arg_type.type_name.kind != TokenKind::Void {
				return Err(self.error(
					format!(
						"Mismatch of types in arguments passed to function {} expecting {} received {}",
						func.name.lexeme, param.data_type.type_name.lexeme, arg_type.type_name.lexeme
					),
					&param.data_type.type_name,
				));
			}
		}
		let type_name = Token::new(func.return_type.type_name.kind, func.return_type.type_name.lexeme.clone(), call.function_name.line, call.function_name.column);
		self.curr_type = Some(DataType { is_array: func.return_type.is_array, is_dict: false, key_type: None, element_type: None, type_name });
		Ok(())
	}

	fn check_builtin_call(&mut self, call: &CallExpr) -> Result<(), StaticError> {
		let line = call.function_name.line;
		let column = call.function_name.column;
		let name = call.function_name.lexeme.as_str();

		let (is_array, type_token) = match name {
			"print" => {
				if call.args.len() > 1 {
					return Err(self.error("too many arguments for built-in function 'print'", &call.function_name));
				}
				self.check_expr(&call.args[0])?;
				let arg_type = self.curr_type();
				let accepted = [TokenKind::String, TokenKind::Bool, TokenKind::Double, TokenKind::Int, TokenKind::Void];
				if !accepted.contains(&arg_type.type_name.kind) || arg_type.is_array {
					return Err(self.error(
						format!("arguments of type {} not allowed for built-in function 'print'", arg_type.type_name.lexeme),
						&arg_type.type_name,
					));
				}
				(false, Token::new(TokenKind::Void, "void", line, column))
			}
			"input" => {
				if !call.args.is_empty() {
					return Err(self.error("too many arguments for built-in function 'input'", &call.function_name));
				}
				(false, Token::new(TokenKind::String, "string", line, column))
			}
			"itos" => (false, self.check_unary_builtin(call, TokenKind::Int, "int", TokenKind::String, "string")?),
			"dtos" => (false, self.check_unary_builtin(call, TokenKind::Double, "double", TokenKind::String, "string")?),
			"stoi" => (false, self.check_unary_builtin(call, TokenKind::String, "string", TokenKind::Int, "int")?),
			"dtoi" => (false, self.check_unary_builtin(call, TokenKind::Double, "double", TokenKind::Int, "int")?),
			"stod" => (false, self.check_unary_builtin(call, TokenKind::String, "string", TokenKind::Double, "double")?),
			"itod" => (false, self.check_unary_builtin(call, TokenKind::Int, "int", TokenKind::Double, "double")?),
			"length" => {
				if call.args.len() != 1 {
					return Err(self.error("too many arguments for built-in function 'length'", &call.function_name));
				}
				self.check_expr(&call.args[0])?;
				let arg_type = self.curr_type();
				let scalar_kinds = [TokenKind::Bool, TokenKind::Int, TokenKind::Double];
				let accepted_kinds = [TokenKind::String, TokenKind::Bool, TokenKind::Double, TokenKind::Int];
				if (scalar_kinds.contains(&arg_type.type_name.kind) && !arg_type.is_array) || !accepted_kinds.contains(&arg_type.type_name.kind) {
					return Err(self.error(format!("cannot find length for type {}", arg_type.type_name.lexeme), &arg_type.type_name));
				}
				(false, Token::new(TokenKind::Int, "int", line, column))
			}
			"get" => {
				if call.args.len() != 2 {
					return Err(self.error("too many arguments for built-in function 'get'", &call.function_name));
				}
				self.check_expr(&call.args[0])?;
				let first_arg = self.curr_type();
				self.check_expr(&call.args[1])?;
				let second_arg = self.curr_type();
				if first_arg.type_name.kind != TokenKind::Int {
					return Err(self.error(
						format!("expecting type int for first argument, received {} for built-in function 'get'", first_arg.type_name.lexeme),
						&call.function_name,
					));
				}
				if second_arg.type_name.kind != TokenKind::String || second_arg.is_array {
					return Err(self.error("expecting type string for second argument for built-in function 'get'", &call.function_name));
				}
				(false, Token::new(TokenKind::String, "string", line, column))
			}
			"keys" => {
				if call.args.len() != 1 {
					return Err(self.error("too many arguments for built-in function 'keys'", &call.function_name));
				}
				self.check_expr(&call.args[0])?;
				let arg_type = self.curr_type();
				if !arg_type.is_dict {
					return Err(self.error(
						format!("expecting a dict argument for built-in function 'keys', received {}", arg_type.type_name.lexeme),
						&call.function_name,
					));
				}
				let key_type = arg_type.key_type.clone().expect("dict DataType always carries a key type");
				(true, Token::new(key_type.kind, key_type.lexeme, line, column))
			}
			"in" => {
				if call.args.len() != 2 {
					return Err(self.error("too many arguments for built-in function 'in'", &call.function_name));
				}
				self.check_expr(&call.args[0])?;
				let arg_type = self.curr_type();
				if !arg_type.is_dict {
					return Err(self.error(
						format!("expecting a dict argument for built-in function 'in', received {}", arg_type.type_name.lexeme),
						&call.function_name,
					));
				}
				self.check_expr(&call.args[1])?;
				(false, Token::new(TokenKind::Bool, "bool", line, column))
			}
			_ => unreachable!("BUILT_INS and this match must stay in sync"),
		};

		self.curr_type = Some(DataType { is_array, is_dict: false, key_type: None, element_type: None, type_name: type_token });
		Ok(())
	}

	fn check_unary_builtin(
		&mut self,
		call: &CallExpr,
		expected_kind: TokenKind,
		expected_name: &str,
		result_kind: TokenKind,
		result_name: &str,
	) -> Result<Token, StaticError> {
		if call.args.len() != 1 {
			return Err(self.error(format!("too many arguments for built-in function '{}'", call.function_name.lexeme), &call.function_name));
		}
		self.check_expr(&call.args[0])?;
		let arg_type = self.curr_type();
		if arg_type.type_name.kind != expected_kind {
			return Err(self.error(format!("expecting type {expected_name}, received type {}", arg_type.type_name.lexeme), &call.function_name));
		}
		Ok(Token::new(result_kind, result_name, call.function_name.line, call.function_name.column))
	}

	fn check_expr(&mut self, expr: &Expr) -> Result<(), StaticError> {
		self.check_term(&expr.first)?;
		let lhs_type = self.curr_type();

		if let Some(op) = &expr.op {
			let rest = expr.rest.as_ref().expect("parser always pairs an operator with a right-hand expr");
			self.check_expr(rest)?;
			let rhs_type = self.curr_type();
			self.curr_type = Some(DataType::scalar(self.check_binary_op(&lhs_type, &rhs_type, op)?));
		}

		if expr.not_op {
			let curr = self.curr_type();
			if curr.type_name.kind != TokenKind::Bool {
				return Err(self.error(
					format!("Cannot use not operator on a non boolean expression of type {}", lhs_type.type_name.lexeme),
					&lhs_type.type_name,
				));
			}
			let token = Token::new(TokenKind::Bool, "bool", curr.type_name.line, curr.type_name.column);
			self.curr_type = Some(DataType::scalar(token));
		}
		Ok(())
	}

	/// The binary operator type-compatibility matrix. Dicts and structs carry their own
	/// type markers (`DataType::dict`'s synthetic `dict` token, a struct's `ID` token),
	/// so unlike arrays (which reuse their element kind) they cannot silently collide
	/// with a scalar branch below.
	fn check_binary_op(&self, lhs_type: &DataType, rhs_type: &DataType, op: &Token) -> Result<Token, StaticError> {
		let line = lhs_type.type_name.line;
		let column = lhs_type.type_name.column;
		let is_void = |t: &DataType| t.type_name.kind == TokenKind::Void;
		let lhs_kind = lhs_type.type_name.kind;
		let rhs_kind = rhs_type.type_name.kind;

		if lhs_kind == TokenKind::Int && rhs_kind == TokenKind::Int {
			if MATH_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Int, "int", line, column))
			} else if COMPARISON_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Invalid operator {} for type int and int", op.lexeme), op))
			}
		} else if (is_void(lhs_type) || lhs_kind == TokenKind::Int) && (is_void(rhs_type) || rhs_kind == TokenKind::Int) {
			if BOOL_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Cannot use {} with a void type", op.lexeme), op))
			}
		} else if lhs_kind == TokenKind::Double && rhs_kind == TokenKind::Double {
			if MATH_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Double, "double", line, column))
			} else if COMPARISON_OPS.contains(&op.kind) || BOOL_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Invalid operator {} for type double and double", op.lexeme), op))
			}
		} else if (is_void(lhs_type) || lhs_kind == TokenKind::Double) && (is_void(rhs_type) || rhs_kind == TokenKind::Double) {
			if BOOL_OPS.contains(&op.kind) || COMPARISON_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Cannot use {} with a void type", op.lexeme), op))
			}
		} else if (lhs_kind == TokenKind::String || is_void(lhs_type)) && (rhs_kind == TokenKind::String || is_void(rhs_type)) {
			if op.kind == TokenKind::Plus {
				Ok(Token::new(TokenKind::String, "string", line, column))
			} else if BOOL_OPS.contains(&op.kind) || COMPARISON_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Invalid operator {} for type string and string", op.lexeme), op))
			}
		} else if (lhs_kind == TokenKind::Bool || is_void(lhs_type)) && (rhs_kind == TokenKind::Bool || is_void(rhs_type)) {
			if BOOL_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Cannot use operator {} with a boolean expression", op.lexeme), op))
			}
		} else if (lhs_kind == TokenKind::Id || is_void(lhs_type)) && (rhs_kind == TokenKind::Id || is_void(rhs_type)) {
			if BOOL_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Cannot use operator {} with struct comparison", op.lexeme), op))
			}
		} else if (lhs_kind == TokenKind::Dict || is_void(lhs_type)) && (rhs_kind == TokenKind::Dict || is_void(rhs_type)) {
			if BOOL_OPS.contains(&op.kind) {
				Ok(Token::new(TokenKind::Bool, "bool", line, column))
			} else {
				Err(self.error(format!("Cannot use operator {} with dictionary comparison", op.lexeme), op))
			}
		} else {
			Err(self.error(format!("Mismatch of types {} and {}", lhs_type.type_name.lexeme, rhs_type.type_name.lexeme), op))
		}
	}

	fn check_term(&mut self, term: &Term) -> Result<(), StaticError> {
		match term {
			Term::SimpleTerm(rvalue) => self.check_rvalue(rvalue),
			Term::ComplexTerm(expr) => self.check_expr(expr),
		}
	}

	fn check_rvalue(&mut self, rvalue: &RValue) -> Result<(), StaticError> {
		match rvalue {
			RValue::SimpleRValue(token) => self.check_simple_rvalue(token),
			RValue::NewRValue(new_rvalue) => self.check_new_rvalue(new_rvalue),
			RValue::CallExpr(call) => self.check_call_expr(call),
			RValue::VarRValue(path) => self.check_var_rvalue(path),
		}
	}

	fn check_simple_rvalue(&mut self, value: &Token) -> Result<(), StaticError> {
		let (kind, name) = match value.kind {
			TokenKind::IntVal => (TokenKind::Int, "int"),
			TokenKind::DoubleVal => (TokenKind::Double, "double"),
			TokenKind::StringVal => (TokenKind::String, "string"),
			TokenKind::BoolVal => (TokenKind::Bool, "bool"),
			TokenKind::NullVal => (TokenKind::Void, "void"),
			other => unreachable!("parser only ever produces a literal token here, found {other:?}"),
		};
		self.curr_type = Some(DataType::scalar(Token::new(kind, name, value.line, value.column)));
		Ok(())
	}

	fn check_new_rvalue(&mut self, new_rvalue: &NewRValue) -> Result<(), StaticError> {
		match new_rvalue {
			NewRValue::Array { type_name, size_expr } => {
				self.check_expr(size_expr)?;
				let size_type = self.curr_type();
				if size_type.type_name.kind != TokenKind::Int {
					return Err(self.error(
						format!("Mismatch of new expression types {} and {}", type_name.lexeme, size_type.type_name.lexeme),
						type_name,
					));
				}
				if type_name.kind == TokenKind::Id {
					self.check_struct_exists(type_name)?;
				}
				self.curr_type = Some(DataType::array(type_name.clone()));
				Ok(())
			}
			// `new dict()` carries no type arguments of its own. It type-checks as a
			// bare `dict` marker with `is_dict` left false, so a fresh dict literal
			// always type-checks against whatever dict-shaped target it's assigned or
			// passed into, while an existing, already-typed dict variable still gets
			// real key/value equality checking (see `check_var_decl`).
			NewRValue::Dict => {
				self.curr_type = Some(DataType::scalar(Token::new(TokenKind::Dict, "dict", 0, 0)));
				Ok(())
			}
			NewRValue::Struct { type_name, args } => {
				self.check_struct_exists(type_name)?;
				let struct_def = self.structs.get(&type_name.lexeme).cloned().expect("just checked exists");
				if args.len() != struct_def.fields.len() {
					return Err(self.error(format!("Mismatch of fields given for struct {}", struct_def.name.lexeme), &struct_def.name));
				}
				for (arg, field) in args.iter().zip(&struct_def.fields) {
					self.check_expr(arg)?;
					let arg_type = self.curr_type();
					if arg_type.type_name.kind != field.data_type.type_name.kind && arg_type.type_name.kind != TokenKind::Void {
						return Err(self.error(
							format!("Mismatch of types for field {} and {}", arg_type.type_name.lexeme, field.data_type.type_name.lexeme),
							&arg_type.type_name,
						));
					} else if arg_type.is_dict && field.data_type.is_dict {
						let keys_match = arg_type.key_type.as_ref().map(|t| t.kind) == field.data_type.key_type.as_ref().map(|t| t.kind);
						let elems_match = arg_type.element_type.as_ref().map(|t| t.kind) == field.data_type.element_type.as_ref().map(|t| t.kind);
						if !keys_match || !elems_match {
							return Err(self.error(
								format!("Mismatch of types for field {} and {}", arg_type.type_name.lexeme, field.data_type.type_name.lexeme),
								&arg_type.type_name,
							));
						}
					}
				}
				self.curr_type = Some(DataType::scalar(type_name.clone()));
				Ok(())
			}
		}
	}

	fn check_struct_exists(&self, type_name: &Token) -> Result<(), StaticError> {
		if !self.structs.contains_key(&type_name.lexeme) {
			return Err(self.error(format!("Struct {} not defined", type_name.lexeme), type_name));
		}
		Ok(())
	}

	fn check_var_rvalue(&mut self, path: &[VarRef]) -> Result<(), StaticError> {
		let first = &path[0];
		let line = first.name.line;
		let column = first.name.column;
		if !self.symbol_table.exists(&first.name.lexeme) {
			return Err(self.error(format!("Use before def error for {}", first.name.lexeme), &first.name));
		}
		let declared = self.symbol_table.get(&first.name.lexeme).cloned().expect("just checked exists");

		let mut first_type = declared.clone();
		let mut is_array = declared.is_array;
		let mut is_dict = declared.is_dict;
		let mut key_type = declared.key_type.clone();
		let mut element_type = declared.element_type.clone();

		if let Some(array_expr) = &first.array_expr {
			self.check_expr(array_expr)?;
			let idx_type = self.curr_type();
			if declared.is_array {
				is_array = false;
				if idx_type.type_name.kind != TokenKind::Int {
					return Err(self.error("Invalid type for indexing array", &idx_type.type_name));
				}
			} else if declared.is_dict {
				is_dict = false;
				let key_kind = declared.key_type.as_ref().map(|t| t.kind);
				if Some(idx_type.type_name.kind) != key_kind {
					return Err(self.error(format!("Invalid type for indexing dictionary {}", first.name.lexeme), &idx_type.type_name));
				}
				let element = declared.element_type.clone().expect("dict DataType always carries an element type");
				first_type = DataType::scalar(element);
			}
		}

		for step in &path[1..] {
			if let Some(struct_def) = self.structs.get(&first_type.type_name.lexeme).cloned() {
				match struct_def.fields.iter().find(|f| f.name.lexeme == step.name.lexeme) {
					Some(field) => first_type = field.data_type.clone(),
					None => {
						return Err(self.error(
							format!("field variable {} doesn't exist for type {}", step.name.lexeme, first_type.type_name.lexeme),
							&step.name,
						));
					}
				}
			}
			if let Some(array_expr) = &step.array_expr {
				self.check_expr(array_expr)?;
				let idx_type = self.curr_type();
				if first_type.is_array {
					if idx_type.type_name.kind != TokenKind::Int {
						return Err(self.error("Invalid type for indexing array", &idx_type.type_name));
					}
				} else if first_type.is_dict {
					let key_kind = first_type.key_type.as_ref().map(|t| t.kind);
					if Some(idx_type.type_name.kind) != key_kind {
						return Err(self.error(format!("Invalid type for indexing dictionary {}", step.name.lexeme), &idx_type.type_name));
					}
					is_dict = false;
					key_type = None;
					element_type = None;
					first_type.type_name = first_type.element_type.clone().expect("dict DataType always carries an element type");
				} else {
					return Err(self.error("Invalid type for indexing", &idx_type.type_name));
				}
			}
		}

		let token = Token::new(first_type.type_name.kind, first_type.type_name.lexeme.clone(), line, column);
		self.curr_type = Some(DataType { is_array, is_dict, key_type, element_type, type_name: token });
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	fn check_source(source: &str) -> Result<(), StaticError> {
		check(&parse(tokenize(source).unwrap()).unwrap())
	}

	#[test]
	fn accepts_well_typed_program() {
		assert!(check_source("void main() { int x = 1; x = x + 2; print(x); }").is_ok());
	}

	#[test]
	fn rejects_missing_main() {
		assert!(check_source("void helper() { }").is_err());
	}

	#[test]
	fn rejects_duplicate_struct() {
		assert!(check_source("struct Node { int val; } struct Node { int val; } void main() { }").is_err());
	}

	#[test]
	fn rejects_type_mismatch_in_var_decl() {
		assert!(check_source("void main() { int x = true; }").is_err());
	}

	#[test]
	fn rejects_calling_undeclared_function() {
		assert!(check_source("void main() { ghost(); }").is_err());
	}

	#[test]
	fn accepts_struct_construction_and_field_access() {
		let program = "struct Pair { int a; int b; } void main() { Pair p = new Pair(1, 2); print(p.a); }";
		assert!(check_source(program).is_ok());
	}

	#[test]
	fn rejects_wrong_arity_struct_construction() {
		let program = "struct Pair { int a; int b; } void main() { Pair p = new Pair(1); }";
		assert!(check_source(program).is_err());
	}

	#[test]
	fn accepts_fresh_dict_literal_regardless_of_declared_value_type() {
		assert!(check_source(r#"void main() { dict(string,int) d = new dict(); d["k"] = 5; }"#).is_ok());
	}

	#[test]
	fn rejects_indexing_dict_with_wrong_key_type() {
		assert!(check_source(r#"void main() { dict(string,int) d = new dict(); int x = d[5]; }"#).is_err());
	}

	#[test]
	fn rejects_cross_assigning_dicts_of_different_value_types() {
		let program = r#"void main() { dict(string,int) d = new dict(); dict(string,bool) e = d; }"#;
		assert!(check_source(program).is_err());
	}

	#[test]
	fn accepts_cross_assigning_dicts_of_the_same_key_and_value_types() {
		let program = r#"void main() { dict(string,int) d = new dict(); dict(string,int) e = d; }"#;
		assert!(check_source(program).is_ok());
	}

	#[test]
	fn accepts_user_function_call_with_matching_args() {
		let program = "int add(int a, int b) { return a + b; } void main() { print(add(1, 2)); }";
		assert!(check_source(program).is_ok());
	}

	#[test]
	fn rejects_non_boolean_while_condition() {
		assert!(check_source("void main() { while (1) { } }").is_err());
	}
}
