//! Lowers a checked [`Program`] into one [`FrameTemplate`] per function, one
//! statement and expression at a time.
//!
//! The checker annotates nothing onto the AST: whether an indexed access is into
//! an array or a dict has to be re-derived here, not read off a typed node. Rather
//! than re-run full type inference, codegen keeps its own scoped table of
//! *declared* types — a second [`SymbolTable`] alongside the [`VarTable`] that
//! tracks stack slots — populated the same way var declarations, parameters and
//! struct fields are, which is exactly enough to resolve every `GETI`-vs-`GETD`
//! choice along an lvalue/rvalue path.

use std::collections::HashMap;

use crate::ast::{AssignStmt, CallExpr, DataType, Expr, ForStmt, FunDef, IfStmt, NewRValue, Program, RValue, ReturnStmt, Stmt, StructDef, Term, VarDecl, VarRef, WhileStmt};
use crate::builtins::BUILTINS;
use crate::opcode::{FrameTemplate, Opcode, Value};
use crate::symbol_table::SymbolTable;
use crate::token::{Token, TokenKind};
use crate::var_table::VarTable;

/// Generates one [`FrameTemplate`] per function definition, in declaration order.
#[must_use]
pub fn generate(program: &Program) -> Vec<FrameTemplate> {
	let structs: HashMap<String, StructDef> = program.structs.iter().map(|s| (s.name.lexeme.clone(), s.clone())).collect();
	program.functions.iter().map(|fun_def| CodeGen::new(&structs).generate_function(fun_def)).collect()
}

struct CodeGen<'a> {
	structs: &'a HashMap<String, StructDef>,
	vars: VarTable,
	types: SymbolTable,
}

impl<'a> CodeGen<'a> {
	fn new(structs: &'a HashMap<String, StructDef>) -> Self {
		Self { structs, vars: VarTable::new(), types: SymbolTable::new() }
	}

	fn push_scope(&mut self) {
		self.vars.push_environment();
		self.types.push_environment();
	}

	fn pop_scope(&mut self) {
		self.vars.pop_environment();
		self.types.pop_environment();
	}

	fn generate_function(&mut self, fun_def: &FunDef) -> FrameTemplate {
		let mut template = FrameTemplate::new(fun_def.name.lexeme.clone(), fun_def.params.len());
		self.push_scope();
		for param in &fun_def.params {
			let slot = self.vars.add(param.name.lexeme.clone());
			self.types.add(param.name.lexeme.clone(), param.data_type.clone());
			template.emit(Opcode::Store(slot));
		}
		for stmt in &fun_def.body {
			self.gen_stmt(stmt, &mut template);
		}
		self.pop_scope();
		// Every call leaves exactly one value for its caller, so a function whose
		// control flow falls off the end without an explicit `return` still needs
		// one: codegen always reaches a `RET`, never falls off a frame template.
		template.emit(Opcode::Push(Value::Null));
		template.emit(Opcode::Ret);
		template
	}

	fn gen_stmt(&mut self, stmt: &Stmt, template: &mut FrameTemplate) {
		match stmt {
			Stmt::VarDecl(var_decl) => self.gen_var_decl(var_decl, template),
			Stmt::Assign(assign) => self.gen_assign(assign, template),
			Stmt::If(if_stmt) => self.gen_if(if_stmt, template),
			Stmt::While(while_stmt) => self.gen_while(while_stmt, template),
			Stmt::For(for_stmt) => self.gen_for(for_stmt, template),
			Stmt::Return(return_stmt) => {
				self.gen_expr(&return_stmt.expr, template);
				template.emit(Opcode::Ret);
			}
			Stmt::Call(call) => {
				self.gen_call(call, template);
				template.emit(Opcode::Pop);
			}
		}
	}

	fn gen_var_decl(&mut self, var_decl: &VarDecl, template: &mut FrameTemplate) {
		match &var_decl.expr {
			Some(expr) => self.gen_expr(expr, template),
			None => {
				template.emit(Opcode::Push(Value::Null));
			}
		}
		let name = var_decl.var_def.name.lexeme.clone();
		let slot = self.vars.add(name.clone());
		self.types.add(name, var_decl.var_def.data_type.clone());
		template.emit(Opcode::Store(slot));
	}

	/// Descends the first `upto` steps of an lvalue/rvalue path, leaving the value
	/// at that point on the stack, and returns its declared type. `upto == path.len()`
	/// resolves the whole path (an rvalue read); `upto == path.len() - 1` stops one
	/// step short, leaving the *owner* of the final field/index on the stack (an
	/// lvalue write target).
	fn gen_descend(&mut self, path: &[VarRef], upto: usize, template: &mut FrameTemplate) -> DataType {
		let first = &path[0];
		let slot = self.vars.get(&first.name.lexeme).expect("checker validated the name exists");
		template.emit(Opcode::Load(slot));
		let mut curr_type = self.types.get(&first.name.lexeme).cloned().expect("checker validated the name exists");

		for (i, step) in path.iter().enumerate().take(upto) {
			if i > 0 {
				curr_type = self.struct_field_type(&curr_type, &step.name.lexeme);
				template.emit(Opcode::Getf(step.name.lexeme.clone()));
			}
			if let Some(idx_expr) = &step.array_expr {
				self.gen_expr(idx_expr, template);
				if curr_type.is_array {
					template.emit(Opcode::Geti);
					curr_type = DataType::scalar(curr_type.type_name.clone());
				} else {
					template.emit(Opcode::Getd);
					curr_type = DataType::scalar(curr_type.element_type.clone().expect("dict DataType always carries an element type"));
				}
			}
		}
		curr_type
	}

	fn struct_field_type(&self, owner: &DataType, field_name: &str) -> DataType {
		let struct_def = self.structs.get(&owner.type_name.lexeme).expect("checker validated the struct field access");
		struct_def.fields.iter().find(|f| f.name.lexeme == field_name).expect("checker validated the field exists").data_type.clone()
	}

	fn gen_var_rvalue(&mut self, path: &[VarRef], template: &mut FrameTemplate) {
		self.gen_descend(path, path.len(), template);
	}

	fn gen_assign(&mut self, assign: &AssignStmt, template: &mut FrameTemplate) {
		let path = &assign.lvalue;
		let last = path.last().expect("an lvalue path always has at least one step");

		if path.len() == 1 && last.array_expr.is_none() {
			self.gen_expr(&assign.expr, template);
			let slot = self.vars.get(&last.name.lexeme).expect("checker validated the name exists");
			template.emit(Opcode::Store(slot));
			return;
		}

		if path.len() == 1 {
			let declared = self.types.get(&last.name.lexeme).cloned().expect("checker validated the name exists");
			let slot = self.vars.get(&last.name.lexeme).expect("checker validated the name exists");
			template.emit(Opcode::Load(slot));
			self.gen_expr(last.array_expr.as_ref().expect("checked above"), template);
			self.gen_expr(&assign.expr, template);
			template.emit(if declared.is_array { Opcode::Seti } else { Opcode::Setd });
			return;
		}

		let owner_type = self.gen_descend(path, path.len() - 1, template);
		match &last.array_expr {
			None => {
				self.gen_expr(&assign.expr, template);
				template.emit(Opcode::Setf(last.name.lexeme.clone()));
			}
			Some(idx_expr) => {
				let field_type = self.struct_field_type(&owner_type, &last.name.lexeme);
				template.emit(Opcode::Getf(last.name.lexeme.clone()));
				self.gen_expr(idx_expr, template);
				self.gen_expr(&assign.expr, template);
				template.emit(if field_type.is_array { Opcode::Seti } else { Opcode::Setd });
			}
		}
	}

	fn gen_if(&mut self, if_stmt: &IfStmt, template: &mut FrameTemplate) {
		let mut end_jumps = Vec::new();

		self.gen_expr(&if_stmt.if_part.condition, template);
		let mut branch_jump = template.emit(Opcode::Jmpf(0));
		self.push_scope();
		for stmt in &if_stmt.if_part.stmts {
			self.gen_stmt(stmt, template);
		}
		self.pop_scope();
		end_jumps.push(template.emit(Opcode::Jmp(0)));
		template.patch_jump_target(branch_jump, template.next_index());

		for else_if in &if_stmt.else_ifs {
			self.gen_expr(&else_if.condition, template);
			branch_jump = template.emit(Opcode::Jmpf(0));
			self.push_scope();
			for stmt in &else_if.stmts {
				self.gen_stmt(stmt, template);
			}
			self.pop_scope();
			end_jumps.push(template.emit(Opcode::Jmp(0)));
			template.patch_jump_target(branch_jump, template.next_index());
		}

		if !if_stmt.else_stmts.is_empty() {
			self.push_scope();
			for stmt in &if_stmt.else_stmts {
				self.gen_stmt(stmt, template);
			}
			self.pop_scope();
		}

		let end = template.next_index();
		for jump in end_jumps {
			template.patch_jump_target(jump, end);
		}
	}

	fn gen_while(&mut self, while_stmt: &WhileStmt, template: &mut FrameTemplate) {
		let loop_start = template.next_index();
		self.gen_expr(&while_stmt.condition, template);
		let exit_jump = template.emit(Opcode::Jmpf(0));
		self.push_scope();
		for stmt in &while_stmt.stmts {
			self.gen_stmt(stmt, template);
		}
		self.pop_scope();
		template.emit(Opcode::Jmp(loop_start));
		template.patch_jump_target(exit_jump, template.next_index());
	}

	fn gen_for(&mut self, for_stmt: &ForStmt, template: &mut FrameTemplate) {
		self.push_scope();
		self.gen_var_decl(&for_stmt.var_decl, template);
		let loop_start = template.next_index();
		self.gen_expr(&for_stmt.condition, template);
		let exit_jump = template.emit(Opcode::Jmpf(0));
		self.push_scope();
		for stmt in &for_stmt.stmts {
			self.gen_stmt(stmt, template);
		}
		self.pop_scope();
		self.gen_assign(&for_stmt.assign_stmt, template);
		template.emit(Opcode::Jmp(loop_start));
		template.patch_jump_target(exit_jump, template.next_index());
		self.pop_scope();
	}

	fn gen_call(&mut self, call: &CallExpr, template: &mut FrameTemplate) {
		let name = call.function_name.lexeme.as_str();
		for arg in &call.args {
			self.gen_expr(arg, template);
		}
		match BUILTINS.get(name) {
			Some(builtin) => {
				template.emit(builtin.opcode());
			}
			None => {
				template.emit(Opcode::Call(name.to_owned()));
			}
		}
	}

	fn gen_new_rvalue(&mut self, new_rvalue: &NewRValue, template: &mut FrameTemplate) {
		match new_rvalue {
			NewRValue::Struct { type_name, args } => {
				let struct_def = self.structs.get(&type_name.lexeme).cloned().expect("checker validated the struct exists");
				template.emit(Opcode::Allocs);
				for (field, arg) in struct_def.fields.iter().zip(args) {
					template.emit(Opcode::Dup);
					self.gen_expr(arg, template);
					template.emit(Opcode::Setf(field.name.lexeme.clone()));
				}
			}
			NewRValue::Array { size_expr, .. } => {
				self.gen_expr(size_expr, template);
				template.emit(Opcode::Alloca);
			}
			NewRValue::Dict => {
				template.emit(Opcode::Allocd);
			}
		}
	}

	fn gen_rvalue(&mut self, rvalue: &RValue, template: &mut FrameTemplate) {
		match rvalue {
			RValue::SimpleRValue(token) => {
				template.emit(Opcode::Push(literal_value(token)));
			}
			RValue::NewRValue(new_rvalue) => self.gen_new_rvalue(new_rvalue, template),
			RValue::CallExpr(call) => self.gen_call(call, template),
			RValue::VarRValue(path) => self.gen_var_rvalue(path, template),
		}
	}

	fn gen_term(&mut self, term: &Term, template: &mut FrameTemplate) {
		match term {
			Term::SimpleTerm(rvalue) => self.gen_rvalue(rvalue, template),
			Term::ComplexTerm(expr) => self.gen_expr(expr, template),
		}
	}

	/// Right-associative, unprioritized: `first` and `rest` are evaluated in source
	/// order except for `>`/`>=`, which are lowered to `<`/`<=` with their operands
	/// swapped rather than carried as their own opcodes.
	fn gen_expr(&mut self, expr: &Expr, template: &mut FrameTemplate) {
		if let Some(op) = &expr.op {
			let rest = expr.rest.as_ref().expect("parser always pairs an operator with a right-hand expr");
			match op.kind {
				TokenKind::Greater | TokenKind::GreaterEq => {
					self.gen_expr(rest, template);
					self.gen_term(&expr.first, template);
					template.emit(if op.kind == TokenKind::Greater { Opcode::CmpLt } else { Opcode::CmpLe });
				}
				_ => {
					self.gen_term(&expr.first, template);
					self.gen_expr(rest, template);
					template.emit(binary_opcode(op.kind));
				}
			}
		} else {
			self.gen_term(&expr.first, template);
		}

		if expr.not_op {
			template.emit(Opcode::Not);
		}
	}
}

fn literal_value(token: &Token) -> Value {
	match token.kind {
		TokenKind::IntVal => Value::Int(token.lexeme.parse().expect("lexer only produces well-formed integer literals")),
		TokenKind::DoubleVal => Value::Double(token.lexeme.parse().expect("lexer only produces well-formed double literals")),
		TokenKind::StringVal => Value::Str(decode_string_escapes(&token.lexeme)),
		TokenKind::BoolVal => Value::Bool(token.lexeme == "true"),
		TokenKind::NullVal => Value::Null,
		other => unreachable!("parser only ever produces a literal token here, found {other:?}"),
	}
}

/// Decodes the two escape sequences MyPL string literals support: `\n` becomes a
/// newline and `\t` becomes a tab. The lexer stores string lexemes with escapes
/// still literal (backslash followed by the letter), so this has to run before the
/// lexeme becomes a runtime [`Value::Str`].
fn decode_string_escapes(lexeme: &str) -> String {
	lexeme.replace("\\n", "\n").replace("\\t", "\t")
}

fn binary_opcode(kind: TokenKind) -> Opcode {
	match kind {
		TokenKind::Plus => Opcode::Add,
		TokenKind::Minus => Opcode::Sub,
		TokenKind::Times => Opcode::Mul,
		TokenKind::Divide => Opcode::Div,
		TokenKind::And => Opcode::And,
		TokenKind::Or => Opcode::Or,
		TokenKind::Equal => Opcode::CmpEq,
		TokenKind::NotEqual => Opcode::CmpNe,
		TokenKind::Less => Opcode::CmpLt,
		TokenKind::LessEq => Opcode::CmpLe,
		other => unreachable!("parser only ever produces a binary operator token here, found {other:?}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	fn compile(source: &str) -> Vec<FrameTemplate> {
		generate(&parse(tokenize(source).unwrap()).unwrap())
	}

	#[test]
	fn main_with_no_return_falls_through_to_a_null_return() {
		let templates = compile("void main() { int x = 1; }");
		let main = &templates[0];
		assert_eq!(main.instructions.last(), Some(&Opcode::Ret));
		assert_eq!(main.instructions[main.instructions.len() - 2], Opcode::Push(Value::Null));
	}

	#[test]
	fn var_decl_stores_into_a_fresh_slot() {
		let templates = compile("void main() { int x = 1; int y = 2; }");
		let main = &templates[0];
		assert!(main.instructions.contains(&Opcode::Store(0)));
		assert!(main.instructions.contains(&Opcode::Store(1)));
	}

	#[test]
	fn greater_than_lowers_to_swapped_cmplt() {
		let templates = compile("void main() { bool b = 1 > 2; }");
		let main = &templates[0];
		assert!(main.instructions.contains(&Opcode::CmpLt));
		assert!(!main.instructions.contains(&Opcode::CmpLe));
	}

	#[test]
	fn print_call_lowers_to_write_then_pop() {
		let templates = compile("void main() { print(1); }");
		let main = &templates[0];
		let write_pos = main.instructions.iter().position(|i| *i == Opcode::Write).expect("print lowers to Write");
		assert_eq!(main.instructions[write_pos + 1], Opcode::Pop);
	}

	#[test]
	fn struct_construction_duplicates_the_owner_for_each_field() {
		let templates = compile("struct Pair { int a; int b; } void main() { Pair p = new Pair(1, 2); }");
		let main = &templates[0];
		assert_eq!(main.instructions.iter().filter(|i| **i == Opcode::Dup).count(), 2);
		assert_eq!(main.instructions.iter().filter(|i| matches!(i, Opcode::Setf(_))).count(), 2);
	}

	#[test]
	fn user_function_call_emits_named_call_opcode() {
		let templates = compile("int add(int a, int b) { return a + b; } void main() { print(add(1, 2)); }");
		let main = &templates[1];
		assert!(main.instructions.contains(&Opcode::Call("add".to_owned())));
	}

	#[test]
	fn every_parameter_gets_a_leading_store_in_parameter_order() {
		let templates = compile("int add(int a, int b) { return a + b; } void main() { print(add(1, 2)); }");
		let add = &templates[0];
		assert_eq!(&add.instructions[0..2], [Opcode::Store(0), Opcode::Store(1)]);
	}

	#[test]
	fn string_literal_decodes_newline_and_tab_escapes() {
		let templates = compile(r#"void main() { string s = "a\nb\tc"; }"#);
		let main = &templates[0];
		assert!(main.instructions.contains(&Opcode::Push(Value::Str("a\nb\tc".to_owned()))));
	}
}
