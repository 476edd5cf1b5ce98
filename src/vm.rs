//! The stack-based virtual machine: loads [`FrameTemplate`]s, runs `main`, and
//! executes instructions against an operand stack, a locals array, and three
//! heaps (struct/array/dict) sharing one monotonic id space starting at
//! [`INITIAL_OBJECT_ID`].

use std::collections::HashMap;
use std::io::Write as _;
use std::rc::Rc;

use crate::error::VMError;
use crate::opcode::{FrameTemplate, Opcode, Value};

/// The first heap id handed out in a run; chosen to make VM test fixtures and
/// reference output deterministic and recognizably non-zero.
const INITIAL_OBJECT_ID: i64 = 2024;

/// A dict's key → value entries kept in insertion order, so `KEYS` can report them
/// that way. `Value` has no `Hash`/`Eq` impl (it carries `f64`), so lookups are
/// linear; MyPL programs don't build large enough dicts for that to matter.
#[derive(Debug, Default, Clone)]
struct OrderedDict {
	entries: Vec<(Value, Value)>,
}

impl OrderedDict {
	fn new() -> Self {
		Self::default()
	}

	fn get(&self, key: &Value) -> Option<&Value> {
		self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	fn insert(&mut self, key: Value, value: Value) {
		if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
			entry.1 = value;
		} else {
			self.entries.push((key, value));
		}
	}

	fn keys(&self) -> impl Iterator<Item = &Value> {
		self.entries.iter().map(|(k, _)| k)
	}

	fn len(&self) -> usize {
		self.entries.len()
	}
}

/// A runtime activation of a [`FrameTemplate`]: its own program counter, locals
/// array, and operand stack. Locals grow lazily as `STORE` writes past the current
/// end, filled with `Value::Null` in between.
struct Frame {
	template: Rc<FrameTemplate>,
	pc: usize,
	operand_stack: Vec<Value>,
	variables: Vec<Value>,
}

impl Frame {
	fn new(template: Rc<FrameTemplate>) -> Self {
		Self { template, pc: 0, operand_stack: Vec::new(), variables: Vec::new() }
	}
}

/// Runs every function's frame template to completion, starting from `main`,
/// writing `WRITE` output to stdout.
pub fn run(templates: Vec<FrameTemplate>) -> Result<(), VMError> {
	Vm::new(templates, std::io::stdout()).execute()
}

/// A VM whose `WRITE` output is parameterized on `W`, so tests can capture printed
/// output instead of it going straight to stdout.
struct Vm<W: std::io::Write> {
	frame_templates: HashMap<String, Rc<FrameTemplate>>,
	struct_heap: HashMap<i64, HashMap<String, Value>>,
	array_heap: HashMap<i64, Vec<Value>>,
	dict_heap: HashMap<i64, OrderedDict>,
	next_obj_id: i64,
	call_stack: Vec<Frame>,
	output: W,
}

impl<W: std::io::Write> Vm<W> {
	fn new(templates: Vec<FrameTemplate>, output: W) -> Self {
		let frame_templates = templates.into_iter().map(|t| (t.function_name.clone(), Rc::new(t))).collect();
		Self {
			frame_templates,
			struct_heap: HashMap::new(),
			array_heap: HashMap::new(),
			dict_heap: HashMap::new(),
			next_obj_id: INITIAL_OBJECT_ID,
			call_stack: Vec::new(),
			output,
		}
	}

	fn alloc_id(&mut self) -> i64 {
		let id = self.next_obj_id;
		self.next_obj_id += 1;
		id
	}

	fn err(&self, message: impl AsRef<str>) -> VMError {
		self.call_stack.last().map_or_else(|| VMError::new(message.as_ref()), |frame| VMError::at(message, &frame.template.function_name, frame.pc.saturating_sub(1)))
	}

	fn push(&mut self, value: Value) {
		self.call_stack.last_mut().expect("a frame is always active while stepping").operand_stack.push(value);
	}

	fn pop(&mut self) -> Result<Value, VMError> {
		let popped = self.call_stack.last_mut().expect("a frame is always active while stepping").operand_stack.pop();
		popped.ok_or_else(|| self.err("operand stack underflow"))
	}

	fn execute(&mut self) -> Result<(), VMError> {
		let main_template = match self.frame_templates.get("main") {
			Some(template) => Rc::clone(template),
			None => return Err(VMError::new("no 'main' function defined")),
		};
		self.call_stack.push(Frame::new(main_template));

		loop {
			let Some(frame) = self.call_stack.last() else { break };
			let pc = frame.pc;
			let Some(instr) = frame.template.instructions.get(pc).cloned() else {
				return Err(self.err("instruction pointer ran past the end of its frame"));
			};
			self.call_stack.last_mut().expect("just checked above").pc += 1;
			self.step(instr)?;
		}
		Ok(())
	}

	#[allow(clippy::too_many_lines)]
	fn step(&mut self, instr: Opcode) -> Result<(), VMError> {
		match instr {
			Opcode::Push(v) => self.push(v),
			Opcode::Pop => {
				self.pop()?;
			}
			Opcode::Dup => {
				let v = self.pop()?;
				self.push(v.clone());
				self.push(v);
			}
			Opcode::Write => {
				let v = self.pop()?;
				let rendered = v.display();
				write!(self.output, "{rendered}").map_err(|e| self.err(format!("failed to write output: {e}")))?;
				self.output.flush().map_err(|e| self.err(format!("failed to write output: {e}")))?;
				self.push(Value::Null);
			}
			Opcode::Read => {
				let mut line = String::new();
				std::io::stdin().read_line(&mut line).map_err(|e| self.err(format!("failed to read from stdin: {e}")))?;
				self.push(Value::Str(line.trim_end_matches(['\n', '\r']).to_owned()));
			}
			Opcode::Store(slot) => {
				let v = self.pop()?;
				let frame = self.call_stack.last_mut().expect("a frame is always active while stepping");
				if slot >= frame.variables.len() {
					frame.variables.resize(slot + 1, Value::Null);
				}
				frame.variables[slot] = v;
			}
			Opcode::Load(slot) => {
				let frame = self.call_stack.last().expect("a frame is always active while stepping");
				let v = frame.variables.get(slot).cloned();
				let v = v.ok_or_else(|| self.err(format!("read of uninitialized local slot {slot}")))?;
				self.push(v);
			}
			Opcode::Add => self.arith('+')?,
			Opcode::Sub => self.arith('-')?,
			Opcode::Mul => self.arith('*')?,
			Opcode::Div => self.arith('/')?,
			Opcode::And => self.logical(true)?,
			Opcode::Or => self.logical(false)?,
			Opcode::Not => {
				let v = self.pop()?;
				let Value::Bool(b) = v else {
					return Err(self.err(format!("'not' requires a bool operand, found {}", v.type_name())));
				};
				self.push(Value::Bool(!b));
			}
			Opcode::CmpLt => self.compare_ordered(false)?,
			Opcode::CmpLe => self.compare_ordered(true)?,
			Opcode::CmpEq => {
				let rhs = self.pop()?;
				let lhs = self.pop()?;
				self.push(Value::Bool(lhs == rhs));
			}
			Opcode::CmpNe => {
				let rhs = self.pop()?;
				let lhs = self.pop()?;
				self.push(Value::Bool(lhs != rhs));
			}
			Opcode::Jmp(addr) => {
				self.call_stack.last_mut().expect("a frame is always active while stepping").pc = addr;
			}
			Opcode::Jmpf(addr) => {
				let v = self.pop()?;
				let Value::Bool(b) = v else {
					return Err(self.err(format!("branch condition must be bool, found {}", v.type_name())));
				};
				if !b {
					self.call_stack.last_mut().expect("a frame is always active while stepping").pc = addr;
				}
			}
			Opcode::Nop => {}
			Opcode::Call(name) => self.call(&name)?,
			Opcode::Ret => {
				let v = self.pop()?;
				self.call_stack.pop().expect("RET only ever runs inside an active frame");
				if let Some(caller) = self.call_stack.last_mut() {
					caller.operand_stack.push(v);
				}
			}
			Opcode::Allocs => {
				let id = self.alloc_id();
				self.struct_heap.insert(id, HashMap::new());
				self.push(Value::Struct(id));
			}
			Opcode::Setf(field) => {
				let v = self.pop()?;
				let owner = self.pop()?;
				let Value::Struct(id) = owner else {
					return Err(self.err(format!("cannot set field '{field}' on a {}", owner.type_name())));
				};
				let fields = self.struct_heap.get_mut(&id).ok_or_else(|| self.err("use of a struct id that was never allocated"))?;
				fields.insert(field, v);
			}
			Opcode::Getf(field) => {
				let owner = self.pop()?;
				let Value::Struct(id) = owner else {
					return Err(self.err(format!("cannot read field '{field}' on a {}", owner.type_name())));
				};
				let fields = self.struct_heap.get(&id).ok_or_else(|| self.err("use of a struct id that was never allocated"))?;
				self.push(fields.get(&field).cloned().unwrap_or(Value::Null));
			}
			Opcode::Alloca => {
				let size = self.pop()?;
				let Value::Int(n) = size else {
					return Err(self.err(format!("array size must be an int, found {}", size.type_name())));
				};
				let n = usize::try_from(n).map_err(|_| self.err("array size must be non-negative"))?;
				let id = self.alloc_id();
				self.array_heap.insert(id, vec![Value::Null; n]);
				self.push(Value::Array(id));
			}
			Opcode::Seti => {
				let v = self.pop()?;
				let idx = self.pop()?;
				let owner = self.pop()?;
				let Value::Array(id) = owner else {
					return Err(self.err(format!("cannot index-assign a {}", owner.type_name())));
				};
				let Value::Int(i) = idx else {
					return Err(self.err(format!("array index must be an int, found {}", idx.type_name())));
				};
				let elements = self.array_heap.get_mut(&id).ok_or_else(|| self.err("use of an array id that was never allocated"))?;
				let i = usize::try_from(i).map_err(|_| self.err("array index out of bounds"))?;
				let slot = elements.get_mut(i).ok_or_else(|| self.err("array index out of bounds"))?;
				*slot = v;
			}
			Opcode::Geti => {
				let idx = self.pop()?;
				let owner = self.pop()?;
				let Value::Array(id) = owner else {
					return Err(self.err(format!("cannot index a {}", owner.type_name())));
				};
				let Value::Int(i) = idx else {
					return Err(self.err(format!("array index must be an int, found {}", idx.type_name())));
				};
				let elements = self.array_heap.get(&id).ok_or_else(|| self.err("use of an array id that was never allocated"))?;
				let i = usize::try_from(i).map_err(|_| self.err("array index out of bounds"))?;
				let v = elements.get(i).cloned().ok_or_else(|| self.err("array index out of bounds"))?;
				self.push(v);
			}
			Opcode::Allocd => {
				let id = self.alloc_id();
				self.dict_heap.insert(id, OrderedDict::new());
				self.push(Value::Dict(id));
			}
			Opcode::Setd => {
				let v = self.pop()?;
				let k = self.pop()?;
				let owner = self.pop()?;
				let Value::Dict(id) = owner else {
					return Err(self.err(format!("cannot key-assign a {}", owner.type_name())));
				};
				let dict = self.dict_heap.get_mut(&id).ok_or_else(|| self.err("use of a dict id that was never allocated"))?;
				dict.insert(k, v);
			}
			Opcode::Getd => {
				let k = self.pop()?;
				let owner = self.pop()?;
				let Value::Dict(id) = owner else {
					return Err(self.err(format!("cannot key a {}", owner.type_name())));
				};
				let dict = self.dict_heap.get(&id).ok_or_else(|| self.err("use of a dict id that was never allocated"))?;
				let v = dict.get(&k).cloned().ok_or_else(|| self.err("dict key not found"))?;
				self.push(v);
			}
			Opcode::In => {
				let k = self.pop()?;
				let owner = self.pop()?;
				let Value::Dict(id) = owner else {
					return Err(self.err(format!("cannot check membership on a {}", owner.type_name())));
				};
				let dict = self.dict_heap.get(&id).ok_or_else(|| self.err("use of a dict id that was never allocated"))?;
				self.push(Value::Bool(dict.get(&k).is_some()));
			}
			Opcode::Len => {
				let v = self.pop()?;
				let len = match v {
					Value::Str(s) => s.chars().count(),
					Value::Array(id) => self.array_heap.get(&id).ok_or_else(|| self.err("use of an array id that was never allocated"))?.len(),
					Value::Dict(id) => self.dict_heap.get(&id).ok_or_else(|| self.err("use of a dict id that was never allocated"))?.len(),
					other => return Err(self.err(format!("length() is not defined for {}", other.type_name()))),
				};
				self.push(Value::Int(i64::try_from(len).expect("a heap object's length always fits in an i64")));
			}
			Opcode::Getc => {
				let s = self.pop()?;
				let i = self.pop()?;
				let Value::Str(s) = s else {
					return Err(self.err(format!("get() requires a string, found {}", s.type_name())));
				};
				let Value::Int(idx) = i else {
					return Err(self.err(format!("get() requires an int index, found {}", i.type_name())));
				};
				let idx = usize::try_from(idx).map_err(|_| self.err("get() index out of bounds"))?;
				let ch = s.chars().nth(idx).ok_or_else(|| self.err("get() index out of bounds"))?;
				self.push(Value::Str(ch.to_string()));
			}
			Opcode::Toint => {
				let v = self.pop()?;
				let result = match v {
					Value::Str(s) => s.trim().parse::<i64>().map_err(|_| self.err(format!("'{s}' is not a valid int")))?,
					Value::Double(d) => d as i64,
					other => return Err(self.err(format!("cannot convert {} to int", other.type_name()))),
				};
				self.push(Value::Int(result));
			}
			Opcode::Todbl => {
				let v = self.pop()?;
				let result = match v {
					Value::Str(s) => s.trim().parse::<f64>().map_err(|_| self.err(format!("'{s}' is not a valid double")))?,
					Value::Int(i) => i as f64,
					other => return Err(self.err(format!("cannot convert {} to double", other.type_name()))),
				};
				self.push(Value::Double(result));
			}
			Opcode::Tostr => {
				let v = self.pop()?;
				match v {
					Value::Int(_) | Value::Double(_) => {
						let s = v.display();
						self.push(Value::Str(s));
					}
					other => return Err(self.err(format!("cannot convert {} to string", other.type_name()))),
				}
			}
			Opcode::Keys => {
				let v = self.pop()?;
				let Value::Dict(id) = v else {
					return Err(self.err(format!("keys() requires a dict, found {}", v.type_name())));
				};
				let keys = {
					let dict = self.dict_heap.get(&id).ok_or_else(|| self.err("use of a dict id that was never allocated"))?;
					dict.keys().cloned().collect::<Vec<_>>()
				};
				let new_id = self.alloc_id();
				self.array_heap.insert(new_id, keys);
				self.push(Value::Array(new_id));
			}
		}
		Ok(())
	}

	fn call(&mut self, name: &str) -> Result<(), VMError> {
		let template = match self.frame_templates.get(name) {
			Some(t) => Rc::clone(t),
			None => return Err(self.err(format!("call to undefined function '{name}'"))),
		};
		let mut frame = Frame::new(template);
		for _ in 0..frame.template.arg_count {
			frame.operand_stack.push(self.pop()?);
		}
		// The callee's leading `STORE(0)`, `STORE(1)`, ... instructions (one per
		// parameter, emitted by codegen) pop these back off in parameter order.
		self.call_stack.push(frame);
		Ok(())
	}

	fn arith(&mut self, op: char) -> Result<(), VMError> {
		let rhs = self.pop()?;
		let lhs = self.pop()?;
		let result = match (&lhs, &rhs) {
			(Value::Int(a), Value::Int(b)) => match op {
				'+' => Value::Int(a + b),
				'-' => Value::Int(a - b),
				'*' => Value::Int(a * b),
				'/' if *b == 0 => return Err(self.err("division by zero")),
				'/' => Value::Int(a / b),
				_ => unreachable!("arith is only ever called with one of + - * /"),
			},
			(Value::Double(a), Value::Double(b)) => match op {
				'+' => Value::Double(a + b),
				'-' => Value::Double(a - b),
				'*' => Value::Double(a * b),
				'/' if *b == 0.0 => return Err(self.err("division by zero")),
				'/' => Value::Double(a / b),
				_ => unreachable!("arith is only ever called with one of + - * /"),
			},
			(Value::Str(a), Value::Str(b)) if op == '+' => Value::Str(format!("{a}{b}")),
			_ => return Err(self.err(format!("operator '{op}' is not defined for {} and {}", lhs.type_name(), rhs.type_name()))),
		};
		self.push(result);
		Ok(())
	}

	fn logical(&mut self, is_and: bool) -> Result<(), VMError> {
		let rhs = self.pop()?;
		let lhs = self.pop()?;
		let (Value::Bool(a), Value::Bool(b)) = (&lhs, &rhs) else {
			let op = if is_and { "and" } else { "or" };
			return Err(self.err(format!("'{op}' requires two bool operands, found {} and {}", lhs.type_name(), rhs.type_name())));
		};
		self.push(Value::Bool(if is_and { *a && *b } else { *a || *b }));
		Ok(())
	}

	fn compare_ordered(&mut self, or_equal: bool) -> Result<(), VMError> {
		let rhs = self.pop()?;
		let lhs = self.pop()?;
		let result = match (&lhs, &rhs) {
			(Value::Int(a), Value::Int(b)) => {
				if or_equal {
					a <= b
				} else {
					a < b
				}
			}
			(Value::Double(a), Value::Double(b)) => {
				if or_equal {
					a <= b
				} else {
					a < b
				}
			}
			(Value::Str(a), Value::Str(b)) => {
				if or_equal {
					a <= b
				} else {
					a < b
				}
			}
			_ => return Err(self.err(format!("cannot order-compare {} and {}", lhs.type_name(), rhs.type_name()))),
		};
		self.push(Value::Bool(result));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::checker;
	use crate::codegen;
	use crate::lexer::tokenize;
	use crate::parser::parse;

	fn run_source(source: &str) -> Result<(), VMError> {
		run_source_capturing_output(source).map(|_| ())
	}

	/// Runs `source` to completion against an in-memory output buffer instead of
	/// stdout, returning what was printed so tests can assert on exact output.
	fn run_source_capturing_output(source: &str) -> Result<String, VMError> {
		let program = parse(tokenize(source).expect("test sources lex cleanly")).expect("test sources parse cleanly");
		checker::check(&program).expect("test sources type-check cleanly");
		let mut vm = Vm::new(codegen::generate(&program), Vec::new());
		vm.execute()?;
		Ok(String::from_utf8(vm.output).expect("MyPL only ever prints UTF-8 text"))
	}

	#[test]
	fn prints_a_string_literal() {
		assert_eq!(run_source_capturing_output(r#"void main() { print("blue"); }"#).unwrap(), "blue");
	}

	#[test]
	fn arithmetic_prints_the_evaluated_result() {
		assert_eq!(run_source_capturing_output("void main() { print(3 + (6 - 5) + (5 * 2) + (2 / 2)); }").unwrap(), "15");
	}

	#[test]
	fn recursive_function_prints_the_correct_fibonacci_number() {
		let source = "int fib(int n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } void main() { print(fib(8)); }";
		assert_eq!(run_source_capturing_output(source).unwrap(), "21");
	}

	#[test]
	fn while_loop_prints_the_final_counter_value() {
		assert_eq!(run_source_capturing_output("void main() { int i = 0; while (i < 5) { i = i + 1; } print(i); }").unwrap(), "5");
	}

	#[test]
	fn struct_field_chain_prints_the_nested_field() {
		let source = "struct Node { int val; Node next; } void main() { Node r = new Node(10, null); r.next = new Node(20, null); print(r.next.val); }";
		assert_eq!(run_source_capturing_output(source).unwrap(), "20");
	}

	#[test]
	fn dict_round_trip_prints_value_then_membership_checks() {
		let source = r#"void main() { dict(string,int) d = new dict(); d["k"] = 5; print(d["k"]); print(in(d,"k")); print(in(d,"z")); }"#;
		assert_eq!(run_source_capturing_output(source).unwrap(), "5truefalse");
	}

	#[test]
	fn string_literal_escapes_decode_to_a_real_newline_and_tab() {
		assert_eq!(run_source_capturing_output(r#"void main() { print("a\nb\tc"); }"#).unwrap(), "a\nb\tc");
	}

	#[test]
	fn array_index_out_of_bounds_is_a_vm_error() {
		assert!(run_source("void main() { array int xs = new int[3]; print(xs[5]); }").is_err());
	}

	#[test]
	fn division_by_zero_is_a_vm_error() {
		assert!(run_source("void main() { print(1/0); }").is_err());
	}

	#[test]
	fn missing_main_is_a_vm_error() {
		assert!(run(codegen::generate(&parse(tokenize("int add(int a, int b) { return a + b; }").expect("lexes")).expect("parses"))).is_err());
	}

	#[test]
	fn ordered_dict_preserves_insertion_order_for_keys() {
		let mut dict = OrderedDict::new();
		dict.insert(Value::Str("b".to_owned()), Value::Int(2));
		dict.insert(Value::Str("a".to_owned()), Value::Int(1));
		let keys: Vec<_> = dict.keys().cloned().collect();
		assert_eq!(keys, vec![Value::Str("b".to_owned()), Value::Str("a".to_owned())]);
	}
}
