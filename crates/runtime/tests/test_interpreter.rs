//! End-to-end interpreter tests
//!
//! Each test hand-assembles a function the way the compiler would, runs it
//! on a fresh state, and checks the value left behind (or the error and
//! its trace).

use std::rc::Rc;

use vela_runtime::chunk::Opcode;
use vela_runtime::{
    Array, Closure, ErrorKind, Function, RuntimeError, State, Value, VmString, builtins,
};

/// Builder for hand-assembled functions.
struct Asm {
    function: Function,
}

impl Asm {
    fn new(arity: u8) -> Self {
        let mut function = Function::new(
            Some(Rc::new(VmString::from("main"))),
            Rc::new(VmString::from("test.vl")),
            arity,
        );
        function.chunk.add_line(1);
        Asm { function }
    }

    fn op(&mut self, op: Opcode) -> &mut Self {
        self.function.chunk.emit_opcode(op);
        self
    }

    fn byte_op(&mut self, op: Opcode, operand: u8) -> &mut Self {
        self.function.chunk.emit_opcode(op);
        self.function.chunk.emit_byte(operand);
        self
    }

    fn int(&mut self, value: i16) -> &mut Self {
        self.function.chunk.emit_opcode(Opcode::Int);
        self.function.chunk.emit_word(value as u16);
        self
    }

    fn constant(&mut self, value: Value) -> &mut Self {
        let index = self.function.chunk.add_const(value);
        self.byte_op(Opcode::Constant, index)
    }

    fn string_const(&mut self, s: &str) -> &mut Self {
        self.constant(Value::String(Rc::new(VmString::from(s))))
    }

    /// Emit a field-name constant for a `GetField`-family instruction.
    fn field_op(&mut self, op: Opcode, name: &str) -> &mut Self {
        let index = self
            .function
            .chunk
            .add_const(Value::String(Rc::new(VmString::from(name))));
        self.byte_op(op, index)
    }

    /// Emit a jump with a zero target; returns the patch location.
    fn jump(&mut self, op: Opcode) -> usize {
        self.function.chunk.emit_opcode(op);
        let at = self.function.chunk.code().len();
        self.function.chunk.emit_word(0);
        at
    }

    /// Point the jump emitted at `at` to the current offset.
    fn patch(&mut self, at: usize) -> &mut Self {
        let target = self.function.chunk.code().len() as u16;
        self.function.chunk.patch_word(at, target);
        self
    }

    /// Current code offset, for backward jumps.
    fn here(&self) -> u16 {
        self.function.chunk.code().len() as u16
    }

    fn jump_back(&mut self, op: Opcode, target: u16) -> &mut Self {
        self.function.chunk.emit_opcode(op);
        self.function.chunk.emit_word(target);
        self
    }

    fn child(&mut self, child: Function) -> u8 {
        self.function.add_child(Rc::new(child))
    }

    fn finish(mut self) -> Function {
        self.function.chunk.emit_opcode(Opcode::ReturnNil);
        self.function
    }
}

fn run(asm: Asm) -> Result<Value, RuntimeError> {
    let mut state = State::default();
    state
        .push_closure(Closure::new(Rc::new(asm.finish()), Vec::new()))
        .unwrap();
    state.call(0)?;
    let result = state.top().clone();
    state.pop();
    Ok(result)
}

fn number(n: f64) -> Value {
    Value::Number(n)
}

fn string(s: &str) -> Value {
    Value::String(Rc::new(VmString::from(s)))
}

fn array_of(values: Vec<Value>) -> Value {
    Value::Array(Rc::new(Array::from_elements(values)))
}

#[test]
fn test_push_literals() {
    let mut asm = Asm::new(0);
    asm.op(Opcode::True).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&Value::Bool(true)));

    let mut asm = Asm::new(0);
    asm.int(-123).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(-123.0)));

    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil).op(Opcode::Return);
    assert!(run(asm).unwrap().is_nil());
}

#[test]
fn test_arithmetic() {
    // 7 quotient 2 == 3, then (3 * 10 + 1) == 31
    let mut asm = Asm::new(0);
    asm.int(7)
        .int(2)
        .op(Opcode::Quotient)
        .int(10)
        .op(Opcode::Multiply)
        .op(Opcode::Increment)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(31.0)));

    // 7.0 % 2 == 1, negated == -1
    let mut asm = Asm::new(0);
    asm.int(7)
        .int(2)
        .op(Opcode::Remainder)
        .op(Opcode::Negate)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(-1.0)));

    // Bitwise operands truncate to int64: 6 | 3 == 7, 7 << 1 == 14
    let mut asm = Asm::new(0);
    asm.int(6)
        .int(3)
        .op(Opcode::BitwiseOr)
        .int(1)
        .op(Opcode::LeftShift)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(14.0)));
}

#[test]
fn test_string_slice_by_range() {
    // "abcdef"[1..3] == "bcd" (inclusive end)
    let mut asm = Asm::new(0);
    asm.string_const("abcdef")
        .int(1)
        .int(3)
        .op(Opcode::Range)
        .op(Opcode::GetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&string("bcd")));

    // Empty range yields the empty string
    let mut asm = Asm::new(0);
    asm.string_const("abcdef")
        .int(3)
        .int(1)
        .op(Opcode::Range)
        .op(Opcode::GetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&string("")));

    // Whole-string range hands the same string back
    let mut asm = Asm::new(0);
    asm.string_const("abcdef")
        .int(0)
        .int(5)
        .op(Opcode::Range)
        .op(Opcode::GetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&string("abcdef")));
}

#[test]
fn test_string_index_returns_one_byte_string() {
    let mut asm = Asm::new(0);
    asm.string_const("abcdef")
        .int(2)
        .op(Opcode::GetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&string("c")));

    let mut asm = Asm::new(0);
    asm.string_const("abc").int(9).op(Opcode::GetElement);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    assert_eq!(
        err.message(),
        "range error: index 9 is out of bounds for string of length 3"
    );
}

#[test]
fn test_array_concat() {
    // [1, 2] + [3] == [1, 2, 3]
    let mut asm = Asm::new(0);
    asm.int(1)
        .int(2)
        .byte_op(Opcode::Array, 2)
        .int(3)
        .byte_op(Opcode::Array, 1)
        .op(Opcode::Add)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![
        number(1.0),
        number(2.0),
        number(3.0)
    ])));
}

#[test]
fn test_concat_copies_when_left_operand_is_shared() {
    // The embedder keeps a handle to the left operand, so the interpreter
    // must copy instead of reusing its storage.
    let left = Rc::new(Array::from_elements(vec![number(1.0)]));
    let mut asm = Asm::new(0);
    asm.constant(Value::Array(Rc::clone(&left)))
        .int(2)
        .byte_op(Opcode::Array, 1)
        .op(Opcode::Add)
        .op(Opcode::Return);
    let result = run(asm).unwrap();
    assert!(result.equals(&array_of(vec![number(1.0), number(2.0)])));
    assert_eq!(left.len(), 1);
}

#[test]
fn test_array_set_difference() {
    // [1, 2, 3, 2] - [2] == [1, 3]
    let mut asm = Asm::new(0);
    asm.int(1)
        .int(2)
        .int(3)
        .int(2)
        .byte_op(Opcode::Array, 4)
        .int(2)
        .byte_op(Opcode::Array, 1)
        .op(Opcode::Subtract)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(1.0), number(3.0)])));
}

#[test]
fn test_array_slice_by_range() {
    let mut asm = Asm::new(0);
    asm.int(10)
        .int(20)
        .int(30)
        .int(40)
        .byte_op(Opcode::Array, 4)
        .int(1)
        .int(2)
        .op(Opcode::Range)
        .op(Opcode::GetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(20.0), number(30.0)])));
}

#[test]
fn test_struct_construction_and_field_access() {
    // struct {x, y}; instance (10, 20); .y == 20
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil)
        .string_const("x")
        .string_const("y")
        .byte_op(Opcode::Struct, 2)
        .int(10)
        .int(20)
        .byte_op(Opcode::Instance, 2)
        .field_op(Opcode::GetField, "y")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(20.0)));

    // Undefined field raises
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil)
        .string_const("x")
        .string_const("y")
        .byte_op(Opcode::Struct, 2)
        .byte_op(Opcode::Instance, 0)
        .field_op(Opcode::GetField, "z");
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Field);
    assert_eq!(err.message(), "no field z on struct");
}

#[test]
fn test_duplicate_struct_field_fails() {
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil)
        .string_const("x")
        .string_const("x")
        .byte_op(Opcode::Struct, 2);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Field);
    assert_eq!(err.message(), "field x is already defined");
}

#[test]
fn test_instance_pads_and_truncates_positional_args() {
    // Two-field struct built with three values keeps the first two
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil)
        .string_const("x")
        .string_const("y")
        .byte_op(Opcode::Struct, 2)
        .int(1)
        .int(2)
        .int(3)
        .byte_op(Opcode::Instance, 3)
        .field_op(Opcode::GetField, "y")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(2.0)));

    // One value pads the second field with nil
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil)
        .string_const("x")
        .string_const("y")
        .byte_op(Opcode::Struct, 2)
        .int(1)
        .byte_op(Opcode::Instance, 1)
        .field_op(Opcode::GetField, "y")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().is_nil());
}

#[test]
fn test_construct_builds_instance_from_pairs() {
    let mut asm = Asm::new(0);
    asm.string_const("Point")
        .string_const("x")
        .int(10)
        .string_const("y")
        .int(20)
        .byte_op(Opcode::Construct, 2)
        .field_op(Opcode::GetField, "x")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(10.0)));
}

#[test]
fn test_put_field_returns_updated_instance() {
    let mut asm = Asm::new(0);
    asm.string_const("Point")
        .string_const("x")
        .int(10)
        .string_const("y")
        .int(20)
        .byte_op(Opcode::Construct, 2)
        .int(99)
        .field_op(Opcode::PutField, "x")
        .field_op(Opcode::GetField, "x")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(99.0)));
}

#[test]
fn test_iteration_over_descending_range() {
    // for v in 5..1 { acc = acc + [v] }  ->  [5, 4, 3, 2, 1]
    let mut asm = Asm::new(0);
    asm.byte_op(Opcode::Array, 0); // slot 1: acc
    asm.op(Opcode::Nil); // slot 2: loop variable
    asm.int(5).int(1).op(Opcode::Range).op(Opcode::Iterator); // slot 3
    let loop_start = asm.here();
    let exit = asm.jump(Opcode::JumpIfNotValid);
    asm.op(Opcode::Current);
    asm.byte_op(Opcode::Load, 1)
        .byte_op(Opcode::Load, 2)
        .op(Opcode::AddElement)
        .byte_op(Opcode::Store, 1);
    asm.op(Opcode::Next);
    asm.jump_back(Opcode::Jump, loop_start);
    asm.patch(exit);
    asm.op(Opcode::Pop).op(Opcode::Pop); // iterator, loop variable
    asm.byte_op(Opcode::Load, 1).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![
        number(5.0),
        number(4.0),
        number(3.0),
        number(2.0),
        number(1.0)
    ])));
}

#[test]
fn test_iteration_over_array_visits_each_element_once() {
    let mut asm = Asm::new(0);
    asm.int(0); // slot 1: sum
    asm.op(Opcode::Nil); // slot 2: loop variable
    asm.int(10).int(20).int(30).byte_op(Opcode::Array, 3).op(Opcode::Iterator);
    let loop_start = asm.here();
    let exit = asm.jump(Opcode::JumpIfNotValid);
    asm.op(Opcode::Current);
    asm.byte_op(Opcode::Load, 1)
        .byte_op(Opcode::Load, 2)
        .op(Opcode::Add)
        .byte_op(Opcode::Store, 1);
    asm.op(Opcode::Next);
    asm.jump_back(Opcode::Jump, loop_start);
    asm.patch(exit);
    asm.op(Opcode::Pop).op(Opcode::Pop);
    asm.byte_op(Opcode::Load, 1).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(60.0)));
}

#[test]
fn test_iterator_opcode_is_identity_on_iterators() {
    let mut asm = Asm::new(0);
    asm.int(1)
        .int(2)
        .op(Opcode::Range)
        .op(Opcode::Iterator)
        .op(Opcode::Iterator) // second conversion is a no-op
        .op(Opcode::Nil)
        .op(Opcode::Pop)
        .op(Opcode::Pop)
        .op(Opcode::ReturnNil);
    assert!(run(asm).unwrap().is_nil());
}

#[test]
fn test_iterator_on_non_iterable_fails() {
    let mut asm = Asm::new(0);
    asm.int(1).op(Opcode::Iterator);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(
        err.message(),
        "type error: value of type number is not iterable"
    );
}

#[test]
fn test_call_arity_padding_and_surplus() {
    // Child of arity 3 returns its three arguments as an array.
    let mut child = Asm::new(3);
    child
        .byte_op(Opcode::Load, 1)
        .byte_op(Opcode::Load, 2)
        .byte_op(Opcode::Load, 3)
        .byte_op(Opcode::Array, 3)
        .op(Opcode::Return);
    let child = child.finish();

    // Called with one argument: the rest are nil.
    let mut asm = Asm::new(0);
    let index = asm.child(child);
    asm.byte_op(Opcode::Closure, index)
        .int(1)
        .byte_op(Opcode::Call, 1)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![
        number(1.0),
        Value::Nil,
        Value::Nil
    ])));
}

#[test]
fn test_call_with_surplus_arguments_observes_first_three() {
    let mut child = Asm::new(3);
    child
        .byte_op(Opcode::Load, 1)
        .byte_op(Opcode::Load, 2)
        .byte_op(Opcode::Load, 3)
        .byte_op(Opcode::Array, 3)
        .op(Opcode::Return);
    let child = child.finish();

    let mut asm = Asm::new(0);
    let index = asm.child(child);
    asm.byte_op(Opcode::Closure, index)
        .int(1)
        .int(2)
        .int(3)
        .int(4)
        .int(5)
        .byte_op(Opcode::Call, 5)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![
        number(1.0),
        number(2.0),
        number(3.0)
    ])));
}

#[test]
fn test_closure_captures_nonlocals() {
    let mut child = Asm::new(0);
    child.byte_op(Opcode::Nonlocal, 0).op(Opcode::Return);
    let mut child = child.finish();
    child.num_nonlocals = 1;

    let mut asm = Asm::new(0);
    let index = asm.child(child);
    asm.int(42)
        .byte_op(Opcode::Closure, index)
        .byte_op(Opcode::Call, 0)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(42.0)));
}

#[test]
fn test_unpack_array_pads_with_nil() {
    let mut asm = Asm::new(0);
    asm.int(1)
        .int(2)
        .byte_op(Opcode::Array, 2)
        .byte_op(Opcode::UnpackArray, 3)
        .byte_op(Opcode::Array, 3)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![
        number(1.0),
        number(2.0),
        Value::Nil
    ])));
}

#[test]
fn test_unpack_struct_by_field_names() {
    let mut asm = Asm::new(0);
    asm.string_const("x").string_const("missing");
    asm.string_const("Point")
        .string_const("x")
        .int(10)
        .string_const("y")
        .int(20)
        .byte_op(Opcode::Construct, 2);
    asm.byte_op(Opcode::UnpackStruct, 2)
        .byte_op(Opcode::Array, 2)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(10.0), Value::Nil])));
}

#[test]
fn test_conditional_jumps() {
    // if 1 != 2 then 200 else 100
    let mut asm = Asm::new(0);
    asm.int(1).int(2);
    let not_equal = asm.jump(Opcode::JumpIfNotEqual);
    asm.int(100).op(Opcode::Return);
    asm.patch(not_equal);
    asm.int(200).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(200.0)));

    // Same program with equal operands takes the fallthrough
    let mut asm = Asm::new(0);
    asm.int(1).int(1);
    let not_equal = asm.jump(Opcode::JumpIfNotEqual);
    asm.int(100).op(Opcode::Return);
    asm.patch(not_equal);
    asm.int(200).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(100.0)));
}

#[test]
fn test_or_pop_jump_keeps_value() {
    // `false or 7`: JumpIfTrueOrPop pops the false, leaving 7.
    let mut asm = Asm::new(0);
    asm.op(Opcode::False);
    let end = asm.jump(Opcode::JumpIfTrueOrPop);
    asm.int(7);
    asm.patch(end);
    asm.op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(7.0)));

    // `true or 7` short-circuits keeping true on the stack.
    let mut asm = Asm::new(0);
    asm.op(Opcode::True);
    let end = asm.jump(Opcode::JumpIfTrueOrPop);
    asm.int(7);
    asm.patch(end);
    asm.op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&Value::Bool(true)));
}

#[test]
fn test_relational_opcodes() {
    let mut asm = Asm::new(0);
    asm.int(2).int(3).op(Opcode::Less).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&Value::Bool(true)));

    let mut asm = Asm::new(0);
    asm.string_const("b").string_const("a").op(Opcode::NotGreater).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&Value::Bool(false)));

    let mut asm = Asm::new(0);
    asm.int(1).string_const("a").op(Opcode::Greater);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Comparison);
    assert_eq!(err.message(), "type error: cannot compare number and string");
}

#[test]
fn test_inplace_ops_match_copying_behavior() {
    // Unique handle: append in place.
    let mut asm = Asm::new(0);
    asm.int(1)
        .byte_op(Opcode::Array, 1)
        .int(2)
        .op(Opcode::InplaceAddElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(1.0), number(2.0)])));

    // Shared handle (a local still points at the array): same result.
    let mut asm = Asm::new(0);
    asm.int(1).byte_op(Opcode::Array, 1); // slot 1: the local
    asm.byte_op(Opcode::Load, 1)
        .int(2)
        .op(Opcode::InplaceAddElement)
        .byte_op(Opcode::Store, 1);
    asm.byte_op(Opcode::Load, 1).op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(1.0), number(2.0)])));
}

#[test]
fn test_inplace_put_and_delete_element() {
    let mut asm = Asm::new(0);
    asm.int(1)
        .int(2)
        .int(3)
        .byte_op(Opcode::Array, 3)
        .int(1)
        .int(99)
        .op(Opcode::InplacePutElement)
        .int(0)
        .op(Opcode::InplaceDeleteElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(99.0), number(3.0)])));
}

#[test]
fn test_fetch_then_set_element_writes_back() {
    // arr[1] = arr[1] + 5 via Fetch/Set
    let mut asm = Asm::new(0);
    asm.int(10)
        .int(20)
        .byte_op(Opcode::Array, 2)
        .int(1)
        .op(Opcode::FetchElement)
        .int(5)
        .op(Opcode::Add)
        .op(Opcode::SetElement)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&array_of(vec![number(10.0), number(25.0)])));
}

#[test]
fn test_global_reads_builtin_slot() {
    let mut asm = Asm::new(0);
    asm.byte_op(Opcode::Global, builtins::index_of("type").unwrap() as u8)
        .int(1)
        .byte_op(Opcode::Call, 1)
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&string("number")));
}

#[test]
fn test_load_module_and_field_access() {
    let mut asm = Asm::new(0);
    asm.string_const("numbers")
        .op(Opcode::LoadModule)
        .field_op(Opcode::GetField, "MAX_INTEGER")
        .op(Opcode::Return);
    assert!(run(asm).unwrap().equals(&number(9_007_199_254_740_991.0)));
}

#[test]
fn test_runtime_error_carries_trace() {
    let mut asm = Asm::new(0);
    asm.int(1).string_const("x").op(Opcode::Add);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(
        err.to_string(),
        "runtime error: type error: cannot add string to number\n  at main() in test.vl:1"
    );
}

#[test]
fn test_nested_call_trace_is_innermost_first() {
    let mut child = Asm::new(0);
    child.function.name = Some(Rc::new(VmString::from("boom")));
    child.op(Opcode::Nil).op(Opcode::Negate);
    let child = child.finish();

    let mut asm = Asm::new(0);
    let index = asm.child(child);
    asm.byte_op(Opcode::Closure, index).byte_op(Opcode::Call, 0);
    let err = run(asm).unwrap_err();
    let trace = err.trace();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].name.as_deref(), Some("boom"));
    assert_eq!(trace[1].name.as_deref(), Some("main"));
}

#[test]
fn test_native_error_frame_reports_native_location() {
    let mut asm = Asm::new(0);
    asm.byte_op(Opcode::Global, builtins::index_of("panic").unwrap() as u8)
        .string_const("kaboom")
        .byte_op(Opcode::Call, 1);
    let err = run(asm).unwrap_err();
    assert_eq!(err.message(), "kaboom");
    assert_eq!(err.trace()[0].name.as_deref(), Some("panic"));
    assert!(err.trace()[0].location.is_none());
    assert_eq!(err.trace()[1].location.as_ref().unwrap().0, "test.vl");
}

#[test]
fn test_failed_call_restores_stack_top() {
    let mut child = Asm::new(0);
    child.op(Opcode::Nil).op(Opcode::Negate);
    let child = child.finish();

    let mut state = State::default();
    let depth = state.depth();
    let mut asm = Asm::new(0);
    let index = asm.child(child);
    asm.byte_op(Opcode::Closure, index).byte_op(Opcode::Call, 0);
    state
        .push_closure(Closure::new(Rc::new(asm.finish()), Vec::new()))
        .unwrap();
    assert!(state.call(0).is_err());
    assert_eq!(state.depth(), depth);
}

#[test]
fn test_calling_a_non_callable_fails() {
    let mut asm = Asm::new(0);
    asm.int(3).byte_op(Opcode::Call, 0);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(
        err.message(),
        "type error: cannot call value of type number"
    );
}

#[test]
fn test_stack_overflow_is_reported() {
    let mut asm = Asm::new(0);
    let loop_start = asm.here();
    asm.int(1);
    asm.jump_back(Opcode::Jump, loop_start);
    let err = run(asm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StackOverflow);
    assert_eq!(err.message(), "stack overflow");
}

#[test]
fn test_range_requires_numbers() {
    let mut asm = Asm::new(0);
    asm.op(Opcode::Nil).int(1).op(Opcode::Range);
    let err = run(asm).unwrap_err();
    assert_eq!(err.message(), "type error: range must be of type number");
}

#[test]
fn test_embedder_aggregates() {
    let mut state = State::default();
    state.push_str("Point").unwrap();
    state.push_str("x").unwrap();
    state.push_number(1.0).unwrap();
    state.push_str("y").unwrap();
    state.push_number(2.0).unwrap();
    state.construct(2).unwrap();
    let Value::Instance(instance) = state.top().clone() else {
        panic!("expected instance");
    };
    state.pop();
    assert_eq!(instance.descriptor().name().unwrap().to_string(), "Point");
    assert!(instance.get_field(1).equals(&number(2.0)));

    state.push_number(1.0).unwrap();
    state.push_number(2.0).unwrap();
    state.array(2).unwrap();
    assert!(state.top().equals(&array_of(vec![number(1.0), number(2.0)])));
    state.pop();
}
