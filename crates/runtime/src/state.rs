//! Interpreter state
//!
//! A state owns one contiguous value stack with a capacity fixed at
//! initialization, the builtin globals living at the bottom of that stack,
//! a per-state module cache, and the injected module resolver. Multiple
//! states coexist without sharing anything.
//!
//! A state is deliberately not `Send`: the interpreter must never be
//! entered concurrently from two threads, and the `Rc`-based value handles
//! enforce that at compile time.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use tracing::debug;

use crate::array::Array;
use crate::builtins;
use crate::error::RuntimeError;
use crate::function::{Closure, Native, NativeFn};
use crate::module::{DefaultResolver, ModuleResolver};
use crate::range::Range;
use crate::string::VmString;
use crate::structs::{Instance, Struct};
use crate::userdata::UserData;
use crate::value::Value;

/// Smallest stack a state will allocate, in slots.
pub const MIN_STACK_CAPACITY: usize = 256;

/// Capacity used by `State::default`.
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

pub struct State {
    pub(crate) stack: Vec<Value>,
    pub(crate) capacity: usize,
    pub(crate) num_globals: usize,
    pub(crate) modules: HashMap<Vec<u8>, Value>,
    pub(crate) resolver: Rc<dyn ModuleResolver>,
}

impl State {
    /// Create a state whose stack holds at least `min_capacity` slots,
    /// rounded up to a power of two, with the default module resolver.
    pub fn new(min_capacity: usize) -> Self {
        State::with_resolver(min_capacity, Rc::new(DefaultResolver))
    }

    pub fn with_resolver(min_capacity: usize, resolver: Rc<dyn ModuleResolver>) -> Self {
        let capacity = min_capacity.max(MIN_STACK_CAPACITY).next_power_of_two();
        let mut state = State {
            stack: Vec::with_capacity(capacity),
            capacity,
            num_globals: 0,
            modules: HashMap::new(),
            resolver,
        };
        builtins::register(&mut state);
        state.num_globals = state.stack.len();
        debug!(capacity, globals = state.num_globals, "state initialized");
        state
    }

    /// Number of values on the stack, globals included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_globals(&self) -> usize {
        self.num_globals
    }

    /// Slot of the builtin global `name`, for compilers resolving names to
    /// `Global` operands.
    pub fn global_index(&self, name: &str) -> Option<usize> {
        builtins::index_of(name)
    }

    pub fn get(&self, index: usize) -> &Value {
        &self.stack[index]
    }

    pub fn top(&self) -> &Value {
        self.stack.last().expect("stack underflow")
    }

    /// The frame window starting at `base`; natives read their arguments
    /// from `slots(base)[1..=arity]`.
    pub fn slots(&self, base: usize) -> &[Value] {
        &self.stack[base..]
    }

    pub(crate) fn push_raw(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() == self.capacity {
            return Err(RuntimeError::stack_overflow());
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop_value(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.push_raw(value)
    }

    pub fn push_nil(&mut self) -> Result<(), RuntimeError> {
        self.push_raw(Value::Nil)
    }

    pub fn push_bool(&mut self, data: bool) -> Result<(), RuntimeError> {
        self.push_raw(Value::Bool(data))
    }

    pub fn push_number(&mut self, data: f64) -> Result<(), RuntimeError> {
        self.push_raw(Value::Number(data))
    }

    pub fn push_string(&mut self, string: VmString) -> Result<(), RuntimeError> {
        self.push_raw(Value::String(Rc::new(string)))
    }

    pub fn push_str(&mut self, data: &str) -> Result<(), RuntimeError> {
        self.push_string(VmString::from(data))
    }

    /// Push a string read from `reader` up to `terminal` or end of stream.
    pub fn push_string_from_stream<R: Read>(
        &mut self,
        reader: &mut R,
        terminal: u8,
    ) -> Result<(), RuntimeError> {
        let string = VmString::from_stream(reader, terminal)
            .map_err(|e| RuntimeError::new(crate::error::ErrorKind::Runtime, e.to_string()))?;
        self.push_string(string)
    }

    pub fn push_range(&mut self, range: Range) -> Result<(), RuntimeError> {
        self.push_raw(Value::Range(Rc::new(range)))
    }

    pub fn push_array(&mut self, array: Array) -> Result<(), RuntimeError> {
        self.push_raw(Value::Array(Rc::new(array)))
    }

    pub fn push_struct(&mut self, strukt: Struct) -> Result<(), RuntimeError> {
        self.push_raw(Value::Struct(Rc::new(strukt)))
    }

    pub fn push_instance(&mut self, instance: Instance) -> Result<(), RuntimeError> {
        self.push_raw(Value::Instance(Rc::new(instance)))
    }

    pub fn push_closure(&mut self, closure: Closure) -> Result<(), RuntimeError> {
        self.push_raw(Value::Closure(Rc::new(closure)))
    }

    pub fn push_native(&mut self, native: Native) -> Result<(), RuntimeError> {
        self.push_raw(Value::Native(Rc::new(native)))
    }

    pub fn push_new_native(
        &mut self,
        name: &str,
        arity: u8,
        call: NativeFn,
    ) -> Result<(), RuntimeError> {
        self.push_native(Native::new(Rc::new(VmString::from(name)), arity, call))
    }

    pub fn push_userdata(&mut self, data: Rc<dyn UserData>) -> Result<(), RuntimeError> {
        self.push_raw(Value::UserData(data))
    }

    pub fn pop(&mut self) {
        assert!(!self.stack.is_empty(), "stack underflow");
        self.stack.pop();
    }

    /// Collapse the top `length` slots into an array.
    pub fn array(&mut self, length: usize) -> Result<(), RuntimeError> {
        self.do_array(length)
    }

    /// Collapse a name slot plus `length` field-name slots into a struct.
    pub fn strukt(&mut self, length: usize) -> Result<(), RuntimeError> {
        self.do_struct(length)
    }

    /// Collapse a struct slot plus up to `num_args` positional values into
    /// an instance.
    pub fn instance(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        self.do_instance(num_args)
    }

    /// Collapse a name slot plus `length` (field name, value) pairs into an
    /// instance of an anonymous struct.
    pub fn construct(&mut self, length: usize) -> Result<(), RuntimeError> {
        self.do_construct(length)
    }

    /// Call the value at `depth() - 1 - num_args` with the arguments above
    /// it. On failure the frame is discarded and the stack is back to the
    /// caller's base.
    pub fn call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        assert!(num_args < self.stack.len(), "stack underflow");
        self.do_call(num_args)
    }

    /// The comparison contract exposed to embedders and natives.
    pub fn compare(&self, a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
        a.compare(b)
    }
}

impl Default for State {
    fn default() -> Self {
        State::new(DEFAULT_STACK_CAPACITY)
    }
}

impl Drop for State {
    fn drop(&mut self) {
        // Embedders must leave the stack as they found it: only the globals.
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.stack.len(),
                self.num_globals,
                "stack must contain only the globals at teardown"
            );
        }
    }
}
