//! Callables
//!
//! A `Function` is compiled code: a chunk plus arity, names, and the table
//! of child functions referenced by `Closure` instructions. A `Closure`
//! pairs a function with the nonlocal values it captured at construction.
//! A `Native` wraps a host function behind the same calling convention.

use std::fmt;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::RuntimeError;
use crate::state::State;
use crate::string::VmString;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Function {
    /// None for anonymous functions.
    pub name: Option<Rc<VmString>>,
    /// Source file the function was compiled from.
    pub file: Rc<VmString>,
    pub arity: u8,
    /// Number of values a closure over this function captures.
    pub num_nonlocals: u8,
    pub chunk: Chunk,
    /// Child functions, indexed by the `Closure` instruction operand.
    pub functions: Vec<Rc<Function>>,
}

impl Function {
    pub fn new(name: Option<Rc<VmString>>, file: Rc<VmString>, arity: u8) -> Self {
        Function {
            name,
            file,
            arity,
            num_nonlocals: 0,
            chunk: Chunk::new(),
            functions: Vec::new(),
        }
    }

    /// Register a child function, returning its `Closure` operand.
    pub fn add_child(&mut self, child: Rc<Function>) -> u8 {
        let index = self.functions.len();
        debug_assert!(index <= u8::MAX as usize);
        self.functions.push(child);
        index as u8
    }
}

#[derive(Debug)]
pub struct Closure {
    pub function: Rc<Function>,
    /// Captured values; length equals `function.num_nonlocals`.
    pub nonlocals: Vec<Value>,
}

impl Closure {
    pub fn new(function: Rc<Function>, nonlocals: Vec<Value>) -> Self {
        debug_assert_eq!(nonlocals.len(), function.num_nonlocals as usize);
        Closure { function, nonlocals }
    }
}

/// Outcome of a successful native call.
///
/// `Suspend` is a reserved extension point for hosts that reschedule; the
/// interpreter treats it exactly like `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    Ok,
    Suspend,
}

/// Host callback: receives the state and the frame base. The callable sits
/// at the base slot, arguments at `base + 1 ..= base + arity`. On success
/// exactly one result value has been pushed.
pub type NativeFn = fn(&mut State, usize) -> Result<NativeStatus, RuntimeError>;

pub struct Native {
    pub name: Rc<VmString>,
    pub arity: u8,
    pub call: NativeFn,
}

impl Native {
    pub fn new(name: Rc<VmString>, arity: u8, call: NativeFn) -> Self {
        Native { name, arity, call }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name.to_string())
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
