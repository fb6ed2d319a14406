//! Argument checks for native callables
//!
//! Natives receive their arguments at `slots(frame)[1..=arity]`, already
//! padded with nil. These helpers validate one argument and hand back a
//! typed view, raising the standard type-error shape on mismatch.

use std::rc::Rc;

use crate::array::Array;
use crate::error::RuntimeError;
use crate::string::VmString;
use crate::value::Value;

fn type_mismatch(index: usize, expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "argument #{index} must be of the type {expected}, {} given",
        got.type_name()
    ))
}

/// Reject a nil argument slot. With call-site padding, nil here means the
/// caller did not supply argument `index` at all.
pub fn argument_provided(args: &[Value], index: usize) -> Result<(), RuntimeError> {
    if args[index].is_nil() {
        return Err(RuntimeError::arity_error(format!(
            "argument #{index} is required"
        )));
    }
    Ok(())
}

pub fn argument_bool(args: &[Value], index: usize) -> Result<bool, RuntimeError> {
    match &args[index] {
        Value::Bool(b) => Ok(*b),
        other => Err(type_mismatch(index, "bool", other)),
    }
}

pub fn argument_number(args: &[Value], index: usize) -> Result<f64, RuntimeError> {
    match &args[index] {
        Value::Number(n) => Ok(*n),
        other => Err(type_mismatch(index, "number", other)),
    }
}

pub fn argument_int(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args[index].as_int() {
        Some(n) => Ok(n),
        None => Err(type_mismatch(index, "integer", &args[index])),
    }
}

pub fn argument_string(args: &[Value], index: usize) -> Result<Rc<VmString>, RuntimeError> {
    match &args[index] {
        Value::String(s) => Ok(Rc::clone(s)),
        other => Err(type_mismatch(index, "string", other)),
    }
}

pub fn argument_array(args: &[Value], index: usize) -> Result<Rc<Array>, RuntimeError> {
    match &args[index] {
        Value::Array(a) => Ok(Rc::clone(a)),
        other => Err(type_mismatch(index, "array", other)),
    }
}
