//! Builtin globals
//!
//! The builtin registration step pushes one native per entry of `BUILTINS`
//! onto the bottom of a fresh stack, so the `Global` instruction can read
//! them by absolute slot. Compilers resolve builtin names to slots through
//! `index_of`.

use crate::check;
use crate::error::{ErrorKind, RuntimeError};
use crate::function::{NativeFn, NativeStatus};
use crate::state::State;
use crate::value::Value;

const BUILTINS: &[(&str, u8, NativeFn)] = &[
    ("print", 1, print_call),
    ("println", 1, println_call),
    ("type", 1, type_call),
    ("bool", 1, bool_call),
    ("int", 1, int_call),
    ("str", 1, str_call),
    ("len", 1, len_call),
    ("cap", 1, cap_call),
    ("is_empty", 1, is_empty_call),
    ("compare", 2, compare_call),
    ("assert", 2, assert_call),
    ("panic", 1, panic_call),
];

/// Slot of the builtin global `name`.
pub fn index_of(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|(n, _, _)| *n == name)
}

pub(crate) fn register(state: &mut State) {
    for (name, arity, call) in BUILTINS {
        state
            .push_new_native(name, *arity, *call)
            .expect("builtin globals fit in the minimum stack");
    }
}

fn print_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    print!("{}", state.slots(frame)[1]);
    state.push_nil()?;
    Ok(NativeStatus::Ok)
}

fn println_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    println!("{}", state.slots(frame)[1]);
    state.push_nil()?;
    Ok(NativeStatus::Ok)
}

fn type_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let name = state.slots(frame)[1].type_name();
    state.push_str(name)?;
    Ok(NativeStatus::Ok)
}

fn bool_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let truthy = state.slots(frame)[1].is_truthy();
    state.push_bool(truthy)?;
    Ok(NativeStatus::Ok)
}

/// Truncate a number or parse a decimal string.
fn int_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let result = match &state.slots(frame)[1] {
        Value::Number(n) => n.trunc(),
        Value::String(s) => {
            let text = s.to_string();
            match text.trim().parse::<f64>() {
                Ok(n) => n.trunc(),
                Err(_) => {
                    return Err(RuntimeError::type_error(format!(
                        "cannot convert `{text}` to int"
                    )));
                }
            }
        }
        other => {
            return Err(RuntimeError::type_error(format!(
                "cannot convert {} to int",
                other.type_name()
            )));
        }
    };
    state.push_number(result)?;
    Ok(NativeStatus::Ok)
}

fn str_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let rendered = state.slots(frame)[1].to_string();
    state.push_str(&rendered)?;
    Ok(NativeStatus::Ok)
}

fn len_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let length = match &state.slots(frame)[1] {
        Value::String(s) => s.len(),
        Value::Range(r) => r.len(),
        Value::Array(a) => a.len(),
        Value::Struct(s) => s.len(),
        Value::Instance(i) => i.len(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "cannot get the length of {}",
                other.type_name()
            )));
        }
    };
    state.push_number(length as f64)?;
    Ok(NativeStatus::Ok)
}

fn cap_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let capacity = match &state.slots(frame)[1] {
        Value::String(s) => s.capacity(),
        Value::Array(a) => a.capacity(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "cannot get the capacity of {}",
                other.type_name()
            )));
        }
    };
    state.push_number(capacity as f64)?;
    Ok(NativeStatus::Ok)
}

fn is_empty_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let empty = match &state.slots(frame)[1] {
        Value::String(s) => s.is_empty(),
        Value::Range(r) => r.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Struct(s) => s.is_empty(),
        Value::Instance(i) => i.is_empty(),
        other => {
            return Err(RuntimeError::type_error(format!(
                "cannot get the length of {}",
                other.type_name()
            )));
        }
    };
    state.push_bool(empty)?;
    Ok(NativeStatus::Ok)
}

fn compare_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let args = state.slots(frame);
    let ordering = args[1].compare(&args[2])?;
    state.push_number(ordering as i8 as f64)?;
    Ok(NativeStatus::Ok)
}

fn assert_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let args = state.slots(frame);
    if args[1].is_falsey() {
        let message = check::argument_string(args, 2)
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "assertion failed".into());
        return Err(RuntimeError::new(ErrorKind::Runtime, message));
    }
    state.push_nil()?;
    Ok(NativeStatus::Ok)
}

fn panic_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let args = state.slots(frame);
    check::argument_provided(args, 1)?;
    let message = check::argument_string(args, 1)?;
    Err(RuntimeError::new(ErrorKind::Runtime, message.to_string()))
}
