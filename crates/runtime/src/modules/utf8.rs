//! The `utf8` module: codepoint-aware length and slicing.
//!
//! Script strings are byte strings; these natives count UTF-8 sequences
//! instead of bytes. Decoding stops at the first byte that does not start
//! a sequence.

use crate::check;
use crate::error::RuntimeError;
use crate::function::NativeStatus;
use crate::state::State;
use crate::string::VmString;

/// Length in bytes of the sequence starting with `byte`; 0 for a
/// continuation byte.
fn sequence_len(byte: u8) -> usize {
    if byte & 0xc0 == 0x80 {
        return 0;
    }
    if byte & 0xf8 == 0xf0 {
        return 4;
    }
    if byte & 0xf0 == 0xe0 {
        return 3;
    }
    if byte & 0xe0 == 0xc0 {
        return 2;
    }
    1
}

fn len_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let string = check::argument_string(state.slots(frame), 1)?;
    let bytes = string.as_bytes();
    let mut count = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let n = sequence_len(bytes[i]);
        if n == 0 {
            break;
        }
        i += n;
        count += 1;
    }
    state.push_number(count as f64)?;
    Ok(NativeStatus::Ok)
}

fn sub_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let args = state.slots(frame);
    let string = check::argument_string(args, 1)?;
    let start = check::argument_int(args, 2)?.max(0) as usize;
    let end = check::argument_int(args, 3)?.max(0) as usize;
    let bytes = string.as_bytes();

    let mut count = 0usize;
    let mut i = 0usize;
    while i < bytes.len() && count < start {
        let n = sequence_len(bytes[i]);
        if n == 0 {
            break;
        }
        i += n;
        count += 1;
    }
    let byte_start = i;
    while i < bytes.len() && count < end {
        let n = sequence_len(bytes[i]);
        if n == 0 {
            break;
        }
        i += n;
        count += 1;
    }
    state.push_string(VmString::from_bytes(&bytes[byte_start..i]))?;
    Ok(NativeStatus::Ok)
}

pub fn load(state: &mut State) -> Result<(), RuntimeError> {
    state.push_str("utf8")?;
    state.push_str("len")?;
    state.push_new_native("len", 1, len_call)?;
    state.push_str("sub")?;
    state.push_new_native("sub", 3, sub_call)?;
    state.construct(2)
}
