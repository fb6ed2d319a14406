//! The `encoding` module: base64 and hex over byte strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::check;
use crate::error::RuntimeError;
use crate::function::NativeStatus;
use crate::state::State;
use crate::string::VmString;

fn base64_encode_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let input = check::argument_string(state.slots(frame), 1)?;
    let encoded = STANDARD.encode(input.as_bytes());
    state.push_str(&encoded)?;
    Ok(NativeStatus::Ok)
}

fn base64_decode_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let input = check::argument_string(state.slots(frame), 1)?;
    let decoded = STANDARD
        .decode(input.as_bytes())
        .map_err(|e| RuntimeError::type_error(format!("invalid base64 input: {e}")))?;
    state.push_string(VmString::from_bytes(&decoded))?;
    Ok(NativeStatus::Ok)
}

fn hex_encode_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let input = check::argument_string(state.slots(frame), 1)?;
    state.push_str(&hex::encode(input.as_bytes()))?;
    Ok(NativeStatus::Ok)
}

fn hex_decode_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let input = check::argument_string(state.slots(frame), 1)?;
    let decoded = hex::decode(input.as_bytes())
        .map_err(|e| RuntimeError::type_error(format!("invalid hex input: {e}")))?;
    state.push_string(VmString::from_bytes(&decoded))?;
    Ok(NativeStatus::Ok)
}

pub fn load(state: &mut State) -> Result<(), RuntimeError> {
    state.push_str("encoding")?;
    state.push_str("base64_encode")?;
    state.push_new_native("base64_encode", 1, base64_encode_call)?;
    state.push_str("base64_decode")?;
    state.push_new_native("base64_decode", 1, base64_decode_call)?;
    state.push_str("hex_encode")?;
    state.push_new_native("hex_encode", 1, hex_encode_call)?;
    state.push_str("hex_decode")?;
    state.push_new_native("hex_decode", 1, hex_decode_call)?;
    state.construct(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn call_field(state: &mut State, module: &Value, field: &str, arg: &str) -> Result<Value, RuntimeError> {
        let Value::Instance(module) = module else {
            panic!("expected module instance");
        };
        let index = module.descriptor().index_of(&field.into()).unwrap();
        state.push_value(module.get_field(index).clone()).unwrap();
        state.push_str(arg).unwrap();
        state.call(1)?;
        let result = state.top().clone();
        state.pop();
        Ok(result)
    }

    fn load_module(state: &mut State) -> Value {
        load(state).unwrap();
        let module = state.top().clone();
        state.pop();
        module
    }

    #[test]
    fn test_base64_round_trip() {
        let mut state = State::default();
        let module = load_module(&mut state);
        let encoded = call_field(&mut state, &module, "base64_encode", "hello").unwrap();
        assert!(encoded.equals(&Value::String(std::rc::Rc::new("aGVsbG8=".into()))));
        let decoded = call_field(&mut state, &module, "base64_decode", "aGVsbG8=").unwrap();
        assert!(decoded.equals(&Value::String(std::rc::Rc::new("hello".into()))));
    }

    #[test]
    fn test_hex_round_trip_and_bad_input() {
        let mut state = State::default();
        let module = load_module(&mut state);
        let encoded = call_field(&mut state, &module, "hex_encode", "\x01\x02").unwrap();
        assert!(encoded.equals(&Value::String(std::rc::Rc::new("0102".into()))));
        assert!(call_field(&mut state, &module, "hex_decode", "zz").is_err());
    }
}
