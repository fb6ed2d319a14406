//! The `numbers` module: numeric constants and a seedable generator.

use std::cell::Cell;

use crate::check;
use crate::error::RuntimeError;
use crate::function::NativeStatus;
use crate::state::State;

const PI: f64 = std::f64::consts::PI;
const TAU: f64 = std::f64::consts::TAU;

/// Largest doubles that still represent every smaller integer exactly.
const MAX_INTEGER: f64 = 9_007_199_254_740_991.0;
const MIN_INTEGER: f64 = -9_007_199_254_740_991.0;

thread_local! {
    // Generator state is thread-local rather than process-global so that
    // independent states on different threads do not interfere.
    static RNG_STATE: Cell<u64> = const { Cell::new(0x2545_f491_4f6c_dd1d) };
}

fn srand_call(state: &mut State, frame: usize) -> Result<NativeStatus, RuntimeError> {
    let seed = check::argument_number(state.slots(frame), 1)?;
    RNG_STATE.with(|s| s.set((seed as i64 as u64) | 1));
    state.push_nil()?;
    Ok(NativeStatus::Ok)
}

/// xorshift64*, mapped to [0, 1).
fn rand_call(state: &mut State, _frame: usize) -> Result<NativeStatus, RuntimeError> {
    let next = RNG_STATE.with(|s| {
        let mut x = s.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        s.set(x);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    });
    state.push_number((next >> 11) as f64 / (1u64 << 53) as f64)?;
    Ok(NativeStatus::Ok)
}

pub fn load(state: &mut State) -> Result<(), RuntimeError> {
    state.push_str("numbers")?;
    state.push_str("PI")?;
    state.push_number(PI)?;
    state.push_str("TAU")?;
    state.push_number(TAU)?;
    state.push_str("LARGEST")?;
    state.push_number(f64::MAX)?;
    state.push_str("SMALLEST")?;
    state.push_number(f64::MIN_POSITIVE)?;
    state.push_str("MAX_INTEGER")?;
    state.push_number(MAX_INTEGER)?;
    state.push_str("MIN_INTEGER")?;
    state.push_number(MIN_INTEGER)?;
    state.push_str("srand")?;
    state.push_new_native("srand", 1, srand_call)?;
    state.push_str("rand")?;
    state.push_new_native("rand", 0, rand_call)?;
    state.construct(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_module_shape() {
        let mut state = State::default();
        load(&mut state).unwrap();
        let Value::Instance(module) = state.top().clone() else {
            panic!("expected module instance");
        };
        state.pop();

        let descriptor = module.descriptor();
        assert_eq!(descriptor.name().unwrap().to_string(), "numbers");
        let pi = descriptor.index_of(&"PI".into()).unwrap();
        assert!(module.get_field(pi).equals(&Value::Number(PI)));
        let rand = descriptor.index_of(&"rand".into()).unwrap();
        assert!(module.get_field(rand).is_native());
    }

    #[test]
    fn test_rand_is_deterministic_after_srand() {
        let mut state = State::default();
        load(&mut state).unwrap();
        let Value::Instance(module) = state.top().clone() else {
            panic!("expected module instance");
        };
        state.pop();
        let descriptor = module.descriptor();
        let srand = module.get_field(descriptor.index_of(&"srand".into()).unwrap()).clone();
        let rand = module.get_field(descriptor.index_of(&"rand".into()).unwrap()).clone();

        let mut draw = |seed: f64| {
            state.push_value(srand.clone()).unwrap();
            state.push_number(seed).unwrap();
            state.call(1).unwrap();
            state.pop();
            state.push_value(rand.clone()).unwrap();
            state.call(0).unwrap();
            let &Value::Number(n) = state.top() else {
                panic!("expected number");
            };
            state.pop();
            n
        };

        let a = draw(7.0);
        let b = draw(7.0);
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }
}
