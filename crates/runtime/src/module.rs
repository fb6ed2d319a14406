//! Module loading
//!
//! The `LoadModule` instruction consumes a string name from the top of the
//! stack and pushes one value representing the module, typically an
//! instance whose fields are native callables. Resolution is delegated to
//! a `ModuleResolver` injected at state construction, so embedders and
//! tests swap in their own; results are cached per state.

use tracing::debug;

use crate::error::{ErrorKind, RuntimeError};
use crate::modules;
use crate::state::State;
use crate::string::VmString;
use crate::value::Value;

pub trait ModuleResolver {
    /// Push exactly one value for the module `name`, or fail.
    fn resolve(&self, state: &mut State, name: &VmString) -> Result<(), RuntimeError>;
}

/// Resolves the native modules that ship with the runtime.
#[derive(Debug, Default)]
pub struct DefaultResolver;

impl ModuleResolver for DefaultResolver {
    fn resolve(&self, state: &mut State, name: &VmString) -> Result<(), RuntimeError> {
        match name.as_bytes() {
            b"numbers" => modules::numbers::load(state),
            b"encoding" => modules::encoding::load(state),
            b"utf8" => modules::utf8::load(state),
            _ => Err(RuntimeError::new(
                ErrorKind::Runtime,
                format!("cannot load module named `{name}`"),
            )),
        }
    }
}

impl State {
    pub(crate) fn load_module(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::String(name) = self.stack[top].clone() else {
            return Err(RuntimeError::type_error(format!(
                "module name must be a string, got {}",
                self.stack[top].type_name()
            )));
        };
        self.pop_value();
        if let Some(module) = self.modules.get(name.as_bytes()) {
            let module = module.clone();
            return self.push_raw(module);
        }
        let resolver = std::rc::Rc::clone(&self.resolver);
        let depth = self.stack.len();
        resolver.resolve(self, &name)?;
        debug_assert_eq!(self.stack.len(), depth + 1, "resolver must push one value");
        debug!(module = %name, "module loaded");
        self.modules
            .insert(name.as_bytes().to_vec(), self.top().clone());
        Ok(())
    }
}
