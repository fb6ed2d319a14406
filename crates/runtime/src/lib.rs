//! Vela runtime: the execution core of the Vela language
//!
//! Key design principles:
//! - Value: a fixed-size cell, inline scalar or shared heap handle
//! - State: one contiguous value stack, globals at the bottom, a module
//!   cache, and an injected module resolver
//! - Dispatch: one chunk at a time against a frame whose base slot is the
//!   callable; in-place fast paths trigger on handle uniqueness
//!
//! The compiler (scanner, parser, code generator) lives outside this crate;
//! it targets the state API and produces `Function` values whose chunks
//! this crate interprets.

pub mod array;
pub mod builtins;
pub mod chunk;
pub mod check;
mod dispatch;
pub mod dump;
pub mod error;
pub mod function;
pub mod iterator;
pub mod module;
pub mod modules;
pub mod range;
pub mod serialize;
pub mod state;
pub mod string;
pub mod structs;
pub mod userdata;
pub mod value;

// Re-export the types embedders touch most.
pub use array::Array;
pub use chunk::{Chunk, Line, Opcode};
pub use error::{ErrorKind, RuntimeError, TraceFrame};
pub use function::{Closure, Function, Native, NativeFn, NativeStatus};
pub use iterator::ValueIter;
pub use module::{DefaultResolver, ModuleResolver};
pub use range::Range;
pub use serialize::{SerializeError, deserialize_value, serialize_value};
pub use state::{DEFAULT_STACK_CAPACITY, MIN_STACK_CAPACITY, State};
pub use string::VmString;
pub use structs::{Instance, Struct};
pub use userdata::UserData;
pub use value::Value;
