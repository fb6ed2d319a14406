//! Runtime errors
//!
//! An error aborts the current call chain. As each frame unwinds, one trace
//! frame is appended, so the final error carries the innermost frame first.
//! The embedder decides where the rendered block goes; the `Display` form is
//!
//! ```text
//! runtime error: <message>
//!   at <name>() in <file>:<line>
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StackOverflow,
    Type,
    Range,
    Field,
    Comparison,
    Arity,
    /// Host-raised failures (`assert`, `panic`, module loading).
    Runtime,
}

/// One line of the stack trace. A `None` location means a native frame.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub name: Option<String>,
    pub location: Option<(String, i32)>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("<anonymous>");
        match &self.location {
            Some((file, line)) => write!(f, "  at {name}() in {file}:{line}"),
            None => write!(f, "  at {name}() in <native>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeError {
    kind: ErrorKind,
    message: String,
    trace: Vec<TraceFrame>,
    no_trace: bool,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            trace: Vec::new(),
            no_trace: false,
        }
    }

    pub fn stack_overflow() -> Self {
        RuntimeError::new(ErrorKind::StackOverflow, "stack overflow")
    }

    pub fn type_error(message: impl fmt::Display) -> Self {
        RuntimeError::new(ErrorKind::Type, format!("type error: {message}"))
    }

    pub fn range_error(message: impl fmt::Display) -> Self {
        RuntimeError::new(ErrorKind::Range, format!("range error: {message}"))
    }

    pub fn field_error(message: impl Into<String>) -> Self {
        RuntimeError::new(ErrorKind::Field, message)
    }

    pub fn comparison_error(message: impl fmt::Display) -> Self {
        RuntimeError::new(ErrorKind::Comparison, format!("type error: {message}"))
    }

    pub fn arity_error(message: impl Into<String>) -> Self {
        RuntimeError::new(ErrorKind::Arity, message)
    }

    /// Suppress the trace frame of the reporting native. Used when a native
    /// propagates a failure whose frames were already recorded by a nested
    /// call.
    pub fn without_trace(mut self) -> Self {
        self.no_trace = true;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &[TraceFrame] {
        &self.trace
    }

    pub(crate) fn take_no_trace(&mut self) -> bool {
        std::mem::take(&mut self.no_trace)
    }

    pub(crate) fn add_frame(&mut self, name: Option<String>, location: Option<(String, i32)>) {
        self.trace.push(TraceFrame { name, location });
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime error: {}", self.message)?;
        for frame in &self.trace {
            write!(f, "\n{frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}
