//! Values
//!
//! A value is one fixed-size cell: either an inline scalar (nil, bool,
//! number) or a shared handle to a heap object. Heap sharing is reference
//! counted through `Rc`; releasing is dropping. The interpreter's in-place
//! fast paths key off handle uniqueness (`Rc::get_mut`), the safe analogue
//! of the classic refcount-equals-one check.
//!
//! The flag bits of the classic tagged-cell design (object, falsey,
//! comparable, iterable, native) become predicates derived from the
//! discriminant, so the flag invariants hold for every value by
//! construction.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::array::Array;
use crate::error::RuntimeError;
use crate::function::{Closure, Native};
use crate::iterator::ValueIter;
use crate::range::Range;
use crate::string::VmString;
use crate::structs::{Instance, Struct};
use crate::userdata::UserData;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Rc<VmString>),
    Range(Rc<Range>),
    Array(Rc<Array>),
    Struct(Rc<Struct>),
    Instance(Rc<Instance>),
    Iterator(Rc<dyn ValueIter>),
    Closure(Rc<Closure>),
    Native(Rc<Native>),
    UserData(Rc<dyn UserData>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Range(_) => "range",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Instance(_) => "instance",
            Value::Iterator(_) => "iterator",
            Value::Closure(_) | Value::Native(_) => "callable",
            Value::UserData(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// True for values that carry a heap handle.
    pub fn is_object(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(_) | Value::Number(_))
    }

    /// Only nil and false are falsey.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_falsey()
    }

    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Value::Nil
                | Value::Bool(_)
                | Value::Number(_)
                | Value::String(_)
                | Value::Range(_)
                | Value::Array(_)
        )
    }

    pub fn is_iterable(&self) -> bool {
        matches!(self, Value::Range(_) | Value::Array(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Value::Native(_))
    }

    /// A number whose value survives truncation to i64 unchanged.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Number(n) if *n == (*n as i64) as f64 => Some(*n as i64),
            _ => None,
        }
    }

    /// Structural equality on comparables, pointer identity on the rest.
    /// Total on all type pairs; values of different types are never equal.
    /// NaN is not equal to itself.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.equals(b),
            (Value::Struct(a), Value::Struct(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::UserData(a), Value::UserData(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Total order over same-type comparables. Fails for non-comparable
    /// types, mismatched types, and NaN operands.
    pub fn compare(&self, other: &Value) -> Result<Ordering, RuntimeError> {
        if !self.is_comparable() {
            return Err(RuntimeError::comparison_error(format!(
                "value of type {} is not comparable",
                self.type_name()
            )));
        }
        match (self, other) {
            (Value::Nil, Value::Nil) => Ok(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).ok_or_else(|| {
                RuntimeError::comparison_error("cannot compare nan")
            }),
            (Value::String(a), Value::String(b)) => Ok(a.compare(b)),
            (Value::Range(a), Value::Range(b)) => Ok(a.compare(b)),
            (Value::Array(a), Value::Array(b)) => a.compare(b),
            _ => Err(RuntimeError::comparison_error(format!(
                "cannot compare {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n == (n as i64) as f64 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

/// The unquoted rendering; the alternate form (`{:#}`) quotes strings, as
/// when printing aggregate contents.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) if f.alternate() => write!(f, "\"{s}\""),
            Value::String(s) => write!(f, "{s}"),
            Value::Range(r) => write!(f, "{r}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, elem) in a.elements().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem:#}")?;
                }
                write!(f, "]")
            }
            Value::Struct(s) => match s.name() {
                Some(name) => write!(f, "<struct {name}>"),
                None => write!(f, "<struct>"),
            },
            Value::Instance(inst) => {
                if let Some(name) = inst.descriptor().name() {
                    write!(f, "{name} ")?;
                }
                write!(f, "{{")?;
                for (i, value) in (0..inst.len()).map(|i| (i, inst.get_field(i))) {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {value:#}", inst.descriptor().field_name(i))?;
                }
                write!(f, "}}")
            }
            Value::Iterator(_) => write!(f, "<iterator>"),
            Value::Closure(cl) => match &cl.function.name {
                Some(name) => write!(f, "<fn {name}>"),
                None => write!(f, "<fn>"),
            },
            Value::Native(native) => write!(f, "<native {}>", native.name),
            Value::UserData(u) => write!(f, "<{}>", u.kind()),
        }
    }
}

// Debug renders the quoted Display form; iterators and natives have no
// derivable representation.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#}")
    }
}
