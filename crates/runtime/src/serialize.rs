//! Binary serialization of values, chunks, and functions
//!
//! Everything is little-endian. A value is a one-byte type tag followed by
//! its payload:
//!
//! - nil: nothing; bool: one byte; number: 8-byte IEEE-754 double
//! - string: i32 length + bytes
//! - range: two i64 endpoints
//! - array: i32 length + serialized elements
//! - struct: presence byte + optional name string, i32 field count, field
//!   name strings
//! - instance: struct payload + one value per field
//!
//! Iterators, callables, and user-data do not serialize. A chunk is its
//! code (i32 length + bytes), line table (i32 length + pairs of i32), and
//! constant pool (a value array). A function adds names, arity, nonlocal
//! count, and its child functions, recursively, so one root function
//! carries a whole compiled program.
//!
//! Streams are caller-owned; this module never closes them.

use std::fmt;
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::array::Array;
use crate::chunk::{Chunk, Line};
use crate::function::Function;
use crate::range::Range;
use crate::string::VmString;
use crate::structs::{Instance, Struct};
use crate::value::Value;

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_RANGE: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_STRUCT: u8 = 6;
const TAG_INSTANCE: u8 = 7;

#[derive(Debug)]
pub enum SerializeError {
    Io(io::Error),
    /// Value kind that has no wire representation.
    NotSerializable(&'static str),
    InvalidTag(u8),
    Malformed(String),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializeError::Io(e) => write!(f, "i/o error: {e}"),
            SerializeError::NotSerializable(kind) => {
                write!(f, "value of type {kind} cannot be serialized")
            }
            SerializeError::InvalidTag(tag) => write!(f, "invalid type tag {tag}"),
            SerializeError::Malformed(msg) => write!(f, "malformed stream: {msg}"),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(e: io::Error) -> Self {
        SerializeError::Io(e)
    }
}

fn write_i32<W: Write>(w: &mut W, n: i32) -> Result<(), SerializeError> {
    w.write_all(&n.to_le_bytes())?;
    Ok(())
}

fn write_i64<W: Write>(w: &mut W, n: i64) -> Result<(), SerializeError> {
    w.write_all(&n.to_le_bytes())?;
    Ok(())
}

fn write_f64<W: Write>(w: &mut W, n: f64) -> Result<(), SerializeError> {
    w.write_all(&n.to_le_bytes())?;
    Ok(())
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, SerializeError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, SerializeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64, SerializeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64, SerializeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_length<R: Read>(r: &mut R, what: &str) -> Result<usize, SerializeError> {
    let n = read_i32(r)?;
    if n < 0 {
        return Err(SerializeError::Malformed(format!(
            "negative {what} length {n}"
        )));
    }
    Ok(n as usize)
}

fn write_string<W: Write>(w: &mut W, s: &VmString) -> Result<(), SerializeError> {
    write_i32(w, s.len() as i32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> Result<VmString, SerializeError> {
    let length = read_length(r, "string")?;
    let mut bytes = vec![0u8; length];
    r.read_exact(&mut bytes)?;
    Ok(VmString::from_bytes(&bytes))
}

fn write_optional_string<W: Write>(w: &mut W, s: Option<&Rc<VmString>>) -> Result<(), SerializeError> {
    match s {
        Some(s) => {
            w.write_all(&[1])?;
            write_string(w, s)
        }
        None => {
            w.write_all(&[0])?;
            Ok(())
        }
    }
}

fn read_optional_string<R: Read>(r: &mut R) -> Result<Option<VmString>, SerializeError> {
    match read_u8(r)? {
        0 => Ok(None),
        1 => Ok(Some(read_string(r)?)),
        b => Err(SerializeError::Malformed(format!("invalid presence byte {b}"))),
    }
}

fn write_struct_payload<W: Write>(w: &mut W, s: &Struct) -> Result<(), SerializeError> {
    write_optional_string(w, s.name())?;
    write_i32(w, s.len() as i32)?;
    for name in s.field_names() {
        write_string(w, name)?;
    }
    Ok(())
}

fn read_struct_payload<R: Read>(r: &mut R) -> Result<Struct, SerializeError> {
    let name = read_optional_string(r)?.map(Rc::new);
    let mut strukt = Struct::new(name);
    let length = read_length(r, "field")?;
    for _ in 0..length {
        let field = Rc::new(read_string(r)?);
        if !strukt.define_field(Rc::clone(&field)) {
            return Err(SerializeError::Malformed(format!(
                "duplicate field {field}"
            )));
        }
    }
    Ok(strukt)
}

/// Write one value. Iterators, callables, and user-data fail
/// deterministically.
pub fn serialize_value<W: Write>(value: &Value, w: &mut W) -> Result<(), SerializeError> {
    match value {
        Value::Nil => w.write_all(&[TAG_NIL])?,
        Value::Bool(b) => w.write_all(&[TAG_BOOL, *b as u8])?,
        Value::Number(n) => {
            w.write_all(&[TAG_NUMBER])?;
            write_f64(w, *n)?;
        }
        Value::String(s) => {
            w.write_all(&[TAG_STRING])?;
            write_string(w, s)?;
        }
        Value::Range(range) => {
            w.write_all(&[TAG_RANGE])?;
            write_i64(w, range.start())?;
            write_i64(w, range.end())?;
        }
        Value::Array(array) => {
            w.write_all(&[TAG_ARRAY])?;
            write_value_array(w, array.elements())?;
        }
        Value::Struct(s) => {
            w.write_all(&[TAG_STRUCT])?;
            write_struct_payload(w, s)?;
        }
        Value::Instance(inst) => {
            w.write_all(&[TAG_INSTANCE])?;
            write_struct_payload(w, inst.descriptor())?;
            for i in 0..inst.len() {
                serialize_value(inst.get_field(i), w)?;
            }
        }
        other => return Err(SerializeError::NotSerializable(other.type_name())),
    }
    Ok(())
}

pub fn deserialize_value<R: Read>(r: &mut R) -> Result<Value, SerializeError> {
    let tag = read_u8(r)?;
    Ok(match tag {
        TAG_NIL => Value::Nil,
        TAG_BOOL => Value::Bool(read_u8(r)? != 0),
        TAG_NUMBER => Value::Number(read_f64(r)?),
        TAG_STRING => Value::String(Rc::new(read_string(r)?)),
        TAG_RANGE => {
            let start = read_i64(r)?;
            let end = read_i64(r)?;
            Value::Range(Rc::new(Range::new(start, end)))
        }
        TAG_ARRAY => Value::Array(Rc::new(Array::from_elements(read_value_array(r)?))),
        TAG_STRUCT => Value::Struct(Rc::new(read_struct_payload(r)?)),
        TAG_INSTANCE => {
            let strukt = Rc::new(read_struct_payload(r)?);
            let mut values = Vec::with_capacity(strukt.len());
            for _ in 0..strukt.len() {
                values.push(deserialize_value(r)?);
            }
            Value::Instance(Rc::new(Instance::with_values(strukt, values)))
        }
        tag => return Err(SerializeError::InvalidTag(tag)),
    })
}

fn write_value_array<W: Write>(w: &mut W, values: &[Value]) -> Result<(), SerializeError> {
    write_i32(w, values.len() as i32)?;
    for value in values {
        serialize_value(value, w)?;
    }
    Ok(())
}

fn read_value_array<R: Read>(r: &mut R) -> Result<Vec<Value>, SerializeError> {
    let length = read_length(r, "array")?;
    let mut values = Vec::with_capacity(length.min(4096));
    for _ in 0..length {
        values.push(deserialize_value(r)?);
    }
    Ok(values)
}

impl Chunk {
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<(), SerializeError> {
        write_i32(w, self.code().len() as i32)?;
        w.write_all(self.code())?;
        write_i32(w, self.lines().len() as i32)?;
        for line in self.lines() {
            write_i32(w, line.no)?;
            write_i32(w, line.offset)?;
        }
        write_value_array(w, self.consts())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Chunk, SerializeError> {
        let code_length = read_length(r, "code")?;
        let mut code = vec![0u8; code_length];
        r.read_exact(&mut code)?;
        let lines_length = read_length(r, "line table")?;
        let mut lines = Vec::with_capacity(lines_length.min(4096));
        for _ in 0..lines_length {
            let no = read_i32(r)?;
            let offset = read_i32(r)?;
            lines.push(Line { no, offset });
        }
        let consts = read_value_array(r)?;
        Ok(Chunk::from_parts(code, lines, consts))
    }
}

impl Function {
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<(), SerializeError> {
        write_optional_string(w, self.name.as_ref())?;
        write_string(w, &self.file)?;
        w.write_all(&[self.arity, self.num_nonlocals])?;
        self.chunk.serialize(w)?;
        write_i32(w, self.functions.len() as i32)?;
        for child in &self.functions {
            child.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Function, SerializeError> {
        let name = read_optional_string(r)?.map(Rc::new);
        let file = Rc::new(read_string(r)?);
        let arity = read_u8(r)?;
        let num_nonlocals = read_u8(r)?;
        let chunk = Chunk::deserialize(r)?;
        let num_children = read_length(r, "function table")?;
        let mut functions = Vec::with_capacity(num_children.min(256));
        for _ in 0..num_children {
            functions.push(Rc::new(Function::deserialize(r)?));
        }
        Ok(Function {
            name,
            file,
            arity,
            num_nonlocals,
            chunk,
            functions,
        })
    }
}
