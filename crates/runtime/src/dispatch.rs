//! The opcode dispatch loop
//!
//! One call frame is a window of the value stack whose base slot holds the
//! callable, followed by the arguments and locals. The loop decodes one
//! opcode per iteration; operands are a trailing byte or a 16-bit
//! little-endian word. Any failure aborts the frame: the faulting line is
//! resolved from the chunk's line table, a trace frame is appended to the
//! error, and the stack is truncated to the caller's base.
//!
//! In-place opcode variants mutate their target only when the interpreter
//! holds the sole handle to it (`Rc::make_mut`, or `Rc::get_mut` for
//! iterator trait objects); otherwise they fall back to the copying
//! operation with the same observable result.

use std::rc::Rc;

use crate::array::Array;
use crate::chunk::Opcode;
use crate::error::RuntimeError;
use crate::function::{Closure, NativeStatus};
use crate::iterator::new_iterator;
use crate::range::Range;
use crate::state::State;
use crate::string::VmString;
use crate::structs::{Instance, Struct};
use crate::value::Value;

fn read_byte(code: &[u8], pc: &mut usize) -> usize {
    let byte = code[*pc];
    *pc += 1;
    byte as usize
}

fn read_word(code: &[u8], pc: &mut usize) -> u16 {
    let word = u16::from_le_bytes([code[*pc], code[*pc + 1]]);
    *pc += 2;
    word
}

impl State {
    pub(crate) fn do_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let frame = self.stack.len() - 1 - num_args;
        match self.stack[frame].clone() {
            Value::Native(native) => {
                if let Err(e) = self.adjust_call_args(native.arity as usize, num_args) {
                    self.discard_frame(frame);
                    return Err(e);
                }
                match (native.call)(self, frame) {
                    Ok(NativeStatus::Ok) | Ok(NativeStatus::Suspend) => {
                        self.move_result(frame);
                        Ok(())
                    }
                    Err(mut e) => {
                        if !e.take_no_trace() {
                            e.add_frame(Some(native.name.to_string()), None);
                        }
                        self.discard_frame(frame);
                        Err(e)
                    }
                }
            }
            Value::Closure(closure) => {
                let arity = closure.function.arity as usize;
                if let Err(e) = self.adjust_call_args(arity, num_args) {
                    self.discard_frame(frame);
                    return Err(e);
                }
                match self.call_closure(frame, &closure) {
                    Ok(()) => {
                        self.move_result(frame);
                        Ok(())
                    }
                    Err(e) => {
                        self.discard_frame(frame);
                        Err(e)
                    }
                }
            }
            other => {
                let e = RuntimeError::type_error(format!(
                    "cannot call value of type {}",
                    other.type_name()
                ));
                self.discard_frame(frame);
                Err(e)
            }
        }
    }

    /// Pad missing arguments with nil. Surplus arguments stay on the stack
    /// as dead locals and are released when the frame is discarded.
    fn adjust_call_args(&mut self, arity: usize, num_args: usize) -> Result<(), RuntimeError> {
        for _ in num_args..arity {
            self.push_raw(Value::Nil)?;
        }
        Ok(())
    }

    /// Move the callee's result into the base slot and release everything
    /// above it.
    fn move_result(&mut self, frame: usize) {
        let result = self.pop_value();
        self.stack.truncate(frame);
        self.stack.push(result);
    }

    /// Release the whole frame, base slot included.
    fn discard_frame(&mut self, frame: usize) {
        self.stack.truncate(frame);
    }

    fn call_closure(&mut self, frame: usize, closure: &Closure) -> Result<(), RuntimeError> {
        let function = Rc::clone(&closure.function);
        let mut pc = 0usize;
        match self.run(frame, closure, &mut pc) {
            Ok(()) => Ok(()),
            Err(mut e) => {
                let line = function.chunk.line_for(pc as i32);
                e.add_frame(
                    function.name.as_ref().map(|n| n.to_string()),
                    Some((function.file.to_string(), line)),
                );
                Err(e)
            }
        }
    }

    fn run(&mut self, frame: usize, closure: &Closure, pc: &mut usize) -> Result<(), RuntimeError> {
        let function = Rc::clone(&closure.function);
        let chunk = &function.chunk;
        let code = chunk.code();
        loop {
            if *pc >= code.len() {
                return Err(RuntimeError::new(
                    crate::error::ErrorKind::Runtime,
                    "chunk ended without return",
                ));
            }
            let byte = code[*pc];
            *pc += 1;
            let op = Opcode::from_byte(byte).ok_or_else(|| {
                RuntimeError::new(
                    crate::error::ErrorKind::Runtime,
                    format!("invalid opcode {byte}"),
                )
            })?;
            match op {
                Opcode::Nil => self.push_raw(Value::Nil)?,
                Opcode::False => self.push_raw(Value::Bool(false))?,
                Opcode::True => self.push_raw(Value::Bool(true))?,
                Opcode::Int => {
                    let word = read_word(code, pc) as i16;
                    self.push_raw(Value::Number(word as f64))?;
                }
                Opcode::Constant => {
                    let value = chunk.consts()[read_byte(code, pc)].clone();
                    self.push_raw(value)?;
                }
                Opcode::Range => self.do_range()?,
                Opcode::Array => {
                    let length = read_byte(code, pc);
                    self.do_array(length)?;
                }
                Opcode::Struct => {
                    let length = read_byte(code, pc);
                    self.do_struct(length)?;
                }
                Opcode::Instance => {
                    let num_args = read_byte(code, pc);
                    self.do_instance(num_args)?;
                }
                Opcode::Construct => {
                    let length = read_byte(code, pc);
                    self.do_construct(length)?;
                }
                Opcode::Iterator => self.do_iterator()?,
                Opcode::Closure => {
                    let child = Rc::clone(&function.functions[read_byte(code, pc)]);
                    self.do_closure(child)?;
                }
                Opcode::UnpackArray => {
                    let n = read_byte(code, pc);
                    self.do_unpack_array(n)?;
                }
                Opcode::UnpackStruct => {
                    let n = read_byte(code, pc);
                    self.do_unpack_struct(n)?;
                }
                Opcode::Pop => {
                    self.pop_value();
                }
                Opcode::Global => {
                    let value = self.stack[read_byte(code, pc)].clone();
                    self.push_raw(value)?;
                }
                Opcode::Nonlocal => {
                    let value = closure.nonlocals[read_byte(code, pc)].clone();
                    self.push_raw(value)?;
                }
                Opcode::Load => {
                    let value = self.stack[frame + read_byte(code, pc)].clone();
                    self.push_raw(value)?;
                }
                Opcode::Store => {
                    let index = read_byte(code, pc);
                    let value = self.pop_value();
                    self.stack[frame + index] = value;
                }
                Opcode::AddElement => self.do_add_element()?,
                Opcode::GetElement => self.do_get_element()?,
                Opcode::FetchElement => self.do_fetch_element()?,
                Opcode::SetElement => self.do_set_element()?,
                Opcode::PutElement => self.do_put_element()?,
                Opcode::DeleteElement => self.do_delete_element()?,
                Opcode::InplaceAddElement => self.do_inplace_add_element()?,
                Opcode::InplacePutElement => self.do_inplace_put_element()?,
                Opcode::InplaceDeleteElement => self.do_inplace_delete_element()?,
                Opcode::GetField => {
                    let name = field_name_const(chunk, read_byte(code, pc))?;
                    self.do_get_field(&name)?;
                }
                Opcode::FetchField => {
                    let name = field_name_const(chunk, read_byte(code, pc))?;
                    self.do_fetch_field(&name)?;
                }
                Opcode::SetField => self.do_set_field()?,
                Opcode::PutField => {
                    let name = field_name_const(chunk, read_byte(code, pc))?;
                    self.do_put_field(&name)?;
                }
                Opcode::InplacePutField => {
                    let name = field_name_const(chunk, read_byte(code, pc))?;
                    self.do_inplace_put_field(&name)?;
                }
                Opcode::Current => self.do_current()?,
                Opcode::Jump => {
                    *pc = read_word(code, pc) as usize;
                }
                Opcode::JumpIfFalse => {
                    let offset = read_word(code, pc) as usize;
                    if self.pop_value().is_falsey() {
                        *pc = offset;
                    }
                }
                Opcode::JumpIfTrue => {
                    let offset = read_word(code, pc) as usize;
                    if self.pop_value().is_truthy() {
                        *pc = offset;
                    }
                }
                Opcode::JumpIfTrueOrPop => {
                    let offset = read_word(code, pc) as usize;
                    if self.top().is_truthy() {
                        *pc = offset;
                    } else {
                        self.pop_value();
                    }
                }
                Opcode::JumpIfFalseOrPop => {
                    let offset = read_word(code, pc) as usize;
                    if self.top().is_falsey() {
                        *pc = offset;
                    } else {
                        self.pop_value();
                    }
                }
                Opcode::JumpIfNotEqual => {
                    let offset = read_word(code, pc) as usize;
                    let top = self.stack.len() - 1;
                    if self.stack[top - 1].equals(&self.stack[top]) {
                        self.pop_value();
                        self.pop_value();
                    } else {
                        self.pop_value();
                        *pc = offset;
                    }
                }
                Opcode::JumpIfNotValid => {
                    let offset = read_word(code, pc) as usize;
                    let Value::Iterator(it) = self.top() else {
                        return Err(RuntimeError::type_error(format!(
                            "cannot iterate value of type {}",
                            self.top().type_name()
                        )));
                    };
                    if !it.is_valid() {
                        *pc = offset;
                    }
                }
                Opcode::Next => self.do_next()?,
                Opcode::Equal => {
                    let b = self.pop_value();
                    let a = self.pop_value();
                    self.push_raw(Value::Bool(a.equals(&b)))?;
                }
                Opcode::Greater => self.do_comparison(|o| o.is_gt())?,
                Opcode::Less => self.do_comparison(|o| o.is_lt())?,
                Opcode::NotEqual => {
                    let b = self.pop_value();
                    let a = self.pop_value();
                    self.push_raw(Value::Bool(!a.equals(&b)))?;
                }
                Opcode::NotGreater => self.do_comparison(|o| o.is_le())?,
                Opcode::NotLess => self.do_comparison(|o| o.is_ge())?,
                Opcode::BitwiseOr => self.do_int_binary("bitwise or", |a, b| a | b)?,
                Opcode::BitwiseXor => self.do_int_binary("bitwise xor", |a, b| a ^ b)?,
                Opcode::BitwiseAnd => self.do_int_binary("bitwise and", |a, b| a & b)?,
                Opcode::LeftShift => {
                    self.do_int_binary("left shift", |a, b| a.wrapping_shl(b as u32))?;
                }
                Opcode::RightShift => {
                    self.do_int_binary("right shift", |a, b| a.wrapping_shr(b as u32))?;
                }
                Opcode::Add => self.do_add()?,
                Opcode::Subtract => self.do_subtract()?,
                Opcode::Multiply => self.do_multiply()?,
                Opcode::Divide => self.do_divide()?,
                Opcode::Quotient => self.do_quotient()?,
                Opcode::Remainder => self.do_remainder()?,
                Opcode::Negate => self.do_negate()?,
                Opcode::Not => {
                    let value = self.pop_value();
                    self.push_raw(Value::Bool(value.is_falsey()))?;
                }
                Opcode::BitwiseNot => self.do_bitwise_not()?,
                Opcode::Increment => self.do_increment(1.0)?,
                Opcode::Decrement => self.do_increment(-1.0)?,
                Opcode::Call => {
                    let num_args = read_byte(code, pc);
                    self.do_call(num_args)?;
                }
                Opcode::LoadModule => self.load_module()?,
                Opcode::Return => return Ok(()),
                Opcode::ReturnNil => {
                    self.push_raw(Value::Nil)?;
                    return Ok(());
                }
            }
        }
    }

    fn do_range(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let (Some(start), Some(end)) = (
            number_at(&self.stack, base),
            number_at(&self.stack, base + 1),
        ) else {
            return Err(RuntimeError::type_error("range must be of type number"));
        };
        self.stack.truncate(base);
        self.stack
            .push(Value::Range(Rc::new(Range::new(start as i64, end as i64))));
        Ok(())
    }

    pub(crate) fn do_array(&mut self, length: usize) -> Result<(), RuntimeError> {
        let base = self.stack.len() - length;
        let elements = self.stack.split_off(base);
        self.push_raw(Value::Array(Rc::new(Array::from_elements(elements))))
    }

    pub(crate) fn do_struct(&mut self, length: usize) -> Result<(), RuntimeError> {
        let base = self.stack.len() - length - 1;
        let name = struct_name_at(&self.stack, base)?;
        let mut strukt = Struct::new(name);
        for i in 1..=length {
            let field = field_string_at(&self.stack, base + i)?;
            if !strukt.define_field(Rc::clone(&field)) {
                return Err(RuntimeError::field_error(format!(
                    "field {field} is already defined"
                )));
            }
        }
        self.stack.truncate(base);
        self.stack.push(Value::Struct(Rc::new(strukt)));
        Ok(())
    }

    pub(crate) fn do_instance(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let base = self.stack.len() - num_args - 1;
        let Value::Struct(strukt) = self.stack[base].clone() else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as a struct",
                self.stack[base].type_name()
            )));
        };
        let length = strukt.len();
        // Surplus positional values are dropped, missing ones become nil.
        self.stack.truncate(base + 1 + num_args.min(length));
        while self.stack.len() < base + 1 + length {
            self.push_raw(Value::Nil)?;
        }
        let values = self.stack.split_off(base + 1);
        self.stack[base] = Value::Instance(Rc::new(Instance::with_values(strukt, values)));
        Ok(())
    }

    pub(crate) fn do_construct(&mut self, length: usize) -> Result<(), RuntimeError> {
        let n = length * 2;
        let base = self.stack.len() - n - 1;
        let name = struct_name_at(&self.stack, base)?;
        let mut strukt = Struct::new(name);
        for i in 0..length {
            let field = field_string_at(&self.stack, base + 1 + i * 2)?;
            if !strukt.define_field(Rc::clone(&field)) {
                return Err(RuntimeError::field_error(format!(
                    "field {field} is already defined"
                )));
            }
        }
        let values = (0..length)
            .map(|i| self.stack[base + 2 + i * 2].clone())
            .collect();
        self.stack.truncate(base);
        self.stack.push(Value::Instance(Rc::new(Instance::with_values(
            Rc::new(strukt),
            values,
        ))));
        Ok(())
    }

    fn do_iterator(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        if matches!(self.stack[top], Value::Iterator(_)) {
            return Ok(());
        }
        match new_iterator(&self.stack[top]) {
            Some(it) => {
                self.stack[top] = Value::Iterator(it);
                Ok(())
            }
            None => Err(RuntimeError::type_error(format!(
                "value of type {} is not iterable",
                self.stack[top].type_name()
            ))),
        }
    }

    fn do_closure(&mut self, function: Rc<crate::function::Function>) -> Result<(), RuntimeError> {
        let base = self.stack.len() - function.num_nonlocals as usize;
        let nonlocals = self.stack.split_off(base);
        self.push_raw(Value::Closure(Rc::new(Closure::new(function, nonlocals))))
    }

    fn do_unpack_array(&mut self, n: usize) -> Result<(), RuntimeError> {
        let Value::Array(array) = self.pop_checked("an array", |v| {
            matches!(v, Value::Array(_))
        })?
        else {
            unreachable!()
        };
        for i in 0..n {
            let value = array.elements().get(i).cloned().unwrap_or(Value::Nil);
            self.push_raw(value)?;
        }
        Ok(())
    }

    fn do_unpack_struct(&mut self, n: usize) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Instance(instance) = self.stack[top].clone() else {
            return Err(RuntimeError::type_error(format!(
                "value of type {} is not an instance of struct",
                self.stack[top].type_name()
            )));
        };
        let base = top - n;
        for i in 0..n {
            let name = field_string_at(&self.stack, base + i)?;
            let value = match instance.descriptor().index_of(&name) {
                Some(index) => instance.get_field(index).clone(),
                None => Value::Nil,
            };
            self.stack[base + i] = value;
        }
        self.pop_value();
        Ok(())
    }

    fn do_add_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let Value::Array(array) = &self.stack[base] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an array",
                self.stack[base].type_name()
            )));
        };
        let value = self.stack[base + 1].clone();
        let result = array.add_element(value);
        self.stack.truncate(base);
        self.stack.push(Value::Array(Rc::new(result)));
        Ok(())
    }

    fn do_get_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        match self.stack[base].clone() {
            Value::String(string) => match &self.stack[base + 1] {
                index @ Value::Number(_) => {
                    let index = int_index(index, string.len(), "string")?;
                    let result = string.slice(index, 1);
                    self.stack.truncate(base);
                    self.stack.push(Value::String(Rc::new(result)));
                    Ok(())
                }
                Value::Range(range) => {
                    let range = Rc::clone(range);
                    self.slice_string(base, string, &range);
                    Ok(())
                }
                other => Err(RuntimeError::type_error(format!(
                    "string cannot be indexed by {}",
                    other.type_name()
                ))),
            },
            Value::Array(array) => match &self.stack[base + 1] {
                index @ Value::Number(_) => {
                    let index = int_index(index, array.len(), "array")?;
                    let result = array.get(index).clone();
                    self.stack.truncate(base);
                    self.stack.push(result);
                    Ok(())
                }
                Value::Range(range) => {
                    let range = Rc::clone(range);
                    self.slice_array(base, array, &range);
                    Ok(())
                }
                other => Err(RuntimeError::type_error(format!(
                    "array cannot be indexed by {}",
                    other.type_name()
                ))),
            },
            other => Err(RuntimeError::type_error(format!(
                "{} cannot be indexed",
                other.type_name()
            ))),
        }
    }

    fn slice_string(&mut self, base: usize, string: Rc<VmString>, range: &Range) {
        let last = string.len() as i64 - 1;
        let (start, end) = (range.start(), range.end());
        if start > end || start > last || end < 0 {
            self.stack.truncate(base);
            self.stack.push(Value::String(Rc::new(VmString::new())));
            return;
        }
        if start <= 0 && end >= last {
            // The whole string: hand the existing handle back.
            self.stack.truncate(base + 1);
            return;
        }
        let result = string.slice(start as usize, (end - start + 1) as usize);
        self.stack.truncate(base);
        self.stack.push(Value::String(Rc::new(result)));
    }

    fn slice_array(&mut self, base: usize, array: Rc<Array>, range: &Range) {
        let last = array.len() as i64 - 1;
        let (start, end) = (range.start(), range.end());
        if start > end || start > last || end < 0 {
            self.stack.truncate(base);
            self.stack.push(Value::Array(Rc::new(Array::new())));
            return;
        }
        if start <= 0 && end >= last {
            self.stack.truncate(base + 1);
            return;
        }
        let elements = array.elements()[start as usize..=end as usize].to_vec();
        self.stack.truncate(base);
        self.stack
            .push(Value::Array(Rc::new(Array::from_elements(elements))));
    }

    fn do_fetch_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let Value::Array(array) = &self.stack[base] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an array",
                self.stack[base].type_name()
            )));
        };
        let index = int_index(&self.stack[base + 1], array.len(), "array")?;
        let element = array.get(index).clone();
        self.push_raw(element)
    }

    fn do_set_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 3;
        let Value::Array(array) = &self.stack[base] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an array",
                self.stack[base].type_name()
            )));
        };
        let index = int_index(&self.stack[base + 1], array.len(), "array")?;
        let value = self.stack[base + 2].clone();
        let result = array.set_element(index, value);
        self.stack.truncate(base);
        self.stack.push(Value::Array(Rc::new(result)));
        Ok(())
    }

    fn do_put_element(&mut self) -> Result<(), RuntimeError> {
        self.do_set_element()
    }

    fn do_delete_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let Value::Array(array) = &self.stack[base] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an array",
                self.stack[base].type_name()
            )));
        };
        let index = int_index(&self.stack[base + 1], array.len(), "array")?;
        let result = array.delete_element(index);
        self.stack.truncate(base);
        self.stack.push(Value::Array(Rc::new(result)));
        Ok(())
    }

    fn do_inplace_add_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        if !matches!(self.stack[base], Value::Array(_)) {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an array",
                self.stack[base].type_name()
            )));
        }
        let value = self.pop_value();
        let Value::Array(array) = &mut self.stack[base] else {
            unreachable!()
        };
        Rc::make_mut(array).inplace_add_element(value);
        Ok(())
    }

    fn do_inplace_put_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 3;
        let index = {
            let Value::Array(array) = &self.stack[base] else {
                return Err(RuntimeError::type_error(format!(
                    "cannot use {} as an array",
                    self.stack[base].type_name()
                )));
            };
            int_index(&self.stack[base + 1], array.len(), "array")?
        };
        let value = self.pop_value();
        self.pop_value();
        let Value::Array(array) = &mut self.stack[base] else {
            unreachable!()
        };
        Rc::make_mut(array).inplace_set_element(index, value);
        Ok(())
    }

    fn do_inplace_delete_element(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let index = {
            let Value::Array(array) = &self.stack[base] else {
                return Err(RuntimeError::type_error(format!(
                    "cannot use {} as an array",
                    self.stack[base].type_name()
                )));
            };
            int_index(&self.stack[base + 1], array.len(), "array")?
        };
        self.pop_value();
        let Value::Array(array) = &mut self.stack[base] else {
            unreachable!()
        };
        Rc::make_mut(array).inplace_delete_element(index);
        Ok(())
    }

    fn instance_field_index(
        &self,
        slot: usize,
        name: &VmString,
    ) -> Result<(Rc<Instance>, usize), RuntimeError> {
        let Value::Instance(instance) = &self.stack[slot] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an instance of struct",
                self.stack[slot].type_name()
            )));
        };
        match instance.descriptor().index_of(name) {
            Some(index) => Ok((Rc::clone(instance), index)),
            None => Err(RuntimeError::field_error(format!(
                "no field {name} on struct"
            ))),
        }
    }

    fn do_get_field(&mut self, name: &VmString) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let (instance, index) = self.instance_field_index(top, name)?;
        self.stack[top] = instance.get_field(index).clone();
        Ok(())
    }

    fn do_fetch_field(&mut self, name: &VmString) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let (instance, index) = self.instance_field_index(top, name)?;
        self.push_raw(Value::Number(index as f64))?;
        self.push_raw(instance.get_field(index).clone())
    }

    fn do_set_field(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 3;
        let Value::Instance(instance) = &self.stack[base] else {
            return Err(RuntimeError::type_error(format!(
                "cannot use {} as an instance of struct",
                self.stack[base].type_name()
            )));
        };
        let Some(index) = self.stack[base + 1].as_int() else {
            return Err(RuntimeError::type_error("field index must be an integer"));
        };
        let value = self.stack[base + 2].clone();
        let result = instance.set_field(index as usize, value);
        self.stack.truncate(base);
        self.stack.push(Value::Instance(Rc::new(result)));
        Ok(())
    }

    fn do_put_field(&mut self, name: &VmString) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let (instance, index) = self.instance_field_index(base, name)?;
        let value = self.pop_value();
        self.stack[base] = Value::Instance(Rc::new(instance.set_field(index, value)));
        Ok(())
    }

    fn do_inplace_put_field(&mut self, name: &VmString) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let index = self.instance_field_index(base, name)?.1;
        let value = self.pop_value();
        let Value::Instance(instance) = &mut self.stack[base] else {
            unreachable!()
        };
        Rc::make_mut(instance).inplace_set_field(index, value);
        Ok(())
    }

    fn do_current(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Iterator(it) = &self.stack[top] else {
            return Err(RuntimeError::type_error(format!(
                "cannot iterate value of type {}",
                self.stack[top].type_name()
            )));
        };
        let current = it.current();
        self.stack[top - 1] = current;
        Ok(())
    }

    fn do_next(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Iterator(it) = &mut self.stack[top] else {
            return Err(RuntimeError::type_error(format!(
                "cannot iterate value of type {}",
                self.stack[top].type_name()
            )));
        };
        // Iterator trait objects cannot use make_mut; replace the handle
        // with a fresh advanced iterator when it is shared.
        let advanced_in_place = Rc::get_mut(it).map(|it| it.advance()).is_some();
        if !advanced_in_place {
            *it = it.advanced();
        }
        Ok(())
    }

    fn do_comparison(
        &mut self,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let ordering = self.stack[base].compare(&self.stack[base + 1])?;
        self.stack.truncate(base);
        self.stack.push(Value::Bool(accept(ordering)));
        Ok(())
    }

    fn do_int_binary(&mut self, name: &str, f: fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let (Some(a), Some(b)) = (
            number_at(&self.stack, base),
            number_at(&self.stack, base + 1),
        ) else {
            return Err(RuntimeError::type_error(format!(
                "cannot apply `{name}` between {} and {}",
                self.stack[base].type_name(),
                self.stack[base + 1].type_name()
            )));
        };
        self.stack.truncate(base);
        self.stack
            .push(Value::Number(f(a as i64, b as i64) as f64));
        Ok(())
    }

    fn do_add(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        match &self.stack[base] {
            Value::Number(a) => {
                let Value::Number(b) = self.stack[base + 1] else {
                    return Err(RuntimeError::type_error(format!(
                        "cannot add {} to number",
                        self.stack[base + 1].type_name()
                    )));
                };
                let result = a + b;
                self.stack.truncate(base);
                self.stack.push(Value::Number(result));
                Ok(())
            }
            Value::String(_) => {
                if !matches!(self.stack[base + 1], Value::String(_)) {
                    return Err(RuntimeError::type_error(format!(
                        "cannot concatenate string and {}",
                        self.stack[base + 1].type_name()
                    )));
                }
                self.concat_strings(base);
                Ok(())
            }
            Value::Array(_) => {
                if !matches!(self.stack[base + 1], Value::Array(_)) {
                    return Err(RuntimeError::type_error(format!(
                        "cannot concatenate array and {}",
                        self.stack[base + 1].type_name()
                    )));
                }
                self.concat_arrays(base);
                Ok(())
            }
            other => Err(RuntimeError::type_error(format!(
                "cannot add {} to {}",
                self.stack[base + 1].type_name(),
                other.type_name()
            ))),
        }
    }

    fn concat_strings(&mut self, base: usize) {
        let Value::String(right) = self.pop_value() else {
            unreachable!()
        };
        let Value::String(left) = &mut self.stack[base] else {
            unreachable!()
        };
        if left.is_empty() {
            *left = right;
            return;
        }
        if right.is_empty() {
            return;
        }
        Rc::make_mut(left).inplace_concat(&right);
    }

    fn concat_arrays(&mut self, base: usize) {
        let Value::Array(right) = self.pop_value() else {
            unreachable!()
        };
        let Value::Array(left) = &mut self.stack[base] else {
            unreachable!()
        };
        if left.is_empty() {
            *left = right;
            return;
        }
        if right.is_empty() {
            return;
        }
        Rc::make_mut(left).inplace_concat(&right);
    }

    fn do_subtract(&mut self) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        match &self.stack[base] {
            Value::Number(a) => {
                let Value::Number(b) = self.stack[base + 1] else {
                    return Err(RuntimeError::type_error(format!(
                        "cannot subtract {} from number",
                        self.stack[base + 1].type_name()
                    )));
                };
                let result = a - b;
                self.stack.truncate(base);
                self.stack.push(Value::Number(result));
                Ok(())
            }
            Value::Array(_) => {
                if !matches!(self.stack[base + 1], Value::Array(_)) {
                    return Err(RuntimeError::type_error(format!(
                        "cannot diff between array and {}",
                        self.stack[base + 1].type_name()
                    )));
                }
                self.diff_arrays(base);
                Ok(())
            }
            other => Err(RuntimeError::type_error(format!(
                "cannot subtract {} from {}",
                self.stack[base + 1].type_name(),
                other.type_name()
            ))),
        }
    }

    fn diff_arrays(&mut self, base: usize) {
        let Value::Array(right) = self.pop_value() else {
            unreachable!()
        };
        let Value::Array(left) = &mut self.stack[base] else {
            unreachable!()
        };
        if left.is_empty() || right.is_empty() {
            return;
        }
        Rc::make_mut(left).inplace_diff(&right);
    }

    fn do_numeric_binary(
        &mut self,
        f: fn(f64, f64) -> f64,
        message: fn(&Value, &Value) -> String,
    ) -> Result<(), RuntimeError> {
        let base = self.stack.len() - 2;
        let (Some(a), Some(b)) = (
            number_at(&self.stack, base),
            number_at(&self.stack, base + 1),
        ) else {
            return Err(RuntimeError::type_error(message(
                &self.stack[base],
                &self.stack[base + 1],
            )));
        };
        self.stack.truncate(base);
        self.stack.push(Value::Number(f(a, b)));
        Ok(())
    }

    fn do_multiply(&mut self) -> Result<(), RuntimeError> {
        self.do_numeric_binary(
            |a, b| a * b,
            |a, b| format!("cannot multiply {} to {}", b.type_name(), a.type_name()),
        )
    }

    fn do_divide(&mut self) -> Result<(), RuntimeError> {
        self.do_numeric_binary(
            |a, b| a / b,
            |a, b| format!("cannot divide {} by {}", a.type_name(), b.type_name()),
        )
    }

    fn do_quotient(&mut self) -> Result<(), RuntimeError> {
        self.do_numeric_binary(
            |a, b| (a / b).floor(),
            |a, b| {
                format!(
                    "cannot apply `quotient` between {} and {}",
                    a.type_name(),
                    b.type_name()
                )
            },
        )
    }

    fn do_remainder(&mut self) -> Result<(), RuntimeError> {
        self.do_numeric_binary(
            |a, b| a % b,
            |a, b| {
                format!(
                    "cannot apply `remainder` between {} and {}",
                    a.type_name(),
                    b.type_name()
                )
            },
        )
    }

    fn do_negate(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Number(n) = self.stack[top] else {
            return Err(RuntimeError::type_error(format!(
                "cannot apply `negate` to {}",
                self.stack[top].type_name()
            )));
        };
        self.stack[top] = Value::Number(-n);
        Ok(())
    }

    fn do_bitwise_not(&mut self) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Number(n) = self.stack[top] else {
            return Err(RuntimeError::type_error(format!(
                "cannot apply `bitwise not` to {}",
                self.stack[top].type_name()
            )));
        };
        self.stack[top] = Value::Number(!(n as i64) as f64);
        Ok(())
    }

    fn do_increment(&mut self, delta: f64) -> Result<(), RuntimeError> {
        let top = self.stack.len() - 1;
        let Value::Number(n) = self.stack[top] else {
            let verb = if delta > 0.0 { "increment" } else { "decrement" };
            return Err(RuntimeError::type_error(format!(
                "cannot {verb} value of type {}",
                self.stack[top].type_name()
            )));
        };
        self.stack[top] = Value::Number(n + delta);
        Ok(())
    }

    fn pop_checked(
        &mut self,
        expected: &str,
        check: fn(&Value) -> bool,
    ) -> Result<Value, RuntimeError> {
        let top = self.stack.len() - 1;
        if !check(&self.stack[top]) {
            return Err(RuntimeError::type_error(format!(
                "value of type {} is not {expected}",
                self.stack[top].type_name()
            )));
        }
        Ok(self.pop_value())
    }
}

fn field_name_const(
    chunk: &crate::chunk::Chunk,
    index: usize,
) -> Result<Rc<VmString>, RuntimeError> {
    match &chunk.consts()[index] {
        Value::String(name) => Ok(Rc::clone(name)),
        other => Err(RuntimeError::type_error(format!(
            "field name must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn number_at(stack: &[Value], index: usize) -> Option<f64> {
    match stack[index] {
        Value::Number(n) => Some(n),
        _ => None,
    }
}

fn struct_name_at(stack: &[Value], index: usize) -> Result<Option<Rc<VmString>>, RuntimeError> {
    match &stack[index] {
        Value::Nil => Ok(None),
        Value::String(name) => Ok(Some(Rc::clone(name))),
        other => Err(RuntimeError::type_error(format!(
            "struct name must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn field_string_at(stack: &[Value], index: usize) -> Result<Rc<VmString>, RuntimeError> {
    match &stack[index] {
        Value::String(name) => Ok(Rc::clone(name)),
        other => Err(RuntimeError::type_error(format!(
            "field name must be a string, got {}",
            other.type_name()
        ))),
    }
}

/// Validate an integer index against `[0, length)`.
fn int_index(value: &Value, length: usize, container: &str) -> Result<usize, RuntimeError> {
    let Some(index) = value.as_int() else {
        return Err(RuntimeError::type_error(format!(
            "{container} cannot be indexed by {}",
            value.type_name()
        )));
    };
    if index < 0 || index >= length as i64 {
        return Err(RuntimeError::range_error(format!(
            "index {index} is out of bounds for {container} of length {length}"
        )));
    }
    Ok(index as usize)
}
