//! Struct descriptors and instances
//!
//! A struct is an ordered list of unique field names with a name-to-index
//! lookup; an instance pairs a descriptor with one value per field, laid
//! out in field order. Descriptors are immutable once built, so many
//! instances can share one descriptor.

use std::collections::HashMap;
use std::rc::Rc;

use crate::string::VmString;
use crate::value::Value;

/// Field counts up to this size are served by a linear scan; larger
/// descriptors switch to a hash map.
const SMALL_FIELD_LIMIT: usize = 8;

#[derive(Debug)]
enum FieldIndex {
    Small,
    Large(HashMap<Vec<u8>, usize>),
}

#[derive(Debug)]
pub struct Struct {
    name: Option<Rc<VmString>>,
    fields: Vec<Rc<VmString>>,
    index: FieldIndex,
}

impl Struct {
    pub fn new(name: Option<Rc<VmString>>) -> Self {
        Struct {
            name,
            fields: Vec::new(),
            index: FieldIndex::Small,
        }
    }

    pub fn name(&self) -> Option<&Rc<VmString>> {
        self.name.as_ref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_name(&self, index: usize) -> &Rc<VmString> {
        &self.fields[index]
    }

    pub fn field_names(&self) -> &[Rc<VmString>] {
        &self.fields
    }

    /// Append a field; returns false when the name is already defined.
    pub fn define_field(&mut self, name: Rc<VmString>) -> bool {
        if self.index_of(&name).is_some() {
            return false;
        }
        let slot = self.fields.len();
        self.fields.push(name);
        match &mut self.index {
            FieldIndex::Small if self.fields.len() > SMALL_FIELD_LIMIT => {
                let map = self
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (f.as_bytes().to_vec(), i))
                    .collect();
                self.index = FieldIndex::Large(map);
            }
            FieldIndex::Small => {}
            FieldIndex::Large(map) => {
                map.insert(self.fields[slot].as_bytes().to_vec(), slot);
            }
        }
        true
    }

    pub fn index_of(&self, name: &VmString) -> Option<usize> {
        match &self.index {
            FieldIndex::Small => self
                .fields
                .iter()
                .position(|f| f.as_bytes() == name.as_bytes()),
            FieldIndex::Large(map) => map.get(name.as_bytes()).copied(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instance {
    descriptor: Rc<Struct>,
    values: Vec<Value>,
}

impl Instance {
    /// All fields start out nil.
    pub fn new(descriptor: Rc<Struct>) -> Self {
        let values = vec![Value::Nil; descriptor.len()];
        Instance { descriptor, values }
    }

    pub fn with_values(descriptor: Rc<Struct>, values: Vec<Value>) -> Self {
        debug_assert_eq!(values.len(), descriptor.len());
        Instance { descriptor, values }
    }

    pub fn descriptor(&self) -> &Rc<Struct> {
        &self.descriptor
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_field(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn set_field(&self, index: usize, value: Value) -> Instance {
        let mut values = self.values.clone();
        values[index] = value;
        Instance {
            descriptor: Rc::clone(&self.descriptor),
            values,
        }
    }

    pub fn inplace_set_field(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(names: &[&str]) -> Struct {
        let mut s = Struct::new(None);
        for name in names {
            assert!(s.define_field(Rc::new(VmString::from(*name))));
        }
        s
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let mut s = descriptor(&["x", "y"]);
        assert!(!s.define_field(Rc::new(VmString::from("x"))));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_field_order_is_insertion_order() {
        let s = descriptor(&["x", "y", "z"]);
        assert_eq!(s.index_of(&VmString::from("x")), Some(0));
        assert_eq!(s.index_of(&VmString::from("z")), Some(2));
        assert_eq!(s.index_of(&VmString::from("w")), None);
    }

    #[test]
    fn test_lookup_survives_growth_past_small_limit() {
        let names: Vec<String> = (0..12).map(|i| format!("field{i}")).collect();
        let mut s = Struct::new(None);
        for name in &names {
            assert!(s.define_field(Rc::new(VmString::from(name.as_str()))));
        }
        for (i, name) in names.iter().enumerate() {
            assert_eq!(s.index_of(&VmString::from(name.as_str())), Some(i));
        }
        assert!(!s.define_field(Rc::new(VmString::from("field3"))));
    }

    #[test]
    fn test_instance_starts_nil_and_sets_copy() {
        let s = Rc::new(descriptor(&["x", "y"]));
        let inst = Instance::new(Rc::clone(&s));
        assert!(inst.get_field(0).is_nil());

        let updated = inst.set_field(1, Value::Number(7.0));
        assert!(inst.get_field(1).is_nil());
        assert!(updated.get_field(1).equals(&Value::Number(7.0)));
    }
}
