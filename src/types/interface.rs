use super::composite::Field;
use crate::error::{Error, Result};
use std::cell::RefCell;

/// A field-contract type implemented by composites via multiple inheritance.
/// Not instantiable on its own; a field typed as an interface stores a tagged
/// `(type_id, index)` reference (spec.md §3.1).
#[derive(Debug)]
pub struct InterfaceTypeDef {
  pub name: String,
  fields: RefCell<Vec<Field>>,
  extends: RefCell<Vec<String>>,
}

impl InterfaceTypeDef {
  pub fn stub(name: impl Into<String>) -> Self {
    InterfaceTypeDef {
      name: name.into(),
      fields: RefCell::new(Vec::new()),
      extends: RefCell::new(Vec::new()),
    }
  }

  pub fn is_stub(&self) -> bool {
    self.fields.borrow().is_empty()
  }

  pub fn fields(&self) -> Vec<Field> {
    self.fields.borrow().clone()
  }

  pub fn extends(&self) -> Vec<String> {
    self.extends.borrow().clone()
  }

  pub fn populate(&self, fields: Vec<Field>, extends: Vec<String>) {
    *self.fields.borrow_mut() = fields;
    *self.extends.borrow_mut() = extends;
  }

  pub fn null_bitmap_size(&self) -> usize {
    let n = self.fields.borrow().len();
    if n == 0 {
      0
    } else {
      (n + 7) / 8
    }
  }

  pub fn size_bytes(&self) -> usize {
    self.null_bitmap_size() + self.fields.borrow().iter().map(|f| f.type_def.reference_size()).sum::<usize>()
  }

  pub fn get_field(&self, name: &str) -> Option<Field> {
    self.fields.borrow().iter().find(|f| f.name == name).cloned()
  }

  pub fn get_field_offset(&self, name: &str) -> Result<usize> {
    let mut offset = self.null_bitmap_size();
    for f in self.fields.borrow().iter() {
      if f.name == name {
        return Ok(offset);
      }
      offset += f.type_def.reference_size();
    }
    Err(Error::UnknownType(format!("field '{}' not found in interface '{}'", name, self.name)))
  }
}
