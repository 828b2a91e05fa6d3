use super::TypeDef;
use crate::error::{Error, Result};
use crate::primitive::OverflowPolicy;
use std::cell::RefCell;

/// A named, typed field of a composite or interface type.
#[derive(Clone, Debug)]
pub struct Field {
  pub name: String,
  pub type_def: TypeDef,
  /// JSON-encoded default; `None` means the field's default is NULL.
  pub default: Option<serde_json::Value>,
  /// Overflow policy attached to this field, if any (only meaningful when
  /// `type_def` resolves to an integer primitive).
  pub overflow: Option<OverflowPolicy>,
}

impl Field {
  pub fn new(name: impl Into<String>, type_def: TypeDef) -> Self {
    Field {
      name: name.into(),
      type_def,
      default: None,
      overflow: None,
    }
  }
}

/// A nominal struct-like record type.
///
/// Fields are ordered: parent fields (recursively resolved), then each
/// implemented interface's fields (in `implements` order, recursively), then
/// own declared fields (spec.md §3.2). `register_stub` installs an empty
/// placeholder that mutually recursive types may reference before it is
/// populated in place.
#[derive(Debug)]
pub struct CompositeTypeDef {
  pub name: String,
  fields: RefCell<Vec<Field>>,
  interfaces: RefCell<Vec<String>>,
  parent: RefCell<Option<String>>,
}

impl CompositeTypeDef {
  pub fn stub(name: impl Into<String>) -> Self {
    CompositeTypeDef {
      name: name.into(),
      fields: RefCell::new(Vec::new()),
      interfaces: RefCell::new(Vec::new()),
      parent: RefCell::new(None),
    }
  }

  pub fn is_stub(&self) -> bool {
    self.fields.borrow().is_empty()
  }

  pub fn fields(&self) -> Vec<Field> {
    self.fields.borrow().clone()
  }

  pub fn interfaces(&self) -> Vec<String> {
    self.interfaces.borrow().clone()
  }

  pub fn parent(&self) -> Option<String> {
    self.parent.borrow().clone()
  }

  /// Populates a stub in place. Must only be called once per stub.
  pub fn populate(&self, fields: Vec<Field>, interfaces: Vec<String>, parent: Option<String>) {
    *self.fields.borrow_mut() = fields;
    *self.interfaces.borrow_mut() = interfaces;
    *self.parent.borrow_mut() = parent;
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
    Err(Error::UnknownType(format!("field '{}' not found in '{}'", name, self.name)))
  }
}

/// Merges parent + interface + own fields per spec.md §3.2, raising
/// `FieldConflict` when the same name disagrees on type across sources.
///
/// `owner` names the composite/interface being built, used only for error
/// messages.
pub fn merge_fields(owner: &str, sources: &[Vec<Field>]) -> Result<Vec<Field>> {
  let mut merged: Vec<Field> = Vec::new();
  for source in sources {
    for field in source {
      if let Some(existing) = merged.iter().find(|f| f.name == field.name) {
        if existing.type_def.name() != field.type_def.name() {
          return Err(Error::FieldConflict {
            owner: owner.to_string(),
            field: field.name.clone(),
            type_a: existing.type_def.name().to_string(),
            type_b: field.type_def.name().to_string(),
          });
        }
        // Identical type: keep the first occurrence (dedup per spec.md §3.1).
      } else {
        merged.push(field.clone());
      }
    }
  }
  Ok(merged)
}
