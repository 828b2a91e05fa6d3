use super::composite::Field;
use crate::error::{Error, Result};
use crate::primitive::PrimitiveKind;
use std::cell::RefCell;

/// A single variant of an enum type: a name, an integer discriminant, and an
/// optional list of typed payload fields (empty for C-style variants).
#[derive(Clone, Debug)]
pub struct EnumVariant {
  pub name: String,
  pub discriminant: i64,
  pub fields: Vec<Field>,
}

/// A tagged-union or C-style enum type.
///
/// All variants must agree on style: either every variant is fieldless
/// (C-style) or at least one variant has fields (tagged), never a mix
/// (spec.md §3.1, `InvalidEnum`). Populating a stub with a mixed variant set
/// fails and leaves the stub unpopulated.
#[derive(Debug)]
pub struct EnumTypeDef {
  pub name: String,
  variants: RefCell<Vec<EnumVariant>>,
  has_explicit_values: RefCell<bool>,
  backing_type: RefCell<Option<PrimitiveKind>>,
}

impl EnumTypeDef {
  pub fn stub(name: impl Into<String>) -> Self {
    EnumTypeDef {
      name: name.into(),
      variants: RefCell::new(Vec::new()),
      has_explicit_values: RefCell::new(false),
      backing_type: RefCell::new(None),
    }
  }

  pub fn has_explicit_values(&self) -> bool {
    *self.has_explicit_values.borrow()
  }

  pub fn backing_type(&self) -> Option<PrimitiveKind> {
    *self.backing_type.borrow()
  }

  pub fn is_stub(&self) -> bool {
    self.variants.borrow().is_empty()
  }

  pub fn variants(&self) -> Vec<EnumVariant> {
    self.variants.borrow().clone()
  }

  /// Populates a stub in place, validating the no-mixed-styles invariant and
  /// rejecting an empty variant list.
  pub fn populate(&self, variants: Vec<EnumVariant>, has_explicit_values: bool, backing_type: Option<PrimitiveKind>) -> Result<()> {
    if variants.is_empty() {
      return Err(Error::InvalidEnum(self.name.clone(), "an enum must declare at least one variant"));
    }
    let any_with_fields = variants.iter().any(|v| !v.fields.is_empty());
    let any_without_fields = variants.iter().any(|v| v.fields.is_empty());
    if any_with_fields && any_without_fields {
      return Err(Error::InvalidEnum(
        self.name.clone(),
        "cannot mix C-style and tagged-union variants",
      ));
    }

    *self.variants.borrow_mut() = variants;
    *self.has_explicit_values.borrow_mut() = has_explicit_values;
    *self.backing_type.borrow_mut() = backing_type;
    Ok(())
  }

  pub fn discriminant_size(&self) -> usize {
    let max_disc = self.variants.borrow().iter().map(|v| v.discriminant).max().unwrap_or(0);
    if max_disc <= 0xFF {
      1
    } else if max_disc <= 0xFFFF {
      2
    } else {
      4
    }
  }

  pub fn has_associated_values(&self) -> bool {
    self.variants.borrow().iter().any(|v| !v.fields.is_empty())
  }

  pub fn size_bytes(&self) -> usize {
    if self.has_associated_values() {
      self.discriminant_size() + 4
    } else {
      self.discriminant_size()
    }
  }

  pub fn get_variant(&self, name: &str) -> Option<EnumVariant> {
    self.variants.borrow().iter().find(|v| v.name == name).cloned()
  }

  pub fn get_variant_by_discriminant(&self, disc: i64) -> Option<EnumVariant> {
    self.variants.borrow().iter().find(|v| v.discriminant == disc).cloned()
  }
}
