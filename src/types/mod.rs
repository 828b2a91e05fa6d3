//! Component C: type definitions.
//!
//! Every registered name in a [`crate::registry::TypeRegistry`] resolves to a
//! `TypeDef`. A `TypeDef` is a thin enum over the kind-specific definitions;
//! each kind knows its own `size_bytes` and `reference_size` (spec.md §3.1).

mod alias;
mod array;
mod bigint;
mod composite;
mod enum_type;
mod fraction;
mod interface;
mod overflow;

pub use alias::AliasTypeDef;
pub use array::{ArrayKind, ArrayTypeDef};
pub use bigint::{BigIntTypeDef, BigUIntTypeDef};
pub use composite::{merge_fields, CompositeTypeDef, Field};
pub use enum_type::{EnumTypeDef, EnumVariant};
pub use fraction::FractionTypeDef;
pub use interface::InterfaceTypeDef;
pub use overflow::OverflowTypeDef;

use crate::primitive::PrimitiveKind;
use std::sync::Arc;

/// A fully resolved type definition.
///
/// `TypeDef` is cheap to clone: every variant holding nested structure wraps
/// it in an `Arc` so the registry can hand out shared, immutable snapshots
/// without cloning whole field lists on every lookup.
#[derive(Clone, Debug)]
pub enum TypeDef {
  Primitive(PrimitiveKind),
  Alias(Arc<AliasTypeDef>),
  Array(Arc<ArrayTypeDef>),
  Composite(Arc<CompositeTypeDef>),
  Interface(Arc<InterfaceTypeDef>),
  Enum(Arc<EnumTypeDef>),
  Overflow(Arc<OverflowTypeDef>),
  BigInt(Arc<BigIntTypeDef>),
  BigUInt(Arc<BigUIntTypeDef>),
  Fraction(Arc<FractionTypeDef>),
}

impl TypeDef {
  pub fn name(&self) -> &str {
    match self {
      TypeDef::Primitive(p) => p.name(),
      TypeDef::Alias(a) => &a.name,
      TypeDef::Array(a) => &a.name,
      TypeDef::Composite(c) => &c.name,
      TypeDef::Interface(i) => &i.name,
      TypeDef::Enum(e) => &e.name,
      TypeDef::Overflow(o) => &o.name,
      TypeDef::BigInt(b) => &b.name,
      TypeDef::BigUInt(b) => &b.name,
      TypeDef::Fraction(f) => &f.name,
    }
  }

  /// Bytes consumed by one standalone value of this type.
  pub fn size_bytes(&self) -> usize {
    match self {
      TypeDef::Primitive(p) => p.size_bytes(),
      TypeDef::Alias(a) => a.base_type.size_bytes(),
      TypeDef::Array(a) => a.size_bytes(),
      TypeDef::Composite(c) => c.size_bytes(),
      TypeDef::Interface(i) => i.size_bytes(),
      TypeDef::Enum(e) => e.size_bytes(),
      TypeDef::Overflow(o) => o.base.size_bytes(),
      TypeDef::BigInt(b) => b.array.size_bytes(),
      TypeDef::BigUInt(b) => b.array.size_bytes(),
      TypeDef::Fraction(_) => 16,
    }
  }

  /// Bytes a composite field referencing this type occupies inline.
  pub fn reference_size(&self) -> usize {
    match self {
      TypeDef::Primitive(p) => p.size_bytes(),
      TypeDef::Alias(a) => a.base_type.reference_size(),
      TypeDef::Array(_) => 8,
      TypeDef::Composite(_) => 4,
      TypeDef::Interface(_) => 6,
      TypeDef::Enum(e) => e.size_bytes(),
      TypeDef::Overflow(o) => o.base.size_bytes(),
      TypeDef::BigInt(_) => 8,
      TypeDef::BigUInt(_) => 8,
      TypeDef::Fraction(_) => 16,
    }
  }

  pub fn is_array(&self) -> bool {
    matches!(self, TypeDef::Array(_) | TypeDef::BigInt(_) | TypeDef::BigUInt(_))
  }

  pub fn is_primitive(&self) -> bool {
    matches!(self, TypeDef::Primitive(_))
  }

  pub fn is_composite(&self) -> bool {
    matches!(self, TypeDef::Composite(_))
  }

  pub fn is_interface(&self) -> bool {
    matches!(self, TypeDef::Interface(_))
  }

  pub fn is_enum(&self) -> bool {
    matches!(self, TypeDef::Enum(_))
  }

  /// Follows alias chains until reaching a non-alias base type.
  pub fn resolve_base_type(&self) -> TypeDef {
    match self {
      TypeDef::Alias(a) => a.base_type.resolve_base_type(),
      other => other.clone(),
    }
  }

  /// True for the synthetic built-in `string` array (character[]).
  pub fn is_string(&self) -> bool {
    match self.resolve_base_type() {
      TypeDef::Array(a) => a.kind == ArrayKind::String,
      _ => false,
    }
  }

  /// True for a set-flavored array.
  pub fn is_set(&self) -> bool {
    match self.resolve_base_type() {
      TypeDef::Array(a) => a.kind == ArrayKind::Set,
      _ => false,
    }
  }
}
