use crate::primitive::{OverflowPolicy, PrimitiveKind};

/// Wraps a primitive base type with a clamp/wrap policy applied on write.
/// Constructing one over a float kind is rejected by the registry at
/// registration time (spec.md §3.1: "Floats reject overflow policies").
#[derive(Debug)]
pub struct OverflowTypeDef {
  pub name: String,
  pub base: PrimitiveKind,
  pub policy: OverflowPolicy,
}

impl OverflowTypeDef {
  pub fn new(name: impl Into<String>, base: PrimitiveKind, policy: OverflowPolicy) -> Option<Self> {
    if base.is_float() {
      return None;
    }
    Some(OverflowTypeDef {
      name: name.into(),
      base,
      policy,
    })
  }
}
