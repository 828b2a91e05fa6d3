//! Component B: the type registry.
//!
//! A named lookup of every type known to a schema. Supports stub/forward
//! declaration so mutually recursive and cyclic types can reference each
//! other before being fully populated, and assigns persistent `u16` type IDs
//! used for interface polymorphism (spec.md §4.B).

use crate::error::{Error, Result};
use crate::primitive::PrimitiveKind;
use crate::types::{
  self, AliasTypeDef, ArrayKind, ArrayTypeDef, BigIntTypeDef, BigUIntTypeDef, CompositeTypeDef, EnumTypeDef, Field,
  FractionTypeDef, InterfaceTypeDef, OverflowTypeDef, TypeDef,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all defined types for one schema/database.
///
/// Immutable once a type is populated (stubs notwithstanding): there is no
/// API to mutate a concrete type's fields after the fact. `TypeRegistry`
/// itself is not `Sync`; concurrent access must be serialized externally
/// (spec.md §5).
pub struct TypeRegistry {
  types: RefCell<HashMap<String, TypeDef>>,
  type_ids: RefCell<HashMap<String, u16>>,
  next_type_id: RefCell<u16>,
}

const BUILTIN_PRIMITIVES: &[PrimitiveKind] = &[
  PrimitiveKind::Bit,
  PrimitiveKind::Character,
  PrimitiveKind::Uint8,
  PrimitiveKind::Int8,
  PrimitiveKind::Uint16,
  PrimitiveKind::Int16,
  PrimitiveKind::Uint32,
  PrimitiveKind::Int32,
  PrimitiveKind::Uint64,
  PrimitiveKind::Int64,
  PrimitiveKind::Uint128,
  PrimitiveKind::Int128,
  PrimitiveKind::Float16,
  PrimitiveKind::Float32,
  PrimitiveKind::Float64,
];

impl TypeRegistry {
  /// Constructs a registry with every built-in primitive (and `string`,
  /// `boolean`, `bigint`, `biguint`, `fraction`, `path`) pre-registered
  /// (spec.md §3.2).
  pub fn new() -> Self {
    let registry = TypeRegistry {
      types: RefCell::new(HashMap::new()),
      type_ids: RefCell::new(HashMap::new()),
      next_type_id: RefCell::new(1),
    };
    registry.register_builtins();
    registry
  }

  fn register_builtins(&self) {
    let mut types = self.types.borrow_mut();
    for kind in BUILTIN_PRIMITIVES {
      types.insert(kind.name().to_string(), TypeDef::Primitive(*kind));
    }

    // `boolean` is implicitly primitive=bit (spec.md §4.H).
    types.insert("boolean".to_string(), TypeDef::Primitive(PrimitiveKind::Bit));

    let character = TypeDef::Primitive(PrimitiveKind::Character);
    types.insert(
      "string".to_string(),
      TypeDef::Array(Arc::new(ArrayTypeDef::new("string", character, ArrayKind::String))),
    );

    types.insert("bigint".to_string(), TypeDef::BigInt(Arc::new(BigIntTypeDef::new())));
    types.insert("biguint".to_string(), TypeDef::BigUInt(Arc::new(BigUIntTypeDef::new())));
    types.insert("fraction".to_string(), TypeDef::Fraction(Arc::new(FractionTypeDef::new())));

    let string_ref = types.get("string").unwrap().clone();
    types.insert("path".to_string(), TypeDef::Alias(Arc::new(AliasTypeDef { name: "path".to_string(), base_type: string_ref })));
  }

  /// Inserts a type definition. Fails with `DuplicateName` unless `name` is
  /// unused or currently bound to a matching-kind empty stub.
  pub fn register(&self, type_def: TypeDef) -> Result<()> {
    let name = type_def.name().to_string();
    let mut types = self.types.borrow_mut();
    if let Some(existing) = types.get(&name) {
      if !is_empty_stub_of_same_kind(existing, &type_def) {
        return Err(Error::DuplicateName(name));
      }
    }
    types.insert(name, type_def);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<TypeDef> {
    self.types.borrow().get(name).cloned()
  }

  pub fn get_or_raise(&self, name: &str) -> Result<TypeDef> {
    self.get(name).ok_or_else(|| Error::UnknownType(name.to_string()))
  }

  /// Returns the canonical array type for `element_type_name`, creating and
  /// caching it under `"<element>[]"` on first use.
  pub fn get_array_type(&self, element_type_name: &str) -> Result<Arc<ArrayTypeDef>> {
    let array_name = ArrayTypeDef::canonical_name(element_type_name);
    if let Some(existing) = self.types.borrow().get(&array_name) {
      return match existing {
        TypeDef::Array(a) => Ok(a.clone()),
        _ => Err(Error::StubConflict(array_name)),
      };
    }

    let element_type = self.get_or_raise(element_type_name)?;
    let array = Arc::new(ArrayTypeDef::new(array_name.clone(), element_type, ArrayKind::Plain));
    self.types.borrow_mut().insert(array_name, TypeDef::Array(array.clone()));
    Ok(array)
  }

  /// Installs (or returns) an empty composite stub, for forward/self
  /// references. Idempotent with itself; conflicts with any other kind.
  pub fn register_stub(&self, name: &str) -> Result<Arc<CompositeTypeDef>> {
    let mut types = self.types.borrow_mut();
    if let Some(existing) = types.get(name) {
      return match existing {
        TypeDef::Composite(c) if c.is_stub() => Ok(c.clone()),
        _ => Err(Error::StubConflict(name.to_string())),
      };
    }
    let stub = Arc::new(CompositeTypeDef::stub(name));
    types.insert(name.to_string(), TypeDef::Composite(stub.clone()));
    Ok(stub)
  }

  pub fn register_interface_stub(&self, name: &str) -> Result<Arc<InterfaceTypeDef>> {
    let mut types = self.types.borrow_mut();
    if let Some(existing) = types.get(name) {
      return match existing {
        TypeDef::Interface(i) if i.is_stub() => Ok(i.clone()),
        _ => Err(Error::StubConflict(name.to_string())),
      };
    }
    let stub = Arc::new(InterfaceTypeDef::stub(name));
    types.insert(name.to_string(), TypeDef::Interface(stub.clone()));
    Ok(stub)
  }

  pub fn register_enum_stub(&self, name: &str) -> Result<Arc<EnumTypeDef>> {
    let mut types = self.types.borrow_mut();
    if let Some(existing) = types.get(name) {
      return match existing {
        TypeDef::Enum(e) if e.is_stub() => Ok(e.clone()),
        _ => Err(Error::StubConflict(name.to_string())),
      };
    }
    let stub = Arc::new(EnumTypeDef::stub(name));
    types.insert(name.to_string(), TypeDef::Enum(stub.clone()));
    Ok(stub)
  }

  /// Populates a composite stub with its full field list, merged in
  /// declaration order from its parent's fields, then each implemented
  /// interface's fields (in `implements` order), then `own_fields`
  /// (spec.md §3.2). A name reused across sources with a different type
  /// raises `FieldConflict`; an identical-type reuse is deduplicated,
  /// keeping the first occurrence.
  pub fn populate_composite(&self, name: &str, own_fields: Vec<Field>, interfaces: Vec<String>, parent: Option<String>) -> Result<()> {
    let stub = match self.get(name) {
      Some(TypeDef::Composite(c)) if c.is_stub() => c,
      _ => return Err(Error::StubConflict(name.to_string())),
    };

    let mut sources = Vec::new();
    if let Some(parent_name) = &parent {
      match self.get_or_raise(parent_name)? {
        TypeDef::Composite(p) => sources.push(p.fields()),
        _ => return Err(Error::UnknownType(format!("parent '{}' of '{}' is not a composite", parent_name, name))),
      }
    }
    for interface_name in &interfaces {
      match self.get_or_raise(interface_name)? {
        TypeDef::Interface(i) => sources.push(i.fields()),
        _ => return Err(Error::UnknownType(format!("'{}' implemented by '{}' is not an interface", interface_name, name))),
      }
    }
    sources.push(own_fields);

    let merged = types::merge_fields(name, &sources)?;
    stub.populate(merged, interfaces, parent);
    Ok(())
  }

  /// Populates an interface stub the same way, merging each extended
  /// interface's fields (in `extends` order) ahead of `own_fields`.
  pub fn populate_interface(&self, name: &str, own_fields: Vec<Field>, extends: Vec<String>) -> Result<()> {
    let stub = match self.get(name) {
      Some(TypeDef::Interface(i)) if i.is_stub() => i,
      _ => return Err(Error::StubConflict(name.to_string())),
    };

    let mut sources = Vec::new();
    for parent_name in &extends {
      match self.get_or_raise(parent_name)? {
        TypeDef::Interface(p) => sources.push(p.fields()),
        _ => return Err(Error::UnknownType(format!("'{}' extended by '{}' is not an interface", parent_name, name))),
      }
    }
    sources.push(own_fields);

    let merged = types::merge_fields(name, &sources)?;
    stub.populate(merged, extends);
    Ok(())
  }

  pub fn is_stub(&self, name: &str) -> bool {
    matches!(self.get(name), Some(TypeDef::Composite(c)) if c.is_stub())
  }

  pub fn is_interface_stub(&self, name: &str) -> bool {
    matches!(self.get(name), Some(TypeDef::Interface(i)) if i.is_stub())
  }

  pub fn is_enum_stub(&self, name: &str) -> bool {
    matches!(self.get(name), Some(TypeDef::Enum(e)) if e.is_stub())
  }

  /// Returns a type's persistent `u16` ID, assigning the next free one on
  /// first call. IDs survive metadata roundtrip (spec.md §3.2).
  pub fn get_type_id(&self, type_name: &str) -> u16 {
    if let Some(id) = self.type_ids.borrow().get(type_name) {
      return *id;
    }
    let mut next = self.next_type_id.borrow_mut();
    let id = *next;
    *next += 1;
    self.type_ids.borrow_mut().insert(type_name.to_string(), id);
    id
  }

  pub fn get_type_name_by_id(&self, type_id: u16) -> Option<String> {
    self.type_ids.borrow().iter().find(|(_, id)| **id == type_id).map(|(name, _)| name.clone())
  }

  /// Restores a `type_ids` map from metadata, advancing `next_type_id` past
  /// the maximum restored ID (spec.md §4.H load protocol step 3).
  pub fn restore_type_ids(&self, type_ids: HashMap<String, u16>) {
    let max = type_ids.values().copied().max().unwrap_or(0);
    *self.type_ids.borrow_mut() = type_ids;
    *self.next_type_id.borrow_mut() = max + 1;
  }

  pub fn type_ids_snapshot(&self) -> HashMap<String, u16> {
    self.type_ids.borrow().clone()
  }

  pub fn list_types(&self) -> Vec<String> {
    self.types.borrow().keys().cloned().collect()
  }

  /// Scans all composites whose `implements` list includes `interface_name`.
  pub fn find_implementing_types(&self, interface_name: &str) -> Vec<(String, Arc<CompositeTypeDef>)> {
    self
      .types
      .borrow()
      .iter()
      .filter_map(|(name, td)| match td {
        TypeDef::Composite(c) if c.interfaces().iter().any(|i| i == interface_name) => Some((name.clone(), c.clone())),
        _ => None,
      })
      .collect()
  }

  /// Scans composites for fields whose resolved type matches `type_name` by
  /// name or by equal resolved base.
  pub fn find_composites_with_field_type(&self, type_name: &str) -> Vec<(String, String, Arc<CompositeTypeDef>)> {
    let target = match self.get(type_name) {
      Some(t) => t,
      None => return Vec::new(),
    };
    let target_base = target.resolve_base_type();

    let mut results = Vec::new();
    for (name, td) in self.types.borrow().iter() {
      if let TypeDef::Composite(c) = td {
        for field in c.fields() {
          let field_base = field.type_def.resolve_base_type();
          if field.type_def.name() == type_name || field_base.name() == target_base.name() {
            results.push((name.clone(), field.name.clone(), c.clone()));
          }
        }
      }
    }
    results
  }

  /// Scans composite fields typed as enums whose variant payloads contain
  /// `type_name`.
  pub fn find_enum_variants_with_field_type(
    &self,
    type_name: &str,
  ) -> Vec<(String, String, String, String, Arc<CompositeTypeDef>)> {
    let target = match self.get(type_name) {
      Some(t) => t,
      None => return Vec::new(),
    };
    let target_base = target.resolve_base_type();

    let mut results = Vec::new();
    for (name, td) in self.types.borrow().iter() {
      if let TypeDef::Composite(c) = td {
        for field in c.fields() {
          if let TypeDef::Enum(e) = field.type_def.resolve_base_type() {
            for variant in e.variants() {
              for vf in &variant.fields {
                let vf_base = vf.type_def.resolve_base_type();
                if vf.type_def.name() == type_name || vf_base.name() == target_base.name() {
                  results.push((name.clone(), field.name.clone(), variant.name.clone(), vf.name.clone(), c.clone()));
                }
              }
            }
          }
        }
      }
    }
    results
  }

  pub fn contains(&self, name: &str) -> bool {
    self.types.borrow().contains_key(name)
  }

  /// Registers an overflow-wrapped primitive. Rejected if `base` is a float
  /// kind (spec.md §3.1).
  pub fn register_overflow(&self, name: &str, base: PrimitiveKind, policy: crate::primitive::OverflowPolicy) -> Result<()> {
    let def = OverflowTypeDef::new(name, base, policy).ok_or_else(|| Error::OverflowError {
      type_name: base.name().to_string(),
      detail: "float types cannot carry an overflow policy".to_string(),
    })?;
    self.register(TypeDef::Overflow(Arc::new(def)))
  }
}

impl Default for TypeRegistry {
  fn default() -> Self {
    Self::new()
  }
}

/// A name beginning with `_` is reserved for system bookkeeping by
/// convention; the registry itself does not special-case such names
/// (spec.md §4.B) — this helper exists purely for callers that want to
/// filter them at presentation time.
pub fn is_reserved_name(name: &str) -> bool {
  name.starts_with('_')
}

fn is_empty_stub_of_same_kind(existing: &TypeDef, incoming: &TypeDef) -> bool {
  match (existing, incoming) {
    (TypeDef::Composite(c), TypeDef::Composite(_)) => c.is_stub(),
    (TypeDef::Interface(i), TypeDef::Interface(_)) => i.is_stub(),
    (TypeDef::Enum(e), TypeDef::Enum(_)) => e.is_stub(),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Field;

  #[test]
  fn builtins_preregistered() {
    let r = TypeRegistry::new();
    assert!(r.contains("uint8"));
    assert!(r.contains("string"));
    assert!(r.contains("bigint"));
    assert!(r.contains("biguint"));
    assert!(r.contains("fraction"));
    assert!(r.contains("path"));
    assert!(r.contains("boolean"));
  }

  #[test]
  fn duplicate_name_rejected() {
    let r = TypeRegistry::new();
    let c = Arc::new(CompositeTypeDef::stub("Foo"));
    c.populate(vec![Field::new("x", TypeDef::Primitive(PrimitiveKind::Uint8))], vec![], None);
    r.register(TypeDef::Composite(c)).unwrap();

    let c2 = Arc::new(CompositeTypeDef::stub("Foo"));
    c2.populate(vec![Field::new("y", TypeDef::Primitive(PrimitiveKind::Uint8))], vec![], None);
    let err = r.register(TypeDef::Composite(c2)).unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
  }

  #[test]
  fn stub_then_populate_cyclic() {
    let r = TypeRegistry::new();
    let node = r.register_stub("Node").unwrap();
    assert!(r.is_stub("Node"));
    node.populate(
      vec![
        Field::new("value", TypeDef::Primitive(PrimitiveKind::Uint8)),
        Field::new("next", TypeDef::Composite(node.clone())),
      ],
      vec![],
      None,
    );
    assert!(!r.is_stub("Node"));
    assert_eq!(node.size_bytes(), 1 + 1 + 4); // bitmap(1) + u8(1) + composite ref(4)
  }

  #[test]
  fn array_type_is_cached() {
    let r = TypeRegistry::new();
    let a1 = r.get_array_type("uint8").unwrap();
    let a2 = r.get_array_type("uint8").unwrap();
    assert_eq!(a1.name, "uint8[]");
    assert!(Arc::ptr_eq(&a1, &a2));
  }

  #[test]
  fn type_ids_are_stable_and_start_at_one() {
    let r = TypeRegistry::new();
    let id1 = r.get_type_id("Dog");
    let id2 = r.get_type_id("Cat");
    let id1_again = r.get_type_id("Dog");
    assert_eq!(id1, 1);
    assert_eq!(id2, 2);
    assert_eq!(id1, id1_again);
    assert_eq!(r.get_type_name_by_id(1).as_deref(), Some("Dog"));
  }

  #[test]
  fn populate_composite_merges_parent_and_interface_fields() {
    let r = TypeRegistry::new();
    let named = Arc::new(InterfaceTypeDef::stub("Named"));
    named.populate(vec![Field::new("name", r.get("string").unwrap())], vec![]);
    r.register(TypeDef::Interface(named)).unwrap();

    let animal = r.register_stub("Animal").unwrap();
    r.populate_composite("Animal", vec![Field::new("legs", TypeDef::Primitive(PrimitiveKind::Uint8))], vec![], None)
      .unwrap();

    let dog = r.register_stub("Dog").unwrap();
    r.populate_composite(
      "Dog",
      vec![Field::new("breed", r.get("string").unwrap())],
      vec!["Named".to_string()],
      Some("Animal".to_string()),
    )
    .unwrap();

    let field_names: Vec<String> = dog.fields().iter().map(|f| f.name.clone()).collect();
    assert_eq!(field_names, vec!["legs", "name", "breed"]);
    let _ = animal;
  }

  #[test]
  fn populate_composite_rejects_conflicting_field_types() {
    let r = TypeRegistry::new();
    r.register_stub("Animal").unwrap();
    r.populate_composite("Animal", vec![Field::new("id", TypeDef::Primitive(PrimitiveKind::Uint8))], vec![], None)
      .unwrap();

    r.register_stub("Dog").unwrap();
    let err = r
      .populate_composite(
        "Dog",
        vec![Field::new("id", TypeDef::Primitive(PrimitiveKind::Uint16))],
        vec![],
        Some("Animal".to_string()),
      )
      .unwrap_err();
    assert!(matches!(err, Error::FieldConflict { .. }));
  }

  #[test]
  fn populate_interface_merges_extended_fields() {
    let r = TypeRegistry::new();
    let named = Arc::new(InterfaceTypeDef::stub("Named"));
    named.populate(vec![Field::new("name", r.get("string").unwrap())], vec![]);
    r.register(TypeDef::Interface(named)).unwrap();

    r.register_interface_stub("Pet").unwrap();
    r.populate_interface(
      "Pet",
      vec![Field::new("owner", r.get("string").unwrap())],
      vec!["Named".to_string()],
    )
    .unwrap();

    let pet = match r.get("Pet").unwrap() {
      TypeDef::Interface(i) => i,
      _ => panic!("expected interface"),
    };
    let field_names: Vec<String> = pet.fields().iter().map(|f| f.name.clone()).collect();
    assert_eq!(field_names, vec!["name", "owner"]);
  }
}
