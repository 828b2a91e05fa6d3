//! Component H: the metadata codec.
//!
//! Serializes/deserializes `_metadata.json`, the JSON sidecar describing
//! every type in a registry plus the persistent `type_ids` map (spec.md
//! §4.H). Loading uses a two-phase stub-then-iteratively-resolve protocol so
//! mutually recursive composite/interface/enum types can be reconstructed
//! regardless of declaration order.

use crate::error::{Error, Result};
use crate::primitive::{OverflowPolicy, PrimitiveKind};
use crate::registry::TypeRegistry;
use crate::types::{ArrayKind, ArrayTypeDef, CompositeTypeDef, EnumVariant, Field, InterfaceTypeDef, TypeDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const METADATA_FILE_NAME: &str = "_metadata.json";

#[derive(Serialize, Deserialize)]
struct MetadataFile {
  types: HashMap<String, TypeSpec>,
  type_ids: HashMap<String, u16>,
}

#[derive(Serialize, Deserialize)]
struct FieldSpec {
  name: String,
  #[serde(rename = "type")]
  type_name: String,
  #[serde(default)]
  default: Option<serde_json::Value>,
  #[serde(default)]
  overflow: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct VariantSpec {
  name: String,
  discriminant: i64,
  #[serde(default)]
  fields: Option<Vec<FieldSpec>>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TypeSpec {
  Primitive { primitive: String },
  Alias { base_type: String },
  String { element_type: String },
  Boolean {},
  Bigint {},
  Biguint {},
  Fraction {},
  Array { element_type: String },
  Set { element_type: String },
  Dictionary { key_type: String, value_type: String },
  Composite {
    fields: Vec<FieldSpec>,
    interfaces: Vec<String>,
    #[serde(default)]
    parent: Option<String>,
  },
  Interface { fields: Vec<FieldSpec>, extends: Vec<String> },
  Enum {
    variants: Vec<VariantSpec>,
    has_explicit_values: bool,
    #[serde(default)]
    backing_type: Option<String>,
  },
  Overflow { base: String, policy: String },
}

fn overflow_to_str(policy: OverflowPolicy) -> &'static str {
  match policy {
    OverflowPolicy::Saturating => "saturating",
    OverflowPolicy::Wrapping => "wrapping",
  }
}

fn overflow_from_str(s: &str) -> Result<OverflowPolicy> {
  match s {
    "saturating" => Ok(OverflowPolicy::Saturating),
    "wrapping" => Ok(OverflowPolicy::Wrapping),
    other => Err(Error::Codec(format!("unknown overflow policy '{}'", other))),
  }
}

fn field_to_spec(field: &Field) -> FieldSpec {
  FieldSpec {
    name: field.name.clone(),
    type_name: field.type_def.name().to_string(),
    default: field.default.clone(),
    overflow: field.overflow.map(overflow_to_str).map(str::to_string),
  }
}

/// Builds a `Field` from a `FieldSpec`, or returns `Ok(None)` if its named
/// type isn't registered yet (signals "retry on a later pass" to the loader).
fn spec_to_field(registry: &TypeRegistry, spec: &FieldSpec) -> Result<Option<Field>> {
  let type_def = match registry.get(&spec.type_name) {
    Some(t) => t,
    None => return Ok(None),
  };
  let overflow = match &spec.overflow {
    Some(s) => Some(overflow_from_str(s)?),
    None => None,
  };
  Ok(Some(Field {
    name: spec.name.clone(),
    type_def,
    default: spec.default.clone(),
    overflow,
  }))
}

fn specs_to_fields(registry: &TypeRegistry, specs: &[FieldSpec]) -> Result<Option<Vec<Field>>> {
  let mut fields = Vec::with_capacity(specs.len());
  for spec in specs {
    match spec_to_field(registry, spec)? {
      Some(field) => fields.push(field),
      None => return Ok(None),
    }
  }
  Ok(Some(fields))
}

/// Converts one registered type into its persisted spec.
fn type_def_to_spec(name: &str, type_def: &TypeDef) -> TypeSpec {
  match type_def {
    TypeDef::Primitive(k) if name == "boolean" => {
      let _ = k;
      TypeSpec::Boolean {}
    }
    TypeDef::Primitive(k) => TypeSpec::Primitive { primitive: k.name().to_string() },
    TypeDef::Alias(a) => TypeSpec::Alias { base_type: a.base_type.name().to_string() },
    TypeDef::BigInt(_) => TypeSpec::Bigint {},
    TypeDef::BigUInt(_) => TypeSpec::Biguint {},
    TypeDef::Fraction(_) => TypeSpec::Fraction {},
    TypeDef::Array(a) => match a.kind {
      ArrayKind::String => TypeSpec::String { element_type: "character".to_string() },
      ArrayKind::Plain => TypeSpec::Array { element_type: a.element_type.name().to_string() },
      ArrayKind::Set => TypeSpec::Set { element_type: a.element_type.name().to_string() },
      ArrayKind::Dictionary => {
        let entry = match &a.element_type {
          TypeDef::Composite(c) => c.fields(),
          _ => unreachable!("dictionary element type is always the synthetic entry composite"),
        };
        let key_type = entry.iter().find(|f| f.name == "key").expect("entry composite always has 'key'").type_def.name().to_string();
        let value_type = entry.iter().find(|f| f.name == "value").expect("entry composite always has 'value'").type_def.name().to_string();
        TypeSpec::Dictionary { key_type, value_type }
      }
    },
    TypeDef::Composite(c) => TypeSpec::Composite {
      fields: c.fields().iter().map(field_to_spec).collect(),
      interfaces: c.interfaces(),
      parent: c.parent(),
    },
    TypeDef::Interface(i) => TypeSpec::Interface {
      fields: i.fields().iter().map(field_to_spec).collect(),
      extends: i.extends(),
    },
    TypeDef::Enum(e) => TypeSpec::Enum {
      variants: e
        .variants()
        .iter()
        .map(|v| VariantSpec {
          name: v.name.clone(),
          discriminant: v.discriminant,
          fields: if v.fields.is_empty() { None } else { Some(v.fields.iter().map(field_to_spec).collect()) },
        })
        .collect(),
      has_explicit_values: e.has_explicit_values(),
      backing_type: e.backing_type().map(|k| k.name().to_string()),
    },
    TypeDef::Overflow(o) => TypeSpec::Overflow {
      base: o.base.name().to_string(),
      policy: overflow_to_str(o.policy).to_string(),
    },
  }
}

/// Serializes `registry`'s current contents to the same JSON bytes `save`
/// would write, without touching the filesystem — used by the archiver to
/// embed a schema snapshot inline (spec.md §4.I "Archive format").
pub fn to_json_bytes(registry: &TypeRegistry) -> Result<Vec<u8>> {
  let mut types = HashMap::new();
  for name in registry.list_types() {
    let type_def = registry.get_or_raise(&name)?;
    let spec = type_def_to_spec(&name, &type_def);
    types.insert(name, spec);
  }
  let file = MetadataFile { types, type_ids: registry.type_ids_snapshot() };
  Ok(serde_json::to_vec_pretty(&file)?)
}

/// Writes `_metadata.json` for `registry`'s current contents. Built-in
/// primitives are emitted along with everything else (spec.md §4.H "Save
/// protocol": "write the current registry verbatim").
pub fn save(data_dir: &Path, registry: &TypeRegistry) -> Result<()> {
  let bytes = to_json_bytes(registry)?;
  std::fs::write(data_dir.join(METADATA_FILE_NAME), bytes)?;
  Ok(())
}

/// Loads `_metadata.json` from `data_dir` into a freshly constructed
/// registry, via the two-phase protocol in spec.md §4.H:
///
/// 1. Register an empty stub for every composite/interface/enum spec.
/// 2. Iteratively resolve remaining specs by field-type lookup until no
///    worklist entries remain or a pass makes no progress, in which case
///    fail with [`Error::UnresolvableTypes`].
/// 3. Restore `type_ids`.
pub fn load(data_dir: &Path) -> Result<TypeRegistry> {
  let bytes = std::fs::read(data_dir.join(METADATA_FILE_NAME))?;
  let file: MetadataFile = serde_json::from_slice(&bytes)?;

  let registry = TypeRegistry::new();
  let mut worklist: HashMap<String, TypeSpec> = file.types.into_iter().filter(|(name, _)| !registry.contains(name)).collect();

  for (name, spec) in &worklist {
    match spec {
      TypeSpec::Composite { .. } => {
        registry.register_stub(name)?;
      }
      TypeSpec::Interface { .. } => {
        registry.register_interface_stub(name)?;
      }
      TypeSpec::Enum { .. } => {
        registry.register_enum_stub(name)?;
      }
      _ => {}
    }
  }

  while !worklist.is_empty() {
    let mut remaining = HashMap::new();
    let mut progressed = false;
    for (name, spec) in worklist {
      if try_resolve(&registry, &name, &spec)? {
        progressed = true;
      } else {
        remaining.insert(name, spec);
      }
    }
    if !progressed {
      if let Some(name) = find_cyclic_alias(&remaining) {
        return Err(Error::CyclicAlias(name));
      }
      return Err(Error::UnresolvableTypes(remaining.into_keys().collect()));
    }
    worklist = remaining;
  }

  registry.restore_type_ids(file.type_ids);
  Ok(registry)
}

/// Walks each stuck alias's base chain looking for a repeat name, which
/// means the chain loops back on itself rather than ever reaching a
/// non-alias (or already-registered) base. Only alias specs can be stuck
/// this way: composite/interface/enum specs are stubbed in phase 1, so
/// `registry.get` always finds them regardless of population state.
fn find_cyclic_alias(remaining: &HashMap<String, TypeSpec>) -> Option<String> {
  for start in remaining.keys() {
    let mut current = start.clone();
    let mut seen = std::collections::HashSet::new();
    loop {
      if !seen.insert(current.clone()) {
        return Some(start.clone());
      }
      match remaining.get(&current) {
        Some(TypeSpec::Alias { base_type }) => current = base_type.clone(),
        _ => break,
      }
    }
  }
  None
}

/// Attempts to fully resolve one spec against `registry`'s current state.
/// Returns `Ok(true)` if it was resolved (and registered/populated in
/// place), `Ok(false)` if a dependency is still missing (retry later).
fn try_resolve(registry: &TypeRegistry, name: &str, spec: &TypeSpec) -> Result<bool> {
  match spec {
    TypeSpec::Composite { fields, interfaces, parent } => {
      let resolved = match specs_to_fields(registry, fields)? {
        Some(f) => f,
        None => return Ok(false),
      };
      match registry.get(name) {
        Some(TypeDef::Composite(c)) => {
          c.populate(resolved, interfaces.clone(), parent.clone());
          Ok(true)
        }
        _ => unreachable!("composite stub registered in phase 1"),
      }
    }

    TypeSpec::Interface { fields, extends } => {
      let resolved = match specs_to_fields(registry, fields)? {
        Some(f) => f,
        None => return Ok(false),
      };
      match registry.get(name) {
        Some(TypeDef::Interface(i)) => {
          i.populate(resolved, extends.clone());
          Ok(true)
        }
        _ => unreachable!("interface stub registered in phase 1"),
      }
    }

    TypeSpec::Enum { variants, has_explicit_values, backing_type } => {
      let mut resolved_variants = Vec::with_capacity(variants.len());
      for variant in variants {
        let fields = match &variant.fields {
          Some(specs) => match specs_to_fields(registry, specs)? {
            Some(f) => f,
            None => return Ok(false),
          },
          None => Vec::new(),
        };
        resolved_variants.push(EnumVariant {
          name: variant.name.clone(),
          discriminant: variant.discriminant,
          fields,
        });
      }
      let backing = match backing_type {
        Some(s) => Some(PrimitiveKind::from_name(s).ok_or_else(|| Error::UnknownType(s.clone()))?),
        None => None,
      };
      match registry.get(name) {
        Some(TypeDef::Enum(e)) => {
          e.populate(resolved_variants, *has_explicit_values, backing)?;
          Ok(true)
        }
        _ => unreachable!("enum stub registered in phase 1"),
      }
    }

    TypeSpec::Array { element_type } => match registry.get(element_type) {
      Some(element) => {
        registry.register(TypeDef::Array(Arc::new(ArrayTypeDef::new(name, element, ArrayKind::Plain))))?;
        Ok(true)
      }
      None => Ok(false),
    },

    TypeSpec::Set { element_type } => match registry.get(element_type) {
      Some(element) => {
        registry.register(TypeDef::Array(Arc::new(ArrayTypeDef::new(name, element, ArrayKind::Set))))?;
        Ok(true)
      }
      None => Ok(false),
    },

    TypeSpec::Dictionary { key_type, value_type } => {
      let key = match registry.get(key_type) {
        Some(t) => t,
        None => return Ok(false),
      };
      let value = match registry.get(value_type) {
        Some(t) => t,
        None => return Ok(false),
      };
      let entry_name = format!("{}.entry", name);
      let entry = Arc::new(CompositeTypeDef::stub(entry_name.clone()));
      entry.populate(vec![Field::new("key", key), Field::new("value", value)], vec![], None);
      registry.register(TypeDef::Composite(entry.clone()))?;
      registry.register(TypeDef::Array(Arc::new(ArrayTypeDef::new(name, TypeDef::Composite(entry), ArrayKind::Dictionary))))?;
      Ok(true)
    }

    TypeSpec::Alias { base_type } => match registry.get(base_type) {
      Some(base) => {
        registry.register(TypeDef::Alias(Arc::new(crate::types::AliasTypeDef { name: name.to_string(), base_type: base })))?;
        Ok(true)
      }
      None => Ok(false),
    },

    TypeSpec::Overflow { base, policy } => {
      let base_kind = PrimitiveKind::from_name(base).ok_or_else(|| Error::UnknownType(base.clone()))?;
      registry.register_overflow(name, base_kind, overflow_from_str(policy)?)?;
      Ok(true)
    }

    // Built-in leaf kinds only ever appear under already-registered names,
    // which are filtered out of the worklist before this function runs.
    TypeSpec::Primitive { .. } | TypeSpec::String { .. } | TypeSpec::Boolean {} | TypeSpec::Bigint {} | TypeSpec::Biguint {} | TypeSpec::Fraction {} => Ok(true),
  }
}
