//! Component I (part 1): in-directory compaction.
//!
//! Copies only live records from a source database directory into a fresh
//! destination directory, densely repacking every composite/variant table
//! and remapping every reference a live record carries so the destination
//! contains no tombstones and no dangling indices (spec.md §4.I).
//!
//! Array/set/dictionary element ranges and enum variant payloads are not
//! remapped via a separately precomputed table the way composite indices
//! are; since ranges and variant records are never shared across distinct
//! field values (spec.md §3.3 "every insert produces a fresh range"), this
//! compactor instead re-copies each one lazily, in place, the moment a live
//! record's rewrite reaches it. The composite/interface index remap *is*
//! precomputed up front (spec.md §4.I step 2), since those references are
//! shared and may point forward to a record not yet visited.

use crate::error::{Error, Result};
use crate::metadata;
use crate::record::{self, FieldValue, Record};
use crate::registry::TypeRegistry;
use crate::storage::StorageManager;
use crate::types::{ArrayKind, TypeDef};
use std::collections::HashMap;
use std::path::Path;

/// Per-composite-type `old_index -> new_index` map; `None` means the source
/// record at that index was a tombstone and has no destination counterpart.
type CompositeRemap = HashMap<String, Vec<Option<u32>>>;

/// Cache of already-copied variant records, keyed by `(enum_name,
/// variant_name, old_index)`, so a variant index referenced from more than
/// one enclosing record is copied only once.
type VariantCache = HashMap<(String, String, u32), u32>;

/// Runs compaction of `src` into `dst`. `dst` must not already exist
/// (spec.md §7 `ExistingOutput`).
pub fn compact(src: &Path, dst: &Path) -> Result<()> {
  if !src.exists() {
    return Err(Error::Codec(format!("compaction source does not exist: {}", src.display())));
  }
  if dst.exists() {
    return Err(Error::ExistingOutput(dst.display().to_string()));
  }

  let mut src_mgr = StorageManager::open(src)?;
  let remap = build_composite_remap(&mut src_mgr)?;

  // "Copying" an immutable registry: reload it fresh from the source's own
  // metadata sidecar rather than trying to `Clone` a `TypeRegistry` (its
  // interior `RefCell`s aren't `Clone`), matching spec.md §4.H's existing
  // save/load roundtrip exactly (spec.md §4.I step 5).
  let dst_registry = metadata::load(src)?;
  let mut dst_mgr = StorageManager::new(dst, dst_registry)?;

  let composite_names = composite_type_names(src_mgr.registry());
  let mut variant_cache = VariantCache::new();

  for type_name in &composite_names {
    let count = src_mgr.count(type_name)?;
    for old_index in 0..count {
      let new_index = match remap.get(type_name).and_then(|v| v.get(old_index as usize)).copied().flatten() {
        Some(i) => i,
        None => continue,
      };
      let source_record = src_mgr.get(type_name, old_index)?;
      let type_def = src_mgr.registry().get_or_raise(type_name)?;
      let fields = composite_fields(&type_def)?;

      let mut rewritten = Record::new();
      for field in &fields {
        let value = source_record.get(&field.name).cloned().unwrap_or(FieldValue::Null);
        let new_value = rewrite_value(&mut src_mgr, &mut dst_mgr, &field.type_def, value, &remap, &mut variant_cache)?;
        rewritten.insert(field.name.clone(), new_value);
      }

      let inserted = dst_mgr.insert(type_name, &rewritten)?;
      debug_assert_eq!(inserted, new_index as u64, "dense remap must match sequential insert order");
    }
    tracing::debug!(type_name = %type_name, live = count_live(&remap, type_name), "compacted composite table");
  }

  dst_mgr.save_metadata()?;
  Ok(())
}

fn count_live(remap: &CompositeRemap, type_name: &str) -> usize {
  remap.get(type_name).map(|v| v.iter().filter(|x| x.is_some()).count()).unwrap_or(0)
}

fn composite_type_names(registry: &TypeRegistry) -> Vec<String> {
  registry
    .list_types()
    .into_iter()
    .filter(|name| matches!(registry.get(name), Some(TypeDef::Composite(_))))
    .collect()
}

fn composite_fields(type_def: &TypeDef) -> Result<Vec<crate::types::Field>> {
  match type_def {
    TypeDef::Composite(c) => Ok(c.fields()),
    _ => Err(Error::Codec("expected a composite type".to_string())),
  }
}

/// Pass 1 (spec.md §4.I step 2): for every composite table, scan tombstones
/// in index order and assign a dense destination index to each live record.
fn build_composite_remap(src_mgr: &mut StorageManager) -> Result<CompositeRemap> {
  let names = composite_type_names(src_mgr.registry());
  let mut remap = CompositeRemap::new();
  for name in names {
    let count = src_mgr.count(&name)?;
    let mut next = 0u32;
    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count {
      if src_mgr.is_deleted(&name, index)? {
        entries.push(None);
      } else {
        entries.push(Some(next));
        next += 1;
      }
    }
    remap.insert(name, entries);
  }
  Ok(remap)
}

/// Rewrites one field value, remapping composite/interface references and
/// re-copying array/fraction/enum payloads through to the destination.
fn rewrite_value(
  src_mgr: &mut StorageManager,
  dst_mgr: &mut StorageManager,
  type_def: &TypeDef,
  value: FieldValue,
  remap: &CompositeRemap,
  variant_cache: &mut VariantCache,
) -> Result<FieldValue> {
  if matches!(value, FieldValue::Null) {
    return Ok(FieldValue::Null);
  }

  let base = type_def.resolve_base_type();
  match (&base, value) {
    (TypeDef::Primitive(_), v) => Ok(v),
    (TypeDef::Overflow(_), v) => Ok(v),

    (TypeDef::Composite(c), FieldValue::CompositeRef(old_index)) => {
      match remap.get(&c.name).and_then(|v| v.get(old_index as usize)).copied().flatten() {
        Some(new_index) => Ok(FieldValue::CompositeRef(new_index)),
        None => Ok(FieldValue::Null),
      }
    }

    (TypeDef::Interface(_), FieldValue::InterfaceRef { type_id, index }) => {
      match src_mgr.registry().get_type_name_by_id(type_id) {
        Some(target_name) => match remap.get(&target_name).and_then(|v| v.get(index as usize)).copied().flatten() {
          Some(new_index) => Ok(FieldValue::InterfaceRef { type_id, index: new_index }),
          None => Ok(FieldValue::Null),
        },
        None => Ok(FieldValue::Null),
      }
    }

    (TypeDef::Array(_), FieldValue::ArrayRef { start, length }) | (TypeDef::BigInt(_), FieldValue::ArrayRef { start, length }) | (TypeDef::BigUInt(_), FieldValue::ArrayRef { start, length }) => {
      let (new_start, new_length) = copy_range(src_mgr, dst_mgr, &base, start, length, remap, variant_cache)?;
      Ok(FieldValue::ArrayRef { start: new_start, length: new_length })
    }

    (TypeDef::Fraction(_), FieldValue::FractionRef { numerator, denominator }) => {
      let bigint = src_mgr.registry().get_or_raise("bigint")?;
      let (ns, nl) = copy_range(src_mgr, dst_mgr, &bigint, numerator.0, numerator.1, remap, variant_cache)?;
      let (ds, dl) = copy_range(src_mgr, dst_mgr, &bigint, denominator.0, denominator.1, remap, variant_cache)?;
      Ok(FieldValue::FractionRef { numerator: (ns, nl), denominator: (ds, dl) })
    }

    (TypeDef::Enum(e), FieldValue::Enum { discriminant, variant_index }) => {
      let variant_index = match variant_index {
        None => return Ok(FieldValue::Enum { discriminant, variant_index: None }),
        Some(i) => i,
      };
      let variant = e
        .get_variant_by_discriminant(discriminant)
        .ok_or_else(|| Error::Codec(format!("unknown discriminant {} for enum '{}'", discriminant, e.name)))?;
      let cache_key = (e.name.clone(), variant.name.clone(), variant_index);
      if let Some(&new_index) = variant_cache.get(&cache_key) {
        return Ok(FieldValue::Enum { discriminant, variant_index: Some(new_index) });
      }

      let record_size = record::variant_record_size(&variant);
      let source_bytes = src_mgr.get_variant_table(&e.name, &variant.name, record_size)?.get(variant_index as u64)?;
      let source_record = record::decode_variant_record(&variant, &source_bytes)?;

      let mut rewritten = Record::new();
      for field in &variant.fields {
        let value = source_record.get(&field.name).cloned().unwrap_or(FieldValue::Null);
        let new_value = rewrite_value(src_mgr, dst_mgr, &field.type_def, value, remap, variant_cache)?;
        rewritten.insert(field.name.clone(), new_value);
      }
      let dst_bytes = record::encode_variant_record(&variant, &rewritten)?;
      let new_index = dst_mgr.get_variant_table(&e.name, &variant.name, record_size)?.insert(&dst_bytes)? as u32;
      variant_cache.insert(cache_key, new_index);
      Ok(FieldValue::Enum { discriminant, variant_index: Some(new_index) })
    }

    (_, FieldValue::Null) => Ok(FieldValue::Null),
    (other, value) => Err(Error::Codec(format!("cannot rewrite value {:?} against type '{}'", value, other.name()))),
  }
}

/// Recopies the element run `[start, start+length)` of the array/bigint type
/// `field_base` from `src_mgr` into `dst_mgr`, remapping each element if it
/// is itself a reference type (an array of composites or interfaces), and
/// returns the fresh destination range.
fn copy_range(
  src_mgr: &mut StorageManager,
  dst_mgr: &mut StorageManager,
  field_base: &TypeDef,
  start: u32,
  length: u32,
  remap: &CompositeRemap,
  variant_cache: &mut VariantCache,
) -> Result<(u32, u32)> {
  if length == 0 {
    return Ok((0, 0));
  }

  let (element_type, is_set) = match field_base {
    TypeDef::Array(a) => (a.element_type.clone(), a.kind == ArrayKind::Set),
    TypeDef::BigInt(b) => (b.array.element_type.clone(), false),
    TypeDef::BigUInt(b) => (b.array.element_type.clone(), false),
    _ => return Err(Error::Codec(format!("'{}' is not an array-flavored type", field_base.name()))),
  };

  let raw_elements = src_mgr.get_array_table_for_type(field_base)?.get_range(start, length)?;
  let mut rewritten_elements = Vec::with_capacity(raw_elements.len());
  for element_bytes in raw_elements {
    let decoded = record::decode_field_reference(&element_type, &element_bytes)?;
    let rewritten = rewrite_value(src_mgr, dst_mgr, &element_type, decoded, remap, variant_cache)?;
    let overflow = None; // array elements never carry a field-level overflow wrapper
    rewritten_elements.push(record::encode_field_reference(&element_type, &rewritten, overflow)?);
  }

  let table = dst_mgr.get_array_table_for_type(field_base)?;
  if is_set {
    table.insert_set(&rewritten_elements)
  } else {
    table.insert(&rewritten_elements)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::primitive::{self, PrimitiveKind, PrimitiveValue};
  use crate::types::{ArrayKind, ArrayTypeDef, CompositeTypeDef, Field};
  use std::sync::Arc;
  use tempfile::tempdir;

  fn string_elements(s: &str) -> Vec<Vec<u8>> {
    s.chars()
      .map(|c| primitive::encode(&PrimitiveValue::Character(c), PrimitiveKind::Character, None).unwrap())
      .collect()
  }

  fn person_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    let person = Arc::new(CompositeTypeDef::stub("Person"));
    person.populate(
      vec![
        Field::new("name", registry.get("string").unwrap()),
        Field::new("age", TypeDef::Primitive(PrimitiveKind::Uint8)),
      ],
      vec![],
      None,
    );
    registry.register(TypeDef::Composite(person)).unwrap();
    registry
  }

  #[test]
  fn compacts_away_tombstones() {
    let base = tempdir().unwrap();
    let src_dir = base.path().join("src");
    let dst_dir = base.path().join("dst");

    let mut src = StorageManager::new(&src_dir, person_registry()).unwrap();

    let mut alice = Record::new();
    let (start, length) = src.get_array_table("string").unwrap().insert(&string_elements("Alice")).unwrap();
    alice.insert("name".to_string(), FieldValue::ArrayRef { start, length });
    alice.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(30)));
    src.insert("Person", &alice).unwrap();

    let mut bob = Record::new();
    let (start, length) = src.get_array_table("string").unwrap().insert(&string_elements("Bob")).unwrap();
    bob.insert("name".to_string(), FieldValue::ArrayRef { start, length });
    bob.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(25)));
    src.insert("Person", &bob).unwrap();

    src.delete("Person", 0).unwrap();
    src.save_metadata().unwrap();
    drop(src);

    compact(&src_dir, &dst_dir).unwrap();

    let mut dst = StorageManager::open(&dst_dir).unwrap();
    assert_eq!(dst.count("Person").unwrap(), 1);
    let record = dst.get("Person", 0).unwrap();
    assert_eq!(record.get("age"), Some(&FieldValue::Primitive(PrimitiveValue::UInt(25))));
  }

  #[test]
  fn cyclic_composite_refs_remap_correctly() {
    let base = tempdir().unwrap();
    let src_dir = base.path().join("src");
    let dst_dir = base.path().join("dst");

    let registry = TypeRegistry::new();
    let node = registry.register_stub("Node").unwrap();
    node.populate(
      vec![Field::new("value", TypeDef::Primitive(PrimitiveKind::Uint8)), Field::new("next", TypeDef::Composite(node.clone()))],
      vec![],
      None,
    );
    registry.register(TypeDef::Composite(node)).unwrap();

    let mut src = StorageManager::new(&src_dir, registry).unwrap();
    let mut first = Record::new();
    first.insert("value".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(1)));
    first.insert("next".to_string(), FieldValue::Null);
    src.insert("Node", &first).unwrap();

    let mut second = Record::new();
    second.insert("value".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(2)));
    second.insert("next".to_string(), FieldValue::CompositeRef(0));
    src.insert("Node", &second).unwrap();

    // Delete the first node; the second's `next` now points at a tombstone.
    src.delete("Node", 0).unwrap();
    drop(src);

    compact(&src_dir, &dst_dir).unwrap();

    let mut dst = StorageManager::open(&dst_dir).unwrap();
    assert_eq!(dst.count("Node").unwrap(), 1);
    let remaining = dst.get("Node", 0).unwrap();
    assert_eq!(remaining.get("value"), Some(&FieldValue::Primitive(PrimitiveValue::UInt(2))));
    assert_eq!(remaining.get("next"), Some(&FieldValue::Null));
  }

  #[test]
  fn array_unused_type_does_not_break_compaction() {
    let base = tempdir().unwrap();
    let src_dir = base.path().join("src");
    let dst_dir = base.path().join("dst");
    let registry = person_registry();
    let array = Arc::new(ArrayTypeDef::new("uint8[]", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Plain));
    registry.register(TypeDef::Array(array)).unwrap();
    let src = StorageManager::new(&src_dir, registry).unwrap();
    drop(src);
    compact(&src_dir, &dst_dir).unwrap();
    assert!(dst_dir.join("_metadata.json").exists());
  }
}
