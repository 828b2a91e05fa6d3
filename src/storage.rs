//! Component G: the storage manager.
//!
//! Owns a [`TypeRegistry`], a data directory, and lazy maps of column/element
//! tables keyed by type name. Tables are opened on first request; their
//! backing files are created lazily on first write, matching
//! [`crate::table::ColumnTable`]/[`crate::element::ElementTable`] themselves
//! (spec.md §4.G).

use crate::element::ElementTable;
use crate::error::{Error, Result};
use crate::metadata;
use crate::record::{self, Record};
use crate::registry::TypeRegistry;
use crate::table::ColumnTable;
use crate::types::TypeDef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Dispatch result of [`StorageManager::get_table_for_type`]: a type's
/// resolved base determines whether it lives in a column table or an
/// element table.
pub enum TableRef<'a> {
  Column(&'a mut ColumnTable),
  Array(&'a mut ElementTable),
}

pub struct StorageManager {
  data_dir: PathBuf,
  registry: TypeRegistry,
  tables: HashMap<String, ColumnTable>,
  array_tables: HashMap<String, ElementTable>,
  variant_tables: HashMap<(String, String), ColumnTable>,
}

fn file_name(type_name: &str) -> String {
  format!("{}.bin", type_name)
}

impl StorageManager {
  /// Creates `data_dir` if needed and writes the metadata sidecar for
  /// `registry`'s current contents (spec.md §4.G: "Creates `data_dir` and
  /// writes the metadata file on construction").
  pub fn new(data_dir: impl Into<PathBuf>, registry: TypeRegistry) -> Result<Self> {
    let data_dir = data_dir.into();
    std::fs::create_dir_all(&data_dir)?;
    let manager = StorageManager {
      data_dir,
      registry,
      tables: HashMap::new(),
      array_tables: HashMap::new(),
      variant_tables: HashMap::new(),
    };
    manager.save_metadata()?;
    Ok(manager)
  }

  /// Opens an existing data directory: loads `_metadata.json`, restoring the
  /// registry, and prepares (but does not eagerly open) its tables.
  pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
    let data_dir = data_dir.into();
    let registry = metadata::load(&data_dir)?;
    Ok(StorageManager {
      data_dir,
      registry,
      tables: HashMap::new(),
      array_tables: HashMap::new(),
      variant_tables: HashMap::new(),
    })
  }

  pub fn registry(&self) -> &TypeRegistry {
    &self.registry
  }

  pub fn data_dir(&self) -> &Path {
    &self.data_dir
  }

  /// Returns the column table for `name`. Fails with `Codec` if `name`
  /// resolves to an array-flavored type (use `get_array_table` instead).
  pub fn get_table(&mut self, name: &str) -> Result<&mut ColumnTable> {
    let type_def = self.registry.get_or_raise(name)?;
    if type_def.resolve_base_type().is_array() {
      return Err(Error::Codec(format!("'{}' is an array-flavored type; use get_array_table", name)));
    }
    self.open_column_table(&type_def)
  }

  /// Returns the element table backing the array/set/string/dict/bigint type
  /// named `name`.
  pub fn get_array_table(&mut self, name: &str) -> Result<&mut ElementTable> {
    let type_def = self.registry.get_or_raise(name)?;
    self.get_array_table_for_type(&type_def)
  }

  pub fn get_array_table_for_type(&mut self, type_def: &TypeDef) -> Result<&mut ElementTable> {
    let base = type_def.resolve_base_type();
    let element_type = match &base {
      TypeDef::Array(a) => a.element_type.clone(),
      TypeDef::BigInt(b) => b.array.element_type.clone(),
      TypeDef::BigUInt(b) => b.array.element_type.clone(),
      _ => return Err(Error::Codec(format!("'{}' does not resolve to an array-flavored type", type_def.name()))),
    };
    let key = base.name().to_string();
    let element_size = element_type.reference_size();
    if !self.array_tables.contains_key(&key) {
      let path = self.data_dir.join(file_name(&key));
      let table = ElementTable::open(path, element_size)?;
      self.array_tables.insert(key.clone(), table);
    }
    Ok(self.array_tables.get_mut(&key).unwrap())
  }

  /// Dispatches to `get_table`/`get_array_table` based on `type_def`'s
  /// resolved base kind.
  pub fn get_table_for_type(&mut self, type_def: &TypeDef) -> Result<TableRef<'_>> {
    if type_def.resolve_base_type().is_array() {
      Ok(TableRef::Array(self.get_array_table_for_type(type_def)?))
    } else {
      Ok(TableRef::Column(self.open_column_table(type_def)?))
    }
  }

  /// Returns the per-variant payload table for a tagged enum variant, filed
  /// under `<Enum>/<variant>.bin` (spec.md §6.1).
  pub fn get_variant_table(&mut self, enum_name: &str, variant_name: &str, record_size: usize) -> Result<&mut ColumnTable> {
    let key = (enum_name.to_string(), variant_name.to_string());
    if !self.variant_tables.contains_key(&key) {
      let path = self.data_dir.join(enum_name).join(file_name(variant_name));
      let table = ColumnTable::open(path, record_size)?;
      self.variant_tables.insert(key.clone(), table);
    }
    Ok(self.variant_tables.get_mut(&key).unwrap())
  }

  fn open_column_table(&mut self, type_def: &TypeDef) -> Result<&mut ColumnTable> {
    let key = type_def.name().to_string();
    if !self.tables.contains_key(&key) {
      let path = self.data_dir.join(file_name(&key));
      let table = ColumnTable::open(path, type_def.size_bytes())?;
      self.tables.insert(key.clone(), table);
    }
    Ok(self.tables.get_mut(&key).unwrap())
  }

  /// Writes `_metadata.json`, reflecting the registry's current contents
  /// (spec.md §4.H "Save protocol").
  pub fn save_metadata(&self) -> Result<()> {
    metadata::save(&self.data_dir, &self.registry)
  }

  /// Encodes `record` as `type_name`'s wire layout and appends it, returning
  /// the new index (spec.md §6.3 "Tables: insert(value)"). Field values in
  /// `record` must already carry resolved references (array ranges,
  /// composite/interface indices) — this call does not itself recurse into
  /// nested values.
  pub fn insert(&mut self, type_name: &str, record: &Record) -> Result<u64> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let bytes = record::encode_composite(&type_def, record)?;
    let table = self.open_column_table(&type_def)?;
    table.insert(&bytes)
  }

  /// Reads and decodes the record at `index` in `type_name`'s table.
  pub fn get(&mut self, type_name: &str, index: u64) -> Result<Record> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let table = self.open_column_table(&type_def)?;
    let bytes = table.get(index)?;
    record::decode_composite(&type_def, &bytes)
  }

  /// Re-encodes `record` and overwrites the one at `index`.
  pub fn update(&mut self, type_name: &str, index: u64, record: &Record) -> Result<()> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let bytes = record::encode_composite(&type_def, record)?;
    let table = self.open_column_table(&type_def)?;
    table.update(index, &bytes)
  }

  /// Soft-deletes the record at `index`. `count` is unaffected.
  pub fn delete(&mut self, type_name: &str, index: u64) -> Result<()> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let table = self.open_column_table(&type_def)?;
    table.delete(index)
  }

  pub fn is_deleted(&mut self, type_name: &str, index: u64) -> Result<bool> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let table = self.open_column_table(&type_def)?;
    table.is_deleted(index)
  }

  pub fn count(&mut self, type_name: &str) -> Result<u64> {
    let type_def = self.registry.get_or_raise(type_name)?;
    Ok(self.open_column_table(&type_def)?.count())
  }

  /// Returns every live `(index, record)` pair in `type_name`'s table, in
  /// index order. A convenience for the external scan contract (spec.md
  /// §1: "insert/get/update/delete/scan"); callers needing a lazy cursor
  /// over a very large table should page through `get`/`is_deleted`
  /// directly instead.
  pub fn scan(&mut self, type_name: &str) -> Result<Vec<(u64, Record)>> {
    let type_def = self.registry.get_or_raise(type_name)?;
    let table = self.open_column_table(&type_def)?;
    let count = table.count();
    let mut out = Vec::new();
    for index in 0..count {
      if !table.is_deleted(index)? {
        let bytes = table.get(index)?;
        out.push((index, record::decode_composite(&type_def, &bytes)?));
      }
    }
    Ok(out)
  }

  /// Flushes and closes every table this manager has opened.
  pub fn close(&mut self) -> Result<()> {
    for table in self.tables.values_mut() {
      table.close()?;
    }
    for table in self.array_tables.values_mut() {
      table.close()?;
    }
    for table in self.variant_tables.values_mut() {
      table.close()?;
    }
    Ok(())
  }
}

impl Drop for StorageManager {
  fn drop(&mut self) {
    let _ = self.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::primitive::PrimitiveKind;
  use crate::types::{ArrayKind, ArrayTypeDef, CompositeTypeDef, Field};
  use std::sync::Arc;
  use tempfile::tempdir;

  fn person_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    let person = Arc::new(CompositeTypeDef::stub("Person"));
    person.populate(
      vec![Field::new("age", TypeDef::Primitive(PrimitiveKind::Uint8))],
      vec![],
      None,
    );
    registry.register(TypeDef::Composite(person)).unwrap();
    registry
  }

  #[test]
  fn construction_creates_dir_and_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    let _manager = StorageManager::new(&path, person_registry()).unwrap();
    assert!(path.join("_metadata.json").exists());
  }

  #[test]
  fn unopened_table_leaves_no_bin_file() {
    let dir = tempdir().unwrap();
    let mut manager = StorageManager::new(dir.path(), person_registry()).unwrap();
    let table = manager.get_table("Person").unwrap();
    assert_eq!(table.count(), 0);
    assert!(!dir.path().join("Person.bin").exists());
  }

  #[test]
  fn insert_creates_bin_file_and_round_trips() {
    let dir = tempdir().unwrap();
    let mut manager = StorageManager::new(dir.path(), person_registry()).unwrap();
    let table = manager.get_table("Person").unwrap();
    let index = table.insert(&[0u8, 42]).unwrap();
    assert_eq!(index, 0);
    assert!(dir.path().join("Person.bin").exists());
  }

  #[test]
  fn array_table_resolves_and_caches() {
    let dir = tempdir().unwrap();
    let registry = person_registry();
    let array = Arc::new(ArrayTypeDef::new("uint8[]", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Plain));
    registry.register(TypeDef::Array(array.clone())).unwrap();

    let mut manager = StorageManager::new(dir.path(), registry).unwrap();
    let table = manager.get_array_table("uint8[]").unwrap();
    let (start, length) = table.insert(&[vec![1], vec![2]]).unwrap();
    assert_eq!((start, length), (0, 2));
    assert!(dir.path().join("uint8[].bin").exists());
  }

  #[test]
  fn get_table_rejects_array_type() {
    let dir = tempdir().unwrap();
    let registry = person_registry();
    let array = Arc::new(ArrayTypeDef::new("uint8[]", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Plain));
    registry.register(TypeDef::Array(array)).unwrap();
    let mut manager = StorageManager::new(dir.path(), registry).unwrap();
    assert!(manager.get_table("uint8[]").is_err());
  }

  #[test]
  fn insert_get_and_scan_record() {
    use crate::record::FieldValue;
    use crate::primitive::PrimitiveValue;

    let dir = tempdir().unwrap();
    let mut manager = StorageManager::new(dir.path(), person_registry()).unwrap();

    let mut alice = Record::new();
    alice.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(30)));
    let i0 = manager.insert("Person", &alice).unwrap();
    assert_eq!(i0, 0);

    let fetched = manager.get("Person", 0).unwrap();
    assert_eq!(fetched.get("age"), Some(&FieldValue::Primitive(PrimitiveValue::UInt(30))));

    manager.delete("Person", 0).unwrap();
    assert!(manager.is_deleted("Person", 0).unwrap());
    assert_eq!(manager.count("Person").unwrap(), 1);
    assert!(manager.scan("Person").unwrap().is_empty());
  }
}
