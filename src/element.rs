//! Component F: the element table.
//!
//! Backs array/string/set/dictionary/bigint/biguint/fraction-component
//! values: one file per element type, storing fixed-`element_size` slots and
//! addressed by the `(start, length)` header a composite field carries
//! inline (spec.md §4.F). Shares its file format with
//! [`crate::table::ColumnTable`] — same 8-byte header, same doubling growth —
//! but `insert` takes a whole run of elements at once and hands back the
//! run's `(start, length)` rather than a single index.

use crate::error::Result;
use crate::table::ColumnTable;
use std::path::PathBuf;

/// An append-only run store, keyed by `(start, length)` ranges rather than
/// single-record indices.
pub struct ElementTable {
  table: ColumnTable,
  element_size: usize,
}

impl ElementTable {
  pub fn open(path: impl Into<PathBuf>, element_size: usize) -> Result<Self> {
    Ok(ElementTable {
      table: ColumnTable::open(path, element_size)?,
      element_size,
    })
  }

  pub fn element_size(&self) -> usize {
    self.element_size
  }

  pub fn len(&self) -> u64 {
    self.table.count()
  }

  /// Appends `elements` (each exactly `element_size` bytes) as one
  /// contiguous run and returns its `(start, length)` header. An empty
  /// input returns `(0, 0)` without touching the filesystem, matching the
  /// lazy-creation discipline used throughout the storage layer (spec.md
  /// §4.F, §8 testable property 9).
  pub fn insert(&mut self, elements: &[Vec<u8>]) -> Result<(u32, u32)> {
    if elements.is_empty() {
      return Ok((0, 0));
    }
    let start = self.table.count() as u32;
    for element in elements {
      self.table.insert(element)?;
    }
    Ok((start, elements.len() as u32))
  }

  /// Appends `elements`, first deduplicating by encoded-byte equality
  /// within the run — the set-flavored insert path (spec.md §4.F). Returns
  /// the deduplicated run's `(start, length)` header.
  pub fn insert_set(&mut self, elements: &[Vec<u8>]) -> Result<(u32, u32)> {
    let mut unique: Vec<Vec<u8>> = Vec::with_capacity(elements.len());
    for element in elements {
      if !unique.iter().any(|e| e == element) {
        unique.push(element.clone());
      }
    }
    self.insert(&unique)
  }

  pub fn get_range(&self, start: u32, length: u32) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(length as usize);
    for i in 0..length as u64 {
      out.push(self.table.get(start as u64 + i)?);
    }
    Ok(out)
  }

  pub fn close(&mut self) -> Result<()> {
    self.table.close()
  }
}
