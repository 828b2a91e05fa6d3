//! Component E: the column table.
//!
//! One mmap-backed, append-only file per (non-array) type: an 8-byte
//! `record_count` header followed by fixed-size records. Grows by doubling;
//! file creation is lazy (no file touches disk until the first `insert`)
//! (spec.md §4.E).

use crate::error::{Error, Result};
use crate::record::is_all_zero;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Bytes reserved for the `record_count` header at the start of the file.
pub const HEADER_SIZE: usize = 8;
/// Initial file size in bytes for a freshly created table (spec.md §4.E).
pub const INITIAL_FILE_SIZE: u64 = 4096;
/// File-size growth factor applied whenever a table runs out of room.
pub const GROWTH_FACTOR: u64 = 2;

/// A single record-size, mmap-backed append log.
///
/// `ColumnTable` doesn't know or care what a "record" means semantically —
/// it just moves fixed-size byte slices in and out at `record_size`
/// granularity. The record codec (`crate::record`) is responsible for
/// interpreting those bytes.
pub struct ColumnTable {
  path: PathBuf,
  record_size: usize,
  file: Option<File>,
  mmap: Option<MmapMut>,
  count: u64,
}

impl ColumnTable {
  /// Opens `path` if it exists, or prepares to create it lazily on first
  /// `insert`. Constructing a table that never inserts leaves the
  /// filesystem unchanged (spec.md §8 testable property 9).
  pub fn open(path: impl Into<PathBuf>, record_size: usize) -> Result<Self> {
    let path = path.into();
    if path.exists() {
      let mut table = ColumnTable {
        path,
        record_size,
        file: None,
        mmap: None,
        count: 0,
      };
      table.open_existing()?;
      Ok(table)
    } else {
      Ok(ColumnTable {
        path,
        record_size,
        file: None,
        mmap: None,
        count: 0,
      })
    }
  }

  fn is_open(&self) -> bool {
    self.mmap.is_some()
  }

  fn open_existing(&mut self) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    self.count = u64::from_le_bytes(mmap[0..8].try_into().unwrap());
    self.file = Some(file);
    self.mmap = Some(mmap);
    Ok(())
  }

  fn create_new(&mut self) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&self.path)?;
    file.set_len(INITIAL_FILE_SIZE)?;
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };
    mmap[0..8].copy_from_slice(&0u64.to_le_bytes());
    mmap.flush()?;
    tracing::debug!(path = %self.path.display(), "created column table file");
    self.count = 0;
    self.file = Some(file);
    self.mmap = Some(mmap);
    Ok(())
  }

  fn ensure_open(&mut self) -> Result<()> {
    if !self.is_open() {
      self.create_new()?;
    }
    Ok(())
  }

  fn capacity(&self) -> u64 {
    match &self.mmap {
      Some(mmap) => ((mmap.len() as u64).saturating_sub(HEADER_SIZE as u64)) / self.record_size as u64,
      None => 0,
    }
  }

  fn grow(&mut self) -> Result<()> {
    let file = self.file.as_ref().expect("grow called before table opened");
    let current_len = file.metadata()?.len();
    let new_len = current_len * GROWTH_FACTOR;
    file.set_len(new_len)?;
    // Re-map: mmap must be dropped before remapping the same file handle.
    self.mmap = None;
    let mmap = unsafe { MmapMut::map_mut(file)? };
    tracing::debug!(path = %self.path.display(), old_len = current_len, new_len, "grew column table file");
    self.mmap = Some(mmap);
    Ok(())
  }

  fn record_offset(&self, index: u64) -> usize {
    HEADER_SIZE + (index as usize) * self.record_size
  }

  pub fn count(&self) -> u64 {
    self.count
  }

  fn persist_count(&mut self) -> Result<()> {
    let count = self.count;
    let mmap = self.mmap.as_mut().unwrap();
    mmap[0..8].copy_from_slice(&count.to_le_bytes());
    Ok(())
  }

  /// Appends `data` (exactly `record_size` bytes) and returns its new index.
  pub fn insert(&mut self, data: &[u8]) -> Result<u64> {
    if data.len() != self.record_size {
      return Err(Error::Codec(format!(
        "record size mismatch: expected {}, got {}",
        self.record_size,
        data.len()
      )));
    }

    self.ensure_open()?;
    if self.count >= self.capacity() {
      self.grow()?;
    }

    let index = self.count;
    let offset = self.record_offset(index);
    let record_size = self.record_size;
    let mmap = self.mmap.as_mut().unwrap();
    mmap[offset..offset + record_size].copy_from_slice(data);

    self.count += 1;
    self.persist_count()?;
    self.mmap.as_mut().unwrap().flush()?;
    Ok(index)
  }

  fn check_bounds(&self, index: u64) -> Result<()> {
    if index >= self.count {
      return Err(Error::IndexError { index, count: self.count });
    }
    Ok(())
  }

  pub fn get(&self, index: u64) -> Result<Vec<u8>> {
    self.check_bounds(index)?;
    let offset = self.record_offset(index);
    let mmap = self.mmap.as_ref().expect("table with count > 0 must be open");
    Ok(mmap[offset..offset + self.record_size].to_vec())
  }

  pub fn update(&mut self, index: u64, data: &[u8]) -> Result<()> {
    self.check_bounds(index)?;
    if data.len() != self.record_size {
      return Err(Error::Codec(format!(
        "record size mismatch: expected {}, got {}",
        self.record_size,
        data.len()
      )));
    }
    let offset = self.record_offset(index);
    let record_size = self.record_size;
    let mmap = self.mmap.as_mut().unwrap();
    mmap[offset..offset + record_size].copy_from_slice(data);
    mmap.flush()?;
    Ok(())
  }

  /// Soft-deletes the record at `index` by zeroing its bytes. `count` is
  /// unchanged; the index is never reclaimed (spec.md §3.3).
  pub fn delete(&mut self, index: u64) -> Result<()> {
    self.check_bounds(index)?;
    let offset = self.record_offset(index);
    let record_size = self.record_size;
    let mmap = self.mmap.as_mut().unwrap();
    mmap[offset..offset + record_size].fill(0);
    mmap.flush()?;
    Ok(())
  }

  pub fn is_deleted(&self, index: u64) -> Result<bool> {
    Ok(is_all_zero(&self.get(index)?))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn close(&mut self) -> Result<()> {
    if let Some(mmap) = self.mmap.as_mut() {
      mmap.flush()?;
    }
    self.mmap = None;
    self.file = None;
    Ok(())
  }
}

impl Drop for ColumnTable {
  fn drop(&mut self) {
    let _ = self.close();
  }
}
