//! Component I (part 2): the portable archive format.
//!
//! Packs a whole data directory into one `.ttar` file: a `"TTAR"` magic, a
//! format version, the directory's metadata sidecar (duplicated inline so a
//! reader can inspect a schema without unpacking anything), and then every
//! table/variant file's bytes, each prefixed with its relative path and
//! length (spec.md §4.I "Archive format"). Optionally gzip-wrapped via
//! [`flate2`], the same way the source directory's own files are plain,
//! uncompressed mmap-backed tables — compression is an opt-in archival
//! concern, not a storage-layer one.

use crate::error::{Error, Result};
use crate::metadata;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"TTAR";
const VERSION: u16 = 1;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Archives `src` (a data directory written by [`crate::storage::StorageManager`])
/// into the single file at `archive_path`. `src` is first compacted into a
/// scratch directory so the archive never carries tombstoned records
/// (spec.md §4.I "archive = compact, then pack"). Fails with `ExistingOutput`
/// if `archive_path` already exists.
pub fn archive(src: &Path, archive_path: &Path, gzip: bool) -> Result<()> {
  if archive_path.exists() {
    return Err(Error::ExistingOutput(archive_path.display().to_string()));
  }

  let scratch = scratch_dir_for(archive_path)?;
  crate::compact::compact(src, &scratch)?;

  let result = write_archive(&scratch, archive_path, gzip);
  let _ = fs::remove_dir_all(&scratch);
  result
}

/// Restores the data directory packed in `archive_path` into `dst`. `dst`
/// must not already exist.
pub fn restore(archive_path: &Path, dst: &Path) -> Result<()> {
  if dst.exists() {
    return Err(Error::ExistingOutput(dst.display().to_string()));
  }

  let raw = fs::read(archive_path)?;
  let bytes = if raw.starts_with(&GZIP_MAGIC) {
    let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    out
  } else {
    raw
  };

  let files = parse_archive(&bytes)?;
  fs::create_dir_all(dst)?;
  for (relative_path, contents) in files {
    let path = dst.join(&relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
  }
  Ok(())
}

fn scratch_dir_for(archive_path: &Path) -> Result<PathBuf> {
  let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
  let name = format!(".{}.compacting", archive_path.file_name().and_then(|n| n.to_str()).unwrap_or("archive"));
  Ok(parent.join(name))
}

fn write_archive(scratch: &Path, archive_path: &Path, gzip: bool) -> Result<()> {
  let registry = metadata::load(scratch)?;
  let meta_bytes = metadata::to_json_bytes(&registry)?;

  let mut entries = Vec::new();
  collect_files(scratch, scratch, &mut entries)?;

  let mut out = Vec::new();
  out.extend_from_slice(MAGIC);
  out.extend_from_slice(&VERSION.to_le_bytes());
  out.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
  out.extend_from_slice(&meta_bytes);
  out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
  for (relative_path, contents) in &entries {
    let name_bytes = relative_path.to_string_lossy().replace('\\', "/").into_bytes();
    out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&name_bytes);
    out.extend_from_slice(&(contents.len() as u64).to_le_bytes());
    out.extend_from_slice(contents);
  }

  if gzip {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&out)?;
    out = encoder.finish()?;
  }

  fs::write(archive_path, out)?;
  Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) -> Result<()> {
  let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::result::Result<_, _>>()?;
  entries.sort_by_key(|e| e.path());
  for entry in entries {
    let path = entry.path();
    if path.is_dir() {
      collect_files(root, &path, out)?;
    } else {
      let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
      out.push((relative, fs::read(&path)?));
    }
  }
  Ok(())
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8]> {
  if *cursor + n > bytes.len() {
    return Err(Error::ArchiveFormat("unexpected end of archive".to_string()));
  }
  let slice = &bytes[*cursor..*cursor + n];
  *cursor += n;
  Ok(slice)
}

fn parse_archive(bytes: &[u8]) -> Result<Vec<(PathBuf, Vec<u8>)>> {
  let mut cursor = 0usize;

  let magic = take(bytes, &mut cursor, 4)?;
  if magic != MAGIC {
    return Err(Error::ArchiveFormat("bad magic".to_string()));
  }
  let version = u16::from_le_bytes(take(bytes, &mut cursor, 2)?.try_into().unwrap());
  if version != VERSION {
    return Err(Error::ArchiveFormat(format!("unsupported archive version {}", version)));
  }

  let meta_len = u32::from_le_bytes(take(bytes, &mut cursor, 4)?.try_into().unwrap()) as usize;
  let meta_bytes = take(bytes, &mut cursor, meta_len)?.to_vec();

  let file_count = u32::from_le_bytes(take(bytes, &mut cursor, 4)?.try_into().unwrap());
  let mut files = Vec::with_capacity(file_count as usize);
  for _ in 0..file_count {
    let name_len = u32::from_le_bytes(take(bytes, &mut cursor, 4)?.try_into().unwrap()) as usize;
    let name_bytes = take(bytes, &mut cursor, name_len)?.to_vec();
    let name = String::from_utf8(name_bytes).map_err(|e| Error::ArchiveFormat(e.to_string()))?;
    let size = u64::from_le_bytes(take(bytes, &mut cursor, 8)?.try_into().unwrap()) as usize;
    let contents = take(bytes, &mut cursor, size)?.to_vec();
    files.push((PathBuf::from(name), contents));
  }

  // `_metadata.json` is always present among `files` (it is an ordinary
  // file in the scratch directory); `meta_bytes` exists purely so a reader
  // can inspect the schema without scanning the file list for it.
  let _ = meta_bytes;
  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::primitive::PrimitiveKind;
  use crate::record::{FieldValue, Record};
  use crate::registry::TypeRegistry;
  use crate::storage::StorageManager;
  use crate::types::{CompositeTypeDef, Field, TypeDef};
  use std::sync::Arc;
  use tempfile::tempdir;

  fn person_registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    let person = Arc::new(CompositeTypeDef::stub("Person"));
    person.populate(vec![Field::new("age", TypeDef::Primitive(PrimitiveKind::Uint8))], vec![], None);
    registry.register(TypeDef::Composite(person)).unwrap();
    registry
  }

  #[test]
  fn archive_and_restore_round_trip() {
    let dir = tempdir().unwrap();
    let src_dir = dir.path().join("src");
    let archive_path = dir.path().join("out.ttar");
    let restored_dir = dir.path().join("restored");

    let mut src = StorageManager::new(&src_dir, person_registry()).unwrap();
    let mut record = Record::new();
    record.insert("age".to_string(), FieldValue::Primitive(crate::primitive::PrimitiveValue::UInt(42)));
    src.insert("Person", &record).unwrap();
    drop(src);

    archive(&src_dir, &archive_path, false).unwrap();
    assert!(archive_path.exists());

    restore(&archive_path, &restored_dir).unwrap();
    let mut restored = StorageManager::open(&restored_dir).unwrap();
    assert_eq!(restored.count("Person").unwrap(), 1);
    let fetched = restored.get("Person", 0).unwrap();
    assert_eq!(fetched.get("age"), Some(&FieldValue::Primitive(crate::primitive::PrimitiveValue::UInt(42))));
  }

  #[test]
  fn gzip_wrapped_archive_round_trips() {
    let dir = tempdir().unwrap();
    let src_dir = dir.path().join("src");
    let archive_path = dir.path().join("out.ttar.gz");
    let restored_dir = dir.path().join("restored");

    let src = StorageManager::new(&src_dir, person_registry()).unwrap();
    drop(src);

    archive(&src_dir, &archive_path, true).unwrap();
    let raw = fs::read(&archive_path).unwrap();
    assert!(raw.starts_with(&GZIP_MAGIC));

    restore(&archive_path, &restored_dir).unwrap();
    assert!(restored_dir.join("_metadata.json").exists());
  }

  #[test]
  fn refuses_to_overwrite_existing_archive() {
    let dir = tempdir().unwrap();
    let src_dir = dir.path().join("src");
    let archive_path = dir.path().join("out.ttar");
    let _src = StorageManager::new(&src_dir, person_registry()).unwrap();
    fs::write(&archive_path, b"placeholder").unwrap();
    let err = archive(&src_dir, &archive_path, false).unwrap_err();
    assert!(matches!(err, Error::ExistingOutput(_)));
  }
}
