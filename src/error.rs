//! The error taxonomy shared by every component of the store.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There is
//! no type erasure at the core API boundary: callers match on `Error`
//! variants the same way they'd match on the taxonomic error kinds in the
//! original design.

use thiserror::Error as ThisError;

/// The unified error type for the type registry, record codec, column/element
/// tables, storage manager, and compactor/archiver.
#[derive(Debug, ThisError)]
pub enum Error {
  /// `register` was called on a name that already names a non-stub type.
  #[error("type '{0}' is already defined")]
  DuplicateName(String),

  /// A lookup (`get_or_raise`, metadata resolution, etc.) found no such type.
  #[error("unknown type '{0}'")]
  UnknownType(String),

  /// A stub request conflicts with an existing populated type of another kind.
  #[error("'{0}' is already defined as a different, non-stub kind")]
  StubConflict(String),

  /// Inherited/declared fields with the same name disagree on type.
  #[error("field '{field}' of '{owner}' conflicts: {type_a} vs {type_b}")]
  FieldConflict {
    owner: String,
    field: String,
    type_a: String,
    type_b: String,
  },

  /// Metadata load could not make progress resolving the remaining stubs.
  #[error("could not resolve types: {0:?}")]
  UnresolvableTypes(Vec<String>),

  /// A table operation indexed outside `[0, count)`.
  #[error("index {index} out of range [0, {count})")]
  IndexError { index: u64, count: u64 },

  /// A primitive write fell outside the representable range of its kind.
  #[error("value out of range for {type_name}: {detail}")]
  OverflowError { type_name: String, detail: String },

  /// An alias chain never reached a non-alias base.
  #[error("cyclic alias: '{0}'")]
  CyclicAlias(String),

  /// An enum mixed C-style and tagged-union variants, or declared none.
  #[error("invalid enum '{0}': {1}")]
  InvalidEnum(String, &'static str),

  /// A default value is incompatible with its field's resolved type.
  #[error("invalid default for field '{field}' of type '{type_name}'")]
  InvalidDefault { type_name: String, field: String },

  /// An archive was malformed: bad magic, bad version, or a short read.
  #[error("bad archive: {0}")]
  ArchiveFormat(String),

  /// A compact/restore destination already exists.
  #[error("output already exists: {0}")]
  ExistingOutput(String),

  /// A fraction was constructed with a zero denominator, or otherwise failed
  /// to normalize. Supplements the taxonomy in spec.md §7, which omits
  /// fraction-specific failures.
  #[error("invalid fraction: {0}")]
  InvalidFraction(String),

  /// A value could not be encoded/decoded as the primitive codec expected
  /// (wrong JSON shape during metadata default decoding, malformed UTF-32
  /// scalar value, malformed bigint sign byte, etc).
  #[error("codec error: {0}")]
  Codec(String),

  /// Wraps an I/O failure from opening/growing/mmap-ing a table file.
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// Wraps a JSON (de)serialization failure from the metadata sidecar.
  #[error("metadata JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
