use super::TypeDef;

pub const HEADER_SIZE: usize = 8;

/// Distinguishes the array flavors that all share the same `(start, length)`
/// wire representation but differ in run-time semantics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArrayKind {
  /// An ordinary, ordered, duplicate-permitting array.
  Plain,
  /// The built-in `string` type: `character[]`, displayed as UTF text.
  String,
  /// A duplicate-free, logically-unordered array; `insert` deduplicates.
  Set,
  /// A `{key, value}` array built on a synthetic entry composite.
  Dictionary,
}

/// Type definition for array/string/set/dictionary types.
///
/// `size_bytes`/`reference_size` are both the fixed 8-byte `(start: u32,
/// length: u32)` header; the actual payload lives in a companion element
/// table (spec.md §4.F), addressed by that header.
#[derive(Debug)]
pub struct ArrayTypeDef {
  pub name: String,
  pub element_type: TypeDef,
  pub kind: ArrayKind,
}

impl ArrayTypeDef {
  pub fn new(name: impl Into<String>, element_type: TypeDef, kind: ArrayKind) -> Self {
    ArrayTypeDef {
      name: name.into(),
      element_type,
      kind,
    }
  }

  pub fn size_bytes(&self) -> usize {
    HEADER_SIZE
  }

  /// Canonicalizes the array type name for an element type name, matching
  /// `TypeRegistry::get_array_type`'s `"<element>[]"` convention.
  pub fn canonical_name(element_name: &str) -> String {
    format!("{}[]", element_name)
  }
}
