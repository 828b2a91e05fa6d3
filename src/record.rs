//! Component D: the record codec.
//!
//! Encodes/decodes a composite record as a null bitmap followed by inline
//! field references (spec.md §4.D), and an enum record as a discriminant
//! plus optional payload-table index.
//!
//! Composite fields never hold nested values directly: a field typed as
//! another composite/array/interface holds a *reference* (an index, an
//! array `(start, length)` header, or a tagged `(type_id, index)` pair) into
//! that type's own table. Resolving a reference into an actual value is the
//! caller's job (the table/storage layer), matching spec.md §3.1's
//! `reference_size` model.

use crate::error::{Error, Result};
use crate::primitive::{self, PrimitiveValue};
use crate::types::{CompositeTypeDef, EnumTypeDef, EnumVariant, InterfaceTypeDef, TypeDef};
use bit_vec::BitVec;
use std::collections::HashMap;

/// `bit-vec` packs `to_bytes`/`from_bytes` MSB-first within each byte, but
/// spec.md §4.D's null bitmap is LSB-first ("Bit `i` of the bitmap (LSB-first
/// within each byte)"). Reversing each byte's bit order converts between the
/// two conventions, the same trick the teacher's `BitVecExt::from_rev_be`/
/// `to_rev_be` (`examples/j-schwar-chii/src/bit.rs`) applies via
/// `reverse_bits()` before handing bytes to `bit-vec`, generalized here from
/// a single integer to an arbitrary-length bitmap.
fn lsb_first_bytes(bitmap: &BitVec) -> Vec<u8> {
  bitmap.to_bytes().into_iter().map(u8::reverse_bits).collect()
}

fn bitmap_from_lsb_first_bytes(bytes: &[u8]) -> BitVec {
  let reversed: Vec<u8> = bytes.iter().map(|b| b.reverse_bits()).collect();
  BitVec::from_bytes(&reversed)
}

/// Sentinel `(start, length)` denoting a null array/set/dict/bigint/string
/// field, redundant with the null bitmap but used to keep an all-null live
/// record distinguishable from a soft-delete tombstone (spec.md §4.D).
pub const NULL_ARRAY_REF: (u32, u32) = (0xFFFF_FFFF, 0);

/// Sentinel `type_id` denoting a null interface field.
pub const NULL_INTERFACE_TYPE_ID: u16 = 0;

/// One field's worth of a decoded/to-be-encoded composite record.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
  Null,
  Primitive(PrimitiveValue),
  /// Index into a composite type's own table.
  CompositeRef(u32),
  /// `(start, length)` into an element table.
  ArrayRef { start: u32, length: u32 },
  /// Tagged `(type_id, index)` reference into a concrete implementor's table.
  InterfaceRef { type_id: u16, index: u32 },
  /// Two array headers: numerator bytes, then denominator bytes.
  FractionRef {
    numerator: (u32, u32),
    denominator: (u32, u32),
  },
  /// Inline enum value: a discriminant, plus (for tagged enums) the index
  /// into the variant's payload table.
  Enum { discriminant: i64, variant_index: Option<u32> },
}

/// A composite/interface record as a field-name-keyed map of references.
pub type Record = HashMap<String, FieldValue>;

fn fields_of(type_def: &TypeDef) -> Result<Vec<crate::types::Field>> {
  match type_def {
    TypeDef::Composite(c) => Ok(c.fields()),
    TypeDef::Interface(i) => Ok(i.fields()),
    _ => Err(Error::Codec("expected a composite or interface type".to_string())),
  }
}

fn null_bitmap_size(n: usize) -> usize {
  if n == 0 {
    0
  } else {
    (n + 7) / 8
  }
}

/// Encodes a composite or interface record: `[null_bitmap][field0]...`.
pub fn encode_composite(type_def: &TypeDef, record: &Record) -> Result<Vec<u8>> {
  let fields = fields_of(type_def)?;
  let mut bitmap = BitVec::from_elem(null_bitmap_size(fields.len()) * 8, false);
  let mut body = Vec::new();

  for (i, field) in fields.iter().enumerate() {
    let value = record.get(&field.name).cloned().unwrap_or(FieldValue::Null);
    if matches!(value, FieldValue::Null) {
      bitmap.set(i, true);
    }
    body.extend(encode_field_reference(&field.type_def, &value, field.overflow)?);
  }

  let mut out = lsb_first_bytes(&bitmap);
  out.extend(body);
  Ok(out)
}

/// Decodes a composite/interface record, trusting the null bitmap as ground
/// truth for which fields are null (spec.md §4.D).
pub fn decode_composite(type_def: &TypeDef, bytes: &[u8]) -> Result<Record> {
  let fields = fields_of(type_def)?;
  let bitmap_size = null_bitmap_size(fields.len());
  if bytes.len() < bitmap_size {
    return Err(Error::Codec("record shorter than its null bitmap".to_string()));
  }
  let bitmap = bitmap_from_lsb_first_bytes(&bytes[..bitmap_size]);

  let mut record = Record::new();
  let mut offset = bitmap_size;
  for (i, field) in fields.iter().enumerate() {
    let ref_size = field.type_def.reference_size();
    let slice = &bytes[offset..offset + ref_size];
    let is_null = bitmap.get(i).unwrap_or(false);
    let value = if is_null {
      FieldValue::Null
    } else {
      decode_field_reference(&field.type_def, slice)?
    };
    record.insert(field.name.clone(), value);
    offset += ref_size;
  }
  Ok(record)
}

/// Encodes one field's inline reference bytes, per the dispatch table in
/// spec.md §4.D.
pub fn encode_field_reference(
  type_def: &TypeDef,
  value: &FieldValue,
  overflow: Option<crate::primitive::OverflowPolicy>,
) -> Result<Vec<u8>> {
  let base = type_def.resolve_base_type();

  match (&base, value) {
    (TypeDef::Array(_), FieldValue::Null) | (TypeDef::BigInt(_), FieldValue::Null) | (TypeDef::BigUInt(_), FieldValue::Null) => {
      let mut out = Vec::with_capacity(8);
      out.extend_from_slice(&NULL_ARRAY_REF.0.to_le_bytes());
      out.extend_from_slice(&NULL_ARRAY_REF.1.to_le_bytes());
      Ok(out)
    }

    (TypeDef::Interface(_), FieldValue::Null) => Ok(vec![0u8; 6]),

    (TypeDef::Fraction(_), FieldValue::Null) => {
      let mut out = Vec::with_capacity(16);
      out.extend_from_slice(&NULL_ARRAY_REF.0.to_le_bytes());
      out.extend_from_slice(&NULL_ARRAY_REF.1.to_le_bytes());
      out.extend_from_slice(&NULL_ARRAY_REF.0.to_le_bytes());
      out.extend_from_slice(&NULL_ARRAY_REF.1.to_le_bytes());
      Ok(out)
    }

    (_, FieldValue::Null) => Ok(vec![0u8; type_def.reference_size()]),

    (TypeDef::Primitive(kind), FieldValue::Primitive(pv)) => primitive::encode(pv, *kind, overflow),

    (TypeDef::Overflow(o), FieldValue::Primitive(pv)) => primitive::encode(pv, o.base, Some(o.policy)),

    (TypeDef::Array(_), FieldValue::ArrayRef { start, length }) => {
      let mut out = Vec::with_capacity(8);
      out.extend_from_slice(&start.to_le_bytes());
      out.extend_from_slice(&length.to_le_bytes());
      Ok(out)
    }

    (TypeDef::BigInt(_), FieldValue::ArrayRef { start, length }) | (TypeDef::BigUInt(_), FieldValue::ArrayRef { start, length }) => {
      let mut out = Vec::with_capacity(8);
      out.extend_from_slice(&start.to_le_bytes());
      out.extend_from_slice(&length.to_le_bytes());
      Ok(out)
    }

    (TypeDef::Fraction(_), FieldValue::FractionRef { numerator, denominator }) => {
      let mut out = Vec::with_capacity(16);
      out.extend_from_slice(&numerator.0.to_le_bytes());
      out.extend_from_slice(&numerator.1.to_le_bytes());
      out.extend_from_slice(&denominator.0.to_le_bytes());
      out.extend_from_slice(&denominator.1.to_le_bytes());
      Ok(out)
    }

    (TypeDef::Composite(_), FieldValue::CompositeRef(index)) => Ok(index.to_le_bytes().to_vec()),

    (TypeDef::Interface(_), FieldValue::InterfaceRef { type_id, index }) => {
      let mut out = Vec::with_capacity(6);
      out.extend_from_slice(&type_id.to_le_bytes());
      out.extend_from_slice(&index.to_le_bytes());
      Ok(out)
    }

    (TypeDef::Enum(e), FieldValue::Enum { discriminant, variant_index }) => encode_enum_inline(e, *discriminant, *variant_index),

    _ => Err(Error::Codec(format!(
      "value does not match field type '{}'",
      type_def.name()
    ))),
  }
}

pub(crate) fn decode_field_reference(type_def: &TypeDef, bytes: &[u8]) -> Result<FieldValue> {
  let base = type_def.resolve_base_type();

  Ok(match &base {
    TypeDef::Primitive(kind) => FieldValue::Primitive(primitive::decode(bytes, *kind)?),
    TypeDef::Overflow(o) => FieldValue::Primitive(primitive::decode(bytes, o.base)?),
    TypeDef::Array(_) | TypeDef::BigInt(_) | TypeDef::BigUInt(_) => {
      let start = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
      let length = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
      if (start, length) == NULL_ARRAY_REF {
        FieldValue::Null
      } else {
        FieldValue::ArrayRef { start, length }
      }
    }
    TypeDef::Fraction(_) => {
      let numerator = (
        u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
      );
      let denominator = (
        u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
      );
      FieldValue::FractionRef { numerator, denominator }
    }
    TypeDef::Composite(_) => FieldValue::CompositeRef(u32::from_le_bytes(bytes[0..4].try_into().unwrap())),
    TypeDef::Interface(_) => {
      let type_id = u16::from_le_bytes(bytes[0..2].try_into().unwrap());
      let index = u32::from_le_bytes(bytes[2..6].try_into().unwrap());
      if type_id == NULL_INTERFACE_TYPE_ID {
        FieldValue::Null
      } else {
        FieldValue::InterfaceRef { type_id, index }
      }
    }
    TypeDef::Enum(e) => decode_enum_inline(e, bytes)?,
    TypeDef::Alias(_) => unreachable!("resolve_base_type never returns an alias"),
  })
}

/// Encodes an enum value inline: C-style writes just the discriminant
/// (padded to `discriminant_size`); tagged writes discriminant then a
/// `u32` variant-table index (spec.md §4.D).
fn encode_enum_inline(e: &EnumTypeDef, discriminant: i64, variant_index: Option<u32>) -> Result<Vec<u8>> {
  let disc_size = e.discriminant_size();
  let mut out = encode_discriminant(discriminant, disc_size)?;
  if e.has_associated_values() {
    let index = variant_index.ok_or_else(|| Error::Codec(format!("enum '{}' requires a variant index", e.name)))?;
    out.extend_from_slice(&index.to_le_bytes());
  }
  Ok(out)
}

fn decode_enum_inline(e: &EnumTypeDef, bytes: &[u8]) -> Result<FieldValue> {
  let disc_size = e.discriminant_size();
  let discriminant = decode_discriminant(&bytes[..disc_size]);
  let variant_index = if e.has_associated_values() {
    Some(u32::from_le_bytes(bytes[disc_size..disc_size + 4].try_into().unwrap()))
  } else {
    None
  };
  Ok(FieldValue::Enum { discriminant, variant_index })
}

fn encode_discriminant(value: i64, width: usize) -> Result<Vec<u8>> {
  Ok(match width {
    1 => vec![value as u8],
    2 => (value as u16).to_le_bytes().to_vec(),
    4 => (value as u32).to_le_bytes().to_vec(),
    _ => return Err(Error::Codec(format!("unsupported discriminant width {}", width))),
  })
}

fn decode_discriminant(bytes: &[u8]) -> i64 {
  match bytes.len() {
    1 => bytes[0] as i64,
    2 => u16::from_le_bytes(bytes.try_into().unwrap()) as i64,
    4 => u32::from_le_bytes(bytes.try_into().unwrap()) as i64,
    _ => unreachable!(),
  }
}

/// Encodes a standalone payload record for one enum variant's table, using
/// the same `[bitmap][fields...]` composite layout over the variant's own
/// field list (spec.md §3.3 "Enum variant payloads live in per-variant
/// composite tables").
pub fn encode_variant_record(variant: &EnumVariant, record: &Record) -> Result<Vec<u8>> {
  let fields = variant.fields.clone();
  let mut bitmap = BitVec::from_elem(null_bitmap_size(fields.len()) * 8, false);
  let mut body = Vec::new();
  for (i, field) in fields.iter().enumerate() {
    let value = record.get(&field.name).cloned().unwrap_or(FieldValue::Null);
    if matches!(value, FieldValue::Null) {
      bitmap.set(i, true);
    }
    body.extend(encode_field_reference(&field.type_def, &value, field.overflow)?);
  }
  let mut out = lsb_first_bytes(&bitmap);
  out.extend(body);
  Ok(out)
}

pub fn decode_variant_record(variant: &EnumVariant, bytes: &[u8]) -> Result<Record> {
  let bitmap_size = null_bitmap_size(variant.fields.len());
  let bitmap = bitmap_from_lsb_first_bytes(&bytes[..bitmap_size]);
  let mut record = Record::new();
  let mut offset = bitmap_size;
  for (i, field) in variant.fields.iter().enumerate() {
    let ref_size = field.type_def.reference_size();
    let slice = &bytes[offset..offset + ref_size];
    let value = if bitmap.get(i).unwrap_or(false) {
      FieldValue::Null
    } else {
      decode_field_reference(&field.type_def, slice)?
    };
    record.insert(field.name.clone(), value);
    offset += ref_size;
  }
  Ok(record)
}

/// Returns `true` iff every byte in `data` is zero, the soft-delete
/// tombstone test (spec.md §4.D/§4.E).
pub fn is_all_zero(data: &[u8]) -> bool {
  data.iter().all(|b| *b == 0)
}

pub fn variant_record_size(variant: &EnumVariant) -> usize {
  null_bitmap_size(variant.fields.len()) + variant.fields.iter().map(|f| f.type_def.reference_size()).sum::<usize>()
}
