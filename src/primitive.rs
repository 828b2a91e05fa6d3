//! Component A: the primitive codec.
//!
//! Encodes/decodes the 15 built-in primitive kinds to/from fixed-width,
//! little-endian byte sequences. All multi-byte integers and floats are
//! little-endian; `bit` is one byte, `character` is a UTF-32 scalar value,
//! and `uint128`/`int128` are two little-endian `u64` halves (low, high).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One of the 15 built-in primitive kinds (spec.md §6.4).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
  Bit,
  Character,
  Uint8,
  Int8,
  Uint16,
  Int16,
  Uint32,
  Int32,
  Uint64,
  Int64,
  Uint128,
  Int128,
  Float16,
  Float32,
  Float64,
}

impl PrimitiveKind {
  /// The stable name used in the DSL/metadata/error messages.
  pub fn name(self) -> &'static str {
    use PrimitiveKind::*;
    match self {
      Bit => "bit",
      Character => "character",
      Uint8 => "uint8",
      Int8 => "int8",
      Uint16 => "uint16",
      Int16 => "int16",
      Uint32 => "uint32",
      Int32 => "int32",
      Uint64 => "uint64",
      Int64 => "int64",
      Uint128 => "uint128",
      Int128 => "int128",
      Float16 => "float16",
      Float32 => "float32",
      Float64 => "float64",
    }
  }

  /// Parses a stable primitive name back into a `PrimitiveKind`.
  pub fn from_name(name: &str) -> Option<Self> {
    use PrimitiveKind::*;
    Some(match name {
      "bit" => Bit,
      "character" => Character,
      "uint8" => Uint8,
      "int8" => Int8,
      "uint16" => Uint16,
      "int16" => Int16,
      "uint32" => Uint32,
      "int32" => Int32,
      "uint64" => Uint64,
      "int64" => Int64,
      "uint128" => Uint128,
      "int128" => Int128,
      "float16" => Float16,
      "float32" => Float32,
      "float64" => Float64,
      _ => return None,
    })
  }

  /// The fixed width in bytes of an encoded value of this kind.
  pub fn size_bytes(self) -> usize {
    use PrimitiveKind::*;
    match self {
      Bit => 1,
      Character => 4,
      Uint8 | Int8 => 1,
      Uint16 | Int16 => 2,
      Uint32 | Int32 => 4,
      Uint64 | Int64 => 8,
      Uint128 | Int128 => 16,
      Float16 => 2,
      Float32 => 4,
      Float64 => 8,
    }
  }

  /// True for the signed/unsigned integer kinds (everything but `bit`,
  /// `character` and the floats).
  pub fn is_integer(self) -> bool {
    use PrimitiveKind::*;
    matches!(
      self,
      Uint8 | Int8 | Uint16 | Int16 | Uint32 | Int32 | Uint64 | Int64 | Uint128 | Int128
    )
  }

  pub fn is_signed(self) -> bool {
    use PrimitiveKind::*;
    matches!(self, Int8 | Int16 | Int32 | Int64 | Int128)
  }

  pub fn is_float(self) -> bool {
    use PrimitiveKind::*;
    matches!(self, Float16 | Float32 | Float64)
  }
}

/// A decoded primitive value.
///
/// Integers of every width are normalized into `i128`/`u128` at the value
/// layer; the codec is what's responsible for narrowing/widening to the
/// kind's actual wire width.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimitiveValue {
  Bit(bool),
  Character(char),
  Int(i128),
  UInt(u128),
  Float(f64),
}

/// Applied to a primitive write inside a composite field that carries an
/// overflow wrapper (spec.md §3.1 "Overflow wrapper").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
  Saturating,
  Wrapping,
}

/// Encodes `value` as `kind`'s fixed-width little-endian representation.
///
/// With no `policy`, out-of-range integer values fail with `OverflowError`.
/// With a policy, values are clamped (`Saturating`) or reduced modulo `2^N`
/// with two's-complement wraparound for signed kinds (`Wrapping`).
pub fn encode(value: &PrimitiveValue, kind: PrimitiveKind, policy: Option<OverflowPolicy>) -> Result<Vec<u8>> {
  match (value, kind) {
    (PrimitiveValue::Bit(b), PrimitiveKind::Bit) => Ok(vec![if *b { 1 } else { 0 }]),
    (PrimitiveValue::Character(c), PrimitiveKind::Character) => Ok((*c as u32).to_le_bytes().to_vec()),
    (PrimitiveValue::Int(i), k) if k.is_integer() && k.is_signed() => encode_signed(*i, k, policy),
    (PrimitiveValue::Int(i), k) if k.is_integer() => encode_unsigned_from_signed(*i, k, policy),
    (PrimitiveValue::UInt(u), k) if k.is_integer() => encode_unsigned(*u, k, policy),
    (PrimitiveValue::Float(f), PrimitiveKind::Float16) => {
      if policy.is_some() {
        return Err(Error::Codec("float kinds reject overflow policies".into()));
      }
      Ok(f16_from_f64(*f).to_le_bytes().to_vec())
    }
    (PrimitiveValue::Float(f), PrimitiveKind::Float32) => {
      if policy.is_some() {
        return Err(Error::Codec("float kinds reject overflow policies".into()));
      }
      Ok((*f as f32).to_le_bytes().to_vec())
    }
    (PrimitiveValue::Float(f), PrimitiveKind::Float64) => {
      if policy.is_some() {
        return Err(Error::Codec("float kinds reject overflow policies".into()));
      }
      Ok(f.to_le_bytes().to_vec())
    }
    _ => Err(Error::Codec(format!("value does not match primitive kind {}", kind.name()))),
  }
}

/// Decodes `kind`'s fixed-width little-endian representation from `bytes`.
///
/// `bytes` must be exactly `kind.size_bytes()` long.
pub fn decode(bytes: &[u8], kind: PrimitiveKind) -> Result<PrimitiveValue> {
  if bytes.len() != kind.size_bytes() {
    return Err(Error::Codec(format!(
      "expected {} bytes for {}, got {}",
      kind.size_bytes(),
      kind.name(),
      bytes.len()
    )));
  }

  Ok(match kind {
    PrimitiveKind::Bit => PrimitiveValue::Bit(bytes[0] != 0),
    PrimitiveKind::Character => {
      let code_point = u32::from_le_bytes(bytes.try_into().unwrap());
      let c = char::from_u32(code_point)
        .ok_or_else(|| Error::Codec(format!("{:#x} is not a valid Unicode scalar value", code_point)))?;
      PrimitiveValue::Character(c)
    }
    PrimitiveKind::Uint8 => PrimitiveValue::UInt(bytes[0] as u128),
    PrimitiveKind::Int8 => PrimitiveValue::Int(bytes[0] as i8 as i128),
    PrimitiveKind::Uint16 => PrimitiveValue::UInt(u16::from_le_bytes(bytes.try_into().unwrap()) as u128),
    PrimitiveKind::Int16 => PrimitiveValue::Int(i16::from_le_bytes(bytes.try_into().unwrap()) as i128),
    PrimitiveKind::Uint32 => PrimitiveValue::UInt(u32::from_le_bytes(bytes.try_into().unwrap()) as u128),
    PrimitiveKind::Int32 => PrimitiveValue::Int(i32::from_le_bytes(bytes.try_into().unwrap()) as i128),
    PrimitiveKind::Uint64 => PrimitiveValue::UInt(u64::from_le_bytes(bytes.try_into().unwrap()) as u128),
    PrimitiveKind::Int64 => PrimitiveValue::Int(i64::from_le_bytes(bytes.try_into().unwrap()) as i128),
    PrimitiveKind::Uint128 => {
      let low = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as u128;
      let high = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as u128;
      PrimitiveValue::UInt(low | (high << 64))
    }
    PrimitiveKind::Int128 => {
      let low = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as u128;
      let high = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as u128;
      PrimitiveValue::Int(((low | (high << 64)) as u128) as i128)
    }
    PrimitiveKind::Float16 => PrimitiveValue::Float(f16_to_f64(u16::from_le_bytes(bytes.try_into().unwrap()))),
    PrimitiveKind::Float32 => PrimitiveValue::Float(f32::from_le_bytes(bytes.try_into().unwrap()) as f64),
    PrimitiveKind::Float64 => PrimitiveValue::Float(f64::from_le_bytes(bytes.try_into().unwrap())),
  })
}

fn encode_signed(value: i128, kind: PrimitiveKind, policy: Option<OverflowPolicy>) -> Result<Vec<u8>> {
  let (min, max, width): (i128, i128, usize) = match kind {
    PrimitiveKind::Int8 => (i8::MIN as i128, i8::MAX as i128, 1),
    PrimitiveKind::Int16 => (i16::MIN as i128, i16::MAX as i128, 2),
    PrimitiveKind::Int32 => (i32::MIN as i128, i32::MAX as i128, 4),
    PrimitiveKind::Int64 => (i64::MIN as i128, i64::MAX as i128, 8),
    PrimitiveKind::Int128 => (i128::MIN, i128::MAX, 16),
    _ => unreachable!(),
  };

  let clamped = if value < min || value > max {
    match policy {
      None => {
        return Err(Error::OverflowError {
          type_name: kind.name().to_string(),
          detail: format!("{} not in [{}, {}]", value, min, max),
        })
      }
      Some(OverflowPolicy::Saturating) => value.clamp(min, max),
      Some(OverflowPolicy::Wrapping) => wrap_signed(value, width),
    }
  } else {
    value
  };

  Ok(match width {
    1 => vec![clamped as i8 as u8],
    2 => (clamped as i16).to_le_bytes().to_vec(),
    4 => (clamped as i32).to_le_bytes().to_vec(),
    8 => (clamped as i64).to_le_bytes().to_vec(),
    16 => (clamped as i128).to_le_bytes().to_vec(),
    _ => unreachable!(),
  })
}

/// Wraps a signed `i128` modulo `2^(width*8)`, producing the two's-complement
/// representative in `[min, max]` for that width.
fn wrap_signed(value: i128, width: usize) -> i128 {
  let bits = (width * 8) as u32;
  if bits >= 128 {
    return value;
  }
  let modulus = 1i128 << bits;
  let mut reduced = value.rem_euclid(modulus);
  let half = modulus / 2;
  if reduced >= half {
    reduced -= modulus;
  }
  reduced
}

fn encode_unsigned_from_signed(value: i128, kind: PrimitiveKind, policy: Option<OverflowPolicy>) -> Result<Vec<u8>> {
  if value < 0 {
    return match policy {
      None => Err(Error::OverflowError {
        type_name: kind.name().to_string(),
        detail: format!("{} is negative", value),
      }),
      Some(OverflowPolicy::Saturating) => encode_unsigned(0, kind, policy),
      Some(OverflowPolicy::Wrapping) => encode_unsigned(wrap_to_unsigned(value, kind), kind, policy),
    };
  }
  encode_unsigned(value as u128, kind, policy)
}

fn wrap_to_unsigned(value: i128, kind: PrimitiveKind) -> u128 {
  let width = match kind {
    PrimitiveKind::Uint8 => 1,
    PrimitiveKind::Uint16 => 2,
    PrimitiveKind::Uint32 => 4,
    PrimitiveKind::Uint64 => 8,
    PrimitiveKind::Uint128 => 16,
    _ => unreachable!(),
  };
  let bits = (width * 8) as u32;
  if bits >= 128 {
    return value as u128;
  }
  let modulus = 1i128 << bits;
  value.rem_euclid(modulus) as u128
}

fn encode_unsigned(value: u128, kind: PrimitiveKind, policy: Option<OverflowPolicy>) -> Result<Vec<u8>> {
  let (max, width): (u128, usize) = match kind {
    PrimitiveKind::Uint8 => (u8::MAX as u128, 1),
    PrimitiveKind::Uint16 => (u16::MAX as u128, 2),
    PrimitiveKind::Uint32 => (u32::MAX as u128, 4),
    PrimitiveKind::Uint64 => (u64::MAX as u128, 8),
    PrimitiveKind::Uint128 => (u128::MAX, 16),
    _ => unreachable!(),
  };

  let clamped = if value > max {
    match policy {
      None => {
        return Err(Error::OverflowError {
          type_name: kind.name().to_string(),
          detail: format!("{} not in [0, {}]", value, max),
        })
      }
      Some(OverflowPolicy::Saturating) => max,
      Some(OverflowPolicy::Wrapping) => {
        let bits = (width * 8) as u32;
        if bits >= 128 {
          value
        } else {
          value % (1u128 << bits)
        }
      }
    }
  } else {
    value
  };

  Ok(match width {
    1 => vec![clamped as u8],
    2 => (clamped as u16).to_le_bytes().to_vec(),
    4 => (clamped as u32).to_le_bytes().to_vec(),
    8 => (clamped as u64).to_le_bytes().to_vec(),
    16 => clamped.to_le_bytes().to_vec(),
    _ => unreachable!(),
  })
}

/// Converts an `f64` into IEEE 754 binary16, rounding to nearest, ties to
/// even. `half`-style crates aren't in the dependency set this store was
/// grown from, so the conversion is hand-rolled here.
pub fn f16_from_f64(value: f64) -> u16 {
  f16_from_f32(value as f32)
}

/// Converts an `f32` into IEEE 754 binary16.
pub fn f16_from_f32(value: f32) -> u16 {
  let bits = value.to_bits();
  let sign = ((bits >> 16) & 0x8000) as u16;
  let exp = ((bits >> 23) & 0xff) as i32 - 127 + 15;
  let mantissa = bits & 0x7f_ffff;

  if value.is_nan() {
    let payload = (mantissa >> 13) as u16;
    return sign | 0x7c00 | payload.max(1);
  }
  if value.is_infinite() {
    return sign | 0x7c00;
  }
  if exp >= 0x1f {
    // Overflow: saturate to infinity.
    return sign | 0x7c00;
  }
  if exp <= 0 {
    // Subnormal or zero in binary16.
    if exp < -10 {
      return sign;
    }
    let mantissa_with_implicit = mantissa | 0x0080_0000;
    let shift = 14 - exp;
    let half_mantissa = round_shift(mantissa_with_implicit, shift);
    return sign | half_mantissa as u16;
  }

  let half_mantissa = round_shift(mantissa, 13);
  let mut exp = exp as u16;
  let mut mantissa16 = half_mantissa as u16;
  if mantissa16 & 0x0400 != 0 {
    // Rounding carried into the exponent.
    mantissa16 = 0;
    exp += 1;
  }
  if exp >= 0x1f {
    return sign | 0x7c00;
  }
  sign | (exp << 10) | mantissa16
}

/// Rounds `value >> shift` to nearest, ties to even.
fn round_shift(value: u32, shift: i32) -> u32 {
  if shift <= 0 {
    return value << (-shift);
  }
  if shift >= 32 {
    return 0;
  }
  let half = 1u32 << (shift - 1);
  let mask = (1u32 << shift) - 1;
  let truncated = value >> shift;
  let remainder = value & mask;
  if remainder > half || (remainder == half && (truncated & 1) == 1) {
    truncated + 1
  } else {
    truncated
  }
}

/// Converts an IEEE 754 binary16 bit pattern back into an `f64`.
pub fn f16_to_f64(bits: u16) -> f64 {
  let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
  let exp = (bits >> 10) & 0x1f;
  let mantissa = (bits & 0x3ff) as f64;

  if exp == 0 {
    if mantissa == 0.0 {
      return sign * 0.0;
    }
    return sign * mantissa * 2f64.powi(-24);
  }
  if exp == 0x1f {
    if mantissa == 0.0 {
      return sign * f64::INFINITY;
    }
    return f64::NAN;
  }
  sign * (1.0 + mantissa / 1024.0) * 2f64.powi(exp as i32 - 15)
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn uint8_round_trip() {
    let bytes = encode(&PrimitiveValue::UInt(200), PrimitiveKind::Uint8, None).unwrap();
    assert_eq!(bytes, vec![200]);
    assert_eq!(decode(&bytes, PrimitiveKind::Uint8).unwrap(), PrimitiveValue::UInt(200));
  }

  #[test]
  fn uint8_overflow_without_policy_fails() {
    let err = encode(&PrimitiveValue::UInt(300), PrimitiveKind::Uint8, None);
    assert!(matches!(err, Err(Error::OverflowError { .. })));
  }

  #[test]
  fn uint8_saturating_clamps() {
    let bytes = encode(&PrimitiveValue::UInt(300), PrimitiveKind::Uint8, Some(OverflowPolicy::Saturating)).unwrap();
    assert_eq!(bytes, vec![255]);
  }

  #[test]
  fn uint8_wrapping_reduces_mod_256() {
    let bytes = encode(&PrimitiveValue::UInt(300), PrimitiveKind::Uint8, Some(OverflowPolicy::Wrapping)).unwrap();
    assert_eq!(bytes, vec![(300u32 % 256) as u8]);
  }

  #[test]
  fn int8_wrapping_two_complement() {
    let bytes = encode(&PrimitiveValue::Int(200), PrimitiveKind::Int8, Some(OverflowPolicy::Wrapping)).unwrap();
    assert_eq!(bytes, vec![200u8]); // 200 as i8 is -56, two's complement byte is still 0xc8
  }

  #[test]
  fn int128_round_trip() {
    let v = -123456789012345678901234567i128;
    let bytes = encode(&PrimitiveValue::Int(v), PrimitiveKind::Int128, None).unwrap();
    assert_eq!(decode(&bytes, PrimitiveKind::Int128).unwrap(), PrimitiveValue::Int(v));
  }

  #[test]
  fn character_round_trip() {
    let bytes = encode(&PrimitiveValue::Character('λ'), PrimitiveKind::Character, None).unwrap();
    assert_eq!(decode(&bytes, PrimitiveKind::Character).unwrap(), PrimitiveValue::Character('λ'));
  }

  #[test]
  fn character_surrogate_fails() {
    let bytes = 0xd800u32.to_le_bytes();
    assert!(decode(&bytes, PrimitiveKind::Character).is_err());
  }

  #[test]
  fn float16_round_trip_exact_values() {
    for v in [0.0f32, 1.0, -1.0, 0.5, 10.0, -10.0] {
      let bits = f16_from_f32(v);
      let back = f16_to_f64(bits);
      assert_eq!(back, v as f64);
    }
  }

  #[test]
  fn float_kind_rejects_overflow_policy() {
    let err = encode(&PrimitiveValue::Float(1.0), PrimitiveKind::Float32, Some(OverflowPolicy::Saturating));
    assert!(err.is_err());
  }

  proptest! {
    #[test]
    fn prop_uint32_round_trips(v in 0u32..=u32::MAX) {
      let bytes = encode(&PrimitiveValue::UInt(v as u128), PrimitiveKind::Uint32, None).unwrap();
      let decoded = decode(&bytes, PrimitiveKind::Uint32).unwrap();
      prop_assert_eq!(decoded, PrimitiveValue::UInt(v as u128));
    }

    #[test]
    fn prop_int64_round_trips(v in any::<i64>()) {
      let bytes = encode(&PrimitiveValue::Int(v as i128), PrimitiveKind::Int64, None).unwrap();
      let decoded = decode(&bytes, PrimitiveKind::Int64).unwrap();
      prop_assert_eq!(decoded, PrimitiveValue::Int(v as i128));
    }
  }
}
