use super::array::{ArrayKind, ArrayTypeDef};
use super::TypeDef;
use crate::error::{Error, Result};
use crate::primitive::PrimitiveKind;

/// `bigint`: an arbitrary-precision signed integer, stored via the array
/// mechanism as a `uint8[]` of sign-and-magnitude bytes (spec.md §9
/// "Arbitrary-precision integers"; confirmed against
/// `original_source/tests/test_bigint.py::test_bigint_is_array_subclass`).
#[derive(Debug)]
pub struct BigIntTypeDef {
  pub name: String,
  pub array: ArrayTypeDef,
}

impl BigIntTypeDef {
  pub fn new() -> Self {
    BigIntTypeDef {
      name: "bigint".to_string(),
      array: ArrayTypeDef::new("bigint", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Plain),
    }
  }
}

/// `biguint`: like `bigint` but rejects negative values at encode time.
#[derive(Debug)]
pub struct BigUIntTypeDef {
  pub name: String,
  pub array: ArrayTypeDef,
}

impl BigUIntTypeDef {
  pub fn new() -> Self {
    BigUIntTypeDef {
      name: "biguint".to_string(),
      array: ArrayTypeDef::new("biguint", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Plain),
    }
  }
}

/// Big-endian sign-and-magnitude representation: one leading sign byte (0
/// positive, 1 negative) followed by the minimal big-endian magnitude. The
/// zero value encodes as `[0x00, 0x00]` (sign byte, one magnitude byte).
pub fn encode_bigint(value: &num_bigint::BigInt) -> Vec<u8> {
  use num_bigint::Sign;
  let (sign, magnitude) = value.to_bytes_be();
  let sign_byte = if sign == Sign::Minus { 1u8 } else { 0u8 };
  let mut out = Vec::with_capacity(1 + magnitude.len().max(1));
  out.push(sign_byte);
  if magnitude.is_empty() {
    out.push(0);
  } else {
    out.extend_from_slice(&magnitude);
  }
  out
}

pub fn decode_bigint(bytes: &[u8]) -> Result<num_bigint::BigInt> {
  use num_bigint::Sign;
  if bytes.is_empty() {
    return Err(Error::Codec("empty bigint encoding".to_string()));
  }
  let sign = match bytes[0] {
    0 => Sign::Plus,
    1 => Sign::Minus,
    other => return Err(Error::Codec(format!("invalid bigint sign byte: {}", other))),
  };
  let magnitude = &bytes[1..];
  let value = num_bigint::BigInt::from_bytes_be(sign, magnitude);
  Ok(value)
}

/// Encodes a `biguint`, rejecting negative inputs with `OverflowError`.
pub fn encode_biguint(value: &num_bigint::BigInt) -> Result<Vec<u8>> {
  if value.sign() == num_bigint::Sign::Minus {
    return Err(Error::OverflowError {
      type_name: "biguint".to_string(),
      detail: "negative value".to_string(),
    });
  }
  Ok(encode_bigint(value))
}

pub fn decode_biguint(bytes: &[u8]) -> Result<num_bigint::BigInt> {
  let value = decode_bigint(bytes)?;
  if value.sign() == num_bigint::Sign::Minus {
    return Err(Error::Codec("biguint encoding carried a negative sign byte".to_string()));
  }
  Ok(value)
}
