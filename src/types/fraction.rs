use crate::error::{Error, Result};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Exact rational type: `(numerator, denominator)`, each a `bigint`,
/// auto-normalized by their GCD with the sign carried on the numerator.
/// Stored as two consecutive array headers (16 bytes total) per spec.md
/// §3.1.
#[derive(Debug)]
pub struct FractionTypeDef {
  pub name: String,
}

impl FractionTypeDef {
  pub fn new() -> Self {
    FractionTypeDef { name: "fraction".to_string() }
  }
}

/// A normalized, runtime fraction value. Always constructed through
/// [`Fraction::new`], which rejects a zero denominator and reduces by GCD.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fraction {
  pub numerator: BigInt,
  pub denominator: BigInt,
}

impl Fraction {
  pub fn new(numerator: BigInt, denominator: BigInt) -> Result<Self> {
    if denominator.is_zero() {
      return Err(Error::InvalidFraction("zero denominator".to_string()));
    }

    let (mut numerator, mut denominator) = (numerator, denominator);
    if denominator.is_negative() {
      numerator = -numerator;
      denominator = -denominator;
    }

    let g = gcd(numerator.abs(), denominator.clone());
    if !g.is_zero() && g != BigInt::from(1) {
      numerator /= &g;
      denominator /= &g;
    }

    Ok(Fraction { numerator, denominator })
  }
}

fn gcd(mut a: BigInt, mut b: BigInt) -> BigInt {
  while !b.is_zero() {
    let r = &a % &b;
    a = b;
    b = r;
  }
  a
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_by_gcd() {
    let f = Fraction::new(BigInt::from(6), BigInt::from(8)).unwrap();
    assert_eq!(f.numerator, BigInt::from(3));
    assert_eq!(f.denominator, BigInt::from(4));
  }

  #[test]
  fn negative_denominator_moves_sign_to_numerator() {
    let f = Fraction::new(BigInt::from(1), BigInt::from(-2)).unwrap();
    assert_eq!(f.numerator, BigInt::from(-1));
    assert_eq!(f.denominator, BigInt::from(2));
  }

  #[test]
  fn zero_denominator_rejected() {
    assert!(Fraction::new(BigInt::from(1), BigInt::from(0)).is_err());
  }
}
