//! Purpose: Exact and complex numeric kinds carried by `Value`.
//! Exports: `Complex`, `Rational`, `decimal_bytes` (serde adapter for `rust_decimal::Decimal`).
//! Role: Arithmetic needed by evaluation (negation, complex combination, conversions).
//! Invariants: `Rational` is always reduced with a strictly positive denominator.
//! Invariants: Float components compare and hash by bit pattern.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::eval::EvalError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }
}

impl PartialEq for Complex {
    fn eq(&self, other: &Self) -> bool {
        self.re.to_bits() == other.re.to_bits() && self.im.to_bits() == other.im.to_bits()
    }
}

impl Eq for Complex {}

impl Hash for Complex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.re.to_bits().hash(state);
        self.im.to_bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i64, i64)", into = "(i64, i64)")]
pub struct Rational {
    numer: i64,
    denom: i64,
}

impl Rational {
    pub fn new(numer: i64, denom: i64) -> Result<Self, EvalError> {
        if denom == 0 {
            return Err(EvalError::new(format!(
                "division by zero: Fraction({numer}, 0)"
            )));
        }
        Self::reduce(i128::from(numer), i128::from(denom))
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            numer: value,
            denom: 1,
        }
    }

    pub fn numer(&self) -> i64 {
        self.numer
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }

    fn reduce(numer: i128, denom: i128) -> Result<Self, EvalError> {
        let divisor = gcd(numer.unsigned_abs(), denom.unsigned_abs()) as i128;
        let sign = if denom < 0 { -1 } else { 1 };
        let numer = sign * numer / divisor;
        let denom = sign * denom / divisor;
        match (i64::try_from(numer), i64::try_from(denom)) {
            (Ok(numer), Ok(denom)) => Ok(Self { numer, denom }),
            _ => Err(EvalError::new("fraction does not fit in 64-bit integers")),
        }
    }

    /// Exact binary expansion of a finite float.
    pub fn from_float(value: f64) -> Result<Self, EvalError> {
        if !value.is_finite() {
            return Err(EvalError::new(format!(
                "cannot convert {value} to a fraction"
            )));
        }
        if value == 0.0 {
            return Ok(Self::from_integer(0));
        }
        let bits = value.to_bits();
        let sign: i128 = if bits >> 63 == 0 { 1 } else { -1 };
        let exponent_bits = ((bits >> 52) & 0x7ff) as i32;
        let fraction = (bits & ((1u64 << 52) - 1)) as i128;
        let (mut mantissa, mut exponent) = if exponent_bits == 0 {
            (fraction, -1074)
        } else {
            (fraction | (1i128 << 52), exponent_bits - 1075)
        };
        while exponent < 0 && mantissa % 2 == 0 {
            mantissa /= 2;
            exponent += 1;
        }
        if exponent >= 0 {
            if exponent > 62 {
                return Err(EvalError::new("fraction does not fit in 64-bit integers"));
            }
            return Self::reduce(sign * (mantissa << exponent), 1);
        }
        if exponent < -62 {
            return Err(EvalError::new("fraction does not fit in 64-bit integers"));
        }
        Self::reduce(sign * mantissa, 1i128 << (-exponent))
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, EvalError> {
        let mut denom: i128 = 1;
        for _ in 0..value.scale() {
            denom *= 10;
        }
        Self::reduce(value.mantissa(), denom)
    }

    pub fn div(self, other: Self) -> Result<Self, EvalError> {
        if other.numer == 0 {
            return Err(EvalError::new(format!("division by zero: Fraction({self}, 0)")));
        }
        Self::reduce(
            i128::from(self.numer) * i128::from(other.denom),
            i128::from(self.denom) * i128::from(other.numer),
        )
    }

    pub fn checked_neg(self) -> Option<Self> {
        Some(Self {
            numer: self.numer.checked_neg()?,
            denom: self.denom,
        })
    }

    pub fn to_f64(self) -> f64 {
        self.numer as f64 / self.denom as f64
    }
}

impl FromStr for Rational {
    type Err = EvalError;

    /// Accepts `n`, `n/d`, decimal and scientific notation.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let invalid = || EvalError::new(format!("invalid literal for Fraction: '{text}'"));
        if let Some((numer, denom)) = text.split_once('/') {
            let numer = numer.trim().parse::<i64>().map_err(|_| invalid())?;
            let denom = denom.trim().parse::<i64>().map_err(|_| invalid())?;
            return Self::new(numer, denom);
        }
        let decimal = if text.contains(['e', 'E']) {
            Decimal::from_scientific(text).map_err(|_| invalid())?
        } else {
            Decimal::from_str(text).map_err(|_| invalid())?
        };
        Self::from_decimal(decimal)
    }
}

impl TryFrom<(i64, i64)> for Rational {
    type Error = EvalError;

    fn try_from((numer, denom): (i64, i64)) -> Result<Self, Self::Error> {
        Self::new(numer, denom)
    }
}

impl From<Rational> for (i64, i64) {
    fn from(value: Rational) -> Self {
        (value.numer, value.denom)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// Serializes a `Decimal` through its stable 16-byte representation.
pub mod decimal_bytes {
    use rust_decimal::Decimal;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const MAX_SCALE: u32 = 28;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        Decimal::serialize(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let bytes = <[u8; 16]>::deserialize(deserializer)?;
        let scale = u32::from(bytes[2]);
        if scale > MAX_SCALE {
            return Err(D::Error::custom(format!("decimal scale {scale} out of range")));
        }
        Ok(Decimal::deserialize(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::{Complex, Rational};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn rational_is_reduced() {
        let value = Rational::new(-44, -14).expect("rational");
        assert_eq!((value.numer(), value.denom()), (22, 7));
        let value = Rational::new(3, -6).expect("rational");
        assert_eq!((value.numer(), value.denom()), (-1, 2));
    }

    #[test]
    fn rational_zero_denominator_fails() {
        let err = Rational::new(22, 0).expect_err("zero denominator");
        assert_eq!(err.to_string(), "division by zero: Fraction(22, 0)");
    }

    #[test]
    fn rational_parses_text_forms() {
        assert_eq!(Rational::from_str("22/7").expect("slash"), Rational::new(22, 7).expect("r"));
        assert_eq!(Rational::from_str(" 1.5 ").expect("decimal"), Rational::new(3, 2).expect("r"));
        assert_eq!(Rational::from_str("1e-3").expect("sci"), Rational::new(1, 1000).expect("r"));
        assert!(Rational::from_str("one half").is_err());
    }

    #[test]
    fn rational_from_float_is_exact() {
        assert_eq!(Rational::from_float(0.5).expect("half"), Rational::new(1, 2).expect("r"));
        assert_eq!(Rational::from_float(-3.0).expect("int"), Rational::from_integer(-3));
        let tenth = Rational::from_float(0.1).expect("tenth");
        assert_eq!(tenth.denom(), 1 << 55);
        assert!(Rational::from_float(f64::NAN).is_err());
    }

    #[test]
    fn rational_from_decimal() {
        let decimal = Decimal::from_str("1.50").expect("decimal");
        assert_eq!(Rational::from_decimal(decimal).expect("r"), Rational::new(3, 2).expect("r"));
    }

    #[test]
    fn complex_equality_uses_bits() {
        assert_eq!(Complex::new(1.0, 2.0), Complex::new(1.0, 2.0));
        assert_ne!(Complex::new(0.0, 1.0), Complex::new(-0.0, 1.0));
        assert_eq!(Complex::new(f64::NAN, 0.0), Complex::new(f64::NAN, 0.0));
        assert_eq!(
            Complex::new(3.2, 0.0).sub(Complex::new(0.0, 6.5)),
            Complex::new(3.2, -6.5)
        );
    }
}
