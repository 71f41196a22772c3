//! Arbitrary-precision decimals
//!
//! A value is `unscaled * 10^-scale`. Equality is structural, so `1.0` and
//! `1.00` differ; [`BigDecimal::numeric_cmp`] compares by value.

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;

/// Fractional digits kept by a division that does not terminate
pub const DIVISION_SCALE: u32 = 10;

/// Arbitrary-precision decimal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal {
    unscaled: BigInt,
    scale: u32,
}

fn ten_pow(exponent: u32) -> BigInt {
    BigInt::from(10u32).pow(exponent)
}

impl BigDecimal {
    /// `unscaled * 10^-scale`
    pub fn new(unscaled: BigInt, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    /// Integral decimal with scale 0
    pub fn from_bigint(value: BigInt) -> Self {
        Self::new(value, 0)
    }

    /// Integral decimal with scale 0
    pub fn from_i64(value: i64) -> Self {
        Self::new(BigInt::from(value), 0)
    }

    /// Decimal holding the shortest representation of `value`
    ///
    /// `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::parse(&value.to_string())
    }

    /// Parse plain or exponent notation: `-12.50`, `1e3`, `2.5E-2`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(at) => (&text[..at], text[at + 1..].parse::<i64>().ok()?),
            None => (text, 0),
        };
        let (negative, digits) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }
        let joined = format!("{}{}", whole, fraction);
        let mut unscaled: BigInt = if joined.is_empty() {
            BigInt::zero()
        } else {
            joined.parse().ok()?
        };
        if negative {
            unscaled = -unscaled;
        }
        let scale = fraction.len() as i64 - exponent;
        if scale < 0 {
            let shift = u32::try_from(-scale).ok()?;
            Some(Self::new(unscaled * ten_pow(shift), 0))
        } else {
            Some(Self::new(unscaled, u32::try_from(scale).ok()?))
        }
    }

    /// Unscaled digits
    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    /// Digits after the decimal point
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Whether the value is zero at any scale
    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }

    fn rescaled(&self, scale: u32) -> BigInt {
        if scale <= self.scale {
            self.unscaled.clone()
        } else {
            &self.unscaled * ten_pow(scale - self.scale)
        }
    }

    fn aligned(&self, other: &Self) -> (BigInt, BigInt, u32) {
        let scale = self.scale.max(other.scale);
        (self.rescaled(scale), other.rescaled(scale), scale)
    }

    /// Sum at the larger scale
    pub fn add(&self, other: &Self) -> Self {
        let (a, b, scale) = self.aligned(other);
        Self::new(a + b, scale)
    }

    /// Difference at the larger scale
    pub fn sub(&self, other: &Self) -> Self {
        let (a, b, scale) = self.aligned(other);
        Self::new(a - b, scale)
    }

    /// Product; scales add
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(&self.unscaled * &other.unscaled, self.scale + other.scale)
    }

    /// Quotient rounded half-up to [`DIVISION_SCALE`] digits, trailing
    /// zeros stripped; `None` when dividing by zero
    pub fn div(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        // a/10^sa / (b/10^sb) = a * 10^(sb + D - sa) / b at scale D
        let shift = i64::from(other.scale) + i64::from(DIVISION_SCALE) - i64::from(self.scale);
        let (numerator, denominator) = if shift >= 0 {
            (&self.unscaled * ten_pow(shift as u32), other.unscaled.clone())
        } else {
            (self.unscaled.clone(), &other.unscaled * ten_pow((-shift) as u32))
        };
        let quotient = &numerator / &denominator;
        let remainder = &numerator % &denominator;
        let doubled = remainder.abs() * 2u32;
        let quotient = if doubled >= denominator.abs() {
            if numerator.sign() == denominator.sign() {
                quotient + 1u32
            } else {
                quotient - 1u32
            }
        } else {
            quotient
        };
        Some(Self::new(quotient, DIVISION_SCALE).strip_trailing_zeros())
    }

    /// Remainder with the sign of the dividend; `None` when dividing by zero
    pub fn rem(&self, other: &Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let (a, b, scale) = self.aligned(other);
        Some(Self::new(a % b, scale))
    }

    /// Negation
    pub fn neg(&self) -> Self {
        Self::new(-&self.unscaled, self.scale)
    }

    /// Compare by numeric value, ignoring scale
    pub fn numeric_cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.aligned(other);
        a.cmp(&b)
    }

    /// Same value with the smallest non-negative scale
    pub fn strip_trailing_zeros(&self) -> Self {
        if self.unscaled.is_zero() {
            return Self::new(BigInt::zero(), 0);
        }
        let ten = BigInt::from(10u32);
        let mut unscaled = self.unscaled.clone();
        let mut scale = self.scale;
        while scale > 0 && (&unscaled % &ten).is_zero() {
            unscaled /= &ten;
            scale -= 1;
        }
        Self::new(unscaled, scale)
    }

    /// Integer part, truncated toward zero
    pub fn to_bigint(&self) -> BigInt {
        if self.scale == 0 {
            self.unscaled.clone()
        } else {
            &self.unscaled / ten_pow(self.scale)
        }
    }

    /// Whether the value has no fractional part
    pub fn is_integral(&self) -> bool {
        self.scale == 0 || (&self.unscaled % ten_pow(self.scale)).is_zero()
    }

    /// Nearest `f64`
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or_else(|_| {
            self.unscaled.to_f64().unwrap_or(f64::NAN) / 10f64.powi(self.scale as i32)
        })
    }

    /// Low 64 bits of the integer part, two's complement
    pub fn to_i64_wrapping(&self) -> i64 {
        low_bits(&self.to_bigint())
    }
}

/// Low 64 bits of `value` in two's complement
pub fn low_bits(value: &BigInt) -> i64 {
    if let Some(small) = value.to_i64() {
        return small;
    }
    let magnitude = value.magnitude().to_u64_digits().first().copied().unwrap_or(0);
    match value.sign() {
        Sign::Minus => magnitude.wrapping_neg() as i64,
        _ => magnitude as i64,
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.magnitude().to_string();
        let sign = if self.unscaled.is_negative() { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, whole, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> BigDecimal {
        BigDecimal::parse(text).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("12.50").to_string(), "12.50");
        assert_eq!(dec("-0.05").to_string(), "-0.05");
        assert_eq!(dec("1e3").to_string(), "1000");
        assert_eq!(dec("2.5E-2").to_string(), "0.025");
        assert_eq!(dec(".5").to_string(), "0.5");
        assert!(BigDecimal::parse("1.2.3").is_none());
        assert!(BigDecimal::parse("abc").is_none());
        assert!(BigDecimal::parse("").is_none());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(dec("1.5").add(&dec("2.25")).to_string(), "3.75");
        assert_eq!(dec("1.5").sub(&dec("2.25")).to_string(), "-0.75");
        assert_eq!(dec("1.5").mul(&dec("2.0")).to_string(), "3.00");
        assert_eq!(dec("7.5").rem(&dec("2")).unwrap().to_string(), "1.5");
        assert_eq!(dec("-7").rem(&dec("2")).unwrap().to_string(), "-1");
    }

    #[test]
    fn test_division_rounds_and_strips() {
        assert_eq!(dec("1").div(&dec("3")).unwrap().to_string(), "0.3333333333");
        assert_eq!(dec("2").div(&dec("3")).unwrap().to_string(), "0.6666666667");
        assert_eq!(dec("-2").div(&dec("3")).unwrap().to_string(), "-0.6666666667");
        assert_eq!(dec("6.0").div(&dec("2")).unwrap().to_string(), "3");
        assert_eq!(dec("1").div(&dec("8")).unwrap().to_string(), "0.125");
        assert!(dec("1").div(&dec("0.00")).is_none());
    }

    #[test]
    fn test_numeric_comparison_ignores_scale() {
        assert_ne!(dec("1.0"), dec("1.00"));
        assert_eq!(dec("1.0").numeric_cmp(&dec("1.00")), Ordering::Equal);
        assert_eq!(dec("2.1").numeric_cmp(&dec("10")), Ordering::Less);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(dec("9.99").to_bigint(), BigInt::from(9));
        assert_eq!(dec("-9.99").to_bigint(), BigInt::from(-9));
        assert!(dec("3.000").is_integral());
        assert!(!dec("3.001").is_integral());
        assert_eq!(dec("0.1").to_f64(), 0.1);
        assert_eq!(BigDecimal::from_f64(2.5).unwrap().to_string(), "2.5");
        assert!(BigDecimal::from_f64(f64::NAN).is_none());

        let big: BigInt = "18446744073709551617".parse().unwrap();
        assert_eq!(low_bits(&big), 1);
        assert_eq!(low_bits(&-big), -1);
    }
}
