//! Dynamic arithmetic over the boxed numeric tower
//!
//! Operands are promoted with [`kestrel_types::promote`], the same rule the
//! checker uses, so an expression computes the same value on either
//! emission path. Integer division stays integral.

use crate::decimal::{low_bits, BigDecimal};
use crate::value::Value;
use crate::{RuntimeError, RuntimeResult};
use kestrel_types::successor::{next_char, next_string, previous_char, previous_string};
use kestrel_types::{promote, NumericKind};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use std::cmp::Ordering;

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl ArithOp {
    /// Operator method name
    pub fn method_name(self) -> &'static str {
        match self {
            ArithOp::Add => "plus",
            ArithOp::Sub => "minus",
            ArithOp::Mul => "multiply",
            ArithOp::Div => "div",
            ArithOp::Rem => "mod",
        }
    }
}

/// Numeric kind of a value, `None` for non-numbers
pub fn kind_of(value: &Value) -> Option<NumericKind> {
    Some(match value {
        Value::Byte(_) => NumericKind::Byte,
        Value::Short(_) => NumericKind::Short,
        Value::Char(_) => NumericKind::Char,
        Value::Int(_) => NumericKind::Int,
        Value::Long(_) => NumericKind::Long,
        Value::Float(_) => NumericKind::Float,
        Value::Double(_) => NumericKind::Double,
        Value::BigInteger(_) => NumericKind::BigInteger,
        Value::BigDecimal(_) => NumericKind::BigDecimal,
        _ => return None,
    })
}

/// Integral value of an integral number
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Byte(v) => Some(i64::from(*v)),
        Value::Short(v) => Some(i64::from(*v)),
        Value::Char(c) => Some(i64::from(*c as u32)),
        Value::Int(v) => Some(i64::from(*v)),
        Value::Long(v) => Some(*v),
        Value::BigInteger(v) => v.to_i64(),
        _ => None,
    }
}

/// Any number narrowed to 64 bits the way a primitive conversion does
pub fn as_i64_wrapping(value: &Value) -> i64 {
    match value {
        Value::Float(v) => *v as i64,
        Value::Double(v) => *v as i64,
        Value::BigInteger(v) => low_bits(v),
        Value::BigDecimal(v) => v.to_i64_wrapping(),
        other => as_i64(other).unwrap_or(0),
    }
}

/// Value as `i64` when it is a whole number in range
pub fn as_exact_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Float(v) => exact_float(f64::from(*v)),
        Value::Double(v) => exact_float(*v),
        Value::BigDecimal(v) if v.is_integral() => v.to_bigint().to_i64(),
        Value::BigDecimal(_) => None,
        other => as_i64(other),
    }
}

fn exact_float(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.2e18 {
        Some(v as i64)
    } else {
        None
    }
}

/// Nearest `f64`
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(v) => Some(f64::from(*v)),
        Value::Double(v) => Some(*v),
        Value::BigInteger(v) => v.to_f64(),
        Value::BigDecimal(v) => Some(v.to_f64()),
        other => as_i64(other).map(|v| v as f64),
    }
}

/// Integer part as a `BigInt`
pub fn as_bigint(value: &Value) -> Option<BigInt> {
    match value {
        Value::BigInteger(v) => Some((**v).clone()),
        Value::BigDecimal(v) => Some(v.to_bigint()),
        Value::Float(v) => BigInt::from_f64(f64::from(*v).trunc()),
        Value::Double(v) => BigInt::from_f64(v.trunc()),
        other => as_i64(other).map(BigInt::from),
    }
}

/// Exact decimal value; `None` for NaN and infinities
pub fn as_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::BigDecimal(v) => Some((**v).clone()),
        Value::BigInteger(v) => Some(BigDecimal::from_bigint((**v).clone())),
        Value::Float(v) => BigDecimal::from_f64(f64::from(*v)),
        Value::Double(v) => BigDecimal::from_f64(*v),
        other => as_i64(other).map(BigDecimal::from_i64),
    }
}

fn not_a_number(value: &Value, kind: NumericKind) -> RuntimeError {
    value.cast_error(kind.name())
}

/// Convert a number to the boxed form of `kind`
pub fn convert(value: &Value, kind: NumericKind) -> RuntimeResult<Value> {
    if kind_of(value).is_none() {
        return Err(not_a_number(value, kind));
    }
    let whole = || as_i64_wrapping(value);
    let real = || as_f64(value).unwrap_or(f64::NAN);
    Ok(match kind {
        NumericKind::Byte => Value::Byte(whole() as i8),
        NumericKind::Short => Value::Short(whole() as i16),
        NumericKind::Char => Value::Char(char::from_u32(whole() as u32).unwrap_or('\u{FFFD}')),
        NumericKind::Int => Value::Int(whole() as i32),
        NumericKind::Long => Value::Long(whole()),
        NumericKind::Float => Value::Float(real() as f32),
        NumericKind::Double => Value::Double(real()),
        NumericKind::BigInteger => {
            Value::big_integer(as_bigint(value).ok_or_else(|| not_a_number(value, kind))?)
        }
        NumericKind::BigDecimal => {
            Value::big_decimal(as_decimal(value).ok_or_else(|| not_a_number(value, kind))?)
        }
    })
}

fn division_by_zero() -> RuntimeError {
    RuntimeError::Arithmetic("Division by zero".to_string())
}

fn operand_kinds(op: &str, a: &Value, b: &Value) -> RuntimeResult<NumericKind> {
    match (kind_of(a), kind_of(b)) {
        (Some(x), Some(y)) => Ok(promote(x, y)),
        _ => Err(RuntimeError::NoSuchMethod {
            receiver: a.type_name(),
            method: op.to_string(),
            args: b.type_name(),
        }),
    }
}

/// `a op b` after promotion
pub fn arithmetic(op: ArithOp, a: &Value, b: &Value) -> RuntimeResult<Value> {
    let kind = operand_kinds(op.method_name(), a, b)?;
    match kind {
        NumericKind::Long => {
            let (x, y) = (as_i64_wrapping(a), as_i64_wrapping(b));
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y == 0 {
                return Err(division_by_zero());
            }
            Ok(Value::Long(match op {
                ArithOp::Add => x.wrapping_add(y),
                ArithOp::Sub => x.wrapping_sub(y),
                ArithOp::Mul => x.wrapping_mul(y),
                ArithOp::Div => x.wrapping_div(y),
                ArithOp::Rem => x.wrapping_rem(y),
            }))
        }
        NumericKind::Float => {
            let (x, y) = (real(a) as f32, real(b) as f32);
            Ok(Value::Float(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
            }))
        }
        NumericKind::Double => {
            let (x, y) = (real(a), real(b));
            Ok(Value::Double(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
            }))
        }
        NumericKind::BigInteger => {
            let (x, y) = (big(a, kind)?, big(b, kind)?);
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y.is_zero() {
                return Err(division_by_zero());
            }
            Ok(Value::big_integer(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
            }))
        }
        NumericKind::BigDecimal => {
            let (x, y) = (decimal(a, kind)?, decimal(b, kind)?);
            let result = match op {
                ArithOp::Add => x.add(&y),
                ArithOp::Sub => x.sub(&y),
                ArithOp::Mul => x.mul(&y),
                ArithOp::Div => x.div(&y).ok_or_else(division_by_zero)?,
                ArithOp::Rem => x.rem(&y).ok_or_else(division_by_zero)?,
            };
            Ok(Value::big_decimal(result))
        }
        // byte, short, char and int all compute in 32 bits
        _ => {
            let (x, y) = (as_i64_wrapping(a) as i32, as_i64_wrapping(b) as i32);
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y == 0 {
                return Err(division_by_zero());
            }
            Ok(Value::Int(match op {
                ArithOp::Add => x.wrapping_add(y),
                ArithOp::Sub => x.wrapping_sub(y),
                ArithOp::Mul => x.wrapping_mul(y),
                ArithOp::Div => x.wrapping_div(y),
                ArithOp::Rem => x.wrapping_rem(y),
            }))
        }
    }
}

fn real(value: &Value) -> f64 {
    as_f64(value).unwrap_or(f64::NAN)
}

fn big(value: &Value, kind: NumericKind) -> RuntimeResult<BigInt> {
    as_bigint(value).ok_or_else(|| not_a_number(value, kind))
}

fn decimal(value: &Value, kind: NumericKind) -> RuntimeResult<BigDecimal> {
    as_decimal(value).ok_or_else(|| not_a_number(value, kind))
}

/// Unary minus after unary promotion
pub fn negate(value: &Value) -> RuntimeResult<Value> {
    let kind = kind_of(value)
        .map(NumericKind::unary_promote)
        .ok_or_else(|| RuntimeError::NoSuchMethod {
            receiver: value.type_name(),
            method: "negative".to_string(),
            args: String::new(),
        })?;
    Ok(match kind {
        NumericKind::Long => Value::Long(as_i64_wrapping(value).wrapping_neg()),
        NumericKind::Float => Value::Float(-(real(value) as f32)),
        NumericKind::Double => Value::Double(-real(value)),
        NumericKind::BigInteger => Value::big_integer(-big(value, kind)?),
        NumericKind::BigDecimal => Value::big_decimal(decimal(value, kind)?.neg()),
        _ => Value::Int((as_i64_wrapping(value) as i32).wrapping_neg()),
    })
}

/// Numeric ordering, `None` when either side is not a number
///
/// NaN sorts above every other value, as in a total order.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let kind = promote(kind_of(a)?, kind_of(b)?);
    Some(match kind {
        NumericKind::Float | NumericKind::Double => {
            let (x, y) = (real(a), real(b));
            x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
        }
        NumericKind::BigInteger => as_bigint(a)?.cmp(&as_bigint(b)?),
        NumericKind::BigDecimal => match (as_decimal(a), as_decimal(b)) {
            (Some(x), Some(y)) => x.numeric_cmp(&y),
            _ => real(a).total_cmp(&real(b)),
        },
        _ => as_i64_wrapping(a).cmp(&as_i64_wrapping(b)),
    })
}

/// Successor used by ranges and `next()`
pub fn next(value: &Value) -> RuntimeResult<Value> {
    step(value, true)
}

/// Predecessor used by ranges and `previous()`
pub fn previous(value: &Value) -> RuntimeResult<Value> {
    step(value, false)
}

fn step(value: &Value, forward: bool) -> RuntimeResult<Value> {
    let delta = if forward { 1 } else { -1 };
    Ok(match value {
        Value::Char(c) => Value::Char(if forward { next_char(*c) } else { previous_char(*c) }),
        Value::Str(s) if forward => Value::from(next_string(s)),
        Value::Str(s) => Value::from(previous_string(s)?),
        Value::Byte(v) => Value::Byte(v.wrapping_add(delta as i8)),
        Value::Short(v) => Value::Short(v.wrapping_add(delta as i16)),
        Value::Int(v) => Value::Int(v.wrapping_add(delta)),
        Value::Long(v) => Value::Long(v.wrapping_add(i64::from(delta))),
        Value::Float(v) => Value::Float(v + delta as f32),
        Value::Double(v) => Value::Double(v + f64::from(delta)),
        Value::BigInteger(v) => Value::big_integer(&**v + delta),
        Value::BigDecimal(v) => Value::big_decimal(v.add(&BigDecimal::from_i64(i64::from(delta)))),
        other => {
            return Err(RuntimeError::NoSuchMethod {
                receiver: other.type_name(),
                method: if forward { "next" } else { "previous" }.to_string(),
                args: String::new(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> Value {
        Value::big_decimal(BigDecimal::parse(text).unwrap())
    }

    #[test]
    fn test_promotion_drives_result_kind() {
        assert!(matches!(arithmetic(ArithOp::Add, &Value::Int(1), &Value::Long(2)).unwrap(), Value::Long(3)));
        assert!(matches!(arithmetic(ArithOp::Mul, &Value::Byte(3), &Value::Short(4)).unwrap(), Value::Int(12)));
        assert!(matches!(arithmetic(ArithOp::Add, &Value::Char('a'), &Value::Int(1)).unwrap(), Value::Int(98)));
        assert!(matches!(
            arithmetic(ArithOp::Sub, &Value::Float(1.5), &Value::Double(0.5)).unwrap(),
            Value::Double(v) if v == 1.0
        ));
        let sum = arithmetic(ArithOp::Add, &Value::big_integer(BigInt::from(1)), &Value::Double(0.5)).unwrap();
        assert_eq!(sum.class_name(), "BigDecimal");
        assert_eq!(sum.to_string(), "1.5");
    }

    #[test]
    fn test_integer_division_and_remainder() {
        assert!(matches!(arithmetic(ArithOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3)));
        assert!(matches!(arithmetic(ArithOp::Rem, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-1)));
        assert!(matches!(
            arithmetic(ArithOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(RuntimeError::Arithmetic(_))
        ));
        assert!(matches!(
            arithmetic(ArithOp::Div, &Value::Double(1.0), &Value::Int(0)).unwrap(),
            Value::Double(v) if v.is_infinite()
        ));
        assert_eq!(arithmetic(ArithOp::Div, &dec("1"), &Value::Int(4)).unwrap().to_string(), "0.25");
    }

    #[test]
    fn test_overflow_wraps() {
        assert!(matches!(
            arithmetic(ArithOp::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap(),
            Value::Int(i32::MIN)
        ));
        assert!(matches!(negate(&Value::Int(i32::MIN)).unwrap(), Value::Int(i32::MIN)));
        assert!(matches!(negate(&Value::Byte(5)).unwrap(), Value::Int(-5)));
    }

    #[test]
    fn test_non_numbers_are_rejected() {
        assert!(matches!(
            arithmetic(ArithOp::Add, &Value::string("a"), &Value::Int(1)),
            Err(RuntimeError::NoSuchMethod { .. })
        ));
        assert!(compare(&Value::string("a"), &Value::Int(1)).is_none());
    }

    #[test]
    fn test_comparison_across_kinds() {
        assert_eq!(compare(&Value::Int(2), &dec("2.00")), Some(Ordering::Equal));
        assert_eq!(compare(&Value::Long(3), &Value::Float(2.5)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::Double(f64::NAN), &Value::Int(1)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::Char('7'), &Value::Int(55)), Some(Ordering::Equal));
    }

    #[test]
    fn test_conversion() {
        assert!(matches!(convert(&Value::Double(3.9), NumericKind::Int).unwrap(), Value::Int(3)));
        assert!(matches!(convert(&Value::Int(65), NumericKind::Char).unwrap(), Value::Char('A')));
        assert_eq!(convert(&Value::Int(5), NumericKind::BigDecimal).unwrap().to_string(), "5");
        assert_eq!(convert(&dec("9.75"), NumericKind::BigInteger).unwrap().to_string(), "9");
        assert!(convert(&Value::Double(f64::NAN), NumericKind::BigDecimal).is_err());
        assert!(convert(&Value::Null, NumericKind::Int).is_err());
    }

    #[test]
    fn test_successors() {
        assert!(matches!(next(&Value::Int(1)).unwrap(), Value::Int(2)));
        assert!(matches!(previous(&Value::Char('b')).unwrap(), Value::Char('a')));
        assert_eq!(next(&Value::string("az")).unwrap().to_string(), "a{");
        assert_eq!(next(&dec("1.5")).unwrap().to_string(), "2.5");
        assert!(previous(&Value::string("")).is_err());
        assert!(next(&Value::Boolean(true)).is_err());
    }
}
