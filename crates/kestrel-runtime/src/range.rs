//! Ranges over comparable values
//!
//! A range keeps `from <= to` and records whether it was written backwards.
//! Elements are produced by repeated `next()` (or `previous()` for reverse
//! ranges) until the far bound is passed or the successor wraps around.

use crate::numeric;
use crate::value::{exhausted, single_char, Cursor, Value};
use crate::{RuntimeError, RuntimeResult};
use kestrel_types::successor::check_string_range;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;

/// Range between two comparable bounds
#[derive(Debug, Clone)]
pub struct ObjectRange {
    from: Value,
    to: Value,
    reverse: bool,
    empty: bool,
}

fn same_class(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn widen(value: Value) -> Value {
    match value {
        Value::Short(v) => Value::Int(i32::from(v)),
        Value::Float(v) => Value::Double(f64::from(v)),
        other => other,
    }
}

/// Characters and one-character strings become their code point
fn normalise_string_type(value: Value) -> Value {
    match &value {
        Value::Char(c) => Value::Int(*c as i32),
        Value::Str(s) => match single_char(s) {
            Some(c) => Value::Int(c as i32),
            None => value,
        },
        _ => value,
    }
}

fn incompatible(from: &Value, to: &Value) -> RuntimeError {
    RuntimeError::IllegalArgument(format!(
        "Unable to create range due to incompatible types: {}..{} (possible missing brackets around range?)",
        from.class_name(),
        to.class_name()
    ))
}

impl ObjectRange {
    /// Range from `from` to `to`, reversed when `from > to`
    pub fn new(from: Value, to: Value) -> RuntimeResult<Self> {
        Self::build(from, to, None)
    }

    /// Range over bounds already in order, with an explicit direction
    pub fn with_reverse(smaller: Value, larger: Value, reverse: bool) -> RuntimeResult<Self> {
        Self::build(smaller, larger, Some(reverse))
    }

    /// Range excluding `to`: `from..<to`
    ///
    /// Equal bounds give an empty range.
    pub fn exclusive(from: Value, to: Value) -> RuntimeResult<Self> {
        check_present(&from, &to)?;
        match from.compare(&to).map_err(|_| incompatible(&from, &to))? {
            Ordering::Less => Self::new(from, numeric::previous(&to)?),
            Ordering::Greater => Self::new(from, numeric::next(&to)?),
            Ordering::Equal => Ok(Self {
                from: from.clone(),
                to: from,
                reverse: false,
                empty: true,
            }),
        }
    }

    fn build(smaller: Value, larger: Value, reverse: Option<bool>) -> RuntimeResult<Self> {
        check_present(&smaller, &larger)?;
        let (mut smaller, mut larger, reverse) = match reverse {
            Some(reverse) => (smaller, larger, reverse),
            None => {
                let reversed = smaller.compare(&larger).map_err(|_| incompatible(&smaller, &larger))?
                    == Ordering::Greater;
                if reversed {
                    (larger, smaller, true)
                } else {
                    (smaller, larger, false)
                }
            }
        };
        smaller = widen(smaller);
        larger = widen(larger);
        match (&smaller, &larger) {
            (Value::Int(v), Value::Long(_)) => smaller = Value::Long(i64::from(*v)),
            (Value::Long(_), Value::Int(v)) => larger = Value::Long(i64::from(*v)),
            _ => {}
        }
        if !same_class(&smaller, &larger) {
            smaller = normalise_string_type(smaller);
            larger = normalise_string_type(larger);
        }
        if matches!(smaller, Value::Str(_)) || matches!(larger, Value::Str(_)) {
            check_string_range(&smaller.to_string(), &larger.to_string())?;
        }
        Ok(Self {
            from: smaller,
            to: larger,
            reverse,
            empty: false,
        })
    }

    /// Smaller bound
    pub fn from(&self) -> &Value {
        &self.from
    }

    /// Larger bound
    pub fn to(&self) -> &Value {
        &self.to
    }

    /// Whether the range was written from the larger bound
    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Whether the range has no elements
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Same direction and numerically equal bounds
    pub fn range_equals(&self, other: &ObjectRange) -> bool {
        self.empty == other.empty
            && self.reverse == other.reverse
            && self.from.equals(&other.from)
            && self.to.equals(&other.to)
    }

    /// Number of elements, saturating at `i32::MAX`
    pub fn size(&self) -> RuntimeResult<usize> {
        if self.empty {
            return Ok(0);
        }
        let capped = |n: BigInt| -> usize {
            n.to_i32()
                .map(|n| n.max(0) as usize)
                .unwrap_or(if n.sign() == num_bigint::Sign::Minus { 0 } else { i32::MAX as usize })
        };
        match (&self.from, &self.to) {
            (Value::Int(_) | Value::Long(_), Value::Int(_) | Value::Long(_)) => {
                let (from, to) = (bound_bigint(&self.from), bound_bigint(&self.to));
                Ok(capped(to - from + 1))
            }
            (Value::Char(from), Value::Char(to)) => Ok((*to as u32 - *from as u32 + 1) as usize),
            (from, to)
                if [from, to]
                    .iter()
                    .any(|v| matches!(v, Value::BigInteger(_) | Value::BigDecimal(_))) =>
            {
                match (numeric::as_decimal(from), numeric::as_decimal(to)) {
                    (Some(from), Some(to)) => {
                        let one = crate::decimal::BigDecimal::from_i64(1);
                        Ok(capped(to.sub(&from).add(&one).to_bigint()))
                    }
                    _ => self.count(),
                }
            }
            _ => self.count(),
        }
    }

    fn count(&self) -> RuntimeResult<usize> {
        let mut cursor = self.step_cursor(1)?;
        let mut size = 0usize;
        while cursor.has_next()? && size < i32::MAX as usize {
            cursor.next_value()?;
            size += 1;
        }
        Ok(size)
    }

    /// Element at `index` in iteration order
    pub fn get(&self, index: i64) -> RuntimeResult<Value> {
        if index < 0 {
            return Err(RuntimeError::IllegalArgument(format!(
                "Index: {} should not be negative",
                index
            )));
        }
        let mut cursor = self.step_cursor(1)?;
        let mut position = 0;
        loop {
            if !cursor.has_next()? {
                return Err(self.too_big(index));
            }
            let value = cursor.next_value()?;
            if position == index {
                return Ok(value);
            }
            position += 1;
        }
    }

    fn too_big(&self, index: i64) -> RuntimeError {
        RuntimeError::IllegalArgument(format!("Index: {} is too big for range: {}", index, self))
    }

    /// Elements `from_index..to_index` as a range in the same direction
    pub fn sub_list(&self, from_index: i64, to_index: i64) -> RuntimeResult<ObjectRange> {
        if from_index < 0 {
            return Err(RuntimeError::IllegalArgument(format!("fromIndex = {}", from_index)));
        }
        if from_index > to_index {
            return Err(RuntimeError::IllegalArgument(format!(
                "fromIndex({}) > toIndex({})",
                from_index, to_index
            )));
        }
        if from_index == to_index {
            return Ok(Self {
                from: self.from.clone(),
                to: self.from.clone(),
                reverse: false,
                empty: true,
            });
        }
        let first = self.get(from_index)?;
        let last = self.get(to_index - 1)?;
        let (smaller, larger) = if first.compare(&last)? == Ordering::Greater {
            (last, first)
        } else {
            (first, last)
        };
        Self::with_reverse(smaller, larger, self.reverse)
    }

    /// Whether iteration yields a value equal to `value`
    pub fn contains(&self, value: &Value) -> RuntimeResult<bool> {
        if value.is_null() || self.empty {
            return Ok(false);
        }
        let mut cursor = self.step_cursor(1)?;
        while cursor.has_next()? {
            if cursor.next_value()?.equals(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `from <= value <= to`, without iterating
    pub fn contains_within_bounds(&self, value: &Value) -> RuntimeResult<bool> {
        if self.empty {
            return Ok(false);
        }
        match self.from.compare(value) {
            Ok(Ordering::Equal) => Ok(true),
            Ok(Ordering::Less) => Ok(self.to.compare(value).map(|o| o != Ordering::Less).unwrap_or(false)),
            Ok(Ordering::Greater) => Ok(false),
            Err(_) => self.contains(value),
        }
    }

    /// Every `step`-th element; negative steps walk the other way
    pub fn step(&self, step: i32) -> RuntimeResult<Vec<Value>> {
        if self.empty || (step == 0 && self.from.compare(&self.to)? == Ordering::Equal) {
            return Ok(Vec::new());
        }
        let mut cursor = self.step_cursor(step)?;
        let mut values = Vec::new();
        while cursor.has_next()? {
            values.push(cursor.next_value()?);
        }
        Ok(values)
    }

    /// Cursor stepping by `step` in the range's direction
    pub fn step_cursor(&self, step: i32) -> RuntimeResult<RangeCursor> {
        if step == 0 && self.from.compare(&self.to)? != Ordering::Equal {
            return Err(RuntimeError::IllegalArgument(
                "Infinite loop detected due to step size of 0".to_string(),
            ));
        }
        let step = if self.reverse { -i64::from(step) } else { i64::from(step) };
        let next = if self.empty {
            None
        } else if step > 0 {
            Some(self.from.clone())
        } else {
            Some(self.to.clone())
        };
        Ok(RangeCursor {
            from: self.from.clone(),
            to: self.to.clone(),
            step,
            next,
        })
    }

    /// Every element in iteration order
    pub fn to_vec(&self) -> RuntimeResult<Vec<Value>> {
        self.step(1)
    }
}

fn check_present(from: &Value, to: &Value) -> RuntimeResult<()> {
    if from.is_null() {
        return Err(RuntimeError::IllegalArgument(
            "Must specify a non-null value for the 'from' index in a Range".to_string(),
        ));
    }
    if to.is_null() {
        return Err(RuntimeError::IllegalArgument(
            "Must specify a non-null value for the 'to' index in a Range".to_string(),
        ));
    }
    Ok(())
}

fn bound_bigint(value: &Value) -> BigInt {
    numeric::as_bigint(value).unwrap_or_default()
}

impl fmt::Display for ObjectRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            f.write_str("[]")
        } else if self.reverse {
            write!(f, "{}..{}", self.to, self.from)
        } else {
            write!(f, "{}..{}", self.from, self.to)
        }
    }
}

/// Cursor over a range with a fixed step
pub struct RangeCursor {
    from: Value,
    to: Value,
    step: i64,
    next: Option<Value>,
}

impl RangeCursor {
    /// Value after `current`, or `None` past the bound or on wrap-around
    fn peek(&self, current: &Value) -> RuntimeResult<Option<Value>> {
        let mut value = current.clone();
        if self.step > 0 {
            for _ in 0..self.step {
                value = numeric::next(&value)?;
                if value.compare(&self.from)? != Ordering::Greater {
                    return Ok(None);
                }
            }
            if value.compare(&self.to)? != Ordering::Greater {
                return Ok(Some(value));
            }
        } else {
            for _ in 0..self.step.unsigned_abs() {
                value = numeric::previous(&value)?;
                if value.compare(&self.to)? != Ordering::Less {
                    return Ok(None);
                }
            }
            if value.compare(&self.from)? != Ordering::Less {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

impl Cursor for RangeCursor {
    fn has_next(&mut self) -> RuntimeResult<bool> {
        Ok(self.next.is_some())
    }

    fn next_value(&mut self) -> RuntimeResult<Value> {
        let current = self.next.take().ok_or_else(exhausted)?;
        self.next = self.peek(&current)?;
        Ok(current)
    }
}
