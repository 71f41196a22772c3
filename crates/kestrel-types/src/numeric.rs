//! Numeric promotion lattice
//!
//! Binary arithmetic and comparisons between two numeric operands are carried
//! out in a common representation chosen by [`promote`]. The lattice is:
//!
//! ```text
//! byte, short, char -> int -> long -> float -> double -> BigInteger -> BigDecimal
//! ```
//!
//! with one deliberate deviation from a plain total order: a `BigInteger`
//! meeting a `float` or `double` yields `BigDecimal`, so that the arbitrary
//! precision operand wins without dropping the fractional part.

use crate::ty::PrimitiveKind;
use std::fmt;

/// The nine numeric kinds that take part in promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericKind {
    /// 8-bit signed integer
    Byte,
    /// 16-bit signed integer
    Short,
    /// Unicode scalar used as an unsigned integer
    Char,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// IEEE 754 single precision
    Float,
    /// IEEE 754 double precision
    Double,
    /// Arbitrary-precision integer
    BigInteger,
    /// Arbitrary-precision decimal
    BigDecimal,
}

impl NumericKind {
    /// Every numeric kind, narrowest first
    pub const ALL: [NumericKind; 9] = [
        NumericKind::Byte,
        NumericKind::Short,
        NumericKind::Char,
        NumericKind::Int,
        NumericKind::Long,
        NumericKind::Float,
        NumericKind::Double,
        NumericKind::BigInteger,
        NumericKind::BigDecimal,
    ];

    /// Position in the widening order; byte, short and char share rank 0
    pub fn rank(self) -> u8 {
        match self {
            NumericKind::Byte | NumericKind::Short | NumericKind::Char => 0,
            NumericKind::Int => 1,
            NumericKind::Long => 2,
            NumericKind::Float => 3,
            NumericKind::Double => 4,
            NumericKind::BigInteger => 5,
            NumericKind::BigDecimal => 6,
        }
    }

    /// Whether values of this kind have no fractional part
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            NumericKind::Byte
                | NumericKind::Short
                | NumericKind::Char
                | NumericKind::Int
                | NumericKind::Long
                | NumericKind::BigInteger
        )
    }

    /// Whether this kind is binary floating point
    pub fn is_floating(self) -> bool {
        matches!(self, NumericKind::Float | NumericKind::Double)
    }

    /// Whether this kind has unbounded precision
    pub fn is_arbitrary(self) -> bool {
        matches!(self, NumericKind::BigInteger | NumericKind::BigDecimal)
    }

    /// The primitive this kind is represented by, if any
    pub fn primitive(self) -> Option<PrimitiveKind> {
        match self {
            NumericKind::Byte => Some(PrimitiveKind::Byte),
            NumericKind::Short => Some(PrimitiveKind::Short),
            NumericKind::Char => Some(PrimitiveKind::Char),
            NumericKind::Int => Some(PrimitiveKind::Int),
            NumericKind::Long => Some(PrimitiveKind::Long),
            NumericKind::Float => Some(PrimitiveKind::Float),
            NumericKind::Double => Some(PrimitiveKind::Double),
            NumericKind::BigInteger | NumericKind::BigDecimal => None,
        }
    }

    /// The numeric kind of a primitive (`None` for boolean and void)
    pub fn of_primitive(kind: PrimitiveKind) -> Option<Self> {
        match kind {
            PrimitiveKind::Byte => Some(NumericKind::Byte),
            PrimitiveKind::Short => Some(NumericKind::Short),
            PrimitiveKind::Char => Some(NumericKind::Char),
            PrimitiveKind::Int => Some(NumericKind::Int),
            PrimitiveKind::Long => Some(NumericKind::Long),
            PrimitiveKind::Float => Some(NumericKind::Float),
            PrimitiveKind::Double => Some(NumericKind::Double),
            PrimitiveKind::Boolean | PrimitiveKind::Void => None,
        }
    }

    /// Source-level name
    pub fn name(self) -> &'static str {
        match self {
            NumericKind::BigInteger => "BigInteger",
            NumericKind::BigDecimal => "BigDecimal",
            other => other.primitive().map(PrimitiveKind::name).unwrap_or("?"),
        }
    }

    /// Position in [`NumericKind::ALL`], used as a bytecode tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`NumericKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        NumericKind::ALL.get(tag as usize).copied()
    }

    /// Promote a single operand (unary minus, increments): at least `int`
    pub fn unary_promote(self) -> Self {
        if self.rank() == 0 {
            NumericKind::Int
        } else {
            self
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common representation for a binary operation between `a` and `b`
///
/// Total and symmetric: `promote(a, b) == promote(b, a)` for every pair.
pub fn promote(a: NumericKind, b: NumericKind) -> NumericKind {
    let (a, b) = (a.unary_promote(), b.unary_promote());

    if a == NumericKind::BigDecimal || b == NumericKind::BigDecimal {
        return NumericKind::BigDecimal;
    }
    if a == NumericKind::BigInteger || b == NumericKind::BigInteger {
        let other = if a == NumericKind::BigInteger { b } else { a };
        return if other.is_floating() {
            NumericKind::BigDecimal
        } else {
            NumericKind::BigInteger
        };
    }
    if a.rank() >= b.rank() {
        a
    } else {
        b
    }
}

/// Whether a value of kind `from` converts to `to` without loss of range
///
/// Mirrors the implicit widening conversions: integral kinds widen to any
/// wider kind, `char` widens to `int` and beyond but not to `short`, and
/// nothing widens into `byte`, `short` or `char` except itself.
pub fn is_widening(from: NumericKind, to: NumericKind) -> bool {
    use NumericKind::*;
    if from == to {
        return true;
    }
    match to {
        Byte | Char => false,
        Short => from == Byte,
        Int => matches!(from, Byte | Short | Char),
        Long => matches!(from, Byte | Short | Char | Int),
        Float => matches!(from, Byte | Short | Char | Int | Long),
        Double => matches!(from, Byte | Short | Char | Int | Long | Float),
        BigInteger => from.is_integral(),
        BigDecimal => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NumericKind::*;

    #[test]
    fn test_promote_examples() {
        assert_eq!(promote(Int, Long), Long);
        assert_eq!(promote(Float, BigDecimal), BigDecimal);
        assert_eq!(promote(Byte, Short), Int);
        assert_eq!(promote(Char, Char), Int);
        assert_eq!(promote(Long, Float), Float);
        assert_eq!(promote(Double, Long), Double);
        assert_eq!(promote(Long, BigInteger), BigInteger);
        assert_eq!(promote(Double, BigInteger), BigDecimal);
    }

    #[test]
    fn test_promote_is_total_and_symmetric() {
        for a in NumericKind::ALL {
            for b in NumericKind::ALL {
                let ab = promote(a, b);
                assert_eq!(ab, promote(b, a), "{a} with {b}");
                assert!(ab.rank() >= 1, "{a} with {b} narrower than int");
            }
        }
    }

    #[test]
    fn test_arbitrary_always_wins() {
        for fixed in NumericKind::ALL.iter().copied().filter(|k| !k.is_arbitrary()) {
            assert!(promote(fixed, BigInteger).is_arbitrary());
            assert_eq!(promote(fixed, BigDecimal), BigDecimal);
        }
    }

    #[test]
    fn test_tags_follow_widening_order() {
        for kind in NumericKind::ALL {
            assert_eq!(NumericKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(NumericKind::BigDecimal.tag(), 8);
        assert_eq!(NumericKind::from_tag(9), None);
    }

    #[test]
    fn test_widening_relation() {
        assert!(is_widening(Int, Long));
        assert!(is_widening(Char, Int));
        assert!(!is_widening(Char, Short));
        assert!(!is_widening(Long, Int));
        assert!(is_widening(Long, Float));
        assert!(!is_widening(Double, BigInteger));
        assert!(is_widening(Double, BigDecimal));
    }
}
