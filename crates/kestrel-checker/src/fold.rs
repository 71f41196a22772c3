//! Constant folding of literal operands
//!
//! Folding covers string concatenation with any literal and `+ - *` over the
//! fixed-width numeric literals. Integral arithmetic wraps like the machine
//! instructions it replaces. Division is never folded so that division by
//! zero stays a runtime error.

use kestrel_ast::{BinaryOp, Literal, UnaryOp};

/// Fold `left op right`, if both are foldable literals
pub fn fold_binary(op: BinaryOp, left: &Literal, right: &Literal) -> Option<Literal> {
    if op == BinaryOp::Add && (is_string(left) || is_string(right)) {
        if matches!(left, Literal::Null) || matches!(right, Literal::Null) {
            return None;
        }
        let mut text = left.to_display_string();
        text.push_str(&right.to_display_string());
        return Some(Literal::String(text));
    }

    if !matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) {
        return None;
    }

    let folded = match (widen(left)?, widen(right)?) {
        (Folded::Int(a), Folded::Int(b)) => Literal::Int(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            _ => a.wrapping_mul(b),
        }),
        (Folded::Double, _) | (_, Folded::Double) => {
            let (x, y) = (as_f64(left)?, as_f64(right)?);
            Literal::Double(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                _ => x * y,
            })
        }
        (Folded::Float, _) | (_, Folded::Float) => {
            let (x, y) = (as_f32(left)?, as_f32(right)?);
            Literal::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                _ => x * y,
            })
        }
        _ => {
            let (x, y) = (as_i64(left)?, as_i64(right)?);
            Literal::Long(match op {
                BinaryOp::Add => x.wrapping_add(y),
                BinaryOp::Sub => x.wrapping_sub(y),
                _ => x.wrapping_mul(y),
            })
        }
    };
    Some(folded)
}

/// Fold a unary operator over a literal
pub fn fold_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    match (op, operand) {
        (UnaryOp::Neg, Literal::Int(v)) => Some(Literal::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Literal::Long(v)) => Some(Literal::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Literal::Float(v)) => Some(Literal::Float(-v)),
        (UnaryOp::Neg, Literal::Double(v)) => Some(Literal::Double(-v)),
        (UnaryOp::Not, Literal::Boolean(b)) => Some(Literal::Boolean(!b)),
        _ => None,
    }
}

/// Result kind of a fixed-width literal operand
#[derive(Clone, Copy)]
enum Folded {
    Int(i32),
    Long,
    Float,
    Double,
}

fn widen(lit: &Literal) -> Option<Folded> {
    match lit {
        Literal::Int(v) => Some(Folded::Int(*v)),
        Literal::Long(_) => Some(Folded::Long),
        Literal::Float(_) => Some(Folded::Float),
        Literal::Double(_) => Some(Folded::Double),
        _ => None,
    }
}

fn is_string(lit: &Literal) -> bool {
    matches!(lit, Literal::String(_))
}

fn as_f64(lit: &Literal) -> Option<f64> {
    match lit {
        Literal::Int(v) => Some(*v as f64),
        Literal::Long(v) => Some(*v as f64),
        Literal::Float(v) => Some(*v as f64),
        Literal::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_f32(lit: &Literal) -> Option<f32> {
    match lit {
        Literal::Int(v) => Some(*v as f32),
        Literal::Long(v) => Some(*v as f32),
        Literal::Float(v) => Some(*v),
        _ => None,
    }
}

fn as_i64(lit: &Literal) -> Option<i64> {
    match lit {
        Literal::Int(v) => Some(*v as i64),
        Literal::Long(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_concatenation() {
        let folded = fold_binary(
            BinaryOp::Add,
            &Literal::String("hello, ".into()),
            &Literal::String("world!".into()),
        );
        assert_eq!(folded, Some(Literal::String("hello, world!".into())));

        let mixed = fold_binary(BinaryOp::Add, &Literal::String("n=".into()), &Literal::Double(2.0));
        assert_eq!(mixed, Some(Literal::String("n=2.0".into())));
    }

    #[test]
    fn test_long_addition() {
        let folded = fold_binary(BinaryOp::Add, &Literal::Long(11111111), &Literal::Long(11111111));
        assert_eq!(folded, Some(Literal::Long(22222222)));
    }

    #[test]
    fn test_promotion_and_wrapping() {
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::Int(i32::MAX), &Literal::Int(1)),
            Some(Literal::Int(i32::MIN))
        );
        assert_eq!(
            fold_binary(BinaryOp::Sub, &Literal::Int(1), &Literal::Long(3)),
            Some(Literal::Long(-2))
        );
        assert_eq!(
            fold_binary(BinaryOp::Sub, &Literal::Int(1), &Literal::Double(0.5)),
            Some(Literal::Double(0.5))
        );
        assert_eq!(
            fold_binary(BinaryOp::Mul, &Literal::Float(1.5), &Literal::Int(2)),
            Some(Literal::Float(3.0))
        );
    }

    #[test]
    fn test_unfoldable() {
        assert_eq!(fold_binary(BinaryOp::Div, &Literal::Int(1), &Literal::Int(0)), None);
        assert_eq!(fold_binary(BinaryOp::Add, &Literal::Boolean(true), &Literal::Int(1)), None);
        assert_eq!(fold_binary(BinaryOp::Add, &Literal::Null, &Literal::String("x".into())), None);
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::BigInteger("1".into()), &Literal::Int(1)),
            None
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(fold_unary(UnaryOp::Neg, &Literal::Int(5)), Some(Literal::Int(-5)));
        assert_eq!(fold_unary(UnaryOp::Not, &Literal::Boolean(true)), Some(Literal::Boolean(false)));
        assert_eq!(fold_unary(UnaryOp::Neg, &Literal::String("x".into())), None);
    }
}
