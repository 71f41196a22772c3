//! Coercion rules between primitive-like types
//!
//! A *scalar* is a boolean or numeric value, either as a primitive or boxed in
//! its wrapper class (`BigInteger` and `BigDecimal` are always boxed). Every
//! pair of scalars has a deterministic [`CoercionPlan`] except boolean and
//! numeric mixes, which fail with [`TypeError::Incompatible`].

use crate::context::TypeContext;
use crate::error::TypeError;
use crate::numeric::{is_widening, NumericKind};
use crate::ty::{PrimitiveKind, TypeId};
use std::fmt;

/// Value category of a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `boolean` / `Boolean`
    Boolean,
    /// Any numeric kind
    Numeric(NumericKind),
}

/// A primitive-like type: kind plus representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scalar {
    /// Value category
    pub kind: ScalarKind,
    /// Whether the value is a heap wrapper rather than a machine primitive
    pub boxed: bool,
}

impl Scalar {
    /// Machine primitive of the given kind
    pub fn primitive(kind: PrimitiveKind) -> Option<Self> {
        let kind = match kind {
            PrimitiveKind::Boolean => ScalarKind::Boolean,
            PrimitiveKind::Void => return None,
            other => ScalarKind::Numeric(NumericKind::of_primitive(other)?),
        };
        Some(Scalar { kind, boxed: false })
    }

    /// Boxed wrapper of the given kind
    pub fn boxed(kind: ScalarKind) -> Self {
        Scalar { kind, boxed: true }
    }

    /// Classify a type as a scalar, if it is one
    pub fn of_type(ctx: &TypeContext, id: TypeId) -> Option<Self> {
        if let Some(kind) = ctx.primitive(id) {
            return Scalar::primitive(kind);
        }
        if ctx.is_boolean(id) {
            return Some(Scalar::boxed(ScalarKind::Boolean));
        }
        ctx.numeric_kind(id)
            .map(|kind| Scalar::boxed(ScalarKind::Numeric(kind)))
    }

    /// The machine primitive underlying this scalar
    pub fn primitive_kind(self) -> Option<PrimitiveKind> {
        match self.kind {
            ScalarKind::Boolean => Some(PrimitiveKind::Boolean),
            ScalarKind::Numeric(n) => n.primitive(),
        }
    }

    fn unboxed(self) -> Self {
        match self.kind {
            ScalarKind::Numeric(n) if n.is_arbitrary() => self,
            _ => Scalar { boxed: false, ..self },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.boxed) {
            (ScalarKind::Boolean, false) => f.write_str("boolean"),
            (ScalarKind::Boolean, true) => f.write_str("Boolean"),
            (ScalarKind::Numeric(n), false) => f.write_str(n.name()),
            (ScalarKind::Numeric(n), true) => match n.primitive().and_then(PrimitiveKind::wrapper_name) {
                Some(wrapper) => f.write_str(wrapper),
                None => f.write_str(n.name()),
            },
        }
    }
}

/// One step of a conversion sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoercionStep {
    /// Unwrap a wrapper into its primitive
    Unbox(PrimitiveKind),
    /// Convert between numeric representations
    Convert {
        /// Source kind
        from: NumericKind,
        /// Target kind
        to: NumericKind,
    },
    /// Wrap a primitive into its wrapper class
    Box(PrimitiveKind),
}

/// Overall character of a coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoercionKind {
    /// No conversion needed
    Identity,
    /// Lossless conversion (boxing, unboxing, widening)
    Widening,
    /// Possibly lossy conversion; needs an explicit cast or a fitting constant
    Narrowing,
}

/// Ordered conversion steps from one scalar to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionPlan {
    /// Source scalar
    pub from: Scalar,
    /// Target scalar
    pub to: Scalar,
    /// Steps to apply in order
    pub steps: Vec<CoercionStep>,
    /// Overall character
    pub kind: CoercionKind,
}

impl CoercionPlan {
    /// Whether the plan is usable without an explicit cast
    pub fn is_implicit(&self) -> bool {
        self.kind != CoercionKind::Narrowing
    }
}

/// Plan the conversion of `from` into `to`
///
/// Pure and total over scalars: the only failures are boolean/numeric mixes.
pub fn plan_coercion(from: Scalar, to: Scalar) -> Result<CoercionPlan, TypeError> {
    let incompatible = || TypeError::Incompatible {
        from: from.to_string(),
        to: to.to_string(),
    };

    let mut steps = Vec::new();
    let mut kind = CoercionKind::Identity;

    if from == to {
        return Ok(CoercionPlan { from, to, steps, kind });
    }

    match (from.kind, to.kind) {
        (ScalarKind::Boolean, ScalarKind::Boolean) => {
            if from.boxed && !to.boxed {
                steps.push(CoercionStep::Unbox(PrimitiveKind::Boolean));
                kind = CoercionKind::Widening;
            } else if !from.boxed && to.boxed {
                steps.push(CoercionStep::Box(PrimitiveKind::Boolean));
                kind = CoercionKind::Widening;
            }
        }
        (ScalarKind::Numeric(src), ScalarKind::Numeric(dst)) => {
            let src_unboxed = from.unboxed();
            if from.boxed && src_unboxed != from {
                if let Some(prim) = src.primitive() {
                    steps.push(CoercionStep::Unbox(prim));
                    kind = CoercionKind::Widening;
                }
            }
            if src != dst {
                steps.push(CoercionStep::Convert { from: src, to: dst });
                kind = if is_widening(src, dst) {
                    CoercionKind::Widening
                } else {
                    CoercionKind::Narrowing
                };
            }
            if to.boxed && to.unboxed() != to {
                if let Some(prim) = dst.primitive() {
                    steps.push(CoercionStep::Box(prim));
                    if kind == CoercionKind::Identity {
                        kind = CoercionKind::Widening;
                    }
                }
            }
        }
        _ => return Err(incompatible()),
    }

    Ok(CoercionPlan { from, to, steps, kind })
}

/// Plan a coercion between two types that must both be scalars
pub fn plan_type_coercion(
    ctx: &TypeContext,
    from: TypeId,
    to: TypeId,
) -> Result<CoercionPlan, TypeError> {
    let incompatible = || TypeError::Incompatible {
        from: ctx.display(from),
        to: ctx.display(to),
    };
    let src = Scalar::of_type(ctx, from).ok_or_else(incompatible)?;
    let dst = Scalar::of_type(ctx, to).ok_or_else(incompatible)?;
    plan_coercion(src, dst)
}

/// A compile-time constant considered for implicit narrowing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    /// Integral constant
    Integral(i64),
    /// Floating constant
    Floating(f64),
}

/// Whether narrowing `from` into `to` is legal without a cast
///
/// Only integral constants whose value fits the target are accepted, matching
/// assignments such as `byte b = 10`.
pub fn implicit_narrowing_allowed(
    from: NumericKind,
    to: NumericKind,
    constant: Option<ConstantValue>,
) -> bool {
    if is_widening(from, to) {
        return true;
    }
    let Some(ConstantValue::Integral(value)) = constant else {
        return false;
    };
    if !from.is_integral() {
        return false;
    }
    match to {
        NumericKind::Byte => i8::try_from(value).is_ok(),
        NumericKind::Short => i16::try_from(value).is_ok(),
        NumericKind::Char => u16::try_from(value).is_ok(),
        NumericKind::Int => i32::try_from(value).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(kind: PrimitiveKind) -> Scalar {
        Scalar::primitive(kind).unwrap()
    }

    fn num(kind: NumericKind, boxed: bool) -> Scalar {
        Scalar {
            kind: ScalarKind::Numeric(kind),
            boxed,
        }
    }

    #[test]
    fn test_identity() {
        let plan = plan_coercion(prim(PrimitiveKind::Int), prim(PrimitiveKind::Int)).unwrap();
        assert_eq!(plan.kind, CoercionKind::Identity);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn test_widening_int_to_long() {
        let plan = plan_coercion(prim(PrimitiveKind::Int), prim(PrimitiveKind::Long)).unwrap();
        assert_eq!(plan.kind, CoercionKind::Widening);
        assert_eq!(
            plan.steps,
            vec![CoercionStep::Convert {
                from: NumericKind::Int,
                to: NumericKind::Long
            }]
        );
    }

    #[test]
    fn test_unbox_widen_box() {
        let plan = plan_coercion(num(NumericKind::Int, true), num(NumericKind::Double, true)).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                CoercionStep::Unbox(PrimitiveKind::Int),
                CoercionStep::Convert {
                    from: NumericKind::Int,
                    to: NumericKind::Double
                },
                CoercionStep::Box(PrimitiveKind::Double),
            ]
        );
        assert!(plan.is_implicit());
    }

    #[test]
    fn test_narrowing_needs_cast() {
        let plan = plan_coercion(prim(PrimitiveKind::Double), prim(PrimitiveKind::Int)).unwrap();
        assert_eq!(plan.kind, CoercionKind::Narrowing);
        assert!(!plan.is_implicit());
    }

    #[test]
    fn test_big_decimal_has_no_unbox_step() {
        let plan = plan_coercion(prim(PrimitiveKind::Long), num(NumericKind::BigDecimal, true)).unwrap();
        assert_eq!(
            plan.steps,
            vec![CoercionStep::Convert {
                from: NumericKind::Long,
                to: NumericKind::BigDecimal
            }]
        );
    }

    #[test]
    fn test_boolean_numeric_is_incompatible() {
        let err = plan_coercion(prim(PrimitiveKind::Boolean), prim(PrimitiveKind::Int)).unwrap_err();
        assert_eq!(
            err,
            TypeError::Incompatible {
                from: "boolean".into(),
                to: "int".into()
            }
        );
        let err = plan_coercion(num(NumericKind::Long, true), Scalar::boxed(ScalarKind::Boolean)).unwrap_err();
        assert!(err.to_string().contains("Long"));
        assert!(err.to_string().contains("Boolean"));
    }

    #[test]
    fn test_every_numeric_pair_has_a_plan() {
        for a in NumericKind::ALL {
            for b in NumericKind::ALL {
                for (ab, bb) in [(false, false), (true, true), (false, true), (true, false)] {
                    let from = num(a, ab || a.is_arbitrary());
                    let to = num(b, bb || b.is_arbitrary());
                    assert!(plan_coercion(from, to).is_ok(), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn test_plan_type_coercion() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known();
        let integer = ctx.class_named("Integer").unwrap();
        let plan = plan_type_coercion(&ctx, integer, wk.long).unwrap();
        assert_eq!(plan.steps.len(), 2);
        let err = plan_type_coercion(&ctx, wk.string, wk.int).unwrap_err();
        assert_eq!(
            err,
            TypeError::Incompatible {
                from: "String".into(),
                to: "int".into()
            }
        );
    }

    #[test]
    fn test_constant_narrowing() {
        use NumericKind::*;
        assert!(implicit_narrowing_allowed(Int, Byte, Some(ConstantValue::Integral(100))));
        assert!(!implicit_narrowing_allowed(Int, Byte, Some(ConstantValue::Integral(300))));
        assert!(!implicit_narrowing_allowed(Int, Byte, None));
        assert!(implicit_narrowing_allowed(Long, Int, Some(ConstantValue::Integral(7))));
        assert!(!implicit_narrowing_allowed(Double, Int, Some(ConstantValue::Floating(1.0))));
        assert!(implicit_narrowing_allowed(Int, Long, None));
    }
}
