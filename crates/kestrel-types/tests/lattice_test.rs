//! Lattice and coercion properties over the builtin scalar types

use kestrel_types::{
    plan_type_coercion, promote, CoercionKind, NumericKind, PrimitiveKind, Scalar, TypeContext,
    TypeError,
};

fn scalar_types(ctx: &TypeContext) -> Vec<kestrel_types::TypeId> {
    let wk = ctx.well_known();
    let mut ids = vec![
        wk.boolean, wk.byte, wk.short, wk.char, wk.int, wk.long, wk.float, wk.double,
        wk.big_integer, wk.big_decimal,
    ];
    for kind in PrimitiveKind::VALUES {
        ids.push(ctx.boxed(kind).unwrap());
    }
    ids
}

#[test]
fn test_coercion_is_total_over_scalars() {
    let ctx = TypeContext::new();
    let types = scalar_types(&ctx);

    for &from in &types {
        for &to in &types {
            let from_bool = ctx.is_boolean(from);
            let to_bool = ctx.is_boolean(to);
            match plan_type_coercion(&ctx, from, to) {
                Ok(plan) => {
                    assert_eq!(from_bool, to_bool);
                    if from == to {
                        assert_eq!(plan.kind, CoercionKind::Identity);
                    }
                }
                Err(TypeError::Incompatible { from: f, to: t }) => {
                    assert_ne!(from_bool, to_bool);
                    assert_eq!(f, ctx.display(from));
                    assert_eq!(t, ctx.display(to));
                }
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }
}

#[test]
fn test_promotion_through_context() {
    let ctx = TypeContext::new();
    let wk = ctx.well_known();

    let int = ctx.numeric_kind(wk.int).unwrap();
    let long = ctx.numeric_kind(ctx.boxed(PrimitiveKind::Long).unwrap()).unwrap();
    assert_eq!(ctx.numeric_type(promote(int, long)), wk.long);

    let float = ctx.numeric_kind(wk.float).unwrap();
    let decimal = ctx.numeric_kind(wk.big_decimal).unwrap();
    assert_eq!(ctx.numeric_type(promote(float, decimal)), wk.big_decimal);
}

#[test]
fn test_widening_plans_are_implicit() {
    let ctx = TypeContext::new();
    let wk = ctx.well_known();
    for (from, to) in [(wk.byte, wk.int), (wk.int, wk.double), (wk.char, wk.long)] {
        assert!(plan_type_coercion(&ctx, from, to).unwrap().is_implicit());
    }
    for (from, to) in [(wk.long, wk.int), (wk.double, wk.float), (wk.int, wk.char)] {
        assert!(!plan_type_coercion(&ctx, from, to).unwrap().is_implicit());
    }
}

#[test]
fn test_scalar_classification() {
    let ctx = TypeContext::new();
    let wk = ctx.well_known();
    assert!(Scalar::of_type(&ctx, wk.string).is_none());
    assert!(Scalar::of_type(&ctx, wk.void).is_none());
    let decimal = Scalar::of_type(&ctx, wk.big_decimal).unwrap();
    assert!(decimal.boxed);
    assert_eq!(decimal.primitive_kind(), None);
    assert_eq!(
        Scalar::of_type(&ctx, wk.char).unwrap().primitive_kind(),
        Some(PrimitiveKind::Char)
    );
    assert_eq!(NumericKind::ALL.len(), 9);
}
