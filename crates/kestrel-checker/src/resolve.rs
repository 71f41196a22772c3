//! Overload selection and assignability
//!
//! A candidate applies when every argument converts to its parameter by
//! identity, subtyping, numeric widening or boxing. Among applicable
//! candidates the most specific wins; a tie is ambiguous.

use crate::class_table::MethodTarget;
use kestrel_types::{plan_type_coercion, Scalar, TypeContext, TypeId};

/// Outcome of overload selection
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exactly one most specific candidate
    Found(MethodTarget),
    /// No candidate applies
    NotFound,
    /// Several equally specific candidates
    Ambiguous(Vec<MethodTarget>),
}

/// How a value of one type reaches a slot of another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignability {
    /// Same type, subtype, widening or boxing
    Implicit,
    /// Possible only with a runtime check or a lossy conversion
    Unchecked,
    /// Never possible
    Incompatible,
}

/// Whether an argument of type `arg` can be passed for `param` implicitly
pub fn is_applicable(ctx: &TypeContext, arg: TypeId, param: TypeId) -> bool {
    assignability(ctx, arg, param) == Assignability::Implicit
}

/// Classify the assignment of a `value` into a `target` slot
pub fn assignability(ctx: &TypeContext, value: TypeId, target: TypeId) -> Assignability {
    let value = ctx.resolve(value);
    let target = ctx.resolve(target);
    let wk = ctx.well_known();

    if value == target || ctx.is_dynamic(target) {
        return Assignability::Implicit;
    }
    if ctx.is_dynamic(value) {
        return Assignability::Unchecked;
    }
    if value == wk.void {
        return Assignability::Incompatible;
    }
    if value == wk.null {
        return if ctx.is_primitive(target) {
            Assignability::Incompatible
        } else {
            Assignability::Implicit
        };
    }

    if let (Some(_), Some(_)) = (Scalar::of_type(ctx, value), Scalar::of_type(ctx, target)) {
        return match plan_type_coercion(ctx, value, target) {
            Ok(plan) if plan.is_implicit() => Assignability::Implicit,
            Ok(_) => Assignability::Unchecked,
            Err(_) => Assignability::Incompatible,
        };
    }

    if ctx.is_primitive(value) {
        let boxed = ctx.box_if_primitive(value);
        return if ctx.is_subtype(boxed, target) {
            Assignability::Implicit
        } else if ctx.is_subtype(target, boxed) {
            Assignability::Unchecked
        } else {
            Assignability::Incompatible
        };
    }

    if ctx.is_subtype(value, target) {
        return Assignability::Implicit;
    }
    if ctx.is_primitive(target) {
        // Object or Number into a primitive slot unboxes at runtime
        let boxed = ctx.box_if_primitive(target);
        return if ctx.is_subtype(boxed, value) {
            Assignability::Unchecked
        } else {
            Assignability::Incompatible
        };
    }
    if ctx.is_subtype(target, value) || ctx.is_interface(target) || ctx.is_interface(value) {
        return Assignability::Unchecked;
    }
    Assignability::Incompatible
}

/// Pick the most specific applicable candidate for `args`
pub fn select_overload(
    ctx: &TypeContext,
    candidates: Vec<MethodTarget>,
    args: &[TypeId],
) -> Resolution {
    let mut applicable: Vec<MethodTarget> = candidates
        .into_iter()
        .filter(|c| c.params.len() == args.len())
        .filter(|c| {
            c.params
                .iter()
                .zip(args)
                .all(|(&param, &arg)| is_applicable(ctx, arg, param))
        })
        .collect();

    if applicable.is_empty() {
        return Resolution::NotFound;
    }
    if applicable.len() == 1 {
        return Resolution::Found(applicable.remove(0));
    }

    let best: Vec<&MethodTarget> = applicable
        .iter()
        .filter(|a| {
            applicable
                .iter()
                .all(|b| std::ptr::eq(*a, b) || more_specific(ctx, a, b))
        })
        .collect();

    match best.as_slice() {
        [one] => Resolution::Found((*one).clone()),
        _ => Resolution::Ambiguous(applicable),
    }
}

/// `a` is at least as specific as `b` when every parameter of `a` is
/// implicitly passable to the matching parameter of `b`
fn more_specific(ctx: &TypeContext, a: &MethodTarget, b: &MethodTarget) -> bool {
    a.params
        .iter()
        .zip(&b.params)
        .all(|(&pa, &pb)| is_applicable(ctx, pa, pb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_table::CallKind;
    use kestrel_types::PrimitiveKind;

    fn target(ctx: &TypeContext, params: Vec<TypeId>) -> MethodTarget {
        MethodTarget {
            owner: ctx.well_known().object,
            owner_name: "Object".into(),
            name: "pick".into(),
            params,
            return_type: ctx.well_known().void,
            kind: CallKind::Virtual,
        }
    }

    #[test]
    fn test_assignability() {
        let mut ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let ints = ctx.array_of(wk.int);

        assert_eq!(assignability(&ctx, wk.int, wk.long), Assignability::Implicit);
        assert_eq!(assignability(&ctx, wk.int, wk.object), Assignability::Implicit);
        assert_eq!(assignability(&ctx, wk.long, wk.int), Assignability::Unchecked);
        assert_eq!(assignability(&ctx, wk.object, wk.string), Assignability::Unchecked);
        assert_eq!(assignability(&ctx, wk.object, wk.int), Assignability::Unchecked);
        assert_eq!(assignability(&ctx, wk.boolean, wk.int), Assignability::Incompatible);
        assert_eq!(assignability(&ctx, wk.string, wk.int), Assignability::Incompatible);
        assert_eq!(assignability(&ctx, wk.null, wk.int), Assignability::Incompatible);
        assert_eq!(assignability(&ctx, wk.null, ints), Assignability::Implicit);
        assert_eq!(assignability(&ctx, wk.dynamic, wk.int), Assignability::Unchecked);
    }

    #[test]
    fn test_most_specific_wins() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let by_int = target(&ctx, vec![wk.int]);
        let by_long = target(&ctx, vec![wk.long]);
        let by_object = target(&ctx, vec![wk.object]);

        let found = select_overload(&ctx, vec![by_object, by_long, by_int.clone()], &[wk.int]);
        assert_eq!(found, Resolution::Found(by_int));
    }

    #[test]
    fn test_ambiguous_pair() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let integer = ctx.boxed(PrimitiveKind::Int).unwrap();
        let a = target(&ctx, vec![integer, wk.int]);
        let b = target(&ctx, vec![wk.int, integer]);

        match select_overload(&ctx, vec![a, b], &[wk.int, wk.int]) {
            Resolution::Ambiguous(c) => assert_eq!(c.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_not_found() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let by_int = target(&ctx, vec![wk.int]);
        assert_eq!(select_overload(&ctx, vec![by_int], &[wk.string]), Resolution::NotFound);
    }
}
