//! Subtyping rules for the Kestrel type system
//!
//! Implements the nominal subtyping relation T <: U (T is a subtype of U).

use crate::context::TypeContext;
use crate::ty::{Type, TypeId};

/// Context for checking subtyping relationships
#[derive(Debug, Clone)]
pub struct SubtypingContext<'a> {
    /// Type context for resolving types
    type_ctx: &'a TypeContext,
}

impl<'a> SubtypingContext<'a> {
    /// Create a new subtyping context
    pub fn new(type_ctx: &'a TypeContext) -> Self {
        SubtypingContext { type_ctx }
    }

    /// Check if `sub` is a subtype of `sup` (sub <: sup)
    ///
    /// Returns true if a value of type `sub` can be used where `sup` is
    /// expected without any conversion. Boxing and numeric widening are
    /// coercions, not subtyping, and are handled by the coercion module.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let sub = self.type_ctx.resolve(sub);
        let sup = self.type_ctx.resolve(sup);

        // Reflexivity: T <: T
        if sub == sup {
            return true;
        }

        let (Some(sub_ty), Some(sup_ty)) = (self.type_ctx.get(sub), self.type_ctx.get(sup)) else {
            return false;
        };

        let object = self.type_ctx.well_known().object;

        match (sub_ty, sup_ty) {
            // Dynamic is compatible in both directions; the runtime checks it
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,

            // Primitives only relate reflexively
            (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,

            // Null flows into every reference type
            (Type::Null, _) => true,

            // Every reference type is an Object
            (_, _) if sup == object => true,

            // Arrays are covariant in reference components
            (Type::Array(a), Type::Array(b)) => {
                !self.type_ctx.is_primitive(*a)
                    && !self.type_ctx.is_primitive(*b)
                    && self.is_subtype(*a, *b)
            }

            // Generic instantiations: invariant arguments, same base
            (Type::Generic(a), Type::Generic(b)) => {
                a.args == b.args && self.is_subtype(a.base, b.base)
            }

            // A parameterized type is a subtype of its raw base's supertypes
            (Type::Generic(a), _) => self.is_subtype(a.base, sup),

            // Raw types flow into parameterized targets unchecked
            (_, Type::Generic(b)) => self.is_subtype(sub, b.base),

            // Class subtyping (nominal): only through extends/implements
            (Type::Class(_), Type::Class(_)) => {
                if self.type_ctx.is_interface(sup) {
                    self.type_ctx.implements(sub, sup)
                } else {
                    self.type_ctx.superclass_chain(sub).contains(&sup)
                }
            }

            _ => false,
        }
    }

    /// Least common supertype of two types, used for conditional expressions
    pub fn common_supertype(&self, a: TypeId, b: TypeId) -> TypeId {
        if self.is_subtype(a, b) {
            return b;
        }
        if self.is_subtype(b, a) {
            return a;
        }
        let wk = self.type_ctx.well_known();
        if self.type_ctx.is_primitive(a) || self.type_ctx.is_primitive(b) {
            return wk.dynamic;
        }
        self.type_ctx
            .superclass_chain(a)
            .into_iter()
            .find(|&candidate| self.is_subtype(b, candidate))
            .unwrap_or(wk.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TypeContext;

    #[test]
    fn test_reflexivity() {
        let ctx = TypeContext::new();
        let int = ctx.well_known().int;
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(sub_ctx.is_subtype(int, int));
    }

    #[test]
    fn test_primitive_subtyping() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known();
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(!sub_ctx.is_subtype(wk.int, wk.long));
        assert!(!sub_ctx.is_subtype(wk.int, wk.object));
        assert!(!sub_ctx.is_subtype(wk.null, wk.int));
    }

    #[test]
    fn test_null_is_bottom_for_references() {
        let ctx = TypeContext::new();
        let wk = ctx.well_known();
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(sub_ctx.is_subtype(wk.null, wk.string));
        assert!(sub_ctx.is_subtype(wk.null, wk.list));
    }

    #[test]
    fn test_class_and_interface_subtyping() {
        let mut ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let shape = ctx.declare_class("Shape");
        let circle = ctx.declare_class("Circle");
        ctx.set_supertypes(circle, Some(shape), vec![wk.comparable], false)
            .unwrap();
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(sub_ctx.is_subtype(circle, shape));
        assert!(sub_ctx.is_subtype(circle, wk.object));
        assert!(sub_ctx.is_subtype(circle, wk.comparable));
        assert!(!sub_ctx.is_subtype(shape, circle));
        assert!(sub_ctx.is_subtype(wk.range, wk.iterable));
    }

    #[test]
    fn test_array_subtyping() {
        let mut ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let strings = ctx.array_of(wk.string);
        let objects = ctx.array_of(wk.object);
        let ints = ctx.array_of(wk.int);
        let longs = ctx.array_of(wk.long);
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(sub_ctx.is_subtype(strings, objects));
        assert!(!sub_ctx.is_subtype(objects, strings));
        assert!(!sub_ctx.is_subtype(ints, longs));
        assert!(sub_ctx.is_subtype(ints, wk.object));
    }

    #[test]
    fn test_generic_subtyping() {
        let mut ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let list_of_string = ctx.generic(wk.list, vec![wk.string]);
        let list_of_int = ctx.generic(wk.list, vec![wk.int]);
        let sub_ctx = SubtypingContext::new(&ctx);

        assert!(sub_ctx.is_subtype(list_of_string, wk.list));
        assert!(sub_ctx.is_subtype(list_of_string, wk.iterable));
        assert!(!sub_ctx.is_subtype(list_of_string, list_of_int));
    }

    #[test]
    fn test_common_supertype() {
        let mut ctx = TypeContext::new();
        let wk = ctx.well_known().clone();
        let shape = ctx.declare_class("Shape");
        let circle = ctx.declare_class("Circle");
        let square = ctx.declare_class("Square");
        ctx.set_supertypes(circle, Some(shape), vec![], false).unwrap();
        ctx.set_supertypes(square, Some(shape), vec![], false).unwrap();
        let sub_ctx = SubtypingContext::new(&ctx);

        assert_eq!(sub_ctx.common_supertype(circle, square), shape);
        assert_eq!(sub_ctx.common_supertype(circle, wk.null), circle);
        assert_eq!(sub_ctx.common_supertype(wk.string, circle), wk.object);
    }
}
