//! Kestrel Type System
//!
//! Type identities, the numeric promotion lattice, scalar coercions and the
//! `next`/`previous` successor rules shared by the checker, the emitter and
//! the runtime.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod coercion;
pub mod context;
pub mod error;
pub mod numeric;
pub mod subtyping;
pub mod successor;
pub mod ty;

pub use coercion::{
    implicit_narrowing_allowed, plan_coercion, plan_type_coercion, CoercionKind, CoercionPlan,
    CoercionStep, ConstantValue, Scalar, ScalarKind,
};
pub use context::{TypeContext, WellKnown};
pub use error::TypeError;
pub use numeric::{is_widening, promote, NumericKind};
pub use subtyping::SubtypingContext;
pub use ty::{ClassHierarchy, ClassType, GenericType, PrimitiveKind, Type, TypeId, TypeVar};
