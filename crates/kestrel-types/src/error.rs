//! Errors raised by the type lattice

use thiserror::Error;

/// Failure of a lattice, coercion or successor operation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// No coercion exists between two primitive-like types
    #[error("Incompatible types: cannot coerce {from} to {to}")]
    Incompatible {
        /// Source type name
        from: String,
        /// Target type name
        to: String,
    },

    /// A name that no interned type carries
    #[error("Unknown type {name}")]
    UndefinedType {
        /// Name looked up
        name: String,
    },

    /// Hierarchy operation applied to a non-class type
    #[error("{name} is not a class type")]
    NotAClass {
        /// Rendered type
        name: String,
    },

    /// Binding attempted on something other than a type variable
    #[error("{name} is not a type variable")]
    NotAPlaceholder {
        /// Rendered type
        name: String,
    },

    /// A placeholder was bound twice to different types
    #[error("Type variable {name} is already bound to {existing}, cannot bind to {attempted}")]
    PlaceholderRebound {
        /// Variable name
        name: String,
        /// Type it is bound to
        existing: String,
        /// Type of the rejected binding
        attempted: String,
    },

    /// A class that is its own ancestor
    #[error("Class hierarchy cycle: {cycle}")]
    CircularReference {
        /// The offending `extends` relation
        cycle: String,
    },

    /// Range bounds whose successor sequence never reaches the end
    #[error("Incompatible Strings for Range: {reason}")]
    IncompatibleRange {
        /// Which check failed
        reason: String,
    },

    /// `previous` of a value with no predecessor
    #[error("No predecessor for {value:?}: the string is empty")]
    NoPredecessor {
        /// Offending value
        value: String,
    },
}
