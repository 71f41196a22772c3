//! Kestrel Runtime
//!
//! This crate provides the runtime half of the language:
//! - Values, the boxed numeric tower, ranges and tuples
//! - Metaclasses with versioned method tables and a process-wide registry
//! - Thread-scoped category and trait overlays
//! - Polymorphic call-site and field-site caches
//! - A bytecode interpreter for verified class files

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builtins;
pub mod callsite;
pub mod decimal;
pub mod field_site;
pub mod interp;
pub mod invoke;
pub mod metaclass;
pub mod numeric;
pub mod overlay;
pub mod range;
pub mod registry;
pub mod tuple;
pub mod value;

pub use callsite::{ArgShape, CallSite, CallSiteTable, SiteCounters, SiteId};
pub use decimal::BigDecimal;
pub use field_site::{FieldSite, PropertyAccess, PropertyMode};
pub use interp::{CapturedOutput, Interpreter, LoadedClass};
pub use invoke::{invoke, Invoker, NativeInvoker};
pub use metaclass::{Implementation, MetaClass, MethodTarget, NativeFn};
pub use overlay::{activate, Overlay, OverlayGuard, OverlayKind};
pub use range::ObjectRange;
pub use registry::{ChainStamp, MetaClassRegistry};
pub use tuple::Tuple;
pub use value::{ArrayValue, Closure, Cursor, Instance, Value};

use kestrel_bytecode::{DecodeError, VerifyError};
use kestrel_types::TypeError;

/// Runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No method matched a dispatch
    #[error("No signature of method: {receiver}.{method}() is applicable for argument types: ({args})")]
    NoSuchMethod {
        /// Receiver class
        receiver: String,
        /// Method name
        method: String,
        /// Coarse argument shapes
        args: String,
    },

    /// No field, getter or setter matched a property access
    #[error("No such property: {property} for class: {receiver}")]
    NoSuchProperty {
        /// Receiver class
        receiver: String,
        /// Property name
        property: String,
    },

    /// Null used where an object is required
    #[error("Cannot invoke {member} on a null object")]
    NullReceiver {
        /// Method or property being accessed
        member: String,
    },

    /// Null unboxed or dereferenced
    #[error("Null pointer: {0}")]
    NullPointer(String),

    /// Class not loaded and not built in
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Failed cast
    #[error("Cannot cast object '{value}' with class '{class}' to class '{target}'")]
    ClassCast {
        /// Rendered value
        value: String,
        /// Runtime class
        class: String,
        /// Requested type
        target: String,
    },

    /// Division by zero and similar
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Index outside a sequence
    #[error("Index {index} out of bounds for length {size}")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Sequence length
        size: usize,
    },

    /// Bad argument to a range, tuple or builtin
    #[error("{0}")]
    IllegalArgument(String),

    /// Values with no common ordering
    #[error("Cannot compare {left} with {right}")]
    Incomparable {
        /// Left class
        left: String,
        /// Right class
        right: String,
    },

    /// Operation not supported by the receiver
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Wrong number of arguments for a closure or constructor
    #[error("{callable} expects {expected} arguments but got {actual}")]
    ArityMismatch {
        /// Callable name
        callable: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Call depth limit exceeded
    #[error("Stack overflow at call depth {0}")]
    StackOverflow(usize),

    /// Operand stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Malformed code that slipped past verification
    #[error("Invalid bytecode: {0}")]
    InvalidBytecode(String),

    /// Class failed verification on load
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Code could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Successor or coercion failure
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Output failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;
