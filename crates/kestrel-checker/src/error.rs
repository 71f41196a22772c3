//! Error types for annotation
//!
//! Provides structured error types with source locations. Errors are
//! collected, never thrown: one bad node does not stop the walk.

use kestrel_ast::Span;
use thiserror::Error;

/// Errors that can occur while annotating a unit
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CheckError {
    /// Variable name not found in scope
    #[error("Undefined variable '{name}'")]
    UndefinedVariable {
        /// Variable name
        name: String,
        /// Location of the reference
        span: Span,
    },

    /// Type name not found
    #[error("Undefined type '{name}'")]
    UndefinedType {
        /// Type name
        name: String,
        /// Location of the reference
        span: Span,
    },

    /// Local declared twice in the same scope
    #[error("Variable '{name}' is already defined in this scope")]
    DuplicateVariable {
        /// Variable name
        name: String,
        /// Location of the second declaration
        span: Span,
    },

    /// No method with a matching name and applicable arguments
    #[error("Cannot find method '{method}({args})' on type '{ty}'")]
    MethodNotFound {
        /// Method name
        method: String,
        /// Receiver type
        ty: String,
        /// Argument types, comma separated
        args: String,
        /// Location of the call
        span: Span,
    },

    /// Several equally specific overloads apply
    #[error("Ambiguous call to '{method}' on type '{ty}'")]
    AmbiguousMethod {
        /// Method name
        method: String,
        /// Receiver type
        ty: String,
        /// Signatures of the competing candidates
        candidates: Vec<String>,
        /// Location of the call
        span: Span,
    },

    /// Property is neither a field nor a getter
    #[error("Property '{property}' does not exist on type '{ty}'")]
    PropertyNotFound {
        /// Property name
        property: String,
        /// Receiver type
        ty: String,
        /// Location of the access
        span: Span,
    },

    /// Value of a type that cannot be called
    #[error("Type '{ty}' is not callable")]
    NotCallable {
        /// Callee type
        ty: String,
        /// Location of the call
        span: Span,
    },

    /// Value cannot be assigned to the target type
    #[error("Cannot assign value of type '{actual}' to '{expected}'")]
    IncompatibleAssignment {
        /// Target type
        expected: String,
        /// Value type
        actual: String,
        /// Location of the value
        span: Span,
    },

    /// Explicit cast between unrelated or incompatible types
    #[error("Cannot cast '{from}' to '{to}'")]
    InvalidCast {
        /// Source type
        from: String,
        /// Target type
        to: String,
        /// Location of the cast
        span: Span,
    },

    /// Returned value does not match the declared return type
    #[error("Return type mismatch: expected {expected}, got {actual}")]
    ReturnTypeMismatch {
        /// Declared type
        expected: String,
        /// Returned type
        actual: String,
        /// Location of the return
        span: Span,
    },

    /// Operator applied to operands it does not support
    #[error("Operator '{op}' cannot be applied to '{left}' and '{right}'")]
    InvalidBinaryOp {
        /// Operator symbol
        op: String,
        /// Left operand type
        left: String,
        /// Right operand type
        right: String,
        /// Location of the operation
        span: Span,
    },

    /// Unary operator applied to an unsupported operand
    #[error("Operator '{op}' cannot be applied to '{ty}'")]
    InvalidUnaryOp {
        /// Operator symbol
        op: String,
        /// Operand type
        ty: String,
        /// Location of the operation
        span: Span,
    },

    /// Subscript on a value that is not indexable
    #[error("Type '{ty}' cannot be indexed")]
    NotIndexable {
        /// Indexed type
        ty: String,
        /// Location of the subscript
        span: Span,
    },

    /// Range literal whose bounds can never be enumerated
    #[error("Invalid range: {reason}")]
    InvalidRange {
        /// Why the bounds are rejected
        reason: String,
        /// Location of the range
        span: Span,
    },

    /// `this` used in a static method
    #[error("'this' cannot be used in a static context")]
    ThisInStaticContext {
        /// Location of `this`
        span: Span,
    },

    /// Invalid superclass or interface list
    #[error("Invalid class hierarchy: {message}")]
    InvalidHierarchy {
        /// What is wrong
        message: String,
        /// Location of the class
        span: Span,
    },

    /// Assignment to something that is not a variable, property or element
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget {
        /// Location of the target
        span: Span,
    },

    /// Break outside of loop
    #[error("Break statement outside of loop")]
    BreakOutsideLoop {
        /// Location of break
        span: Span,
    },

    /// Continue outside of loop
    #[error("Continue statement outside of loop")]
    ContinueOutsideLoop {
        /// Location of continue
        span: Span,
    },
}

impl CheckError {
    /// Primary location of the error
    pub fn span(&self) -> Span {
        use CheckError::*;
        match self {
            UndefinedVariable { span, .. }
            | UndefinedType { span, .. }
            | DuplicateVariable { span, .. }
            | MethodNotFound { span, .. }
            | AmbiguousMethod { span, .. }
            | PropertyNotFound { span, .. }
            | NotCallable { span, .. }
            | IncompatibleAssignment { span, .. }
            | InvalidCast { span, .. }
            | ReturnTypeMismatch { span, .. }
            | InvalidBinaryOp { span, .. }
            | InvalidUnaryOp { span, .. }
            | NotIndexable { span, .. }
            | InvalidRange { span, .. }
            | ThisInStaticContext { span }
            | InvalidHierarchy { span, .. }
            | InvalidAssignmentTarget { span }
            | BreakOutsideLoop { span }
            | ContinueOutsideLoop { span } => *span,
        }
    }
}

/// Warning codes for check warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// Member not found on a known receiver; dispatched at runtime (W1001)
    DynamicFallback,
    /// Assignment checked at runtime instead of compile time (W1002)
    UncheckedAssignment,
}

impl WarningCode {
    /// Get the warning code string (e.g., "W1001")
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::DynamicFallback => "W1001",
            WarningCode::UncheckedAssignment => "W1002",
        }
    }
}

/// Warnings emitted in dynamic-mode classes where a static class would fail
#[derive(Debug, Clone, PartialEq)]
pub enum CheckWarning {
    /// Member could not be resolved; the node uses runtime dispatch
    DynamicFallback {
        /// What could not be resolved (`method 'foo'`, `property 'bar'`, ...)
        member: String,
        /// Receiver type
        ty: String,
        /// Location of the node
        span: Span,
    },

    /// Value type is not statically assignable; converted at runtime
    UncheckedAssignment {
        /// Target type
        expected: String,
        /// Value type
        actual: String,
        /// Location of the value
        span: Span,
    },
}

impl CheckWarning {
    /// Get the primary span associated with this warning
    pub fn span(&self) -> Span {
        match self {
            CheckWarning::DynamicFallback { span, .. } => *span,
            CheckWarning::UncheckedAssignment { span, .. } => *span,
        }
    }

    /// Get the warning code for this warning
    pub fn code(&self) -> WarningCode {
        match self {
            CheckWarning::DynamicFallback { .. } => WarningCode::DynamicFallback,
            CheckWarning::UncheckedAssignment { .. } => WarningCode::UncheckedAssignment,
        }
    }

    /// One-line message
    pub fn message(&self) -> String {
        match self {
            CheckWarning::DynamicFallback { member, ty, .. } => {
                format!("Cannot resolve {} on type '{}'; using dynamic dispatch", member, ty)
            }
            CheckWarning::UncheckedAssignment {
                expected, actual, ..
            } => format!(
                "Assignment of '{}' to '{}' is checked at runtime",
                actual, expected
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_codes() {
        let span = Span::new(3, 7, 1, 4);
        let w = CheckWarning::DynamicFallback {
            member: "method 'foo'".into(),
            ty: "String".into(),
            span,
        };
        assert_eq!(w.code().as_str(), "W1001");
        assert_eq!(w.span(), span);
        assert!(w.message().contains("method 'foo'"));
    }

    #[test]
    fn test_error_span() {
        let span = Span::new(10, 15, 2, 1);
        let err = CheckError::BreakOutsideLoop { span };
        assert_eq!(err.span(), span);
        assert_eq!(err.to_string(), "Break statement outside of loop");
    }
}
