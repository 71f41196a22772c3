//! Kestrel Checker
//!
//! Annotates a Kestrel AST with types, resolved call targets, loop forms and
//! constant-folded literals for the bytecode emitter.
//!
//! This crate provides:
//! - Builtin and declared class tables with overload resolution
//! - A single-pass annotator with per-node inference state
//! - Constant folding of literal operands
//! - Diagnostics rendered through codespan
//!
//! # Usage
//!
//! ```ignore
//! use kestrel_checker::{annotate, ClassTable};
//! use kestrel_types::TypeContext;
//!
//! let mut ctx = TypeContext::new();
//! let mut classes = ClassTable::with_builtins(&mut ctx);
//! let declare_errors = classes.declare_unit(&mut ctx, &unit);
//! let result = annotate(&mut ctx, &classes, &mut unit);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod annotations;
pub mod annotator;
pub mod class_table;
pub mod diagnostic;
pub mod error;
pub mod fold;
pub mod resolve;

pub use annotations::{
    Annotations, ClosureInfo, LocalId, LocalInfo, LoopForm, MethodKey, NodeState,
};
pub use annotator::{annotate, Annotator, CheckResult};
pub use class_table::{
    method_descriptor, resolve_type_ref, CallKind, ClassInfo, ClassTable, FieldTarget,
    MethodTarget,
};
pub use diagnostic::{create_files, Diagnostic, ErrorCode};
pub use error::{CheckError, CheckWarning, WarningCode};
pub use resolve::{assignability, select_overload, Assignability, Resolution};
