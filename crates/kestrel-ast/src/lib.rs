//! Kestrel AST
//!
//! The tree handed to the checker by the (external) parser. Nodes are plain
//! tagged variants; expressions and loop statements carry a [`NodeId`] that
//! the checker and emitter use to key their side tables.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod decl;
pub mod expression;
pub mod span;
pub mod statement;

pub use builder::{renumber, AstBuilder};
pub use decl::{ClassDecl, CompileMode, FieldDecl, MethodDecl, Param, SourceUnit, TypeRef};
pub use expression::{format_floating, BinaryOp, ExprKind, Expression, Literal, UnaryOp};
pub use span::Span;
pub use statement::{Block, Statement};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an AST node within its source unit
///
/// `NodeId(0)` means "not yet assigned"; [`renumber`] replaces it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
