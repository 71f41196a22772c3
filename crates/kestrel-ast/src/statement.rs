//! Statement AST nodes

use crate::{Expression, NodeId, Span, TypeRef};
use serde::{Deserialize, Serialize};

/// Statement (performs an action)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Expression evaluated for its effect
    Expression(Expression),

    /// Local variable declaration: `T name = init`
    VarDecl {
        /// Node identity
        #[serde(default)]
        id: NodeId,
        /// Variable name
        name: String,
        /// Declared type (`def` when omitted)
        #[serde(default)]
        ty: TypeRef,
        /// Initializer
        #[serde(default)]
        init: Option<Expression>,
        /// Source location
        #[serde(default)]
        span: Span,
    },

    /// `if (cond) then else otherwise`
    If {
        /// Condition
        cond: Expression,
        /// Taken branch
        then: Block,
        /// Optional else branch
        #[serde(default)]
        otherwise: Option<Block>,
        /// Source location
        #[serde(default)]
        span: Span,
    },

    /// `while (cond) body`
    While {
        /// Condition
        cond: Expression,
        /// Loop body
        body: Block,
        /// Source location
        #[serde(default)]
        span: Span,
    },

    /// `for (T var in iterable) body`
    ForIn {
        /// Node identity (keys the loop-form classification)
        #[serde(default)]
        id: NodeId,
        /// Loop variable name
        var_name: String,
        /// Declared loop variable type (`def` when omitted)
        #[serde(default)]
        var_type: TypeRef,
        /// Source expression
        iterable: Expression,
        /// Loop body
        body: Block,
        /// Source location
        #[serde(default)]
        span: Span,
    },

    /// `return value`
    Return {
        /// Returned value
        #[serde(default)]
        value: Option<Expression>,
        /// Source location
        #[serde(default)]
        span: Span,
    },

    /// Nested block
    Block(Block),

    /// `break`
    Break(Span),

    /// `continue`
    Continue(Span),
}

/// Sequence of statements with its own scope
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Statements in order
    pub statements: Vec<Statement>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

impl Block {
    /// Block from statements
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            span: Span::default(),
        }
    }
}

impl Statement {
    /// Source location of the statement
    pub fn span(&self) -> Span {
        match self {
            Statement::Expression(expr) => expr.span,
            Statement::VarDecl { span, .. }
            | Statement::If { span, .. }
            | Statement::While { span, .. }
            | Statement::ForIn { span, .. }
            | Statement::Return { span, .. } => *span,
            Statement::Block(block) => block.span,
            Statement::Break(span) | Statement::Continue(span) => *span,
        }
    }
}
