//! Expression AST nodes
//!
//! Every expression is an [`Expression`] wrapper carrying a [`NodeId`] and a
//! [`Span`] around a tagged [`ExprKind`]. The checker keys its side tables by
//! node id, so ids must be unique within a source unit (see
//! [`renumber`](crate::renumber)).

use crate::statement::Block;
use crate::{NodeId, Param, Span, TypeRef};
use serde::{Deserialize, Serialize};

/// Expression (produces a value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Node identity for checker side tables
    #[serde(default)]
    pub id: NodeId,
    /// Source location
    #[serde(default)]
    pub span: Span,
    /// What kind of expression this is
    pub kind: ExprKind,
}

/// Expression variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    /// Literal constant
    Literal(Literal),

    /// Local variable, parameter or implicit `this` property
    Variable {
        /// Variable name
        name: String,
    },

    /// `this`
    This,

    /// Binary operation: `left op right`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },

    /// Unary operation: `op operand`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },

    /// Instance method call: `receiver.method(args)`
    MethodCall {
        /// Receiver expression
        receiver: Box<Expression>,
        /// Method name
        method: String,
        /// Arguments
        args: Vec<Expression>,
    },

    /// Static method call: `Owner.method(args)`
    StaticCall {
        /// Owning class name
        owner: String,
        /// Method name
        method: String,
        /// Arguments
        args: Vec<Expression>,
    },

    /// Call of a callable value: `callee(args)` (closure invocation)
    Call {
        /// Callee expression
        callee: Box<Expression>,
        /// Arguments
        args: Vec<Expression>,
    },

    /// Property read: `object.name`
    Property {
        /// Object expression
        object: Box<Expression>,
        /// Property name
        name: String,
    },

    /// Subscript: `object[index]`
    Index {
        /// Indexed expression
        object: Box<Expression>,
        /// Index expression
        index: Box<Expression>,
    },

    /// Assignment: `target = value`
    Assign {
        /// Variable, property or index expression
        target: Box<Expression>,
        /// Assigned value
        value: Box<Expression>,
    },

    /// Closure literal: `{ params -> body }`
    Closure {
        /// Declared parameters
        params: Vec<Param>,
        /// Body
        body: Block,
    },

    /// List literal: `[a, b, c]`
    List {
        /// Elements
        elements: Vec<Expression>,
    },

    /// Range literal: `from..to` or `from..<to`
    Range {
        /// Lower bound expression
        from: Box<Expression>,
        /// Upper bound expression
        to: Box<Expression>,
        /// Whether `to` is excluded
        exclusive: bool,
    },

    /// Array literal: `new T[] { a, b }`
    Array {
        /// Component type
        element_type: TypeRef,
        /// Elements
        elements: Vec<Expression>,
    },

    /// Constructor call: `new C(args)`
    New {
        /// Class name
        class: String,
        /// Arguments
        args: Vec<Expression>,
    },

    /// Explicit conversion: `(T) expr`
    Cast {
        /// Target type
        ty: TypeRef,
        /// Converted expression
        expr: Box<Expression>,
    },

    /// Conditional: `cond ? then : otherwise`
    Ternary {
        /// Condition
        cond: Box<Expression>,
        /// Value when true
        then: Box<Expression>,
        /// Value when false
        otherwise: Box<Expression>,
    },
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// `42`
    Int(i32),
    /// `42L`
    Long(i64),
    /// `1.5f`
    Float(f32),
    /// `1.5d`
    Double(f64),
    /// `42G` (decimal digits)
    BigInteger(String),
    /// `1.5G` (decimal digits with optional fraction)
    BigDecimal(String),
    /// `'c'`
    Char(char),
    /// `"text"`
    String(String),
}

impl Literal {
    /// Short name of the literal kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Boolean(_) => "boolean",
            Literal::Int(_) => "int",
            Literal::Long(_) => "long",
            Literal::Float(_) => "float",
            Literal::Double(_) => "double",
            Literal::BigInteger(_) => "BigInteger",
            Literal::BigDecimal(_) => "BigDecimal",
            Literal::Char(_) => "char",
            Literal::String(_) => "String",
        }
    }

    /// Render the value as string concatenation would
    pub fn to_display_string(&self) -> String {
        match self {
            Literal::Null => "null".to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Long(l) => l.to_string(),
            Literal::Float(f) => format_floating(*f as f64),
            Literal::Double(d) => format_floating(*d),
            Literal::BigInteger(s) | Literal::BigDecimal(s) => s.clone(),
            Literal::Char(c) => c.to_string(),
            Literal::String(s) => s.clone(),
        }
    }
}

/// Floating values always show a fractional part (`1.0`, not `1`)
pub fn format_floating(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Name of the method an operator dispatches to on non-primitive operands
    pub fn method_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "plus",
            BinaryOp::Sub => "minus",
            BinaryOp::Mul => "multiply",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "mod",
            BinaryOp::Eq | BinaryOp::Ne => "equals",
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => "compareTo",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// `+ - * / %`
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    /// `== != < <= > >=`
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// `&& ||`
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

impl Expression {
    /// Wrap a kind with an id and span
    pub fn new(id: NodeId, span: Span, kind: ExprKind) -> Self {
        Self { id, span, kind }
    }

    /// Check if this expression is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    /// The literal value, if this is a literal
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Direct child expressions in evaluation order
    ///
    /// Closure bodies are not included; they are statements, not children.
    pub fn children(&self) -> Vec<&Expression> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable { .. } | ExprKind::This => vec![],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::MethodCall { receiver, args, .. } => {
                std::iter::once(receiver.as_ref()).chain(args.iter()).collect()
            }
            ExprKind::StaticCall { args, .. } | ExprKind::New { args, .. } => args.iter().collect(),
            ExprKind::Call { callee, args } => {
                std::iter::once(callee.as_ref()).chain(args.iter()).collect()
            }
            ExprKind::Property { object, .. } => vec![object],
            ExprKind::Index { object, index } => vec![object, index],
            ExprKind::Assign { target, value } => vec![target, value],
            ExprKind::Closure { .. } => vec![],
            ExprKind::List { elements } | ExprKind::Array { elements, .. } => {
                elements.iter().collect()
            }
            ExprKind::Range { from, to, .. } => vec![from, to],
            ExprKind::Cast { expr, .. } => vec![expr],
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Double(1.0).to_display_string(), "1.0");
        assert_eq!(Literal::Float(2.5).to_display_string(), "2.5");
        assert_eq!(Literal::Long(22222222).to_display_string(), "22222222");
        assert_eq!(Literal::Char('x').to_display_string(), "x");
    }

    #[test]
    fn test_operator_methods() {
        assert_eq!(BinaryOp::Add.method_name(), "plus");
        assert_eq!(BinaryOp::Lt.method_name(), "compareTo");
        assert!(BinaryOp::Rem.is_arithmetic());
        assert!(BinaryOp::Ge.is_comparison());
        assert!(BinaryOp::Or.is_logical());
    }

    #[test]
    fn test_children_order() {
        let lit = |v| Expression::new(NodeId(v), Span::default(), ExprKind::Literal(Literal::Int(v as i32)));
        let call = Expression::new(
            NodeId(9),
            Span::default(),
            ExprKind::MethodCall {
                receiver: Box::new(lit(1)),
                method: "plus".into(),
                args: vec![lit(2), lit(3)],
            },
        );
        let ids: Vec<u32> = call.children().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
