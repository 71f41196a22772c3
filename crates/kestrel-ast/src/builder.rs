//! Id-assigning AST construction
//!
//! The parser is an external collaborator; tools and tests build trees through
//! [`AstBuilder`], and units read from JSON go through [`renumber`] so that
//! every node has a unique id.

use crate::{
    BinaryOp, Block, ClassDecl, Expression, ExprKind, Literal, NodeId, Param, SourceUnit, Span,
    Statement, TypeRef, UnaryOp,
};

/// Hands out fresh node ids while building expressions
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    /// Builder whose first id is 1 (0 is the unassigned id)
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Builder continuing after the largest id in `unit`
    pub fn after(unit: &SourceUnit) -> Self {
        let mut max = 0;
        visit_unit_ids(unit, &mut |id| max = max.max(id.0));
        Self { next_id: max + 1 }
    }

    /// Allocate a fresh id
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Expression with a fresh id and no location
    pub fn expr(&mut self, kind: ExprKind) -> Expression {
        Expression::new(self.next_id(), Span::default(), kind)
    }

    /// Literal expression
    pub fn lit(&mut self, lit: Literal) -> Expression {
        self.expr(ExprKind::Literal(lit))
    }

    /// `int` literal
    pub fn int(&mut self, value: i32) -> Expression {
        self.lit(Literal::Int(value))
    }

    /// `long` literal
    pub fn long(&mut self, value: i64) -> Expression {
        self.lit(Literal::Long(value))
    }

    /// `double` literal
    pub fn double(&mut self, value: f64) -> Expression {
        self.lit(Literal::Double(value))
    }

    /// String literal
    pub fn string(&mut self, value: &str) -> Expression {
        self.lit(Literal::String(value.to_string()))
    }

    /// Boolean literal
    pub fn boolean(&mut self, value: bool) -> Expression {
        self.lit(Literal::Boolean(value))
    }

    /// `null`
    pub fn null(&mut self) -> Expression {
        self.lit(Literal::Null)
    }

    /// Variable reference
    pub fn var(&mut self, name: &str) -> Expression {
        self.expr(ExprKind::Variable {
            name: name.to_string(),
        })
    }

    /// `this`
    pub fn this(&mut self) -> Expression {
        self.expr(ExprKind::This)
    }

    /// Binary operation
    pub fn binary(&mut self, op: BinaryOp, left: Expression, right: Expression) -> Expression {
        self.expr(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Unary operation
    pub fn unary(&mut self, op: UnaryOp, operand: Expression) -> Expression {
        self.expr(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Instance call
    pub fn call(&mut self, receiver: Expression, method: &str, args: Vec<Expression>) -> Expression {
        self.expr(ExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: method.to_string(),
            args,
        })
    }

    /// Static call
    pub fn static_call(&mut self, owner: &str, method: &str, args: Vec<Expression>) -> Expression {
        self.expr(ExprKind::StaticCall {
            owner: owner.to_string(),
            method: method.to_string(),
            args,
        })
    }

    /// Call of a callable value
    pub fn invoke(&mut self, callee: Expression, args: Vec<Expression>) -> Expression {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// Property read
    pub fn property(&mut self, object: Expression, name: &str) -> Expression {
        self.expr(ExprKind::Property {
            object: Box::new(object),
            name: name.to_string(),
        })
    }

    /// Subscript
    pub fn index(&mut self, object: Expression, index: Expression) -> Expression {
        self.expr(ExprKind::Index {
            object: Box::new(object),
            index: Box::new(index),
        })
    }

    /// Assignment
    pub fn assign(&mut self, target: Expression, value: Expression) -> Expression {
        self.expr(ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Closure literal
    pub fn closure(&mut self, params: Vec<Param>, body: Vec<Statement>) -> Expression {
        self.expr(ExprKind::Closure {
            params,
            body: Block::new(body),
        })
    }

    /// List literal
    pub fn list(&mut self, elements: Vec<Expression>) -> Expression {
        self.expr(ExprKind::List { elements })
    }

    /// Range literal
    pub fn range(&mut self, from: Expression, to: Expression, exclusive: bool) -> Expression {
        self.expr(ExprKind::Range {
            from: Box::new(from),
            to: Box::new(to),
            exclusive,
        })
    }

    /// Array literal
    pub fn array(&mut self, element_type: TypeRef, elements: Vec<Expression>) -> Expression {
        self.expr(ExprKind::Array {
            element_type,
            elements,
        })
    }

    /// Constructor call
    pub fn new_object(&mut self, class: &str, args: Vec<Expression>) -> Expression {
        self.expr(ExprKind::New {
            class: class.to_string(),
            args,
        })
    }

    /// Cast
    pub fn cast(&mut self, ty: TypeRef, expr: Expression) -> Expression {
        self.expr(ExprKind::Cast {
            ty,
            expr: Box::new(expr),
        })
    }

    /// Ternary
    pub fn ternary(
        &mut self,
        cond: Expression,
        then: Expression,
        otherwise: Expression,
    ) -> Expression {
        self.expr(ExprKind::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Local declaration
    pub fn var_decl(&mut self, name: &str, ty: TypeRef, init: Option<Expression>) -> Statement {
        Statement::VarDecl {
            id: self.next_id(),
            name: name.to_string(),
            ty,
            init,
            span: Span::default(),
        }
    }

    /// For-in loop
    pub fn for_in(
        &mut self,
        var_name: &str,
        var_type: TypeRef,
        iterable: Expression,
        body: Vec<Statement>,
    ) -> Statement {
        Statement::ForIn {
            id: self.next_id(),
            var_name: var_name.to_string(),
            var_type,
            iterable,
            body: Block::new(body),
            span: Span::default(),
        }
    }
}

/// Reassign every node id in `unit` in traversal order, starting at 1
pub fn renumber(unit: &mut SourceUnit) {
    let mut builder = AstBuilder::new();
    for class in &mut unit.classes {
        renumber_class(class, &mut builder);
    }
}

fn renumber_class(class: &mut ClassDecl, builder: &mut AstBuilder) {
    for field in &mut class.fields {
        if let Some(init) = &mut field.init {
            renumber_expr(init, builder);
        }
    }
    for method in &mut class.methods {
        renumber_block(&mut method.body, builder);
    }
}

fn renumber_block(block: &mut Block, builder: &mut AstBuilder) {
    for stmt in &mut block.statements {
        renumber_stmt(stmt, builder);
    }
}

fn renumber_stmt(stmt: &mut Statement, builder: &mut AstBuilder) {
    match stmt {
        Statement::Expression(expr) => renumber_expr(expr, builder),
        Statement::VarDecl { id, init, .. } => {
            *id = builder.next_id();
            if let Some(init) = init {
                renumber_expr(init, builder);
            }
        }
        Statement::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            renumber_expr(cond, builder);
            renumber_block(then, builder);
            if let Some(otherwise) = otherwise {
                renumber_block(otherwise, builder);
            }
        }
        Statement::While { cond, body, .. } => {
            renumber_expr(cond, builder);
            renumber_block(body, builder);
        }
        Statement::ForIn {
            id, iterable, body, ..
        } => {
            *id = builder.next_id();
            renumber_expr(iterable, builder);
            renumber_block(body, builder);
        }
        Statement::Return { value, .. } => {
            if let Some(value) = value {
                renumber_expr(value, builder);
            }
        }
        Statement::Block(block) => renumber_block(block, builder),
        Statement::Break(_) | Statement::Continue(_) => {}
    }
}

fn renumber_expr(expr: &mut Expression, builder: &mut AstBuilder) {
    expr.id = builder.next_id();
    match &mut expr.kind {
        ExprKind::Literal(_) | ExprKind::Variable { .. } | ExprKind::This => {}
        ExprKind::Binary { left, right, .. } => {
            renumber_expr(left, builder);
            renumber_expr(right, builder);
        }
        ExprKind::Unary { operand, .. } => renumber_expr(operand, builder),
        ExprKind::MethodCall { receiver, args, .. } => {
            renumber_expr(receiver, builder);
            args.iter_mut().for_each(|a| renumber_expr(a, builder));
        }
        ExprKind::StaticCall { args, .. } | ExprKind::New { args, .. } => {
            args.iter_mut().for_each(|a| renumber_expr(a, builder));
        }
        ExprKind::Call { callee, args } => {
            renumber_expr(callee, builder);
            args.iter_mut().for_each(|a| renumber_expr(a, builder));
        }
        ExprKind::Property { object, .. } => renumber_expr(object, builder),
        ExprKind::Index { object, index } => {
            renumber_expr(object, builder);
            renumber_expr(index, builder);
        }
        ExprKind::Assign { target, value } => {
            renumber_expr(target, builder);
            renumber_expr(value, builder);
        }
        ExprKind::Closure { body, .. } => renumber_block(body, builder),
        ExprKind::List { elements } | ExprKind::Array { elements, .. } => {
            elements.iter_mut().for_each(|e| renumber_expr(e, builder));
        }
        ExprKind::Range { from, to, .. } => {
            renumber_expr(from, builder);
            renumber_expr(to, builder);
        }
        ExprKind::Cast { expr, .. } => renumber_expr(expr, builder),
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            renumber_expr(cond, builder);
            renumber_expr(then, builder);
            renumber_expr(otherwise, builder);
        }
    }
}

fn visit_unit_ids(unit: &SourceUnit, f: &mut impl FnMut(NodeId)) {
    fn block(b: &Block, f: &mut impl FnMut(NodeId)) {
        b.statements.iter().for_each(|s| stmt(s, f));
    }
    fn stmt(s: &Statement, f: &mut impl FnMut(NodeId)) {
        match s {
            Statement::Expression(e) => expr(e, f),
            Statement::VarDecl { id, init, .. } => {
                f(*id);
                if let Some(e) = init {
                    expr(e, f);
                }
            }
            Statement::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                expr(cond, f);
                block(then, f);
                if let Some(b) = otherwise {
                    block(b, f);
                }
            }
            Statement::While { cond, body, .. } => {
                expr(cond, f);
                block(body, f);
            }
            Statement::ForIn {
                id, iterable, body, ..
            } => {
                f(*id);
                expr(iterable, f);
                block(body, f);
            }
            Statement::Return { value, .. } => {
                if let Some(e) = value {
                    expr(e, f);
                }
            }
            Statement::Block(b) => block(b, f),
            Statement::Break(_) | Statement::Continue(_) => {}
        }
    }
    fn expr(e: &Expression, f: &mut impl FnMut(NodeId)) {
        f(e.id);
        if let ExprKind::Closure { body, .. } = &e.kind {
            block(body, f);
        }
        e.children().into_iter().for_each(|c| expr(c, f));
    }

    for class in &unit.classes {
        for field in &class.fields {
            if let Some(init) = &field.init {
                expr(init, f);
            }
        }
        for method in &class.methods {
            block(&method.body, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompileMode, MethodDecl};

    fn unit_with(body: Vec<Statement>) -> SourceUnit {
        SourceUnit {
            name: "Test".into(),
            path: None,
            source: None,
            classes: vec![ClassDecl {
                name: "Test".into(),
                superclass: None,
                interfaces: vec![],
                mode: CompileMode::Static,
                fields: vec![],
                methods: vec![MethodDecl {
                    name: "main".into(),
                    params: vec![],
                    return_type: TypeRef::named("void"),
                    is_static: true,
                    body: Block::new(body),
                    span: Span::default(),
                }],
                span: Span::default(),
            }],
        }
    }

    #[test]
    fn test_builder_ids_are_unique() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let two = b.int(2);
        let sum = b.binary(BinaryOp::Add, one, two);
        let ids: Vec<u32> = sum.children().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(sum.id, NodeId(3));
    }

    #[test]
    fn test_renumber_assigns_fresh_ids() {
        let zero = |kind| Expression::new(NodeId::default(), Span::default(), kind);
        let sum = zero(ExprKind::Binary {
            op: BinaryOp::Add,
            left: Box::new(zero(ExprKind::Literal(Literal::Int(1)))),
            right: Box::new(zero(ExprKind::Literal(Literal::Int(2)))),
        });
        let mut unit = unit_with(vec![Statement::Expression(sum)]);
        renumber(&mut unit);

        let mut ids = Vec::new();
        visit_unit_ids(&unit, &mut |id| ids.push(id.0));
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(AstBuilder::after(&unit).next_id(), NodeId(4));
    }
}
