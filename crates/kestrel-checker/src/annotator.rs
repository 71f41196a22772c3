//! Annotation pass
//!
//! Walks a unit once, infers a type for every expression, resolves calls,
//! fields and loop forms, and folds constant operands in place. Results land
//! in [`Annotations`]. Errors and warnings are collected; a failing node gets
//! the dynamic type and the walk continues.
//!
//! Static-mode classes report unresolvable members as errors. Dynamic-mode
//! classes downgrade them to warnings and leave the node without a target, so
//! the emitter falls back to a runtime call site for that node alone.

use crate::annotations::{Annotations, ClosureInfo, LocalId, LoopForm, MethodKey, NodeState};
use crate::class_table::{resolve_type_ref, type_error_at, ClassTable, FieldTarget, MethodTarget};
use crate::error::{CheckError, CheckWarning};
use crate::fold::{fold_binary, fold_unary};
use crate::resolve::{assignability, select_overload, Assignability, Resolution};
use kestrel_ast::{
    BinaryOp, Block, ClassDecl, CompileMode, ExprKind, Expression, Literal, NodeId, Param,
    SourceUnit, Span, Statement, TypeRef, UnaryOp,
};
use kestrel_types::successor::check_string_range;
use kestrel_types::{
    implicit_narrowing_allowed, plan_type_coercion, promote, ConstantValue, NumericKind, Scalar,
    SubtypingContext, TypeContext, TypeError, TypeId, WellKnown,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

/// Output of annotating one unit
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Side tables for the emitter
    pub annotations: Annotations,
    /// Errors; a unit with any is not emitted
    pub errors: Vec<CheckError>,
    /// Dynamic fallbacks and runtime-checked assignments
    pub warnings: Vec<CheckWarning>,
}

impl CheckResult {
    /// Whether any error was reported
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Annotate `unit` against an already populated class table
pub fn annotate(ctx: &mut TypeContext, classes: &ClassTable, unit: &mut SourceUnit) -> CheckResult {
    Annotator::new(ctx, classes).annotate_unit(unit)
}

/// Result of inferring one expression
struct Inferred {
    ty: TypeId,
    state: NodeState,
    folded: Option<Literal>,
}

impl Inferred {
    fn ok(ty: TypeId) -> Self {
        Self::with_state(ty, NodeState::Resolved)
    }

    /// Dispatch deferred to the runtime
    fn deferred(ty: TypeId) -> Self {
        Self::with_state(ty, NodeState::Dynamic)
    }

    fn with_state(ty: TypeId, state: NodeState) -> Self {
        Inferred {
            ty,
            state,
            folded: None,
        }
    }

    fn folded(ty: TypeId, literal: Literal) -> Self {
        Inferred {
            ty,
            state: NodeState::Resolved,
            folded: Some(literal),
        }
    }
}

struct ClassScope {
    ty: TypeId,
    mode: CompileMode,
}

/// A method body, field initializer or closure body
struct Frame {
    /// Closure node, `None` for methods and initializers
    closure: Option<NodeId>,
    /// Scopes at or above this index belong to the frame
    scope_base: usize,
    /// Declared return type (dynamic for closures)
    return_type: TypeId,
    /// Types of values a closure body yields
    returns: Vec<TypeId>,
    /// Outer locals used by a closure body
    captures: Vec<LocalId>,
    loop_depth: u32,
}

/// Single-pass type annotator for a source unit
pub struct Annotator<'a> {
    ctx: &'a mut TypeContext,
    classes: &'a ClassTable,
    wk: WellKnown,
    ann: Annotations,
    errors: Vec<CheckError>,
    warnings: Vec<CheckWarning>,

    scopes: Vec<FxHashMap<String, LocalId>>,
    frames: Vec<Frame>,
    /// Locals currently holding a closure literal, by closure node
    closure_bindings: FxHashMap<LocalId, NodeId>,
    class: Option<ClassScope>,
    in_static: bool,
}

impl<'a> Annotator<'a> {
    /// Create an annotator over a populated class table
    pub fn new(ctx: &'a mut TypeContext, classes: &'a ClassTable) -> Self {
        let wk = ctx.well_known().clone();
        Annotator {
            ctx,
            classes,
            wk,
            ann: Annotations::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            scopes: Vec::new(),
            frames: Vec::new(),
            closure_bindings: FxHashMap::default(),
            class: None,
            in_static: false,
        }
    }

    /// Annotate every class of a unit
    pub fn annotate_unit(mut self, unit: &mut SourceUnit) -> CheckResult {
        debug!(unit = %unit.name, classes = unit.classes.len(), "annotating unit");
        for class in &mut unit.classes {
            self.annotate_class(class);
        }
        debug!(
            unit = %unit.name,
            typed = self.ann.typed_count(),
            folded = self.ann.folded_count(),
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "annotated unit"
        );
        CheckResult {
            annotations: self.ann,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn annotate_class(&mut self, class: &mut ClassDecl) {
        let Some(ty) = self.ctx.class_named(&class.name) else {
            self.errors.push(CheckError::UndefinedType {
                name: class.name.clone(),
                span: class.span,
            });
            return;
        };
        trace!(class = %class.name, mode = ?class.mode, "annotating class");
        self.class = Some(ClassScope {
            ty,
            mode: class.mode,
        });

        let classes = self.classes;
        let (field_types, signatures): (Vec<TypeId>, Vec<(Vec<TypeId>, TypeId)>) =
            match classes.get(ty) {
                Some(info) => (
                    info.fields.iter().map(|f| f.ty).collect(),
                    info.methods
                        .iter()
                        .map(|m| (m.params.clone(), m.return_type))
                        .collect(),
                ),
                None => (Vec::new(), Vec::new()),
            };

        for (index, field) in class.fields.iter_mut().enumerate() {
            let Some(init) = field.init.as_mut() else { continue };
            let target = field_types.get(index).copied().unwrap_or(self.wk.dynamic);
            self.in_static = field.is_static;
            self.enter_frame(None, self.wk.dynamic);
            let value = self.infer_expr(init);
            self.check_assignable(init, value, target);
            self.exit_frame();
        }

        for (index, method) in class.methods.iter_mut().enumerate() {
            trace!(class = %class.name, method = %method.name, "annotating method");
            let (params, return_type) = signatures
                .get(index)
                .cloned()
                .unwrap_or_else(|| (Vec::new(), self.wk.dynamic));
            self.in_static = method.is_static;
            self.enter_frame(None, return_type);
            self.scopes.push(FxHashMap::default());

            let mut locals = Vec::with_capacity(method.params.len());
            for (position, param) in method.params.iter().enumerate() {
                let ty = params.get(position).copied().unwrap_or(self.wk.dynamic);
                locals.push(self.declare_local(&param.name, ty, method.span));
            }
            self.ann.set_method_params(
                MethodKey {
                    class: class.name.clone(),
                    index,
                },
                locals,
            );

            self.check_statements(&mut method.body.statements);
            self.scopes.pop();
            self.exit_frame();
        }

        self.class = None;
        self.in_static = false;
    }

    // ---------------------------------------------------------------------
    // Scopes and frames
    // ---------------------------------------------------------------------

    fn enter_frame(&mut self, closure: Option<NodeId>, return_type: TypeId) {
        self.frames.push(Frame {
            closure,
            scope_base: self.scopes.len(),
            return_type,
            returns: Vec::new(),
            captures: Vec::new(),
            loop_depth: 0,
        });
    }

    fn exit_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    fn declare_local(&mut self, name: &str, ty: TypeId, span: Span) -> LocalId {
        let duplicate = self
            .scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false);
        if duplicate {
            self.errors.push(CheckError::DuplicateVariable {
                name: name.to_string(),
                span,
            });
        }
        let id = self.ann.add_local(name, ty);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
        id
    }

    /// Find a local without recording a capture
    fn peek_local(&self, name: &str) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    /// Find a local; every closure frame between the use and the
    /// declaration captures it
    fn lookup_local(&mut self, name: &str) -> Option<LocalId> {
        let (depth, local) = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.get(name).map(|&l| (depth, l)))?;

        for frame in self.frames.iter_mut().rev() {
            if frame.closure.is_none() || frame.scope_base <= depth {
                break;
            }
            if !frame.captures.contains(&local) {
                frame.captures.push(local);
            }
            self.ann.mark_captured(local);
        }
        Some(local)
    }

    fn local_type(&self, local: LocalId) -> TypeId {
        self.ann.local(local).map(|l| l.ty).unwrap_or(self.wk.dynamic)
    }

    fn loop_depth(&self) -> u32 {
        self.frames.last().map(|f| f.loop_depth).unwrap_or(0)
    }

    fn adjust_loop_depth(&mut self, entering: bool) {
        if let Some(frame) = self.frames.last_mut() {
            if entering {
                frame.loop_depth += 1;
            } else {
                frame.loop_depth = frame.loop_depth.saturating_sub(1);
            }
        }
    }

    fn mode(&self) -> CompileMode {
        self.class.as_ref().map(|c| c.mode).unwrap_or(CompileMode::Static)
    }

    fn this_type(&self) -> TypeId {
        self.class.as_ref().map(|c| c.ty).unwrap_or(self.wk.object)
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    fn fail(&mut self, error: CheckError) -> Inferred {
        self.errors.push(error);
        Inferred::with_state(self.wk.dynamic, NodeState::Error)
    }

    /// A member that cannot be bound statically
    fn unresolved(&mut self, error: CheckError, member: String, receiver: TypeId) -> NodeState {
        match self.mode() {
            CompileMode::Static => {
                self.errors.push(error);
                NodeState::Error
            }
            CompileMode::Dynamic => {
                let ty = self.ctx.display(receiver);
                warn!(member = %member, receiver = %ty, "falling back to dynamic dispatch");
                self.warnings.push(CheckWarning::DynamicFallback {
                    member,
                    ty,
                    span: error.span(),
                });
                NodeState::Dynamic
            }
        }
    }

    fn resolve_type(&mut self, ty: &TypeRef, span: Span) -> TypeId {
        match resolve_type_ref(self.ctx, ty) {
            Ok(id) => id,
            Err(e) => {
                self.errors.push(type_error_at(e, span));
                self.wk.dynamic
            }
        }
    }

    fn display_list(&self, types: &[TypeId]) -> String {
        types
            .iter()
            .map(|&t| self.ctx.display(t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn check_statements(&mut self, statements: &mut [Statement]) {
        for stmt in statements {
            self.check_stmt(stmt);
        }
    }

    fn check_block(&mut self, block: &mut Block) {
        self.scopes.push(FxHashMap::default());
        self.check_statements(&mut block.statements);
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::Expression(expr) => {
                self.infer_expr(expr);
            }
            Statement::VarDecl {
                id,
                name,
                ty,
                init,
                span,
            } => self.check_var_decl(*id, name, ty, init.as_mut(), *span),
            Statement::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.infer_expr(cond);
                self.check_block(then);
                if let Some(otherwise) = otherwise {
                    self.check_block(otherwise);
                }
            }
            Statement::While { cond, body, .. } => {
                self.infer_expr(cond);
                self.adjust_loop_depth(true);
                self.check_block(body);
                self.adjust_loop_depth(false);
            }
            Statement::ForIn {
                id,
                var_name,
                var_type,
                iterable,
                body,
                span,
            } => self.check_for_in(*id, var_name, var_type, iterable, body, *span),
            Statement::Return { value, span } => self.check_return(value.as_mut(), *span),
            Statement::Block(block) => self.check_block(block),
            Statement::Break(span) => {
                if self.loop_depth() == 0 {
                    self.errors.push(CheckError::BreakOutsideLoop { span: *span });
                }
            }
            Statement::Continue(span) => {
                if self.loop_depth() == 0 {
                    self.errors.push(CheckError::ContinueOutsideLoop { span: *span });
                }
            }
        }
    }

    fn check_var_decl(
        &mut self,
        id: NodeId,
        name: &str,
        ty: &TypeRef,
        init: Option<&mut Expression>,
        span: Span,
    ) {
        let declared = self.resolve_type(ty, span);
        // Declared before the initializer so a closure can call itself
        let local = self.declare_local(name, declared, span);
        self.ann.set_decl_local(id, local);

        if let Some(init) = init {
            if matches!(init.kind, ExprKind::Closure { .. }) {
                self.closure_bindings.insert(local, init.id);
            }
            let value = self.infer_expr(init);
            self.check_assignable(init, value, declared);
        }
    }

    fn check_for_in(
        &mut self,
        id: NodeId,
        var_name: &str,
        var_type: &TypeRef,
        iterable: &mut Expression,
        body: &mut Block,
        span: Span,
    ) {
        let declared = self.resolve_type(var_type, span);
        let source = self.infer_expr(iterable);
        let form = self.classify_loop(source, declared);
        trace!(node = %id, form = ?form, "loop form");
        self.ann.set_loop_form(id, form);

        self.scopes.push(FxHashMap::default());
        let local = self.declare_local(var_name, declared, span);
        self.ann.set_decl_local(id, local);
        self.adjust_loop_depth(true);
        self.check_block(body);
        self.adjust_loop_depth(false);
        self.scopes.pop();
    }

    fn classify_loop(&self, source: TypeId, declared: TypeId) -> LoopForm {
        if let Some(component) = self.ctx.component(source) {
            let element = if self.ctx.is_dynamic(declared) {
                self.wk.object
            } else {
                declared
            };
            return if component == element {
                LoopForm::IndexedArray { component }
            } else {
                LoopForm::Iterator { direct: false }
            };
        }
        if self.ctx.is_dynamic(source) || source == self.wk.null {
            return LoopForm::Iterator { direct: false };
        }
        if self.ctx.implements(source, self.wk.enumeration) {
            LoopForm::Enumeration
        } else if self.ctx.implements(source, self.wk.iterable) {
            LoopForm::Iterator { direct: true }
        } else {
            LoopForm::Iterator { direct: false }
        }
    }

    fn check_return(&mut self, value: Option<&mut Expression>, span: Span) {
        let Some(frame) = self.frames.last() else { return };
        let in_closure = frame.closure.is_some();
        let expected = frame.return_type;

        let Some(value) = value else {
            if !in_closure && expected != self.wk.void && !self.ctx.is_dynamic(expected) {
                self.errors.push(CheckError::ReturnTypeMismatch {
                    expected: self.ctx.display(expected),
                    actual: "void".to_string(),
                    span,
                });
            }
            return;
        };

        let actual = self.infer_expr(value);
        if in_closure {
            if actual != self.wk.void {
                if let Some(frame) = self.frames.last_mut() {
                    frame.returns.push(actual);
                }
            }
            return;
        }

        let mismatch = |this: &Self| CheckError::ReturnTypeMismatch {
            expected: this.ctx.display(expected),
            actual: this.ctx.display(actual),
            span: value.span,
        };
        if expected == self.wk.void {
            let error = mismatch(self);
            self.errors.push(error);
            return;
        }
        match assignability(self.ctx, actual, expected) {
            Assignability::Implicit => {}
            Assignability::Unchecked => {
                if self.ctx.is_dynamic(actual) || self.constant_fits(value, actual, expected) {
                    return;
                }
                match self.mode() {
                    CompileMode::Static => {
                        let error = mismatch(self);
                        self.errors.push(error);
                    }
                    CompileMode::Dynamic => self.warnings.push(CheckWarning::UncheckedAssignment {
                        expected: self.ctx.display(expected),
                        actual: self.ctx.display(actual),
                        span: value.span,
                    }),
                }
            }
            Assignability::Incompatible => {
                let error = mismatch(self);
                self.errors.push(error);
            }
        }
    }

    /// Check that `value` (already inferred as `ty`) may be stored in `target`
    fn check_assignable(&mut self, value: &Expression, ty: TypeId, target: TypeId) {
        let expected = || (self.ctx.display(target), self.ctx.display(ty));
        match assignability(self.ctx, ty, target) {
            Assignability::Implicit => {}
            Assignability::Unchecked => {
                if self.ctx.is_dynamic(ty) || self.constant_fits(value, ty, target) {
                    return;
                }
                let (expected, actual) = expected();
                match self.mode() {
                    CompileMode::Static => self.errors.push(CheckError::IncompatibleAssignment {
                        expected,
                        actual,
                        span: value.span,
                    }),
                    CompileMode::Dynamic => self.warnings.push(CheckWarning::UncheckedAssignment {
                        expected,
                        actual,
                        span: value.span,
                    }),
                }
            }
            Assignability::Incompatible => {
                let (expected, actual) = expected();
                self.errors.push(CheckError::IncompatibleAssignment {
                    expected,
                    actual,
                    span: value.span,
                });
            }
        }
    }

    /// `byte b = 10`: an integral constant narrows when its value fits
    fn constant_fits(&self, value: &Expression, ty: TypeId, target: TypeId) -> bool {
        let (Some(from), Some(to)) = (self.ctx.numeric_kind(ty), self.ctx.numeric_kind(target))
        else {
            return false;
        };
        let constant = match value.as_literal() {
            Some(Literal::Int(v)) => ConstantValue::Integral(i64::from(*v)),
            Some(Literal::Long(v)) => ConstantValue::Integral(*v),
            Some(Literal::Char(c)) => ConstantValue::Integral(i64::from(u32::from(*c))),
            _ => return false,
        };
        implicit_narrowing_allowed(from, to, Some(constant))
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn infer_expr(&mut self, expr: &mut Expression) -> TypeId {
        let id = expr.id;
        self.ann.set_state(id, NodeState::Inferring);
        let inferred = self.infer_kind(expr);
        if let Some(literal) = inferred.folded {
            trace!(node = %id, "folded constant");
            expr.kind = ExprKind::Literal(literal);
            self.ann.mark_folded(id);
        }
        self.ann.set_type(id, inferred.ty);
        self.ann.set_state(id, inferred.state);
        inferred.ty
    }

    fn infer_args(&mut self, args: &mut [Expression]) -> Vec<TypeId> {
        args.iter_mut().map(|arg| self.infer_expr(arg)).collect()
    }

    fn any_dynamic(&self, types: &[TypeId]) -> bool {
        types.iter().any(|&t| self.ctx.is_dynamic(t))
    }

    fn infer_kind(&mut self, expr: &mut Expression) -> Inferred {
        let id = expr.id;
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Literal(literal) => Inferred::ok(self.literal_type(literal)),
            ExprKind::Variable { name } => self.infer_variable(id, name, span),
            ExprKind::This => {
                if self.in_static {
                    self.fail(CheckError::ThisInStaticContext { span })
                } else {
                    Inferred::ok(self.this_type())
                }
            }
            ExprKind::Binary { op, left, right } => self.infer_binary(id, *op, left, right, span),
            ExprKind::Unary { op, operand } => self.infer_unary(*op, operand, span),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.infer_method_call(id, receiver, method, args, span),
            ExprKind::StaticCall {
                owner,
                method,
                args,
            } => self.infer_static_call(id, owner, method, args, span),
            ExprKind::Call { callee, args } => self.infer_call(id, callee, args, span),
            ExprKind::Property { object, name } => self.infer_property(id, object, name, span),
            ExprKind::Index { object, index } => self.infer_index(id, object, index, span),
            ExprKind::Assign { target, value } => self.infer_assign(target, value),
            ExprKind::Closure { params, body } => self.infer_closure(id, params, body),
            ExprKind::List { elements } => {
                self.infer_args(elements);
                Inferred::ok(self.wk.list)
            }
            ExprKind::Range { from, to, .. } => self.infer_range(from, to, span),
            ExprKind::Array {
                element_type,
                elements,
            } => {
                let component = self.resolve_type(element_type, span);
                for element in elements.iter_mut() {
                    let ty = self.infer_expr(element);
                    self.check_assignable(element, ty, component);
                }
                Inferred::ok(self.ctx.array_of(component))
            }
            ExprKind::New { class, args } => self.infer_new(id, class, args, span),
            ExprKind::Cast { ty, expr: inner } => self.infer_cast(ty, inner, span),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.infer_expr(cond);
                let a = self.infer_expr(then);
                let b = self.infer_expr(otherwise);
                Inferred::ok(self.join(a, b))
            }
        }
    }

    fn literal_type(&self, literal: &Literal) -> TypeId {
        let wk = &self.wk;
        match literal {
            Literal::Null => wk.null,
            Literal::Boolean(_) => wk.boolean,
            Literal::Int(_) => wk.int,
            Literal::Long(_) => wk.long,
            Literal::Float(_) => wk.float,
            Literal::Double(_) => wk.double,
            Literal::BigInteger(_) => wk.big_integer,
            Literal::BigDecimal(_) => wk.big_decimal,
            Literal::Char(_) => wk.char,
            Literal::String(_) => wk.string,
        }
    }

    fn infer_variable(&mut self, id: NodeId, name: &str, span: Span) -> Inferred {
        if let Some(local) = self.lookup_local(name) {
            self.ann.set_var_ref(id, local);
            return Inferred::ok(self.local_type(local));
        }
        if let Some(field) = self.implicit_field(name) {
            let ty = field.ty;
            self.ann.set_field(id, field);
            return Inferred::ok(ty);
        }

        let error = CheckError::UndefinedVariable {
            name: name.to_string(),
            span,
        };
        if self.in_static {
            return self.fail(error);
        }
        let this = self.this_type();
        let state = self.unresolved(error, format!("variable '{}'", name), this);
        Inferred::with_state(self.wk.dynamic, state)
    }

    /// Field of the current class reachable by bare name
    fn implicit_field(&self, name: &str) -> Option<FieldTarget> {
        let class = self.class.as_ref()?.ty;
        let field = self.classes.find_field(self.ctx, class, name)?;
        (field.is_static || !self.in_static).then_some(field)
    }

    fn infer_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        left: &mut Expression,
        right: &mut Expression,
        span: Span,
    ) -> Inferred {
        let lt = self.infer_expr(left);
        let rt = self.infer_expr(right);
        if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
            if let Some(literal) = fold_binary(op, l, r) {
                return Inferred::folded(self.literal_type(&literal), literal);
            }
        }

        let (boolean, string, dynamic) = (self.wk.boolean, self.wk.string, self.wk.dynamic);
        if op.is_logical() {
            return Inferred::ok(boolean);
        }
        if op == BinaryOp::Add && (lt == string || rt == string) {
            self.set_helper_target(id, "concat", 2);
            return Inferred::ok(string);
        }
        if let (Some(a), Some(b)) = (self.ctx.numeric_kind(lt), self.ctx.numeric_kind(rt)) {
            return if op.is_arithmetic() {
                Inferred::ok(self.ctx.numeric_type(promote(a, b)))
            } else {
                Inferred::ok(boolean)
            };
        }
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            if !(self.ctx.is_boolean(lt) && self.ctx.is_boolean(rt)) {
                self.set_helper_target(id, "equals", 2);
            }
            return Inferred::ok(boolean);
        }

        let result = if op.is_comparison() { boolean } else { dynamic };
        if self.ctx.is_dynamic(lt) || self.ctx.is_dynamic(rt) || lt == self.wk.null {
            return Inferred::deferred(result);
        }

        let receiver = self.lookup_type(lt);
        match self.resolve_instance(receiver, op.method_name(), &[rt]) {
            Resolution::Found(target) => {
                let ty = if op.is_comparison() {
                    boolean
                } else {
                    target.return_type
                };
                self.ann.set_target(id, target);
                Inferred::ok(ty)
            }
            _ => {
                let error = CheckError::InvalidBinaryOp {
                    op: op.symbol().to_string(),
                    left: self.ctx.display(lt),
                    right: self.ctx.display(rt),
                    span,
                };
                let state = self.unresolved(error, format!("operator '{}'", op.symbol()), lt);
                Inferred::with_state(result, state)
            }
        }
    }

    fn infer_unary(&mut self, op: UnaryOp, operand: &mut Expression, span: Span) -> Inferred {
        let ty = self.infer_expr(operand);
        if let Some(literal) = operand.as_literal().and_then(|l| fold_unary(op, l)) {
            return Inferred::folded(self.literal_type(&literal), literal);
        }
        match op {
            UnaryOp::Not => Inferred::ok(self.wk.boolean),
            UnaryOp::Neg => {
                if let Some(kind) = self.ctx.numeric_kind(ty) {
                    return Inferred::ok(self.ctx.numeric_type(kind.unary_promote()));
                }
                if self.ctx.is_dynamic(ty) {
                    return Inferred::deferred(self.wk.dynamic);
                }
                let error = CheckError::InvalidUnaryOp {
                    op: "-".to_string(),
                    ty: self.ctx.display(ty),
                    span,
                };
                let state = self.unresolved(error, "operator '-'".to_string(), ty);
                Inferred::with_state(self.wk.dynamic, state)
            }
        }
    }

    /// Type used for member lookup: wrappers for primitives, Object for arrays
    fn lookup_type(&self, ty: TypeId) -> TypeId {
        if self.ctx.component(ty).is_some() {
            self.wk.object
        } else {
            self.ctx.box_if_primitive(ty)
        }
    }

    fn resolve_instance(&self, receiver: TypeId, name: &str, args: &[TypeId]) -> Resolution {
        let candidates: Vec<MethodTarget> = self
            .classes
            .candidates(self.ctx, receiver, name, args.len())
            .into_iter()
            .filter(|c| !c.is_static())
            .collect();
        select_overload(self.ctx, candidates, args)
    }

    fn set_helper_target(&mut self, id: NodeId, name: &str, arity: usize) {
        let Some(helpers) = self.ctx.class_named("Helpers") else { return };
        if let Some(target) = self
            .classes
            .candidates(self.ctx, helpers, name, arity)
            .into_iter()
            .next()
        {
            self.ann.set_target(id, target);
        }
    }

    /// Record a resolution outcome on `id`, reporting failures
    fn bind_call(
        &mut self,
        id: NodeId,
        resolution: Resolution,
        method: &str,
        receiver: TypeId,
        args: &[TypeId],
        span: Span,
    ) -> Option<TypeId> {
        let error = match resolution {
            Resolution::Found(target) => {
                let ty = target.return_type;
                self.ann.set_target(id, target);
                return Some(ty);
            }
            Resolution::NotFound => CheckError::MethodNotFound {
                method: method.to_string(),
                ty: self.ctx.display(receiver),
                args: self.display_list(args),
                span,
            },
            Resolution::Ambiguous(candidates) => CheckError::AmbiguousMethod {
                method: method.to_string(),
                ty: self.ctx.display(receiver),
                candidates: candidates.iter().map(|c| c.signature(self.ctx)).collect(),
                span,
            },
        };
        let state = self.unresolved(error, format!("method '{}'", method), receiver);
        self.ann.set_state(id, state);
        None
    }

    fn infer_method_call(
        &mut self,
        id: NodeId,
        receiver: &mut Expression,
        method: &str,
        args: &mut [Expression],
        span: Span,
    ) -> Inferred {
        let rt = self.infer_expr(receiver);
        let arg_types = self.infer_args(args);
        let dynamic = self.wk.dynamic;

        if self.ctx.is_dynamic(rt) || rt == self.wk.null || self.any_dynamic(&arg_types) {
            return Inferred::deferred(dynamic);
        }
        if method == "call" && self.ctx.erase(rt) == self.wk.closure {
            return Inferred::ok(self.closure_result(receiver));
        }

        let lookup = self.lookup_type(rt);
        let resolution = self.resolve_instance(lookup, method, &arg_types);
        match self.bind_call(id, resolution, method, rt, &arg_types, span) {
            Some(ty) => Inferred::ok(ty),
            None => Inferred::with_state(dynamic, self.ann.state(id)),
        }
    }

    fn infer_static_call(
        &mut self,
        id: NodeId,
        owner: &str,
        method: &str,
        args: &mut [Expression],
        span: Span,
    ) -> Inferred {
        let arg_types = self.infer_args(args);
        let Some(owner_ty) = self.ctx.class_named(owner) else {
            return self.fail(CheckError::UndefinedType {
                name: owner.to_string(),
                span,
            });
        };
        if self.any_dynamic(&arg_types) {
            return Inferred::deferred(self.wk.dynamic);
        }

        let candidates: Vec<MethodTarget> = self
            .classes
            .candidates(self.ctx, owner_ty, method, arg_types.len())
            .into_iter()
            .filter(MethodTarget::is_static)
            .collect();
        let resolution = select_overload(self.ctx, candidates, &arg_types);
        match self.bind_call(id, resolution, method, owner_ty, &arg_types, span) {
            Some(ty) => Inferred::ok(ty),
            None => Inferred::with_state(self.wk.dynamic, self.ann.state(id)),
        }
    }

    fn infer_call(
        &mut self,
        id: NodeId,
        callee: &mut Expression,
        args: &mut [Expression],
        span: Span,
    ) -> Inferred {
        // `foo(x)` where `foo` is not a local but a method of this class
        if let ExprKind::Variable { name } = &callee.kind {
            if self.peek_local(name).is_none() {
                if let Some(class) = self.class.as_ref().map(|c| c.ty) {
                    if self.classes.has_method_named(self.ctx, class, name) {
                        let name = name.clone();
                        self.ann.set_type(callee.id, self.wk.dynamic);
                        self.ann.set_state(callee.id, NodeState::Resolved);
                        return self.infer_implicit_call(id, class, &name, args, span);
                    }
                }
            }
        }

        let ct = self.infer_expr(callee);
        self.infer_args(args);
        if ct == self.wk.closure {
            return Inferred::ok(self.closure_result(callee));
        }
        if self.ctx.is_dynamic(ct) {
            return Inferred::deferred(self.closure_result(callee));
        }
        let ty = self.ctx.display(ct);
        self.fail(CheckError::NotCallable { ty, span })
    }

    fn infer_implicit_call(
        &mut self,
        id: NodeId,
        class: TypeId,
        name: &str,
        args: &mut [Expression],
        span: Span,
    ) -> Inferred {
        let arg_types = self.infer_args(args);
        if self.any_dynamic(&arg_types) {
            return Inferred::deferred(self.wk.dynamic);
        }
        let in_static = self.in_static;
        let candidates: Vec<MethodTarget> = self
            .classes
            .candidates(self.ctx, class, name, arg_types.len())
            .into_iter()
            .filter(|c| !in_static || c.is_static())
            .collect();
        let resolution = select_overload(self.ctx, candidates, &arg_types);
        match self.bind_call(id, resolution, name, class, &arg_types, span) {
            Some(ty) => Inferred::ok(ty),
            None => Inferred::with_state(self.wk.dynamic, self.ann.state(id)),
        }
    }

    /// Result type of invoking `callee` as a closure
    ///
    /// A local bound to a closure literal yields that closure's inferred
    /// return type, boxed. A closure still being inferred (a recursive call
    /// from its own body) yields dynamic.
    fn closure_result(&self, callee: &Expression) -> TypeId {
        let dynamic = self.wk.dynamic;
        if !matches!(callee.kind, ExprKind::Variable { .. }) {
            return dynamic;
        }
        let Some(node) = self
            .ann
            .var_ref(callee.id)
            .and_then(|local| self.closure_bindings.get(&local))
        else {
            return dynamic;
        };
        match self.ann.state(*node) {
            NodeState::Resolved => self
                .ann
                .closure(*node)
                .map(|c| self.ctx.box_if_primitive(c.return_type))
                .unwrap_or(dynamic),
            _ => dynamic,
        }
    }

    fn infer_property(
        &mut self,
        id: NodeId,
        object: &mut Expression,
        name: &str,
        span: Span,
    ) -> Inferred {
        let ot = self.infer_expr(object);
        let dynamic = self.wk.dynamic;
        if self.ctx.is_dynamic(ot) || ot == self.wk.null {
            return Inferred::deferred(dynamic);
        }
        if self.ctx.component(ot).is_some() && name == "length" {
            return Inferred::ok(self.wk.int);
        }

        let lookup = self.lookup_type(ot);
        if let Some(field) = self.classes.find_field(self.ctx, lookup, name) {
            let ty = field.ty;
            self.ann.set_field(id, field);
            return Inferred::ok(ty);
        }
        if let Resolution::Found(getter) = self.resolve_instance(lookup, &accessor("get", name), &[]) {
            let ty = getter.return_type;
            self.ann.set_target(id, getter);
            return Inferred::ok(ty);
        }

        let error = CheckError::PropertyNotFound {
            property: name.to_string(),
            ty: self.ctx.display(ot),
            span,
        };
        let state = self.unresolved(error, format!("property '{}'", name), ot);
        Inferred::with_state(dynamic, state)
    }

    fn is_index_type(&self, ty: TypeId) -> bool {
        self.ctx.is_dynamic(ty)
            || matches!(
                self.ctx.numeric_kind(ty),
                Some(NumericKind::Byte | NumericKind::Short | NumericKind::Char | NumericKind::Int)
            )
    }

    fn infer_index(
        &mut self,
        id: NodeId,
        object: &mut Expression,
        index: &mut Expression,
        span: Span,
    ) -> Inferred {
        let ot = self.infer_expr(object);
        let it = self.infer_expr(index);
        let dynamic = self.wk.dynamic;
        if self.ctx.is_dynamic(ot) {
            return Inferred::deferred(dynamic);
        }
        if let Some(component) = self.ctx.component(ot) {
            if !self.is_index_type(it) {
                let actual = self.ctx.display(it);
                self.errors.push(CheckError::IncompatibleAssignment {
                    expected: "int".to_string(),
                    actual,
                    span: index.span,
                });
                return Inferred::with_state(component, NodeState::Error);
            }
            return Inferred::ok(component);
        }
        if self.ctx.is_dynamic(it) {
            return Inferred::deferred(dynamic);
        }

        let lookup = self.lookup_type(ot);
        if let Resolution::Found(get) = self.resolve_instance(lookup, "get", &[it]) {
            let ty = get.return_type;
            self.ann.set_target(id, get);
            return Inferred::ok(ty);
        }
        let error = CheckError::NotIndexable {
            ty: self.ctx.display(ot),
            span,
        };
        let state = self.unresolved(error, "operator '[]'".to_string(), ot);
        Inferred::with_state(dynamic, state)
    }

    fn infer_assign(&mut self, target: &mut Expression, value: &mut Expression) -> Inferred {
        let vt = self.infer_expr(value);
        let dynamic = self.wk.dynamic;
        let target_id = target.id;
        let target_span = target.span;

        let (slot, state) = match &mut target.kind {
            ExprKind::Variable { name } => {
                if let Some(local) = self.lookup_local(name) {
                    self.ann.set_var_ref(target_id, local);
                    if matches!(value.kind, ExprKind::Closure { .. }) {
                        self.closure_bindings.insert(local, value.id);
                    } else {
                        self.closure_bindings.remove(&local);
                    }
                    (Some(self.local_type(local)), NodeState::Resolved)
                } else if let Some(field) = self.implicit_field(name) {
                    let ty = field.ty;
                    self.ann.set_field(target_id, field);
                    (Some(ty), NodeState::Resolved)
                } else {
                    let error = CheckError::UndefinedVariable {
                        name: name.clone(),
                        span: target_span,
                    };
                    if self.in_static {
                        self.errors.push(error);
                        (None, NodeState::Error)
                    } else {
                        let this = self.this_type();
                        let member = format!("variable '{}'", name);
                        (None, self.unresolved(error, member, this))
                    }
                }
            }
            ExprKind::Property { object, name } => {
                let ot = self.infer_expr(object);
                self.assign_property(target_id, ot, name, vt, target_span)
            }
            ExprKind::Index { object, index } => {
                let ot = self.infer_expr(object);
                let it = self.infer_expr(index);
                self.assign_element(target_id, ot, it, vt, target_span)
            }
            _ => {
                self.ann.set_type(target_id, dynamic);
                self.ann.set_state(target_id, NodeState::Error);
                return self.fail(CheckError::InvalidAssignmentTarget { span: target_span });
            }
        };

        let ty = slot.unwrap_or(dynamic);
        self.ann.set_type(target_id, ty);
        self.ann.set_state(target_id, state);
        if let Some(slot) = slot {
            self.check_assignable(value, vt, slot);
        }
        Inferred::ok(ty)
    }

    fn assign_property(
        &mut self,
        id: NodeId,
        object: TypeId,
        name: &str,
        value: TypeId,
        span: Span,
    ) -> (Option<TypeId>, NodeState) {
        if self.ctx.is_dynamic(object) || object == self.wk.null {
            return (None, NodeState::Dynamic);
        }
        let lookup = self.lookup_type(object);
        if let Some(field) = self.classes.find_field(self.ctx, lookup, name) {
            let ty = field.ty;
            self.ann.set_field(id, field);
            return (Some(ty), NodeState::Resolved);
        }
        if let Resolution::Found(setter) =
            self.resolve_instance(lookup, &accessor("set", name), &[value])
        {
            let ty = setter.params.first().copied();
            self.ann.set_target(id, setter);
            return (ty, NodeState::Resolved);
        }
        let error = CheckError::PropertyNotFound {
            property: name.to_string(),
            ty: self.ctx.display(object),
            span,
        };
        (None, self.unresolved(error, format!("property '{}'", name), object))
    }

    fn assign_element(
        &mut self,
        id: NodeId,
        object: TypeId,
        index: TypeId,
        value: TypeId,
        span: Span,
    ) -> (Option<TypeId>, NodeState) {
        if self.ctx.is_dynamic(object) {
            return (None, NodeState::Dynamic);
        }
        if let Some(component) = self.ctx.component(object) {
            return (Some(component), NodeState::Resolved);
        }
        if self.ctx.is_dynamic(index) {
            return (None, NodeState::Dynamic);
        }
        let lookup = self.lookup_type(object);
        if let Resolution::Found(set) = self.resolve_instance(lookup, "set", &[index, value]) {
            let ty = set.params.get(1).copied();
            self.ann.set_target(id, set);
            return (ty, NodeState::Resolved);
        }
        let error = CheckError::NotIndexable {
            ty: self.ctx.display(object),
            span,
        };
        (None, self.unresolved(error, "operator '[]='".to_string(), object))
    }

    fn infer_closure(&mut self, id: NodeId, params: &[Param], body: &mut Block) -> Inferred {
        self.enter_frame(Some(id), self.wk.dynamic);
        self.scopes.push(FxHashMap::default());

        let mut locals = Vec::with_capacity(params.len());
        for param in params {
            let ty = self.resolve_type(&param.ty, body.span);
            locals.push(self.declare_local(&param.name, ty, body.span));
        }
        self.check_statements(&mut body.statements);

        // The last expression statement is the implicit result
        if let Some(Statement::Expression(last)) = body.statements.last() {
            let ty = self.ann.type_of(last.id).unwrap_or(self.wk.dynamic);
            if ty != self.wk.void {
                if let Some(frame) = self.frames.last_mut() {
                    frame.returns.push(ty);
                }
            }
        }

        self.scopes.pop();
        let (returns, captures) = self
            .exit_frame()
            .map(|f| (f.returns, f.captures))
            .unwrap_or_default();
        let return_type = returns
            .iter()
            .copied()
            .reduce(|a, b| self.join(a, b))
            .unwrap_or(self.wk.object);
        trace!(node = %id, captures = captures.len(), "closure");

        self.ann.set_closure(
            id,
            ClosureInfo {
                params: locals,
                captures,
                return_type,
            },
        );
        Inferred::ok(self.wk.closure)
    }

    fn infer_range(&mut self, from: &mut Expression, to: &mut Expression, span: Span) -> Inferred {
        self.infer_expr(from);
        self.infer_expr(to);
        if let (Some(Literal::String(start)), Some(Literal::String(end))) =
            (from.as_literal(), to.as_literal())
        {
            if let Err(e) = check_string_range(start, end) {
                let reason = match e {
                    TypeError::IncompatibleRange { reason } => reason,
                    other => other.to_string(),
                };
                self.errors.push(CheckError::InvalidRange { reason, span });
                return Inferred::with_state(self.wk.range, NodeState::Error);
            }
        }
        Inferred::ok(self.wk.range)
    }

    fn infer_new(&mut self, id: NodeId, class: &str, args: &mut [Expression], span: Span) -> Inferred {
        let arg_types = self.infer_args(args);
        let Some(ty) = self.ctx.class_named(class) else {
            return self.fail(CheckError::UndefinedType {
                name: class.to_string(),
                span,
            });
        };
        if self.any_dynamic(&arg_types) {
            return Inferred::deferred(ty);
        }
        let constructors = self.classes.constructors(self.ctx, ty, arg_types.len());
        let resolution = select_overload(self.ctx, constructors, &arg_types);
        match self.bind_call(id, resolution, "<init>", ty, &arg_types, span) {
            Some(_) => Inferred::ok(ty),
            None => Inferred::with_state(ty, self.ann.state(id)),
        }
    }

    fn infer_cast(&mut self, ty: &TypeRef, inner: &mut Expression, span: Span) -> Inferred {
        let target = self.resolve_type(ty, span);
        let source = self.infer_expr(inner);
        if self.ctx.is_dynamic(target) || self.ctx.is_dynamic(source) {
            return Inferred::ok(target);
        }

        let both_scalar = Scalar::of_type(self.ctx, source).is_some()
            && Scalar::of_type(self.ctx, target).is_some();
        let valid = if both_scalar {
            plan_type_coercion(self.ctx, source, target).is_ok()
        } else {
            assignability(self.ctx, source, target) != Assignability::Incompatible
        };
        if !valid {
            self.errors.push(CheckError::InvalidCast {
                from: self.ctx.display(source),
                to: self.ctx.display(target),
                span,
            });
            return Inferred::with_state(target, NodeState::Error);
        }
        Inferred::ok(target)
    }

    /// Least common type of two branch or return types
    fn join(&self, a: TypeId, b: TypeId) -> TypeId {
        if a == b {
            return a;
        }
        if self.ctx.is_dynamic(a) || self.ctx.is_dynamic(b) {
            return self.wk.dynamic;
        }
        if self.ctx.is_primitive(a) && self.ctx.is_primitive(b) {
            if let (Some(x), Some(y)) = (self.ctx.numeric_kind(a), self.ctx.numeric_kind(b)) {
                return self.ctx.numeric_type(promote(x, y));
            }
        }
        let (a, b) = (self.ctx.box_if_primitive(a), self.ctx.box_if_primitive(b));
        SubtypingContext::new(self.ctx).common_supertype(a, b)
    }
}

/// `get` + `name` → `getName`
fn accessor(prefix: &str, name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_names() {
        assert_eq!(accessor("get", "name"), "getName");
        assert_eq!(accessor("set", "x"), "setX");
        assert_eq!(accessor("get", ""), "get");
    }
}
