//! Expression emission
//!
//! Every expression leaves exactly one value on the operand stack. The path
//! is picked per node: resolved targets and primitive operands go straight to
//! typed instructions, everything else through a call site.

use super::method::MethodEmitter;
use super::report::EmissionPath;
use crate::error::{CompileError, CompileResult};
use kestrel_ast::{BinaryOp, Block, ExprKind, Expression, Literal, MethodDecl, Statement, UnaryOp};
use kestrel_bytecode::{flags, CallSiteKind, Constant, Opcode};
use kestrel_checker::{CallKind, FieldTarget, MethodTarget};
use kestrel_types::{promote, NumericKind, TypeId};

use super::code::Label;
use super::method::BodyKind;

/// Where a call's receiver comes from
#[derive(Clone, Copy)]
pub(super) enum Receiver<'e> {
    /// An explicit receiver expression
    Expr(&'e Expression),
    /// The implicit `this` (or the class in a static context)
    This,
    /// A class method on the named class
    Class(&'e str),
}

impl<'s, 'a> MethodEmitter<'s, 'a> {
    pub(super) fn expr(&mut self, expr: &Expression) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.literal(expr, lit),
            ExprKind::Variable { name } => self.variable(expr, name),
            ExprKind::This => {
                self.record(expr, EmissionPath::Static);
                self.op_local(Opcode::Aload, 0)
            }
            ExprKind::Binary { op, left, right } => self.binary(expr, *op, left, right),
            ExprKind::Unary { op, operand } => self.unary(expr, *op, operand),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.method_call(expr, receiver, method, args, true).map(drop),
            ExprKind::StaticCall {
                owner,
                method,
                args,
            } => self.static_call(expr, owner, method, args, true).map(drop),
            ExprKind::Call { callee, args } => self.call(expr, callee, args, true).map(drop),
            ExprKind::Property { object, name } => self.property(expr, object, name),
            ExprKind::Index { object, index } => self.index(expr, object, index),
            ExprKind::Assign { target, value } => self.assign(expr, target, value, true),
            ExprKind::Closure { body, .. } => self.closure(expr, body),
            ExprKind::List { elements } => {
                self.record(expr, EmissionPath::Static);
                for element in elements {
                    self.boxed(element)?;
                }
                self.new_list(elements.len())
            }
            ExprKind::Range {
                from,
                to,
                exclusive,
            } => {
                self.record(expr, EmissionPath::Static);
                self.boxed(from)?;
                self.boxed(to)?;
                self.op_tag(Opcode::NewRange, u8::from(*exclusive))
            }
            ExprKind::Array { elements, .. } => self.array(expr, elements),
            ExprKind::New { class, args } => self.new_object(expr, class, args),
            ExprKind::Cast { expr: inner, .. } => {
                self.record(expr, EmissionPath::Static);
                let ty = self.type_of(expr)?;
                self.value(inner, ty)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.ternary(expr, cond, then, otherwise),
        }
    }

    /// Emit `expr` converted to `to`
    pub(super) fn value(&mut self, expr: &Expression, to: TypeId) -> CompileResult<()> {
        self.expr(expr)?;
        let from = self.type_of(expr)?;
        self.coerce(from, to)
    }

    /// Emit `expr` as a reference, boxing primitives
    pub(super) fn boxed(&mut self, expr: &Expression) -> CompileResult<()> {
        self.expr(expr)?;
        let ty = self.type_of(expr)?;
        if !self.is_void(ty) {
            if let Some(kind) = self.cls.ctx.primitive(ty) {
                self.op_tag(Opcode::Box, kind.tag())?;
            }
        }
        Ok(())
    }

    /// Emit `expr` for its effect only
    pub(super) fn discard(&mut self, expr: &Expression) -> CompileResult<()> {
        let pushed = match &expr.kind {
            ExprKind::Assign { target, value } => {
                self.assign(expr, target, value, false)?;
                false
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.method_call(expr, receiver, method, args, false)?,
            ExprKind::StaticCall {
                owner,
                method,
                args,
            } => self.static_call(expr, owner, method, args, false)?,
            ExprKind::Call { callee, args } => self.call(expr, callee, args, false)?,
            _ => {
                self.expr(expr)?;
                true
            }
        };
        if pushed {
            self.op(Opcode::Pop)?;
        }
        Ok(())
    }

    fn literal(&mut self, expr: &Expression, lit: &Literal) -> CompileResult<()> {
        let path = if self.cls.ann.is_folded(expr.id) {
            EmissionPath::Constant
        } else {
            EmissionPath::Static
        };
        self.record(expr, path);
        match lit {
            Literal::Null => self.op(Opcode::AconstNull),
            Literal::Boolean(value) => self.iconst(i32::from(*value)),
            Literal::Int(value) => self.iconst(*value),
            Literal::Long(value) => self.lconst(*value),
            Literal::Float(value) => self.fconst(*value),
            Literal::Double(value) => self.dconst(*value),
            Literal::Char(value) => {
                self.iconst(*value as i32)?;
                self.op(Opcode::I2c)
            }
            Literal::String(value) => self.ldc(Constant::Utf8(value.clone())),
            Literal::BigInteger(digits) => self.ldc(Constant::BigInteger(digits.clone())),
            Literal::BigDecimal(digits) => self.ldc(Constant::BigDecimal(digits.clone())),
        }
    }

    fn variable(&mut self, expr: &Expression, name: &str) -> CompileResult<()> {
        let ann = self.cls.ann;
        if let Some(local) = ann.var_ref(expr.id) {
            self.record(expr, EmissionPath::Static);
            return self.load_local(local);
        }
        if let Some(field) = ann.field(expr.id).cloned() {
            self.require_resolved(expr)?;
            self.record(expr, EmissionPath::Static);
            self.get_field(&field, None)?;
            let ty = self.type_of(expr)?;
            return self.coerce(field.ty, ty);
        }
        self.record(expr, EmissionPath::Dynamic);
        self.load_receiver()?;
        self.site(name, 0, CallSiteKind::GetProperty)?;
        self.after_dynamic(expr)
    }

    fn get_field(&mut self, field: &FieldTarget, object: Option<&Expression>) -> CompileResult<()> {
        let descriptor = self.type_name(field.ty);
        if field.is_static {
            if let Some(object) = object {
                self.expr(object)?;
                self.op(Opcode::Pop)?;
            }
            return self.field_op(Opcode::GetStatic, &field.owner_name, &field.name, &descriptor);
        }
        match object {
            Some(object) => self.expr(object)?,
            None => self.op_local(Opcode::Aload, 0)?,
        }
        self.field_op(Opcode::GetField, &field.owner_name, &field.name, &descriptor)
    }

    // ===== Operators =====

    fn binary(
        &mut self,
        expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> CompileResult<()> {
        if op.is_logical() || op.is_comparison() {
            return self.condition_value(expr);
        }
        if let Some(target) = self.cls.ann.target(expr.id).cloned() {
            let (receiver, args) = if target.is_static() {
                (Receiver::Class(&target.owner_name), vec![left, right])
            } else {
                (Receiver::Expr(left), vec![right])
            };
            let pushed = self.invoke_target(expr, &target, receiver, &args)?;
            return self.finish_call(expr, pushed, true).map(drop);
        }

        let ctx = self.cls.ctx;
        let (lt, rt) = (self.type_of(left)?, self.type_of(right)?);
        if let (Some(a), Some(b)) = (ctx.numeric_kind(lt), ctx.numeric_kind(rt)) {
            let kind = promote(a, b);
            if let Some(opcode) = arithmetic_opcode(op, kind) {
                self.require_resolved(expr)?;
                self.record(expr, EmissionPath::Static);
                let operand = ctx.numeric_type(kind);
                self.value(left, operand)?;
                self.value(right, operand)?;
                self.op(opcode)?;
                let ty = self.type_of(expr)?;
                return self.coerce(operand, ty);
            }
        }

        self.record(expr, EmissionPath::Dynamic);
        self.boxed(left)?;
        self.boxed(right)?;
        self.site(op.method_name(), 1, CallSiteKind::Method)?;
        self.after_dynamic(expr)
    }

    fn unary(&mut self, expr: &Expression, op: UnaryOp, operand: &Expression) -> CompileResult<()> {
        if op == UnaryOp::Not {
            return self.condition_value(expr);
        }
        let ctx = self.cls.ctx;
        let ty = self.type_of(operand)?;
        if let Some(kind) = ctx.numeric_kind(ty).map(NumericKind::unary_promote) {
            let negate = match kind {
                NumericKind::Long => Some(Opcode::Lneg),
                NumericKind::Float => Some(Opcode::Fneg),
                NumericKind::Double => Some(Opcode::Dneg),
                NumericKind::BigInteger | NumericKind::BigDecimal => None,
                _ => Some(Opcode::Ineg),
            };
            if let Some(negate) = negate {
                self.require_resolved(expr)?;
                self.record(expr, EmissionPath::Static);
                let operand_ty = ctx.numeric_type(kind);
                self.value(operand, operand_ty)?;
                self.op(negate)?;
                let result = self.type_of(expr)?;
                return self.coerce(operand_ty, result);
            }
        }
        self.record(expr, EmissionPath::Dynamic);
        self.boxed(operand)?;
        self.site("negative", 0, CallSiteKind::Method)?;
        self.after_dynamic(expr)
    }

    /// Materialize a condition as `0` or `1`
    fn condition_value(&mut self, expr: &Expression) -> CompileResult<()> {
        let baseline = self.stack.depth();
        let when_false = self.code.new_label();
        let end = self.code.new_label();
        self.branch(expr, when_false, false)?;
        self.iconst(1)?;
        self.jump(Opcode::Goto, end)?;
        self.stack.set_depth(baseline);
        self.bind(when_false)?;
        self.iconst(0)?;
        self.bind(end)
    }

    /// Jump to `label` when `cond` evaluates to `jump_when`; fall through
    /// otherwise
    pub(super) fn branch(&mut self, cond: &Expression, label: Label, jump_when: bool) -> CompileResult<()> {
        match &cond.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                self.record(cond, EmissionPath::Static);
                self.branch(operand, label, !jump_when)
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                self.record(cond, EmissionPath::Static);
                // `a && b` jumps on false as soon as either side is false;
                // `a || b` jumps on true as soon as either side is true
                let short_circuit = *op == BinaryOp::Or;
                if jump_when == short_circuit {
                    self.branch(left, label, jump_when)?;
                    self.branch(right, label, jump_when)
                } else {
                    let skip = self.code.new_label();
                    self.branch(left, skip, short_circuit)?;
                    self.branch(right, label, jump_when)?;
                    self.bind(skip)
                }
            }
            ExprKind::Binary { op, left, right } if op.is_comparison() => {
                self.compare(cond, *op, left, right, label, jump_when)
            }
            ExprKind::Literal(Literal::Boolean(value)) => {
                let path = if self.cls.ann.is_folded(cond.id) {
                    EmissionPath::Constant
                } else {
                    EmissionPath::Static
                };
                self.record(cond, path);
                if *value == jump_when {
                    self.jump(Opcode::Goto, label)?;
                }
                Ok(())
            }
            _ => {
                self.expr(cond)?;
                let ty = self.type_of(cond)?;
                if self.cls.ctx.primitive(ty) != Some(kestrel_types::PrimitiveKind::Boolean) {
                    self.op(Opcode::Truthy)?;
                }
                self.jump(if jump_when { Opcode::IfNe } else { Opcode::IfEq }, label)
            }
        }
    }

    fn compare(
        &mut self,
        expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        label: Label,
        jump_when: bool,
    ) -> CompileResult<()> {
        let ctx = self.cls.ctx;
        let wk = ctx.well_known();
        let cmp = if jump_when { op } else { negate(op) };

        if let Some(target) = self.cls.ann.target(expr.id).cloned() {
            let (receiver, args) = if target.is_static() {
                (Receiver::Class(&target.owner_name), vec![left, right])
            } else {
                (Receiver::Expr(left), vec![right])
            };
            let pushed = self.invoke_target(expr, &target, receiver, &args)?;
            let ty = pushed.ok_or_else(|| {
                CompileError::internal(format!("comparison {} returns void", target.name))
            })?;
            if target.name == "compareTo" {
                self.coerce(ty, wk.int)?;
                return self.jump(if_zero(cmp), label);
            }
            self.coerce(ty, wk.boolean)?;
            let opcode = if cmp == BinaryOp::Eq { Opcode::IfNe } else { Opcode::IfEq };
            return self.jump(opcode, label);
        }

        let (lt, rt) = (self.type_of(left)?, self.type_of(right)?);
        if let (Some(a), Some(b)) = (ctx.numeric_kind(lt), ctx.numeric_kind(rt)) {
            let kind = promote(a, b);
            if !kind.is_arbitrary() {
                self.require_resolved(expr)?;
                self.record(expr, EmissionPath::Static);
                let operand = ctx.numeric_type(kind);
                self.value(left, operand)?;
                self.value(right, operand)?;
                return match kind {
                    NumericKind::Long => {
                        self.op(Opcode::Lcmp)?;
                        self.jump(if_zero(cmp), label)
                    }
                    NumericKind::Float => {
                        self.op(Opcode::Fcmpl)?;
                        self.jump(if_zero(cmp), label)
                    }
                    NumericKind::Double => {
                        self.op(Opcode::Dcmpl)?;
                        self.jump(if_zero(cmp), label)
                    }
                    _ => self.jump(if_icmp(cmp), label),
                };
            }
        }

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            if ctx.is_boolean(lt) && ctx.is_boolean(rt) {
                self.require_resolved(expr)?;
                self.record(expr, EmissionPath::Static);
                self.value(left, wk.boolean)?;
                self.value(right, wk.boolean)?;
                return self.jump(if_icmp(cmp), label);
            }
            // Null-safe equality decided by runtime values
            self.record(expr, EmissionPath::Dynamic);
            self.boxed(left)?;
            self.boxed(right)?;
            self.invoke(Opcode::InvokeStatic, "Helpers", "equals", "(Object,Object)boolean")?;
            let opcode = if cmp == BinaryOp::Eq { Opcode::IfNe } else { Opcode::IfEq };
            return self.jump(opcode, label);
        }

        self.record(expr, EmissionPath::Dynamic);
        self.boxed(left)?;
        self.boxed(right)?;
        self.site("compareTo", 1, CallSiteKind::Method)?;
        self.coerce(wk.dynamic, wk.int)?;
        self.jump(if_zero(cmp), label)
    }

    // ===== Calls =====

    /// Emit a call to a resolved target; returns the type of the pushed
    /// value, or `None` for a void method
    pub(super) fn invoke_target(
        &mut self,
        expr: &Expression,
        target: &MethodTarget,
        receiver: Receiver<'_>,
        args: &[&Expression],
    ) -> CompileResult<Option<TypeId>> {
        let ctx = self.cls.ctx;
        if target.kind == CallKind::Dynamic {
            self.record(expr, EmissionPath::Dynamic);
            self.dynamic_receiver(receiver)?;
            for arg in args {
                self.boxed(arg)?;
            }
            self.site(&target.name, args.len(), CallSiteKind::Method)?;
            return Ok(Some(ctx.well_known().dynamic));
        }

        self.require_resolved(expr)?;
        self.record(expr, EmissionPath::Static);
        if args.len() != target.params.len() {
            return Err(CompileError::internal(format!(
                "{} takes {} arguments, {} given",
                target.signature(ctx),
                target.params.len(),
                args.len()
            )));
        }
        match (receiver, target.is_static()) {
            (Receiver::Expr(object), true) => {
                self.expr(object)?;
                self.op(Opcode::Pop)?;
            }
            (Receiver::Expr(object), false) => self.boxed(object)?,
            (Receiver::This, false) => self.load_receiver()?,
            (Receiver::This | Receiver::Class(_), true) => {}
            (Receiver::Class(owner), false) => {
                return Err(CompileError::internal(format!(
                    "instance method {}.{} called without a receiver",
                    owner, target.name
                )))
            }
        }
        for (arg, &param) in args.iter().zip(&target.params) {
            self.value(arg, param)?;
        }
        let opcode = match target.kind {
            CallKind::Interface => Opcode::InvokeInterface,
            CallKind::Static => Opcode::InvokeStatic,
            CallKind::Virtual | CallKind::Dynamic => Opcode::InvokeVirtual,
        };
        self.invoke(opcode, &target.owner_name, &target.name, &target.descriptor(ctx))?;
        Ok((!self.is_void(target.return_type)).then_some(target.return_type))
    }

    fn dynamic_receiver(&mut self, receiver: Receiver<'_>) -> CompileResult<()> {
        match receiver {
            Receiver::Expr(object) => self.boxed(object),
            Receiver::This => self.load_receiver(),
            Receiver::Class(owner) => self.ldc_class(owner),
        }
    }

    /// Convert a call result to the node type; a void result pushes null
    /// only when the value is wanted
    pub(super) fn finish_call(
        &mut self,
        expr: &Expression,
        pushed: Option<TypeId>,
        want: bool,
    ) -> CompileResult<bool> {
        match pushed {
            Some(ty) => {
                let target = self.type_of(expr)?;
                self.coerce(ty, target)?;
                Ok(true)
            }
            None if want => {
                self.op(Opcode::AconstNull)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn method_call(
        &mut self,
        expr: &Expression,
        receiver: &Expression,
        method: &str,
        args: &[Expression],
        want: bool,
    ) -> CompileResult<bool> {
        let args: Vec<&Expression> = args.iter().collect();
        if let Some(target) = self.cls.ann.target(expr.id).cloned() {
            let pushed = self.invoke_target(expr, &target, Receiver::Expr(receiver), &args)?;
            return self.finish_call(expr, pushed, want);
        }
        self.record(expr, EmissionPath::Dynamic);
        self.boxed(receiver)?;
        for arg in &args {
            self.boxed(arg)?;
        }
        self.site(method, args.len(), CallSiteKind::Method)?;
        self.after_dynamic(expr)?;
        Ok(true)
    }

    fn static_call(
        &mut self,
        expr: &Expression,
        owner: &str,
        method: &str,
        args: &[Expression],
        want: bool,
    ) -> CompileResult<bool> {
        let args: Vec<&Expression> = args.iter().collect();
        if let Some(target) = self.cls.ann.target(expr.id).cloned() {
            let pushed = self.invoke_target(expr, &target, Receiver::Class(owner), &args)?;
            return self.finish_call(expr, pushed, want);
        }
        self.record(expr, EmissionPath::Dynamic);
        self.ldc_class(owner)?;
        for arg in &args {
            self.boxed(arg)?;
        }
        self.site(method, args.len(), CallSiteKind::Method)?;
        self.after_dynamic(expr)?;
        Ok(true)
    }

    fn call(
        &mut self,
        expr: &Expression,
        callee: &Expression,
        args: &[Expression],
        want: bool,
    ) -> CompileResult<bool> {
        let ann = self.cls.ann;
        let args: Vec<&Expression> = args.iter().collect();

        // Implicit call of a method of the enclosing class
        if let Some(target) = ann.target(expr.id).cloned() {
            let owner = self.cls.file.name.clone();
            let receiver = if target.is_static() {
                Receiver::Class(&owner)
            } else {
                Receiver::This
            };
            let pushed = self.invoke_target(expr, &target, receiver, &args)?;
            return self.finish_call(expr, pushed, want);
        }

        self.record(expr, EmissionPath::Dynamic);
        if let ExprKind::Variable { name } = &callee.kind {
            if ann.var_ref(callee.id).is_none() && ann.field(callee.id).is_none() {
                self.load_receiver()?;
                for arg in &args {
                    self.boxed(arg)?;
                }
                self.site(name, args.len(), CallSiteKind::Method)?;
                self.after_dynamic(expr)?;
                return Ok(true);
            }
        }
        self.boxed(callee)?;
        for arg in &args {
            self.boxed(arg)?;
        }
        self.site("call", args.len(), CallSiteKind::Call)?;
        self.after_dynamic(expr)?;
        Ok(true)
    }

    fn new_object(&mut self, expr: &Expression, class: &str, args: &[Expression]) -> CompileResult<()> {
        let args: Vec<&Expression> = args.iter().collect();
        match self.cls.ann.target(expr.id).cloned() {
            Some(target) if target.is_constructor() => {
                self.require_resolved(expr)?;
                self.record(expr, EmissionPath::Static);
                self.class_op(Opcode::New, &target.owner_name)?;
                self.op(Opcode::Dup)?;
                for (arg, &param) in args.iter().zip(&target.params) {
                    self.value(arg, param)?;
                }
                let descriptor = target.descriptor(self.cls.ctx);
                self.invoke(
                    Opcode::InvokeSpecial,
                    &target.owner_name,
                    MethodDecl::CONSTRUCTOR,
                    &descriptor,
                )
            }
            _ => {
                self.record(expr, EmissionPath::Dynamic);
                for arg in &args {
                    self.boxed(arg)?;
                }
                self.site(class, args.len(), CallSiteKind::Constructor)?;
                self.after_dynamic(expr)
            }
        }
    }

    // ===== Properties and subscripts =====

    fn property(&mut self, expr: &Expression, object: &Expression, name: &str) -> CompileResult<()> {
        let ann = self.cls.ann;
        if let Some(field) = ann.field(expr.id).cloned() {
            self.require_resolved(expr)?;
            self.record(expr, EmissionPath::Static);
            self.get_field(&field, Some(object))?;
            let ty = self.type_of(expr)?;
            return self.coerce(field.ty, ty);
        }
        if let Some(getter) = ann.target(expr.id).cloned() {
            let pushed = self.invoke_target(expr, &getter, Receiver::Expr(object), &[])?;
            return self.finish_call(expr, pushed, true).map(drop);
        }
        let object_ty = self.type_of(object)?;
        if name == "length" && self.cls.ctx.component(object_ty).is_some() {
            self.require_resolved(expr)?;
            self.record(expr, EmissionPath::Static);
            self.expr(object)?;
            return self.op(Opcode::ArrayLength);
        }
        self.record(expr, EmissionPath::Dynamic);
        self.boxed(object)?;
        self.site(name, 0, CallSiteKind::GetProperty)?;
        self.after_dynamic(expr)
    }

    fn index(&mut self, expr: &Expression, object: &Expression, index: &Expression) -> CompileResult<()> {
        let ctx = self.cls.ctx;
        let object_ty = self.type_of(object)?;
        if let Some(component) = ctx.component(object_ty) {
            self.require_resolved(expr)?;
            self.record(expr, EmissionPath::Static);
            self.expr(object)?;
            self.value(index, ctx.well_known().int)?;
            self.op(self.array_load_op(component))?;
            let ty = self.type_of(expr)?;
            return self.coerce(component, ty);
        }
        if let Some(getter) = self.cls.ann.target(expr.id).cloned() {
            let pushed = self.invoke_target(expr, &getter, Receiver::Expr(object), &[index])?;
            return self.finish_call(expr, pushed, true).map(drop);
        }
        self.record(expr, EmissionPath::Dynamic);
        self.boxed(object)?;
        self.boxed(index)?;
        self.site("getAt", 1, CallSiteKind::Method)?;
        self.after_dynamic(expr)
    }

    // ===== Assignment =====

    pub(super) fn assign(
        &mut self,
        expr: &Expression,
        target: &Expression,
        value: &Expression,
        want: bool,
    ) -> CompileResult<()> {
        let ann = self.cls.ann;
        self.locals.enter_scope();
        let result = match &target.kind {
            ExprKind::Variable { name } => {
                if let Some(local) = ann.var_ref(target.id) {
                    self.record(expr, EmissionPath::Static);
                    self.record(target, EmissionPath::Static);
                    let ty = self.local_info(local)?.ty;
                    self.value(value, ty)?;
                    let kept = self.keep_value(ty, want)?;
                    self.store_local(local)?;
                    self.reload(kept, expr)
                } else if let Some(field) = ann.field(target.id).cloned() {
                    self.put_field(expr, target, &field, None, value, want)
                } else if let Some(setter) = ann.target(target.id).cloned() {
                    self.assign_through(expr, &setter, Receiver::This, &[], value, want)
                } else {
                    self.record(expr, EmissionPath::Dynamic);
                    self.record(target, EmissionPath::Dynamic);
                    self.load_receiver()?;
                    self.boxed(value)?;
                    let kept = self.keep_value(self.cls.ctx.well_known().dynamic, want)?;
                    self.site(name, 1, CallSiteKind::SetProperty)?;
                    self.reload(kept, expr)
                }
            }
            ExprKind::Property { object, name } => {
                if let Some(field) = ann.field(target.id).cloned() {
                    self.put_field(expr, target, &field, Some(object), value, want)
                } else if let Some(setter) = ann.target(target.id).cloned() {
                    self.assign_through(expr, &setter, Receiver::Expr(object), &[], value, want)
                } else {
                    self.record(expr, EmissionPath::Dynamic);
                    self.record(target, EmissionPath::Dynamic);
                    self.boxed(object)?;
                    self.boxed(value)?;
                    let kept = self.keep_value(self.cls.ctx.well_known().dynamic, want)?;
                    self.site(name, 1, CallSiteKind::SetProperty)?;
                    self.reload(kept, expr)
                }
            }
            ExprKind::Index { object, index } => {
                let object_ty = self.type_of(object)?;
                if let Some(component) = self.cls.ctx.component(object_ty) {
                    self.require_resolved(expr)?;
                    self.record(expr, EmissionPath::Static);
                    self.record(target, EmissionPath::Static);
                    self.expr(object)?;
                    self.value(index, self.cls.ctx.well_known().int)?;
                    self.value(value, component)?;
                    let kept = self.keep_value(component, want)?;
                    self.op(self.array_store_op(component))?;
                    self.reload(kept, expr)
                } else if let Some(setter) = ann.target(target.id).cloned() {
                    self.assign_through(expr, &setter, Receiver::Expr(object), &[index], value, want)
                } else {
                    self.record(expr, EmissionPath::Dynamic);
                    self.record(target, EmissionPath::Dynamic);
                    self.boxed(object)?;
                    self.boxed(index)?;
                    self.boxed(value)?;
                    let kept = self.keep_value(self.cls.ctx.well_known().dynamic, want)?;
                    self.site("putAt", 2, CallSiteKind::Method)?;
                    self.op(Opcode::Pop)?;
                    self.reload(kept, expr)
                }
            }
            _ => Err(CompileError::internal(format!(
                "node {} is not assignable",
                target.id
            ))),
        };
        self.locals.exit_scope();
        result
    }

    fn put_field(
        &mut self,
        expr: &Expression,
        target: &Expression,
        field: &FieldTarget,
        object: Option<&Expression>,
        value: &Expression,
        want: bool,
    ) -> CompileResult<()> {
        self.require_resolved(expr)?;
        self.record(expr, EmissionPath::Static);
        self.record(target, EmissionPath::Static);
        let descriptor = self.type_name(field.ty);
        if field.is_static {
            if let Some(object) = object {
                self.expr(object)?;
                self.op(Opcode::Pop)?;
            }
            self.value(value, field.ty)?;
            let kept = self.keep_value(field.ty, want)?;
            self.field_op(Opcode::PutStatic, &field.owner_name, &field.name, &descriptor)?;
            return self.reload(kept, expr);
        }
        match object {
            Some(object) => self.expr(object)?,
            None => self.op_local(Opcode::Aload, 0)?,
        }
        self.value(value, field.ty)?;
        let kept = self.keep_value(field.ty, want)?;
        self.field_op(Opcode::PutField, &field.owner_name, &field.name, &descriptor)?;
        self.reload(kept, expr)
    }

    /// Assignment performed by a setter-like method (`setX`, `set`); the
    /// method's own result is dropped
    fn assign_through(
        &mut self,
        expr: &Expression,
        setter: &MethodTarget,
        receiver: Receiver<'_>,
        leading: &[&Expression],
        value: &Expression,
        want: bool,
    ) -> CompileResult<()> {
        if setter.kind == CallKind::Dynamic {
            self.record(expr, EmissionPath::Dynamic);
            self.dynamic_receiver(receiver)?;
            for arg in leading {
                self.boxed(arg)?;
            }
            self.boxed(value)?;
            let kept = self.keep_value(self.cls.ctx.well_known().dynamic, want)?;
            self.site(&setter.name, leading.len() + 1, CallSiteKind::Method)?;
            self.op(Opcode::Pop)?;
            return self.reload(kept, expr);
        }

        self.require_resolved(expr)?;
        self.record(expr, EmissionPath::Static);
        let Some((&value_ty, leading_params)) = setter.params.split_last() else {
            return Err(CompileError::internal(format!("setter {} takes no value", setter.name)));
        };
        if leading_params.len() != leading.len() {
            return Err(CompileError::internal(format!("setter {} arity mismatch", setter.name)));
        }
        match receiver {
            Receiver::Expr(object) => self.boxed(object)?,
            Receiver::This => self.load_receiver()?,
            Receiver::Class(_) => {}
        }
        for (arg, &param) in leading.iter().zip(leading_params) {
            self.value(arg, param)?;
        }
        self.value(value, value_ty)?;
        let kept = self.keep_value(value_ty, want)?;
        let opcode = match setter.kind {
            CallKind::Interface => Opcode::InvokeInterface,
            CallKind::Static => Opcode::InvokeStatic,
            CallKind::Virtual | CallKind::Dynamic => Opcode::InvokeVirtual,
        };
        let descriptor = setter.descriptor(self.cls.ctx);
        self.invoke(opcode, &setter.owner_name, &setter.name, &descriptor)?;
        if !self.is_void(setter.return_type) {
            self.op(Opcode::Pop)?;
        }
        self.reload(kept, expr)
    }

    // ===== Literals with structure =====

    fn array(&mut self, expr: &Expression, elements: &[Expression]) -> CompileResult<()> {
        self.record(expr, EmissionPath::Static);
        let ty = self.type_of(expr)?;
        let component = self
            .cls
            .ctx
            .component(ty)
            .ok_or_else(|| CompileError::internal(format!("array literal {} has no component", expr.id)))?;
        let length = i32::try_from(elements.len()).map_err(|_| CompileError::TooManyArguments)?;
        self.iconst(length)?;
        let component_name = self.type_name(component);
        self.class_op(Opcode::NewArray, &component_name)?;
        let store = self.array_store_op(component);
        for (position, element) in (0..length).zip(elements) {
            self.op(Opcode::Dup)?;
            self.iconst(position)?;
            self.value(element, component)?;
            self.op(store)?;
        }
        Ok(())
    }

    fn ternary(
        &mut self,
        expr: &Expression,
        cond: &Expression,
        then: &Expression,
        otherwise: &Expression,
    ) -> CompileResult<()> {
        self.record(expr, EmissionPath::Static);
        let ty = self.type_of(expr)?;
        let baseline = self.stack.depth();
        let when_false = self.code.new_label();
        let end = self.code.new_label();
        self.branch(cond, when_false, false)?;
        self.value(then, ty)?;
        self.jump(Opcode::Goto, end)?;
        self.stack.set_depth(baseline);
        self.bind(when_false)?;
        self.value(otherwise, ty)?;
        self.bind(end)
    }

    // ===== Closures =====

    fn closure(&mut self, expr: &Expression, body: &Block) -> CompileResult<()> {
        let info = self
            .cls
            .ann
            .closure(expr.id)
            .cloned()
            .ok_or_else(|| CompileError::internal(format!("closure {} was not annotated", expr.id)))?;
        self.record(expr, EmissionPath::Static);

        let name = self.cls.next_closure_name();
        let mut params: Vec<String> = vec!["Object".to_string(); info.captures.len()];
        for &param in &info.params {
            let ty = self.local_info(param)?.ty;
            params.push(self.type_name(ty));
        }
        let descriptor = format!("({})Object", params.join(","));
        let static_context = self.is_static_context();
        let object = self.cls.ctx.well_known().object;

        let method = {
            let mut inner = MethodEmitter::new(
                &mut *self.cls,
                BodyKind::Closure { static_context },
                object,
            );
            inner.locals.reserve_receiver()?;
            for &capture in &info.captures {
                inner.locals.declare(capture)?;
            }
            inner.bind_locals(&info.params)?;
            inner.closure_body(body)?;
            inner.finish(&name, &descriptor, flags::SYNTHETIC)?
        };
        self.cls.file.methods.push(method);

        if static_context {
            self.op(Opcode::AconstNull)?;
        } else {
            self.op_local(Opcode::Aload, 0)?;
        }
        for &capture in &info.captures {
            let slot = self.slot(capture)?;
            self.op_local(Opcode::Aload, slot)?;
        }
        let owner = self.cls.file.name.clone();
        let method = self.cls.file.constants.add_method(&owner, &name, &descriptor);
        self.make_closure(method, info.captures.len())
    }

    /// Closure bodies yield their last expression statement
    fn closure_body(&mut self, body: &Block) -> CompileResult<()> {
        self.locals.enter_scope();
        match body.statements.split_last() {
            Some((Statement::Expression(last), init)) => {
                for stmt in init {
                    self.stmt(stmt)?;
                }
                self.boxed(last)?;
                self.op(Opcode::Areturn)?;
            }
            Some(_) | None => {
                for stmt in &body.statements {
                    self.stmt(stmt)?;
                }
                self.op(Opcode::AconstNull)?;
                self.op(Opcode::Areturn)?;
            }
        }
        self.locals.exit_scope();
        Ok(())
    }
}

fn arithmetic_opcode(op: BinaryOp, kind: NumericKind) -> Option<Opcode> {
    use Opcode::*;
    let ops = match kind {
        NumericKind::Long => [Ladd, Lsub, Lmul, Ldiv, Lrem],
        NumericKind::Float => [Fadd, Fsub, Fmul, Fdiv, Frem],
        NumericKind::Double => [Dadd, Dsub, Dmul, Ddiv, Drem],
        NumericKind::BigInteger | NumericKind::BigDecimal => return None,
        _ => [Iadd, Isub, Imul, Idiv, Irem],
    };
    match op {
        BinaryOp::Add => Some(ops[0]),
        BinaryOp::Sub => Some(ops[1]),
        BinaryOp::Mul => Some(ops[2]),
        BinaryOp::Div => Some(ops[3]),
        BinaryOp::Rem => Some(ops[4]),
        _ => None,
    }
}

fn negate(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Eq => BinaryOp::Ne,
        BinaryOp::Ne => BinaryOp::Eq,
        BinaryOp::Lt => BinaryOp::Ge,
        BinaryOp::Ge => BinaryOp::Lt,
        BinaryOp::Gt => BinaryOp::Le,
        BinaryOp::Le => BinaryOp::Gt,
        other => other,
    }
}

/// Branch on a `-1/0/1` comparison result
fn if_zero(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Eq => Opcode::IfEq,
        BinaryOp::Ne => Opcode::IfNe,
        BinaryOp::Lt => Opcode::IfLt,
        BinaryOp::Le => Opcode::IfLe,
        BinaryOp::Gt => Opcode::IfGt,
        _ => Opcode::IfGe,
    }
}

fn if_icmp(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Eq => Opcode::IfIcmpEq,
        BinaryOp::Ne => Opcode::IfIcmpNe,
        BinaryOp::Lt => Opcode::IfIcmpLt,
        BinaryOp::Le => Opcode::IfIcmpLe,
        BinaryOp::Gt => Opcode::IfIcmpGt,
        _ => Opcode::IfIcmpGe,
    }
}
