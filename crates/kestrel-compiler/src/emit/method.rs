//! Per-method emission state and instruction helpers

use super::code::{CodeBuilder, Label};
use super::locals::CompileStack;
use super::report::EmissionPath;
use super::stack::OperandStack;
use super::ClassState;
use crate::error::{CompileError, CompileResult};
use kestrel_ast::Expression;
use kestrel_bytecode::{
    stack_effect, CallSiteDescriptor, CallSiteKind, Constant, Instruction, MethodInfo, Opcode,
    Operand,
};
use kestrel_checker::{LocalId, LocalInfo, MethodKey, NodeState};
use kestrel_types::{
    plan_type_coercion, CoercionStep, NumericKind, PrimitiveKind, Scalar, TypeId,
};
use tracing::trace;

/// What kind of body is being emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Method { is_static: bool },
    Constructor,
    /// Synthetic closure method; slot 0 holds the owner
    Closure { static_context: bool },
}

/// Machine representation of a value for typed loads, stores and returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SlotKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

pub(crate) struct MethodEmitter<'s, 'a> {
    pub(super) cls: &'s mut ClassState<'a>,
    pub(super) code: CodeBuilder,
    pub(super) stack: OperandStack,
    pub(super) locals: CompileStack,
    pub(super) return_type: TypeId,
    pub(super) kind: BodyKind,
}

impl<'s, 'a> MethodEmitter<'s, 'a> {
    pub(crate) fn new(cls: &'s mut ClassState<'a>, kind: BodyKind, return_type: TypeId) -> Self {
        MethodEmitter {
            cls,
            code: CodeBuilder::new(),
            stack: OperandStack::new(),
            locals: CompileStack::new(),
            return_type,
            kind,
        }
    }

    /// Assemble the method; consumes the emitter
    pub(crate) fn finish(self, name: &str, descriptor: &str, flags: u32) -> CompileResult<MethodInfo> {
        let max_locals = self.locals.max_locals()?;
        let max_stack = u16::try_from(self.stack.max()).map_err(|_| CompileError::StackTooDeep)?;
        let code = self.code.finish()?;
        trace!(
            method = name,
            descriptor,
            max_locals,
            max_stack,
            size = code.len(),
            "finished method"
        );
        Ok(MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            max_locals,
            max_stack,
            code,
        })
    }

    pub(super) fn is_static_context(&self) -> bool {
        match self.kind {
            BodyKind::Method { is_static } => is_static,
            BodyKind::Constructor => false,
            BodyKind::Closure { static_context } => static_context,
        }
    }

    // ===== Annotation access =====

    pub(super) fn type_of(&self, expr: &Expression) -> CompileResult<TypeId> {
        self.cls
            .ann
            .type_of(expr.id)
            .ok_or_else(|| CompileError::internal(format!("node {} has no type", expr.id)))
    }

    /// Static-path emission needs a fully resolved node
    pub(super) fn require_resolved(&self, expr: &Expression) -> CompileResult<()> {
        match self.cls.ann.state(expr.id) {
            NodeState::Resolved => Ok(()),
            state => Err(CompileError::internal(format!(
                "static path requested for node {} in state {:?}",
                expr.id, state
            ))),
        }
    }

    pub(super) fn local_info(&self, local: LocalId) -> CompileResult<LocalInfo> {
        self.cls
            .ann
            .local(local)
            .cloned()
            .ok_or_else(|| CompileError::internal(format!("unknown local {:?}", local)))
    }

    pub(super) fn record(&mut self, expr: &Expression, path: EmissionPath) {
        trace!(node = %expr.id, %path, "emission path");
        self.cls.report.record(expr.id, path);
    }

    // ===== Types =====

    /// Erased class-file name of a type
    pub(super) fn type_name(&self, ty: TypeId) -> String {
        let ctx = self.cls.ctx;
        ctx.display(ctx.erase(ty))
    }

    pub(super) fn is_void(&self, ty: TypeId) -> bool {
        self.cls.ctx.primitive(ty) == Some(PrimitiveKind::Void)
    }

    pub(super) fn slot_kind(&self, ty: TypeId) -> SlotKind {
        match self.cls.ctx.primitive(ty) {
            Some(
                PrimitiveKind::Boolean
                | PrimitiveKind::Byte
                | PrimitiveKind::Short
                | PrimitiveKind::Char
                | PrimitiveKind::Int,
            ) => SlotKind::Int,
            Some(PrimitiveKind::Long) => SlotKind::Long,
            Some(PrimitiveKind::Float) => SlotKind::Float,
            Some(PrimitiveKind::Double) => SlotKind::Double,
            Some(PrimitiveKind::Void) | None => SlotKind::Reference,
        }
    }

    pub(super) fn load_op(&self, ty: TypeId) -> Opcode {
        match self.slot_kind(ty) {
            SlotKind::Int => Opcode::Iload,
            SlotKind::Long => Opcode::Lload,
            SlotKind::Float => Opcode::Fload,
            SlotKind::Double => Opcode::Dload,
            SlotKind::Reference => Opcode::Aload,
        }
    }

    pub(super) fn store_op(&self, ty: TypeId) -> Opcode {
        match self.slot_kind(ty) {
            SlotKind::Int => Opcode::Istore,
            SlotKind::Long => Opcode::Lstore,
            SlotKind::Float => Opcode::Fstore,
            SlotKind::Double => Opcode::Dstore,
            SlotKind::Reference => Opcode::Astore,
        }
    }

    pub(super) fn return_op(&self, ty: TypeId) -> Opcode {
        if self.is_void(ty) {
            return Opcode::Return;
        }
        match self.slot_kind(ty) {
            SlotKind::Int => Opcode::Ireturn,
            SlotKind::Long => Opcode::Lreturn,
            SlotKind::Float => Opcode::Freturn,
            SlotKind::Double => Opcode::Dreturn,
            SlotKind::Reference => Opcode::Areturn,
        }
    }

    pub(super) fn array_load_op(&self, component: TypeId) -> Opcode {
        match self.cls.ctx.primitive(component) {
            Some(PrimitiveKind::Boolean) => Opcode::Zaload,
            Some(PrimitiveKind::Byte) => Opcode::Baload,
            Some(PrimitiveKind::Char) => Opcode::Caload,
            Some(PrimitiveKind::Short) => Opcode::Saload,
            Some(PrimitiveKind::Int) => Opcode::Iaload,
            Some(PrimitiveKind::Long) => Opcode::Laload,
            Some(PrimitiveKind::Float) => Opcode::Faload,
            Some(PrimitiveKind::Double) => Opcode::Daload,
            Some(PrimitiveKind::Void) | None => Opcode::Aaload,
        }
    }

    pub(super) fn array_store_op(&self, component: TypeId) -> Opcode {
        match self.cls.ctx.primitive(component) {
            Some(PrimitiveKind::Boolean) => Opcode::Zastore,
            Some(PrimitiveKind::Byte) => Opcode::Bastore,
            Some(PrimitiveKind::Char) => Opcode::Castore,
            Some(PrimitiveKind::Short) => Opcode::Sastore,
            Some(PrimitiveKind::Int) => Opcode::Iastore,
            Some(PrimitiveKind::Long) => Opcode::Lastore,
            Some(PrimitiveKind::Float) => Opcode::Fastore,
            Some(PrimitiveKind::Double) => Opcode::Dastore,
            Some(PrimitiveKind::Void) | None => Opcode::Aastore,
        }
    }

    // ===== Instructions =====

    fn apply(&mut self, offset: usize, opcode: Opcode, operand: Operand) -> CompileResult<()> {
        let instr = Instruction {
            offset,
            opcode,
            operand,
        };
        let (pops, pushes) = stack_effect(&self.cls.file, &instr);
        self.stack.pop(pops)?;
        self.stack.push(pushes);
        Ok(())
    }

    pub(super) fn op(&mut self, opcode: Opcode) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_opcode(opcode);
        self.apply(offset, opcode, Operand::None)
    }

    pub(super) fn op_local(&mut self, opcode: Opcode, slot: u16) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_local(opcode, slot);
        self.apply(offset, opcode, Operand::Local(slot))
    }

    pub(super) fn op_pool(&mut self, opcode: Opcode, index: u32) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_pool(opcode, index);
        self.apply(offset, opcode, Operand::Pool(index))
    }

    pub(super) fn op_tag(&mut self, opcode: Opcode, tag: u8) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_tag(opcode, tag);
        self.apply(offset, opcode, Operand::Tag(tag))
    }

    pub(super) fn iconst(&mut self, value: i32) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_iconst(value);
        self.apply(offset, Opcode::Iconst, Operand::I32(value))
    }

    pub(super) fn lconst(&mut self, value: i64) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_lconst(value);
        self.apply(offset, Opcode::Lconst, Operand::I64(value))
    }

    pub(super) fn fconst(&mut self, value: f32) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_fconst(value);
        self.apply(offset, Opcode::Fconst, Operand::F32(value))
    }

    pub(super) fn dconst(&mut self, value: f64) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.writer().emit_dconst(value);
        self.apply(offset, Opcode::Dconst, Operand::F64(value))
    }

    pub(super) fn iinc(&mut self, slot: u16, delta: i16) {
        self.code.writer().emit_iinc(slot, delta);
    }

    pub(super) fn ldc(&mut self, constant: Constant) -> CompileResult<()> {
        let index = self.cls.file.constants.add(constant);
        self.op_pool(Opcode::Ldc, index)
    }

    pub(super) fn ldc_class(&mut self, name: &str) -> CompileResult<()> {
        self.ldc(Constant::Class(name.to_string()))
    }

    pub(super) fn class_op(&mut self, opcode: Opcode, class: &str) -> CompileResult<()> {
        let index = self.cls.file.constants.add_class(class);
        self.op_pool(opcode, index)
    }

    pub(super) fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> CompileResult<()> {
        let index = self.cls.file.constants.add_method(owner, name, descriptor);
        self.op_pool(opcode, index)
    }

    pub(super) fn field_op(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> CompileResult<()> {
        let index = self.cls.file.constants.add_field(owner, name, descriptor);
        self.op_pool(opcode, index)
    }

    /// `INVOKEDYNAMIC` through a (deduplicated) call-site descriptor
    pub(super) fn site(&mut self, name: &str, args: usize, kind: CallSiteKind) -> CompileResult<()> {
        let arg_count = u16::try_from(args).map_err(|_| CompileError::TooManyArguments)?;
        let index = self
            .cls
            .file
            .add_call_site(CallSiteDescriptor::new(name, arg_count, kind));
        let offset = self.code.offset();
        self.code.writer().emit_invoke_dynamic(index);
        self.apply(offset, Opcode::InvokeDynamic, Operand::Site(index))
    }

    pub(super) fn new_list(&mut self, count: usize) -> CompileResult<()> {
        let count = u16::try_from(count).map_err(|_| CompileError::TooManyArguments)?;
        let offset = self.code.offset();
        self.code.writer().emit_count(Opcode::NewList, count);
        self.apply(offset, Opcode::NewList, Operand::Count(count))
    }

    pub(super) fn make_closure(&mut self, method: u32, captures: usize) -> CompileResult<()> {
        let captures = u16::try_from(captures).map_err(|_| CompileError::TooManyLocals)?;
        let offset = self.code.offset();
        self.code.writer().emit_make_closure(method, captures);
        self.apply(offset, Opcode::MakeClosure, Operand::Closure { method, captures })
    }

    pub(super) fn jump(&mut self, opcode: Opcode, label: Label) -> CompileResult<()> {
        let offset = self.code.offset();
        self.code.jump(opcode, label);
        self.apply(offset, opcode, Operand::Branch(0))
    }

    pub(super) fn bind(&mut self, label: Label) -> CompileResult<()> {
        self.code.bind(label)
    }

    /// Pop values left above `baseline`
    pub(super) fn pop_down_to(&mut self, baseline: usize) -> CompileResult<()> {
        for _ in 0..self.stack.excess_over(baseline) {
            self.op(Opcode::Pop)?;
        }
        Ok(())
    }

    /// Receiver for implicit calls and properties: `this`, or the class
    /// itself in a static context
    pub(super) fn load_receiver(&mut self) -> CompileResult<()> {
        if self.is_static_context() {
            let name = self.cls.file.name.clone();
            self.ldc_class(&name)
        } else {
            self.op_local(Opcode::Aload, 0)
        }
    }

    /// Zero or null of the given type
    pub(super) fn default_value(&mut self, ty: TypeId) -> CompileResult<()> {
        if self.is_void(ty) {
            return self.op(Opcode::AconstNull);
        }
        match self.slot_kind(ty) {
            SlotKind::Int => self.iconst(0),
            SlotKind::Long => self.lconst(0),
            SlotKind::Float => self.fconst(0.0),
            SlotKind::Double => self.dconst(0.0),
            SlotKind::Reference => self.op(Opcode::AconstNull),
        }
    }

    // ===== Locals =====

    /// Bind a method's parameters to slots; captured ones move into cells
    pub(super) fn bind_params(&mut self, key: &MethodKey) -> CompileResult<()> {
        let params = self
            .cls
            .ann
            .method_params(key)
            .map(<[LocalId]>::to_vec)
            .ok_or_else(|| {
                CompileError::internal(format!("no parameters recorded for {}#{}", key.class, key.index))
            })?;
        self.bind_locals(&params)
    }

    pub(super) fn bind_locals(&mut self, params: &[LocalId]) -> CompileResult<()> {
        for &param in params {
            self.locals.declare(param)?;
        }
        for &param in params {
            if self.local_info(param)?.captured {
                let slot = self.slot(param)?;
                let ty = self.local_info(param)?.ty;
                self.op_local(self.load_op(ty), slot)?;
                self.op(Opcode::NewRef)?;
                self.op_local(Opcode::Astore, slot)?;
            }
        }
        Ok(())
    }

    pub(super) fn slot(&self, local: LocalId) -> CompileResult<u16> {
        self.locals
            .slot_of(local)
            .ok_or_else(|| CompileError::internal(format!("local {:?} has no slot", local)))
    }

    pub(super) fn load_local(&mut self, local: LocalId) -> CompileResult<()> {
        let info = self.local_info(local)?;
        let slot = self.slot(local)?;
        if info.captured {
            self.op_local(Opcode::Aload, slot)?;
            self.op(Opcode::RefGet)
        } else {
            self.op_local(self.load_op(info.ty), slot)
        }
    }

    /// Store the value on top of the stack into `local`
    pub(super) fn store_local(&mut self, local: LocalId) -> CompileResult<()> {
        let info = self.local_info(local)?;
        let slot = self.slot(local)?;
        if info.captured {
            self.op_local(Opcode::Aload, slot)?;
            self.op(Opcode::Swap)?;
            self.op(Opcode::RefSet)
        } else {
            self.op_local(self.store_op(info.ty), slot)
        }
    }

    /// Give a captured local a fresh cell holding the value on the stack
    pub(super) fn store_new_cell(&mut self, local: LocalId) -> CompileResult<()> {
        let slot = self.slot(local)?;
        self.op(Opcode::NewRef)?;
        self.op_local(Opcode::Astore, slot)
    }

    /// Duplicate the value on top into a temporary when the caller needs it
    /// after a consuming instruction
    pub(super) fn keep_value(&mut self, ty: TypeId, want: bool) -> CompileResult<Option<(u16, TypeId)>> {
        if !want {
            return Ok(None);
        }
        self.op(Opcode::Dup)?;
        let slot = self.locals.temp()?;
        self.op_local(self.store_op(ty), slot)?;
        Ok(Some((slot, ty)))
    }

    pub(super) fn reload(&mut self, kept: Option<(u16, TypeId)>, expr: &Expression) -> CompileResult<()> {
        if let Some((slot, ty)) = kept {
            self.op_local(self.load_op(ty), slot)?;
            let target = self.type_of(expr)?;
            self.coerce(ty, target)?;
        }
        Ok(())
    }

    // ===== Coercions =====

    /// Convert the value on top of the stack from `from` to `to`
    pub(super) fn coerce(&mut self, from: TypeId, to: TypeId) -> CompileResult<()> {
        let ctx = self.cls.ctx;
        let wk = ctx.well_known();
        // A void call in value position left null behind
        let from = if self.is_void(from) { wk.null } else { from };
        if from == to || self.is_void(to) {
            return Ok(());
        }

        if Scalar::of_type(ctx, from).is_some() && Scalar::of_type(ctx, to).is_some() {
            let plan = plan_type_coercion(ctx, from, to)
                .map_err(|e| CompileError::internal(format!("unplanned coercion: {}", e)))?;
            for step in plan.steps {
                match step {
                    CoercionStep::Unbox(kind) => self.op_tag(Opcode::Unbox, kind.tag())?,
                    CoercionStep::Box(kind) => self.op_tag(Opcode::Box, kind.tag())?,
                    CoercionStep::Convert { from, to } => self.convert(from, to)?,
                }
            }
            return Ok(());
        }

        match (ctx.primitive(from), ctx.primitive(to)) {
            (Some(kind), _) => self.op_tag(Opcode::Box, kind.tag()),
            (None, Some(kind)) => self.op_tag(Opcode::Unbox, kind.tag()),
            (None, None) => {
                let (from, to) = (ctx.erase(from), ctx.erase(to));
                if ctx.is_dynamic(to) || to == wk.object || from == wk.null || ctx.is_subtype(from, to)
                {
                    Ok(())
                } else {
                    let name = self.type_name(to);
                    self.class_op(Opcode::CheckCast, &name)
                }
            }
        }
    }

    /// Values produced by a call site are untyped; unbox or cast them to
    /// the node's annotated type
    pub(super) fn after_dynamic(&mut self, expr: &Expression) -> CompileResult<()> {
        let dynamic = self.cls.ctx.well_known().dynamic;
        let ty = self.type_of(expr)?;
        self.coerce(dynamic, ty)
    }

    fn convert(&mut self, from: NumericKind, to: NumericKind) -> CompileResult<()> {
        use NumericKind::*;
        if from == to {
            return Ok(());
        }
        if from.is_arbitrary() || to.is_arbitrary() {
            return self.op_tag(Opcode::ToNumeric, to.tag());
        }
        let family = |kind: NumericKind| match kind {
            Byte | Short | Char => Int,
            other => other,
        };
        let widen = match (family(from), family(to)) {
            (Int, Long) => Some(Opcode::I2l),
            (Int, Float) => Some(Opcode::I2f),
            (Int, Double) => Some(Opcode::I2d),
            (Long, Int) => Some(Opcode::L2i),
            (Long, Float) => Some(Opcode::L2f),
            (Long, Double) => Some(Opcode::L2d),
            (Float, Int) => Some(Opcode::F2i),
            (Float, Long) => Some(Opcode::F2l),
            (Float, Double) => Some(Opcode::F2d),
            (Double, Int) => Some(Opcode::D2i),
            (Double, Long) => Some(Opcode::D2l),
            (Double, Float) => Some(Opcode::D2f),
            _ => None,
        };
        if let Some(opcode) = widen {
            self.op(opcode)?;
        }
        match to {
            Byte => self.op(Opcode::I2b),
            Short => self.op(Opcode::I2s),
            Char => self.op(Opcode::I2c),
            // byte, short and char already sit in an int slot
            Int if widen.is_none() => self.op_tag(Opcode::ToNumeric, Int.tag()),
            _ => Ok(()),
        }
    }
}
