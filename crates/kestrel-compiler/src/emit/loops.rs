//! Loop emission
//!
//! `for-in` loops lower to one of three shapes picked by the annotator. All
//! of them skip the body when the source is null and leave the operand
//! stack at the depth it had before the loop.

use super::method::MethodEmitter;
use crate::error::{CompileError, CompileResult};
use kestrel_ast::{Block, Expression, NodeId};
use kestrel_bytecode::Opcode;
use kestrel_checker::{LocalId, LoopForm};
use kestrel_types::TypeId;
use tracing::trace;

impl<'s, 'a> MethodEmitter<'s, 'a> {
    pub(super) fn while_loop(&mut self, cond: &Expression, body: &Block) -> CompileResult<()> {
        let baseline = self.stack.depth();
        let head = self.code.new_label();
        let exit = self.code.new_label();
        self.bind(head)?;
        self.branch(cond, exit, false)?;
        self.locals.push_loop(exit, head);
        self.block(body)?;
        self.locals.pop_loop();
        self.jump(Opcode::Goto, head)?;
        self.bind(exit)?;
        self.pop_down_to(baseline)
    }

    pub(super) fn for_in(&mut self, id: NodeId, iterable: &Expression, body: &Block) -> CompileResult<()> {
        let ann = self.cls.ann;
        let form = ann
            .loop_form(id)
            .ok_or_else(|| CompileError::internal(format!("loop {} was not classified", id)))?;
        let local = ann
            .decl_local(id)
            .ok_or_else(|| CompileError::internal(format!("loop {} has no variable", id)))?;
        trace!(node = %id, ?form, "for-in");
        self.cls.report.record_loop(id, form);

        let baseline = self.stack.depth();
        self.locals.enter_scope();
        let result = match form {
            LoopForm::IndexedArray { component } => self.indexed_loop(local, component, iterable, body),
            LoopForm::Enumeration => self.pull_loop(local, iterable, body, PullShape::Enumeration),
            LoopForm::Iterator { direct } => {
                self.pull_loop(local, iterable, body, PullShape::Iterator { direct })
            }
        };
        self.locals.exit_scope();
        result?;
        self.pop_down_to(baseline)
    }

    fn indexed_loop(
        &mut self,
        local: LocalId,
        component: TypeId,
        iterable: &Expression,
        body: &Block,
    ) -> CompileResult<()> {
        let array = self.locals.temp()?;
        let length = self.locals.temp()?;
        let index = self.locals.temp()?;
        self.locals.declare(local)?;
        let head = self.code.new_label();
        let step = self.code.new_label();
        let exit = self.code.new_label();

        self.expr(iterable)?;
        self.op_local(Opcode::Astore, array)?;
        self.op_local(Opcode::Aload, array)?;
        self.jump(Opcode::IfNull, exit)?;
        self.op_local(Opcode::Aload, array)?;
        self.op(Opcode::ArrayLength)?;
        self.op_local(Opcode::Istore, length)?;
        self.iconst(0)?;
        self.op_local(Opcode::Istore, index)?;

        self.bind(head)?;
        self.op_local(Opcode::Iload, index)?;
        self.op_local(Opcode::Iload, length)?;
        self.jump(Opcode::IfIcmpGe, exit)?;
        self.op_local(Opcode::Aload, array)?;
        self.op_local(Opcode::Iload, index)?;
        self.op(self.array_load_op(component))?;
        self.bind_element(local, component)?;

        self.locals.push_loop(exit, step);
        self.block(body)?;
        self.locals.pop_loop();

        self.bind(step)?;
        self.iinc(index, 1);
        self.jump(Opcode::Goto, head)?;
        self.bind(exit)
    }

    fn pull_loop(
        &mut self,
        local: LocalId,
        iterable: &Expression,
        body: &Block,
        shape: PullShape,
    ) -> CompileResult<()> {
        let source = self.locals.temp()?;
        self.locals.declare(local)?;
        let head = self.code.new_label();
        let exit = self.code.new_label();

        self.boxed(iterable)?;
        self.op_local(Opcode::Astore, source)?;
        self.op_local(Opcode::Aload, source)?;
        self.jump(Opcode::IfNull, exit)?;

        // The cursor reuses the source slot
        if let PullShape::Iterator { direct } = shape {
            self.op_local(Opcode::Aload, source)?;
            if direct {
                self.invoke(Opcode::InvokeInterface, "Iterable", "iterator", "()Iterator")?;
            } else {
                self.invoke(Opcode::InvokeStatic, "Helpers", "iterator", "(Object)Iterator")?;
            }
            self.op_local(Opcode::Astore, source)?;
        }
        let (owner, has_next, next) = shape.protocol();

        self.bind(head)?;
        self.op_local(Opcode::Aload, source)?;
        self.invoke(Opcode::InvokeInterface, owner, has_next, "()boolean")?;
        self.jump(Opcode::IfEq, exit)?;
        self.op_local(Opcode::Aload, source)?;
        self.invoke(Opcode::InvokeInterface, owner, next, "()Object")?;
        let object = self.cls.ctx.well_known().object;
        self.bind_element(local, object)?;

        self.locals.push_loop(exit, head);
        self.block(body)?;
        self.locals.pop_loop();

        self.jump(Opcode::Goto, head)?;
        self.bind(exit)
    }

    /// Store the element on the stack into the loop variable; a captured
    /// variable gets a fresh cell per iteration
    fn bind_element(&mut self, local: LocalId, element: TypeId) -> CompileResult<()> {
        let info = self.local_info(local)?;
        self.coerce(element, info.ty)?;
        if info.captured {
            self.store_new_cell(local)
        } else {
            self.store_local(local)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PullShape {
    Enumeration,
    Iterator { direct: bool },
}

impl PullShape {
    fn protocol(self) -> (&'static str, &'static str, &'static str) {
        match self {
            PullShape::Enumeration => ("Enumeration", "hasMoreElements", "nextElement"),
            PullShape::Iterator { .. } => ("Iterator", "hasNext", "next"),
        }
    }
}

