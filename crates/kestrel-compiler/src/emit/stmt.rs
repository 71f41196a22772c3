//! Statement emission
//!
//! Statements leave the operand stack at the depth they found it.

use super::method::{BodyKind, MethodEmitter};
use crate::error::{CompileError, CompileResult};
use kestrel_ast::{Block, Expression, NodeId, Statement};
use kestrel_bytecode::Opcode;

impl<'s, 'a> MethodEmitter<'s, 'a> {
    pub(super) fn block(&mut self, block: &Block) -> CompileResult<()> {
        self.locals.enter_scope();
        for stmt in &block.statements {
            self.stmt(stmt)?;
        }
        self.locals.exit_scope();
        Ok(())
    }

    pub(super) fn stmt(&mut self, stmt: &Statement) -> CompileResult<()> {
        match stmt {
            Statement::Expression(expr) => self.discard(expr),
            Statement::VarDecl { id, init, .. } => self.var_decl(*id, init.as_ref()),
            Statement::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                let end = self.code.new_label();
                match otherwise {
                    Some(otherwise) => {
                        let when_false = self.code.new_label();
                        self.branch(cond, when_false, false)?;
                        self.block(then)?;
                        self.jump(Opcode::Goto, end)?;
                        self.bind(when_false)?;
                        self.block(otherwise)?;
                    }
                    None => {
                        self.branch(cond, end, false)?;
                        self.block(then)?;
                    }
                }
                self.bind(end)
            }
            Statement::While { cond, body, .. } => self.while_loop(cond, body),
            Statement::ForIn {
                id, iterable, body, ..
            } => self.for_in(*id, iterable, body),
            Statement::Return { value, .. } => self.return_stmt(value.as_ref()),
            Statement::Block(block) => self.block(block),
            Statement::Break(_) => {
                let target = self.locals.break_target()?;
                self.jump(Opcode::Goto, target)
            }
            Statement::Continue(_) => {
                let target = self.locals.continue_target()?;
                self.jump(Opcode::Goto, target)
            }
        }
    }

    fn var_decl(&mut self, id: NodeId, init: Option<&Expression>) -> CompileResult<()> {
        let local = self
            .cls
            .ann
            .decl_local(id)
            .ok_or_else(|| CompileError::internal(format!("declaration {} has no binding", id)))?;
        let info = self.local_info(local)?;
        self.locals.declare(local)?;

        if info.captured {
            self.default_value(info.ty)?;
            self.store_new_cell(local)?;
            if let Some(init) = init {
                self.value(init, info.ty)?;
                self.store_local(local)?;
            }
            return Ok(());
        }
        match init {
            Some(init) => self.value(init, info.ty)?,
            None => self.default_value(info.ty)?,
        }
        self.store_local(local)
    }

    fn return_stmt(&mut self, value: Option<&Expression>) -> CompileResult<()> {
        if let BodyKind::Closure { .. } = self.kind {
            match value {
                Some(value) => self.boxed(value)?,
                None => self.op(Opcode::AconstNull)?,
            }
            return self.op(Opcode::Areturn);
        }

        let return_type = self.return_type;
        if self.is_void(return_type) {
            if let Some(value) = value {
                self.discard(value)?;
            }
            return self.op(Opcode::Return);
        }
        match value {
            Some(value) => self.value(value, return_type)?,
            None => self.default_value(return_type)?,
        }
        self.op(self.return_op(return_type))
    }

    /// Fall-through tail of a method body
    pub(super) fn implicit_return(&mut self) -> CompileResult<()> {
        let return_type = self.return_type;
        if !self.is_void(return_type) {
            self.default_value(return_type)?;
        }
        self.op(self.return_op(return_type))
    }
}
