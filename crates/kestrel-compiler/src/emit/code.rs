//! Code buffer with symbolic labels
//!
//! Jumps may target labels that are bound later; their operands are patched
//! when the method is finished.

use crate::error::{CompileError, CompileResult};
use kestrel_bytecode::{BytecodeWriter, Opcode};

/// A jump target inside one method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
pub struct CodeBuilder {
    writer: BytecodeWriter,
    /// Bound offset per label
    labels: Vec<Option<usize>>,
    /// Branch operand positions waiting for their label
    fixups: Vec<(usize, Label)>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&mut self) -> &mut BytecodeWriter {
        &mut self.writer
    }

    pub fn offset(&self) -> usize {
        self.writer.offset()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset
    pub fn bind(&mut self, label: Label) -> CompileResult<()> {
        let offset = self.writer.offset();
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => {
                *slot = Some(offset);
                Ok(())
            }
            Some(Some(_)) => Err(CompileError::internal(format!(
                "label {} bound twice",
                label.0
            ))),
            None => Err(CompileError::internal(format!("unknown label {}", label.0))),
        }
    }

    /// Emit a branch to `label`
    pub fn jump(&mut self, opcode: Opcode, label: Label) {
        let operand = self.writer.emit_branch(opcode);
        match self.labels.get(label.0).copied().flatten() {
            Some(target) => self.writer.patch_branch(operand, target),
            None => self.fixups.push((operand, label)),
        }
    }

    /// Patch pending jumps and return the code bytes
    pub fn finish(mut self) -> CompileResult<Vec<u8>> {
        for (operand, label) in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| CompileError::internal(format!("label {} never bound", label.0)))?;
            let distance = target as i64 - (operand as i64 + 4);
            if i32::try_from(distance).is_err() {
                return Err(CompileError::JumpTooLarge);
            }
            self.writer.patch_branch(operand, target);
        }
        Ok(self.writer.into_bytes())
    }
}
