//! Operand-stack depth model
//!
//! Every emitted instruction adjusts the model by its stack effect, so
//! `max_stack` in the class file is exact and the verifier agrees with the
//! emitter by construction.

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Default, Clone)]
pub struct OperandStack {
    depth: usize,
    max: usize,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Largest depth reached so far
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn push(&mut self, count: usize) {
        self.depth += count;
        self.max = self.max.max(self.depth);
    }

    pub fn pop(&mut self, count: usize) -> CompileResult<()> {
        if count > self.depth {
            return Err(CompileError::internal(format!(
                "operand stack underflow: popping {} of {}",
                count, self.depth
            )));
        }
        self.depth -= count;
        Ok(())
    }

    /// Reset the model at a join point whose incoming depth is known
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        self.max = self.max.max(depth);
    }

    /// Number of values above `baseline`; the caller pops them
    pub fn excess_over(&self, baseline: usize) -> usize {
        self.depth.saturating_sub(baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tracking() {
        let mut stack = OperandStack::new();
        stack.push(2);
        stack.pop(1).unwrap();
        stack.push(3);
        assert_eq!(stack.depth(), 4);
        assert_eq!(stack.max(), 4);
        stack.set_depth(1);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.max(), 4);
        assert_eq!(stack.excess_over(0), 1);
    }

    #[test]
    fn test_underflow_is_internal() {
        let mut stack = OperandStack::new();
        stack.push(1);
        assert!(matches!(stack.pop(2), Err(CompileError::Internal { .. })));
    }
}
