//! Local slots, lexical scopes and loop targets of one method

use super::code::Label;
use crate::error::{CompileError, CompileResult};
use kestrel_checker::LocalId;
use rustc_hash::FxHashMap;

/// Break and continue targets of an enclosing loop
#[derive(Debug, Clone, Copy)]
struct LoopContext {
    break_target: Label,
    continue_target: Label,
}

/// Slot allocator with block scoping
///
/// Slots are handed out in stack order and released when their scope
/// closes, so sibling blocks reuse the same slots.
#[derive(Debug, Default)]
pub struct CompileStack {
    next_slot: u32,
    max_locals: u32,
    /// First slot of each open scope
    scopes: Vec<u32>,
    slots: FxHashMap<LocalId, u16>,
    loops: Vec<LoopContext>,
}

impl CompileStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(self.next_slot);
    }

    pub fn exit_scope(&mut self) {
        if let Some(start) = self.scopes.pop() {
            self.slots.retain(|_, slot| (*slot as u32) < start);
            self.next_slot = start;
        }
    }

    /// Reserve a slot for `local`
    pub fn declare(&mut self, local: LocalId) -> CompileResult<u16> {
        let slot = self.reserve()?;
        self.slots.insert(local, slot);
        Ok(slot)
    }

    /// Reserve an anonymous slot, released with the current scope
    pub fn temp(&mut self) -> CompileResult<u16> {
        self.reserve()
    }

    /// Reserve slot 0 for the receiver or closure owner
    pub fn reserve_receiver(&mut self) -> CompileResult<u16> {
        self.reserve()
    }

    fn reserve(&mut self) -> CompileResult<u16> {
        let slot = u16::try_from(self.next_slot).map_err(|_| CompileError::TooManyLocals)?;
        self.next_slot += 1;
        self.max_locals = self.max_locals.max(self.next_slot);
        Ok(slot)
    }

    pub fn slot_of(&self, local: LocalId) -> Option<u16> {
        self.slots.get(&local).copied()
    }

    pub fn max_locals(&self) -> CompileResult<u16> {
        u16::try_from(self.max_locals).map_err(|_| CompileError::TooManyLocals)
    }

    pub fn push_loop(&mut self, break_target: Label, continue_target: Label) {
        self.loops.push(LoopContext {
            break_target,
            continue_target,
        });
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub fn break_target(&self) -> CompileResult<Label> {
        self.loops
            .last()
            .map(|ctx| ctx.break_target)
            .ok_or(CompileError::InvalidBreak)
    }

    pub fn continue_target(&self) -> CompileResult<Label> {
        self.loops
            .last()
            .map(|ctx| ctx.continue_target)
            .ok_or(CompileError::InvalidContinue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::code::CodeBuilder;

    #[test]
    fn test_scopes_release_slots() {
        let mut stack = CompileStack::new();
        assert_eq!(stack.reserve_receiver().unwrap(), 0);
        stack.enter_scope();
        assert_eq!(stack.declare(LocalId(0)).unwrap(), 1);
        assert_eq!(stack.temp().unwrap(), 2);
        stack.exit_scope();
        assert_eq!(stack.slot_of(LocalId(0)), None);

        stack.enter_scope();
        assert_eq!(stack.declare(LocalId(1)).unwrap(), 1);
        stack.exit_scope();
        assert_eq!(stack.max_locals().unwrap(), 3);
    }

    #[test]
    fn test_loop_targets() {
        let mut code = CodeBuilder::new();
        let mut stack = CompileStack::new();
        assert!(matches!(stack.break_target(), Err(CompileError::InvalidBreak)));

        let (outer_exit, outer_head) = (code.new_label(), code.new_label());
        let (inner_exit, inner_head) = (code.new_label(), code.new_label());
        stack.push_loop(outer_exit, outer_head);
        stack.push_loop(inner_exit, inner_head);
        assert_eq!(stack.break_target().unwrap(), inner_exit);
        assert_eq!(stack.continue_target().unwrap(), inner_head);

        stack.pop_loop();
        assert_eq!(stack.break_target().unwrap(), outer_exit);
        stack.pop_loop();
        assert!(matches!(stack.continue_target(), Err(CompileError::InvalidContinue)));
    }
}
