//! Side tables written by the annotator and read by the emitter
//!
//! Everything is keyed by [`NodeId`]; the AST itself only changes when a
//! binary expression is constant-folded.

use crate::class_table::{FieldTarget, MethodTarget};
use kestrel_ast::NodeId;
use kestrel_types::TypeId;
use rustc_hash::{FxHashMap, FxHashSet};

/// Inference state of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Not visited yet
    #[default]
    Unvisited,
    /// Visit in progress; re-entry means a cycle
    Inferring,
    /// Type known and, for members, bound to a target
    Resolved,
    /// Left for the runtime to dispatch; no static target exists
    Dynamic,
    /// An error was reported for this node
    Error,
}

/// Iteration strategy chosen for a for-in loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopForm {
    /// Array whose component type equals the loop variable type
    IndexedArray {
        /// Array component type
        component: TypeId,
    },
    /// Pull-style enumerator (`hasMoreElements` / `nextElement`)
    Enumeration,
    /// Iterator loop (`hasNext` / `next`)
    Iterator {
        /// The source implements `Iterable` and is asked directly; otherwise
        /// the runtime helper adapts it
        direct: bool,
    },
}

/// Index of a local binding (parameter, variable, loop variable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// A local binding
#[derive(Debug, Clone, PartialEq)]
pub struct LocalInfo {
    /// Source name
    pub name: String,
    /// Declared type
    pub ty: TypeId,
    /// Read or written by a closure; lives in a reference cell
    pub captured: bool,
}

/// Per-closure facts
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureInfo {
    /// Parameter bindings
    pub params: Vec<LocalId>,
    /// Outer bindings the body uses, in first-use order
    pub captures: Vec<LocalId>,
    /// Inferred return type
    pub return_type: TypeId,
}

/// Identifies a method declaration: class name plus index in `methods`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    /// Declaring class
    pub class: String,
    /// Position in `ClassDecl::methods`
    pub index: usize,
}

/// Everything the emitter needs to know about an annotated unit
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    states: FxHashMap<NodeId, NodeState>,
    types: FxHashMap<NodeId, TypeId>,
    targets: FxHashMap<NodeId, MethodTarget>,
    fields: FxHashMap<NodeId, FieldTarget>,
    loop_forms: FxHashMap<NodeId, LoopForm>,
    folded: FxHashSet<NodeId>,
    locals: Vec<LocalInfo>,
    var_refs: FxHashMap<NodeId, LocalId>,
    decl_locals: FxHashMap<NodeId, LocalId>,
    method_params: FxHashMap<MethodKey, Vec<LocalId>>,
    closures: FxHashMap<NodeId, ClosureInfo>,
}

impl Annotations {
    /// Empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Inference state of a node
    pub fn state(&self, node: NodeId) -> NodeState {
        self.states.get(&node).copied().unwrap_or_default()
    }

    /// Set the inference state of a node
    pub fn set_state(&mut self, node: NodeId, state: NodeState) {
        self.states.insert(node, state);
    }

    /// Inferred type of a node
    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.types.get(&node).copied()
    }

    /// Record the type of a node
    pub fn set_type(&mut self, node: NodeId, ty: TypeId) {
        self.types.insert(node, ty);
    }

    /// Resolved method of a call-like node
    pub fn target(&self, node: NodeId) -> Option<&MethodTarget> {
        self.targets.get(&node)
    }

    /// Record the resolved method of a node
    pub fn set_target(&mut self, node: NodeId, target: MethodTarget) {
        self.targets.insert(node, target);
    }

    /// Resolved field of a property or variable node
    pub fn field(&self, node: NodeId) -> Option<&FieldTarget> {
        self.fields.get(&node)
    }

    /// Record the resolved field of a node
    pub fn set_field(&mut self, node: NodeId, field: FieldTarget) {
        self.fields.insert(node, field);
    }

    /// Loop form of a for-in statement
    pub fn loop_form(&self, node: NodeId) -> Option<LoopForm> {
        self.loop_forms.get(&node).copied()
    }

    /// Record the loop form of a for-in statement
    pub fn set_loop_form(&mut self, node: NodeId, form: LoopForm) {
        self.loop_forms.insert(node, form);
    }

    /// Whether the node was produced by constant folding
    pub fn is_folded(&self, node: NodeId) -> bool {
        self.folded.contains(&node)
    }

    /// Mark a node as folded
    pub fn mark_folded(&mut self, node: NodeId) {
        self.folded.insert(node);
    }

    /// Number of folded nodes
    pub fn folded_count(&self) -> usize {
        self.folded.len()
    }

    /// Allocate a local binding
    pub fn add_local(&mut self, name: &str, ty: TypeId) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalInfo {
            name: name.to_string(),
            ty,
            captured: false,
        });
        id
    }

    /// Local binding info
    pub fn local(&self, id: LocalId) -> Option<&LocalInfo> {
        self.locals.get(id.0 as usize)
    }

    /// Mark a local as captured by a closure
    pub fn mark_captured(&mut self, id: LocalId) {
        if let Some(local) = self.locals.get_mut(id.0 as usize) {
            local.captured = true;
        }
    }

    /// Local a variable node refers to
    pub fn var_ref(&self, node: NodeId) -> Option<LocalId> {
        self.var_refs.get(&node).copied()
    }

    /// Record the local a variable node refers to
    pub fn set_var_ref(&mut self, node: NodeId, local: LocalId) {
        self.var_refs.insert(node, local);
    }

    /// Local introduced by a declaration or for-in statement
    pub fn decl_local(&self, node: NodeId) -> Option<LocalId> {
        self.decl_locals.get(&node).copied()
    }

    /// Record the local introduced by a declaration
    pub fn set_decl_local(&mut self, node: NodeId, local: LocalId) {
        self.decl_locals.insert(node, local);
    }

    /// Parameter bindings of a method
    pub fn method_params(&self, key: &MethodKey) -> Option<&[LocalId]> {
        self.method_params.get(key).map(Vec::as_slice)
    }

    /// Record the parameter bindings of a method
    pub fn set_method_params(&mut self, key: MethodKey, params: Vec<LocalId>) {
        self.method_params.insert(key, params);
    }

    /// Closure facts
    pub fn closure(&self, node: NodeId) -> Option<&ClosureInfo> {
        self.closures.get(&node)
    }

    /// Record closure facts
    pub fn set_closure(&mut self, node: NodeId, info: ClosureInfo) {
        self.closures.insert(node, info);
    }

    /// Number of nodes with a recorded type
    pub fn typed_count(&self) -> usize {
        self.types.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::TypeContext;

    #[test]
    fn test_default_state_is_unvisited() {
        let ann = Annotations::new();
        assert_eq!(ann.state(NodeId(7)), NodeState::Unvisited);
        assert!(ann.type_of(NodeId(7)).is_none());
    }

    #[test]
    fn test_locals_and_captures() {
        let ctx = TypeContext::new();
        let mut ann = Annotations::new();
        let a = ann.add_local("a", ctx.well_known().int);
        let b = ann.add_local("b", ctx.well_known().string);
        assert_ne!(a, b);
        ann.mark_captured(b);
        assert!(!ann.local(a).unwrap().captured);
        assert!(ann.local(b).unwrap().captured);
    }
}
