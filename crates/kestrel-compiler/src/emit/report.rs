//! Record of the emission strategy chosen for each node

use kestrel_ast::NodeId;
use kestrel_checker::LoopForm;
use rustc_hash::FxHashMap;
use std::fmt;

/// Code-generation strategy used for one expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmissionPath {
    /// Direct invocation or typed machine operation
    Static,
    /// Call-site dispatch
    Dynamic,
    /// Folded literal
    Constant,
}

impl fmt::Display for EmissionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmissionPath::Static => write!(f, "static"),
            EmissionPath::Dynamic => write!(f, "dynamic"),
            EmissionPath::Constant => write!(f, "constant"),
        }
    }
}

/// Per-class emission record
#[derive(Debug, Clone, Default)]
pub struct EmissionReport {
    paths: FxHashMap<NodeId, EmissionPath>,
    loops: FxHashMap<NodeId, LoopForm>,
}

impl EmissionReport {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, node: NodeId, path: EmissionPath) {
        self.paths.insert(node, path);
    }

    pub(crate) fn record_loop(&mut self, node: NodeId, form: LoopForm) {
        self.loops.insert(node, form);
    }

    /// Path chosen for an expression node
    pub fn path(&self, node: NodeId) -> Option<EmissionPath> {
        self.paths.get(&node).copied()
    }

    /// Form chosen for a for-in statement
    pub fn loop_form(&self, node: NodeId) -> Option<LoopForm> {
        self.loops.get(&node).copied()
    }

    /// Number of nodes emitted with `path`
    pub fn count(&self, path: EmissionPath) -> usize {
        self.paths.values().filter(|&&p| p == path).count()
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Dynamic nodes in id order
    pub fn dynamic_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .paths
            .iter()
            .filter(|(_, &p)| p == EmissionPath::Dynamic)
            .map(|(&id, _)| id)
            .collect();
        nodes.sort();
        nodes
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: EmissionReport) {
        self.paths.extend(other.paths);
        self.loops.extend(other.loops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_merge() {
        let mut a = EmissionReport::new();
        a.record(NodeId(1), EmissionPath::Static);
        a.record(NodeId(3), EmissionPath::Dynamic);
        let mut b = EmissionReport::new();
        b.record(NodeId(2), EmissionPath::Dynamic);
        b.record_loop(NodeId(4), LoopForm::Enumeration);
        a.merge(b);

        assert_eq!(a.count(EmissionPath::Dynamic), 2);
        assert_eq!(a.count(EmissionPath::Constant), 0);
        assert_eq!(a.dynamic_nodes(), vec![NodeId(2), NodeId(3)]);
        assert_eq!(a.loop_form(NodeId(4)), Some(LoopForm::Enumeration));
        assert_eq!(a.path(NodeId(1)), Some(EmissionPath::Static));
    }
}
