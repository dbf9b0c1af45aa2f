//! Graph Nodes
//!
//! This module defines the bookkeeping record every reactive primitive owns
//! in the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are handed out in creation order, so comparing two ids tells which
/// node was created first. The effect scheduler relies on this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A writable source (signal, input, query). Producer only.
    Signal,

    /// A derived value. Producer for its readers, consumer of what it reads.
    Computed,

    /// A side effect. Consumer only.
    Effect,
}

impl NodeKind {
    fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Signal => "signal",
            NodeKind::Computed => "computed",
            NodeKind::Effect => "effect",
        }
    }
}

/// A producer this node read during its last evaluation, together with the
/// producer version it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducerEdge {
    pub producer: NodeId,
    pub seen_version: u64,
}

/// Producer edges of one consumer, in first-read order.
pub type ProducerEdges = SmallVec<[ProducerEdge; 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct ReactiveNode {
    id: NodeId,
    kind: NodeKind,
    label: Option<String>,

    /// Bumped every time the node's value may have changed.
    version: u64,

    /// An upstream dependency changed since the last evaluation.
    dirty: bool,

    /// Set while the node is being refreshed or evaluated. A read that finds
    /// this set has closed a cycle.
    computing: bool,

    /// Nodes this node read during its last evaluation.
    producers: ProducerEdges,

    /// Nodes that read this node during their last evaluation.
    consumers: IndexSet<NodeId>,
}

impl ReactiveNode {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, label: Option<String>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            label,
            version: 0,
            // Consumers start dirty so the first read or flush evaluates them.
            dirty: kind != NodeKind::Signal,
            computing: false,
            producers: SmallVec::new(),
            consumers: IndexSet::new(),
        }
    }

    pub fn signal(label: Option<String>) -> Self {
        Self::new(NodeKind::Signal, label)
    }

    pub fn computed(label: Option<String>) -> Self {
        Self::new(NodeKind::Computed, label)
    }

    pub fn effect(label: Option<String>) -> Self {
        Self::new(NodeKind::Effect, label)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Human-readable name used in error messages, e.g. `computed "total" (#4)`.
    pub fn describe(&self) -> String {
        describe(self.kind, self.id, self.label.as_deref())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record that the node's value changed.
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_computing(&self) -> bool {
        self.computing
    }

    pub fn set_computing(&mut self, computing: bool) {
        self.computing = computing;
    }

    pub fn producers(&self) -> &[ProducerEdge] {
        &self.producers
    }

    pub fn replace_producers(&mut self, producers: ProducerEdges) -> ProducerEdges {
        std::mem::replace(&mut self.producers, producers)
    }

    pub fn consumers(&self) -> &IndexSet<NodeId> {
        &self.consumers
    }

    pub fn add_consumer(&mut self, consumer: NodeId) -> bool {
        self.consumers.insert(consumer)
    }

    pub fn remove_consumer(&mut self, consumer: NodeId) -> bool {
        self.consumers.shift_remove(&consumer)
    }

    /// Drop every producer edge. Returns what was removed so the caller can
    /// unlink the reverse edges.
    pub fn take_producers(&mut self) -> ProducerEdges {
        std::mem::take(&mut self.producers)
    }

    pub fn take_consumers(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.consumers)
    }
}

/// Format a node reference without needing the node itself.
fn describe(kind: NodeKind, id: NodeId, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{} \"{}\" ({})", kind.as_str(), label, id),
        None => format!("{} {}", kind.as_str(), id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique_and_ordered() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn signal_node_starts_clean() {
        let node = ReactiveNode::signal(None);
        assert_eq!(node.kind(), NodeKind::Signal);
        assert!(!node.is_dirty());
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn consumer_nodes_start_dirty() {
        assert!(ReactiveNode::computed(None).is_dirty());
        assert!(ReactiveNode::effect(None).is_dirty());
    }

    #[test]
    fn consumer_management() {
        let mut node = ReactiveNode::signal(None);
        let c1 = NodeId::new();
        let c2 = NodeId::new();

        assert!(node.add_consumer(c1));
        assert!(node.add_consumer(c2));
        assert!(!node.add_consumer(c1));
        assert_eq!(node.consumers().len(), 2);

        assert!(node.remove_consumer(c1));
        assert!(!node.consumers().contains(&c1));
        assert_eq!(node.consumers().len(), 1);
    }

    #[test]
    fn describe_uses_label_when_present() {
        let node = ReactiveNode::computed(Some("total".into()));
        assert_eq!(
            node.describe(),
            format!("computed \"total\" (#{})", node.id().raw())
        );

        let anon = ReactiveNode::effect(None);
        assert_eq!(anon.describe(), format!("effect #{}", anon.id().raw()));
    }

    #[test]
    fn dirty_transitions() {
        let mut node = ReactiveNode::computed(None);
        node.mark_clean();
        assert!(!node.is_dirty());
        node.mark_dirty();
        assert!(node.is_dirty());
    }
}
