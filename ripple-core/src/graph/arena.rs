//! Node Arena
//!
//! The arena owns every [`ReactiveNode`] of a runtime and is the only place
//! edges are created or destroyed, so both directions of an edge are always
//! updated together.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::node::{NodeId, NodeKind, ProducerEdges, ReactiveNode};

/// All nodes of one reactive runtime, indexed by id.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, ReactiveNode>,

    /// Emit `trace!` events for edge and dirty-flag changes.
    trace: bool,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: ReactiveNode) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph, unlinking every edge it takes part in.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<ReactiveNode> {
        let mut node = self.nodes.remove(&node_id)?;

        for edge in node.take_producers() {
            if let Some(producer) = self.nodes.get_mut(&edge.producer) {
                producer.remove_consumer(node_id);
            }
        }

        for consumer_id in node.take_consumers() {
            if let Some(consumer) = self.nodes.get_mut(&consumer_id) {
                let remaining: ProducerEdges = consumer
                    .producers()
                    .iter()
                    .filter(|edge| edge.producer != node_id)
                    .copied()
                    .collect();
                consumer.replace_producers(remaining);
            }
        }

        Some(node)
    }

    pub fn get(&self, node_id: NodeId) -> Option<&ReactiveNode> {
        self.nodes.get(&node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut ReactiveNode> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(ReactiveNode::version)
    }

    /// Replace the producer edges of `consumer` with the ones recorded during
    /// its latest evaluation.
    ///
    /// Only the difference between the old and new producer sets touches the
    /// producers' consumer sets. Producers that were removed while the
    /// consumer was evaluating are dropped from the new set. Nothing happens
    /// if the consumer itself was removed in the meantime.
    pub fn commit_producers(&mut self, consumer: NodeId, recorded: ProducerEdges) {
        if !self.nodes.contains_key(&consumer) {
            return;
        }

        let recorded: ProducerEdges = recorded
            .into_iter()
            .filter(|edge| self.nodes.contains_key(&edge.producer))
            .collect();
        let new_ids: HashSet<NodeId> = recorded.iter().map(|edge| edge.producer).collect();

        let old = match self.nodes.get_mut(&consumer) {
            Some(node) => node.replace_producers(recorded),
            None => return,
        };
        let old_ids: HashSet<NodeId> = old.iter().map(|edge| edge.producer).collect();

        for stale in old_ids.difference(&new_ids) {
            if let Some(producer) = self.nodes.get_mut(stale) {
                producer.remove_consumer(consumer);
                if self.trace {
                    tracing::trace!(producer = %stale, %consumer, "pruned edge");
                }
            }
        }

        for added in new_ids.difference(&old_ids) {
            if let Some(producer) = self.nodes.get_mut(added) {
                producer.add_consumer(consumer);
                if self.trace {
                    tracing::trace!(producer = %added, %consumer, "added edge");
                }
            }
        }
    }

    /// Record that `producer`'s value changed.
    ///
    /// Bumps its version and marks its consumers dirty. Returns the effects
    /// that became dirty and must be scheduled.
    pub fn producer_changed(&mut self, producer: NodeId) -> Vec<NodeId> {
        match self.nodes.get_mut(&producer) {
            Some(node) => node.bump_version(),
            None => return Vec::new(),
        }
        self.mark_consumers_dirty(producer)
    }

    /// Mark the consumers of `producer` dirty.
    ///
    /// Nothing is recomputed here. The dirty flag is forwarded through
    /// computeds that were clean so that effects reading them get scheduled;
    /// consumers that are already dirty are not revisited.
    pub fn mark_consumers_dirty(&mut self, producer: NodeId) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&producer) {
            Some(node) => node.consumers().iter().copied().collect(),
            None => return effects,
        };

        while let Some(consumer_id) = stack.pop() {
            let Some(consumer) = self.nodes.get_mut(&consumer_id) else {
                continue;
            };
            if consumer.is_dirty() {
                continue;
            }
            consumer.mark_dirty();
            if self.trace {
                tracing::trace!(node = %consumer_id, "marked dirty");
            }

            match consumer.kind() {
                NodeKind::Effect => effects.push(consumer_id),
                NodeKind::Computed => stack.extend(consumer.consumers().iter().copied()),
                NodeKind::Signal => {}
            }
        }

        effects
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Capture the current state of the graph for debugging.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .values()
            .map(|node| NodeSnapshot {
                id: node.id(),
                kind: node.kind(),
                label: node.label().map(str::to_owned),
                version: node.version(),
                dirty: node.is_dirty(),
                producers: node.producers().iter().map(|edge| edge.producer).collect(),
                consumers: node.consumers().iter().copied().collect(),
            })
            .collect();
        nodes.sort_by_key(|node| node.id);
        GraphSnapshot { nodes }
    }
}

/// Serializable view of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub version: u64,
    pub dirty: bool,
    pub producers: Vec<NodeId>,
    pub consumers: Vec<NodeId>,
}

/// Serializable view of a whole graph, ordered by node id.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Render the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::ProducerEdge;
    use smallvec::smallvec;

    fn edge(producer: NodeId, seen_version: u64) -> ProducerEdge {
        ProducerEdge {
            producer,
            seen_version,
        }
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let id1 = graph.add_node(ReactiveNode::signal(None));
        let id2 = graph.add_node(ReactiveNode::computed(None));
        assert_eq!(graph.node_count(), 2);

        graph.remove_node(id1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.get(id1).is_none());
        assert!(graph.get(id2).is_some());
    }

    #[test]
    fn commit_links_both_directions() {
        let mut graph = Graph::new();
        let source = graph.add_node(ReactiveNode::signal(None));
        let derived = graph.add_node(ReactiveNode::computed(None));

        graph.commit_producers(derived, smallvec![edge(source, 0)]);

        assert!(graph.get(source).unwrap().consumers().contains(&derived));
        assert_eq!(graph.get(derived).unwrap().producers()[0].producer, source);
    }

    #[test]
    fn commit_prunes_stale_edges() {
        let mut graph = Graph::new();
        let a = graph.add_node(ReactiveNode::signal(None));
        let b = graph.add_node(ReactiveNode::signal(None));
        let derived = graph.add_node(ReactiveNode::computed(None));

        graph.commit_producers(derived, smallvec![edge(a, 0), edge(b, 0)]);
        graph.commit_producers(derived, smallvec![edge(b, 0)]);

        assert!(!graph.get(a).unwrap().consumers().contains(&derived));
        assert!(graph.get(b).unwrap().consumers().contains(&derived));
        assert_eq!(graph.get(derived).unwrap().producers().len(), 1);
    }

    #[test]
    fn commit_ignores_removed_consumer_and_producers() {
        let mut graph = Graph::new();
        let a = graph.add_node(ReactiveNode::signal(None));
        let gone = graph.add_node(ReactiveNode::signal(None));
        let derived = graph.add_node(ReactiveNode::computed(None));
        graph.remove_node(gone);

        graph.commit_producers(derived, smallvec![edge(a, 0), edge(gone, 0)]);
        assert_eq!(graph.get(derived).unwrap().producers().len(), 1);

        graph.remove_node(derived);
        graph.commit_producers(derived, smallvec![edge(a, 0)]);
        assert!(graph.get(a).unwrap().consumers().is_empty());
    }

    #[test]
    fn remove_node_unlinks_both_sides() {
        let mut graph = Graph::new();
        let source = graph.add_node(ReactiveNode::signal(None));
        let middle = graph.add_node(ReactiveNode::computed(None));
        let sink = graph.add_node(ReactiveNode::effect(None));

        graph.commit_producers(middle, smallvec![edge(source, 0)]);
        graph.commit_producers(sink, smallvec![edge(middle, 0)]);

        graph.remove_node(middle);

        assert!(graph.get(source).unwrap().consumers().is_empty());
        assert!(graph.get(sink).unwrap().producers().is_empty());
    }

    #[test]
    fn producer_changed_schedules_effects_through_computeds() {
        let mut graph = Graph::new();
        let source = graph.add_node(ReactiveNode::signal(None));
        let derived = graph.add_node(ReactiveNode::computed(None));
        let sink = graph.add_node(ReactiveNode::effect(None));

        graph.commit_producers(derived, smallvec![edge(source, 0)]);
        graph.commit_producers(sink, smallvec![edge(derived, 0)]);
        graph.get_mut(derived).unwrap().mark_clean();
        graph.get_mut(sink).unwrap().mark_clean();

        let effects = graph.producer_changed(source);

        assert_eq!(effects, vec![sink]);
        assert_eq!(graph.version(source), Some(1));
        assert!(graph.get(derived).unwrap().is_dirty());
        // The computed was only flagged, not re-versioned.
        assert_eq!(graph.version(derived), Some(0));
    }

    #[test]
    fn already_dirty_consumers_are_not_revisited() {
        let mut graph = Graph::new();
        let source = graph.add_node(ReactiveNode::signal(None));
        let sink = graph.add_node(ReactiveNode::effect(None));
        graph.commit_producers(sink, smallvec![edge(source, 0)]);

        // Effects start dirty.
        assert!(graph.producer_changed(source).is_empty());

        graph.get_mut(sink).unwrap().mark_clean();
        assert_eq!(graph.producer_changed(source), vec![sink]);
        assert!(graph.producer_changed(source).is_empty());
    }

    #[test]
    fn snapshot_lists_nodes_in_id_order() {
        let mut graph = Graph::new();
        let source = graph.add_node(ReactiveNode::signal(Some("count".into())));
        let derived = graph.add_node(ReactiveNode::computed(None));
        graph.commit_producers(derived, smallvec![edge(source, 0)]);

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[0].id, source);
        assert_eq!(snapshot.node(derived).unwrap().producers, vec![source]);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"count\""));
        assert!(json.contains("\"computed\""));
    }
}
