//! Dependency Graph
//!
//! This module implements the bookkeeping shared by every reactive
//! primitive: nodes, the edges between them, and the queue of effects
//! waiting to run.
//!
//! # Overview
//!
//! - Nodes represent writable sources (signals), derived values (computeds)
//!   or side effects.
//! - An edge P -> C means consumer C read producer P during its most recent
//!   evaluation. Edges are rebuilt on every evaluation, so branches that are
//!   no longer taken stop contributing dependencies.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena keyed by integer id. Handles refer to nodes by
//!    id only, so removing a node can never leave a dangling reference.
//!
//! 2. Both directions of every edge are stored: consumers keep ordered
//!    producer edges with the producer version they last observed, producers
//!    keep the set of their consumers. Writes walk consumers, staleness
//!    checks walk producers.
//!
//! 3. The graph never runs user code. Everything that calls back into
//!    computations lives in `reactive::runtime`.

mod arena;
mod node;
mod scheduler;

pub use arena::{Graph, GraphSnapshot, NodeSnapshot};
pub use node::{NodeId, NodeKind, ProducerEdge, ProducerEdges, ReactiveNode};
pub use scheduler::{EffectScheduler, FlushRequester, FlushState, ManualFlush};
