//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the consumer stack and the
//! effect scheduler, and it is the only component that calls back into user
//! computations.
//!
//! # How It Works
//!
//! 1. Every primitive registers a node with the runtime when it is created
//!    and removes it when it is destroyed.
//!
//! 2. When a consumer evaluates, reads are recorded on the consumer stack.
//!    When the evaluation finishes, the recorded reads replace the
//!    consumer's producer edges.
//!
//! 3. When a producer's value changes, the runtime:
//!    a. bumps its version,
//!    b. marks dependent computeds and effects dirty,
//!    c. queues the dirty effects and asks the host for a flush.
//!    Computeds are lazy: they recompute on their next read, and only if
//!    one of their producers' versions actually moved.
//!
//! # Threading
//!
//! The runtime is thread-local and single-threaded. Handles are `!Send`.
//! No `RefCell` borrow of runtime state is held while user code runs, so a
//! read that triggers a write that triggers another read is safe.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use super::context::{ConsumerStack, ReactiveContext};
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{
    EffectScheduler, FlushRequester, FlushState, Graph, GraphSnapshot, ManualFlush, NodeId,
    NodeKind, ProducerEdges, ReactiveNode,
};

/// A node the runtime can bring up to date without knowing its value type.
pub(crate) trait Reactive {
    /// Get the node ID of this reactive value.
    fn node_id(&self) -> NodeId;

    /// Computeds recompute if stale; effects run if stale.
    ///
    /// Returns `true` if user code ran.
    fn refresh(&self) -> bool;
}

/// Callback receiving errors that cannot be returned to a caller directly.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Per-thread reactive runtime.
pub(crate) struct Runtime {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) context: RefCell<ConsumerStack>,
    pub(crate) scheduler: RefCell<EffectScheduler>,

    /// Computeds, held weakly: a computed lives as long as its handles.
    derived: RefCell<HashMap<NodeId, Weak<dyn Reactive>>>,

    /// Effects, held strongly: an effect lives until it is destroyed.
    effects: RefCell<HashMap<NodeId, Rc<dyn Reactive>>>,

    requester: RefCell<Rc<dyn FlushRequester>>,
    error_handler: RefCell<Option<ErrorHandler>>,
    config: RefCell<RuntimeConfig>,

    /// Handle types that have been instantiated, for `is_reactive_node`.
    reactive_types: RefCell<HashSet<TypeId>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            context: RefCell::new(ConsumerStack::new()),
            scheduler: RefCell::new(EffectScheduler::new()),
            derived: RefCell::new(HashMap::new()),
            effects: RefCell::new(HashMap::new()),
            requester: RefCell::new(Rc::new(ManualFlush)),
            error_handler: RefCell::new(None),
            config: RefCell::new(RuntimeConfig::default()),
            reactive_types: RefCell::new(HashSet::new()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but does nothing once the runtime has been
    /// torn down at thread exit. Used from `Drop` impls.
    pub(crate) fn try_with(f: impl FnOnce(&Runtime)) {
        let _ = RUNTIME.try_with(f);
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    /// Add a node to the graph.
    pub(crate) fn register_node(node: ReactiveNode) -> NodeId {
        Runtime::with(|rt| {
            let id = rt.graph.borrow_mut().add_node(node);
            tracing::debug!(node = %id, "node created");
            id
        })
    }

    /// Register a computed so producers' staleness checks can refresh it.
    pub(crate) fn register_derived(id: NodeId, derived: Weak<dyn Reactive>) {
        Runtime::with(|rt| {
            rt.derived.borrow_mut().insert(id, derived);
        })
    }

    /// Register an effect. The runtime keeps it alive until it is removed.
    pub(crate) fn register_effect(effect: Rc<dyn Reactive>) {
        Runtime::with(|rt| {
            rt.effects.borrow_mut().insert(effect.node_id(), effect);
        })
    }

    /// Remember that values of type `H` are reactive handles.
    pub(crate) fn register_type<H: Any>() {
        Runtime::with(|rt| {
            rt.reactive_types.borrow_mut().insert(TypeId::of::<H>());
        })
    }

    /// Remove a node, unlink all of its edges and cancel any pending run.
    pub(crate) fn remove_node(id: NodeId) {
        Runtime::try_with(|rt| {
            let removed = rt.graph.borrow_mut().remove_node(id);
            rt.derived.borrow_mut().remove(&id);
            rt.scheduler.borrow_mut().cancel(id);
            // Dropped after every borrow above is released.
            let effect = rt.effects.borrow_mut().remove(&id);
            if let Some(node) = removed {
                tracing::debug!(node = %node.describe(), "node removed");
            }
            drop(effect);
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Record a read of `id` by the consumer currently evaluating, if any.
    pub(crate) fn track_read(id: NodeId) {
        Runtime::with(|rt| {
            let version = rt.graph.borrow().version(id);
            if let Some(version) = version {
                rt.context.borrow_mut().record_read(id, version);
            }
        })
    }

    pub(crate) fn contains(id: NodeId) -> bool {
        Runtime::with(|rt| rt.graph.borrow().contains(id))
    }

    pub(crate) fn is_computing(id: NodeId) -> bool {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(id)
                .map(ReactiveNode::is_computing)
                .unwrap_or(false)
        })
    }

    /// Dirty flag of a node, or `None` if it has been removed.
    pub(crate) fn is_dirty(id: NodeId) -> Option<bool> {
        Runtime::with(|rt| rt.graph.borrow().get(id).map(ReactiveNode::is_dirty))
    }

    pub(crate) fn mark_clean(id: NodeId) {
        Runtime::with(|rt| {
            if let Some(node) = rt.graph.borrow_mut().get_mut(id) {
                node.mark_clean();
            }
        })
    }

    pub(crate) fn describe(id: NodeId) -> String {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(id)
                .map(ReactiveNode::describe)
                .unwrap_or_else(|| id.to_string())
        })
    }

    /// Whether any producer of `id` has a version different from the one
    /// `id` saw when it last evaluated.
    ///
    /// Computed producers are brought up to date first, so a computed that
    /// recomputed to an equal value does not count as a change.
    pub(crate) fn producers_changed(id: NodeId) -> bool {
        let edges = Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(id)
                .map(|node| node.producers().to_vec())
        });
        let Some(edges) = edges else {
            return true;
        };

        for edge in edges {
            let derived = Runtime::with(|rt| {
                rt.derived
                    .borrow()
                    .get(&edge.producer)
                    .and_then(Weak::upgrade)
            });
            if let Some(derived) = derived {
                derived.refresh();
            }

            let current = Runtime::with(|rt| rt.graph.borrow().version(edge.producer));
            if current != Some(edge.seen_version) {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Record that the value of producer `id` changed and schedule whatever
    /// depends on it.
    pub(crate) fn producer_changed(id: NodeId) {
        Runtime::with(|rt| {
            if let Some(reader) = rt.context.borrow().current() {
                let graph = rt.graph.borrow();
                if graph.get(reader).map(ReactiveNode::kind) == Some(NodeKind::Computed)
                    && graph.get(id).map(ReactiveNode::kind) == Some(NodeKind::Signal)
                {
                    tracing::warn!(
                        signal = %id,
                        computed = %reader,
                        "signal written while a computed is evaluating"
                    );
                }
            }

            let effects = rt.graph.borrow_mut().producer_changed(id);
            rt.schedule(effects);
        })
    }

    /// Queue an effect for the next flush.
    pub(crate) fn schedule_effect(id: NodeId) {
        Runtime::with(|rt| rt.schedule(vec![id]))
    }

    /// An empty `effects` still requests a flush when an earlier flush left
    /// effects pending.
    fn schedule(&self, effects: Vec<NodeId>) {
        let request = self.scheduler.borrow_mut().enqueue(effects);
        if request {
            let requester = Rc::clone(&self.requester.borrow());
            tracing::trace!("requesting effect flush");
            requester.request_flush();
        }
    }

    /// Replace the producer edges of `id` with `reads`.
    ///
    /// If a producer changed between being read and the end of the
    /// evaluation, the node is dirty again straight away; an effect is
    /// queued for another run.
    pub(crate) fn commit_evaluation(id: NodeId, reads: ProducerEdges) {
        Runtime::with(|rt| {
            let requeue = {
                let mut graph = rt.graph.borrow_mut();
                graph.commit_producers(id, reads);

                let stale = graph.get(id).is_some_and(|node| {
                    node.producers()
                        .iter()
                        .any(|edge| graph.version(edge.producer) != Some(edge.seen_version))
                });
                if !stale {
                    return;
                }
                match graph.get_mut(id) {
                    Some(node) => {
                        node.mark_dirty();
                        node.kind() == NodeKind::Effect
                    }
                    None => false,
                }
            };
            if requeue {
                rt.schedule(vec![id]);
            }
        })
    }

    /// Evaluate `f` as consumer `id`: clear its dirty flag, attribute every
    /// read made by `f` to it, then commit the reads as its producer edges.
    ///
    /// If `f` panics the consumer stack is restored, the previous edges are
    /// kept and the node is left dirty, so the next read or flush evaluates
    /// it again.
    pub(crate) fn evaluate<R>(id: NodeId, f: impl FnOnce() -> R) -> R {
        Runtime::mark_clean(id);
        let evaluation = EvaluationGuard { id, done: false };
        let ctx = ReactiveContext::enter(id);
        let result = f();
        let reads = ctx.finish();
        evaluation.complete();
        Runtime::commit_evaluation(id, reads);
        result
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    /// Run queued effects until the queue is empty.
    pub(crate) fn flush() -> Result<usize, ReactiveError> {
        Runtime::with(|rt| rt.flush_queue())
    }

    fn flush_queue(&self) -> Result<usize, ReactiveError> {
        if !self.scheduler.borrow_mut().begin_flush() {
            return Ok(0);
        }
        let _guard = FlushGuard(self);
        let max_passes = self.config.borrow().max_flush_passes;
        tracing::debug!(pending = self.scheduler.borrow().pending_count(), "flush started");

        let mut passes = 0;
        let mut ran = 0;
        loop {
            let pass = self.scheduler.borrow_mut().take_pass();
            if pass.is_empty() {
                break;
            }
            if passes == max_passes {
                self.scheduler.borrow_mut().requeue(pass);
                let err = ReactiveError::InfiniteLoop { passes };
                tracing::warn!(passes, "effect flush aborted: effects keep re-scheduling each other");
                self.report_error(&err);
                return Err(err);
            }
            passes += 1;

            let mut pass = PassGuard {
                rt: self,
                ids: pass,
                cursor: 0,
            };
            while let Some(&id) = pass.ids.get(pass.cursor) {
                // A destroyed effect is no longer registered.
                let effect = self.effects.borrow().get(&id).cloned();
                if let Some(effect) = effect {
                    if effect.refresh() {
                        ran += 1;
                    }
                }
                pass.cursor += 1;
            }
        }

        tracing::debug!(passes, ran, "flush finished");
        Ok(ran)
    }

    fn report_error(&self, err: &ReactiveError) {
        let handler = self.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err),
            None => tracing::error!(error = %err, "unhandled reactive error"),
        }
    }

    // ------------------------------------------------------------------
    // Host configuration
    // ------------------------------------------------------------------

    pub(crate) fn configure(config: RuntimeConfig) -> Result<(), ReactiveError> {
        config.validate()?;
        Runtime::with(|rt| {
            rt.graph.borrow_mut().set_trace(config.trace_propagation);
            *rt.config.borrow_mut() = config;
        });
        Ok(())
    }

    pub(crate) fn config() -> RuntimeConfig {
        Runtime::with(|rt| rt.config.borrow().clone())
    }

    pub(crate) fn set_flush_requester(requester: Rc<dyn FlushRequester>) {
        Runtime::with(|rt| *rt.requester.borrow_mut() = requester)
    }

    pub(crate) fn set_error_handler(handler: Option<ErrorHandler>) {
        Runtime::with(|rt| *rt.error_handler.borrow_mut() = handler)
    }

    pub(crate) fn flush_state() -> FlushState {
        Runtime::with(|rt| rt.scheduler.borrow().state())
    }

    pub(crate) fn is_pending(id: NodeId) -> bool {
        Runtime::with(|rt| rt.scheduler.borrow().is_pending(id))
    }

    pub(crate) fn pending_count() -> usize {
        Runtime::with(|rt| rt.scheduler.borrow().pending_count())
    }

    pub(crate) fn snapshot() -> GraphSnapshot {
        Runtime::with(|rt| rt.graph.borrow().snapshot())
    }

    pub(crate) fn is_reactive_type(value: &dyn Any) -> bool {
        let type_id = Any::type_id(value);
        Runtime::with(|rt| rt.reactive_types.borrow().contains(&type_id))
    }
}

/// Returns the scheduler to idle when a flush ends, including by panic.
struct FlushGuard<'a>(&'a Runtime);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.scheduler.borrow_mut().finish_flush();
    }
}

/// Puts the effects of a pass that were not reached back in the queue when
/// an effect panics, so they are not left dirty but unscheduled.
struct PassGuard<'a> {
    rt: &'a Runtime,
    ids: Vec<NodeId>,
    cursor: usize,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.cursor >= self.ids.len() {
            return;
        }
        let rest: Vec<NodeId> = match self.rt.effects.try_borrow() {
            Ok(effects) => self.ids[self.cursor..]
                .iter()
                .copied()
                .filter(|id| effects.contains_key(id))
                .collect(),
            Err(_) => self.ids[self.cursor..].to_vec(),
        };
        tracing::warn!(
            effects = rest.len(),
            "effect panicked during flush; requeueing the rest of the pass"
        );
        if let Ok(mut scheduler) = self.rt.scheduler.try_borrow_mut() {
            scheduler.requeue(rest);
        }
    }
}

/// Leaves a node dirty if its evaluation unwinds. A panicking effect is
/// also put back in the queue.
struct EvaluationGuard {
    id: NodeId,
    done: bool,
}

impl EvaluationGuard {
    fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let id = self.id;
        Runtime::try_with(|rt| {
            let is_effect = match rt.graph.try_borrow_mut() {
                Ok(mut graph) => match graph.get_mut(id) {
                    Some(node) => {
                        node.mark_dirty();
                        node.kind() == NodeKind::Effect
                    }
                    None => false,
                },
                Err(_) => false,
            };
            if is_effect {
                if let Ok(mut scheduler) = rt.scheduler.try_borrow_mut() {
                    scheduler.requeue([id]);
                }
            }
            tracing::debug!(node = %id, "evaluation unwound; node left dirty");
        });
    }
}

/// Marks a node as computing for as long as the guard lives. A read of the
/// node while the guard is alive is a cycle.
pub(crate) struct ComputingGuard(NodeId);

impl ComputingGuard {
    pub(crate) fn enter(id: NodeId) -> Self {
        Runtime::with(|rt| {
            if let Some(node) = rt.graph.borrow_mut().get_mut(id) {
                node.set_computing(true);
            }
        });
        Self(id)
    }
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        let id = self.0;
        Runtime::try_with(|rt| {
            if let Some(node) = rt.graph.borrow_mut().get_mut(id) {
                node.set_computing(false);
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Public host API
// ----------------------------------------------------------------------------

/// Run every queued effect on this thread.
///
/// Effects run in creation order. Effects dirtied while the flush runs are
/// drained by the same flush, up to [`RuntimeConfig::max_flush_passes`]
/// passes. Returns how many effects actually ran. Calling this from inside
/// a running flush does nothing and returns `Ok(0)`.
///
/// A flush aborted with [`ReactiveError::InfiniteLoop`], or unwound by a
/// panicking effect, leaves the remaining effects pending and the scheduler
/// `Idle` without asking the host for another flush. They run on the next
/// call to `flush_effects`, or once the next write requests a flush.
pub fn flush_effects() -> Result<usize, ReactiveError> {
    Runtime::flush()
}

/// Install a validated configuration for this thread's runtime.
pub fn configure(config: RuntimeConfig) -> Result<(), ReactiveError> {
    Runtime::configure(config)
}

/// The configuration currently installed on this thread.
pub fn current_config() -> RuntimeConfig {
    Runtime::config()
}

/// Choose how this thread's runtime asks its host for a flush.
pub fn set_flush_requester(requester: impl FlushRequester + 'static) {
    Runtime::set_flush_requester(Rc::new(requester))
}

/// Receive errors raised while flushing, such as
/// [`ReactiveError::InfiniteLoop`]. Without a handler they are logged.
pub fn set_error_handler(handler: impl Fn(&ReactiveError) + 'static) {
    Runtime::set_error_handler(Some(Rc::new(handler)))
}

/// Remove a handler installed with [`set_error_handler`].
pub fn clear_error_handler() {
    Runtime::set_error_handler(None)
}

/// Current state of this thread's effect scheduler.
pub fn flush_state() -> FlushState {
    Runtime::flush_state()
}

/// Number of effects waiting for the next flush.
pub fn pending_effect_count() -> usize {
    Runtime::pending_count()
}

/// Snapshot of this thread's dependency graph, for debugging.
pub fn graph_snapshot() -> GraphSnapshot {
    Runtime::snapshot()
}

/// Whether `value` is one of this crate's readable reactive handles
/// (signals, computeds, inputs and queries).
///
/// Plain values, closures and effects are not.
pub fn is_reactive_node(value: &dyn Any) -> bool {
    Runtime::is_reactive_type(value)
}
