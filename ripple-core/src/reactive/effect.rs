//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is queued on the scheduler (or, with
//!    `immediate`, run synchronously) to establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect is marked dirty and queued.
//!    Queuing is idempotent: an effect is pending at most once.
//!
//! 3. When the flush reaches it, the effect first checks whether any
//!    producer's version actually moved. If not (for example a computed it
//!    reads recomputed to an equal value), it is marked clean without
//!    running.
//!
//! 4. Otherwise cleanups registered by the previous run are called, and the
//!    effect runs again, tracking a fresh set of dependencies.
//!
//! # Lifetime
//!
//! The runtime keeps an effect alive until [`Effect::destroy`] is called or
//! the scope it was created in is destroyed. Dropping an `Effect` handle
//! does not stop it. A destroyed effect is unlinked from every producer,
//! removed from the pending queue and never runs again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::{Reactive, Runtime};
use super::scope::DestroyScope;
use crate::graph::{NodeId, ReactiveNode};

/// Registrar handed to every effect run for cleanup callbacks.
///
/// Callbacks run before the next run of the effect and when the effect is
/// destroyed, whichever comes first.
#[derive(Default)]
pub struct EffectCleanup {
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl EffectCleanup {
    pub fn on_cleanup(&self, callback: impl FnOnce() + 'static) {
        self.callbacks.borrow_mut().push(Box::new(callback));
    }

    fn run(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

/// Options for [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions<'a> {
    /// Debug name shown in graph snapshots and logs.
    pub label: Option<String>,
    /// Destroy the effect together with this scope.
    pub scope: Option<&'a dyn DestroyScope>,
    /// Run once synchronously during creation instead of on the next flush.
    pub immediate: bool,
}

impl<'a> EffectOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn scope(mut self, scope: &'a dyn DestroyScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

struct EffectInner {
    id: NodeId,
    run: Box<dyn Fn(&EffectCleanup)>,
    cleanup: EffectCleanup,
    destroyed: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    fn execute(&self) {
        self.cleanup.run();
        Runtime::evaluate(self.id, || (self.run)(&self.cleanup));
        self.run_count.set(self.run_count.get() + 1);

        // Destroyed by its own run: cleanups registered after the destroy
        // call still have to run.
        if self.destroyed.get() {
            self.cleanup.run();
        }
    }
}

impl Reactive for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn refresh(&self) -> bool {
        if self.destroyed.get() || Runtime::is_dirty(self.id) != Some(true) {
            return false;
        }
        if self.run_count.get() > 0 && !Runtime::producers_changed(self.id) {
            tracing::trace!(effect = %self.id, "dependencies settled to equal values; skipping run");
            Runtime::mark_clean(self.id);
            return false;
        }
        self.execute();
        true
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move |_| println!("Count is: {}", count.get())
/// });
///
/// count.set(5);
/// flush_effects()?; // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect that first runs on the next flush.
    pub fn new(run: impl Fn(&EffectCleanup) + 'static) -> Self {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect with explicit options.
    pub fn with_options(run: impl Fn(&EffectCleanup) + 'static, options: EffectOptions<'_>) -> Self {
        let id = Runtime::register_node(ReactiveNode::effect(options.label));
        let inner = Rc::new(EffectInner {
            id,
            run: Box::new(run),
            cleanup: EffectCleanup::default(),
            destroyed: Cell::new(false),
            run_count: Cell::new(0),
        });
        Runtime::register_effect(Rc::clone(&inner) as Rc<dyn Reactive>);
        let effect = Self { inner };

        if let Some(scope) = options.scope {
            let weak = Rc::downgrade(&effect.inner);
            scope.on_destroy(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Effect { inner }.destroy();
                }
            }));
        }

        if options.immediate {
            effect.inner.refresh();
        } else {
            Runtime::schedule_effect(id);
        }
        effect
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect now, regardless of whether it is dirty.
    pub fn run_now(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        Runtime::with(|rt| rt.scheduler.borrow_mut().cancel(self.inner.id));
        self.inner.execute();
    }

    /// Destroy the effect: unlink it, cancel any pending run and call its
    /// cleanups. Further calls do nothing.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        Runtime::remove_node(self.inner.id);
        self.inner.cleanup.run();
        tracing::debug!(effect = %self.inner.id, "effect destroyed");
    }

    /// Check if the effect has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Whether the effect is waiting for the next flush.
    pub fn is_pending(&self) -> bool {
        Runtime::is_pending(self.inner.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies read during the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(self.inner.id)
                .map(|node| node.producers().len())
                .unwrap_or(0)
        })
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Create an effect that first runs on the next flush.
pub fn effect(run: impl Fn(&EffectCleanup) + 'static) -> Effect {
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
