//! Computed Implementation
//!
//! A Computed is a cached derived value. It is a producer for whatever reads
//! it and a consumer of whatever it reads.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. The first read evaluates the computation and
//!    caches the result.
//!
//! 2. When a producer changes, the computed is only flagged dirty.
//!
//! 3. On the next read of a dirty computed, each producer is brought up to
//!    date and its version compared with the version seen last time. If none
//!    moved, the flag is cleared and the cache is returned without running
//!    the computation.
//!
//! 4. Otherwise the computation runs again. If the new result is equal to
//!    the cached one, the cache (and the computed's version) is kept, so
//!    nothing downstream sees a change.
//!
//! Errors returned by the computation are cached like values and returned to
//! every reader until a dependency changes.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::context::untracked;
use super::runtime::{ComputingGuard, Reactive, Runtime};
use super::signal::{partial_eq, EqualityFn};
use crate::error::ReactiveError;
use crate::graph::{NodeId, ReactiveNode};

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError>>;

/// Cached state of a computed.
enum ComputedState<T> {
    /// Never evaluated.
    Unset,
    /// Last evaluation produced a value.
    Value(T),
    /// Last evaluation failed.
    Errored(ReactiveError),
}

/// Options for [`Computed::with_options`].
pub struct ComputedOptions<T> {
    /// Equality function. `None` treats every recomputation as a change.
    pub equal: Option<EqualityFn<T>>,
    /// Debug name shown in errors and graph snapshots.
    pub label: Option<String>,
}

impl<T> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            equal: None,
            label: None,
        }
    }
}

impl<T> ComputedOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn equal(mut self, equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equal = Some(Rc::new(equal));
        self
    }
}

struct ComputedInner<T> {
    id: NodeId,
    compute: ComputeFn<T>,
    state: RefCell<ComputedState<T>>,
    equal: Option<EqualityFn<T>>,
    recomputations: Cell<usize>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

impl<T: 'static> ComputedInner<T> {
    fn is_unset(&self) -> bool {
        matches!(*self.state.borrow(), ComputedState::Unset)
    }

    /// Run the computation and store its result if it differs from the cache.
    fn recompute(&self) {
        let result = Runtime::evaluate(self.id, || (self.compute)());
        self.recomputations.set(self.recomputations.get() + 1);

        let changed = match (&*self.state.borrow(), &result) {
            (ComputedState::Value(old), Ok(new)) => {
                !self.equal.as_ref().is_some_and(|equal| equal(old, new))
            }
            _ => true,
        };
        if !changed {
            tracing::trace!(computed = %self.id, "recomputed to an equal value");
            return;
        }

        *self.state.borrow_mut() = match result {
            Ok(value) => ComputedState::Value(value),
            Err(err) => ComputedState::Errored(err),
        };
        Runtime::producer_changed(self.id);
    }
}

impl<T: 'static> Reactive for ComputedInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn refresh(&self) -> bool {
        let Some(dirty) = Runtime::is_dirty(self.id) else {
            return false;
        };
        if Runtime::is_computing(self.id) {
            return false;
        }
        let unset = self.is_unset();
        if !dirty && !unset {
            return false;
        }

        let _computing = ComputingGuard::enter(self.id);
        if !unset && !Runtime::producers_changed(self.id) {
            Runtime::mark_clean(self.id);
            return false;
        }
        self.recompute();
        true
    }
}

/// A cached value derived from other reactive values.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get()?, 4);
/// count.set(5);
/// assert_eq!(doubled.get()?, 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    /// Create a computed from an infallible computation, compared with
    /// `PartialEq`.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::try_new(move || Ok(compute()))
    }

    /// Create a computed from a fallible computation, compared with
    /// `PartialEq`.
    pub fn try_new(compute: impl Fn() -> Result<T, ReactiveError> + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(
            compute,
            ComputedOptions {
                equal: Some(partial_eq()),
                label: None,
            },
        )
    }

    /// Create a computed with explicit options.
    pub fn with_options(
        compute: impl Fn() -> Result<T, ReactiveError> + 'static,
        options: ComputedOptions<T>,
    ) -> Self {
        Runtime::register_type::<Computed<T>>();
        let id = Runtime::register_node(ReactiveNode::computed(options.label));
        let inner = Rc::new(ComputedInner {
            id,
            compute: Box::new(compute),
            state: RefCell::new(ComputedState::Unset),
            equal: options.equal,
            recomputations: Cell::new(0),
        });
        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        Runtime::register_derived(id, weak);
        Self { inner }
    }

    /// Get the computed's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        let id = self.inner.id;
        if Runtime::is_computing(id) {
            let node = Runtime::describe(id);
            tracing::debug!(%node, "cycle detected");
            return Err(ReactiveError::CyclicDependency { node });
        }

        if Runtime::contains(id) {
            self.inner.refresh();
            Runtime::track_read(id);
        } else if self.inner.is_unset() {
            // Destroyed before it was ever read.
            return untracked(|| (self.inner.compute)()).map(|value| f(&value));
        }

        match &*self.inner.state.borrow() {
            ComputedState::Value(value) => Ok(f(value)),
            ComputedState::Errored(err) => Err(err.clone()),
            ComputedState::Unset => Err(ReactiveError::compute(format!(
                "{} has no value",
                Runtime::describe(id)
            ))),
        }
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        untracked(|| self.get())
    }

    /// Number of times the computation has run.
    pub fn recomputations(&self) -> usize {
        self.inner.recomputations.get()
    }

    /// Whether a value or error is cached.
    pub fn has_value(&self) -> bool {
        !self.inner.is_unset()
    }

    /// Whether a dependency changed since the last evaluation.
    pub fn is_dirty(&self) -> bool {
        Runtime::is_dirty(self.inner.id).unwrap_or(false)
    }

    /// Current version of the node. Advances only when a recomputation
    /// produced a different result.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.graph.borrow().version(self.inner.id)).unwrap_or_default()
    }

    /// Number of producers read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(self.inner.id)
                .map(|node| node.producers().len())
                .unwrap_or(0)
        })
    }

    /// Unlink the computed from the graph. It keeps returning its last
    /// cached result and never recomputes again.
    pub fn destroy(&self) {
        Runtime::remove_node(self.inner.id);
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("has_value", &self.has_value())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create a computed from an infallible computation.
pub fn computed<T: PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

/// Create a computed from a fallible computation.
pub fn try_computed<T: PartialEq + 'static>(
    compute: impl Fn() -> Result<T, ReactiveError> + 'static,
) -> Computed<T> {
    Computed::try_new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
