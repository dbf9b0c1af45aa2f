//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! notifies the computations that read it when the value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    read is recorded and becomes a dependency edge once the evaluation
//!    finishes.
//!
//! 2. When a signal is written with a value its equality function considers
//!    different, its version is bumped and its consumers are marked dirty.
//!
//! 3. A write of an equal value is a no-op: no version bump, nothing
//!    scheduled.
//!
//! # Ownership
//!
//! Handles are reference counted. The node is unlinked from the graph when
//! the last handle is dropped, or earlier through [`Signal::destroy`].

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::Runtime;
use crate::graph::{NodeId, ReactiveNode};

/// Equality used to decide whether a write is a change.
pub type EqualityFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// The default equality: `PartialEq`.
pub(crate) fn partial_eq<T: PartialEq + 'static>() -> EqualityFn<T> {
    Rc::new(|a: &T, b: &T| a == b)
}

/// Options for [`Signal::with_options`].
pub struct SignalOptions<T> {
    /// Equality function. `None` treats every write as a change.
    pub equal: Option<EqualityFn<T>>,
    /// Debug name shown in errors and graph snapshots.
    pub label: Option<String>,
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            equal: None,
            label: None,
        }
    }
}

impl<T> SignalOptions<T> {
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

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equal: Option<EqualityFn<T>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

impl<T: 'static> SignalInner<T> {
    fn new(value: T, options: SignalOptions<T>) -> Rc<Self> {
        let id = Runtime::register_node(ReactiveNode::signal(options.label));
        Rc::new(Self {
            id,
            value: RefCell::new(value),
            equal: options.equal,
        })
    }

    fn get(&self) -> T
    where
        T: Clone,
    {
        Runtime::track_read(self.id);
        self.value.borrow().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track_read(self.id);
        f(&*self.value.borrow())
    }

    fn set(&self, value: T) {
        let unchanged = match &self.equal {
            Some(equal) => equal(&*self.value.borrow(), &value),
            None => false,
        };
        if unchanged {
            tracing::trace!(signal = %self.id, "write of equal value ignored");
            return;
        }
        *self.value.borrow_mut() = value;
        Runtime::producer_changed(self.id);
    }

    fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&*self.value.borrow());
        self.set(next);
    }

    fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        f(&mut *self.value.borrow_mut());
        Runtime::producer_changed(self.id);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (marks dependents dirty)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(
            value,
            SignalOptions {
                equal: Some(partial_eq()),
                label: None,
            },
        )
    }

    /// Create a new signal with explicit options.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        Runtime::register_type::<Signal<T>>();
        Runtime::register_type::<ReadSignal<T>>();
        Self {
            inner: SignalInner::new(value, options),
        }
    }

    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, registering a dependency if a consumer is
    /// evaluating.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    /// Borrow the current value, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Replace the value. Equal values are ignored.
    pub fn set(&self, value: T) {
        self.inner.set(value)
    }

    /// Compute the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.inner.update(f)
    }

    /// Mutate the value in place. Always counts as a change.
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        self.inner.update_in_place(f)
    }

    /// Read-only view sharing this signal's node.
    pub fn as_read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Split into a read handle and a write handle.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        let read = self.as_read_only();
        (read, WriteSignal { inner: self.inner })
    }

    /// Current version of the node. Unchanged by no-op writes.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.graph.borrow().version(self.inner.id)).unwrap_or_default()
    }

    /// Number of consumers that read this signal in their last evaluation.
    pub fn consumer_count(&self) -> usize {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(self.inner.id)
                .map(|node| node.consumers().len())
                .unwrap_or(0)
        })
    }

    /// Unlink the signal from the graph now. The value stays readable, but
    /// reads are no longer tracked and writes no longer notify anyone.
    pub fn destroy(&self) {
        Runtime::remove_node(self.inner.id);
    }

    pub fn is_destroyed(&self) -> bool {
        !Runtime::contains(self.inner.id)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("consumer_count", &self.consumer_count())
            .finish()
    }
}

/// Read half of a signal.
pub struct ReadSignal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSignal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Write half of a signal.
pub struct WriteSignal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> WriteSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn set(&self, value: T) {
        self.inner.set(value)
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.inner.update(f)
    }

    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        self.inner.update_in_place(f)
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Create a signal compared with `PartialEq`.
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a signal and split it into read and write handles.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

/// Create a signal with explicit options and split it into read and write
/// handles.
pub fn create_signal_with_options<T: 'static>(
    value: T,
    options: SignalOptions<T>,
) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::with_options(value, options).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
