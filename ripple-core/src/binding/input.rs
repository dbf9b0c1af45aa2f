//! Component Inputs
//!
//! An input is a read-only signal whose value is written by the host when a
//! parent binds to it. Components read it like any other producer.
//!
//! Raw values written by the host go through the input's transform exactly
//! once, at write time. Readers only ever see the transformed value.

use std::cell::RefCell;
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use crate::error::{ReactiveError, RequiredKind};
use crate::graph::{NodeId, ReactiveNode};
use crate::reactive::{partial_eq, EqualityFn, Runtime};

type TransformFn<T, R> = Box<dyn Fn(R) -> T>;

struct InputInner<T, R> {
    id: NodeId,
    name: String,
    required: bool,
    value: RefCell<Option<T>>,
    transform: TransformFn<T, R>,
    equal: EqualityFn<T>,
}

impl<T, R> Drop for InputInner<T, R> {
    fn drop(&mut self) {
        Runtime::remove_node(self.id);
    }
}

/// A component input holding a `T`, written by the host with raw `R` values.
///
/// # Example
///
/// ```rust,ignore
/// let user_id = input_required::<u32>("userId");
/// assert!(user_id.get().is_err());
///
/// user_id.apply_value(0);
/// assert_eq!(user_id.get()?, 0);
/// ```
pub struct InputSignal<T: 'static, R: 'static = T> {
    inner: Rc<InputInner<T, R>>,
}

impl<T: PartialEq + 'static, R: 'static> InputSignal<T, R> {
    fn create(
        name: impl Into<String>,
        initial: Option<T>,
        transform: impl Fn(R) -> T + 'static,
    ) -> Self {
        Runtime::register_type::<InputSignal<T, R>>();
        let name = name.into();
        let required = initial.is_none();
        let id = Runtime::register_node(ReactiveNode::signal(Some(name.clone())));
        Self {
            inner: Rc::new(InputInner {
                id,
                name,
                required,
                value: RefCell::new(initial),
                transform: Box::new(transform),
                equal: partial_eq(),
            }),
        }
    }
}

impl<T: 'static, R: 'static> InputSignal<T, R> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The public name (alias) the input is bound under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_required(&self) -> bool {
        self.inner.required
    }

    /// Whether a value is present. Always true for optional inputs.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the current value, registering a dependency.
    ///
    /// A required input returns [`ReactiveError::ValueNotAvailable`] until
    /// the host writes its first value.
    pub fn get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, registering a dependency.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> Result<U, ReactiveError> {
        // Tracked even when unset, so a consumer re-runs once a value arrives.
        Runtime::track_read(self.inner.id);
        match &*self.inner.value.borrow() {
            Some(value) => Ok(f(value)),
            None => Err(ReactiveError::ValueNotAvailable {
                kind: RequiredKind::Input,
                name: self.inner.name.clone(),
            }),
        }
    }

    /// Run the input's transform on `raw` without storing the result.
    pub fn transform_value(&self, raw: R) -> T {
        (self.inner.transform)(raw)
    }

    /// Write a raw value from the host binding.
    ///
    /// The transform runs once. A transformed value equal to the current one
    /// is ignored; the first value of a required input always counts.
    pub fn apply_value(&self, raw: R) {
        let value = (self.inner.transform)(raw);
        let unchanged = match &*self.inner.value.borrow() {
            Some(current) => (self.inner.equal)(current, &value),
            None => false,
        };
        if unchanged {
            tracing::trace!(input = %self.inner.name, "input write of equal value ignored");
            return;
        }
        *self.inner.value.borrow_mut() = Some(value);
        Runtime::producer_changed(self.inner.id);
    }
}

impl<T: 'static, R: 'static> Clone for InputSignal<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Display + 'static, R: 'static> Display for InputSignal<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.value.borrow() {
            Some(value) => write!(f, "[Input Signal: {value}]"),
            None => f.write_str("[Input Signal: <no value>]"),
        }
    }
}

impl<T: Debug + 'static, R: 'static> Debug for InputSignal<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSignal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("required", &self.inner.required)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Optional input with an initial value.
pub fn input<T: PartialEq + 'static>(name: impl Into<String>, initial: T) -> InputSignal<T> {
    InputSignal::create(name, Some(initial), |value| value)
}

/// Required input. Reads fail until the host writes a value.
pub fn input_required<T: PartialEq + 'static>(name: impl Into<String>) -> InputSignal<T> {
    InputSignal::create(name, None, |value| value)
}

/// Optional input whose raw values are transformed on write.
///
/// The initial value is stored as is.
pub fn input_transformed<T: PartialEq + 'static, R: 'static>(
    name: impl Into<String>,
    initial: T,
    transform: impl Fn(R) -> T + 'static,
) -> InputSignal<T, R> {
    InputSignal::create(name, Some(initial), transform)
}

/// Required input whose raw values are transformed on write.
pub fn input_required_transformed<T: PartialEq + 'static, R: 'static>(
    name: impl Into<String>,
    transform: impl Fn(R) -> T + 'static,
) -> InputSignal<T, R> {
    InputSignal::create(name, None, transform)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
