//! Destroy Scopes
//!
//! Effects are bound to the lifetime of whatever created them: a component
//! instance, a view, a test fixture. The host describes that lifetime with a
//! [`DestroyScope`]. [`Scope`] is a ready-made implementation for hosts that
//! do not have one of their own.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Something that can run callbacks when it is destroyed.
pub trait DestroyScope {
    /// Register `callback` to run when the scope is destroyed. If the scope
    /// is already destroyed the callback runs immediately.
    fn on_destroy(&self, callback: Box<dyn FnOnce()>);
}

#[derive(Default)]
struct ScopeInner {
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

/// A simple owning scope. Clones share the same lifetime.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered callback, in registration order. Further calls
    /// do nothing.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        // Callbacks may register more callbacks; those run immediately.
        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        tracing::debug!(callbacks = callbacks.len(), "scope destroyed");
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl DestroyScope for Scope {
    fn on_destroy(&self, callback: Box<dyn FnOnce()>) {
        if self.is_destroyed() {
            callback();
            return;
        }
        self.inner.callbacks.borrow_mut().push(callback);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("callbacks", &self.inner.callbacks.borrow().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
