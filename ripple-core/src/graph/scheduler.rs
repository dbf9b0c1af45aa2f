//! Effect Scheduler
//!
//! The scheduler holds the set of effects waiting to run and the state of the
//! flush cycle. It never runs user code itself: the runtime asks it for the
//! next pass, runs those effects, and reports back.
//!
//! # State Machine
//!
//! ```text
//! Idle --enqueue--> Queued --begin_flush--> Flushing --finish_flush--> Idle
//! ```
//!
//! The `Idle -> Queued` transition is the only point where the host is asked
//! to schedule a flush, so a burst of writes produces a single request.
//!
//! # Ordering
//!
//! Pending effects are kept in a `BTreeSet` keyed by [`NodeId`], which is
//! allocated in creation order. A pass therefore runs effects in creation
//! order no matter which write dirtied them. Effects dirtied while a pass is
//! running are collected for the next pass of the same flush.

use std::collections::BTreeSet;

use super::node::NodeId;

/// Where the scheduler is in its flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing pending and no flush requested.
    Idle,
    /// Effects are pending and the host has been asked to flush.
    Queued,
    /// A flush is draining the pending set.
    Flushing,
}

/// Hook through which the runtime asks its host to schedule a flush.
///
/// The host decides when the flush happens: on the next tick of its render
/// loop, as a spawned task, or immediately from test code. Whatever it
/// picks, it must eventually call [`crate::flush_effects`] on the same
/// thread.
pub trait FlushRequester {
    fn request_flush(&self);
}

impl<F> FlushRequester for F
where
    F: Fn(),
{
    fn request_flush(&self) {
        self()
    }
}

/// A requester that does nothing; the host calls `flush_effects` itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualFlush;

impl FlushRequester for ManualFlush {
    fn request_flush(&self) {}
}

/// Pending-effect queue and flush state.
#[derive(Debug)]
pub struct EffectScheduler {
    state: FlushState,
    pending: BTreeSet<NodeId>,
}

impl EffectScheduler {
    /// Create a new idle scheduler.
    pub fn new() -> Self {
        Self {
            state: FlushState::Idle,
            pending: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Add effects to the pending set. Effects already pending are not
    /// duplicated.
    ///
    /// Returns `true` when this call moved the scheduler from idle to queued,
    /// in which case the caller must request a flush from the host.
    pub fn enqueue<I>(&mut self, effects: I) -> bool
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.pending.extend(effects);
        if self.state == FlushState::Idle && !self.pending.is_empty() {
            self.state = FlushState::Queued;
            return true;
        }
        false
    }

    /// Remove an effect from the pending set.
    pub fn cancel(&mut self, effect: NodeId) -> bool {
        self.pending.remove(&effect)
    }

    pub fn is_pending(&self, effect: NodeId) -> bool {
        self.pending.contains(&effect)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Enter the flushing state. Returns `false` if a flush is already
    /// running, in which case the caller must not start another.
    pub fn begin_flush(&mut self) -> bool {
        if self.state == FlushState::Flushing {
            return false;
        }
        self.state = FlushState::Flushing;
        true
    }

    /// Take every currently pending effect, in ascending id order.
    pub fn take_pass(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Put effects back after an aborted flush so a later flush runs them.
    pub fn requeue<I>(&mut self, effects: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.pending.extend(effects);
    }

    /// Leave the flushing state.
    pub fn finish_flush(&mut self) {
        self.state = FlushState::Idle;
    }
}

impl Default for EffectScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_enqueue_requests_flush_once() {
        let mut scheduler = EffectScheduler::new();
        let a = NodeId::new();
        let b = NodeId::new();

        assert!(scheduler.enqueue([a]));
        assert_eq!(scheduler.state(), FlushState::Queued);
        assert!(!scheduler.enqueue([b]));
        assert!(!scheduler.enqueue([a]));
        assert_eq!(scheduler.pending_count(), 2);
    }

    #[test]
    fn empty_enqueue_stays_idle() {
        let mut scheduler = EffectScheduler::new();
        assert!(!scheduler.enqueue([]));
        assert_eq!(scheduler.state(), FlushState::Idle);
    }

    #[test]
    fn pass_is_in_creation_order() {
        let mut scheduler = EffectScheduler::new();
        let first = NodeId::new();
        let second = NodeId::new();
        let third = NodeId::new();

        scheduler.enqueue([third, first, second]);
        assert!(scheduler.begin_flush());
        assert_eq!(scheduler.take_pass(), vec![first, second, third]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn enqueue_during_flush_does_not_request() {
        let mut scheduler = EffectScheduler::new();
        let a = NodeId::new();
        scheduler.enqueue([a]);
        scheduler.begin_flush();
        scheduler.take_pass();

        assert!(!scheduler.enqueue([a]));
        assert_eq!(scheduler.take_pass(), vec![a]);

        scheduler.finish_flush();
        assert_eq!(scheduler.state(), FlushState::Idle);
        assert!(scheduler.enqueue([a]));
    }

    #[test]
    fn leftovers_request_on_next_enqueue() {
        let mut scheduler = EffectScheduler::new();
        let a = NodeId::new();
        scheduler.enqueue([a]);
        scheduler.begin_flush();
        let pass = scheduler.take_pass();
        scheduler.requeue(pass);
        scheduler.finish_flush();

        assert_eq!(scheduler.state(), FlushState::Idle);
        assert!(scheduler.enqueue([]));
        assert_eq!(scheduler.state(), FlushState::Queued);
        assert!(!scheduler.enqueue([]));
    }

    #[test]
    fn reentrant_begin_is_refused() {
        let mut scheduler = EffectScheduler::new();
        assert!(scheduler.begin_flush());
        assert!(!scheduler.begin_flush());
    }

    #[test]
    fn cancel_removes_pending_effect() {
        let mut scheduler = EffectScheduler::new();
        let a = NodeId::new();
        scheduler.enqueue([a]);
        assert!(scheduler.cancel(a));
        assert!(!scheduler.is_pending(a));
        assert!(!scheduler.cancel(a));
    }

    #[test]
    fn closures_are_flush_requesters() {
        let calls = Cell::new(0);
        let requester = || calls.set(calls.get() + 1);
        requester.request_flush();
        requester.request_flush();
        assert_eq!(calls.get(), 2);

        ManualFlush.request_flush();
    }
}
