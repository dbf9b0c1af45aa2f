//! Reactive Context
//!
//! The reactive context tracks which consumer is currently evaluating, so
//! that a read can register the consumer as a dependent of what it read.
//!
//! # Implementation
//!
//! The runtime owns an explicit [`ConsumerStack`]. Evaluating a computed or
//! an effect pushes a frame through a [`ReactiveContext`] guard; reads made
//! while the frame is on top are recorded in it together with the producer
//! version they observed. Dropping the guard pops the frame again, also when
//! the computation panics, so a nested or re-entrant evaluation can never
//! leave the outer consumer's tracking in a corrupted state.
//!
//! An untracked frame (consumer `None`) hides the frames below it: reads
//! inside [`untracked`] register nothing.

use super::runtime::Runtime;
use crate::graph::{NodeId, ProducerEdge, ProducerEdges};

/// One evaluation on the consumer stack.
#[derive(Debug)]
pub(crate) struct Frame {
    consumer: Option<NodeId>,
    reads: ProducerEdges,
}

/// Save/restore stack of evaluating consumers.
#[derive(Debug, Default)]
pub struct ConsumerStack {
    frames: Vec<Frame>,
}

impl ConsumerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame and return the stack depth it must be popped at.
    pub fn push(&mut self, consumer: Option<NodeId>) -> usize {
        self.frames.push(Frame {
            consumer,
            reads: ProducerEdges::new(),
        });
        self.frames.len()
    }

    /// Pop the frame pushed at `depth`, returning the reads it recorded.
    pub fn pop(&mut self, depth: usize) -> ProducerEdges {
        debug_assert_eq!(
            self.frames.len(),
            depth,
            "consumer stack mismatch: expected depth {}, found {}",
            depth,
            self.frames.len()
        );
        self.frames
            .pop()
            .map(|frame| frame.reads)
            .unwrap_or_default()
    }

    /// The consumer reads are currently attributed to, if any.
    pub fn current(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.consumer)
    }

    #[cfg(test)]
    pub fn is_tracking(&self) -> bool {
        self.current().is_some()
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Record that the current consumer read `producer` at `version`.
    ///
    /// A producer read several times keeps its first position and the
    /// version seen by the latest read.
    pub fn record_read(&mut self, producer: NodeId, version: u64) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.consumer.is_none() || frame.consumer == Some(producer) {
            return;
        }
        match frame.reads.iter_mut().find(|edge| edge.producer == producer) {
            Some(edge) => edge.seen_version = version,
            None => frame.reads.push(ProducerEdge {
                producer,
                seen_version: version,
            }),
        }
    }
}

/// Guard for one frame on the runtime's consumer stack.
///
/// The frame is popped when the guard is dropped. Use [`ReactiveContext::finish`]
/// to pop it and keep the recorded reads.
pub(crate) struct ReactiveContext {
    depth: usize,
    done: bool,
}

impl ReactiveContext {
    /// Enter a frame attributing reads to `consumer`.
    pub(crate) fn enter(consumer: NodeId) -> Self {
        Self::push(Some(consumer))
    }

    /// Enter a frame in which reads are not tracked.
    pub(crate) fn enter_untracked() -> Self {
        Self::push(None)
    }

    fn push(consumer: Option<NodeId>) -> Self {
        let depth = Runtime::with(|rt| rt.context.borrow_mut().push(consumer));
        Self { depth, done: false }
    }

    /// Pop the frame and return the producers read while it was on top.
    pub(crate) fn finish(mut self) -> ProducerEdges {
        self.done = true;
        Runtime::with(|rt| rt.context.borrow_mut().pop(self.depth))
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let depth = self.depth;
        Runtime::try_with(|rt| {
            rt.context.borrow_mut().pop(depth);
        });
    }
}

/// Run `f` without registering any of its reads as dependencies of the
/// consumer that is currently evaluating.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_tracks_current_consumer() {
        let mut stack = ConsumerStack::new();
        let id = NodeId::new();

        assert!(!stack.is_tracking());
        assert!(stack.current().is_none());

        let depth = stack.push(Some(id));
        assert!(stack.is_tracking());
        assert_eq!(stack.current(), Some(id));

        stack.pop(depth);
        assert!(!stack.is_tracking());
    }

    #[test]
    fn records_reads_once_with_latest_version() {
        let mut stack = ConsumerStack::new();
        let consumer = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();

        let depth = stack.push(Some(consumer));
        stack.record_read(a, 1);
        stack.record_read(b, 4);
        stack.record_read(a, 2);

        let reads = stack.pop(depth);
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].producer, a);
        assert_eq!(reads[0].seen_version, 2);
        assert_eq!(reads[1].producer, b);
    }

    #[test]
    fn nested_frames_restore_outer_consumer() {
        let mut stack = ConsumerStack::new();
        let outer = NodeId::new();
        let inner = NodeId::new();
        let signal = NodeId::new();

        let outer_depth = stack.push(Some(outer));
        {
            let inner_depth = stack.push(Some(inner));
            assert_eq!(stack.current(), Some(inner));
            stack.record_read(signal, 0);
            assert_eq!(stack.pop(inner_depth).len(), 1);
        }
        assert_eq!(stack.current(), Some(outer));
        assert!(stack.pop(outer_depth).is_empty());
    }

    #[test]
    fn untracked_frame_hides_outer_consumer() {
        let mut stack = ConsumerStack::new();
        let outer = NodeId::new();
        let signal = NodeId::new();

        let outer_depth = stack.push(Some(outer));
        let hidden = stack.push(None);
        assert!(!stack.is_tracking());
        stack.record_read(signal, 0);
        assert!(stack.pop(hidden).is_empty());

        assert_eq!(stack.current(), Some(outer));
        stack.pop(outer_depth);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn guard_pops_on_panic() {
        let consumer = NodeId::new();
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(consumer);
            panic!("computation failed");
        });
        assert!(result.is_err());
        assert_eq!(Runtime::with(|rt| rt.context.borrow().depth()), 0);
    }
}
