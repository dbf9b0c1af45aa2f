//! Tokio Host Integration
//!
//! [`TokioLocalFlush`] lets a tokio `LocalSet` drive effect flushes: the
//! first write after an idle period spawns one local task that calls
//! [`flush_effects`]. Reactive handles are `!Send`, so flushing always
//! happens on the thread that owns the graph.
//!
//! ```rust,ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     set_flush_requester(TokioLocalFlush);
//!     // create signals and effects; writes flush on the next tick
//! }).await;
//! ```

use crate::graph::FlushRequester;
use crate::reactive::flush_effects;

/// Flushes effects from a task spawned on the current tokio `LocalSet`.
///
/// Requesting a flush outside a `LocalSet` panics, as
/// `tokio::task::spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLocalFlush;

impl FlushRequester for TokioLocalFlush {
    fn request_flush(&self) {
        tokio::task::spawn_local(async {
            // Loop errors have already been handed to the error handler.
            if let Err(err) = flush_effects() {
                tracing::debug!(error = %err, "scheduled flush ended with an error");
            }
        });
    }
}
