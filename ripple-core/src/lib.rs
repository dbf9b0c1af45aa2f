//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime: a dependency graph
//! of signals, computeds and effects, plus an effect scheduler that batches
//! side effects into host-driven flushes. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Lazy, glitch-free propagation with version-based staleness checks
//! - An effect scheduler with creation-order flushes and a loop guard
//! - Binding adapters for component inputs and view/content queries
//!
//! # Architecture
//!
//! - `graph`: nodes, versioned edges and the effect queue
//! - `reactive`: the primitives and the per-thread runtime
//! - `binding`: host-written inputs and query results
//! - `host`: tokio integration (feature `tokio`)
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{computed, effect, flush_effects, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _log = effect(move |_| {
//!     println!("Doubled: {}", doubled.get().unwrap_or_default());
//! });
//!
//! // Update the signal, then let the host flush
//! count.set(5);
//! flush_effects()?; // prints: "Doubled: 10"
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod graph;
#[cfg(feature = "tokio")]
pub mod host;
pub mod reactive;

pub use binding::{
    content_child, content_child_required, content_children, input, input_required,
    input_required_transformed, input_transformed, view_child, view_child_required,
    view_children, ChildQuery, ChildrenQuery, InputSignal, QueryOrigin, RequiredChildQuery,
};
pub use config::RuntimeConfig;
pub use error::{ReactiveError, RequiredKind};
pub use graph::{FlushRequester, FlushState, GraphSnapshot, ManualFlush, NodeId, NodeKind};
#[cfg(feature = "tokio")]
pub use host::TokioLocalFlush;
pub use reactive::{
    clear_error_handler, computed, configure, create_signal, create_signal_with_options,
    current_config, effect, flush_effects, flush_state, graph_snapshot, is_reactive_node,
    pending_effect_count, set_error_handler, set_flush_requester, signal, try_computed,
    untracked, Computed, ComputedOptions, DestroyScope, Effect, EffectCleanup, EffectOptions,
    ErrorHandler, EqualityFn, ReadSignal, Scope, Signal, SignalOptions, WriteSignal,
};
