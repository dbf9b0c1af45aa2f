//! Reactive Primitives
//!
//! This module implements the reactive system itself: signals, computeds and
//! effects, plus the per-thread runtime that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read while a
//! computed or effect is evaluating, that consumer becomes a dependent. When
//! the signal's value changes, its dependents are marked dirty.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It is lazy: it only
//! re-evaluates when read, and only if one of its dependencies' versions
//! actually moved. A recomputation that yields an equal value is invisible
//! downstream.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects never run synchronously on write; they are
//! queued and run when the host flushes.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically. Every evaluation pushes a frame
//! on an explicit consumer stack; reads are recorded in the top frame and
//! become the consumer's edges when the evaluation finishes.

mod computed;
mod context;
mod effect;
mod runtime;
mod scope;
mod signal;

pub use computed::{computed, try_computed, Computed, ComputedOptions};
pub use context::untracked;
pub use effect::{effect, Effect, EffectCleanup, EffectOptions};
pub use runtime::{
    clear_error_handler, configure, current_config, flush_effects, flush_state, graph_snapshot,
    is_reactive_node, pending_effect_count, set_error_handler, set_flush_requester, ErrorHandler,
};
pub use scope::{DestroyScope, Scope};
pub use signal::{
    create_signal, create_signal_with_options, signal, EqualityFn, ReadSignal, Signal,
    SignalOptions, WriteSignal,
};

pub(crate) use runtime::Runtime;
pub(crate) use signal::partial_eq;
