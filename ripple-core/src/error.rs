//! Error types for the reactive graph.
//!
//! Every fallible read or flush returns a [`ReactiveError`]. The type is
//! `Clone` because a computed caches the error produced by its computation
//! and hands a copy to each subsequent reader.

use std::fmt;

/// What kind of required binding was read before it had a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredKind {
    /// A component input created with `input_required`.
    Input,
    /// A single-result view or content query created as required.
    ChildQuery,
}

impl fmt::Display for RequiredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredKind::Input => f.write_str("Input"),
            RequiredKind::ChildQuery => f.write_str("Child query result"),
        }
    }
}

impl RequiredKind {
    fn pending_suffix(self) -> &'static str {
        match self {
            RequiredKind::Input => " yet",
            RequiredKind::ChildQuery => "",
        }
    }
}

/// Errors produced by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A computed read itself, directly or through other computeds.
    #[error("Detected cycle in computations: {node} was read while it was being computed")]
    CyclicDependency { node: String },

    /// A required input or query was read before any value was written.
    #[error("{kind} \"{name}\" is required but no value is available{}.", .kind.pending_suffix())]
    ValueNotAvailable { kind: RequiredKind, name: String },

    /// A computation reported a failure. Cached until a dependency changes.
    #[error("computation failed: {0}")]
    Compute(String),

    /// A flush kept re-dirtying effects past the configured pass limit.
    #[error("effect flush did not settle after {passes} passes; aborting flush")]
    InfiniteLoop { passes: usize },

    /// The runtime configuration was rejected.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Compute`] from anything printable.
    ///
    /// Intended for use inside `try_computed` closures:
    ///
    /// ```rust,ignore
    /// let parsed = try_computed(move || {
    ///     raw.get().parse::<u32>().map_err(ReactiveError::compute)
    /// });
    /// ```
    pub fn compute(message: impl fmt::Display) -> Self {
        ReactiveError::Compute(message.to_string())
    }

    /// Whether this error is recoverable by writing a value to a binding.
    pub fn is_value_not_available(&self) -> bool {
        matches!(self, ReactiveError::ValueNotAvailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_input_message_names_the_input() {
        let err = ReactiveError::ValueNotAvailable {
            kind: RequiredKind::Input,
            name: "userId".into(),
        };
        assert_eq!(
            err.to_string(),
            "Input \"userId\" is required but no value is available yet."
        );
        assert!(err.is_value_not_available());
    }

    #[test]
    fn required_query_message_names_the_query() {
        let err = ReactiveError::ValueNotAvailable {
            kind: RequiredKind::ChildQuery,
            name: "header".into(),
        };
        assert_eq!(
            err.to_string(),
            "Child query result \"header\" is required but no value is available."
        );
    }

    #[test]
    fn cyclic_message_names_the_node() {
        let err = ReactiveError::CyclicDependency {
            node: "computed \"total\" (#4)".into(),
        };
        assert!(err.to_string().contains("computed \"total\" (#4)"));
    }

    #[test]
    fn compute_builds_from_display() {
        let err = "abc".parse::<u32>().map_err(ReactiveError::compute).unwrap_err();
        assert!(matches!(err, ReactiveError::Compute(ref m) if m.contains("invalid digit")));
    }
}
