//! Runtime configuration.
//!
//! The configuration is per thread, because the reactive runtime itself is
//! thread-local. Hosts typically load it once at startup:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "max_flush_passes": 50 }"#)?;
//! ripple_core::configure(config)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Default cap on effect passes within a single flush.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of passes a flush may take before it is aborted with
    /// [`ReactiveError::InfiniteLoop`]. A pass runs every effect that was
    /// pending when it started; effects dirtied during a pass run in the next.
    pub max_flush_passes: usize,

    /// Emit a `trace!` event for every edge added or pruned and every node
    /// marked dirty.
    pub trace_propagation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
            trace_propagation: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a configuration from JSON. Missing fields take
    /// their default values.
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| ReactiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), ReactiveError> {
        if self.max_flush_passes == 0 {
            return Err(ReactiveError::Config(
                "max_flush_passes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
