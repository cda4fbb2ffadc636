//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is fixed when a [`Runtime`](crate::reactive::Runtime)
//! is built. It can be embedded in a host application's own settings file,
//! which is why it derives serde traits and fills missing fields with
//! defaults.

use serde::{Deserialize, Serialize};

/// Tunables for a reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Emit a `tracing` warning when a read-only wrapper rejects a write.
    pub warn_on_readonly_write: bool,

    /// Skip the currently running computation when a location it reads is
    /// written from inside its own body. Without this a computation that
    /// writes what it reads re-enters itself until the stack overflows.
    pub skip_self_trigger: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            warn_on_readonly_write: true,
            skip_self_trigger: true,
        }
    }
}
