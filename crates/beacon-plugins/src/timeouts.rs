//! Bounds on every call that crosses the sandbox boundary.

use std::time::Duration;

/// Default bound for every plugin call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds applied to probes, start-up, searches, and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginTimeouts {
    /// Metadata probe.
    pub probe: Duration,
    /// Execution-mode start-up, until `ready`.
    pub init: Duration,
    /// One search round trip.
    pub search: Duration,
    /// One activation round trip.
    pub activate: Duration,
}

impl PluginTimeouts {
    /// Uses `bound` for every call.
    #[must_use]
    pub const fn uniform(bound: Duration) -> Self {
        Self {
            probe: bound,
            init: bound,
            search: bound,
            activate: bound,
        }
    }
}

impl Default for PluginTimeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}
