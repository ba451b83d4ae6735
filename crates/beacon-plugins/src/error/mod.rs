//! Domain errors raised while loading and talking to plugins.
//!
//! The variants follow the failure taxonomy of the loader and host adapter.
//! None of them ever reach the search orchestrator: the loader and adapter
//! catch, log, and convert them into an absent plugin or an empty result
//! list. I/O errors are wrapped in `Arc` to satisfy the `result_large_err`
//! Clippy lint.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors arising from plugin loading and execution.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A metadata probe or unit start-up exceeded its bound.
    #[error("plugin at '{locator}' did not answer within {timeout_ms}ms")]
    LoadTimeout {
        /// Locator of the plugin being loaded.
        locator: String,
        /// Bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin declaration was malformed or missing.
    #[error("invalid metadata from plugin at '{locator}': {message}")]
    Metadata {
        /// Locator of the plugin being probed.
        locator: String,
        /// Description of the problem.
        message: String,
    },

    /// The user declined the capabilities the plugin requested.
    #[error("permissions for plugin '{plugin}' were not granted")]
    PermissionDenied {
        /// Identifier of the plugin.
        plugin: String,
    },

    /// An execution-mode unit terminated unexpectedly.
    #[error("sandboxed plugin '{plugin}' terminated: {message}")]
    SandboxCrash {
        /// Identifier of the plugin.
        plugin: String,
        /// What the host observed.
        message: String,
    },

    /// The unit sent a malformed or unexpected message.
    #[error("protocol violation by plugin '{plugin}': {source}")]
    Protocol {
        /// Identifier or locator of the plugin.
        plugin: String,
        /// Underlying decoding failure.
        #[source]
        source: ProtocolError,
    },

    /// A search received no response within its bound.
    #[error("plugin '{plugin}' did not answer search {request_id} within {timeout_ms}ms")]
    SearchTimeout {
        /// Identifier of the plugin.
        plugin: String,
        /// Identifier of the unanswered request.
        request_id: u64,
        /// Bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The sandbox trampoline could not be started.
    #[error("failed to start plugin at '{locator}': {message}")]
    Spawn {
        /// Locator of the plugin.
        locator: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// An I/O error occurred while communicating with the unit.
    #[error("I/O error communicating with plugin '{plugin}': {source}")]
    Io {
        /// Identifier or locator of the plugin.
        plugin: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl PluginError {
    /// Builds a [`PluginError::LoadTimeout`] from a [`Duration`].
    #[must_use]
    pub fn load_timeout(locator: impl Into<String>, timeout: Duration) -> Self {
        Self::LoadTimeout {
            locator: locator.into(),
            timeout_ms: millis(timeout),
        }
    }

    /// Builds a [`PluginError::Metadata`].
    #[must_use]
    pub fn metadata(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Metadata {
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Builds a [`PluginError::Io`].
    #[must_use]
    pub fn io(plugin: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            plugin: plugin.into(),
            source: Arc::new(source),
        }
    }
}

/// Saturating conversion of a bound to whole milliseconds.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
