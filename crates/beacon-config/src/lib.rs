//! Layered configuration shared by the beacon host and its tools.
//!
//! Values are merged from built-in defaults, a configuration file
//! (`--config-path` or `.beacon.toml`), `BEACON_*` environment variables,
//! and command-line flags, in increasing order of precedence.

mod defaults;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use beacon_plugins::PluginTimeouts;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    CAGE_PROGRAM_NAME, DEFAULT_LOG_FILTER, DEFAULT_NETWORK_DEBOUNCE_MS, DEFAULT_TIMEOUT_MS,
    default_cage_program, default_log_filter, default_log_filter_string, default_log_format,
    default_network_debounce_ms, default_registry_path, default_timeout_ms,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration for the beacon host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BEACON")]
pub struct Config {
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log line format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Plugin registry file.
    #[ortho_config(default = default_registry_path())]
    pub registry_path: PathBuf,
    /// The `beacon-cage` trampoline used to start sandboxed units.
    #[ortho_config(default = default_cage_program())]
    pub cage_program: PathBuf,
    /// Program that runs remote plugin locators, given the URL.
    pub remote_runner: Option<PathBuf>,
    /// Bound on a metadata probe, in milliseconds.
    #[ortho_config(default = default_timeout_ms())]
    pub probe_timeout_ms: u64,
    /// Bound on execution-mode start-up, in milliseconds.
    #[ortho_config(default = default_timeout_ms())]
    pub init_timeout_ms: u64,
    /// Bound on one search round trip, in milliseconds.
    #[ortho_config(default = default_timeout_ms())]
    pub search_timeout_ms: u64,
    /// Bound on one activation round trip, in milliseconds.
    #[ortho_config(default = default_timeout_ms())]
    pub activate_timeout_ms: u64,
    /// Debounce window for network-capable plugins, in milliseconds. Zero
    /// disables debouncing.
    #[ortho_config(default = default_network_debounce_ms())]
    pub network_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            registry_path: default_registry_path(),
            cage_program: default_cage_program(),
            remote_runner: None,
            probe_timeout_ms: DEFAULT_TIMEOUT_MS,
            init_timeout_ms: DEFAULT_TIMEOUT_MS,
            search_timeout_ms: DEFAULT_TIMEOUT_MS,
            activate_timeout_ms: DEFAULT_TIMEOUT_MS,
            network_debounce_ms: DEFAULT_NETWORK_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the plugin registry path.
    #[must_use]
    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// Returns the sandbox trampoline path.
    #[must_use]
    pub fn cage_program(&self) -> &Path {
        &self.cage_program
    }

    /// Returns the remote runner, if one is configured.
    #[must_use]
    pub fn remote_runner(&self) -> Option<&Path> {
        self.remote_runner.as_deref()
    }

    /// Bounds for every call that crosses the sandbox boundary.
    #[must_use]
    pub const fn plugin_timeouts(&self) -> PluginTimeouts {
        PluginTimeouts {
            probe: Duration::from_millis(self.probe_timeout_ms),
            init: Duration::from_millis(self.init_timeout_ms),
            search: Duration::from_millis(self.search_timeout_ms),
            activate: Duration::from_millis(self.activate_timeout_ms),
        }
    }

    /// Debounce window for network-capable plugins.
    #[must_use]
    pub const fn network_debounce(&self) -> Duration {
        Duration::from_millis(self.network_debounce_ms)
    }
}

#[cfg(test)]
mod tests;
