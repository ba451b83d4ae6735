use std::env;
use std::path::PathBuf;

use dirs::config_dir;

use crate::logging::LogFormat;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound, in milliseconds, for every call into a plugin.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default debounce window, in milliseconds, for network-capable plugins.
pub const DEFAULT_NETWORK_DEBOUNCE_MS: u64 = 500;

/// Name of the sandbox trampoline binary.
pub const CAGE_PROGRAM_NAME: &str = "beacon-cage";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default plugin call bound in milliseconds.
#[must_use]
pub const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Default network debounce window in milliseconds.
#[must_use]
pub const fn default_network_debounce_ms() -> u64 {
    DEFAULT_NETWORK_DEBOUNCE_MS
}

/// Location of the plugin registry file.
///
/// Lives under the user's configuration directory, falling back to the
/// working directory when none is known.
#[must_use]
pub fn default_registry_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beacon")
        .join("plugins.json")
}

/// Location of the `beacon-cage` trampoline.
///
/// Installed next to the running executable; falls back to a bare name
/// resolved through `PATH` when the executable path is unknown.
#[must_use]
pub fn default_cage_program() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CAGE_PROGRAM_NAME)))
        .unwrap_or_else(|| PathBuf::from(CAGE_PROGRAM_NAME))
}
