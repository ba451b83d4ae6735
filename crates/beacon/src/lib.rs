//! The beacon launcher host.
//!
//! The binary loads its configuration, installs structured telemetry, and
//! builds the active source set with the plugin loader from
//! [`beacon_plugins`]. Plugins run in their own sandbox; the host asks on
//! the terminal before granting a plugin capabilities it has not been
//! granted before, and announces clipboard requests made by plugins.
//!
//! The front end is a line-oriented [`shell::Shell`]. Each line is a query
//! routed by the search orchestrator; `:N` activates a listed result and a
//! handful of `:` commands edit the plugin registry and reload the plugin
//! set without restarting.

mod bootstrap;
mod builtins;
mod clipboard;
mod health;
mod host;
mod process;
mod prompt;
pub mod shell;
pub mod telemetry;
mod terminal;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use builtins::{INSTALLED_PLUGINS_TRIGGER, InstalledPlugins};
pub use clipboard::TerminalClipboard;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host::Host;
pub use process::{LaunchError, run_launcher};
pub use prompt::{TerminalPrompt, parse_answer};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use terminal::Terminal;

#[cfg(test)]
mod tests;
