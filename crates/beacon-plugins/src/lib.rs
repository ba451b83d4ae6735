//! Sandboxed plugin hosting for the beacon launcher.
//!
//! Plugins are separate programs that run inside a capability sandbox and
//! talk to the host over a JSON Lines protocol on their standard streams.
//! This crate holds both halves of that conversation:
//!
//! - [`registry`] persists installed plugins and the capabilities the user
//!   approved for each.
//! - [`loader`] probes every installed plugin for its declaration, compares
//!   the requested capabilities with the stored grant, asks the user when
//!   they differ, and starts approved plugins in execution mode.
//! - [`adapter`] presents a running plugin as an ordinary [`Source`], with
//!   every call bounded by [`PluginTimeouts`].
//! - [`orchestrator`] routes each query to the sources that should answer it
//!   and discards answers to superseded queries.
//! - [`sdk`] is the unit-side runtime plugin authors build on.
//!
//! Plugin failures never propagate to the orchestrator. A plugin that cannot
//! be loaded is skipped; a plugin that misbehaves at run time answers with
//! empty results.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use beacon_plugins::loader::{DenyAll, PluginLoader};
//! use beacon_plugins::registry::PluginRegistry;
//! use beacon_plugins::{CageLauncher, SearchOrchestrator};
//!
//! let registry = PluginRegistry::open("/home/user/.config/beacon/plugins.json");
//! let launcher = Arc::new(CageLauncher::new("/usr/libexec/beacon-cage"));
//! let loaded = PluginLoader::new(registry, launcher, Arc::new(DenyAll)).load(Vec::new());
//! let orchestrator = SearchOrchestrator::new(loaded.sources);
//! let _ = orchestrator.search("snip hello");
//! ```

pub mod adapter;
pub mod debounce;
pub mod error;
pub mod launcher;
pub mod loader;
pub mod locator;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod sdk;
pub mod source;
pub mod timeouts;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod tests;

pub use self::adapter::{HostServices, LoggingServices, SandboxedSource};
pub use self::debounce::DebouncedSource;
pub use self::error::PluginError;
pub use self::launcher::{CageLauncher, SandboxLauncher, UnitChannel, UnitControl};
pub use self::loader::{Decision, LoadState, LoadedPlugins, PermissionPrompt, PluginLoader};
pub use self::locator::PluginLocator;
pub use self::orchestrator::{ResultSink, SearchOrchestrator};
pub use self::protocol::{HostMessage, PluginMetadata, UnitMessage};
pub use self::registry::PluginRegistry;
pub use self::source::{Activation, SearchResult, Source};
pub use self::timeouts::PluginTimeouts;
