//! Builds the active source set from built-ins and the registry.
//!
//! Built-in sources are trusted and only initialised. Every registry entry
//! goes through the [`LoadState`] machine: the unit is probed with no
//! capabilities, its request is compared with the stored grant, the user is
//! asked when they differ, and the unit is then started with exactly the
//! granted set. A failure at any step is logged with the plugin's locator and
//! leaves that plugin out; it never stops the others from loading.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use beacon_sandbox::{CapabilityKind, PluginPermissions};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapter::{HostServices, LoggingServices, SandboxedSource};
use crate::debounce::DebouncedSource;
use crate::error::PluginError;
use crate::launcher::SandboxLauncher;
use crate::locator::PluginLocator;
use crate::protocol::PluginMetadata;
use crate::registry::{PluginRegistry, RegistryEntry};
use crate::source::Source;
use crate::timeouts::PluginTimeouts;

mod state;

pub use state::{LoadEvent, LoadState, TransitionError};

const LOADER_TARGET: &str = "beacon_plugins::loader";

/// The user's answer to a capability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Grant everything requested.
    Approve,
    /// Grant nothing; skip the plugin this session.
    Deny,
}

/// Asks the user whether a plugin may have the capabilities it requests.
pub trait PermissionPrompt: Send + Sync {
    /// Decides on `requested`, shown to the user as `description`
    /// (empty when the plugin asks for nothing).
    fn decide(
        &self,
        metadata: &PluginMetadata,
        requested: &PluginPermissions,
        description: &[String],
    ) -> Decision;
}

/// Headless policy that declines every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl PermissionPrompt for DenyAll {
    fn decide(&self, _: &PluginMetadata, _: &PluginPermissions, _: &[String]) -> Decision {
        Decision::Deny
    }
}

/// Why a registry entry did not load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A plugin-level failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),
    /// The loader drove the state machine out of order.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// What happened to one registry entry.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Locator as stored in the registry.
    pub locator: String,
    /// State the entry finished in.
    pub state: LoadState,
    /// The failure, when the entry was skipped.
    pub error: Option<LoadError>,
}

/// Result of a load pass.
pub struct LoadedPlugins {
    /// Active sources, built-ins first.
    pub sources: Vec<Arc<dyn Source>>,
    /// One outcome per registry entry, in registry order.
    pub outcomes: Vec<LoadOutcome>,
}

impl LoadedPlugins {
    /// Outcome for `locator`, if the registry listed it.
    #[must_use]
    pub fn outcome(&self, locator: &str) -> Option<&LoadOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.locator == locator)
    }
}

struct Progress<'a> {
    locator: &'a str,
    state: LoadState,
}

impl Progress<'_> {
    fn step(&mut self, event: LoadEvent) -> Result<(), TransitionError> {
        let next = self.state.advance(event)?;
        debug!(
            target: LOADER_TARGET,
            locator = self.locator,
            from = %self.state,
            to = %next,
            %event,
            "load transition"
        );
        self.state = next;
        Ok(())
    }
}

/// Loads plugins listed in a [`PluginRegistry`].
pub struct PluginLoader {
    registry: PluginRegistry,
    launcher: Arc<dyn SandboxLauncher>,
    prompt: Arc<dyn PermissionPrompt>,
    services: Arc<dyn HostServices>,
    timeouts: PluginTimeouts,
    debounce: Option<Duration>,
}

impl PluginLoader {
    /// Creates a loader with default timeouts, logging host services, and no
    /// debounce.
    #[must_use]
    pub fn new(
        registry: PluginRegistry,
        launcher: Arc<dyn SandboxLauncher>,
        prompt: Arc<dyn PermissionPrompt>,
    ) -> Self {
        Self {
            registry,
            launcher,
            prompt,
            services: Arc::new(LoggingServices),
            timeouts: PluginTimeouts::default(),
            debounce: None,
        }
    }

    /// Services offered to sandboxed units.
    #[must_use]
    pub fn with_services(mut self, services: Arc<dyn HostServices>) -> Self {
        self.services = services;
        self
    }

    /// Bounds for unit start-up, searches, and activations.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: PluginTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Settle window for plugins holding a network grant. Zero disables it.
    #[must_use]
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = (!window.is_zero()).then_some(window);
        self
    }

    /// The registry this loader reads.
    #[must_use]
    pub const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Initialises `builtins`, then loads every registry entry.
    #[must_use]
    pub fn load(&self, builtins: Vec<Arc<dyn Source>>) -> LoadedPlugins {
        let mut taken = HashSet::new();
        let mut sources: Vec<Arc<dyn Source>> = Vec::new();
        for builtin in builtins {
            let id = builtin.id().to_owned();
            if taken.contains(&id) {
                warn!(target: LOADER_TARGET, plugin = %id, "duplicate built-in skipped");
                continue;
            }
            match builtin.init() {
                Ok(()) => {
                    taken.insert(id);
                    sources.push(builtin);
                }
                Err(failure) => {
                    warn!(target: LOADER_TARGET, plugin = %id, error = %failure, "built-in skipped");
                }
            }
        }

        let document = self.registry.read();
        let mut outcomes = Vec::with_capacity(document.plugins().len());
        for entry in document.plugins() {
            let mut progress = Progress {
                locator: entry.url(),
                state: LoadState::Discovered,
            };
            let error = match self.load_entry(entry, &taken, &mut progress) {
                Ok((id, source)) => {
                    info!(target: LOADER_TARGET, plugin = %id, locator = entry.url(), "plugin loaded");
                    taken.insert(id);
                    sources.push(source);
                    None
                }
                Err(failure) => {
                    report(entry.url(), progress.state, &failure);
                    Some(failure)
                }
            };
            outcomes.push(LoadOutcome {
                locator: entry.url().to_owned(),
                state: progress.state,
                error,
            });
        }
        LoadedPlugins { sources, outcomes }
    }

    fn load_entry(
        &self,
        entry: &RegistryEntry,
        taken: &HashSet<String>,
        progress: &mut Progress<'_>,
    ) -> Result<(String, Arc<dyn Source>), LoadError> {
        progress.step(LoadEvent::Probe)?;
        let probed = PluginLocator::parse(entry.url()).and_then(|locator| {
            let metadata = self.launcher.probe(&locator)?;
            if taken.contains(metadata.id()) {
                return Err(PluginError::metadata(
                    entry.url(),
                    format!("plugin id '{}' is already loaded", metadata.id()),
                ));
            }
            Ok((locator, metadata))
        });
        let (locator, metadata) = match probed {
            Ok(found) => found,
            Err(failure) => {
                progress.step(LoadEvent::ProbeFailed)?;
                return Err(failure.into());
            }
        };
        progress.step(LoadEvent::ProbeSucceeded)?;
        progress.step(LoadEvent::Compare)?;
        let grant = self.negotiate(entry, &metadata, progress)?;

        let id = metadata.id().to_owned();
        let source = SandboxedSource::new(
            metadata,
            locator,
            grant,
            Arc::clone(&self.launcher),
            Arc::clone(&self.services),
            self.timeouts,
        );
        if let Err(failure) = source.init() {
            progress.step(LoadEvent::InitFailed)?;
            return Err(failure.into());
        }
        progress.step(LoadEvent::Initialised)?;
        Ok((id, self.wrap(source)))
    }

    fn negotiate(
        &self,
        entry: &RegistryEntry,
        metadata: &PluginMetadata,
        progress: &mut Progress<'_>,
    ) -> Result<PluginPermissions, LoadError> {
        let requested = metadata.permissions();
        if requested == entry.permissions() {
            progress.step(LoadEvent::Unchanged)?;
            return Ok(entry.permissions().clone());
        }

        progress.step(LoadEvent::Changed)?;
        let description = requested.describe();
        match self.prompt.decide(metadata, requested, &description) {
            Decision::Deny => {
                progress.step(LoadEvent::Deny)?;
                Err(PluginError::PermissionDenied {
                    plugin: metadata.id().to_owned(),
                }
                .into())
            }
            Decision::Approve => {
                progress.step(LoadEvent::Approve)?;
                progress.step(LoadEvent::Persist)?;
                if let Err(failure) = self.registry.record_grant(entry.url(), requested) {
                    warn!(
                        target: LOADER_TARGET,
                        plugin = metadata.id(),
                        error = %failure,
                        "grant not saved; it applies to this session only"
                    );
                }
                progress.step(LoadEvent::GrantSettled)?;
                Ok(requested.clone())
            }
        }
    }

    fn wrap(&self, source: SandboxedSource) -> Arc<dyn Source> {
        match self.debounce {
            Some(window) if !source.grant().grant(CapabilityKind::Net).is_denied() => {
                Arc::new(DebouncedSource::new(source, window))
            }
            _ => Arc::new(source),
        }
    }
}

fn report(locator: &str, state: LoadState, failure: &LoadError) {
    match failure {
        LoadError::Plugin(PluginError::PermissionDenied { .. }) => {
            info!(target: LOADER_TARGET, locator, %state, "plugin not granted; skipped");
        }
        _ => {
            warn!(target: LOADER_TARGET, locator, %state, error = %failure, "plugin skipped");
        }
    }
}

#[cfg(test)]
mod tests;
