//! Shared doubles for the launcher tests.

use std::ffi::OsString;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, PoisonError};

use beacon_config::Config;
use beacon_plugins::LoadedPlugins;
use beacon_plugins::protocol::PluginMetadata;
use beacon_plugins::sdk::{Plugin, PluginContext, PluginResult};
use ortho_config::{OrthoConfig, OrthoError};
use rstest::fixture;
use tempfile::TempDir;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;
use crate::terminal::Terminal;

/// Locator the greeter plugin is registered under.
pub(crate) const GREETER: &str = "/opt/plugins/greeter";

/// Write half of a terminal whose output the test can read back.
#[derive(Clone, Default)]
pub(crate) struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub(crate) fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A terminal that reads `input` and records everything written.
pub(crate) fn terminal(input: &str) -> (Terminal, SharedOutput) {
    let output = SharedOutput::default();
    let handle = Terminal::new(Cursor::new(input.as_bytes().to_vec()), output.clone());
    (handle, output)
}

/// Temporary directory holding the registry file.
pub(crate) struct Workspace {
    _dir: TempDir,
    pub(crate) config: Config,
}

#[fixture]
pub(crate) fn workspace() -> Workspace {
    let dir = TempDir::new().expect("temp dir");
    let config = Config {
        registry_path: dir.path().join("plugins.json"),
        probe_timeout_ms: 1_000,
        init_timeout_ms: 1_000,
        search_timeout_ms: 1_000,
        activate_timeout_ms: 1_000,
        network_debounce_ms: 0,
        ..Config::default()
    };
    Workspace { _dir: dir, config }
}

/// SDK plugin that greets whoever is named after its trigger.
#[derive(Default)]
pub(crate) struct Greeter;

impl Plugin for Greeter {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("greeter", "Greeter").with_trigger("hi")
    }

    fn search(&mut self, query: &str, _: &mut PluginContext) -> Vec<PluginResult> {
        let greeting = format!("Hello, {query}");
        vec![
            PluginResult::new(greeting.clone(), "Copy greeting", 1.0).with_action(
                move |ctx: &mut PluginContext| {
                    ctx.copy(greeting.clone());
                    Ok(())
                },
            ),
        ]
    }
}

/// Lifecycle events seen by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed,
    PluginsLoaded(usize),
}

#[derive(Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _: &Config) {
        self.push(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, _: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed);
    }

    fn plugins_loaded(&self, loaded: &LoadedPlugins) {
        self.push(HealthEvent::PluginsLoaded(loaded.sources.len()));
    }
}

/// Loader that fails by passing an invalid flag value.
pub(crate) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("beacon"),
            OsString::from("--log-format"),
            OsString::from("pretty"),
        ])
    }
}
