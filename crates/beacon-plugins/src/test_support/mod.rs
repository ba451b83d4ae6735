//! In-process stand-ins for sandboxed units.
//!
//! A scripted unit runs on its own thread and talks to the host over a pair
//! of OS pipes, so the adapter and loader exercise exactly the code paths
//! they use with real units, minus the sandbox.

use std::collections::HashMap;
use std::io::{self, BufReader, PipeReader, PipeWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use beacon_sandbox::PluginPermissions;

use crate::error::PluginError;
use crate::launcher::{SandboxLauncher, UnitChannel, UnitControl, await_declaration};
use crate::locator::PluginLocator;
use crate::protocol::{
    HostMessage, PluginMetadata, UnitMessage, WireResult, read_message, write_message,
};
use crate::sdk::{Plugin, serve};

/// Bound used by [`FakeLauncher`] probes.
pub const FAKE_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// The unit's side of the pipes.
pub struct UnitEnd {
    reader: BufReader<PipeReader>,
    writer: PipeWriter,
}

impl UnitEnd {
    /// Blocks for the next host message; `None` once the host hangs up.
    pub fn recv(&mut self) -> Option<HostMessage> {
        read_message(&mut self.reader).ok()
    }

    /// Sends a message; `false` once the host hangs up.
    pub fn send(&mut self, message: &UnitMessage) -> bool {
        write_message(&mut self.writer, message).is_ok()
    }

    /// Sends `ready` with `metadata`.
    pub fn ready(&mut self, metadata: &PluginMetadata) -> bool {
        self.send(&UnitMessage::Ready {
            metadata: metadata.clone(),
        })
    }

    /// Writes raw bytes, bypassing the protocol encoder.
    pub fn send_raw(&mut self, bytes: &[u8]) -> bool {
        io::Write::write_all(&mut self.writer, bytes).is_ok()
    }

    /// Reads host messages until the host hangs up.
    pub fn drain(&mut self) {
        while self.recv().is_some() {}
    }
}

/// Records whether the host terminated a unit.
#[derive(Debug, Clone, Default)]
pub struct Termination(Arc<AtomicBool>);

impl Termination {
    /// Returns `true` once `terminate` was called.
    #[must_use]
    pub fn observed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct FakeControl(Termination);

impl UnitControl for FakeControl {
    fn terminate(&mut self) {
        (self.0).0.store(true, Ordering::SeqCst);
    }
}

/// Runs `script` as a unit on a new thread.
///
/// # Errors
///
/// Returns the I/O error if the pipes cannot be created.
pub fn spawn_unit<F>(script: F) -> io::Result<(UnitChannel, Termination)>
where
    F: FnOnce(UnitEnd) + Send + 'static,
{
    let (unit_reader, host_writer) = io::pipe()?;
    let (host_reader, unit_writer) = io::pipe()?;
    let end = UnitEnd {
        reader: BufReader::new(unit_reader),
        writer: unit_writer,
    };
    thread::spawn(move || script(end));
    let termination = Termination::default();
    let channel = UnitChannel {
        reader: Box::new(BufReader::new(host_reader)),
        writer: Box::new(host_writer),
        control: Box::new(FakeControl(termination.clone())),
    };
    Ok((channel, termination))
}

/// Script for a well-behaved unit: declares `metadata`, answers searches
/// with `answer(query, id)`, and confirms activations.
pub fn responder<F>(metadata: PluginMetadata, answer: F) -> impl Fn(UnitEnd) + Send + Sync + 'static
where
    F: Fn(&str, u64) -> Vec<WireResult> + Send + Sync + 'static,
{
    move |mut end: UnitEnd| {
        if !end.ready(&metadata) {
            return;
        }
        while let Some(message) = end.recv() {
            let reply = match message {
                HostMessage::Search { id, query } => UnitMessage::Results {
                    id,
                    results: answer(&query, id),
                },
                HostMessage::Activate { id } => UnitMessage::Activated { id },
            };
            if !end.send(&reply) {
                return;
            }
        }
    }
}

/// Script that serves `P` through the SDK runtime.
pub fn sdk_unit<P: Plugin + 'static>() -> impl Fn(UnitEnd) + Send + Sync + 'static {
    |mut end: UnitEnd| {
        serve::<P, _, _>(&[], &mut end.reader, &mut end.writer).ok();
    }
}

/// One wire result with a `<id>_<index>` token.
#[must_use]
pub fn wire_result(title: &str, score: f64, id: u64, index: usize) -> WireResult {
    WireResult {
        title: title.to_owned(),
        subtitle: String::new(),
        score,
        result_token: format!("{id}_{index}"),
        icon: None,
    }
}

type Script = Arc<dyn Fn(UnitEnd) + Send + Sync>;

struct FakePlugin {
    probe: Script,
    unit: Script,
}

/// [`SandboxLauncher`] backed by scripted in-process units.
#[derive(Default)]
pub struct FakeLauncher {
    plugins: Mutex<HashMap<String, FakePlugin>>,
    launched: Mutex<Vec<(String, PluginPermissions)>>,
    terminations: Mutex<Vec<Termination>>,
}

impl FakeLauncher {
    /// Creates a launcher with no plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin that declares `metadata` and then runs `unit`.
    pub fn register<F>(&self, locator: &str, metadata: PluginMetadata, unit: F)
    where
        F: Fn(UnitEnd) + Send + Sync + 'static,
    {
        let probe: Script = Arc::new(move |mut end: UnitEnd| {
            end.ready(&metadata);
        });
        self.register_scripts(locator, probe, Arc::new(unit));
    }

    /// Registers a plugin whose probe runs `probe` instead of declaring.
    pub fn register_probe<F>(&self, locator: &str, probe: F)
    where
        F: Fn(UnitEnd) + Send + Sync + 'static,
    {
        self.register_scripts(locator, Arc::new(probe), Arc::new(|_end: UnitEnd| {}));
    }

    fn register_scripts(&self, locator: &str, probe: Script, unit: Script) {
        let key = PluginLocator::parse(locator).map_or_else(|_| locator.to_owned(), |parsed| parsed.to_string());
        self.plugins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, FakePlugin { probe, unit });
    }

    /// Locators launched in execution mode, with their grants.
    #[must_use]
    pub fn launches(&self) -> Vec<(String, PluginPermissions)> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` when every launched unit has been terminated.
    #[must_use]
    pub fn all_terminated(&self) -> bool {
        self.terminations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(Termination::observed)
    }

    fn script(&self, locator: &PluginLocator, pick: fn(&FakePlugin) -> Script) -> Result<Script, PluginError> {
        self.plugins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&locator.to_string())
            .map(pick)
            .ok_or_else(|| PluginError::metadata(locator.to_string(), "no such plugin"))
    }
}

impl SandboxLauncher for FakeLauncher {
    fn probe(&self, locator: &PluginLocator) -> Result<PluginMetadata, PluginError> {
        let script = self.script(locator, |plugin| Arc::clone(&plugin.probe))?;
        let (channel, _) = spawn_unit(move |end| script(end))
            .map_err(|error| PluginError::io(locator.to_string(), error))?;
        await_declaration(locator, channel, FAKE_PROBE_TIMEOUT)
    }

    fn launch(
        &self,
        locator: &PluginLocator,
        grant: &PluginPermissions,
    ) -> Result<UnitChannel, PluginError> {
        let script = self.script(locator, |plugin| Arc::clone(&plugin.unit))?;
        let (channel, termination) = spawn_unit(move |end| script(end))
            .map_err(|error| PluginError::io(locator.to_string(), error))?;
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((locator.to_string(), grant.clone()));
        self.terminations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(termination);
        Ok(channel)
    }
}
