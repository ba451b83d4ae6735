//! Host-side proxy that presents a sandboxed unit as a [`Source`].
//!
//! [`SandboxedSource`] owns one execution-mode unit. Requests are written to
//! the unit as [`HostMessage`]s; a reader thread decodes the unit's
//! [`UnitMessage`]s and completes whichever waiter matches the message `id`.
//! Requests are queued to a writer thread, so a unit that stops reading its
//! input cannot stall the caller. Every wait is bounded, and the loss of the
//! unit resolves all waiters at once, so a misbehaving plugin can only ever
//! produce empty results.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use beacon_sandbox::PluginPermissions;
use tracing::{debug, error, info, warn};

use crate::error::{PluginError, millis};
use crate::launcher::{SandboxLauncher, UnitControl};
use crate::locator::PluginLocator;
use crate::protocol::{
    HostMessage, LogLevel, PluginMetadata, ProtocolError, UnitMessage, WireResult, read_message,
    write_message,
};
use crate::source::{Activation, SearchResult, Source};
use crate::timeouts::PluginTimeouts;

const ADAPTER_TARGET: &str = "beacon_plugins::adapter";

/// Services the host performs on behalf of sandboxed units.
pub trait HostServices: Send + Sync {
    /// Places `text` on the clipboard at the request of `plugin`.
    fn copy_to_clipboard(&self, plugin: &str, text: &str);
}

/// [`HostServices`] that only logs requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingServices;

impl HostServices for LoggingServices {
    fn copy_to_clipboard(&self, plugin: &str, text: &str) {
        info!(target: ADAPTER_TARGET, plugin, bytes = text.len(), "clipboard request ignored");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection state shared with the reader thread and with activations.
struct Link {
    plugin: String,
    timeouts: PluginTimeouts,
    services: Arc<dyn HostServices>,
    next_id: AtomicU64,
    next_activation: AtomicU64,
    lost: AtomicBool,
    closing: AtomicBool,
    writing: AtomicBool,
    outbox: Mutex<Option<Sender<HostMessage>>>,
    searches: Mutex<HashMap<u64, Sender<Vec<WireResult>>>>,
    activations: Mutex<HashMap<String, VecDeque<(u64, Sender<()>)>>>,
    ready: Mutex<Option<Sender<PluginMetadata>>>,
}

impl Link {
    fn send(&self, message: HostMessage) -> Result<(), ProtocolError> {
        let outbox = lock(&self.outbox);
        let Some(queue) = outbox.as_ref() else {
            return Err(ProtocolError::Closed);
        };
        queue.send(message).map_err(|_| ProtocolError::Closed)
    }

    /// Writes queued requests until the queue closes or a write fails.
    fn drain_outbox(&self, mut writer: Box<dyn Write + Send>, queue: &Receiver<HostMessage>) {
        for message in queue {
            self.writing.store(true, Ordering::SeqCst);
            let written = write_message(&mut writer, &message);
            self.writing.store(false, Ordering::SeqCst);
            if let Err(source) = written {
                self.mark_lost(&format!("writing to the unit failed: {source}"));
                return;
            }
        }
    }

    /// A write that outlives a request bound means the unit stopped reading.
    fn check_stalled(&self) {
        if self.writing.load(Ordering::SeqCst) {
            self.mark_lost("unit stopped reading its input");
        }
    }

    fn pump(&self, mut reader: Box<dyn BufRead + Send>) {
        loop {
            match read_message::<_, UnitMessage>(&mut reader) {
                Ok(message) => self.dispatch(message),
                Err(ProtocolError::Closed) => {
                    self.mark_lost("unit closed its output");
                    return;
                }
                Err(ProtocolError::Io(source)) => {
                    self.mark_lost(&source.to_string());
                    return;
                }
                Err(source) => {
                    let failure = PluginError::Protocol {
                        plugin: self.plugin.clone(),
                        source,
                    };
                    warn!(target: ADAPTER_TARGET, plugin = %self.plugin, error = %failure, "discarding message");
                }
            }
        }
    }

    fn dispatch(&self, message: UnitMessage) {
        match message {
            UnitMessage::Ready { metadata } => match lock(&self.ready).take() {
                Some(waiter) => {
                    waiter.send(metadata).ok();
                }
                None => {
                    warn!(target: ADAPTER_TARGET, plugin = %self.plugin, "unexpected second ready message");
                }
            },
            UnitMessage::Results { id, results } => match lock(&self.searches).remove(&id) {
                Some(waiter) => {
                    waiter.send(results).ok();
                }
                None => {
                    debug!(target: ADAPTER_TARGET, plugin = %self.plugin, request_id = id, "late results discarded");
                }
            },
            UnitMessage::Activated { id } => {
                let mut activations = lock(&self.activations);
                if let Some(waiters) = activations.get_mut(&id) {
                    // Units confirm in request order.
                    if let Some((_, waiter)) = waiters.pop_front() {
                        waiter.send(()).ok();
                    }
                    if waiters.is_empty() {
                        activations.remove(&id);
                    }
                }
            }
            UnitMessage::Log { level, message } => match level {
                LogLevel::Info => info!(target: ADAPTER_TARGET, plugin = %self.plugin, "{message}"),
                LogLevel::Error => error!(target: ADAPTER_TARGET, plugin = %self.plugin, "{message}"),
            },
            UnitMessage::Copy { text } => self.services.copy_to_clipboard(&self.plugin, &text),
        }
    }

    fn mark_lost(&self, message: &str) {
        if self.lost.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.closing.load(Ordering::SeqCst) {
            debug!(target: ADAPTER_TARGET, plugin = %self.plugin, "unit stopped");
        } else {
            let crash = PluginError::SandboxCrash {
                plugin: self.plugin.clone(),
                message: message.to_owned(),
            };
            error!(target: ADAPTER_TARGET, plugin = %self.plugin, error = %crash, "plugin unit lost");
        }
        lock(&self.outbox).take();
        lock(&self.ready).take();
        lock(&self.searches).clear();
        lock(&self.activations).clear();
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn search(self: &Arc<Self>, query: &str) -> Vec<SearchResult> {
        if self.is_lost() {
            return Vec::new();
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel();
        lock(&self.searches).insert(id, sender);
        if self.is_lost() {
            lock(&self.searches).remove(&id);
            return Vec::new();
        }

        let request = HostMessage::Search {
            id,
            query: query.to_owned(),
        };
        if let Err(source) = self.send(request) {
            lock(&self.searches).remove(&id);
            warn!(target: ADAPTER_TARGET, plugin = %self.plugin, error = %source, "search not sent");
            return Vec::new();
        }

        match receiver.recv_timeout(self.timeouts.search) {
            Ok(results) => results
                .into_iter()
                .map(|result| self.hydrate(result))
                .collect(),
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.searches).remove(&id);
                let timeout = PluginError::SearchTimeout {
                    plugin: self.plugin.clone(),
                    request_id: id,
                    timeout_ms: millis(self.timeouts.search),
                };
                warn!(target: ADAPTER_TARGET, plugin = %self.plugin, error = %timeout, "search abandoned");
                self.check_stalled();
                Vec::new()
            }
            Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }

    fn hydrate(self: &Arc<Self>, result: WireResult) -> SearchResult {
        let link = Arc::clone(self);
        let token = result.result_token;
        SearchResult {
            title: result.title,
            subtitle: result.subtitle,
            score: result.score,
            icon: result.icon,
            activation: Activation::new(move || link.activate(&token)),
        }
    }

    fn activate(&self, token: &str) {
        if self.is_lost() {
            debug!(target: ADAPTER_TARGET, plugin = %self.plugin, token, "activation skipped; unit lost");
            return;
        }
        let call = self.next_activation.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel();
        lock(&self.activations)
            .entry(token.to_owned())
            .or_default()
            .push_back((call, sender));
        if self.is_lost() {
            self.forget_activation(token, call);
            return;
        }
        if let Err(source) = self.send(HostMessage::Activate {
            id: token.to_owned(),
        }) {
            self.forget_activation(token, call);
            warn!(target: ADAPTER_TARGET, plugin = %self.plugin, error = %source, "activation not sent");
            return;
        }
        if let Err(RecvTimeoutError::Timeout) = receiver.recv_timeout(self.timeouts.activate) {
            self.forget_activation(token, call);
            self.check_stalled();
            warn!(
                target: ADAPTER_TARGET,
                plugin = %self.plugin,
                token,
                timeout_ms = millis(self.timeouts.activate),
                "activation unconfirmed; continuing"
            );
        }
    }

    fn forget_activation(&self, token: &str, call: u64) {
        let mut activations = lock(&self.activations);
        if let Some(waiters) = activations.get_mut(token) {
            waiters.retain(|(pending, _)| *pending != call);
            if waiters.is_empty() {
                activations.remove(token);
            }
        }
    }
}

/// A sandboxed plugin presented as a [`Source`].
pub struct SandboxedSource {
    metadata: PluginMetadata,
    locator: PluginLocator,
    grant: PluginPermissions,
    launcher: Arc<dyn SandboxLauncher>,
    link: Arc<Link>,
    control: Mutex<Option<Box<dyn UnitControl>>>,
}

impl SandboxedSource {
    /// Creates the proxy for a probed plugin. Nothing is started until
    /// [`Source::init`].
    #[must_use]
    pub fn new(
        metadata: PluginMetadata,
        locator: PluginLocator,
        grant: PluginPermissions,
        launcher: Arc<dyn SandboxLauncher>,
        services: Arc<dyn HostServices>,
        timeouts: PluginTimeouts,
    ) -> Self {
        let link = Arc::new(Link {
            plugin: metadata.id().to_owned(),
            timeouts,
            services,
            next_id: AtomicU64::new(1),
            next_activation: AtomicU64::new(0),
            lost: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            writing: AtomicBool::new(false),
            outbox: Mutex::new(None),
            searches: Mutex::new(HashMap::new()),
            activations: Mutex::new(HashMap::new()),
            ready: Mutex::new(None),
        });
        Self {
            metadata,
            locator,
            grant,
            launcher,
            link,
            control: Mutex::new(None),
        }
    }

    /// Capabilities the unit runs with.
    #[must_use]
    pub const fn grant(&self) -> &PluginPermissions {
        &self.grant
    }

    /// Where the unit was loaded from.
    #[must_use]
    pub const fn locator(&self) -> &PluginLocator {
        &self.locator
    }

    /// Number of searches still awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        lock(&self.link.searches).len()
    }

    /// Returns `true` once the unit has terminated or its channel failed.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.link.is_lost()
    }

    fn terminate(&self) {
        self.link.closing.store(true, Ordering::SeqCst);
        lock(&self.link.outbox).take();
        if let Some(mut control) = lock(&self.control).take() {
            control.terminate();
        }
    }

    fn fail_init(&self, failure: PluginError) -> PluginError {
        self.terminate();
        self.link.lost.store(true, Ordering::SeqCst);
        failure
    }
}

impl Source for SandboxedSource {
    fn id(&self) -> &str {
        self.metadata.id()
    }

    fn name(&self) -> &str {
        self.metadata.name()
    }

    fn description(&self) -> Option<&str> {
        self.metadata.description()
    }

    fn trigger(&self) -> Option<&str> {
        self.metadata.trigger()
    }

    fn init(&self) -> Result<(), PluginError> {
        let channel = self.launcher.launch(&self.locator, &self.grant)?;
        let (ready_sender, ready_receiver) = mpsc::channel();
        let (queue, outgoing) = mpsc::channel();
        *lock(&self.link.ready) = Some(ready_sender);
        *lock(&self.link.outbox) = Some(queue);
        *lock(&self.control) = Some(channel.control);

        let writer_link = Arc::clone(&self.link);
        let writer = channel.writer;
        let spawned_writer = thread::Builder::new()
            .name(format!("beacon-unit-{}-out", self.metadata.id()))
            .spawn(move || writer_link.drain_outbox(writer, &outgoing));
        if let Err(source) = spawned_writer {
            return Err(self.fail_init(PluginError::Spawn {
                locator: self.locator.to_string(),
                message: "failed to start unit writer".to_owned(),
                source: Some(source.into()),
            }));
        }

        let link = Arc::clone(&self.link);
        let reader = channel.reader;
        let spawned = thread::Builder::new()
            .name(format!("beacon-unit-{}", self.metadata.id()))
            .spawn(move || link.pump(reader));
        if let Err(source) = spawned {
            return Err(self.fail_init(PluginError::Spawn {
                locator: self.locator.to_string(),
                message: "failed to start unit reader".to_owned(),
                source: Some(source.into()),
            }));
        }

        let declared = match ready_receiver.recv_timeout(self.link.timeouts.init) {
            Ok(declared) => declared,
            Err(RecvTimeoutError::Timeout) => {
                return Err(self.fail_init(PluginError::load_timeout(
                    self.locator.to_string(),
                    self.link.timeouts.init,
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(self.fail_init(PluginError::SandboxCrash {
                    plugin: self.metadata.id().to_owned(),
                    message: "unit exited before it was ready".to_owned(),
                }));
            }
        };
        if declared.id() != self.metadata.id() {
            return Err(self.fail_init(PluginError::Protocol {
                plugin: self.metadata.id().to_owned(),
                source: ProtocolError::InvalidMetadata {
                    reason: format!(
                        "unit declared id '{}' after probing as '{}'",
                        declared.id(),
                        self.metadata.id()
                    ),
                },
            }));
        }
        debug!(target: ADAPTER_TARGET, plugin = self.metadata.id(), locator = %self.locator, "unit ready");
        Ok(())
    }

    fn search(&self, query: &str) -> Vec<SearchResult> {
        self.link.search(query)
    }
}

impl Drop for SandboxedSource {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests;
