//! Starting sandboxed plugin units.
//!
//! A [`SandboxLauncher`] runs a unit either as a metadata probe or in
//! execution mode. The production implementation is [`CageLauncher`], which
//! goes through the `beacon-cage` trampoline; tests substitute in-process
//! fakes wired with pipes.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use beacon_sandbox::PluginPermissions;
use tracing::debug;

use crate::error::PluginError;
use crate::locator::PluginLocator;
use crate::protocol::{PluginMetadata, ProtocolError, UnitMessage, read_message};

mod cage;

pub use cage::CageLauncher;

const LAUNCHER_TARGET: &str = "beacon_plugins::launcher";

/// Argument that asks a unit to declare its metadata and exit.
pub const METADATA_FLAG: &str = "--beacon-metadata";

/// Starts plugin units in one of the two execution modes.
pub trait SandboxLauncher: Send + Sync {
    /// Runs the unit with no capabilities and returns its validated
    /// declaration. The unit is torn down before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LoadTimeout`] when the unit does not declare
    /// itself in time and [`PluginError::Metadata`] when the declaration is
    /// missing or invalid.
    fn probe(&self, locator: &PluginLocator) -> Result<PluginMetadata, PluginError>;

    /// Starts a long-lived unit restricted to `grant`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Spawn`] when the unit cannot be started.
    fn launch(
        &self,
        locator: &PluginLocator,
        grant: &PluginPermissions,
    ) -> Result<UnitChannel, PluginError>;
}

/// Handle used to stop a running unit.
pub trait UnitControl: Send {
    /// Stops the unit. Must be idempotent.
    fn terminate(&mut self);
}

/// Everything the host holds on a running unit.
pub struct UnitChannel {
    /// The unit's protocol output.
    pub reader: Box<dyn BufRead + Send>,
    /// The unit's protocol input.
    pub writer: Box<dyn Write + Send>,
    /// Lifetime control.
    pub control: Box<dyn UnitControl>,
}

/// Waits up to `timeout` for a unit to declare itself, then stops it.
///
/// Shared by every launcher so the probe rules stay in one place: the first
/// message must be a `ready` carrying valid metadata.
///
/// # Errors
///
/// Returns [`PluginError::LoadTimeout`] or [`PluginError::Metadata`].
pub fn await_declaration(
    locator: &PluginLocator,
    channel: UnitChannel,
    timeout: Duration,
) -> Result<PluginMetadata, PluginError> {
    let UnitChannel {
        mut reader,
        writer,
        mut control,
    } = channel;
    let (sender, receiver) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("beacon-probe".to_owned())
        .spawn(move || {
            sender.send(read_message::<_, UnitMessage>(&mut reader)).ok();
        });
    if let Err(error) = spawned {
        control.terminate();
        return Err(PluginError::Spawn {
            locator: locator.to_string(),
            message: "failed to start probe reader".to_owned(),
            source: Some(error.into()),
        });
    }

    let outcome = receiver.recv_timeout(timeout);
    control.terminate();
    drop(writer);

    let message = match outcome {
        Ok(message) => message,
        Err(RecvTimeoutError::Timeout) => {
            return Err(PluginError::load_timeout(locator.to_string(), timeout));
        }
        Err(RecvTimeoutError::Disconnected) => Err(ProtocolError::Closed),
    };
    let metadata = match message {
        Ok(UnitMessage::Ready { metadata }) => metadata,
        Ok(other) => {
            return Err(PluginError::metadata(
                locator.to_string(),
                format!("expected a 'ready' message, received '{}'", other.kind()),
            ));
        }
        Err(ProtocolError::Closed) => {
            return Err(PluginError::metadata(
                locator.to_string(),
                "unit exited without declaring metadata",
            ));
        }
        Err(error) => return Err(PluginError::metadata(locator.to_string(), error.to_string())),
    };
    metadata
        .validate()
        .map_err(|error| PluginError::metadata(locator.to_string(), error.to_string()))?;
    debug!(
        target: LAUNCHER_TARGET,
        %locator,
        plugin = metadata.id(),
        "metadata probed"
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests;
