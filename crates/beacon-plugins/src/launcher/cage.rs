//! Launches units through the `beacon-cage` trampoline.

use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread;
use std::time::Duration;

use beacon_sandbox::{CageInvocation, ExecutionMode, PluginPermissions};
use tracing::{debug, warn};

use super::{METADATA_FLAG, SandboxLauncher, UnitChannel, UnitControl, await_declaration};
use crate::error::PluginError;
use crate::locator::PluginLocator;
use crate::protocol::PluginMetadata;
use crate::timeouts::DEFAULT_TIMEOUT;

const CAGE_TARGET: &str = "beacon_plugins::launcher::cage";

/// Production launcher.
///
/// The host process runs reader threads, so it cannot activate the sandbox
/// itself. Every unit is started as `beacon-cage ... -- <unit> <args>`; the
/// single-threaded cage applies the profile and then runs the unit with the
/// pipes created here.
#[derive(Debug, Clone)]
pub struct CageLauncher {
    cage_program: PathBuf,
    remote_runner: Option<PathBuf>,
    probe_timeout: Duration,
}

impl CageLauncher {
    /// Creates a launcher that runs `cage_program`.
    #[must_use]
    pub fn new(cage_program: impl Into<PathBuf>) -> Self {
        Self {
            cage_program: cage_program.into(),
            remote_runner: None,
            probe_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Program that runs remote locators, given the URL as its argument.
    #[must_use]
    pub fn with_remote_runner(mut self, runner: Option<PathBuf>) -> Self {
        self.remote_runner = runner;
        self
    }

    /// Bound on metadata probes.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub(super) fn unit_command(&self, locator: &PluginLocator) -> Result<(PathBuf, Vec<OsString>), PluginError> {
        match locator {
            PluginLocator::Local(path) => Ok((path.clone(), Vec::new())),
            PluginLocator::Remote(remote) => {
                let runner = self.remote_runner.clone().ok_or_else(|| {
                    PluginError::metadata(remote.as_str(), "no remote runner is configured")
                })?;
                Ok((runner, vec![OsString::from(remote)]))
            }
        }
    }

    fn spawn(&self, locator: &PluginLocator, invocation: &CageInvocation) -> Result<UnitChannel, PluginError> {
        let label = locator.to_string();
        let args = invocation.to_args().map_err(|error| PluginError::Spawn {
            locator: label.clone(),
            message: error.to_string(),
            source: None,
        })?;
        debug!(
            target: CAGE_TARGET,
            locator = %label,
            cage = %self.cage_program.display(),
            "spawning cage"
        );
        let mut child = Command::new(&self.cage_program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| PluginError::Spawn {
                locator: label.clone(),
                message: format!("cannot run {}", self.cage_program.display()),
                source: Some(error.into()),
            })?;

        let missing = |stream: &str| PluginError::Spawn {
            locator: label.clone(),
            message: format!("failed to capture {stream}"),
            source: None,
        };
        let Some(stdin) = child.stdin.take() else {
            terminate_child(&mut child);
            return Err(missing("stdin"));
        };
        let Some(stdout) = child.stdout.take() else {
            terminate_child(&mut child);
            return Err(missing("stdout"));
        };
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(label.clone(), stderr);
        }

        Ok(UnitChannel {
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            control: Box::new(CageControl { child: Some(child) }),
        })
    }
}

impl SandboxLauncher for CageLauncher {
    fn probe(&self, locator: &PluginLocator) -> Result<PluginMetadata, PluginError> {
        let (program, args) = self.unit_command(locator)?;
        let invocation = CageInvocation::new(
            ExecutionMode::Probe {
                remote: locator.is_remote(),
            },
            program,
        )
        .args(args)
        .arg(METADATA_FLAG);
        let channel = self.spawn(locator, &invocation)?;
        await_declaration(locator, channel, self.probe_timeout)
    }

    fn launch(
        &self,
        locator: &PluginLocator,
        grant: &PluginPermissions,
    ) -> Result<UnitChannel, PluginError> {
        let (program, args) = self.unit_command(locator)?;
        let invocation = CageInvocation::new(
            ExecutionMode::Execute {
                grant: grant.clone(),
            },
            program,
        )
        .args(args);
        self.spawn(locator, &invocation)
    }
}

struct CageControl {
    child: Option<Child>,
}

impl UnitControl for CageControl {
    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate_child(&mut child);
        }
    }
}

impl Drop for CageControl {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn terminate_child(child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!(target: CAGE_TARGET, %error, "cage already exited");
    }
    if let Err(error) = child.wait() {
        warn!(target: CAGE_TARGET, %error, "failed to reap cage");
    }
}

/// Forwards the unit's stderr to debug logs so a full pipe never blocks it.
fn drain_stderr(locator: String, stderr: ChildStderr) {
    let spawned = thread::Builder::new()
        .name("beacon-unit-stderr".to_owned())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => {
                        debug!(target: CAGE_TARGET, %locator, stderr = %line.trim(), "unit stderr");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    if let Err(error) = spawned {
        warn!(target: CAGE_TARGET, %error, "stderr of unit will not be drained");
    }
}
