//! Applies a [`SandboxProfile`] through `birdcage` and spawns the unit.
//!
//! A profile is first resolved into a [`SandboxPlan`]: every path is
//! canonicalised and each one appears under exactly one access level, the
//! strongest it was granted (execute, then read-write, then read). The plan
//! is what `birdcage` receives.
//!
//! Activation strips the calling process's environment down to the
//! allow-list. The cage is a one-shot trampoline that only waits for the
//! unit afterwards, so nothing is restored.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use birdcage::process::{Child, Command, Output};
use birdcage::{Birdcage, Exception, Sandbox as BirdcageTrait};
use tracing::debug;

use crate::error::SandboxError;
use crate::profile::{EnvironmentPolicy, NetworkPolicy, SandboxProfile};
use crate::runtime::thread_count;

const SANDBOX_TARGET: &str = "beacon_sandbox::sandbox";

/// Builder for sandboxed commands.
pub type SandboxCommand = Command;
/// Handle to a running sandboxed process.
pub type SandboxChild = Child;
/// Captured output from a sandboxed process.
pub type SandboxOutput = Output;

/// The resolved exceptions for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPlan {
    read: BTreeSet<PathBuf>,
    read_write: BTreeSet<PathBuf>,
    execute: BTreeSet<PathBuf>,
    environment: EnvironmentPolicy,
    network: NetworkPolicy,
}

impl SandboxPlan {
    /// Paths readable only.
    #[must_use]
    pub const fn read(&self) -> &BTreeSet<PathBuf> {
        &self.read
    }

    /// Paths readable and writable.
    #[must_use]
    pub const fn read_write(&self) -> &BTreeSet<PathBuf> {
        &self.read_write
    }

    /// Paths executable, including the unit's own program.
    #[must_use]
    pub const fn execute(&self) -> &BTreeSet<PathBuf> {
        &self.execute
    }

    fn exceptions(&self) -> Vec<Exception> {
        let mut exceptions: Vec<Exception> = self
            .read
            .iter()
            .cloned()
            .map(Exception::Read)
            .chain(self.read_write.iter().cloned().map(Exception::WriteAndRead))
            .chain(self.execute.iter().cloned().map(Exception::ExecuteAndRead))
            .collect();
        match &self.environment {
            EnvironmentPolicy::Isolated => {}
            EnvironmentPolicy::AllowList(keys) => {
                exceptions.extend(keys.iter().cloned().map(Exception::Environment));
            }
            EnvironmentPolicy::InheritAll => exceptions.push(Exception::FullEnvironment),
        }
        if !self.network.is_denied() {
            exceptions.push(Exception::Networking);
        }
        exceptions
    }
}

/// Launches commands inside a restrictive sandbox.
#[derive(Debug)]
pub struct Sandbox {
    profile: SandboxProfile,
}

impl Sandbox {
    /// Creates a sandbox with the supplied profile.
    #[must_use]
    pub const fn new(profile: SandboxProfile) -> Self {
        Self { profile }
    }

    /// Returns the profile this sandbox enforces.
    #[must_use]
    pub const fn profile(&self) -> &SandboxProfile {
        &self.profile
    }

    /// Resolves the profile for running `program`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::ProgramNotAbsolute`] for a relative program,
    /// [`SandboxError::ExecutableNotAuthorised`] when the profile does not
    /// list it, and a path error when any listed path cannot be resolved.
    pub fn plan(&self, program: &Path) -> Result<SandboxPlan, SandboxError> {
        let program = canonical_program(program)?;
        let execute = canonicalised_set(self.profile.executable_paths())?;
        if !execute.contains(&program) {
            return Err(SandboxError::ExecutableNotAuthorised { program });
        }

        let mut read_write = canonicalised_set(self.profile.read_write_paths())?;
        read_write.retain(|path| !execute.contains(path));
        let mut read = canonicalised_set(self.profile.read_only_paths())?;
        read.retain(|path| !execute.contains(path) && !read_write.contains(path));

        Ok(SandboxPlan {
            read,
            read_write,
            execute,
            environment: self.profile.environment_policy().clone(),
            network: self.profile.network_policy(),
        })
    }

    /// Spawns `command` inside the configured sandbox.
    ///
    /// The program path must be absolute and whitelisted on the profile.
    /// `birdcage` asserts that activation happens on the only thread of the
    /// process; a second thread yields [`SandboxError::MultiThreaded`]
    /// instead of a panic. Profile checks run before the thread check.
    ///
    /// # Errors
    ///
    /// Returns the [`plan`](Self::plan) errors, the thread check error, or
    /// the `birdcage` failure.
    pub fn spawn(&self, command: SandboxCommand) -> Result<SandboxChild, SandboxError> {
        let plan = self.plan(Path::new(command.get_program()))?;
        ensure_single_threaded()?;

        let exceptions = plan.exceptions();
        debug!(
            target: SANDBOX_TARGET,
            program = ?command.get_program(),
            read = plan.read.len(),
            read_write = plan.read_write.len(),
            execute = plan.execute.len(),
            exceptions = exceptions.len(),
            "activating sandbox"
        );

        let mut cage = Birdcage::new();
        for exception in exceptions {
            cage.add_exception(exception)?;
        }
        Ok(cage.spawn(command)?)
    }
}

fn ensure_single_threaded() -> Result<(), SandboxError> {
    let threads = thread_count().map_err(|source| SandboxError::ThreadCountUnavailable { source })?;
    if threads > 1 {
        return Err(SandboxError::MultiThreaded {
            thread_count: threads,
        });
    }
    Ok(())
}

fn canonical_program(program: &Path) -> Result<PathBuf, SandboxError> {
    if !program.is_absolute() {
        return Err(SandboxError::ProgramNotAbsolute(program.to_path_buf()));
    }
    canonicalise(program)
}

fn canonicalised_set(paths: &[PathBuf]) -> Result<BTreeSet<PathBuf>, SandboxError> {
    paths.iter().map(|path| canonicalise(path)).collect()
}

fn canonicalise(path: &Path) -> Result<PathBuf, SandboxError> {
    if !path.exists() {
        return Err(SandboxError::MissingPath {
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|source| SandboxError::CanonicalisationFailed {
        path: path.to_path_buf(),
        source,
    })
}
