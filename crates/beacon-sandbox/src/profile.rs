//! What a unit may touch, before it is resolved against the filesystem.
//!
//! Grants accumulate: the same path or variable granted twice is recorded
//! once, so profiles built from overlapping capabilities stay small.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::runtime::linux_runtime_roots;

/// Environment inheritance strategy applied to sandboxed processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentPolicy {
    /// Remove all environment variables before launching the child.
    #[default]
    Isolated,
    /// Allow only the named environment variables to be inherited.
    AllowList(BTreeSet<String>),
    /// Inherit the full environment unchanged.
    InheritAll,
}

impl EnvironmentPolicy {
    pub(crate) fn with_allowed(self, key: String) -> Self {
        match self {
            Self::Isolated => Self::AllowList(BTreeSet::from([key])),
            Self::AllowList(mut keys) => {
                keys.insert(key);
                Self::AllowList(keys)
            }
            Self::InheritAll => Self::InheritAll,
        }
    }
}

/// Network access policy applied to sandboxed processes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NetworkPolicy {
    /// Block networking by entering a separate network namespace.
    #[default]
    Deny,
    /// Permit networking in the sandboxed process.
    Allow,
}

impl NetworkPolicy {
    /// Returns true when networking is denied.
    #[must_use]
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Deny)
    }
}

/// Declarative description of the resources a sandboxed process may access.
///
/// The profile starts restrictive: networking and the environment are
/// disabled, and only the standard Linux runtime library roots are readable.
/// Executables and data paths must be listed explicitly.
///
/// ```
/// use beacon_sandbox::SandboxProfile;
///
/// let profile = SandboxProfile::new()
///     .allow_executable("/usr/bin/beacon-plugin-snippets")
///     .allow_read_path("/usr/share/dict");
/// assert!(profile.network_policy().is_denied());
/// ```
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    read_only_paths: Vec<PathBuf>,
    read_write_paths: Vec<PathBuf>,
    executable_paths: Vec<PathBuf>,
    environment: EnvironmentPolicy,
    network: NetworkPolicy,
}

impl SandboxProfile {
    /// Creates a profile with Linux runtime library paths readable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_only_paths: linux_runtime_roots(),
            read_write_paths: Vec::new(),
            executable_paths: Vec::new(),
            environment: EnvironmentPolicy::default(),
            network: NetworkPolicy::default(),
        }
    }

    /// Grants execute and read access to the provided path.
    #[must_use]
    pub fn allow_executable(mut self, path: impl Into<PathBuf>) -> Self {
        record(&mut self.executable_paths, path.into());
        self
    }

    /// Grants read-only access to the provided path.
    #[must_use]
    pub fn allow_read_path(mut self, path: impl Into<PathBuf>) -> Self {
        record(&mut self.read_only_paths, path.into());
        self
    }

    /// Grants read-write access to the provided path.
    #[must_use]
    pub fn allow_read_write_path(mut self, path: impl Into<PathBuf>) -> Self {
        record(&mut self.read_write_paths, path.into());
        self
    }

    /// Whitelists an environment variable for inheritance.
    ///
    /// No-op once the policy is [`EnvironmentPolicy::InheritAll`].
    #[must_use]
    pub fn allow_environment_variable(mut self, key: impl Into<String>) -> Self {
        self.environment = self.environment.with_allowed(key.into());
        self
    }

    /// Inherit all environment variables from the parent process.
    #[must_use]
    pub fn allow_full_environment(mut self) -> Self {
        self.environment = EnvironmentPolicy::InheritAll;
        self
    }

    /// Allows the sandboxed process to use the host network namespace.
    #[must_use]
    pub const fn allow_networking(mut self) -> Self {
        self.network = NetworkPolicy::Allow;
        self
    }

    /// Paths readable by the sandboxed process.
    #[must_use]
    pub fn read_only_paths(&self) -> &[PathBuf] {
        &self.read_only_paths
    }

    /// Paths readable and writable by the sandboxed process.
    #[must_use]
    pub fn read_write_paths(&self) -> &[PathBuf] {
        &self.read_write_paths
    }

    /// Paths the sandboxed process may execute.
    #[must_use]
    pub fn executable_paths(&self) -> &[PathBuf] {
        &self.executable_paths
    }

    /// Returns the configured environment policy.
    #[must_use]
    pub const fn environment_policy(&self) -> &EnvironmentPolicy {
        &self.environment
    }

    /// Returns the network policy.
    #[must_use]
    pub const fn network_policy(&self) -> NetworkPolicy {
        self.network
    }
}

fn record(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self::new()
    }
}
