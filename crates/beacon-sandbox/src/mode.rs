//! Maps the two plugin execution modes onto sandbox profiles.
//!
//! A metadata probe runs with nothing but its own program, plus networking
//! when the plugin lives behind a remote locator and must be fetched. An
//! execution-mode unit receives exactly the capability set the user granted.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::permissions::{CapabilityGrant, CapabilityKind, PluginPermissions};
use crate::profile::SandboxProfile;
use crate::runtime::{absolute_path, existing_paths, resolve_command};

const MODE_TARGET: &str = "beacon_sandbox::mode";

/// Paths exposed by the `sys` capability.
const SYSTEM_INFO_PATHS: [&str; 4] = ["/proc", "/sys", "/etc/os-release", "/etc/hostname"];

/// Directories executable under an unrestricted `run` grant.
const COMMAND_DIRECTORIES: [&str; 2] = ["/usr/bin", "/bin"];

/// How a plugin unit is being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Zero-capability metadata probe.
    Probe {
        /// The unit is resolved from a remote locator and may fetch it.
        remote: bool,
    },
    /// Long-lived unit running with the granted capability set.
    Execute {
        /// Capabilities approved by the user.
        grant: PluginPermissions,
    },
}

impl ExecutionMode {
    /// Builds the sandbox profile for running `program` in this mode.
    #[must_use]
    pub fn profile(&self, program: &Path) -> SandboxProfile {
        let base = SandboxProfile::new().allow_executable(program);
        match self {
            Self::Probe { remote: true } => base.allow_networking(),
            Self::Probe { remote: false } => base,
            Self::Execute { grant } => apply_grant(base, grant),
        }
    }
}

fn apply_grant(profile: SandboxProfile, grant: &PluginPermissions) -> SandboxProfile {
    CapabilityKind::ALL
        .iter()
        .fold(profile, |current, kind| match grant.grant(*kind) {
            value if value.is_denied() => current,
            value => apply_capability(current, *kind, value),
        })
}

fn apply_capability(
    profile: SandboxProfile,
    kind: CapabilityKind,
    grant: &CapabilityGrant,
) -> SandboxProfile {
    match kind {
        CapabilityKind::Net => {
            if !grant.is_unrestricted() {
                warn!(
                    target: MODE_TARGET,
                    hosts = ?grant.qualifiers(),
                    "host-scoped network grants cannot be narrowed by the OS sandbox"
                );
            }
            profile.allow_networking()
        }
        CapabilityKind::Read => scoped_paths(grant)
            .into_iter()
            .fold(profile, SandboxProfile::allow_read_path),
        CapabilityKind::Write => scoped_paths(grant)
            .into_iter()
            .fold(profile, SandboxProfile::allow_read_write_path),
        CapabilityKind::Run => commands(grant)
            .into_iter()
            .fold(profile, SandboxProfile::allow_executable),
        CapabilityKind::Env => {
            if grant.is_unrestricted() {
                profile.allow_full_environment()
            } else {
                grant
                    .qualifiers()
                    .iter()
                    .fold(profile, |profile, key| {
                        profile.allow_environment_variable(key.clone())
                    })
            }
        }
        CapabilityKind::Sys => existing_paths(&SYSTEM_INFO_PATHS)
            .into_iter()
            .fold(profile, SandboxProfile::allow_read_path),
        CapabilityKind::Ffi | CapabilityKind::Hrtime => {
            debug!(
                target: MODE_TARGET,
                capability = %kind,
                "capability needs no sandbox exception"
            );
            profile
        }
    }
}

/// Existing filesystem paths named by a grant; `true` means the whole tree.
fn scoped_paths(grant: &CapabilityGrant) -> Vec<PathBuf> {
    if grant.is_unrestricted() {
        return vec![PathBuf::from("/")];
    }
    grant
        .qualifiers()
        .iter()
        .filter_map(|raw| {
            let path = absolute_path(raw).filter(|path| path.exists());
            if path.is_none() {
                warn!(target: MODE_TARGET, path = %raw, "skipping missing granted path");
            }
            path
        })
        .collect()
}

fn commands(grant: &CapabilityGrant) -> Vec<PathBuf> {
    if grant.is_unrestricted() {
        return existing_paths(&COMMAND_DIRECTORIES);
    }
    grant
        .qualifiers()
        .iter()
        .filter_map(|name| {
            let resolved = resolve_command(name);
            if resolved.is_none() {
                warn!(target: MODE_TARGET, command = %name, "skipping unresolvable command");
            }
            resolved
        })
        .collect()
}
