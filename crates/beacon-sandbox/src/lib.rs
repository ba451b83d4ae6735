//! Capability model and process sandbox for beacon plugins.
//!
//! Plugins declare the capabilities they need as a [`PluginPermissions`]
//! set. The host compares that request against what the user approved and
//! launches the plugin through the `beacon-cage` trampoline, which turns the
//! approved set into a [`SandboxProfile`] and applies it with [`birdcage`]
//! before the plugin's first instruction runs.
//!
//! The sandbox is restrictive by default:
//! - Networking is disabled unless granted.
//! - Environment variables are stripped unless whitelisted.
//! - Executables must be whitelisted and provided as absolute paths.
//! - Standard library locations on Linux stay readable so dynamically
//!   linked binaries keep working.
//!
//! [`Sandbox::spawn`] must run from a single-threaded process; otherwise it
//! returns [`SandboxError::MultiThreaded`]. [`CageInvocation`] exists so the
//! multi-threaded host never activates a sandbox itself.

mod cage;
mod error;
mod mode;
pub mod permissions;
mod profile;
mod runtime;
mod sandbox;

pub use birdcage::process;
pub use cage::{CageArgs, CageInvocation, CageMode, SIGNALLED_EXIT};
pub use error::SandboxError;
pub use mode::ExecutionMode;
pub use permissions::{CanonicalPermissions, CapabilityGrant, CapabilityKind, PluginPermissions};
pub use profile::{EnvironmentPolicy, NetworkPolicy, SandboxProfile};
pub use runtime::resolve_command;
pub use sandbox::{Sandbox, SandboxChild, SandboxCommand, SandboxOutput, SandboxPlan};

#[cfg(test)]
mod tests;
