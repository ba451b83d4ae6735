//! Per-plugin load state machine.
//!
//! Each transition is a pure function of the current state and one
//! observed fact, so the loader's control flow can be checked in isolation.

use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Where a plugin is in the load pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LoadState {
    /// Listed in the registry; nothing attempted yet.
    Discovered,
    /// The metadata probe is running.
    ProbingMetadata,
    /// The probe failed. Terminal.
    MetadataFailed,
    /// The probe produced valid metadata.
    MetadataOk,
    /// Requested capabilities are being compared with the stored grant.
    ComparingPermissions,
    /// The request changed; waiting for the user.
    AwaitingUserDecision,
    /// The user declined. Terminal.
    Denied,
    /// The user approved the request.
    Approved,
    /// The approved grant is being written to the registry.
    PersistGrant,
    /// A grant is settled; the unit may start.
    Ready,
    /// The unit is running and serving searches. Terminal.
    Initialized,
    /// The unit failed to start. Terminal.
    InitFailed,
}

impl LoadState {
    /// Returns `true` for states the pipeline never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::MetadataFailed | Self::Denied | Self::Initialized | Self::InitFailed
        )
    }

    /// Returns `true` when the plugin ended up in the active set.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// Applies `event`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `event` is not valid in this state.
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_plugins::loader::{LoadEvent, LoadState};
    ///
    /// let probing = LoadState::Discovered.advance(LoadEvent::Probe).expect("valid");
    /// assert_eq!(probing, LoadState::ProbingMetadata);
    /// assert!(probing.advance(LoadEvent::Approve).is_err());
    /// ```
    pub const fn advance(self, event: LoadEvent) -> Result<Self, TransitionError> {
        let next = match (self, event) {
            (Self::Discovered, LoadEvent::Probe) => Self::ProbingMetadata,
            (Self::Discovered | Self::ProbingMetadata, LoadEvent::ProbeFailed) => {
                Self::MetadataFailed
            }
            (Self::ProbingMetadata, LoadEvent::ProbeSucceeded) => Self::MetadataOk,
            (Self::MetadataOk, LoadEvent::Compare) => Self::ComparingPermissions,
            (Self::ComparingPermissions, LoadEvent::Unchanged) => Self::Ready,
            (Self::ComparingPermissions, LoadEvent::Changed) => Self::AwaitingUserDecision,
            (Self::AwaitingUserDecision, LoadEvent::Approve) => Self::Approved,
            (Self::AwaitingUserDecision, LoadEvent::Deny) => Self::Denied,
            (Self::Approved, LoadEvent::Persist) => Self::PersistGrant,
            (Self::PersistGrant, LoadEvent::GrantSettled) => Self::Ready,
            (Self::Ready, LoadEvent::Initialised) => Self::Initialized,
            (Self::Ready, LoadEvent::InitFailed) => Self::InitFailed,
            (from, rejected) => {
                return Err(TransitionError {
                    from,
                    event: rejected,
                });
            }
        };
        Ok(next)
    }
}

/// A fact observed while loading a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LoadEvent {
    /// The probe was started.
    Probe,
    /// The probe returned usable metadata.
    ProbeSucceeded,
    /// The locator, probe, or declaration was unusable.
    ProbeFailed,
    /// Comparison against the stored grant began.
    Compare,
    /// The request equals the stored grant.
    Unchanged,
    /// The request differs from the stored grant.
    Changed,
    /// The user approved the request.
    Approve,
    /// The user declined the request.
    Deny,
    /// Writing the grant began.
    Persist,
    /// The grant write finished, successfully or for this session only.
    GrantSettled,
    /// The unit reported ready.
    Initialised,
    /// The unit failed to start.
    InitFailed,
}

/// An event arrived in a state that does not accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("load event '{event}' is not valid in state '{from}'")]
pub struct TransitionError {
    /// State the machine was in.
    pub from: LoadState,
    /// Rejected event.
    pub event: LoadEvent,
}
