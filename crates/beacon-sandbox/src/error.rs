//! Domain errors raised by the sandbox wrapper and the cage trampoline.

use std::io;
use std::path::PathBuf;

use birdcage::error::Error as BirdcageError;
use thiserror::Error;

/// Errors raised while preparing or launching a sandboxed process.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The supplied program path was not absolute.
    #[error("sandboxed commands require absolute program paths, got {0}")]
    ProgramNotAbsolute(PathBuf),

    /// The program was not whitelisted in the profile.
    #[error("executable {program} is not authorised by the sandbox profile")]
    ExecutableNotAuthorised {
        /// Canonical path of the rejected program.
        program: PathBuf,
    },

    /// The supplied path does not exist and therefore cannot be whitelisted.
    #[error("path {path} does not exist on the host filesystem")]
    MissingPath {
        /// Path that was not found.
        path: PathBuf,
    },

    /// Canonicalisation of a path failed.
    #[error("failed to canonicalise {path}: {source}")]
    CanonicalisationFailed {
        /// Path being canonicalised.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },

    /// The current process hosts more than one thread.
    #[error("sandboxing must occur in a single-threaded context (observed {thread_count} threads)")]
    MultiThreaded {
        /// Number of threads observed in `/proc/self/status`.
        thread_count: usize,
    },

    /// Thread count could not be determined from `/proc`.
    #[error("failed to determine thread count: {source}")]
    ThreadCountUnavailable {
        /// Underlying read error.
        source: io::Error,
    },

    /// The underlying sandbox library rejected activation.
    #[error("birdcage activation failed: {0}")]
    Activation(#[from] BirdcageError),

    /// The cage was invoked with malformed arguments.
    #[error("invalid cage invocation: {message}")]
    InvalidInvocation {
        /// Description of the problem.
        message: String,
    },

    /// The capability grant passed to the cage is not valid JSON.
    #[error("invalid capability grant: {source}")]
    InvalidGrant {
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The sandboxed process could not be awaited.
    #[error("failed to wait for sandboxed process: {source}")]
    Wait {
        /// Underlying wait error.
        source: io::Error,
    },
}
