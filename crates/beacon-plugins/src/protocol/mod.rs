//! Wire protocol between the host and a sandboxed plugin unit.
//!
//! Messages travel as JSON Lines over the unit's standard streams: the host
//! writes [`HostMessage`]s to the unit's stdin and reads [`UnitMessage`]s
//! from its stdout, one message per line. Both unions are tagged by a `type`
//! field. Requests and responses are paired by `id` only; ordering is
//! preserved within one direction but not across them.

use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use beacon_sandbox::PluginPermissions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the length of a single protocol line.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed its end of the channel.
    #[error("channel closed")]
    Closed,

    /// The channel failed at the I/O layer.
    #[error("channel I/O failed: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A line exceeded [`MAX_LINE_BYTES`].
    #[error("message exceeds {limit} bytes")]
    TooLong {
        /// The enforced limit.
        limit: usize,
    },

    /// A line was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    /// A line was not a valid message.
    #[error("malformed message: {source}")]
    Malformed {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A message could not be encoded.
    #[error("failed to encode message: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Metadata failed structural validation.
    #[error("invalid metadata: {reason}")]
    InvalidMetadata {
        /// Which rule was violated.
        reason: String,
    },

    /// A well-formed message arrived where another was expected.
    #[error("expected a '{expected}' message, received '{received}'")]
    Unexpected {
        /// Message type the reader was waiting for.
        expected: &'static str,
        /// Message type that arrived.
        received: &'static str,
    },
}

impl From<io::Error> for ProtocolError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// Messages written by the host to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Run a search.
    Search {
        /// Request identifier, unique per adapter instance.
        id: u64,
        /// Query text, trigger already stripped.
        query: String,
    },
    /// Run the action behind a previously returned result.
    Activate {
        /// The result's token.
        id: String,
    },
}

/// Messages written by a unit to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitMessage {
    /// The unit has loaded and describes itself.
    Ready {
        /// The unit's declaration.
        metadata: PluginMetadata,
    },
    /// Answer to a search request.
    Results {
        /// Identifier of the answered request.
        id: u64,
        /// Results in the unit's preferred order.
        results: Vec<WireResult>,
    },
    /// An activation has completed.
    Activated {
        /// Token of the activated result.
        id: String,
    },
    /// Diagnostic output; never affects control flow.
    Log {
        /// Severity of the entry.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// Ask the host to place text on the clipboard. The host does not reply.
    Copy {
        /// Text to copy.
        text: String,
    },
}

impl UnitMessage {
    /// Returns the wire name of the message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Results { .. } => "results",
            Self::Activated { .. } => "activated",
            Self::Log { .. } => "log",
            Self::Copy { .. } => "copy",
        }
    }
}

/// Severity of a [`UnitMessage::Log`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational output.
    Info,
    /// An error inside the unit.
    Error,
}

/// A search result as carried on the wire.
///
/// The activation behind the result stays inside the unit; the host only
/// holds the opaque `resultToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResult {
    /// Primary text.
    pub title: String,
    /// Secondary text.
    #[serde(default)]
    pub subtitle: String,
    /// Relevance; higher wins.
    pub score: f64,
    /// Token that names the result in a later `activate`.
    #[serde(rename = "resultToken")]
    pub result_token: String,
    /// Optional icon reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// What a plugin declares about itself.
///
/// # Example
///
/// ```
/// use beacon_plugins::protocol::PluginMetadata;
///
/// let metadata = PluginMetadata::new("snippets", "Snippets").with_trigger("snip");
/// assert!(metadata.validate().is_ok());
/// assert!(PluginMetadata::new("two words", "Bad").validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger: Option<String>,
    #[serde(default)]
    permissions: PluginPermissions,
}

impl PluginMetadata {
    /// Creates metadata with no trigger, description, or capabilities.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            trigger: None,
            permissions: PluginPermissions::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the trigger keyword.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Sets the requested capabilities.
    #[must_use]
    pub fn with_permissions(mut self, permissions: PluginPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Unique plugin identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Optional trigger keyword.
    #[must_use]
    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    /// Requested capabilities.
    #[must_use]
    pub const fn permissions(&self) -> &PluginPermissions {
        &self.permissions
    }

    /// Checks the declaration before the host trusts any of it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMetadata`] when the id or trigger is
    /// empty or contains whitespace, or when the name is blank.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_keyword("id", &self.id)?;
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if let Some(trigger) = &self.trigger {
            check_keyword("trigger", trigger)?;
        }
        Ok(())
    }
}

fn check_keyword(field: &str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid(format!("{field} must not contain whitespace")));
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidMetadata {
        reason: reason.into(),
    }
}

/// Reads the next message, skipping blank lines.
///
/// # Errors
///
/// Returns [`ProtocolError::Closed`] at end of stream, and the matching
/// variant for oversized, non-UTF-8, or malformed lines. An oversized line is
/// consumed in full so the next call starts on a fresh line.
pub fn read_message<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: BufRead,
    T: DeserializeOwned,
{
    loop {
        let mut line = Vec::new();
        let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX);
        // Room for the payload, its newline, and one byte to detect overflow.
        let read = reader
            .by_ref()
            .take(limit.saturating_add(2))
            .read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(ProtocolError::Closed);
        }
        let terminated = line.last() == Some(&b'\n');
        let payload = if terminated {
            line.len().saturating_sub(1)
        } else {
            line.len()
        };
        if payload > MAX_LINE_BYTES {
            if !terminated {
                skip_line(reader)?;
            }
            return Err(ProtocolError::TooLong {
                limit: MAX_LINE_BYTES,
            });
        }
        let text = std::str::from_utf8(&line).map_err(|_| ProtocolError::InvalidUtf8)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        return serde_json::from_str(trimmed).map_err(|source| ProtocolError::Malformed { source });
    }
}

fn skip_line<R: BufRead>(reader: &mut R) -> Result<(), ProtocolError> {
    let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX);
    loop {
        let mut discarded = Vec::new();
        let read = reader
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut discarded)?;
        if read == 0 || discarded.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Writes `message` as one line and flushes.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails and
/// [`ProtocolError::Io`] if the channel is broken.
pub fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: Write + ?Sized,
    T: Serialize,
{
    let mut line =
        serde_json::to_vec(message).map_err(|source| ProtocolError::Encode { source })?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}
