//! Where a plugin lives.
//!
//! Registry entries store locators as the user typed them. Local paths are
//! made absolute before use. `http`, `https`, `jsr`, and `npm` locators stay
//! remote and are handed, exactly as written, to the configured remote
//! runner.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::PluginError;

const REMOTE_SCHEMES: [&str; 4] = ["http://", "https://", "jsr:", "npm:"];

/// Resolved location of a plugin unit.
///
/// # Example
///
/// ```
/// use beacon_plugins::locator::PluginLocator;
///
/// let remote = PluginLocator::parse("https://example.com/plugin").expect("valid");
/// assert!(remote.is_remote());
///
/// let local = PluginLocator::parse("file:///opt/plugins/snippets").expect("valid");
/// assert_eq!(local.to_string(), "/opt/plugins/snippets");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginLocator {
    /// Absolute path to a local executable.
    Local(PathBuf),
    /// Remote locator, passed through unchanged.
    Remote(String),
}

impl PluginLocator {
    /// Resolves a raw registry locator.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Metadata`] for empty input, unparseable URLs,
    /// `file` URLs without a local path, or paths that cannot be made
    /// absolute.
    pub fn parse(raw: &str) -> Result<Self, PluginError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PluginError::metadata(raw, "locator is empty"));
        }
        if let Some(scheme) = REMOTE_SCHEMES
            .into_iter()
            .find(|scheme| trimmed.starts_with(scheme))
        {
            // Validated as a URL, but kept verbatim: the runner gets what the
            // user installed.
            Url::parse(trimmed).map_err(|error| PluginError::metadata(raw, error.to_string()))?;
            if trimmed.len() == scheme.len() {
                return Err(PluginError::metadata(raw, "remote locator names nothing"));
            }
            return Ok(Self::Remote(trimmed.to_owned()));
        }
        if trimmed.starts_with("file://") {
            let path = Url::parse(trimmed)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| PluginError::metadata(raw, "file URL has no local path"))?;
            return Ok(Self::Local(path));
        }
        std::path::absolute(Path::new(trimmed))
            .map(Self::Local)
            .map_err(|error| PluginError::metadata(raw, error.to_string()))
    }

    /// Returns `true` for remote locators.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for PluginLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(locator) => f.write_str(locator),
        }
    }
}
