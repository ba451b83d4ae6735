//! Persistent record of installed plugins and their approved capabilities.
//!
//! The registry file is the single source of truth for grants. Every
//! mutation re-reads the file, applies one change, and atomically replaces
//! the whole document, so edits made by other processes between mutations
//! are picked up. Concurrent writers may still lose updates; the file belongs
//! to one local user.
//!
//! ```json
//! { "plugins": [ { "url": "/opt/plugins/snippets", "permissions": { "env": ["HOME"] } } ] }
//! ```
//!
//! An older layout stored `plugins` as a bare array of locator strings. It is
//! still read, and upgraded the next time the registry is written.
//!
//! Entries that fail to decode are skipped when reading. While any are
//! present, or the file as a whole is unreadable, mutations are refused
//! rather than overwrite what could not be understood.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use beacon_sandbox::PluginPermissions;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

const REGISTRY_TARGET: &str = "beacon_plugins::registry";

/// Errors raised while writing the registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry directory or temporary file could not be prepared.
    #[error("failed to prepare registry at {path}: {source}")]
    Prepare {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The document could not be serialized.
    #[error("failed to encode registry: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The file holds content that could not be decoded; writing would
    /// discard it.
    #[error("refusing to rewrite damaged registry {path}: {reason}")]
    Damaged {
        /// Registry file path.
        path: PathBuf,
        /// What could not be decoded.
        reason: String,
    },

    /// The new document could not replace the old one.
    #[error("failed to write registry {path}: {source}")]
    Write {
        /// Registry file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// One installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    url: String,
    #[serde(default, skip_serializing_if = "PluginPermissions::is_empty")]
    permissions: PluginPermissions,
}

impl RegistryEntry {
    /// Creates an entry with no approved capabilities.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            permissions: PluginPermissions::new(),
        }
    }

    /// Locator exactly as installed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Most recently approved capabilities.
    #[must_use]
    pub const fn permissions(&self) -> &PluginPermissions {
        &self.permissions
    }
}

/// Whole registry document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryDocument {
    plugins: Vec<RegistryEntry>,
}

impl RegistryDocument {
    /// Installed plugins in installation order.
    #[must_use]
    pub fn plugins(&self) -> &[RegistryEntry] {
        &self.plugins
    }

    /// Looks up an entry by locator.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&RegistryEntry> {
        self.plugins.iter().find(|entry| entry.url == url)
    }

    fn get_mut(&mut self, url: &str) -> Option<&mut RegistryEntry> {
        self.plugins.iter_mut().find(|entry| entry.url == url)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Legacy(String),
    Current(RegistryEntry),
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    plugins: Vec<serde_json::Value>,
}

/// A document as read from disk, with anything that had to be dropped.
struct Snapshot {
    document: RegistryDocument,
    damage: Option<String>,
}

impl Snapshot {
    const fn intact(document: RegistryDocument) -> Self {
        Self {
            document,
            damage: None,
        }
    }

    const fn damaged(document: RegistryDocument, reason: String) -> Self {
        Self {
            document,
            damage: Some(reason),
        }
    }
}

/// Decodes `text` entry by entry so one bad entry cannot hide the rest.
fn decode(text: &str) -> Snapshot {
    let stored: StoredDocument = match serde_json::from_str(text) {
        Ok(stored) => stored,
        Err(error) => return Snapshot::damaged(RegistryDocument::default(), error.to_string()),
    };
    let mut plugins = Vec::with_capacity(stored.plugins.len());
    let mut rejected = Vec::new();
    for (index, raw) in stored.plugins.into_iter().enumerate() {
        match serde_json::from_value(raw) {
            Ok(StoredEntry::Legacy(url)) => plugins.push(RegistryEntry::new(url)),
            Ok(StoredEntry::Current(entry)) => plugins.push(entry),
            Err(error) => rejected.push(format!("entry {index}: {error}")),
        }
    }
    let document = RegistryDocument { plugins };
    if rejected.is_empty() {
        Snapshot::intact(document)
    } else {
        Snapshot::damaged(document, rejected.join("; "))
    }
}

/// Handle on the registry file.
///
/// # Example
///
/// ```
/// use beacon_plugins::registry::PluginRegistry;
///
/// let dir = tempfile::tempdir().expect("temp dir");
/// let registry = PluginRegistry::open(dir.path().join("plugins.json"));
/// assert!(registry.read().plugins().is_empty());
/// registry.install("/opt/plugins/snippets").expect("install");
/// assert_eq!(registry.read().plugins().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    path: PathBuf,
}

impl PluginRegistry {
    /// Opens the registry stored at `path`. The file need not exist.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current document.
    ///
    /// A missing, unreadable, or malformed file reads as an empty registry
    /// so the host can still start with its built-in plugins. Individual
    /// entries that fail to decode are left out.
    #[must_use]
    pub fn read(&self) -> RegistryDocument {
        self.snapshot().document
    }

    fn snapshot(&self) -> Snapshot {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(target: REGISTRY_TARGET, path = %self.path.display(), "no registry file");
                return Snapshot::intact(RegistryDocument::default());
            }
            Err(error) => {
                warn!(
                    target: REGISTRY_TARGET,
                    path = %self.path.display(),
                    %error,
                    "registry unreadable; treating as empty"
                );
                return Snapshot::damaged(RegistryDocument::default(), error.to_string());
            }
        };
        let snapshot = decode(&text);
        if let Some(reason) = &snapshot.damage {
            warn!(
                target: REGISTRY_TARGET,
                path = %self.path.display(),
                reason = %reason,
                kept = snapshot.document.plugins.len(),
                "registry partly malformed; skipping what could not be read"
            );
        }
        snapshot
    }

    /// Adds a plugin with no approved capabilities.
    ///
    /// Returns `false` when the locator was already installed.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the file cannot be rewritten, or
    /// [`RegistryError::Damaged`] if it holds content that could not be
    /// decoded.
    pub fn install(&self, url: &str) -> Result<bool, RegistryError> {
        self.mutate(|document| {
            if document.get(url).is_some() {
                return false;
            }
            document.plugins.push(RegistryEntry::new(url));
            true
        })
    }

    /// Removes a plugin.
    ///
    /// Returns `false` when the locator was not installed.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the file is damaged or cannot be
    /// rewritten.
    pub fn uninstall(&self, url: &str) -> Result<bool, RegistryError> {
        self.mutate(|document| {
            let before = document.plugins.len();
            document.plugins.retain(|entry| entry.url != url);
            document.plugins.len() != before
        })
    }

    /// Stores `grant` as the approved capability set for `url`, installing
    /// the plugin if it is not yet present.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the file is damaged or cannot be
    /// rewritten.
    pub fn record_grant(&self, url: &str, grant: &PluginPermissions) -> Result<(), RegistryError> {
        self.mutate(|document| {
            if let Some(entry) = document.get_mut(url) {
                entry.permissions = grant.clone();
            } else {
                document.plugins.push(RegistryEntry {
                    url: url.to_owned(),
                    permissions: grant.clone(),
                });
            }
            true
        })
        .map(|_| ())
    }

    fn mutate<F>(&self, change: F) -> Result<bool, RegistryError>
    where
        F: FnOnce(&mut RegistryDocument) -> bool,
    {
        let Snapshot { mut document, damage } = self.snapshot();
        if let Some(reason) = damage {
            return Err(RegistryError::Damaged {
                path: self.path.clone(),
                reason,
            });
        }
        if !change(&mut document) {
            return Ok(false);
        }
        self.write(&document)?;
        Ok(true)
    }

    fn write(&self, document: &RegistryDocument) -> Result<(), RegistryError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prepare = |source: io::Error| RegistryError::Prepare {
            path: directory.clone(),
            source: Arc::new(source),
        };
        fs::create_dir_all(&directory).map_err(prepare)?;
        let mut staged = NamedTempFile::new_in(&directory).map_err(prepare)?;

        let mut body = serde_json::to_vec_pretty(document)
            .map_err(|source| RegistryError::Encode { source })?;
        body.push(b'\n');
        let write_error = |source: io::Error| RegistryError::Write {
            path: self.path.clone(),
            source: Arc::new(source),
        };
        staged.write_all(&body).map_err(write_error)?;
        staged.as_file().sync_all().map_err(write_error)?;
        staged
            .persist(&self.path)
            .map_err(|error| write_error(error.error))?;
        debug!(
            target: REGISTRY_TARGET,
            path = %self.path.display(),
            plugins = document.plugins.len(),
            "registry written"
        );
        Ok(())
    }
}
