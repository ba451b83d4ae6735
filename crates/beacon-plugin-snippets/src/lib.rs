//! Text snippets plugin for the beacon launcher.
//!
//! Typing `snip <name>` lists the snippets whose name matches; picking one
//! copies its text. A handful of snippets are built in. More can be supplied
//! as a JSON object of name to text in the file named by `BEACON_SNIPPETS`,
//! which is why the plugin asks to read that variable and the filesystem.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use beacon_plugins::protocol::{LogLevel, PluginMetadata};
use beacon_plugins::sdk::{Plugin, PluginContext, PluginResult};
use beacon_sandbox::{CapabilityGrant, CapabilityKind, PluginPermissions};
use thiserror::Error;

/// Variable naming the user's snippet file.
pub const SNIPPETS_ENV: &str = "BEACON_SNIPPETS";

/// Keyword that routes queries to this plugin.
pub const TRIGGER: &str = "snip";

const BUILTIN: [(&str, &str); 6] = [
    ("arrow", "→"),
    ("check", "✓"),
    ("degree", "°"),
    ("ellipsis", "…"),
    ("shrug", r"¯\_(ツ)_/¯"),
    ("tableflip", "(╯°□°)╯︵ ┻━┻"),
];

const EXACT_SCORE: f64 = 3.0;
const PREFIX_SCORE: f64 = 2.0;
const CONTAINS_SCORE: f64 = 1.0;

/// Errors raised while loading user snippets.
#[derive(Debug, Error)]
pub enum SnippetError {
    /// The snippet file could not be read.
    #[error("failed to read snippets from '{}': {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The snippet file is not a JSON object of strings.
    #[error("invalid snippets in '{}': {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Named snippets, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetStore {
    snippets: BTreeMap<String, String>,
}

impl SnippetStore {
    /// The snippets that ship with the plugin.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            snippets: BUILTIN
                .iter()
                .map(|(name, text)| ((*name).to_owned(), (*text).to_owned()))
                .collect(),
        }
    }

    /// Adds `text` under `name`, replacing any snippet of that name.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.snippets.insert(name.into(), text.into());
    }

    /// Number of snippets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    /// Returns `true` when there are no snippets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Merges the JSON object in `path` over the current snippets.
    ///
    /// # Errors
    ///
    /// Returns a [`SnippetError`] if the file cannot be read or is not a
    /// JSON object whose values are strings.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), SnippetError> {
        let text = fs::read_to_string(path).map_err(|source| SnippetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let extra: BTreeMap<String, String> =
            serde_json::from_str(&text).map_err(|source| SnippetError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        self.snippets.extend(extra);
        Ok(())
    }

    /// Snippets matching `query`, best first. An empty query lists all.
    ///
    /// Exact names rank above prefixes, which rank above other substrings.
    /// Matching ignores case.
    #[must_use]
    pub fn matches(&self, query: &str) -> Vec<(&str, &str, f64)> {
        let needle = query.trim().to_lowercase();
        let mut found: Vec<_> = self
            .snippets
            .iter()
            .filter_map(|(name, text)| {
                let folded = name.to_lowercase();
                let score = if needle.is_empty() || folded.contains(&needle) {
                    if folded == needle {
                        EXACT_SCORE
                    } else if folded.starts_with(&needle) {
                        PREFIX_SCORE
                    } else {
                        CONTAINS_SCORE
                    }
                } else {
                    return None;
                };
                Some((name.as_str(), text.as_str(), score))
            })
            .collect();
        found.sort_by(|left, right| right.2.total_cmp(&left.2));
        found
    }
}

/// The snippets plugin.
#[derive(Default)]
pub struct SnippetsPlugin {
    store: Option<SnippetStore>,
}

impl SnippetsPlugin {
    /// A plugin serving exactly `store`.
    #[must_use]
    pub const fn with_store(store: SnippetStore) -> Self {
        Self { store: Some(store) }
    }

    fn store(&mut self, ctx: &mut PluginContext) -> &SnippetStore {
        self.store.get_or_insert_with(|| {
            let mut store = SnippetStore::builtin();
            if let Some(path) = env::var_os(SNIPPETS_ENV)
                && let Err(error) = store.merge_file(Path::new(&path))
            {
                ctx.log(LogLevel::Error, error.to_string());
            }
            store
        })
    }
}

impl Plugin for SnippetsPlugin {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("snippets", "Snippets")
            .with_description("Copy saved text snippets")
            .with_trigger(TRIGGER)
            .with_permissions(
                PluginPermissions::new()
                    .with(CapabilityKind::Env, CapabilityGrant::scoped([SNIPPETS_ENV]))
                    .with(CapabilityKind::Read, CapabilityGrant::Flag(true)),
            )
    }

    fn search(&mut self, query: &str, ctx: &mut PluginContext) -> Vec<PluginResult> {
        self.store(ctx)
            .matches(query)
            .into_iter()
            .map(|(name, text, score)| {
                let copied = text.to_owned();
                PluginResult::new(name, text, score).with_action(
                    move |inner: &mut PluginContext| {
                        inner.copy(copied.clone());
                        Ok(())
                    },
                )
            })
            .collect()
    }
}
