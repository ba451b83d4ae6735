//! The contract every search source fulfils.
//!
//! Built-in sources implement [`Source`] directly. Sandboxed plugins are
//! represented by [`SandboxedSource`](crate::adapter::SandboxedSource), which
//! fulfils the same contract over the wire protocol.

use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;

/// A provider of search results.
pub trait Source: Send + Sync {
    /// Unique identifier within the loaded set.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Keyword that binds queries of the form `"<trigger> <rest>"` to this
    /// source alone. Sources without one take part in every other query.
    fn trigger(&self) -> Option<&str> {
        None
    }

    /// Prepares the source. Called once before the first search.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when the source cannot be used; the loader
    /// then leaves it out of the active set.
    fn init(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Returns results for `query`. Never fails; problems yield an empty
    /// list.
    fn search(&self, query: &str) -> Vec<SearchResult>;
}

/// Deferred, zero-argument action behind a result.
#[derive(Clone)]
pub struct Activation(Arc<dyn Fn() + Send + Sync>);

impl Activation {
    /// Wraps `action`.
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(action))
    }

    /// An action that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Runs the action.
    pub fn invoke(&self) {
        (self.0)();
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Activation(..)")
    }
}

/// One row offered to the user.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Primary text.
    pub title: String,
    /// Secondary text.
    pub subtitle: String,
    /// Relevance; higher wins.
    pub score: f64,
    /// Optional icon reference.
    pub icon: Option<String>,
    /// What happens when the user picks the result.
    pub activation: Activation,
}

impl SearchResult {
    /// Creates a result whose activation does nothing.
    #[must_use]
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>, score: f64) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            score,
            icon: None,
            activation: Activation::noop(),
        }
    }

    /// Sets the icon reference.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Sets the activation.
    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Runs the activation.
    pub fn activate(&self) {
        self.activation.invoke();
    }
}
