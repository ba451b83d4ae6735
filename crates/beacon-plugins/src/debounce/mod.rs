//! Input-settling wrapper for rate-limited sources.
//!
//! Sources that hit a network index should not see every keystroke.
//! [`DebouncedSource`] delays each call by a window and abandons calls that a
//! newer one supersedes. An abandoned call answers with the last result set
//! that completed, so the list on screen does not flicker to empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::error::PluginError;
use crate::source::{SearchResult, Source};

const DEBOUNCE_TARGET: &str = "beacon_plugins::debounce";

/// Wraps a [`Source`] with a settle window.
pub struct DebouncedSource<S> {
    inner: S,
    window: Duration,
    generation: AtomicU64,
    last: Mutex<Vec<SearchResult>>,
}

impl<S: Source> DebouncedSource<S> {
    /// Wraps `inner`, delaying each search by `window`.
    #[must_use]
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            generation: AtomicU64::new(0),
            last: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped source.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// The settle window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    fn fallback(&self, ticket: u64) -> Vec<SearchResult> {
        trace!(target: DEBOUNCE_TARGET, source = self.inner.id(), ticket, "superseded");
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: Source> Source for DebouncedSource<S> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> Option<&str> {
        self.inner.description()
    }

    fn trigger(&self) -> Option<&str> {
        self.inner.trigger()
    }

    fn init(&self) -> Result<(), PluginError> {
        self.inner.init()
    }

    fn search(&self, query: &str) -> Vec<SearchResult> {
        if query.trim().is_empty() {
            return self.inner.search(query);
        }
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        thread::sleep(self.window);
        if !self.is_current(ticket) {
            return self.fallback(ticket);
        }

        let results = self.inner.search(query);
        if !self.is_current(ticket) {
            return self.fallback(ticket);
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = results.clone();
        results
    }
}
