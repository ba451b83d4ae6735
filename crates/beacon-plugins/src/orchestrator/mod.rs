//! Fans each query out to the active sources and keeps only the newest
//! answer.
//!
//! Every call to [`SearchOrchestrator::search`] or
//! [`SearchOrchestrator::spawn_search`] takes a fresh request id and marks it
//! as the latest in one atomic step, on the calling thread. When the fan-out completes, results belonging to
//! a request that has since been superseded are dropped whole; nothing is
//! merged across requests and sources are never told to stop.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::source::{SearchResult, Source};

const ORCHESTRATOR_TARGET: &str = "beacon_plugins::orchestrator";

/// Which sources a query goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'q> {
    /// Only the source at `source` runs, with the trigger stripped.
    Triggered {
        /// Index into the source list.
        source: usize,
        /// Text after the trigger and its separating space.
        query: &'q str,
    },
    /// Every source without a trigger runs with the full query.
    Global {
        /// The unmodified query.
        query: &'q str,
    },
}

/// Decides where `query` goes.
///
/// A query of the form `"<word> <rest>"` whose first word is some source's
/// trigger goes to that source alone with `<rest>`, which may be empty. Any
/// other query, including a bare trigger with no space, goes to the global
/// sources.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use beacon_plugins::orchestrator::{Route, route};
/// use beacon_plugins::source::{SearchResult, Source};
///
/// struct Snippets;
///
/// impl Source for Snippets {
///     fn id(&self) -> &str { "snippets" }
///     fn name(&self) -> &str { "Snippets" }
///     fn trigger(&self) -> Option<&str> { Some("s") }
///     fn search(&self, _: &str) -> Vec<SearchResult> { Vec::new() }
/// }
///
/// let sources: Vec<Arc<dyn Source>> = vec![Arc::new(Snippets)];
/// assert_eq!(route("s query", &sources), Route::Triggered { source: 0, query: "query" });
/// assert_eq!(route("s", &sources), Route::Global { query: "s" });
/// ```
#[must_use]
pub fn route<'q>(query: &'q str, sources: &[Arc<dyn Source>]) -> Route<'q> {
    query
        .split_once(' ')
        .and_then(|(word, rest)| {
            sources
                .iter()
                .position(|source| source.trigger() == Some(word))
                .map(|source| Route::Triggered {
                    source,
                    query: rest,
                })
        })
        .unwrap_or(Route::Global { query })
}

/// Receives the results of background searches.
pub trait ResultSink: Send + Sync {
    /// Called with the merged results for `query`, only while it is still
    /// the newest request.
    fn publish(&self, query: &str, results: Vec<SearchResult>);
}

/// Issues searches against the active source set.
pub struct SearchOrchestrator {
    sources: RwLock<Arc<[Arc<dyn Source>]>>,
    latest: AtomicU64,
}

impl SearchOrchestrator {
    /// Creates an orchestrator over `sources`.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self {
            sources: RwLock::new(sources.into()),
            latest: AtomicU64::new(0),
        }
    }

    /// Swaps in a new source set. Searches already running keep the old one.
    pub fn replace_sources(&self, sources: Vec<Arc<dyn Source>>) {
        *self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner) = sources.into();
    }

    /// The current source set.
    #[must_use]
    pub fn sources(&self) -> Arc<[Arc<dyn Source>]> {
        Arc::clone(&self.sources.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Identifier of the most recently issued request; zero before the
    /// first.
    #[must_use]
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    fn is_latest(&self, id: u64) -> bool {
        self.latest() == id
    }

    /// Issues the next request id, which becomes the latest.
    fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Runs `query` and returns the merged results, best first.
    ///
    /// Returns `None` when a newer search was issued before this one
    /// finished.
    #[must_use]
    pub fn search(&self, query: &str) -> Option<Vec<SearchResult>> {
        self.search_with_id(self.issue(), query)
    }

    fn search_with_id(&self, id: u64, query: &str) -> Option<Vec<SearchResult>> {
        let sources = self.sources();

        let results = match route(query, &sources) {
            Route::Triggered { source, query: rest } => {
                fan_out(sources.get(source).into_iter(), rest)
            }
            Route::Global { query: full } => fan_out(
                sources.iter().filter(|source| source.trigger().is_none()),
                full,
            ),
        };

        if !self.is_latest(id) {
            debug!(target: ORCHESTRATOR_TARGET, request_id = id, "stale results discarded");
            return None;
        }
        Some(results)
    }

    /// Runs `query` on a worker thread and hands the results to `sink` if
    /// no newer search was issued meanwhile. The request counts as issued
    /// when this returns, before the worker starts.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the worker thread cannot be started.
    pub fn spawn_search(
        self: &Arc<Self>,
        query: String,
        sink: Arc<dyn ResultSink>,
    ) -> io::Result<JoinHandle<()>> {
        let id = self.issue();
        let orchestrator = Arc::clone(self);
        thread::Builder::new()
            .name("beacon-search".to_owned())
            .spawn(move || {
                if let Some(results) = orchestrator.search_with_id(id, &query) {
                    sink.publish(&query, results);
                }
            })
    }
}

fn fan_out<'s, I>(targets: I, query: &str) -> Vec<SearchResult>
where
    I: Iterator<Item = &'s Arc<dyn Source>>,
{
    let mut merged = thread::scope(|scope| {
        let running: Vec<_> = targets
            .map(|source| (source.id(), scope.spawn(move || source.search(query))))
            .collect();
        let mut collected = Vec::new();
        for (id, handle) in running {
            match handle.join() {
                Ok(results) => collected.extend(results),
                Err(_) => {
                    warn!(target: ORCHESTRATOR_TARGET, source = id, "source panicked during search");
                }
            }
        }
        collected
    });
    merged.sort_by(|left, right| right.score.total_cmp(&left.score));
    merged
}
