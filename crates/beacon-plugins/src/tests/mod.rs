//! Crate-level integration and BDD tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use beacon_sandbox::PluginPermissions;
use tempfile::TempDir;

use crate::adapter::HostServices;
use crate::loader::{Decision, PermissionPrompt, PluginLoader};
use crate::orchestrator::SearchOrchestrator;
use crate::protocol::PluginMetadata;
use crate::registry::PluginRegistry;
use crate::sdk::{Plugin, PluginContext, PluginResult};
use crate::source::{SearchResult, Source};
use crate::test_support::{FakeLauncher, sdk_unit};


/// Source that records every query it receives.
pub(crate) struct Recording {
    id: String,
    trigger: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl Recording {
    pub(crate) fn new(id: &str, trigger: Option<&str>) -> Self {
        Self {
            id: id.to_owned(),
            trigger: trigger.map(str::to_owned),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Source for Recording {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    fn search(&self, query: &str) -> Vec<SearchResult> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_owned());
        vec![SearchResult::new(format!("{}:{query}", self.id), "", 1.0)]
    }
}

/// Prompt that answers with a fixed decision and counts how often it was
/// asked.
pub(crate) struct CountingPrompt {
    decision: Decision,
    asked: AtomicUsize,
}

impl CountingPrompt {
    pub(crate) const fn new(decision: Decision) -> Self {
        Self {
            decision,
            asked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl PermissionPrompt for CountingPrompt {
    fn decide(&self, _: &PluginMetadata, _: &PluginPermissions, _: &[String]) -> Decision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

#[derive(Default)]
struct Clipboard {
    copied: Mutex<Vec<String>>,
}

impl HostServices for Clipboard {
    fn copy_to_clipboard(&self, _: &str, text: &str) {
        self.copied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_owned());
    }
}

#[derive(Default)]
struct Shout;

impl Plugin for Shout {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("shout", "Shout").with_trigger("!")
    }

    fn search(&mut self, query: &str, _: &mut PluginContext) -> Vec<PluginResult> {
        let loud = query.to_uppercase();
        vec![
            PluginResult::new(loud.clone(), "Copy", 1.0).with_action(
                move |ctx: &mut PluginContext| {
                    ctx.copy(loud.clone());
                    Ok(())
                },
            ),
        ]
    }
}

#[test]
fn sdk_plugin_round_trips_through_loader_and_orchestrator() {
    let dir = TempDir::new().expect("temp dir");
    let registry = PluginRegistry::open(dir.path().join("plugins.json"));
    registry.install("/opt/plugins/shout").expect("install");
    let launcher = Arc::new(FakeLauncher::new());
    launcher.register("/opt/plugins/shout", Shout::metadata(), sdk_unit::<Shout>());
    let clipboard = Arc::new(Clipboard::default());
    let builtins: Vec<Arc<dyn Source>> = vec![Arc::new(Recording::new("apps", None))];

    let loaded = PluginLoader::new(
        registry,
        launcher,
        Arc::new(CountingPrompt::new(Decision::Deny)),
    )
    .with_services(clipboard.clone())
    .load(builtins);
    let orchestrator = SearchOrchestrator::new(loaded.sources);

    let results = orchestrator.search("! hello").expect("latest");
    let first = results.first().expect("one result");
    assert_eq!(first.title, "HELLO");
    first.activate();

    let copied = clipboard
        .copied
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(copied, ["HELLO"]);
}
