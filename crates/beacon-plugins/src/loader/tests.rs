//! Unit tests for the plugin loader and its state machine.

use std::fs;
use std::time::Instant;

use beacon_sandbox::CapabilityGrant;
use mockall::mock;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::source::SearchResult;
use crate::test_support::{FakeLauncher, UnitEnd, responder, wire_result};

const WEB: &str = "/opt/plugins/web";
const CALC: &str = "/opt/plugins/calc";

mock! {
    Prompt {}
    impl PermissionPrompt for Prompt {
        fn decide(
            &self,
            metadata: &PluginMetadata,
            requested: &PluginPermissions,
            description: &[String],
        ) -> Decision;
    }
}

struct Harness {
    _dir: TempDir,
    registry: PluginRegistry,
    launcher: Arc<FakeLauncher>,
}

impl Harness {
    fn loader(&self, prompt: MockPrompt) -> PluginLoader {
        let launcher: Arc<dyn SandboxLauncher> = self.launcher.clone();
        PluginLoader::new(self.registry.clone(), launcher, Arc::new(prompt))
    }

    fn serve(&self, locator: &str, metadata: PluginMetadata) {
        let answer = metadata.clone();
        self.launcher.register(
            locator,
            metadata,
            responder(answer, |query, id| vec![wire_result(query, 1.0, id, 0)]),
        );
    }

    fn install(&self, locator: &str, grant: Option<&PluginPermissions>) {
        self.registry.install(locator).expect("install");
        if let Some(stored) = grant {
            self.registry.record_grant(locator, stored).expect("grant");
        }
    }
}

#[fixture]
fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let registry = PluginRegistry::open(dir.path().join("plugins.json"));
    Harness {
        _dir: dir,
        registry,
        launcher: Arc::new(FakeLauncher::new()),
    }
}

fn net(hosts: &[&str]) -> PluginPermissions {
    PluginPermissions::new().with(
        CapabilityKind::Net,
        CapabilityGrant::scoped(hosts.iter().copied()),
    )
}

fn web_metadata() -> PluginMetadata {
    PluginMetadata::new("web", "Web search")
        .with_trigger("w")
        .with_permissions(net(&["b.example", "a.example"]))
}

fn silent_prompt() -> MockPrompt {
    let mut prompt = MockPrompt::new();
    prompt.expect_decide().never();
    prompt
}

fn answering(decision: Decision) -> MockPrompt {
    let mut prompt = MockPrompt::new();
    prompt
        .expect_decide()
        .times(1)
        .return_const(decision);
    prompt
}

struct Builtin(&'static str);

impl Source for Builtin {
    fn id(&self) -> &str {
        self.0
    }

    fn name(&self) -> &str {
        self.0
    }

    fn search(&self, _: &str) -> Vec<SearchResult> {
        Vec::new()
    }
}

fn ids(loaded: &LoadedPlugins) -> Vec<&str> {
    loaded.sources.iter().map(|source| source.id()).collect()
}

#[rstest]
fn unchanged_grant_skips_the_prompt(harness: Harness) {
    harness.serve(WEB, web_metadata());
    harness.install(WEB, Some(&net(&["a.example", "b.example"])));

    let loaded = harness.loader(silent_prompt()).load(Vec::new());

    assert_eq!(ids(&loaded), ["web"]);
    let outcome = loaded.outcome(WEB).expect("outcome");
    assert_eq!(outcome.state, LoadState::Initialized);
    assert!(outcome.error.is_none());
    let launches = harness.launcher.launches();
    let (_, grant) = launches.first().expect("launched");
    assert_eq!(grant, &net(&["a.example", "b.example"]));
}

#[rstest]
fn plugins_asking_for_nothing_load_without_a_prompt(harness: Harness) {
    harness.serve(CALC, PluginMetadata::new("calc", "Calculator"));
    harness.install(CALC, None);

    let loaded = harness.loader(silent_prompt()).load(Vec::new());
    assert_eq!(ids(&loaded), ["calc"]);
}

#[rstest]
fn approval_persists_the_new_grant(harness: Harness) {
    harness.serve(WEB, web_metadata());
    harness.install(WEB, None);
    let mut prompt = MockPrompt::new();
    prompt
        .expect_decide()
        .withf(|metadata, _, description| {
            metadata.id() == "web"
                && description
                    == [
                        "• Network access:".to_owned(),
                        "  - a.example".to_owned(),
                        "  - b.example".to_owned(),
                    ]
        })
        .times(1)
        .return_const(Decision::Approve);

    let loaded = harness.loader(prompt).load(Vec::new());

    assert_eq!(ids(&loaded), ["web"]);
    let stored = harness.registry.read();
    let entry = stored.get(WEB).expect("entry kept");
    assert_eq!(entry.permissions(), &net(&["a.example", "b.example"]));
}

#[rstest]
fn denial_skips_the_plugin_and_leaves_the_registry_alone(harness: Harness) {
    harness.serve(WEB, web_metadata());
    harness.install(WEB, None);
    let before = fs::read_to_string(harness.registry.path()).expect("registry");

    let loaded = harness.loader(answering(Decision::Deny)).load(Vec::new());

    assert!(loaded.sources.is_empty());
    let outcome = loaded.outcome(WEB).expect("outcome");
    assert_eq!(outcome.state, LoadState::Denied);
    assert!(matches!(
        outcome.error,
        Some(LoadError::Plugin(PluginError::PermissionDenied { .. }))
    ));
    assert!(harness.launcher.launches().is_empty());
    let after = fs::read_to_string(harness.registry.path()).expect("registry");
    assert_eq!(before, after);
}

#[rstest]
fn a_bad_plugin_does_not_stop_the_others(harness: Harness) {
    harness
        .launcher
        .register_probe("/opt/plugins/broken", |mut end: UnitEnd| {
            end.send_raw(b"not a declaration\n");
        });
    harness.serve(CALC, PluginMetadata::new("calc", "Calculator"));
    harness.install("/opt/plugins/broken", None);
    harness.install("/opt/plugins/missing", None);
    harness.install(CALC, None);

    let loaded = harness.loader(silent_prompt()).load(Vec::new());

    assert_eq!(ids(&loaded), ["calc"]);
    let states: Vec<_> = loaded.outcomes.iter().map(|outcome| outcome.state).collect();
    assert_eq!(
        states,
        [
            LoadState::MetadataFailed,
            LoadState::MetadataFailed,
            LoadState::Initialized
        ]
    );
}

#[rstest]
fn duplicate_ids_are_rejected(harness: Harness) {
    harness.serve(CALC, PluginMetadata::new("calc", "Calculator"));
    harness.serve("/opt/plugins/calc-copy", PluginMetadata::new("calc", "Copy"));
    harness.install(CALC, None);
    harness.install("/opt/plugins/calc-copy", None);

    let loaded = harness.loader(silent_prompt()).load(Vec::new());

    assert_eq!(ids(&loaded), ["calc"]);
    let outcome = loaded.outcome("/opt/plugins/calc-copy").expect("outcome");
    assert_eq!(outcome.state, LoadState::MetadataFailed);
    assert!(matches!(
        outcome.error,
        Some(LoadError::Plugin(PluginError::Metadata { .. }))
    ));
}

#[rstest]
fn builtins_load_first_and_claim_their_ids(harness: Harness) {
    harness.serve(CALC, PluginMetadata::new("apps", "Impostor"));
    harness.install(CALC, None);
    let builtins: Vec<Arc<dyn Source>> = vec![Arc::new(Builtin("apps")), Arc::new(Builtin("apps"))];

    let loaded = harness.loader(silent_prompt()).load(builtins);

    assert_eq!(ids(&loaded), ["apps"]);
    assert_eq!(
        loaded.outcome(CALC).map(|outcome| outcome.state),
        Some(LoadState::MetadataFailed)
    );
}

#[rstest]
fn units_that_fail_to_start_are_skipped(harness: Harness) {
    harness
        .launcher
        .register(CALC, PluginMetadata::new("calc", "Calculator"), |_end: UnitEnd| {});
    harness.install(CALC, None);

    let loaded = harness.loader(silent_prompt()).load(Vec::new());

    assert!(loaded.sources.is_empty());
    assert_eq!(
        loaded.outcome(CALC).map(|outcome| outcome.state),
        Some(LoadState::InitFailed)
    );
}

#[rstest]
fn network_plugins_are_debounced(harness: Harness) {
    harness.serve(WEB, web_metadata());
    harness.install(WEB, Some(&net(&["a.example", "b.example"])));
    let window = Duration::from_millis(150);

    let loaded = harness
        .loader(silent_prompt())
        .with_debounce(window)
        .load(Vec::new());
    let source = loaded.sources.first().expect("web loaded");

    let started = Instant::now();
    assert_eq!(source.search("rust").len(), 1);
    assert!(started.elapsed() >= window);
}

#[rstest]
#[case(LoadState::Discovered, LoadEvent::Probe, LoadState::ProbingMetadata)]
#[case(LoadState::ProbingMetadata, LoadEvent::ProbeFailed, LoadState::MetadataFailed)]
#[case(LoadState::ProbingMetadata, LoadEvent::ProbeSucceeded, LoadState::MetadataOk)]
#[case(LoadState::MetadataOk, LoadEvent::Compare, LoadState::ComparingPermissions)]
#[case(LoadState::ComparingPermissions, LoadEvent::Unchanged, LoadState::Ready)]
#[case(
    LoadState::ComparingPermissions,
    LoadEvent::Changed,
    LoadState::AwaitingUserDecision
)]
#[case(LoadState::AwaitingUserDecision, LoadEvent::Deny, LoadState::Denied)]
#[case(LoadState::AwaitingUserDecision, LoadEvent::Approve, LoadState::Approved)]
#[case(LoadState::Approved, LoadEvent::Persist, LoadState::PersistGrant)]
#[case(LoadState::PersistGrant, LoadEvent::GrantSettled, LoadState::Ready)]
#[case(LoadState::Ready, LoadEvent::Initialised, LoadState::Initialized)]
#[case(LoadState::Ready, LoadEvent::InitFailed, LoadState::InitFailed)]
fn valid_transitions(#[case] from: LoadState, #[case] event: LoadEvent, #[case] to: LoadState) {
    assert_eq!(from.advance(event), Ok(to));
}

#[rstest]
#[case(LoadState::Discovered, LoadEvent::Approve)]
#[case(LoadState::ComparingPermissions, LoadEvent::Initialised)]
#[case(LoadState::Denied, LoadEvent::Approve)]
#[case(LoadState::Initialized, LoadEvent::Probe)]
#[case(LoadState::Approved, LoadEvent::GrantSettled)]
fn invalid_transitions_are_rejected(#[case] from: LoadState, #[case] event: LoadEvent) {
    assert_eq!(from.advance(event), Err(TransitionError { from, event }));
}

#[rstest]
#[case(LoadState::MetadataFailed, true)]
#[case(LoadState::Denied, true)]
#[case(LoadState::Initialized, true)]
#[case(LoadState::InitFailed, true)]
#[case(LoadState::Ready, false)]
#[case(LoadState::AwaitingUserDecision, false)]
fn terminal_states(#[case] state: LoadState, #[case] terminal: bool) {
    assert_eq!(state.is_terminal(), terminal);
}

#[test]
fn deny_all_declines() {
    let decision = DenyAll.decide(
        &web_metadata(),
        &net(&["a.example"]),
        &["• Network access:".to_owned()],
    );
    assert_eq!(decision, Decision::Deny);
}
