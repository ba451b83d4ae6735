//! Unit tests for the host adapter.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{FakeLauncher, UnitEnd, responder, wire_result};

const CALC: &str = "/opt/plugins/calc";

#[derive(Default)]
struct RecordingServices {
    copies: Mutex<Vec<(String, String)>>,
}

impl HostServices for RecordingServices {
    fn copy_to_clipboard(&self, plugin: &str, text: &str) {
        lock(&self.copies).push((plugin.to_owned(), text.to_owned()));
    }
}

struct Harness {
    launcher: Arc<FakeLauncher>,
    services: Arc<RecordingServices>,
}

impl Harness {
    fn source(&self, timeouts: PluginTimeouts) -> SandboxedSource {
        let launcher: Arc<dyn SandboxLauncher> = self.launcher.clone();
        let services: Arc<dyn HostServices> = self.services.clone();
        SandboxedSource::new(
            calc_metadata(),
            PluginLocator::parse(CALC).expect("locator"),
            PluginPermissions::new(),
            launcher,
            services,
            timeouts,
        )
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        launcher: Arc::new(FakeLauncher::new()),
        services: Arc::new(RecordingServices::default()),
    }
}

fn calc_metadata() -> PluginMetadata {
    PluginMetadata::new("calc", "Calculator").with_trigger("=")
}

fn short(search: u64) -> PluginTimeouts {
    PluginTimeouts {
        search: Duration::from_millis(search),
        activate: Duration::from_millis(100),
        init: Duration::from_millis(500),
        ..PluginTimeouts::default()
    }
}

fn echo(harness: &Harness) {
    harness.launcher.register(
        CALC,
        calc_metadata(),
        responder(calc_metadata(), |query, id| {
            vec![
                wire_result(&format!("{query} = 4"), 2.0, id, 0),
                wire_result("second", 1.0, id, 1),
            ]
        }),
    );
}

#[rstest]
fn init_then_search_round_trips(harness: Harness) {
    echo(&harness);
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");

    let results = source.search("2+2");
    let titles: Vec<_> = results.iter().map(|result| result.title.as_str()).collect();
    assert_eq!(titles, ["2+2 = 4", "second"]);
    assert_eq!(source.pending_requests(), 0);
    assert_eq!(source.trigger(), Some("="));
}

#[rstest]
fn init_launches_with_the_grant(harness: Harness) {
    echo(&harness);
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");
    let launches = harness.launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches.first().map(|(locator, _)| locator.as_str()), Some(CALC));
}

#[rstest]
fn init_rejects_a_changed_identity(harness: Harness) {
    harness.launcher.register(
        CALC,
        calc_metadata(),
        responder(PluginMetadata::new("imposter", "Imposter"), |_, _| Vec::new()),
    );
    let source = harness.source(short(100));

    let error = source.init().expect_err("identity mismatch");
    assert!(matches!(error, PluginError::Protocol { .. }));
    assert!(source.is_lost());
    assert!(harness.launcher.all_terminated());
}

#[rstest]
fn init_times_out_without_ready(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| end.drain());
    let source = harness.source(short(100));
    let error = source.init().expect_err("no ready message");
    assert!(matches!(error, PluginError::LoadTimeout { .. }));
}

#[rstest]
fn init_reports_a_unit_that_exits_early(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |_end: UnitEnd| {});
    let source = harness.source(short(100));
    let error = source.init().expect_err("unit exited");
    assert!(matches!(error, PluginError::SandboxCrash { .. }));
}

#[rstest]
fn unanswered_search_times_out_empty(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            end.drain();
        });
    let source = harness.source(short(50));
    source.init().expect("unit ready");

    assert!(source.search("slow").is_empty());
    assert_eq!(source.pending_requests(), 0);
    assert!(!source.is_lost());
}

#[rstest]
fn unit_loss_resolves_waiters_immediately(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            end.recv();
        });
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");

    let started = Instant::now();
    assert!(source.search("crash").is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(source.is_lost());
    assert!(source.search("again").is_empty());
}

#[rstest]
fn a_unit_that_stops_reading_cannot_stall_searches(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            thread::sleep(Duration::from_secs(3));
        });
    let source = harness.source(short(100));
    source.init().expect("unit ready");

    // Far more than a pipe buffer, so the write cannot complete.
    let started = Instant::now();
    assert!(source.search(&"x".repeat(200_000)).is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(source.is_lost());

    let again = Instant::now();
    assert!(source.search("next").is_empty());
    assert!(again.elapsed() < Duration::from_millis(50));
}

#[rstest]
fn malformed_lines_are_skipped(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            while let Some(HostMessage::Search { id, .. }) = end.recv() {
                end.send_raw(b"{not json}\n");
                end.send(&UnitMessage::Results {
                    id,
                    results: vec![wire_result("ok", 1.0, id, 0)],
                });
            }
        });
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");

    assert_eq!(source.search("q").len(), 1);
    assert!(!source.is_lost());
}

#[rstest]
fn activation_sends_one_request_per_pick(harness: Harness) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    harness
        .launcher
        .register(CALC, calc_metadata(), move |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            while let Some(message) = end.recv() {
                let reply = match message {
                    HostMessage::Search { id, .. } => UnitMessage::Results {
                        id,
                        results: vec![wire_result("pick me", 1.0, id, 0)],
                    },
                    HostMessage::Activate { id } => {
                        lock(&record).push(id.clone());
                        UnitMessage::Activated { id }
                    }
                };
                end.send(&reply);
            }
        });
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");

    let results = source.search("x");
    let first = results.first().expect("one result");
    first.activate();
    assert_eq!(*lock(&seen), ["1_0"]);
}

#[rstest]
fn concurrent_picks_of_one_result_are_each_confirmed(harness: Harness) {
    echo(&harness);
    let source = harness.source(PluginTimeouts {
        activate: Duration::from_secs(5),
        ..PluginTimeouts::default()
    });
    source.init().expect("unit ready");
    let results = source.search("x");
    let first = results.first().expect("one result");

    let started = Instant::now();
    thread::scope(|scope| {
        scope.spawn(|| first.activate());
        scope.spawn(|| first.activate());
    });
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[rstest]
fn unconfirmed_activation_returns_after_its_bound(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            while let Some(message) = end.recv() {
                if let HostMessage::Search { id, .. } = message {
                    end.send(&UnitMessage::Results {
                        id,
                        results: vec![wire_result("silent", 1.0, id, 0)],
                    });
                }
            }
        });
    let source = harness.source(short(1000));
    source.init().expect("unit ready");

    let results = source.search("x");
    let started = Instant::now();
    results.first().expect("one result").activate();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[rstest]
fn copy_requests_reach_host_services(harness: Harness) {
    harness
        .launcher
        .register(CALC, calc_metadata(), |mut end: UnitEnd| {
            end.ready(&calc_metadata());
            end.send(&UnitMessage::Copy {
                text: "42".into(),
            });
            end.send(&UnitMessage::Log {
                level: LogLevel::Info,
                message: "copied".into(),
            });
            while let Some(HostMessage::Search { id, .. }) = end.recv() {
                end.send(&UnitMessage::Results {
                    id,
                    results: Vec::new(),
                });
            }
        });
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");

    // Results follow the copy on the same stream, so it has been dispatched.
    source.search("sync");
    assert_eq!(
        *lock(&harness.services.copies),
        [("calc".to_owned(), "42".to_owned())]
    );
}

#[rstest]
fn dropping_the_source_terminates_the_unit(harness: Harness) {
    echo(&harness);
    let source = harness.source(PluginTimeouts::default());
    source.init().expect("unit ready");
    assert!(!harness.launcher.all_terminated());

    drop(source);
    assert!(harness.launcher.all_terminated());
}
