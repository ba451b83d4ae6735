//! Unit tests for probing and the cage launcher.

use std::ffi::OsString;
use std::path::PathBuf;

use rstest::rstest;

use super::*;
use crate::protocol::{LogLevel, UnitMessage};
use crate::test_support::{UnitEnd, spawn_unit};

fn locator() -> PluginLocator {
    PluginLocator::parse("/opt/plugins/probe").expect("locator")
}

fn probe_with<F>(script: F, timeout: Duration) -> Result<PluginMetadata, PluginError>
where
    F: FnOnce(UnitEnd) + Send + 'static,
{
    let (channel, _) = spawn_unit(script).expect("pipes");
    await_declaration(&locator(), channel, timeout)
}

#[test]
fn ready_declaration_is_returned() {
    let declared = PluginMetadata::new("calc", "Calculator").with_trigger("=");
    let expected = declared.clone();
    let metadata = probe_with(
        move |mut end| {
            end.ready(&declared);
        },
        Duration::from_secs(2),
    )
    .expect("probe succeeds");
    assert_eq!(metadata, expected);
}

#[test]
fn probe_terminates_the_unit() {
    let (channel, termination) = spawn_unit(|mut end: UnitEnd| {
        end.ready(&PluginMetadata::new("calc", "Calculator"));
    })
    .expect("pipes");
    await_declaration(&locator(), channel, Duration::from_secs(2)).expect("probe succeeds");
    assert!(termination.observed());
}

#[test]
fn silent_unit_times_out() {
    let error = probe_with(|mut end| end.drain(), Duration::from_millis(50))
        .expect_err("no declaration");
    assert!(matches!(error, PluginError::LoadTimeout { .. }));
}

#[rstest]
#[case::exits_early(Box::new(|_end: UnitEnd| {}) as Box<dyn FnOnce(UnitEnd) + Send>)]
#[case::wrong_message(Box::new(|mut end: UnitEnd| {
    end.send(&UnitMessage::Log { level: LogLevel::Info, message: "hello".into() });
}))]
#[case::garbage(Box::new(|mut end: UnitEnd| {
    end.send_raw(b"plugin v1\n");
}))]
#[case::invalid_metadata(Box::new(|mut end: UnitEnd| {
    end.ready(&PluginMetadata::new("two words", "Bad"));
}))]
fn bad_declarations_are_metadata_errors(#[case] script: Box<dyn FnOnce(UnitEnd) + Send>) {
    let error = probe_with(script, Duration::from_secs(2)).expect_err("rejected");
    assert!(
        matches!(error, PluginError::Metadata { .. }),
        "unexpected error: {error}"
    );
}

#[test]
fn remote_locators_need_a_runner() {
    let launcher = CageLauncher::new("/usr/libexec/beacon-cage");
    let remote = PluginLocator::parse("https://example.com/plugin").expect("locator");
    let error = launcher.probe(&remote).expect_err("no runner");
    assert!(matches!(error, PluginError::Metadata { .. }));
}

#[rstest]
#[case("https://Example.com")]
#[case("jsr:@scope/plugin")]
fn remote_runners_receive_the_locator_verbatim(#[case] raw: &str) {
    let launcher = CageLauncher::new("/usr/libexec/beacon-cage")
        .with_remote_runner(Some(PathBuf::from("/usr/bin/beacon-remote")));
    let remote = PluginLocator::parse(raw).expect("locator");
    let (program, args) = launcher.unit_command(&remote).expect("runner configured");
    assert_eq!(program, PathBuf::from("/usr/bin/beacon-remote"));
    assert_eq!(args, [OsString::from(raw)]);
}

#[test]
fn missing_cage_is_a_spawn_error() {
    let launcher = CageLauncher::new("/nonexistent/beacon-cage");
    let error = launcher
        .launch(&locator(), &PluginPermissions::new())
        .err()
        .expect("spawn fails");
    assert!(matches!(error, PluginError::Spawn { .. }));
}
