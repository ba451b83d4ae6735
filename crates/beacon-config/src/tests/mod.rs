//! Unit tests for configuration defaults and derived values.

use std::time::Duration;

use rstest::rstest;

use super::*;

#[test]
fn defaults_match_the_documented_values() {
    let config = Config::default();
    assert_eq!(config.log_filter(), "info");
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert!(config.remote_runner().is_none());
    assert_eq!(config.plugin_timeouts(), PluginTimeouts::default());
    assert_eq!(config.network_debounce(), Duration::from_millis(500));
}

#[test]
fn registry_lives_in_a_beacon_directory() {
    let path = default_registry_path();
    assert!(path.ends_with("beacon/plugins.json"), "{}", path.display());
}

#[test]
fn cage_program_is_named_after_the_trampoline() {
    assert_eq!(
        default_cage_program().file_name().and_then(|name| name.to_str()),
        Some(CAGE_PROGRAM_NAME)
    );
}

#[test]
fn timeouts_are_converted_per_call() {
    let config = Config {
        probe_timeout_ms: 10,
        init_timeout_ms: 20,
        search_timeout_ms: 30,
        activate_timeout_ms: 40,
        ..Config::default()
    };
    let timeouts = config.plugin_timeouts();
    assert_eq!(timeouts.probe, Duration::from_millis(10));
    assert_eq!(timeouts.init, Duration::from_millis(20));
    assert_eq!(timeouts.search, Duration::from_millis(30));
    assert_eq!(timeouts.activate, Duration::from_millis(40));
}

#[rstest]
#[case::json("json", LogFormat::Json)]
#[case::compact("compact", LogFormat::Compact)]
#[case::mixed_case("JSON", LogFormat::Json)]
fn log_formats_parse_case_insensitively(#[case] raw: &str, #[case] expected: LogFormat) {
    assert_eq!(raw.parse::<LogFormat>().expect("format"), expected);
}

#[test]
fn unknown_log_formats_are_rejected() {
    assert!("pretty".parse::<LogFormat>().is_err());
}
