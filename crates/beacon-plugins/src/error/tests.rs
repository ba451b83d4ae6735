//! Unit tests for plugin error types.

use std::io;
use std::time::Duration;

use rstest::rstest;

use super::*;

#[rstest]
#[case::load_timeout(
    PluginError::load_timeout("/opt/slow", Duration::from_secs(5)),
    "5000ms"
)]
#[case::search_timeout(
    PluginError::SearchTimeout {
        plugin: "snippets".into(),
        request_id: 7,
        timeout_ms: 250,
    },
    "search 7"
)]
#[case::metadata(PluginError::metadata("/opt/bad", "missing export"), "missing export")]
#[case::denied(
    PluginError::PermissionDenied {
        plugin: "snippets".into(),
    },
    "not granted"
)]
fn messages_carry_context(#[case] error: PluginError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(
        message.contains(expected),
        "expected '{expected}' in message: {message}"
    );
}

#[test]
fn io_errors_expose_their_source() {
    let error = PluginError::io("snippets", io::Error::other("pipe closed"));
    let source = std::error::Error::source(&error).expect("source present");
    assert!(source.to_string().contains("pipe closed"));
}

#[test]
fn protocol_errors_chain_the_decoding_failure() {
    let error = PluginError::Protocol {
        plugin: "snippets".into(),
        source: ProtocolError::Closed,
    };
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn millis_saturates() {
    assert_eq!(millis(Duration::MAX), u64::MAX);
    assert_eq!(millis(Duration::from_millis(42)), 42);
}
