//! Unit tests for sandbox profile builders.

use std::path::PathBuf;

use crate::profile::{EnvironmentPolicy, NetworkPolicy, SandboxProfile};

#[test]
fn profile_whitelists_linux_runtime_roots() {
    let profile = SandboxProfile::new();
    if cfg!(target_os = "linux") {
        assert!(
            !profile.read_only_paths().is_empty(),
            "linux runtime roots should be whitelisted by default"
        );
    } else {
        assert!(profile.read_only_paths().is_empty());
    }
}

#[test]
fn environment_allowlist_deduplicates_entries() {
    let profile = SandboxProfile::new()
        .allow_environment_variable("KEEP_ME")
        .allow_environment_variable("KEEP_ME");

    match profile.environment_policy() {
        EnvironmentPolicy::AllowList(keys) => {
            assert_eq!(keys.len(), 1);
            assert!(keys.contains("KEEP_ME"));
        }
        other => panic!("unexpected environment policy: {other:?}"),
    }
}

#[test]
fn full_environment_absorbs_later_allowlist_entries() {
    let profile = SandboxProfile::new()
        .allow_full_environment()
        .allow_environment_variable("HOME");
    assert_eq!(profile.environment_policy(), &EnvironmentPolicy::InheritAll);
}

#[test]
fn network_is_denied_until_allowed() {
    let profile = SandboxProfile::new();
    assert_eq!(profile.network_policy(), NetworkPolicy::Deny);
    assert_eq!(profile.allow_networking().network_policy(), NetworkPolicy::Allow);
}

#[test]
fn read_and_write_paths_are_recorded_separately() {
    let profile = SandboxProfile::new()
        .allow_read_path(PathBuf::from("/srv/data"))
        .allow_read_write_path(PathBuf::from("/var/tmp"));

    assert!(profile.read_only_paths().contains(&PathBuf::from("/srv/data")));
    assert_eq!(profile.read_write_paths(), [PathBuf::from("/var/tmp")]);
}

#[test]
fn repeated_path_grants_are_recorded_once() {
    let profile = SandboxProfile::new()
        .allow_read_write_path("/var/tmp")
        .allow_read_write_path("/var/tmp")
        .allow_executable("/usr/bin/env")
        .allow_executable("/usr/bin/env");

    assert_eq!(profile.read_write_paths(), [PathBuf::from("/var/tmp")]);
    assert_eq!(profile.executable_paths(), [PathBuf::from("/usr/bin/env")]);
}
