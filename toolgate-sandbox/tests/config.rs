// toolgate-sandbox/tests/config.rs
// ============================================================================
// Module: Sandbox Config Tests
// Description: Blocklist enforcement, validation, and isolation selection.
// ============================================================================
//! ## Overview
//! Validates the credential blocklist, startup-time configuration failures,
//! and the environment-to-isolation mapping.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use toolgate_sandbox::HostEnv;
use toolgate_sandbox::IsolationChoice;
use toolgate_sandbox::SandboxConfig;
use toolgate_sandbox::SandboxConfigError;
use toolgate_sandbox::SandboxEnvironment;
use toolgate_sandbox::blocked_env_var;
use toolgate_sandbox::choose_isolation;

// ============================================================================
// SECTION: Blocklist
// ============================================================================

#[test]
fn substring_markers_are_blocked() {
    assert!(blocked_env_var("MY_SECRET"));
    assert!(blocked_env_var("db_password"));
    assert!(blocked_env_var("TLS_PRIVATE_KEY_PATH"));
}

#[test]
fn known_credential_names_are_blocked() {
    assert!(blocked_env_var("OPENAI_API_KEY"));
    assert!(blocked_env_var("aws_access_key_id"));
    assert!(blocked_env_var("STRIPE_API_KEY"));
    assert!(blocked_env_var("SLACK_BOT_TOKEN"));
    assert!(blocked_env_var("DATABASE_URL"));
}

#[test]
fn ordinary_names_are_not_blocked() {
    assert!(!blocked_env_var("PATH"));
    assert!(!blocked_env_var("HOME"));
    assert!(!blocked_env_var("TOOLGATE_ENV"));
}

// ============================================================================
// SECTION: Config Validation
// ============================================================================

#[test]
fn blocked_env_in_config_is_a_startup_failure() {
    let mut config = SandboxConfig::default();
    config.env.insert("STRIPE_API_KEY".to_string(), "sk_test".to_string());
    assert!(matches!(
        config.validate().unwrap_err(),
        SandboxConfigError::BlockedEnvVar(_)
    ));
}

#[test]
fn malformed_allowlist_entries_are_rejected() {
    let mut config = SandboxConfig::default();
    config.network_allowlist.push("https://api.example.com/path".to_string());
    assert!(matches!(
        config.validate().unwrap_err(),
        SandboxConfigError::InvalidAllowlistEntry(_)
    ));
}

#[test]
fn host_port_allowlist_entries_are_accepted() {
    let mut config = SandboxConfig::default();
    config.network_allowlist.push("api.example.com:443".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn direct_fallback_is_forbidden_in_production() {
    let config = SandboxConfig {
        allow_direct_fallback: true,
        production: true,
        ..SandboxConfig::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        SandboxConfigError::DirectFallbackInProduction
    ));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut config = SandboxConfig::default();
    config.limits.timeout_ms = 0;
    assert!(matches!(config.validate().unwrap_err(), SandboxConfigError::InvalidTimeout));
}

// ============================================================================
// SECTION: Isolation Selection
// ============================================================================

fn environment(host_env: Option<HostEnv>, sandbox_enabled: bool, fail_closed: bool) -> SandboxEnvironment {
    SandboxEnvironment {
        host_env,
        sandbox_enabled,
        fail_closed,
    }
}

#[test]
fn test_environment_selects_passthrough() {
    let (choice, warning) = choose_isolation(&environment(Some(HostEnv::Test), false, false));
    assert_eq!(choice, IsolationChoice::Passthrough);
    assert!(warning.is_none());
}

#[test]
fn development_without_sandbox_flag_warns_and_passes_through() {
    let (choice, warning) =
        choose_isolation(&environment(Some(HostEnv::Development), false, false));
    assert_eq!(choice, IsolationChoice::Passthrough);
    assert!(warning.is_some());
}

#[test]
fn development_with_sandbox_flag_uses_the_container() {
    let (choice, _) = choose_isolation(&environment(Some(HostEnv::Development), true, false));
    assert_eq!(choice, IsolationChoice::Container);
}

#[test]
fn production_always_uses_the_container() {
    let (choice, warning) = choose_isolation(&environment(Some(HostEnv::Production), false, false));
    assert_eq!(choice, IsolationChoice::Container);
    assert!(warning.is_none());
}

#[test]
fn fail_closed_flag_forces_the_container() {
    let (choice, _) = choose_isolation(&environment(Some(HostEnv::Test), false, true));
    assert_eq!(choice, IsolationChoice::Container);
}

#[test]
fn unrecognized_environment_denies() {
    let (choice, warning) = choose_isolation(&environment(None, true, false));
    assert_eq!(choice, IsolationChoice::Deny);
    assert!(warning.is_some());
}
