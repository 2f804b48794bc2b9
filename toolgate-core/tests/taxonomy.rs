// toolgate-core/tests/taxonomy.rs
// ============================================================================
// Module: Taxonomy Tests
// Description: Ordering, parsing, and round-trip laws for the closed enums.
// ============================================================================
//! ## Overview
//! Validates the trust level total order, fail-closed parsing of unknown
//! values, and stable string round-trips.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use toolgate_core::ApprovalStatus;
use toolgate_core::Capability;
use toolgate_core::ChangeType;
use toolgate_core::DecisionKind;
use toolgate_core::ReviewerVerdict;
use toolgate_core::RiskLevel;
use toolgate_core::Stage;
use toolgate_core::Timestamp;
use toolgate_core::TrustLevel;

// ============================================================================
// SECTION: Trust Level Ordering
// ============================================================================

#[test]
fn trust_levels_are_totally_ordered() {
    let levels = TrustLevel::ALL;
    for window in levels.windows(2) {
        assert!(window[0] < window[1]);
    }
    assert!(TrustLevel::L0 < TrustLevel::L4);
}

#[test]
fn only_l4_requires_human_approval() {
    for level in TrustLevel::ALL {
        assert_eq!(level.requires_human_approval(), level == TrustLevel::L4);
    }
}

// ============================================================================
// SECTION: Round-Trips
// ============================================================================

#[test]
fn trust_level_string_round_trip() {
    for level in TrustLevel::ALL {
        assert_eq!(TrustLevel::parse(level.as_str()).unwrap(), level);
    }
}

#[test]
fn stage_string_round_trip() {
    for stage in Stage::ALL {
        assert_eq!(Stage::parse(stage.as_str()).unwrap(), stage);
    }
}

#[test]
fn capability_and_risk_round_trip() {
    for capability in [
        Capability::Read,
        Capability::Propose,
        Capability::Write,
        Capability::SideEffects,
    ] {
        assert_eq!(Capability::parse(capability.as_str()).unwrap(), capability);
    }
    for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
        assert_eq!(RiskLevel::parse(risk.as_str()).unwrap(), risk);
    }
}

#[test]
fn status_and_decision_round_trip() {
    for status in [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Expired,
    ] {
        assert_eq!(ApprovalStatus::parse(status.as_str()).unwrap(), status);
    }
    for decision in [DecisionKind::Approve, DecisionKind::Reject] {
        assert_eq!(DecisionKind::parse(decision.as_str()).unwrap(), decision);
    }
    for verdict in [ReviewerVerdict::Pass, ReviewerVerdict::Fail] {
        assert_eq!(ReviewerVerdict::parse(verdict.as_str()).unwrap(), verdict);
    }
    for change in [ChangeType::Create, ChangeType::Update, ChangeType::Delete] {
        assert_eq!(ChangeType::parse(change.as_str()).unwrap(), change);
    }
}

// ============================================================================
// SECTION: Fail-Closed Parsing
// ============================================================================

#[test]
fn unknown_values_are_rejected() {
    assert!(TrustLevel::parse("L5").is_err());
    assert!(TrustLevel::parse("l0").is_err());
    assert!(Stage::parse("deploy").is_err());
    assert!(Capability::parse("admin").is_err());
    assert!(ApprovalStatus::parse("pending").is_err());
    assert!(DecisionKind::parse("approve").is_err());
}

#[test]
fn parse_errors_name_the_field() {
    let error = TrustLevel::parse("L9").unwrap_err().to_string();
    assert!(error.starts_with("fail-closed: trust_level"));
    let error = Stage::parse("ship").unwrap_err().to_string();
    assert!(error.starts_with("fail-closed: stage"));
}

// ============================================================================
// SECTION: Decision Transitions
// ============================================================================

#[test]
fn decision_kinds_map_to_terminal_statuses() {
    assert_eq!(DecisionKind::Approve.resulting_status(), ApprovalStatus::Approved);
    assert_eq!(DecisionKind::Reject.resulting_status(), ApprovalStatus::Rejected);
    assert!(ApprovalStatus::Approved.is_terminal());
    assert!(!ApprovalStatus::Pending.is_terminal());
}

// ============================================================================
// SECTION: Timestamp Arithmetic
// ============================================================================

#[test]
fn timestamp_expiry_arithmetic_saturates() {
    let base = Timestamp::from_unix_millis(1_000);
    assert_eq!(base.plus_seconds(2).as_unix_millis(), 3_000);
    let max = Timestamp::from_unix_millis(i64::MAX);
    assert_eq!(max.plus_seconds(10).as_unix_millis(), i64::MAX);
    assert!(base.is_before(base.plus_seconds(1)));
    assert!(base.plus_seconds(1).is_at_or_after(base));
}
