// toolgate-core/tests/approval_store.rs
// ============================================================================
// Module: Approval Store Tests
// Description: Eligibility, expiry, decision uniqueness, and auto-approval
//              gates over the in-memory store.
// Purpose: Ensure the approval lifecycle fails closed at every step.
// Dependencies: toolgate-core
// ============================================================================
//! ## Overview
//! Validates request creation with computed eligibility, pending-query
//! expiry boundaries, single-decision enforcement, the six auto-approval
//! gates, and the idempotent sweep.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use serde_json::json;
use toolgate_core::ApprovalQueries;
use toolgate_core::ApprovalStore;
use toolgate_core::ApprovalStoreError;
use toolgate_core::ApprovalStatus;
use toolgate_core::DecisionKind;
use toolgate_core::InMemoryApprovalStore;
use toolgate_core::NewApprovalRequest;
use toolgate_core::PendingFilter;
use toolgate_core::ReviewerVerdict;
use toolgate_core::RunId;
use toolgate_core::TrustLevel;
use toolgate_core::approvals::AUTO_APPROVER;
use toolgate_core::approvals::compute_auto_approve_eligibility;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn request(action_type: &str, trust_level: TrustLevel) -> NewApprovalRequest {
    NewApprovalRequest {
        domain: "asi".to_string(),
        run_id: RunId::new("run-approvals"),
        workflow_name: "daily_ops_brief".to_string(),
        requested_by: "worker-1".to_string(),
        trust_level,
        action_type: action_type.to_string(),
        action_payload: json!({"channel": "#ops"}),
        context: json!({}),
        reviewer_verdict: Some(ReviewerVerdict::Pass),
        reviewer_notes: Some("VERDICT: PASS".to_string()),
        expires_in_seconds: None,
    }
}

// ============================================================================
// SECTION: Eligibility Computation
// ============================================================================

#[test]
fn l4_is_never_eligible() {
    let eligibility = compute_auto_approve_eligibility(
        TrustLevel::L4,
        Some(ReviewerVerdict::Pass),
        "post_alert",
        "daily_ops_brief",
    );
    assert!(!eligibility.eligible);
}

#[test]
fn non_pass_verdict_is_never_eligible() {
    for verdict in [None, Some(ReviewerVerdict::Fail)] {
        let eligibility = compute_auto_approve_eligibility(
            TrustLevel::L3,
            verdict,
            "post_alert",
            "daily_ops_brief",
        );
        assert!(!eligibility.eligible);
    }
}

#[test]
fn deny_set_overrides_everything() {
    for action in ["send_invoice", "mark_checkpoint_complete", "billing_reconciliation"] {
        let eligibility = compute_auto_approve_eligibility(
            TrustLevel::L3,
            Some(ReviewerVerdict::Pass),
            action,
            "daily_ops_brief",
        );
        assert!(!eligibility.eligible, "`{action}` must never be eligible");
    }
}

#[test]
fn allow_set_grants_eligibility() {
    for action in ["post_alert", "publish_daily_brief", "apply_changes"] {
        let eligibility = compute_auto_approve_eligibility(
            TrustLevel::L3,
            Some(ReviewerVerdict::Pass),
            action,
            "custom_workflow",
        );
        assert!(eligibility.eligible, "`{action}` should be eligible");
    }
}

#[test]
fn unlisted_actions_are_not_eligible() {
    let eligibility = compute_auto_approve_eligibility(
        TrustLevel::L3,
        Some(ReviewerVerdict::Pass),
        "rotate_keys",
        "custom_workflow",
    );
    assert!(!eligibility.eligible);
}

// ============================================================================
// SECTION: Creation and Expiry
// ============================================================================

#[test]
fn creation_computes_expiry_by_trust_level() {
    let store = InMemoryApprovalStore::new();
    let l3 = store.create_request(request("post_alert", TrustLevel::L3)).unwrap();
    let l4 = store.create_request(request("send_invoice", TrustLevel::L4)).unwrap();
    let l3_horizon = l3.expires_at.as_unix_millis() - l3.created_at.as_unix_millis();
    let l4_horizon = l4.expires_at.as_unix_millis() - l4.created_at.as_unix_millis();
    assert_eq!(l3_horizon, 3_600 * 1_000);
    assert_eq!(l4_horizon, 86_400 * 1_000);
}

#[test]
fn creation_rejects_empty_fields() {
    let store = InMemoryApprovalStore::new();
    let mut bad = request("post_alert", TrustLevel::L3);
    bad.requested_by = String::new();
    let error = store.create_request(bad).unwrap_err();
    assert!(error.to_string().contains("fail-closed"));
}

#[test]
fn pending_queries_exclude_expired_rows() {
    let store = InMemoryApprovalStore::new();
    let mut expired = request("post_alert", TrustLevel::L3);
    expired.expires_in_seconds = Some(0);
    store.create_request(expired).unwrap();
    let live = store.create_request(request("publish_daily_brief", TrustLevel::L3)).unwrap();

    let pending = store.pending_requests(&PendingFilter::default()).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, live.id);
    assert!(store.is_pending(&live.id).unwrap());
}

#[test]
fn expire_stale_is_idempotent() {
    let store = InMemoryApprovalStore::new();
    let mut stale = request("post_alert", TrustLevel::L3);
    stale.expires_in_seconds = Some(0);
    let stale = store.create_request(stale).unwrap();

    assert_eq!(store.expire_stale().unwrap(), 1);
    assert_eq!(store.expire_stale().unwrap(), 0);
    let swept = store.request(&stale.id).unwrap().unwrap();
    assert_eq!(swept.status, ApprovalStatus::Expired);
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

#[test]
fn decision_transitions_request_status() {
    let store = InMemoryApprovalStore::new();
    let created = store.create_request(request("post_alert", TrustLevel::L3)).unwrap();
    store
        .create_decision(&created.id, "ops@example.com", DecisionKind::Approve, None, json!({}))
        .unwrap();
    assert!(store.is_approved(&created.id).unwrap());
    assert_eq!(
        store.request(&created.id).unwrap().unwrap().status,
        ApprovalStatus::Approved
    );
}

#[test]
fn second_decision_is_rejected_as_already_decided() {
    let store = InMemoryApprovalStore::new();
    let created = store.create_request(request("post_alert", TrustLevel::L3)).unwrap();
    store
        .create_decision(&created.id, "ops@example.com", DecisionKind::Approve, None, json!({}))
        .unwrap();

    let error = store
        .create_decision(&created.id, "ops@example.com", DecisionKind::Approve, None, json!({}))
        .unwrap_err();
    assert!(matches!(error, ApprovalStoreError::AlreadyDecided(_)));
    assert!(store.is_approved(&created.id).unwrap());
    assert!(store.decision_for(&created.id).unwrap().is_some());
}

#[test]
fn decision_on_unknown_request_is_not_found() {
    let store = InMemoryApprovalStore::new();
    let error = store
        .create_decision(
            &"missing".into(),
            "ops@example.com",
            DecisionKind::Approve,
            None,
            json!({}),
        )
        .unwrap_err();
    assert!(matches!(error, ApprovalStoreError::NotFound(_)));
}

#[test]
fn decision_on_expired_request_is_refused() {
    let store = InMemoryApprovalStore::new();
    let mut stale = request("post_alert", TrustLevel::L3);
    stale.expires_in_seconds = Some(0);
    let stale = store.create_request(stale).unwrap();
    let error = store
        .create_decision(&stale.id, "ops@example.com", DecisionKind::Approve, None, json!({}))
        .unwrap_err();
    assert!(matches!(error, ApprovalStoreError::Expired(_)));
}

// ============================================================================
// SECTION: Auto-Approval
// ============================================================================

#[test]
fn auto_approve_produces_system_decision() {
    let store = InMemoryApprovalStore::new();
    let created = store.create_request(request("post_alert", TrustLevel::L3)).unwrap();
    assert!(created.auto_approve_eligible);

    let decision = store.auto_approve(&created.id).unwrap().unwrap();
    assert_eq!(decision.decided_by, AUTO_APPROVER);
    assert_eq!(decision.decision, DecisionKind::Approve);
    assert!(store.is_approved(&created.id).unwrap());
}

#[test]
fn auto_approve_refuses_ineligible_requests() {
    let store = InMemoryApprovalStore::new();
    let created = store.create_request(request("send_invoice", TrustLevel::L4)).unwrap();
    assert!(!created.auto_approve_eligible);
    assert!(store.auto_approve(&created.id).unwrap().is_none());
    assert!(!store.is_approved(&created.id).unwrap());
}

#[test]
fn auto_approve_on_expired_request_produces_no_decision() {
    let store = InMemoryApprovalStore::new();
    let mut stale = request("post_alert", TrustLevel::L3);
    stale.expires_in_seconds = Some(0);
    let stale = store.create_request(stale).unwrap();
    assert!(store.auto_approve(&stale.id).unwrap().is_none());
}

#[test]
fn auto_approve_on_unknown_request_produces_no_decision() {
    let store = InMemoryApprovalStore::new();
    assert!(store.auto_approve(&"missing".into()).unwrap().is_none());
}

#[test]
fn auto_approve_after_decision_produces_no_decision() {
    let store = InMemoryApprovalStore::new();
    let created = store.create_request(request("post_alert", TrustLevel::L3)).unwrap();
    store
        .create_decision(&created.id, "ops@example.com", DecisionKind::Reject, None, json!({}))
        .unwrap();
    assert!(store.auto_approve(&created.id).unwrap().is_none());
    assert_eq!(
        store.request(&created.id).unwrap().unwrap().status,
        ApprovalStatus::Rejected
    );
}
