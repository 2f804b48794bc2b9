// toolgate-core/src/core/approvals.rs
// ============================================================================
// Module: ToolGate Approval Records
// Description: Approval requests, decisions, and eligibility computation.
// Purpose: Share one eligibility and expiry policy across storage backends.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Approval requests are created PENDING with a computed expiry and a
//! precomputed auto-approve eligibility. Eligibility never survives an L4
//! trust level or a non-PASS reviewer verdict, and the deny set overrides the
//! allow set. Backends call into these helpers so the in-memory and durable
//! stores cannot drift.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::RunId;
use crate::core::taxonomy::ApprovalStatus;
use crate::core::taxonomy::DecisionKind;
use crate::core::taxonomy::ReviewerVerdict;
use crate::core::taxonomy::TrustLevel;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default request lifetime in seconds for trust levels at or below L3.
pub const DEFAULT_EXPIRY_SECONDS: i64 = 3_600;
/// Request lifetime in seconds for L4 requests.
pub const CRITICAL_EXPIRY_SECONDS: i64 = 86_400;
/// Identity recorded on decisions produced by the auto-approval path.
pub const AUTO_APPROVER: &str = "system:auto-approve";

/// Action types and workflow names never auto-approved.
pub const AUTO_APPROVE_DENY: [&str; 4] = [
    "send_invoice",
    "mark_checkpoint_complete",
    "billing_reconciliation",
    "compliance_audit_pack",
];

/// Action types and workflow names eligible for auto-approval.
pub const AUTO_APPROVE_ALLOW: [&str; 5] = [
    "post_alert",
    "publish_daily_brief",
    "apply_changes",
    "daily_ops_brief",
    "alert_triage",
];

/// Returns the default expiry horizon for a trust level.
#[must_use]
pub const fn default_expiry_seconds(trust_level: TrustLevel) -> i64 {
    match trust_level {
        TrustLevel::L4 => CRITICAL_EXPIRY_SECONDS,
        _ => DEFAULT_EXPIRY_SECONDS,
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Approval input validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalValidationError {
    /// A required field is missing or empty.
    #[error("fail-closed: {0}: missing or empty")]
    MissingField(&'static str),
}

// ============================================================================
// SECTION: Request Creation Input
// ============================================================================

/// Input for creating an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    /// Domain owning the run.
    pub domain: String,
    /// Run the request belongs to.
    pub run_id: RunId,
    /// Workflow name.
    pub workflow_name: String,
    /// Requesting agent name.
    pub requested_by: String,
    /// Trust level of the gated action.
    pub trust_level: TrustLevel,
    /// Action type string.
    pub action_type: String,
    /// Opaque action payload.
    pub action_payload: Value,
    /// Free-form context.
    pub context: Value,
    /// Reviewer verdict captured so far.
    pub reviewer_verdict: Option<ReviewerVerdict>,
    /// Reviewer notes captured so far.
    pub reviewer_notes: Option<String>,
    /// Override for the expiry horizon in seconds.
    pub expires_in_seconds: Option<i64>,
}

impl NewApprovalRequest {
    /// Validates the creation input.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalValidationError`] when an identity field is empty.
    pub fn validate(&self) -> Result<(), ApprovalValidationError> {
        if self.domain.is_empty() {
            return Err(ApprovalValidationError::MissingField("domain"));
        }
        if self.run_id.is_empty() {
            return Err(ApprovalValidationError::MissingField("run_id"));
        }
        if self.workflow_name.is_empty() {
            return Err(ApprovalValidationError::MissingField("workflow_name"));
        }
        if self.requested_by.is_empty() {
            return Err(ApprovalValidationError::MissingField("requested_by"));
        }
        if self.action_type.is_empty() {
            return Err(ApprovalValidationError::MissingField("action_type"));
        }
        Ok(())
    }

    /// Materializes a PENDING request with computed expiry and eligibility.
    #[must_use]
    pub fn into_request(self, now: Timestamp) -> ApprovalRequest {
        let horizon = self
            .expires_in_seconds
            .unwrap_or_else(|| default_expiry_seconds(self.trust_level));
        let eligibility = compute_auto_approve_eligibility(
            self.trust_level,
            self.reviewer_verdict,
            &self.action_type,
            &self.workflow_name,
        );
        ApprovalRequest {
            id: RequestId::generate(),
            created_at: now,
            domain: self.domain,
            run_id: self.run_id,
            workflow_name: self.workflow_name,
            requested_by: self.requested_by,
            trust_level: self.trust_level,
            action_type: self.action_type,
            action_payload: self.action_payload,
            context: self.context,
            reviewer_verdict: self.reviewer_verdict,
            reviewer_notes: self.reviewer_notes,
            status: ApprovalStatus::Pending,
            expires_at: now.plus_seconds(horizon),
            auto_approve_eligible: eligibility.eligible,
            auto_approve_reason: eligibility.reason,
        }
    }
}

// ============================================================================
// SECTION: Approval Request
// ============================================================================

/// Persisted approval request.
///
/// # Invariants
/// - `trust_level = L4` implies `auto_approve_eligible = false`.
/// - Status transitions are `PENDING -> {APPROVED, REJECTED, EXPIRED}` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Domain owning the run.
    pub domain: String,
    /// Run the request belongs to.
    pub run_id: RunId,
    /// Workflow name.
    pub workflow_name: String,
    /// Requesting agent name.
    pub requested_by: String,
    /// Trust level of the gated action.
    pub trust_level: TrustLevel,
    /// Action type string.
    pub action_type: String,
    /// Opaque action payload.
    pub action_payload: Value,
    /// Free-form context.
    pub context: Value,
    /// Reviewer verdict captured at creation.
    pub reviewer_verdict: Option<ReviewerVerdict>,
    /// Reviewer notes captured at creation.
    pub reviewer_notes: Option<String>,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Whether the auto-approval path may decide this request.
    pub auto_approve_eligible: bool,
    /// Reason recorded for the eligibility outcome.
    pub auto_approve_reason: Option<String>,
}

impl ApprovalRequest {
    /// Returns true when the request has passed its expiry.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.is_at_or_after(self.expires_at)
    }
}

// ============================================================================
// SECTION: Approval Decision
// ============================================================================

/// Persisted approval decision.
///
/// # Invariants
/// - At most one decision exists per request (uniqueness on request id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Decision identifier.
    pub id: DecisionId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Decided request.
    pub request_id: RequestId,
    /// Human identifier or [`AUTO_APPROVER`].
    pub decided_by: String,
    /// Decision kind.
    pub decision: DecisionKind,
    /// Optional notes.
    pub notes: Option<String>,
    /// Opaque metadata.
    pub metadata: Value,
}

// ============================================================================
// SECTION: Pending Filter
// ============================================================================

/// Filter for pending-request queries. Fields are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingFilter {
    /// Match a domain.
    pub domain: Option<String>,
    /// Match a workflow name.
    pub workflow_name: Option<String>,
    /// Match a trust level.
    pub trust_level: Option<TrustLevel>,
}

impl PendingFilter {
    /// Returns true when the request satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        if let Some(domain) = &self.domain {
            if &request.domain != domain {
                return false;
            }
        }
        if let Some(workflow_name) = &self.workflow_name {
            if &request.workflow_name != workflow_name {
                return false;
            }
        }
        if let Some(trust_level) = self.trust_level {
            if request.trust_level != trust_level {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// SECTION: Auto-Approve Eligibility
// ============================================================================

/// Eligibility outcome with the recorded reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApproveEligibility {
    /// Whether the auto-approval path may decide the request.
    pub eligible: bool,
    /// Reason recorded alongside the outcome.
    pub reason: Option<String>,
}

/// Computes auto-approve eligibility at request creation.
///
/// L4 is never eligible. A non-PASS reviewer verdict is never eligible. The
/// deny set overrides the allow set; anything outside both sets is ineligible.
#[must_use]
pub fn compute_auto_approve_eligibility(
    trust_level: TrustLevel,
    reviewer_verdict: Option<ReviewerVerdict>,
    action_type: &str,
    workflow_name: &str,
) -> AutoApproveEligibility {
    if trust_level == TrustLevel::L4 {
        return AutoApproveEligibility {
            eligible: false,
            reason: Some("L4 requires human approval".to_string()),
        };
    }
    if reviewer_verdict != Some(ReviewerVerdict::Pass) {
        return AutoApproveEligibility {
            eligible: false,
            reason: Some("reviewer verdict is not PASS".to_string()),
        };
    }
    let denied = AUTO_APPROVE_DENY
        .iter()
        .any(|entry| *entry == action_type || *entry == workflow_name);
    if denied {
        return AutoApproveEligibility {
            eligible: false,
            reason: Some(format!("action `{action_type}` is deny-listed")),
        };
    }
    let allowed = AUTO_APPROVE_ALLOW
        .iter()
        .any(|entry| *entry == action_type || *entry == workflow_name);
    if allowed {
        return AutoApproveEligibility {
            eligible: true,
            reason: Some(format!("action `{action_type}` is allow-listed")),
        };
    }
    AutoApproveEligibility {
        eligible: false,
        reason: Some(format!("action `{action_type}` is not allow-listed")),
    }
}

/// Returns the first auto-approval gate the request fails, if any.
///
/// Gates run in order: trust level below L4, status PENDING, eligibility flag,
/// reviewer verdict PASS, not expired. Backends call this after confirming the
/// request exists (gate one).
#[must_use]
pub fn auto_approve_blocker(request: &ApprovalRequest, now: Timestamp) -> Option<&'static str> {
    if request.trust_level == TrustLevel::L4 {
        return Some("trust level L4 requires human approval");
    }
    if request.status != ApprovalStatus::Pending {
        return Some("request is not pending");
    }
    if !request.auto_approve_eligible {
        return Some("request is not auto-approve eligible");
    }
    if request.reviewer_verdict != Some(ReviewerVerdict::Pass) {
        return Some("reviewer verdict is not PASS");
    }
    if request.is_expired(now) {
        return Some("request has expired");
    }
    None
}
