// toolgate-core/tests/commit_boundary.rs
// ============================================================================
// Module: Commit Boundary Tests
// Description: Eligibility gates and commit execution with audit emission.
// Purpose: Ensure every gate fails closed with a reason naming the gate and
//          each execution emits exactly one commit audit event.
// Dependencies: toolgate-core
// ============================================================================
//! ## Overview
//! Walks the eight eligibility gates in order, then exercises the execute
//! path for allowed and blocked commits.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolgate_core::ApprovalStore;
use toolgate_core::AuditLog;
use toolgate_core::CallContext;
use toolgate_core::ChangeId;
use toolgate_core::ChangeType;
use toolgate_core::CommitAction;
use toolgate_core::CommitBoundary;
use toolgate_core::CommitRequest;
use toolgate_core::CommitTool;
use toolgate_core::DecisionKind;
use toolgate_core::EventFilter;
use toolgate_core::HandlerError;
use toolgate_core::InMemoryApprovalStore;
use toolgate_core::InMemoryAuditLog;
use toolgate_core::NewApprovalRequest;
use toolgate_core::NoopDiagnostics;
use toolgate_core::ReviewerVerdict;
use toolgate_core::RunId;
use toolgate_core::SandboxId;
use toolgate_core::SandboxRequest;
use toolgate_core::SandboxRun;
use toolgate_core::SandboxRunner;
use toolgate_core::Stage;
use toolgate_core::StagedChange;
use toolgate_core::Timestamp;
use toolgate_core::ToolHandler;
use toolgate_core::ToolName;
use toolgate_core::TrustLevel;

// ============================================================================
// SECTION: Mocks
// ============================================================================

/// Commit action that records invocations and succeeds.
struct RecordingAction {
    calls: Mutex<Vec<CommitRequest>>,
}

impl RecordingAction {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommitAction for RecordingAction {
    async fn execute(&self, request: &CommitRequest) -> Result<Value, HandlerError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(json!({"posted": true}))
    }
}

/// Sandbox stub exposing a fixed ledger.
struct LedgerStub {
    changes: Mutex<Vec<StagedChange>>,
}

impl LedgerStub {
    fn with_changes(changes: Vec<StagedChange>) -> Arc<Self> {
        Arc::new(Self {
            changes: Mutex::new(changes),
        })
    }
}

#[async_trait]
impl SandboxRunner for LedgerStub {
    async fn execute(
        &self,
        _request: SandboxRequest,
        _handler: Arc<dyn ToolHandler>,
        _ctx: &CallContext,
    ) -> SandboxRun {
        unreachable!("commit boundary never executes through the sandbox")
    }

    fn staged_changes(&self, _sandbox_id: &SandboxId) -> Vec<StagedChange> {
        self.changes.lock().unwrap().clone()
    }

    fn commit_changes(&self, _sandbox_id: &SandboxId) -> Vec<StagedChange> {
        std::mem::take(&mut *self.changes.lock().unwrap())
    }

    fn rollback_changes(&self, _sandbox_id: &SandboxId) -> usize {
        std::mem::take(&mut *self.changes.lock().unwrap()).len()
    }

    fn cleanup(&self, _sandbox_id: &SandboxId) {}
}

fn staged_change(sandbox: &str) -> StagedChange {
    StagedChange {
        id: ChangeId::generate(),
        sandbox_id: SandboxId::new(sandbox),
        tool_name: ToolName::new("asi.stage_booking_create"),
        change_type: ChangeType::Create,
        entity_type: "booking".to_string(),
        entity_id: Some("bk-100".to_string()),
        payload: json!({"guest": "A. Byrne"}),
        recorded_at: Timestamp::now(),
    }
}

fn approved_request(
    store: &InMemoryApprovalStore,
    run: &str,
    action_type: &str,
    trust_level: TrustLevel,
    sandbox: Option<&str>,
) {
    let request = store
        .create_request(NewApprovalRequest {
            domain: "asi".to_string(),
            run_id: RunId::new(run),
            workflow_name: "daily_ops_brief".to_string(),
            requested_by: "worker-1".to_string(),
            trust_level,
            action_type: action_type.to_string(),
            action_payload: json!({}),
            context: json!({"sandbox_id": sandbox}),
            reviewer_verdict: Some(ReviewerVerdict::Pass),
            reviewer_notes: None,
            expires_in_seconds: None,
        })
        .unwrap();
    store
        .create_decision(&request.id, "ops@example.com", DecisionKind::Approve, None, json!({}))
        .unwrap();
}

fn boundary(
    store: &InMemoryApprovalStore,
    audit: &InMemoryAuditLog,
    sandbox: Option<Arc<LedgerStub>>,
) -> CommitBoundary {
    CommitBoundary::new(
        Arc::new(store.clone()),
        sandbox.map(|stub| stub as Arc<dyn SandboxRunner>),
        Arc::new(audit.clone()),
        Arc::new(NoopDiagnostics),
    )
}

fn ctx(run: &str) -> CallContext {
    CallContext::new("asi", RunId::new(run), "daily_ops_brief", "worker-1", "commit")
}

// ============================================================================
// SECTION: Eligibility Gates
// ============================================================================

#[test]
fn gate_one_rejects_empty_inputs() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    let boundary = boundary(&store, &audit, None);
    let eligibility =
        boundary.verify_commit_eligibility(&RunId::new(""), &ToolName::new("asi.commit_post_alert"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("run_id"));
}

#[test]
fn gate_two_rejects_non_commit_tools() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    let boundary = boundary(&store, &audit, None);
    let eligibility =
        boundary.verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.get_bookings"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("not a commit tool"));
}

#[test]
fn gate_three_requires_a_matching_request() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    let boundary = boundary(&store, &audit, None);
    let eligibility = boundary
        .verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.commit_post_alert"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("no approval requests exist"));
}

#[test]
fn gate_four_requires_sufficient_trust_level() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "send_invoice", TrustLevel::L3, None);
    let boundary = boundary(&store, &audit, None);
    let eligibility = boundary
        .verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.commit_send_invoice"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("below required L4"));
}

#[test]
fn gate_five_requires_approved_status() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    store
        .create_request(NewApprovalRequest {
            domain: "asi".to_string(),
            run_id: RunId::new("run-1"),
            workflow_name: "daily_ops_brief".to_string(),
            requested_by: "worker-1".to_string(),
            trust_level: TrustLevel::L3,
            action_type: "post_alert".to_string(),
            action_payload: json!({}),
            context: json!({}),
            reviewer_verdict: Some(ReviewerVerdict::Pass),
            reviewer_notes: None,
            expires_in_seconds: None,
        })
        .unwrap();
    let boundary = boundary(&store, &audit, None);
    let eligibility = boundary
        .verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.commit_post_alert"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("has status PENDING"));
}

#[test]
fn gate_eight_requires_staged_changes_for_apply_changes() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "apply_changes", TrustLevel::L3, Some("sbx-1"));
    let empty_sandbox = LedgerStub::with_changes(Vec::new());
    let boundary = boundary(&store, &audit, Some(empty_sandbox));
    let eligibility = boundary
        .verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.commit_apply_changes"));
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.contains("no staged changes"));
}

#[test]
fn post_alert_skips_the_staged_change_gate() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "post_alert", TrustLevel::L3, None);
    let boundary = boundary(&store, &audit, None);
    let eligibility = boundary
        .verify_commit_eligibility(&RunId::new("run-1"), &ToolName::new("asi.commit_post_alert"));
    assert!(eligibility.eligible, "unexpected denial: {}", eligibility.reason);
}

// ============================================================================
// SECTION: Commit Execution
// ============================================================================

#[tokio::test]
async fn execute_commit_dispatches_and_audits_once() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "post_alert", TrustLevel::L3, None);
    let action = RecordingAction::new();
    let mut boundary = boundary(&store, &audit, None);
    boundary.register_action(CommitTool::PostAlert, Arc::clone(&action) as _);

    let outcome = boundary
        .execute_commit(
            &ToolName::new("asi.commit_post_alert"),
            &RunId::new("run-1"),
            json!({"message": "heads up"}),
            &ctx("run-1"),
        )
        .await;
    assert!(outcome.committed);
    assert_eq!(action.call_count(), 1);

    let events = audit
        .query(&EventFilter {
            run_id: Some(RunId::new("run-1")),
            stage: Some(Stage::Commit),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tool_name, Some(ToolName::new("asi.commit_post_alert")));
    assert!(events[0].errors.is_empty());
}

#[tokio::test]
async fn apply_changes_drains_the_ledger() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "apply_changes", TrustLevel::L3, Some("sbx-1"));
    let sandbox = LedgerStub::with_changes(vec![staged_change("sbx-1"), staged_change("sbx-1")]);
    let action = RecordingAction::new();
    let mut boundary = boundary(&store, &audit, Some(Arc::clone(&sandbox)));
    boundary.register_action(CommitTool::ApplyChanges, Arc::clone(&action) as _);

    let outcome = boundary
        .execute_commit(
            &ToolName::new("asi.commit_apply_changes"),
            &RunId::new("run-1"),
            json!({}),
            &ctx("run-1"),
        )
        .await;
    assert!(outcome.committed);
    assert_eq!(outcome.changes_applied, 2);
    assert!(sandbox.staged_changes(&SandboxId::new("sbx-1")).is_empty());
}

#[tokio::test]
async fn blocked_commit_audits_the_denial() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    let boundary = boundary(&store, &audit, None);

    let outcome = boundary
        .execute_commit(
            &ToolName::new("asi.commit_post_alert"),
            &RunId::new("run-1"),
            json!({}),
            &ctx("run-1"),
        )
        .await;
    assert!(!outcome.committed);
    assert!(outcome.error.as_deref().unwrap().starts_with("fail-closed:"));

    let events = audit.query(&EventFilter::default()).unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].errors.is_empty());
}

#[tokio::test]
async fn missing_action_handler_blocks_the_commit() {
    let store = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    approved_request(&store, "run-1", "post_alert", TrustLevel::L3, None);
    let boundary = boundary(&store, &audit, None);

    let outcome = boundary
        .execute_commit(
            &ToolName::new("asi.commit_post_alert"),
            &RunId::new("run-1"),
            json!({}),
            &ctx("run-1"),
        )
        .await;
    assert!(!outcome.committed);
    assert!(outcome.error.as_deref().unwrap().contains("no handler registered"));
}
