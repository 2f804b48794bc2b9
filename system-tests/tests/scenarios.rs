// system-tests/tests/scenarios.rs
// ============================================================================
// Module: End-to-End Scenarios
// Description: Full-pipeline scenarios from read-only planning to gated
//              commits, auto-approval, reviewer blocks, and sandbox denials.
// Purpose: Exercise the gate, router, approval store, commit boundary,
//          sandbox, and orchestrator together.
// Dependencies: system-tests helpers, toolgate-core, toolgate-sandbox
// ============================================================================
//! ## Overview
//! Each scenario wires a complete pipeline and asserts on the externally
//! observable trail: handler invocations, approval rows, decisions, and
//! audit events.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;

use serde_json::json;
use system_tests::CountingCommitAction;
use system_tests::CountingHandler;
use system_tests::ScriptedModel;
use system_tests::call_turn;
use system_tests::text_turn;
use system_tests::tool_def;
use system_tests::workflow_def;
use toolgate_core::AgentModel;
use toolgate_core::ApprovalQueries;
use toolgate_core::ApprovalStore;
use toolgate_core::AuditLog;
use toolgate_core::CallContext;
use toolgate_core::Capability;
use toolgate_core::CommitBoundary;
use toolgate_core::CommitTool;
use toolgate_core::EventFilter;
use toolgate_core::ExecutionMode;
use toolgate_core::InMemoryApprovalStore;
use toolgate_core::InMemoryAuditLog;
use toolgate_core::NoopDiagnostics;
use toolgate_core::ReviewerVerdict;
use toolgate_core::RiskLevel;
use toolgate_core::RunId;
use toolgate_core::RunStatus;
use toolgate_core::SandboxRunner;
use toolgate_core::Stage;
use toolgate_core::ToolCallRequest;
use toolgate_core::ToolName;
use toolgate_core::ToolRouter;
use toolgate_core::ToolRouterConfig;
use toolgate_core::TrustGate;
use toolgate_core::TrustLevel;
use toolgate_core::WorkflowOrchestrator;
use toolgate_core::approvals::AUTO_APPROVER;
use toolgate_sandbox::ContainerIsolation;
use toolgate_sandbox::SandboxConfig;
use toolgate_sandbox::SandboxExecutor;

// ============================================================================
// SECTION: Pipeline Fixture
// ============================================================================

struct Pipeline {
    approvals: InMemoryApprovalStore,
    audit: InMemoryAuditLog,
    router: Arc<ToolRouter>,
    commit_action: Arc<CountingCommitAction>,
    read_handler: Arc<CountingHandler>,
    commit_handler: Arc<CountingHandler>,
}

/// Wires a router with the standard scenario tools and a commit boundary.
fn pipeline(sandbox: Option<Arc<dyn SandboxRunner>>) -> Pipeline {
    let approvals = InMemoryApprovalStore::new();
    let audit = InMemoryAuditLog::new();
    let commit_action = CountingCommitAction::new();

    let mut boundary = CommitBoundary::new(
        Arc::new(approvals.clone()),
        sandbox.clone(),
        Arc::new(audit.clone()),
        Arc::new(NoopDiagnostics),
    );
    boundary.register_action(CommitTool::PostAlert, Arc::clone(&commit_action) as _);
    boundary.register_action(CommitTool::SendInvoice, Arc::clone(&commit_action) as _);

    let mut router = ToolRouter::new(ToolRouterConfig {
        gate: TrustGate::default(),
        audit: Arc::new(audit.clone()),
        approvals: Some(Arc::new(approvals.clone())),
        sandbox,
        commit: Some(Arc::new(boundary)),
        diagnostics: Arc::new(NoopDiagnostics),
    });

    let read_handler = CountingHandler::new();
    router
        .register(
            tool_def("asi.get_bookings", Capability::Read, RiskLevel::Low, ExecutionMode::Direct),
            Arc::clone(&read_handler) as _,
        )
        .unwrap();
    let commit_handler = CountingHandler::new();
    router
        .register(
            tool_def(
                "asi.commit_post_alert",
                Capability::SideEffects,
                RiskLevel::High,
                ExecutionMode::Direct,
            ),
            Arc::clone(&commit_handler) as _,
        )
        .unwrap();
    router
        .register(
            tool_def(
                "asi.commit_send_invoice",
                Capability::SideEffects,
                RiskLevel::Critical,
                ExecutionMode::Direct,
            ),
            Arc::clone(&commit_handler) as _,
        )
        .unwrap();
    router
        .register(
            tool_def(
                "asi.stage_booking_create",
                Capability::Write,
                RiskLevel::Medium,
                ExecutionMode::SandboxOnly,
            ),
            CountingHandler::new() as _,
        )
        .unwrap();

    Pipeline {
        approvals,
        audit,
        router: Arc::new(router),
        commit_action,
        read_handler,
        commit_handler,
    }
}

fn ctx(run: &str, verdict: Option<ReviewerVerdict>) -> CallContext {
    let mut ctx =
        CallContext::new("asi", RunId::new(run), "daily_ops_brief", "worker-1", "scenario call");
    ctx.reviewer_verdict = verdict;
    ctx
}

// ============================================================================
// SECTION: Scenario 1 - L0 Read in Plan
// ============================================================================

#[tokio::test]
async fn l0_read_in_plan_stage_is_allowed_and_audited() {
    let pipeline = pipeline(None);
    let orchestrator = WorkflowOrchestrator::new(
        Arc::clone(&pipeline.router),
        Some(Arc::new(pipeline.approvals.clone())),
        Arc::new(pipeline.audit.clone()),
        ScriptedModel::new(vec![
            call_turn("checking bookings", "asi.get_bookings", json!({"limit": 10})),
            text_turn("plan: quiet day, one arrival"),
        ]),
        Arc::new(NoopDiagnostics),
    );

    let report = orchestrator
        .run(&workflow_def("daily_ops_brief", "asi", vec![Stage::Plan]), json!("plan the day"))
        .await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(pipeline.read_handler.call_count(), 1);

    let events = pipeline
        .audit
        .query(&EventFilter {
            run_id: Some(report.run_id.clone()),
            ..EventFilter::default()
        })
        .unwrap();
    let tool_events: Vec<_> = events
        .iter()
        .filter(|event| event.tool_name == Some(ToolName::new("asi.get_bookings")))
        .collect();
    assert_eq!(tool_events.len(), 1);
    assert_eq!(tool_events[0].trust_level, TrustLevel::L0);
    assert_eq!(tool_events[0].stage, Stage::Plan);
}

// ============================================================================
// SECTION: Scenario 2 - L4 Commit Without Approval
// ============================================================================

#[tokio::test]
async fn l4_commit_without_approval_is_denied() {
    let pipeline = pipeline(None);
    let run = RunId::new("run-l4");

    let outcome = pipeline
        .router
        .call(ToolCallRequest {
            tool: ToolName::new("asi.commit_send_invoice"),
            args: json!({"invoice_id": "inv-9"}),
            stage: Stage::Commit,
            context: ctx("run-l4", Some(ReviewerVerdict::Pass)),
        })
        .await;
    assert!(!outcome.allowed);
    assert!(outcome.error.as_deref().unwrap().contains("human approval required"));
    assert_eq!(pipeline.commit_handler.call_count(), 0);
    assert_eq!(pipeline.commit_action.call_count(), 0);

    let events = pipeline
        .audit
        .query(&EventFilter {
            run_id: Some(run),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trust_level, TrustLevel::L4);
    assert!(!events[0].errors.is_empty());
}

// ============================================================================
// SECTION: Scenario 3 - Auto-Approved L3 Commit
// ============================================================================

#[tokio::test]
async fn l3_commit_with_reviewer_pass_auto_approves_and_commits() {
    let pipeline = pipeline(None);
    let orchestrator = WorkflowOrchestrator::new(
        Arc::clone(&pipeline.router),
        Some(Arc::new(pipeline.approvals.clone())),
        Arc::new(pipeline.audit.clone()),
        ScriptedModel::new(vec![
            text_turn("plan: post the morning alert"),
            text_turn("executed: alert drafted"),
            text_turn("reviewed the draft. VERDICT: PASS"),
            call_turn("posting alert", "asi.commit_post_alert", json!({"message": "heads up"})),
        ]),
        Arc::new(NoopDiagnostics),
    );

    let workflow = workflow_def(
        "daily_ops_brief",
        "asi",
        vec![Stage::Plan, Stage::Execute, Stage::Review, Stage::Commit],
    );
    let report = orchestrator.run(&workflow, json!("post the morning alert")).await;
    assert_eq!(report.status, RunStatus::Completed, "failed: {:?}", report.failure_reason);
    assert_eq!(report.reviewer_verdict, Some(ReviewerVerdict::Pass));
    assert_eq!(pipeline.commit_action.call_count(), 1);

    // The approval request was created, auto-approved, and consumed.
    let request_id = report.approval_request_id.expect("approval request expected");
    let request = pipeline.approvals.request(&request_id).unwrap().unwrap();
    assert_eq!(request.action_type, "post_alert");
    assert!(request.auto_approve_eligible);
    assert!(pipeline.approvals.is_approved(&request_id).unwrap());
    let decision = pipeline.approvals.decision_for(&request_id).unwrap().unwrap();
    assert_eq!(decision.decided_by, AUTO_APPROVER);

    // The audit trail shows the auto-approval and exactly one commit event.
    let events = pipeline
        .audit
        .query(&EventFilter {
            run_id: Some(report.run_id.clone()),
            ..EventFilter::default()
        })
        .unwrap();
    assert!(events.iter().any(|event| event.summary.contains("auto-approved")));
    let commit_events: Vec<_> = events
        .iter()
        .filter(|event| {
            event.stage == Stage::Commit
                && event.tool_name == Some(ToolName::new("asi.commit_post_alert"))
                && event.errors.is_empty()
        })
        .collect();
    assert_eq!(commit_events.len(), 1);
}

#[tokio::test]
async fn stages_after_commit_still_run_after_auto_approval() {
    let pipeline = pipeline(None);
    let model = ScriptedModel::new(vec![
        text_turn("plan: post the alert, then reconcile the ledger"),
        text_turn("reviewed the plan. VERDICT: PASS"),
        call_turn("posting alert", "asi.commit_post_alert", json!({"message": "heads up"})),
        text_turn("reconciled the ledger after the alert"),
    ]);
    let orchestrator = WorkflowOrchestrator::new(
        Arc::clone(&pipeline.router),
        Some(Arc::new(pipeline.approvals.clone())),
        Arc::new(pipeline.audit.clone()),
        Arc::clone(&model) as Arc<dyn AgentModel>,
        Arc::new(NoopDiagnostics),
    );

    // Review before commit satisfies the workflow invariant; commit is not
    // required to be the final stage.
    let workflow = workflow_def(
        "daily_ops_brief",
        "asi",
        vec![Stage::Plan, Stage::Review, Stage::Commit, Stage::Execute],
    );
    let report = orchestrator.run(&workflow, json!("post the morning alert")).await;
    assert_eq!(report.status, RunStatus::Completed, "failed: {:?}", report.failure_reason);
    assert_eq!(pipeline.commit_action.call_count(), 1);
    assert!(report.approval_request_id.is_some());
    // The post-commit stage consumed its turn and produced the final output.
    assert_eq!(model.remaining(), 0);
    assert_eq!(
        report.final_output.as_deref(),
        Some("reconciled the ledger after the alert")
    );
}

// ============================================================================
// SECTION: Scenario 4 - Reviewer FAIL Blocks Commit
// ============================================================================

#[tokio::test]
async fn reviewer_fail_terminates_before_commit() {
    let pipeline = pipeline(None);
    let model = ScriptedModel::new(vec![
        text_turn("plan: post the morning alert"),
        text_turn("executed: alert drafted"),
        text_turn("numbers are wrong. VERDICT: FAIL"),
        call_turn("posting alert", "asi.commit_post_alert", json!({"message": "heads up"})),
    ]);
    let orchestrator = WorkflowOrchestrator::new(
        Arc::clone(&pipeline.router),
        Some(Arc::new(pipeline.approvals.clone())),
        Arc::new(pipeline.audit.clone()),
        Arc::clone(&model) as Arc<dyn AgentModel>,
        Arc::new(NoopDiagnostics),
    );

    let workflow = workflow_def(
        "daily_ops_brief",
        "asi",
        vec![Stage::Plan, Stage::Execute, Stage::Review, Stage::Commit],
    );
    let report = orchestrator.run(&workflow, json!("post the morning alert")).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.reviewer_verdict, Some(ReviewerVerdict::Fail));
    assert_eq!(pipeline.commit_action.call_count(), 0);
    assert_eq!(pipeline.commit_handler.call_count(), 0);
    // The commit-stage turn was never consumed.
    assert_eq!(model.remaining(), 1);

    let events = pipeline
        .audit
        .query(&EventFilter {
            run_id: Some(report.run_id.clone()),
            ..EventFilter::default()
        })
        .unwrap();
    assert!(events.iter().any(|event| event.summary == "reviewer FAIL — commit blocked"));
    // No approval request was created for this run.
    assert!(pipeline.approvals.requests_by_run(&report.run_id).unwrap().is_empty());
}

// ============================================================================
// SECTION: Scenario 5 - Sandbox Unavailable in Production
// ============================================================================

#[tokio::test]
async fn sandbox_unavailable_in_production_denies_fail_closed() {
    let artifacts = tempfile::tempdir().unwrap();
    let sandbox_config = SandboxConfig {
        docker_binary: "/nonexistent/toolgate-docker".to_string(),
        artifacts_root: artifacts.path().to_path_buf(),
        production: true,
        ..SandboxConfig::default()
    };
    let executor = SandboxExecutor::with_strategy(
        sandbox_config.clone(),
        Arc::new(ContainerIsolation::new(sandbox_config)),
        Arc::new(NoopDiagnostics),
    )
    .unwrap();
    let pipeline = pipeline(Some(Arc::new(executor) as Arc<dyn SandboxRunner>));

    let outcome = pipeline
        .router
        .call(ToolCallRequest {
            tool: ToolName::new("asi.stage_booking_create"),
            args: json!({"guest": "A. Byrne"}),
            stage: Stage::Execute,
            context: ctx("run-sbx", None),
        })
        .await;
    assert!(!outcome.allowed);
    assert!(!outcome.success);
    let error = outcome.error.as_deref().unwrap();
    assert!(error.contains("container runtime"), "unexpected error: {error}");

    let events = pipeline
        .audit
        .query(&EventFilter {
            run_id: Some(RunId::new("run-sbx")),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].errors.is_empty());
    assert!(events[0].sandbox_id.is_some(), "denial event should name the sandbox");
}

// ============================================================================
// SECTION: Scenario 6 - Duplicate Decision
// ============================================================================

#[tokio::test]
async fn duplicate_decision_is_rejected_and_state_is_stable() {
    let pipeline = pipeline(None);
    let request = pipeline
        .approvals
        .create_request(toolgate_core::NewApprovalRequest {
            domain: "asi".to_string(),
            run_id: RunId::new("run-dup"),
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

    pipeline
        .approvals
        .create_decision(
            &request.id,
            "ops@example.com",
            toolgate_core::DecisionKind::Approve,
            None,
            json!({}),
        )
        .unwrap();
    let error = pipeline
        .approvals
        .create_decision(
            &request.id,
            "ops@example.com",
            toolgate_core::DecisionKind::Approve,
            None,
            json!({}),
        )
        .unwrap_err();
    assert!(matches!(error, toolgate_core::ApprovalStoreError::AlreadyDecided(_)));
    assert!(pipeline.approvals.is_approved(&request.id).unwrap());
    assert!(pipeline.approvals.decision_for(&request.id).unwrap().is_some());
}
