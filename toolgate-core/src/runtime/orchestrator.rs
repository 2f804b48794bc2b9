// toolgate-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: ToolGate Workflow Orchestrator
// Description: Stage sequencing, verdict threading, and approval handling.
// Purpose: Drive planner, executor, reviewer, and commit agents through the
//          router while enforcing the workflow invariants.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The orchestrator owns a run. Stages execute sequentially; within a stage
//! the agent's batched tool calls dispatch concurrently through the router.
//! The reviewer's verdict threads into every subsequent call context, and a
//! FAIL verdict terminates the run before the commit stage can start. When a
//! commit call parks on approval state, the orchestrator creates the approval
//! request, attempts auto-approval when eligible, and otherwise pauses the
//! run with a `requires_approval` status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use serde_json::json;

use crate::core::AgentActionEvent;
use crate::core::AgentDefinition;
use crate::core::NewApprovalRequest;
use crate::core::RequestId;
use crate::core::ReviewerVerdict;
use crate::core::RunId;
use crate::core::SandboxId;
use crate::core::Stage;
use crate::core::ToolName;
use crate::core::TrustLevel;
use crate::core::WorkflowDefinition;
use crate::core::commit_tools::commit_tool_for;
use crate::interfaces::AgentModel;
use crate::interfaces::ApprovalStore;
use crate::interfaces::AuditLog;
use crate::interfaces::CallContext;
use crate::interfaces::DiagnosticsSink;
use crate::interfaces::MessageRole;
use crate::interfaces::ModelMessage;
use crate::runtime::router::ToolCallRequest;
use crate::runtime::router::ToolRouter;
use crate::runtime::verdict::parse_reviewer_verdict;

// ============================================================================
// SECTION: Run Report
// ============================================================================

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All stages completed.
    Completed,
    /// A stage or invariant failed.
    Failed,
    /// Paused awaiting a human approval decision.
    RequiresApproval,
}

/// Result of one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Terminal status.
    pub status: RunStatus,
    /// Final stage output when the run completed.
    pub final_output: Option<String>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Approval request created by the commit path, if any.
    pub approval_request_id: Option<RequestId>,
    /// Reviewer verdict captured during the run.
    pub reviewer_verdict: Option<ReviewerVerdict>,
    /// Failure detail for failed runs.
    pub failure_reason: Option<String>,
}

// ============================================================================
// SECTION: Stage Run State
// ============================================================================

/// Commit call parked on approval state during a stage.
#[derive(Debug, Clone)]
struct PendingCommit {
    /// Commit tool that was invoked.
    tool: ToolName,
    /// Arguments of the parked call.
    args: Value,
    /// Trust level the gate assigned.
    trust_level: TrustLevel,
}

/// How a stage parked on approval state was resolved.
enum PauseResolution {
    /// Auto-approval succeeded and the commit retry ran; the run continues
    /// with any remaining stages.
    Resume {
        /// Approval request that authorized the commit.
        request_id: RequestId,
        /// Final text of the parked stage.
        final_text: String,
    },
    /// The run ends here with the given report.
    Report(RunReport),
}

/// Outcome of driving one agent through one stage.
struct StageRun {
    /// Final assistant text for the stage.
    final_text: String,
    /// Whether any call parked on approval state.
    requires_approval: bool,
    /// The parked commit call, when one exists.
    pending_commit: Option<PendingCommit>,
    /// Sandbox assigned during the stage, threaded into later calls.
    sandbox_id: Option<SandboxId>,
    /// Failure detail when the stage failed outright.
    failure: Option<String>,
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Stage-sequenced workflow orchestrator.
pub struct WorkflowOrchestrator {
    /// Router carrying the gate, sandbox, and commit boundary.
    router: Arc<ToolRouter>,
    /// Approval store for request creation and auto-approval.
    approvals: Option<Arc<dyn ApprovalStore>>,
    /// Audit log for run-level events.
    audit: Arc<dyn AuditLog>,
    /// Model backend driving the agents.
    model: Arc<dyn AgentModel>,
    /// Diagnostics sink.
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        router: Arc<ToolRouter>,
        approvals: Option<Arc<dyn ApprovalStore>>,
        audit: Arc<dyn AuditLog>,
        model: Arc<dyn AgentModel>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            router,
            approvals,
            audit,
            model,
            diagnostics,
        }
    }

    /// Runs a workflow against an input.
    pub async fn run(&self, workflow: &WorkflowDefinition, input: Value) -> RunReport {
        let started = Instant::now();
        let run_id = RunId::generate();

        if let Err(error) = workflow.validate() {
            let reason = error.to_string();
            self.audit_note(workflow, &run_id, Stage::Plan, "workflow validation", &reason, true);
            return self.report(run_id, RunStatus::Failed, None, started, None, None, Some(reason));
        }

        let mut reviewer_verdict: Option<ReviewerVerdict> = None;
        let mut reviewer_notes: Option<String> = None;
        let mut sandbox_id: Option<SandboxId> = None;
        let mut approval_request_id: Option<RequestId> = None;
        let mut stage_input = input_text(&input);
        let mut final_output = None;

        for stage in &workflow.stages {
            let stage = *stage;
            let Some(agent) = workflow.agent_for_stage(stage) else {
                let reason = format!("fail-closed: no agent serves stage `{stage}`");
                self.audit_note(workflow, &run_id, stage, "stage agent lookup", &reason, true);
                return self.report(
                    run_id,
                    RunStatus::Failed,
                    None,
                    started,
                    None,
                    reviewer_verdict,
                    Some(reason),
                );
            };
            if stage == Stage::Commit && reviewer_verdict.is_none() {
                let reason = "fail-closed: commit stage reached without a reviewer verdict";
                self.audit_note(workflow, &run_id, stage, "commit gate", reason, true);
                return self.report(
                    run_id,
                    RunStatus::Failed,
                    None,
                    started,
                    None,
                    reviewer_verdict,
                    Some(reason.to_string()),
                );
            }

            let stage_run = self
                .run_stage(
                    workflow,
                    &run_id,
                    stage,
                    agent,
                    &stage_input,
                    reviewer_verdict,
                    reviewer_notes.clone(),
                    sandbox_id.clone(),
                )
                .await;
            if let Some(reason) = stage_run.failure {
                self.audit_note(workflow, &run_id, stage, "stage execution", &reason, true);
                return self.report(
                    run_id,
                    RunStatus::Failed,
                    None,
                    started,
                    None,
                    reviewer_verdict,
                    Some(reason),
                );
            }
            if stage_run.sandbox_id.is_some() {
                sandbox_id = stage_run.sandbox_id.clone();
            }

            if stage == Stage::Review {
                match parse_reviewer_verdict(&stage_run.final_text) {
                    Some(ReviewerVerdict::Fail) => {
                        let reason = "reviewer FAIL — commit blocked";
                        self.audit_note(workflow, &run_id, stage, "reviewer verdict", reason, true);
                        return self.report(
                            run_id,
                            RunStatus::Failed,
                            None,
                            started,
                            None,
                            Some(ReviewerVerdict::Fail),
                            Some(reason.to_string()),
                        );
                    }
                    Some(ReviewerVerdict::Pass) => {
                        reviewer_verdict = Some(ReviewerVerdict::Pass);
                        reviewer_notes = Some(stage_run.final_text.clone());
                    }
                    None => {
                        self.diagnostics.warn(
                            "reviewer_verdict_missing",
                            "review stage produced no explicit verdict",
                        );
                    }
                }
            }

            if stage_run.requires_approval {
                let resolution = self
                    .handle_approval_pause(
                        workflow,
                        &run_id,
                        stage,
                        agent,
                        stage_run.pending_commit,
                        reviewer_verdict,
                        reviewer_notes.clone(),
                        sandbox_id.clone(),
                        started,
                        stage_run.final_text,
                    )
                    .await;
                match resolution {
                    PauseResolution::Report(report) => return report,
                    PauseResolution::Resume {
                        request_id,
                        final_text,
                    } => {
                        // The commit retry ran; any stages after this one
                        // still execute.
                        approval_request_id = Some(request_id);
                        final_output = Some(final_text.clone());
                        stage_input = final_text;
                        continue;
                    }
                }
            }

            final_output = Some(stage_run.final_text.clone());
            stage_input = stage_run.final_text;
        }

        let last_stage = workflow.stages.last().copied().unwrap_or(Stage::Plan);
        self.audit_note(workflow, &run_id, last_stage, "run terminal", "run completed", false);
        self.report(
            run_id,
            RunStatus::Completed,
            final_output,
            started,
            approval_request_id,
            reviewer_verdict,
            None,
        )
    }

    /// Drives one agent through one stage, up to its turn budget.
    #[allow(clippy::too_many_arguments, reason = "stage state threads through the run loop")]
    async fn run_stage(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &RunId,
        stage: Stage,
        agent: &AgentDefinition,
        stage_input: &str,
        reviewer_verdict: Option<ReviewerVerdict>,
        reviewer_notes: Option<String>,
        sandbox_id: Option<SandboxId>,
    ) -> StageRun {
        let mut stage_run = StageRun {
            final_text: String::new(),
            requires_approval: false,
            pending_commit: None,
            sandbox_id,
            failure: None,
        };
        let mut messages = vec![ModelMessage {
            role: MessageRole::User,
            content: stage_input.to_string(),
        }];

        for _ in 0..agent.max_turns {
            let turn = match self.model.complete(agent, &messages).await {
                Ok(turn) => turn,
                Err(error) => {
                    stage_run.failure = Some(format!("fail-closed: model error: {error}"));
                    return stage_run;
                }
            };
            stage_run.final_text = turn.text.clone();
            messages.push(ModelMessage {
                role: MessageRole::Assistant,
                content: turn.text,
            });
            if turn.tool_calls.is_empty() {
                return stage_run;
            }

            let requests: Vec<ToolCallRequest> = turn
                .tool_calls
                .iter()
                .map(|call| {
                    let mut ctx = CallContext::new(
                        workflow.domain.as_str(),
                        run_id.clone(),
                        workflow.name.clone(),
                        agent.name.clone(),
                        format!("{stage} stage call to `{}`", call.tool),
                    );
                    ctx.reviewer_verdict = reviewer_verdict;
                    ctx.reviewer_notes = reviewer_notes.clone();
                    ctx.sandbox_id = stage_run.sandbox_id.clone();
                    ToolCallRequest {
                        tool: call.tool.clone(),
                        args: call.args.clone(),
                        stage,
                        context: ctx,
                    }
                })
                .collect();
            let outcomes = self.router.call_parallel(requests).await;

            let mut feedback = Vec::new();
            for (tool, outcome) in &outcomes {
                if outcome.sandbox_id.is_some() && stage_run.sandbox_id.is_none() {
                    stage_run.sandbox_id = outcome.sandbox_id.clone();
                }
                if outcome.pending_approval {
                    stage_run.requires_approval = true;
                    if let Some(decision) = &outcome.decision {
                        if commit_tool_for(tool).is_some() {
                            stage_run.pending_commit = Some(PendingCommit {
                                tool: tool.clone(),
                                args: turn
                                    .tool_calls
                                    .iter()
                                    .find(|call| &call.tool == tool)
                                    .map(|call| call.args.clone())
                                    .unwrap_or(Value::Null),
                                trust_level: decision.trust_level,
                            });
                        }
                    }
                }
                feedback.push(json!({
                    "tool": tool.as_str(),
                    "success": outcome.success,
                    "pending_approval": outcome.pending_approval,
                    "result": outcome.result,
                    "error": outcome.error,
                }));
            }
            messages.push(ModelMessage {
                role: MessageRole::Tool,
                content: Value::Array(feedback).to_string(),
            });

            if stage_run.requires_approval {
                return stage_run;
            }
        }
        stage_run
    }

    /// Creates the approval request for a parked commit call and either
    /// auto-approves and retries the commit, or pauses the run.
    #[allow(clippy::too_many_arguments, reason = "pause handling needs the full run state")]
    async fn handle_approval_pause(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &RunId,
        stage: Stage,
        agent: &AgentDefinition,
        pending_commit: Option<PendingCommit>,
        reviewer_verdict: Option<ReviewerVerdict>,
        reviewer_notes: Option<String>,
        sandbox_id: Option<SandboxId>,
        started: Instant,
        final_text: String,
    ) -> PauseResolution {
        let (Some(approvals), Some(pending), Stage::Commit) =
            (self.approvals.as_ref(), pending_commit, stage)
        else {
            self.audit_note(
                workflow,
                run_id,
                stage,
                "approval pause",
                "paused: requires human approval",
                false,
            );
            return PauseResolution::Report(self.report(
                run_id.clone(),
                RunStatus::RequiresApproval,
                Some(final_text),
                started,
                None,
                reviewer_verdict,
                None,
            ));
        };

        let action_type = commit_tool_for(&pending.tool)
            .map_or_else(|| pending.tool.to_string(), |tool| tool.action_type().to_string());
        let new_request = NewApprovalRequest {
            domain: workflow.domain.to_string(),
            run_id: run_id.clone(),
            workflow_name: workflow.name.clone(),
            requested_by: agent.name.clone(),
            trust_level: pending.trust_level,
            action_type,
            action_payload: pending.args.clone(),
            context: json!({
                "sandbox_id": sandbox_id.as_ref().map(SandboxId::as_str),
                "reviewer_notes": reviewer_notes.clone(),
            }),
            reviewer_verdict,
            reviewer_notes,
            expires_in_seconds: None,
        };
        let request = match approvals.create_request(new_request) {
            Ok(request) => request,
            Err(error) => {
                let reason = format!("fail-closed: approval request creation failed: {error}");
                self.audit_note(workflow, run_id, stage, "approval request", &reason, true);
                return PauseResolution::Report(self.report(
                    run_id.clone(),
                    RunStatus::Failed,
                    None,
                    started,
                    None,
                    reviewer_verdict,
                    Some(reason),
                ));
            }
        };

        if request.auto_approve_eligible && reviewer_verdict == Some(ReviewerVerdict::Pass) {
            match approvals.auto_approve(&request.id) {
                Ok(Some(decision)) => {
                    self.audit_note(
                        workflow,
                        run_id,
                        stage,
                        "auto-approval",
                        &format!("request {} auto-approved by {}", request.id, decision.decided_by),
                        false,
                    );
                    let mut ctx = CallContext::new(
                        workflow.domain.as_str(),
                        run_id.clone(),
                        workflow.name.clone(),
                        agent.name.clone(),
                        format!("commit retry of `{}` after auto-approval", pending.tool),
                    );
                    ctx.reviewer_verdict = reviewer_verdict;
                    ctx.sandbox_id = sandbox_id;
                    let outcome = self
                        .router
                        .call(ToolCallRequest {
                            tool: pending.tool.clone(),
                            args: pending.args,
                            stage,
                            context: ctx,
                        })
                        .await;
                    if outcome.success {
                        return PauseResolution::Resume {
                            request_id: request.id,
                            final_text,
                        };
                    }
                    let reason = outcome
                        .error
                        .unwrap_or_else(|| "fail-closed: commit failed after auto-approval".into());
                    return PauseResolution::Report(self.report(
                        run_id.clone(),
                        RunStatus::Failed,
                        None,
                        started,
                        Some(request.id),
                        reviewer_verdict,
                        Some(reason),
                    ));
                }
                Ok(None) => {}
                Err(error) => {
                    let reason = format!("fail-closed: auto-approval failed: {error}");
                    self.audit_note(workflow, run_id, stage, "auto-approval", &reason, true);
                    return PauseResolution::Report(self.report(
                        run_id.clone(),
                        RunStatus::Failed,
                        None,
                        started,
                        Some(request.id),
                        reviewer_verdict,
                        Some(reason),
                    ));
                }
            }
        }

        self.audit_note(
            workflow,
            run_id,
            stage,
            "approval pause",
            "paused: requires human approval",
            false,
        );
        PauseResolution::Report(self.report(
            run_id.clone(),
            RunStatus::RequiresApproval,
            Some(final_text),
            started,
            Some(request.id),
            reviewer_verdict,
            None,
        ))
    }

    /// Emits one orchestrator-level audit event.
    fn audit_note(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &RunId,
        stage: Stage,
        intent: &str,
        summary: &str,
        is_error: bool,
    ) {
        let mut event = AgentActionEvent::new(
            workflow.domain.as_str(),
            workflow.name.clone(),
            "orchestrator",
            run_id.clone(),
            TrustLevel::L0,
            stage,
            intent,
        );
        event.summary = summary.to_string();
        if is_error {
            event.errors.push(summary.to_string());
        }
        let receipt = self.audit.append(event);
        if !receipt.accepted {
            self.diagnostics.warn(
                "orchestrator_audit_append_failed",
                receipt.error.as_deref().unwrap_or("unknown"),
            );
        }
    }

    /// Builds the run report.
    #[allow(clippy::too_many_arguments, reason = "report fields mirror the run state")]
    fn report(
        &self,
        run_id: RunId,
        status: RunStatus,
        final_output: Option<String>,
        started: Instant,
        approval_request_id: Option<RequestId>,
        reviewer_verdict: Option<ReviewerVerdict>,
        failure_reason: Option<String>,
    ) -> RunReport {
        RunReport {
            run_id,
            status,
            final_output,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            approval_request_id,
            reviewer_verdict,
            failure_reason,
        }
    }
}

/// Renders the workflow input as stage input text.
fn input_text(input: &Value) -> String {
    match input {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
