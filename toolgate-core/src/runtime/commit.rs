// toolgate-core/src/runtime/commit.rs
// ============================================================================
// Module: ToolGate Commit Boundary
// Description: The single gate through which production mutations pass.
// Purpose: Re-verify approval, verdict, expiry, trust, and staged changes
//          before dispatching one of the five commit actions.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The commit boundary is the sole legitimate path from an agent to a
//! production mutation. Eligibility runs eight gates in sequence and every
//! failure names its gate in a `fail-closed:` reason. Each execution, whether
//! it commits or not, emits exactly one commit-stage audit event naming the
//! tool, the commit id, and either the changes-applied count or the error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;

use crate::core::AgentActionEvent;
use crate::core::ApprovalRequest;
use crate::core::ApprovalStatus;
use crate::core::CommitId;
use crate::core::CommitTool;
use crate::core::ReviewerVerdict;
use crate::core::RunId;
use crate::core::SandboxId;
use crate::core::Stage;
use crate::core::StagedChange;
use crate::core::Timestamp;
use crate::core::ToolName;
use crate::core::commit_tools::commit_tool_for;
use crate::core::commit_tools::matches_action;
use crate::interfaces::AuditLog;
use crate::interfaces::ApprovalStore;
use crate::interfaces::CallContext;
use crate::interfaces::CommitAction;
use crate::interfaces::CommitRequest;
use crate::interfaces::DiagnosticsSink;
use crate::interfaces::SandboxRunner;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of an eligibility check.
#[derive(Debug, Clone)]
pub struct CommitEligibility {
    /// Whether all eight gates passed.
    pub eligible: bool,
    /// Reason naming the failed gate, or a pass note.
    pub reason: String,
    /// Approval request that authorizes the commit, when eligible.
    pub request: Option<ApprovalRequest>,
}

impl CommitEligibility {
    fn blocked(reason: String) -> Self {
        Self {
            eligible: false,
            reason,
            request: None,
        }
    }
}

/// Result of a commit execution.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Whether the commit action ran and succeeded.
    pub committed: bool,
    /// Commit identifier minted for this execution.
    pub commit_id: CommitId,
    /// Action result on success.
    pub result: Option<Value>,
    /// Failure detail.
    pub error: Option<String>,
    /// Number of staged changes applied.
    pub changes_applied: usize,
}

// ============================================================================
// SECTION: Commit Boundary
// ============================================================================

/// Commit boundary owning the five commit actions.
pub struct CommitBoundary {
    /// Approval store consulted by the gates.
    approvals: Arc<dyn ApprovalStore>,
    /// Sandbox ledger consulted for `apply_changes`.
    sandbox: Option<Arc<dyn SandboxRunner>>,
    /// Audit log receiving one event per execution.
    audit: Arc<dyn AuditLog>,
    /// Registered commit action handlers.
    actions: BTreeMap<CommitTool, Arc<dyn CommitAction>>,
    /// Diagnostics sink.
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl CommitBoundary {
    /// Creates a commit boundary with no registered actions.
    #[must_use]
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        sandbox: Option<Arc<dyn SandboxRunner>>,
        audit: Arc<dyn AuditLog>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            approvals,
            sandbox,
            audit,
            actions: BTreeMap::new(),
            diagnostics,
        }
    }

    /// Registers the handler for one commit action.
    pub fn register_action(&mut self, tool: CommitTool, action: Arc<dyn CommitAction>) {
        self.actions.insert(tool, action);
    }

    /// Returns true when a handler is registered for the commit tool.
    #[must_use]
    pub fn has_action(&self, tool: CommitTool) -> bool {
        self.actions.contains_key(&tool)
    }

    /// Runs the eight eligibility gates in sequence.
    ///
    /// Gate order: inputs, registry membership, matching approval request,
    /// trust level, status, reviewer verdict, expiry, staged changes.
    #[must_use]
    pub fn verify_commit_eligibility(
        &self,
        run_id: &RunId,
        tool_name: &ToolName,
    ) -> CommitEligibility {
        // Gate 1: inputs.
        if run_id.is_empty() {
            return CommitEligibility::blocked(
                "fail-closed: run_id: missing or empty".to_string(),
            );
        }
        if tool_name.is_empty() {
            return CommitEligibility::blocked(
                "fail-closed: tool_name: missing or empty".to_string(),
            );
        }
        // Gate 2: registry membership.
        let Some(tool) = commit_tool_for(tool_name) else {
            return CommitEligibility::blocked(format!(
                "fail-closed: `{tool_name}` is not a commit tool"
            ));
        };
        // Gate 3: a matching approval request exists for the run.
        let requests = match self.approvals.requests_by_run(run_id) {
            Ok(requests) => requests,
            Err(error) => {
                return CommitEligibility::blocked(format!(
                    "fail-closed: approval store error: {error}"
                ));
            }
        };
        if requests.is_empty() {
            return CommitEligibility::blocked(format!(
                "fail-closed: no approval requests exist for run {run_id}"
            ));
        }
        let Some(request) =
            requests.into_iter().find(|request| matches_action(&request.action_type, tool_name))
        else {
            return CommitEligibility::blocked(format!(
                "fail-closed: no approval request matches `{tool_name}`"
            ));
        };
        // Gate 4: request trust level covers the tool's minimum.
        if request.trust_level < tool.min_trust_level() {
            return CommitEligibility::blocked(format!(
                "fail-closed: request trust level {} is below required {}",
                request.trust_level,
                tool.min_trust_level()
            ));
        }
        // Gate 5: approved.
        if request.status != ApprovalStatus::Approved {
            return CommitEligibility::blocked(format!(
                "fail-closed: approval request {} has status {}",
                request.id, request.status
            ));
        }
        // Gate 6: reviewer verdict PASS.
        if request.reviewer_verdict != Some(ReviewerVerdict::Pass) {
            return CommitEligibility::blocked(format!(
                "fail-closed: approval request {} lacks a PASS reviewer verdict",
                request.id
            ));
        }
        // Gate 7: not expired.
        if request.is_expired(Timestamp::now()) {
            return CommitEligibility::blocked(format!(
                "fail-closed: approval request {} has expired",
                request.id
            ));
        }
        // Gate 8: apply_changes requires a non-empty staged-change set.
        if tool.requires_staged_changes() {
            let staged = self.staged_changes_for(&request);
            if staged.is_empty() {
                return CommitEligibility::blocked(
                    "fail-closed: no staged changes exist for apply_changes".to_string(),
                );
            }
        }
        CommitEligibility {
            eligible: true,
            reason: format!("eligible via approval request {}", request.id),
            request: Some(request),
        }
    }

    /// Verifies eligibility, then dispatches the action handler.
    ///
    /// Emits exactly one commit-stage audit event for this execution.
    pub async fn execute_commit(
        &self,
        tool_name: &ToolName,
        run_id: &RunId,
        args: Value,
        ctx: &CallContext,
    ) -> CommitOutcome {
        let commit_id = CommitId::generate();
        let eligibility = self.verify_commit_eligibility(run_id, tool_name);
        let Some(request) = eligibility.request else {
            let outcome = CommitOutcome {
                committed: false,
                commit_id: commit_id.clone(),
                result: None,
                error: Some(eligibility.reason.clone()),
                changes_applied: 0,
            };
            self.audit_commit(tool_name, &commit_id, ctx, &outcome, None);
            return outcome;
        };

        // Registry membership already held at gate 2.
        let Some(tool) = commit_tool_for(tool_name) else {
            let outcome = CommitOutcome {
                committed: false,
                commit_id: commit_id.clone(),
                result: None,
                error: Some(format!("fail-closed: `{tool_name}` is not a commit tool")),
                changes_applied: 0,
            };
            self.audit_commit(tool_name, &commit_id, ctx, &outcome, Some(&request));
            return outcome;
        };
        let Some(action) = self.actions.get(&tool) else {
            let outcome = CommitOutcome {
                committed: false,
                commit_id: commit_id.clone(),
                result: None,
                error: Some(format!(
                    "fail-closed: no handler registered for commit tool `{tool_name}`"
                )),
                changes_applied: 0,
            };
            self.audit_commit(tool_name, &commit_id, ctx, &outcome, Some(&request));
            return outcome;
        };

        let staged_changes = if tool.requires_staged_changes() {
            self.drain_staged_changes(&request)
        } else {
            Vec::new()
        };
        let changes_applied = staged_changes.len();
        let commit_request = CommitRequest {
            commit_id: commit_id.clone(),
            run_id: run_id.clone(),
            tool,
            tool_name: tool_name.clone(),
            args,
            approval: request.clone(),
            staged_changes,
        };
        let outcome = match action.execute(&commit_request).await {
            Ok(result) => CommitOutcome {
                committed: true,
                commit_id: commit_id.clone(),
                result: Some(result),
                error: None,
                changes_applied,
            },
            Err(error) => CommitOutcome {
                committed: false,
                commit_id: commit_id.clone(),
                result: None,
                error: Some(error.to_string()),
                changes_applied: 0,
            },
        };
        self.audit_commit(tool_name, &commit_id, ctx, &outcome, Some(&request));
        outcome
    }

    /// Reads the staged changes named by the request's sandbox id.
    fn staged_changes_for(&self, request: &ApprovalRequest) -> Vec<StagedChange> {
        let Some(sandbox) = &self.sandbox else {
            return Vec::new();
        };
        match sandbox_id_from(request) {
            Some(sandbox_id) => sandbox.staged_changes(&sandbox_id),
            None => Vec::new(),
        }
    }

    /// Drains the staged changes named by the request's sandbox id.
    fn drain_staged_changes(&self, request: &ApprovalRequest) -> Vec<StagedChange> {
        let Some(sandbox) = &self.sandbox else {
            return Vec::new();
        };
        match sandbox_id_from(request) {
            Some(sandbox_id) => sandbox.commit_changes(&sandbox_id),
            None => Vec::new(),
        }
    }

    /// Emits the single audit event for a commit execution.
    fn audit_commit(
        &self,
        tool_name: &ToolName,
        commit_id: &CommitId,
        ctx: &CallContext,
        outcome: &CommitOutcome,
        request: Option<&ApprovalRequest>,
    ) {
        let trust_level = request.map_or_else(
            || commit_tool_for(tool_name).map_or_else(Default::default, |t| t.min_trust_level()),
            |request| request.trust_level,
        );
        let mut event = AgentActionEvent::new(
            ctx.domain.clone(),
            ctx.workflow.clone(),
            ctx.agent.clone(),
            ctx.run_id.clone(),
            trust_level,
            Stage::Commit,
            ctx.intent.clone(),
        );
        event.tool_name = Some(tool_name.clone());
        event.tool_result = json!({
            "commit_id": commit_id.as_str(),
            "committed": outcome.committed,
            "changes_applied": outcome.changes_applied,
        });
        event.summary = if outcome.committed {
            format!("commit {commit_id} applied {} change(s)", outcome.changes_applied)
        } else {
            format!("commit {commit_id} blocked")
        };
        if let Some(error) = &outcome.error {
            event.errors.push(error.clone());
        }
        event.approval_request_id = request.map(|request| request.id.clone());
        event.sandbox_id = request.and_then(sandbox_id_from);
        let receipt = self.audit.append(event);
        if !receipt.accepted {
            self.diagnostics.warn(
                "commit_audit_append_failed",
                receipt.error.as_deref().unwrap_or("unknown"),
            );
        }
    }
}

/// Extracts the sandbox id recorded in a request's context object.
fn sandbox_id_from(request: &ApprovalRequest) -> Option<SandboxId> {
    request
        .context
        .get("sandbox_id")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(SandboxId::new)
}
