// toolgate-core/src/runtime/router.rs
// ============================================================================
// Module: ToolGate Tool Router
// Description: Registration, gating, dispatch, and audit for tool calls.
// Purpose: Make the trust gate, sandbox, and commit boundary unavoidable for
//          every tool invocation.
// Dependencies: crate::core, crate::interfaces, crate::runtime, jsonschema
// ============================================================================

//! ## Overview
//! The router owns the registered tool surface. Every call passes input
//! validation, tool lookup, argument schema validation, trust gating, and,
//! for commit tools, the commit boundary's independent barrier before the
//! handler runs directly or inside the sandbox. Every outcome produces
//! exactly one audit event; an audit append failure is diagnosed but never
//! changes the result of an already-decided call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::AgentActionEvent;
use crate::core::EventId;
use crate::core::SandboxId;
use crate::core::Stage;
use crate::core::ToolDefinition;
use crate::core::ToolName;
use crate::core::TrustLevel;
use crate::core::commit_tools::commit_tool_for;
use crate::interfaces::ApprovalStore;
use crate::interfaces::AuditLog;
use crate::interfaces::CallContext;
use crate::interfaces::DiagnosticsSink;
use crate::interfaces::SandboxRequest;
use crate::interfaces::SandboxRunner;
use crate::interfaces::ToolHandler;
use crate::runtime::commit::CommitBoundary;
use crate::runtime::gate::GateDecision;
use crate::runtime::gate::TrustGate;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool registration errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Definition failed validation.
    #[error("fail-closed: invalid tool definition: {0}")]
    InvalidDefinition(String),
    /// Tool name is already registered.
    #[error("fail-closed: tool already registered: {0}")]
    DuplicateTool(String),
    /// Input schema failed to compile.
    #[error("fail-closed: invalid input schema for `{tool}`: {error}")]
    InvalidSchema {
        /// Tool being registered.
        tool: String,
        /// Compilation failure detail.
        error: String,
    },
}

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// One tool call presented to the router.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Tool to invoke.
    pub tool: ToolName,
    /// Call arguments.
    pub args: Value,
    /// Stage the call executes in.
    pub stage: Stage,
    /// Call context.
    pub context: CallContext,
}

/// Outcome of one routed tool call.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    /// Tool that was called.
    pub tool: ToolName,
    /// Whether the handler ran and succeeded.
    pub success: bool,
    /// Whether the gate allowed the call.
    pub allowed: bool,
    /// Gate decision when evaluation was reached.
    pub decision: Option<GateDecision>,
    /// Handler or commit result.
    pub result: Option<Value>,
    /// Failure or denial detail.
    pub error: Option<String>,
    /// True when the call is parked on approval state.
    pub pending_approval: bool,
    /// True when the orchestrator may trigger auto-approval.
    pub auto_approve_eligible: bool,
    /// Sandbox the call ran in, when sandboxed.
    pub sandbox_id: Option<SandboxId>,
    /// Audit event recorded for this outcome.
    pub event_id: Option<EventId>,
}

impl ToolCallOutcome {
    fn denied(tool: ToolName, decision: Option<GateDecision>, error: String) -> Self {
        let auto_approve_eligible =
            decision.as_ref().is_some_and(|decision| decision.auto_approve_eligible);
        let pending_approval = decision
            .as_ref()
            .is_some_and(|decision| !decision.allowed && decision.requires_approval);
        Self {
            tool,
            success: false,
            allowed: false,
            decision,
            result: None,
            error: Some(error),
            pending_approval,
            auto_approve_eligible,
            sandbox_id: None,
            event_id: None,
        }
    }
}

// ============================================================================
// SECTION: Router Config
// ============================================================================

/// Configuration inputs for building a tool router.
pub struct ToolRouterConfig {
    /// Trust gate.
    pub gate: TrustGate,
    /// Audit log receiving one event per outcome.
    pub audit: Arc<dyn AuditLog>,
    /// Approval store for approval-aware gating.
    pub approvals: Option<Arc<dyn ApprovalStore>>,
    /// Sandbox runner for sandboxed execution.
    pub sandbox: Option<Arc<dyn SandboxRunner>>,
    /// Commit boundary for the second barrier on commit tools.
    pub commit: Option<Arc<CommitBoundary>>,
    /// Diagnostics sink.
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Registered tool with its handler and compiled argument schema.
struct RegisteredTool {
    /// Immutable tool definition.
    definition: ToolDefinition,
    /// Handler invoked after gating.
    handler: Arc<dyn ToolHandler>,
    /// Compiled input schema.
    schema: Validator,
}

/// Tool router.
///
/// Registration happens at startup; afterwards the router is read-only and
/// may be shared behind an `Arc` across concurrent runs.
pub struct ToolRouter {
    /// Registered tools keyed by name.
    tools: BTreeMap<ToolName, RegisteredTool>,
    /// Trust gate.
    gate: TrustGate,
    /// Audit log.
    audit: Arc<dyn AuditLog>,
    /// Approval store, when approval-aware gating is wired.
    approvals: Option<Arc<dyn ApprovalStore>>,
    /// Sandbox runner, when sandboxed execution is wired.
    sandbox: Option<Arc<dyn SandboxRunner>>,
    /// Commit boundary, when the second barrier is wired.
    commit: Option<Arc<CommitBoundary>>,
    /// Diagnostics sink.
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl ToolRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new(config: ToolRouterConfig) -> Self {
        Self {
            tools: BTreeMap::new(),
            gate: config.gate,
            audit: config.audit,
            approvals: config.approvals,
            sandbox: config.sandbox,
            commit: config.commit,
            diagnostics: config.diagnostics,
        }
    }

    /// Registers a tool definition with its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] on an ill-formed definition, a duplicate name,
    /// or an input schema that fails to compile.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RouterError> {
        definition
            .validate()
            .map_err(|error| RouterError::InvalidDefinition(error.to_string()))?;
        if self.tools.contains_key(&definition.name) {
            return Err(RouterError::DuplicateTool(definition.name.to_string()));
        }
        let schema = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&definition.input_schema)
            .map_err(|error| RouterError::InvalidSchema {
                tool: definition.name.to_string(),
                error: error.to_string(),
            })?;
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
                schema,
            },
        );
        Ok(())
    }

    /// Returns a registered definition by name.
    #[must_use]
    pub fn definition(&self, name: &ToolName) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| &tool.definition)
    }

    /// Returns the registered tool names.
    #[must_use]
    pub fn tool_names(&self) -> Vec<ToolName> {
        self.tools.keys().cloned().collect()
    }

    /// Routes one tool call through validation, gating, and dispatch.
    pub async fn call(&self, request: ToolCallRequest) -> ToolCallOutcome {
        let ToolCallRequest {
            tool: tool_name,
            args,
            stage,
            context: ctx,
        } = request;

        if tool_name.is_empty() {
            let mut outcome = ToolCallOutcome::denied(
                tool_name.clone(),
                None,
                "fail-closed: tool name: missing or empty".to_string(),
            );
            outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
            return outcome;
        }
        if ctx.run_id.is_empty() || ctx.agent.is_empty() {
            let mut outcome = ToolCallOutcome::denied(
                tool_name.clone(),
                None,
                "fail-closed: call context: missing run_id or agent".to_string(),
            );
            outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
            return outcome;
        }
        let Some(registered) = self.tools.get(&tool_name) else {
            let mut outcome = ToolCallOutcome::denied(
                tool_name.clone(),
                None,
                format!("fail-closed: unknown tool `{tool_name}`"),
            );
            outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
            return outcome;
        };
        if let Err(error) = registered.schema.validate(&args) {
            let mut outcome = ToolCallOutcome::denied(
                tool_name.clone(),
                None,
                format!("fail-closed: invalid arguments for `{tool_name}`: {error}"),
            );
            outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
            return outcome;
        }

        let decision = match &self.approvals {
            Some(approvals) => self.gate.evaluate_with_approval(
                &registered.definition,
                stage,
                &ctx,
                approvals.as_ref(),
            ),
            None => self.gate.evaluate(&registered.definition, stage, &ctx),
        };

        if !decision.allowed {
            let reason = decision.reason.clone();
            let mut outcome = ToolCallOutcome::denied(tool_name.clone(), Some(decision), reason);
            outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
            return outcome;
        }

        // Commit tools pass through the boundary as a second, independent
        // barrier; the boundary emits the audit event for that execution.
        if commit_tool_for(&tool_name).is_some() {
            if let Some(commit) = &self.commit {
                let result = commit.execute_commit(&tool_name, &ctx.run_id, args, &ctx).await;
                return ToolCallOutcome {
                    tool: tool_name,
                    success: result.committed,
                    allowed: result.committed,
                    decision: Some(decision),
                    error: result.error.clone(),
                    result: result.result,
                    pending_approval: false,
                    auto_approve_eligible: false,
                    sandbox_id: ctx.sandbox_id.clone(),
                    event_id: None,
                };
            }
        }

        let mut outcome = if decision.sandboxed {
            self.dispatch_sandboxed(registered, &tool_name, args.clone(), &ctx, &decision).await
        } else {
            self.dispatch_direct(registered, &tool_name, args.clone(), &ctx, &decision).await
        };
        outcome.event_id = self.audit_outcome(&tool_name, &args, stage, &ctx, &outcome);
        outcome
    }

    /// Routes a batch of calls concurrently, keyed by tool name.
    pub async fn call_parallel(
        &self,
        requests: Vec<ToolCallRequest>,
    ) -> BTreeMap<ToolName, ToolCallOutcome> {
        let outcomes = join_all(requests.into_iter().map(|request| self.call(request))).await;
        outcomes.into_iter().map(|outcome| (outcome.tool.clone(), outcome)).collect()
    }

    /// Invokes the handler directly.
    async fn dispatch_direct(
        &self,
        registered: &RegisteredTool,
        tool_name: &ToolName,
        args: Value,
        ctx: &CallContext,
        decision: &GateDecision,
    ) -> ToolCallOutcome {
        match registered.handler.invoke(args, ctx).await {
            Ok(result) => ToolCallOutcome {
                tool: tool_name.clone(),
                success: true,
                allowed: true,
                decision: Some(decision.clone()),
                result: Some(result),
                error: None,
                pending_approval: false,
                auto_approve_eligible: false,
                sandbox_id: None,
                event_id: None,
            },
            Err(error) => ToolCallOutcome {
                tool: tool_name.clone(),
                success: false,
                allowed: true,
                decision: Some(decision.clone()),
                result: None,
                error: Some(error.to_string()),
                pending_approval: false,
                auto_approve_eligible: false,
                sandbox_id: None,
                event_id: None,
            },
        }
    }

    /// Invokes the handler through the sandbox.
    async fn dispatch_sandboxed(
        &self,
        registered: &RegisteredTool,
        tool_name: &ToolName,
        args: Value,
        ctx: &CallContext,
        decision: &GateDecision,
    ) -> ToolCallOutcome {
        let Some(sandbox) = &self.sandbox else {
            return ToolCallOutcome::denied(
                tool_name.clone(),
                Some(decision.clone()),
                format!("fail-closed: `{tool_name}` requires the sandbox and none is configured"),
            );
        };
        let request = SandboxRequest {
            sandbox_id: ctx.sandbox_id.clone(),
            tool_name: tool_name.clone(),
            args,
            env: BTreeMap::new(),
            command: None,
        };
        let run = sandbox.execute(request, Arc::clone(&registered.handler), ctx).await;
        let error = run.error.clone().or_else(|| {
            run.failure_reason.map(|reason| format!("fail-closed: {}", reason.as_str()))
        });
        ToolCallOutcome {
            tool: tool_name.clone(),
            success: run.success,
            allowed: !run.denied_by_policy,
            decision: Some(decision.clone()),
            result: run.result.clone(),
            error: if run.success { None } else { error },
            pending_approval: false,
            auto_approve_eligible: false,
            sandbox_id: Some(run.sandbox_id.clone()),
            event_id: None,
        }
    }

    /// Emits the single audit event for a routed outcome.
    fn audit_outcome(
        &self,
        tool_name: &ToolName,
        args: &Value,
        stage: Stage,
        ctx: &CallContext,
        outcome: &ToolCallOutcome,
    ) -> Option<EventId> {
        let trust_level = outcome
            .decision
            .as_ref()
            .map_or(TrustLevel::L4, |decision| decision.trust_level);
        let intent = if ctx.intent.is_empty() {
            format!("tool call `{tool_name}`")
        } else {
            ctx.intent.clone()
        };
        let mut event = AgentActionEvent::new(
            ctx.domain.clone(),
            ctx.workflow.clone(),
            ctx.agent.clone(),
            ctx.run_id.clone(),
            trust_level,
            stage,
            intent,
        );
        event.tool_name = Some(tool_name.clone());
        event.tool_args = args.clone();
        event.summary = if outcome.success {
            format!("tool `{tool_name}` succeeded")
        } else if outcome.pending_approval {
            format!("tool `{tool_name}` pending approval")
        } else {
            format!("tool `{tool_name}` denied or failed")
        };
        if let Some(error) = &outcome.error {
            event.errors.push(error.clone());
        }
        if outcome.pending_approval {
            event.warnings.push("awaiting approval".to_string());
        }
        event.sandbox_id = outcome.sandbox_id.clone();
        event.tool_result = match (&outcome.result, &outcome.decision) {
            (Some(result), _) => result.clone(),
            (None, Some(decision)) => json!({ "reason": decision.reason }),
            (None, None) => Value::Null,
        };
        let receipt = self.audit.append(event);
        if receipt.accepted {
            Some(receipt.event_id)
        } else {
            self.diagnostics.warn(
                "router_audit_append_failed",
                receipt.error.as_deref().unwrap_or("unknown"),
            );
            Some(receipt.event_id)
        }
    }
}
