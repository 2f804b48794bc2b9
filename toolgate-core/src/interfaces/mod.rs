// toolgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: ToolGate Interfaces
// Description: Backend-agnostic seams for approvals, audit, sandbox, and LLM.
// Purpose: Define the contract surfaces used by the ToolGate runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how ToolGate integrates with storage, isolation, and
//! model backends without embedding backend details. Implementations must
//! fail closed on missing or invalid data: the runtime never invokes a tool
//! handler after a seam reports an error.
//!
//! The trust gate depends only on [`ApprovalQueries`], the two read methods
//! it needs. This keeps the gate, router, and store free of ownership cycles:
//! data flows through the seams, but no component owns another's state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::AgentActionEvent;
use crate::core::AgentDefinition;
use crate::core::AppendReceipt;
use crate::core::ApprovalDecision;
use crate::core::ApprovalRequest;
use crate::core::AuditStats;
use crate::core::CommitId;
use crate::core::CommitTool;
use crate::core::DecisionKind;
use crate::core::EventFilter;
use crate::core::NewApprovalRequest;
use crate::core::PendingFilter;
use crate::core::RequestId;
use crate::core::ReviewerVerdict;
use crate::core::RunId;
use crate::core::SandboxId;
use crate::core::StagedChange;
use crate::core::ToolName;

// ============================================================================
// SECTION: Call Context
// ============================================================================

/// Context accompanying every tool call through the router and gate.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Domain owning the run.
    pub domain: String,
    /// Run identifier.
    pub run_id: RunId,
    /// Workflow name.
    pub workflow: String,
    /// Calling agent name.
    pub agent: String,
    /// Intent text for the audit trail.
    pub intent: String,
    /// Reviewer verdict threaded from the review stage.
    pub reviewer_verdict: Option<ReviewerVerdict>,
    /// Reviewer notes threaded from the review stage.
    pub reviewer_notes: Option<String>,
    /// Sandbox the call is associated with, when already assigned.
    pub sandbox_id: Option<SandboxId>,
}

impl CallContext {
    /// Creates a context with empty review state.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        run_id: RunId,
        workflow: impl Into<String>,
        agent: impl Into<String>,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            run_id,
            workflow: workflow.into(),
            agent: agent.into(),
            intent: intent.into(),
            reviewer_verdict: None,
            reviewer_notes: None,
            sandbox_id: None,
        }
    }
}

// ============================================================================
// SECTION: Approval Store
// ============================================================================

/// Approval store errors.
#[derive(Debug, Error)]
pub enum ApprovalStoreError {
    /// Underlying storage failed.
    #[error("approval store failure: {0}")]
    Storage(String),
    /// Request does not exist.
    #[error("fail-closed: approval request not found: {0}")]
    NotFound(String),
    /// Request already carries a decision or reached a terminal status.
    #[error("fail-closed: approval request already decided: {0}")]
    AlreadyDecided(String),
    /// Request expired before the decision.
    #[error("fail-closed: approval request expired: {0}")]
    Expired(String),
    /// Input failed validation.
    #[error("{0}")]
    Invalid(String),
}

/// Read capability over approval requests.
///
/// The trust gate consumes only this surface.
pub trait ApprovalQueries: Send + Sync {
    /// Loads a request by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApprovalStoreError>;

    /// Loads all requests created for a run.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn requests_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRequest>, ApprovalStoreError>;
}

/// Full approval store surface.
pub trait ApprovalStore: ApprovalQueries {
    /// Creates a PENDING request with computed expiry and eligibility.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError::Invalid`] on malformed input and
    /// [`ApprovalStoreError::Storage`] on persistence failure.
    fn create_request(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequest, ApprovalStoreError>;

    /// Returns PENDING requests whose expiry has not passed.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn pending_requests(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<ApprovalRequest>, ApprovalStoreError>;

    /// Returns true when the request exists with status APPROVED.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn is_approved(&self, id: &RequestId) -> Result<bool, ApprovalStoreError>;

    /// Returns true when the request exists, is PENDING, and has not expired.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn is_pending(&self, id: &RequestId) -> Result<bool, ApprovalStoreError>;

    /// Transitions all expired PENDING requests to EXPIRED.
    ///
    /// Idempotent: a second sweep with no intervening creation returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn expire_stale(&self) -> Result<u64, ApprovalStoreError>;

    /// Records a decision and transitions the request status atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError::NotFound`] for an unknown request,
    /// [`ApprovalStoreError::AlreadyDecided`] when the request is terminal or
    /// already carries a decision, [`ApprovalStoreError::Expired`] when the
    /// expiry passed, and [`ApprovalStoreError::Storage`] on failure.
    fn create_decision(
        &self,
        request_id: &RequestId,
        decided_by: &str,
        decision: DecisionKind,
        notes: Option<String>,
        metadata: Value,
    ) -> Result<ApprovalDecision, ApprovalStoreError>;

    /// Loads the decision recorded for a request, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError`] when storage fails.
    fn decision_for(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError>;

    /// Runs the auto-approval gates and, when all pass, records an APPROVE
    /// decision attributed to the system auto-approver.
    ///
    /// Policy failures return `Ok(None)`; only storage failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalStoreError::Storage`] on persistence failure.
    fn auto_approve(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError>;
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Audit log errors.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying storage failed.
    #[error("audit log failure: {0}")]
    Storage(String),
}

/// Append-only audit log.
///
/// Appends never throw for policy reasons: validation failures come back as
/// unaccepted receipts, and fire-and-forget backends swallow persistence
/// failures after diagnosing them. Callers must not depend on audit
/// durability for correctness.
pub trait AuditLog: Send + Sync {
    /// Appends an event, returning a receipt.
    fn append(&self, event: AgentActionEvent) -> AppendReceipt;

    /// Queries events matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when storage fails.
    fn query(&self, filter: &EventFilter) -> Result<Vec<AgentActionEvent>, AuditError>;

    /// Returns counts bucketed by trust level, stage, and domain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when storage fails.
    fn stats(&self, run_id: Option<&RunId>) -> Result<AuditStats, AuditError>;
}

// ============================================================================
// SECTION: Tool Handlers
// ============================================================================

/// Tool handler errors.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler reported a failure.
    #[error("tool handler failure: {0}")]
    Failed(String),
}

/// Opaque tool handler registered by domain adapters.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with validated arguments.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the tool fails.
    async fn invoke(&self, args: Value, ctx: &CallContext) -> Result<Value, HandlerError>;
}

// ============================================================================
// SECTION: Commit Actions
// ============================================================================

/// Input delivered to a commit action handler.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Fresh commit identifier for idempotency.
    pub commit_id: CommitId,
    /// Run being committed.
    pub run_id: RunId,
    /// Commit tool being executed.
    pub tool: CommitTool,
    /// Full tool name as invoked.
    pub tool_name: ToolName,
    /// Call arguments.
    pub args: Value,
    /// Approval request that authorized the commit.
    pub approval: ApprovalRequest,
    /// Staged changes drained for `apply_changes`; empty otherwise.
    pub staged_changes: Vec<StagedChange>,
}

/// Handler for one of the five commit actions.
///
/// Implementations must be idempotent per commit id.
#[async_trait]
pub trait CommitAction: Send + Sync {
    /// Executes the commit action.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the action fails.
    async fn execute(&self, request: &CommitRequest) -> Result<Value, HandlerError>;
}

// ============================================================================
// SECTION: Sandbox Runner
// ============================================================================

/// Closed set of sandbox denial and failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxFailureReason {
    /// Isolation binary is not installed.
    DockerNotAvailable,
    /// Isolation daemon is not running.
    DockerNotRunning,
    /// Container image could not be pulled.
    ImagePullFailed,
    /// A blocked environment variable name was requested.
    BlockedEnvVarRequested,
    /// Execution input failed validation.
    InvalidInput,
    /// Network allowlist configuration is invalid.
    NetworkAllowlistInvalid,
    /// Artifacts directory could not be created.
    ArtifactsDirCreationFailed,
    /// Wall-clock timeout expired.
    ExecutionTimeout,
    /// Container failed to start.
    ContainerStartupFailed,
    /// Unclassified failure.
    UnknownError,
}

impl SandboxFailureReason {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DockerNotAvailable => "DOCKER_NOT_AVAILABLE",
            Self::DockerNotRunning => "DOCKER_NOT_RUNNING",
            Self::ImagePullFailed => "IMAGE_PULL_FAILED",
            Self::BlockedEnvVarRequested => "BLOCKED_ENV_VAR_REQUESTED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::NetworkAllowlistInvalid => "NETWORK_ALLOWLIST_INVALID",
            Self::ArtifactsDirCreationFailed => "ARTIFACTS_DIR_CREATION_FAILED",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::ContainerStartupFailed => "CONTAINER_STARTUP_FAILED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

/// Request for sandboxed execution.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Reuse an existing sandbox when set; otherwise a fresh id is minted.
    pub sandbox_id: Option<SandboxId>,
    /// Tool being executed.
    pub tool_name: ToolName,
    /// Call arguments.
    pub args: Value,
    /// Environment variables requested for the execution.
    pub env: BTreeMap<String, String>,
    /// Container command for container-native tools.
    pub command: Option<Vec<String>>,
}

/// Result of a sandboxed execution.
#[derive(Debug, Clone)]
pub struct SandboxRun {
    /// Whether the handler ran and succeeded.
    pub success: bool,
    /// Handler result on success.
    pub result: Option<Value>,
    /// Failure detail.
    pub error: Option<String>,
    /// Sandbox identifier, stable across the run.
    pub sandbox_id: SandboxId,
    /// Artifact paths collected from the artifacts directory.
    pub artifact_paths: Vec<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// True when the wall-clock timeout expired.
    pub timed_out: bool,
    /// Process exit code when a process ran.
    pub exit_code: Option<i32>,
    /// Sample of captured stdout.
    pub stdout_sample: Option<String>,
    /// Sample of captured stderr.
    pub stderr_sample: Option<String>,
    /// Failure reason from the closed set.
    pub failure_reason: Option<SandboxFailureReason>,
    /// True when policy denied the execution before the handler ran.
    pub denied_by_policy: bool,
}

/// Isolated execution with a staged-change ledger.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Executes a handler under isolation and records staged changes.
    ///
    /// Denials return a result with `denied_by_policy = true`; the handler is
    /// never invoked on denial.
    async fn execute(
        &self,
        request: SandboxRequest,
        handler: Arc<dyn ToolHandler>,
        ctx: &CallContext,
    ) -> SandboxRun;

    /// Returns the staged changes accumulated for a sandbox.
    fn staged_changes(&self, sandbox_id: &SandboxId) -> Vec<StagedChange>;

    /// Drains the staged changes for commit materialization.
    fn commit_changes(&self, sandbox_id: &SandboxId) -> Vec<StagedChange>;

    /// Discards the staged changes, returning how many were dropped.
    fn rollback_changes(&self, sandbox_id: &SandboxId) -> usize;

    /// Removes artifacts and clears all state for a sandbox.
    fn cleanup(&self, sandbox_id: &SandboxId);
}

// ============================================================================
// SECTION: Agent Model
// ============================================================================

/// Model errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model backend failed.
    #[error("model failure: {0}")]
    Failed(String),
}

/// Message role in a model conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Host-provided input.
    User,
    /// Model output.
    Assistant,
    /// Tool result fed back to the model.
    Tool,
}

/// One message in a model conversation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelMessage {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
}

/// Tool call emitted by the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelToolCall {
    /// Tool to invoke.
    pub tool: ToolName,
    /// Call arguments.
    pub args: Value,
}

/// One model turn: text plus any emitted tool calls.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelTurn {
    /// Assistant text.
    pub text: String,
    /// Tool calls to dispatch before the next turn.
    pub tool_calls: Vec<ModelToolCall>,
}

/// LLM backend contract driven by the orchestrator.
#[async_trait]
pub trait AgentModel: Send + Sync {
    /// Produces the next turn for an agent conversation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the backend fails.
    async fn complete(
        &self,
        agent: &AgentDefinition,
        messages: &[ModelMessage],
    ) -> Result<ModelTurn, ModelError>;
}

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

/// Injected diagnostics sink for library-safe warnings.
pub trait DiagnosticsSink: Send + Sync {
    /// Records a warning.
    fn warn(&self, code: &str, message: &str);

    /// Records an informational note.
    fn info(&self, code: &str, message: &str);
}

/// Diagnostics sink that writes JSON lines to stderr.
pub struct StderrDiagnostics;

impl DiagnosticsSink for StderrDiagnostics {
    fn warn(&self, code: &str, message: &str) {
        emit("warn", code, message);
    }

    fn info(&self, code: &str, message: &str) {
        emit("info", code, message);
    }
}

/// No-op diagnostics sink.
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn warn(&self, _code: &str, _message: &str) {}

    fn info(&self, _code: &str, _message: &str) {}
}

/// Writes one diagnostics line to stderr, ignoring write failures.
fn emit(level: &str, code: &str, message: &str) {
    let payload = json!({
        "level": level,
        "code": code,
        "message": message,
    });
    let _ = writeln!(std::io::stderr(), "{payload}");
}
