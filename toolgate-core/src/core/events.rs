// toolgate-core/src/core/events.rs
// ============================================================================
// Module: ToolGate Audit Events
// Description: Append-only audit records, query filters, and statistics.
// Purpose: Define the audit surface shared by in-memory and durable backends.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every routed tool call, commit execution, and orchestrator transition
//! produces exactly one [`AgentActionEvent`]. Events are append-only; nothing
//! outside the audit log retains pointers into it. Validation rejects events
//! with missing identity fields so a malformed record can never be persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::EventId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SandboxId;
use crate::core::identifiers::ToolName;
use crate::core::taxonomy::Stage;
use crate::core::taxonomy::TrustLevel;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit event validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    /// A required field is missing or empty.
    #[error("fail-closed: {0}: missing or empty")]
    MissingField(&'static str),
    /// Confidence is outside the unit interval.
    #[error("fail-closed: confidence: must be within 0..=1")]
    InvalidConfidence,
}

// ============================================================================
// SECTION: Audit Event
// ============================================================================

/// Append-only record of one agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActionEvent {
    /// Event identifier.
    pub id: EventId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Domain tag (free text in audit payloads).
    pub domain: String,
    /// Workflow name.
    pub workflow: String,
    /// Agent name.
    pub agent: String,
    /// Run identifier.
    pub run_id: RunId,
    /// Trust level decided by the gate.
    pub trust_level: TrustLevel,
    /// Stage in which the action occurred.
    pub stage: Stage,
    /// Intent text describing the action.
    pub intent: String,
    /// Tool name when the action was a tool call.
    pub tool_name: Option<ToolName>,
    /// Tool arguments.
    pub tool_args: Value,
    /// Tool result.
    pub tool_result: Value,
    /// Artifact references.
    pub artifact_refs: Vec<String>,
    /// Warnings raised during the action.
    pub warnings: Vec<String>,
    /// Errors raised during the action.
    pub errors: Vec<String>,
    /// Summary text.
    pub summary: String,
    /// Confidence in the unit interval.
    pub confidence: f64,
    /// Linked approval request, if any.
    pub approval_request_id: Option<RequestId>,
    /// Linked sandbox, if any.
    pub sandbox_id: Option<SandboxId>,
    /// Artifact paths collected by the sandbox.
    pub sandbox_artifacts: Vec<String>,
}

impl AgentActionEvent {
    /// Creates an event with a fresh id, the current time, and empty optional
    /// fields. Callers fill in tool and outcome details before appending.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        workflow: impl Into<String>,
        agent: impl Into<String>,
        run_id: RunId,
        trust_level: TrustLevel,
        stage: Stage,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            created_at: Timestamp::now(),
            domain: domain.into(),
            workflow: workflow.into(),
            agent: agent.into(),
            run_id,
            trust_level,
            stage,
            intent: intent.into(),
            tool_name: None,
            tool_args: Value::Null,
            tool_result: Value::Null,
            artifact_refs: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            summary: String::new(),
            confidence: 1.0,
            approval_request_id: None,
            sandbox_id: None,
            sandbox_artifacts: Vec::new(),
        }
    }

    /// Validates the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`EventValidationError`] when an identity field is empty or
    /// confidence is out of range.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.domain.is_empty() {
            return Err(EventValidationError::MissingField("domain"));
        }
        if self.workflow.is_empty() {
            return Err(EventValidationError::MissingField("workflow"));
        }
        if self.agent.is_empty() {
            return Err(EventValidationError::MissingField("agent"));
        }
        if self.run_id.is_empty() {
            return Err(EventValidationError::MissingField("run_id"));
        }
        if self.intent.is_empty() {
            return Err(EventValidationError::MissingField("intent"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EventValidationError::InvalidConfidence);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Append Receipt
// ============================================================================

/// Outcome of an append call.
///
/// # Invariants
/// - `accepted = false` means the event was not persisted; the id still
///   identifies the rejected payload in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Identifier of the appended (or rejected) event.
    pub event_id: EventId,
    /// Whether the event was accepted for persistence.
    pub accepted: bool,
    /// Failure detail when not accepted.
    pub error: Option<String>,
}

impl AppendReceipt {
    /// Builds an accepted receipt.
    #[must_use]
    pub const fn accepted(event_id: EventId) -> Self {
        Self {
            event_id,
            accepted: true,
            error: None,
        }
    }

    /// Builds a rejected receipt carrying the failure detail.
    #[must_use]
    pub const fn rejected(event_id: EventId, error: String) -> Self {
        Self {
            event_id,
            accepted: false,
            error: Some(error),
        }
    }
}

// ============================================================================
// SECTION: Query Filter
// ============================================================================

/// Filter for audit queries. All fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Match a specific run.
    pub run_id: Option<RunId>,
    /// Match a workflow name.
    pub workflow: Option<String>,
    /// Match an agent name.
    pub agent: Option<String>,
    /// Match a domain.
    pub domain: Option<String>,
    /// Match a trust level.
    pub trust_level: Option<TrustLevel>,
    /// Match a stage.
    pub stage: Option<Stage>,
    /// Inclusive lower bound on creation time.
    pub since: Option<Timestamp>,
    /// Inclusive upper bound on creation time.
    pub until: Option<Timestamp>,
}

impl EventFilter {
    /// Returns true when the event satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, event: &AgentActionEvent) -> bool {
        if let Some(run_id) = &self.run_id {
            if &event.run_id != run_id {
                return false;
            }
        }
        if let Some(workflow) = &self.workflow {
            if &event.workflow != workflow {
                return false;
            }
        }
        if let Some(agent) = &self.agent {
            if &event.agent != agent {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if &event.domain != domain {
                return false;
            }
        }
        if let Some(trust_level) = self.trust_level {
            if event.trust_level != trust_level {
                return false;
            }
        }
        if let Some(stage) = self.stage {
            if event.stage != stage {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at.is_before(since) {
                return false;
            }
        }
        if let Some(until) = self.until {
            if until.is_before(event.created_at) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// SECTION: Statistics
// ============================================================================

/// Event counts bucketed for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Total matching events.
    pub total: u64,
    /// Counts by trust level.
    pub by_trust_level: BTreeMap<TrustLevel, u64>,
    /// Counts by stage.
    pub by_stage: BTreeMap<Stage, u64>,
    /// Counts by domain.
    pub by_domain: BTreeMap<String, u64>,
    /// Events carrying a non-empty errors array.
    pub error_events: u64,
}

impl AuditStats {
    /// Folds one event into the statistics.
    pub fn record(&mut self, event: &AgentActionEvent) {
        self.total += 1;
        *self.by_trust_level.entry(event.trust_level).or_insert(0) += 1;
        *self.by_stage.entry(event.stage).or_insert(0) += 1;
        *self.by_domain.entry(event.domain.clone()).or_insert(0) += 1;
        if !event.errors.is_empty() {
            self.error_events += 1;
        }
    }
}
