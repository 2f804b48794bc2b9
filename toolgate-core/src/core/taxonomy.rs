// toolgate-core/src/core/taxonomy.rs
// ============================================================================
// Module: ToolGate Taxonomy
// Description: Closed enumerations for trust levels, capabilities, and stages.
// Purpose: Provide the shared vocabulary validated at every component boundary.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every cross-component boundary in ToolGate validates its inputs against
//! this taxonomy. Enumerations are closed: unknown values are rejected with a
//! `fail-closed` error, never coerced. String forms are stable because they
//! are persisted verbatim by the storage backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Taxonomy parsing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    /// Value is not a member of the closed enumeration.
    #[error("fail-closed: {field}: unknown value `{value}`")]
    UnknownValue {
        /// Field being parsed.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Builds the unknown-value error for a taxonomy field.
fn unknown(field: &'static str, value: &str) -> TaxonomyError {
    TaxonomyError::UnknownValue {
        field,
        value: value.to_string(),
    }
}

// ============================================================================
// SECTION: Trust Levels
// ============================================================================

/// Trust level assigned to a tool call, ordered from full autonomy to
/// human-mandatory oversight.
///
/// # Invariants
/// - The derived ordering is total: `L0 < L1 < L2 < L3 < L4`.
/// - `L4` always requires human approval and is never auto-approved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum TrustLevel {
    /// Full autonomy; read-only operations.
    #[default]
    L0,
    /// Proposal only; no side effects.
    L1,
    /// Sandboxed mutation; reversible.
    L2,
    /// External side effect; reviewer approval required.
    L3,
    /// Irreversible or critical; human approval mandatory.
    L4,
}

impl TrustLevel {
    /// All trust levels in ascending order.
    pub const ALL: [Self; 5] = [Self::L0, Self::L1, Self::L2, Self::L3, Self::L4];

    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L0 => "L0",
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
            Self::L4 => "L4",
        }
    }

    /// Parses a trust level from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for values outside `L0..L4`.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "L0" => Ok(Self::L0),
            "L1" => Ok(Self::L1),
            "L2" => Ok(Self::L2),
            "L3" => Ok(Self::L3),
            "L4" => Ok(Self::L4),
            other => Err(unknown("trust_level", other)),
        }
    }

    /// Returns true when the level mandates a human decision.
    #[must_use]
    pub const fn requires_human_approval(self) -> bool {
        matches!(self, Self::L4)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Capabilities and Risk
// ============================================================================

/// Capability a tool declares over host data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read-only access.
    Read,
    /// Produces proposals without touching data.
    Propose,
    /// Mutates data (reversible under sandboxing).
    Write,
    /// Reaches external systems with observable effects.
    SideEffects,
}

impl Capability {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Propose => "propose",
            Self::Write => "write",
            Self::SideEffects => "side_effects",
        }
    }

    /// Parses a capability from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown capability labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "read" => Ok(Self::Read),
            "propose" => Ok(Self::Propose),
            "write" => Ok(Self::Write),
            "side_effects" => Ok(Self::SideEffects),
            other => Err(unknown("capability", other)),
        }
    }

    /// Returns true when the capability mutates state anywhere.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Write | Self::SideEffects)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared risk of a tool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk; always L4.
    Critical,
}

impl RiskLevel {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses a risk level from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown risk labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(unknown("risk", other)),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Execution and Verification
// ============================================================================

/// Execution mode a tool demands from the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// May run in the host process.
    Direct,
    /// Must run under sandbox isolation.
    SandboxOnly,
}

impl ExecutionMode {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SandboxOnly => "sandbox_only",
        }
    }

    /// Parses an execution mode from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown mode labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "direct" => Ok(Self::Direct),
            "sandbox_only" => Ok(Self::SandboxOnly),
            other => Err(unknown("execution_mode", other)),
        }
    }
}

/// Verification regime attached to a tool definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// No verification.
    None,
    /// Rule-based verification.
    Rules,
    /// Verification by independent agents.
    MultiAgent,
    /// Verification by a human approver.
    HumanApproval,
}

impl Verification {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rules => "rules",
            Self::MultiAgent => "multi_agent",
            Self::HumanApproval => "human_approval",
        }
    }

    /// Parses a verification regime from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "none" => Ok(Self::None),
            "rules" => Ok(Self::Rules),
            "multi_agent" => Ok(Self::MultiAgent),
            "human_approval" => Ok(Self::HumanApproval),
            other => Err(unknown("verification", other)),
        }
    }
}

// ============================================================================
// SECTION: Stages and Roles
// ============================================================================

/// Workflow stage, ordered by pipeline position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Planning stage.
    Plan,
    /// Execution stage.
    Execute,
    /// Review stage.
    Review,
    /// Commit stage.
    Commit,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [Self::Plan, Self::Execute, Self::Review, Self::Commit];

    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Execute => "execute",
            Self::Review => "review",
            Self::Commit => "commit",
        }
    }

    /// Parses a stage from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown stage labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "plan" => Ok(Self::Plan),
            "execute" => Ok(Self::Execute),
            "review" => Ok(Self::Review),
            "commit" => Ok(Self::Commit),
            other => Err(unknown("stage", other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role an agent plays inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Produces plans.
    Planner,
    /// Executes and commits work.
    Worker,
    /// Reviews work and issues verdicts.
    Reviewer,
}

impl AgentRole {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Worker => "worker",
            Self::Reviewer => "reviewer",
        }
    }

    /// Parses a role from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown role labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "planner" => Ok(Self::Planner),
            "worker" => Ok(Self::Worker),
            "reviewer" => Ok(Self::Reviewer),
            other => Err(unknown("agent_role", other)),
        }
    }

    /// Returns true when this role serves the given stage.
    #[must_use]
    pub const fn matches_stage(self, stage: Stage) -> bool {
        matches!(
            (self, stage),
            (Self::Planner, Stage::Plan)
                | (Self::Worker, Stage::Execute | Stage::Commit)
                | (Self::Reviewer, Stage::Review)
        )
    }
}

// ============================================================================
// SECTION: Verdicts, Statuses, Decisions
// ============================================================================

/// Reviewer verdict threaded from the review stage into commit gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewerVerdict {
    /// Reviewer approved the work.
    #[serde(rename = "PASS")]
    Pass,
    /// Reviewer rejected the work.
    #[serde(rename = "FAIL")]
    Fail,
}

impl ReviewerVerdict {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }

    /// Parses a verdict from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for values other than PASS/FAIL.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            other => Err(unknown("reviewer_verdict", other)),
        }
    }
}

impl fmt::Display for ReviewerVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an approval request.
///
/// # Invariants
/// - Transitions are `PENDING -> {APPROVED, REJECTED, EXPIRED}` only.
/// - A decided or expired request is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    #[serde(rename = "PENDING")]
    Pending,
    /// Approved by a human or the auto-approval path.
    #[serde(rename = "APPROVED")]
    Approved,
    /// Rejected.
    #[serde(rename = "REJECTED")]
    Rejected,
    /// Expired before a decision was made.
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl ApprovalStatus {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses a status from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown status labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(unknown("status", other)),
        }
    }

    /// Returns true when no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision recorded against an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionKind {
    /// Approve the request.
    #[serde(rename = "APPROVE")]
    Approve,
    /// Reject the request.
    #[serde(rename = "REJECT")]
    Reject,
}

impl DecisionKind {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }

    /// Parses a decision kind from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown decision labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            other => Err(unknown("decision", other)),
        }
    }

    /// Returns the request status induced by this decision.
    #[must_use]
    pub const fn resulting_status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Kind of mutation captured as a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Creates an entity.
    Create,
    /// Updates an entity.
    Update,
    /// Deletes an entity.
    Delete,
}

impl ChangeType {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parses a change type from its stable string form.
    ///
    /// # Errors
    ///
    /// Returns [`TaxonomyError::UnknownValue`] for unknown change labels.
    pub fn parse(value: &str) -> Result<Self, TaxonomyError> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(unknown("change_type", other)),
        }
    }
}
