// toolgate-core/src/core/mod.rs
// ============================================================================
// Module: ToolGate Core Types
// Description: Value types shared by every ToolGate component.
// Purpose: Re-export the taxonomy, identifiers, and record types.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! Core types are plain data with validation helpers. Policy lives in
//! `crate::runtime`; storage lives behind `crate::interfaces`.

pub mod approvals;
pub mod commit_tools;
pub mod definitions;
pub mod events;
pub mod identifiers;
pub mod staged;
pub mod taxonomy;
pub mod time;

pub use approvals::ApprovalDecision;
pub use approvals::ApprovalRequest;
pub use approvals::ApprovalValidationError;
pub use approvals::AutoApproveEligibility;
pub use approvals::NewApprovalRequest;
pub use approvals::PendingFilter;
pub use commit_tools::CommitTool;
pub use commit_tools::commit_tool_for;
pub use commit_tools::matches_action;
pub use definitions::AgentDefinition;
pub use definitions::DefinitionError;
pub use definitions::ToolDefinition;
pub use definitions::WorkflowDefinition;
pub use events::AgentActionEvent;
pub use events::AppendReceipt;
pub use events::AuditStats;
pub use events::EventFilter;
pub use events::EventValidationError;
pub use identifiers::ChangeId;
pub use identifiers::CommitId;
pub use identifiers::DecisionId;
pub use identifiers::DomainTag;
pub use identifiers::EventId;
pub use identifiers::RequestId;
pub use identifiers::RunId;
pub use identifiers::SandboxId;
pub use identifiers::ToolName;
pub use staged::StagedChange;
pub use taxonomy::AgentRole;
pub use taxonomy::ApprovalStatus;
pub use taxonomy::Capability;
pub use taxonomy::ChangeType;
pub use taxonomy::DecisionKind;
pub use taxonomy::ExecutionMode;
pub use taxonomy::ReviewerVerdict;
pub use taxonomy::RiskLevel;
pub use taxonomy::Stage;
pub use taxonomy::TaxonomyError;
pub use taxonomy::TrustLevel;
pub use taxonomy::Verification;
pub use time::Timestamp;
