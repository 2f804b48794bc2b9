// toolgate-core/src/core/definitions.rs
// ============================================================================
// Module: ToolGate Definitions
// Description: Tool, agent, and workflow definitions with invariant checks.
// Purpose: Validate the registered surfaces before any call is gated.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Definitions are immutable once registered. Workflow validation enforces the
//! structural invariants the orchestrator relies on: a commit stage requires a
//! review stage at a lower index, and every stage must have an agent whose
//! role serves that stage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::DomainTag;
use crate::core::identifiers::ToolName;
use crate::core::taxonomy::AgentRole;
use crate::core::taxonomy::Capability;
use crate::core::taxonomy::ExecutionMode;
use crate::core::taxonomy::RiskLevel;
use crate::core::taxonomy::Stage;
use crate::core::taxonomy::Verification;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Definition validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// A required field is missing or empty.
    #[error("fail-closed: {0}: missing or empty")]
    MissingField(&'static str),
    /// The tool input schema is not a JSON object.
    #[error("fail-closed: input_schema: must be a JSON object")]
    InvalidInputSchema,
    /// Agent max turns must be positive.
    #[error("fail-closed: max_turns: must be at least 1")]
    InvalidMaxTurns,
    /// Workflow stage list contains a duplicate.
    #[error("fail-closed: stages: duplicate stage `{0}`")]
    DuplicateStage(Stage),
    /// Commit stage requires a preceding review stage.
    #[error("fail-closed: stages: commit requires review at a lower index")]
    CommitWithoutReview,
    /// A stage lacks an agent with the matching role.
    #[error("fail-closed: agents: no agent with a role serving stage `{0}`")]
    MissingStageAgent(Stage),
}

// ============================================================================
// SECTION: Tool Definition
// ============================================================================

/// Tool definition registered with the router.
///
/// # Invariants
/// - Immutable once registered; the router rejects re-registration.
/// - Name follows the `{domain}.{action}` convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: ToolName,
    /// Human-readable description.
    pub description: String,
    /// Declared capability.
    pub capability: Capability,
    /// Declared risk.
    pub risk: RiskLevel,
    /// Execution mode demanded from the router.
    pub execution_mode: ExecutionMode,
    /// Verification regime.
    pub verification: Verification,
    /// JSON Schema for call arguments.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when the name is empty or the input schema
    /// is not an object.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.is_empty() {
            return Err(DefinitionError::MissingField("name"));
        }
        if !self.input_schema.is_object() {
            return Err(DefinitionError::InvalidInputSchema);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Agent Definition
// ============================================================================

/// Agent definition bound into workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent name.
    pub name: String,
    /// Role served within workflows.
    pub role: AgentRole,
    /// System prompt driving the model.
    pub system_prompt: String,
    /// Tool names this agent may call.
    pub allowed_tools: BTreeSet<ToolName>,
    /// Maximum model turns per stage.
    pub max_turns: u32,
}

impl AgentDefinition {
    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when the name is empty or max turns is zero.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.is_empty() {
            return Err(DefinitionError::MissingField("agent name"));
        }
        if self.max_turns == 0 {
            return Err(DefinitionError::InvalidMaxTurns);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Workflow Definition
// ============================================================================

/// Workflow definition: ordered stages and the agents that serve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name.
    pub name: String,
    /// Domain owning this workflow.
    pub domain: DomainTag,
    /// Ordered stage list.
    pub stages: Vec<Stage>,
    /// Agents available to the workflow.
    pub agents: Vec<AgentDefinition>,
}

impl WorkflowDefinition {
    /// Validates the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] on an empty name or stage list, duplicate
    /// stages, a commit stage without a preceding review, or a stage with no
    /// matching-role agent.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.is_empty() {
            return Err(DefinitionError::MissingField("workflow name"));
        }
        if self.domain.is_empty() {
            return Err(DefinitionError::MissingField("workflow domain"));
        }
        if self.stages.is_empty() {
            return Err(DefinitionError::MissingField("stages"));
        }
        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(*stage) {
                return Err(DefinitionError::DuplicateStage(*stage));
            }
        }
        let commit_index = self.stages.iter().position(|stage| *stage == Stage::Commit);
        if let Some(commit_index) = commit_index {
            let review_index = self.stages.iter().position(|stage| *stage == Stage::Review);
            match review_index {
                Some(review_index) if review_index < commit_index => {}
                _ => return Err(DefinitionError::CommitWithoutReview),
            }
        }
        for agent in &self.agents {
            agent.validate()?;
        }
        for stage in &self.stages {
            if self.agent_for_stage(*stage).is_none() {
                return Err(DefinitionError::MissingStageAgent(*stage));
            }
        }
        Ok(())
    }

    /// Returns the first agent whose role serves the given stage.
    #[must_use]
    pub fn agent_for_stage(&self, stage: Stage) -> Option<&AgentDefinition> {
        self.agents.iter().find(|agent| agent.role.matches_stage(stage))
    }
}
