// toolgate-core/src/core/staged.rs
// ============================================================================
// Module: ToolGate Staged Changes
// Description: Mutations buffered in a sandbox ledger until commit.
// ============================================================================

//! ## Overview
//! A staged change is a mutation captured during sandboxed execution. Changes
//! accumulate per sandbox, are discarded on rollback, and are materialized by
//! the commit boundary through `apply_changes`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ChangeId;
use crate::core::identifiers::SandboxId;
use crate::core::identifiers::ToolName;
use crate::core::taxonomy::ChangeType;
use crate::core::time::Timestamp;

/// Mutation captured in a sandbox ledger, not yet applied to production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedChange {
    /// Change identifier.
    pub id: ChangeId,
    /// Sandbox owning the change.
    pub sandbox_id: SandboxId,
    /// Tool that produced the change.
    pub tool_name: ToolName,
    /// Kind of mutation.
    pub change_type: ChangeType,
    /// Entity type being mutated.
    pub entity_type: String,
    /// Entity identifier when known.
    pub entity_id: Option<String>,
    /// Change payload.
    pub payload: Value,
    /// Capture time.
    pub recorded_at: Timestamp,
}
