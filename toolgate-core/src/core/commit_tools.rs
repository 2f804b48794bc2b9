// toolgate-core/src/core/commit_tools.rs
// ============================================================================
// Module: ToolGate Commit Tool Registry
// Description: The five named commit actions and their gating attributes.
// Purpose: Keep the production-write surface closed and centrally described.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Any production write must flow through exactly one of the five commit
//! actions listed here. The registry is fixed: adding a commit action is a
//! code change, never a runtime registration. `send_invoice` is L4 and, with
//! `mark_checkpoint_complete`, is never auto-approved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ToolName;
use crate::core::taxonomy::RiskLevel;
use crate::core::taxonomy::TrustLevel;

// ============================================================================
// SECTION: Commit Tools
// ============================================================================

/// The closed set of commit actions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CommitTool {
    /// Applies staged changes to production.
    ApplyChanges,
    /// Publishes the daily brief.
    PublishDailyBrief,
    /// Posts an alert to the configured channel.
    PostAlert,
    /// Marks a checkpoint complete.
    MarkCheckpointComplete,
    /// Sends an invoice.
    SendInvoice,
}

impl CommitTool {
    /// All commit tools.
    pub const ALL: [Self; 5] = [
        Self::ApplyChanges,
        Self::PublishDailyBrief,
        Self::PostAlert,
        Self::MarkCheckpointComplete,
        Self::SendInvoice,
    ];

    /// Returns the action-type string recorded on approval requests.
    #[must_use]
    pub const fn action_type(self) -> &'static str {
        match self {
            Self::ApplyChanges => "apply_changes",
            Self::PublishDailyBrief => "publish_daily_brief",
            Self::PostAlert => "post_alert",
            Self::MarkCheckpointComplete => "mark_checkpoint_complete",
            Self::SendInvoice => "send_invoice",
        }
    }

    /// Returns the minimum trust level required to commit.
    #[must_use]
    pub const fn min_trust_level(self) -> TrustLevel {
        match self {
            Self::SendInvoice => TrustLevel::L4,
            _ => TrustLevel::L3,
        }
    }

    /// Returns the declared risk.
    #[must_use]
    pub const fn risk(self) -> RiskLevel {
        match self {
            Self::SendInvoice => RiskLevel::Critical,
            _ => RiskLevel::High,
        }
    }

    /// Returns true when the auto-approval path may decide this action.
    #[must_use]
    pub const fn auto_approve_eligible(self) -> bool {
        !matches!(self, Self::MarkCheckpointComplete | Self::SendInvoice)
    }

    /// Returns true when commit requires a non-empty staged-change set.
    #[must_use]
    pub const fn requires_staged_changes(self) -> bool {
        matches!(self, Self::ApplyChanges)
    }
}

// ============================================================================
// SECTION: Name Resolution
// ============================================================================

/// Resolves a tool name to a commit tool.
///
/// The final name segment must equal the action type, with an optional
/// `commit_` prefix. `asi.commit_post_alert`, `land.post_alert`, and the bare
/// `post_alert` all resolve to [`CommitTool::PostAlert`].
#[must_use]
pub fn commit_tool_for(name: &ToolName) -> Option<CommitTool> {
    let segment = name.action_segment().unwrap_or(name.as_str());
    let action = segment.strip_prefix("commit_").unwrap_or(segment);
    CommitTool::ALL.into_iter().find(|tool| tool.action_type() == action)
}

/// Returns true when an approval request's action type matches the tool.
///
/// Exact matches are authoritative: the action type equals the commit tool's
/// action type or the full tool name. A final-segment suffix match is kept as
/// a compatibility alias for older request payloads.
#[must_use]
pub fn matches_action(request_action: &str, tool_name: &ToolName) -> bool {
    if request_action == tool_name.as_str() {
        return true;
    }
    if let Some(tool) = commit_tool_for(tool_name) {
        if request_action == tool.action_type() {
            return true;
        }
    }
    tool_name.as_str().ends_with(&format!(".{request_action}"))
        || tool_name.as_str().ends_with(&format!(".commit_{request_action}"))
}
