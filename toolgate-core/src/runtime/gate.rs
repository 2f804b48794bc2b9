// toolgate-core/src/runtime/gate.rs
// ============================================================================
// Module: ToolGate Trust Gate
// Description: Trust classification and per-stage policy evaluation.
// Purpose: Decide, for every tool call, whether it may proceed and under what
//          oversight, failing closed at each step.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The trust gate classifies a tool call as L0..L4 from the tool's declared
//! capability and risk, then checks the call against the stage policy.
//! Evaluation is a pure function over the tool, stage, context, and config;
//! the approval-aware path additionally consults an [`ApprovalQueries`]
//! capability and maps every store outcome, including errors, to a decision
//! value. A denied decision is never an exception.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::ApprovalStatus;
use crate::core::Capability;
use crate::core::ExecutionMode;
use crate::core::ReviewerVerdict;
use crate::core::RiskLevel;
use crate::core::Stage;
use crate::core::Timestamp;
use crate::core::ToolDefinition;
use crate::core::ToolName;
use crate::core::TrustLevel;
use crate::core::commit_tools::commit_tool_for;
use crate::core::commit_tools::matches_action;
use crate::interfaces::ApprovalQueries;
use crate::interfaces::CallContext;

// ============================================================================
// SECTION: Stage Policy
// ============================================================================

/// Per-stage upper bound on trust level and capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicy {
    /// Maximum trust level permitted in the stage.
    pub max_trust_level: TrustLevel,
    /// Capabilities permitted in the stage.
    pub allowed_capabilities: BTreeSet<Capability>,
    /// Whether the stage forces sandboxed execution.
    pub sandboxed: bool,
    /// Whether the stage requires a reviewer PASS before side effects.
    pub requires_reviewer_approval: bool,
}

impl StagePolicy {
    /// Returns the default policy for a stage.
    #[must_use]
    pub fn default_for(stage: Stage) -> Self {
        match stage {
            Stage::Plan | Stage::Review => Self {
                max_trust_level: TrustLevel::L1,
                allowed_capabilities: BTreeSet::from([Capability::Read, Capability::Propose]),
                sandboxed: false,
                requires_reviewer_approval: false,
            },
            Stage::Execute => Self {
                max_trust_level: TrustLevel::L2,
                allowed_capabilities: BTreeSet::from([
                    Capability::Read,
                    Capability::Propose,
                    Capability::Write,
                ]),
                sandboxed: true,
                requires_reviewer_approval: false,
            },
            Stage::Commit => Self {
                max_trust_level: TrustLevel::L4,
                allowed_capabilities: BTreeSet::from([
                    Capability::Read,
                    Capability::Propose,
                    Capability::Write,
                    Capability::SideEffects,
                ]),
                sandboxed: true,
                requires_reviewer_approval: true,
            },
        }
    }
}

// ============================================================================
// SECTION: Gate Config
// ============================================================================

/// Trust gate configuration.
///
/// # Invariants
/// - Every stage has a policy; missing entries fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Trust levels above this threshold require approval.
    pub approval_threshold: TrustLevel,
    /// Whether mutating capabilities are always sandboxed.
    pub sandbox_writes: bool,
    /// Per-stage policy overrides.
    pub stage_policies: BTreeMap<Stage, StagePolicy>,
    /// Per-tool trust level overrides from domain config.
    pub tool_overrides: BTreeMap<ToolName, TrustLevel>,
}

impl Default for GateConfig {
    fn default() -> Self {
        let stage_policies = Stage::ALL
            .into_iter()
            .map(|stage| (stage, StagePolicy::default_for(stage)))
            .collect();
        Self {
            approval_threshold: TrustLevel::L2,
            sandbox_writes: true,
            stage_policies,
            tool_overrides: BTreeMap::new(),
        }
    }
}

impl GateConfig {
    /// Returns the policy for a stage, falling back to the defaults.
    #[must_use]
    pub fn policy_for(&self, stage: Stage) -> StagePolicy {
        self.stage_policies
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| StagePolicy::default_for(stage))
    }
}

// ============================================================================
// SECTION: Gate Decision
// ============================================================================

/// Outcome of a trust gate evaluation.
///
/// # Invariants
/// - `allowed = false` carries a reason beginning `fail-closed:` for policy
///   denials.
/// - `auto_approve_eligible = true` only accompanies a denial that the
///   orchestrator may resolve by triggering auto-approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Trust level assigned to the call.
    pub trust_level: TrustLevel,
    /// Whether the call must run under the sandbox.
    pub sandboxed: bool,
    /// Whether approval state gates the call.
    pub requires_approval: bool,
    /// Whether a pending request may be auto-approved.
    pub auto_approve_eligible: bool,
    /// Explanation of the outcome.
    pub reason: String,
}

impl GateDecision {
    /// Builds a denial reported at the given trust level.
    #[must_use]
    fn denied(trust_level: TrustLevel, reason: String) -> Self {
        Self {
            allowed: false,
            trust_level,
            sandboxed: true,
            requires_approval: true,
            auto_approve_eligible: false,
            reason,
        }
    }
}

// ============================================================================
// SECTION: Trust Gate
// ============================================================================

/// Trust classifier and policy engine.
#[derive(Debug, Clone, Default)]
pub struct TrustGate {
    /// Gate configuration, read once at construction.
    config: GateConfig,
}

impl TrustGate {
    /// Creates a gate with the provided configuration.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self {
            config,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Derives the trust level for a tool.
    ///
    /// An explicit domain-config override wins; otherwise the level follows
    /// from risk and capability.
    #[must_use]
    pub fn derive_trust_level(&self, tool: &ToolDefinition) -> TrustLevel {
        if let Some(level) = self.config.tool_overrides.get(&tool.name) {
            return *level;
        }
        if tool.risk == RiskLevel::Critical {
            return TrustLevel::L4;
        }
        if tool.risk == RiskLevel::High && tool.capability == Capability::SideEffects {
            return TrustLevel::L3;
        }
        if tool.risk == RiskLevel::High || tool.capability == Capability::Write {
            return TrustLevel::L2;
        }
        if tool.capability == Capability::Propose {
            return TrustLevel::L1;
        }
        TrustLevel::L0
    }

    /// Evaluates a tool call against the stage policy.
    ///
    /// Fails closed at each step; validation failures are reported at L4.
    #[must_use]
    pub fn evaluate(&self, tool: &ToolDefinition, stage: Stage, ctx: &CallContext) -> GateDecision {
        if let Err(error) = tool.validate() {
            return GateDecision::denied(TrustLevel::L4, error.to_string());
        }
        if ctx.agent.is_empty() {
            return GateDecision::denied(
                TrustLevel::L4,
                "fail-closed: agent: missing or empty".to_string(),
            );
        }
        if ctx.run_id.is_empty() {
            return GateDecision::denied(
                TrustLevel::L4,
                "fail-closed: run_id: missing or empty".to_string(),
            );
        }

        let trust_level = self.derive_trust_level(tool);
        let is_commit_tool = commit_tool_for(&tool.name).is_some();
        let policy = self.config.policy_for(stage);

        if trust_level > policy.max_trust_level {
            return GateDecision::denied(
                trust_level,
                format!(
                    "fail-closed: trust level {trust_level} exceeds stage `{stage}` maximum {}",
                    policy.max_trust_level
                ),
            );
        }
        if !policy.allowed_capabilities.contains(&tool.capability) {
            return GateDecision::denied(
                trust_level,
                format!(
                    "fail-closed: capability `{}` is not permitted in stage `{stage}`",
                    tool.capability
                ),
            );
        }

        let sandboxed = policy.sandboxed
            || (self.config.sandbox_writes && tool.capability.is_mutating())
            || tool.execution_mode == ExecutionMode::SandboxOnly;
        let requires_approval = trust_level > self.config.approval_threshold
            || policy.requires_reviewer_approval
            || is_commit_tool;

        if trust_level == TrustLevel::L4 {
            return GateDecision {
                allowed: false,
                trust_level,
                sandboxed: true,
                requires_approval: true,
                auto_approve_eligible: false,
                reason: "fail-closed: human approval required for L4".to_string(),
            };
        }
        if is_commit_tool && stage == Stage::Commit {
            return GateDecision {
                allowed: false,
                trust_level,
                sandboxed,
                requires_approval: true,
                auto_approve_eligible: false,
                reason: "fail-closed: commit tool requires approval state".to_string(),
            };
        }

        GateDecision {
            allowed: true,
            trust_level,
            sandboxed,
            requires_approval,
            auto_approve_eligible: false,
            reason: format!("allowed at {trust_level} in stage `{stage}`"),
        }
    }

    /// Evaluates a tool call and integrates approval state.
    ///
    /// Store errors map to denial; the handler is never called on store error.
    #[must_use]
    pub fn evaluate_with_approval(
        &self,
        tool: &ToolDefinition,
        stage: Stage,
        ctx: &CallContext,
        approvals: &dyn ApprovalQueries,
    ) -> GateDecision {
        let base = self.evaluate(tool, stage, ctx);
        let consults_store = (base.allowed && base.requires_approval)
            || (!base.allowed && is_approval_resolvable(&base));
        if !consults_store {
            return base;
        }

        let requests = match approvals.requests_by_run(&ctx.run_id) {
            Ok(requests) => requests,
            Err(error) => {
                return GateDecision::denied(
                    base.trust_level,
                    format!("fail-closed: approval store error: {error}"),
                );
            }
        };
        let matching = requests
            .into_iter()
            .find(|request| matches_action(&request.action_type, &tool.name));
        let Some(request) = matching else {
            let reason = if base.trust_level == TrustLevel::L4 {
                format!(
                    "fail-closed: human approval required; no approval request exists for `{}`",
                    tool.name
                )
            } else {
                format!("fail-closed: approval request required for `{}`", tool.name)
            };
            return GateDecision {
                auto_approve_eligible: false,
                allowed: false,
                reason,
                ..base
            };
        };

        let policy = self.config.policy_for(stage);
        let now = Timestamp::now();
        let status = if request.status == ApprovalStatus::Pending && request.is_expired(now) {
            ApprovalStatus::Expired
        } else {
            request.status
        };
        match status {
            ApprovalStatus::Approved => {
                if policy.requires_reviewer_approval
                    && request.reviewer_verdict != Some(ReviewerVerdict::Pass)
                {
                    return GateDecision {
                        allowed: false,
                        auto_approve_eligible: false,
                        reason: "fail-closed: reviewer verdict is not PASS".to_string(),
                        ..base
                    };
                }
                GateDecision {
                    allowed: true,
                    auto_approve_eligible: false,
                    reason: format!("approved by request {}", request.id),
                    ..base
                }
            }
            ApprovalStatus::Pending => {
                if request.auto_approve_eligible
                    && ctx.reviewer_verdict == Some(ReviewerVerdict::Pass)
                {
                    GateDecision {
                        allowed: false,
                        auto_approve_eligible: true,
                        reason: format!("pending auto-approval of request {}", request.id),
                        ..base
                    }
                } else {
                    GateDecision {
                        allowed: false,
                        auto_approve_eligible: false,
                        reason: "fail-closed: awaiting human approval".to_string(),
                        ..base
                    }
                }
            }
            ApprovalStatus::Rejected => GateDecision {
                allowed: false,
                auto_approve_eligible: false,
                reason: format!("fail-closed: approval request {} was rejected", request.id),
                ..base
            },
            ApprovalStatus::Expired => GateDecision {
                allowed: false,
                auto_approve_eligible: false,
                reason: format!("fail-closed: approval request {} has expired", request.id),
                ..base
            },
        }
    }
}

/// Returns true when a denial can be resolved by approval state rather than
/// policy. Stage and capability violations are final; the L4 human gate and
/// the commit-tool barrier are resolved against the store.
fn is_approval_resolvable(decision: &GateDecision) -> bool {
    decision.reason.contains("human approval required")
        || decision.reason.contains("commit tool requires approval state")
}
