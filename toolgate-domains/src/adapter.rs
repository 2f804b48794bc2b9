// toolgate-domains/src/adapter.rs
// ============================================================================
// Module: Domain Adapter
// Description: Plug-in surface for per-vertical tools, agents, and workflows.
// Purpose: Package a vertical's capabilities with validation and lifecycle
//          hooks for registration.
// Dependencies: toolgate-core
// ============================================================================

//! ## Overview
//! A domain adapter supplies an identity triple, a tool set, an agent set, a
//! workflow set, partial trust-gate configuration, and optional lifecycle
//! hooks. Validation distinguishes hard errors (role violations, workflow
//! domain mismatches, structural failures) from warnings (unprefixed tool
//! names, dangling allowed-tool references) so hosts can report without
//! refusing marginal adapters outright.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use toolgate_core::AgentDefinition;
use toolgate_core::DomainTag;
use toolgate_core::GateConfig;
use toolgate_core::ToolDefinition;
use toolgate_core::ToolHandler;
use toolgate_core::ToolName;
use toolgate_core::TrustLevel;
use toolgate_core::WorkflowDefinition;

// ============================================================================
// SECTION: Lifecycle Hooks
// ============================================================================

/// Hook invoked without arguments.
pub type Hook = Arc<dyn Fn() + Send + Sync>;
/// Hook invoked with a workflow name.
pub type WorkflowHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle hooks supplied by an adapter.
#[derive(Default, Clone)]
pub struct LifecycleHooks {
    /// Called when the adapter is initialized.
    pub on_initialize: Option<Hook>,
    /// Called when the adapter is shut down.
    pub on_shutdown: Option<Hook>,
    /// Called when a workflow starts.
    pub on_workflow_start: Option<WorkflowHook>,
    /// Called when a workflow completes.
    pub on_workflow_complete: Option<WorkflowHook>,
}

/// Chains two optional hooks, earlier first.
fn chain_hooks(first: Option<Hook>, second: Option<Hook>) -> Option<Hook> {
    match (first, second) {
        (Some(first), Some(second)) => Some(Arc::new(move || {
            first();
            second();
        })),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    }
}

/// Chains two optional workflow hooks, earlier first.
fn chain_workflow_hooks(
    first: Option<WorkflowHook>,
    second: Option<WorkflowHook>,
) -> Option<WorkflowHook> {
    match (first, second) {
        (Some(first), Some(second)) => Some(Arc::new(move |workflow: &str| {
            first(workflow);
            second(workflow);
        })),
        (Some(single), None) | (None, Some(single)) => Some(single),
        (None, None) => None,
    }
}

// ============================================================================
// SECTION: Domain Config
// ============================================================================

/// Partial trust-gate configuration contributed by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainConfig {
    /// Override for the approval threshold.
    pub approval_threshold: Option<TrustLevel>,
    /// Override for the sandbox-writes flag.
    pub sandbox_writes: Option<bool>,
    /// Per-tool trust level overrides.
    pub tool_overrides: BTreeMap<ToolName, TrustLevel>,
}

impl DomainConfig {
    /// Applies the partial config on top of a base gate config.
    #[must_use]
    pub fn apply_to(&self, mut base: GateConfig) -> GateConfig {
        if let Some(threshold) = self.approval_threshold {
            base.approval_threshold = threshold;
        }
        if let Some(sandbox_writes) = self.sandbox_writes {
            base.sandbox_writes = sandbox_writes;
        }
        for (tool, level) in &self.tool_overrides {
            base.tool_overrides.insert(tool.clone(), *level);
        }
        base
    }
}

// ============================================================================
// SECTION: Domain Adapter
// ============================================================================

/// Registered tool with its handler.
#[derive(Clone)]
pub struct AdapterTool {
    /// Tool definition.
    pub definition: ToolDefinition,
    /// Tool handler.
    pub handler: Arc<dyn ToolHandler>,
}

/// Domain adapter plug-in.
#[derive(Clone)]
pub struct DomainAdapter {
    /// Domain tag.
    pub domain: DomainTag,
    /// Human-readable adapter name.
    pub name: String,
    /// Semver version string.
    pub version: String,
    /// Tools supplied by the adapter.
    pub tools: Vec<AdapterTool>,
    /// Agents supplied by the adapter.
    pub agents: Vec<AgentDefinition>,
    /// Workflows supplied by the adapter.
    pub workflows: Vec<WorkflowDefinition>,
    /// Partial gate configuration.
    pub config: DomainConfig,
    /// Optional lifecycle hooks.
    pub hooks: LifecycleHooks,
}

/// Validation report for an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterValidation {
    /// Hard failures; registration is refused when any exist.
    pub errors: Vec<String>,
    /// Reportable findings that do not block registration.
    pub warnings: Vec<String>,
}

impl AdapterValidation {
    /// Returns true when no hard failure was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl DomainAdapter {
    /// Validates the adapter, collecting errors and warnings.
    #[must_use]
    pub fn validate(&self) -> AdapterValidation {
        let mut report = AdapterValidation::default();

        if self.domain.is_empty() {
            report.errors.push("fail-closed: domain: missing or empty".to_string());
        }
        if self.name.is_empty() {
            report.errors.push("fail-closed: name: missing or empty".to_string());
        }
        if !is_semver(&self.version) {
            report.errors.push(format!("fail-closed: version: not semver: `{}`", self.version));
        }

        let mut tool_names = BTreeSet::new();
        let prefix = format!("{}.", self.domain);
        for tool in &self.tools {
            if let Err(error) = tool.definition.validate() {
                report.errors.push(format!("tool `{}`: {error}", tool.definition.name));
                continue;
            }
            if !tool_names.insert(tool.definition.name.clone()) {
                report
                    .errors
                    .push(format!("duplicate tool name `{}`", tool.definition.name));
            }
            if !tool.definition.name.as_str().starts_with(&prefix) {
                report.warnings.push(format!(
                    "tool `{}` is not prefixed with `{prefix}`",
                    tool.definition.name
                ));
            }
        }

        for agent in &self.agents {
            if let Err(error) = agent.validate() {
                report.errors.push(format!("agent `{}`: {error}", agent.name));
            }
            for tool in &agent.allowed_tools {
                if !tool_names.contains(tool) {
                    report.warnings.push(format!(
                        "agent `{}` references unknown tool `{tool}`",
                        agent.name
                    ));
                }
            }
        }

        for workflow in &self.workflows {
            if workflow.domain != self.domain {
                report.errors.push(format!(
                    "workflow `{}` belongs to domain `{}`, adapter is `{}`",
                    workflow.name, workflow.domain, self.domain
                ));
            }
            if let Err(error) = workflow.validate() {
                report.errors.push(format!("workflow `{}`: {error}", workflow.name));
            }
        }

        report
    }
}

/// Returns true for `major.minor.patch` version strings.
fn is_semver(version: &str) -> bool {
    let mut segments = 0;
    for segment in version.split('.') {
        if segment.is_empty() || !segment.chars().all(|ch| ch.is_ascii_digit()) {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges adapters into one.
///
/// The first adapter's identity and scalar config win; tools, agents, and
/// workflows concatenate; lifecycle hooks chain in order, except shutdown,
/// which chains in reverse so teardown mirrors initialization.
#[must_use]
pub fn merge_adapters(adapters: Vec<DomainAdapter>) -> Option<DomainAdapter> {
    let mut iter = adapters.into_iter();
    let mut merged = iter.next()?;
    for adapter in iter {
        merged.tools.extend(adapter.tools);
        merged.agents.extend(adapter.agents);
        merged.workflows.extend(adapter.workflows);
        if merged.config.approval_threshold.is_none() {
            merged.config.approval_threshold = adapter.config.approval_threshold;
        }
        if merged.config.sandbox_writes.is_none() {
            merged.config.sandbox_writes = adapter.config.sandbox_writes;
        }
        for (tool, level) in adapter.config.tool_overrides {
            merged.config.tool_overrides.entry(tool).or_insert(level);
        }
        merged.hooks.on_initialize =
            chain_hooks(merged.hooks.on_initialize.take(), adapter.hooks.on_initialize);
        merged.hooks.on_shutdown =
            chain_hooks(adapter.hooks.on_shutdown, merged.hooks.on_shutdown.take());
        merged.hooks.on_workflow_start = chain_workflow_hooks(
            merged.hooks.on_workflow_start.take(),
            adapter.hooks.on_workflow_start,
        );
        merged.hooks.on_workflow_complete = chain_workflow_hooks(
            merged.hooks.on_workflow_complete.take(),
            adapter.hooks.on_workflow_complete,
        );
    }
    Some(merged)
}
