// toolgate-domains/tests/adapter.rs
// ============================================================================
// Module: Domain Adapter Tests
// Description: Validation, registry behavior, merge semantics, and hooks.
// ============================================================================
//! ## Overview
//! Validates the error/warning split, duplicate-domain rejection, first
//! identity wins on merge, and the reversed shutdown chain.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolgate_core::AgentDefinition;
use toolgate_core::AgentRole;
use toolgate_core::CallContext;
use toolgate_core::Capability;
use toolgate_core::DomainTag;
use toolgate_core::ExecutionMode;
use toolgate_core::GateConfig;
use toolgate_core::HandlerError;
use toolgate_core::RiskLevel;
use toolgate_core::Stage;
use toolgate_core::ToolDefinition;
use toolgate_core::ToolHandler;
use toolgate_core::ToolName;
use toolgate_core::TrustLevel;
use toolgate_core::Verification;
use toolgate_core::WorkflowDefinition;
use toolgate_domains::AdapterRegistry;
use toolgate_domains::AdapterTool;
use toolgate_domains::DomainAdapter;
use toolgate_domains::DomainConfig;
use toolgate_domains::LifecycleHooks;
use toolgate_domains::RegistryError;
use toolgate_domains::merge_adapters;

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct NullHandler;

#[async_trait]
impl ToolHandler for NullHandler {
    async fn invoke(&self, _args: Value, _ctx: &CallContext) -> Result<Value, HandlerError> {
        Ok(json!({}))
    }
}

fn tool(name: &str) -> AdapterTool {
    AdapterTool {
        definition: ToolDefinition {
            name: ToolName::new(name),
            description: "test tool".to_string(),
            capability: Capability::Read,
            risk: RiskLevel::Low,
            execution_mode: ExecutionMode::Direct,
            verification: Verification::None,
            input_schema: json!({"type": "object"}),
        },
        handler: Arc::new(NullHandler),
    }
}

fn agent(name: &str, role: AgentRole, allowed: &[&str]) -> AgentDefinition {
    AgentDefinition {
        name: name.to_string(),
        role,
        system_prompt: "you are a test agent".to_string(),
        allowed_tools: allowed.iter().map(|tool| ToolName::new(*tool)).collect::<BTreeSet<_>>(),
        max_turns: 4,
    }
}

fn adapter(domain: &str) -> DomainAdapter {
    DomainAdapter {
        domain: DomainTag::new(domain),
        name: format!("{domain} adapter"),
        version: "1.2.0".to_string(),
        tools: vec![tool(&format!("{domain}.get_bookings"))],
        agents: vec![
            agent("planner-1", AgentRole::Planner, &[&format!("{domain}.get_bookings")]),
            agent("worker-1", AgentRole::Worker, &[]),
            agent("reviewer-1", AgentRole::Reviewer, &[]),
        ],
        workflows: vec![WorkflowDefinition {
            name: "daily_ops_brief".to_string(),
            domain: DomainTag::new(domain),
            stages: vec![Stage::Plan, Stage::Execute, Stage::Review, Stage::Commit],
            agents: vec![
                agent("planner-1", AgentRole::Planner, &[]),
                agent("worker-1", AgentRole::Worker, &[]),
                agent("reviewer-1", AgentRole::Reviewer, &[]),
            ],
        }],
        config: DomainConfig::default(),
        hooks: LifecycleHooks::default(),
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn valid_adapter_passes_with_no_errors() {
    let report = adapter("asi").validate();
    assert!(report.is_valid(), "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
}

#[test]
fn bad_version_is_an_error() {
    let mut bad = adapter("asi");
    bad.version = "1.2".to_string();
    assert!(!bad.validate().is_valid());
}

#[test]
fn unprefixed_tool_name_is_a_warning() {
    let mut marginal = adapter("asi");
    marginal.tools.push(tool("get_weather"));
    let report = marginal.validate();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|warning| warning.contains("not prefixed")));
}

#[test]
fn dangling_allowed_tool_reference_is_a_warning() {
    let mut marginal = adapter("asi");
    marginal.agents[0]
        .allowed_tools
        .insert(ToolName::new("asi.nonexistent"));
    let report = marginal.validate();
    assert!(report.is_valid());
    assert!(report.warnings.iter().any(|warning| warning.contains("unknown tool")));
}

#[test]
fn workflow_domain_mismatch_is_an_error() {
    let mut bad = adapter("asi");
    bad.workflows[0].domain = DomainTag::new("land");
    let report = bad.validate();
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|error| error.contains("belongs to domain")));
}

#[test]
fn commit_without_review_is_an_error() {
    let mut bad = adapter("asi");
    bad.workflows[0].stages = vec![Stage::Plan, Stage::Execute, Stage::Commit];
    assert!(!bad.validate().is_valid());
}

#[test]
fn duplicate_tool_names_are_an_error() {
    let mut bad = adapter("asi");
    bad.tools.push(tool("asi.get_bookings"));
    assert!(!bad.validate().is_valid());
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn registry_rejects_duplicates_and_supports_lookup() {
    let mut registry = AdapterRegistry::new();
    registry.register(adapter("asi")).unwrap();
    assert!(registry.lookup(&DomainTag::new("asi")).is_some());
    assert_eq!(registry.domains(), vec![DomainTag::new("asi")]);

    let error = registry.register(adapter("asi")).unwrap_err();
    assert!(matches!(error, RegistryError::DuplicateDomain(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_rejects_invalid_adapters() {
    let mut registry = AdapterRegistry::new();
    let mut bad = adapter("asi");
    bad.name = String::new();
    let error = registry.register(bad).unwrap_err();
    assert!(matches!(error, RegistryError::InvalidAdapter { .. }));
    assert!(registry.is_empty());
}

#[test]
fn unregister_runs_the_shutdown_hook() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut with_hooks = adapter("asi");
    let init_log = Arc::clone(&log);
    with_hooks.hooks.on_initialize = Some(Arc::new(move || {
        init_log.lock().unwrap().push("init");
    }));
    let shutdown_log = Arc::clone(&log);
    with_hooks.hooks.on_shutdown = Some(Arc::new(move || {
        shutdown_log.lock().unwrap().push("shutdown");
    }));

    let mut registry = AdapterRegistry::new();
    registry.register(with_hooks).unwrap();
    registry.unregister(&DomainTag::new("asi")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["init", "shutdown"]);
}

// ============================================================================
// SECTION: Merge
// ============================================================================

#[test]
fn merge_keeps_first_identity_and_concatenates_capabilities() {
    let first = adapter("asi");
    let mut second = adapter("asi");
    second.name = "secondary".to_string();
    second.version = "9.9.9".to_string();
    second.tools = vec![tool("asi.get_weather")];
    second.config.approval_threshold = Some(TrustLevel::L1);

    let merged = merge_adapters(vec![first, second]).unwrap();
    assert_eq!(merged.name, "asi adapter");
    assert_eq!(merged.version, "1.2.0");
    assert_eq!(merged.tools.len(), 2);
    assert_eq!(merged.agents.len(), 6);
    assert_eq!(merged.config.approval_threshold, Some(TrustLevel::L1));
}

#[test]
fn merge_chains_hooks_and_reverses_shutdown() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut first = adapter("asi");
    let mut second = adapter("asi");
    for (adapter, label) in [(&mut first, "first"), (&mut second, "second")] {
        let init_log = Arc::clone(&log);
        adapter.hooks.on_initialize = Some(Arc::new(move || {
            init_log.lock().unwrap().push(format!("init-{label}"));
        }));
        let shutdown_log = Arc::clone(&log);
        adapter.hooks.on_shutdown = Some(Arc::new(move || {
            shutdown_log.lock().unwrap().push(format!("shutdown-{label}"));
        }));
    }

    let merged = merge_adapters(vec![first, second]).unwrap();
    merged.hooks.on_initialize.as_ref().unwrap()();
    merged.hooks.on_shutdown.as_ref().unwrap()();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["init-first", "init-second", "shutdown-second", "shutdown-first"]
    );
}

#[test]
fn merge_of_nothing_is_none() {
    assert!(merge_adapters(Vec::new()).is_none());
}

// ============================================================================
// SECTION: Gate Config Application
// ============================================================================

#[test]
fn domain_config_applies_over_the_base_gate_config() {
    let mut config = DomainConfig::default();
    config.approval_threshold = Some(TrustLevel::L1);
    config.sandbox_writes = Some(false);
    config
        .tool_overrides
        .insert(ToolName::new("asi.get_bookings"), TrustLevel::L2);

    let applied = config.apply_to(GateConfig::default());
    assert_eq!(applied.approval_threshold, TrustLevel::L1);
    assert!(!applied.sandbox_writes);
    assert_eq!(
        applied.tool_overrides.get(&ToolName::new("asi.get_bookings")),
        Some(&TrustLevel::L2)
    );
}
