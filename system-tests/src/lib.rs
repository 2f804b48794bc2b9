// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Helpers
// Description: Scripted model, counting handlers, and definition builders.
// Purpose: Shared fixtures for the end-to-end scenario suites.
// Dependencies: toolgate-core
// ============================================================================

//! ## Overview
//! Helpers for driving full ToolGate pipelines without a live model backend.
//! The scripted model replays queued turns; counting handlers verify that
//! denied calls never reach domain code.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-support code may panic on misuse."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolgate_core::AgentDefinition;
use toolgate_core::AgentModel;
use toolgate_core::AgentRole;
use toolgate_core::CallContext;
use toolgate_core::Capability;
use toolgate_core::CommitAction;
use toolgate_core::CommitRequest;
use toolgate_core::DomainTag;
use toolgate_core::ExecutionMode;
use toolgate_core::HandlerError;
use toolgate_core::ModelError;
use toolgate_core::ModelMessage;
use toolgate_core::ModelToolCall;
use toolgate_core::ModelTurn;
use toolgate_core::RiskLevel;
use toolgate_core::Stage;
use toolgate_core::ToolDefinition;
use toolgate_core::ToolHandler;
use toolgate_core::ToolName;
use toolgate_core::Verification;
use toolgate_core::WorkflowDefinition;

// ============================================================================
// SECTION: Scripted Model
// ============================================================================

/// Model backend that replays queued turns in order.
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
}

impl ScriptedModel {
    /// Creates a model that replays the given turns.
    #[must_use]
    pub fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
        })
    }

    /// Returns how many scripted turns remain unconsumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentModel for ScriptedModel {
    async fn complete(
        &self,
        _agent: &AgentDefinition,
        _messages: &[ModelMessage],
    ) -> Result<ModelTurn, ModelError> {
        Ok(self.turns.lock().unwrap().pop_front().unwrap_or(ModelTurn {
            text: "done".to_string(),
            tool_calls: Vec::new(),
        }))
    }
}

/// Builds a text-only turn.
#[must_use]
pub fn text_turn(text: &str) -> ModelTurn {
    ModelTurn {
        text: text.to_string(),
        tool_calls: Vec::new(),
    }
}

/// Builds a turn that emits one tool call.
#[must_use]
pub fn call_turn(text: &str, tool: &str, args: Value) -> ModelTurn {
    ModelTurn {
        text: text.to_string(),
        tool_calls: vec![ModelToolCall {
            tool: ToolName::new(tool),
            args,
        }],
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Tool handler that counts invocations and echoes its arguments.
pub struct CountingHandler {
    calls: AtomicUsize,
}

impl CountingHandler {
    /// Creates a fresh counting handler.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for CountingHandler {
    async fn invoke(&self, args: Value, _ctx: &CallContext) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"echo": args}))
    }
}

/// Commit action that counts executions.
pub struct CountingCommitAction {
    calls: AtomicUsize,
}

impl CountingCommitAction {
    /// Creates a fresh counting commit action.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitAction for CountingCommitAction {
    async fn execute(&self, request: &CommitRequest) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"commit_id": request.commit_id.as_str()}))
    }
}

// ============================================================================
// SECTION: Definition Builders
// ============================================================================

/// Builds a tool definition with a permissive object schema.
#[must_use]
pub fn tool_def(
    name: &str,
    capability: Capability,
    risk: RiskLevel,
    execution_mode: ExecutionMode,
) -> ToolDefinition {
    ToolDefinition {
        name: ToolName::new(name),
        description: format!("test tool {name}"),
        capability,
        risk,
        execution_mode,
        verification: Verification::None,
        input_schema: json!({"type": "object"}),
    }
}

/// Builds an agent definition.
#[must_use]
pub fn agent_def(name: &str, role: AgentRole, allowed: &[&str]) -> AgentDefinition {
    AgentDefinition {
        name: name.to_string(),
        role,
        system_prompt: format!("you are {name}"),
        allowed_tools: allowed.iter().map(|tool| ToolName::new(*tool)).collect::<BTreeSet<_>>(),
        max_turns: 4,
    }
}

/// Builds a workflow over the given stages with one agent per role.
#[must_use]
pub fn workflow_def(name: &str, domain: &str, stages: Vec<Stage>) -> WorkflowDefinition {
    WorkflowDefinition {
        name: name.to_string(),
        domain: DomainTag::new(domain),
        stages,
        agents: vec![
            agent_def("planner-1", AgentRole::Planner, &[]),
            agent_def("worker-1", AgentRole::Worker, &[]),
            agent_def("reviewer-1", AgentRole::Reviewer, &[]),
        ],
    }
}
