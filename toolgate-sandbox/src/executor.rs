// toolgate-sandbox/src/executor.rs
// ============================================================================
// Module: Sandbox Executor
// Description: Sandbox lifecycle, staged-change ledger, and artifact capture.
// Purpose: Implement the core SandboxRunner contract over an isolation
//          strategy selected once at construction.
// Dependencies: toolgate-core, tokio
// ============================================================================

//! ## Overview
//! Every execution is keyed by a stable sandbox id. Successful handler
//! invocations append to the per-sandbox staged-change ledger; rollback
//! discards the ledger, commit drains it for the commit boundary, and cleanup
//! removes the artifacts directory and all state. Denials never reach the
//! handler, and the opt-in direct fallback is refused in production by
//! configuration validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use toolgate_core::CallContext;
use toolgate_core::ChangeId;
use toolgate_core::ChangeType;
use toolgate_core::DiagnosticsSink;
use toolgate_core::SandboxFailureReason;
use toolgate_core::SandboxId;
use toolgate_core::SandboxRequest;
use toolgate_core::SandboxRun;
use toolgate_core::SandboxRunner;
use toolgate_core::StagedChange;
use toolgate_core::Timestamp;
use toolgate_core::ToolHandler;

use crate::config::IsolationChoice;
use crate::config::SandboxConfig;
use crate::config::SandboxConfigError;
use crate::config::SandboxEnvironment;
use crate::config::blocked_env_var;
use crate::config::choose_isolation;
use crate::isolation::ContainerIsolation;
use crate::isolation::DenyAllIsolation;
use crate::isolation::IsolationOutcome;
use crate::isolation::IsolationRequest;
use crate::isolation::IsolationStrategy;
use crate::isolation::PassthroughIsolation;
use crate::isolation::TIMEOUT_EXIT_CODE;

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Sandbox executor implementing the core `SandboxRunner` contract.
pub struct SandboxExecutor {
    /// Isolation strategy selected at construction.
    strategy: Arc<dyn IsolationStrategy>,
    /// Validated configuration.
    config: SandboxConfig,
    /// Staged changes partitioned by sandbox id.
    ledger: Mutex<BTreeMap<SandboxId, Vec<StagedChange>>>,
    /// Artifact directories partitioned by sandbox id.
    artifact_dirs: Mutex<BTreeMap<SandboxId, PathBuf>>,
    /// Diagnostics sink.
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl SandboxExecutor {
    /// Creates an executor, selecting the strategy from the process
    /// environment exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxConfigError`] when the configuration is invalid.
    pub fn from_env(
        config: SandboxConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, SandboxConfigError> {
        let environment = SandboxEnvironment::from_process();
        let (choice, warning) = choose_isolation(&environment);
        if let Some(warning) = warning {
            diagnostics.warn("sandbox_isolation", warning);
        }
        let strategy: Arc<dyn IsolationStrategy> = match choice {
            IsolationChoice::Container => Arc::new(ContainerIsolation::new(config.clone())),
            IsolationChoice::Passthrough => Arc::new(PassthroughIsolation),
            IsolationChoice::Deny => Arc::new(DenyAllIsolation::default()),
        };
        Self::with_strategy(config, strategy, diagnostics)
    }

    /// Creates an executor with an explicit strategy.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxConfigError`] when the configuration is invalid.
    pub fn with_strategy(
        config: SandboxConfig,
        strategy: Arc<dyn IsolationStrategy>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, SandboxConfigError> {
        config.validate()?;
        Ok(Self {
            strategy,
            config,
            ledger: Mutex::new(BTreeMap::new()),
            artifact_dirs: Mutex::new(BTreeMap::new()),
            diagnostics,
        })
    }

    /// Returns the active strategy name.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Records the staged change derived from a successful result.
    fn record_staged_change(&self, sandbox_id: &SandboxId, request: &SandboxRequest, result: &Value) {
        let change = StagedChange {
            id: ChangeId::generate(),
            sandbox_id: sandbox_id.clone(),
            tool_name: request.tool_name.clone(),
            change_type: change_type_from(result),
            entity_type: entity_type_from(request, result),
            entity_id: result.get("entity_id").and_then(Value::as_str).map(str::to_string),
            payload: result.clone(),
            recorded_at: Timestamp::now(),
        };
        if let Ok(mut guard) = self.ledger.lock() {
            guard.entry(sandbox_id.clone()).or_default().push(change);
        } else {
            self.diagnostics.warn("sandbox_ledger", "ledger mutex poisoned; change dropped");
        }
    }

    /// Collects artifact paths from the sandbox artifacts directory.
    fn collect_artifacts(&self, dir: &std::path::Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path().display().to_string())
            .collect();
        paths.sort();
        paths
    }

    /// Builds a denial run without invoking the handler.
    fn denial_run(
        sandbox_id: SandboxId,
        reason: SandboxFailureReason,
        detail: String,
        duration_ms: u64,
    ) -> SandboxRun {
        SandboxRun {
            success: false,
            result: None,
            error: Some(detail),
            sandbox_id,
            artifact_paths: Vec::new(),
            duration_ms,
            timed_out: false,
            exit_code: None,
            stdout_sample: None,
            stderr_sample: None,
            failure_reason: Some(reason),
            denied_by_policy: true,
        }
    }
}

// ============================================================================
// SECTION: SandboxRunner Implementation
// ============================================================================

#[async_trait]
impl SandboxRunner for SandboxExecutor {
    async fn execute(
        &self,
        request: SandboxRequest,
        handler: Arc<dyn ToolHandler>,
        ctx: &CallContext,
    ) -> SandboxRun {
        let started = Instant::now();
        let sandbox_id = request.sandbox_id.clone().unwrap_or_else(SandboxId::generate);

        if request.tool_name.is_empty() {
            return Self::denial_run(
                sandbox_id,
                SandboxFailureReason::InvalidInput,
                "fail-closed: tool_name: missing or empty".to_string(),
                elapsed_ms(started),
            );
        }
        for name in request.env.keys() {
            if blocked_env_var(name) {
                return Self::denial_run(
                    sandbox_id,
                    SandboxFailureReason::BlockedEnvVarRequested,
                    format!("fail-closed: blocked environment variable requested: {name}"),
                    elapsed_ms(started),
                );
            }
        }

        let artifacts_dir = self.config.artifacts_root.join(sandbox_id.as_str());
        if let Err(error) = std::fs::create_dir_all(&artifacts_dir) {
            return Self::denial_run(
                sandbox_id,
                SandboxFailureReason::ArtifactsDirCreationFailed,
                format!("fail-closed: artifacts directory creation failed: {error}"),
                elapsed_ms(started),
            );
        }
        if let Ok(mut guard) = self.artifact_dirs.lock() {
            guard.insert(sandbox_id.clone(), artifacts_dir.clone());
        }

        let mut env = self.config.env.clone();
        env.extend(request.env.clone());
        let isolation_request = IsolationRequest {
            tool_name: request.tool_name.clone(),
            args: request.args.clone(),
            env,
            command: request.command.clone(),
            artifacts_dir: artifacts_dir.clone(),
            timeout_ms: self.config.limits.timeout_ms,
        };
        let mut outcome = self.strategy.run(&isolation_request, Arc::clone(&handler), ctx).await;

        // Opt-in fallback for non-production hosts when isolation is down.
        if outcome.denied_by_policy
            && self.config.allow_direct_fallback
            && !self.config.production
            && isolation_unavailable(&outcome)
        {
            self.diagnostics.warn(
                "sandbox_fallback",
                "isolation unavailable; falling back to direct execution",
            );
            outcome = direct_fallback(&isolation_request, handler, ctx).await;
        }

        if let (true, Some(result)) = (outcome.success, &outcome.result) {
            self.record_staged_change(&sandbox_id, &request, result);
        }

        SandboxRun {
            success: outcome.success,
            result: outcome.result,
            error: outcome.error,
            sandbox_id: sandbox_id.clone(),
            artifact_paths: self.collect_artifacts(&artifacts_dir),
            duration_ms: elapsed_ms(started),
            timed_out: outcome.timed_out,
            exit_code: outcome.exit_code,
            stdout_sample: outcome.stdout_sample,
            stderr_sample: outcome.stderr_sample,
            failure_reason: outcome.failure_reason,
            denied_by_policy: outcome.denied_by_policy,
        }
    }

    fn staged_changes(&self, sandbox_id: &SandboxId) -> Vec<StagedChange> {
        self.ledger
            .lock()
            .ok()
            .and_then(|guard| guard.get(sandbox_id).cloned())
            .unwrap_or_default()
    }

    fn commit_changes(&self, sandbox_id: &SandboxId) -> Vec<StagedChange> {
        self.ledger
            .lock()
            .ok()
            .and_then(|mut guard| guard.remove(sandbox_id))
            .unwrap_or_default()
    }

    fn rollback_changes(&self, sandbox_id: &SandboxId) -> usize {
        self.ledger
            .lock()
            .ok()
            .and_then(|mut guard| guard.remove(sandbox_id))
            .map_or(0, |changes| changes.len())
    }

    fn cleanup(&self, sandbox_id: &SandboxId) {
        if let Ok(mut guard) = self.ledger.lock() {
            guard.remove(sandbox_id);
        }
        let dir = self
            .artifact_dirs
            .lock()
            .ok()
            .and_then(|mut guard| guard.remove(sandbox_id));
        if let Some(dir) = dir {
            if let Err(error) = std::fs::remove_dir_all(&dir) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    self.diagnostics
                        .warn("sandbox_cleanup", &format!("artifact removal failed: {error}"));
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns elapsed wall-clock milliseconds.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Returns true when a denial stems from isolation availability.
fn isolation_unavailable(outcome: &IsolationOutcome) -> bool {
    matches!(
        outcome.failure_reason,
        Some(
            SandboxFailureReason::DockerNotAvailable
                | SandboxFailureReason::DockerNotRunning
                | SandboxFailureReason::ImagePullFailed
                | SandboxFailureReason::ContainerStartupFailed
        )
    )
}

/// Runs the handler directly under the configured timeout.
async fn direct_fallback(
    request: &IsolationRequest,
    handler: Arc<dyn ToolHandler>,
    ctx: &CallContext,
) -> IsolationOutcome {
    let budget = Duration::from_millis(request.timeout_ms);
    match timeout(budget, handler.invoke(request.args.clone(), ctx)).await {
        Ok(Ok(result)) => IsolationOutcome {
            success: true,
            result: Some(result),
            exit_code: Some(0),
            ..IsolationOutcome::default()
        },
        Ok(Err(error)) => IsolationOutcome {
            error: Some(error.to_string()),
            failure_reason: Some(SandboxFailureReason::UnknownError),
            ..IsolationOutcome::default()
        },
        Err(_) => IsolationOutcome {
            error: Some("execution timed out".to_string()),
            timed_out: true,
            exit_code: Some(TIMEOUT_EXIT_CODE),
            failure_reason: Some(SandboxFailureReason::ExecutionTimeout),
            ..IsolationOutcome::default()
        },
    }
}

/// Reads the change type from a result object, defaulting to update.
fn change_type_from(result: &Value) -> ChangeType {
    result
        .get("change_type")
        .and_then(Value::as_str)
        .and_then(|value| ChangeType::parse(value).ok())
        .unwrap_or(ChangeType::Update)
}

/// Reads the entity type from a result object, defaulting to the tool domain.
fn entity_type_from(request: &SandboxRequest, result: &Value) -> String {
    result
        .get("entity_type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            request.tool_name.domain_segment().unwrap_or("unknown").to_string()
        })
}
