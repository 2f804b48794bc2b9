// toolgate-sandbox/src/isolation.rs
// ============================================================================
// Module: Isolation Strategies
// Description: Container, deny-all, and passthrough isolation backends.
// Purpose: Run tool handlers under the isolation posture the environment
//          demands, failing closed when the facility is unavailable.
// Dependencies: toolgate-core, tokio
// ============================================================================

//! ## Overview
//! The container strategy launches the tool's container command under Docker
//! with a read-only rootfs, dropped capabilities, a non-root user, resource
//! ceilings, and no network unless an allowlist is configured. Availability
//! is probed before anything runs; when Docker is missing or down, the
//! outcome is a policy denial and the handler is never invoked. The deny-all
//! strategy refuses everything. Passthrough runs the handler in-process under
//! a timeout and exists for tests and opted-out development.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use toolgate_core::CallContext;
use toolgate_core::SandboxFailureReason;
use toolgate_core::ToolHandler;
use toolgate_core::ToolName;

use crate::config::SandboxConfig;
use crate::config::valid_allowlist_entry;

/// Exit code reported for killed-on-timeout executions.
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Maximum bytes retained from captured stdout/stderr.
const OUTPUT_SAMPLE_BYTES: usize = 4_096;
/// Probe timeout for availability checks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for image pulls.
const PULL_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Prepared execution handed to an isolation strategy.
#[derive(Debug, Clone)]
pub struct IsolationRequest {
    /// Tool being executed.
    pub tool_name: ToolName,
    /// Call arguments.
    pub args: Value,
    /// Environment for the execution (already screened).
    pub env: BTreeMap<String, String>,
    /// Container command for container-native tools.
    pub command: Option<Vec<String>>,
    /// Host directory mounted as the artifacts directory.
    pub artifacts_dir: PathBuf,
    /// Wall-clock timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Outcome of one isolated execution.
#[derive(Debug, Clone, Default)]
pub struct IsolationOutcome {
    /// Whether the execution ran and succeeded.
    pub success: bool,
    /// Result value on success.
    pub result: Option<Value>,
    /// Failure detail.
    pub error: Option<String>,
    /// True when the wall-clock timeout expired.
    pub timed_out: bool,
    /// Process exit code when a process ran.
    pub exit_code: Option<i32>,
    /// Sample of captured stdout.
    pub stdout_sample: Option<String>,
    /// Sample of captured stderr.
    pub stderr_sample: Option<String>,
    /// Failure reason from the closed set.
    pub failure_reason: Option<SandboxFailureReason>,
    /// True when policy denied the execution before the handler ran.
    pub denied_by_policy: bool,
}

impl IsolationOutcome {
    /// Builds a policy denial for the given reason.
    #[must_use]
    pub fn denial(reason: SandboxFailureReason, detail: impl Into<String>) -> Self {
        Self {
            error: Some(detail.into()),
            failure_reason: Some(reason),
            denied_by_policy: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Strategy Trait
// ============================================================================

/// Isolation backend selected at executor construction.
#[async_trait]
pub trait IsolationStrategy: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Runs one prepared execution.
    async fn run(
        &self,
        request: &IsolationRequest,
        handler: Arc<dyn ToolHandler>,
        ctx: &CallContext,
    ) -> IsolationOutcome;
}

// ============================================================================
// SECTION: Deny-All Strategy
// ============================================================================

/// Fail-closed strategy that denies every execution.
pub struct DenyAllIsolation {
    /// Reason reported on every denial.
    reason: SandboxFailureReason,
}

impl DenyAllIsolation {
    /// Creates a denier reporting the given reason.
    #[must_use]
    pub const fn new(reason: SandboxFailureReason) -> Self {
        Self {
            reason,
        }
    }
}

impl Default for DenyAllIsolation {
    fn default() -> Self {
        Self::new(SandboxFailureReason::DockerNotAvailable)
    }
}

#[async_trait]
impl IsolationStrategy for DenyAllIsolation {
    fn name(&self) -> &'static str {
        "deny_all"
    }

    async fn run(
        &self,
        _request: &IsolationRequest,
        _handler: Arc<dyn ToolHandler>,
        _ctx: &CallContext,
    ) -> IsolationOutcome {
        IsolationOutcome::denial(self.reason, "fail-closed: isolation unavailable")
    }
}

// ============================================================================
// SECTION: Passthrough Strategy
// ============================================================================

/// In-process strategy for tests and opted-out development.
#[derive(Default)]
pub struct PassthroughIsolation;

#[async_trait]
impl IsolationStrategy for PassthroughIsolation {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn run(
        &self,
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
}

// ============================================================================
// SECTION: Container Strategy
// ============================================================================

/// Docker-backed isolation strategy.
pub struct ContainerIsolation {
    /// Sandbox configuration captured at construction.
    config: SandboxConfig,
}

impl ContainerIsolation {
    /// Creates the strategy for a validated configuration.
    #[must_use]
    pub const fn new(config: SandboxConfig) -> Self {
        Self {
            config,
        }
    }

    /// Probes the container runtime.
    async fn probe(&self) -> Result<(), IsolationOutcome> {
        let probe = Command::new(&self.config.docker_binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(_)) => Err(IsolationOutcome::denial(
                SandboxFailureReason::DockerNotRunning,
                "fail-closed: container runtime is not running",
            )),
            Ok(Err(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(IsolationOutcome::denial(
                    SandboxFailureReason::DockerNotAvailable,
                    "fail-closed: container runtime binary not found",
                ))
            }
            Ok(Err(error)) => Err(IsolationOutcome::denial(
                SandboxFailureReason::DockerNotAvailable,
                format!("fail-closed: container runtime probe failed: {error}"),
            )),
            Err(_) => Err(IsolationOutcome::denial(
                SandboxFailureReason::DockerNotRunning,
                "fail-closed: container runtime probe timed out",
            )),
        }
    }

    /// Ensures the configured image is present, pulling it when missing.
    async fn ensure_image(&self) -> Result<(), IsolationOutcome> {
        let inspect = Command::new(&self.config.docker_binary)
            .args(["image", "inspect", &self.config.image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Ok(Ok(status)) = timeout(PROBE_TIMEOUT, inspect).await {
            if status.success() {
                return Ok(());
            }
        }
        let pull = Command::new(&self.config.docker_binary)
            .args(["pull", &self.config.image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match timeout(PULL_TIMEOUT, pull).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            _ => Err(IsolationOutcome::denial(
                SandboxFailureReason::ImagePullFailed,
                format!("fail-closed: image pull failed for `{}`", self.config.image),
            )),
        }
    }

    /// Builds the `docker run` argument list for a request.
    fn run_args(&self, request: &IsolationRequest, command: &[String]) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--read-only".to_string(),
            "--tmpfs".to_string(),
            "/tmp".to_string(),
            "--cap-drop".to_string(),
            "ALL".to_string(),
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
            "--user".to_string(),
            "65534:65534".to_string(),
            "--memory".to_string(),
            self.config.limits.memory_bytes.to_string(),
            "--cpus".to_string(),
            format!("{}", self.config.limits.cpus),
            "--pids-limit".to_string(),
            self.config.limits.pids.to_string(),
            "--volume".to_string(),
            format!("{}:/artifacts", request.artifacts_dir.display()),
        ];
        if self.config.network_allowlist.is_empty() {
            args.push("--network".to_string());
            args.push("none".to_string());
        } else {
            args.push("--env".to_string());
            args.push(format!(
                "TOOLGATE_NET_ALLOWLIST={}",
                self.config.network_allowlist.join(",")
            ));
        }
        for (name, value) in &request.env {
            args.push("--env".to_string());
            args.push(format!("{name}={value}"));
        }
        args.push("--env".to_string());
        args.push(format!("TOOLGATE_TOOL={}", request.tool_name));
        args.push("--env".to_string());
        args.push(format!("TOOLGATE_ARGS={}", request.args));
        args.push(self.config.image.clone());
        args.extend(command.iter().cloned());
        args
    }
}

#[async_trait]
impl IsolationStrategy for ContainerIsolation {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn run(
        &self,
        request: &IsolationRequest,
        _handler: Arc<dyn ToolHandler>,
        _ctx: &CallContext,
    ) -> IsolationOutcome {
        // Re-checked here so a strategy built without config validation still
        // denies before any network flag reaches the container runtime.
        if let Some(entry) =
            self.config.network_allowlist.iter().find(|entry| !valid_allowlist_entry(entry))
        {
            return IsolationOutcome::denial(
                SandboxFailureReason::NetworkAllowlistInvalid,
                format!("fail-closed: invalid network allowlist entry: {entry}"),
            );
        }
        if let Err(denial) = self.probe().await {
            return denial;
        }
        let Some(command) = &request.command else {
            return IsolationOutcome::denial(
                SandboxFailureReason::InvalidInput,
                "fail-closed: container execution requires a command",
            );
        };
        if command.is_empty() {
            return IsolationOutcome::denial(
                SandboxFailureReason::InvalidInput,
                "fail-closed: container command is empty",
            );
        }
        if let Err(denial) = self.ensure_image().await {
            return denial;
        }

        let args = self.run_args(request, command);
        let spawned = Command::new(&self.config.docker_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                return IsolationOutcome::denial(
                    SandboxFailureReason::ContainerStartupFailed,
                    format!("fail-closed: container startup failed: {error}"),
                );
            }
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let budget = Duration::from_millis(request.timeout_ms);
        let waited = match timeout(budget, child.wait()).await {
            Ok(result) => Some(result),
            Err(_) => {
                // Kill before draining the pipes so the reads cannot hang on
                // a still-running container.
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };

        let mut stdout_text = String::new();
        if let Some(pipe) = stdout.as_mut() {
            let _ = pipe.read_to_string(&mut stdout_text).await;
        }
        let mut stderr_text = String::new();
        if let Some(pipe) = stderr.as_mut() {
            let _ = pipe.read_to_string(&mut stderr_text).await;
        }

        match waited {
            Some(Ok(status)) => {
                let exit_code = status.code();
                let success = status.success();
                let result = if success { Some(parse_result(&stdout_text)) } else { None };
                IsolationOutcome {
                    success,
                    result,
                    error: if success {
                        None
                    } else {
                        Some(format!("container exited with {exit_code:?}"))
                    },
                    timed_out: false,
                    exit_code,
                    stdout_sample: sample(&stdout_text),
                    stderr_sample: sample(&stderr_text),
                    failure_reason: if success {
                        None
                    } else {
                        Some(SandboxFailureReason::UnknownError)
                    },
                    denied_by_policy: false,
                }
            }
            Some(Err(error)) => IsolationOutcome {
                error: Some(format!("container wait failed: {error}")),
                failure_reason: Some(SandboxFailureReason::UnknownError),
                stdout_sample: sample(&stdout_text),
                stderr_sample: sample(&stderr_text),
                ..IsolationOutcome::default()
            },
            None => IsolationOutcome {
                error: Some("execution timed out".to_string()),
                timed_out: true,
                exit_code: Some(TIMEOUT_EXIT_CODE),
                stdout_sample: sample(&stdout_text),
                stderr_sample: sample(&stderr_text),
                failure_reason: Some(SandboxFailureReason::ExecutionTimeout),
                ..IsolationOutcome::default()
            },
        }
    }
}

/// Parses container stdout as a JSON result, wrapping plain text.
fn parse_result(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| json!({ "output": trimmed }))
}

/// Truncates captured output to the retained sample size.
fn sample(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let mut end = OUTPUT_SAMPLE_BYTES.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(text[..end].to_string())
}
