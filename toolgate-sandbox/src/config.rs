// toolgate-sandbox/src/config.rs
// ============================================================================
// Module: Sandbox Configuration
// Description: Sandbox config, credential blocklist, and environment factory.
// Purpose: Validate isolation settings at startup and select the strategy
//          from the process environment exactly once.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration is validated at construction and the process environment is
//! read once; call sites never consult environment variables. The credential
//! blocklist applies unconditionally: a configuration that names a blocked
//! environment variable is a startup failure, not a runtime denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Process environment variable naming the deployment environment.
pub const ENV_ENVIRONMENT: &str = "TOOLGATE_ENV";
/// Process environment variable enabling the sandbox in development.
pub const ENV_SANDBOX_ENABLED: &str = "TOOLGATE_SANDBOX_ENABLED";
/// Process environment variable forcing fail-closed isolation.
pub const ENV_FAIL_CLOSED: &str = "TOOLGATE_SANDBOX_FAIL_CLOSED";

/// Substrings that mark an environment variable name as a credential.
pub const BLOCKED_ENV_SUBSTRINGS: [&str; 3] = ["SECRET", "PASSWORD", "PRIVATE_KEY"];

/// Known credential variable names refused outright.
pub const BLOCKED_ENV_NAMES: [&str; 18] = [
    "API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SESSION_TOKEN",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "AZURE_CLIENT_ID",
    "GITHUB_TOKEN",
    "GITLAB_TOKEN",
    "NPM_TOKEN",
    "SLACK_BOT_TOKEN",
    "SLACK_WEBHOOK_URL",
    "TWILIO_AUTH_TOKEN",
    "SENDGRID_API_KEY",
    "STRIPE_API_KEY",
    "PAYPAL_CLIENT_ID",
    "DATABASE_URL",
    "JWT_SIGNING_KEY",
];

/// Default wall-clock timeout for sandboxed execution.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default memory ceiling in bytes (512 MiB).
const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;
/// Default CPU ceiling.
const DEFAULT_CPUS: f64 = 1.0;
/// Default PID ceiling.
const DEFAULT_PIDS: u32 = 128;

/// Returns true when an environment variable name is blocked.
#[must_use]
pub fn blocked_env_var(name: &str) -> bool {
    let upper = name.to_uppercase();
    if BLOCKED_ENV_SUBSTRINGS.iter().any(|needle| upper.contains(needle)) {
        return true;
    }
    BLOCKED_ENV_NAMES.iter().any(|blocked| *blocked == upper)
}

/// Returns true for a well-formed `host[:port]` network allowlist entry.
#[must_use]
pub fn valid_allowlist_entry(entry: &str) -> bool {
    !entry.is_empty()
        && !entry.contains('/')
        && !entry.contains("://")
        && !entry.chars().any(char::is_whitespace)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sandbox configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxConfigError {
    /// Configuration names a blocked environment variable.
    #[error("fail-closed: blocked environment variable in config: {0}")]
    BlockedEnvVar(String),
    /// A network allowlist entry is malformed.
    #[error("fail-closed: invalid network allowlist entry: {0}")]
    InvalidAllowlistEntry(String),
    /// Direct-execution fallback is forbidden in production.
    #[error("fail-closed: direct execution fallback is forbidden in production")]
    DirectFallbackInProduction,
    /// The container image is empty.
    #[error("fail-closed: image: missing or empty")]
    MissingImage,
    /// Timeout must be positive.
    #[error("fail-closed: timeout_ms: must be positive")]
    InvalidTimeout,
}

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Resource ceilings applied to sandboxed execution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SandboxLimits {
    /// Memory ceiling in bytes.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: u64,
    /// CPU ceiling.
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    /// PID ceiling.
    #[serde(default = "default_pids")]
    pub pids: u32,
    /// Wall-clock timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            cpus: DEFAULT_CPUS,
            pids: DEFAULT_PIDS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

const fn default_memory_bytes() -> u64 {
    DEFAULT_MEMORY_BYTES
}

const fn default_cpus() -> f64 {
    DEFAULT_CPUS
}

const fn default_pids() -> u32 {
    DEFAULT_PIDS
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Host Environment
// ============================================================================

/// Deployment environment, read once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEnv {
    /// Test runs; passthrough isolation permitted.
    Test,
    /// Development; passthrough only with the sandbox flag off.
    Development,
    /// Production; full isolation, deny on unavailable.
    Production,
}

/// Snapshot of the sandbox-relevant process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxEnvironment {
    /// Deployment environment; `None` for unrecognized values.
    pub host_env: Option<HostEnv>,
    /// Whether the sandbox-enabled flag is set.
    pub sandbox_enabled: bool,
    /// Whether the fail-closed flag is set.
    pub fail_closed: bool,
}

impl SandboxEnvironment {
    /// Reads the process environment once.
    #[must_use]
    pub fn from_process() -> Self {
        let host_env = match std::env::var(ENV_ENVIRONMENT).ok().as_deref() {
            Some("test") => Some(HostEnv::Test),
            Some("development") => Some(HostEnv::Development),
            Some("production") | None => Some(HostEnv::Production),
            Some(_) => None,
        };
        Self {
            host_env,
            sandbox_enabled: flag_set(ENV_SANDBOX_ENABLED),
            fail_closed: flag_set(ENV_FAIL_CLOSED),
        }
    }
}

/// Returns true when a boolean environment flag is set.
fn flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Isolation selection derived from the environment snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationChoice {
    /// Full container isolation; deny when unavailable.
    Container,
    /// In-process passthrough, tests and opted-out development only.
    Passthrough,
    /// Deny everything.
    Deny,
}

/// Selects the isolation strategy for an environment snapshot.
///
/// Unrecognized environments deny. Development without the sandbox flag runs
/// passthrough; the caller must surface the returned warning.
#[must_use]
pub fn choose_isolation(env: &SandboxEnvironment) -> (IsolationChoice, Option<&'static str>) {
    if env.fail_closed {
        return (IsolationChoice::Container, None);
    }
    match env.host_env {
        Some(HostEnv::Test) => (IsolationChoice::Passthrough, None),
        Some(HostEnv::Development) => {
            if env.sandbox_enabled {
                (IsolationChoice::Container, None)
            } else {
                (
                    IsolationChoice::Passthrough,
                    Some("sandbox disabled in development; running passthrough isolation"),
                )
            }
        }
        Some(HostEnv::Production) => (IsolationChoice::Container, None),
        None => (IsolationChoice::Deny, Some("unrecognized environment; denying execution")),
    }
}

// ============================================================================
// SECTION: Sandbox Config
// ============================================================================

/// Sandbox configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SandboxConfig {
    /// Container image run by the container strategy.
    #[serde(default = "default_image")]
    pub image: String,
    /// Container runtime binary.
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
    /// Resource ceilings.
    #[serde(default)]
    pub limits: SandboxLimits,
    /// Network allowlist; empty means no network.
    #[serde(default)]
    pub network_allowlist: Vec<String>,
    /// Root directory for per-sandbox artifact directories.
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,
    /// Environment passed to every execution.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Opt-in fallback to direct execution when isolation is unavailable.
    #[serde(default)]
    pub allow_direct_fallback: bool,
    /// Whether the deployment is production.
    #[serde(default)]
    pub production: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            docker_binary: default_docker_binary(),
            limits: SandboxLimits::default(),
            network_allowlist: Vec::new(),
            artifacts_root: default_artifacts_root(),
            env: BTreeMap::new(),
            allow_direct_fallback: false,
            production: false,
        }
    }
}

fn default_image() -> String {
    "toolgate-sandbox:latest".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_artifacts_root() -> PathBuf {
    std::env::temp_dir().join("toolgate-artifacts")
}

impl SandboxConfig {
    /// Validates the configuration at startup.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxConfigError`] when a blocked environment variable is
    /// configured, an allowlist entry is malformed, the fallback is enabled
    /// in production, or limits are unusable.
    pub fn validate(&self) -> Result<(), SandboxConfigError> {
        for name in self.env.keys() {
            if blocked_env_var(name) {
                return Err(SandboxConfigError::BlockedEnvVar(name.clone()));
            }
        }
        for entry in &self.network_allowlist {
            if !valid_allowlist_entry(entry) {
                return Err(SandboxConfigError::InvalidAllowlistEntry(entry.clone()));
            }
        }
        if self.allow_direct_fallback && self.production {
            return Err(SandboxConfigError::DirectFallbackInProduction);
        }
        if self.image.is_empty() {
            return Err(SandboxConfigError::MissingImage);
        }
        if self.limits.timeout_ms == 0 {
            return Err(SandboxConfigError::InvalidTimeout);
        }
        Ok(())
    }
}
