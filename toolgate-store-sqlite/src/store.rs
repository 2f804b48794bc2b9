// toolgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Governance Store
// Description: Durable approval store and audit log backed by SQLite WAL.
// Purpose: Persist approval requests, decisions, audit events, and eval runs
//          with the transition semantics the runtime relies on.
// Dependencies: toolgate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One store implements both the approval and audit contracts over a single
//! database. Decision inserts are transactional with the request status
//! transition, which is applied by a database trigger; the uniqueness
//! constraint on `approval_request_id` serializes concurrent decisions and
//! surfaces duplicates as a distinguishable already-decided error. Audit
//! appends run fire-and-forget through a background writer by default, or
//! synchronously when configured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use toolgate_core::AgentActionEvent;
use toolgate_core::AppendReceipt;
use toolgate_core::ApprovalDecision;
use toolgate_core::ApprovalQueries;
use toolgate_core::ApprovalRequest;
use toolgate_core::ApprovalStatus;
use toolgate_core::ApprovalStore;
use toolgate_core::ApprovalStoreError;
use toolgate_core::AuditError;
use toolgate_core::AuditLog;
use toolgate_core::AuditStats;
use toolgate_core::DecisionId;
use toolgate_core::DecisionKind;
use toolgate_core::DiagnosticsSink;
use toolgate_core::EventFilter;
use toolgate_core::EventId;
use toolgate_core::NewApprovalRequest;
use toolgate_core::PendingFilter;
use toolgate_core::RequestId;
use toolgate_core::ReviewerVerdict;
use toolgate_core::RunId;
use toolgate_core::SandboxId;
use toolgate_core::Stage;
use toolgate_core::Timestamp;
use toolgate_core::ToolName;
use toolgate_core::TrustLevel;
use toolgate_core::approvals::AUTO_APPROVER;
use toolgate_core::approvals::auto_approve_blocker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version for the governance store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Audit append delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditDeliveryMode {
    /// Hand events to a background writer and return immediately.
    #[default]
    FireAndForget,
    /// Await persistence and surface the failure in the receipt.
    Synchronous,
}

/// Configuration for the `SQLite` governance store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// Audit append delivery mode.
    #[serde(default)]
    pub audit_delivery: AuditDeliveryMode,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid stored data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for ApprovalStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<SqliteStoreError> for AuditError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

// ============================================================================
// SECTION: Eval Runs
// ============================================================================

/// Evaluation harness metadata row.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRunRecord {
    /// Record identifier.
    pub id: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Regression suite name.
    pub suite: String,
    /// Model identifier under evaluation.
    pub model_id: String,
    /// Baseline linkage when present.
    pub baseline_id: Option<String>,
    /// Drift score within 0..=100.
    pub drift_score: f64,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed approval store and audit log.
pub struct SqliteStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Sender feeding the fire-and-forget audit writer.
    audit_tx: Option<mpsc::Sender<AgentActionEvent>>,
    /// Diagnostics sink for out-of-band persistence failures.
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl SqliteStore {
    /// Opens the governance store, initializing the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(
        config: SqliteStoreConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;

        let audit_tx = match config.audit_delivery {
            AuditDeliveryMode::Synchronous => None,
            AuditDeliveryMode::FireAndForget => {
                Some(spawn_audit_writer(&config, Arc::clone(&diagnostics))?)
            }
        };

        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
            audit_tx,
            diagnostics,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Records an evaluation run row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn record_eval_run(&self, record: &EvalRunRecord) -> Result<(), SqliteStoreError> {
        if !(0.0..=100.0).contains(&record.drift_score) {
            return Err(SqliteStoreError::Invalid(
                "fail-closed: drift_score: must be within 0..=100".to_string(),
            ));
        }
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO eval_runs (id, created_at, suite, model_id, baseline_id, \
                 drift_score) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.created_at.as_unix_millis(),
                    record.suite,
                    record.model_id,
                    record.baseline_id,
                    record.drift_score
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    /// Lists evaluation runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn eval_runs(&self) -> Result<Vec<EvalRunRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT id, created_at, suite, model_id, baseline_id, drift_score FROM \
                 eval_runs ORDER BY created_at DESC",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![], |row| {
                Ok(EvalRunRecord {
                    id: row.get(0)?,
                    created_at: Timestamp::from_unix_millis(row.get(1)?),
                    suite: row.get(2)?,
                    model_id: row.get(3)?,
                    baseline_id: row.get(4)?,
                    drift_score: row.get(5)?,
                })
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    fn insert_request(&self, request: &ApprovalRequest) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        insert_request_row(&guard, request)
    }

    fn load_request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                &format!("{REQUEST_SELECT} WHERE id = ?1"),
                params![id.as_str()],
                row_to_request,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .transpose()
    }
}

// ============================================================================
// SECTION: Approval Store Implementation
// ============================================================================

impl ApprovalQueries for SqliteStore {
    fn request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApprovalStoreError> {
        self.load_request(id).map_err(ApprovalStoreError::from)
    }

    fn requests_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRequest>, ApprovalStoreError> {
        let guard = self.lock().map_err(ApprovalStoreError::from)?;
        let mut statement = guard
            .prepare(&format!("{REQUEST_SELECT} WHERE run_id = ?1 ORDER BY created_at DESC"))
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        let rows = statement
            .query_map(params![run_id.as_str()], row_to_request)
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        let mut requests = Vec::new();
        for row in rows {
            let row = row.map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
            requests.push(row.map_err(ApprovalStoreError::from)?);
        }
        Ok(requests)
    }
}

impl ApprovalStore for SqliteStore {
    fn create_request(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequest, ApprovalStoreError> {
        request.validate().map_err(|error| ApprovalStoreError::Invalid(error.to_string()))?;
        let record = request.into_request(Timestamp::now());
        self.insert_request(&record).map_err(ApprovalStoreError::from)?;
        Ok(record)
    }

    fn pending_requests(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<ApprovalRequest>, ApprovalStoreError> {
        let now = Timestamp::now().as_unix_millis();
        let guard = self.lock().map_err(ApprovalStoreError::from)?;
        let mut statement = guard
            .prepare(&format!(
                "{REQUEST_SELECT} WHERE status = 'PENDING' AND expires_at > ?1 ORDER BY \
                 created_at DESC"
            ))
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        let rows = statement
            .query_map(params![now], row_to_request)
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        let mut requests = Vec::new();
        for row in rows {
            let row = row.map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
            let request = row.map_err(ApprovalStoreError::from)?;
            if filter.matches(&request) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    fn is_approved(&self, id: &RequestId) -> Result<bool, ApprovalStoreError> {
        Ok(self
            .request(id)?
            .is_some_and(|request| request.status == ApprovalStatus::Approved))
    }

    fn is_pending(&self, id: &RequestId) -> Result<bool, ApprovalStoreError> {
        let now = Timestamp::now();
        Ok(self.request(id)?.is_some_and(|request| {
            request.status == ApprovalStatus::Pending && !request.is_expired(now)
        }))
    }

    fn expire_stale(&self) -> Result<u64, ApprovalStoreError> {
        let now = Timestamp::now().as_unix_millis();
        let guard = self.lock().map_err(ApprovalStoreError::from)?;
        let swept = guard
            .execute(
                "UPDATE approval_requests SET status = 'EXPIRED' WHERE status = 'PENDING' AND \
                 expires_at <= ?1",
                params![now],
            )
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        Ok(swept as u64)
    }

    fn create_decision(
        &self,
        request_id: &RequestId,
        decided_by: &str,
        decision: DecisionKind,
        notes: Option<String>,
        metadata: Value,
    ) -> Result<ApprovalDecision, ApprovalStoreError> {
        if decided_by.is_empty() {
            return Err(ApprovalStoreError::Invalid(
                "fail-closed: decided_by: missing or empty".to_string(),
            ));
        }
        let now = Timestamp::now();
        let mut guard = self.lock().map_err(ApprovalStoreError::from)?;
        let tx = guard
            .transaction()
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;

        let state: Option<(String, i64)> = tx
            .query_row(
                "SELECT status, expires_at FROM approval_requests WHERE id = ?1",
                params![request_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        let Some((status, expires_at)) = state else {
            return Err(ApprovalStoreError::NotFound(request_id.to_string()));
        };
        if status != ApprovalStatus::Pending.as_str() {
            return Err(ApprovalStoreError::AlreadyDecided(request_id.to_string()));
        }
        if now.is_at_or_after(Timestamp::from_unix_millis(expires_at)) {
            return Err(ApprovalStoreError::Expired(request_id.to_string()));
        }

        let record = ApprovalDecision {
            id: DecisionId::generate(),
            created_at: now,
            request_id: request_id.clone(),
            decided_by: decided_by.to_string(),
            decision,
            notes,
            metadata,
        };
        let inserted = tx.execute(
            "INSERT INTO approval_decisions (id, created_at, approval_request_id, decided_by, \
             decision, notes, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.created_at.as_unix_millis(),
                record.request_id.as_str(),
                record.decided_by,
                record.decision.as_str(),
                record.notes,
                record.metadata.to_string()
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(ApprovalStoreError::AlreadyDecided(request_id.to_string()));
            }
            Err(err) => return Err(ApprovalStoreError::Storage(err.to_string())),
        }
        // The insert trigger applies the status transition in the same
        // transaction, so the decision and transition commit atomically.
        tx.commit().map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        Ok(record)
    }

    fn decision_for(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError> {
        let guard = self.lock().map_err(ApprovalStoreError::from)?;
        guard
            .query_row(
                "SELECT id, created_at, approval_request_id, decided_by, decision, notes, \
                 metadata FROM approval_decisions WHERE approval_request_id = ?1",
                params![request_id.as_str()],
                row_to_decision,
            )
            .optional()
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?
            .transpose()
            .map_err(ApprovalStoreError::from)
    }

    fn auto_approve(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError> {
        let Some(request) = self.request(request_id)? else {
            return Ok(None);
        };
        if let Some(blocker) = auto_approve_blocker(&request, Timestamp::now()) {
            self.diagnostics.info("auto_approve_blocked", blocker);
            return Ok(None);
        }
        let decision = match self.create_decision(
            request_id,
            AUTO_APPROVER,
            DecisionKind::Approve,
            Some("auto-approved".to_string()),
            Value::Null,
        ) {
            Ok(decision) => decision,
            Err(ApprovalStoreError::AlreadyDecided(_) | ApprovalStoreError::Expired(_)) => {
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        let guard = self.lock().map_err(ApprovalStoreError::from)?;
        guard
            .execute(
                "UPDATE approval_requests SET auto_approve_reason = ?1 WHERE id = ?2",
                params!["granted by system:auto-approve", request_id.as_str()],
            )
            .map_err(|err| ApprovalStoreError::Storage(err.to_string()))?;
        Ok(Some(decision))
    }
}

// ============================================================================
// SECTION: Audit Log Implementation
// ============================================================================

impl AuditLog for SqliteStore {
    fn append(&self, event: AgentActionEvent) -> AppendReceipt {
        let event_id = event.id.clone();
        if let Err(error) = event.validate() {
            return AppendReceipt::rejected(event_id, error.to_string());
        }
        match &self.audit_tx {
            Some(sender) => match sender.send(event) {
                Ok(()) => AppendReceipt::accepted(event_id),
                Err(error) => {
                    self.diagnostics.warn("audit_writer_unavailable", &error.to_string());
                    AppendReceipt::rejected(event_id, "audit writer unavailable".to_string())
                }
            },
            None => {
                let result = self
                    .lock()
                    .and_then(|guard| insert_event_row(&guard, &event));
                match result {
                    Ok(()) => AppendReceipt::accepted(event_id),
                    Err(error) => AppendReceipt::rejected(event_id, error.to_string()),
                }
            }
        }
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<AgentActionEvent>, AuditError> {
        let guard = self.lock().map_err(AuditError::from)?;
        let mut statement = guard
            .prepare(&format!("{EVENT_SELECT} ORDER BY created_at DESC"))
            .map_err(|err| AuditError::Storage(err.to_string()))?;
        let rows = statement
            .query_map(params![], row_to_event)
            .map_err(|err| AuditError::Storage(err.to_string()))?;
        let mut events = Vec::new();
        for row in rows {
            let row = row.map_err(|err| AuditError::Storage(err.to_string()))?;
            let event = row.map_err(AuditError::from)?;
            if filter.matches(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn stats(&self, run_id: Option<&RunId>) -> Result<AuditStats, AuditError> {
        let filter = EventFilter {
            run_id: run_id.cloned(),
            ..EventFilter::default()
        };
        let mut stats = AuditStats::default();
        for event in self.query(&filter)? {
            stats.record(&event);
        }
        Ok(stats)
    }
}

// ============================================================================
// SECTION: Background Audit Writer
// ============================================================================

/// Spawns the fire-and-forget audit writer thread with its own connection.
fn spawn_audit_writer(
    config: &SqliteStoreConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
) -> Result<mpsc::Sender<AgentActionEvent>, SqliteStoreError> {
    let connection = open_connection(config)?;
    let (sender, receiver) = mpsc::channel::<AgentActionEvent>();
    std::thread::Builder::new()
        .name("toolgate-audit-writer".to_string())
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if let Err(error) = insert_event_row(&connection, &event) {
                    diagnostics.warn("audit_persistence_failed", &error.to_string());
                }
            }
        })
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    Ok(sender)
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens a connection with durability pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            config.journal_mode.pragma_value()
        ))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Initializes the schema or validates the stored version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(SCHEMA_SQL).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Governance schema: approval requests, decisions, audit events, eval runs.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS approval_requests (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    domain TEXT NOT NULL,
    run_id TEXT NOT NULL,
    workflow_name TEXT NOT NULL,
    requested_by TEXT NOT NULL,
    trust_level TEXT NOT NULL CHECK (trust_level IN ('L0','L1','L2','L3','L4')),
    action_type TEXT NOT NULL,
    action_payload TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PENDING','APPROVED','REJECTED','EXPIRED')),
    expires_at INTEGER NOT NULL,
    context TEXT NOT NULL,
    reviewer_verdict TEXT CHECK (reviewer_verdict IN ('PASS','FAIL')),
    reviewer_notes TEXT,
    auto_approve_eligible INTEGER NOT NULL,
    auto_approve_reason TEXT
);
CREATE INDEX IF NOT EXISTS idx_approval_requests_run
    ON approval_requests (run_id);
CREATE INDEX IF NOT EXISTS idx_approval_requests_status
    ON approval_requests (status, expires_at);

CREATE TABLE IF NOT EXISTS approval_decisions (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    approval_request_id TEXT NOT NULL UNIQUE
        REFERENCES approval_requests(id) ON DELETE CASCADE,
    decided_by TEXT NOT NULL,
    decision TEXT NOT NULL CHECK (decision IN ('APPROVE','REJECT')),
    notes TEXT,
    metadata TEXT NOT NULL
);
CREATE TRIGGER IF NOT EXISTS trg_approval_decisions_status
AFTER INSERT ON approval_decisions
BEGIN
    UPDATE approval_requests
    SET status = CASE NEW.decision WHEN 'APPROVE' THEN 'APPROVED' ELSE 'REJECTED' END
    WHERE id = NEW.approval_request_id;
END;

CREATE TABLE IF NOT EXISTS agent_action_events (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    domain TEXT NOT NULL,
    workflow_name TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    run_id TEXT NOT NULL,
    trust_level TEXT NOT NULL CHECK (trust_level IN ('L0','L1','L2','L3','L4')),
    stage TEXT NOT NULL CHECK (stage IN ('plan','execute','review','commit')),
    intent TEXT NOT NULL,
    tool_name TEXT,
    tool_args TEXT NOT NULL,
    tool_result TEXT NOT NULL,
    artifact_refs TEXT NOT NULL,
    warnings TEXT NOT NULL,
    errors TEXT NOT NULL,
    summary TEXT NOT NULL,
    confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    approval_request_id TEXT,
    sandbox_id TEXT,
    sandbox_artifacts TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_run ON agent_action_events (run_id);
CREATE INDEX IF NOT EXISTS idx_events_domain_workflow
    ON agent_action_events (domain, workflow_name);
CREATE INDEX IF NOT EXISTS idx_events_created_at
    ON agent_action_events (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_events_trust_stage
    ON agent_action_events (trust_level, stage);
CREATE INDEX IF NOT EXISTS idx_events_tool ON agent_action_events (tool_name);
CREATE INDEX IF NOT EXISTS idx_events_approval
    ON agent_action_events (approval_request_id);
CREATE INDEX IF NOT EXISTS idx_events_sandbox
    ON agent_action_events (sandbox_id);

CREATE TABLE IF NOT EXISTS eval_runs (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    suite TEXT NOT NULL,
    model_id TEXT NOT NULL,
    baseline_id TEXT,
    drift_score REAL NOT NULL CHECK (drift_score >= 0 AND drift_score <= 100)
);
";

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Column list for approval request selects.
const REQUEST_SELECT: &str = "SELECT id, created_at, domain, run_id, workflow_name, \
    requested_by, trust_level, action_type, action_payload, status, expires_at, context, \
    reviewer_verdict, reviewer_notes, auto_approve_eligible, auto_approve_reason FROM \
    approval_requests";

/// Column list for audit event selects.
const EVENT_SELECT: &str = "SELECT id, created_at, domain, workflow_name, agent_name, run_id, \
    trust_level, stage, intent, tool_name, tool_args, tool_result, artifact_refs, warnings, \
    errors, summary, confidence, approval_request_id, sandbox_id, sandbox_artifacts FROM \
    agent_action_events";

/// Inserts one approval request row.
fn insert_request_row(
    connection: &Connection,
    request: &ApprovalRequest,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "INSERT INTO approval_requests (id, created_at, domain, run_id, workflow_name, \
             requested_by, trust_level, action_type, action_payload, status, expires_at, \
             context, reviewer_verdict, reviewer_notes, auto_approve_eligible, \
             auto_approve_reason) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
             ?13, ?14, ?15, ?16)",
            params![
                request.id.as_str(),
                request.created_at.as_unix_millis(),
                request.domain,
                request.run_id.as_str(),
                request.workflow_name,
                request.requested_by,
                request.trust_level.as_str(),
                request.action_type,
                request.action_payload.to_string(),
                request.status.as_str(),
                request.expires_at.as_unix_millis(),
                request.context.to_string(),
                request.reviewer_verdict.map(ReviewerVerdict::as_str),
                request.reviewer_notes,
                request.auto_approve_eligible,
                request.auto_approve_reason
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Maps a request row, deferring parse failures to the caller.
fn row_to_request(row: &Row<'_>) -> rusqlite::Result<Result<ApprovalRequest, SqliteStoreError>> {
    let trust_level: String = row.get(6)?;
    let action_payload: String = row.get(8)?;
    let status: String = row.get(9)?;
    let context: String = row.get(11)?;
    let reviewer_verdict: Option<String> = row.get(12)?;
    let request = build_request(
        RawRequestRow {
            id: row.get(0)?,
            created_at: row.get(1)?,
            domain: row.get(2)?,
            run_id: row.get(3)?,
            workflow_name: row.get(4)?,
            requested_by: row.get(5)?,
            trust_level,
            action_type: row.get(7)?,
            action_payload,
            status,
            expires_at: row.get(10)?,
            context,
            reviewer_verdict,
            reviewer_notes: row.get(13)?,
            auto_approve_eligible: row.get(14)?,
            auto_approve_reason: row.get(15)?,
        },
    );
    Ok(request)
}

/// Raw approval request columns before taxonomy parsing.
struct RawRequestRow {
    id: String,
    created_at: i64,
    domain: String,
    run_id: String,
    workflow_name: String,
    requested_by: String,
    trust_level: String,
    action_type: String,
    action_payload: String,
    status: String,
    expires_at: i64,
    context: String,
    reviewer_verdict: Option<String>,
    reviewer_notes: Option<String>,
    auto_approve_eligible: bool,
    auto_approve_reason: Option<String>,
}

/// Parses raw columns into an approval request, failing closed.
fn build_request(raw: RawRequestRow) -> Result<ApprovalRequest, SqliteStoreError> {
    let trust_level = TrustLevel::parse(&raw.trust_level)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let status = ApprovalStatus::parse(&raw.status)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let reviewer_verdict = raw
        .reviewer_verdict
        .as_deref()
        .map(ReviewerVerdict::parse)
        .transpose()
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let action_payload: Value = serde_json::from_str(&raw.action_payload)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let context: Value = serde_json::from_str(&raw.context)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    Ok(ApprovalRequest {
        id: RequestId::new(raw.id),
        created_at: Timestamp::from_unix_millis(raw.created_at),
        domain: raw.domain,
        run_id: RunId::new(raw.run_id),
        workflow_name: raw.workflow_name,
        requested_by: raw.requested_by,
        trust_level,
        action_type: raw.action_type,
        action_payload,
        context,
        reviewer_verdict,
        reviewer_notes: raw.reviewer_notes,
        status,
        expires_at: Timestamp::from_unix_millis(raw.expires_at),
        auto_approve_eligible: raw.auto_approve_eligible,
        auto_approve_reason: raw.auto_approve_reason,
    })
}

/// Maps a decision row, deferring parse failures to the caller.
fn row_to_decision(row: &Row<'_>) -> rusqlite::Result<Result<ApprovalDecision, SqliteStoreError>> {
    let decision: String = row.get(4)?;
    let metadata: String = row.get(6)?;
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(1)?;
    let request_id: String = row.get(2)?;
    let decided_by: String = row.get(3)?;
    let notes: Option<String> = row.get(5)?;
    Ok((|| {
        let decision = DecisionKind::parse(&decision)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let metadata: Value = serde_json::from_str(&metadata)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        Ok(ApprovalDecision {
            id: DecisionId::new(id),
            created_at: Timestamp::from_unix_millis(created_at),
            request_id: RequestId::new(request_id),
            decided_by,
            decision,
            notes,
            metadata,
        })
    })())
}

/// Inserts one audit event row.
fn insert_event_row(
    connection: &Connection,
    event: &AgentActionEvent,
) -> Result<(), SqliteStoreError> {
    let artifact_refs = serde_json::to_string(&event.artifact_refs)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let warnings = serde_json::to_string(&event.warnings)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let errors = serde_json::to_string(&event.errors)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let sandbox_artifacts = serde_json::to_string(&event.sandbox_artifacts)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    connection
        .execute(
            "INSERT INTO agent_action_events (id, created_at, domain, workflow_name, \
             agent_name, run_id, trust_level, stage, intent, tool_name, tool_args, \
             tool_result, artifact_refs, warnings, errors, summary, confidence, \
             approval_request_id, sandbox_id, sandbox_artifacts) VALUES (?1, ?2, ?3, ?4, ?5, \
             ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                event.id.as_str(),
                event.created_at.as_unix_millis(),
                event.domain,
                event.workflow,
                event.agent,
                event.run_id.as_str(),
                event.trust_level.as_str(),
                event.stage.as_str(),
                event.intent,
                event.tool_name.as_ref().map(ToolName::as_str),
                event.tool_args.to_string(),
                event.tool_result.to_string(),
                artifact_refs,
                warnings,
                errors,
                event.summary,
                event.confidence,
                event.approval_request_id.as_ref().map(RequestId::as_str),
                event.sandbox_id.as_ref().map(SandboxId::as_str),
                sandbox_artifacts
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Maps an event row, deferring parse failures to the caller.
fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Result<AgentActionEvent, SqliteStoreError>> {
    let trust_level: String = row.get(6)?;
    let stage: String = row.get(7)?;
    let tool_args: String = row.get(10)?;
    let tool_result: String = row.get(11)?;
    let artifact_refs: String = row.get(12)?;
    let warnings: String = row.get(13)?;
    let errors: String = row.get(14)?;
    let sandbox_artifacts: String = row.get(19)?;
    let id: String = row.get(0)?;
    let created_at: i64 = row.get(1)?;
    let domain: String = row.get(2)?;
    let workflow: String = row.get(3)?;
    let agent: String = row.get(4)?;
    let run_id: String = row.get(5)?;
    let intent: String = row.get(8)?;
    let tool_name: Option<String> = row.get(9)?;
    let summary: String = row.get(15)?;
    let confidence: f64 = row.get(16)?;
    let approval_request_id: Option<String> = row.get(17)?;
    let sandbox_id: Option<String> = row.get(18)?;
    Ok((|| {
        let invalid = |err: String| SqliteStoreError::Invalid(err);
        Ok(AgentActionEvent {
            id: EventId::new(id),
            created_at: Timestamp::from_unix_millis(created_at),
            domain,
            workflow,
            agent,
            run_id: RunId::new(run_id),
            trust_level: TrustLevel::parse(&trust_level)
                .map_err(|err| invalid(err.to_string()))?,
            stage: Stage::parse(&stage).map_err(|err| invalid(err.to_string()))?,
            intent,
            tool_name: tool_name.map(ToolName::new),
            tool_args: serde_json::from_str(&tool_args)
                .map_err(|err| invalid(err.to_string()))?,
            tool_result: serde_json::from_str(&tool_result)
                .map_err(|err| invalid(err.to_string()))?,
            artifact_refs: serde_json::from_str(&artifact_refs)
                .map_err(|err| invalid(err.to_string()))?,
            warnings: serde_json::from_str(&warnings).map_err(|err| invalid(err.to_string()))?,
            errors: serde_json::from_str(&errors).map_err(|err| invalid(err.to_string()))?,
            summary,
            confidence,
            approval_request_id: approval_request_id.map(RequestId::new),
            sandbox_id: sandbox_id.map(SandboxId::new),
            sandbox_artifacts: serde_json::from_str(&sandbox_artifacts)
                .map_err(|err| invalid(err.to_string()))?,
        })
    })())
}

/// Returns true for unique-constraint violations.
fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
