// toolgate-core/src/runtime/memory.rs
// ============================================================================
// Module: ToolGate In-Memory Stores
// Description: In-memory approval store and audit log for tests and hosts.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The in-memory backends implement the full approval and audit contracts,
//! including the auto-approval gates and the decision uniqueness constraint.
//! They are suitable for tests and single-process hosts; durable deployments
//! use the sqlite store crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::AgentActionEvent;
use crate::core::AppendReceipt;
use crate::core::ApprovalDecision;
use crate::core::ApprovalRequest;
use crate::core::ApprovalStatus;
use crate::core::AuditStats;
use crate::core::DecisionId;
use crate::core::DecisionKind;
use crate::core::EventFilter;
use crate::core::NewApprovalRequest;
use crate::core::PendingFilter;
use crate::core::RequestId;
use crate::core::RunId;
use crate::core::Timestamp;
use crate::core::approvals::AUTO_APPROVER;
use crate::core::approvals::auto_approve_blocker;
use crate::interfaces::ApprovalQueries;
use crate::interfaces::ApprovalStore;
use crate::interfaces::ApprovalStoreError;
use crate::interfaces::AuditError;
use crate::interfaces::AuditLog;

// ============================================================================
// SECTION: In-Memory Approval Store
// ============================================================================

/// In-memory approval store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryApprovalStore {
    /// Requests keyed by request id.
    requests: Arc<Mutex<BTreeMap<RequestId, ApprovalRequest>>>,
    /// Decisions keyed by request id (uniqueness by construction).
    decisions: Arc<Mutex<BTreeMap<RequestId, ApprovalDecision>>>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_requests(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<RequestId, ApprovalRequest>>, ApprovalStoreError>
    {
        self.requests
            .lock()
            .map_err(|_| ApprovalStoreError::Storage("approval store mutex poisoned".to_string()))
    }

    fn lock_decisions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<RequestId, ApprovalDecision>>, ApprovalStoreError>
    {
        self.decisions
            .lock()
            .map_err(|_| ApprovalStoreError::Storage("approval store mutex poisoned".to_string()))
    }
}

impl ApprovalQueries for InMemoryApprovalStore {
    fn request(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApprovalStoreError> {
        Ok(self.lock_requests()?.get(id).cloned())
    }

    fn requests_by_run(&self, run_id: &RunId) -> Result<Vec<ApprovalRequest>, ApprovalStoreError> {
        let guard = self.lock_requests()?;
        let mut requests: Vec<ApprovalRequest> =
            guard.values().filter(|request| &request.run_id == run_id).cloned().collect();
        requests.sort_by_key(|request| std::cmp::Reverse(request.created_at));
        Ok(requests)
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn create_request(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequest, ApprovalStoreError> {
        request.validate().map_err(|error| ApprovalStoreError::Invalid(error.to_string()))?;
        let record = request.into_request(Timestamp::now());
        self.lock_requests()?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn pending_requests(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<ApprovalRequest>, ApprovalStoreError> {
        let now = Timestamp::now();
        let guard = self.lock_requests()?;
        let mut requests: Vec<ApprovalRequest> = guard
            .values()
            .filter(|request| {
                request.status == ApprovalStatus::Pending
                    && !request.is_expired(now)
                    && filter.matches(request)
            })
            .cloned()
            .collect();
        requests.sort_by_key(|request| std::cmp::Reverse(request.created_at));
        Ok(requests)
    }

    fn is_approved(&self, id: &RequestId) -> Result<bool, ApprovalStoreError> {
        Ok(self
            .lock_requests()?
            .get(id)
            .is_some_and(|request| request.status == ApprovalStatus::Approved))
    }

    fn is_pending(&self, id: &RequestId) -> Result<bool, ApprovalStoreError> {
        let now = Timestamp::now();
        Ok(self.lock_requests()?.get(id).is_some_and(|request| {
            request.status == ApprovalStatus::Pending && !request.is_expired(now)
        }))
    }

    fn expire_stale(&self) -> Result<u64, ApprovalStoreError> {
        let now = Timestamp::now();
        let mut guard = self.lock_requests()?;
        let mut swept = 0;
        for request in guard.values_mut() {
            if request.status == ApprovalStatus::Pending && request.is_expired(now) {
                request.status = ApprovalStatus::Expired;
                swept += 1;
            }
        }
        Ok(swept)
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
        let mut requests = self.lock_requests()?;
        let mut decisions = self.lock_decisions()?;
        let Some(request) = requests.get_mut(request_id) else {
            return Err(ApprovalStoreError::NotFound(request_id.to_string()));
        };
        if decisions.contains_key(request_id) || request.status != ApprovalStatus::Pending {
            return Err(ApprovalStoreError::AlreadyDecided(request_id.to_string()));
        }
        if request.is_expired(now) {
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
        request.status = decision.resulting_status();
        decisions.insert(request_id.clone(), record.clone());
        Ok(record)
    }

    fn decision_for(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError> {
        Ok(self.lock_decisions()?.get(request_id).cloned())
    }

    fn auto_approve(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, ApprovalStoreError> {
        let blocked = {
            let guard = self.lock_requests()?;
            let Some(request) = guard.get(request_id) else {
                return Ok(None);
            };
            auto_approve_blocker(request, Timestamp::now())
        };
        if blocked.is_some() {
            return Ok(None);
        }
        match self.create_decision(
            request_id,
            AUTO_APPROVER,
            DecisionKind::Approve,
            Some("auto-approved".to_string()),
            Value::Null,
        ) {
            Ok(decision) => Ok(Some(decision)),
            // Lost the race to a concurrent decision; policy says no decision.
            Err(ApprovalStoreError::AlreadyDecided(_) | ApprovalStoreError::Expired(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

// ============================================================================
// SECTION: In-Memory Audit Log
// ============================================================================

/// In-memory audit log.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    /// Events in append order.
    events: Arc<Mutex<Vec<AgentActionEvent>>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, event: AgentActionEvent) -> AppendReceipt {
        let event_id = event.id.clone();
        if let Err(error) = event.validate() {
            return AppendReceipt::rejected(event_id, error.to_string());
        }
        match self.events.lock() {
            Ok(mut guard) => {
                guard.push(event);
                AppendReceipt::accepted(event_id)
            }
            Err(_) => {
                AppendReceipt::rejected(event_id, "audit log mutex poisoned".to_string())
            }
        }
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<AgentActionEvent>, AuditError> {
        let guard = self
            .events
            .lock()
            .map_err(|_| AuditError::Storage("audit log mutex poisoned".to_string()))?;
        let mut events: Vec<AgentActionEvent> =
            guard.iter().filter(|event| filter.matches(event)).cloned().collect();
        events.sort_by_key(|event| std::cmp::Reverse(event.created_at));
        Ok(events)
    }

    fn stats(&self, run_id: Option<&RunId>) -> Result<AuditStats, AuditError> {
        let guard = self
            .events
            .lock()
            .map_err(|_| AuditError::Storage("audit log mutex poisoned".to_string()))?;
        let mut stats = AuditStats::default();
        for event in guard.iter() {
            if let Some(run_id) = run_id {
                if &event.run_id != run_id {
                    continue;
                }
            }
            stats.record(event);
        }
        Ok(stats)
    }
}
