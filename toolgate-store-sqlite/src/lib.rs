// toolgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: ToolGate SQLite Store Library
// Description: Public API surface for the durable governance store.
// Purpose: Expose the store, its configuration, and eval-run records.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable persistence for ToolGate approvals and audit events. The store
//! applies decision status transitions through a database trigger so readers
//! observe the decision and the transition atomically.

pub mod store;

pub use store::AuditDeliveryMode;
pub use store::EvalRunRecord;
pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
