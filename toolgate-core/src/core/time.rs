// toolgate-core/src/core/time.rs
// ============================================================================
// Module: ToolGate Time Model
// Description: Unix-epoch millisecond timestamps for records and expiry.
// Purpose: Provide one timestamp representation shared by all components.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Timestamps are unix-epoch milliseconds. Expiry arithmetic is saturating so
//! pathological inputs cannot wrap. Components read the clock through
//! [`Timestamp::now`] at record-creation boundaries only; policy evaluation
//! takes timestamps as explicit inputs to stay deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix-epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns the timestamp as unix-epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by whole seconds, saturating.
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds.saturating_mul(1_000)))
    }

    /// Returns true when this timestamp is strictly before `other`.
    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Returns true when this timestamp is at or after `other`.
    #[must_use]
    pub const fn is_at_or_after(self, other: Self) -> bool {
        self.0 >= other.0
    }
}
