// toolgate-core/src/runtime/verdict.rs
// ============================================================================
// Module: ToolGate Reviewer Verdict Parsing
// Description: Extracts an explicit PASS/FAIL verdict from reviewer text.
// ============================================================================

//! ## Overview
//! Reviewer agents state their verdict as `VERDICT: PASS` or `VERDICT: FAIL`,
//! case-insensitive, with optional markdown emphasis. A small allowlist of
//! distribution phrases is also recognized. FAIL markers win over PASS
//! markers: an ambiguous review must never unlock the commit stage.

use crate::core::ReviewerVerdict;

/// Phrases equivalent to an explicit FAIL verdict.
const FAIL_MARKERS: [&str; 4] = [
    "VERDICT: FAIL",
    "VERDICT:FAIL",
    "NOT APPROVED FOR DISTRIBUTION",
    "NOT APPROVED FOR RELEASE",
];

/// Phrases equivalent to an explicit PASS verdict.
const PASS_MARKERS: [&str; 4] = [
    "VERDICT: PASS",
    "VERDICT:PASS",
    "APPROVED FOR DISTRIBUTION",
    "APPROVED FOR RELEASE",
];

/// Parses the reviewer verdict from free-form reviewer text.
///
/// Returns `None` when no explicit marker is present. Callers treat a missing
/// verdict as blocking: the commit stage refuses to start without one.
#[must_use]
pub fn parse_reviewer_verdict(text: &str) -> Option<ReviewerVerdict> {
    let normalized: String = text
        .to_uppercase()
        .chars()
        .filter(|ch| *ch != '*' && *ch != '_' && *ch != '`')
        .collect();
    if FAIL_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return Some(ReviewerVerdict::Fail);
    }
    if PASS_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return Some(ReviewerVerdict::Pass);
    }
    None
}
