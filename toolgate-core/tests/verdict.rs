// toolgate-core/tests/verdict.rs
// ============================================================================
// Module: Reviewer Verdict Parsing Tests
// Description: Marker extraction from reviewer text.
// ============================================================================
//! ## Overview
//! Validates case folding, markdown stripping, the phrase allowlist, and the
//! FAIL-wins rule for ambiguous reviews.

#![allow(clippy::panic, reason = "Test-only panic-based assertions are permitted.")]

use toolgate_core::ReviewerVerdict;
use toolgate_core::parse_reviewer_verdict;

#[test]
fn parses_explicit_pass() {
    assert_eq!(
        parse_reviewer_verdict("Looks good.\nVERDICT: PASS"),
        Some(ReviewerVerdict::Pass)
    );
}

#[test]
fn parses_explicit_fail() {
    assert_eq!(
        parse_reviewer_verdict("Numbers do not add up.\nVERDICT: FAIL"),
        Some(ReviewerVerdict::Fail)
    );
}

#[test]
fn parsing_is_case_insensitive() {
    assert_eq!(parse_reviewer_verdict("verdict: pass"), Some(ReviewerVerdict::Pass));
    assert_eq!(parse_reviewer_verdict("Verdict: Fail"), Some(ReviewerVerdict::Fail));
}

#[test]
fn markdown_bold_is_stripped() {
    assert_eq!(parse_reviewer_verdict("**VERDICT: PASS**"), Some(ReviewerVerdict::Pass));
    assert_eq!(parse_reviewer_verdict("__VERDICT: FAIL__"), Some(ReviewerVerdict::Fail));
}

#[test]
fn distribution_phrases_are_recognized() {
    assert_eq!(
        parse_reviewer_verdict("The brief is APPROVED FOR DISTRIBUTION."),
        Some(ReviewerVerdict::Pass)
    );
    assert_eq!(
        parse_reviewer_verdict("This is NOT APPROVED FOR DISTRIBUTION."),
        Some(ReviewerVerdict::Fail)
    );
}

#[test]
fn fail_wins_over_pass_in_ambiguous_text() {
    let text = "VERDICT: PASS for section one, but overall VERDICT: FAIL";
    assert_eq!(parse_reviewer_verdict(text), Some(ReviewerVerdict::Fail));
}

#[test]
fn missing_marker_yields_none() {
    assert_eq!(parse_reviewer_verdict("Everything seemed fine to me."), None);
    assert_eq!(parse_reviewer_verdict(""), None);
}
