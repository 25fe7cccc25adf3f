//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use crate::models::{AttendanceRecord, AttendanceStatus, SessionToken};
use crate::stats::SubjectDayStatus;

/// Validate that a token's window and binding are consistent
pub fn assert_token_invariants(token: &SessionToken) {
    debug_assert!(
        token.expires_at > token.issued_at,
        "Token {} expires at {} but was issued at {}",
        token.id,
        token.expires_at,
        token.issued_at
    );

    debug_assert!(
        !token.subject_code.is_empty() && !token.issuer_id.is_empty(),
        "Token {} has an empty binding",
        token.id
    );
}

/// Validate that a record about to be committed came from its token
pub fn assert_record_matches_token(record: &AttendanceRecord, token: &SessionToken) {
    debug_assert_eq!(
        record.subject_code, token.subject_code,
        "Record {} subject differs from token {}",
        record.id, token.id
    );

    debug_assert_eq!(record.token_id, token.id);

    debug_assert!(
        record.status == AttendanceStatus::Present,
        "Record {} stored with status {}",
        record.id,
        record.status
    );
}

/// Validate that a subject-day projection adds up
pub fn assert_day_status_invariants(status: &SubjectDayStatus) {
    debug_assert_eq!(
        status.present_count + status.absent_count,
        status.enrolled_count,
        "{} on {}: present + absent != enrolled",
        status.subject_code,
        status.date
    );

    debug_assert_eq!(
        status.students.len(),
        status.enrolled_count,
        "{} on {}: per-student list does not cover the roster",
        status.subject_code,
        status.date
    );

    debug_assert!(
        status.percentage <= 100,
        "{} on {}: percentage {} above 100",
        status.subject_code,
        status.date,
        status.percentage
    );
}
