//! Storage repository traits
//!
//! These traits define the two collaborators the token protocol talks to:
//! the ledger (tokens and attendance records) and the read-only directory.
//! SQLite implements both; tests substitute their own.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AttendanceRecord, SessionToken, Student, Subject};

/// Outcome of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// A record with the same (student, subject, date) key already exists
    AlreadyExists,
}

/// Filter for ledger record queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub student_id: Option<String>,
    pub subject_code: Option<String>,
    /// Inclusive lower bound on the calendar date
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound on the calendar date
    pub end: Option<NaiveDate>,
    /// Order by redemption time, most recent first
    pub newest_first: bool,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn subject(mut self, subject_code: &str) -> Self {
        self.subject_code = Some(subject_code.to_string());
        self
    }

    /// Restrict to a single calendar day
    pub fn on(self, date: NaiveDate) -> Self {
        self.between(date, date)
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}

/// Ledger store operations
pub trait LedgerStore {
    /// Persist a newly issued token
    fn put_token(&self, token: &SessionToken) -> Result<()>;

    /// Find token by ID
    fn get_token(&self, token_id: Uuid) -> Result<Option<SessionToken>>;

    /// Bump a token's redemption counter
    fn increment_redemption_count(&self, token_id: Uuid) -> Result<()>;

    /// Insert a record unless its composite key is already taken
    fn put_record_if_absent(&self, record: &AttendanceRecord) -> Result<PutOutcome>;

    /// Insert a record and bump its token's counter as one atomic unit.
    ///
    /// On `AlreadyExists` nothing is written.
    fn record_redemption(&self, record: &AttendanceRecord) -> Result<PutOutcome>;

    /// Find the record for a (student, subject, date) key
    fn find_record(
        &self,
        student_id: &str,
        subject_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>>;

    /// Query records matching a filter
    fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>>;

    /// Count records matching a filter
    fn count_records(&self, filter: &RecordFilter) -> Result<u64> {
        Ok(self.query_records(filter)?.len() as u64)
    }
}

/// Read-only directory of subjects, rosters and teaching authorization
pub trait Directory {
    /// Is the instructor allowed to issue tokens for the subject?
    fn is_authorized_to_teach(&self, issuer_id: &str, subject_code: &str) -> Result<bool>;

    fn subject_exists(&self, subject_code: &str) -> Result<bool>;

    /// Subject details for display
    fn subject(&self, subject_code: &str) -> Result<Option<Subject>>;

    /// Student details for display
    fn student(&self, student_id: &str) -> Result<Option<Student>>;

    /// Student IDs enrolled in the subject
    fn roster_of(&self, subject_code: &str) -> Result<BTreeSet<String>>;

    /// Subject codes the student is enrolled in
    fn subjects_enrolled_by(&self, student_id: &str) -> Result<BTreeSet<String>>;

    fn is_enrolled(&self, student_id: &str, subject_code: &str) -> Result<bool> {
        Ok(self.subjects_enrolled_by(student_id)?.contains(subject_code))
    }
}

/// Combined storage interface
///
/// Implementations may be backed by SQLite or mocks.
pub trait Storage: LedgerStore + Directory {}

// Blanket implementation: any type implementing both traits implements Storage
impl<T> Storage for T where T: LedgerStore + Directory {}
