//! SQLite storage layer for AttendMax

mod directory;
mod migrations;
mod parse;
mod records;
mod tokens;
mod traits;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::error::Result;
use crate::models::{AttendanceRecord, SessionToken, Student, Subject};
use crate::roster::{ProvisionSummary, Roster};

pub use directory::DirectoryStore;
pub use records::RecordStore;
pub use tokens::TokenStore;
pub use traits::{Directory, LedgerStore, PutOutcome, RecordFilter, Storage};

/// Main database handle.
///
/// Owns a single connection. Concurrent clients each open their own handle
/// on the same file; the schema's uniqueness constraint, not an in-process
/// lock, keeps the ledger consistent.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Open or create database, waiting up to `busy_timeout` on locks
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::get_current_version(&self.conn)
    }

    /// Get session token store
    pub fn tokens(&self) -> TokenStore<'_> {
        TokenStore::new(&self.conn)
    }

    /// Get attendance record store
    pub fn records(&self) -> RecordStore<'_> {
        RecordStore::new(&self.conn)
    }

    /// Get directory store
    pub fn directory(&self) -> DirectoryStore<'_> {
        DirectoryStore::new(&self.conn)
    }

    /// Start a write transaction that takes the database lock up front
    fn begin_immediate(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Load a roster into the directory in one transaction
    #[instrument(skip(self, roster))]
    pub fn provision(&self, roster: &Roster) -> Result<ProvisionSummary> {
        roster.validate()?;

        let tx = self.begin_immediate()?;
        let store = DirectoryStore::new(&tx);
        for subject in &roster.subjects {
            store.upsert_subject(subject)?;
        }
        for instructor in &roster.instructors {
            store.upsert_instructor(instructor)?;
        }
        for student in &roster.students {
            store.upsert_student(student)?;
        }
        tx.commit()?;

        let summary = roster.summary();
        info!(
            subjects = summary.subjects,
            instructors = summary.instructors,
            students = summary.students,
            "Directory provisioned"
        );
        Ok(summary)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl LedgerStore for Database {
    fn put_token(&self, token: &SessionToken) -> Result<()> {
        self.tokens().create(token)
    }

    fn get_token(&self, token_id: Uuid) -> Result<Option<SessionToken>> {
        self.tokens().find_by_id(token_id)
    }

    fn increment_redemption_count(&self, token_id: Uuid) -> Result<()> {
        self.tokens().increment_redemption_count(token_id)
    }

    fn put_record_if_absent(&self, record: &AttendanceRecord) -> Result<PutOutcome> {
        self.records().insert_if_absent(record)
    }

    #[instrument(skip(self, record), fields(token_id = %record.token_id))]
    fn record_redemption(&self, record: &AttendanceRecord) -> Result<PutOutcome> {
        let tx = self.begin_immediate()?;

        let outcome = RecordStore::new(&tx).insert_if_absent(record)?;
        if outcome == PutOutcome::AlreadyExists {
            tx.rollback()?;
            return Ok(outcome);
        }

        TokenStore::new(&tx).increment_redemption_count(record.token_id)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn find_record(
        &self,
        student_id: &str,
        subject_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        self.records().find_for_key(student_id, subject_code, date)
    }

    fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
        self.records().query(filter)
    }

    fn count_records(&self, filter: &RecordFilter) -> Result<u64> {
        self.records().count(filter)
    }
}

impl Directory for Database {
    fn is_authorized_to_teach(&self, issuer_id: &str, subject_code: &str) -> Result<bool> {
        self.directory().teaches(issuer_id, subject_code)
    }

    fn subject_exists(&self, subject_code: &str) -> Result<bool> {
        Ok(self.directory().find_subject(subject_code)?.is_some())
    }

    fn subject(&self, subject_code: &str) -> Result<Option<Subject>> {
        self.directory().find_subject(subject_code)
    }

    fn student(&self, student_id: &str) -> Result<Option<Student>> {
        self.directory().find_student(student_id)
    }

    fn roster_of(&self, subject_code: &str) -> Result<BTreeSet<String>> {
        self.directory().roster_of(subject_code)
    }

    fn subjects_enrolled_by(&self, student_id: &str) -> Result<BTreeSet<String>> {
        self.directory().subjects_enrolled_by(student_id)
    }

    fn is_enrolled(&self, student_id: &str, subject_code: &str) -> Result<bool> {
        self.directory().is_enrolled(student_id, subject_code)
    }
}
