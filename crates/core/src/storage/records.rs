//! Attendance record storage operations

use chrono::NaiveDate;
use rusqlite::{ffi, params, params_from_iter, Connection, Row};
use tracing::{debug, instrument};

use super::parse::{
    format_date, format_datetime, format_time, parse_date, parse_datetime, parse_status,
    parse_time, parse_uuid, OptionalExt,
};
use super::traits::{PutOutcome, RecordFilter};
use crate::error::{Error, Result};
use crate::models::AttendanceRecord;

const RECORD_COLUMNS: &str =
    "id, student_id, subject_code, date, time, recorded_at, status, token_id, issuer_id";

pub struct RecordStore<'a> {
    conn: &'a Connection,
}

impl<'a> RecordStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
        Ok(AttendanceRecord {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            student_id: row.get(1)?,
            subject_code: row.get(2)?,
            date: parse_date(&row.get::<_, String>(3)?)?,
            time: parse_time(&row.get::<_, String>(4)?)?,
            recorded_at: parse_datetime(&row.get::<_, String>(5)?)?,
            status: parse_status(&row.get::<_, String>(6)?)?,
            token_id: parse_uuid(&row.get::<_, String>(7)?)?,
            issuer_id: row.get(8)?,
        })
    }

    /// Insert a record, reporting a taken composite key as `AlreadyExists`
    #[instrument(skip(self, record), fields(student = %record.student_id, subject = %record.subject_code, date = %record.date))]
    pub fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<PutOutcome> {
        if record.student_id.trim().is_empty() {
            return Err(Error::Validation("empty student id".to_string()));
        }

        let inserted = self.conn.execute(
            "INSERT INTO attendance_records (id, student_id, subject_code, date, time, recorded_at, status, token_id, issuer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.student_id,
                record.subject_code,
                format_date(record.date),
                format_time(record.time),
                format_datetime(&record.recorded_at),
                record.status.as_str(),
                record.token_id.to_string(),
                record.issuer_id,
            ],
        );

        match inserted {
            Ok(_) => Ok(PutOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                debug!("Composite key already taken");
                Ok(PutOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find the record for a (student, subject, date) key
    pub fn find_for_key(
        &self,
        student_id: &str,
        subject_code: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM attendance_records
             WHERE student_id = ?1 AND subject_code = ?2 AND date = ?3",
            RECORD_COLUMNS
        ))?;

        let record = stmt
            .query_row(
                params![student_id, subject_code, format_date(date)],
                Self::from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Query records matching a filter
    #[instrument(skip(self))]
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
        let (clause, values) = where_clause(filter);
        let order = if filter.newest_first {
            " ORDER BY recorded_at DESC"
        } else {
            " ORDER BY recorded_at ASC"
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM attendance_records{}{}",
            RECORD_COLUMNS, clause, order
        ))?;

        let records = stmt
            .query_map(params_from_iter(values.iter()), Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count records matching a filter
    pub fn count(&self, filter: &RecordFilter) -> Result<u64> {
        let (clause, values) = where_clause(filter);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM attendance_records{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Build a WHERE clause and its positional values. Dates are stored as
/// `YYYY-MM-DD`, so range comparisons on text are calendar comparisons.
fn where_clause(filter: &RecordFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(student_id) = &filter.student_id {
        values.push(student_id.clone());
        conditions.push(format!("student_id = ?{}", values.len()));
    }
    if let Some(subject_code) = &filter.subject_code {
        values.push(subject_code.clone());
        conditions.push(format!("subject_code = ?{}", values.len()));
    }
    if let Some(start) = filter.start {
        values.push(format_date(start));
        conditions.push(format!("date >= ?{}", values.len()));
    }
    if let Some(end) = filter.end {
        values.push(format_date(end));
        conditions.push(format!("date <= ?{}", values.len()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}
