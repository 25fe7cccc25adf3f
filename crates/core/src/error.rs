//! Error types for AttendMax Core

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AttendanceRecord;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Token expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("Token {token_id} does not match its issued session: {reason}")]
    TokenMismatch { token_id: Uuid, reason: String },

    #[error("Invalid or inactive token {0}")]
    InvalidToken(Uuid),

    #[error("Student {student_id} is not enrolled in {subject_code}")]
    NotEnrolled {
        student_id: String,
        subject_code: String,
    },

    #[error(
        "Attendance already marked for {} in {} on {} at {}",
        .0.student_id,
        .0.subject_code,
        .0.date,
        .0.time.format("%H:%M")
    )]
    AlreadyMarked(Box<AttendanceRecord>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Storage(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Request-scoped failure caused by the caller's input or identity
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::Expired { .. }
                | Error::TokenMismatch { .. }
                | Error::InvalidToken(_)
                | Error::NotEnrolled { .. }
                | Error::AlreadyMarked(_)
                | Error::Unauthorized(_)
                | Error::NotFound(_)
                | Error::InvalidRange { .. }
        )
    }

    /// Only transient store failures may be retried, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure,
            ) => Error::StoreUnavailable(err.to_string()),
            _ => Error::Storage(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
