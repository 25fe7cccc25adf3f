//! Attendance ledger model

use chrono::{DateTime, NaiveDate, NaiveTime, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionToken;

/// Attendance status for a student in a subject on a day.
///
/// Only `Present` is ever stored; `Absent` is derived by the statistics
/// projection for roster members without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One redemption in the ledger.
///
/// Identity is the composite (`student_id`, `subject_code`, `date`); the
/// store holds at most one record per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: String,
    pub subject_code: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub recorded_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub token_id: Uuid,
    /// Issuer of the redeemed token at the time of redemption
    pub issuer_id: String,
}

impl AttendanceRecord {
    /// Build a present record for a redemption of `token` at `now` (UTC).
    ///
    /// `recorded_at` keeps microseconds, the precision the ledger stores.
    pub fn present(student_id: &str, token: &SessionToken, now: DateTime<Utc>) -> Self {
        let time = now.time();
        Self {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            subject_code: token.subject_code.clone(),
            date: now.date_naive(),
            time: time.with_nanosecond(0).unwrap_or(time),
            recorded_at: now.trunc_subsecs(6),
            status: AttendanceStatus::Present,
            token_id: token.id,
            issuer_id: token.issuer_id.clone(),
        }
    }

    /// Ledger key of this record
    pub fn key(&self) -> (&str, &str, NaiveDate) {
        (&self.student_id, &self.subject_code, self.date)
    }
}
