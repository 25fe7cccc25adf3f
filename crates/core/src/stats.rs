//! Attendance statistics
//!
//! Read-only projections over the ledger and the directory. Nothing here
//! writes; every figure is recomputed from the store on each call.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::invariants::assert_day_status_invariants;
use crate::models::{AttendanceRecord, AttendanceStatus};
use crate::storage::{Directory, LedgerStore, RecordFilter};

/// Rounded attendance percentage; 0 for an empty roster.
///
/// Rounds half up.
pub fn attendance_percentage(present: usize, enrolled: usize) -> u32 {
    if enrolled == 0 {
        return 0;
    }
    ((present * 200 + enrolled) / (enrolled * 2)) as u32
}

/// Present/enrolled figures shown right after a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveTally {
    pub present_count: usize,
    pub enrolled_count: usize,
    pub percentage: u32,
}

/// One roster member's status for a subject-day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentStatus {
    pub student_id: String,
    pub name: String,
    pub department: Option<String>,
    pub year: Option<u8>,
    pub status: AttendanceStatus,
    /// Check-in time for present students
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectDayStatus {
    pub subject_code: String,
    pub date: NaiveDate,
    pub enrolled_count: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub percentage: u32,
    pub students: Vec<StudentStatus>,
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days before `today`, through `today`
    pub fn last_days(today: NaiveDate, days: u32) -> Result<Self> {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "a range of {} days before {} is out of the calendar",
                    days, today
                ))
            })?;
        Ok(Self { start, end: today })
    }

    /// Fill in missing bounds: end defaults to today, start to `default_days`
    /// before today.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        default_days: u32,
    ) -> Result<Self> {
        let start = match start {
            Some(start) => start,
            None => Self::last_days(today, default_days)?.start,
        };
        Self::new(start, end.unwrap_or(today))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Present/total count for one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectTally {
    /// Subject display name
    pub name: String,
    pub present: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentHistory {
    pub student_id: String,
    pub range: DateRange,
    pub overall_present: usize,
    pub overall_total: usize,
    /// Keyed by subject code; every enrolled subject appears
    pub by_subject: BTreeMap<String, SubjectTally>,
    /// Most recent first
    pub records: Vec<AttendanceRecord>,
}

pub struct StatisticsAggregator<'a, L, D> {
    ledger: &'a L,
    directory: &'a D,
}

impl<'a, L: LedgerStore, D: Directory> StatisticsAggregator<'a, L, D> {
    pub fn new(ledger: &'a L, directory: &'a D) -> Self {
        Self { ledger, directory }
    }

    /// Present and enrolled counts for a subject-day, straight from the store
    pub fn live_tally(&self, subject_code: &str, date: NaiveDate) -> Result<LiveTally> {
        let present_count = self
            .ledger
            .count_records(&RecordFilter::new().subject(subject_code).on(date))?
            as usize;
        let enrolled_count = self.directory.roster_of(subject_code)?.len();

        Ok(LiveTally {
            present_count,
            enrolled_count,
            percentage: attendance_percentage(present_count, enrolled_count),
        })
    }

    /// Roster-wide status for one subject on one day
    #[instrument(skip(self))]
    pub fn subject_day_status(&self, subject_code: &str, date: NaiveDate) -> Result<SubjectDayStatus> {
        if !self.directory.subject_exists(subject_code)? {
            return Err(Error::NotFound(format!("subject '{}'", subject_code)));
        }

        let roster = self.directory.roster_of(subject_code)?;
        let checked_in: BTreeMap<String, NaiveTime> = self
            .ledger
            .query_records(&RecordFilter::new().subject(subject_code).on(date))?
            .into_iter()
            .map(|record| (record.student_id, record.time))
            .collect();

        let mut students = Vec::with_capacity(roster.len());
        for student_id in &roster {
            let details = self.directory.student(student_id)?;
            let time = checked_in.get(student_id).copied();
            students.push(StudentStatus {
                student_id: student_id.clone(),
                name: details
                    .as_ref()
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| student_id.clone()),
                department: details.as_ref().and_then(|s| s.department.clone()),
                year: details.as_ref().and_then(|s| s.year),
                status: if time.is_some() {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                },
                time,
            });
        }

        // Only roster members count, so a roster that shrank after check-in
        // cannot push absences negative
        let enrolled_count = roster.len();
        let present_count = students
            .iter()
            .filter(|s| s.status == AttendanceStatus::Present)
            .count();

        let status = SubjectDayStatus {
            subject_code: subject_code.to_string(),
            date,
            enrolled_count,
            present_count,
            absent_count: enrolled_count - present_count,
            percentage: attendance_percentage(present_count, enrolled_count),
            students,
        };
        assert_day_status_invariants(&status);
        Ok(status)
    }

    /// A student's records and per-subject tallies over a date range
    #[instrument(skip(self))]
    pub fn student_range_history(&self, student_id: &str, range: DateRange) -> Result<StudentHistory> {
        let records = self.ledger.query_records(
            &RecordFilter::new()
                .student(student_id)
                .between(range.start, range.end)
                .newest_first(),
        )?;

        let mut by_subject: BTreeMap<String, SubjectTally> = self
            .directory
            .subjects_enrolled_by(student_id)?
            .into_iter()
            .map(|code| (code, SubjectTally::default()))
            .collect();

        let mut overall_present = 0;
        for record in &records {
            let tally = by_subject.entry(record.subject_code.clone()).or_default();
            tally.total += 1;
            if record.status == AttendanceStatus::Present {
                tally.present += 1;
                overall_present += 1;
            }
        }

        for (code, tally) in by_subject.iter_mut() {
            tally.name = self
                .directory
                .subject(code)?
                .map(|subject| subject.name)
                .unwrap_or_else(|| code.clone());
        }

        Ok(StudentHistory {
            student_id: student_id.to_string(),
            range,
            overall_present,
            overall_total: records.len(),
            by_subject,
            records,
        })
    }
}
