//! Role-gated entry points
//!
//! Request handlers hold one `AttendanceService` per store handle and pass
//! the authenticated caller into every call. Role checks happen here; the
//! engines underneath only enforce the token protocol.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument};

use crate::access::{Action, Caller, Role};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::issuer::{IssuedToken, TokenIssuer};
use crate::models::{SessionToken, Subject};
use crate::redemption::{Redemption, RedemptionEngine};
use crate::stats::{DateRange, StatisticsAggregator, StudentHistory, SubjectDayStatus};
use crate::storage::{Database, Storage};

pub struct AttendanceService<'a, S> {
    store: &'a S,
    config: Config,
}

impl<'a, S: Storage> AttendanceService<'a, S> {
    pub fn new(store: &'a S, config: Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Teacher issues a session token for a subject they teach
    #[instrument(skip(self, caller, now), fields(user = %caller.user_id))]
    pub fn issue(&self, caller: &Caller, subject_code: &str, now: DateTime<Utc>) -> Result<IssuedToken> {
        caller.require(Action::IssueToken)?;
        TokenIssuer::new(self.store, self.store, self.config.validity_window()).issue(
            &caller.user_id,
            subject_code,
            now,
        )
    }

    /// Student redeems a token code for themselves
    #[instrument(skip(self, caller, raw_code, now), fields(user = %caller.user_id))]
    pub fn redeem(&self, caller: &Caller, raw_code: &str, now: DateTime<Utc>) -> Result<Redemption> {
        caller.require(Action::RedeemToken)?;
        RedemptionEngine::new(self.store, self.store).redeem(&caller.user_id, raw_code, now)
    }

    /// Roster-wide status for a subject-day; defaults to today
    #[instrument(skip(self, caller, now), fields(user = %caller.user_id))]
    pub fn subject_status(
        &self,
        caller: &Caller,
        subject_code: &str,
        date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<SubjectDayStatus> {
        caller.require(Action::ViewSubjectStatus)?;
        self.require_teaches(caller, subject_code)?;

        let date = date.unwrap_or_else(|| now.date_naive());
        StatisticsAggregator::new(self.store, self.store).subject_day_status(subject_code, date)
    }

    /// Attendance history for a student over a date range.
    ///
    /// Students may only read their own history; `student_id` defaults to the
    /// caller. Missing bounds fall back to the configured default range
    /// ending today.
    #[instrument(skip(self, caller, now), fields(user = %caller.user_id))]
    pub fn student_history(
        &self,
        caller: &Caller,
        student_id: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<StudentHistory> {
        let student_id = student_id.unwrap_or(caller.user_id.as_str());
        if caller.role == Role::Student && student_id == caller.user_id {
            caller.require(Action::ViewOwnHistory)?;
        } else {
            caller.require(Action::ViewAnyHistory)?;
        }

        let range = DateRange::resolve(
            start,
            end,
            now.date_naive(),
            self.config.history.default_days,
        )?;
        StatisticsAggregator::new(self.store, self.store).student_range_history(student_id, range)
    }

    /// Teachers are limited to their own subjects; admins see all
    fn require_teaches(&self, caller: &Caller, subject_code: &str) -> Result<()> {
        if caller.role != Role::Teacher {
            return Ok(());
        }
        if !self.store.subject_exists(subject_code)? {
            return Err(Error::NotFound(format!("subject '{}'", subject_code)));
        }
        if !self.store.is_authorized_to_teach(&caller.user_id, subject_code)? {
            debug!(subject = subject_code, "Teacher does not teach subject");
            return Err(Error::Unauthorized(format!(
                "{} does not teach {}",
                caller.user_id, subject_code
            )));
        }
        Ok(())
    }
}

impl AttendanceService<'_, Database> {
    /// Tokens issued for a subject, newest first
    pub fn sessions(&self, caller: &Caller, subject_code: &str) -> Result<Vec<SessionToken>> {
        caller.require(Action::ViewSubjectStatus)?;
        self.require_teaches(caller, subject_code)?;
        self.store.tokens().list_for_subject(subject_code)
    }

    /// Subject catalog, optionally narrowed to a department and/or year.
    ///
    /// Teachers get only the subjects they teach.
    #[instrument(skip(self, caller), fields(user = %caller.user_id))]
    pub fn subjects(
        &self,
        caller: &Caller,
        department: Option<&str>,
        year: Option<u8>,
    ) -> Result<Vec<Subject>> {
        caller.require(Action::ViewSubjects)?;

        let directory = self.store.directory();
        let mut subjects = directory.list_subjects(department, year)?;
        if caller.role == Role::Teacher {
            let taught = directory.subjects_taught_by(&caller.user_id)?;
            subjects.retain(|subject| taught.contains(&subject.code));
        }
        Ok(subjects)
    }
}
