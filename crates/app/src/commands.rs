//! Command handlers
//!
//! Each handler runs one core operation for the given caller and returns a
//! serializable result; `main` prints it as JSON.

use std::path::Path;

use anyhow::Context;
use attendmax_core::{
    Caller, IssuedToken, ProvisionSummary, Redemption, Roster, SessionToken, StudentHistory,
    Subject, SubjectDayStatus,
};
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::state::AppState;

pub fn provision(state: &AppState, roster_path: &Path) -> anyhow::Result<ProvisionSummary> {
    let roster = Roster::load(roster_path)
        .with_context(|| format!("loading roster {}", roster_path.display()))?;
    let summary = state.db.provision(&roster)?;
    info!(enrollments = summary.enrollments, "Roster loaded");
    Ok(summary)
}

pub fn issue(state: &AppState, caller: &Caller, subject_code: &str) -> anyhow::Result<IssuedToken> {
    Ok(state.service().issue(caller, subject_code, Utc::now())?)
}

pub fn redeem(state: &AppState, caller: &Caller, code: &str) -> anyhow::Result<Redemption> {
    Ok(state.service().redeem(caller, code, Utc::now())?)
}

pub fn status(
    state: &AppState,
    caller: &Caller,
    subject_code: &str,
    date: Option<NaiveDate>,
) -> anyhow::Result<SubjectDayStatus> {
    Ok(state
        .service()
        .subject_status(caller, subject_code, date, Utc::now())?)
}

pub fn history(
    state: &AppState,
    caller: &Caller,
    student_id: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> anyhow::Result<StudentHistory> {
    Ok(state
        .service()
        .student_history(caller, student_id, from, to, Utc::now())?)
}

pub fn subjects(
    state: &AppState,
    caller: &Caller,
    department: Option<&str>,
    year: Option<u8>,
) -> anyhow::Result<Vec<Subject>> {
    Ok(state.service().subjects(caller, department, year)?)
}

pub fn sessions(
    state: &AppState,
    caller: &Caller,
    subject_code: &str,
) -> anyhow::Result<Vec<SessionToken>> {
    Ok(state.service().sessions(caller, subject_code)?)
}
