//! AttendMax Core Library
//!
//! Session tokens, redemption, attendance statistics, and storage for
//! AttendMax.

pub mod access;
pub mod config;
pub mod error;
pub mod invariants;
pub mod issuer;
pub mod models;
pub mod redemption;
pub mod roster;
pub mod service;
pub mod stats;
pub mod storage;

#[cfg(test)]
mod fixtures;

pub use access::{AccessPolicy, Action, Caller, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use issuer::{IssuedToken, TokenIssuer};
pub use models::*;
pub use redemption::{Redemption, RedemptionEngine};
pub use roster::{ProvisionSummary, Roster};
pub use service::AttendanceService;
pub use stats::{
    DateRange, LiveTally, StatisticsAggregator, StudentHistory, StudentStatus, SubjectDayStatus,
    SubjectTally,
};
pub use storage::{Database, Directory, LedgerStore, PutOutcome, RecordFilter, Storage};
