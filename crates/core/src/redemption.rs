//! Token redemption
//!
//! A student submits the wire code they were shown. Redemption runs a fixed
//! sequence of checks and commits at most one ledger entry:
//!
//! 1. parse the code (`InvalidFormat`)
//! 2. reject an expired embedded deadline before any lookup (`Expired`)
//! 3. the token must exist and be active (`InvalidToken`), and its stored
//!    subject and expiry must equal the embedded ones (`TokenMismatch`)
//! 4. the student must be on the subject roster (`NotEnrolled`)
//! 5. no record may exist for (student, subject, today) (`AlreadyMarked`)
//! 6. insert the record and bump the token counter in one transaction
//!
//! No in-process lock is taken. Two racing redemptions for the same key
//! both pass step 5; the store's uniqueness constraint picks the winner and
//! the loser is reported as `AlreadyMarked` like any other replay.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::invariants::assert_record_matches_token;
use crate::models::{AttendanceRecord, SessionToken, TokenCode};
use crate::stats::{LiveTally, StatisticsAggregator};
use crate::storage::{Directory, LedgerStore, PutOutcome};

/// A committed redemption and the subject-day tally after it
#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    pub record: AttendanceRecord,
    pub subject_name: String,
    pub tally: LiveTally,
}

pub struct RedemptionEngine<'a, L, D> {
    ledger: &'a L,
    directory: &'a D,
}

impl<'a, L: LedgerStore, D: Directory> RedemptionEngine<'a, L, D> {
    pub fn new(ledger: &'a L, directory: &'a D) -> Self {
        Self { ledger, directory }
    }

    /// Redeem `raw_code` for `student_id` at `now`
    #[instrument(skip(self, raw_code, now))]
    pub fn redeem(&self, student_id: &str, raw_code: &str, now: DateTime<Utc>) -> Result<Redemption> {
        let code = TokenCode::parse(raw_code)?;

        let expires_at = code.expires_at()?;
        if now > expires_at {
            debug!(token_id = %code.token_id, %expires_at, "Expired token presented");
            return Err(Error::Expired { expires_at });
        }

        let token = self.load_token(&code)?;

        if !self.directory.is_enrolled(student_id, &token.subject_code)? {
            debug!(subject = %token.subject_code, "Student not on roster");
            return Err(Error::NotEnrolled {
                student_id: student_id.to_string(),
                subject_code: token.subject_code,
            });
        }

        let date = now.date_naive();
        if let Some(existing) = self
            .ledger
            .find_record(student_id, &token.subject_code, date)?
        {
            debug!(recorded_at = %existing.recorded_at, "Attendance already marked");
            return Err(Error::AlreadyMarked(Box::new(existing)));
        }

        let record = AttendanceRecord::present(student_id, &token, now);
        assert_record_matches_token(&record, &token);

        match self.ledger.record_redemption(&record)? {
            PutOutcome::Inserted => {}
            PutOutcome::AlreadyExists => {
                // Lost the race to a concurrent redemption for the same key
                warn!(subject = %token.subject_code, "Concurrent redemption lost on commit");
                let existing = self
                    .ledger
                    .find_record(student_id, &token.subject_code, date)?
                    .ok_or(Error::Storage(rusqlite::Error::QueryReturnedNoRows))?;
                return Err(Error::AlreadyMarked(Box::new(existing)));
            }
        }

        let tally = StatisticsAggregator::new(self.ledger, self.directory)
            .live_tally(&token.subject_code, date)?;
        let subject_name = self
            .directory
            .subject(&token.subject_code)?
            .map(|s| s.name)
            .unwrap_or_else(|| token.subject_code.clone());

        info!(
            token_id = %token.id,
            subject = %token.subject_code,
            present = tally.present_count,
            enrolled = tally.enrolled_count,
            "Attendance recorded"
        );

        Ok(Redemption {
            record,
            subject_name,
            tally,
        })
    }

    /// Resolve the stored token and check it against the presented code
    fn load_token(&self, code: &TokenCode) -> Result<SessionToken> {
        let token = match self.ledger.get_token(code.token_id)? {
            Some(token) if token.active => token,
            Some(_) => {
                debug!(token_id = %code.token_id, "Inactive token presented");
                return Err(Error::InvalidToken(code.token_id));
            }
            None => {
                debug!(token_id = %code.token_id, "Unknown token presented");
                return Err(Error::InvalidToken(code.token_id));
            }
        };

        if token.subject_code != code.subject_code {
            warn!(
                token_id = %token.id,
                presented = %code.subject_code,
                issued = %token.subject_code,
                "Token presented for a different subject"
            );
            return Err(Error::TokenMismatch {
                token_id: token.id,
                reason: format!(
                    "issued for {}, presented for {}",
                    token.subject_code, code.subject_code
                ),
            });
        }

        if token.expires_at.timestamp() != code.expires_at_epoch {
            warn!(token_id = %token.id, "Token presented with altered expiry");
            return Err(Error::TokenMismatch {
                token_id: token.id,
                reason: format!(
                    "expiry {} does not match issued expiry {}",
                    code.expires_at_epoch,
                    token.expires_at.timestamp()
                ),
            });
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{provisioned_db, roster, t0};
    use crate::issuer::{IssuedToken, TokenIssuer};
    use crate::storage::{Database, RecordFilter};
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn issue(db: &Database, subject: &str, at: DateTime<Utc>) -> IssuedToken {
        TokenIssuer::new(db, db, Duration::seconds(15))
            .issue("teacher-1", subject, at)
            .unwrap()
    }

    fn record_count(db: &Database) -> u64 {
        db.count_records(&RecordFilter::new()).unwrap()
    }

    #[test]
    fn test_session_scenario() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());
        let code = issued.code_string();

        // Enrolled student within the window
        let redemption = engine
            .redeem("CS2001", &code, t0() + Duration::seconds(10))
            .unwrap();
        assert_eq!(redemption.record.date, t0().date_naive());
        assert_eq!(redemption.record.subject_code, "CS101");
        assert_eq!(redemption.record.token_id, issued.token.id);
        assert_eq!(redemption.record.issuer_id, "teacher-1");
        assert_eq!(redemption.subject_name, "Data Structures");
        assert_eq!(
            redemption.tally,
            LiveTally {
                present_count: 1,
                enrolled_count: 3,
                percentage: 33,
            }
        );

        // Same student again
        match engine.redeem("CS2001", &code, t0() + Duration::seconds(11)) {
            Err(Error::AlreadyMarked(existing)) => assert_eq!(*existing, redemption.record),
            other => panic!("expected AlreadyMarked, got {:?}", other),
        }

        // Another student after the window
        assert!(matches!(
            engine.redeem("CS2002", &code, t0() + Duration::seconds(20)),
            Err(Error::Expired { .. })
        ));

        assert_eq!(record_count(&db), 1);
        let stored = db.get_token(issued.token.id).unwrap().unwrap();
        assert_eq!(stored.redemption_count, 1);
    }

    #[test]
    fn test_redeem_at_exact_expiry_is_valid() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());

        assert!(engine
            .redeem("CS2001", &issued.code_string(), issued.token.expires_at)
            .is_ok());
    }

    #[test]
    fn test_expired_regardless_of_existence() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);

        // Never issued
        let code = format!("CS101:{}:{}", Uuid::new_v4(), t0().timestamp());
        assert!(matches!(
            engine.redeem("CS2001", &code, t0() + Duration::seconds(1)),
            Err(Error::Expired { .. })
        ));
    }

    #[test]
    fn test_malformed_code() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);

        for raw in ["", "CS101", "CS101:abc:123", "CS101::123:4"] {
            assert!(
                matches!(engine.redeem("CS2001", raw, t0()), Err(Error::InvalidFormat(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_unknown_token() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let code = format!("CS101:{}:{}", Uuid::new_v4(), t0().timestamp() + 15);

        assert!(matches!(
            engine.redeem("CS2001", &code, t0()),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn test_inactive_token() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let token = SessionToken::new("CS101", "teacher-1", t0(), Duration::seconds(15)).inactive();
        db.put_token(&token).unwrap();

        let code = token.code().unwrap().to_code();
        assert!(matches!(
            engine.redeem("CS2001", &code, t0()),
            Err(Error::InvalidToken(_))
        ));
        assert_eq!(record_count(&db), 0);
    }

    #[test]
    fn test_subject_swap_rejected() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());

        // CS2001 is enrolled in both CS101 and CS201
        let forged = format!("CS201:{}:{}", issued.token.id, issued.code.expires_at_epoch);
        assert!(matches!(
            engine.redeem("CS2001", &forged, t0()),
            Err(Error::TokenMismatch { .. })
        ));
        assert_eq!(
            db.count_records(&RecordFilter::new().subject("CS201")).unwrap(),
            0
        );
    }

    #[test]
    fn test_extended_expiry_rejected() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());

        let forged = format!(
            "CS101:{}:{}",
            issued.token.id,
            issued.code.expires_at_epoch + 3600
        );
        assert!(matches!(
            engine.redeem("CS2001", &forged, t0() + Duration::seconds(60)),
            Err(Error::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_not_enrolled() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());

        assert!(matches!(
            engine.redeem("IT2001", &issued.code_string(), t0()),
            Err(Error::NotEnrolled { .. })
        ));
        assert_eq!(record_count(&db), 0);
    }

    #[test]
    fn test_one_record_per_day_across_sessions() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let morning = issue(&db, "CS101", t0());
        let afternoon = issue(&db, "CS101", t0() + Duration::hours(4));

        engine.redeem("CS2001", &morning.code_string(), t0()).unwrap();
        assert!(matches!(
            engine.redeem(
                "CS2001",
                &afternoon.code_string(),
                t0() + Duration::hours(4)
            ),
            Err(Error::AlreadyMarked(_))
        ));

        // Next day is a new key
        let tomorrow = issue(&db, "CS101", t0() + Duration::days(1));
        let next = engine
            .redeem("CS2001", &tomorrow.code_string(), t0() + Duration::days(1))
            .unwrap();
        assert_eq!(next.record.date, NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
    }

    #[test]
    fn test_replay_returns_stored_record_exactly() {
        let db = provisioned_db();
        let engine = RedemptionEngine::new(&db, &db);
        let issued = issue(&db, "CS101", t0());

        let at = t0() + Duration::nanoseconds(1_234_567_891);
        let redemption = engine.redeem("CS2001", &issued.code_string(), at).unwrap();

        match engine.redeem("CS2001", &issued.code_string(), at) {
            Err(Error::AlreadyMarked(existing)) => {
                assert_eq!(*existing, redemption.record);
                assert_eq!(
                    existing.recorded_at,
                    t0() + Duration::microseconds(1_234_567)
                );
            }
            other => panic!("expected AlreadyMarked, got {:?}", other),
        }
    }

    /// Ledger that reports a taken key on commit but cannot find the record
    struct VanishingConflictLedger<'a>(&'a Database);

    impl LedgerStore for VanishingConflictLedger<'_> {
        fn put_token(&self, token: &SessionToken) -> Result<()> {
            self.0.put_token(token)
        }
        fn get_token(&self, token_id: Uuid) -> Result<Option<SessionToken>> {
            self.0.get_token(token_id)
        }
        fn increment_redemption_count(&self, token_id: Uuid) -> Result<()> {
            self.0.increment_redemption_count(token_id)
        }
        fn put_record_if_absent(&self, _: &AttendanceRecord) -> Result<PutOutcome> {
            Ok(PutOutcome::AlreadyExists)
        }
        fn record_redemption(&self, _: &AttendanceRecord) -> Result<PutOutcome> {
            Ok(PutOutcome::AlreadyExists)
        }
        fn find_record(&self, _: &str, _: &str, _: NaiveDate) -> Result<Option<AttendanceRecord>> {
            Ok(None)
        }
        fn query_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
            self.0.query_records(filter)
        }
    }

    #[test]
    fn test_lost_race_without_record_is_storage_error() {
        let db = provisioned_db();
        let issued = issue(&db, "CS101", t0());
        let ledger = VanishingConflictLedger(&db);
        let engine = RedemptionEngine::new(&ledger, &db);

        let err = engine
            .redeem("CS2001", &issued.code_string(), t0())
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(record_count(&db), 0);
    }

    /// Store whose ledger is unreachable
    struct UnavailableLedger;

    impl LedgerStore for UnavailableLedger {
        fn put_token(&self, _: &SessionToken) -> Result<()> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn get_token(&self, _: Uuid) -> Result<Option<SessionToken>> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn increment_redemption_count(&self, _: Uuid) -> Result<()> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn put_record_if_absent(&self, _: &AttendanceRecord) -> Result<PutOutcome> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn record_redemption(&self, _: &AttendanceRecord) -> Result<PutOutcome> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn find_record(&self, _: &str, _: &str, _: NaiveDate) -> Result<Option<AttendanceRecord>> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
        fn query_records(&self, _: &RecordFilter) -> Result<Vec<AttendanceRecord>> {
            Err(Error::StoreUnavailable("connection lost".into()))
        }
    }

    #[test]
    fn test_store_failure_propagates() {
        let directory = provisioned_db();
        let engine = RedemptionEngine::new(&UnavailableLedger, &directory);
        let code = format!("CS101:{}:{}", Uuid::new_v4(), t0().timestamp() + 15);

        let err = engine.redeem("CS2001", &code, t0()).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_concurrent_redemptions_same_student() {
        const ATTEMPTS: usize = 8;

        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let db = Database::open(&path).unwrap();
        db.provision(&roster()).unwrap();
        let code = issue(&db, "CS101", t0()).code_string();

        // One connection per client, opened up front
        let connections: Vec<Database> = (0..ATTEMPTS)
            .map(|_| Database::open(&path).unwrap())
            .collect();
        let barrier = Arc::new(Barrier::new(ATTEMPTS));

        let handles: Vec<_> = connections
            .into_iter()
            .enumerate()
            .map(|(i, conn)| {
                let barrier = Arc::clone(&barrier);
                let code = code.clone();
                thread::spawn(move || {
                    let engine = RedemptionEngine::new(&conn, &conn);
                    barrier.wait();
                    engine.redeem("CS2001", &code, t0() + Duration::milliseconds(i as i64))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let replays = results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyMarked(_))))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(replays, ATTEMPTS - 1);
        assert_eq!(record_count(&db), 1);

        let token_id = TokenCode::parse(&code).unwrap().token_id;
        assert_eq!(db.get_token(token_id).unwrap().unwrap().redemption_count, 1);
    }

    #[test]
    fn test_concurrent_redemptions_many_students() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let db = Database::open(&path).unwrap();
        db.provision(&roster()).unwrap();
        let code = issue(&db, "CS101", t0()).code_string();

        let students = ["CS2001", "CS2002", "CS2003"];
        let barrier = Arc::new(Barrier::new(students.len()));

        let handles: Vec<_> = students
            .iter()
            .map(|student| {
                let conn = Database::open(&path).unwrap();
                let barrier = Arc::clone(&barrier);
                let code = code.clone();
                let student = student.to_string();
                thread::spawn(move || {
                    let engine = RedemptionEngine::new(&conn, &conn);
                    barrier.wait();
                    engine
                        .redeem(&student, &code, t0() + Duration::seconds(2))
                        .map(|r| r.record.student_id)
                })
            })
            .collect();

        let redeemed: BTreeSet<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(redeemed.len(), students.len());
        assert_eq!(record_count(&db), students.len() as u64);
    }
}
