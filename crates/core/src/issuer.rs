//! Token issuance
//!
//! An instructor asks for a session token for one of their subjects; the
//! issuer binds it to (subject, instructor, issuance time, expiry) and
//! persists it. Overlapping sessions for the same subject are allowed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::invariants::assert_token_invariants;
use crate::models::{SessionToken, TokenCode};
use crate::stats::StatisticsAggregator;
use crate::storage::{Directory, LedgerStore};

/// A freshly issued token with its wire code
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: SessionToken,
    pub code: TokenCode,
    pub valid_for_seconds: i64,
    pub subject_name: String,
    /// Roster size at issuance, for the instructor's display
    pub enrolled_count: usize,
    /// Students already marked present in the subject today
    pub present_count: usize,
}

impl IssuedToken {
    /// Wire string to broadcast
    pub fn code_string(&self) -> String {
        self.code.to_code()
    }
}

pub struct TokenIssuer<'a, L, D> {
    ledger: &'a L,
    directory: &'a D,
    window: Duration,
}

impl<'a, L: LedgerStore, D: Directory> TokenIssuer<'a, L, D> {
    pub fn new(ledger: &'a L, directory: &'a D, window: Duration) -> Self {
        debug_assert!(window > Duration::zero(), "validity window must be positive");
        Self {
            ledger,
            directory,
            window,
        }
    }

    /// Issue a token for `subject_code` on behalf of `issuer_id`
    #[instrument(skip(self, now))]
    pub fn issue(
        &self,
        issuer_id: &str,
        subject_code: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let subject = self.directory.subject(subject_code)?.ok_or_else(|| {
            debug!("Unknown subject");
            Error::NotFound(format!("subject '{}'", subject_code))
        })?;

        if !self.directory.is_authorized_to_teach(issuer_id, subject_code)? {
            debug!("Issuer does not teach subject");
            return Err(Error::Unauthorized(format!(
                "{} does not teach {}",
                issuer_id, subject_code
            )));
        }

        let token = SessionToken::new(subject_code, issuer_id, now, self.window);
        assert_token_invariants(&token);
        let code = token.code()?;

        self.ledger.put_token(&token)?;
        let tally = StatisticsAggregator::new(self.ledger, self.directory)
            .live_tally(subject_code, now.date_naive())?;

        info!(
            token_id = %token.id,
            expires_at = %token.expires_at,
            enrolled = tally.enrolled_count,
            present = tally.present_count,
            "Session token issued"
        );

        Ok(IssuedToken {
            valid_for_seconds: token.valid_for_seconds(),
            token,
            code,
            subject_name: subject.name,
            enrolled_count: tally.enrolled_count,
            present_count: tally.present_count,
        })
    }
}
