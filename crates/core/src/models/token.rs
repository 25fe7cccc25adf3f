//! Session token model and its wire code

use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Field delimiter of the external token representation
pub const CODE_DELIMITER: char = ':';

/// A short-lived credential bound to one class session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub id: Uuid,
    pub subject_code: String,
    pub issuer_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// False only for historical tokens imported as inactive
    pub active: bool,
    pub redemption_count: u32,
}

impl SessionToken {
    /// Create a token issued at `now` (truncated to whole seconds) and valid
    /// for `window`.
    pub fn new(subject_code: &str, issuer_id: &str, now: DateTime<Utc>, window: Duration) -> Self {
        let issued_at = now.trunc_subsecs(0);
        Self {
            id: Uuid::new_v4(),
            subject_code: subject_code.to_string(),
            issuer_id: issuer_id.to_string(),
            issued_at,
            expires_at: issued_at + window,
            active: true,
            redemption_count: 0,
        }
    }

    /// Mark as a historical token that can no longer be redeemed
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds between issuance and expiry
    pub fn valid_for_seconds(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }

    /// External representation handed to the instructor's display
    pub fn code(&self) -> Result<TokenCode> {
        TokenCode::new(&self.subject_code, self.id, self.expires_at.timestamp())
    }
}

/// Parsed external token: `<subject_code>:<token_id>:<expires_at_epoch_secs>`
///
/// Carries enough to reject an expired token without touching the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenCode {
    pub subject_code: String,
    pub token_id: Uuid,
    pub expires_at_epoch: i64,
}

impl TokenCode {
    pub fn new(subject_code: &str, token_id: Uuid, expires_at_epoch: i64) -> Result<Self> {
        validate_subject_code(subject_code).map_err(Error::InvalidFormat)?;
        Ok(Self {
            subject_code: subject_code.to_string(),
            token_id,
            expires_at_epoch,
        })
    }

    /// Embedded expiry as a timestamp
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at_epoch, 0).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "expiry {} is out of range",
                self.expires_at_epoch
            ))
        })
    }

    /// Format as the wire string
    pub fn to_code(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.subject_code,
            self.token_id,
            self.expires_at_epoch,
            d = CODE_DELIMITER
        )
    }

    /// Parse from the wire string
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(CODE_DELIMITER).collect();
        if parts.len() != 3 {
            return Err(Error::InvalidFormat(format!(
                "expected 3 fields, found {}",
                parts.len()
            )));
        }

        let token_id = Uuid::from_str(parts[1])
            .map_err(|_| Error::InvalidFormat(format!("bad token id '{}'", parts[1])))?;

        let expires_at_epoch = parts[2]
            .parse::<i64>()
            .map_err(|_| Error::InvalidFormat(format!("bad expiry '{}'", parts[2])))?;

        let code = Self::new(parts[0], token_id, expires_at_epoch)?;
        code.expires_at()?;
        Ok(code)
    }
}

impl std::fmt::Display for TokenCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

impl FromStr for TokenCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Subject codes travel inside the token code, so they may not be empty or
/// contain the delimiter.
pub fn validate_subject_code(code: &str) -> std::result::Result<(), String> {
    if code.trim().is_empty() {
        return Err("empty subject code".to_string());
    }
    if code.contains(CODE_DELIMITER) {
        return Err(format!("subject code '{}' contains '{}'", code, CODE_DELIMITER));
    }
    if code != code.trim() {
        return Err(format!("subject code '{}' has surrounding whitespace", code));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_token_window() {
        let now = t0() + Duration::milliseconds(750);
        let token = SessionToken::new("CS101", "teacher-1", now, Duration::seconds(15));

        assert_eq!(token.issued_at, t0());
        assert_eq!(token.expires_at, t0() + Duration::seconds(15));
        assert!(token.expires_at > token.issued_at);
        assert_eq!(token.valid_for_seconds(), 15);
        assert!(token.active);
        assert!(!token.is_expired_at(token.expires_at));
        assert!(token.is_expired_at(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_code_format() {
        let token = SessionToken::new("CS101", "teacher-1", t0(), Duration::seconds(15));
        let code = token.code().unwrap().to_code();

        assert_eq!(
            code,
            format!("CS101:{}:{}", token.id, t0().timestamp() + 15)
        );
    }

    #[test]
    fn test_parse_known_code() {
        let code = TokenCode::parse("CS101:550e8400-e29b-41d4-a716-446655440000:1718000000")
            .unwrap();

        assert_eq!(code.subject_code, "CS101");
        assert_eq!(
            code.token_id,
            Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap()
        );
        assert_eq!(code.expires_at_epoch, 1_718_000_000);
    }

    #[test]
    fn test_parse_invalid() {
        let id = Uuid::new_v4();

        // Wrong field count
        assert!(matches!(TokenCode::parse("CS101"), Err(Error::InvalidFormat(_))));
        assert!(matches!(
            TokenCode::parse(&format!("CS101:{}:1:extra", id)),
            Err(Error::InvalidFormat(_))
        ));

        // Bad token id
        assert!(matches!(
            TokenCode::parse("CS101:not-a-uuid:1718000000"),
            Err(Error::InvalidFormat(_))
        ));

        // Bad expiry
        assert!(matches!(
            TokenCode::parse(&format!("CS101:{}:soon", id)),
            Err(Error::InvalidFormat(_))
        ));

        // Empty subject
        assert!(matches!(
            TokenCode::parse(&format!(":{}:1718000000", id)),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_subject_code_with_delimiter_rejected() {
        assert!(validate_subject_code("CS:101").is_err());
        assert!(TokenCode::new("CS:101", Uuid::new_v4(), 0).is_err());
    }

    proptest! {
        #[test]
        fn test_code_roundtrip(
            subject in "[A-Z]{2,4}[0-9]{3}",
            offset in 1i64..86_400,
            window in 1i64..600
        ) {
            let now = t0() + Duration::seconds(offset);
            let token = SessionToken::new(&subject, "teacher-1", now, Duration::seconds(window));
            let parsed = TokenCode::parse(&token.code().unwrap().to_code()).unwrap();

            prop_assert_eq!(&parsed.subject_code, &token.subject_code);
            prop_assert_eq!(parsed.token_id, token.id);
            prop_assert_eq!(parsed.expires_at().unwrap(), token.expires_at);
        }
    }
}
