//! Session token storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{format_datetime, parse_datetime, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::SessionToken;

const TOKEN_COLUMNS: &str =
    "id, subject_code, issuer_id, issued_at, expires_at, active, redemption_count";

pub struct TokenStore<'a> {
    conn: &'a Connection,
}

impl<'a> TokenStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<SessionToken> {
        Ok(SessionToken {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            subject_code: row.get(1)?,
            issuer_id: row.get(2)?,
            issued_at: parse_datetime(&row.get::<_, String>(3)?)?,
            expires_at: parse_datetime(&row.get::<_, String>(4)?)?,
            active: row.get::<_, i32>(5)? != 0,
            redemption_count: row.get(6)?,
        })
    }

    /// Create a new token
    #[instrument(skip(self, token), fields(token_id = %token.id, subject = %token.subject_code))]
    pub fn create(&self, token: &SessionToken) -> Result<()> {
        if token.expires_at <= token.issued_at {
            return Err(Error::Validation(format!(
                "token {} expires before it is issued",
                token.id
            )));
        }

        self.conn.execute(
            "INSERT INTO session_tokens (id, subject_code, issuer_id, issued_at, expires_at, active, redemption_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id.to_string(),
                token.subject_code,
                token.issuer_id,
                format_datetime(&token.issued_at),
                format_datetime(&token.expires_at),
                token.active as i32,
                token.redemption_count,
            ],
        )?;
        Ok(())
    }

    /// Find token by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<SessionToken>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM session_tokens WHERE id = ?1",
            TOKEN_COLUMNS
        ))?;

        let token = stmt
            .query_row(params![id.to_string()], Self::from_row)
            .optional()?;

        Ok(token)
    }

    /// List tokens for a subject, newest first
    pub fn list_for_subject(&self, subject_code: &str) -> Result<Vec<SessionToken>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM session_tokens WHERE subject_code = ?1 ORDER BY issued_at DESC",
            TOKEN_COLUMNS
        ))?;

        let tokens = stmt
            .query_map(params![subject_code], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tokens)
    }

    /// Increment redemption count
    pub fn increment_redemption_count(&self, token_id: Uuid) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE session_tokens SET redemption_count = redemption_count + 1 WHERE id = ?1",
            params![token_id.to_string()],
        )?;
        if updated == 0 {
            return Err(Error::InvalidToken(token_id));
        }
        Ok(())
    }
}
