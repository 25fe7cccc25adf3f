//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Directory schema",
        sql: r#"
            -- Subjects catalog
            CREATE TABLE IF NOT EXISTS subjects (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                department TEXT,
                year INTEGER,
                credits INTEGER
            );

            -- Students
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                department TEXT,
                year INTEGER
            );

            -- Instructors
            CREATE TABLE IF NOT EXISTS instructors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                department TEXT
            );

            -- Enrollment facts (student in subject roster)
            CREATE TABLE IF NOT EXISTS enrollments (
                student_id TEXT NOT NULL,
                subject_code TEXT NOT NULL,
                PRIMARY KEY (student_id, subject_code),
                FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_code) REFERENCES subjects(code) ON DELETE CASCADE
            );

            -- Which instructor may issue tokens for which subject
            CREATE TABLE IF NOT EXISTS teaching_assignments (
                instructor_id TEXT NOT NULL,
                subject_code TEXT NOT NULL,
                PRIMARY KEY (instructor_id, subject_code),
                FOREIGN KEY (instructor_id) REFERENCES instructors(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_code) REFERENCES subjects(code) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Attendance ledger schema",
        sql: r#"
            -- Issued session tokens (never deleted)
            CREATE TABLE IF NOT EXISTS session_tokens (
                id TEXT PRIMARY KEY,
                subject_code TEXT NOT NULL,
                issuer_id TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                redemption_count INTEGER NOT NULL DEFAULT 0,
                CHECK (expires_at > issued_at)
            );

            -- Redemptions; at most one per student per subject per day
            CREATE TABLE IF NOT EXISTS attendance_records (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                subject_code TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'present',
                token_id TEXT NOT NULL,
                issuer_id TEXT NOT NULL,
                FOREIGN KEY (token_id) REFERENCES session_tokens(id),
                UNIQUE(student_id, subject_code, date)
            );
        "#,
    },
    Migration {
        version: 3,
        description: "Add indexes for query performance",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_enrollments_subject ON enrollments(subject_code);
            CREATE INDEX IF NOT EXISTS idx_tokens_subject ON session_tokens(subject_code);
            CREATE INDEX IF NOT EXISTS idx_records_subject_date
                ON attendance_records(subject_code, date);
            CREATE INDEX IF NOT EXISTS idx_records_student_date
                ON attendance_records(student_id, date);
        "#,
    },
];

/// Initialize the migrations table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
pub(crate) fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(migration.sql)?;
            record_migration(&tx, migration)?;
            tx.commit()?;

            info!(version = migration.version, "Migration complete");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Get the latest migration version (test helper)
    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run twice
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration {} should have version {}",
                migration.description,
                i + 1
            );
        }
    }
}
