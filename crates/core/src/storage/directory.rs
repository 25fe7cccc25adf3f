//! Directory storage operations
//!
//! Read side of subjects, rosters and teaching assignments, plus the upserts
//! used by roster provisioning.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::OptionalExt;
use crate::error::{Error, Result};
use crate::models::{validate_subject_code, Instructor, Student, Subject};

pub struct DirectoryStore<'a> {
    conn: &'a Connection,
}

impl<'a> DirectoryStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
        Ok(Subject {
            code: row.get(0)?,
            name: row.get(1)?,
            department: row.get(2)?,
            year: row.get(3)?,
            credits: row.get(4)?,
        })
    }

    fn collect_strings(&self, sql: &str, key: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(values)
    }

    /// Find subject by code
    pub fn find_subject(&self, code: &str) -> Result<Option<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, department, year, credits FROM subjects WHERE code = ?1",
        )?;

        let subject = stmt
            .query_row(params![code], Self::subject_from_row)
            .optional()?;

        Ok(subject)
    }

    /// List subjects ordered by code, optionally narrowed to a department
    /// and/or year
    pub fn list_subjects(&self, department: Option<&str>, year: Option<u8>) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, department, year, credits FROM subjects
             WHERE (?1 IS NULL OR department = ?1) AND (?2 IS NULL OR year = ?2)
             ORDER BY code",
        )?;

        let subjects = stmt
            .query_map(params![department, year], Self::subject_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(subjects)
    }

    /// Find student by ID, with their enrolled subject codes
    pub fn find_student(&self, id: &str) -> Result<Option<Student>> {
        let student = self
            .conn
            .query_row(
                "SELECT id, name, department, year FROM students WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Student {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        department: row.get(2)?,
                        year: row.get(3)?,
                        subjects: Vec::new(),
                    })
                },
            )
            .optional()?;

        match student {
            Some(mut student) => {
                student.subjects = self.subjects_enrolled_by(id)?.into_iter().collect();
                Ok(Some(student))
            }
            None => Ok(None),
        }
    }

    /// Student IDs enrolled in a subject
    pub fn roster_of(&self, subject_code: &str) -> Result<BTreeSet<String>> {
        self.collect_strings(
            "SELECT student_id FROM enrollments WHERE subject_code = ?1",
            subject_code,
        )
    }

    /// Subject codes a student is enrolled in
    pub fn subjects_enrolled_by(&self, student_id: &str) -> Result<BTreeSet<String>> {
        self.collect_strings(
            "SELECT subject_code FROM enrollments WHERE student_id = ?1",
            student_id,
        )
    }

    /// Subject codes an instructor may issue tokens for
    pub fn subjects_taught_by(&self, instructor_id: &str) -> Result<BTreeSet<String>> {
        self.collect_strings(
            "SELECT subject_code FROM teaching_assignments WHERE instructor_id = ?1",
            instructor_id,
        )
    }

    pub fn is_enrolled(&self, student_id: &str, subject_code: &str) -> Result<bool> {
        let found: Option<i32> = self
            .conn
            .query_row(
                "SELECT 1 FROM enrollments WHERE student_id = ?1 AND subject_code = ?2",
                params![student_id, subject_code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn teaches(&self, instructor_id: &str, subject_code: &str) -> Result<bool> {
        let found: Option<i32> = self
            .conn
            .query_row(
                "SELECT 1 FROM teaching_assignments WHERE instructor_id = ?1 AND subject_code = ?2",
                params![instructor_id, subject_code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert or update a subject
    #[instrument(skip(self, subject), fields(code = %subject.code))]
    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        validate_subject_code(&subject.code).map_err(Error::Validation)?;
        if subject.name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "subject {} has an empty name",
                subject.code
            )));
        }

        self.conn.execute(
            "INSERT INTO subjects (code, name, department, year, credits)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                department = excluded.department,
                year = excluded.year,
                credits = excluded.credits",
            params![
                subject.code,
                subject.name,
                subject.department,
                subject.year,
                subject.credits,
            ],
        )?;
        Ok(())
    }

    /// Insert or update a student and replace their enrollments
    #[instrument(skip(self, student), fields(id = %student.id))]
    pub fn upsert_student(&self, student: &Student) -> Result<()> {
        validate_person_id(&student.id)?;
        self.require_subjects(&student.subjects)?;

        self.conn.execute(
            "INSERT INTO students (id, name, department, year)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                department = excluded.department,
                year = excluded.year",
            params![student.id, student.name, student.department, student.year],
        )?;

        self.conn.execute(
            "DELETE FROM enrollments WHERE student_id = ?1",
            params![student.id],
        )?;
        for code in &student.subjects {
            self.conn.execute(
                "INSERT OR IGNORE INTO enrollments (student_id, subject_code) VALUES (?1, ?2)",
                params![student.id, code],
            )?;
        }
        Ok(())
    }

    /// Insert or update an instructor and replace their teaching assignments
    #[instrument(skip(self, instructor), fields(id = %instructor.id))]
    pub fn upsert_instructor(&self, instructor: &Instructor) -> Result<()> {
        validate_person_id(&instructor.id)?;
        self.require_subjects(&instructor.subjects)?;

        self.conn.execute(
            "INSERT INTO instructors (id, name, department)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                department = excluded.department",
            params![instructor.id, instructor.name, instructor.department],
        )?;

        self.conn.execute(
            "DELETE FROM teaching_assignments WHERE instructor_id = ?1",
            params![instructor.id],
        )?;
        for code in &instructor.subjects {
            self.conn.execute(
                "INSERT OR IGNORE INTO teaching_assignments (instructor_id, subject_code) VALUES (?1, ?2)",
                params![instructor.id, code],
            )?;
        }
        Ok(())
    }

    fn require_subjects(&self, codes: &[String]) -> Result<()> {
        for code in codes {
            if self.find_subject(code)?.is_none() {
                return Err(Error::Validation(format!("unknown subject '{}'", code)));
            }
        }
        Ok(())
    }
}

fn validate_person_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Validation("empty id".to_string()));
    }
    Ok(())
}
