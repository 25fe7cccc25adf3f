//! Roster document schema and loader
//!
//! A roster is the TOML file an administrator hands to `provision` to
//! populate the directory: subjects, instructors and students with their
//! enrollments. Loading it is idempotent.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Instructor, Student, Subject};

/// Directory contents loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default, rename = "subject")]
    pub subjects: Vec<Subject>,
    #[serde(default, rename = "instructor")]
    pub instructors: Vec<Instructor>,
    #[serde(default, rename = "student")]
    pub students: Vec<Student>,
}

/// Counts of entries applied by a provisioning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionSummary {
    pub subjects: usize,
    pub instructors: usize,
    pub students: usize,
    pub enrollments: usize,
}

impl Roster {
    /// Load a roster from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a roster from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let roster: Roster = toml::from_str(content)?;
        roster.validate()?;
        Ok(roster)
    }

    /// Check internal consistency before anything touches the store
    pub fn validate(&self) -> Result<()> {
        let mut codes = BTreeSet::new();
        for subject in &self.subjects {
            if !codes.insert(subject.code.as_str()) {
                return Err(Error::Validation(format!(
                    "subject '{}' listed twice",
                    subject.code
                )));
            }
        }

        let mut ids = BTreeSet::new();
        for student in &self.students {
            if !ids.insert(student.id.as_str()) {
                return Err(Error::Validation(format!(
                    "student '{}' listed twice",
                    student.id
                )));
            }
        }

        ids.clear();
        for instructor in &self.instructors {
            if !ids.insert(instructor.id.as_str()) {
                return Err(Error::Validation(format!(
                    "instructor '{}' listed twice",
                    instructor.id
                )));
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> ProvisionSummary {
        ProvisionSummary {
            subjects: self.subjects.len(),
            instructors: self.instructors.len(),
            students: self.students.len(),
            enrollments: self.students.iter().map(|s| s.subjects.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
[[subject]]
code = "CS101"
name = "Data Structures"
department = "CS"
year = 2
credits = 4

[[subject]]
code = "IT101"
name = "Web Development"

[[instructor]]
id = "teacher-1"
name = "Professor Wilson"
subjects = ["CS101"]

[[student]]
id = "CS2001"
name = "John Smith"
department = "CS"
year = 2
subjects = ["CS101"]

[[student]]
id = "IT2001"
name = "Michael Lee"
subjects = ["IT101", "CS101"]
"#;

    #[test]
    fn test_parse_roster() {
        let roster = Roster::from_toml(ROSTER).unwrap();

        assert_eq!(roster.subjects.len(), 2);
        assert_eq!(roster.subjects[1].department, None);
        assert_eq!(roster.instructors[0].subjects, vec!["CS101"]);
        assert_eq!(
            roster.summary(),
            ProvisionSummary {
                subjects: 2,
                instructors: 1,
                students: 2,
                enrollments: 3,
            }
        );
    }

    #[test]
    fn test_empty_roster() {
        let roster = Roster::from_toml("").unwrap();
        assert!(roster.subjects.is_empty());
        assert!(roster.students.is_empty());
    }

    #[test]
    fn test_duplicate_subject_rejected() {
        let toml = r#"
[[subject]]
code = "CS101"
name = "Data Structures"

[[subject]]
code = "CS101"
name = "Again"
"#;
        assert!(matches!(
            Roster::from_toml(toml),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Roster::from_toml("[[subject]]\ncode = 5"),
            Err(Error::Config(_))
        ));
    }
}
