//! Directory entities: subjects, students and instructors
//!
//! These are owned by the external directory and consumed read-only by the
//! token protocol. They only enter the store through roster provisioning.

use serde::{Deserialize, Serialize};

/// A subject taught as one or more class sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub year: Option<u8>,
    #[serde(default)]
    pub credits: Option<u8>,
}

/// An enrolled student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Stable student identifier (e.g. PRN)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub year: Option<u8>,
    /// Codes of subjects the student is enrolled in
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// An instructor and the subjects they are authorized to teach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}
