//! Caller identity and role gating
//!
//! Authentication happens outside the core; request handlers pass in the
//! verified (user id, role) pair and the core only checks capabilities.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role carried by an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(Error::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Verified identity handed in by authentication middleware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn student(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn teacher(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Teacher)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Fail with `Unauthorized` unless the caller's role allows `action`
    pub fn require(&self, action: Action) -> Result<()> {
        if AccessPolicy::can_perform(self.role, action) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "{} {} may not {}",
                self.role,
                self.user_id,
                action.describe()
            )))
        }
    }
}

/// Operations exposed by the attendance core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    IssueToken,
    RedeemToken,
    ViewSubjectStatus,
    ViewOwnHistory,
    ViewAnyHistory,
    ViewSubjects,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::IssueToken => "issue session tokens",
            Action::RedeemToken => "redeem session tokens",
            Action::ViewSubjectStatus => "view subject attendance",
            Action::ViewOwnHistory => "view their attendance history",
            Action::ViewAnyHistory => "view other students' history",
            Action::ViewSubjects => "view the subject catalog",
        }
    }
}

/// Permission matrix for caller roles
pub struct AccessPolicy;

impl AccessPolicy {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: Role, action: Action) -> bool {
        match action {
            // Only instructors run sessions
            Action::IssueToken => role == Role::Teacher,

            // Only students check in
            Action::RedeemToken => role == Role::Student,

            // Teachers for their own subjects, admins for all
            Action::ViewSubjectStatus => matches!(role, Role::Teacher | Role::Admin),

            Action::ViewOwnHistory => role == Role::Student,
            Action::ViewAnyHistory => role == Role::Admin,

            // Any signed-in caller
            Action::ViewSubjects => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teacher_permissions() {
        assert!(AccessPolicy::can_perform(Role::Teacher, Action::IssueToken));
        assert!(AccessPolicy::can_perform(Role::Teacher, Action::ViewSubjectStatus));
        assert!(!AccessPolicy::can_perform(Role::Teacher, Action::RedeemToken));
        assert!(!AccessPolicy::can_perform(Role::Teacher, Action::ViewAnyHistory));
    }

    #[test]
    fn test_student_permissions() {
        assert!(AccessPolicy::can_perform(Role::Student, Action::RedeemToken));
        assert!(AccessPolicy::can_perform(Role::Student, Action::ViewOwnHistory));
        assert!(!AccessPolicy::can_perform(Role::Student, Action::IssueToken));
        assert!(!AccessPolicy::can_perform(Role::Student, Action::ViewSubjectStatus));
    }

    #[test]
    fn test_admin_cannot_issue_or_redeem() {
        assert!(!AccessPolicy::can_perform(Role::Admin, Action::IssueToken));
        assert!(!AccessPolicy::can_perform(Role::Admin, Action::RedeemToken));
        assert!(AccessPolicy::can_perform(Role::Admin, Action::ViewAnyHistory));
    }

    #[test]
    fn test_everyone_views_subjects() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert!(AccessPolicy::can_perform(role, Action::ViewSubjects));
        }
    }

    #[test]
    fn test_require_reports_unauthorized() {
        let caller = Caller::student("CS2001");
        assert!(caller.require(Action::RedeemToken).is_ok());
        assert!(matches!(
            caller.require(Action::IssueToken),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("dean".parse::<Role>().is_err());
    }
}
