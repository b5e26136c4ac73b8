use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WILDCARD_PERMISSION: &str = "*";

/// Capability strings carried by roles.
pub mod permissions {
    pub const MANAGE_USERS: &str = "manage_users";
    pub const MANAGE_COURSES: &str = "manage_courses";
    pub const MANAGE_EXAMS: &str = "manage_exams";
    pub const MANAGE_QUESTIONS: &str = "manage_questions";
    pub const VIEW_REPORTS: &str = "view_reports";
    pub const MANAGE_PAYMENTS: &str = "manage_payments";
    pub const CREATE_COURSE: &str = "create_course";
    pub const EDIT_COURSE: &str = "edit_course";
    pub const CREATE_EXAM: &str = "create_exam";
    pub const EDIT_EXAM: &str = "edit_exam";
    pub const CREATE_QUESTION: &str = "create_question";
    pub const EDIT_QUESTION: &str = "edit_question";
    pub const VIEW_RESULTS: &str = "view_results";
    pub const TAKE_EXAM: &str = "take_exam";
    pub const VIEW_COURSE: &str = "view_course";
    pub const VIEW_PROFILE: &str = "view_profile";
    pub const EDIT_PROFILE: &str = "edit_profile";
}

pub const DEFAULT_USER_ROLE: &str = "user";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub is_system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Role names are stored trimmed and lowercased; lookups go through the same normalization.
pub fn normalize_role_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Role {
    pub fn new(
        name: &str,
        display_name: &str,
        description: Option<&str>,
        permissions: &[&str],
        is_system: bool,
    ) -> Self {
        Role {
            id: Uuid::new_v4().to_string(),
            name: normalize_role_name(name),
            display_name: display_name.to_string(),
            description: description.map(str::to_string),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            is_system,
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }

    pub fn has_permission(&self, capability: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == WILDCARD_PERMISSION || p == capability)
    }
}

/// The fixed role set recreated by seeding.
pub fn system_roles() -> Vec<Role> {
    use permissions::*;

    vec![
        Role::new(
            "superadmin",
            "Super Admin",
            Some("Full system access"),
            &[WILDCARD_PERMISSION],
            true,
        ),
        Role::new(
            "admin",
            "Administrator",
            Some("System administrator with limited access"),
            &[
                MANAGE_USERS,
                MANAGE_COURSES,
                MANAGE_EXAMS,
                MANAGE_QUESTIONS,
                VIEW_REPORTS,
                MANAGE_PAYMENTS,
            ],
            true,
        ),
        Role::new(
            "instructor",
            "Instructor",
            Some("Can create and manage courses and exams"),
            &[
                CREATE_COURSE,
                EDIT_COURSE,
                CREATE_EXAM,
                EDIT_EXAM,
                CREATE_QUESTION,
                EDIT_QUESTION,
                VIEW_RESULTS,
            ],
            true,
        ),
        Role::new(
            DEFAULT_USER_ROLE,
            "Student",
            Some("Regular user account"),
            &[TAKE_EXAM, VIEW_COURSE, VIEW_PROFILE, EDIT_PROFILE],
            true,
        ),
    ]
}
