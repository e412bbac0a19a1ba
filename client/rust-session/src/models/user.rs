use serde::{Deserialize, Serialize};

/// Roles the dashboard renders distinct views for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Principal,
    Teacher,
    Student,
    Parent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Principal => "principal",
            UserRole::Teacher => "teacher",
            UserRole::Student => "student",
            UserRole::Parent => "parent",
        }
    }

    /// Navigation and labels for this role's dashboard.
    pub fn config(&self) -> &'static RoleConfig {
        match self {
            UserRole::Principal => &PRINCIPAL_CONFIG,
            UserRole::Teacher => &TEACHER_CONFIG,
            UserRole::Student => &STUDENT_CONFIG,
            UserRole::Parent => &PARENT_CONFIG,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

/// Everything role-specific the page chrome needs, in one record per role.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RoleConfig {
    pub role: UserRole,
    pub label: &'static str,
    pub home_path: &'static str,
    pub nav_items: &'static [NavItem],
    pub can_bulk_import: bool,
}

static PRINCIPAL_CONFIG: RoleConfig = RoleConfig {
    role: UserRole::Principal,
    label: "Principal",
    home_path: "/dashboard/principal",
    nav_items: &[
        NavItem { label: "Overview", path: "/dashboard/principal" },
        NavItem { label: "Teachers", path: "/dashboard/principal/teachers" },
        NavItem { label: "Students", path: "/dashboard/principal/students" },
        NavItem { label: "Analytics", path: "/dashboard/principal/analytics" },
    ],
    can_bulk_import: true,
};

static TEACHER_CONFIG: RoleConfig = RoleConfig {
    role: UserRole::Teacher,
    label: "Teacher",
    home_path: "/dashboard/teacher",
    nav_items: &[
        NavItem { label: "Dashboard", path: "/dashboard/teacher" },
        NavItem { label: "Students", path: "/dashboard/teacher/students" },
        NavItem { label: "Assessments", path: "/dashboard/teacher/assessments" },
        NavItem { label: "Learning Paths", path: "/dashboard/teacher/learning-paths" },
        NavItem { label: "Documents", path: "/dashboard/teacher/documents" },
    ],
    can_bulk_import: true,
};

static STUDENT_CONFIG: RoleConfig = RoleConfig {
    role: UserRole::Student,
    label: "Student",
    home_path: "/dashboard/student",
    nav_items: &[
        NavItem { label: "Dashboard", path: "/dashboard/student" },
        NavItem { label: "My Learning Path", path: "/dashboard/student/learning-path" },
        NavItem { label: "Assessments", path: "/dashboard/student/assessments" },
        NavItem { label: "Lessons", path: "/dashboard/student/lessons" },
    ],
    can_bulk_import: false,
};

static PARENT_CONFIG: RoleConfig = RoleConfig {
    role: UserRole::Parent,
    label: "Parent",
    home_path: "/dashboard/parent",
    nav_items: &[
        NavItem { label: "Overview", path: "/dashboard/parent" },
        NavItem { label: "Progress", path: "/dashboard/parent/progress" },
    ],
    can_bulk_import: false,
};

/// Profile returned by the backend's auth profile endpoint.
///
/// Older backend builds emit camelCase keys, newer ones snake_case; both are
/// accepted. The whole record is replaced on every protected page load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub role: UserRole,
    #[serde(alias = "firstName", default)]
    pub first_name: String,
    #[serde(alias = "lastName", default)]
    pub last_name: String,
    pub email: String,
    #[serde(alias = "schoolId", alias = "school_id", default)]
    pub school_ref: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}
