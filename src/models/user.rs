use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::student::Student;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum UserType {
    Admin,
    Supervisor,
    Parent,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserType::Admin => "admin",
            UserType::Supervisor => "supervisor",
            UserType::Parent => "parent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserType::Admin),
            "supervisor" => Ok(UserType::Supervisor),
            "parent" => Ok(UserType::Parent),
            _ => Err(anyhow::anyhow!("Unknown user type: {s}")),
        }
    }
}

/// Snapshot of a student embedded in the parent's record for list rendering.
/// The `students` collection stays authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildRef {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub school_name: String,
    pub bus_route: String,
    pub qr_code: String,
    pub added_at: DateTime<Utc>,
}

impl ChildRef {
    pub fn from_student(student: &Student, added_at: DateTime<Utc>) -> Self {
        Self {
            id: student.id.clone(),
            name: student.name.clone(),
            grade: student.grade.clone(),
            school_name: student.school_name.clone(),
            bus_route: student.bus_route.clone(),
            qr_code: student.qr_code.clone(),
            added_at,
        }
    }

    /// True when every denormalized field agrees with the student record.
    pub fn mirrors(&self, student: &Student) -> bool {
        self.id == student.id
            && self.name == student.name
            && self.grade == student.grade
            && self.school_name == student.school_name
            && self.bus_route == student.bus_route
            && self.qr_code == student.qr_code
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub user_type: UserType,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn child(&self, student_id: &str) -> Option<&ChildRef> {
        self.children.iter().find(|c| c.id == student_id)
    }
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub password: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPushTokenRequest {
    pub token: String,
}
