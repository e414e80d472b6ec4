use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CurrentStatus {
    #[default]
    Home,
    OnBus,
    AtSchool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 3] =
        [ApprovalStatus::Pending, ApprovalStatus::Approved, ApprovalStatus::Rejected];

    pub fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Empty when the student is not linked to a parent account.
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub parent_phone: String,
    #[serde(default)]
    pub school_name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub bus_route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<String>,
    #[serde(default)]
    pub current_status: CurrentStatus,
    pub qr_code: String,
    pub is_active: bool,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn parent(&self) -> Option<&str> {
        non_empty(&self.parent_id)
    }
}

pub(crate) fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub parent_phone: String,
    #[serde(default, alias = "school")]
    pub school_name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub bus_route: String,
    pub qr_code: Option<String>,
    pub current_status: Option<CurrentStatus>,
    pub is_active: Option<bool>,
}

/// Partial update; `parentId: ""` unlinks the student.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub school_name: Option<String>,
    pub grade: Option<String>,
    pub bus_route: Option<String>,
    pub bus_id: Option<String>,
    pub current_status: Option<CurrentStatus>,
    pub qr_code: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    pub search: Option<String>,
    pub grade: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub route: Option<String>,
    pub parent_id: Option<String>,
}

impl StudentQuery {
    pub fn matches(&self, s: &Student) -> bool {
        if let Some(term) = self.search.as_deref().and_then(non_empty) {
            let term = term.to_lowercase();
            let hit = [&s.name, &s.parent_name, &s.parent_phone, &s.qr_code, &s.school_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if let Some(grade) = self.grade.as_deref().and_then(non_empty) {
            if s.grade != grade {
                return false;
            }
        }
        if let Some(status) = self.approval_status {
            if s.approval_status != status {
                return false;
            }
        }
        if let Some(route) = self.route.as_deref().and_then(non_empty) {
            if s.bus_route != route {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveStudentRequest {
    pub bus_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}
