use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ComplaintPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ComplaintStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ComplaintStatus {
    /// pending → inProgress → {resolved, closed}
    pub fn can_transition_to(self, next: ComplaintStatus) -> bool {
        matches!(
            (self, next),
            (ComplaintStatus::Pending, ComplaintStatus::InProgress)
                | (ComplaintStatus::InProgress, ComplaintStatus::Resolved)
                | (ComplaintStatus::InProgress, ComplaintStatus::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Closed)
    }

    pub fn label(self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::InProgress => "inProgress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }
}

impl ComplaintPriority {
    pub fn label(self) -> &'static str {
        match self {
            ComplaintPriority::Low => "low",
            ComplaintPriority::Medium => "medium",
            ComplaintPriority::High => "high",
            ComplaintPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub parent_name: String,
    #[serde(default)]
    pub parent_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub priority: ComplaintPriority,
    #[serde(default)]
    pub status: ComplaintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComplaintRequest {
    pub title: String,
    pub description: String,
    pub parent_name: String,
    #[serde(default)]
    pub parent_phone: String,
    pub student_name: Option<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub priority: ComplaintPriority,
}

fn default_kind() -> String {
    "other".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondComplaintRequest {
    pub response: String,
    #[serde(default = "default_response_status")]
    pub status: ComplaintStatus,
}

fn default_response_status() -> ComplaintStatus {
    ComplaintStatus::Resolved
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComplaintStatusRequest {
    pub status: ComplaintStatus,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintQuery {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
}

impl ComplaintQuery {
    pub fn matches(&self, c: &Complaint) -> bool {
        if self.status.is_some_and(|s| s != c.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != c.priority) {
            return false;
        }
        if let Some(kind) = self.kind.as_deref().filter(|k| !k.is_empty()) {
            if c.kind != kind {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let student = c.student_name.as_deref().unwrap_or_default();
            return [c.title.as_str(), &c.description, &c.parent_name, student]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        use ComplaintStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(InProgress.can_transition_to(Closed));

        assert!(!Pending.can_transition_to(Resolved));
        assert!(!Pending.can_transition_to(Closed));
        assert!(!Resolved.can_transition_to(InProgress));
        assert!(!Closed.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn status_serializes_in_camel_case() {
        let json = serde_json::to_value(ComplaintStatus::InProgress).unwrap();
        assert_eq!(json, "inProgress");
    }
}
