use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::complaint::{
        Complaint, ComplaintPriority, ComplaintQuery, ComplaintStatus, CreateComplaintRequest,
        RespondComplaintRequest, UpdateComplaintStatusRequest,
    },
    store::{new_id, DataSource},
};

const CSV_HEADERS: [&str; 9] = [
    "العنوان",
    "ولي الأمر",
    "الهاتف",
    "الطالب",
    "النوع",
    "الأولوية",
    "الحالة",
    "التاريخ",
    "الوصف",
];

fn type_display_name(kind: &str) -> &str {
    match kind {
        "busService" => "خدمة الباص",
        "driverBehavior" => "سلوك السائق",
        "safety" => "السلامة",
        "timing" => "التوقيت",
        "communication" => "التواصل",
        "other" => "أخرى",
        other => other,
    }
}

fn priority_display_name(priority: ComplaintPriority) -> &'static str {
    match priority {
        ComplaintPriority::Low => "منخفضة",
        ComplaintPriority::Medium => "متوسطة",
        ComplaintPriority::High => "عالية",
        ComplaintPriority::Urgent => "عاجلة",
    }
}

fn status_display_name(status: ComplaintStatus) -> &'static str {
    match status {
        ComplaintStatus::Pending => "في انتظار المراجعة",
        ComplaintStatus::InProgress => "قيد المعالجة",
        ComplaintStatus::Resolved => "تم الحل",
        ComplaintStatus::Closed => "مغلقة",
    }
}

pub struct ComplaintService;

impl ComplaintService {
    /// Active complaints matching the query, newest first.
    pub async fn list(store: &dyn DataSource, query: &ComplaintQuery) -> AppResult<Vec<Complaint>> {
        let complaints = store.list_complaints(true).await?;
        Ok(complaints.into_iter().filter(|c| query.matches(c)).collect())
    }

    pub async fn create(store: &dyn DataSource, req: CreateComplaintRequest) -> AppResult<Complaint> {
        if req.title.trim().is_empty() || req.description.trim().is_empty() {
            return Err(AppError::Validation("Missing required fields: title, description".into()));
        }
        let now = Utc::now();
        let complaint = Complaint {
            id: new_id(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            parent_name: req.parent_name,
            parent_phone: req.parent_phone,
            student_name: req.student_name,
            kind: req.kind,
            priority: req.priority,
            status: ComplaintStatus::Pending,
            admin_response: None,
            response_date: None,
            status_note: None,
            assigned_to: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_complaint(&complaint).await?;
        info!("Complaint {} filed", complaint.id);
        Ok(complaint)
    }

    /// pending → inProgress
    pub async fn start(store: &dyn DataSource, id: &str) -> AppResult<Complaint> {
        let mut complaint = Self::get(store, id).await?;
        Self::transition(&mut complaint, ComplaintStatus::InProgress)?;
        Self::save(store, complaint).await
    }

    /// Attaches the admin response while moving an in-progress complaint to
    /// resolved or closed.
    pub async fn respond(
        store: &dyn DataSource,
        id: &str,
        req: RespondComplaintRequest,
        actor: &str,
    ) -> AppResult<Complaint> {
        let response = req.response.trim();
        if response.is_empty() {
            return Err(AppError::Validation("Missing required field: response".into()));
        }
        if !req.status.is_terminal() {
            return Err(AppError::Validation("A response must resolve or close the complaint".into()));
        }
        let mut complaint = Self::get(store, id).await?;
        Self::transition(&mut complaint, req.status)?;
        complaint.admin_response = Some(response.to_string());
        complaint.response_date = Some(complaint.updated_at);
        complaint.assigned_to = Some(actor.to_string());
        Self::save(store, complaint).await
    }

    pub async fn update_status(
        store: &dyn DataSource,
        id: &str,
        req: UpdateComplaintStatusRequest,
    ) -> AppResult<Complaint> {
        let mut complaint = Self::get(store, id).await?;
        Self::transition(&mut complaint, req.status)?;
        if let Some(note) = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            complaint.status_note = Some(note.to_string());
        }
        Self::save(store, complaint).await
    }

    async fn get(store: &dyn DataSource, id: &str) -> AppResult<Complaint> {
        store
            .get_complaint(id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| AppError::not_found("complaint", id))
    }

    fn transition(complaint: &mut Complaint, next: ComplaintStatus) -> AppResult<()> {
        if !complaint.status.can_transition_to(next) {
            return Err(AppError::FailedPrecondition(format!(
                "complaint {} cannot move from {} to {}",
                complaint.id,
                complaint.status.label(),
                next.label()
            )));
        }
        complaint.status = next;
        complaint.updated_at = Utc::now();
        Ok(())
    }

    async fn save(store: &dyn DataSource, complaint: Complaint) -> AppResult<Complaint> {
        if !store.update_complaint(&complaint).await? {
            return Err(AppError::not_found("complaint", &complaint.id));
        }
        info!("Complaint {} is now {}", complaint.id, complaint.status.label());
        Ok(complaint)
    }

    /// CSV with a header row; every field quoted.
    pub fn export_csv(complaints: &[Complaint]) -> anyhow::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(Vec::new());
        writer.write_record(CSV_HEADERS)?;
        for c in complaints {
            writer.write_record([
                c.title.as_str(),
                c.parent_name.as_str(),
                c.parent_phone.as_str(),
                c.student_name.as_deref().unwrap_or_default(),
                type_display_name(&c.kind),
                priority_display_name(c.priority),
                status_display_name(c.status),
                format_date(c.created_at).as_str(),
                c.description.as_str(),
            ])?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e.error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixtureStore;

    fn respond(status: ComplaintStatus) -> RespondComplaintRequest {
        RespondComplaintRequest {
            response: "تم التواصل مع السائق".into(),
            status,
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let store = FixtureStore::seeded().await;
        let started = ComplaintService::start(&store, "complaint_1").await.unwrap();
        assert_eq!(started.status, ComplaintStatus::InProgress);

        let done = ComplaintService::respond(&store, "complaint_1", respond(ComplaintStatus::Resolved), "admin-1")
            .await
            .unwrap();
        assert_eq!(done.status, ComplaintStatus::Resolved);
        assert_eq!(done.assigned_to.as_deref(), Some("admin-1"));
        assert!(done.response_date.is_some());
    }

    #[tokio::test]
    async fn response_requires_in_progress() {
        let store = FixtureStore::seeded().await;
        let err = ComplaintService::respond(&store, "complaint_1", respond(ComplaintStatus::Resolved), "admin-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "failed-precondition");

        let stored = store.get_complaint("complaint_1").await.unwrap().unwrap();
        assert!(stored.admin_response.is_none());
    }

    #[tokio::test]
    async fn terminal_complaints_do_not_reopen() {
        let store = FixtureStore::seeded().await;
        let req = UpdateComplaintStatusRequest {
            status: ComplaintStatus::InProgress,
            note: None,
        };
        let err = ComplaintService::update_status(&store, "complaint_3", req).await.unwrap_err();
        assert_eq!(err.kind(), "failed-precondition");
    }

    #[tokio::test]
    async fn status_note_is_recorded() {
        let store = FixtureStore::seeded().await;
        let req = UpdateComplaintStatusRequest {
            status: ComplaintStatus::Closed,
            note: Some(" duplicate ".into()),
        };
        let closed = ComplaintService::update_status(&store, "complaint_2", req).await.unwrap();
        assert_eq!(closed.status_note.as_deref(), Some("duplicate"));
        assert!(closed.admin_response.is_none());
    }

    #[tokio::test]
    async fn export_quotes_every_field() {
        let store = FixtureStore::seeded().await;
        let complaints = ComplaintService::list(&store, &ComplaintQuery::default()).await.unwrap();
        let csv = ComplaintService::export_csv(&complaints).unwrap();

        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("\"العنوان\","));
        assert_eq!(lines.count(), 3);
        assert!(csv.contains("\"سلوك السائق\""));
    }
}
