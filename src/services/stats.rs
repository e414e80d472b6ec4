use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{
        complaint::{ComplaintPriority, ComplaintStatus},
        student::{ApprovalStatus, CurrentStatus},
        user::UserType,
    },
    store::DataSource,
};

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotals {
    pub total: usize,
    pub at_home: usize,
    pub on_bus: usize,
    pub at_school: usize,
    pub pending_approval: usize,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintTotals {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub closed: usize,
    pub urgent: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub students: StudentTotals,
    pub supervisors: usize,
    pub parents: usize,
    pub buses: usize,
    pub trips_today: i64,
    pub complaints: ComplaintTotals,
}

pub struct StatsService;

impl StatsService {
    pub async fn dashboard(store: &dyn DataSource) -> AppResult<DashboardStats> {
        Self::dashboard_at(store, Utc::now()).await
    }

    /// "Today" starts at midnight UTC of `now`.
    pub async fn dashboard_at(store: &dyn DataSource, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let mut students = StudentTotals::default();
        for s in store.list_students(None, true).await? {
            students.total += 1;
            match s.current_status {
                CurrentStatus::Home => students.at_home += 1,
                CurrentStatus::OnBus => students.on_bus += 1,
                CurrentStatus::AtSchool => students.at_school += 1,
            }
            if s.approval_status == ApprovalStatus::Pending {
                students.pending_approval += 1;
            }
        }

        let mut complaints = ComplaintTotals::default();
        for c in store.list_complaints(true).await? {
            complaints.total += 1;
            match c.status {
                ComplaintStatus::Pending => complaints.pending += 1,
                ComplaintStatus::InProgress => complaints.in_progress += 1,
                ComplaintStatus::Resolved => complaints.resolved += 1,
                ComplaintStatus::Closed => complaints.closed += 1,
            }
            if c.priority == ComplaintPriority::Urgent {
                complaints.urgent += 1;
            }
        }

        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        Ok(DashboardStats {
            students,
            supervisors: store.list_users(UserType::Supervisor, true).await?.len(),
            parents: store.list_users(UserType::Parent, true).await?.len(),
            buses: store.list_buses(true).await?.len(),
            trips_today: store.count_trips_since(midnight).await?,
            complaints,
        })
    }
}
