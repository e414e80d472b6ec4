//! Full data export for backups from the console.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
    error::AppResult,
    models::{
        notification::NotificationRecord,
        route::BusRoute,
        settings::SettingsEntry,
        student::Student,
        trip::Trip,
        user::{User, UserType},
    },
    store::DataSource,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub students: Vec<Student>,
    pub users: Vec<User>,
    pub bus_routes: Vec<BusRoute>,
    pub settings: Vec<SettingsEntry>,
    pub trips: Vec<Trip>,
    pub notifications: Vec<NotificationRecord>,
    pub export_date: DateTime<Utc>,
}

pub struct ExportService;

impl ExportService {
    /// Every record, active or not. Device tokens are left out.
    pub async fn export_all(store: &dyn DataSource) -> AppResult<DataExport> {
        let mut users = Vec::new();
        for user_type in [UserType::Admin, UserType::Supervisor, UserType::Parent] {
            users.extend(store.list_users(user_type, false).await?);
        }
        for user in &mut users {
            user.fcm_token = None;
        }

        let export = DataExport {
            students: store.list_students(None, false).await?,
            users,
            bus_routes: store.list_bus_routes().await?,
            settings: store.list_settings().await?,
            trips: store.list_trips(i64::MAX).await?,
            notifications: store.list_notifications(None, i64::MAX).await?,
            export_date: Utc::now(),
        };
        info!(
            "Exported {} students, {} users, {} notifications",
            export.students.len(),
            export.users.len(),
            export.notifications.len()
        );
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::students::StudentService;
    use crate::store::FixtureStore;

    #[tokio::test]
    async fn export_includes_inactive_records_without_tokens() {
        let store = FixtureStore::seeded().await;
        store.set_fcm_token("parent_1", "device-secret").await.unwrap();
        StudentService::deactivate(&store, "student_6").await.unwrap();

        let export = ExportService::export_all(&store).await.unwrap();
        assert_eq!(export.students.len(), 6);
        assert_eq!(export.users.len(), 6);
        assert_eq!(export.bus_routes.len(), 6);
        assert!(export.users.iter().all(|u| u.fcm_token.is_none()));

        let json = serde_json::to_value(&export).unwrap();
        assert!(json["busRoutes"].is_array());
        assert!(json["exportDate"].is_string());
    }
}
