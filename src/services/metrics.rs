use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};
use tracing::{info, warn};

use crate::models::{student::ApprovalStatus, user::UserType};
use crate::store::DataSource;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Sign-in attempts by status",
        &["status"]
    ).unwrap();

    pub static ref PUSH_SENDS_COUNTER: CounterVec = register_counter_vec!(
        "push_sends_total",
        "Push deliveries by mode and outcome",
        &["mode", "outcome"]
    ).unwrap();

    pub static ref QUEUE_ITEMS_COUNTER: CounterVec = register_counter_vec!(
        "queue_items_total",
        "Queue items processed by queue and outcome",
        &["queue", "outcome"]
    ).unwrap();

    pub static ref RETENTION_DELETIONS_COUNTER: CounterVec = register_counter_vec!(
        "retention_deletions_total",
        "Documents removed by the retention sweep",
        &["collection"]
    ).unwrap();

    pub static ref SYNC_FAILURES_COUNTER: CounterVec = register_counter_vec!(
        "relationship_sync_failures_total",
        "Parent children-list updates that failed",
        &["operation"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref USERS_GAUGE: GaugeVec = register_gauge_vec!(
        "mybus_users_active_total",
        "Active users by type",
        &["user_type"]
    ).unwrap();

    pub static ref STUDENTS_GAUGE: GaugeVec = register_gauge_vec!(
        "mybus_students_total",
        "Active students by approval status",
        &["approval_status"]
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(store: Arc<dyn DataSource>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = collect(store.as_ref()).await {
                warn!("Metrics: collection failed: {}", e);
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}

async fn collect(store: &dyn DataSource) -> anyhow::Result<()> {
    for user_type in [UserType::Admin, UserType::Supervisor, UserType::Parent] {
        let count = store.list_users(user_type, true).await?.len();
        USERS_GAUGE
            .with_label_values(&[&user_type.to_string()])
            .set(count as f64);
    }

    let students = store.list_students(None, true).await?;
    for status in ApprovalStatus::ALL {
        let count = students.iter().filter(|s| s.approval_status == status).count();
        STUDENTS_GAUGE
            .with_label_values(&[status.label()])
            .set(count as f64);
    }

    info!("Metrics: collected from {} store", store.name());
    Ok(())
}
