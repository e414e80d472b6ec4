//! Document store port.
//!
//! Every mutation is a single-document atomic operation except the explicit
//! batch methods (`insert_students`, `insert_notifications`, `delete_*`), which
//! are all-or-nothing within one collection. Nothing here spans collections.

pub mod fixture;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    bus::Bus,
    complaint::Complaint,
    notification::{
        AuditRecord, EmailQueueItem, NotificationRecord, NotificationStats, PushQueueItem,
        QueueOutcome,
    },
    route::BusRoute,
    settings::{SettingsDoc, SettingsEntry},
    student::Student,
    trip::Trip,
    user::{ChildRef, User, UserType},
};

pub use fixture::FixtureStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("duplicate document: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fresh document id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short label for logs and `/health`.
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    // ── users ───────────────────────────────────────────────────────────────
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// User record plus its bcrypt hash, looked up by (case-insensitive) email.
    async fn find_credentials(&self, email: &str)
        -> Result<Option<(User, Option<String>)>, StoreError>;

    async fn insert_user(&self, user: &User, password_hash: Option<&str>)
        -> Result<(), StoreError>;

    /// Replaces profile fields. The embedded `children` list is left untouched;
    /// only `upsert_child_ref`/`remove_child_ref` mutate it.
    async fn update_user_profile(&self, user: &User) -> Result<bool, StoreError>;

    async fn list_users(&self, user_type: UserType, active_only: bool)
        -> Result<Vec<User>, StoreError>;

    async fn set_fcm_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Inserts `child` into the parent's `children`, replacing any entry with the
    /// same id (its original `addedAt` is kept). Returns `false` when the parent
    /// record does not exist.
    async fn upsert_child_ref(&self, parent_id: &str, child: &ChildRef)
        -> Result<bool, StoreError>;

    /// Removes the entry with `student_id`, if any. Returns `false` when the
    /// parent record does not exist.
    async fn remove_child_ref(&self, parent_id: &str, student_id: &str)
        -> Result<bool, StoreError>;

    // ── students ────────────────────────────────────────────────────────────
    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError>;

    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>, StoreError>;

    async fn list_students(&self, parent_id: Option<&str>, active_only: bool)
        -> Result<Vec<Student>, StoreError>;

    /// Batched insert; fails as a whole on any conflict.
    async fn insert_students(&self, students: &[Student]) -> Result<(), StoreError>;

    async fn update_student(&self, student: &Student) -> Result<bool, StoreError>;

    // ── buses & trips ───────────────────────────────────────────────────────
    async fn get_bus(&self, id: &str) -> Result<Option<Bus>, StoreError>;

    async fn list_buses(&self, active_only: bool) -> Result<Vec<Bus>, StoreError>;

    async fn insert_bus(&self, bus: &Bus) -> Result<(), StoreError>;

    async fn update_bus(&self, bus: &Bus) -> Result<bool, StoreError>;

    /// Most recent trips first.
    async fn list_trips(&self, limit: i64) -> Result<Vec<Trip>, StoreError>;

    async fn count_trips_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;

    // ── bus routes ──────────────────────────────────────────────────────────
    async fn get_bus_route(&self, id: &str) -> Result<Option<BusRoute>, StoreError>;

    /// Sorted by name.
    async fn list_bus_routes(&self) -> Result<Vec<BusRoute>, StoreError>;

    async fn insert_bus_route(&self, route: &BusRoute) -> Result<(), StoreError>;

    async fn update_bus_route(&self, route: &BusRoute) -> Result<bool, StoreError>;

    async fn delete_bus_route(&self, id: &str) -> Result<bool, StoreError>;

    // ── settings ────────────────────────────────────────────────────────────
    /// Every category, sorted by name.
    async fn list_settings(&self) -> Result<Vec<SettingsEntry>, StoreError>;

    /// Shallow-merges `values` into the category, creating it when missing.
    async fn merge_settings(&self, category: &str, values: &SettingsDoc) -> Result<(), StoreError>;

    // ── complaints ──────────────────────────────────────────────────────────
    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError>;

    async fn list_complaints(&self, active_only: bool) -> Result<Vec<Complaint>, StoreError>;

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), StoreError>;

    async fn update_complaint(&self, complaint: &Complaint) -> Result<bool, StoreError>;

    // ── notifications ───────────────────────────────────────────────────────
    async fn get_notification(&self, id: &str) -> Result<Option<NotificationRecord>, StoreError>;

    /// Newest first, optionally restricted to one recipient.
    async fn list_notifications(&self, recipient_id: Option<&str>, limit: i64)
        -> Result<Vec<NotificationRecord>, StoreError>;

    /// Batched insert.
    async fn insert_notifications(&self, records: &[NotificationRecord])
        -> Result<(), StoreError>;

    /// Flips `isRead` false→true. Returns `false` if missing or already read.
    async fn mark_notification_read(&self, id: &str, reader: &str, at: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Increments the counters kept under `scope` (a recipient id or "global").
    async fn bump_notification_stats(&self, scope: &str, kind: &str, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    async fn notification_stats(&self, scope: &str)
        -> Result<Option<NotificationStats>, StoreError>;

    // ── delivery queues ─────────────────────────────────────────────────────
    async fn insert_push_item(&self, item: &PushQueueItem) -> Result<(), StoreError>;

    async fn get_push_item(&self, id: &str) -> Result<Option<PushQueueItem>, StoreError>;

    /// Applies `outcome` only while the item is still queued. Returns `false`
    /// when the item is missing or already terminal.
    async fn complete_push_item(&self, id: &str, outcome: &QueueOutcome)
        -> Result<bool, StoreError>;

    async fn insert_email_item(&self, item: &EmailQueueItem) -> Result<(), StoreError>;

    async fn get_email_item(&self, id: &str) -> Result<Option<EmailQueueItem>, StoreError>;

    async fn complete_email_item(&self, id: &str, outcome: &QueueOutcome)
        -> Result<bool, StoreError>;

    /// Ids of push items still `queued`, oldest first. Replayed at startup.
    async fn queued_push_item_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn queued_email_item_ids(&self) -> Result<Vec<String>, StoreError>;

    // ── audit ───────────────────────────────────────────────────────────────
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    // ── retention ───────────────────────────────────────────────────────────
    /// Ids of notifications with `timestamp < cutoff`, at most `limit`.
    async fn expired_notification_ids(&self, cutoff: DateTime<Utc>, limit: usize)
        -> Result<Vec<String>, StoreError>;

    /// Ids of push queue items with status `sent` and `sentAt < cutoff`.
    async fn expired_push_item_ids(&self, cutoff: DateTime<Utc>, limit: usize)
        -> Result<Vec<String>, StoreError>;

    /// Deletes one batch, all-or-nothing.
    async fn delete_notifications(&self, ids: &[String]) -> Result<u64, StoreError>;

    async fn delete_push_items(&self, ids: &[String]) -> Result<u64, StoreError>;
}
