use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use super::{DataSource, StoreError};
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

/// Document store on Postgres: one table per collection, each row an `id` plus
/// a camelCase JSONB `doc`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_doc<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>, StoreError> {
        let doc: Option<Value> =
            sqlx::query_scalar(&format!("SELECT doc FROM {table} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        doc.map(decode).transpose()
    }

    async fn fetch_docs<T: DeserializeOwned>(
        &self,
        sql: &str,
        active_only: bool,
    ) -> Result<Vec<T>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn insert_doc<T: Serialize>(&self, table: &str, id: &str, doc: &T) -> Result<(), StoreError> {
        sqlx::query(&format!("INSERT INTO {table} (id, doc) VALUES ($1, $2)"))
            .bind(id)
            .bind(serde_json::to_value(doc)?)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("{table} {id}")))?;
        Ok(())
    }

    async fn replace_doc<T: Serialize>(&self, table: &str, id: &str, doc: &T) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!("UPDATE {table} SET doc = $2 WHERE id = $1"))
            .bind(id)
            .bind(serde_json::to_value(doc)?)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("{table} {id}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_queue_item(
        &self,
        table: &str,
        id: &str,
        outcome: &QueueOutcome,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {table} SET doc = doc || $2::jsonb
             WHERE id = $1 AND doc->>'status' = 'queued'"
        ))
        .bind(id)
        .bind(outcome.patch())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expired_ids(&self, sql: &str, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar(sql)
            .bind(cutoff)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn queued_ids(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar(&format!(
            "SELECT id FROM {table}
             WHERE doc->>'status' = 'queued'
             ORDER BY (doc->>'createdAt')::timestamptz"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_ids(&self, table: &str, ids: &[String]) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ANY($1)"))
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn decode<T: DeserializeOwned>(doc: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(doc)?)
}

fn conflict_or(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what),
        _ => StoreError::Database(err),
    }
}

fn json_now() -> Result<Value, StoreError> {
    Ok(serde_json::to_value(Utc::now())?)
}

#[async_trait]
impl DataSource for PgStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.fetch_doc("users", id).await
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, Option<String>)>, StoreError> {
        let row: Option<(Value, Option<String>)> = sqlx::query_as(
            "SELECT doc, password_hash FROM users WHERE lower(doc->>'email') = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(doc, hash)| Ok((decode(doc)?, hash))).transpose()
    }

    async fn insert_user(&self, user: &User, password_hash: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, doc, password_hash) VALUES ($1, $2, $3)")
            .bind(&user.id)
            .bind(serde_json::to_value(user)?)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("user {}", user.email)))?;
        Ok(())
    }

    async fn update_user_profile(&self, user: &User) -> Result<bool, StoreError> {
        // The stored children array always wins over whatever the caller holds.
        let result = sqlx::query(
            "UPDATE users
             SET doc = $2::jsonb || jsonb_build_object('children', COALESCE(doc->'children', '[]'::jsonb))
             WHERE id = $1",
        )
        .bind(&user.id)
        .bind(serde_json::to_value(user)?)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("user {}", user.email)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self, user_type: UserType, active_only: bool) -> Result<Vec<User>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT doc FROM users
             WHERE doc->>'userType' = $1 AND ($2 = FALSE OR (doc->>'isActive')::boolean)
             ORDER BY doc->>'name'",
        )
        .bind(user_type.to_string())
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn set_fcm_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users
             SET doc = doc || jsonb_build_object('fcmToken', $2::text, 'updatedAt', $3::jsonb)
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(token)
        .bind(json_now()?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_child_ref(&self, parent_id: &str, child: &ChildRef) -> Result<bool, StoreError> {
        // Drop any element with the same id and append the new snapshot, carrying
        // over the original addedAt. One statement, so concurrent upserts for
        // different children never clobber each other.
        let result = sqlx::query(
            "UPDATE users
             SET doc = jsonb_set(
                     doc,
                     '{children}',
                     COALESCE(
                         (SELECT jsonb_agg(c)
                            FROM jsonb_array_elements(COALESCE(doc->'children', '[]'::jsonb)) c
                           WHERE c->>'id' <> $2),
                         '[]'::jsonb
                     ) || jsonb_build_array(
                         $3::jsonb || jsonb_strip_nulls(jsonb_build_object('addedAt',
                             (SELECT c->'addedAt'
                                FROM jsonb_array_elements(COALESCE(doc->'children', '[]'::jsonb)) c
                               WHERE c->>'id' = $2
                               LIMIT 1)))
                     ),
                     true
                 ) || jsonb_build_object('updatedAt', $4::jsonb)
             WHERE id = $1",
        )
        .bind(parent_id)
        .bind(&child.id)
        .bind(serde_json::to_value(child)?)
        .bind(json_now()?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_child_ref(&self, parent_id: &str, student_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users
             SET doc = jsonb_set(
                     doc,
                     '{children}',
                     COALESCE(
                         (SELECT jsonb_agg(c)
                            FROM jsonb_array_elements(COALESCE(doc->'children', '[]'::jsonb)) c
                           WHERE c->>'id' <> $2),
                         '[]'::jsonb
                     ),
                     true
                 ) || jsonb_build_object('updatedAt', $3::jsonb)
             WHERE id = $1",
        )
        .bind(parent_id)
        .bind(student_id)
        .bind(json_now()?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        self.fetch_doc("students", id).await
    }

    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>, StoreError> {
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM students WHERE doc->>'qrCode' = $1")
                .bind(qr_code)
                .fetch_optional(&self.pool)
                .await?;
        doc.map(decode).transpose()
    }

    async fn list_students(
        &self,
        parent_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<Student>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT doc FROM students
             WHERE ($1::text IS NULL OR doc->>'parentId' = $1)
               AND ($2 = FALSE OR (doc->>'isActive')::boolean)
             ORDER BY doc->>'name'",
        )
        .bind(parent_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn insert_students(&self, students: &[Student]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for student in students {
            sqlx::query("INSERT INTO students (id, doc) VALUES ($1, $2)")
                .bind(&student.id)
                .bind(serde_json::to_value(student)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or(e, format!("student qr code {}", student.qr_code)))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> Result<bool, StoreError> {
        self.replace_doc("students", &student.id, student).await
    }

    async fn get_bus(&self, id: &str) -> Result<Option<Bus>, StoreError> {
        self.fetch_doc("buses", id).await
    }

    async fn list_buses(&self, active_only: bool) -> Result<Vec<Bus>, StoreError> {
        self.fetch_docs(
            "SELECT doc FROM buses
             WHERE ($1 = FALSE OR (doc->>'isActive')::boolean)
             ORDER BY doc->>'plateNumber'",
            active_only,
        )
        .await
    }

    async fn insert_bus(&self, bus: &Bus) -> Result<(), StoreError> {
        self.insert_doc("buses", &bus.id, bus).await
    }

    async fn update_bus(&self, bus: &Bus) -> Result<bool, StoreError> {
        self.replace_doc("buses", &bus.id, bus).await
    }

    async fn list_trips(&self, limit: i64) -> Result<Vec<Trip>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT doc FROM trips
             ORDER BY (doc->>'timestamp')::timestamptz DESC
             LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn count_trips_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trips WHERE (doc->>'timestamp')::timestamptz >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_bus_route(&self, id: &str) -> Result<Option<BusRoute>, StoreError> {
        self.fetch_doc("bus_routes", id).await
    }

    async fn list_bus_routes(&self) -> Result<Vec<BusRoute>, StoreError> {
        let docs: Vec<Value> =
            sqlx::query_scalar("SELECT doc FROM bus_routes ORDER BY doc->>'name'")
                .fetch_all(&self.pool)
                .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn insert_bus_route(&self, route: &BusRoute) -> Result<(), StoreError> {
        self.insert_doc("bus_routes", &route.id, route).await
    }

    async fn update_bus_route(&self, route: &BusRoute) -> Result<bool, StoreError> {
        self.replace_doc("bus_routes", &route.id, route).await
    }

    async fn delete_bus_route(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete_ids("bus_routes", &[id.to_string()]).await? > 0)
    }

    async fn list_settings(&self) -> Result<Vec<SettingsEntry>, StoreError> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT category, doc FROM settings ORDER BY category")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(category, doc)| Ok(SettingsEntry { category, values: decode(doc)? }))
            .collect()
    }

    async fn merge_settings(&self, category: &str, values: &SettingsDoc) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (category, doc) VALUES ($1, $2)
             ON CONFLICT (category) DO UPDATE SET doc = settings.doc || EXCLUDED.doc",
        )
        .bind(category)
        .bind(Value::Object(values.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError> {
        self.fetch_doc("complaints", id).await
    }

    async fn list_complaints(&self, active_only: bool) -> Result<Vec<Complaint>, StoreError> {
        self.fetch_docs(
            "SELECT doc FROM complaints
             WHERE ($1 = FALSE OR (doc->>'isActive')::boolean)
             ORDER BY (doc->>'createdAt')::timestamptz DESC",
            active_only,
        )
        .await
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), StoreError> {
        self.insert_doc("complaints", &complaint.id, complaint).await
    }

    async fn update_complaint(&self, complaint: &Complaint) -> Result<bool, StoreError> {
        self.replace_doc("complaints", &complaint.id, complaint).await
    }

    async fn get_notification(&self, id: &str) -> Result<Option<NotificationRecord>, StoreError> {
        self.fetch_doc("notifications", id).await
    }

    async fn list_notifications(
        &self,
        recipient_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT doc FROM notifications
             WHERE ($1::text IS NULL OR doc->>'recipientId' = $1)
             ORDER BY (doc->>'timestamp')::timestamptz DESC
             LIMIT $2",
        )
        .bind(recipient_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        docs.into_iter().map(decode).collect()
    }

    async fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query("INSERT INTO notifications (id, doc) VALUES ($1, $2)")
                .bind(&record.id)
                .bind(serde_json::to_value(record)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or(e, format!("notification {}", record.id)))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_notification_read(
        &self,
        id: &str,
        reader: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications
             SET doc = doc || jsonb_build_object('isRead', true, 'readAt', $3::jsonb, 'readBy', $2::text)
             WHERE id = $1 AND NOT COALESCE((doc->>'isRead')::boolean, false)",
        )
        .bind(id)
        .bind(reader)
        .bind(serde_json::to_value(at)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn bump_notification_stats(
        &self,
        scope: &str,
        kind: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification_stats (scope, doc)
             VALUES ($1, jsonb_build_object(
                 'totalNotifications', 1,
                 'byType', jsonb_build_object($2::text, 1),
                 'lastNotificationAt', $3::jsonb))
             ON CONFLICT (scope) DO UPDATE SET doc = jsonb_set(
                 notification_stats.doc || jsonb_build_object(
                     'totalNotifications',
                     COALESCE((notification_stats.doc->>'totalNotifications')::bigint, 0) + 1,
                     'lastNotificationAt', $3::jsonb,
                     'byType', COALESCE(notification_stats.doc->'byType', '{}'::jsonb)),
                 ARRAY['byType', $2::text],
                 to_jsonb(COALESCE((notification_stats.doc #>> ARRAY['byType', $2::text])::bigint, 0) + 1),
                 true)",
        )
        .bind(scope)
        .bind(kind)
        .bind(serde_json::to_value(at)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn notification_stats(&self, scope: &str) -> Result<Option<NotificationStats>, StoreError> {
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM notification_stats WHERE scope = $1")
                .bind(scope)
                .fetch_optional(&self.pool)
                .await?;
        doc.map(decode).transpose()
    }

    async fn insert_push_item(&self, item: &PushQueueItem) -> Result<(), StoreError> {
        self.insert_doc("fcm_queue", &item.id, item).await
    }

    async fn get_push_item(&self, id: &str) -> Result<Option<PushQueueItem>, StoreError> {
        self.fetch_doc("fcm_queue", id).await
    }

    async fn complete_push_item(&self, id: &str, outcome: &QueueOutcome) -> Result<bool, StoreError> {
        self.complete_queue_item("fcm_queue", id, outcome).await
    }

    async fn insert_email_item(&self, item: &EmailQueueItem) -> Result<(), StoreError> {
        self.insert_doc("email_queue", &item.id, item).await
    }

    async fn get_email_item(&self, id: &str) -> Result<Option<EmailQueueItem>, StoreError> {
        self.fetch_doc("email_queue", id).await
    }

    async fn complete_email_item(&self, id: &str, outcome: &QueueOutcome) -> Result<bool, StoreError> {
        self.complete_queue_item("email_queue", id, outcome).await
    }

    async fn queued_push_item_ids(&self) -> Result<Vec<String>, StoreError> {
        self.queued_ids("fcm_queue").await
    }

    async fn queued_email_item_ids(&self) -> Result<Vec<String>, StoreError> {
        self.queued_ids("email_queue").await
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO delivery_audit (id, kind, doc) VALUES ($1, $2, $3)")
            .bind(super::new_id())
            .bind(record.collection())
            .bind(serde_json::to_value(record)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expired_notification_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.expired_ids(
            "SELECT id FROM notifications
             WHERE (doc->>'timestamp')::timestamptz < $1
             LIMIT $2",
            cutoff,
            limit,
        )
        .await
    }

    async fn expired_push_item_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.expired_ids(
            "SELECT id FROM fcm_queue
             WHERE doc->>'status' = 'sent' AND (doc->>'sentAt')::timestamptz < $1
             LIMIT $2",
            cutoff,
            limit,
        )
        .await
    }

    async fn delete_notifications(&self, ids: &[String]) -> Result<u64, StoreError> {
        self.delete_ids("notifications", ids).await
    }

    async fn delete_push_items(&self, ids: &[String]) -> Result<u64, StoreError> {
        self.delete_ids("fcm_queue", ids).await
    }
}
