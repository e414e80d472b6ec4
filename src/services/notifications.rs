use chrono::Utc;
use tracing::info;

use super::triggers::{TriggerBus, TriggerEvent};
use crate::{
    error::{AppError, AppResult},
    models::notification::{
        BulkNotificationRequest, DataMap, NotificationRecord, NotificationStats,
        SendNotificationRequest,
    },
    store::{new_id, DataSource},
};

const DEFAULT_RECIPIENT_TYPE: &str = "parent";
const DEFAULT_KIND: &str = "general";
const DEFAULT_PRIORITY: &str = "normal";
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Domain notification records (the in-app inbox). Push delivery goes through
/// the queue; these only feed the stats trigger.
pub struct NotificationService;

impl NotificationService {
    pub async fn send(
        store: &dyn DataSource,
        triggers: &TriggerBus,
        req: SendNotificationRequest,
        sender_id: &str,
    ) -> AppResult<NotificationRecord> {
        if req.recipient_id.trim().is_empty() {
            return Err(AppError::Validation("Missing required field: recipientId".into()));
        }
        let content = Content::new(&req.title, &req.body, req.kind, req.priority, req.data)?;
        let record = content.record(
            req.recipient_id.trim(),
            req.recipient_type.as_deref(),
            None,
            sender_id,
        );
        store.insert_notifications(std::slice::from_ref(&record)).await?;
        triggers.emit(TriggerEvent::NotificationCreated(record.id.clone()));
        info!("Notification {} sent to {}", record.id, record.recipient_id);
        Ok(record)
    }

    /// One record per recipient, written as a single batch.
    pub async fn send_bulk(
        store: &dyn DataSource,
        triggers: &TriggerBus,
        req: BulkNotificationRequest,
        sender_id: &str,
    ) -> AppResult<Vec<NotificationRecord>> {
        if req.recipients.is_empty() {
            return Err(AppError::Validation("recipients must not be empty".into()));
        }
        if req.recipients.iter().any(|r| r.id.trim().is_empty()) {
            return Err(AppError::Validation("Every recipient needs an id".into()));
        }
        let content = Content::new(&req.title, &req.body, req.kind, req.priority, req.data)?;
        let records: Vec<NotificationRecord> = req
            .recipients
            .iter()
            .map(|r| content.record(r.id.trim(), r.kind.as_deref(), r.name.clone(), sender_id))
            .collect();

        store.insert_notifications(&records).await?;
        for record in &records {
            triggers.emit(TriggerEvent::NotificationCreated(record.id.clone()));
        }
        info!("Bulk notification sent to {} recipients", records.len());
        Ok(records)
    }

    /// Newest first, for one recipient or everybody.
    pub async fn list(
        store: &dyn DataSource,
        recipient_id: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<NotificationRecord>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let recipient = recipient_id.map(str::trim).filter(|r| !r.is_empty());
        Ok(store.list_notifications(recipient, limit).await?)
    }

    pub async fn mark_read(store: &dyn DataSource, id: &str, reader: &str) -> AppResult<NotificationRecord> {
        let record = store
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::not_found("notification", id))?;
        if record.is_read {
            return Ok(record);
        }
        store.mark_notification_read(id, reader, Utc::now()).await?;
        store
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::not_found("notification", id))
    }

    /// Counters for a recipient id, or `global`. Zeroed when nothing was sent yet.
    pub async fn stats(store: &dyn DataSource, scope: &str) -> AppResult<NotificationStats> {
        Ok(store.notification_stats(scope).await?.unwrap_or_default())
    }
}

struct Content {
    title: String,
    body: String,
    kind: String,
    priority: String,
    data: DataMap,
}

impl Content {
    fn new(
        title: &str,
        body: &str,
        kind: Option<String>,
        priority: Option<String>,
        data: DataMap,
    ) -> AppResult<Self> {
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() || body.is_empty() {
            return Err(AppError::Validation("Missing required fields: title, body".into()));
        }
        Ok(Self {
            title: title.to_string(),
            body: body.to_string(),
            kind: non_blank(kind).unwrap_or_else(|| DEFAULT_KIND.into()),
            priority: non_blank(priority).unwrap_or_else(|| DEFAULT_PRIORITY.into()),
            data,
        })
    }

    fn record(
        &self,
        recipient_id: &str,
        recipient_type: Option<&str>,
        recipient_name: Option<String>,
        sender_id: &str,
    ) -> NotificationRecord {
        NotificationRecord {
            id: new_id(),
            title: self.title.clone(),
            body: self.body.clone(),
            kind: self.kind.clone(),
            recipient_id: recipient_id.to_string(),
            recipient_type: recipient_type
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_RECIPIENT_TYPE)
                .to_string(),
            recipient_name,
            sender_id: sender_id.to_string(),
            timestamp: Utc::now(),
            is_read: false,
            read_at: None,
            read_by: None,
            priority: self.priority.clone(),
            data: self.data.clone(),
            status: "sent".into(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::Recipient;
    use crate::store::FixtureStore;

    fn request(recipient: &str) -> SendNotificationRequest {
        SendNotificationRequest {
            recipient_id: recipient.into(),
            recipient_type: None,
            title: "تأخير".into(),
            body: "الباص متأخر 10 دقائق".into(),
            kind: None,
            priority: None,
            data: DataMap::new(),
        }
    }

    #[tokio::test]
    async fn send_applies_defaults_and_emits() {
        let store = FixtureStore::seeded().await;
        let (bus, mut rx) = TriggerBus::new();

        let record = NotificationService::send(&store, &bus, request("parent_1"), "admin-1")
            .await
            .unwrap();
        assert_eq!(record.recipient_type, "parent");
        assert_eq!(record.kind, "general");
        assert_eq!(record.priority, "normal");
        assert!(!record.is_read);
        assert_eq!(rx.recv().await, Some(TriggerEvent::NotificationCreated(record.id)));
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let store = FixtureStore::new();
        let (bus, _rx) = TriggerBus::new();
        let mut req = request("parent_1");
        req.title = "  ".into();
        let err = NotificationService::send(&store, &bus, req, "admin-1").await.unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn bulk_writes_one_record_per_recipient() {
        let store = FixtureStore::seeded().await;
        let (bus, _rx) = TriggerBus::new();
        let req = BulkNotificationRequest {
            recipients: vec![
                Recipient { id: "parent_1".into(), kind: None, name: Some("أحمد".into()) },
                Recipient { id: "sup_1".into(), kind: Some("supervisor".into()), name: None },
            ],
            title: "إجازة".into(),
            body: "لا توجد رحلات غدا".into(),
            kind: Some("announcement".into()),
            priority: Some("high".into()),
            data: DataMap::new(),
        };
        let records = NotificationService::send_bulk(&store, &bus, req, "admin-1").await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].recipient_type, "supervisor");
        assert_eq!(store.notification_count().await, 2);
    }

    #[tokio::test]
    async fn read_flag_never_reverts() {
        let store = FixtureStore::seeded().await;
        let (bus, _rx) = TriggerBus::new();
        let record = NotificationService::send(&store, &bus, request("parent_2"), "admin-1")
            .await
            .unwrap();

        let read = NotificationService::mark_read(&store, &record.id, "parent_2").await.unwrap();
        assert!(read.is_read);
        let first_read_at = read.read_at;

        let again = NotificationService::mark_read(&store, &record.id, "someone-else").await.unwrap();
        assert_eq!(again.read_at, first_read_at);
        assert_eq!(again.read_by.as_deref(), Some("parent_2"));
    }

    #[tokio::test]
    async fn list_is_newest_first_per_recipient() {
        let store = FixtureStore::new();
        let now = Utc::now();
        let content = Content::new("t", "b", None, None, DataMap::new()).unwrap();
        let mut records = Vec::new();
        for (n, recipient) in ["parent_1", "parent_2", "parent_1", "parent_1"].iter().enumerate() {
            let mut record = content.record(recipient, None, None, "admin-1");
            record.timestamp = now - chrono::Duration::minutes(n as i64);
            records.push(record);
        }
        store.insert_notifications(&records).await.unwrap();

        let listed = NotificationService::list(&store, Some("parent_1"), Some(2)).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![records[0].id.as_str(), records[2].id.as_str()]);

        let all = NotificationService::list(&store, None, None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}
