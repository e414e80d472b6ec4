use chrono::Utc;
use tracing::info;

use super::triggers::{TriggerBus, TriggerEvent};
use crate::{
    error::{AppError, AppResult},
    models::notification::{
        EmailQueueItem, EnqueueEmailRequest, EnqueuePushRequest, PushQueueItem, QueueStatus,
    },
    store::{new_id, DataSource},
};

/// Writes delivery intents. The trigger handler picks them up asynchronously.
pub struct QueueService;

impl QueueService {
    pub async fn enqueue_push(
        store: &dyn DataSource,
        triggers: &TriggerBus,
        req: EnqueuePushRequest,
    ) -> AppResult<PushQueueItem> {
        if req.recipient_id.trim().is_empty() {
            return Err(AppError::Validation("Missing required field: recipientId".into()));
        }
        let item = PushQueueItem {
            id: new_id(),
            recipient_id: req.recipient_id.trim().to_string(),
            title: req.title,
            body: req.body,
            data: req.data,
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            message_id: None,
            error: None,
        };
        store.insert_push_item(&item).await?;
        triggers.emit(TriggerEvent::PushQueued(item.id.clone()));
        info!("fcm_queue/{} queued for {}", item.id, item.recipient_id);
        Ok(item)
    }

    pub async fn enqueue_email(
        store: &dyn DataSource,
        triggers: &TriggerBus,
        req: EnqueueEmailRequest,
    ) -> AppResult<EmailQueueItem> {
        let to = req.to.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let recipient_id = req
            .recipient_id
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if to.is_none() && recipient_id.is_none() {
            return Err(AppError::Validation("Either to or recipientId is required".into()));
        }
        if req.subject.trim().is_empty() {
            return Err(AppError::Validation("Missing required field: subject".into()));
        }
        let item = EmailQueueItem {
            id: new_id(),
            to,
            recipient_id,
            subject: req.subject.trim().to_string(),
            html: req.html,
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            error: None,
        };
        store.insert_email_item(&item).await?;
        triggers.emit(TriggerEvent::EmailQueued(item.id.clone()));
        info!("email_queue/{} queued", item.id);
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::DataMap;
    use crate::store::FixtureStore;

    #[tokio::test]
    async fn push_intent_is_stored_queued() {
        let store = FixtureStore::new();
        let (bus, mut rx) = TriggerBus::new();
        let req = EnqueuePushRequest {
            recipient_id: "parent_1".into(),
            title: "t".into(),
            body: "b".into(),
            data: DataMap::new(),
        };
        let item = QueueService::enqueue_push(&store, &bus, req).await.unwrap();

        assert_eq!(item.status, QueueStatus::Queued);
        assert_eq!(store.push_item_count().await, 1);
        assert_eq!(rx.recv().await, Some(TriggerEvent::PushQueued(item.id)));
    }

    #[tokio::test]
    async fn email_needs_an_address_source() {
        let store = FixtureStore::new();
        let (bus, _rx) = TriggerBus::new();
        let req = EnqueueEmailRequest {
            to: Some(" ".into()),
            recipient_id: None,
            subject: "s".into(),
            html: String::new(),
        };
        let err = QueueService::enqueue_email(&store, &bus, req).await.unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
    }
}
