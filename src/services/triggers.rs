//! Reacts to newly written queue and notification documents.
//!
//! Writers publish a [`TriggerEvent`] after the document is stored. The worker
//! spawned by [`spawn_worker`] runs every event as its own task, so handlers
//! for different documents proceed in parallel and finish in any order. The
//! store's conditional `complete_*_item` update is the only coordination: an
//! item leaves `queued` at most once.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::email::MailTransport;
use super::metrics::QUEUE_ITEMS_COUNTER;
use super::payload::Payload;
use crate::config::UndeliverablePolicy;
use crate::models::notification::{QueueOutcome, QueueStatus};
use crate::store::{DataSource, StoreError};

pub const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";
const QUEUE_ACTOR: &str = "system:fcm_queue";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    PushQueued(String),
    EmailQueued(String),
    NotificationCreated(String),
}

/// Publishing half handed to writers.
#[derive(Clone)]
pub struct TriggerBus {
    tx: mpsc::UnboundedSender<TriggerEvent>,
}

impl TriggerBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TriggerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: TriggerEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Trigger worker stopped, dropping {:?}", e.0);
        }
    }

    /// Emits an event for every queue item still `queued` in the store:
    /// items written while no worker ran, by another writer, or left behind
    /// by a stop mid-delivery. Returns how many were emitted.
    pub async fn replay_queued(&self, store: &dyn DataSource) -> Result<usize, StoreError> {
        let push = store.queued_push_item_ids().await?;
        let email = store.queued_email_item_ids().await?;
        let count = push.len() + email.len();
        for id in push {
            self.emit(TriggerEvent::PushQueued(id));
        }
        for id in email {
            self.emit(TriggerEvent::EmailQueued(id));
        }
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum TriggerOutcome {
    Sent {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Failed {
        error: String,
    },
    /// Undeliverable item left queued.
    Skipped {
        reason: String,
    },
    /// Missing document, or already out of `queued`.
    Ignored,
    StatsUpdated,
}

pub struct TriggerHandler {
    store: Arc<dyn DataSource>,
    dispatcher: Arc<Dispatcher>,
    mailer: Arc<dyn MailTransport>,
    policy: UndeliverablePolicy,
}

impl TriggerHandler {
    pub fn new(
        store: Arc<dyn DataSource>,
        dispatcher: Arc<Dispatcher>,
        mailer: Arc<dyn MailTransport>,
        policy: UndeliverablePolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            mailer,
            policy,
        }
    }

    pub async fn handle(&self, event: &TriggerEvent) -> Result<TriggerOutcome, StoreError> {
        match event {
            TriggerEvent::PushQueued(id) => self.on_push_queued(id).await,
            TriggerEvent::EmailQueued(id) => self.on_email_queued(id).await,
            TriggerEvent::NotificationCreated(id) => self.on_notification_created(id).await,
        }
    }

    async fn on_push_queued(&self, id: &str) -> Result<TriggerOutcome, StoreError> {
        let Some(item) = self.store.get_push_item(id).await? else {
            warn!("fcm_queue/{id} vanished before it was handled");
            return Ok(TriggerOutcome::Ignored);
        };
        if item.status != QueueStatus::Queued {
            return Ok(TriggerOutcome::Ignored);
        }

        let token = match self.store.get_user(&item.recipient_id).await? {
            None => None,
            Some(user) => user.fcm_token.filter(|t| !t.trim().is_empty()),
        };
        let Some(token) = token else {
            let reason = format!("recipient {} has no FCM token", item.recipient_id);
            return self.undeliverable(Queue::Push, id, reason).await;
        };

        let mut data = item.data.clone();
        data.insert("click_action".into(), CLICK_ACTION.into());
        let kind = item.data.get("type").cloned();

        let outcome = match Payload::alert(&item.title, &item.body, kind.as_deref(), data) {
            Err(e) => QueueOutcome::Failed {
                error: e.to_string(),
                at: Utc::now(),
            },
            Ok(payload) => match self.dispatcher.send_single(&token, &payload, QUEUE_ACTOR).await {
                Ok(message_id) => QueueOutcome::Sent {
                    message_id: Some(message_id),
                    at: Utc::now(),
                },
                Err(e) => QueueOutcome::Failed {
                    error: e.to_string(),
                    at: Utc::now(),
                },
            },
        };
        self.complete(Queue::Push, id, outcome).await
    }

    async fn on_email_queued(&self, id: &str) -> Result<TriggerOutcome, StoreError> {
        let Some(item) = self.store.get_email_item(id).await? else {
            warn!("email_queue/{id} vanished before it was handled");
            return Ok(TriggerOutcome::Ignored);
        };
        if item.status != QueueStatus::Queued {
            return Ok(TriggerOutcome::Ignored);
        }

        let address = match item.to.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(to) => Some(to.to_string()),
            None => match item.recipient_id.as_deref() {
                Some(rid) => self
                    .store
                    .get_user(rid)
                    .await?
                    .map(|u| u.email)
                    .filter(|e| !e.is_empty()),
                None => None,
            },
        };
        let Some(address) = address else {
            let reason = "no recipient email address".to_string();
            return self.undeliverable(Queue::Email, id, reason).await;
        };

        let outcome = match self.mailer.send(&address, &item.subject, &item.html).await {
            Ok(()) => QueueOutcome::Sent {
                message_id: None,
                at: Utc::now(),
            },
            Err(e) => QueueOutcome::Failed {
                error: format!("{e:#}"),
                at: Utc::now(),
            },
        };
        self.complete(Queue::Email, id, outcome).await
    }

    async fn on_notification_created(&self, id: &str) -> Result<TriggerOutcome, StoreError> {
        let Some(record) = self.store.get_notification(id).await? else {
            return Ok(TriggerOutcome::Ignored);
        };
        for scope in [record.recipient_id.as_str(), "global"] {
            self.store
                .bump_notification_stats(scope, &record.kind, record.timestamp)
                .await?;
        }
        Ok(TriggerOutcome::StatsUpdated)
    }

    async fn undeliverable(
        &self,
        queue: Queue,
        id: &str,
        reason: String,
    ) -> Result<TriggerOutcome, StoreError> {
        match self.policy {
            UndeliverablePolicy::LeaveQueued => {
                warn!("{}/{id} skipped: {reason}", queue.collection());
                QUEUE_ITEMS_COUNTER
                    .with_label_values(&[queue.collection(), "skipped"])
                    .inc();
                Ok(TriggerOutcome::Skipped { reason })
            }
            UndeliverablePolicy::MarkFailed => {
                let outcome = QueueOutcome::Failed {
                    error: reason,
                    at: Utc::now(),
                };
                self.complete(queue, id, outcome).await
            }
        }
    }

    async fn complete(
        &self,
        queue: Queue,
        id: &str,
        outcome: QueueOutcome,
    ) -> Result<TriggerOutcome, StoreError> {
        let applied = match queue {
            Queue::Push => self.store.complete_push_item(id, &outcome).await?,
            Queue::Email => self.store.complete_email_item(id, &outcome).await?,
        };
        if !applied {
            return Ok(TriggerOutcome::Ignored);
        }

        let collection = queue.collection();
        Ok(match outcome {
            QueueOutcome::Sent { message_id, .. } => {
                QUEUE_ITEMS_COUNTER.with_label_values(&[collection, "sent"]).inc();
                info!("{collection}/{id} sent");
                TriggerOutcome::Sent { message_id }
            }
            QueueOutcome::Failed { error, .. } => {
                QUEUE_ITEMS_COUNTER.with_label_values(&[collection, "failed"]).inc();
                warn!("{collection}/{id} failed: {error}");
                TriggerOutcome::Failed { error }
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Queue {
    Push,
    Email,
}

impl Queue {
    fn collection(self) -> &'static str {
        match self {
            Queue::Push => "fcm_queue",
            Queue::Email => "email_queue",
        }
    }
}

/// Drains the bus, one task per event.
pub fn spawn_worker(
    handler: Arc<TriggerHandler>,
    mut rx: mpsc::UnboundedReceiver<TriggerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle(&event).await {
                    warn!("Trigger {:?} failed: {}", event, e);
                }
            });
        }
        info!("Trigger bus closed, worker exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{DataMap, EmailQueueItem, PushQueueItem};
    use crate::services::{email::DryRunMail, push::DryRunPush};
    use crate::store::FixtureStore;

    struct Harness {
        store: Arc<FixtureStore>,
        push: Arc<DryRunPush>,
        mail: Arc<DryRunMail>,
        handler: TriggerHandler,
    }

    async fn harness(push: DryRunPush, policy: UndeliverablePolicy) -> Harness {
        let store = Arc::new(FixtureStore::seeded().await);
        let push = Arc::new(push);
        let mail = Arc::new(DryRunMail::new());
        let dispatcher = Arc::new(Dispatcher::new(push.clone(), store.clone()));
        let handler = TriggerHandler::new(store.clone(), dispatcher, mail.clone(), policy);
        Harness {
            store,
            push,
            mail,
            handler,
        }
    }

    fn push_item(id: &str, recipient: &str) -> PushQueueItem {
        PushQueueItem {
            id: id.into(),
            recipient_id: recipient.into(),
            title: "الباص وصل".into(),
            body: "الباص عند المدرسة".into(),
            data: DataMap::from([("type".to_string(), "arrival".to_string())]),
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            message_id: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn queued_push_is_sent_once() {
        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        h.store.set_fcm_token("parent_1", "token-parent-1").await.unwrap();
        h.store.insert_push_item(&push_item("q1", "parent_1")).await.unwrap();

        let event = TriggerEvent::PushQueued("q1".into());
        let first = h.handler.handle(&event).await.unwrap();
        assert!(matches!(first, TriggerOutcome::Sent { message_id: Some(_) }));

        let again = h.handler.handle(&event).await.unwrap();
        assert_eq!(again, TriggerOutcome::Ignored);

        let item = h.store.get_push_item("q1").await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Sent);
        assert!(item.sent_at.is_some() && item.failed_at.is_none());
        assert_eq!(h.push.delivered(), vec!["token-parent-1".to_string()]);
    }

    #[tokio::test]
    async fn provider_rejection_marks_failed() {
        let h = harness(DryRunPush::rejecting(["stale"]), UndeliverablePolicy::LeaveQueued).await;
        h.store.set_fcm_token("parent_2", "stale").await.unwrap();
        h.store.insert_push_item(&push_item("q2", "parent_2")).await.unwrap();

        let outcome = h.handler.handle(&TriggerEvent::PushQueued("q2".into())).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Failed { .. }));

        let item = h.store.get_push_item("q2").await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert!(item.error.is_some() && item.sent_at.is_none());
    }

    #[tokio::test]
    async fn missing_token_follows_policy() {
        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        h.store.insert_push_item(&push_item("q3", "parent_3")).await.unwrap();
        let outcome = h.handler.handle(&TriggerEvent::PushQueued("q3".into())).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Skipped { .. }));
        let item = h.store.get_push_item("q3").await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Queued);

        let h = harness(DryRunPush::new(), UndeliverablePolicy::MarkFailed).await;
        h.store.insert_push_item(&push_item("q4", "nobody")).await.unwrap();
        let outcome = h.handler.handle(&TriggerEvent::PushQueued("q4".into())).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
        let item = h.store.get_push_item("q4").await.unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
    }

    #[tokio::test]
    async fn email_resolves_recipient_address() {
        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        let item = EmailQueueItem {
            id: "e1".into(),
            to: None,
            recipient_id: Some("parent_4".into()),
            subject: "تنبيه".into(),
            html: "<p>hello</p>".into(),
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            error: None,
        };
        h.store.insert_email_item(&item).await.unwrap();

        let outcome = h.handler.handle(&TriggerEvent::EmailQueued("e1".into())).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Sent { message_id: None });
        assert_eq!(h.mail.sent()[0].0, "parent4@mybus.com");
    }

    #[tokio::test]
    async fn new_notification_bumps_recipient_and_global_stats() {
        use crate::models::notification::SendNotificationRequest;
        use crate::services::notifications::NotificationService;

        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        let (bus, mut rx) = TriggerBus::new();
        let req = SendNotificationRequest {
            recipient_id: "parent_6".into(),
            recipient_type: None,
            title: "t".into(),
            body: "b".into(),
            kind: Some("delay".into()),
            priority: None,
            data: DataMap::new(),
        };
        NotificationService::send(h.store.as_ref(), &bus, req, "admin-1").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(h.handler.handle(&event).await.unwrap(), TriggerOutcome::StatsUpdated);

        for scope in ["parent_6", "global"] {
            let stats = h.store.notification_stats(scope).await.unwrap().unwrap();
            assert_eq!(stats.total_notifications, 1);
            assert_eq!(stats.by_type.get("delay"), Some(&1));
        }
    }

    #[tokio::test]
    async fn worker_processes_bus_events() {
        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        h.store.set_fcm_token("parent_5", "token-5").await.unwrap();
        h.store.insert_push_item(&push_item("q5", "parent_5")).await.unwrap();

        let (bus, rx) = TriggerBus::new();
        let store = h.store.clone();
        let worker = spawn_worker(Arc::new(h.handler), rx);
        bus.emit(TriggerEvent::PushQueued("q5".into()));
        drop(bus);
        worker.await.unwrap();

        for _ in 0..50 {
            let item = store.get_push_item("q5").await.unwrap().unwrap();
            if item.status == QueueStatus::Sent {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("queued push was never sent");
    }

    #[tokio::test]
    async fn replay_emits_only_queued_items() {
        let h = harness(DryRunPush::new(), UndeliverablePolicy::LeaveQueued).await;
        h.store.set_fcm_token("parent_1", "token-1").await.unwrap();
        h.store.insert_push_item(&push_item("done", "parent_1")).await.unwrap();
        h.handler.handle(&TriggerEvent::PushQueued("done".into())).await.unwrap();
        h.store.insert_push_item(&push_item("waiting", "parent_1")).await.unwrap();
        let email = EmailQueueItem {
            id: "mail".into(),
            to: Some("office@mybus.com".into()),
            recipient_id: None,
            subject: "s".into(),
            html: "<p>h</p>".into(),
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            error: None,
        };
        h.store.insert_email_item(&email).await.unwrap();

        let (bus, mut rx) = TriggerBus::new();
        assert_eq!(bus.replay_queued(h.store.as_ref()).await.unwrap(), 2);
        drop(bus);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                TriggerEvent::PushQueued("waiting".into()),
                TriggerEvent::EmailQueued("mail".into()),
            ]
        );
    }
}
