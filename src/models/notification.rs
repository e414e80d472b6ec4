use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// String→string payload data, the only shape push providers accept.
pub type DataMap = BTreeMap<String, String>;

// ─── Domain notifications ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub recipient_id: String,
    pub recipient_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_by: Option<String>,
    pub priority: String,
    #[serde(default)]
    pub data: DataMap,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub recipient_id: String,
    pub recipient_type: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkNotificationRequest {
    pub recipients: Vec<Recipient>,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub recipient_id: Option<String>,
    pub limit: Option<i64>,
}

/// Per-recipient (or global) counters bumped on every new notification record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total_notifications: i64,
    #[serde(default)]
    pub by_type: BTreeMap<String, i64>,
    pub last_notification_at: Option<DateTime<Utc>>,
}

// ─── Delivery queues ──────────────────────────────────────────────────────────

/// queued → sent | failed. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum QueueStatus {
    #[default]
    Queued,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushQueueItem {
    pub id: String,
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: DataMap,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailQueueItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub subject: String,
    pub html: String,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal outcome written back onto a queue document.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Sent {
        message_id: Option<String>,
        at: DateTime<Utc>,
    },
    Failed {
        error: String,
        at: DateTime<Utc>,
    },
}

impl QueueOutcome {
    /// Document patch merged over the queued item.
    pub fn patch(&self) -> serde_json::Value {
        match self {
            QueueOutcome::Sent { message_id, at } => {
                let mut patch = serde_json::json!({ "status": QueueStatus::Sent, "sentAt": at });
                if let Some(id) = message_id {
                    patch["messageId"] = serde_json::Value::String(id.clone());
                }
                patch
            }
            QueueOutcome::Failed { error, at } => serde_json::json!({
                "status": QueueStatus::Failed,
                "failedAt": at,
                "error": error,
            }),
        }
    }
}

impl PushQueueItem {
    pub fn apply(&mut self, outcome: &QueueOutcome) {
        match outcome {
            QueueOutcome::Sent { message_id, at } => {
                self.status = QueueStatus::Sent;
                self.sent_at = Some(*at);
                self.message_id = message_id.clone();
            }
            QueueOutcome::Failed { error, at } => {
                self.status = QueueStatus::Failed;
                self.failed_at = Some(*at);
                self.error = Some(error.clone());
            }
        }
    }
}

impl EmailQueueItem {
    pub fn apply(&mut self, outcome: &QueueOutcome) {
        match outcome {
            QueueOutcome::Sent { at, .. } => {
                self.status = QueueStatus::Sent;
                self.sent_at = Some(*at);
            }
            QueueOutcome::Failed { error, at } => {
                self.status = QueueStatus::Failed;
                self.failed_at = Some(*at);
                self.error = Some(error.clone());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuePushRequest {
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueEmailRequest {
    pub to: Option<String>,
    pub recipient_id: Option<String>,
    pub subject: String,
    pub html: String,
}

// ─── Direct push calls ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSendRequest {
    #[serde(default)]
    pub device_token: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatchRequest {
    #[serde(default)]
    pub device_tokens: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDataOnlyRequest {
    #[serde(default)]
    pub device_token: String,
    #[serde(default)]
    pub data: DataMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTestRequest {
    #[serde(default)]
    pub device_token: String,
}

// ─── Delivery audit ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum DeliveryOutcome {
    Sent { message_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Audit trail for push deliveries. Tokens are stored redacted, never in full.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AuditRecord {
    #[serde(rename_all = "camelCase")]
    Delivery {
        device_token: String,
        title: Option<String>,
        body: Option<String>,
        #[serde(rename = "type")]
        notification_type: String,
        data: DataMap,
        outcome: DeliveryOutcome,
        sent_by: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Batch {
        device_token_count: usize,
        title: Option<String>,
        body: Option<String>,
        #[serde(rename = "type")]
        notification_type: String,
        data: DataMap,
        success_count: usize,
        failure_count: usize,
        responses: Vec<TokenResult>,
        sent_by: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        device_token: String,
        title: Option<String>,
        body: Option<String>,
        sent_by: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuditRecord {
    /// Collection name the record belongs to.
    pub fn collection(&self) -> &'static str {
        match self {
            AuditRecord::Delivery { .. } => "sent_notifications",
            AuditRecord::Batch { .. } => "batch_notifications",
            AuditRecord::Error { .. } => "notification_errors",
        }
    }
}
