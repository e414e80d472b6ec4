//! Platform-segmented push payloads.
//!
//! Every payload carries a `data` block in which the reserved keys `type` and
//! `timestamp` always hold the builder's values; caller entries with those
//! names are overwritten. Alerting variants also carry a shared notification
//! block plus Android, APNs and web-push blocks with fixed delivery hints.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::notification::DataMap;

pub const CHANNEL_ID: &str = "mybus_notifications";
pub const DEFAULT_TYPE: &str = "alert";
pub const SILENT_TYPE: &str = "silentUpdate";
pub const TEST_TYPE: &str = "test";

const TEST_TITLE: &str = "اختبار الإشعارات 🧪";
const TEST_BODY: &str = "هذا إشعار تجريبي للتأكد من عمل النظام بشكل صحيح";
const ICON: &str = "ic_notification";
const COLOR: &str = "#1E88E5";

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("deviceTokens must be a non-empty array")]
    EmptyTokens,

    #[error("deviceTokens[{0}] is blank")]
    BlankToken(usize),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationBlock {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AndroidNotification {
    pub channel_id: String,
    pub sound: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AndroidConfig {
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<AndroidNotification>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<NotificationBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
    #[serde(rename = "mutable-content", skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<u8>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApnsConfig {
    pub headers: BTreeMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebpushConfig {
    pub headers: BTreeMap<String, String>,
    pub notification: WebNotification,
}

/// Provider-agnostic message body. The push provider adds the target token.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationBlock>,
    pub data: DataMap,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpush: Option<WebpushConfig>,
}

impl Payload {
    /// Alerting push. `kind` defaults to `alert`.
    pub fn alert(
        title: &str,
        body: &str,
        kind: Option<&str>,
        data: DataMap,
    ) -> Result<Self, ValidationError> {
        Self::alert_at(title, body, kind, data, Utc::now())
    }

    pub fn alert_at(
        title: &str,
        body: &str,
        kind: Option<&str>,
        data: DataMap,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if body.is_empty() {
            return Err(ValidationError::MissingField("body"));
        }
        let kind = kind.map(str::trim).filter(|k| !k.is_empty()).unwrap_or(DEFAULT_TYPE);
        Ok(alerting(title, body, data_block(kind, data, now)))
    }

    /// Data-only push: no notification block, background delivery on iOS.
    pub fn silent(data: DataMap) -> Self {
        Self::silent_at(data, Utc::now())
    }

    pub fn silent_at(data: DataMap, now: DateTime<Utc>) -> Self {
        Self {
            notification: None,
            data: data_block(SILENT_TYPE, data, now),
            android: AndroidConfig {
                priority: "HIGH".into(),
                notification: None,
            },
            apns: ApnsConfig {
                headers: apns_priority("5"),
                payload: ApnsPayload {
                    aps: Aps {
                        alert: None,
                        sound: None,
                        badge: None,
                        content_available: Some(1),
                        mutable_content: None,
                    },
                },
            },
            webpush: None,
        }
    }

    /// Fixed diagnostic push used to verify a device registration.
    pub fn test() -> Self {
        let mut data = DataMap::new();
        data.insert("source".into(), "cloud_function".into());
        alerting(TEST_TITLE, TEST_BODY, data_block(TEST_TYPE, data, Utc::now()))
    }

    pub fn kind(&self) -> &str {
        self.data.get("type").map(String::as_str).unwrap_or(DEFAULT_TYPE)
    }

    pub fn title(&self) -> Option<&str> {
        self.notification.as_ref().map(|n| n.title.as_str())
    }

    pub fn body(&self) -> Option<&str> {
        self.notification.as_ref().map(|n| n.body.as_str())
    }
}

fn data_block(kind: &str, mut data: DataMap, now: DateTime<Utc>) -> DataMap {
    data.insert("type".into(), kind.to_string());
    data.insert(
        "timestamp".into(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    data
}

fn apns_priority(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("apns-priority".to_string(), value.to_string())])
}

fn alerting(title: &str, body: &str, data: DataMap) -> Payload {
    let block = NotificationBlock {
        title: title.to_string(),
        body: body.to_string(),
    };
    Payload {
        notification: Some(block.clone()),
        data,
        android: AndroidConfig {
            priority: "HIGH".into(),
            notification: Some(AndroidNotification {
                channel_id: CHANNEL_ID.into(),
                sound: "default".into(),
                icon: ICON.into(),
                color: COLOR.into(),
            }),
        },
        apns: ApnsConfig {
            headers: apns_priority("10"),
            payload: ApnsPayload {
                aps: Aps {
                    alert: Some(block.clone()),
                    sound: Some("default".into()),
                    badge: Some(1),
                    content_available: Some(1),
                    mutable_content: Some(1),
                },
            },
        },
        webpush: Some(WebpushConfig {
            headers: BTreeMap::from([("Urgency".to_string(), "high".to_string())]),
            notification: WebNotification {
                title: block.title,
                body: block.body,
                icon: "/icons/icon-192x192.png".into(),
                badge: "/icons/badge-72x72.png".into(),
                vibrate: vec![200, 100, 200],
                require_interaction: true,
            },
        }),
    }
}

/// Rejects an empty multicast target list, or one with a blank entry, before
/// any provider call.
pub fn require_tokens(tokens: &[String]) -> Result<(), ValidationError> {
    if tokens.iter().all(|t| t.trim().is_empty()) {
        return Err(ValidationError::EmptyTokens);
    }
    match tokens.iter().position(|t| t.trim().is_empty()) {
        Some(index) => Err(ValidationError::BlankToken(index)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_carries_type_and_iso_timestamp() {
        let payload = Payload::alert("Bus arriving", "5 minutes away", None, DataMap::new()).unwrap();

        assert_eq!(payload.kind(), "alert");
        let ts = payload.data.get("timestamp").unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(payload.title(), Some("Bus arriving"));
        let web = payload.webpush.as_ref().unwrap();
        assert_eq!(web.notification.vibrate, vec![200, 100, 200]);
        assert_eq!(payload.android.notification.as_ref().unwrap().channel_id, CHANNEL_ID);
    }

    #[test]
    fn reserved_keys_are_overwritten() {
        let now = Utc::now();
        let mut data = DataMap::new();
        data.insert("type".into(), "spoofed".into());
        data.insert("timestamp".into(), "yesterday".into());
        data.insert("studentId".into(), "s1".into());

        let payload = Payload::alert_at("t", "b", Some("tripUpdate"), data, now).unwrap();
        assert_eq!(payload.data["type"], "tripUpdate");
        assert_ne!(payload.data["timestamp"], "yesterday");
        assert_eq!(payload.data["studentId"], "s1");
    }

    #[test]
    fn missing_title_or_body_is_rejected() {
        assert_eq!(
            Payload::alert("  ", "body", None, DataMap::new()),
            Err(ValidationError::MissingField("title"))
        );
        assert_eq!(
            Payload::alert("title", "", None, DataMap::new()),
            Err(ValidationError::MissingField("body"))
        );
    }

    #[test]
    fn silent_payload_has_no_alert() {
        let payload = Payload::silent(DataMap::new());
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json.get("notification").is_none());
        assert_eq!(json["data"]["type"], SILENT_TYPE);
        assert_eq!(json["apns"]["headers"]["apns-priority"], "5");
        assert_eq!(json["apns"]["payload"]["aps"]["content-available"], 1);
        assert!(json["apns"]["payload"]["aps"].get("alert").is_none());
    }

    #[test]
    fn test_payload_is_tagged() {
        let payload = Payload::test();
        assert_eq!(payload.kind(), TEST_TYPE);
        assert_eq!(payload.data["source"], "cloud_function");
        assert_eq!(payload.apns.headers["apns-priority"], "10");
    }

    #[test]
    fn empty_token_list_is_rejected() {
        assert_eq!(require_tokens(&[]), Err(ValidationError::EmptyTokens));
        assert!(require_tokens(&["t1".to_string()]).is_ok());
    }

    #[test]
    fn blank_entry_in_token_list_is_rejected() {
        let tokens = vec!["t1".to_string(), " ".to_string(), "t3".to_string()];
        assert_eq!(require_tokens(&tokens), Err(ValidationError::BlankToken(1)));
        assert_eq!(
            require_tokens(&[String::new(), String::new()]),
            Err(ValidationError::EmptyTokens)
        );
    }
}
