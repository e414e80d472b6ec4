use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::payload::Payload;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Push transport. Implementations deliver one payload to one device token.
#[async_trait]
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the provider's message id.
    async fn send(&self, token: &str, payload: &Payload) -> Result<String, DeliveryError>;

    /// One attempt per token, run concurrently; results keep the input order.
    async fn send_each(
        &self,
        tokens: &[String],
        payload: &Payload,
    ) -> Vec<Result<String, DeliveryError>> {
        join_all(tokens.iter().map(|t| self.send(t, payload))).await
    }
}

// ─── FCM HTTP v1 ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
}

#[derive(Deserialize)]
struct FcmResponse {
    name: String,
}

#[derive(Deserialize)]
struct FcmErrorBody {
    error: FcmErrorDetail,
}

#[derive(Deserialize)]
struct FcmErrorDetail {
    message: String,
}

pub struct FcmPushProvider {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl FcmPushProvider {
    pub fn new(project_id: &str, access_token: String) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("https://fcm.googleapis.com/v1/projects/{project_id}/messages:send"),
            access_token,
        }
    }
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    fn name(&self) -> &'static str {
        "fcm"
    }

    async fn send(&self, token: &str, payload: &Payload) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&FcmRequest {
                message: FcmMessage { token, payload },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<FcmErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            tracing::warn!("FCM error {}: {}", status, message);
            return Err(DeliveryError::Rejected { status, message });
        }

        let body: FcmResponse = response.json().await?;
        Ok(body.name)
    }
}

// ─── Dry run ──────────────────────────────────────────────────────────────────

/// Used when FCM is not configured. Logs instead of delivering and hands out
/// synthetic message ids. Tokens registered with `rejecting` fail the way an
/// unregistered device token would.
#[derive(Default)]
pub struct DryRunPush {
    counter: AtomicU64,
    rejected: HashSet<String>,
    delivered: Mutex<Vec<String>>,
}

impl DryRunPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rejected: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Tokens that received a message, in delivery order.
    pub fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PushProvider for DryRunPush {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send(&self, token: &str, payload: &Payload) -> Result<String, DeliveryError> {
        if self.rejected.contains(token) {
            return Err(DeliveryError::Rejected {
                status: 404,
                message: "Requested entity was not found.".into(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(token.to_string());
        }
        tracing::debug!("Push not configured, dropping {} message #{n}", payload.kind());
        Ok(format!("projects/dry-run/messages/{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::DataMap;

    #[test]
    fn fcm_body_wraps_payload_with_token() {
        let payload = Payload::alert("t", "b", None, DataMap::new()).unwrap();
        let body = serde_json::to_value(FcmRequest {
            message: FcmMessage { token: "abc123", payload: &payload },
        })
        .unwrap();

        assert_eq!(body["message"]["token"], "abc123");
        assert_eq!(body["message"]["notification"]["title"], "t");
        assert_eq!(body["message"]["android"]["priority"], "HIGH");
    }

    #[tokio::test]
    async fn send_each_keeps_token_order() {
        let push = DryRunPush::rejecting(["t2"]);
        let payload = Payload::silent(DataMap::new());
        let tokens = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];

        let results = push.send_each(&tokens, &payload).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DeliveryError::Rejected { status: 404, .. })));
        assert!(results[2].is_ok());
        assert_eq!(push.delivered().len(), 2);
    }
}
