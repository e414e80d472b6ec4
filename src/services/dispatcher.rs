use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::metrics::PUSH_SENDS_COUNTER;
use super::payload::{require_tokens, Payload, ValidationError};
use super::push::{DeliveryError, PushProvider};
use crate::error::AppError;
use crate::models::notification::{AuditRecord, DataMap, DeliveryOutcome, TokenResult};
use crate::store::DataSource;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(e) => e.into(),
            DispatchError::Delivery(e) => AppError::Delivery(e),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MulticastReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    pub responses: Vec<TokenResult>,
}

/// Keeps at most 20 characters, and never more than half the token, so short
/// tokens are not stored whole.
pub fn redact_token(token: &str) -> String {
    let len = token.chars().count();
    let keep = (len / 2).min(20);
    let prefix: String = token.chars().take(keep).collect();
    format!("{prefix}...")
}

/// Sends pushes through the configured provider and records a delivery audit
/// trail. Audit writes are best-effort: a failed write is logged and never
/// changes the send outcome.
pub struct Dispatcher {
    provider: Arc<dyn PushProvider>,
    store: Arc<dyn DataSource>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn PushProvider>, store: Arc<dyn DataSource>) -> Self {
        Self { provider, store }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// No retry; a provider rejection is returned to the caller.
    pub async fn send_single(
        &self,
        token: &str,
        payload: &Payload,
        actor: &str,
    ) -> Result<String, DispatchError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ValidationError::MissingField("deviceToken").into());
        }

        let result = self.provider.send(token, payload).await;
        let now = Utc::now();
        let redacted = redact_token(token);

        let outcome = match &result {
            Ok(message_id) => {
                PUSH_SENDS_COUNTER.with_label_values(&["single", "sent"]).inc();
                info!("Push sent to {redacted}: {message_id}");
                DeliveryOutcome::Sent { message_id: message_id.clone() }
            }
            Err(e) => {
                PUSH_SENDS_COUNTER.with_label_values(&["single", "failed"]).inc();
                warn!("Push to {redacted} failed: {e}");
                DeliveryOutcome::Failed { error: e.to_string() }
            }
        };

        self.audit(AuditRecord::Delivery {
            device_token: redacted.clone(),
            title: payload.title().map(str::to_string),
            body: payload.body().map(str::to_string),
            notification_type: payload.kind().to_string(),
            data: caller_data(payload),
            outcome,
            sent_by: actor.to_string(),
            timestamp: now,
        })
        .await;

        if let Err(e) = &result {
            self.audit(AuditRecord::Error {
                error: e.to_string(),
                device_token: redacted,
                title: payload.title().map(str::to_string),
                body: payload.body().map(str::to_string),
                sent_by: actor.to_string(),
                timestamp: now,
            })
            .await;
        }

        Ok(result?)
    }

    /// Per-token failures are reported, never fatal.
    pub async fn send_multicast(
        &self,
        tokens: &[String],
        payload: &Payload,
        actor: &str,
    ) -> Result<MulticastReport, DispatchError> {
        require_tokens(tokens)?;

        let results = self.provider.send_each(tokens, payload).await;
        let responses: Vec<TokenResult> = results
            .into_iter()
            .map(|r| match r {
                Ok(message_id) => TokenResult {
                    success: true,
                    message_id: Some(message_id),
                    error: None,
                },
                Err(e) => TokenResult {
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let success_count = responses.iter().filter(|r| r.success).count();
        let failure_count = responses.len() - success_count;
        PUSH_SENDS_COUNTER
            .with_label_values(&["multicast", "sent"])
            .inc_by(success_count as f64);
        PUSH_SENDS_COUNTER
            .with_label_values(&["multicast", "failed"])
            .inc_by(failure_count as f64);
        info!(
            "Multicast push: {success_count} sent, {failure_count} failed of {}",
            tokens.len()
        );

        self.audit(AuditRecord::Batch {
            device_token_count: tokens.len(),
            title: payload.title().map(str::to_string),
            body: payload.body().map(str::to_string),
            notification_type: payload.kind().to_string(),
            data: caller_data(payload),
            success_count,
            failure_count,
            responses: responses.clone(),
            sent_by: actor.to_string(),
            timestamp: Utc::now(),
        })
        .await;

        Ok(MulticastReport {
            success_count,
            failure_count,
            total_count: tokens.len(),
            responses,
        })
    }

    async fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.store.append_audit(&record).await {
            warn!("Could not write {} audit record: {e}", record.collection());
        }
    }
}

/// Payload data without the builder-owned keys.
fn caller_data(payload: &Payload) -> DataMap {
    payload
        .data
        .iter()
        .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "timestamp")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
