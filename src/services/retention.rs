//! Retention sweep for delivery history.
//!
//! Deletes domain notifications whose `timestamp` is older than the cutoff and
//! push queue items that were `sent` before it. A record stamped exactly at the
//! cutoff is kept. Deletes run in batches; the first failed batch stops the
//! run and the next run starts over from scratch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use super::metrics::RETENTION_DELETIONS_COUNTER;
use crate::store::{DataSource, StoreError};

pub const BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
#[error("retention sweep stopped in {collection}: {source}")]
pub struct RetentionError {
    pub collection: &'static str,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub cutoff: DateTime<Utc>,
    pub notifications_deleted: u64,
    pub queue_items_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetentionReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum Collection {
    Notifications,
    PushQueue,
}

impl Collection {
    fn name(self) -> &'static str {
        match self {
            Collection::Notifications => "notifications",
            Collection::PushQueue => "fcm_queue",
        }
    }
}

pub struct RetentionSweep;

impl RetentionSweep {
    pub async fn run(store: &dyn DataSource, retention_days: i64) -> RetentionReport {
        Self::run_at(store, Utc::now(), retention_days).await
    }

    pub async fn run_at(store: &dyn DataSource, now: DateTime<Utc>, retention_days: i64) -> RetentionReport {
        let cutoff = now - Duration::days(retention_days);
        let mut report = RetentionReport {
            cutoff,
            notifications_deleted: 0,
            queue_items_deleted: 0,
            error: None,
        };

        for collection in [Collection::Notifications, Collection::PushQueue] {
            let result = Self::sweep(store, collection, cutoff).await;
            let deleted = match &result {
                Ok(n) => *n,
                Err((n, _)) => *n,
            };
            match collection {
                Collection::Notifications => report.notifications_deleted = deleted,
                Collection::PushQueue => report.queue_items_deleted = deleted,
            }
            if let Err((_, e)) = result {
                error!("{e}");
                report.error = Some(e.to_string());
                break;
            }
        }

        info!(
            "Retention sweep (cutoff {}): {} notifications, {} queue items deleted",
            cutoff, report.notifications_deleted, report.queue_items_deleted
        );
        report
    }

    /// Deletes expired documents of one collection. On failure, returns the
    /// count deleted before the failing batch.
    async fn sweep(
        store: &dyn DataSource,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, (u64, RetentionError)> {
        let fail = |deleted: u64, source: StoreError| {
            (
                deleted,
                RetentionError {
                    collection: collection.name(),
                    source,
                },
            )
        };

        let mut deleted = 0u64;
        loop {
            let ids = match collection {
                Collection::Notifications => store.expired_notification_ids(cutoff, BATCH_SIZE).await,
                Collection::PushQueue => store.expired_push_item_ids(cutoff, BATCH_SIZE).await,
            }
            .map_err(|e| fail(deleted, e))?;
            if ids.is_empty() {
                return Ok(deleted);
            }

            let removed = match collection {
                Collection::Notifications => store.delete_notifications(&ids).await,
                Collection::PushQueue => store.delete_push_items(&ids).await,
            }
            .map_err(|e| fail(deleted, e))?;

            deleted += removed;
            RETENTION_DELETIONS_COUNTER
                .with_label_values(&[collection.name()])
                .inc_by(removed as f64);

            if ids.len() < BATCH_SIZE || removed == 0 {
                return Ok(deleted);
            }
        }
    }

    /// Runs the sweep on a fixed interval, first run one interval after start.
    pub fn start(store: Arc<dyn DataSource>, retention_days: i64, interval_hours: u64) {
        tokio::spawn(async move {
            let period = tokio::time::Duration::from_secs(interval_hours.max(1) * 3600);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                Self::run(store.as_ref(), retention_days).await;
            }
        });
    }
}
