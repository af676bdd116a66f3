//! # Notification Dispatch
//!
//! Drains the notification outbox written by the settlement transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  notification_outbox (sent_at IS NULL, attempts < 10,                  │
//! │                       oldest first, 50 per pass)                       │
//! │        │                                                                │
//! │  entries at 10 attempts stay in the table, counted as skipped          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Notifier::send ──► ok  ──► mark_sent                                  │
//! │                 └─► err ──► mark_failed (attempts += 1, last_error)    │
//! │                                                                         │
//! │  Orders and payments are never touched here: a lost email cannot      │
//! │  un-pay an order.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use storefront_core::NotificationOutboxEntry;
use storefront_db::{Database, DbResult};

use crate::config::AppConfig;
use crate::providers::HTTP_TIMEOUT;

/// Maximum delivery attempts before an entry is skipped.
pub const MAX_DELIVERY_ATTEMPTS: i64 = 10;

/// Entries handled per dispatch pass.
pub const DISPATCH_BATCH_SIZE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification endpoint answered {0}")]
    Status(u16),
}

/// Delivers one outbox entry to the customer-facing channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, entry: &NotificationOutboxEntry) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, entry: &NotificationOutboxEntry) -> Result<(), NotifyError> {
        info!(
            kind = %entry.kind,
            order_id = %entry.order_id,
            payment_id = %entry.payment_id,
            payload = %entry.payload,
            "Notification"
        );
        Ok(())
    }
}

/// POSTs notifications as JSON to a mailer/webhook endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(HttpNotifier {
            client: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, entry: &NotificationOutboxEntry) -> Result<(), NotifyError> {
        let payload: Value =
            serde_json::from_str(&entry.payload).unwrap_or_else(|_| Value::String(entry.payload.clone()));

        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "id": entry.id,
                "kind": entry.kind,
                "order_id": entry.order_id,
                "payment_id": entry.payment_id,
                "payload": payload,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Picks the notifier for this deployment.
pub fn notifier_from_config(config: &AppConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    Ok(match &config.notification_webhook_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    })
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Sends pending outbox entries through a [`Notifier`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        NotificationDispatcher { db, notifier }
    }

    /// One pass over the outbox.
    pub async fn dispatch_pending(&self) -> DbResult<DispatchReport> {
        let outbox = self.db.notifications();
        let deliverable = outbox
            .get_pending(MAX_DELIVERY_ATTEMPTS, DISPATCH_BATCH_SIZE)
            .await?;
        let skipped = outbox.count_dead_lettered(MAX_DELIVERY_ATTEMPTS).await?;

        if skipped > 0 {
            warn!(
                count = skipped,
                max_attempts = MAX_DELIVERY_ATTEMPTS,
                "Notifications past max delivery attempts need manual attention"
            );
        }

        let mut report = DispatchReport {
            skipped: usize::try_from(skipped).unwrap_or_default(),
            ..Default::default()
        };

        for entry in deliverable {
            match self.notifier.send(&entry).await {
                Ok(()) => {
                    outbox.mark_sent(&entry.id).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    error!(id = %entry.id, error = %e, attempts = entry.attempts + 1, "Notification delivery failed");
                    outbox.mark_failed(&entry.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
