//! # Notification Outbox Repository
//!
//! Customer notifications queued by the settlement transaction.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SETTLEMENT (single transaction)                                       │
//! │    1. payment → completed                                              │
//! │    2. order   → paid, stock decremented                                │
//! │    3. INSERT INTO notification_outbox ('payment_confirmation', ...)    │
//! │  COMMIT ← the row exists iff the order was settled                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DISPATCHER (background, best effort)                                  │
//! │    SELECT ... WHERE sent_at IS NULL AND attempts < max                 │
//! │    send ──► ok:  sent_at = now                                         │
//! │         └─► err: attempts += 1, last_error = ?                         │
//! │                                                                         │
//! │  A failed send never touches order or payment state.                   │
//! │  UNIQUE (kind, payment_id) keeps one confirmation per payment.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use storefront_core::NotificationOutboxEntry;

use super::generate_id;
use crate::error::DbResult;

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct NotificationOutboxRepository {
    pool: SqlitePool,
}

impl NotificationOutboxRepository {
    /// Creates a new NotificationOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationOutboxRepository { pool }
    }

    /// Unsent entries with fewer than `max_attempts` failures, oldest first.
    pub async fn get_pending(
        &self,
        max_attempts: i64,
        limit: u32,
    ) -> DbResult<Vec<NotificationOutboxEntry>> {
        let entries = sqlx::query_as::<_, NotificationOutboxEntry>(
            r#"
            SELECT * FROM notification_outbox
            WHERE sent_at IS NULL AND attempts < ?1
            ORDER BY created_at ASC
            LIMIT ?2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Counts unsent entries that have given up after `max_attempts` failures.
    pub async fn count_dead_lettered(&self, max_attempts: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox WHERE sent_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Entries queued for one payment.
    pub async fn get_for_payment(&self, payment_id: &str) -> DbResult<Vec<NotificationOutboxEntry>> {
        let entries = sqlx::query_as::<_, NotificationOutboxEntry>(
            "SELECT * FROM notification_outbox WHERE payment_id = ?1 ORDER BY created_at",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as delivered.
    pub async fn mark_sent(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                sent_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed delivery attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts unsent entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE sent_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Queues a notification inside the caller's transaction.
///
/// Returns false when an entry of this kind already exists for the payment.
pub(crate) async fn enqueue_in_tx(
    conn: &mut SqliteConnection,
    kind: &str,
    order_id: &str,
    payment_id: &str,
    payload: &str,
) -> DbResult<bool> {
    debug!(kind = %kind, order_id = %order_id, payment_id = %payment_id, "Queuing notification");

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO notification_outbox (
            id, kind, order_id, payment_id, payload, attempts, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
    )
    .bind(generate_id())
    .bind(kind)
    .bind(order_id)
    .bind(payment_id)
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
