//! # Payment Repository
//!
//! Every payment attempt is recorded, including attempts the provider
//! rejected. Status changes that have side effects (completion, failure)
//! go through [`SettlementRepository`](super::settlement::SettlementRepository);
//! this repository only records and looks up attempts.
//!
//! Provider references are unique per method, so a webhook can always be
//! routed to exactly one attempt.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use storefront_core::{Payment, PaymentBucket, PaymentMethod, PaymentStats, PaymentStatus};

use crate::error::{DbError, DbResult};

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Records a payment attempt.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - another attempt already owns the provider reference
    pub async fn insert(&self, payment: &Payment) -> DbResult<()> {
        debug!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            method = %payment.method,
            status = %payment.status,
            "Recording payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, method, provider_ref, status,
                amount_cents, currency, card_holder, mobile_number, network,
                failure_reason, created_at, updated_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14
            )
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.method)
        .bind(&payment.provider_ref)
        .bind(payment.status)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(&payment.card_holder)
        .bind(&payment.mobile_number)
        .bind(payment.network)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("payments.provider_ref") => DbError::duplicate(
                "provider_ref",
                payment.provider_ref.clone().unwrap_or_default(),
            ),
            err => err,
        })?;

        Ok(())
    }

    /// Stores the provider reference returned by `charge`.
    ///
    /// Only fills an empty reference; an attempt never changes provider.
    pub async fn attach_provider_ref(&self, payment_id: &str, provider_ref: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET provider_ref = ?1, updated_at = ?2
            WHERE id = ?3 AND (provider_ref IS NULL OR provider_ref = ?1)
            "#,
        )
        .bind(provider_ref)
        .bind(Utc::now())
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("payments.provider_ref") => {
                DbError::duplicate("provider_ref", provider_ref)
            }
            err => err,
        })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment", payment_id));
        }
        Ok(())
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    /// Looks up the attempt a provider event refers to.
    pub async fn find_by_provider_ref(
        &self,
        method: PaymentMethod,
        provider_ref: &str,
    ) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE method = ?1 AND provider_ref = ?2",
        )
        .bind(method)
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    /// All attempts for an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = ?1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Attempts of `method` still `processing` that were created before `cutoff`.
    pub async fn list_processing_older_than(
        &self,
        method: PaymentMethod,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status = 'processing' AND method = ?1 AND created_at < ?2
            ORDER BY created_at
            LIMIT ?3
            "#,
        )
        .bind(method)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Counts and amounts grouped by method and status.
    pub async fn stats(&self) -> DbResult<PaymentStats> {
        let rows: Vec<(PaymentMethod, PaymentStatus, i64, i64)> = sqlx::query_as(
            r#"
            SELECT method, status, COUNT(*), COALESCE(SUM(amount_cents), 0)
            FROM payments
            GROUP BY method, status
            ORDER BY method, status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = PaymentStats::default();
        for (method, status, count, amount_cents) in rows {
            stats.total_payments += count;
            if status == PaymentStatus::Completed {
                stats.completed_amount_cents += amount_cents;
            }
            stats.buckets.push(PaymentBucket {
                method,
                status,
                count,
                amount_cents,
            });
        }
        Ok(stats)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::repository::test_support::{order_request, product, test_db};
    use crate::Database;
    use chrono::Duration;
    use storefront_core::{InventoryPolicy, MobileNetwork, Order};

    pub(crate) fn attempt(order: &Order, method: PaymentMethod, provider_ref: Option<&str>) -> Payment {
        let now = Utc::now();
        Payment {
            id: generate_id(),
            order_id: order.id.clone(),
            method,
            provider_ref: provider_ref.map(str::to_string),
            status: PaymentStatus::Processing,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            card_holder: None,
            mobile_number: None,
            network: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub(crate) async fn order_with_stock(db: &Database, stock: i64, qty: i64) -> (Order, String) {
        let p = product(db, "TEE", 1000, stock).await;
        let details = db
            .orders()
            .create(&order_request(&[(p.id.as_str(), qty)]), InventoryPolicy::OnPayment)
            .await
            .unwrap();
        (details.order, p.id)
    }

    #[tokio::test]
    async fn test_insert_and_find_by_provider_ref() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;

        let mut payment = attempt(&order, PaymentMethod::MobileMoney, Some("ref-1"));
        payment.mobile_number = Some("0781234567".to_string());
        payment.network = Some(MobileNetwork::Mtn);
        db.payments().insert(&payment).await.unwrap();

        let found = db
            .payments()
            .find_by_provider_ref(PaymentMethod::MobileMoney, "ref-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, payment);

        // References are scoped by method.
        assert!(db
            .payments()
            .find_by_provider_ref(PaymentMethod::Card, "ref-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_provider_ref_is_unique_per_method() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;

        db.payments()
            .insert(&attempt(&order, PaymentMethod::Card, Some("pi_1")))
            .await
            .unwrap();
        let err = db
            .payments()
            .insert(&attempt(&order, PaymentMethod::Card, Some("pi_1")))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // Attempts without a reference never collide.
        db.payments().insert(&attempt(&order, PaymentMethod::Card, None)).await.unwrap();
        db.payments().insert(&attempt(&order, PaymentMethod::Card, None)).await.unwrap();
        assert_eq!(db.payments().list_for_order(&order.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_attach_provider_ref_once() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;
        let payment = attempt(&order, PaymentMethod::Card, None);
        db.payments().insert(&payment).await.unwrap();

        db.payments().attach_provider_ref(&payment.id, "pi_9").await.unwrap();
        db.payments().attach_provider_ref(&payment.id, "pi_9").await.unwrap();
        let err = db.payments().attach_provider_ref(&payment.id, "pi_other").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let found = db.payments().get_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(found.provider_ref.as_deref(), Some("pi_9"));
    }

    #[tokio::test]
    async fn test_list_processing_older_than() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;

        let mut stale = attempt(&order, PaymentMethod::MobileMoney, Some("old"));
        stale.created_at = Utc::now() - Duration::minutes(30);
        db.payments().insert(&stale).await.unwrap();
        db.payments()
            .insert(&attempt(&order, PaymentMethod::MobileMoney, Some("fresh")))
            .await
            .unwrap();
        let mut stale_card = attempt(&order, PaymentMethod::Card, Some("pi_old"));
        stale_card.created_at = Utc::now() - Duration::minutes(30);
        db.payments().insert(&stale_card).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(10);
        let found = db
            .payments()
            .list_processing_older_than(PaymentMethod::MobileMoney, cutoff, 50)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }

    #[tokio::test]
    async fn test_stats_group_by_method_and_status() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;

        let mut failed = attempt(&order, PaymentMethod::Card, Some("pi_f"));
        failed.status = PaymentStatus::Failed;
        failed.failure_reason = Some("card_declined".to_string());
        db.payments().insert(&failed).await.unwrap();
        let mut done = attempt(&order, PaymentMethod::Card, Some("pi_ok"));
        done.status = PaymentStatus::Completed;
        db.payments().insert(&done).await.unwrap();

        let stats = db.payments().stats().await.unwrap();
        assert_eq!(stats.total_payments, 2);
        assert_eq!(stats.completed_amount_cents, order.total_cents);
        assert_eq!(stats.buckets.len(), 2);
    }
}
