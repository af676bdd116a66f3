//! # Settlement Repository
//!
//! Applies a provider-confirmed payment to its order, exactly once.
//!
//! ## settle(payment_id)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. UPDATE payments SET status='completed'                             │
//! │        WHERE id=? AND status != 'completed'                             │
//! │        0 rows ─► AlreadySettled (replay: webhook + poll + sync path)   │
//! │                                                                         │
//! │   2. UPDATE orders SET payment_status='paid', payment_id=?, paid_at=?  │
//! │        WHERE id=? AND payment_status IN ('pending','failed')           │
//! │        0 rows ─► flag duplicate_payment, COMMIT ─► DuplicatePayment    │
//! │                                                                         │
//! │   3. unless stock_committed: sell every line                            │
//! │        token = "{payment_id}:{item_id}"                                 │
//! │        InsufficientStock ─► ROLLBACK, then in a new transaction:       │
//! │             payment → completed, flag stock_depleted ─► StockException │
//! │                                                                         │
//! │   4. stock_committed = 1                                                │
//! │   5. INSERT payment_confirmation into the outbox                        │
//! │  COMMIT ─► Settled                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The idempotency key is the payment id: step 1 is the only way in, and it
//! succeeds once per payment.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use storefront_core::ledger::MutationToken;
use storefront_core::reconciliation::{
    settlement_decrements_stock, PaymentConfirmation, SettlementOutcome, PAYMENT_CONFIRMATION,
};
use storefront_core::{CoreError, ExceptionKind, Payment};

use super::exception::flag_in_tx;
use super::order::{fetch_in_tx as fetch_order_in_tx, items_in_tx};
use super::outbox::enqueue_in_tx;
use super::product::sell_in_tx;
use crate::error::{DbError, DbResult};

/// Repository owning the payment → order settlement transaction.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Settles the order of a completed payment. Safe to call repeatedly.
    ///
    /// ## Returns
    /// * `Settled` - first completion of this payment
    /// * `AlreadySettled` - replay, nothing changed
    /// * `DuplicatePayment` - the order was already paid by another payment
    /// * `StockException` - payment recorded, order left unpaid and flagged
    /// * `Err(NotFound)` - unknown payment
    pub async fn settle(&self, payment_id: &str) -> DbResult<SettlementOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let claimed = complete_payment(&mut tx, payment_id).await?;
        let payment = fetch_payment(&mut tx, payment_id).await?;
        if !claimed {
            warn!(
                payment_id = %payment_id,
                order_id = %payment.order_id,
                "Payment already settled, ignoring replay"
            );
            return Ok(SettlementOutcome::AlreadySettled {
                order_id: payment.order_id,
            });
        }

        let order_claimed = sqlx::query(
            r#"
            UPDATE orders SET
                payment_status = 'paid',
                payment_id = ?1,
                paid_at = ?2,
                updated_at = ?2
            WHERE id = ?3 AND payment_status IN ('pending', 'failed')
            "#,
        )
        .bind(payment_id)
        .bind(now)
        .bind(&payment.order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let order = fetch_order_in_tx(&mut tx, &payment.order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &payment.order_id))?;

        if !order_claimed {
            let detail = format!(
                "order is {} (settled by payment {}); refund payment {}",
                order.payment_status,
                order.payment_id.as_deref().unwrap_or("none"),
                payment_id
            );
            flag_in_tx(
                &mut tx,
                &order.id,
                payment_id,
                ExceptionKind::DuplicatePayment,
                &detail,
            )
            .await?;
            tx.commit().await?;
            return Ok(SettlementOutcome::DuplicatePayment { order_id: order.id });
        }

        let decrement = settlement_decrements_stock(&order);
        if decrement {
            let items = items_in_tx(&mut tx, &order.id).await?;
            for item in &items {
                let token = MutationToken::settlement(payment_id, &item.id);
                match sell_in_tx(&mut tx, &item.product_id, item.quantity, &token).await {
                    Ok(_) => {}
                    Err(DbError::Domain(CoreError::InsufficientStock { sku, available, requested })) => {
                        tx.rollback().await?;
                        let detail = format!(
                            "{} short at settlement: available {}, requested {}",
                            sku, available, requested
                        );
                        return self
                            .record_stock_exception(&payment, &item.product_id, &detail)
                            .await;
                    }
                    Err(err) => return Err(err),
                }
            }

            sqlx::query("UPDATE orders SET stock_committed = 1 WHERE id = ?1")
                .bind(&order.id)
                .execute(&mut *tx)
                .await?;
        }

        let payload = serde_json::to_string(&PaymentConfirmation::new(&order, &payment))?;
        enqueue_in_tx(&mut tx, PAYMENT_CONFIRMATION, &order.id, payment_id, &payload).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            order_id = %order.id,
            order_number = %order.order_number,
            stock_decremented = decrement,
            "Order settled"
        );

        Ok(SettlementOutcome::Settled {
            order_id: order.id,
            stock_decremented: decrement,
        })
    }

    /// Records a provider-reported failure.
    ///
    /// Only a `processing` payment can fail; the order moves `pending → failed`
    /// and stays open for a new attempt. Returns false when nothing changed.
    pub async fn fail(&self, payment_id: &str, reason: &str) -> DbResult<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let failed = sqlx::query(
            r#"
            UPDATE payments SET status = 'failed', failure_reason = ?1, updated_at = ?2
            WHERE id = ?3 AND status = 'processing'
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !failed {
            // Make sure the caller learns about unknown ids.
            fetch_payment(&mut tx, payment_id).await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE orders SET payment_status = 'failed', updated_at = ?1
            WHERE id = (SELECT order_id FROM payments WHERE id = ?2)
              AND payment_status = 'pending'
            "#,
        )
        .bind(now)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(payment_id = %payment_id, reason = %reason, "Payment failed");
        Ok(true)
    }

    /// Money was taken but the order cannot be fulfilled.
    async fn record_stock_exception(
        &self,
        payment: &Payment,
        product_id: &str,
        detail: &str,
    ) -> DbResult<SettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        if !complete_payment(&mut tx, &payment.id).await? {
            // A concurrent settlement got there first.
            return Ok(SettlementOutcome::AlreadySettled {
                order_id: payment.order_id.clone(),
            });
        }

        flag_in_tx(
            &mut tx,
            &payment.order_id,
            &payment.id,
            ExceptionKind::StockDepleted,
            detail,
        )
        .await?;
        tx.commit().await?;

        Ok(SettlementOutcome::StockException {
            order_id: payment.order_id.clone(),
            product_id: product_id.to_string(),
        })
    }
}

/// The single-writer guard: true only for the first completion.
async fn complete_payment(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE payments SET
            status = 'completed',
            failure_reason = NULL,
            completed_at = ?1,
            updated_at = ?1
        WHERE id = ?2 AND status != 'completed'
        "#,
    )
    .bind(now)
    .bind(payment_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn fetch_payment(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", payment_id))
}

// =============================================================================
// Unit Tests
// =============================================================================
