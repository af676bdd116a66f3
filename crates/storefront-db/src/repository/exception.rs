//! # Reconciliation Exception Repository
//!
//! Orders that need a human: money was taken but stock ran out, or a second
//! payment completed for an order that was already paid. Rows are unique
//! per (payment, kind), so replayed settlements never pile up duplicates.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use storefront_core::{ExceptionKind, ReconciliationException};

use super::generate_id;
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct ExceptionRepository {
    pool: SqlitePool,
}

impl ExceptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExceptionRepository { pool }
    }

    /// Unresolved exceptions, oldest first.
    pub async fn list_open(&self, limit: u32) -> DbResult<Vec<ReconciliationException>> {
        let rows = sqlx::query_as::<_, ReconciliationException>(
            r#"
            SELECT * FROM reconciliation_exceptions
            WHERE resolved = 0
            ORDER BY created_at
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<ReconciliationException>> {
        let rows = sqlx::query_as::<_, ReconciliationException>(
            "SELECT * FROM reconciliation_exceptions WHERE order_id = ?1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Marks an exception as handled (refund issued, stock found, ...).
    pub async fn resolve(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE reconciliation_exceptions SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Open reconciliation exception", id));
        }

        info!(exception_id = %id, "Reconciliation exception resolved");
        Ok(())
    }
}

/// Flags an order inside the caller's transaction. Idempotent per (payment, kind).
pub(crate) async fn flag_in_tx(
    conn: &mut SqliteConnection,
    order_id: &str,
    payment_id: &str,
    kind: ExceptionKind,
    detail: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO reconciliation_exceptions (
            id, order_id, payment_id, kind, detail, resolved, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
    )
    .bind(generate_id())
    .bind(order_id)
    .bind(payment_id)
    .bind(kind)
    .bind(detail)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        warn!(
            order_id = %order_id,
            payment_id = %payment_id,
            kind = kind.as_str(),
            detail = %detail,
            "Order flagged for manual intervention"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::payment::tests::{attempt, order_with_stock};
    use crate::repository::test_support::test_db;
    use storefront_core::PaymentMethod;

    #[tokio::test]
    async fn test_flag_list_and_resolve() {
        let db = test_db().await;
        let (order, _) = order_with_stock(&db, 5, 1).await;
        let payment = attempt(&order, PaymentMethod::Card, Some("pi_1"));
        db.payments().insert(&payment).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        for _ in 0..2 {
            flag_in_tx(&mut conn, &order.id, &payment.id, ExceptionKind::DuplicatePayment, "refund")
                .await
                .unwrap();
        }
        drop(conn);

        let repo = db.exceptions();
        let open = repo.list_open(10).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, ExceptionKind::DuplicatePayment);

        repo.resolve(&open[0].id).await.unwrap();
        assert!(repo.list_open(10).await.unwrap().is_empty());
        assert!(repo.list_for_order(&order.id).await.unwrap()[0].resolved);

        let err = repo.resolve(&open[0].id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
