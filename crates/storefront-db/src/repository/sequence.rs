//! # Sequence Repository
//!
//! Atomic per-day counters behind `ORD-YYYYMMDD-NNNN` order numbers.
//!
//! ```text
//! INSERT INTO order_sequences (day, last_value) VALUES ('20260131', 1)
//! ON CONFLICT (day) DO UPDATE SET last_value = last_value + 1
//! RETURNING last_value
//! ```
//!
//! One statement reads and bumps the counter, so two checkouts on the same
//! day can never be handed the same value.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Takes the next value of `day`'s counter, starting at 1.
    pub async fn next_value(&self, day: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        next_value_in_tx(&mut conn, day).await
    }

    /// Last value handed out for `day`, if any.
    pub async fn current_value(&self, day: &str) -> DbResult<Option<i64>> {
        let value = sqlx::query_scalar("SELECT last_value FROM order_sequences WHERE day = ?1")
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

/// Bumps the counter through the caller's connection (usually inside the
/// order-creation transaction, as its first write).
pub(crate) async fn next_value_in_tx(conn: &mut SqliteConnection, day: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_sequences (day, last_value) VALUES (?1, 1)
        ON CONFLICT (day) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::test_db;

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_increments() {
        let db = test_db().await;
        let seq = db.sequences();

        assert_eq!(seq.current_value("20260131").await.unwrap(), None);
        assert_eq!(seq.next_value("20260131").await.unwrap(), 1);
        assert_eq!(seq.next_value("20260131").await.unwrap(), 2);
        assert_eq!(seq.current_value("20260131").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_sequences_are_per_day() {
        let db = test_db().await;
        let seq = db.sequences();

        seq.next_value("20260131").await.unwrap();
        seq.next_value("20260131").await.unwrap();
        assert_eq!(seq.next_value("20260201").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_distinct_values() {
        let db = test_db().await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let seq = db.sequences();
            handles.push(tokio::spawn(async move { seq.next_value("20260131").await }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }
        values.sort_unstable();

        assert_eq!(values, (1..=20).collect::<Vec<i64>>());
    }
}
