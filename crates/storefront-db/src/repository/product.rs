//! # Product Repository
//!
//! Catalog rows and the per-product inventory ledger.
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How a sell is applied                                │
//! │                                                                         │
//! │  ❌ WRONG: read stock, check in Rust, write the new value              │
//! │     two requests both read 5, both write 2 → 6 units sold from 5       │
//! │                                                                         │
//! │  ✅ CORRECT: one guarded statement                                     │
//! │     UPDATE products                                                    │
//! │        SET stock = stock - ?q, stock_out = stock_out + ?q              │
//! │      WHERE id = ?id AND stock >= ?q                                    │
//! │                                                                         │
//! │  0 rows affected → the product is missing or stock is short.          │
//! │  The first statement of the transaction records the mutation token,   │
//! │  so a replayed request fails on the UNIQUE index and changes nothing. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use storefront_core::ledger::MutationToken;
use storefront_core::validation::{validate_new_product, validate_token};
use storefront_core::{
    CoreError, InventoryMovement, InventoryStats, MovementKind, NewProduct, Product,
    DEFAULT_LOW_STOCK_THRESHOLD,
};

use super::generate_id;
use crate::error::{DbError, DbResult};

/// Repository for product and inventory operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.get_by_sku("TSHIRT-M").await?;
/// repo.sell(&product.id, 2, &MutationToken::new("adj-17")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Adds a product to the catalog.
    ///
    /// The SKU is normalized to uppercase. Opening stock is booked as
    /// received, so `stock = stock_in - stock_out` holds from the start.
    ///
    /// ## Returns
    /// * `Err(DbError::Domain)` - validation failed
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, new: &NewProduct) -> DbResult<Product> {
        let sku = validate_new_product(new).map_err(CoreError::from)?;
        let now = Utc::now();

        let product = Product {
            id: generate_id(),
            sku,
            name: new.name.trim().to_string(),
            description: new.description.clone(),
            price_cents: new.price_cents,
            stock: new.initial_stock,
            stock_in: new.initial_stock,
            stock_out: 0,
            low_stock_threshold: new.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            is_active: true,
            is_featured: new.is_featured,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, price_cents,
                stock, stock_in, stock_out, low_stock_threshold,
                is_active, is_featured, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.stock_in)
        .bind(product.stock_out)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("products.sku") => {
                DbError::duplicate("sku", &product.sku)
            }
            err => err,
        })?;

        Ok(product)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU (case-insensitive input, stored uppercase).
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ?1")
            .bind(sku.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Removes `quantity` units, once per `token`.
    ///
    /// ## Returns
    /// * `Ok(Product)` - counters after the sell
    /// * `Err(Domain(InsufficientStock))` - stock unchanged
    /// * `Err(Domain(InvalidQuantity))` - quantity <= 0
    /// * `Err(DuplicateMutation)` - the token was already applied
    /// * `Err(NotFound)` - no such product
    pub async fn sell(
        &self,
        product_id: &str,
        quantity: i64,
        token: &MutationToken,
    ) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let product = sell_in_tx(&mut tx, product_id, quantity, token).await?;
        tx.commit().await?;

        info!(
            product_id = %product_id,
            quantity,
            stock = product.stock,
            "Stock sold"
        );
        Ok(product)
    }

    /// Adds `quantity` received units, once per `token`.
    pub async fn restock(
        &self,
        product_id: &str,
        quantity: i64,
        token: &MutationToken,
    ) -> DbResult<Product> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity { quantity }.into());
        }

        let mut tx = self.pool.begin().await?;
        record_movement(&mut tx, product_id, MovementKind::Restock, quantity, token).await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                stock = stock + ?1,
                stock_in = stock_in + ?1,
                updated_at = ?2
            WHERE id = ?3
            RETURNING *
            "#,
        )
        .bind(quantity)
        .bind(Utc::now())
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))?;

        tx.commit().await?;

        info!(product_id = %product_id, quantity, stock = product.stock, "Stock received");
        Ok(product)
    }

    /// The movement recorded under `token`, if any.
    pub async fn get_movement(&self, token: &str) -> DbResult<Option<InventoryMovement>> {
        let movement = sqlx::query_as::<_, InventoryMovement>(
            "SELECT * FROM inventory_movements WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movement)
    }

    /// Soft-deletes a product. Orders keep referencing it.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Catalog-wide inventory figures over active products.
    pub async fn inventory_stats(&self) -> DbResult<InventoryStats> {
        let (
            total_products,
            total_units_in_stock,
            total_units_sold,
            stock_value_cents,
            low_stock_count,
            out_of_stock_count,
        ): (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(stock), 0),
                COALESCE(SUM(stock_out), 0),
                COALESCE(SUM(stock * price_cents), 0),
                COALESCE(SUM(CASE WHEN stock > 0 AND stock <= low_stock_threshold THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN stock = 0 THEN 1 ELSE 0 END), 0)
            FROM products
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(InventoryStats {
            total_products,
            total_units_in_stock,
            total_units_sold,
            stock_value_cents,
            low_stock_count,
            out_of_stock_count,
        })
    }
}

// =============================================================================
// Transaction Building Blocks
// =============================================================================

/// Applies a sell inside the caller's transaction.
///
/// The caller decides whether to commit. On error nothing in this call has
/// taken effect once the transaction is rolled back.
pub(crate) async fn sell_in_tx(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
    token: &MutationToken,
) -> DbResult<Product> {
    if quantity <= 0 {
        return Err(CoreError::InvalidQuantity { quantity }.into());
    }

    record_movement(conn, product_id, MovementKind::Sell, quantity, token).await?;

    let updated = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            stock = stock - ?1,
            stock_out = stock_out + ?1,
            updated_at = ?2
        WHERE id = ?3 AND stock >= ?1
        RETURNING *
        "#,
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(product) = updated {
        return Ok(product);
    }

    let current: Option<(String, i64)> =
        sqlx::query_as("SELECT sku, stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    match current {
        Some((sku, available)) => {
            debug!(product_id = %product_id, available, requested = quantity, "Sell rejected");
            Err(CoreError::InsufficientStock {
                sku,
                available,
                requested: quantity,
            }
            .into())
        }
        None => Err(DbError::not_found("Product", product_id)),
    }
}

/// Loads a product through the caller's connection.
pub(crate) async fn fetch_in_tx(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Records the idempotency token. Must be the first write of the mutation.
async fn record_movement(
    conn: &mut SqliteConnection,
    product_id: &str,
    kind: MovementKind,
    quantity: i64,
    token: &MutationToken,
) -> DbResult<()> {
    validate_token(token.as_str()).map_err(CoreError::from)?;

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (id, token, product_id, kind, quantity, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(generate_id())
    .bind(token.as_str())
    .bind(product_id)
    .bind(kind)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        err if err.is_unique_violation_on("inventory_movements.token") => {
            DbError::DuplicateMutation {
                token: token.to_string(),
            }
        }
        DbError::ForeignKeyViolation { .. } => DbError::not_found("Product", product_id),
        err => err,
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{file_db, product, test_db};

    #[tokio::test]
    async fn test_insert_normalizes_sku_and_balances_ledger() {
        let db = test_db().await;
        let created = product(&db, "tshirt-m", 1000, 5).await;

        assert_eq!(created.sku, "TSHIRT-M");
        assert_eq!(created.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        assert!(created.ledger().is_balanced());

        let found = db.products().get_by_sku("tshirt-m").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.stock_in, 5);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = test_db().await;
        product(&db, "MUG", 500, 1).await;

        let err = db
            .products()
            .insert(&NewProduct {
                sku: "mug".to_string(),
                name: "Another mug".to_string(),
                description: None,
                price_cents: 600,
                initial_stock: 0,
                low_stock_threshold: None,
                is_featured: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "sku"));
    }

    #[tokio::test]
    async fn test_sell_and_restock_update_counters() {
        let db = test_db().await;
        let p = product(&db, "CAP", 1500, 5).await;
        let repo = db.products();

        let after_sell = repo.sell(&p.id, 3, &MutationToken::new("sell-1")).await.unwrap();
        assert_eq!((after_sell.stock, after_sell.stock_in, after_sell.stock_out), (2, 5, 3));

        let after_restock = repo.restock(&p.id, 4, &MutationToken::new("restock-1")).await.unwrap();
        assert_eq!((after_restock.stock, after_restock.stock_in, after_restock.stock_out), (6, 9, 3));
        assert!(after_restock.ledger().is_balanced());
    }

    #[tokio::test]
    async fn test_sell_more_than_stock_leaves_stock_unchanged() {
        let db = test_db().await;
        let p = product(&db, "SOCKS", 300, 4).await;

        let err = db
            .products()
            .sell(&p.id, 10, &MutationToken::new("big-order"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 4, requested: 10, .. })
        ));
        let reloaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stock, 4);
        assert_eq!(reloaded.stock_out, 0);

        // The rejected attempt did not consume its token.
        db.products().restock(&p.id, 6, &MutationToken::new("restock")).await.unwrap();
        let sold = db.products().sell(&p.id, 10, &MutationToken::new("big-order")).await.unwrap();
        assert_eq!(sold.stock, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sells_never_oversell() {
        let (db, _dir) = file_db().await;
        let p = product(&db, "HOODIE", 4000, 5).await;

        let a_repo = db.products();
        let b_repo = db.products();
        let a_token = MutationToken::new("req-a");
        let b_token = MutationToken::new("req-b");
        let (a, b) = tokio::join!(
            a_repo.sell(&p.id, 3, &a_token),
            b_repo.sell(&p.id, 3, &b_token),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);

        let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(failure, DbError::Domain(CoreError::InsufficientStock { .. })));

        let reloaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stock, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_sells_stop_at_zero() {
        let (db, _dir) = file_db().await;
        let p = product(&db, "STICKER", 100, 7).await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = db.products();
            let id = p.id.clone();
            handles.push(tokio::spawn(async move {
                repo.sell(&id, 1, &MutationToken::new(format!("req-{}", i))).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DbError::Domain(CoreError::InsufficientStock { .. })) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(accepted, 7);
        let reloaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stock, 0);
        assert_eq!(reloaded.stock_out, 7);
        assert!(reloaded.ledger().is_balanced());
    }

    #[tokio::test]
    async fn test_replayed_token_is_rejected() {
        let db = test_db().await;
        let p = product(&db, "BAG", 2500, 10).await;
        let token = MutationToken::new("checkout-42");

        db.products().sell(&p.id, 2, &token).await.unwrap();
        let err = db.products().sell(&p.id, 2, &token).await.unwrap_err();

        assert!(matches!(err, DbError::DuplicateMutation { ref token } if token == "checkout-42"));
        let reloaded = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stock, 8);

        let movement = db.products().get_movement("checkout-42").await.unwrap().unwrap();
        assert_eq!(movement.product_id, p.id);
        assert_eq!(movement.kind, MovementKind::Sell);
        assert_eq!(movement.quantity, 2);
        assert!(db.products().get_movement("never-used").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restock_rejects_non_positive_quantity() {
        let db = test_db().await;
        let p = product(&db, "PIN", 100, 1).await;

        for qty in [0, -3] {
            let err = db
                .products()
                .restock(&p.id, qty, &MutationToken::new(format!("r{}", qty)))
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::Domain(CoreError::InvalidQuantity { .. })));
        }
    }

    #[tokio::test]
    async fn test_sell_unknown_product() {
        let db = test_db().await;
        let err = db
            .products()
            .sell("00000000-0000-0000-0000-000000000000", 1, &MutationToken::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_inventory_stats() {
        let db = test_db().await;
        product(&db, "A", 1000, 5).await; // low (threshold 10)
        product(&db, "B", 200, 50).await;
        let empty = product(&db, "C", 700, 0).await;
        let gone = product(&db, "D", 100, 3).await;
        db.products().soft_delete(&gone.id).await.unwrap();

        let stats = db.products().inventory_stats().await.unwrap();
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.total_units_in_stock, 55);
        assert_eq!(stats.stock_value_cents, 5 * 1000 + 50 * 200);
        assert_eq!(stats.low_stock_count, 1);
        assert_eq!(stats.out_of_stock_count, 1);

        assert!(db.products().get_by_id(&empty.id).await.unwrap().unwrap().is_out_of_stock());
        assert_eq!(db.products().list_active(10).await.unwrap().len(), 3);
    }
}
