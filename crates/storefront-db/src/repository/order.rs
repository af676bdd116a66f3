//! # Order Repository
//!
//! Order creation and lookup.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create(request, policy)                              │
//! │                                                                         │
//! │  validate request (before touching state)                              │
//! │       │                                                                 │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐  │
//! │  │ 1. next order number       (first write, takes the lock)         │  │
//! │  │ 2. price every line from the catalog                            │  │
//! │  │ 3. check ALL lines against stock   → OutOfStock(first short)    │  │
//! │  │ 4. recompute totals (client total ignored)                      │  │
//! │  │ 5. INSERT order + items                                         │  │
//! │  │ 6. AtCheckout only: sell every line, stock_committed = 1        │  │
//! │  COMMIT ────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Any failure rolls back the whole order, including sells and the      │
//! │  sequence bump.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use storefront_core::ledger::{ensure_all_available, MutationToken, StockRequest};
use storefront_core::order::{
    format_order_number, sequence_day, CreateOrderRequest, OrderTotals, PricedLine,
};
use storefront_core::{
    CoreError, InventoryPolicy, Order, OrderDetails, OrderItem, OrderPaymentStatus, OrderStats,
    OrderStatus, OrderStatusBucket,
};

use super::generate_id;
use super::product::{fetch_in_tx as fetch_product_in_tx, sell_in_tx};
use super::sequence::next_value_in_tx;
use crate::error::{DbError, DbResult};

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Places an order.
    ///
    /// ## Returns
    /// * `Ok(OrderDetails)` - persisted with `status=pending`, `payment_status=pending`
    /// * `Err(Domain(Validation))` - malformed request, nothing written
    /// * `Err(Domain(ProductNotFound))` - unknown or inactive product
    /// * `Err(Domain(OutOfStock))` - names the first line stock cannot cover
    pub async fn create(
        &self,
        request: &CreateOrderRequest,
        policy: InventoryPolicy,
    ) -> DbResult<OrderDetails> {
        request.validate().map_err(CoreError::from)?;

        let now = Utc::now();
        let today = now.date_naive();

        let mut tx = self.pool.begin().await?;

        let sequence = next_value_in_tx(&mut tx, &sequence_day(today)).await?;
        let order_number = format_order_number(today, sequence);

        // Price every line and check availability before any decrement.
        let mut lines = Vec::with_capacity(request.items.len());
        let mut stock_requests = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = fetch_product_in_tx(&mut tx, &item.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;

            let line = PricedLine::from_product(&product, item.quantity)?;
            stock_requests.push(StockRequest {
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                available: product.stock,
                requested: item.quantity,
            });
            lines.push(line);
        }
        ensure_all_available(&stock_requests)?;

        let totals = OrderTotals::for_request(&lines, request)?;
        if let Some(client_total) = request.total_cents {
            if client_total != totals.total.cents() {
                debug!(
                    client_total,
                    computed_total = totals.total.cents(),
                    "Ignoring client-supplied order total"
                );
            }
        }

        let order = Order {
            id: generate_id(),
            order_number,
            customer_id: request.customer_id.trim().to_string(),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            currency: request.currency(),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            payment_id: None,
            paid_at: None,
            stock_committed: policy == InventoryPolicy::AtCheckout,
            shipping_address: request.shipping_address.clone(),
            notes: request.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        insert_order(&mut tx, &order).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (position, line) in lines.iter().enumerate() {
            let item = OrderItem {
                id: generate_id(),
                order_id: order.id.clone(),
                product_id: line.product_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                unit_price_cents: line.unit_price.cents(),
                quantity: line.quantity,
                line_total_cents: line.line_total.cents(),
                position: position as i64,
                created_at: now,
            };
            insert_item(&mut tx, &item).await?;
            items.push(item);
        }

        if policy == InventoryPolicy::AtCheckout {
            for item in &items {
                let token = MutationToken::reservation(order.id.as_str(), &item.id);
                sell_in_tx(&mut tx, &item.product_id, item.quantity, &token).await?;
            }
        }

        tx.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            items = items.len(),
            policy = ?policy,
            "Order created"
        );

        Ok(OrderDetails { order, items })
    }

    /// Gets an order header by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// Gets an order header by its `ORD-YYYYMMDD-NNNN` number.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?1")
            .bind(order_number.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// Gets an order with its line items.
    pub async fn get_details(&self, id: &str) -> DbResult<Option<OrderDetails>> {
        let Some(order) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let items = self.get_items(id).await?;
        Ok(Some(OrderDetails { order, items }))
    }

    /// Gets all items for an order, in request order.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        items_in_tx(&mut conn, order_id).await
    }

    /// Lists orders on one payment status, newest first.
    pub async fn list_by_payment_status(
        &self,
        status: OrderPaymentStatus,
        limit: u32,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE payment_status = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Moves the fulfillment status forward.
    ///
    /// Orthogonal to payment. The update is guarded on the status that was
    /// read, so a concurrent change surfaces as `Conflict`.
    pub async fn update_fulfillment_status(&self, id: &str, next: OrderStatus) -> DbResult<Order> {
        let order = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        if !order.status.can_transition_to(next) {
            return Err(CoreError::invalid_transition("order", order.status, next).into());
        }

        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            RETURNING *
            "#,
        )
        .bind(next)
        .bind(Utc::now())
        .bind(id)
        .bind(order.status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            DbError::Conflict(format!("order {} changed status concurrently", id))
        })?;

        info!(order_id = %id, from = %order.status, to = %next, "Order status updated");
        Ok(updated)
    }

    /// Administrative refund: `paid → refunded` only.
    pub async fn mark_refunded(&self, id: &str) -> DbResult<Order> {
        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET payment_status = 'refunded', updated_at = ?1
            WHERE id = ?2 AND payment_status = 'paid'
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(order) => {
                info!(order_id = %id, "Order refunded");
                Ok(order)
            }
            None => {
                let order = self
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Order", id))?;
                Err(CoreError::invalid_transition(
                    "order payment",
                    order.payment_status,
                    OrderPaymentStatus::Refunded,
                )
                .into())
            }
        }
    }

    /// Counts and totals grouped by payment status.
    pub async fn stats(&self) -> DbResult<OrderStats> {
        let rows: Vec<(OrderPaymentStatus, i64, i64)> = sqlx::query_as(
            r#"
            SELECT payment_status, COUNT(*), COALESCE(SUM(total_cents), 0)
            FROM orders
            GROUP BY payment_status
            ORDER BY payment_status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = OrderStats::default();
        for (payment_status, count, total_cents) in rows {
            stats.total_orders += count;
            if payment_status == OrderPaymentStatus::Paid {
                stats.revenue_cents += total_cents;
            }
            stats.by_payment_status.push(OrderStatusBucket {
                payment_status,
                count,
                total_cents,
            });
        }
        Ok(stats)
    }
}

// =============================================================================
// Transaction Building Blocks
// =============================================================================

pub(crate) async fn fetch_in_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

pub(crate) async fn items_in_tx(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ?1 ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    let address = &order.shipping_address;

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_number, customer_id, status, payment_status, currency,
            subtotal_cents, tax_cents, shipping_cents, discount_cents, total_cents,
            payment_id, paid_at, stock_committed,
            recipient_name, phone, line1, line2, city, region, postal_code, country,
            notes, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22,
            ?23, ?24, ?25
        )
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.customer_id)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(&order.currency)
    .bind(order.subtotal_cents)
    .bind(order.tax_cents)
    .bind(order.shipping_cents)
    .bind(order.discount_cents)
    .bind(order.total_cents)
    .bind(&order.payment_id)
    .bind(order.paid_at)
    .bind(order.stock_committed)
    .bind(&address.recipient_name)
    .bind(&address.phone)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.region)
    .bind(&address.postal_code)
    .bind(&address.country)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Snapshot pattern: SKU, name and price are frozen on the line item.
async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id,
            sku_snapshot, name_snapshot, unit_price_cents,
            quantity, line_total_cents, position, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.position)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
