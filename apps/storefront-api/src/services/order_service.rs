//! Order service.
//!
//! Checkout plus administrative order lookups. Placing an order computes
//! totals server-side and, depending on the inventory policy, checks or
//! reserves stock in the same transaction.

use std::sync::Arc;

use tracing::info;

use storefront_core::order::CreateOrderRequest;
use storefront_core::{Order, OrderDetails, OrderPaymentStatus, OrderStats, OrderStatus};

use super::retry_on_conflict;
use crate::error::{ServiceError, ServiceResult};
use crate::AppState;

/// Upper bound for list endpoints.
const MAX_LIST_LIMIT: u32 = 200;

pub struct OrderService {
    state: Arc<AppState>,
}

impl OrderService {
    pub fn new(state: Arc<AppState>) -> Self {
        OrderService { state }
    }

    /// Places an order under the configured inventory policy.
    ///
    /// Client-supplied totals are ignored. Fails with `OutOfStock` naming the
    /// first line stock cannot cover, leaving nothing behind.
    pub async fn create(&self, request: &CreateOrderRequest) -> ServiceResult<OrderDetails> {
        let policy = self.state.config.inventory_policy;
        let orders = self.state.db.orders();
        let details = retry_on_conflict("create order", || orders.create(request, policy)).await?;

        info!(
            order_id = %details.order.id,
            order_number = %details.order.order_number,
            customer_id = %details.order.customer_id,
            total = %details.order.total(),
            items = details.items.len(),
            "Order placed"
        );
        Ok(details)
    }

    pub async fn get(&self, order_id: &str) -> ServiceResult<OrderDetails> {
        self.state
            .db
            .orders()
            .get_details(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id}")))
    }

    pub async fn get_by_number(&self, order_number: &str) -> ServiceResult<Order> {
        self.state
            .db
            .orders()
            .get_by_number(order_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number}")))
    }

    pub async fn list_by_payment_status(
        &self,
        status: OrderPaymentStatus,
        limit: u32,
    ) -> ServiceResult<Vec<Order>> {
        Ok(self
            .state
            .db
            .orders()
            .list_by_payment_status(status, limit.min(MAX_LIST_LIMIT))
            .await?)
    }

    /// Moves fulfillment forward. Never touches the payment axis.
    pub async fn update_status(&self, order_id: &str, next: OrderStatus) -> ServiceResult<Order> {
        Ok(self
            .state
            .db
            .orders()
            .update_fulfillment_status(order_id, next)
            .await?)
    }

    /// Administrative refund of a paid order.
    pub async fn mark_refunded(&self, order_id: &str) -> ServiceResult<Order> {
        Ok(self.state.db.orders().mark_refunded(order_id).await?)
    }

    pub async fn stats(&self) -> ServiceResult<OrderStats> {
        Ok(self.state.db.orders().stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{
        new_product, order_request, state_with, test_state, ChargeScript,
    };
    use storefront_core::order::LineItemRequest;
    use storefront_core::InventoryPolicy;

    #[tokio::test]
    async fn test_create_computes_totals_server_side() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let product = state.db.products().insert(&new_product("MUG", 1250, 10)).await.unwrap();
        let service = OrderService::new(state.clone());

        let mut request = order_request(&product.id, 3);
        request.tax_cents = 100;
        request.shipping_cents = 500;
        request.discount_cents = 250;
        request.total_cents = Some(1);

        let details = service.create(&request).await.unwrap();
        assert_eq!(details.order.subtotal_cents, 3750);
        assert_eq!(details.order.total_cents, 3750 + 100 + 500 - 250);
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(details.order.payment_status, OrderPaymentStatus::Pending);
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].sku_snapshot, "MUG");

        // Default policy leaves stock alone until payment.
        let stored = state.db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
        assert!(!details.order.stock_committed);
    }

    #[tokio::test]
    async fn test_out_of_stock_names_first_short_line() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let products = state.db.products();
        let plenty = products.insert(&new_product("A", 100, 10)).await.unwrap();
        let short = products.insert(&new_product("B", 100, 1)).await.unwrap();
        let also_short = products.insert(&new_product("C", 100, 0)).await.unwrap();
        let service = OrderService::new(state.clone());

        let mut request = order_request(&plenty.id, 2);
        for (id, qty) in [(&short.id, 2), (&also_short.id, 1)] {
            request.items.push(LineItemRequest {
                product_id: id.clone(),
                quantity: qty,
            });
        }

        let err = service.create(&request).await.unwrap_err();
        match err {
            ServiceError::OutOfStock {
                product_id,
                available,
                requested,
                ..
            } => {
                assert_eq!(product_id, short.id);
                assert_eq!(available, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("expected OutOfStock, got {other:?}"),
        }
        assert!(service
            .list_by_payment_status(OrderPaymentStatus::Pending, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_at_checkout_policy_reserves_stock() {
        let (state, _) = state_with(ChargeScript::Pending, InventoryPolicy::AtCheckout).await;
        let product = state.db.products().insert(&new_product("CAP", 900, 4)).await.unwrap();
        let service = OrderService::new(state.clone());

        let details = service.create(&order_request(&product.id, 3)).await.unwrap();
        assert!(details.order.stock_committed);

        let stored = state.db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
        assert_eq!(stored.stock_out, 3);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let product = state.db.products().insert(&new_product("PEN", 300, 5)).await.unwrap();
        let service = OrderService::new(state.clone());

        let details = service.create(&order_request(&product.id, 1)).await.unwrap();
        let by_number = service.get_by_number(&details.order.order_number).await.unwrap();
        assert_eq!(by_number.id, details.order.id);
        assert_eq!(service.get(&details.order.id).await.unwrap().items.len(), 1);

        assert!(matches!(
            service.get("missing").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.revenue_cents, 0);
    }

    #[tokio::test]
    async fn test_fulfillment_is_independent_of_payment() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let product = state.db.products().insert(&new_product("BAG", 2000, 5)).await.unwrap();
        let service = OrderService::new(state.clone());
        let order = service.create(&order_request(&product.id, 1)).await.unwrap().order;

        let updated = service.update_status(&order.id, OrderStatus::Confirmed).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(updated.payment_status, OrderPaymentStatus::Pending);

        let err = service.update_status(&order.id, OrderStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Only paid orders can be refunded.
        let err = service.mark_refunded(&order.id).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
