//! Inventory service.
//!
//! Catalog administration and manual stock movements. Every movement carries
//! a caller-chosen idempotency token. Replaying a token with the same
//! product, kind and quantity is a no-op that returns the product as it
//! stands; reusing it for anything else fails and changes nothing.

use std::sync::Arc;

use tracing::{info, warn};

use storefront_core::ledger::MutationToken;
use storefront_core::validation::validate_token;
use storefront_core::{CoreError, InventoryStats, MovementKind, NewProduct, Product};
use storefront_db::{DbError, DbResult, ProductRepository};

use super::retry_on_conflict;
use crate::error::{ServiceError, ServiceResult};
use crate::AppState;

pub struct InventoryService {
    state: Arc<AppState>,
}

impl InventoryService {
    pub fn new(state: Arc<AppState>) -> Self {
        InventoryService { state }
    }

    pub async fn add_product(&self, product: &NewProduct) -> ServiceResult<Product> {
        let created = self
            .state
            .db
            .products()
            .insert(product)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { value, .. } => {
                    ServiceError::Validation(format!("SKU {value} already exists"))
                }
                other => other.into(),
            })?;

        info!(product_id = %created.id, sku = %created.sku, stock = created.stock, "Product added");
        Ok(created)
    }

    pub async fn get(&self, product_id: &str) -> ServiceResult<Product> {
        self.state
            .db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    pub async fn get_by_sku(&self, sku: &str) -> ServiceResult<Product> {
        self.state
            .db
            .products()
            .get_by_sku(sku)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(sku.to_string()).into())
    }

    pub async fn list_active(&self, limit: u32) -> ServiceResult<Vec<Product>> {
        Ok(self.state.db.products().list_active(limit).await?)
    }

    /// Receives `quantity` units.
    pub async fn restock(&self, product_id: &str, quantity: i64, token: &str) -> ServiceResult<Product> {
        validate_token(token).map_err(CoreError::from)?;
        let token = &MutationToken::new(token);
        let products = &self.state.db.products();

        retry_on_conflict("restock", move || async move {
            let result = products.restock(product_id, quantity, token).await;
            replay_aware(products, product_id, MovementKind::Restock, quantity, result).await
        })
        .await
    }

    /// Removes `quantity` units outside of checkout (damage, manual sale).
    pub async fn sell(&self, product_id: &str, quantity: i64, token: &str) -> ServiceResult<Product> {
        validate_token(token).map_err(CoreError::from)?;
        let token = &MutationToken::new(token);
        let products = &self.state.db.products();

        retry_on_conflict("sell", move || async move {
            let result = products.sell(product_id, quantity, token).await;
            replay_aware(products, product_id, MovementKind::Sell, quantity, result).await
        })
        .await
    }

    pub async fn soft_delete(&self, product_id: &str) -> ServiceResult<()> {
        self.state.db.products().soft_delete(product_id).await?;
        info!(product_id = %product_id, "Product deactivated");
        Ok(())
    }

    pub async fn inventory_stats(&self) -> ServiceResult<InventoryStats> {
        Ok(self.state.db.products().inventory_stats().await?)
    }
}

/// A replayed token answers with the current product, but only when the
/// recorded movement is the same request.
async fn replay_aware(
    products: &ProductRepository,
    product_id: &str,
    kind: MovementKind,
    quantity: i64,
    result: DbResult<Product>,
) -> DbResult<Product> {
    let token = match result {
        Err(DbError::DuplicateMutation { token }) => token,
        other => return other,
    };

    match products.get_movement(&token).await? {
        Some(m) if m.product_id == product_id && m.kind == kind && m.quantity == quantity => {
            warn!(product_id = %product_id, token = %token, "Stock movement replayed");
            products
                .get_by_id(product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", product_id))
        }
        recorded => {
            warn!(
                product_id = %product_id,
                token = %token,
                recorded_product = recorded.as_ref().map(|m| m.product_id.as_str()),
                "Token already used for a different stock movement"
            );
            Err(DbError::DuplicateMutation { token })
        }
    }
}
