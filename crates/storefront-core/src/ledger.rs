//! # Inventory Ledger
//!
//! Pure arithmetic for the per-product stock ledger, plus the all-or-nothing
//! availability check used at checkout.
//!
//! ## Ledger Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock = stock_in - stock_out        stock >= 0                        │
//! │                                                                         │
//! │  sell(q)     stock -= q   stock_out += q     (q <= stock)              │
//! │  restock(q)  stock += q   stock_in  += q     (q > 0)                   │
//! │                                                                         │
//! │  The database applies the same rules with a conditional UPDATE so     │
//! │  concurrent sells can never drive stock below zero.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency Tokens
//! Every persisted mutation carries a [`MutationToken`]. The token is stored
//! with a UNIQUE constraint so replaying the same logical request is rejected
//! instead of applied twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Stock Ledger
// =============================================================================

/// The three ledger counters of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLedger {
    pub stock: i64,
    pub stock_in: i64,
    pub stock_out: i64,
}

impl StockLedger {
    /// A fresh ledger holding `initial` units, all recorded as received.
    pub fn opening(initial: i64) -> CoreResult<Self> {
        if initial < 0 {
            return Err(CoreError::InvalidQuantity { quantity: initial });
        }
        Ok(StockLedger {
            stock: initial,
            stock_in: initial,
            stock_out: 0,
        })
    }

    /// Removes `quantity` units.
    ///
    /// ## Returns
    /// * `Err(InvalidQuantity)` - quantity is zero or negative
    /// * `Err(InsufficientStock)` - quantity exceeds stock, ledger unchanged
    pub fn sell(&mut self, sku: &str, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity { quantity });
        }
        if quantity > self.stock {
            return Err(CoreError::InsufficientStock {
                sku: sku.to_string(),
                available: self.stock,
                requested: quantity,
            });
        }
        self.stock -= quantity;
        self.stock_out += quantity;
        Ok(())
    }

    /// Adds `quantity` received units.
    pub fn restock(&mut self, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity { quantity });
        }
        self.stock += quantity;
        self.stock_in += quantity;
        Ok(())
    }

    /// `stock = stock_in - stock_out` and `stock >= 0`.
    pub fn is_balanced(&self) -> bool {
        self.stock >= 0 && self.stock == self.stock_in - self.stock_out
    }
}

// =============================================================================
// Availability Check
// =============================================================================

/// One line of a checkout as seen by the availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: String,
    pub sku: String,
    pub available: i64,
    pub requested: i64,
}

/// Checks every request before anything is decremented.
///
/// Quantities for the same product are summed, so an order listing a
/// product twice cannot slip past the check. Fails with `OutOfStock`
/// naming the first line (in request order) that cannot be covered.
///
/// ## Example
/// ```rust
/// use storefront_core::ledger::{ensure_all_available, StockRequest};
///
/// let lines = vec![StockRequest {
///     product_id: "p-1".into(),
///     sku: "MUG".into(),
///     available: 2,
///     requested: 3,
/// }];
/// assert!(ensure_all_available(&lines).is_err());
/// ```
pub fn ensure_all_available(requests: &[StockRequest]) -> CoreResult<()> {
    let mut totals: HashMap<&str, i64> = HashMap::new();
    for req in requests {
        *totals.entry(req.product_id.as_str()).or_insert(0) += req.requested;
    }

    for req in requests {
        let requested = totals.get(req.product_id.as_str()).copied().unwrap_or(req.requested);
        if requested > req.available {
            return Err(CoreError::OutOfStock {
                product_id: req.product_id.clone(),
                sku: req.sku.clone(),
                available: req.available,
                requested,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Mutation Tokens
// =============================================================================

/// Idempotency key of one ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationToken(String);

impl MutationToken {
    /// Caller-supplied token (admin restocks, manual adjustments).
    pub fn new(token: impl Into<String>) -> Self {
        MutationToken(token.into())
    }

    /// Decrement performed while settling `payment_id`.
    pub fn settlement(payment_id: &str, order_item_id: &str) -> Self {
        MutationToken(format!("{}:{}", payment_id, order_item_id))
    }

    /// Decrement performed at checkout under `InventoryPolicy::AtCheckout`.
    pub fn reservation(order_id: &str, order_item_id: &str) -> Self {
        MutationToken(format!("{}:{}", order_id, order_item_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
