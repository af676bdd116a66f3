//! # Order Aggregate
//!
//! Checkout input, line-item pricing, derived totals and the order-number
//! format.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CreateOrderRequest (client)                                           │
//! │       │  items: [{product_id, quantity}], tax, shipping, discount      │
//! │       │  (any client-side total is ignored)                            │
//! │       ▼                                                                 │
//! │  CreateOrderRequest::validate()  ← shape only, no state touched        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PricedLine::from_product()      ← unit price from the catalog         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OrderTotals::compute()          ← subtotal + tax + shipping - discount│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  format_order_number(day, seq)   ← ORD-YYYYMMDD-NNNN                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Address, Product};
use crate::validation::{
    validate_address, validate_currency, validate_line_item_count, validate_non_negative_cents,
    validate_quantity, validate_uuid,
};
use crate::{DEFAULT_CURRENCY, ORDER_NUMBER_PREFIX};

// =============================================================================
// Checkout Input
// =============================================================================

/// One requested line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Everything a buyer submits at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<LineItemRequest>,
    pub shipping_address: Address,

    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,

    /// ISO 4217 code; defaults to USD.
    pub currency: Option<String>,

    pub notes: Option<String>,

    /// Accepted for wire compatibility and always ignored.
    #[serde(default)]
    pub total_cents: Option<i64>,
}

impl CreateOrderRequest {
    /// Rejects malformed input before any state is touched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "customer_id".to_string(),
            });
        }
        if self.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            });
        }
        validate_line_item_count(self.items.len())?;
        for item in &self.items {
            validate_uuid(&item.product_id)?;
            validate_quantity(item.quantity)?;
        }
        validate_non_negative_cents("tax", self.tax_cents)?;
        validate_non_negative_cents("shipping", self.shipping_cents)?;
        validate_non_negative_cents("discount", self.discount_cents)?;
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        validate_address(&self.shipping_address)?;
        Ok(())
    }

    /// The currency to record, uppercase.
    pub fn currency(&self) -> String {
        self.currency
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }
}

// =============================================================================
// Priced Lines
// =============================================================================

/// A line item priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

impl PricedLine {
    /// Prices `quantity` units of `product` at its current catalog price.
    ///
    /// Inactive products cannot be ordered.
    pub fn from_product(product: &Product, quantity: i64) -> CoreResult<Self> {
        if !product.is_active {
            return Err(CoreError::ProductNotFound(product.id.clone()));
        }
        validate_quantity(quantity)?;

        let unit_price = product.price();
        let line_total = unit_price
            .checked_mul_quantity(quantity)
            .ok_or_else(|| CoreError::AmountOverflow {
                context: format!("line total for {}", product.sku),
            })?;

        Ok(PricedLine {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price,
            quantity,
            line_total,
        })
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Derived order totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl OrderTotals {
    /// `subtotal = Σ line totals`, `total = subtotal + tax + shipping - discount`.
    ///
    /// ## Returns
    /// * `Err(AmountOverflow)` - a sum left the i64 range
    /// * `Err(Validation)` - the discount exceeds everything it is taken from
    pub fn compute(
        line_totals: impl IntoIterator<Item = Money>,
        tax: Money,
        shipping: Money,
        discount: Money,
    ) -> CoreResult<Self> {
        let overflow = |context: &str| CoreError::AmountOverflow {
            context: context.to_string(),
        };

        let mut subtotal = Money::zero();
        for line in line_totals {
            subtotal = subtotal.checked_add(line).ok_or_else(|| overflow("subtotal"))?;
        }

        let total = subtotal
            .checked_add(tax)
            .and_then(|m| m.checked_add(shipping))
            .and_then(|m| m.checked_sub(discount))
            .ok_or_else(|| overflow("total"))?;

        if total.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: subtotal.cents() + tax.cents() + shipping.cents(),
            }
            .into());
        }

        Ok(OrderTotals {
            subtotal,
            tax,
            shipping,
            discount,
            total,
        })
    }

    /// Totals for priced lines and the request's adjustments.
    pub fn for_request(lines: &[PricedLine], request: &CreateOrderRequest) -> CoreResult<Self> {
        OrderTotals::compute(
            lines.iter().map(|l| l.line_total),
            Money::from_cents(request.tax_cents),
            Money::from_cents(request.shipping_cents),
            Money::from_cents(request.discount_cents),
        )
    }
}

// =============================================================================
// Order Numbers
// =============================================================================

/// Key of the per-day sequence counter (`YYYYMMDD`).
pub fn sequence_day(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Formats `ORD-YYYYMMDD-NNNN`. Sequences past 9999 simply grow wider.
pub fn format_order_number(date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}-{:04}", ORDER_NUMBER_PREFIX, sequence_day(date), sequence)
}

/// Parses an order number back into its day and sequence.
pub fn parse_order_number(number: &str) -> Option<(NaiveDate, i64)> {
    let mut parts = number.split('-');
    if parts.next()? != ORDER_NUMBER_PREFIX {
        return None;
    }
    let day = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
    let seq_part = parts.next()?;
    if parts.next().is_some() || seq_part.len() < 4 || !seq_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let seq: i64 = seq_part.parse().ok()?;
    if seq < 1 {
        return None;
    }
    Some((day, seq))
}

// =============================================================================
// Unit Tests
// =============================================================================
