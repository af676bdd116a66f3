//! # Domain Types
//!
//! Core domain types shared by the database and service layers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  sku (UPPER)    │   │  order_number   │   │  order_id (FK)  │       │
//! │  │  stock          │◄──│  items[]        │◄──│  provider_ref   │       │
//! │  │  stock_in/out   │   │  payment_status │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Two independent axes on an Order:                                     │
//! │    status          pending → confirmed → processing → shipped → ...    │
//! │    payment_status  pending → paid   (or pending → failed → paid)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, order_number, provider_ref) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::ledger::StockLedger;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog together with its inventory ledger counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit, uppercase-normalized and unique.
    pub sku: String,

    pub name: String,
    pub description: Option<String>,

    /// Catalog price in cents; copied into line items at checkout.
    pub price_cents: i64,

    /// Units currently available. Never negative.
    pub stock: i64,

    /// Cumulative units received.
    pub stock_in: i64,

    /// Cumulative units sold or removed.
    pub stock_out: i64,

    /// Stock level at or below which the product is reported as low.
    pub low_stock_threshold: i64,

    /// Soft-delete flag. Products referenced by orders are never hard-deleted.
    pub is_active: bool,

    /// Presentation only.
    pub is_featured: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the ledger counters of this product.
    #[inline]
    pub fn ledger(&self) -> StockLedger {
        StockLedger {
            stock: self.stock,
            stock_in: self.stock_in,
            stock_out: self.stock_out,
        }
    }

    /// True when stock is positive but at or below the threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock > 0 && self.stock <= self.low_stock_threshold
    }

    /// True when nothing is left to sell.
    pub fn is_out_of_stock(&self) -> bool {
        self.stock == 0
    }
}

/// Input for adding a product to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,

    /// Opening stock; recorded as received (`stock_in`) so the ledger balances.
    #[serde(default)]
    pub initial_stock: i64,

    pub low_stock_threshold: Option<i64>,

    #[serde(default)]
    pub is_featured: bool,
}

// =============================================================================
// Inventory Policy
// =============================================================================

/// When stock leaves the ledger for an order.
///
/// ```text
/// OnPayment  (default)  checkout: check all items   settlement: sell
/// AtCheckout            checkout: check + sell      settlement: skip
/// ```
///
/// Either way `Order::stock_committed` records that the decrement happened,
/// so it happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InventoryPolicy {
    #[default]
    OnPayment,
    AtCheckout,
}

impl FromStr for InventoryPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_payment" => Ok(InventoryPolicy::OnPayment),
            "at_checkout" => Ok(InventoryPolicy::AtCheckout),
            _ => Err(ValidationError::NotAllowed {
                field: "inventory_policy".to_string(),
                allowed: vec!["on_payment".to_string(), "at_checkout".to_string()],
            }),
        }
    }
}

// =============================================================================
// Order Status (fulfillment axis)
// =============================================================================

/// Fulfillment status of an order. Administrative and orthogonal to payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Fulfillment moves forward only; cancelled and refunded are terminal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Delivered, Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Payment Status (settlement axis)
// =============================================================================

/// Payment axis of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Failed => "failed",
            OrderPaymentStatus::Refunded => "refunded",
        }
    }

    /// Allowed moves on the payment axis.
    ///
    /// ```text
    /// pending ──► paid ──► refunded (administrative)
    ///    │         ▲
    ///    ▼         │
    /// failed ──────┘   (a later attempt succeeds)
    /// ```
    /// A paid order never returns to pending or failed.
    pub fn can_transition_to(&self, next: OrderPaymentStatus) -> bool {
        use OrderPaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) | (Paid, Refunded)
        )
    }
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Status / Method
// =============================================================================

/// Status of one payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting asynchronous confirmation from the provider.
    Processing,
    /// The provider took the money. Terminal.
    Completed,
    /// The attempt failed. A provider may still report a late success.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider family used for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card network gateway (payment intents).
    Card,
    /// Mobile-money operator (cash-in request to a phone number).
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mobile-money operators reachable through the mobile-money provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MobileNetwork {
    Mtn,
    Airtel,
    Tigo,
}

// =============================================================================
// Address
// =============================================================================

/// Shipping address captured with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Address {
    pub recipient_name: String,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

// =============================================================================
// Order
// =============================================================================

/// An order header. Line items live in [`OrderItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,

    /// Human-readable `ORD-YYYYMMDD-NNNN`.
    pub order_number: String,

    /// The buyer who checked out.
    pub customer_id: String,

    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub currency: String,

    // Totals are always recomputed from line items.
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,

    /// The payment that settled this order.
    pub payment_id: Option<String>,

    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,

    /// True once inventory has been decremented for this order.
    pub stock_committed: bool,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub shipping_address: Address,

    pub notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the amount a provider must be charged.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_paid(&self) -> bool {
        self.payment_status == OrderPaymentStatus::Paid
    }
}

/// A line item. Uses the snapshot pattern to freeze product data at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// SKU at time of checkout (frozen).
    pub sku_snapshot: String,
    /// Product name at time of checkout (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of checkout (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity, recomputed server side.
    pub line_total_cents: i64,
    /// Position within the order (0-based), preserves request order.
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Payment
// =============================================================================

/// One attempt to settle an order through a provider.
///
/// Persisted for every attempt, including ones the provider rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,

    /// Provider correlation id (payment intent id, transaction ref).
    pub provider_ref: Option<String>,

    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub currency: String,

    pub card_holder: Option<String>,
    pub mobile_number: Option<String>,
    pub network: Option<MobileNetwork>,

    /// Provider error or timeout explanation for failed attempts.
    pub failure_reason: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Inventory Movements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sell,
    Restock,
}

/// One applied ledger mutation, keyed by its idempotency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    pub token: String,
    pub product_id: String,
    pub kind: MovementKind,
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notification Outbox
// =============================================================================

/// A pending (or sent) customer notification.
///
/// Written in the same transaction as the state change that caused it,
/// delivered later by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NotificationOutboxEntry {
    pub id: String,
    /// e.g. "payment_confirmation".
    pub kind: String,
    pub order_id: String,
    pub payment_id: String,
    /// JSON body handed to the notifier.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub sent_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Reconciliation Exceptions
// =============================================================================

/// Why an order/payment pair needs manual intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// The provider took the money but stock ran out before settlement.
    StockDepleted,
    /// A second payment completed for an order that was already paid.
    DuplicatePayment,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::StockDepleted => "stock_depleted",
            ExceptionKind::DuplicatePayment => "duplicate_payment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReconciliationException {
    pub id: String,
    pub order_id: String,
    pub payment_id: String,
    pub kind: ExceptionKind,
    pub detail: String,
    pub resolved: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Catalog-wide inventory figures for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryStats {
    pub total_products: i64,
    pub total_units_in_stock: i64,
    pub total_units_sold: i64,
    /// Σ stock × price over active products.
    pub stock_value_cents: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
}

/// Count and value of orders sharing one payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderStatusBucket {
    pub payment_status: OrderPaymentStatus,
    pub count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderStats {
    pub total_orders: i64,
    /// Σ total over paid orders.
    pub revenue_cents: i64,
    pub by_payment_status: Vec<OrderStatusBucket>,
}

/// Count and value of payments sharing a status and method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentBucket {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub count: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentStats {
    pub total_payments: i64,
    pub completed_amount_cents: i64,
    pub buckets: Vec<PaymentBucket>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i64, threshold: i64) -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            sku: "TSHIRT-M".to_string(),
            name: "T-Shirt M".to_string(),
            description: None,
            price_cents: 1000,
            stock,
            stock_in: stock,
            stock_out: 0,
            low_stock_threshold: threshold,
            is_active: true,
            is_featured: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_product_stock_flags() {
        assert!(product(5, 10).is_low_stock());
        assert!(!product(11, 10).is_low_stock());
        assert!(product(0, 10).is_out_of_stock());
        assert!(!product(0, 10).is_low_stock());
    }

    #[test]
    fn test_inventory_policy_from_str() {
        assert_eq!("on_payment".parse::<InventoryPolicy>().unwrap(), InventoryPolicy::OnPayment);
        assert_eq!(" AT_CHECKOUT ".parse::<InventoryPolicy>().unwrap(), InventoryPolicy::AtCheckout);
        assert!("later".parse::<InventoryPolicy>().is_err());
        assert_eq!(InventoryPolicy::default(), InventoryPolicy::OnPayment);
    }

    #[test]
    fn test_order_payment_status_transitions() {
        use OrderPaymentStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Paid.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
    }

    #[test]
    fn test_order_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Delivered.can_transition_to(Pending));
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&PaymentMethod::MobileMoney).unwrap(), "\"mobile_money\"");
        assert_eq!(serde_json::to_string(&MobileNetwork::Mtn).unwrap(), "\"mtn\"");
        assert_eq!(PaymentStatus::Completed.to_string(), "completed");
    }
}
