//! # storefront-core: Pure Business Logic for Storefront
//!
//! This crate holds the order/payment/inventory consistency rules as pure
//! functions with zero I/O dependencies. The database crate enforces these
//! rules atomically, the api crate drives them from provider events.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Storefront Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 storefront-api (services)                       │   │
//! │  │   OrderService ──► PaymentService ──► WebhookHandler ──► Sweeper│   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────────┐   │   │
//! │  │   │  ledger  │ │  order   │ │ payment  │ │ reconciliation │   │   │
//! │  │   │ sell     │ │ totals   │ │ payloads │ │ settlement     │   │   │
//! │  │   │ restock  │ │ ORD-#### │ │ statuses │ │ state machine  │   │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 storefront-db (Database Layer)                  │   │
//! │  │     conditional updates, sequences, settlement transaction      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Product, Order, Payment, outbox rows)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`ledger`] - Inventory ledger arithmetic and idempotency tokens
//! - [`order`] - Line-item pricing, totals and order numbers
//! - [`payment`] - Provider payloads, results and payment status rules
//! - [`reconciliation`] - Settlement state machine for an order/payment pair
//! - [`validation`] - Field-level input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::money::Money;
//! use storefront_core::order::OrderTotals;
//!
//! let lines = [Money::from_cents(2000), Money::from_cents(500)];
//! let totals = OrderTotals::compute(
//!     lines,
//!     Money::from_cents(100),
//!     Money::from_cents(300),
//!     Money::zero(),
//! )
//! .unwrap();
//!
//! assert_eq!(totals.subtotal.cents(), 2500);
//! assert_eq!(totals.total.cents(), 2900);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod order;
pub mod payment;
pub mod reconciliation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct line items allowed in a single order.
pub const MAX_LINE_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Currency used when an order does not name one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Stock level at or below which a product counts as "low stock".
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Prefix of every human-readable order number (`ORD-YYYYMMDD-NNNN`).
pub const ORDER_NUMBER_PREFIX: &str = "ORD";
