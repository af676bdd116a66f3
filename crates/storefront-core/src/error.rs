//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                    │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  storefront-db errors (separate crate)                                 │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  storefront-api errors                                                 │
//! │  └── ServiceError     - What the caller sees (with a status code)      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ServiceError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They carry enough
/// context (SKU, ids, quantities) to build a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product cannot be found (or was soft-deleted).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A `sell` asked for more than the ledger holds.
    ///
    /// ## User Workflow
    /// ```text
    /// sell(qty: 10)
    ///      │
    ///      ▼
    /// Check stock: available=4
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "TSHIRT-M", available: 4, requested: 10 }
    ///      │
    ///      ▼
    /// Stock untouched, caller sees a 409
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A `restock` (or `sell`) was called with a non-positive quantity.
    #[error("Invalid quantity: {quantity} (must be greater than zero)")]
    InvalidQuantity { quantity: i64 },

    /// Checkout found an item whose stock cannot cover the order.
    ///
    /// Always names the FIRST insufficient line item in order of appearance.
    #[error("Product {product_id} ({sku}) is out of stock: available {available}, requested {requested}")]
    OutOfStock {
        product_id: String,
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The order has already been settled by a payment.
    #[error("Order {order_id} is already paid")]
    AlreadyPaid { order_id: String },

    /// A status change that the lifecycle does not allow.
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// The payment payload does not belong to the selected provider.
    #[error("Payment payload does not match method {method}")]
    PayloadMismatch { method: String },

    /// Money arithmetic left the representable range.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Builds an `InvalidTransition` from any two displayable states.
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when request input doesn't meet requirements and are
/// raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid phone number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
