//! Error types for the Storefront API.
//!
//! Every lower-level error (domain rule, database, provider) is folded into
//! one [`ServiceError`] so callers see a single taxonomy with an
//! HTTP-equivalent status.

use storefront_core::CoreError;
use storefront_db::DbError;

use crate::providers::ProviderError;

/// Service layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input shape; nothing was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    #[error("Product {product_id} ({sku}) is out of stock: available {available}, requested {requested}")]
    OutOfStock {
        product_id: String,
        sku: String,
        available: i64,
        requested: i64,
    },

    #[error("Order {0} is already paid")]
    AlreadyPaid(String),

    /// A provider reference that matches no payment.
    #[error("Unknown payment: {0}")]
    UnknownPayment(String),

    /// Network or 4xx/5xx failure talking to a payment provider.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// A write still conflicted after one retry.
    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_)
            | ServiceError::InsufficientStock { .. }
            | ServiceError::OutOfStock { .. }
            | ServiceError::AlreadyPaid(_) => 400,
            ServiceError::InvalidSignature(_) => 401,
            ServiceError::Forbidden(_) => 403,
            ServiceError::UnknownPayment(_) | ServiceError::NotFound(_) => 404,
            ServiceError::ConcurrencyConflict(_) => 409,
            ServiceError::Provider(_) => 502,
            ServiceError::Database(_) => 500,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::ProductNotFound(id) => ServiceError::NotFound(format!("Product {id}")),
            CoreError::InsufficientStock {
                sku,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                sku,
                available,
                requested,
            },
            CoreError::OutOfStock {
                product_id,
                sku,
                available,
                requested,
            } => ServiceError::OutOfStock {
                product_id,
                sku,
                available,
                requested,
            },
            CoreError::AlreadyPaid { order_id } => ServiceError::AlreadyPaid(order_id),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound { entity, id } => ServiceError::NotFound(format!("{entity} {id}")),
            DbError::Domain(core) => core.into(),
            e @ (DbError::Conflict(_)
            | DbError::PoolExhausted
            | DbError::UniqueViolation { .. }
            | DbError::DuplicateMutation { .. }) => ServiceError::ConcurrencyConflict(e.to_string()),
            other => ServiceError::Database(other.to_string()),
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::InvalidSignature(reason) => ServiceError::InvalidSignature(reason),
            ProviderError::Unsupported(reason) => ServiceError::Validation(reason),
            other => ServiceError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::Validation("x".into()).status_code(), 400);
        assert_eq!(ServiceError::AlreadyPaid("o".into()).status_code(), 400);
        assert_eq!(ServiceError::UnknownPayment("r".into()).status_code(), 404);
        assert_eq!(ServiceError::ConcurrencyConflict("c".into()).status_code(), 409);
        assert_eq!(ServiceError::Provider("p".into()).status_code(), 502);
        assert_eq!(ServiceError::InvalidSignature("s".into()).status_code(), 401);
    }

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let err: ServiceError = DbError::Domain(CoreError::InsufficientStock {
            sku: "TEE".to_string(),
            available: 4,
            requested: 10,
        })
        .into();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 4, .. }));

        let err: ServiceError = CoreError::AlreadyPaid {
            order_id: "o-1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Order o-1 is already paid");

        let err: ServiceError = CoreError::PayloadMismatch {
            method: "card".to_string(),
        }
        .into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_db_errors() {
        let err: ServiceError = DbError::Conflict("database is locked".to_string()).into();
        assert!(matches!(err, ServiceError::ConcurrencyConflict(_)));

        let err: ServiceError = DbError::not_found("Order", "o-9").into();
        assert!(matches!(err, ServiceError::NotFound(ref m) if m == "Order o-9"));

        let err: ServiceError = DbError::QueryFailed("boom".to_string()).into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_provider_errors() {
        let err: ServiceError = ProviderError::InvalidSignature("mismatch".to_string()).into();
        assert!(matches!(err, ServiceError::InvalidSignature(_)));

        let err: ServiceError = ProviderError::Rejected {
            status: 500,
            message: "down".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 502);
    }
}
