//! # Validation Module
//!
//! Input validation for checkout, payment and catalog requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  └── Shape and types of the request                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Field rules, raised before any state is touched                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0, stock = stock_in - stock_out)                  │
//! │  ├── UNIQUE (sku, order_number, mutation token)                        │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{Address, NewProduct};
use crate::{MAX_ITEM_QUANTITY, MAX_LINE_ITEMS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Rejects empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Trims and uppercases a SKU, then validates it.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, numbers, hyphens, underscores
///
/// ## Example
/// ```rust
/// use storefront_core::validation::normalize_sku;
///
/// assert_eq!(normalize_sku(" tshirt-m ").unwrap(), "TSHIRT-M");
/// assert!(normalize_sku("has space").is_err());
/// ```
pub fn normalize_sku(sku: &str) -> ValidationResult<String> {
    let sku = sku.trim().to_uppercase();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(sku)
}

/// Product names are 1-200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_required("name", name)?;
    if name.trim().len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }
    Ok(())
}

/// ISO 4217 style: three ASCII letters.
pub fn validate_currency(currency: &str) -> ValidationResult<()> {
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter ISO 4217 code".to_string(),
        });
    }
    Ok(())
}

/// Mobile-money numbers: optional leading `+`, then 9-15 digits.
///
/// Spaces and dashes are tolerated as separators.
pub fn validate_mobile_number(number: &str) -> ValidationResult<()> {
    let trimmed = number.trim();
    let digits: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "mobile_number".to_string(),
        });
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) || !(9..=15).contains(&digits.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "mobile_number".to_string(),
            reason: "must be 9 to 15 digits".to_string(),
        });
    }

    Ok(())
}

/// Idempotency tokens are opaque but bounded.
pub fn validate_token(token: &str) -> ValidationResult<()> {
    validate_required("idempotency token", token)?;
    if token.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "idempotency token".to_string(),
            max: 200,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line-item or ledger quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    validate_non_negative_cents("price", cents)
}

/// Tax, shipping and discount amounts may be zero but never negative.
pub fn validate_non_negative_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// An order holds at most MAX_LINE_ITEMS (100) lines.
pub fn validate_line_item_count(count: usize) -> ValidationResult<()> {
    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_LINE_ITEMS as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

pub fn validate_address(address: &Address) -> ValidationResult<()> {
    validate_required("shipping_address.recipient_name", &address.recipient_name)?;
    validate_required("shipping_address.line1", &address.line1)?;
    validate_required("shipping_address.city", &address.city)?;
    validate_required("shipping_address.country", &address.country)?;
    if let Some(phone) = &address.phone {
        validate_mobile_number(phone).map_err(|_| ValidationError::InvalidFormat {
            field: "shipping_address.phone".to_string(),
            reason: "must be 9 to 15 digits".to_string(),
        })?;
    }
    Ok(())
}

/// Validates a catalog insert and returns the normalized SKU.
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<String> {
    let sku = normalize_sku(&product.sku)?;
    validate_product_name(&product.name)?;
    validate_price_cents(product.price_cents)?;
    validate_non_negative_cents("initial_stock", product.initial_stock)?;
    if let Some(threshold) = product.low_stock_threshold {
        validate_non_negative_cents("low_stock_threshold", threshold)?;
    }
    Ok(sku)
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sku() {
        assert_eq!(normalize_sku("tshirt-m").unwrap(), "TSHIRT-M");
        assert_eq!(normalize_sku("  mug_2 ").unwrap(), "MUG_2");

        assert!(normalize_sku("").is_err());
        assert!(normalize_sku("   ").is_err());
        assert!(normalize_sku("has space").is_err());
        assert!(normalize_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_money_fields() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-100).is_err());
        assert!(validate_non_negative_cents("shipping", 300).is_ok());
        assert!(validate_non_negative_cents("discount", -1).is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("rwf").is_ok());
        assert!(validate_currency("US").is_err());
        assert!(validate_currency("U$D").is_err());
    }

    #[test]
    fn test_validate_mobile_number() {
        assert!(validate_mobile_number("0781234567").is_ok());
        assert!(validate_mobile_number("+250 781 234 567").is_ok());
        assert!(validate_mobile_number("").is_err());
        assert!(validate_mobile_number("12345").is_err());
        assert!(validate_mobile_number("078ABC4567").is_err());
    }

    #[test]
    fn test_validate_line_item_count() {
        assert!(validate_line_item_count(1).is_ok());
        assert!(validate_line_item_count(MAX_LINE_ITEMS).is_ok());
        assert!(validate_line_item_count(MAX_LINE_ITEMS + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_validate_new_product() {
        let product = NewProduct {
            sku: "mug".to_string(),
            name: "Mug".to_string(),
            description: None,
            price_cents: 500,
            initial_stock: 5,
            low_stock_threshold: None,
            is_featured: false,
        };
        assert_eq!(validate_new_product(&product).unwrap(), "MUG");

        let mut negative = product.clone();
        negative.initial_stock = -1;
        assert!(validate_new_product(&negative).is_err());
    }
}
