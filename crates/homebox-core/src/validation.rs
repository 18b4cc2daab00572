//! # Validation Module
//!
//! Input checks run before a mutation is sent. Existence checks against the
//! cache live with the mutation operations; these only look at the values.
//!
//! ## Usage
//! ```rust
//! use homebox_core::validation::{validate_id, validate_name};
//!
//! validate_id("item_id", "0b4e6c9e-1f7a-4f8e-9a43-5d2c1e0f9a11").unwrap();
//! assert!(validate_name("name", "   ").is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest name Homebox accepts for items and locations.
pub const MAX_NAME_LEN: usize = 255;

/// Longest description Homebox accepts.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Validates an opaque server id.
///
/// ## Rules
/// - Must not be empty
/// - Must not contain whitespace or `/` (it becomes a path segment)
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace or '/'".to_string(),
        });
    }

    Ok(())
}

/// Validates an item, location or field name.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an optional description.
pub fn validate_description(description: &str) -> ValidationResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(())
}

/// Quantities may be zero but not negative.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::Negative {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Prices may be zero but not negative, and must be finite.
pub fn validate_price(price: f64) -> ValidationResult<()> {
    if !price.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: "purchase_price".to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if price < 0.0 {
        return Err(ValidationError::Negative {
            field: "purchase_price".to_string(),
        });
    }
    Ok(())
}
