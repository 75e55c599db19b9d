//! # Input Checks
//!
//! Field-level rules applied before anything touches a cart or the ledger.
//! Text comes back trimmed, so callers store what they validated.
//!
//! | Field          | Rule                               |
//! |----------------|------------------------------------|
//! | item name      | 1..=100 chars                      |
//! | category       | 0..=50 chars, blank means "Umum"   |
//! | refund reason  | 1..=200 chars                      |
//! | search query   | 0..=100 chars                      |
//! | quantity       | 1..=MAX_LINE_QUANTITY              |
//! | price, tender  | >= 0 (free items are fine)         |
//! | stock          | >= 0                               |

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_LINE_QUANTITY;

pub type ValidationResult<T> = Result<T, ValidationError>;

pub const DEFAULT_CATEGORY: &str = "Umum";

const NAME_MAX: usize = 100;
const CATEGORY_MAX: usize = 50;
const REASON_MAX: usize = 200;
const QUERY_MAX: usize = 100;

fn bounded(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

fn required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = bounded(field, value, max)?;
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(value)
}

fn non_negative(field: &str, negative: bool) -> ValidationResult<()> {
    if negative {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// ```rust
/// use kasir_core::validation::validate_item_name;
///
/// assert_eq!(validate_item_name(" Mie Goreng ").unwrap(), "Mie Goreng");
/// assert!(validate_item_name("   ").is_err());
/// ```
pub fn validate_item_name(name: &str) -> ValidationResult<String> {
    required("name", name, NAME_MAX)
}

pub fn validate_category(category: &str) -> ValidationResult<String> {
    let category = bounded("category", category, CATEGORY_MAX)?;
    Ok(if category.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category
    })
}

pub fn validate_refund_reason(reason: &str) -> ValidationResult<String> {
    required("reason", reason, REASON_MAX)
}

/// Empty matches everything.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    bounded("query", query, QUERY_MAX)
}

/// Applies to every add and every quantity edit. Removing a line is a
/// separate operation, so zero is never a valid quantity here.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if (1..=MAX_LINE_QUANTITY).contains(&qty) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        })
    }
}

pub fn validate_price(price: Money) -> ValidationResult<()> {
    non_negative("price", price.is_negative())
}

pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    non_negative("stock", stock < 0)
}

pub fn validate_tender(amount: Money) -> ValidationResult<()> {
    non_negative("tender", amount.is_negative())
}

/// Client-supplied ids (menu items, idempotent retries) must be UUIDs.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    let id = required("id", id, 36)?;
    uuid::Uuid::parse_str(&id)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must be a valid UUID".to_string(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_trimmed_and_bounded() {
        assert_eq!(validate_item_name("  Es Teh ").unwrap(), "Es Teh");
        assert!(matches!(
            validate_item_name(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_item_name(&"A".repeat(101)),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
        assert_eq!(validate_search_query("  ").unwrap(), "");
    }

    #[test]
    fn test_blank_category_is_umum() {
        assert_eq!(validate_category(" ").unwrap(), DEFAULT_CATEGORY);
        assert_eq!(validate_category("Minuman").unwrap(), "Minuman");
        assert!(validate_category(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_refund_reason_required() {
        assert!(validate_refund_reason("   ").is_err());
        assert_eq!(validate_refund_reason(" salah input ").unwrap(), "salah input");
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_amounts_not_negative() {
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(Money::from_minor(-1)).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-3).is_err());
        assert!(validate_tender(Money::from_minor(-500)).is_err());
    }

    #[test]
    fn test_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
