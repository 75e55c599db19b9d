//! # Error Types
//!
//! Domain-specific error types for kasir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasir-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - The cashier-facing category of any error       │
//! │                                                                         │
//! │  kasir-db errors (separate crate)                                      │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  Terminal API errors (in app)                                          │
//! │  └── ApiError         - What the UI sees (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ErrorKind → ApiError → UI         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Blocking vs. non-blocking
//! Only `Forbidden`, `InvalidInput` and `StockExceeded` stop a cashier
//! synchronously. `TransientIo` never reaches the cashier: the write is
//! accepted locally and resolved through the sync indicator.

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// The category an error belongs to, independent of which crate raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorKind {
    /// Requested quantity exceeds tracked stock (local, recoverable).
    StockExceeded,
    /// Monthly transaction or menu cap reached (blocks checkout).
    QuotaExceeded,
    /// Missing or malformed input.
    InvalidInput,
    /// Role or feature denial.
    Forbidden,
    /// Missing record, or a record already in a terminal state.
    NotFound,
    /// Storage or network temporarily unavailable.
    TransientIo,
    /// The operation needs an explicit confirmation from the operator.
    ConfirmationRequired,
}

impl ErrorKind {
    /// Returns true if the cashier must act before continuing.
    pub fn blocks_cashier(&self) -> bool {
        matches!(
            self,
            ErrorKind::Forbidden
                | ErrorKind::InvalidInput
                | ErrorKind::StockExceeded
                | ErrorKind::QuotaExceeded
                | ErrorKind::ConfirmationRequired
        )
    }
}

/// Which confirmation the operator has to give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Confirmation {
    /// Clearing a non-empty cart.
    ClearCart,
    /// Resuming a hold over a non-empty cart.
    OverwriteCart,
    /// A cash tender below the total turns the sale into a debt.
    DebtReclassification,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Quantity in cart would exceed the item's tracked stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Tap "Es Teh" (stock 2, already 2 in cart)
    ///      │
    ///      ▼
    /// StockExceeded { available: 2, requested: 3 }
    ///      │
    ///      ▼
    /// Cart unchanged, UI shows "Stok habis"
    /// ```
    #[error("Stock exceeded for {name}: available {available}, requested {requested}")]
    StockExceeded {
        item_id: String,
        name: String,
        available: i64,
        requested: i64,
    },

    /// The store has used up its monthly transaction cap.
    #[error("Monthly transaction quota reached: {used} of {limit}")]
    QuotaExceeded { limit: i64, used: i64 },

    /// The store has used up its menu cap.
    #[error("Menu quota reached: {used} of {limit}")]
    MenuQuotaExceeded { limit: i64, used: i64 },

    /// Principal lacks the role or feature right.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Record missing or not in a state that allows the operation.
    #[error("{entity} not found or not eligible: {id}")]
    NotFound { entity: String, id: String },

    /// Input rejected before any state changed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operator confirmation missing.
    #[error("Confirmation required: {0:?}")]
    ConfirmationRequired(Confirmation),

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        CoreError::Forbidden(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidInput(reason.into())
    }

    /// Maps this error onto its cashier-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::StockExceeded { .. } => ErrorKind::StockExceeded,
            CoreError::QuotaExceeded { .. } | CoreError::MenuQuotaExceeded { .. } => {
                ErrorKind::QuotaExceeded
            }
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::ConfirmationRequired(_) => ErrorKind::ConfirmationRequired,
            CoreError::InvalidInput(_)
            | CoreError::CartTooLarge { .. }
            | CoreError::Validation(_) => ErrorKind::InvalidInput,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
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

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::StockExceeded {
            item_id: "m-1".to_string(),
            name: "Es Teh".to_string(),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Stock exceeded for Es Teh: available 2, requested 3"
        );

        let err = ValidationError::Negative {
            field: "stock".to_string(),
        };
        assert_eq!(err.to_string(), "stock must not be negative");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CoreError::QuotaExceeded { limit: 3, used: 3 }.kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            CoreError::not_found("Transaction", "t-1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::ConfirmationRequired(Confirmation::ClearCart).kind(),
            ErrorKind::ConfirmationRequired
        );

        let validation: CoreError = ValidationError::Required {
            field: "reason".into(),
        }
        .into();
        assert_eq!(validation.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_transient_io_never_blocks_cashier() {
        assert!(!ErrorKind::TransientIo.blocks_cashier());
        assert!(!ErrorKind::NotFound.blocks_cashier());
        assert!(ErrorKind::StockExceeded.blocks_cashier());
        assert!(ErrorKind::Forbidden.blocks_cashier());
    }
}
