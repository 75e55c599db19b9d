//! # API Error Type
//!
//! Unified error type for terminal commands.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kasir                                  │
//! │                                                                         │
//! │  UI                          Rust Backend                               │
//! │  ──                          ────────────                               │
//! │                                                                         │
//! │  add_to_cart(item, 1)                                                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Database Error? ─── DbError::PoolExhausted ──────┐             │  │
//! │  │         │                                          │             │  │
//! │  │         ▼                                          ▼             │  │
//! │  │  Domain Error? ─── CoreError::StockExceeded ──── ApiError ─────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "STOCK_EXCEEDED", "message": "Stock exceeded for Es Teh..." }│
//! │  { "code": "CONFIRMATION_REQUIRED", "confirmation": "clear_cart", ... } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync failures never come through here for cashier commands: they are
//! reported by the sync indicator only.

use serde::Serialize;

use kasir_core::{Confirmation, CoreError, ErrorKind, ValidationError};
use kasir_db::DbError;
use kasir_sync::SyncError;

/// API error returned from terminal commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "QUOTA_EXCEEDED",
///   "message": "Monthly transaction quota reached: 3 of 3"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Which prompt to show when `code` is `CONFIRMATION_REQUIRED`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Requested quantity is above tracked stock
    StockExceeded,

    /// Monthly transaction or menu cap reached
    QuotaExceeded,

    /// Missing or malformed input
    InvalidInput,

    /// Role or feature denial
    Forbidden,

    /// Missing record, or one already in a terminal state
    NotFound,

    /// Storage temporarily unavailable
    TransientIo,

    /// The operator must confirm and retry
    ConfirmationRequired,

    /// Database operation failed for a non-transient reason
    DatabaseError,

    /// Internal error
    Internal,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::StockExceeded => ErrorCode::StockExceeded,
            ErrorKind::QuotaExceeded => ErrorCode::QuotaExceeded,
            ErrorKind::InvalidInput => ErrorCode::InvalidInput,
            ErrorKind::Forbidden => ErrorCode::Forbidden,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::TransientIo => ErrorCode::TransientIo,
            ErrorKind::ConfirmationRequired => ErrorCode::ConfirmationRequired,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            confirmation: None,
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates an input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::InvalidInput, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let confirmation = match &err {
            CoreError::ConfirmationRequired(which) => Some(*which),
            _ => None,
        };
        ApiError {
            code: err.kind().into(),
            message: err.to_string(),
            confirmation,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::from(CoreError::from(err))
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(e) => ApiError::from(e),
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, .. } => {
                ApiError::invalid(format!("{} already exists", field))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::invalid("Invalid reference")
            }
            err if err.is_transient() => {
                tracing::warn!(%err, "Local store temporarily unavailable");
                ApiError::new(ErrorCode::TransientIo, "Local store is busy, try again")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            err => {
                // Log the actual error but return a generic message
                tracing::error!(%err, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Only the sync commands return these.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        if err.is_config_error() {
            return ApiError::invalid(err.to_string());
        }
        tracing::warn!(%err, "Sync query failed");
        ApiError::new(ErrorCode::TransientIo, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result alias for commands.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_kind() {
        let err = ApiError::from(CoreError::StockExceeded {
            item_id: "m-1".into(),
            name: "Es Teh".into(),
            available: 2,
            requested: 3,
        });
        assert_eq!(err.code, ErrorCode::StockExceeded);

        let err = ApiError::from(CoreError::QuotaExceeded { limit: 3, used: 3 });
        assert_eq!(err.code, ErrorCode::QuotaExceeded);

        let err = ApiError::from(CoreError::MenuQuotaExceeded { limit: 10, used: 10 });
        assert_eq!(err.code, ErrorCode::QuotaExceeded);
    }

    #[test]
    fn test_confirmation_is_carried() {
        let err = ApiError::from(CoreError::ConfirmationRequired(Confirmation::ClearCart));
        assert_eq!(err.code, ErrorCode::ConfirmationRequired);
        assert_eq!(err.confirmation, Some(Confirmation::ClearCart));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CONFIRMATION_REQUIRED");
        assert_eq!(json["confirmation"], "clear_cart");
    }

    #[test]
    fn test_db_errors() {
        assert_eq!(ApiError::from(DbError::PoolExhausted).code, ErrorCode::TransientIo);
        assert_eq!(
            ApiError::from(DbError::ConnectionFailed("disk".into())).code,
            ErrorCode::TransientIo
        );
        assert_eq!(
            ApiError::from(DbError::not_found("Transaction", "t-1")).code,
            ErrorCode::NotFound
        );
        assert_eq!(
            ApiError::from(DbError::Domain(CoreError::forbidden("no"))).code,
            ErrorCode::Forbidden
        );
        assert_eq!(
            ApiError::from(DbError::QueryFailed("syntax".into())).code,
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn test_serializes_without_confirmation() {
        let json = serde_json::to_value(ApiError::invalid("Cart is empty")).unwrap();
        assert_eq!(json["code"], "INVALID_INPUT");
        assert!(json.get("confirmation").is_none());
    }
}
