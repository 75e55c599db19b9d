//! # Local Store Errors
//!
//! ```text
//! sqlx::Error ───────┐
//! MigrateError ──────┼──► DbError ──► ApiError (terminal)
//! kasir_core ────────┘        │
//!   CoreError                 └── kind(): the cashier-facing category, if any
//! ```
//!
//! Guarded updates (`... WHERE status = 'PAID'` and friends) that touch no
//! row report `NotFound`, so "already refunded" and "never existed" read
//! the same to the caller.

use kasir_core::{CoreError, ErrorKind};
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `UNIQUE constraint failed: <table>.<column>`
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The file could not be opened, or the pool is closed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No free connection, or SQLite stayed locked past the busy timeout.
    #[error("Local store busy")]
    PoolExhausted,

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A JSON column or outbox payload that does not parse.
    #[error("Stored data unreadable: {0}")]
    Serialization(String),

    #[error(transparent)]
    Domain(#[from] CoreError),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Worth retrying in a moment. Surfaces as `TRANSIENT_IO`.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_) | DbError::PoolExhausted)
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::NotFound { .. } => Some(ErrorKind::NotFound),
            DbError::Domain(err) => Some(err.kind()),
            err if err.is_transient() => Some(ErrorKind::TransientIo),
            _ => None,
        }
    }

    fn from_constraint(message: &str) -> Option<Self> {
        if let Some(target) = message.strip_prefix("UNIQUE constraint failed: ") {
            return Some(DbError::UniqueViolation {
                field: target.to_string(),
                value: String::new(),
            });
        }
        if message.starts_with("FOREIGN KEY constraint failed") {
            return Some(DbError::ForeignKeyViolation {
                message: message.to_string(),
            });
        }
        if message.contains("database is locked") || message.contains("database is busy") {
            return Some(DbError::PoolExhausted);
        }
        None
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_constraint(db_err.message())
                .unwrap_or_else(|| DbError::QueryFailed(db_err.message().to_string())),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("database closed".to_string()),
            sqlx::Error::Io(io) => DbError::ConnectionFailed(io.to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::Serialization(format!("column {}: {}", index, source))
            }
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_and_closed_are_transient() {
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::ConnectionFailed("disk".into()).is_transient());
        assert!(!DbError::not_found("Transaction", "t-1").is_transient());

        assert_eq!(DbError::PoolExhausted.kind(), Some(ErrorKind::TransientIo));
        assert_eq!(
            DbError::not_found("Transaction", "t-1").kind(),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(DbError::QueryFailed("x".into()).kind(), None);
    }

    #[test]
    fn test_constraint_messages() {
        assert!(matches!(
            DbError::from_constraint("UNIQUE constraint failed: transactions.invoice_no"),
            Some(DbError::UniqueViolation { ref field, .. }) if field == "transactions.invoice_no"
        ));
        assert!(matches!(
            DbError::from_constraint("FOREIGN KEY constraint failed"),
            Some(DbError::ForeignKeyViolation { .. })
        ));
        assert!(matches!(
            DbError::from_constraint("database is locked"),
            Some(DbError::PoolExhausted)
        ));
        assert!(DbError::from_constraint("no such table: nope").is_none());
    }

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let err: DbError = CoreError::invalid("stock must not be negative").into();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(err.to_string(), "Invalid input: stock must not be negative");
    }
}
