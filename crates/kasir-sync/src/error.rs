//! # Sync Error Types
//!
//! Everything that can go wrong between the outbox and the backing store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  config ──────► InvalidConfig, MissingDeviceId, InvalidUrl, ConfigFile │
//! │                 fatal for the agent, the till stays offline            │
//! │                                                                         │
//! │  link ────────► ConnectionFailed, Disconnected, ConnectTimeout,        │
//! │                 WebSocket                 ──► backoff, retry           │
//! │                                                                         │
//! │  outbox ──────► BatchFailed, AckTimeout   ──► backoff, same batch      │
//! │                                                                         │
//! │  wire/inbound ► Encode, Decode, ApplyFailed ──► logged, skipped        │
//! │                                                                         │
//! │  local ───────► Storage, ChannelClosed                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these ever reach a cashier command. They are logged and folded
//! into the sync indicator.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Device ID not configured")]
    MissingDeviceId,

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Reading, parsing or writing the TOML file.
    #[error("Sync config file: {0}")]
    ConfigFile(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Disconnected from sync server")]
    Disconnected,

    #[error("No connection after {0} seconds")]
    ConnectTimeout(u64),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Could not encode message: {0}")]
    Encode(String),

    #[error("Could not decode message: {0}")]
    Decode(String),

    /// The remote could not take the batch as a whole.
    #[error("Outbox batch failed: {0}")]
    BatchFailed(String),

    /// No `BatchAck` arrived for the batch in flight.
    #[error("No acknowledgement for batch {batch_seq}")]
    AckTimeout { batch_seq: u64 },

    #[error("Failed to apply update: {0}")]
    ApplyFailed(String),

    #[error("Local store: {0}")]
    Storage(String),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

impl From<kasir_db::DbError> for SyncError {
    fn from(err: kasir_db::DbError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Encode(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            other => SyncError::WebSocket(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigFile(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigFile(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigFile(err.to_string())
    }
}

impl SyncError {
    /// True when the uploader should back off and send the same batch again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Disconnected
                | SyncError::ConnectTimeout(_)
                | SyncError::WebSocket(_)
                | SyncError::BatchFailed(_)
                | SyncError::AckTimeout { .. }
                | SyncError::ChannelClosed(_)
        )
    }

    /// The agent cannot run with this configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigFile(_)
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_and_outbox_failures_retry() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::ConnectTimeout(30).is_retryable());
        assert!(SyncError::AckTimeout { batch_seq: 4 }.is_retryable());
        assert!(SyncError::ChannelClosed("Ack").is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::MissingDeviceId.is_retryable());
        assert!(!SyncError::ApplyFailed("bad row".into()).is_retryable());
    }

    #[test]
    fn test_config_errors_are_not_link_errors() {
        let config = SyncError::InvalidUrl("ftp://x".into());
        assert!(config.is_config_error());
        assert!(!config.is_retryable());

        assert!(!SyncError::Decode("eof".into()).is_config_error());
        assert!(SyncError::ConfigFile("missing [store]".into()).is_config_error());
    }

    #[test]
    fn test_malformed_json_is_a_decode_error() {
        let err: SyncError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[test]
    fn test_db_error_becomes_storage() {
        let err: SyncError = kasir_db::DbError::not_found("Menu item", "m-1").into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.to_string().contains("m-1"));
        assert!(!err.is_retryable());
    }
}
