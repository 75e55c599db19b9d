//! # Sync State
//!
//! The till's view of the sync agent: status for the indicator, per-record
//! confirmation for receipts and lists, and the nudge after a local commit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sync Indicator                                       │
//! │                                                                         │
//! │  ● connected   3 pending            (SyncStatusDto)                    │
//! │                                                                         │
//! │  INV-0101240800   Rp 24.000   ✓ confirmed       (SyncRecordState)      │
//! │  INV-0101240815   Rp 12.000   ⟳ queued                                 │
//! │  INV-0101240822   Rp  8.000   ✗ failed                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

use kasir_core::SyncRecordState;
use kasir_sync::{SyncAgentHandle, SyncEventEmitter, SyncReporter, SyncStatus};

#[derive(Clone)]
pub struct SyncState {
    handle: SyncAgentHandle,
}

impl SyncState {
    pub fn new(handle: SyncAgentHandle) -> Self {
        SyncState { handle }
    }

    /// Agent status with a fresh outbox count, so the indicator moves even
    /// while the agent is offline.
    pub async fn status(&self) -> SyncStatusDto {
        let mut status = self.handle.status().await;
        match self.reporter().pending_count().await {
            Ok(pending) => status.pending_count = pending,
            Err(e) => warn!(%e, "Could not count pending sync entries"),
        }
        SyncStatusDto::from(&status)
    }

    pub fn reporter(&self) -> &SyncReporter {
        self.handle.reporter()
    }

    /// Tells the uploader new work is queued.
    pub fn nudge(&self) {
        self.handle.nudge();
    }

    /// State of one record. A failed lookup reads as LocalOnly so the
    /// cashier flow never sees a sync error.
    pub async fn record_state_or_local(&self, record_id: &str) -> SyncRecordState {
        match self.reporter().record_state(record_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(%e, record_id, "Could not read sync state");
                SyncRecordState::LocalOnly
            }
        }
    }
}

/// Sync status as sent to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusDto {
    /// Current connection state
    pub connection_state: String,

    /// Current sync mode
    pub sync_mode: String,

    /// Last acknowledged batch (RFC 3339)
    pub last_sync_at: Option<String>,

    /// Outbox entries not yet acknowledged
    pub pending_outbox_count: i64,

    /// Connected with no recorded error
    pub is_healthy: bool,

    pub error_message: Option<String>,

    pub remote_url: Option<String>,
}

impl From<&SyncStatus> for SyncStatusDto {
    fn from(status: &SyncStatus) -> Self {
        SyncStatusDto {
            connection_state: status.connection_state.to_string(),
            sync_mode: status.mode.to_string(),
            last_sync_at: status.last_sync.map(|t| t.to_rfc3339()),
            pending_outbox_count: status.pending_count,
            is_healthy: status.is_connected && status.last_error.is_none(),
            error_message: status.last_error.clone(),
            remote_url: status.remote_url.clone(),
        }
    }
}

// =============================================================================
// Event Emitter
// =============================================================================

/// Reports sync events to the log. A UI shell would forward them instead.
pub struct TracingEmitter;

impl SyncEventEmitter for TracingEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        info!(
            state = %status.connection_state,
            mode = %status.mode,
            pending = status.pending_count,
            "Sync status"
        );
    }

    fn emit_progress(&self, pending: i64, synced: i64) {
        debug!(pending, synced, "Sync progress");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(retryable, "Sync error: {}", message);
    }
}
