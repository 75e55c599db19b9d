//! # Sync Commands
//!
//! Feeds the sync indicator. Nothing here ever blocks a sale.

use tracing::debug;

use kasir_core::SyncRecordState;

use crate::error::ApiResult;
use crate::state::{SyncState, SyncStatusDto};

/// Gets current sync status.
pub async fn get_sync_status(sync: &SyncState) -> SyncStatusDto {
    debug!("get_sync_status command");
    sync.status().await
}

/// Confirmed, queued or failed, for one record.
pub async fn get_record_state(sync: &SyncState, record_id: &str) -> ApiResult<SyncRecordState> {
    debug!(record_id = %record_id, "get_record_state command");
    Ok(sync.reporter().record_state(record_id).await?)
}

/// Outbox entries still waiting to leave the device.
pub async fn get_pending_sync_count(sync: &SyncState) -> ApiResult<i64> {
    Ok(sync.reporter().pending_count().await?)
}

/// Asks the uploader to run now.
pub fn sync_now(sync: &SyncState) {
    debug!("sync_now command");
    sync.nudge();
}

// =============================================================================
// Unit Tests
// =============================================================================
