//! # Sync State Reporter
//!
//! Answers "has this record left the device yet?" for the sync indicator.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_id ──► outbox entries for the record                           │
//! │                                                                         │
//! │     any rejected      ──► Failed      (remote refused a write)         │
//! │     any unsynced      ──► LocalOnly   (queued, unconfirmed)            │
//! │     otherwise         ──► Confirmed   (includes "no entries left")     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A transaction, its stock deltas and its hold deletion share the
//! transaction id as `record_id`, so a receipt is Confirmed only when all
//! of them are.

use std::sync::Arc;

use kasir_core::SyncRecordState;
use kasir_db::Database;

use crate::error::SyncResult;

#[derive(Clone)]
pub struct SyncReporter {
    db: Arc<Database>,
}

impl SyncReporter {
    pub fn new(db: Arc<Database>) -> Self {
        SyncReporter { db }
    }

    pub async fn record_state(&self, record_id: &str) -> SyncResult<SyncRecordState> {
        Ok(self.db.sync_outbox().record_state(record_id).await?)
    }

    /// States for a page of records, in the order given.
    pub async fn record_states(
        &self,
        record_ids: &[String],
    ) -> SyncResult<Vec<(String, SyncRecordState)>> {
        let mut states = Vec::with_capacity(record_ids.len());
        for id in record_ids {
            states.push((id.clone(), self.record_state(id).await?));
        }
        Ok(states)
    }

    /// Entries still waiting to leave the device.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.sync_outbox().count_pending().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kasir_core::{HoldOrder, Money};
    use kasir_db::DbConfig;

    async fn setup() -> (Arc<Database>, SyncReporter) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        (db.clone(), SyncReporter::new(db))
    }

    fn hold(id: &str) -> HoldOrder {
        let now = Utc::now();
        HoldOrder {
            id: id.into(),
            store_id: "owner-1".into(),
            label: "Meja 1".into(),
            buyer: String::new(),
            operator: "kasir".into(),
            lines: vec![],
            total: Money::from_minor(8_000),
            sync_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_queued_write_is_local_only_until_acked() {
        let (db, reporter) = setup().await;
        db.holds().upsert(&hold("h-1")).await.unwrap();

        assert_eq!(reporter.record_state("h-1").await.unwrap(), SyncRecordState::LocalOnly);
        assert_eq!(reporter.pending_count().await.unwrap(), 1);

        let pending = db.sync_outbox().get_pending(10).await.unwrap();
        db.sync_outbox().mark_synced(&pending[0].id).await.unwrap();

        assert_eq!(reporter.record_state("h-1").await.unwrap(), SyncRecordState::Confirmed);
        assert_eq!(reporter.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejection_marks_record_failed() {
        let (db, reporter) = setup().await;
        db.holds().upsert(&hold("h-1")).await.unwrap();
        db.holds().upsert(&hold("h-2")).await.unwrap();

        let pending = db.sync_outbox().get_pending(10).await.unwrap();
        db.sync_outbox().mark_rejected(&pending[0].id, "schema").await.unwrap();

        let states = reporter
            .record_states(&["h-1".to_string(), "h-2".to_string(), "gone".to_string()])
            .await
            .unwrap();
        assert_eq!(
            states,
            vec![
                ("h-1".to_string(), SyncRecordState::Failed),
                ("h-2".to_string(), SyncRecordState::LocalOnly),
                ("gone".to_string(), SyncRecordState::Confirmed),
            ]
        );
        assert!(states[0].1.is_unconfirmed());
    }
}
