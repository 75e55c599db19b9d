//! # Sync Outbox Repository
//!
//! The outbox queue behind offline-first replication, and the per-record
//! sync state derived from it.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g. commit_settlement)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO transactions / UPDATE menu_items ...           │   │
//! │  │                                                                 │   │
//! │  │  2. enqueue(): INSERT INTO sync_outbox                          │   │
//! │  │     (entity_type, entity_id, record_id, operation, payload)    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            OUTBOX PROCESSOR (kasir-sync)                        │   │
//! │  │                                                                 │   │
//! │  │  get_pending() ──► OutboxBatch ──► BatchAck                     │   │
//! │  │      acked    → mark_synced                                     │   │
//! │  │      rejected → mark_rejected   (record becomes Failed)         │   │
//! │  │      timeout  → mark_failed     (attempts += 1, retried)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  record_state(record_id):                                              │
//! │    any rejected → Failed │ any unsynced → LocalOnly │ else Confirmed   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never dropped because of their retry count.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use kasir_core::{SyncOutboxEntry, SyncRecordState};

// =============================================================================
// Entity Types and Operations
// =============================================================================

/// Values of `sync_outbox.entity_type`.
pub mod entity {
    pub const TRANSACTION: &str = "transaction";
    pub const INVENTORY_DELTA: &str = "inventory_delta";
    pub const HOLD_ORDER: &str = "hold_order";
    pub const MENU_ITEM: &str = "menu_item";
}

/// Values of `sync_outbox.operation`.
pub mod op {
    pub const CREATE: &str = "create";
    pub const UPSERT: &str = "upsert";
    pub const DELETE: &str = "delete";
    pub const REFUND: &str = "refund";
    pub const SETTLE_DEBT: &str = "settle_debt";
    pub const DELTA: &str = "delta";
}

/// Payload of an `inventory_delta` entry. Stock replicates as deltas so two
/// tills selling the same item converge on the backing store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDeltaPayload<'a> {
    pub item_id: &'a str,
    pub delta: i64,
}

/// Payload of a delete entry.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedPayload<'a> {
    pub id: &'a str,
}

/// One write to queue alongside a local mutation.
#[derive(Debug)]
pub struct OutboxWrite<'a, P: Serialize> {
    pub store_id: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub record_id: &'a str,
    pub operation: &'a str,
    pub payload: &'a P,
}

/// Inserts an outbox entry on the caller's connection.
///
/// Pass the open SQLite transaction (`&mut *tx`) so the entry commits with
/// the mutation it describes.
pub(crate) async fn enqueue<P: Serialize>(
    conn: &mut SqliteConnection,
    write: OutboxWrite<'_, P>,
) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(write.payload)?;

    debug!(
        entity_type = %write.entity_type,
        entity_id = %write.entity_id,
        operation = %write.operation,
        "Queuing for sync"
    );

    sqlx::query(
        r#"
        INSERT INTO sync_outbox (
            id, store_id, entity_type, entity_id, record_id, operation,
            payload, attempts, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)
        "#,
    )
    .bind(&id)
    .bind(write.store_id)
    .bind(write.entity_type)
    .bind(write.entity_id)
    .bind(write.record_id)
    .bind(write.operation)
    .bind(payload)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    Ok(id)
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    pool: SqlitePool,
}

impl SyncOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncOutboxRepository { pool }
    }

    /// Entries waiting for an acknowledgement, oldest first.
    ///
    /// Rejected entries are excluded; they stay as the record's Failed marker.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<SyncOutboxEntry>> {
        let entries = sqlx::query_as::<_, SyncOutboxEntry>(
            r#"
            SELECT id, store_id, entity_type, entity_id, record_id, operation,
                   payload, attempts, last_error, created_at, attempted_at,
                   synced_at, rejected_at
            FROM sync_outbox
            WHERE synced_at IS NULL AND rejected_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                synced_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a retryable failure. The entry stays pending.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a permanent rejection by the backing store.
    pub async fn mark_rejected(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3,
                rejected_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL AND rejected_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Whether every write belonging to `record_id` has left the device.
    pub async fn record_state(&self, record_id: &str) -> DbResult<SyncRecordState> {
        let (unsynced, rejected): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN synced_at IS NULL AND rejected_at IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN rejected_at IS NOT NULL THEN 1 ELSE 0 END), 0)
            FROM sync_outbox
            WHERE record_id = ?1
            "#,
        )
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncRecordState::from_counts(unsynced, rejected))
    }

    /// Deletes entries acknowledged before `now - days_old`.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_old_entries(&self, days_old: u32, now: DateTime<Utc>) -> DbResult<u64> {
        let cutoff = now - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM sync_outbox
            WHERE synced_at IS NOT NULL
            AND synced_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn queue(db: &Database, record_id: &str, entity_id: &str) -> String {
        let mut conn = db.pool().acquire().await.unwrap();
        enqueue(
            &mut conn,
            OutboxWrite {
                store_id: "store-1",
                entity_type: entity::INVENTORY_DELTA,
                entity_id,
                record_id,
                operation: op::DELTA,
                payload: &InventoryDeltaPayload {
                    item_id: entity_id,
                    delta: -2,
                },
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_pending_in_queue_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = queue(&db, "tx-1", "mie").await;
        let second = queue(&db, "tx-1", "teh").await;

        let pending = db.sync_outbox().get_pending(10).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(pending[0].payload, r#"{"itemId":"mie","delta":-2}"#);
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_state_transitions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.sync_outbox();

        let a = queue(&db, "tx-1", "mie").await;
        let b = queue(&db, "tx-1", "teh").await;
        assert_eq!(outbox.record_state("tx-1").await.unwrap(), SyncRecordState::LocalOnly);

        // A retryable failure keeps the entry pending.
        outbox.mark_failed(&a, "timeout").await.unwrap();
        assert_eq!(outbox.record_state("tx-1").await.unwrap(), SyncRecordState::LocalOnly);
        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("timeout"));

        outbox.mark_synced(&a).await.unwrap();
        outbox.mark_synced(&b).await.unwrap();
        assert_eq!(outbox.record_state("tx-1").await.unwrap(), SyncRecordState::Confirmed);

        // Nothing queued at all counts as confirmed.
        assert_eq!(outbox.record_state("nope").await.unwrap(), SyncRecordState::Confirmed);
    }

    #[tokio::test]
    async fn test_rejected_entry_marks_record_failed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.sync_outbox();

        let a = queue(&db, "tx-2", "mie").await;
        outbox.mark_rejected(&a, "unknown store").await.unwrap();

        assert_eq!(outbox.record_state("tx-2").await.unwrap(), SyncRecordState::Failed);
        assert!(outbox.get_pending(10).await.unwrap().is_empty());
        assert_eq!(outbox.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_old_synced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.sync_outbox();

        let synced = queue(&db, "tx-3", "mie").await;
        queue(&db, "tx-3", "teh").await;
        outbox.mark_synced(&synced).await.unwrap();

        assert_eq!(outbox.cleanup_old_entries(7, Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + Duration::days(8);
        assert_eq!(outbox.cleanup_old_entries(7, later).await.unwrap(), 1);
        assert_eq!(outbox.count_pending().await.unwrap(), 1);
    }
}
