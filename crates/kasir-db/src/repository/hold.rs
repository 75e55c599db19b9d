//! # Hold Repository
//!
//! The shared queue of held carts ("tabs").
//!
//! Lines are stored as one JSON column: a hold is always read and written
//! whole, and nothing queries inside it. Every local write is queued for
//! sync so the other tills of the store see the same queue.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::sync::{enqueue, entity, op, DeletedPayload, OutboxWrite};
use kasir_core::{HoldOrder, Money};

const HOLD_COLUMNS: &str =
    "id, store_id, label, buyer, operator, lines, total, sync_version, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct HoldRow {
    id: String,
    store_id: String,
    label: String,
    buyer: String,
    operator: String,
    lines: String,
    total: Money,
    sync_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HoldRow> for HoldOrder {
    type Error = DbError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(HoldOrder {
            lines: serde_json::from_str(&row.lines)?,
            id: row.id,
            store_id: row.store_id,
            label: row.label,
            buyer: row.buyer,
            operator: row.operator,
            total: row.total,
            sync_version: row.sync_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HoldRepository {
    pool: SqlitePool,
}

impl HoldRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HoldRepository { pool }
    }

    /// Saves a hold. Re-holding a resumed cart updates the same row and
    /// bumps its `sync_version`; `created_at` stays.
    pub async fn upsert(&self, hold: &HoldOrder) -> DbResult<HoldOrder> {
        debug!(id = %hold.id, label = %hold.label, "Saving hold");

        let lines = serde_json::to_string(&hold.lines)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO hold_orders (
                id, store_id, label, buyer, operator, lines, total,
                sync_version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                buyer = excluded.buyer,
                operator = excluded.operator,
                lines = excluded.lines,
                total = excluded.total,
                sync_version = hold_orders.sync_version + 1,
                updated_at = excluded.updated_at
            WHERE hold_orders.store_id = excluded.store_id
            "#,
        )
        .bind(&hold.id)
        .bind(&hold.store_id)
        .bind(&hold.label)
        .bind(&hold.buyer)
        .bind(&hold.operator)
        .bind(&lines)
        .bind(hold.total)
        .bind(hold.sync_version)
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Hold", &hold.id));
        }

        let row = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM hold_orders WHERE id = ?1"
        ))
        .bind(&hold.id)
        .fetch_one(&mut *tx)
        .await?;
        let stored = HoldOrder::try_from(row)?;

        enqueue(
            &mut tx,
            OutboxWrite {
                store_id: &stored.store_id,
                entity_type: entity::HOLD_ORDER,
                entity_id: &stored.id,
                record_id: &stored.id,
                operation: op::UPSERT,
                payload: &stored,
            },
        )
        .await?;

        tx.commit().await?;

        info!(id = %stored.id, total = %stored.total, "Cart held");
        Ok(stored)
    }

    pub async fn get(&self, store_id: &str, id: &str) -> DbResult<Option<HoldOrder>> {
        let row = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM hold_orders WHERE id = ?1 AND store_id = ?2"
        ))
        .bind(id)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HoldOrder::try_from).transpose()
    }

    /// Most recently touched first.
    pub async fn list(&self, store_id: &str) -> DbResult<Vec<HoldOrder>> {
        let rows = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM hold_orders WHERE store_id = ?1 \
             ORDER BY updated_at DESC, rowid DESC"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HoldOrder::try_from).collect()
    }

    pub async fn delete(&self, store_id: &str, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM hold_orders WHERE id = ?1 AND store_id = ?2")
            .bind(id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Hold", id));
        }

        enqueue(
            &mut tx,
            OutboxWrite {
                store_id,
                entity_type: entity::HOLD_ORDER,
                entity_id: id,
                record_id: id,
                operation: op::DELETE,
                payload: &DeletedPayload { id },
            },
        )
        .await?;

        tx.commit().await?;

        debug!(id = %id, "Hold deleted");
        Ok(())
    }

    // =========================================================================
    // Inbound replication
    // =========================================================================

    /// Applies a hold written on another till if it is newer than ours.
    pub async fn apply_remote(&self, hold: &HoldOrder) -> DbResult<bool> {
        let lines = serde_json::to_string(&hold.lines)?;

        let result = sqlx::query(
            r#"
            INSERT INTO hold_orders (
                id, store_id, label, buyer, operator, lines, total,
                sync_version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                buyer = excluded.buyer,
                operator = excluded.operator,
                lines = excluded.lines,
                total = excluded.total,
                sync_version = excluded.sync_version,
                updated_at = excluded.updated_at
            WHERE excluded.sync_version > hold_orders.sync_version
            AND hold_orders.store_id = excluded.store_id
            "#,
        )
        .bind(&hold.id)
        .bind(&hold.store_id)
        .bind(&hold.label)
        .bind(&hold.buyer)
        .bind(&hold.operator)
        .bind(&lines)
        .bind(hold.total)
        .bind(hold.sync_version)
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a hold settled or deleted on another till.
    pub async fn delete_remote(&self, store_id: &str, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM hold_orders WHERE id = ?1 AND store_id = ?2")
            .bind(id)
            .bind(store_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
