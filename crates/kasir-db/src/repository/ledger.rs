//! # Ledger Repository
//!
//! Finalized transactions, and the three atomic writes that touch them:
//! settlement, debt settlement and refund.
//!
//! ## Settlement Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               commit_settlement(&plan): ONE SQLite transaction          │
//! │                                                                         │
//! │  1. INSERT INTO transactions ... ON CONFLICT(id) DO NOTHING            │
//! │        │                                                                │
//! │        ├── 0 rows? ──► already committed: return stored record,        │
//! │        │               no other effect (retry is a no-op)              │
//! │        ▼                                                                │
//! │  2. INSERT transaction_lines (snapshot)                                │
//! │  3. UPDATE menu_items SET stock = MAX(stock - qty, 0)                  │
//! │        WHERE stock IS NOT NULL          (per tracked item)             │
//! │  4. DELETE the origin hold                                             │
//! │  5. enqueue: transaction/create, inventory_delta/delta (each),         │
//! │              hold_order/delete       all with record_id = tx id        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  COMMIT ← all or nothing                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Debt settlement and refund are guarded updates: they only match a row
//! in the state they expect, and zero affected rows means `NotFound`.
//! A record can therefore be refunded once and a debt settled once, even
//! with two tills racing.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::sync::{enqueue, entity, op, DeletedPayload, InventoryDeltaPayload, OutboxWrite};
use kasir_core::debt::DebtSettlement;
use kasir_core::refund::RefundPlan;
use kasir_core::{
    DebtSettlementRecord, Money, PaymentMethod, SettlementPlan, StockDelta, Transaction,
    TransactionLine, TransactionStatus,
};

const TRANSACTION_COLUMNS: &str = "id, store_id, invoice_no, total, method, paid_amount, \
     change_amount, remaining_debt, buyer, operator, created_at, status, refund_reason, \
     refund_at, settled_method, settled_amount, settled_at";

/// SQLite caps bound parameters per statement; line lookups are chunked.
const LINE_LOOKUP_CHUNK: usize = 500;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    store_id: String,
    invoice_no: String,
    total: Money,
    method: PaymentMethod,
    paid_amount: Money,
    change_amount: Money,
    remaining_debt: Money,
    buyer: String,
    operator: String,
    created_at: DateTime<Utc>,
    status: TransactionStatus,
    refund_reason: Option<String>,
    refund_at: Option<DateTime<Utc>>,
    settled_method: Option<PaymentMethod>,
    settled_amount: Option<Money>,
    settled_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_transaction(self, lines: Vec<TransactionLine>) -> Transaction {
        let debt_settlement = match (self.settled_method, self.settled_amount, self.settled_at) {
            (Some(method), Some(amount), Some(settled_at)) => Some(DebtSettlementRecord {
                method,
                amount,
                settled_at,
            }),
            _ => None,
        };

        Transaction {
            id: self.id,
            store_id: self.store_id,
            invoice_no: self.invoice_no,
            lines,
            total: self.total,
            method: self.method,
            paid_amount: self.paid_amount,
            change_amount: self.change_amount,
            remaining_debt: self.remaining_debt,
            buyer: self.buyer,
            operator: self.operator,
            created_at: self.created_at,
            status: self.status,
            refund_reason: self.refund_reason,
            refund_at: self.refund_at,
            debt_settlement,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    transaction_id: String,
    item_id: String,
    name: String,
    price: Money,
    qty: i64,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Writes a prepared settlement and everything that goes with it.
    ///
    /// Committing the same plan again returns the stored record and changes
    /// nothing.
    ///
    /// ## Errors
    /// - `Domain(ConfirmationRequired)` for an unconfirmed reclassified debt
    pub async fn commit_settlement(&self, plan: &SettlementPlan) -> DbResult<Transaction> {
        plan.ensure_committable()?;

        let record = &plan.transaction;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO transactions (
                id, store_id, invoice_no, total, method, paid_amount,
                change_amount, remaining_debt, buyer, operator, created_at, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'SUCCESS')
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.store_id)
        .bind(&record.invoice_no)
        .bind(record.total)
        .bind(record.method)
        .bind(record.paid_amount)
        .bind(record.change_amount)
        .bind(record.remaining_debt)
        .bind(&record.buyer)
        .bind(&record.operator)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            let existing = fetch_transaction(&mut tx, &record.store_id, &record.id)
                .await?
                .ok_or_else(|| DbError::not_found("Transaction", &record.id))?;
            tx.rollback().await?;

            info!(transaction_id = %record.id, "Settlement already committed");
            return Ok(existing);
        }

        for (position, line) in record.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transaction_lines (transaction_id, position, item_id, name, price, qty)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&record.id)
            .bind(position as i64)
            .bind(&line.item_id)
            .bind(&line.name)
            .bind(line.price)
            .bind(line.qty)
            .execute(&mut *tx)
            .await?;
        }

        for delta in &plan.stock_deltas {
            let result = sqlx::query(
                r#"
                UPDATE menu_items SET
                    stock = MAX(stock - ?3, 0),
                    sync_version = sync_version + 1,
                    updated_at = ?4
                WHERE id = ?1 AND store_id = ?2 AND stock IS NOT NULL
                "#,
            )
            .bind(&delta.item_id)
            .bind(&record.store_id)
            .bind(delta.qty)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                queue_delta(&mut tx, &record.store_id, &record.id, &delta.item_id, -delta.qty).await?;
            }
        }

        if let Some(hold_id) = &plan.hold_id {
            let result = sqlx::query("DELETE FROM hold_orders WHERE id = ?1 AND store_id = ?2")
                .bind(hold_id)
                .bind(&record.store_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() > 0 {
                enqueue(
                    &mut tx,
                    OutboxWrite {
                        store_id: &record.store_id,
                        entity_type: entity::HOLD_ORDER,
                        entity_id: hold_id,
                        record_id: &record.id,
                        operation: op::DELETE,
                        payload: &DeletedPayload { id: hold_id },
                    },
                )
                .await?;
            }
        }

        queue_transaction(&mut tx, record, op::CREATE).await?;

        tx.commit().await?;

        info!(
            transaction_id = %record.id,
            invoice_no = %record.invoice_no,
            total = %record.total,
            method = %record.method,
            "Transaction committed"
        );
        Ok(record.clone())
    }

    pub async fn get(&self, store_id: &str, id: &str) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        fetch_transaction(&mut conn, store_id, id).await
    }

    /// Records created in `[start, end)`, newest first. Refunded records are
    /// included; aggregation decides what counts.
    pub async fn list_between(
        &self,
        store_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Transaction>> {
        debug!(store_id = %store_id, %start, %end, "Listing transactions");

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE store_id = ?1 AND created_at >= ?2 AND created_at < ?3 \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(store_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?;

        with_lines(&mut conn, rows).await
    }

    /// Records created at or after `since`, any status. Feeds the quota.
    pub async fn count_since(&self, store_id: &str, since: DateTime<Utc>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE store_id = ?1 AND created_at >= ?2",
        )
        .bind(store_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// SUCCESS records with a balance still owed, oldest first.
    pub async fn open_debts(&self, store_id: &str) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE store_id = ?1 AND status = 'SUCCESS' AND remaining_debt > 0 \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(store_id)
        .fetch_all(&mut *conn)
        .await?;

        with_lines(&mut conn, rows).await
    }

    /// Persists a debt settlement.
    ///
    /// The update only matches an open debt whose balance is still the one
    /// the settlement was planned against.
    pub async fn settle_debt(&self, store_id: &str, settlement: &DebtSettlement) -> DbResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                method = ?3,
                paid_amount = ?4,
                remaining_debt = 0,
                settled_method = ?5,
                settled_amount = ?6,
                settled_at = ?7
            WHERE id = ?1 AND store_id = ?2
            AND status = 'SUCCESS' AND remaining_debt > 0 AND remaining_debt = ?6
            "#,
        )
        .bind(&settlement.transaction_id)
        .bind(store_id)
        .bind(settlement.method)
        .bind(settlement.paid_amount)
        .bind(settlement.record.method)
        .bind(settlement.amount)
        .bind(settlement.record.settled_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Open debt", &settlement.transaction_id));
        }

        let stored = fetch_transaction(&mut tx, store_id, &settlement.transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", &settlement.transaction_id))?;
        queue_transaction(&mut tx, &stored, op::SETTLE_DEBT).await?;

        tx.commit().await?;

        info!(
            transaction_id = %stored.id,
            amount = %settlement.amount,
            method = %settlement.record.method,
            "Debt settled"
        );
        Ok(stored)
    }

    /// Voids a SUCCESS record and puts tracked items back on the shelf.
    ///
    /// Items that were deleted or stopped tracking stock are skipped.
    pub async fn refund(&self, store_id: &str, plan: &RefundPlan) -> DbResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = 'REFUNDED',
                refund_reason = ?3,
                refund_at = ?4
            WHERE id = ?1 AND store_id = ?2 AND status = 'SUCCESS'
            "#,
        )
        .bind(&plan.transaction_id)
        .bind(store_id)
        .bind(&plan.reason)
        .bind(plan.refunded_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Refundable transaction", &plan.transaction_id));
        }

        for StockDelta { item_id, qty } in &plan.restock {
            let restocked = sqlx::query(
                r#"
                UPDATE menu_items SET
                    stock = stock + ?3,
                    sync_version = sync_version + 1,
                    updated_at = ?4
                WHERE id = ?1 AND store_id = ?2 AND stock IS NOT NULL
                "#,
            )
            .bind(item_id)
            .bind(store_id)
            .bind(qty)
            .bind(plan.refunded_at)
            .execute(&mut *tx)
            .await?;

            if restocked.rows_affected() > 0 {
                queue_delta(&mut tx, store_id, &plan.transaction_id, item_id, *qty).await?;
            } else {
                debug!(item_id = %item_id, "Refund line has no tracked item, skipping restock");
            }
        }

        let stored = fetch_transaction(&mut tx, store_id, &plan.transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", &plan.transaction_id))?;
        queue_transaction(&mut tx, &stored, op::REFUND).await?;

        tx.commit().await?;

        info!(transaction_id = %stored.id, reason = %plan.reason, "Transaction refunded");
        Ok(stored)
    }

    /// Removes a record outright. Stock is not restored.
    pub async fn delete_transaction(&self, store_id: &str, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM transactions WHERE id = ?1 AND store_id = ?2")
            .bind(id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction", id));
        }

        enqueue(
            &mut tx,
            OutboxWrite {
                store_id,
                entity_type: entity::TRANSACTION,
                entity_id: id,
                record_id: id,
                operation: op::DELETE,
                payload: &DeletedPayload { id },
            },
        )
        .await?;

        tx.commit().await?;

        info!(transaction_id = %id, "Transaction deleted");
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn fetch_transaction(
    conn: &mut SqliteConnection,
    store_id: &str,
    id: &str,
) -> DbResult<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 AND store_id = ?2"
    ))
    .bind(id)
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(with_lines(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Loads the line snapshots for `rows`, keeping the row order.
async fn with_lines(
    conn: &mut SqliteConnection,
    rows: Vec<TransactionRow>,
) -> DbResult<Vec<Transaction>> {
    let mut lines: HashMap<String, Vec<TransactionLine>> = HashMap::new();

    for chunk in rows.chunks(LINE_LOOKUP_CHUNK) {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT transaction_id, item_id, name, price, qty FROM transaction_lines \
             WHERE transaction_id IN (",
        );
        let mut ids = query.separated(", ");
        for row in chunk {
            ids.push_bind(row.id.clone());
        }
        ids.push_unseparated(") ORDER BY transaction_id, position");

        let found: Vec<LineRow> = query.build_query_as().fetch_all(&mut *conn).await?;
        for line in found {
            lines.entry(line.transaction_id).or_default().push(TransactionLine {
                item_id: line.item_id,
                name: line.name,
                price: line.price,
                qty: line.qty,
            });
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let own = lines.remove(&row.id).unwrap_or_default();
            row.into_transaction(own)
        })
        .collect())
}

async fn queue_transaction(
    conn: &mut SqliteConnection,
    record: &Transaction,
    operation: &str,
) -> DbResult<String> {
    enqueue(
        conn,
        OutboxWrite {
            store_id: &record.store_id,
            entity_type: entity::TRANSACTION,
            entity_id: &record.id,
            record_id: &record.id,
            operation,
            payload: record,
        },
    )
    .await
}

async fn queue_delta(
    conn: &mut SqliteConnection,
    store_id: &str,
    record_id: &str,
    item_id: &str,
    delta: i64,
) -> DbResult<String> {
    enqueue(
        conn,
        OutboxWrite {
            store_id,
            entity_type: entity::INVENTORY_DELTA,
            entity_id: item_id,
            record_id,
            operation: op::DELTA,
            payload: &InventoryDeltaPayload { item_id, delta },
        },
    )
    .await
}

// =============================================================================
// Unit Tests
// =============================================================================
