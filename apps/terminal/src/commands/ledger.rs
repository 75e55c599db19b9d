//! # Ledger Commands
//!
//! Reading and amending finalized records. A record only ever changes by
//! debt settlement, refund, or outright deletion by the owner.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SUCCESS, remaining > 0 ── settle_debt(QRIS) ──► SUCCESS, remaining 0  │
//! │        │                                          method HUTANG+QRIS    │
//! │        │                                                                │
//! │        └──────────── refund_transaction(reason) ──► REFUNDED           │
//! │                          stock put back                                 │
//! │                                                                         │
//! │  delete_transaction ── owner only, stock NOT restored                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use kasir_core::report::{self, DateRange, DebtLedgerView, ReportSummary};
use kasir_core::{debt, refund, Feature, PaymentMethod, SyncRecordState, Transaction};

use crate::error::{ApiError, ApiResult};
use crate::state::{ConfigState, DbState, SessionState, SyncState};

/// Debts are settled from the cashier screen or the table list.
const DEBT_FEATURES: [Feature; 3] = [Feature::Report, Feature::Cashier, Feature::Table];

/// One row of the transaction list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// `TUNAI`, `QRIS`, `HUTANG` or a composite such as `HUTANG+QRIS`.
    pub method_label: String,
    pub status_label: &'static str,
    pub sync_state: SyncRecordState,
}

/// Records in `range`, newest first, each with its sync badge.
pub async fn list_transactions(
    db: &DbState,
    session: &SessionState,
    config: &ConfigState,
    sync: &SyncState,
    range: DateRange,
) -> ApiResult<Vec<TransactionEntry>> {
    debug!(?range, "list_transactions command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::Report, now)?;
    let (start, end) = range.resolve(now, config.offset())?;

    let records = db.inner().ledger().list_between(&store_id, start, end).await?;
    let ids: Vec<String> = records.iter().map(|tx| tx.id.clone()).collect();
    let states = match sync.reporter().record_states(&ids).await {
        Ok(states) => states.into_iter().map(|(_, state)| state).collect(),
        Err(e) => {
            warn!(%e, "Could not read sync states for transaction list");
            vec![SyncRecordState::LocalOnly; records.len()]
        }
    };

    Ok(records
        .into_iter()
        .zip(states)
        .map(|(transaction, sync_state)| TransactionEntry {
            method_label: transaction.method_label(),
            status_label: transaction.status_label(),
            transaction,
            sync_state,
        })
        .collect())
}

/// Totals for the report screen.
pub async fn report_summary(
    db: &DbState,
    session: &SessionState,
    config: &ConfigState,
    range: DateRange,
) -> ApiResult<ReportSummary> {
    debug!(?range, "report_summary command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::Report, now)?;
    let (start, end) = range.resolve(now, config.offset())?;

    let records = db.inner().ledger().list_between(&store_id, start, end).await?;
    Ok(report::summarize(&records))
}

/// Every open debt for the store, grouped by buyer.
pub async fn open_debts(db: &DbState, session: &SessionState) -> ApiResult<DebtLedgerView> {
    debug!("open_debts command");

    let store_id = session.scoped_any(&DEBT_FEATURES, Utc::now())?;
    let records = db.inner().ledger().open_debts(&store_id).await?;
    Ok(DebtLedgerView::from_transactions(records))
}

/// Clears the open balance of a debt.
///
/// ## Errors
/// - `NOT_FOUND` when the record is unknown, refunded or already paid
/// - `INVALID_INPUT` when `method` is HUTANG
pub async fn settle_debt(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    transaction_id: &str,
    method: PaymentMethod,
) -> ApiResult<Transaction> {
    debug!(transaction_id = %transaction_id, method = %method, "settle_debt command");

    let now = Utc::now();
    let store_id = session.scoped_any(&DEBT_FEATURES, now)?;
    let ledger = db.inner().ledger();

    let tx = ledger
        .get(&store_id, transaction_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction", transaction_id))?;
    let settlement = debt::plan_debt_settlement(&tx, method, now)?;

    let stored = ledger.settle_debt(&store_id, &settlement).await?;
    sync.nudge();

    info!(
        transaction_id = %stored.id,
        amount = %settlement.amount,
        label = %stored.method_label(),
        "Debt settled"
    );
    Ok(stored)
}

/// Voids a SUCCESS record and returns its tracked stock.
pub async fn refund_transaction(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    transaction_id: &str,
    reason: &str,
) -> ApiResult<Transaction> {
    debug!(transaction_id = %transaction_id, "refund_transaction command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::Report, now)?;
    let ledger = db.inner().ledger();

    let tx = ledger
        .get(&store_id, transaction_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction", transaction_id))?;
    let plan = refund::plan_refund(&tx, reason, now)?;

    let stored = ledger.refund(&store_id, &plan).await?;
    sync.nudge();

    Ok(stored)
}

/// Removes a record. Owners only; stock is not restored.
pub async fn delete_transaction(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    transaction_id: &str,
) -> ApiResult<()> {
    debug!(transaction_id = %transaction_id, "delete_transaction command");

    let now = Utc::now();
    let store_id = session.store_id(now)?;
    if !session.with_session(|ctx, _| ctx.can_delete_transactions(now)) {
        return Err(ApiError::forbidden("Only the store owner can delete transactions"));
    }

    db.inner().ledger().delete_transaction(&store_id, transaction_id).await?;
    sync.nudge();

    warn!(transaction_id = %transaction_id, "Transaction deleted");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
