//! # Debt Lifecycle
//!
//! The one mutation an open HUTANG record allows: paying off what is owed.
//!
//! ```text
//!   SUCCESS, remaining > 0 ──settle(method)──► SUCCESS, remaining = 0
//!                                              paid += remaining
//!                                              debt_settlement = {method, amount}
//!
//!   paid was 0  → method replaced        (HUTANG → QRIS,  badge "LUNAS (QRIS)")
//!   paid was >0 → method kept, composite (label "HUTANG+QRIS")
//! ```
//!
//! Stock is not touched; it left the shelf at sale time.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DebtSettlementRecord, PaymentMethod, Transaction, TransactionStatus};

/// The computed outcome of settling one debt.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtSettlement {
    pub transaction_id: String,
    /// Balance being cleared; also the guard for the storage update.
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_amount: Money,
    pub record: DebtSettlementRecord,
}

/// Plans settling the open balance of `tx` via `method`.
///
/// ## Errors
/// - `NotFound` if the record is refunded or has nothing owed
/// - `InvalidInput` if `method` is HUTANG
pub fn plan_debt_settlement(
    tx: &Transaction,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> CoreResult<DebtSettlement> {
    if tx.status != TransactionStatus::Success || !tx.remaining_debt.is_positive() {
        return Err(CoreError::not_found("Open debt", &tx.id));
    }
    if method == PaymentMethod::Hutang {
        return Err(CoreError::invalid("A debt cannot be settled with HUTANG"));
    }

    let amount = tx.remaining_debt;
    let resulting_method = if tx.paid_amount.is_zero() {
        method
    } else {
        tx.method
    };

    Ok(DebtSettlement {
        transaction_id: tx.id.clone(),
        amount,
        method: resulting_method,
        paid_amount: tx.paid_amount + amount,
        record: DebtSettlementRecord {
            method,
            amount,
            settled_at: now,
        },
    })
}

impl DebtSettlement {
    /// The record as it reads after the settlement is stored.
    pub fn apply(&self, tx: &Transaction) -> Transaction {
        Transaction {
            method: self.method,
            paid_amount: self.paid_amount,
            remaining_debt: Money::zero(),
            debt_settlement: Some(self.record.clone()),
            ..tx.clone()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
