//! # Refund / Void
//!
//! Marks a SUCCESS record REFUNDED and returns its goods to stock.
//!
//! A refunded record stays in the ledger and in lists, but drops out of
//! every total and can never be settled or refunded again.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::settlement::StockDelta;
use crate::types::{Transaction, TransactionStatus};
use crate::validation::validate_refund_reason;

#[derive(Debug, Clone, PartialEq)]
pub struct RefundPlan {
    pub transaction_id: String,
    pub reason: String,
    pub refunded_at: DateTime<Utc>,
    /// Units to put back, per menu item. Manual lines are absent; items
    /// deleted since the sale are skipped by storage.
    pub restock: Vec<StockDelta>,
}

/// Plans refunding `tx`.
///
/// ## Errors
/// - `InvalidInput` if the reason is blank
/// - `NotFound` if the record is already refunded
pub fn plan_refund(tx: &Transaction, reason: &str, now: DateTime<Utc>) -> CoreResult<RefundPlan> {
    let reason = validate_refund_reason(reason)?;
    if tx.status != TransactionStatus::Success {
        return Err(CoreError::not_found("Refundable transaction", &tx.id));
    }

    let mut per_item: BTreeMap<&str, i64> = BTreeMap::new();
    for line in tx.lines.iter().filter(|l| !l.is_manual()) {
        *per_item.entry(line.item_id.as_str()).or_default() += line.qty;
    }

    Ok(RefundPlan {
        transaction_id: tx.id.clone(),
        reason,
        refunded_at: now,
        restock: per_item
            .into_iter()
            .map(|(item_id, qty)| StockDelta {
                item_id: item_id.to_string(),
                qty,
            })
            .collect(),
    })
}

impl RefundPlan {
    pub fn apply(&self, tx: &Transaction) -> Transaction {
        Transaction {
            status: TransactionStatus::Refunded,
            refund_reason: Some(self.reason.clone()),
            refund_at: Some(self.refunded_at),
            ..tx.clone()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
