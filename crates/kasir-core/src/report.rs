//! # Reports & Debt Ledger View
//!
//! Aggregates over ledger records. Every total here skips REFUNDED records;
//! any other consumer of the ledger has to apply the same rule.
//!
//! ## Report Screen
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DateRange (Today | Yesterday | Last7Days | ThisMonth | Custom)        │
//! │       │ resolve(now, offset)                                            │
//! │       ▼                                                                 │
//! │  [start, end) in UTC ──► LedgerRepository::list_between ──► records     │
//! │                                                                         │
//! │  summarize(records)                                                     │
//! │  ├── gross    Σ total            (SUCCESS only)                         │
//! │  ├── cash_in  Σ collected().cash (SUCCESS only)                         │
//! │  ├── qris_in  Σ collected().qris (SUCCESS only)                         │
//! │  ├── debt     Σ remaining_debt   (SUCCESS only)                         │
//! │  └── count / refunded_count                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::clock::{day_start, local_date};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Transaction, TransactionStatus};

// =============================================================================
// Date Range
// =============================================================================

/// Report period picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[ts(export)]
pub enum DateRange {
    Today,
    Yesterday,
    /// The last seven days plus today.
    Last7Days,
    ThisMonth,
    /// Inclusive store-local dates.
    Custom {
        #[ts(as = "String")]
        from: NaiveDate,
        #[ts(as = "String")]
        to: NaiveDate,
    },
}

impl DateRange {
    /// Resolves to a half-open `[start, end)` UTC interval.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> CoreResult<(DateTime<Utc>, DateTime<Utc>)> {
        let today = local_date(now, offset);
        let tomorrow = today + Duration::days(1);

        let (from, until) = match *self {
            DateRange::Today => (today, tomorrow),
            DateRange::Yesterday => (today - Duration::days(1), today),
            DateRange::Last7Days => (today - Duration::days(7), tomorrow),
            DateRange::ThisMonth => {
                let first = today.with_day(1).unwrap_or(today);
                let next = first
                    .checked_add_months(Months::new(1))
                    .unwrap_or(tomorrow);
                (first, next)
            }
            DateRange::Custom { from, to } => {
                if from > to {
                    return Err(CoreError::invalid("Start date is after end date"));
                }
                (from, to + Duration::days(1))
            }
        };

        Ok((day_start(from, offset), day_start(until, offset)))
    }
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReportSummary {
    pub gross: Money,
    pub cash_in: Money,
    pub qris_in: Money,
    pub debt: Money,
    /// SUCCESS records.
    pub count: i64,
    pub refunded_count: i64,
}

pub fn summarize(records: &[Transaction]) -> ReportSummary {
    let mut summary = ReportSummary::default();
    for tx in records {
        if tx.status == TransactionStatus::Refunded {
            summary.refunded_count += 1;
            continue;
        }
        let collected = tx.collected();
        summary.gross += tx.total;
        summary.cash_in += collected.cash;
        summary.qris_in += collected.qris;
        summary.debt += tx.remaining_debt;
        summary.count += 1;
    }
    summary
}

// =============================================================================
// Debt Ledger View
// =============================================================================

/// Buyer name used when a debt was recorded without one.
pub const ANONYMOUS_BUYER: &str = "Umum";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BuyerDebt {
    pub buyer: String,
    pub amount: Money,
    pub records: i64,
}

/// Open balances, derived from the ledger.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DebtLedgerView {
    /// Oldest first.
    pub open: Vec<Transaction>,
    pub total_outstanding: Money,
    /// Largest balance first.
    pub outstanding_by_buyer: Vec<BuyerDebt>,
}

impl DebtLedgerView {
    pub fn from_transactions(records: impl IntoIterator<Item = Transaction>) -> Self {
        let mut open: Vec<Transaction> = records.into_iter().filter(Transaction::is_open_debt).collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut by_buyer: BTreeMap<String, BuyerDebt> = BTreeMap::new();
        for tx in &open {
            let buyer = match tx.buyer.trim() {
                "" => ANONYMOUS_BUYER,
                name => name,
            };
            let entry = by_buyer.entry(buyer.to_string()).or_insert_with(|| BuyerDebt {
                buyer: buyer.to_string(),
                amount: Money::zero(),
                records: 0,
            });
            entry.amount += tx.remaining_debt;
            entry.records += 1;
        }

        let mut outstanding_by_buyer: Vec<BuyerDebt> = by_buyer.into_values().collect();
        outstanding_by_buyer.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.buyer.cmp(&b.buyer)));

        DebtLedgerView {
            total_outstanding: open.iter().map(|tx| tx.remaining_debt).sum(),
            open,
            outstanding_by_buyer,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
    use crate::types::{DebtSettlementRecord, PaymentMethod};
    use chrono::TimeZone;

    fn wib() -> FixedOffset {
        offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES)
    }

    fn tx(
        id: &str,
        method: PaymentMethod,
        total: i64,
        paid: i64,
        change: i64,
        remaining: i64,
    ) -> Transaction {
        Transaction {
            id: id.into(),
            store_id: "store-1".into(),
            invoice_no: format!("INV-{}", id),
            lines: vec![],
            total: Money::from_minor(total),
            method,
            paid_amount: Money::from_minor(paid),
            change_amount: Money::from_minor(change),
            remaining_debt: Money::from_minor(remaining),
            buyer: String::new(),
            operator: "kasir".into(),
            created_at: Utc::now(),
            status: TransactionStatus::Success,
            refund_reason: None,
            refund_at: None,
            debt_settlement: None,
        }
    }

    #[test]
    fn test_summary_excludes_refunded() {
        let mut refunded = tx("r", PaymentMethod::Tunai, 50_000, 50_000, 0, 0);
        refunded.status = TransactionStatus::Refunded;

        let records = vec![
            tx("a", PaymentMethod::Tunai, 24_000, 30_000, 6_000, 0),
            tx("b", PaymentMethod::Qris, 15_000, 15_000, 0, 0),
            tx("c", PaymentMethod::Hutang, 10_000, 4_000, 0, 6_000),
            refunded,
        ];
        let s = summarize(&records);

        assert_eq!(s.gross.minor(), 49_000);
        assert_eq!(s.cash_in.minor(), 28_000);
        assert_eq!(s.qris_in.minor(), 15_000);
        assert_eq!(s.debt.minor(), 6_000);
        assert_eq!(s.count, 3);
        assert_eq!(s.refunded_count, 1);
    }

    #[test]
    fn test_summary_counts_settled_debt_by_settlement_method() {
        let mut settled = tx("d", PaymentMethod::Qris, 12_000, 12_000, 0, 0);
        settled.debt_settlement = Some(DebtSettlementRecord {
            method: PaymentMethod::Qris,
            amount: Money::from_minor(12_000),
            settled_at: Utc::now(),
        });
        let s = summarize(&[settled]);
        assert_eq!(s.qris_in.minor(), 12_000);
        assert_eq!(s.cash_in, Money::zero());
    }

    #[test]
    fn test_date_range_resolution() {
        // 10 Mar 2024 09:00 WIB
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 2, 0, 0).unwrap();

        let (start, end) = DateRange::Today.resolve(now, wib()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 9, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 10, 17, 0, 0).unwrap());

        let (start, end) = DateRange::Yesterday.resolve(now, wib()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 9, 17, 0, 0).unwrap());

        let (start, end) = DateRange::ThisMonth.resolve(now, wib()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 31, 17, 0, 0).unwrap());

        let (start, _) = DateRange::Last7Days.resolve(now, wib()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 2, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_custom_range() {
        let now = Utc::now();
        let from = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();

        let (start, end) = DateRange::Custom { from, to }.resolve(now, wib()).unwrap();
        assert_eq!(end - start, Duration::days(2));

        assert!(DateRange::Custom { from: to, to: from }
            .resolve(now, wib())
            .is_err());
    }

    #[test]
    fn test_debt_ledger_view() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let mut older = tx("old", PaymentMethod::Hutang, 20_000, 0, 0, 20_000);
        older.created_at = base;
        older.buyer = "Pak Wayan".into();
        let mut newer = tx("new", PaymentMethod::Hutang, 5_000, 0, 0, 5_000);
        newer.created_at = base + Duration::hours(2);
        let mut other = tx("other", PaymentMethod::Hutang, 7_000, 2_000, 0, 5_000);
        other.created_at = base + Duration::hours(1);
        other.buyer = "Pak Wayan".into();
        let paid = tx("paid", PaymentMethod::Tunai, 9_000, 9_000, 0, 0);

        let view = DebtLedgerView::from_transactions(vec![newer, paid, other, older]);

        let ids: Vec<&str> = view.open.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "other", "new"]);
        assert_eq!(view.total_outstanding.minor(), 30_000);
        assert_eq!(view.outstanding_by_buyer[0].buyer, "Pak Wayan");
        assert_eq!(view.outstanding_by_buyer[0].amount.minor(), 25_000);
        assert_eq!(view.outstanding_by_buyer[1].buyer, ANONYMOUS_BUYER);
    }
}
