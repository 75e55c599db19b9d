//! # Settlement Engine
//!
//! Turns a cart and a payment choice into one ledger record plus the stock
//! deltas that go with it.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Checkout                                        │
//! │                                                                         │
//! │  CartSession + CheckoutRequest { method, tender }                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolve_payment(total, method, tender)                                 │
//! │       │   QRIS   → paid = total                                         │
//! │       │   HUTANG → paid = 0, remaining = total                          │
//! │       │   TUNAI  → T ≥ total: change = T − total                        │
//! │       │            T < total: becomes HUTANG, remaining = total − T     │
//! │       ▼                                                                 │
//! │  SettlementPlan::prepare()                                              │
//! │       │   fixes: transaction id, invoice no, stock deltas, hold id      │
//! │       │                                                                 │
//! │       ├── reclassified? ──► quote to cashier ──► confirm_debt()         │
//! │       ▼                                                                 │
//! │  LedgerRepository::commit_settlement(&plan)   (kasir-db, one SQLite tx) │
//! │       ▼                                                                 │
//! │  Receipt { transaction, sync_state }                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything that must be identical across retries is decided in
//! `prepare`, so committing the same plan twice is a no-op the second time.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::CartSession;
use crate::clock::invoice_number;
use crate::error::{Confirmation, CoreError, CoreResult};
use crate::money::Money;
use crate::types::{PaymentMethod, SyncRecordState, Transaction, TransactionStatus};
use crate::validation::validate_tender;

// =============================================================================
// Payment Resolution
// =============================================================================

/// What the cashier entered as cash received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "amount", rename_all = "camelCase")]
#[ts(export)]
pub enum Tender {
    /// The "uang pas" shortcut: tendered exactly the total.
    Exact,
    Amount(Money),
}

/// The payment outcome of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaymentResolution {
    pub method: PaymentMethod,
    pub paid_amount: Money,
    pub change_amount: Money,
    pub remaining_debt: Money,
    /// A cash sale that became a debt because the tender was short.
    pub reclassified: bool,
}

/// Resolves a payment choice against a total.
///
/// ## Errors
/// - `InvalidInput` for a TUNAI sale without a tender, or a negative tender
///
/// ```rust
/// use kasir_core::money::Money;
/// use kasir_core::settlement::{resolve_payment, Tender};
/// use kasir_core::PaymentMethod;
///
/// let r = resolve_payment(
///     Money::from_minor(24_000),
///     PaymentMethod::Tunai,
///     Some(Tender::Amount(Money::from_minor(30_000))),
/// )
/// .unwrap();
/// assert_eq!(r.change_amount.minor(), 6_000);
/// ```
pub fn resolve_payment(
    total: Money,
    method: PaymentMethod,
    tender: Option<Tender>,
) -> CoreResult<PaymentResolution> {
    let resolution = match method {
        PaymentMethod::Qris => PaymentResolution {
            method,
            paid_amount: total,
            change_amount: Money::zero(),
            remaining_debt: Money::zero(),
            reclassified: false,
        },
        PaymentMethod::Hutang => PaymentResolution {
            method,
            paid_amount: Money::zero(),
            change_amount: Money::zero(),
            remaining_debt: total,
            reclassified: false,
        },
        PaymentMethod::Tunai => {
            let tendered = match tender {
                Some(Tender::Exact) => total,
                Some(Tender::Amount(amount)) => {
                    validate_tender(amount)?;
                    amount
                }
                None => return Err(CoreError::invalid("Cash payment needs a tendered amount")),
            };

            if tendered >= total {
                PaymentResolution {
                    method,
                    paid_amount: tendered,
                    change_amount: tendered - total,
                    remaining_debt: Money::zero(),
                    reclassified: false,
                }
            } else {
                PaymentResolution {
                    method: PaymentMethod::Hutang,
                    paid_amount: tendered,
                    change_amount: Money::zero(),
                    remaining_debt: total - tendered,
                    reclassified: true,
                }
            }
        }
    };
    Ok(resolution)
}

// =============================================================================
// Settlement Plan
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CheckoutRequest {
    pub method: PaymentMethod,
    pub tender: Option<Tender>,
}

/// Units of one menu item leaving (or, on refund, returning to) stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub item_id: String,
    pub qty: i64,
}

/// A checkout ready to commit.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub transaction: Transaction,
    /// Aggregated per item; manual lines excluded.
    pub stock_deltas: Vec<StockDelta>,
    pub hold_id: Option<String>,
    reclassified: bool,
    debt_confirmed: bool,
}

impl SettlementPlan {
    pub fn prepare(
        cart: &CartSession,
        store_id: &str,
        request: CheckoutRequest,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> CoreResult<Self> {
        if cart.is_empty() {
            return Err(CoreError::invalid("Cart is empty"));
        }

        let total = cart.total();
        let resolution = resolve_payment(total, request.method, request.tender)?;

        let mut per_item: BTreeMap<&str, i64> = BTreeMap::new();
        for line in cart.lines.iter().filter(|l| !l.is_manual()) {
            *per_item.entry(line.item_id.as_str()).or_default() += line.qty;
        }
        let stock_deltas = per_item
            .into_iter()
            .map(|(item_id, qty)| StockDelta {
                item_id: item_id.to_string(),
                qty,
            })
            .collect();

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            invoice_no: invoice_number(now, offset),
            lines: cart.lines.clone(),
            total,
            method: resolution.method,
            paid_amount: resolution.paid_amount,
            change_amount: resolution.change_amount,
            remaining_debt: resolution.remaining_debt,
            buyer: cart.buyer.clone(),
            operator: cart.operator.clone(),
            created_at: now,
            status: TransactionStatus::Success,
            refund_reason: None,
            refund_at: None,
            debt_settlement: None,
        };

        Ok(SettlementPlan {
            transaction,
            stock_deltas,
            hold_id: cart.origin_hold_id.clone(),
            reclassified: resolution.reclassified,
            debt_confirmed: false,
        })
    }

    /// True when a short cash tender turned the sale into a debt and the
    /// cashier has not acknowledged it yet.
    pub fn requires_debt_confirmation(&self) -> bool {
        self.reclassified && !self.debt_confirmed
    }

    pub fn confirm_debt(&mut self) {
        self.debt_confirmed = true;
    }

    /// Gate checked right before commit.
    pub fn ensure_committable(&self) -> CoreResult<()> {
        if self.requires_debt_confirmation() {
            return Err(CoreError::ConfirmationRequired(
                Confirmation::DebtReclassification,
            ));
        }
        Ok(())
    }

    pub fn quote(&self) -> SettlementQuote {
        let tx = &self.transaction;
        SettlementQuote {
            transaction_id: tx.id.clone(),
            invoice_no: tx.invoice_no.clone(),
            total: tx.total,
            method: tx.method,
            paid_amount: tx.paid_amount,
            change_amount: tx.change_amount,
            remaining_debt: tx.remaining_debt,
            reclassified: self.reclassified,
        }
    }
}

/// What the cashier sees before committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SettlementQuote {
    pub transaction_id: String,
    pub invoice_no: String,
    pub total: Money,
    pub method: PaymentMethod,
    pub paid_amount: Money,
    pub change_amount: Money,
    pub remaining_debt: Money,
    pub reclassified: bool,
}

/// The finalized record handed to receipt rendering.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Receipt {
    pub transaction: Transaction,
    pub sync_state: SyncRecordState,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
    use crate::error::ErrorKind;
    use crate::types::MenuItem;

    fn money(v: i64) -> Money {
        Money::from_minor(v)
    }

    fn wib() -> FixedOffset {
        offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES)
    }

    fn menu(id: &str, name: &str, price: i64, stock: Option<i64>) -> MenuItem {
        MenuItem {
            id: id.into(),
            store_id: "store-1".into(),
            name: name.into(),
            price: money(price),
            category: "Makanan".into(),
            stock,
            favorite: false,
            sync_version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_qris_is_paid_in_full() {
        let r = resolve_payment(money(15_000), PaymentMethod::Qris, None).unwrap();
        assert_eq!(r.paid_amount, money(15_000));
        assert_eq!(r.change_amount, Money::zero());
        assert_eq!(r.remaining_debt, Money::zero());
    }

    #[test]
    fn test_hutang_owes_everything() {
        let r = resolve_payment(
            money(15_000),
            PaymentMethod::Hutang,
            Some(Tender::Amount(money(99_000))),
        )
        .unwrap();
        assert_eq!(r.paid_amount, Money::zero());
        assert_eq!(r.remaining_debt, money(15_000));
    }

    #[test]
    fn test_tunai_tender_cases() {
        let exact = resolve_payment(money(20_000), PaymentMethod::Tunai, Some(Tender::Exact)).unwrap();
        assert_eq!(exact.paid_amount, money(20_000));
        assert_eq!(exact.change_amount, Money::zero());

        let over = resolve_payment(
            money(20_000),
            PaymentMethod::Tunai,
            Some(Tender::Amount(money(50_000))),
        )
        .unwrap();
        assert_eq!(over.method, PaymentMethod::Tunai);
        assert_eq!(over.change_amount, money(30_000));
        assert_eq!(over.remaining_debt, Money::zero());

        let short = resolve_payment(
            money(20_000),
            PaymentMethod::Tunai,
            Some(Tender::Amount(money(5_000))),
        )
        .unwrap();
        assert_eq!(short.method, PaymentMethod::Hutang);
        assert_eq!(short.paid_amount, money(5_000));
        assert_eq!(short.remaining_debt, money(15_000));
        assert_eq!(short.change_amount, Money::zero());
        assert!(short.reclassified);
    }

    #[test]
    fn test_tunai_invalid_tender() {
        let missing = resolve_payment(money(1_000), PaymentMethod::Tunai, None).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::InvalidInput);

        let negative = resolve_payment(
            money(1_000),
            PaymentMethod::Tunai,
            Some(Tender::Amount(money(-1))),
        )
        .unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mie_goreng_end_to_end_plan() {
        let mut cart = CartSession::new("kasir");
        cart.add_line(&menu("mie", "Mie Goreng", 12_000, Some(10)), 2)
            .unwrap();

        let plan = SettlementPlan::prepare(
            &cart,
            "store-1",
            CheckoutRequest {
                method: PaymentMethod::Tunai,
                tender: Some(Tender::Amount(money(30_000))),
            },
            Utc::now(),
            wib(),
        )
        .unwrap();

        let tx = &plan.transaction;
        assert_eq!(tx.total, money(24_000));
        assert_eq!(tx.paid_amount, money(30_000));
        assert_eq!(tx.change_amount, money(6_000));
        assert_eq!(tx.remaining_debt, Money::zero());
        assert_eq!(tx.method, PaymentMethod::Tunai);
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.invoice_no.starts_with("INV-"));
        assert_eq!(
            plan.stock_deltas,
            vec![StockDelta {
                item_id: "mie".into(),
                qty: 2
            }]
        );
        assert!(plan.ensure_committable().is_ok());
    }

    #[test]
    fn test_prepare_skips_manual_lines_and_keeps_hold() {
        let mut cart = CartSession::new("kasir");
        cart.add_line(&menu("teh", "Es Teh", 5_000, None), 1).unwrap();
        cart.add_manual_line("Ongkir", money(3_000), 1).unwrap();
        cart.origin_hold_id = Some("hold-9".into());

        let plan = SettlementPlan::prepare(
            &cart,
            "store-1",
            CheckoutRequest {
                method: PaymentMethod::Qris,
                tender: None,
            },
            Utc::now(),
            wib(),
        )
        .unwrap();

        assert_eq!(plan.stock_deltas.len(), 1);
        assert_eq!(plan.hold_id.as_deref(), Some("hold-9"));
        assert_eq!(plan.transaction.total, money(8_000));
    }

    #[test]
    fn test_empty_cart_cannot_settle() {
        let cart = CartSession::new("kasir");
        let err = SettlementPlan::prepare(
            &cart,
            "store-1",
            CheckoutRequest {
                method: PaymentMethod::Qris,
                tender: None,
            },
            Utc::now(),
            wib(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reclassified_plan_needs_confirmation() {
        let mut cart = CartSession::new("kasir");
        cart.add_manual_line("Nasi", money(10_000), 1).unwrap();

        let mut plan = SettlementPlan::prepare(
            &cart,
            "store-1",
            CheckoutRequest {
                method: PaymentMethod::Tunai,
                tender: Some(Tender::Amount(money(4_000))),
            },
            Utc::now(),
            wib(),
        )
        .unwrap();

        assert!(plan.requires_debt_confirmation());
        assert!(plan.quote().reclassified);
        assert!(matches!(
            plan.ensure_committable(),
            Err(CoreError::ConfirmationRequired(
                Confirmation::DebtReclassification
            ))
        ));

        plan.confirm_debt();
        assert!(plan.ensure_committable().is_ok());
        assert_eq!(plan.transaction.remaining_debt, money(6_000));
    }

    #[test]
    fn test_tender_json_shape() {
        let json = serde_json::to_string(&Tender::Amount(money(30_000))).unwrap();
        assert_eq!(json, r#"{"kind":"amount","amount":30000}"#);
        let exact: Tender = serde_json::from_str(r#"{"kind":"exact"}"#).unwrap();
        assert_eq!(exact, Tender::Exact);
    }
}
