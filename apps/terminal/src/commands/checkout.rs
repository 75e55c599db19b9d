//! # Checkout Commands
//!
//! Two steps so the cashier sees change and debt before anything is written.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkout Flow                                        │
//! │                                                                         │
//! │  quote_checkout(request)                                                │
//! │     ├── store active?           ── FORBIDDEN                           │
//! │     ├── monthly count < cap?    ── QUOTA_EXCEEDED                      │
//! │     ├── SettlementPlan::prepare ── INVALID_INPUT                       │
//! │     └── park plan ──► SettlementQuote { change, remaining, ... }       │
//! │                                                                         │
//! │  commit_checkout(request, confirm_debt)                                 │
//! │     ├── gates again                                                     │
//! │     ├── take parked plan (same id) or prepare a fresh one              │
//! │     ├── short cash tender unconfirmed ── CONFIRMATION_REQUIRED         │
//! │     ├── ledger.commit_settlement(plan)  one SQLite transaction         │
//! │     │      └── failed? plan parked again, retry reuses the id          │
//! │     └── cart reset ──► Receipt { transaction, sync_state }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use kasir_core::quota::{self, QuotaUsage};
use kasir_core::{CheckoutRequest, Feature, Receipt, SettlementPlan, SettlementQuote, Store};

use super::load_store;
use crate::error::ApiResult;
use crate::state::{CartState, ConfigState, DbState, SessionState, SyncState};

/// Prepares a settlement for the current cart without writing anything.
pub async fn quote_checkout(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    config: &ConfigState,
    request: CheckoutRequest,
) -> ApiResult<SettlementQuote> {
    debug!(method = %request.method, "quote_checkout command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::Cashier, now)?;
    ensure_can_trade(db, config, &store_id, now).await?;

    let plan = cart.with_cart(|c| SettlementPlan::prepare(c, &store_id, request, now, config.offset()))?;
    let quote = plan.quote();
    cart.park_plan(request, plan);

    Ok(quote)
}

/// Commits the checkout and empties the cart.
///
/// ## Arguments
/// * `request` - Payment method and tender
/// * `confirm_debt` - Acknowledges a short cash tender becoming HUTANG
///
/// ## Errors
/// - `CONFIRMATION_REQUIRED` when the tender is short and `confirm_debt`
///   is false; the cart is left untouched
/// - `QUOTA_EXCEEDED` when the monthly cap is reached
pub async fn commit_checkout(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    config: &ConfigState,
    sync: &SyncState,
    request: CheckoutRequest,
    confirm_debt: bool,
) -> ApiResult<Receipt> {
    debug!(method = %request.method, confirm_debt, "commit_checkout command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::Cashier, now)?;
    ensure_can_trade(db, config, &store_id, now).await?;

    let mut plan = match cart.take_plan(&request) {
        Some(plan) if plan.transaction.store_id == store_id => plan,
        _ => cart.with_cart(|c| SettlementPlan::prepare(c, &store_id, request, now, config.offset()))?,
    };
    if confirm_debt {
        plan.confirm_debt();
    }

    if let Err(e) = plan.ensure_committable() {
        cart.park_plan(request, plan);
        return Err(e.into());
    }

    let transaction = match db.inner().ledger().commit_settlement(&plan).await {
        Ok(transaction) => transaction,
        Err(e) => {
            warn!(transaction_id = %plan.transaction.id, error = %e, "Commit failed, keeping plan for retry");
            cart.park_plan(request, plan);
            return Err(e.into());
        }
    };

    cart.with_cart_mut(|c| c.reset());
    sync.nudge();

    let sync_state = sync.record_state_or_local(&transaction.id).await;
    info!(
        invoice_no = %transaction.invoice_no,
        method = %transaction.method,
        "Checkout complete"
    );

    Ok(Receipt {
        transaction,
        sync_state,
    })
}

/// This month's transaction count against the store cap.
pub async fn quota_usage(
    db: &DbState,
    session: &SessionState,
    config: &ConfigState,
) -> ApiResult<QuotaUsage> {
    let now = Utc::now();
    let store_id = session.store_id(now)?;
    let store = load_store(db, config, &store_id).await?;
    let used = monthly_count(db, config, &store_id, now).await?;

    Ok(QuotaUsage::for_store(&store, used))
}

/// Store must be active and under its monthly cap.
///
/// The count is read from the local ledger, so two offline tills can each
/// pass the check at the cap.
async fn ensure_can_trade(
    db: &DbState,
    config: &ConfigState,
    store_id: &str,
    now: DateTime<Utc>,
) -> ApiResult<Store> {
    let store = load_store(db, config, store_id).await?;
    quota::check_store_active(&store, now)?;

    let used = monthly_count(db, config, store_id, now).await?;
    quota::check_quota(&store, used)?;

    Ok(store)
}

async fn monthly_count(
    db: &DbState,
    config: &ConfigState,
    store_id: &str,
    now: DateTime<Utc>,
) -> ApiResult<i64> {
    let since = quota::start_of_month(now, config.offset());
    Ok(db.inner().ledger().count_since(store_id, since).await?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::{add_manual_line, add_to_cart, get_cart};
    use crate::commands::fixture::{employee, menu_item, store_caps, till, till_as, Till, STORE};
    use crate::commands::hold::{hold_cart, list_holds, resume_hold};
    use crate::error::ErrorCode;
    use kasir_core::{Confirmation, Money, PaymentMethod, SyncRecordState, Tender};

    fn cash(amount: i64) -> CheckoutRequest {
        CheckoutRequest {
            method: PaymentMethod::Tunai,
            tender: Some(Tender::Amount(Money::from_minor(amount))),
        }
    }

    const QRIS: CheckoutRequest = CheckoutRequest {
        method: PaymentMethod::Qris,
        tender: None,
    };

    async fn commit(till: &Till, request: CheckoutRequest, confirm_debt: bool) -> ApiResult<Receipt> {
        commit_checkout(
            &till.db,
            &till.session,
            &till.cart,
            &till.config,
            &till.sync,
            request,
            confirm_debt,
        )
        .await
    }

    async fn count(till: &Till) -> i64 {
        till.db
            .inner()
            .ledger()
            .count_since(STORE, Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cash_sale_gives_change_and_takes_stock() {
        let till = till().await;
        menu_item(&till, "m-1", "Mie Goreng", 12_000, Some(5)).await;
        add_to_cart(&till.db, &till.session, &till.cart, "m-1", Some(2))
            .await
            .unwrap();

        let quote = quote_checkout(&till.db, &till.session, &till.cart, &till.config, cash(30_000))
            .await
            .unwrap();
        assert_eq!(quote.total, Money::from_minor(24_000));
        assert_eq!(quote.change_amount, Money::from_minor(6_000));

        let receipt = commit(&till, cash(30_000), false).await.unwrap();
        let tx = &receipt.transaction;
        assert_eq!(tx.id, quote.transaction_id);
        assert_eq!(tx.method, PaymentMethod::Tunai);
        assert_eq!(tx.change_amount, Money::from_minor(6_000));
        assert_eq!(tx.remaining_debt, Money::zero());
        // Agent is offline in tests; the record waits in the outbox.
        assert_eq!(receipt.sync_state, SyncRecordState::LocalOnly);

        let item = till.db.inner().menu().get(STORE, "m-1").await.unwrap().unwrap();
        assert_eq!(item.stock, Some(3));
        assert!(get_cart(&till.cart).lines.is_empty());
    }

    #[tokio::test]
    async fn test_quota_reached_blocks_checkout() {
        let till = till().await;
        store_caps(&till, 3, 0).await;

        for _ in 0..3 {
            add_manual_line(&till.session, &till.cart, "Kopi", Money::from_minor(5_000), None).unwrap();
            commit(&till, QRIS, false).await.unwrap();
        }

        add_manual_line(&till.session, &till.cart, "Kopi", Money::from_minor(5_000), None).unwrap();
        let err = commit(&till, QRIS, false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::QuotaExceeded);
        assert_eq!(count(&till).await, 3);
        assert_eq!(get_cart(&till.cart).lines.len(), 1);

        let usage = quota_usage(&till.db, &till.session, &till.config).await.unwrap();
        assert_eq!(usage.used, 3);
        assert_eq!(usage.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_short_tender_needs_debt_confirmation() {
        let till = till().await;
        add_manual_line(&till.session, &till.cart, "Nasi Campur", Money::from_minor(20_000), None)
            .unwrap();

        let quote = quote_checkout(&till.db, &till.session, &till.cart, &till.config, cash(15_000))
            .await
            .unwrap();
        assert!(quote.reclassified);
        assert_eq!(quote.method, PaymentMethod::Hutang);

        let err = commit(&till, cash(15_000), false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfirmationRequired);
        assert_eq!(err.confirmation, Some(Confirmation::DebtReclassification));
        assert_eq!(count(&till).await, 0);
        assert!(till.cart.has_pending_plan());

        let receipt = commit(&till, cash(15_000), true).await.unwrap();
        assert_eq!(receipt.transaction.id, quote.transaction_id);
        assert_eq!(receipt.transaction.paid_amount, Money::from_minor(15_000));
        assert_eq!(receipt.transaction.remaining_debt, Money::from_minor(5_000));
    }

    #[tokio::test]
    async fn test_recommit_of_same_plan_writes_once() {
        let till = till().await;
        add_manual_line(&till.session, &till.cart, "Kopi", Money::from_minor(5_000), None).unwrap();

        quote_checkout(&till.db, &till.session, &till.cart, &till.config, QRIS)
            .await
            .unwrap();
        let plan = till.cart.take_plan(&QRIS).unwrap();

        let first = till.db.inner().ledger().commit_settlement(&plan).await.unwrap();
        let again = till.db.inner().ledger().commit_settlement(&plan).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(count(&till).await, 1);
    }

    #[tokio::test]
    async fn test_settling_resumed_hold_removes_it() {
        let till = till().await;
        add_manual_line(&till.session, &till.cart, "Soto", Money::from_minor(15_000), None).unwrap();
        let hold = hold_cart(&till.db, &till.session, &till.cart, &till.sync, "Meja 5")
            .await
            .unwrap();

        resume_hold(&till.db, &till.session, &till.cart, &hold.id, false)
            .await
            .unwrap();
        let receipt = commit(
            &till,
            CheckoutRequest {
                method: PaymentMethod::Tunai,
                tender: Some(Tender::Exact),
            },
            false,
        )
        .await
        .unwrap();

        assert_eq!(receipt.transaction.total, Money::from_minor(15_000));
        assert_eq!(receipt.transaction.change_amount, Money::zero());
        assert!(list_holds(&till.db, &till.session).await.unwrap().is_empty());
        assert_eq!(count(&till).await, 1);
    }

    #[tokio::test]
    async fn test_empty_cart_and_cashless_employee() {
        let till = till().await;
        let err = commit(&till, QRIS, false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let till = till_as(employee(&[Feature::Stock])).await;
        let err = quote_checkout(&till.db, &till.session, &till.cart, &till.config, QRIS)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
