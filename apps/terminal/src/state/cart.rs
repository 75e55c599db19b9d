//! # Cart State
//!
//! The active cart session plus the checkout that was last quoted for it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartState                                                              │
//! │                                                                         │
//! │  cart:    Arc<Mutex<CartSession>>      lines, buyer, origin hold       │
//! │  pending: Arc<Mutex<Option<Plan>>>     quoted, not yet committed       │
//! │                                                                         │
//! │  with_cart_mut(..)  ──► drops the pending plan (the quote is stale)    │
//! │  quote_checkout     ──► park_plan(request, plan)                       │
//! │  commit_checkout    ──► take_plan(request) ─► commit ─► reset          │
//! │                                       └─ on failure: park_plan again   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keeping the plan between quote and commit keeps the transaction id
//! stable, so a retried commit is the same write.

use std::sync::{Arc, Mutex, MutexGuard};

use kasir_core::{CartSession, CheckoutRequest, SettlementPlan};

/// A quoted checkout: the request it was quoted for and the prepared plan.
type Pending = (CheckoutRequest, SettlementPlan);

pub struct CartState {
    cart: Arc<Mutex<CartSession>>,
    pending: Arc<Mutex<Option<Pending>>>,
}

impl CartState {
    /// Creates an empty cart for `operator`.
    pub fn new(operator: impl Into<String>) -> Self {
        CartState {
            cart: Arc::new(Mutex::new(CartSession::new(operator))),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Executes a function with read access to the cart.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let totals = cart_state.with_cart(|cart| CartTotals::from(cart));
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CartSession) -> R,
    {
        let cart = lock(&self.cart);
        f(&cart)
    }

    /// Executes a function with write access to the cart.
    ///
    /// Any quoted checkout is discarded, even if `f` fails.
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut CartSession) -> R,
    {
        let mut cart = lock(&self.cart);
        lock(&self.pending).take();
        f(&mut cart)
    }

    /// Stores a quoted plan for the next commit.
    pub fn park_plan(&self, request: CheckoutRequest, plan: SettlementPlan) {
        *lock(&self.pending) = Some((request, plan));
    }

    /// Takes the quoted plan if it was quoted for `request` and still
    /// matches the cart.
    pub fn take_plan(&self, request: &CheckoutRequest) -> Option<SettlementPlan> {
        let cart = lock(&self.cart);
        lock(&self.pending)
            .take()
            .filter(|(quoted, plan)| {
                quoted == request
                    && plan.transaction.lines == cart.lines
                    && plan.hold_id == cart.origin_hold_id
            })
            .map(|(_, plan)| plan)
    }

    pub fn has_pending_plan(&self) -> bool {
        lock(&self.pending).is_some()
    }
}

/// Locks `mutex`, recovering the guard if it was poisoned.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kasir_core::clock::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
    use kasir_core::{Money, PaymentMethod, Tender};

    const QRIS: CheckoutRequest = CheckoutRequest {
        method: PaymentMethod::Qris,
        tender: None,
    };

    fn plan_for(state: &CartState) -> SettlementPlan {
        state.with_cart(|cart| {
            SettlementPlan::prepare(
                cart,
                "owner-1",
                QRIS,
                Utc::now(),
                offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES),
            )
            .unwrap()
        })
    }

    #[test]
    fn test_parked_plan_survives_until_cart_changes() {
        let state = CartState::new("kasir");
        state
            .with_cart_mut(|c| c.add_manual_line("Kopi", Money::from_minor(5_000), 1))
            .unwrap();

        let plan = plan_for(&state);
        let id = plan.transaction.id.clone();
        state.park_plan(QRIS, plan);
        assert!(state.has_pending_plan());

        let taken = state.take_plan(&QRIS).unwrap();
        assert_eq!(taken.transaction.id, id);
        assert!(!state.has_pending_plan());

        state.park_plan(QRIS, taken);
        state
            .with_cart_mut(|c| c.add_manual_line("Roti", Money::from_minor(3_000), 1))
            .unwrap();
        assert!(state.take_plan(&QRIS).is_none());
    }

    #[test]
    fn test_plan_for_another_request_is_dropped() {
        let state = CartState::new("kasir");
        state
            .with_cart_mut(|c| c.add_manual_line("Kopi", Money::from_minor(5_000), 1))
            .unwrap();
        state.park_plan(QRIS, plan_for(&state));

        let cash = CheckoutRequest {
            method: PaymentMethod::Tunai,
            tender: Some(Tender::Exact),
        };
        assert!(state.take_plan(&cash).is_none());
        assert!(!state.has_pending_plan());
    }

    #[test]
    fn test_with_cart_reads() {
        let state = CartState::new("kasir");
        assert!(state.with_cart(|c| c.is_empty()));
        assert_eq!(state.with_cart(|c| c.operator.clone()), "kasir");
    }
}
