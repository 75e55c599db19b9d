//! # Cart Commands
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Lifecycle                                       │
//! │                                                                         │
//! │  ┌──────────┐     ┌──────────┐     ┌──────────┐     ┌──────────┐       │
//! │  │  Empty   │────►│ In Cart  │────►│  Quoted  │────►│ Receipt  │       │
//! │  │  Cart    │     │          │     │          │     │          │       │
//! │  └──────────┘     └──────────┘     └──────────┘     └──────────┘       │
//! │       ▲              │    │                                             │
//! │       │         add_to_cart   hold_cart ──► (held tab, cart empty)     │
//! │       │         change_quantity                                         │
//! │       │         set_buyer                                               │
//! │       │              │                                                  │
//! │       └── clear_cart(confirmed) ◄─┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here touches persistent stock; stock only moves at settlement.

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use kasir_core::{CartLine, CartSession, CartTotals, Feature, Money, StockAdjustment, StockLevel};

use crate::error::{ApiError, ApiResult};
use crate::state::{CartState, DbState, SessionState};

/// Cart response including lines and totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub lines: Vec<CartLine>,
    pub buyer: String,
    /// Set when the cart came from a held tab.
    pub origin_hold_id: Option<String>,
    pub totals: CartTotals,
    /// Held lines cut to current stock by the last resume.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjusted: Vec<StockAdjustment>,
}

impl From<&CartSession> for CartResponse {
    fn from(cart: &CartSession) -> Self {
        CartResponse {
            lines: cart.lines.clone(),
            buyer: cart.buyer.clone(),
            origin_hold_id: cart.origin_hold_id.clone(),
            totals: CartTotals::from(cart),
            adjusted: Vec::new(),
        }
    }
}

/// Gets the current cart contents.
pub fn get_cart(cart: &CartState) -> CartResponse {
    debug!("get_cart command");
    cart.with_cart(|c| CartResponse::from(c))
}

/// Adds a menu item to the cart.
///
/// ## Behavior
/// - Already in cart: the quantity is merged into its line
/// - Name and price are frozen at this moment
/// - A merged quantity above tracked stock is rejected and the cart is
///   left as it was
///
/// ## Arguments
/// * `item_id` - Menu item id
/// * `quantity` - Quantity to add (default: 1)
pub async fn add_to_cart(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    item_id: &str,
    quantity: Option<i64>,
) -> ApiResult<CartResponse> {
    let quantity = quantity.unwrap_or(1);
    debug!(item_id = %item_id, quantity = %quantity, "add_to_cart command");

    let store_id = session.scoped(Feature::Cashier, Utc::now())?;
    let item = db
        .inner()
        .menu()
        .get(&store_id, item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Menu item", item_id))?;

    cart.with_cart_mut(|c| {
        c.add_line(&item, quantity)?;
        Ok::<_, ApiError>(CartResponse::from(&*c))
    })
}

/// Adds a free-form calculator line. The line is never stock-tracked.
pub fn add_manual_line(
    session: &SessionState,
    cart: &CartState,
    name: &str,
    price: Money,
    quantity: Option<i64>,
) -> ApiResult<CartResponse> {
    debug!(name = %name, price = %price, "add_manual_line command");

    session.scoped_any(&[Feature::Cashier, Feature::Calculator], Utc::now())?;

    cart.with_cart_mut(|c| {
        c.add_manual_line(name, price, quantity.unwrap_or(1))?;
        Ok::<_, ApiError>(CartResponse::from(&*c))
    })
}

/// Applies `delta` to a line's quantity.
///
/// ## Behavior
/// - Result ≤ 0: the line is removed
/// - An increase is checked against the item's current stock
/// - Decreases are always allowed
pub async fn change_quantity(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    line_id: &str,
    delta: i64,
) -> ApiResult<CartResponse> {
    debug!(line_id = %line_id, delta = %delta, "change_quantity command");

    let store_id = session.scoped_any(&[Feature::Cashier, Feature::Calculator], Utc::now())?;

    let line = cart
        .with_cart(|c| c.lines.iter().find(|l| l.item_id == line_id).cloned())
        .ok_or_else(|| ApiError::not_found("Cart line", line_id))?;

    let stock = if delta > 0 && !line.is_manual() {
        db.inner()
            .menu()
            .get(&store_id, line_id)
            .await?
            .map(|item| item.stock_level())
            .unwrap_or(StockLevel::Untracked)
    } else {
        StockLevel::Untracked
    };

    cart.with_cart_mut(|c| {
        c.change_quantity(line_id, delta, stock)?;
        Ok::<_, ApiError>(CartResponse::from(&*c))
    })
}

/// Removes a line outright.
pub fn remove_from_cart(cart: &CartState, line_id: &str) -> ApiResult<CartResponse> {
    debug!(line_id = %line_id, "remove_from_cart command");

    cart.with_cart_mut(|c| {
        c.remove_line(line_id)?;
        Ok::<_, ApiError>(CartResponse::from(&*c))
    })
}

/// Sets the buyer label shown on holds, receipts and debts.
pub fn set_buyer(cart: &CartState, buyer: &str) -> CartResponse {
    debug!(buyer = %buyer, "set_buyer command");

    cart.with_cart_mut(|c| {
        c.set_buyer(buyer);
        CartResponse::from(&*c)
    })
}

/// Empties the cart. A non-empty cart needs `confirmed`.
pub fn clear_cart(cart: &CartState, confirmed: bool) -> ApiResult<CartResponse> {
    debug!(confirmed, "clear_cart command");

    cart.with_cart_mut(|c| {
        c.clear(confirmed)?;
        Ok::<_, ApiError>(CartResponse::from(&*c))
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
