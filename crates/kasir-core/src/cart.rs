//! # Cart Session
//!
//! The order in progress on the till.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Session Operations                              │
//! │                                                                         │
//! │  Cashier Action           Operation                 Cart Change         │
//! │  ──────────────           ─────────                 ───────────         │
//! │                                                                         │
//! │  Tap menu item ─────────► add_line(item, 1) ──────► merge or push      │
//! │                                                                         │
//! │  Calculator entry ──────► add_manual_line() ──────► push manual-<id>   │
//! │                                                                         │
//! │  + / − buttons ─────────► change_quantity() ──────► qty ± delta        │
//! │                                                  (≤ 0 removes line)     │
//! │                                                                         │
//! │  Clear ─────────────────► clear(confirmed) ───────► lines.clear()      │
//! │                                                                         │
//! │  Resume tab ────────────► resume(hold, ok) ───────► lines = hold.lines │
//! │                                                                         │
//! │  NOTE: nothing here touches persistent stock. Tracked stock is only     │
//! │        consulted; it is decremented at settlement.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Lines are unique by `item_id` (adding the same item merges quantity)
//! - Every line has quantity in `1..=MAX_LINE_QUANTITY`
//! - A tracked item's quantity never exceeds its stock at the time of the check
//! - A rejected operation leaves the cart exactly as it was

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{Confirmation, CoreError, CoreResult};
use crate::money::Money;
use crate::types::{HoldOrder, MenuItem, StockLevel};
use crate::validation::{validate_item_name, validate_price, validate_quantity};
use crate::{MANUAL_ITEM_PREFIX, MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// A line in the cart, with name and price frozen at add time.
///
/// Later menu edits do not reach an open cart or a held tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartLine {
    /// Menu item id, or a synthetic `manual-…` id for calculator entries.
    pub item_id: String,
    pub name: String,
    pub price: Money,
    pub qty: i64,
}

impl CartLine {
    pub fn from_item(item: &MenuItem, qty: i64) -> Self {
        CartLine {
            item_id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            qty,
        }
    }

    /// True for calculator entries that reference no menu item.
    #[inline]
    pub fn is_manual(&self) -> bool {
        self.item_id.starts_with(MANUAL_ITEM_PREFIX)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.qty)
    }
}

// =============================================================================
// Cart Session
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartSession {
    pub lines: Vec<CartLine>,
    pub buyer: String,
    pub operator: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Set when the cart was loaded from a hold; settling deletes that hold.
    pub origin_hold_id: Option<String>,
}

impl CartSession {
    pub fn new(operator: impl Into<String>) -> Self {
        CartSession {
            lines: Vec::new(),
            buyer: String::new(),
            operator: operator.into(),
            created_at: Utc::now(),
            origin_hold_id: None,
        }
    }

    /// Adds `qty` of a menu item, merging into its existing line.
    ///
    /// ## Errors
    /// - `StockExceeded` if the merged quantity is above tracked stock
    /// - `Validation` if the quantity is out of range
    /// - `CartTooLarge` if a new line would exceed `MAX_CART_LINES`
    pub fn add_line(&mut self, item: &MenuItem, qty: i64) -> CoreResult<()> {
        validate_quantity(qty)?;

        let current = self.quantity_of(&item.id);
        let requested = current + qty;
        if requested > MAX_LINE_QUANTITY {
            return Err(CoreError::invalid(format!(
                "Quantity would exceed maximum of {}",
                MAX_LINE_QUANTITY
            )));
        }
        ensure_stock(item.stock_level(), &item.id, &item.name, requested)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item.id) {
            line.qty = requested;
            return Ok(());
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge { max: MAX_CART_LINES });
        }
        self.lines.push(CartLine::from_item(item, qty));
        Ok(())
    }

    /// Adds a free-form calculator line. Returns its synthetic id.
    pub fn add_manual_line(
        &mut self,
        name: &str,
        price: Money,
        qty: i64,
    ) -> CoreResult<String> {
        validate_quantity(qty)?;
        validate_price(price)?;
        let name = name.trim();
        let name = if name.is_empty() { "Manual" } else { name };
        validate_item_name(name)?;

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge { max: MAX_CART_LINES });
        }

        let item_id = format!("{}{}", MANUAL_ITEM_PREFIX, Uuid::new_v4());
        self.lines.push(CartLine {
            item_id: item_id.clone(),
            name: name.to_string(),
            price,
            qty,
        });
        Ok(item_id)
    }

    /// Applies `delta` to a line's quantity.
    ///
    /// A result ≤ 0 removes the line. An increase past tracked stock is
    /// rejected and the cart is left unchanged. Decreases are always allowed.
    pub fn change_quantity(
        &mut self,
        line_id: &str,
        delta: i64,
        stock: StockLevel,
    ) -> CoreResult<()> {
        let index = self
            .lines
            .iter()
            .position(|l| l.item_id == line_id)
            .ok_or_else(|| CoreError::not_found("CartLine", line_id))?;

        let line = &self.lines[index];
        let requested = line.qty.checked_add(delta).ok_or_else(|| {
            CoreError::invalid(format!("Quantity change {} is out of range", delta))
        })?;
        if requested <= 0 {
            self.lines.remove(index);
            return Ok(());
        }
        if requested > MAX_LINE_QUANTITY {
            return Err(CoreError::invalid(format!(
                "Quantity cannot exceed {}",
                MAX_LINE_QUANTITY
            )));
        }
        if delta > 0 && !line.is_manual() {
            ensure_stock(stock, &line.item_id, &line.name, requested)?;
        }

        self.lines[index].qty = requested;
        Ok(())
    }

    pub fn remove_line(&mut self, line_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != line_id);
        if self.lines.len() == before {
            return Err(CoreError::not_found("CartLine", line_id));
        }
        Ok(())
    }

    pub fn set_buyer(&mut self, buyer: &str) {
        self.buyer = buyer.trim().to_string();
    }

    /// Empties the cart. A non-empty cart needs explicit confirmation.
    pub fn clear(&mut self, confirmed: bool) -> CoreResult<()> {
        if !self.is_empty() && !confirmed {
            return Err(CoreError::ConfirmationRequired(Confirmation::ClearCart));
        }
        self.reset();
        Ok(())
    }

    /// Clears without asking. Used after a successful settlement.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.buyer.clear();
        self.origin_hold_id = None;
        self.created_at = Utc::now();
    }

    /// Loads a held tab into this cart.
    ///
    /// Replacing a non-empty cart needs `confirm_overwrite`. Stock may have
    /// moved since the tab was held, so each tracked line is cut down to
    /// what `stock` reports now and dropped when nothing is left. The cuts
    /// are returned for the cashier to see.
    pub fn resume(
        &mut self,
        hold: &HoldOrder,
        confirm_overwrite: bool,
        stock: impl Fn(&str) -> StockLevel,
    ) -> CoreResult<Vec<StockAdjustment>> {
        if !self.is_empty() && !confirm_overwrite {
            return Err(CoreError::ConfirmationRequired(Confirmation::OverwriteCart));
        }

        let mut lines = Vec::with_capacity(hold.lines.len());
        let mut adjusted = Vec::new();
        for line in &hold.lines {
            let available = match stock(&line.item_id) {
                StockLevel::Tracked(available) if !line.is_manual() && line.qty > available => {
                    available.max(0)
                }
                _ => {
                    lines.push(line.clone());
                    continue;
                }
            };
            adjusted.push(StockAdjustment {
                item_id: line.item_id.clone(),
                name: line.name.clone(),
                held: line.qty,
                available,
            });
            if available > 0 {
                lines.push(CartLine {
                    qty: available,
                    ..line.clone()
                });
            }
        }

        self.lines = lines;
        self.buyer = hold.buyer.clone();
        self.origin_hold_id = Some(hold.id.clone());
        self.created_at = hold.created_at;
        Ok(adjusted)
    }

    /// Quantity of an item currently in the cart (0 if absent).
    pub fn quantity_of(&self, item_id: &str) -> i64 {
        self.lines
            .iter()
            .find(|l| l.item_id == item_id)
            .map(|l| l.qty)
            .unwrap_or(0)
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.qty).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A held line that no longer fits the stock on hand. `available` is the
/// quantity it was resumed at; 0 means the line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockAdjustment {
    pub item_id: String,
    pub name: String,
    pub held: i64,
    pub available: i64,
}

fn ensure_stock(stock: StockLevel, item_id: &str, name: &str, requested: i64) -> CoreResult<()> {
    match stock {
        StockLevel::Tracked(available) if requested > available => Err(CoreError::StockExceeded {
            item_id: item_id.to_string(),
            name: name.to_string(),
            available,
            requested,
        }),
        _ => Ok(()),
    }
}

/// Cart totals for the UI.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub line_count: usize,
    pub total_quantity: i64,
    pub total: Money,
}

impl From<&CartSession> for CartTotals {
    fn from(cart: &CartSession) -> Self {
        CartTotals {
            line_count: cart.line_count(),
            total_quantity: cart.total_quantity(),
            total: cart.total(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn item(id: &str, price: i64, stock: Option<i64>) -> MenuItem {
        MenuItem {
            id: id.to_string(),
            store_id: "store-1".to_string(),
            name: format!("Menu {}", id),
            price: Money::from_minor(price),
            category: "Makanan".to_string(),
            stock,
            favorite: false,
            sync_version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_line_merges_same_item() {
        let mut cart = CartSession::new("kasir");
        let mie = item("mie", 12_000, None);

        cart.add_line(&mie, 1).unwrap();
        cart.add_line(&mie, 1).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.quantity_of("mie"), 2);
        assert_eq!(cart.total().minor(), 24_000);
    }

    #[test]
    fn test_add_line_rejects_over_stock_without_change() {
        let mut cart = CartSession::new("kasir");
        let teh = item("teh", 5_000, Some(2));

        cart.add_line(&teh, 2).unwrap();
        let err = cart.add_line(&teh, 1).unwrap_err();

        assert!(matches!(
            err,
            CoreError::StockExceeded { available: 2, requested: 3, .. }
        ));
        assert_eq!(cart.quantity_of("teh"), 2);
    }

    #[test]
    fn test_untracked_item_is_unconstrained() {
        let mut cart = CartSession::new("kasir");
        let kopi = item("kopi", 8_000, None);
        cart.add_line(&kopi, 500).unwrap();
        cart.change_quantity("kopi", 400, StockLevel::Untracked).unwrap();
        assert_eq!(cart.quantity_of("kopi"), 900);
    }

    #[test]
    fn test_change_quantity() {
        let mut cart = CartSession::new("kasir");
        let teh = item("teh", 5_000, Some(3));
        cart.add_line(&teh, 1).unwrap();

        cart.change_quantity("teh", 2, StockLevel::Tracked(3)).unwrap();
        assert_eq!(cart.quantity_of("teh"), 3);

        let err = cart
            .change_quantity("teh", 1, StockLevel::Tracked(3))
            .unwrap_err();
        assert!(matches!(err, CoreError::StockExceeded { .. }));
        assert_eq!(cart.quantity_of("teh"), 3);

        // Stock dropped elsewhere; decreasing is still allowed.
        cart.change_quantity("teh", -1, StockLevel::Tracked(0)).unwrap();
        assert_eq!(cart.quantity_of("teh"), 2);

        cart.change_quantity("teh", -5, StockLevel::Tracked(3)).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_change_quantity_unknown_line() {
        let mut cart = CartSession::new("kasir");
        let err = cart
            .change_quantity("ghost", 1, StockLevel::Untracked)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_manual_line() {
        let mut cart = CartSession::new("kasir");
        let id = cart
            .add_manual_line("  ", Money::from_minor(7_500), 2)
            .unwrap();

        assert!(id.starts_with(MANUAL_ITEM_PREFIX));
        let line = &cart.lines[0];
        assert!(line.is_manual());
        assert_eq!(line.name, "Manual");
        assert_eq!(cart.total().minor(), 15_000);

        assert!(cart
            .add_manual_line("Ongkir", Money::from_minor(-1), 1)
            .is_err());
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = CartSession::new("kasir");
        let kopi = item("kopi", 8_000, None);
        assert!(cart.add_line(&kopi, 0).is_err());
        assert!(cart.add_line(&kopi, MAX_LINE_QUANTITY + 1).is_err());
        cart.add_line(&kopi, MAX_LINE_QUANTITY).unwrap();
        assert!(cart.add_line(&kopi, 1).is_err());
        assert_eq!(cart.quantity_of("kopi"), MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_line_limit() {
        let mut cart = CartSession::new("kasir");
        for i in 0..MAX_CART_LINES {
            cart.add_line(&item(&format!("m{}", i), 1_000, None), 1)
                .unwrap();
        }
        let err = cart.add_line(&item("extra", 1_000, None), 1).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let mut cart = CartSession::new("kasir");
        cart.clear(false).unwrap();

        cart.add_line(&item("mie", 12_000, None), 1).unwrap();
        let err = cart.clear(false).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConfirmationRequired(Confirmation::ClearCart)
        ));
        assert!(!cart.is_empty());

        cart.clear(true).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_resume_requires_overwrite_confirmation() {
        let now = Utc::now();
        let hold = HoldOrder {
            id: "hold-1".into(),
            store_id: "store-1".into(),
            label: "Meja 3".into(),
            buyer: "Budi".into(),
            operator: "kasir".into(),
            lines: vec![CartLine {
                item_id: "mie".into(),
                name: "Mie Goreng".into(),
                price: Money::from_minor(15_000),
                qty: 1,
            }],
            total: Money::from_minor(15_000),
            sync_version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut cart = CartSession::new("kasir");
        cart.add_line(&item("teh", 5_000, None), 1).unwrap();

        let err = cart
            .resume(&hold, false, |_| StockLevel::Untracked)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConfirmationRequired(Confirmation::OverwriteCart)
        ));
        assert_eq!(cart.quantity_of("teh"), 1);

        let adjusted = cart.resume(&hold, true, |_| StockLevel::Untracked).unwrap();
        assert!(adjusted.is_empty());
        assert_eq!(cart.origin_hold_id.as_deref(), Some("hold-1"));
        assert_eq!(cart.buyer, "Budi");
        assert_eq!(cart.total().minor(), 15_000);
    }

    #[test]
    fn test_change_quantity_huge_delta_is_rejected() {
        let mut cart = CartSession::new("kasir");
        cart.add_line(&item("mie", 12_000, None), 1).unwrap();

        let err = cart
            .change_quantity("mie", i64::MAX, StockLevel::Untracked)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(cart.quantity_of("mie"), 1);

        let err = cart
            .change_quantity("mie", i64::MIN, StockLevel::Untracked)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(cart.quantity_of("mie"), 1);
    }

    #[test]
    fn test_resume_cuts_lines_to_current_stock() {
        let now = Utc::now();
        let line = |id: &str, qty: i64| CartLine {
            item_id: id.into(),
            name: format!("Menu {}", id),
            price: Money::from_minor(5_000),
            qty,
        };
        let hold = HoldOrder {
            id: "hold-2".into(),
            store_id: "store-1".into(),
            label: "Meja 5".into(),
            buyer: String::new(),
            operator: "kasir".into(),
            lines: vec![
                line("teh", 5),
                line("roti", 2),
                line("kopi", 4),
                line(&format!("{}ongkir", MANUAL_ITEM_PREFIX), 3),
            ],
            total: Money::from_minor(70_000),
            sync_version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut cart = CartSession::new("kasir");
        let adjusted = cart
            .resume(&hold, false, |id| match id {
                "teh" => StockLevel::Tracked(2),
                "roti" => StockLevel::Tracked(0),
                "kopi" => StockLevel::Tracked(10),
                _ => StockLevel::Tracked(0),
            })
            .unwrap();

        assert_eq!(
            adjusted,
            vec![
                StockAdjustment {
                    item_id: "teh".into(),
                    name: "Menu teh".into(),
                    held: 5,
                    available: 2,
                },
                StockAdjustment {
                    item_id: "roti".into(),
                    name: "Menu roti".into(),
                    held: 2,
                    available: 0,
                },
            ]
        );
        assert_eq!(cart.quantity_of("teh"), 2);
        assert_eq!(cart.quantity_of("roti"), 0);
        assert_eq!(cart.quantity_of("kopi"), 4);
        assert_eq!(cart.line_count(), 3);
        assert_eq!(cart.origin_hold_id.as_deref(), Some("hold-2"));
    }
}
