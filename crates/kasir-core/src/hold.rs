//! # Hold Queue Rules
//!
//! Turning a cart into a held tab. Storage lives in `kasir-db`.
//!
//! ```text
//!   CartSession ──hold──► HoldOrder ──resume──► CartSession ──settle──► Transaction
//!        │                    ▲                                             │
//!        └── origin_hold_id ──┘                                             │
//!                                               hold deleted in the same ───┘
//!                                               commit as the transaction
//! ```
//!
//! Holding a cart that came from a hold reuses the hold's id, so the
//! storage write is an upsert, never a second tab.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cart::CartSession;
use crate::error::{CoreError, CoreResult};
use crate::types::HoldOrder;

impl HoldOrder {
    /// Builds the hold record for `cart`.
    ///
    /// The label falls back to the buyer name. `sync_version` starts at 1;
    /// the repository bumps it when the id already exists.
    pub fn from_cart(
        cart: &CartSession,
        label: &str,
        store_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<HoldOrder> {
        if cart.is_empty() {
            return Err(CoreError::invalid("Cannot hold an empty cart"));
        }

        let label = match label.trim() {
            "" => cart.buyer.trim(),
            label => label,
        };
        if label.is_empty() {
            return Err(CoreError::invalid("Hold needs a label or a buyer name"));
        }

        let id = cart
            .origin_hold_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(HoldOrder {
            id,
            store_id: store_id.to_string(),
            label: label.to_string(),
            buyer: cart.buyer.clone(),
            operator: cart.operator.clone(),
            lines: cart.lines.clone(),
            total: cart.total(),
            sync_version: 1,
            created_at: now,
            updated_at: now,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::StockLevel;

    fn cart_with_total(total: i64) -> CartSession {
        let mut cart = CartSession::new("kasir");
        cart.add_manual_line("Nasi Campur", Money::from_minor(total), 1)
            .unwrap();
        cart
    }

    #[test]
    fn test_hold_empty_cart_is_invalid() {
        let cart = CartSession::new("kasir");
        let err = HoldOrder::from_cart(&cart, "Meja 1", "store-1", Utc::now()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_hold_snapshots_cart() {
        let cart = cart_with_total(15_000);
        let hold = HoldOrder::from_cart(&cart, " Meja 1 ", "store-1", Utc::now()).unwrap();

        assert_eq!(hold.label, "Meja 1");
        assert_eq!(hold.total.minor(), 15_000);
        assert_eq!(hold.lines, cart.lines);
        assert_eq!(hold.store_id, "store-1");
    }

    #[test]
    fn test_hold_label_falls_back_to_buyer() {
        let mut cart = cart_with_total(10_000);
        assert!(HoldOrder::from_cart(&cart, "", "store-1", Utc::now()).is_err());

        cart.set_buyer("Pak Made");
        let hold = HoldOrder::from_cart(&cart, "", "store-1", Utc::now()).unwrap();
        assert_eq!(hold.label, "Pak Made");
    }

    #[test]
    fn test_rehold_reuses_origin_id() {
        let now = Utc::now();
        let first = HoldOrder::from_cart(&cart_with_total(15_000), "Meja 2", "store-1", now).unwrap();

        let mut cart = CartSession::new("kasir");
        cart.resume(&first, false, |_| StockLevel::Untracked).unwrap();
        cart.add_manual_line("Kerupuk", Money::from_minor(2_000), 1)
            .unwrap();

        let second = HoldOrder::from_cart(&cart, "Meja 2", "store-1", now).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.total.minor(), 17_000);
    }
}
