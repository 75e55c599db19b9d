//! # Hold Commands
//!
//! Held tabs ("open bills") are shared by every till at the store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  hold_cart("Meja 4") ──► HoldOrder upserted ──► cart emptied           │
//! │                                                                         │
//! │  list_holds() ──► newest first                                          │
//! │                                                                         │
//! │  resume_hold(id, confirm) ──► cart = hold lines, origin_hold_id = id   │
//! │         │   (tracked lines cut to current stock, cuts in `adjusted`)    │
//! │         ├── hold again ──► same id, sync_version + 1 (no duplicate)    │
//! │         └── settle ─────► hold deleted with the transaction            │
//! │                                                                         │
//! │  delete_hold(id) ──► gone, no transaction                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use kasir_core::{Feature, HoldOrder, StockLevel};

use super::cart::CartResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::{CartState, DbState, SessionState, SyncState};

const HOLD_FEATURES: [Feature; 2] = [Feature::Cashier, Feature::Table];

/// Parks the cart as a held tab and empties it.
///
/// The label falls back to the buyer name when blank.
pub async fn hold_cart(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    sync: &SyncState,
    label: &str,
) -> ApiResult<HoldOrder> {
    debug!(label = %label, "hold_cart command");

    let now = Utc::now();
    let store_id = session.scoped_any(&HOLD_FEATURES, now)?;

    let hold = cart.with_cart(|c| HoldOrder::from_cart(c, label, &store_id, now))?;
    let stored = db.inner().holds().upsert(&hold).await?;

    cart.with_cart_mut(|c| c.reset());
    sync.nudge();

    Ok(stored)
}

pub async fn list_holds(db: &DbState, session: &SessionState) -> ApiResult<Vec<HoldOrder>> {
    let store_id = session.scoped_any(&HOLD_FEATURES, Utc::now())?;
    Ok(db.inner().holds().list(&store_id).await?)
}

/// Loads a held tab into the cart. The tab stays in the queue until it is
/// settled or deleted.
///
/// Lines whose item now has less stock than was held come back at the
/// stock on hand and are listed in `adjusted`.
pub async fn resume_hold(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    hold_id: &str,
    confirm_overwrite: bool,
) -> ApiResult<CartResponse> {
    debug!(hold_id = %hold_id, confirm_overwrite, "resume_hold command");

    let store_id = session.scoped_any(&HOLD_FEATURES, Utc::now())?;
    let hold = db
        .inner()
        .holds()
        .get(&store_id, hold_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Hold", hold_id))?;

    let mut stock = HashMap::new();
    for line in hold.lines.iter().filter(|l| !l.is_manual()) {
        if let Some(item) = db.inner().menu().get(&store_id, &line.item_id).await? {
            stock.insert(line.item_id.clone(), item.stock_level());
        }
    }

    let resp = cart.with_cart_mut(|c| {
        let adjusted = c.resume(&hold, confirm_overwrite, |id| {
            stock.get(id).copied().unwrap_or(StockLevel::Untracked)
        })?;
        let mut resp = CartResponse::from(&*c);
        resp.adjusted = adjusted;
        Ok::<_, ApiError>(resp)
    })?;

    if !resp.adjusted.is_empty() {
        warn!(hold_id = %hold_id, lines = resp.adjusted.len(), "Held lines cut to current stock");
    }
    Ok(resp)
}

/// Drops a held tab without creating a transaction.
pub async fn delete_hold(
    db: &DbState,
    session: &SessionState,
    cart: &CartState,
    sync: &SyncState,
    hold_id: &str,
) -> ApiResult<()> {
    debug!(hold_id = %hold_id, "delete_hold command");

    let store_id = session.scoped_any(&HOLD_FEATURES, Utc::now())?;
    db.inner().holds().delete(&store_id, hold_id).await?;

    // A cart resumed from this tab becomes a fresh sale.
    cart.with_cart_mut(|c| {
        if c.origin_hold_id.as_deref() == Some(hold_id) {
            c.origin_hold_id = None;
        }
    });
    sync.nudge();

    info!(hold_id = %hold_id, "Hold deleted");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
