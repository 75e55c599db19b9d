//! # Quota Guard
//!
//! Pre-checkout gates driven by the store's administrative caps.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout requested                                                     │
//! │       │                                                                 │
//! │       ├── check_store_active(store, now) ── suspended/expired → FORBIDDEN│
//! │       │                                                                 │
//! │       ├── count = ledger.count_since(start_of_month(now))               │
//! │       │                                                                 │
//! │       ├── check_quota(store, count) ── count ≥ max → QUOTA_EXCEEDED     │
//! │       │                                 (max = 0 → unlimited)           │
//! │       ▼                                                                 │
//! │  settlement runs                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The count comes from the local ledger and may lag other tills at the same
//! store, so the cap is approximate. Only the moment of checkout is gated; a
//! recorded sale is never invalidated afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::Store;

pub use crate::clock::start_of_month;

/// Rejects checkout when the monthly cap is reached.
///
/// `count` is every record created since the start of the month, refunded
/// ones included.
pub fn check_quota(store: &Store, count: i64) -> CoreResult<()> {
    if store.max_transactions > 0 && count >= store.max_transactions {
        return Err(CoreError::QuotaExceeded {
            limit: store.max_transactions,
            used: count,
        });
    }
    Ok(())
}

/// Rejects any trading on a suspended or expired store.
pub fn check_store_active(store: &Store, now: DateTime<Utc>) -> CoreResult<()> {
    if store.suspended {
        return Err(CoreError::forbidden("Store is suspended"));
    }
    if !store.is_active(now) {
        return Err(CoreError::forbidden("Store subscription has expired"));
    }
    Ok(())
}

/// Rejects creating another menu item when the menu cap is reached.
pub fn check_menu_quota(store: &Store, menu_count: i64) -> CoreResult<()> {
    if store.max_menus > 0 && menu_count >= store.max_menus {
        return Err(CoreError::MenuQuotaExceeded {
            limit: store.max_menus,
            used: menu_count,
        });
    }
    Ok(())
}

/// Usage figures for the lobby badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuotaUsage {
    pub used: i64,
    /// `None` when unlimited.
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
}

impl QuotaUsage {
    pub fn for_store(store: &Store, count: i64) -> Self {
        let limit = (store.max_transactions > 0).then_some(store.max_transactions);
        QuotaUsage {
            used: count,
            limit,
            remaining: limit.map(|max| (max - count).max(0)),
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

    fn store(max_transactions: i64) -> Store {
        Store {
            id: "owner-1".into(),
            name: "Warung Miekopies".into(),
            max_transactions,
            max_menus: 2,
            suspended: false,
            expires_at: None,
        }
    }

    #[test]
    fn test_quota_zero_is_unlimited() {
        assert!(check_quota(&store(0), 0).is_ok());
        assert!(check_quota(&store(0), 1_000_000).is_ok());
    }

    #[test]
    fn test_fourth_checkout_rejected_at_quota_three() {
        let s = store(3);
        assert!(check_quota(&s, 2).is_ok());

        let err = check_quota(&s, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(matches!(err, CoreError::QuotaExceeded { limit: 3, used: 3 }));
    }

    #[test]
    fn test_inactive_store_is_forbidden() {
        let now = Utc::now();
        let mut s = store(0);
        assert!(check_store_active(&s, now).is_ok());

        s.suspended = true;
        assert_eq!(
            check_store_active(&s, now).unwrap_err().kind(),
            ErrorKind::Forbidden
        );

        s.suspended = false;
        s.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(check_store_active(&s, now).is_err());
    }

    #[test]
    fn test_menu_quota() {
        let s = store(0);
        assert!(check_menu_quota(&s, 1).is_ok());
        assert_eq!(
            check_menu_quota(&s, 2).unwrap_err().kind(),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn test_quota_usage() {
        let usage = QuotaUsage::for_store(&store(3), 5);
        assert_eq!(usage.remaining, Some(0));
        assert_eq!(QuotaUsage::for_store(&store(0), 5).limit, None);
    }
}
