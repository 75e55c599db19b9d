//! # Commands Module
//!
//! Everything a UI shell calls. Commands are plain functions that take the
//! state they need and return `Result<T, ApiError>`.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs         ◄─── You are here (shared helpers)
//! ├── cart.rs        ◄─── Cart manipulation
//! ├── hold.rs        ◄─── Held tabs (shared per store)
//! ├── checkout.rs    ◄─── Quote and commit a settlement
//! ├── ledger.rs      ◄─── Lists, refunds, debts, reports
//! ├── menu.rs        ◄─── Menu and stock admin
//! ├── navigation.rs  ◄─── Screens and impersonation
//! └── sync.rs        ◄─── Sync indicator
//! ```
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UI: tap "Mie Goreng"                                                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  cart::add_to_cart(&db, &session, &cart, "m-1", None)                   │
//! │         │                                                               │
//! │         ├── session.scoped(Feature::Cashier, now)  ── FORBIDDEN?        │
//! │         ├── db.menu().get(store_id, "m-1")         ── NOT_FOUND?        │
//! │         ├── cart.add_line(&item, 1)                ── STOCK_EXCEEDED?   │
//! │         ▼                                                               │
//! │  CartResponse { lines, buyer, totals }  (JSON)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every menu, ledger and hold call resolves the effective store first, so
//! an impersonating super-admin reads and writes the impersonated store.

pub mod cart;
pub mod checkout;
pub mod hold;
pub mod ledger;
pub mod menu;
pub mod navigation;
pub mod sync;

use kasir_core::Store;

use crate::error::ApiResult;
use crate::state::{ConfigState, DbState};

/// The store's caps, or an unlimited active store when none are cached yet.
pub(crate) async fn load_store(db: &DbState, config: &ConfigState, store_id: &str) -> ApiResult<Store> {
    Ok(db
        .inner()
        .stores()
        .get(store_id)
        .await?
        .unwrap_or_else(|| config.fallback_store(store_id)))
}

// =============================================================================
// Test Fixture
// =============================================================================

#[cfg(test)]
pub(crate) mod fixture {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use kasir_core::{Feature, MenuItem, Money, Principal, Role, Store};
    use kasir_db::{Database, DbConfig};
    use kasir_sync::{SyncAgent, SyncConfig, SyncMode};

    use crate::state::{CartState, ConfigState, DbState, SessionState, SyncState};

    pub const STORE: &str = "owner-1";

    /// Every piece of state, wired to an in-memory store with sync offline.
    pub struct Till {
        pub db: DbState,
        pub cart: CartState,
        pub session: SessionState,
        pub config: ConfigState,
        pub sync: SyncState,
    }

    pub fn owner() -> Principal {
        Principal {
            id: STORE.into(),
            email: "bu.sri@warung.id".into(),
            role: Role::Owner,
            owner_id: None,
            access: BTreeMap::new(),
        }
    }

    pub fn employee(access: &[Feature]) -> Principal {
        Principal {
            id: "emp-1".into(),
            email: "kasir@warung.id".into(),
            role: Role::Employee,
            owner_id: Some(STORE.into()),
            access: access.iter().map(|f| (*f, true)).collect(),
        }
    }

    pub fn super_admin() -> Principal {
        Principal {
            id: "admin-1".into(),
            email: "admin@kasir.id".into(),
            role: Role::SuperAdmin,
            owner_id: None,
            access: BTreeMap::new(),
        }
    }

    pub async fn till_as(principal: Principal) -> Till {
        let db = DbState::new(Database::new(DbConfig::in_memory()).await.unwrap());

        let mut sync_config = SyncConfig::default();
        sync_config.store.id = STORE.into();
        sync_config.sync.mode = SyncMode::Offline;
        let agent = SyncAgent::new(sync_config, db.shared());

        Till {
            cart: CartState::new(principal.email.clone()),
            session: SessionState::new(principal),
            config: ConfigState::default(),
            sync: SyncState::new(agent.handle()),
            db,
        }
    }

    pub async fn till() -> Till {
        till_as(owner()).await
    }

    /// Stores a menu item directly and returns it.
    pub async fn menu_item(till: &Till, id: &str, name: &str, price: i64, stock: Option<i64>) -> MenuItem {
        let now = Utc::now();
        till.db
            .inner()
            .menu()
            .upsert(&MenuItem {
                id: id.into(),
                store_id: STORE.into(),
                name: name.into(),
                price: Money::from_minor(price),
                category: "Makanan".into(),
                stock,
                favorite: false,
                sync_version: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub async fn store_caps(till: &Till, max_transactions: i64, max_menus: i64) {
        till.db
            .inner()
            .stores()
            .upsert(&Store {
                id: STORE.into(),
                name: "Warung Bu Sri".into(),
                max_transactions,
                max_menus,
                suspended: false,
                expires_at: None,
            })
            .await
            .unwrap();
    }
}
