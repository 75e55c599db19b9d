//! # Menu Commands
//!
//! Menu admin and stock keeping. Reads are open to anyone with a store;
//! writes need the matching right.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MenuAdmin ──► upsert_menu_item, toggle_favorite, delete_menu_item     │
//! │  Stock ──────► set_stock (absolute / untracked), adjust_stock (delta)  │
//! │  any ────────► list_menu, search_menu, list_categories                 │
//! │                                                                         │
//! │  Every write is one SQLite transaction with its outbox entry.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use kasir_core::quota;
use kasir_core::validation::{
    validate_category, validate_item_name, validate_price, validate_search_query, validate_stock,
    validate_uuid,
};
use kasir_core::{Feature, MenuItem, Money};

use super::load_store;
use crate::error::{ApiError, ApiResult};
use crate::state::{ConfigState, DbState, SessionState, SyncState};

const STOCK_FEATURES: [Feature; 2] = [Feature::Stock, Feature::MenuAdmin];

/// Form data for creating or editing an item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemInput {
    /// `None` creates a new item.
    pub id: Option<String>,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub category: String,
    /// `None` leaves the item untracked.
    pub stock: Option<i64>,
    #[serde(default)]
    pub favorite: bool,
}

/// Creates or edits a menu item.
///
/// ## Errors
/// - `INVALID_INPUT` for a blank name, negative price or negative stock
/// - `QUOTA_EXCEEDED` when creating past the store's menu cap
pub async fn upsert_menu_item(
    db: &DbState,
    session: &SessionState,
    config: &ConfigState,
    sync: &SyncState,
    input: MenuItemInput,
) -> ApiResult<MenuItem> {
    debug!(id = ?input.id, name = %input.name, "upsert_menu_item command");

    let now = Utc::now();
    let store_id = session.scoped(Feature::MenuAdmin, now)?;

    let name = validate_item_name(&input.name)?;
    let category = validate_category(&input.category)?;
    validate_price(input.price)?;
    if let Some(stock) = input.stock {
        validate_stock(stock)?;
    }

    let menu = db.inner().menu();
    let existing = match &input.id {
        Some(id) => {
            validate_uuid(id)?;
            menu.get(&store_id, id).await?
        }
        None => None,
    };

    if existing.is_none() {
        let store = load_store(db, config, &store_id).await?;
        quota::check_menu_quota(&store, menu.count(&store_id).await?)?;
    }

    let item = MenuItem {
        id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        store_id,
        name,
        price: input.price,
        category,
        stock: input.stock,
        favorite: input.favorite,
        sync_version: existing.as_ref().map(|e| e.sync_version).unwrap_or(0),
        created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    };

    let stored = menu.upsert(&item).await?;
    sync.nudge();

    info!(id = %stored.id, name = %stored.name, created = existing.is_none(), "Menu item saved");
    Ok(stored)
}

/// Sets the absolute stock, or stops tracking it with `None`.
pub async fn set_stock(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    item_id: &str,
    stock: Option<i64>,
) -> ApiResult<MenuItem> {
    debug!(item_id = %item_id, stock = ?stock, "set_stock command");

    let store_id = session.scoped_any(&STOCK_FEATURES, Utc::now())?;
    let stored = db.inner().menu().set_stock(&store_id, item_id, stock).await?;
    sync.nudge();

    Ok(stored)
}

/// Restock (positive) or write off (negative). Returns the new count.
pub async fn adjust_stock(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    item_id: &str,
    delta: i64,
) -> ApiResult<i64> {
    debug!(item_id = %item_id, delta, "adjust_stock command");

    if delta == 0 {
        return Err(ApiError::invalid("Stock adjustment cannot be zero"));
    }

    let store_id = session.scoped_any(&STOCK_FEATURES, Utc::now())?;
    let stock = db.inner().menu().adjust_stock(&store_id, item_id, delta).await?;
    sync.nudge();

    Ok(stock)
}

pub async fn toggle_favorite(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    item_id: &str,
) -> ApiResult<bool> {
    debug!(item_id = %item_id, "toggle_favorite command");

    let store_id = session.scoped(Feature::MenuAdmin, Utc::now())?;
    let favorite = db.inner().menu().toggle_favorite(&store_id, item_id).await?;
    sync.nudge();

    Ok(favorite)
}

/// Deletes an item. Past transactions keep their own copy of it.
pub async fn delete_menu_item(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    item_id: &str,
) -> ApiResult<()> {
    debug!(item_id = %item_id, "delete_menu_item command");

    let store_id = session.scoped(Feature::MenuAdmin, Utc::now())?;
    db.inner().menu().delete(&store_id, item_id).await?;
    sync.nudge();

    info!(item_id = %item_id, "Menu item deleted");
    Ok(())
}

/// Favourites first, then by name.
pub async fn list_menu(db: &DbState, session: &SessionState) -> ApiResult<Vec<MenuItem>> {
    let store_id = session.store_id(Utc::now())?;
    Ok(db.inner().menu().list(&store_id).await?)
}

pub async fn search_menu(
    db: &DbState,
    session: &SessionState,
    query: &str,
    category: Option<&str>,
) -> ApiResult<Vec<MenuItem>> {
    debug!(query = %query, category = ?category, "search_menu command");

    let store_id = session.store_id(Utc::now())?;
    let query = validate_search_query(query)?;
    Ok(db.inner().menu().search(&store_id, &query, category).await?)
}

pub async fn list_categories(db: &DbState, session: &SessionState) -> ApiResult<Vec<String>> {
    let store_id = session.store_id(Utc::now())?;
    Ok(db.inner().menu().categories(&store_id).await?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture::{employee, menu_item, store_caps, till, till_as};
    use crate::error::ErrorCode;

    fn input(name: &str, price: i64, stock: Option<i64>) -> MenuItemInput {
        MenuItemInput {
            id: None,
            name: name.into(),
            price: Money::from_minor(price),
            category: String::new(),
            stock,
            favorite: false,
        }
    }

    #[tokio::test]
    async fn test_create_then_edit_keeps_id() {
        let till = till().await;
        let created = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input(" Es Teh ", 5_000, None))
            .await
            .unwrap();
        assert_eq!(created.name, "Es Teh");
        assert_eq!(created.category, "Umum");
        assert!(Uuid::parse_str(&created.id).is_ok());

        let mut edit = input("Es Teh Manis", 6_000, Some(10));
        edit.id = Some(created.id.clone());
        let edited = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, edit)
            .await
            .unwrap();
        assert_eq!(edited.id, created.id);
        assert_eq!(edited.created_at, created.created_at);
        assert!(edited.sync_version > created.sync_version);
        assert_eq!(list_menu(&till.db, &till.session).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let till = till().await;
        let err = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input("  ", 5_000, None))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let err = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input("Kopi", -1, None))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let err = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input("Kopi", 1, Some(-2)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_menu_cap_blocks_new_items_only() {
        let till = till().await;
        store_caps(&till, 0, 1).await;

        let first = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input("Kopi", 4_000, None))
            .await
            .unwrap();
        let err = upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, input("Teh", 3_000, None))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::QuotaExceeded);

        let mut edit = input("Kopi Susu", 6_000, None);
        edit.id = Some(first.id);
        upsert_menu_item(&till.db, &till.session, &till.config, &till.sync, edit)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stock_commands() {
        let till = till().await;
        menu_item(&till, "m-1", "Kerupuk", 1_000, Some(4)).await;

        assert_eq!(adjust_stock(&till.db, &till.session, &till.sync, "m-1", 6).await.unwrap(), 10);
        assert_eq!(adjust_stock(&till.db, &till.session, &till.sync, "m-1", -15).await.unwrap(), 0);

        let item = set_stock(&till.db, &till.session, &till.sync, "m-1", None).await.unwrap();
        assert_eq!(item.stock, None);

        let err = adjust_stock(&till.db, &till.session, &till.sync, "m-1", 1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);

        let err = set_stock(&till.db, &till.session, &till.sync, "ghost", Some(1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_search_favorite_and_delete() {
        let till = till().await;
        menu_item(&till, "m-1", "Mie Goreng", 12_000, None).await;
        menu_item(&till, "m-2", "Mie Rebus", 12_000, None).await;
        menu_item(&till, "m-3", "Nasi Goreng", 15_000, None).await;

        let found = search_menu(&till.db, &till.session, "mie", None).await.unwrap();
        assert_eq!(found.len(), 2);

        assert!(toggle_favorite(&till.db, &till.session, &till.sync, "m-3").await.unwrap());
        let listed = list_menu(&till.db, &till.session).await.unwrap();
        assert_eq!(listed[0].id, "m-3");
        assert_eq!(list_categories(&till.db, &till.session).await.unwrap(), vec!["Makanan"]);

        delete_menu_item(&till.db, &till.session, &till.sync, "m-1").await.unwrap();
        assert_eq!(search_menu(&till.db, &till.session, "mie", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stock_keeper_cannot_edit_menu() {
        let till = till_as(employee(&[Feature::Stock])).await;
        menu_item(&till, "m-1", "Kerupuk", 1_000, Some(4)).await;

        assert_eq!(adjust_stock(&till.db, &till.session, &till.sync, "m-1", 1).await.unwrap(), 5);

        let err = delete_menu_item(&till.db, &till.session, &till.sync, "m-1")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
