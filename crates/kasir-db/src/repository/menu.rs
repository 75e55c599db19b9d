//! # Menu Repository
//!
//! Menu items and their stock counters.
//!
//! ## Stock Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Who touches stock                                │
//! │                                                                         │
//! │  set_stock(id, Some(n))   admin count      → menu_item upsert entry     │
//! │  set_stock(id, None)      stop tracking    → menu_item upsert entry     │
//! │  adjust_stock(id, ±d)     restock/shrink   → inventory_delta entry      │
//! │  commit_settlement        sale             → inventory_delta (ledger)   │
//! │  refund                   void             → inventory_delta (ledger)   │
//! │                                                                         │
//! │  Increments are relative (stock = MAX(stock + d, 0)) so two tills      │
//! │  selling the same item never overwrite each other's decrement.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every local mutation bumps `sync_version` and queues an outbox entry in
//! the same SQLite transaction. Remote updates arrive through
//! [`MenuRepository::apply_remote`] and are applied last-write-wins.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::sync::{enqueue, entity, op, DeletedPayload, InventoryDeltaPayload, OutboxWrite};
use kasir_core::validation::validate_stock;
use kasir_core::{CoreError, MenuItem};

const MENU_COLUMNS: &str =
    "id, store_id, name, price, category, stock, favorite, sync_version, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct MenuRepository {
    pool: SqlitePool,
}

impl MenuRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MenuRepository { pool }
    }

    /// Creates or updates an item and returns the stored row.
    ///
    /// An existing row keeps its `created_at` and gets `sync_version + 1`.
    /// An id that belongs to another store is reported as not found.
    pub async fn upsert(&self, item: &MenuItem) -> DbResult<MenuItem> {
        debug!(id = %item.id, name = %item.name, "Upserting menu item");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO menu_items (
                id, store_id, name, price, category, stock, favorite,
                sync_version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                category = excluded.category,
                stock = excluded.stock,
                favorite = excluded.favorite,
                sync_version = menu_items.sync_version + 1,
                updated_at = excluded.updated_at
            WHERE menu_items.store_id = excluded.store_id
            "#,
        )
        .bind(&item.id)
        .bind(&item.store_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(&item.category)
        .bind(item.stock)
        .bind(item.favorite)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Menu item", &item.id));
        }

        let stored = fetch_item(&mut tx, &item.store_id, &item.id)
            .await?
            .ok_or_else(|| DbError::not_found("Menu item", &item.id))?;
        queue_item(&mut tx, &stored).await?;

        tx.commit().await?;
        Ok(stored)
    }

    pub async fn get(&self, store_id: &str, id: &str) -> DbResult<Option<MenuItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_item(&mut conn, store_id, id).await
    }

    /// Favourites first, then by name.
    pub async fn list(&self, store_id: &str) -> DbResult<Vec<MenuItem>> {
        let items = sqlx::query_as::<_, MenuItem>(&format!(
            "SELECT {MENU_COLUMNS} FROM menu_items WHERE store_id = ?1 \
             ORDER BY favorite DESC, name COLLATE NOCASE ASC"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Case-insensitive substring match on the name, optionally within one
    /// category. An empty query lists everything (in the category).
    pub async fn search(
        &self,
        store_id: &str,
        query: &str,
        category: Option<&str>,
    ) -> DbResult<Vec<MenuItem>> {
        let query = query.trim();
        debug!(query = %query, category = ?category, "Searching menu");

        let items = sqlx::query_as::<_, MenuItem>(&format!(
            "SELECT {MENU_COLUMNS} FROM menu_items \
             WHERE store_id = ?1 \
             AND (?2 = '' OR instr(lower(name), lower(?2)) > 0) \
             AND (?3 IS NULL OR category = ?3) \
             ORDER BY favorite DESC, name COLLATE NOCASE ASC"
        ))
        .bind(store_id)
        .bind(query)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = items.len(), "Search returned menu items");
        Ok(items)
    }

    pub async fn categories(&self, store_id: &str) -> DbResult<Vec<String>> {
        let categories = sqlx::query_scalar(
            "SELECT DISTINCT category FROM menu_items WHERE store_id = ?1 ORDER BY category",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Number of items in the store, for the menu quota.
    pub async fn count(&self, store_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items WHERE store_id = ?1")
            .bind(store_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Hard delete. Ledger lines keep their own snapshot of the item.
    pub async fn delete(&self, store_id: &str, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting menu item");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM menu_items WHERE id = ?1 AND store_id = ?2")
            .bind(id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Menu item", id));
        }

        enqueue(
            &mut tx,
            OutboxWrite {
                store_id,
                entity_type: entity::MENU_ITEM,
                entity_id: id,
                record_id: id,
                operation: op::DELETE,
                payload: &DeletedPayload { id },
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Sets the absolute stock count, or switches the item to untracked
    /// with `None`.
    pub async fn set_stock(&self, store_id: &str, id: &str, stock: Option<i64>) -> DbResult<MenuItem> {
        if let Some(n) = stock {
            validate_stock(n).map_err(CoreError::from)?;
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE menu_items SET
                stock = ?3,
                sync_version = sync_version + 1,
                updated_at = ?4
            WHERE id = ?1 AND store_id = ?2
            "#,
        )
        .bind(id)
        .bind(store_id)
        .bind(stock)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Menu item", id));
        }

        let stored = fetch_item(&mut tx, store_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Menu item", id))?;
        queue_item(&mut tx, &stored).await?;

        tx.commit().await?;

        info!(id = %id, stock = ?stock, "Stock set");
        Ok(stored)
    }

    /// Adds `delta` to a tracked item's stock, floored at 0, and returns the
    /// new count.
    ///
    /// ## Errors
    /// - `NotFound` if the item is not in the store
    /// - `Domain(InvalidInput)` if the item is untracked
    pub async fn adjust_stock(&self, store_id: &str, id: &str, delta: i64) -> DbResult<i64> {
        debug!(id = %id, delta = %delta, "Adjusting stock");

        let mut tx = self.pool.begin().await?;

        let before = fetch_item(&mut tx, store_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Menu item", id))?;
        let Some(previous) = before.stock else {
            return Err(CoreError::invalid(format!("{} does not track stock", before.name)).into());
        };

        let stock: i64 = sqlx::query_scalar(
            r#"
            UPDATE menu_items SET
                stock = MAX(stock + ?3, 0),
                sync_version = sync_version + 1,
                updated_at = ?4
            WHERE id = ?1 AND store_id = ?2
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(store_id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let applied = stock - previous;
        if applied != 0 {
            enqueue(
                &mut tx,
                OutboxWrite {
                    store_id,
                    entity_type: entity::INVENTORY_DELTA,
                    entity_id: id,
                    record_id: id,
                    operation: op::DELTA,
                    payload: &InventoryDeltaPayload {
                        item_id: id,
                        delta: applied,
                    },
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(stock)
    }

    /// Flips the favourite flag and returns the new value.
    pub async fn toggle_favorite(&self, store_id: &str, id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE menu_items SET
                favorite = NOT favorite,
                sync_version = sync_version + 1,
                updated_at = ?3
            WHERE id = ?1 AND store_id = ?2
            "#,
        )
        .bind(id)
        .bind(store_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Menu item", id));
        }

        let stored = fetch_item(&mut tx, store_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Menu item", id))?;
        queue_item(&mut tx, &stored).await?;

        tx.commit().await?;
        Ok(stored.favorite)
    }

    // =========================================================================
    // Inbound replication
    // =========================================================================

    /// Applies a remote copy if it is newer than the local one.
    ///
    /// Returns false for a stale update. Nothing is queued.
    pub async fn apply_remote(&self, item: &MenuItem) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO menu_items (
                id, store_id, name, price, category, stock, favorite,
                sync_version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                category = excluded.category,
                stock = excluded.stock,
                favorite = excluded.favorite,
                sync_version = excluded.sync_version,
                updated_at = excluded.updated_at
            WHERE excluded.sync_version > menu_items.sync_version
            AND menu_items.store_id = excluded.store_id
            "#,
        )
        .bind(&item.id)
        .bind(&item.store_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(&item.category)
        .bind(item.stock)
        .bind(item.favorite)
        .bind(item.sync_version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes an item deleted on another till.
    pub async fn delete_remote(&self, store_id: &str, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = ?1 AND store_id = ?2")
            .bind(id)
            .bind(store_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn fetch_item(
    conn: &mut SqliteConnection,
    store_id: &str,
    id: &str,
) -> DbResult<Option<MenuItem>> {
    let item = sqlx::query_as::<_, MenuItem>(&format!(
        "SELECT {MENU_COLUMNS} FROM menu_items WHERE id = ?1 AND store_id = ?2"
    ))
    .bind(id)
    .bind(store_id)
    .fetch_optional(conn)
    .await?;

    Ok(item)
}

async fn queue_item(conn: &mut SqliteConnection, item: &MenuItem) -> DbResult<String> {
    enqueue(
        conn,
        OutboxWrite {
            store_id: &item.store_id,
            entity_type: entity::MENU_ITEM,
            entity_id: &item.id,
            record_id: &item.id,
            operation: op::UPSERT,
            payload: item,
        },
    )
    .await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasir_core::{ErrorKind, Money};

    fn item(id: &str, name: &str, price: i64, stock: Option<i64>) -> MenuItem {
        let now = Utc::now();
        MenuItem {
            id: id.into(),
            store_id: "store-1".into(),
            name: name.into(),
            price: Money::from_minor(price),
            category: "Makanan".into(),
            stock,
            favorite: false,
            sync_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_bumps_version_and_queues() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();

        let created = menu.upsert(&item("mie", "Mie Goreng", 12_000, Some(10))).await.unwrap();
        assert_eq!(created.sync_version, 1);

        let mut edited = created.clone();
        edited.price = Money::from_minor(13_000);
        let updated = menu.upsert(&edited).await.unwrap();
        assert_eq!(updated.sync_version, 2);
        assert_eq!(updated.price.minor(), 13_000);
        assert_eq!(updated.created_at, created.created_at);

        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_cannot_take_another_stores_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.menu().upsert(&item("mie", "Mie Goreng", 12_000, None)).await.unwrap();

        let mut foreign = item("mie", "Mie Rebus", 1, None);
        foreign.store_id = "store-2".into();
        let err = db.menu().upsert(&foreign).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_and_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();
        menu.upsert(&item("a", "Nasi Goreng", 15_000, None)).await.unwrap();
        menu.upsert(&item("b", "Mie Goreng", 12_000, None)).await.unwrap();
        let mut teh = item("c", "Es Teh", 5_000, None);
        teh.category = "Minuman".into();
        teh.favorite = true;
        menu.upsert(&teh).await.unwrap();

        let names: Vec<_> = menu.list("store-1").await.unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Es Teh", "Mie Goreng", "Nasi Goreng"]);

        let goreng = menu.search("store-1", "GORENG", None).await.unwrap();
        assert_eq!(goreng.len(), 2);

        let drinks = menu.search("store-1", "", Some("Minuman")).await.unwrap();
        assert_eq!(drinks.len(), 1);

        assert_eq!(menu.categories("store-1").await.unwrap(), vec!["Makanan", "Minuman"]);
        assert_eq!(menu.count("store-1").await.unwrap(), 3);
        assert_eq!(menu.count("store-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_stock_rules() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();
        menu.upsert(&item("mie", "Mie Goreng", 12_000, None)).await.unwrap();

        let tracked = menu.set_stock("store-1", "mie", Some(7)).await.unwrap();
        assert_eq!(tracked.stock, Some(7));

        let err = menu.set_stock("store-1", "mie", Some(-1)).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));

        let untracked = menu.set_stock("store-1", "mie", None).await.unwrap();
        assert_eq!(untracked.stock, None);
    }

    #[tokio::test]
    async fn test_adjust_stock_floors_at_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();
        menu.upsert(&item("mie", "Mie Goreng", 12_000, Some(3))).await.unwrap();

        assert_eq!(menu.adjust_stock("store-1", "mie", 5).await.unwrap(), 8);
        assert_eq!(menu.adjust_stock("store-1", "mie", -20).await.unwrap(), 0);

        menu.upsert(&item("teh", "Es Teh", 5_000, None)).await.unwrap();
        let err = menu.adjust_stock("store-1", "teh", 1).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));

        let err = menu.adjust_stock("store-1", "ghost", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_toggle_favorite_and_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();
        menu.upsert(&item("mie", "Mie Goreng", 12_000, None)).await.unwrap();

        assert!(menu.toggle_favorite("store-1", "mie").await.unwrap());
        assert!(!menu.toggle_favorite("store-1", "mie").await.unwrap());

        menu.delete("store-1", "mie").await.unwrap();
        assert!(menu.get("store-1", "mie").await.unwrap().is_none());
        assert!(matches!(
            menu.delete("store-1", "mie").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_apply_remote_is_last_write_wins() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let menu = db.menu();
        menu.upsert(&item("mie", "Mie Goreng", 12_000, None)).await.unwrap();
        let queued = db.sync_outbox().count_pending().await.unwrap();

        let mut newer = item("mie", "Mie Goreng Spesial", 15_000, None);
        newer.sync_version = 3;
        assert!(menu.apply_remote(&newer).await.unwrap());

        let mut stale = item("mie", "Mie Lama", 9_000, None);
        stale.sync_version = 2;
        assert!(!menu.apply_remote(&stale).await.unwrap());

        let stored = menu.get("store-1", "mie").await.unwrap().unwrap();
        assert_eq!(stored.name, "Mie Goreng Spesial");
        assert_eq!(stored.sync_version, 3);

        // Inbound writes are not echoed back.
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), queued);
    }
}
