//! # Store Repository
//!
//! Tenant caps and the local profile cache.
//!
//! Store rows are administrative configuration: the till reads the caps and
//! flags, and only refreshes them from the directory (`upsert`). The profile
//! cache lets a till open offline with the last signed-in principal and its
//! store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use kasir_core::{Principal, SessionContext, Store};

/// What the till remembers about the last sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProfile {
    pub principal: Principal,
    pub store: Store,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(
            r#"
            SELECT id, name, max_transactions, max_menus, suspended, expires_at
            FROM stores
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(store)
    }

    /// Stores the latest caps read from the tenant directory.
    pub async fn upsert(&self, store: &Store) -> DbResult<()> {
        debug!(id = %store.id, "Refreshing store caps");

        sqlx::query(
            r#"
            INSERT INTO stores (id, name, max_transactions, max_menus, suspended, expires_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                max_transactions = excluded.max_transactions,
                max_menus = excluded.max_menus,
                suspended = excluded.suspended,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&store.id)
        .bind(&store.name)
        .bind(store.max_transactions)
        .bind(store.max_menus)
        .bind(store.suspended)
        .bind(store.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Caches the signed-in principal and its store.
    ///
    /// Returns false without writing while a super-admin is impersonating,
    /// so the actor's cache never holds the impersonated store.
    pub async fn cache_profile(&self, ctx: &SessionContext, store: &Store) -> DbResult<bool> {
        if !ctx.should_cache_profile() {
            warn!(
                principal_id = %ctx.principal.id,
                "Impersonation active, profile cache left untouched"
            );
            return Ok(false);
        }

        let now = Utc::now();
        let profile = serde_json::to_string(&CachedProfile {
            principal: ctx.principal.clone(),
            store: store.clone(),
            cached_at: now,
        })?;

        sqlx::query(
            r#"
            INSERT INTO profile_cache (principal_id, store_id, profile, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(principal_id) DO UPDATE SET
                store_id = excluded.store_id,
                profile = excluded.profile,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(&ctx.principal.id)
        .bind(&store.id)
        .bind(profile)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn cached_profile(&self, principal_id: &str) -> DbResult<Option<CachedProfile>> {
        let profile: Option<String> =
            sqlx::query_scalar("SELECT profile FROM profile_cache WHERE principal_id = ?1")
                .bind(principal_id)
                .fetch_optional(&self.pool)
                .await?;

        match profile {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use kasir_core::Role;
    use std::collections::BTreeMap;

    fn principal(id: &str, role: Role) -> Principal {
        Principal {
            id: id.into(),
            email: format!("{id}@kasir.test"),
            role,
            owner_id: None,
            access: BTreeMap::new(),
        }
    }

    fn store(id: &str) -> Store {
        Store {
            id: id.into(),
            name: "Warung Bu Sri".into(),
            max_transactions: 300,
            max_menus: 50,
            suspended: false,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_store_upsert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stores = db.stores();

        assert!(stores.get("owner-1").await.unwrap().is_none());

        let mut s = store("owner-1");
        stores.upsert(&s).await.unwrap();
        s.suspended = true;
        s.max_transactions = 0;
        stores.upsert(&s).await.unwrap();

        let loaded = stores.get("owner-1").await.unwrap().unwrap();
        assert!(loaded.suspended);
        assert_eq!(loaded.max_transactions, 0);
    }

    #[tokio::test]
    async fn test_owner_profile_is_cached() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ctx = SessionContext::new(principal("owner-1", Role::Owner));

        assert!(db.stores().cache_profile(&ctx, &store("owner-1")).await.unwrap());

        let cached = db.stores().cached_profile("owner-1").await.unwrap().unwrap();
        assert_eq!(cached.store.id, "owner-1");
        assert_eq!(cached.principal.role, Role::Owner);
    }

    #[tokio::test]
    async fn test_impersonation_never_overwrites_cache() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stores = db.stores();
        let now = Utc::now();

        let mut ctx = SessionContext::new(principal("admin-1", Role::SuperAdmin));
        assert!(stores.cache_profile(&ctx, &store("home")).await.unwrap());

        ctx.impersonate("owner-9", Duration::minutes(30), now).unwrap();
        assert!(!stores.cache_profile(&ctx, &store("owner-9")).await.unwrap());

        let cached = stores.cached_profile("admin-1").await.unwrap().unwrap();
        assert_eq!(cached.store.id, "home");
    }
}
