//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied on every open. A till that was offline for months catches up on
//! its first start.
//!
//! Files are `NNN_what.sql`. Once a file has shipped it is never edited;
//! schema changes go in the next number.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = applied_count(pool).await?;
    MIGRATOR.run(pool).await?;
    let after = applied_count(pool).await?;

    if after > before {
        info!(applied = after - before, schema_version = after, "Schema migrated");
    } else {
        debug!(schema_version = after, "Schema up to date");
    }
    Ok(())
}

/// Migrations known to this build that are not yet applied.
pub async fn pending_migrations(pool: &SqlitePool) -> DbResult<usize> {
    let applied = applied_count(pool).await?;
    Ok(MIGRATOR.migrations.len().saturating_sub(applied))
}

/// Zero before the first run, when the bookkeeping table is absent.
async fn applied_count(pool: &SqlitePool) -> DbResult<usize> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if exists == 0 {
        return Ok(0);
    }

    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(applied.max(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_open_applies_everything() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(pending_migrations(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_database_has_pending_then_none() {
        let db = Database::new(DbConfig::in_memory().skip_migrations()).await.unwrap();
        assert!(pending_migrations(db.pool()).await.unwrap() >= 1);

        run_migrations(db.pool()).await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        assert_eq!(pending_migrations(db.pool()).await.unwrap(), 0);
    }
}
