//! # Database State
//!
//! Shared handle to the local store. The sync agent holds the same `Arc`.

use std::sync::Arc;

use kasir_db::Database;

#[derive(Debug, Clone)]
pub struct DbState {
    db: Arc<Database>,
}

impl DbState {
    pub fn new(db: Database) -> Self {
        DbState { db: Arc::new(db) }
    }

    /// Returns a reference to the inner Database.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let items = db_state.inner().menu().search(&store_id, "teh", None).await?;
    /// ```
    pub fn inner(&self) -> &Database {
        &self.db
    }

    /// The shared handle, for components that outlive a command.
    pub fn shared(&self) -> Arc<Database> {
        self.db.clone()
    }
}
