//! # Inbound Handler
//!
//! Applies changes made elsewhere (another till, the back office) to the
//! local store.
//!
//! ## Conflict Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Last-Write-Wins by sync_version                         │
//! │                                                                         │
//! │  EntityUpdate { entityType: menu_item | hold_order, version: V }       │
//! │                                                                         │
//! │  upsert:                                                               │
//! │    if V > local.sync_version (or no local row):                        │
//! │        apply, local.sync_version = V                                   │
//! │    else:                                                                │
//! │        skip (already have newer data)                                  │
//! │                                                                         │
//! │  delete:                                                               │
//! │    remove the local row if present                                     │
//! │                                                                         │
//! │  Inbound writes are never queued in the outbox, so nothing echoes      │
//! │  back to the remote.                                                   │
//! │                                                                         │
//! │  Ledger records are append-only and never arrive here: transactions    │
//! │  from other tills are read by reports on the backing store directly.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kasir_core::{HoldOrder, MenuItem};
use kasir_db::repository::sync::entity;
use kasir_db::Database;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::EntityUpdate;

/// What happened to one inbound update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Written,
    Deleted,
    /// Local copy is at least as new.
    Stale,
    /// Not for this store, or not an entity this till replicates.
    Ignored,
}

// =============================================================================
// Inbound Handler
// =============================================================================

pub struct InboundHandler {
    db: Arc<Database>,
    config: Arc<SyncConfig>,
    update_rx: mpsc::Receiver<EntityUpdate>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the inbound handler.
#[derive(Clone)]
pub struct InboundHandlerHandle {
    update_tx: mpsc::Sender<EntityUpdate>,
    shutdown_tx: mpsc::Sender<()>,
}

impl InboundHandlerHandle {
    pub async fn handle_update(&self, update: EntityUpdate) -> SyncResult<()> {
        self.update_tx
            .send(update)
            .await
            .map_err(|_| SyncError::ChannelClosed("Update"))
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("Shutdown"))
    }
}

impl InboundHandler {
    pub fn new(db: Arc<Database>, config: Arc<SyncConfig>) -> (Self, InboundHandlerHandle) {
        let (update_tx, update_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handler = InboundHandler {
            db,
            config,
            update_rx,
            shutdown_rx,
        };

        let handle = InboundHandlerHandle {
            update_tx,
            shutdown_tx,
        };

        (handler, handle)
    }

    pub async fn run(mut self) {
        info!("Inbound handler starting");

        loop {
            tokio::select! {
                Some(update) = self.update_rx.recv() => {
                    if let Err(e) = self.apply(&update).await {
                        error!(
                            %e,
                            entity_type = %update.entity_type,
                            entity_id = %update.entity_id,
                            "Failed to apply entity update"
                        );
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Inbound handler shutting down");
                    break;
                }
            }
        }

        info!("Inbound handler stopped");
    }

    /// Applies one update last-write-wins.
    pub async fn apply(&self, update: &EntityUpdate) -> SyncResult<Applied> {
        debug!(
            entity_type = %update.entity_type,
            entity_id = %update.entity_id,
            operation = %update.operation,
            version = update.version,
            "Processing entity update"
        );

        if update.store_id != self.config.store_id() {
            warn!(
                store_id = %update.store_id,
                entity_id = %update.entity_id,
                "Ignoring update for another store"
            );
            return Ok(Applied::Ignored);
        }

        let applied = match (update.entity_type.as_str(), update.operation.as_str()) {
            (entity::MENU_ITEM, "upsert") => {
                let mut item: MenuItem = self.decode(update)?;
                item.sync_version = update.version;
                self.written(self.db.menu().apply_remote(&item).await?)
            }
            (entity::MENU_ITEM, "delete") => self.deleted(
                self.db
                    .menu()
                    .delete_remote(&update.store_id, &update.entity_id)
                    .await?,
            ),
            (entity::HOLD_ORDER, "upsert") => {
                let mut hold: HoldOrder = self.decode(update)?;
                hold.sync_version = update.version;
                self.written(self.db.holds().apply_remote(&hold).await?)
            }
            (entity::HOLD_ORDER, "delete") => self.deleted(
                self.db
                    .holds()
                    .delete_remote(&update.store_id, &update.entity_id)
                    .await?,
            ),
            (entity_type, operation) => {
                debug!(entity_type, operation, "Update not replicated to this till");
                Applied::Ignored
            }
        };

        match applied {
            Applied::Stale => debug!(
                entity_id = %update.entity_id,
                version = update.version,
                "Skipping stale update"
            ),
            Applied::Written | Applied::Deleted => info!(
                entity_type = %update.entity_type,
                entity_id = %update.entity_id,
                version = update.version,
                "Applied remote change"
            ),
            Applied::Ignored => {}
        }

        Ok(applied)
    }

    /// Parses the entity body and checks it matches the envelope.
    fn decode<T>(&self, update: &EntityUpdate) -> SyncResult<T>
    where
        T: serde::de::DeserializeOwned + Identified,
    {
        let entity: T = serde_json::from_value(update.data.clone())?;

        if entity.id() != update.entity_id || entity.store_id() != update.store_id {
            return Err(SyncError::ApplyFailed(format!(
                "{} body does not match envelope {}",
                update.entity_type, update.entity_id
            )));
        }

        Ok(entity)
    }

    fn written(&self, changed: bool) -> Applied {
        if changed {
            Applied::Written
        } else {
            Applied::Stale
        }
    }

    fn deleted(&self, changed: bool) -> Applied {
        if changed {
            Applied::Deleted
        } else {
            Applied::Ignored
        }
    }
}

/// Replicated entities carry their own id and store.
pub trait Identified {
    fn id(&self) -> &str;
    fn store_id(&self) -> &str;
}

impl Identified for MenuItem {
    fn id(&self) -> &str {
        &self.id
    }
    fn store_id(&self) -> &str {
        &self.store_id
    }
}

impl Identified for HoldOrder {
    fn id(&self) -> &str {
        &self.id
    }
    fn store_id(&self) -> &str {
        &self.store_id
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
