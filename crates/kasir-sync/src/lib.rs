//! # kasir-sync: Backing-Store Synchronisation
//!
//! Moves the local outbox to the backing store and applies the store's
//! changes back, without ever blocking the cashier.
//!
//! ## How a sale reaches the backing store
//! ```text
//!   commit_settlement ──► sync_outbox rows (same SQLite transaction)
//!                                │
//!               nudge / reconnect / backoff timer
//!                                ▼
//!                         OutboxProcessor ── OutboxBatch ──► Transport ──► remote
//!                                ▲                                │
//!                                └──────── BatchAck ◄─────────────┘
//!                                                                 │
//!        InboundHandler ◄── EntityUpdate (menu, holds) ◄──────────┘
//!
//!   SyncReporter reads the outbox: LocalOnly, Confirmed or Failed per record.
//!   SyncAgent spawns all of the above, or nothing at all in offline mode.
//! ```
//!
//! ## Modules
//! - [`agent`]: start/stop, `SyncStatus`, `SyncEventEmitter`
//! - [`config`]: `sync.toml` plus `KASIR_*` overrides
//! - [`error`]: `SyncError`, retry and config classification
//! - [`inbound`]: last-write-wins apply of remote edits
//! - [`outbox`]: one batch in flight, marks synced or rejected
//! - [`protocol`]: JSON frames
//! - [`reporter`]: per-record sync state
//! - [`transport`]: the reconnecting WebSocket
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasir_sync::{SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let mut agent = SyncAgent::new(config, database);
//! agent.start().await?;
//!
//! let sync = agent.handle();
//! sync.nudge();
//! let state = sync.reporter().record_state(&receipt.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;
pub mod inbound;
pub mod outbox;
pub mod protocol;
pub mod reporter;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use config::{SyncConfig, SyncMode};
pub use error::{SyncError, SyncResult};
pub use protocol::SyncMessage;
pub use reporter::SyncReporter;
pub use transport::ConnectionState;
