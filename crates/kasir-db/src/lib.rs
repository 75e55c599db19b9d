//! # kasir-db: Local Durable Store
//!
//! SQLite persistence for the till. Everything the cashier does is written
//! here first; the sync agent ships it to the backing store later.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Database Layer Architecture                         │
//! │                                                                         │
//! │  Terminal command (checkout_commit)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasir-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ MenuRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ LedgerRepo    │    │ 001_initial  │  │   │
//! │  │   │ WAL mode      │    │ HoldRepo      │    │              │  │   │
//! │  │   │               │    │ StoreRepo     │    │              │  │   │
//! │  │   │               │    │ SyncOutbox    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (KASIR_DB_PATH, default in the platform data dir)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`]: `Database`, `DbConfig`, file or in-memory
//! - [`migrations`]: schema files compiled in, applied on open
//! - [`error`]: `DbError` and its cashier-facing kind
//! - [`repository`]: menu, ledger, holds, stores, outbox
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasir_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/kasir.db")).await?;
//!
//! let menu = db.menu().search(&store_id, "goreng", None).await?;
//! let receipt = db.ledger().commit_settlement(&plan).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};

pub use repository::{
    CachedProfile, HoldRepository, LedgerRepository, MenuRepository, StoreRepository,
    SyncOutboxRepository,
};
