//! # Repository Module
//!
//! SQLite repositories for Kasir.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Terminal command                                                      │
//! │       │                                                                 │
//! │       │  db.ledger().commit_settlement(&plan)                          │
//! │       ▼                                                                 │
//! │  LedgerRepository                                                      │
//! │  ├── commit_settlement / settle_debt / refund   (atomic + outbox)     │
//! │  └── get / list_between / count_since / open_debts                     │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every local mutation writes its sync_outbox entry on the same         │
//! │  SQLite transaction (see `sync::enqueue`).                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MenuRepository`] - Menu items and stock counters
//! - [`LedgerRepository`] - Transactions, settlement, debt, refund
//! - [`HoldRepository`] - Held carts
//! - [`StoreRepository`] - Store caps and profile cache
//! - [`SyncOutboxRepository`] - Sync queue and per-record state

pub mod hold;
pub mod ledger;
pub mod menu;
pub mod store;
pub mod sync;

pub use hold::HoldRepository;
pub use ledger::LedgerRepository;
pub use menu::MenuRepository;
pub use store::{CachedProfile, StoreRepository};
pub use sync::SyncOutboxRepository;
