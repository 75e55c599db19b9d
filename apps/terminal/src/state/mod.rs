//! # State Module
//!
//! One state type per concern; each command takes only what it needs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────┐ ┌───────────┐ ┌──────────────┐ ┌─────────────┐ ┌──────┐  │
//! │  │ DbState  │ │ CartState │ │ SessionState │ │ ConfigState │ │ Sync │  │
//! │  │          │ │           │ │              │ │             │ │State │  │
//! │  │ Database │ │ Arc<Mutex │ │ context +    │ │ principal,  │ │agent │  │
//! │  │ (Arc)    │ │ <Cart>>   │ │ navigator    │ │ clock, path │ │handle│  │
//! │  └──────────┘ └───────────┘ └──────────────┘ └─────────────┘ └──────┘  │
//! │                                                                         │
//! │  add_to_cart(db, session, cart, ..)                                     │
//! │  commit_checkout(db, session, cart, config, sync, ..)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cart;
mod config;
mod db;
mod session;
mod sync;

pub use cart::CartState;
pub use config::{ConfigError, ConfigState};
pub use db::DbState;
pub use session::SessionState;
pub use sync::{SyncState, SyncStatusDto, TracingEmitter};
