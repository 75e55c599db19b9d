//! # Kasir Terminal Library
//!
//! The till process: state, commands and the startup sequence. A UI shell
//! links this crate and calls `commands::*` with the state it holds.
//!
//! ## Module Organization
//! ```text
//! kasir_terminal/
//! ├── lib.rs          ◄─── You are here (startup & run)
//! ├── state/
//! │   ├── mod.rs      ◄─── State type exports
//! │   ├── db.rs       ◄─── Database state wrapper
//! │   ├── cart.rs     ◄─── Cart session + quoted checkout
//! │   ├── session.rs  ◄─── Principal, impersonation, screen
//! │   ├── config.rs   ◄─── Environment configuration
//! │   └── sync.rs     ◄─── Sync agent handle and indicator
//! ├── commands/       ◄─── cart, hold, checkout, ledger, menu, navigation, sync
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## State Management (Multiple State Types)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌──────────┐ ┌───────────┐ ┌──────────────┐ ┌─────────────┐ ┌──────┐  │
//! │  │ DbState  │ │ CartState │ │ SessionState │ │ ConfigState │ │ Sync │  │
//! │  └──────────┘ └───────────┘ └──────────────┘ └─────────────┘ └──────┘  │
//! │                                                                         │
//! │  Each command only takes the state it needs.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod state;

use std::error::Error;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kasir_db::{Database, DbConfig};
use kasir_sync::{SyncAgent, SyncConfig};

use state::{CartState, ConfigState, DbState, SessionState, SyncState, TracingEmitter};

/// Runs the till until Ctrl-C.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Load configuration ──── KASIR_* environment variables               │
/// │  2. Open database ───────── SQLite, WAL, migrations                     │
/// │  3. Build state ─────────── DbState, SessionState, CartState            │
/// │  4. Cache profile ───────── for offline start (skipped when impersonating)
/// │  5. Start sync agent ────── offline mode just reports the outbox count  │
/// │  6. Wait for Ctrl-C                                                     │
/// │  7. Stop agent, close database                                          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run() -> Result<(), Box<dyn Error>> {
    info!("Starting Kasir terminal");

    let config = ConfigState::from_env()?;
    let db_path = config.database_path()?;
    info!(?db_path, "Database path determined");

    let db = DbState::new(Database::new(DbConfig::new(db_path)).await?);
    info!("Database connected and migrations applied");

    let principal = config.principal.clone();
    let cart = CartState::new(principal.email.clone());
    let session = SessionState::new(principal);

    if let Err(e) = commands::navigation::refresh_profile(&db, &session, &config).await {
        warn!(code = ?e.code, "Profile not cached: {}", e.message);
    }

    let mut sync_config = SyncConfig::load_or_default(None);
    if let Ok(store_id) = session.store_id(Utc::now()) {
        sync_config.store.id = store_id;
    }

    let mut agent = SyncAgent::with_emitter(sync_config, db.shared(), Arc::new(TracingEmitter));
    if let Err(e) = agent.start().await {
        error!(%e, "Sync agent failed to start, continuing offline");
    }
    let sync = SyncState::new(agent.handle());

    let status = commands::sync::get_sync_status(&sync).await;
    info!(
        store = ?commands::navigation::session_info(&session).store_id,
        sync_mode = %status.sync_mode,
        pending = status.pending_outbox_count,
        cart_lines = commands::cart::get_cart(&cart).lines.len(),
        "Till ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Err(e) = agent.shutdown().await {
        warn!(%e, "Sync agent did not stop cleanly");
    }
    db.inner().close().await;

    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kasir=trace` - Show trace for kasir crates only
/// - Default: INFO, debug for kasir crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kasir=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
