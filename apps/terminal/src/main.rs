//! # Kasir Terminal Entry Point
//!
//! Startup lives in `lib.rs` so it can be exercised from tests.

use tracing::error;

#[tokio::main]
async fn main() {
    kasir_terminal::init_tracing();

    if let Err(e) = kasir_terminal::run().await {
        error!("Kasir terminal stopped: {}", e);
        std::process::exit(1);
    }
}
