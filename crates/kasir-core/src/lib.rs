//! # kasir-core: Pure Business Logic for Kasir
//!
//! Everything the till decides, with zero I/O. Storage, sync and the UI
//! live in outer crates and call in here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kasir Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Terminal commands (apps/terminal)            │   │
//! │  │    add_to_cart, hold_cart, checkout_commit, refund, ...         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasir-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌──────────────┐    │   │
//! │  │   │   cart   │ │ settlement │ │   debt   │ │    refund    │    │   │
//! │  │   │   hold   │ │   quota    │ │  report  │ │    access    │    │   │
//! │  │   └──────────┘ └────────────┘ └──────────┘ └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        kasir-db (SQLite)            kasir-sync (backing store)  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (MenuItem, Transaction, HoldOrder, Store)
//! - [`money`] - Integer Rupiah amounts
//! - [`cart`] - The order in progress
//! - [`hold`] - Cart to held tab
//! - [`settlement`] - Payment resolution and settlement plans
//! - [`debt`] - Paying off HUTANG records
//! - [`refund`] - Voiding a sale
//! - [`quota`] - Pre-checkout store gates
//! - [`report`] - Sales summaries and the debt ledger
//! - [`access`] - Roles, features, impersonation, screen navigation
//! - [`clock`] - Store-local calendar helpers
//! - [`validation`] - Input rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kasir_core::cart::CartSession;
//! use kasir_core::money::Money;
//!
//! let mut cart = CartSession::new("kasir");
//! cart.add_manual_line("Mie Goreng", Money::from_minor(12_000), 2).unwrap();
//! assert_eq!(cart.total().to_string(), "Rp 24.000");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod cart;
pub mod clock;
pub mod debt;
pub mod error;
pub mod hold;
pub mod money;
pub mod quota;
pub mod refund;
pub mod report;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::{Feature, ImpersonationToken, Navigator, Principal, Role, Screen, SessionContext};
pub use cart::{CartLine, CartSession, CartTotals, StockAdjustment};
pub use error::{Confirmation, CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use settlement::{CheckoutRequest, Receipt, SettlementPlan, SettlementQuote, StockDelta, Tender};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in one cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on one line. Catches a fat-fingered 1000 for 10.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Id prefix of calculator lines that reference no menu item.
pub const MANUAL_ITEM_PREFIX: &str = "manual-";
