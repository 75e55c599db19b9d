//! # Domain Types
//!
//! Core domain types used throughout Kasir.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    MenuItem     │   │   Transaction   │   │    HoldOrder    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, store_id   │   │  id, invoice_no │   │  id, label      │       │
//! │  │  price          │   │  lines (snap)   │   │  lines (snap)   │       │
//! │  │  stock: Option  │   │  method, status │   │  total          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PaymentMethod   │   │TransactionStatus│   │ SyncRecordState │       │
//! │  │  TUNAI          │   │  SUCCESS        │   │  LocalOnly      │       │
//! │  │  QRIS           │   │  REFUNDED       │   │  Confirmed      │       │
//! │  │  HUTANG         │   └─────────────────┘   │  Failed         │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are explicit structs with required and optional fields; the
//! storage layer validates them at the boundary instead of trusting a
//! free-form document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::cart::CartLine;
use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Stock
// =============================================================================

/// Stock state of a menu item as seen by the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    /// The store does not count this item.
    Untracked,
    /// Units currently on hand.
    Tracked(i64),
}

impl StockLevel {
    pub fn from_option(stock: Option<i64>) -> Self {
        match stock {
            Some(n) => StockLevel::Tracked(n),
            None => StockLevel::Untracked,
        }
    }

    /// Returns true if `quantity` units can sit in a cart.
    pub fn allows(&self, quantity: i64) -> bool {
        match self {
            StockLevel::Untracked => true,
            StockLevel::Tracked(available) => quantity <= *available,
        }
    }
}

// =============================================================================
// Menu Item
// =============================================================================

/// A sellable item owned by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuItem {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub price: Money,
    pub category: String,
    /// `None` means the store does not track stock for this item.
    pub stock: Option<i64>,
    pub favorite: bool,
    /// Monotonic per-record version for last-write-wins replication.
    pub sync_version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    #[inline]
    pub fn stock_level(&self) -> StockLevel {
        StockLevel::from_option(self.stock)
    }

    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.stock.is_some()
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a transaction was (or is being) paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum PaymentMethod {
    /// Cash.
    Tunai,
    /// QR-code digital payment, paid in full on confirmation.
    Qris,
    /// Store credit; the buyer owes the remaining balance.
    Hutang,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Tunai => "TUNAI",
            PaymentMethod::Qris => "QRIS",
            PaymentMethod::Hutang => "HUTANG",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TUNAI" | "CASH" => Ok(PaymentMethod::Tunai),
            "QRIS" => Ok(PaymentMethod::Qris),
            "HUTANG" | "DEBT" => Ok(PaymentMethod::Hutang),
            other => Err(CoreError::invalid(format!(
                "Unknown payment method '{}'. Valid options: TUNAI, QRIS, HUTANG",
                other
            ))),
        }
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum TransactionStatus {
    /// Finalized sale; counts toward every aggregate.
    #[default]
    Success,
    /// Voided sale; listed but excluded from totals.
    Refunded,
}

// =============================================================================
// Transaction (ledger record)
// =============================================================================

/// Line snapshot stored on a ledger record. Same shape as a cart line, so a
/// settled cart carries its lines over unchanged.
pub type TransactionLine = CartLine;

/// Record of a debt paid off after the sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DebtSettlementRecord {
    pub method: PaymentMethod,
    pub amount: Money,
    #[ts(as = "String")]
    pub settled_at: DateTime<Utc>,
}

/// Money actually taken in, split by channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collected {
    pub cash: Money,
    pub qris: Money,
}

/// A finalized ledger record.
///
/// Append-only except for debt settlement and refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub store_id: String,
    /// Human-facing number printed on the receipt (`INV-DDMMYYHHMM`).
    pub invoice_no: String,
    pub lines: Vec<TransactionLine>,
    pub total: Money,
    pub method: PaymentMethod,
    pub paid_amount: Money,
    pub change_amount: Money,
    pub remaining_debt: Money,
    pub buyer: String,
    pub operator: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub refund_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub refund_at: Option<DateTime<Utc>>,
    pub debt_settlement: Option<DebtSettlementRecord>,
}

impl Transaction {
    #[inline]
    pub fn is_refunded(&self) -> bool {
        self.status == TransactionStatus::Refunded
    }

    /// SUCCESS with a balance still owed.
    #[inline]
    pub fn is_open_debt(&self) -> bool {
        self.status == TransactionStatus::Success && self.remaining_debt.is_positive()
    }

    /// The method as shown on lists and receipts.
    ///
    /// A debt that had a partial payment before being settled renders as a
    /// composite, e.g. `HUTANG+QRIS`.
    pub fn method_label(&self) -> String {
        match &self.debt_settlement {
            Some(settlement) if self.method == PaymentMethod::Hutang => {
                format!("{}+{}", self.method, settlement.method)
            }
            _ => self.method.to_string(),
        }
    }

    /// Payment status badge: `HUTANG`, `LUNAS (QRIS)`, `LUNAS (TUNAI)` or
    /// `REFUNDED`.
    pub fn status_label(&self) -> &'static str {
        if self.is_refunded() {
            return "REFUNDED";
        }
        if self.remaining_debt.is_positive() {
            return "HUTANG";
        }
        let paid_via = match &self.debt_settlement {
            Some(settlement) => settlement.method,
            None => self.method,
        };
        match paid_via {
            PaymentMethod::Qris => "LUNAS (QRIS)",
            _ => "LUNAS (TUNAI)",
        }
    }

    /// Money received for this record, split by channel.
    ///
    /// The sale part (`paid − change − settled`) arrived through the sale's
    /// own channel; a later debt settlement arrived through its method.
    pub fn collected(&self) -> Collected {
        let settled = self
            .debt_settlement
            .as_ref()
            .map(|s| s.amount)
            .unwrap_or_default();
        let sale_part = (self.paid_amount - self.change_amount - settled).clamp_non_negative();

        let mut collected = Collected::default();
        match self.method {
            PaymentMethod::Qris => collected.qris += sale_part,
            _ => collected.cash += sale_part,
        }
        if let Some(settlement) = &self.debt_settlement {
            match settlement.method {
                PaymentMethod::Qris => collected.qris += settlement.amount,
                _ => collected.cash += settlement.amount,
            }
        }
        collected
    }
}

// =============================================================================
// Hold Order
// =============================================================================

/// A suspended cart (a "tab") persisted for later resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HoldOrder {
    pub id: String,
    pub store_id: String,
    pub label: String,
    pub buyer: String,
    pub operator: String,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub sync_version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Store (tenant)
// =============================================================================

/// A tenant. Its id is the owner's principal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Store {
    pub id: String,
    pub name: String,
    /// Monthly transaction cap; 0 means unlimited.
    pub max_transactions: i64,
    /// Menu item cap; 0 means unlimited.
    pub max_menus: i64,
    pub suspended: bool,
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Store {
    /// A store can trade while it is not suspended and not past expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.suspended && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// One queued write waiting for the backing store to acknowledge it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncOutboxEntry {
    pub id: String,
    pub store_id: String,
    /// `transaction`, `inventory_delta`, `hold_order`, `menu_item`.
    pub entity_type: String,
    pub entity_id: String,
    /// The ledger record (or entity) whose sync state this write belongs to.
    pub record_id: String,
    /// `create`, `update`, `delete`, `refund`, `settle_debt`, `delta`.
    pub operation: String,
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub synced_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Whether a record has actually left the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SyncRecordState {
    /// Queued locally, not yet acknowledged.
    LocalOnly,
    /// Every write for the record was acknowledged.
    Confirmed,
    /// The backing store permanently rejected a write for the record.
    Failed,
}

impl SyncRecordState {
    /// Derives the state from outbox counts for one record.
    pub fn from_counts(unsynced: i64, rejected: i64) -> Self {
        if rejected > 0 {
            SyncRecordState::Failed
        } else if unsynced > 0 {
            SyncRecordState::LocalOnly
        } else {
            SyncRecordState::Confirmed
        }
    }

    /// The derived "not yet safe off-device" flag shown on the indicator.
    #[inline]
    pub fn is_unconfirmed(&self) -> bool {
        !matches!(self, SyncRecordState::Confirmed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
