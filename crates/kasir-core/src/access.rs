//! # Access Control & Tenancy
//!
//! Resolves which store an operation belongs to and whether the principal
//! may perform it.
//!
//! ## Effective Store Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SessionContext { principal, impersonation }                            │
//! │       │                                                                 │
//! │       ├── valid ImpersonationToken? ──────────► token.store_id          │
//! │       │   (SuperAdmin-issued, not expired)                              │
//! │       │                                                                 │
//! │       ├── Owner ──────────────────────────────► principal.id            │
//! │       │                                                                 │
//! │       ├── Employee with owner_id ─────────────► owner_id                │
//! │       │                                                                 │
//! │       └── otherwise ──────────────────────────► FORBIDDEN               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Screens
//! ```text
//!                 ┌──────────┐
//!      ┌─────────►│  Lobby   │◄─────────┐        always allowed
//!      │          └────┬─────┘          │
//!      │     ┌─────────┼─────────┐      │
//!      ▼     ▼         ▼         ▼      ▼
//!   Cashier Stock   Report    Table  Calculator  MenuAdmin  Settings
//!      each guarded by can_access(feature); denial keeps the current screen
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Roles & Features
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Owner,
    /// A cashier account created by an owner ("kasir").
    #[serde(alias = "kasir")]
    Employee,
    SuperAdmin,
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "employee" | "kasir" => Ok(Role::Employee),
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            other => Err(CoreError::invalid(format!("Unknown role '{}'", other))),
        }
    }
}

/// A screen-level right an owner can grant to an employee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Feature {
    Cashier,
    Stock,
    Report,
    Table,
    Calculator,
    MenuAdmin,
    Settings,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Cashier,
        Feature::Stock,
        Feature::Report,
        Feature::Table,
        Feature::Calculator,
        Feature::MenuAdmin,
        Feature::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Cashier => "cashier",
            Feature::Stock => "stock",
            Feature::Report => "report",
            Feature::Table => "table",
            Feature::Calculator => "calculator",
            Feature::MenuAdmin => "menu_admin",
            Feature::Settings => "settings",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted || (wanted == "admin" && *f == Feature::MenuAdmin))
            .ok_or_else(|| CoreError::invalid(format!("Unknown feature '{}'", s.trim())))
    }
}

// =============================================================================
// Principal
// =============================================================================

/// The authenticated identity supplied by the external auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    /// The owning store, for employees.
    pub owner_id: Option<String>,
    #[serde(default)]
    pub access: BTreeMap<Feature, bool>,
}

impl Principal {
    /// Feature check without impersonation.
    pub fn can_access(&self, feature: Feature) -> bool {
        match self.role {
            Role::Owner => true,
            Role::Employee => self.access.get(&feature).copied().unwrap_or(false),
            Role::SuperAdmin => false,
        }
    }
}

// =============================================================================
// Impersonation
// =============================================================================

/// A short-lived delegation letting a super-admin act as a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImpersonationToken {
    pub acting_principal_id: String,
    pub store_id: String,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl ImpersonationToken {
    pub fn issue(
        actor: &Principal,
        store_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if actor.role != Role::SuperAdmin {
            return Err(CoreError::forbidden("Only a super-admin can impersonate a store"));
        }
        let store_id = store_id.trim();
        if store_id.is_empty() {
            return Err(CoreError::invalid("Store id is required"));
        }
        Ok(ImpersonationToken {
            acting_principal_id: actor.id.clone(),
            store_id: store_id.to_string(),
            issued_at: now,
            expires_at: now + ttl,
        })
    }

    #[inline]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// Session Context
// =============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionContext {
    pub principal: Principal,
    pub impersonation: Option<ImpersonationToken>,
}

impl SessionContext {
    pub fn new(principal: Principal) -> Self {
        SessionContext {
            principal,
            impersonation: None,
        }
    }

    fn active_token(&self, now: DateTime<Utc>) -> Option<&ImpersonationToken> {
        self.impersonation.as_ref().filter(|token| {
            self.principal.role == Role::SuperAdmin
                && token.acting_principal_id == self.principal.id
                && token.is_valid(now)
        })
    }

    pub fn is_impersonating(&self, now: DateTime<Utc>) -> bool {
        self.active_token(now).is_some()
    }

    /// The store every inventory, ledger and hold operation is scoped to.
    pub fn effective_store_id(&self, now: DateTime<Utc>) -> CoreResult<String> {
        if let Some(token) = self.active_token(now) {
            return Ok(token.store_id.clone());
        }
        match self.principal.role {
            Role::Owner => Ok(self.principal.id.clone()),
            Role::Employee => self
                .principal
                .owner_id
                .clone()
                .filter(|owner| !owner.trim().is_empty())
                .ok_or_else(|| CoreError::forbidden("Employee is not attached to a store")),
            Role::SuperAdmin => Err(CoreError::forbidden(
                "Super-admin must impersonate a store first",
            )),
        }
    }

    pub fn can_access(&self, feature: Feature, now: DateTime<Utc>) -> bool {
        self.is_impersonating(now) || self.principal.can_access(feature)
    }

    /// Deleting a ledger record is reserved for the store owner.
    pub fn can_delete_transactions(&self, now: DateTime<Utc>) -> bool {
        self.principal.role == Role::Owner || self.is_impersonating(now)
    }

    /// The local profile cache must never hold an impersonated store.
    pub fn should_cache_profile(&self) -> bool {
        self.impersonation.is_none()
    }

    pub fn impersonate(&mut self, store_id: &str, ttl: Duration, now: DateTime<Utc>) -> CoreResult<()> {
        self.impersonation = Some(ImpersonationToken::issue(&self.principal, store_id, ttl, now)?);
        Ok(())
    }

    pub fn end_impersonation(&mut self) {
        self.impersonation = None;
    }

    pub fn require(&self, feature: Feature, now: DateTime<Utc>) -> CoreResult<()> {
        if self.can_access(feature, now) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!("No access to {}", feature)))
        }
    }
}

// =============================================================================
// Screen State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Screen {
    #[default]
    Lobby,
    Cashier,
    Stock,
    Report,
    Table,
    Calculator,
    MenuAdmin,
    Settings,
}

impl Screen {
    pub fn required_feature(&self) -> Option<Feature> {
        match self {
            Screen::Lobby => None,
            Screen::Cashier => Some(Feature::Cashier),
            Screen::Stock => Some(Feature::Stock),
            Screen::Report => Some(Feature::Report),
            Screen::Table => Some(Feature::Table),
            Screen::Calculator => Some(Feature::Calculator),
            Screen::MenuAdmin => Some(Feature::MenuAdmin),
            Screen::Settings => Some(Feature::Settings),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    current: Screen,
}

impl Navigator {
    pub fn new() -> Self {
        Navigator::default()
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    /// Moves to `screen`, or returns `Forbidden` and stays put.
    pub fn navigate(
        &mut self,
        ctx: &SessionContext,
        screen: Screen,
        now: DateTime<Utc>,
    ) -> CoreResult<Screen> {
        if let Some(feature) = screen.required_feature() {
            ctx.require(feature, now)?;
        }
        self.current = screen;
        Ok(screen)
    }

    /// Returns to the lobby. Used when the session changes underneath.
    pub fn home(&mut self) -> Screen {
        self.current = Screen::Lobby;
        self.current
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
