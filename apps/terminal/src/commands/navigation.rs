//! # Navigation Commands
//!
//! Screen changes and super-admin impersonation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lobby ──navigate(Report)──► Report       (feature right checked)      │
//! │    ▲                                                                    │
//! │    └──── impersonate / end_impersonation: back to Lobby, cart emptied  │
//! │                                                                         │
//! │  super-admin ── impersonate("owner-9") ──► acts as owner-9 until TTL   │
//! │                                            profile cache untouched     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use kasir_core::{Feature, Role, Screen};

use super::load_store;
use crate::error::{ApiError, ApiResult};
use crate::state::{CartState, ConfigState, DbState, SessionState};

/// Who is signed in and what they can reach.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub principal_id: String,
    pub email: String,
    pub role: Role,
    /// `None` for a super-admin who is not impersonating.
    pub store_id: Option<String>,
    pub impersonating: bool,
    pub impersonation_expires_at: Option<DateTime<Utc>>,
    pub screen: Screen,
    pub features: Vec<Feature>,
}

pub fn session_info(session: &SessionState) -> SessionView {
    let now = Utc::now();
    session.with_session(|ctx, nav| {
        let impersonating = ctx.is_impersonating(now);
        SessionView {
            principal_id: ctx.principal.id.clone(),
            email: ctx.principal.email.clone(),
            role: ctx.principal.role,
            store_id: ctx.effective_store_id(now).ok(),
            impersonating,
            impersonation_expires_at: ctx
                .impersonation
                .as_ref()
                .filter(|_| impersonating)
                .map(|token| token.expires_at),
            screen: nav.current(),
            features: Feature::ALL
                .into_iter()
                .filter(|f| ctx.can_access(*f, now))
                .collect(),
        }
    })
}

/// Moves to `screen` if the principal holds its right.
pub fn navigate(session: &SessionState, screen: Screen) -> ApiResult<Screen> {
    debug!(?screen, "navigate command");

    let now = Utc::now();
    Ok(session.with_session_mut(|ctx, nav| nav.navigate(ctx, screen, now))?)
}

pub fn current_screen(session: &SessionState) -> Screen {
    session.with_session(|_, nav| nav.current())
}

/// Starts acting as `store_id`. Super-admins only.
pub fn impersonate(
    session: &SessionState,
    cart: &CartState,
    config: &ConfigState,
    store_id: &str,
) -> ApiResult<SessionView> {
    debug!(store_id = %store_id, "impersonate command");

    let now = Utc::now();
    session.with_session_mut(|ctx, nav| {
        ctx.impersonate(store_id, config.impersonation_ttl(), now)?;
        nav.home();
        Ok::<_, ApiError>(())
    })?;
    cart.with_cart_mut(|c| c.reset());

    info!(store_id = %store_id, "Impersonation started");
    Ok(session_info(session))
}

pub fn end_impersonation(session: &SessionState, cart: &CartState) -> SessionView {
    debug!("end_impersonation command");

    let was_impersonating = session.with_session_mut(|ctx, nav| {
        let active = ctx.impersonation.is_some();
        ctx.end_impersonation();
        nav.home();
        active
    });
    if was_impersonating {
        cart.with_cart_mut(|c| c.reset());
        info!("Impersonation ended");
    }

    session_info(session)
}

/// Writes the signed-in principal and its store to the offline profile
/// cache. Returns false when nothing was written.
pub async fn refresh_profile(db: &DbState, session: &SessionState, config: &ConfigState) -> ApiResult<bool> {
    debug!("refresh_profile command");

    let ctx = session.context();
    if !ctx.should_cache_profile() {
        warn!(principal_id = %ctx.principal.id, "Impersonating, profile not cached");
        return Ok(false);
    }

    let store_id = ctx.effective_store_id(Utc::now())?;
    let store = load_store(db, config, &store_id).await?;
    Ok(db.inner().stores().cache_profile(&ctx, &store).await?)
}

// =============================================================================
// Unit Tests
// =============================================================================
