//! # Session State
//!
//! Who is signed in, which store they act for, and which screen is open.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SessionState                                                           │
//! │                                                                         │
//! │  SessionContext ── principal (from the auth provider)                  │
//! │                 └─ impersonation token (super-admin only)              │
//! │                                                                         │
//! │  Navigator ─────── current Screen, guarded by Feature access           │
//! │                                                                         │
//! │  store_id(now) ──► the tenant every menu/ledger/hold call is scoped to │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use kasir_core::{CoreResult, Feature, Navigator, Principal, SessionContext};

struct Session {
    ctx: SessionContext,
    navigator: Navigator,
}

#[derive(Clone)]
pub struct SessionState {
    inner: Arc<Mutex<Session>>,
}

impl SessionState {
    pub fn new(principal: Principal) -> Self {
        SessionState {
            inner: Arc::new(Mutex::new(Session {
                ctx: SessionContext::new(principal),
                navigator: Navigator::new(),
            })),
        }
    }

    /// A snapshot of the current context.
    pub fn context(&self) -> SessionContext {
        self.lock().ctx.clone()
    }

    /// Resolves the effective store, failing with `Forbidden` when the
    /// principal has none.
    pub fn store_id(&self, now: DateTime<Utc>) -> CoreResult<String> {
        self.lock().ctx.effective_store_id(now)
    }

    /// Resolves the store after checking a feature right.
    pub fn scoped(&self, feature: Feature, now: DateTime<Utc>) -> CoreResult<String> {
        let session = self.lock();
        session.ctx.require(feature, now)?;
        session.ctx.effective_store_id(now)
    }

    /// Like [`scoped`](Self::scoped), passing on any one of `features`.
    pub fn scoped_any(&self, features: &[Feature], now: DateTime<Utc>) -> CoreResult<String> {
        let session = self.lock();
        if let Some(denied) = features
            .iter()
            .map(|f| session.ctx.require(*f, now))
            .reduce(|acc, next| acc.or(next))
        {
            denied?;
        }
        session.ctx.effective_store_id(now)
    }

    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionContext, &Navigator) -> R,
    {
        let session = self.lock();
        f(&session.ctx, &session.navigator)
    }

    pub fn with_session_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionContext, &mut Navigator) -> R,
    {
        let mut session = self.lock();
        let Session { ctx, navigator } = &mut *session;
        f(ctx, navigator)
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
