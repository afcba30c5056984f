//! Route guard: enforce a page's [`RouteRequirement`] before page logic runs.

use cohort_core::{Role, RouteRequirement, Session, UserIdentity};
use cohort_session::SessionStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where the viewer is and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, target: &str);
}

/// Single "last redirect target" kept for loop prevention.
///
/// Lives for the browsing session; one marker is shared by every guard.
#[derive(Debug, Default)]
pub struct RedirectMarker {
    last: Mutex<Option<String>>,
}

impl RedirectMarker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<String> {
        self.slot().clone()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.slot().as_deref() == Some(path)
    }

    pub fn record(&self, target: &str) {
        *self.slot() = Some(target.to_string());
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    /// No identity on an authenticated route. `redirected` is false when the
    /// loop marker suppressed the redirect.
    LoginRequired { redirected: bool },
    Unauthorized { role: Option<Role> },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct RouteGuard {
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    marker: Arc<RedirectMarker>,
    login_path: String,
    unauthorized_path: String,
}

impl RouteGuard {
    pub fn new(
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        marker: Arc<RedirectMarker>,
        login_path: impl Into<String>,
        unauthorized_path: impl Into<String>,
    ) -> Self {
        Self {
            session,
            navigator,
            marker,
            login_path: login_path.into(),
            unauthorized_path: unauthorized_path.into(),
        }
    }

    /// Suspend until the session is ready, then decide.
    pub async fn check(&self, requirement: &RouteRequirement) -> GuardDecision {
        let session = self.session.wait_ready().await;
        self.decide(requirement, session.identity())
    }

    /// Decision against an already-ready identity. Redirects as a side effect.
    pub fn decide(
        &self,
        requirement: &RouteRequirement,
        identity: Option<&UserIdentity>,
    ) -> GuardDecision {
        if requirement.requires_auth && identity.is_none() {
            let current = self.navigator.current_path();
            if self.marker.matches(&current) {
                warn!(path = %current, "redirect loop detected, not redirecting to login again");
                return GuardDecision::LoginRequired { redirected: false };
            }
            self.marker.record(&self.login_path);
            info!(from = %current, to = %self.login_path, "redirecting to login");
            self.navigator.redirect(&self.login_path);
            return GuardDecision::LoginRequired { redirected: true };
        }

        if !requirement.admits_role(identity) {
            let role = identity.map(|identity| identity.role);
            info!(?role, to = %self.unauthorized_path, "role not permitted, redirecting");
            self.navigator.redirect(&self.unauthorized_path);
            return GuardDecision::Unauthorized { role };
        }

        debug!("route allowed");
        self.marker.clear();
        GuardDecision::Allowed
    }

    pub fn marker(&self) -> &Arc<RedirectMarker> {
        &self.marker
    }

    /// Re-decide `requirement` on every later session change (logout,
    /// refresh). Changes before this call are not replayed.
    pub fn watch(&self, requirement: RouteRequirement) -> GuardWatch<'_> {
        GuardWatch {
            guard: self,
            requirement,
            changes: self.session.subscribe(),
        }
    }
}

/// Session-change feed bound to one requirement. See [`RouteGuard::watch`].
pub struct GuardWatch<'a> {
    guard: &'a RouteGuard,
    requirement: RouteRequirement,
    changes: watch::Receiver<Session>,
}

impl GuardWatch<'_> {
    /// Wait for the next settled session change and decide again.
    ///
    /// Returns `None` once the session store has gone away.
    pub async fn next(&mut self) -> Option<GuardDecision> {
        let session = loop {
            self.changes.changed().await.ok()?;
            let session = self.changes.borrow_and_update().clone();
            if session.is_ready() {
                break session;
            }
        };
        debug!(authenticated = session.is_authenticated(), "session changed, re-checking route");
        Some(self.guard.decide(&self.requirement, session.identity()))
    }

    pub fn requirement(&self) -> &RouteRequirement {
        &self.requirement
    }
}
