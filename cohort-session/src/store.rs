//! Session store: bootstrap, refresh and logout.

use crate::backend::{IdentityOutcome, SessionBackend};
use crate::credentials::CredentialStore;
use crate::readiness::ReadySignal;
use cohort_core::{Session, SessionError, UserIdentity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Authoritative holder of the current [`Session`].
///
/// Readiness is announced exactly once by [`SessionStore::bootstrap`] and
/// again on every [`SessionStore::logout`]. A successful
/// [`SessionStore::refresh`] replaces the identity without a new
/// announcement.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    credentials: Arc<dyn CredentialStore>,
    signal: ReadySignal,
    bootstrap_started: AtomicBool,
    refresh_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            backend,
            credentials,
            signal: ReadySignal::new(),
            bootstrap_started: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolve the identity once and announce readiness.
    ///
    /// Only the first call talks to the backend. Later or concurrent calls
    /// wait for that first resolution and return its identity. Failures of
    /// any kind settle as logged out.
    pub async fn bootstrap(&self) -> Option<UserIdentity> {
        if self.bootstrap_started.swap(true, Ordering::SeqCst) {
            debug!("session bootstrap already started, waiting for readiness");
            return self.signal.wait().await.into_identity();
        }

        let identity = self.resolve_identity().await;
        self.signal.emit(Session::resolved(identity.clone()));
        identity
    }

    async fn resolve_identity(&self) -> Option<UserIdentity> {
        match self.backend.current_identity().await {
            Ok(IdentityOutcome::Authenticated(identity)) => return Some(identity),
            Ok(IdentityOutcome::Unauthenticated) => {
                info!("no valid credentials, attempting refresh");
            }
            Err(err) => {
                warn!(error = %err, "identity request failed, attempting refresh");
            }
        }

        if let Err(err) = self.backend.refresh_credentials().await {
            info!(error = %err, "credential refresh failed, session is logged out");
            return None;
        }

        match self.backend.current_identity().await {
            Ok(outcome) => {
                let identity = outcome.into_identity();
                if identity.is_none() {
                    info!("identity still unauthenticated after refresh");
                }
                identity
            }
            Err(err) => {
                warn!(error = %err, "identity request after refresh failed");
                None
            }
        }
    }

    /// Refresh credentials and re-read the identity.
    ///
    /// Concurrent calls are serialized. This is not a readiness event, so
    /// waiters already released by bootstrap are not woken again. Rejected
    /// with [`SessionError::NotBootstrapped`] until bootstrap has announced
    /// readiness.
    pub async fn refresh(&self) -> Result<Option<UserIdentity>, SessionError> {
        if !self.signal.is_ready() {
            debug!("refresh requested before bootstrap settled");
            return Err(SessionError::NotBootstrapped);
        }
        let _guard = self.refresh_lock.lock().await;

        self.backend
            .refresh_credentials()
            .await
            .map_err(|err| SessionError::RefreshRejected {
                reason: err.to_string(),
            })?;

        match self.backend.current_identity().await? {
            IdentityOutcome::Authenticated(identity) => {
                debug!(user_id = %identity.id, "session refreshed");
                self.signal.update(Session::resolved(Some(identity.clone())));
                Ok(Some(identity))
            }
            IdentityOutcome::Unauthenticated => Err(SessionError::RefreshRejected {
                reason: "identity unauthenticated after refresh".to_string(),
            }),
        }
    }

    /// Clear credentials, reset to logged out and announce readiness again.
    pub async fn logout(&self) -> Result<(), SessionError> {
        if let Err(err) = self.backend.sign_out().await {
            warn!(error = %err, "backend sign-out failed, clearing local session anyway");
        }
        let cleared = self.credentials.clear();
        if let Err(err) = &cleared {
            warn!(error = %err, "failed to clear stored credentials");
        }
        self.signal.emit(Session::resolved(None));
        info!("session logged out");
        cleared
    }

    pub fn snapshot(&self) -> Session {
        self.signal.current()
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.signal.current().into_identity()
    }

    pub fn is_ready(&self) -> bool {
        self.signal.is_ready()
    }

    /// Suspend until the session has been resolved at least once.
    pub async fn wait_ready(&self) -> Session {
        self.signal.wait().await
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.signal.subscribe()
    }

    pub fn readiness_emissions(&self) -> u64 {
        self.signal.emissions()
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.signal.current())
            .field("bootstrap_started", &self.bootstrap_started.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryCredentialStore, StoredCredentials};
    use async_trait::async_trait;
    use cohort_core::{LoadError, Role};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Scripted {
        identities: StdMutex<VecDeque<Result<IdentityOutcome, LoadError>>>,
        refreshes: StdMutex<VecDeque<Result<(), LoadError>>>,
        identity_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    impl Scripted {
        fn identity(self, outcome: Result<IdentityOutcome, LoadError>) -> Self {
            self.identities.lock().unwrap().push_back(outcome);
            self
        }

        fn refresh(self, outcome: Result<(), LoadError>) -> Self {
            self.refreshes.lock().unwrap().push_back(outcome);
            self
        }
    }

    #[async_trait]
    impl SessionBackend for Scripted {
        async fn current_identity(&self) -> Result<IdentityOutcome, LoadError> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            self.identities
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(IdentityOutcome::Unauthenticated))
        }

        async fn refresh_credentials(&self) -> Result<(), LoadError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LoadError::Unauthenticated))
        }
    }

    fn mentor() -> UserIdentity {
        UserIdentity::new("u-7", Role::Mentor).with_community("C1")
    }

    fn store(backend: Arc<Scripted>) -> SessionStore {
        SessionStore::new(backend, Arc::new(MemoryCredentialStore::new()))
    }

    #[tokio::test]
    async fn test_bootstrap_authenticated_first_try() {
        let backend = Arc::new(Scripted::default().identity(Ok(IdentityOutcome::Authenticated(mentor()))));
        let store = store(backend.clone());

        assert!(!store.is_ready());
        assert_eq!(store.bootstrap().await, Some(mentor()));
        assert!(store.is_ready());
        assert_eq!(store.readiness_emissions(), 1);
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_refreshes_once_then_refetches() {
        let backend = Arc::new(
            Scripted::default()
                .identity(Ok(IdentityOutcome::Unauthenticated))
                .refresh(Ok(()))
                .identity(Ok(IdentityOutcome::Authenticated(mentor()))),
        );
        let store = store(backend.clone());

        assert_eq!(store.bootstrap().await, Some(mentor()));
        assert_eq!(backend.identity_calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.readiness_emissions(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_refresh_rejected_is_logged_out() {
        let backend = Arc::new(
            Scripted::default()
                .identity(Ok(IdentityOutcome::Unauthenticated))
                .refresh(Err(LoadError::Status {
                    status: 401,
                    message: "expired".to_string(),
                })),
        );
        let store = store(backend.clone());

        assert_eq!(store.bootstrap().await, None);
        let session = store.snapshot();
        assert!(session.is_ready());
        assert!(!session.is_authenticated());
        assert_eq!(backend.identity_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_follows_refresh_path() {
        let backend = Arc::new(
            Scripted::default()
                .identity(Err(LoadError::transport("connection refused")))
                .refresh(Err(LoadError::transport("connection refused"))),
        );
        let store = store(backend.clone());

        assert_eq!(store.bootstrap().await, None);
        assert!(store.is_ready());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_bootstrap_does_not_refetch() {
        let backend = Arc::new(Scripted::default().identity(Ok(IdentityOutcome::Authenticated(mentor()))));
        let store = store(backend.clone());

        store.bootstrap().await;
        assert_eq!(store.bootstrap().await, Some(mentor()));
        assert_eq!(backend.identity_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.readiness_emissions(), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_credentials_and_reemits() {
        let backend = Arc::new(Scripted::default().identity(Ok(IdentityOutcome::Authenticated(mentor()))));
        let credentials = Arc::new(MemoryCredentialStore::with_credentials(StoredCredentials::new("tok")));
        let store = SessionStore::new(backend, credentials.clone());

        store.bootstrap().await;
        store.logout().await.unwrap();

        assert_eq!(store.identity(), None);
        assert!(store.is_ready());
        assert_eq!(store.readiness_emissions(), 2);
        assert!(credentials.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_identity_without_emission() {
        let promoted = UserIdentity::new("u-7", Role::Admin);
        let backend = Arc::new(
            Scripted::default()
                .identity(Ok(IdentityOutcome::Authenticated(mentor())))
                .refresh(Ok(()))
                .identity(Ok(IdentityOutcome::Authenticated(promoted.clone()))),
        );
        let store = store(backend);

        store.bootstrap().await;
        assert_eq!(store.refresh().await.unwrap(), Some(promoted.clone()));
        assert_eq!(store.identity(), Some(promoted));
        assert_eq!(store.readiness_emissions(), 1);
    }

    #[tokio::test]
    async fn test_refresh_before_bootstrap_is_rejected() {
        let backend = Arc::new(Scripted::default().refresh(Ok(())));
        let store = store(backend.clone());

        assert_eq!(store.refresh().await, Err(SessionError::NotBootstrapped));
        assert!(!store.is_ready());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_rejected_keeps_identity() {
        let backend = Arc::new(Scripted::default().identity(Ok(IdentityOutcome::Authenticated(mentor()))));
        let store = store(backend);

        store.bootstrap().await;
        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::RefreshRejected { .. }));
        assert_eq!(store.identity(), Some(mentor()));
    }
}
