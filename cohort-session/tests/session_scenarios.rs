//! End-to-end session scenarios against the scripted backend.

use cohort_core::{LoadError, Role, SessionError, UserId, UserIdentity};
use cohort_session::{
    CredentialStore, FileCredentialStore, IdentityOutcome, MemoryCredentialStore, SessionStore,
    StoredCredentials,
};
use cohort_test_utils::ScriptedBackend;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn student() -> UserIdentity {
    UserIdentity::new(UserId::new("s-1"), Role::Student).with_community("C1")
}

fn store(backend: Arc<ScriptedBackend>) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        backend,
        Arc::new(MemoryCredentialStore::with_credentials(StoredCredentials::new("tok"))),
    ))
}

#[tokio::test]
async fn test_expired_token_recovers_through_one_refresh() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push_identity(Ok(IdentityOutcome::Unauthenticated))
        .push_identity(Ok(IdentityOutcome::Authenticated(student())));
    backend.push_refresh(Ok(()));
    let session = store(backend.clone());

    assert_eq!(session.bootstrap().await, Some(student()));
    assert_eq!(backend.identity_calls(), 2);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(session.readiness_emissions(), 1);
    assert_eq!(session.snapshot().role(), Some(Role::Student));
}

#[tokio::test]
async fn test_unauthenticated_after_refresh_does_not_loop() {
    let backend = Arc::new(ScriptedBackend::anonymous());
    backend.push_refresh(Ok(()));
    let session = store(backend.clone());

    assert_eq!(session.bootstrap().await, None);
    assert_eq!(backend.identity_calls(), 2);
    assert_eq!(backend.refresh_calls(), 1);
    assert!(session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_waiters_released_together_by_single_emission() {
    let backend = Arc::new(ScriptedBackend::authenticated(student()).with_latency(Duration::from_millis(200)));
    let session = store(backend.clone());

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.wait_ready().await })
        })
        .collect();
    tokio::task::yield_now().await;
    assert!(!session.is_ready());

    let (first, second) = tokio::join!(session.bootstrap(), session.bootstrap());
    assert_eq!(first, Some(student()));
    assert_eq!(second, Some(student()));

    for waiter in waiters {
        let resolved = waiter.await.unwrap();
        assert!(resolved.is_ready());
        assert_eq!(resolved.identity(), Some(&student()));
    }
    assert_eq!(backend.identity_calls(), 1);
    assert_eq!(session.readiness_emissions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_cannot_settle_session_ahead_of_bootstrap() {
    let backend = Arc::new(ScriptedBackend::new().with_latency(Duration::from_millis(200)));
    backend.push_refresh(Ok(()));
    backend.push_identity(Ok(IdentityOutcome::Authenticated(student())));
    let session = store(backend.clone());

    assert_eq!(session.refresh().await, Err(SessionError::NotBootstrapped));
    assert!(!session.is_ready());
    assert_eq!(session.readiness_emissions(), 0);
    assert_eq!(backend.refresh_calls(), 0);

    let bootstrap = {
        let session = session.clone();
        tokio::spawn(async move { session.bootstrap().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(session.refresh().await, Err(SessionError::NotBootstrapped));

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.wait_ready().await })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    assert_eq!(bootstrap.await.unwrap(), Some(student()));
    let settled = waiter.await.unwrap();
    assert_eq!(settled.identity(), Some(&student()));
    assert_eq!(session.readiness_emissions(), 1);
    assert_eq!(backend.identity_calls(), 1);
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_refresh_failure_keeps_identity() {
    let backend = Arc::new(ScriptedBackend::authenticated(student()));
    let session = store(backend.clone());
    session.bootstrap().await;

    backend.push_refresh(Err(LoadError::transport("connection reset")));
    assert!(session.refresh().await.is_err());
    assert_eq!(session.identity(), Some(student()));
    assert_eq!(session.readiness_emissions(), 1);
}

#[tokio::test]
async fn test_file_credentials_survive_restart_and_logout_clears_them() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session").join("credentials.json");

    let first = FileCredentialStore::new(&path);
    first
        .save(&StoredCredentials::new("access").with_refresh_token("refresh"))
        .unwrap();

    let reopened = Arc::new(FileCredentialStore::new(&path));
    let loaded = reopened.load().unwrap().unwrap();
    assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));

    let backend = Arc::new(ScriptedBackend::authenticated(student()));
    let session = SessionStore::new(backend.clone(), reopened.clone());
    session.bootstrap().await;
    session.logout().await.unwrap();

    assert!(!path.exists());
    assert_eq!(reopened.load().unwrap(), None);
    assert_eq!(session.identity(), None);
    assert_eq!(session.readiness_emissions(), 2);
    assert_eq!(backend.sign_out_calls(), 1);
}

proptest! {
    /// Once ready, no sequence of refreshes or logouts un-readies the session.
    #[test]
    fn readiness_is_monotonic(ops in proptest::collection::vec(0u8..3, 0..12)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let backend = Arc::new(ScriptedBackend::authenticated(student()));
            let session = store(backend.clone());
            session.bootstrap().await;
            prop_assert!(session.is_ready());

            for op in ops {
                match op {
                    0 => {
                        backend.push_refresh(Ok(()));
                        let _ = session.refresh().await;
                    }
                    1 => {
                        let _ = session.refresh().await;
                    }
                    _ => {
                        let _ = session.logout().await;
                    }
                }
                prop_assert!(session.is_ready());
                prop_assert!(session.snapshot().is_ready());
            }
            Ok(())
        })?;
    }
}
