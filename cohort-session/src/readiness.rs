//! One-shot readiness signal over the shared session cell.

use cohort_core::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Holds the current [`Session`] and announces when it becomes ready.
///
/// Waiters that arrive before the announcement suspend until it happens;
/// waiters that arrive after get the settled value without suspending.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<Session>,
    emissions: AtomicU64,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::pending());
        Self {
            tx,
            emissions: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_ready()
    }

    /// Suspend until the session is ready and return it.
    pub async fn wait(&self) -> Session {
        if let Some(ready) = self.ready_now() {
            return ready;
        }
        let mut rx = self.tx.subscribe();
        let waited = rx.wait_for(Session::is_ready).await.map(|s| s.clone());
        // The sender lives as long as `self`, so the channel cannot close here.
        waited.unwrap_or_else(|_| self.current())
    }

    fn ready_now(&self) -> Option<Session> {
        let session = self.tx.borrow();
        session.is_ready().then(|| session.clone())
    }

    /// Receiver notified on every change, including logout and refresh.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Number of readiness announcements so far.
    pub fn emissions(&self) -> u64 {
        self.emissions.load(Ordering::SeqCst)
    }

    /// Publish a settled session as a readiness event.
    pub(crate) fn emit(&self, session: Session) {
        let authenticated = session.is_authenticated();
        let role = session.role().map(|r| r.as_str());
        self.tx.send_replace(session);
        let count = self.emissions.fetch_add(1, Ordering::SeqCst) + 1;
        info!(authenticated, ?role, emissions = count, "session readiness emitted");
    }

    /// Replace the session without announcing readiness again.
    pub(crate) fn update(&self, session: Session) {
        self.tx.send_replace(session);
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
