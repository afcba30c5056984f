//! Cancellation handles for long-lived listeners.

use tokio::task::JoinHandle;
use tracing::debug;

/// One live listener. Dropping the handle cancels it.
#[derive(Debug)]
pub struct Subscription {
    name: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(name: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(subscription = %self.name, "subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Every subscription a page registered. Released together on teardown.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn active(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    /// Cancel and forget every subscription. Returns how many were held.
    pub fn release_all(&mut self) -> usize {
        let released = self.subscriptions.len();
        self.subscriptions.clear();
        released
    }
}
