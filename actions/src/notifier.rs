//! Post-commit callbacks.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// A callback run once after its transaction commits.
///
/// Subscribers are identified by their `Arc`: unsubscribing needs a clone of
/// the handle that was subscribed.
pub type OnCommit = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierState {
    Pending,
    Fired,
}

/// Ordered subscriber list that is broadcast at most once.
///
/// A subscriber that panics unwinds out of [`CommitNotifier::fire`] and the
/// subscribers after it are not run.
pub struct CommitNotifier {
    subscribers: RefCell<Vec<OnCommit>>,
    state: Cell<NotifierState>,
}

impl CommitNotifier {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            state: Cell::new(NotifierState::Pending),
        }
    }

    pub fn state(&self) -> NotifierState {
        self.state.get()
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Append a subscriber. The same handle may be registered more than once
    /// and then runs once per registration.
    pub fn subscribe(&self, on_commit: OnCommit) {
        self.subscribers.borrow_mut().push(on_commit);
    }

    /// Remove the earliest registration of `on_commit`. Returns `false` if it
    /// was not registered.
    pub fn unsubscribe(&self, on_commit: &OnCommit) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        match subscribers
            .iter()
            .position(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(on_commit)))
        {
            Some(position) => {
                subscribers.remove(position);
                true
            }
            None => false,
        }
    }

    /// Run every subscriber in registration order. Only the first call does
    /// anything; it returns how many subscribers ran.
    pub fn fire(&self) -> usize {
        if self.state.replace(NotifierState::Fired) == NotifierState::Fired {
            return 0;
        }
        let snapshot = self.subscribers.borrow().clone();
        tracing::trace!(subscribers = snapshot.len(), "firing commit notifications");
        for subscriber in &snapshot {
            subscriber();
        }
        snapshot.len()
    }
}

impl Default for CommitNotifier {
    fn default() -> Self {
        Self::new()
    }
}
