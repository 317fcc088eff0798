//! Nullable clock: a [`Clock`] that only moves when a test moves it.

use quire_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared between a test and the storage under test, so documents stamped
/// inside a transaction get predictable `last_modified` values.
pub struct NullClock {
    secs: AtomicU64,
}

impl NullClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.secs.store(at.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.secs.load(Ordering::SeqCst))
    }
}
