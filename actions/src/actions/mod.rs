//! Facet implementations over [`TransactionalContext`](crate::TransactionalContext).
//!
//! Each module implements one capability trait from `quire-store`. All of
//! them read and write through the same context, so work done through one
//! facet is visible to the others before commit.

mod attachments;
mod documents;
mod general;
mod indexing;
mod mapped_results;
mod queue;
mod staleness;
mod tasks;
mod transactions;

use quire_store::StoreError;
use quire_types::Etag;

/// Optimistic etag check shared by documents and attachments.
pub(crate) fn check_etag(key: &str, expected: Option<Etag>, actual: Option<Etag>) -> Result<(), StoreError> {
    match expected {
        Some(expected) if actual != Some(expected) => Err(StoreError::ConcurrencyViolation {
            key: key.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use quire_nullables::{NullBackend, NullClock};
    use quire_types::TransactionId;

    use crate::TransactionalContext;

    pub(crate) fn context() -> (Arc<NullBackend>, TransactionalContext) {
        let backend = Arc::new(NullBackend::new());
        let ctx = TransactionalContext::new(TransactionId::new(1), backend.clone(), Arc::new(NullClock::new(100)));
        (backend, ctx)
    }

    pub(crate) fn next(backend: &Arc<NullBackend>, id: u64) -> TransactionalContext {
        TransactionalContext::new(TransactionId::new(id), backend.clone(), Arc::new(NullClock::new(200)))
    }
}
