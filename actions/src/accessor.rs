//! The storage actions accessor: one transaction, many facets.

use std::error::Error;

use quire_store::{
    AttachmentStore, ConflictCodes, DocumentStore, GeneralStore, IndexingStore, MappedResultStore,
    QueueStore, StalenessStore, StorageBackend, StoreError, TaskStore, TransactionStore,
};
use quire_types::TransactionId;

use crate::context::TransactionalContext;
use crate::notifier::{CommitNotifier, OnCommit};

/// Binds one [`TransactionalContext`] to the capability facets, a commit
/// notifier and the write-conflict classifier.
///
/// Every facet getter returns the same context, so writes made through one
/// facet are visible through every other facet of this accessor before
/// commit. Once [`commit`](Self::commit) or [`rollback`](Self::rollback) has
/// run, every facet operation fails with [`StoreError::StaleContext`].
pub struct StorageActionsAccessor {
    context: TransactionalContext,
    notifier: CommitNotifier,
    conflict_codes: ConflictCodes,
}

impl StorageActionsAccessor {
    /// Classifies conflicts with the codes of the context's backend.
    pub fn new(context: TransactionalContext) -> Self {
        let conflict_codes = context.backend().conflict_codes();
        Self::with_conflict_codes(context, conflict_codes)
    }

    pub fn with_conflict_codes(context: TransactionalContext, conflict_codes: ConflictCodes) -> Self {
        Self {
            context,
            notifier: CommitNotifier::new(),
            conflict_codes,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.context.id()
    }

    pub fn is_active(&self) -> bool {
        self.context.state().is_active()
    }

    pub fn transactions(&self) -> &dyn TransactionStore {
        &self.context
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        &self.context
    }

    pub fn queue(&self) -> &dyn QueueStore {
        &self.context
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        &self.context
    }

    pub fn staleness(&self) -> &dyn StalenessStore {
        &self.context
    }

    pub fn attachments(&self) -> &dyn AttachmentStore {
        &self.context
    }

    pub fn indexing(&self) -> &dyn IndexingStore {
        &self.context
    }

    pub fn general(&self) -> &dyn GeneralStore {
        &self.context
    }

    pub fn mapped_results(&self) -> &dyn MappedResultStore {
        &self.context
    }

    /// Run `on_commit` after this transaction commits. Never run on rollback,
    /// and never run if subscribed after the commit already happened.
    pub fn subscribe(&self, on_commit: OnCommit) {
        self.notifier.subscribe(on_commit);
    }

    /// Drop the earliest registration of `on_commit`, if any.
    pub fn unsubscribe(&self, on_commit: &OnCommit) -> bool {
        self.notifier.unsubscribe(on_commit)
    }

    pub fn is_write_conflict(&self, error: &(dyn Error + 'static)) -> bool {
        self.conflict_codes.is_write_conflict(error)
    }

    pub fn conflict_codes(&self) -> &ConflictCodes {
        &self.conflict_codes
    }

    /// Commit the bound context, then run the subscribers in order before
    /// returning. A rejected commit ends the transaction without notifying.
    pub fn commit(&self) -> Result<(), StoreError> {
        self.context.commit()?;
        self.notifier.fire();
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), StoreError> {
        self.context.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use quire_nullables::{NullBackend, NullClock};
    use quire_store::backend::codes;
    use quire_store::{BackendFailure, ContextState, Metadata};

    fn accessor(backend: &Arc<NullBackend>) -> StorageActionsAccessor {
        let context = TransactionalContext::new(TransactionId::new(1), backend.clone(), Arc::new(NullClock::new(0)));
        StorageActionsAccessor::new(context)
    }

    fn counter() -> (Arc<AtomicUsize>, OnCommit) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let on_commit: OnCommit = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, on_commit)
    }

    #[test]
    fn facets_share_the_context() {
        let backend = Arc::new(NullBackend::new());
        let actions = accessor(&backend);
        actions.documents().add_document("a", None, b"1", &Metadata::new()).unwrap();
        let etag = actions.staleness().most_recent_document_etag().unwrap();
        assert!(!etag.is_zero());
        actions.transactions().add_document_in_transaction("t", "b", None, b"", &Metadata::new()).unwrap();
        assert_eq!(actions.transactions().transaction_ids().unwrap(), ["t"]);
    }

    #[test]
    fn commit_notifies_and_ends() {
        let backend = Arc::new(NullBackend::new());
        let actions = accessor(&backend);
        let (count, on_commit) = counter();
        actions.subscribe(on_commit);
        actions.general().put_meta("k", b"v").unwrap();
        actions.commit().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!actions.is_active());
        assert!(matches!(
            actions.commit(),
            Err(StoreError::StaleContext { state: ContextState::Committed, .. })
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rollback_never_notifies() {
        let backend = Arc::new(NullBackend::new());
        let actions = accessor(&backend);
        let (count, on_commit) = counter();
        actions.subscribe(on_commit);
        actions.rollback().unwrap();
        assert!(actions.rollback().is_err());
        assert!(actions.commit().is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_commit_never_notifies() {
        let backend = Arc::new(NullBackend::new());
        backend.fail_next_commit(codes::OUT_OF_DATABASE_SPACE, "full");
        let actions = accessor(&backend);
        let (count, on_commit) = counter();
        actions.subscribe(on_commit);
        actions.general().put_meta("k", b"v").unwrap();
        let err = actions.commit().unwrap_err();
        assert!(!actions.is_write_conflict(&err));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!actions.is_active());
    }

    #[test]
    fn classifier_uses_configured_codes() {
        let backend = Arc::new(NullBackend::new());
        let context = TransactionalContext::new(TransactionId::new(1), backend, Arc::new(NullClock::new(0)));
        let actions = StorageActionsAccessor::with_conflict_codes(context, ConflictCodes::new([codes::DISK_IO]));
        assert!(actions.is_write_conflict(&BackendFailure::new(codes::DISK_IO, "io")));
        assert!(!actions.is_write_conflict(&BackendFailure::new(codes::WRITE_CONFLICT, "conflict")));
        assert!(!actions.is_write_conflict(&StoreError::NotFound("x".into())));
    }
}
