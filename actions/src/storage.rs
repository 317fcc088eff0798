//! Entry point: opens a backend and hands out transactions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quire_nullables::NullBackend;
use quire_store::{ConflictCodes, StorageBackend, StoreError};
use quire_store_lmdb::LmdbEnvironment;
use quire_types::{Clock, SystemClock, TransactionId};

use crate::config::{BackendKind, StorageConfig};
use crate::{EngineError, StorageActionsAccessor, TransactionalContext};

/// A store that many threads can share. Each transaction it hands out belongs
/// to one thread.
pub struct TransactionalStorage {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    conflict_codes: ConflictCodes,
    max_write_conflict_retries: u32,
    next_transaction: AtomicU64,
}

impl TransactionalStorage {
    /// Open the backend named by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self, EngineError> {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Lmdb => Arc::new(LmdbEnvironment::open(
                &config.data_dir,
                config.max_dbs,
                config.map_size,
            )?),
            BackendKind::Memory => Arc::new(NullBackend::new()),
        };
        tracing::info!(
            backend = %config.backend,
            data_dir = %config.data_dir.display(),
            "storage opened"
        );
        let mut storage = Self::with_backend(backend, Arc::new(SystemClock), config.max_write_conflict_retries);
        if let Some(codes) = config.conflict_codes() {
            storage = storage.with_conflict_codes(codes);
        }
        Ok(storage)
    }

    pub fn with_backend(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>, max_write_conflict_retries: u32) -> Self {
        let conflict_codes = backend.conflict_codes();
        Self {
            backend,
            clock,
            conflict_codes,
            max_write_conflict_retries,
            next_transaction: AtomicU64::new(1),
        }
    }

    /// Classify conflicts with `codes` instead of the backend's own.
    pub fn with_conflict_codes(mut self, codes: ConflictCodes) -> Self {
        self.conflict_codes = codes;
        self
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn conflict_codes(&self) -> &ConflictCodes {
        &self.conflict_codes
    }

    pub fn begin_transaction(&self) -> TransactionalContext {
        let id = TransactionId::new(self.next_transaction.fetch_add(1, Ordering::Relaxed));
        TransactionalContext::new(id, self.backend.clone(), self.clock.clone())
    }

    pub fn begin(&self) -> StorageActionsAccessor {
        StorageActionsAccessor::with_conflict_codes(self.begin_transaction(), self.conflict_codes.clone())
    }

    /// Run `work` in a fresh transaction and commit it.
    ///
    /// When `work` or the commit fails with a write conflict, the whole closure
    /// runs again on a new transaction, at most `max_write_conflict_retries`
    /// more times. Any other failure is returned as is.
    pub fn batch<T, F>(&self, mut work: F) -> Result<T, StoreError>
    where
        F: FnMut(&StorageActionsAccessor) -> Result<T, StoreError>,
    {
        let mut retries = 0;
        loop {
            let actions = self.begin();
            let outcome = work(&actions).and_then(|value| actions.commit().map(|()| value));
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if retries < self.max_write_conflict_retries && actions.is_write_conflict(&err) => {
                    retries += 1;
                    tracing::info!(
                        transaction = %actions.transaction_id(),
                        retries,
                        error = %err,
                        "write conflict, retrying batch"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
