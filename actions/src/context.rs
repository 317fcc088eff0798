//! The unit of work shared by every facet of one accessor.
//!
//! A [`TransactionalContext`] buffers writes in memory and remembers the row
//! version it saw the first time it touched each key. Reads see the context's
//! own pending writes. On commit the buffered writes become one
//! [`CommitBatch`] whose expected versions let the backend reject the batch if
//! another transaction committed to the same rows in the meantime.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use quire_store::{
    CommitBatch, ContextState, Direction, Mutation, StorageBackend, StoreError, Table, Version,
};
use quire_types::{Clock, Etag, Timestamp, TransactionId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;

type RowKey = (Table, Vec<u8>);

#[derive(Default)]
struct WorkingSet {
    /// `None` marks a delete.
    writes: BTreeMap<RowKey, Option<Vec<u8>>>,
    /// Version of each touched row as first observed; `None` if it was absent.
    observed: HashMap<RowKey, Option<Version>>,
}

impl WorkingSet {
    fn observe(&mut self, table: Table, key: &[u8], version: Option<Version>) {
        self.observed.entry((table, key.to_vec())).or_insert(version);
    }

    fn is_observed(&self, table: Table, key: &[u8]) -> bool {
        self.observed.contains_key(&(table, key.to_vec()))
    }

    fn into_mutations(self) -> Vec<Mutation> {
        let WorkingSet { writes, observed } = self;
        writes
            .into_iter()
            .map(|((table, key), value)| {
                let expected = observed.get(&(table, key.clone())).copied().flatten();
                Mutation {
                    table,
                    key,
                    expected,
                    value,
                }
            })
            .collect()
    }
}

pub struct TransactionalContext {
    id: TransactionId,
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    state: Cell<ContextState>,
    work: RefCell<WorkingSet>,
}

impl TransactionalContext {
    pub fn new(id: TransactionId, backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        tracing::debug!(transaction = %id, backend = backend.name(), "transaction started");
        Self {
            id,
            backend,
            clock,
            state: Cell::new(ContextState::Active),
            work: RefCell::new(WorkingSet::default()),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Number of rows this context will write on commit.
    pub fn pending_writes(&self) -> usize {
        self.work.borrow().writes.len()
    }

    pub(crate) fn ensure_active(&self) -> Result<(), StoreError> {
        match self.state.get() {
            ContextState::Active => Ok(()),
            state => Err(StoreError::StaleContext {
                transaction: self.id,
                state,
            }),
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn next_sequence(&self) -> Result<u64, StoreError> {
        self.ensure_active()?;
        Ok(self.backend.next_sequence()?)
    }

    pub(crate) fn next_etag(&self) -> Result<Etag, StoreError> {
        self.next_sequence().map(Etag::new)
    }

    pub(crate) fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_active()?;
        if let Some(pending) = self.work.borrow().writes.get(&(table, key.to_vec())) {
            return Ok(pending.clone());
        }
        let row = self.backend.read(table, key)?;
        let mut work = self.work.borrow_mut();
        work.observe(table, key, row.as_ref().map(|r| r.version));
        Ok(row.map(|r| r.value))
    }

    pub(crate) fn put(&self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.write(table, key, Some(value))
    }

    pub(crate) fn delete(&self, table: Table, key: Vec<u8>) -> Result<(), StoreError> {
        self.write(table, key, None)
    }

    fn write(&self, table: Table, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        self.ensure_active()?;
        if !self.work.borrow().is_observed(table, &key) {
            let version = self.backend.read(table, &key)?.map(|r| r.version);
            self.work.borrow_mut().observe(table, &key, version);
        }
        self.work.borrow_mut().writes.insert((table, key), value);
        Ok(())
    }

    /// Rewrite `key` unchanged, or delete it if absent, so that commit fails
    /// if another transaction writes the row first.
    pub(crate) fn touch(&self, table: Table, key: Vec<u8>) -> Result<(), StoreError> {
        match self.get(table, &key)? {
            Some(value) => self.put(table, key, value),
            None => self.delete(table, key),
        }
    }

    /// Every live row under `prefix`, in key order, with this context's own
    /// writes laid over the committed state.
    pub(crate) fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.ensure_active()?;
        let committed = self.backend.scan_prefix(table, prefix)?;
        let mut work = self.work.borrow_mut();
        let mut rows = BTreeMap::new();
        for (key, row) in committed {
            work.observe(table, &key, Some(row.version));
            rows.insert(key, row.value);
        }
        let start = (table, prefix.to_vec());
        for ((_, key), value) in work
            .writes
            .range(start..)
            .take_while(|((t, k), _)| *t == table && k.starts_with(prefix))
        {
            match value {
                Some(value) => rows.insert(key.clone(), value.clone()),
                None => rows.remove(key),
            };
        }
        Ok(rows.into_iter().collect())
    }

    /// Up to `limit` live rows past `from` in `direction`, nearest first.
    /// Only the rows returned are recorded as observed.
    pub(crate) fn scan_page(
        &self,
        table: Table,
        from: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.ensure_active()?;
        let beyond = |key: &[u8]| match (from, direction) {
            (None, _) => true,
            (Some(from), Direction::Forward) => key > from,
            (Some(from), Direction::Backward) => key < from,
        };
        let mut work = self.work.borrow_mut();
        let pending: Vec<(Vec<u8>, Option<Vec<u8>>)> = work
            .writes
            .range((table, Vec::new())..)
            .take_while(|((t, _), _)| *t == table)
            .filter(|((_, key), _)| beyond(key.as_slice()))
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect();
        // each pending delete can hide one committed row
        let deletes = pending.iter().filter(|(_, value)| value.is_none()).count();
        let committed = self
            .backend
            .scan_page(table, from, direction, limit.saturating_add(deletes))?;

        let mut rows: BTreeMap<Vec<u8>, (Vec<u8>, Option<Version>)> = committed
            .into_iter()
            .map(|(key, row)| (key, (row.value, Some(row.version))))
            .collect();
        for (key, value) in pending {
            match value {
                Some(value) => rows.insert(key, (value, None)),
                None => rows.remove(&key),
            };
        }
        let mut ordered: Vec<_> = rows.into_iter().collect();
        if direction == Direction::Backward {
            ordered.reverse();
        }
        let mut page = Vec::new();
        for (key, (value, version)) in ordered.into_iter().take(limit) {
            if let Some(version) = version {
                work.observe(table, &key, Some(version));
            }
            page.push((key, value));
        }
        Ok(page)
    }

    /// Number of live rows under `prefix`. Nothing is recorded as observed.
    pub(crate) fn count(&self, table: Table, prefix: &[u8]) -> Result<u64, StoreError> {
        self.ensure_active()?;
        let mut keys: BTreeSet<Vec<u8>> = self
            .backend
            .scan_prefix(table, prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let work = self.work.borrow();
        let start = (table, prefix.to_vec());
        for ((_, key), value) in work
            .writes
            .range(start..)
            .take_while(|((t, k), _)| *t == table && k.starts_with(prefix))
        {
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }
        Ok(keys.len() as u64)
    }

    pub(crate) fn get_record<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> Result<Option<T>, StoreError> {
        self.get(table, key)?.map(|bytes| codec::decode(&bytes)).transpose()
    }

    pub(crate) fn put_record<T: Serialize>(&self, table: Table, key: Vec<u8>, record: &T) -> Result<(), StoreError> {
        self.put(table, key, codec::encode(record)?)
    }

    pub(crate) fn scan_records<T: DeserializeOwned>(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T)>, StoreError> {
        self.scan(table, prefix)?
            .into_iter()
            .map(|(key, bytes)| codec::decode(&bytes).map(|record| (key, record)))
            .collect()
    }

    /// Hand the buffered writes to the backend. The context is over afterwards
    /// whether or not the backend accepted them.
    pub(crate) fn commit(&self) -> Result<(), StoreError> {
        self.ensure_active()?;
        let work = self.work.take();
        let batch = CommitBatch {
            transaction: self.id,
            mutations: work.into_mutations(),
        };
        match self.backend.apply(&batch) {
            Ok(()) => {
                self.state.set(ContextState::Committed);
                tracing::debug!(transaction = %self.id, mutations = batch.mutations.len(), "transaction committed");
                Ok(())
            }
            Err(failure) => {
                self.state.set(ContextState::RolledBack);
                tracing::debug!(transaction = %self.id, code = %failure.code, "commit rejected by backend");
                Err(failure.into())
            }
        }
    }

    pub(crate) fn rollback(&self) -> Result<(), StoreError> {
        self.ensure_active()?;
        let discarded = self.work.take().writes.len();
        self.state.set(ContextState::RolledBack);
        tracing::debug!(transaction = %self.id, discarded, "transaction rolled back");
        Ok(())
    }
}

impl Drop for TransactionalContext {
    fn drop(&mut self) {
        if self.state.get().is_active() {
            let discarded = self.work.get_mut().writes.len();
            tracing::debug!(transaction = %self.id, discarded, "dropped while active, rolling back");
        }
    }
}
