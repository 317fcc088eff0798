//! Nullable backend: thread-safe in-memory storage.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use quire_store::backend::{check_version, codes};
use quire_store::{
    BackendFailure, CommitBatch, ConflictCodes, Direction, FailureCode, StorageBackend, Table, Version,
    Versioned,
};

type Rows = BTreeMap<Vec<u8>, Versioned>;

/// An in-memory, optimistic, row-versioned backend.
///
/// One mutex guards every table, so validating and applying a batch is atomic
/// with respect to other commits. Faults can be injected for the next commit
/// with [`NullBackend::fail_next_commit`].
pub struct NullBackend {
    tables: Mutex<HashMap<Table, Rows>>,
    sequence: AtomicU64,
    injected: Mutex<Option<BackendFailure>>,
    conflict_codes: ConflictCodes,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_conflict_codes(ConflictCodes::new(codes::WRITE_CONFLICTS))
    }

    pub fn with_conflict_codes(conflict_codes: ConflictCodes) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            injected: Mutex::new(None),
            conflict_codes,
        }
    }

    /// Make the next [`StorageBackend::apply`] fail with `code` without
    /// applying anything.
    pub fn fail_next_commit(&self, code: FailureCode, message: &str) {
        *lock(&self.injected) = Some(BackendFailure::new(code, message));
    }

    /// Number of committed rows in a table.
    pub fn row_count(&self, table: Table) -> usize {
        lock(&self.tables).get(&table).map_or(0, |rows| rows.len())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StorageBackend for NullBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn conflict_codes(&self) -> ConflictCodes {
        self.conflict_codes.clone()
    }

    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Versioned>, BackendFailure> {
        Ok(lock(&self.tables)
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn scan_prefix(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure> {
        let tables = lock(&self.tables);
        let Some(rows) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect())
    }

    fn scan_page(
        &self,
        table: Table,
        from: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure> {
        let tables = lock(&self.tables);
        let Some(rows) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        let from = from.map_or(Bound::Unbounded, Bound::Excluded);
        let owned = |(key, row): (&Vec<u8>, &Versioned)| (key.clone(), row.clone());
        Ok(match direction {
            Direction::Forward => rows
                .range::<[u8], _>((from, Bound::Unbounded))
                .take(limit)
                .map(owned)
                .collect(),
            Direction::Backward => rows
                .range::<[u8], _>((Bound::Unbounded, from))
                .rev()
                .take(limit)
                .map(owned)
                .collect(),
        })
    }

    fn next_sequence(&self) -> Result<u64, BackendFailure> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn apply(&self, batch: &CommitBatch) -> Result<(), BackendFailure> {
        if let Some(failure) = lock(&self.injected).take() {
            return Err(failure);
        }

        let mut tables = lock(&self.tables);
        for mutation in &batch.mutations {
            let current = tables
                .get(&mutation.table)
                .and_then(|rows| rows.get(&mutation.key))
                .map(|row| row.version);
            if let Err(failure) = check_version(mutation, current) {
                tracing::warn!(
                    transaction = %batch.transaction,
                    table = %mutation.table,
                    code = %failure.code,
                    "write conflict"
                );
                return Err(failure);
            }
        }

        let version = Version::new(self.next_sequence()?);
        for mutation in &batch.mutations {
            let rows = tables.entry(mutation.table).or_default();
            match &mutation.value {
                Some(value) => {
                    rows.insert(
                        mutation.key.clone(),
                        Versioned {
                            version,
                            value: value.clone(),
                        },
                    );
                }
                None => {
                    rows.remove(&mutation.key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_store::Mutation;
    use quire_types::TransactionId;

    fn put(key: &str, expected: Option<Version>, value: &str) -> Mutation {
        Mutation {
            table: Table::Documents,
            key: key.as_bytes().to_vec(),
            expected,
            value: Some(value.as_bytes().to_vec()),
        }
    }

    fn batch(mutations: Vec<Mutation>) -> CommitBatch {
        CommitBatch {
            transaction: TransactionId::new(1),
            mutations,
        }
    }

    #[test]
    fn apply_then_read() {
        let backend = NullBackend::new();
        backend.apply(&batch(vec![put("a", None, "1")])).unwrap();
        let row = backend.read(Table::Documents, b"a").unwrap().unwrap();
        assert_eq!(row.value, b"1");
        assert!(backend.read(Table::Attachments, b"a").unwrap().is_none());
    }

    #[test]
    fn stale_expectation_rejects_whole_batch() {
        let backend = NullBackend::new();
        backend.apply(&batch(vec![put("a", None, "1")])).unwrap();

        let err = backend
            .apply(&batch(vec![put("b", None, "2"), put("a", None, "3")]))
            .unwrap_err();
        assert_eq!(err.code, codes::WRITE_CONFLICT_PRIMARY_INDEX);
        assert!(backend.read(Table::Documents, b"b").unwrap().is_none());
    }

    #[test]
    fn scan_prefix_is_ordered_and_bounded() {
        let backend = NullBackend::new();
        backend
            .apply(&batch(vec![
                put("q/2", None, "b"),
                put("q/1", None, "a"),
                put("r/1", None, "c"),
            ]))
            .unwrap();
        let keys: Vec<_> = backend
            .scan_prefix(Table::Documents, b"q/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"q/1".to_vec(), b"q/2".to_vec()]);
    }

    #[test]
    fn scan_page_stops_at_the_limit() {
        let backend = NullBackend::new();
        backend
            .apply(&batch(vec![put("a", None, "1"), put("b", None, "2"), put("c", None, "3")]))
            .unwrap();
        let keys = |rows: Vec<(Vec<u8>, Versioned)>| -> Vec<Vec<u8>> { rows.into_iter().map(|(k, _)| k).collect() };

        let forward = backend.scan_page(Table::Documents, Some(b"a".as_slice()), Direction::Forward, 1).unwrap();
        assert_eq!(keys(forward), vec![b"b".to_vec()]);
        let backward = backend.scan_page(Table::Documents, None, Direction::Backward, 2).unwrap();
        assert_eq!(keys(backward), vec![b"c".to_vec(), b"b".to_vec()]);
        let before = backend.scan_page(Table::Documents, Some(b"b".as_slice()), Direction::Backward, 5).unwrap();
        assert_eq!(keys(before), vec![b"a".to_vec()]);
        assert!(backend.scan_page(Table::Tasks, None, Direction::Forward, 5).unwrap().is_empty());
    }

    #[test]
    fn injected_fault_is_returned_once() {
        let backend = NullBackend::new();
        backend.fail_next_commit(codes::DISK_IO, "simulated");
        let err = backend.apply(&batch(vec![put("a", None, "1")])).unwrap_err();
        assert_eq!(err.code, codes::DISK_IO);
        assert!(backend.apply(&batch(vec![put("a", None, "1")])).is_ok());
    }

    #[test]
    fn sequence_is_strictly_increasing() {
        let backend = NullBackend::new();
        let a = backend.next_sequence().unwrap();
        let b = backend.next_sequence().unwrap();
        assert!(b > a);
    }
}
