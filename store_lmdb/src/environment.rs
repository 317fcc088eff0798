//! LMDB environment setup and the [`StorageBackend`] implementation.
//!
//! Rows are framed as `version ++ payload`. LMDB allows one write transaction
//! at a time, so validating every expected version and applying the batch
//! inside the same write transaction is atomic with respect to other commits.
//! If validation fails the write transaction is dropped, which aborts it.

use std::collections::HashMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use quire_store::backend::{check_version, codes};
use quire_store::{
    BackendFailure, CommitBatch, ConflictCodes, Direction, StorageBackend, Table, Version, Versioned,
};

use crate::integrity::{check_data_dir, check_integrity};
use crate::migration::Migrator;
use crate::record;
use crate::LmdbError;

/// Name of the private bookkeeping database.
pub(crate) const META_DB: &str = "_meta";

/// Named databases the environment needs: one per table plus `_meta`.
pub const REQUIRED_DBS: u32 = Table::ALL.len() as u32 + 1;

const LAST_SEQUENCE_KEY: &[u8] = b"last_sequence";
const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    path: PathBuf,
    env: Arc<Env>,
    tables: HashMap<Table, Database<Bytes, Bytes>>,
    meta_db: Database<Bytes, Bytes>,
    sequence: AtomicU64,
    conflict_codes: ConflictCodes,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// Creates every table database, runs schema migrations and an integrity
    /// check. Integrity problems are logged, not fatal.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        if max_dbs < REQUIRED_DBS {
            return Err(LmdbError::Options(format!(
                "max_dbs is {} but {} named databases are required",
                max_dbs, REQUIRED_DBS
            )));
        }
        check_data_dir(path).map_err(LmdbError::Schema)?;
        fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per directory by this
        // process and the backing files are not modified outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let mut tables = HashMap::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(table.name()))?;
            tables.insert(table, db);
        }
        let meta_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(META_DB))?;
        let last_sequence = match meta_db.get(&wtxn, LAST_SEQUENCE_KEY)? {
            Some(bytes) => decode_u64(bytes)?,
            None => 0,
        };
        wtxn.commit()?;

        let environment = Self {
            path: path.to_path_buf(),
            env: Arc::new(env),
            tables,
            meta_db,
            sequence: AtomicU64::new(last_sequence),
            conflict_codes: ConflictCodes::new(codes::WRITE_CONFLICTS),
        };

        Migrator::run(&environment)?;

        let report = check_integrity(&environment)?;
        for problem in &report.errors {
            tracing::warn!(path = %path.display(), problem = %problem, "integrity check");
        }

        tracing::info!(
            path = %path.display(),
            tables = report.tables_checked,
            rows = report.rows,
            last_sequence,
            "opened LMDB environment"
        );
        Ok(environment)
    }

    /// Replace the conflict code set reported to the classifier.
    pub fn with_conflict_codes(mut self, conflict_codes: ConflictCodes) -> Self {
        self.conflict_codes = conflict_codes;
        self
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number handed out so far.
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Stored schema version; 0 for a fresh environment.
    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        match self.meta_db.get(&rtxn, SCHEMA_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(bytes);
                Ok(u32::from_le_bytes(arr))
            }
            Some(_) => Err(LmdbError::Corrupted {
                table: META_DB,
                reason: "schema_version has unexpected byte length".to_string(),
            }),
            None => Ok(0),
        }
    }

    pub(crate) fn set_schema_version(&self, version: u32) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        self.meta_db
            .put(&mut wtxn, SCHEMA_VERSION_KEY, &version.to_le_bytes())?;
        wtxn.commit()?;
        Ok(())
    }

    fn database(&self, table: Table) -> Result<Database<Bytes, Bytes>, LmdbError> {
        self.tables
            .get(&table)
            .copied()
            .ok_or_else(|| LmdbError::Schema(format!("no database for table '{}'", table)))
    }

    fn read_row(&self, table: Table, key: &[u8]) -> Result<Option<Versioned>, LmdbError> {
        let db = self.database(table)?;
        let rtxn = self.env.read_txn()?;
        db.get(&rtxn, key)?
            .map(|row| record::decode(table.name(), row))
            .transpose()
    }

    fn scan_rows(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Versioned)>, LmdbError> {
        let db = self.database(table)?;
        let rtxn = self.env.read_txn()?;
        let mut rows = Vec::new();
        if prefix.is_empty() {
            for entry in db.iter(&rtxn)? {
                let (key, row) = entry?;
                rows.push((key.to_vec(), record::decode(table.name(), row)?));
            }
        } else {
            for entry in db.prefix_iter(&rtxn, prefix)? {
                let (key, row) = entry?;
                rows.push((key.to_vec(), record::decode(table.name(), row)?));
            }
        }
        Ok(rows)
    }

    fn page_rows(
        &self,
        table: Table,
        from: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Versioned)>, LmdbError> {
        let db = self.database(table)?;
        let rtxn = self.env.read_txn()?;
        let from = from.map_or(Bound::Unbounded, Bound::Excluded);
        let mut rows = Vec::new();
        match direction {
            Direction::Forward => {
                let range: (Bound<&[u8]>, Bound<&[u8]>) = (from, Bound::Unbounded);
                for entry in db.range(&rtxn, &range)?.take(limit) {
                    let (key, row) = entry?;
                    rows.push((key.to_vec(), record::decode(table.name(), row)?));
                }
            }
            Direction::Backward => {
                let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, from);
                for entry in db.rev_range(&rtxn, &range)?.take(limit) {
                    let (key, row) = entry?;
                    rows.push((key.to_vec(), record::decode(table.name(), row)?));
                }
            }
        }
        Ok(rows)
    }

    fn apply_batch(&self, batch: &CommitBatch) -> Result<(), BackendFailure> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        for mutation in &batch.mutations {
            let db = self.database(mutation.table)?;
            let current = match db.get(&wtxn, &mutation.key).map_err(LmdbError::from)? {
                Some(row) => Some(record::decode(mutation.table.name(), row)?.version),
                None => None,
            };
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
            let db = self.database(mutation.table)?;
            match &mutation.value {
                Some(value) => db
                    .put(&mut wtxn, &mutation.key, &record::encode(version, value))
                    .map_err(LmdbError::from)?,
                None => {
                    db.delete(&mut wtxn, &mutation.key)
                        .map_err(LmdbError::from)?;
                }
            }
        }

        let last_sequence = self.sequence.load(Ordering::SeqCst);
        self.meta_db
            .put(&mut wtxn, LAST_SEQUENCE_KEY, &last_sequence.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| LmdbError::Corrupted {
        table: META_DB,
        reason: format!("last_sequence has {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(arr))
}

impl StorageBackend for LmdbEnvironment {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    fn conflict_codes(&self) -> ConflictCodes {
        self.conflict_codes.clone()
    }

    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Versioned>, BackendFailure> {
        Ok(self.read_row(table, key)?)
    }

    fn scan_prefix(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure> {
        Ok(self.scan_rows(table, prefix)?)
    }

    fn scan_page(
        &self,
        table: Table,
        from: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure> {
        Ok(self.page_rows(table, from, direction, limit)?)
    }

    fn next_sequence(&self) -> Result<u64, BackendFailure> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn apply(&self, batch: &CommitBatch) -> Result<(), BackendFailure> {
        if batch.is_empty() {
            return Ok(());
        }
        self.apply_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_store::Mutation;
    use quire_types::TransactionId;

    /// Helper: open a temporary LMDB environment.
    fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let env = LmdbEnvironment::open(dir.path(), REQUIRED_DBS, 10 * 1024 * 1024)
            .expect("failed to open env");
        (dir, env)
    }

    fn put(table: Table, key: &str, expected: Option<Version>, value: &[u8]) -> Mutation {
        Mutation {
            table,
            key: key.as_bytes().to_vec(),
            expected,
            value: Some(value.to_vec()),
        }
    }

    fn batch(mutations: Vec<Mutation>) -> CommitBatch {
        CommitBatch {
            transaction: TransactionId::new(1),
            mutations,
        }
    }

    #[test]
    fn batch_is_readable_after_apply() {
        let (_dir, env) = temp_env();
        env.apply(&batch(vec![
            put(Table::Documents, "users/1", None, b"alice"),
            put(Table::Queues, "q/1", None, b"msg"),
        ]))
        .expect("apply");

        let doc = env.read(Table::Documents, b"users/1").unwrap().unwrap();
        assert_eq!(doc.value, b"alice");
        let msg = env.read(Table::Queues, b"q/1").unwrap().unwrap();
        assert_eq!(msg.version, doc.version, "one batch, one version");
    }

    #[test]
    fn conflicting_batch_does_not_persist() {
        let (_dir, env) = temp_env();
        env.apply(&batch(vec![put(Table::Documents, "a", None, b"1")]))
            .unwrap();

        let err = env
            .apply(&batch(vec![
                put(Table::Documents, "b", None, b"2"),
                put(Table::Documents, "a", None, b"3"),
            ]))
            .unwrap_err();
        assert_eq!(err.code, codes::WRITE_CONFLICT_PRIMARY_INDEX);
        assert!(env.read(Table::Documents, b"b").unwrap().is_none());
        assert_eq!(env.read(Table::Documents, b"a").unwrap().unwrap().value, b"1");
    }

    #[test]
    fn delete_with_matching_version() {
        let (_dir, env) = temp_env();
        env.apply(&batch(vec![put(Table::Tasks, "t", None, b"x")]))
            .unwrap();
        let version = env.read(Table::Tasks, b"t").unwrap().unwrap().version;

        env.apply(&batch(vec![Mutation {
            table: Table::Tasks,
            key: b"t".to_vec(),
            expected: Some(version),
            value: None,
        }]))
        .unwrap();
        assert!(env.read(Table::Tasks, b"t").unwrap().is_none());
    }

    #[test]
    fn prefix_scan_is_sorted() {
        let (_dir, env) = temp_env();
        env.apply(&batch(vec![
            put(Table::MappedResults, "v\0b", None, b"2"),
            put(Table::MappedResults, "v\0a", None, b"1"),
            put(Table::MappedResults, "w\0a", None, b"3"),
        ]))
        .unwrap();
        let rows = env.scan_prefix(Table::MappedResults, b"v\0").unwrap();
        let values: Vec<_> = rows.into_iter().map(|(_, r)| r.value).collect();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(env.scan_prefix(Table::MappedResults, b"").unwrap().len(), 3);
    }

    #[test]
    fn page_scan_walks_both_ways() {
        let (_dir, env) = temp_env();
        env.apply(&batch(vec![
            put(Table::DocumentEtags, "1", None, b"a"),
            put(Table::DocumentEtags, "2", None, b"b"),
            put(Table::DocumentEtags, "3", None, b"c"),
        ]))
        .unwrap();
        let values = |rows: Vec<(Vec<u8>, Versioned)>| -> Vec<Vec<u8>> { rows.into_iter().map(|(_, r)| r.value).collect() };

        let last = env.scan_page(Table::DocumentEtags, None, Direction::Backward, 1).unwrap();
        assert_eq!(values(last), vec![b"c".to_vec()]);
        let after = env.scan_page(Table::DocumentEtags, Some(b"1".as_slice()), Direction::Forward, 10).unwrap();
        assert_eq!(values(after), vec![b"b".to_vec(), b"c".to_vec()]);
        let before = env.scan_page(Table::DocumentEtags, Some(b"3".as_slice()), Direction::Backward, 1).unwrap();
        assert_eq!(values(before), vec![b"b".to_vec()]);
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let before = {
            let env = LmdbEnvironment::open(dir.path(), REQUIRED_DBS, 10 * 1024 * 1024).unwrap();
            env.apply(&batch(vec![put(Table::Meta, "k", None, b"v")]))
                .unwrap();
            env.next_sequence().unwrap()
        };
        let env = LmdbEnvironment::open(dir.path(), REQUIRED_DBS, 10 * 1024 * 1024).unwrap();
        assert!(env.next_sequence().unwrap() >= before);
        assert_eq!(env.read(Table::Meta, b"k").unwrap().unwrap().value, b"v");
    }

    #[test]
    fn too_few_databases_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = LmdbEnvironment::open(dir.path(), 2, 10 * 1024 * 1024);
        assert!(matches!(result, Err(LmdbError::Options(_))));
    }
}
