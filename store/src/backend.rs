//! The contract between the transactional context and a physical backend.
//!
//! Backends are optimistic and row-versioned. Every stored row carries the
//! [`Version`] of the commit that last wrote it. A context buffers its writes
//! and hands them to [`StorageBackend::apply`] as one [`CommitBatch`]; each
//! [`Mutation`] names the version the context observed when it first touched
//! the row. `apply` either validates and applies every mutation or applies
//! nothing and reports a conflict-coded [`BackendFailure`].

use std::fmt;

use quire_types::TransactionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflict::ConflictCodes;

/// Logical tables. Each backend maps a table to its own physical container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Documents,
    DocumentEtags,
    Attachments,
    AttachmentEtags,
    Queues,
    Tasks,
    IndexStats,
    MappedResults,
    Identities,
    StagedDocuments,
    DocumentLocks,
    Meta,
}

impl Table {
    pub const ALL: [Table; 12] = [
        Table::Documents,
        Table::DocumentEtags,
        Table::Attachments,
        Table::AttachmentEtags,
        Table::Queues,
        Table::Tasks,
        Table::IndexStats,
        Table::MappedResults,
        Table::Identities,
        Table::StagedDocuments,
        Table::DocumentLocks,
        Table::Meta,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Documents => "documents",
            Table::DocumentEtags => "document_etags",
            Table::Attachments => "attachments",
            Table::AttachmentEtags => "attachment_etags",
            Table::Queues => "queues",
            Table::Tasks => "tasks",
            Table::IndexStats => "index_stats",
            Table::MappedResults => "mapped_results",
            Table::Identities => "identities",
            Table::StagedDocuments => "staged_documents",
            Table::DocumentLocks => "document_locks",
            Table::Meta => "meta",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key order in which [`StorageBackend::scan_page`] walks a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Version of a stored row: the commit sequence that last wrote it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A stored row together with its version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned {
    pub version: Version,
    pub value: Vec<u8>,
}

/// One buffered write. `value: None` deletes the row.
#[derive(Clone, Debug)]
pub struct Mutation {
    pub table: Table,
    pub key: Vec<u8>,
    /// Version observed when the transaction first touched the row
    /// (`None` if the row did not exist).
    pub expected: Option<Version>,
    pub value: Option<Vec<u8>>,
}

/// Everything one transaction wants to make durable.
#[derive(Clone, Debug)]
pub struct CommitBatch {
    pub transaction: TransactionId,
    pub mutations: Vec<Mutation>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Backend-defined numeric failure code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCode(pub i32);

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure codes shared by the bundled backends.
///
/// The numbering follows the ISAM engine family the on-disk layouts were
/// modelled on; only the conflict subset is interpreted by the engine, and
/// only through [`ConflictCodes`].
pub mod codes {
    use super::FailureCode;

    pub const BACKEND_FAULT: FailureCode = FailureCode(-1);
    pub const OUT_OF_MEMORY: FailureCode = FailureCode(-1011);
    pub const DISK_IO: FailureCode = FailureCode(-1022);
    /// The row was changed by a transaction that committed first.
    pub const WRITE_CONFLICT: FailureCode = FailureCode(-1102);
    /// The row was created by a transaction that committed first.
    pub const WRITE_CONFLICT_PRIMARY_INDEX: FailureCode = FailureCode(-1105);
    pub const OUT_OF_DATABASE_SPACE: FailureCode = FailureCode(-1108);
    pub const RECORD_CORRUPTED: FailureCode = FailureCode(-1206);
    /// The row was deleted by a transaction that committed first.
    pub const SESSION_WRITE_CONFLICT: FailureCode = FailureCode(-1906);

    /// The codes both bundled backends report for lost optimistic races.
    pub const WRITE_CONFLICTS: [FailureCode; 3] = [
        WRITE_CONFLICT,
        WRITE_CONFLICT_PRIMARY_INDEX,
        SESSION_WRITE_CONFLICT,
    ];
}

/// A failure raised by the physical backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("backend failure {code}: {message}")]
pub struct BackendFailure {
    pub code: FailureCode,
    pub message: String,
}

impl BackendFailure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Compare the version a mutation expects with what is stored now.
///
/// Shared by every backend so they all report the same code for the same race.
pub fn check_version(
    mutation: &Mutation,
    current: Option<Version>,
) -> Result<(), BackendFailure> {
    if mutation.expected == current {
        return Ok(());
    }
    let code = match (mutation.expected, current) {
        (None, Some(_)) => codes::WRITE_CONFLICT_PRIMARY_INDEX,
        (Some(_), None) => codes::SESSION_WRITE_CONFLICT,
        _ => codes::WRITE_CONFLICT,
    };
    Err(BackendFailure::new(
        code,
        format!(
            "{}: row in '{}' moved from {:?} to {:?}",
            String::from_utf8_lossy(&mutation.key),
            mutation.table,
            mutation.expected.map(|v| v.value()),
            current.map(|v| v.value()),
        ),
    ))
}

/// The physical engine a transactional context runs against.
///
/// Implementations must be safe to share across threads: many contexts, each
/// on its own thread, use one backend concurrently.
pub trait StorageBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The failure codes this backend raises for write conflicts.
    fn conflict_codes(&self) -> ConflictCodes;

    /// Read the committed value of a row.
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Versioned>, BackendFailure>;

    /// All committed rows whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure>;

    /// Up to `limit` committed rows nearest to `from` in `direction`, nearest
    /// first. `from` itself is excluded; `None` starts at the matching end of
    /// the table.
    fn scan_page(
        &self,
        table: Table,
        from: Option<&[u8]>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Versioned)>, BackendFailure>;

    /// Issue the next value of the backend-wide sequence (etags, ids, versions).
    fn next_sequence(&self) -> Result<u64, BackendFailure>;

    /// Validate and apply a batch atomically.
    fn apply(&self, batch: &CommitBatch) -> Result<(), BackendFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation(expected: Option<u64>) -> Mutation {
        Mutation {
            table: Table::Documents,
            key: b"users/1".to_vec(),
            expected: expected.map(Version::new),
            value: Some(b"{}".to_vec()),
        }
    }

    #[test]
    fn matching_version_passes() {
        assert!(check_version(&mutation(Some(4)), Some(Version::new(4))).is_ok());
        assert!(check_version(&mutation(None), None).is_ok());
    }

    #[test]
    fn concurrent_insert_is_primary_index_conflict() {
        let err = check_version(&mutation(None), Some(Version::new(9))).unwrap_err();
        assert_eq!(err.code, codes::WRITE_CONFLICT_PRIMARY_INDEX);
    }

    #[test]
    fn concurrent_delete_is_session_conflict() {
        let err = check_version(&mutation(Some(3)), None).unwrap_err();
        assert_eq!(err.code, codes::SESSION_WRITE_CONFLICT);
    }

    #[test]
    fn concurrent_update_is_write_conflict() {
        let err = check_version(&mutation(Some(3)), Some(Version::new(7))).unwrap_err();
        assert_eq!(err.code, codes::WRITE_CONFLICT);
        assert!(err.message.contains("users/1"));
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<_> = Table::ALL.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Table::ALL.len());
    }
}
