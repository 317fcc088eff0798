//! Transaction-scoped bookkeeping facet.
//!
//! Work can be staged under an externally named transaction (for example one
//! coordinated by a distributed transaction manager) and applied or discarded
//! later. A document with staged changes is locked against ordinary writes
//! until its transaction completes or rolls back.

use quire_types::Etag;
use serde::{Deserialize, Serialize};

use crate::document::Metadata;
use crate::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedWrite {
    Put { data: Vec<u8>, metadata: Metadata },
    Delete,
}

/// A document change waiting for its transaction to complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    pub transaction_id: String,
    pub key: String,
    /// Etag the document must still carry when the change is applied.
    pub expected: Option<Etag>,
    /// Etag handed to the caller at staging time.
    pub etag: Etag,
    pub write: StagedWrite,
}

pub trait TransactionStore {
    /// Stage a document write under `transaction_id`.
    fn add_document_in_transaction(
        &self,
        transaction_id: &str,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<Etag, StoreError>;

    /// Stage a document delete. Returns `false` if there is no such document.
    fn delete_document_in_transaction(
        &self,
        transaction_id: &str,
        key: &str,
        expected: Option<Etag>,
    ) -> Result<bool, StoreError>;

    /// Apply every change staged under `transaction_id` to the document store.
    /// Returns the keys that were modified.
    fn complete_transaction(&self, transaction_id: &str) -> Result<Vec<String>, StoreError>;

    /// Discard every change staged under `transaction_id`.
    fn rollback_transaction(&self, transaction_id: &str) -> Result<(), StoreError>;

    /// Distinct transaction ids with staged work.
    fn transaction_ids(&self) -> Result<Vec<String>, StoreError>;
}
