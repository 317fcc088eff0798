//! Document storage facet.

use std::collections::BTreeMap;

use quire_types::{Etag, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Free-form document metadata (content type, entity name, ...).
pub type Metadata = BTreeMap<String, String>;

/// A stored document. The body is opaque to the storage layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonDocument {
    /// Key as the caller spelled it. Lookups are case-insensitive.
    pub key: String,
    pub etag: Etag,
    pub last_modified: Timestamp,
    pub data: Vec<u8>,
    pub metadata: Metadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddDocumentResult {
    pub etag: Etag,
    /// `true` if no document existed under this key before.
    pub created: bool,
}

/// Trait for CRUD over primary document storage.
///
/// Writes that pass `expected = Some(etag)` are optimistic: they fail with
/// [`StoreError::ConcurrencyViolation`] unless the stored document currently
/// carries that etag.
pub trait DocumentStore {
    fn document_by_key(&self, key: &str) -> Result<Option<JsonDocument>, StoreError>;

    /// Insert or replace a document, stamping it with a fresh etag.
    fn add_document(
        &self,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<AddDocumentResult, StoreError>;

    /// Delete a document. Returns the etag it had, or `None` if it did not exist.
    fn delete_document(&self, key: &str, expected: Option<Etag>)
        -> Result<Option<Etag>, StoreError>;

    /// Documents modified after `etag`, oldest change first.
    fn documents_after(&self, etag: Etag, take: usize) -> Result<Vec<JsonDocument>, StoreError>;

    /// Documents ordered by most recent change first.
    fn documents_by_reverse_update_order(
        &self,
        start: usize,
        take: usize,
    ) -> Result<Vec<JsonDocument>, StoreError>;

    fn document_count(&self) -> Result<u64, StoreError>;
}
