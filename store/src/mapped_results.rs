//! Map-reduce intermediate results facet.

use quire_types::Etag;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One map output, waiting to be reduced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedResult {
    pub view: String,
    pub document_key: String,
    pub reduce_key: String,
    pub etag: Etag,
    pub data: Vec<u8>,
}

/// Trait for intermediate results of map-reduce views.
///
/// Results are grouped by `(view, reduce_key)`; each remembers the document
/// that produced it so re-indexing a document can retract its old output.
pub trait MappedResultStore {
    fn put_mapped_result(
        &self,
        view: &str,
        document_key: &str,
        reduce_key: &str,
        data: &[u8],
    ) -> Result<Etag, StoreError>;

    /// All map outputs for one reduce key, in insertion order.
    fn mapped_results(&self, view: &str, reduce_key: &str) -> Result<Vec<MappedResult>, StoreError>;

    /// Retract a document's outputs. Returns the reduce keys that were touched.
    fn delete_mapped_results_for_document(
        &self,
        view: &str,
        document_key: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Drop every output of a view. Returns how many were removed.
    fn delete_mapped_results_for_view(&self, view: &str) -> Result<u64, StoreError>;
}
