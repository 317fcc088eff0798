//! Index staleness facet.

use quire_types::{Etag, Timestamp};

use crate::StoreError;

/// Trait for deciding whether derived indexes lag behind committed documents.
pub trait StalenessStore {
    /// Whether `index` has work outstanding.
    ///
    /// An index is stale if tasks are pending for it, or if its last indexed
    /// etag is behind the most recent document etag. With a `cutoff`, the etag
    /// gap only counts when the index was last updated before the cutoff.
    /// Fails with [`StoreError::NotFound`] for an unknown index.
    fn is_index_stale(&self, index: &str, cutoff: Option<Timestamp>) -> Result<bool, StoreError>;

    /// When the index last made progress and how far it got.
    fn index_last_updated_at(&self, index: &str) -> Result<(Timestamp, Etag), StoreError>;

    fn most_recent_document_etag(&self) -> Result<Etag, StoreError>;

    fn most_recent_attachment_etag(&self) -> Result<Etag, StoreError>;
}
