//! Indexing metadata facet.

use quire_types::{Etag, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Bookkeeping for one index. The index content itself lives elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub last_indexed_etag: Etag,
    pub last_indexed_at: Timestamp,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
}

impl IndexStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_indexed_etag: Etag::ZERO,
            last_indexed_at: Timestamp::EPOCH,
            attempts: 0,
            successes: 0,
            errors: 0,
        }
    }
}

pub trait IndexingStore {
    /// Register a new index. Fails with [`StoreError::Duplicate`] if it exists.
    fn add_index(&self, name: &str) -> Result<(), StoreError>;

    /// Remove an index along with its mapped results and pending tasks.
    fn delete_index(&self, name: &str) -> Result<(), StoreError>;

    fn index_stats(&self) -> Result<Vec<IndexStats>, StoreError>;

    fn update_last_indexed(&self, name: &str, etag: Etag, at: Timestamp)
        -> Result<(), StoreError>;

    fn increment_indexing_attempt(&self, name: &str) -> Result<(), StoreError>;

    fn increment_successful_indexing(&self, name: &str) -> Result<(), StoreError>;

    fn increment_indexing_failure(&self, name: &str) -> Result<(), StoreError>;
}
