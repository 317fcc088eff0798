//! Engine-wide housekeeping facet.

use crate::StoreError;

/// Trait for bookkeeping that doesn't belong to any domain-specific facet:
/// named identity counters and a generic metadata key-value space.
pub trait GeneralStore {
    /// Increment and return the named counter. The first value is 1.
    fn next_identity_value(&self, name: &str) -> Result<u64, StoreError>;

    /// Store a metadata value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a metadata entry. Returns `false` if it did not exist.
    fn delete_meta(&self, key: &str) -> Result<bool, StoreError>;
}
