//! Attachment storage facet.

use quire_types::{Etag, Timestamp};
use serde::{Deserialize, Serialize};

use crate::document::Metadata;
use crate::StoreError;

/// A binary blob stored alongside documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub key: String,
    pub etag: Etag,
    pub last_modified: Timestamp,
    pub data: Vec<u8>,
    pub metadata: Metadata,
}

pub trait AttachmentStore {
    /// Store an attachment, returning its new etag.
    fn add_attachment(
        &self,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<Etag, StoreError>;

    fn attachment(&self, key: &str) -> Result<Option<Attachment>, StoreError>;

    /// Returns `false` if there was nothing to delete.
    fn delete_attachment(&self, key: &str, expected: Option<Etag>) -> Result<bool, StoreError>;

    /// Attachments changed after `etag`, oldest change first.
    fn attachments_after(&self, etag: Etag, take: usize) -> Result<Vec<Attachment>, StoreError>;
}
