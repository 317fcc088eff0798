use quire_store::{AddDocumentResult, DocumentStore, Direction, JsonDocument, Metadata, StoreError, Table};
use quire_types::Etag;

use super::check_etag;
use crate::{keys, TransactionalContext};

impl TransactionalContext {
    /// The external transaction holding staged changes for `key`, if any.
    pub(crate) fn lock_holder(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_record(Table::DocumentLocks, &keys::document_lock(key))
    }

    /// The lock row stays in this transaction's write set, so a concurrent
    /// staging of `key` makes one of the two commits fail.
    fn ensure_unlocked(&self, key: &str) -> Result<(), StoreError> {
        match self.lock_holder(key)? {
            Some(transaction) => Err(StoreError::DocumentLocked {
                key: key.to_string(),
                transaction,
            }),
            None => self.touch(Table::DocumentLocks, keys::document_lock(key)),
        }
    }

    pub(crate) fn current_etag(&self, key: &str) -> Result<Option<Etag>, StoreError> {
        Ok(self
            .get_record::<JsonDocument>(Table::Documents, &keys::document(key))?
            .map(|d| d.etag))
    }

    /// Write a document without consulting the staged-change locks.
    pub(crate) fn write_document(
        &self,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<AddDocumentResult, StoreError> {
        let previous = self.current_etag(key)?;
        check_etag(key, expected, previous)?;
        let etag = self.next_etag()?;
        self.write_document_with_etag(key, previous, etag, data, metadata)
    }

    /// Store `key` under an already issued `etag`, replacing the etag index
    /// entry of the `previous` version.
    pub(crate) fn write_document_with_etag(
        &self,
        key: &str,
        previous: Option<Etag>,
        etag: Etag,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<AddDocumentResult, StoreError> {
        let row = keys::document(key);
        if let Some(previous) = previous {
            self.delete(Table::DocumentEtags, keys::etag(previous))?;
        }
        self.put(Table::DocumentEtags, keys::etag(etag), row.clone())?;
        let document = JsonDocument {
            key: key.to_string(),
            etag,
            last_modified: self.now(),
            data: data.to_vec(),
            metadata: metadata.clone(),
        };
        self.put_record(Table::Documents, row, &document)?;
        Ok(AddDocumentResult {
            etag,
            created: previous.is_none(),
        })
    }

    pub(crate) fn remove_document(&self, key: &str, expected: Option<Etag>) -> Result<Option<Etag>, StoreError> {
        let row = keys::document(key);
        let Some(existing) = self.get_record::<JsonDocument>(Table::Documents, &row)? else {
            return Ok(None);
        };
        check_etag(key, expected, Some(existing.etag))?;
        self.delete(Table::DocumentEtags, keys::etag(existing.etag))?;
        self.delete(Table::Documents, row)?;
        Ok(Some(existing.etag))
    }

    pub(crate) fn document_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(Table::Documents, &keys::document(key))?.is_some())
    }

    /// Rows of the etag index, nearest to `from` first.
    pub(crate) fn etag_page(
        &self,
        table: Table,
        from: Option<Etag>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<(Etag, Vec<u8>)>, StoreError> {
        let from = from.map(keys::etag);
        Ok(self
            .scan_page(table, from.as_deref(), direction, limit)?
            .into_iter()
            .filter_map(|(key, row)| keys::etag_from_key(&key).map(|etag| (etag, row)))
            .collect())
    }

    fn load_documents(&self, rows: impl IntoIterator<Item = Vec<u8>>) -> Result<Vec<JsonDocument>, StoreError> {
        let mut documents = Vec::new();
        for row in rows {
            match self.get_record::<JsonDocument>(Table::Documents, &row)? {
                Some(document) => documents.push(document),
                None => {
                    return Err(StoreError::Corruption(format!(
                        "etag index points at missing document '{}'",
                        String::from_utf8_lossy(&row)
                    )))
                }
            }
        }
        Ok(documents)
    }
}

impl DocumentStore for TransactionalContext {
    fn document_by_key(&self, key: &str) -> Result<Option<JsonDocument>, StoreError> {
        self.get_record(Table::Documents, &keys::document(key))
    }

    fn add_document(
        &self,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<AddDocumentResult, StoreError> {
        self.ensure_unlocked(key)?;
        self.write_document(key, expected, data, metadata)
    }

    fn delete_document(&self, key: &str, expected: Option<Etag>) -> Result<Option<Etag>, StoreError> {
        self.ensure_unlocked(key)?;
        self.remove_document(key, expected)
    }

    fn documents_after(&self, etag: Etag, take: usize) -> Result<Vec<JsonDocument>, StoreError> {
        let rows = self.etag_page(Table::DocumentEtags, Some(etag), Direction::Forward, take)?;
        self.load_documents(rows.into_iter().map(|(_, row)| row))
    }

    fn documents_by_reverse_update_order(&self, start: usize, take: usize) -> Result<Vec<JsonDocument>, StoreError> {
        let rows = self.etag_page(Table::DocumentEtags, None, Direction::Backward, start.saturating_add(take))?;
        self.load_documents(rows.into_iter().skip(start).map(|(_, row)| row))
    }

    fn document_count(&self) -> Result<u64, StoreError> {
        self.count(Table::Documents, &[])
    }
}
