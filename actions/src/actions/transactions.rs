use std::collections::BTreeSet;

use quire_store::{Metadata, StagedChange, StagedWrite, StoreError, Table, TransactionStore};
use quire_types::Etag;

use super::check_etag;
use crate::{keys, TransactionalContext};

impl TransactionalContext {
    fn stage(&self, transaction_id: &str, key: &str, expected: Option<Etag>, write: StagedWrite) -> Result<Etag, StoreError> {
        if let Some(holder) = self.lock_holder(key)? {
            if holder != transaction_id {
                return Err(StoreError::DocumentLocked {
                    key: key.to_string(),
                    transaction: holder,
                });
            }
        }
        check_etag(key, expected, self.current_etag(key)?)?;
        // a plain write to the document committed meanwhile must fail this commit
        self.touch(Table::Documents, keys::document(key))?;
        self.put_record(Table::DocumentLocks, keys::document_lock(key), &transaction_id.to_string())?;

        let etag = self.next_etag()?;
        let change = StagedChange {
            transaction_id: transaction_id.to_string(),
            key: key.to_string(),
            expected,
            etag,
            write,
        };
        self.put_record(Table::StagedDocuments, keys::staged_document(key, transaction_id), &change)?;
        Ok(etag)
    }

    fn release(&self, row: Vec<u8>, change: &StagedChange) -> Result<(), StoreError> {
        self.delete(Table::StagedDocuments, row)?;
        self.delete(Table::DocumentLocks, keys::document_lock(&change.key))
    }

    fn staged_changes(&self) -> Result<Vec<(Vec<u8>, StagedChange)>, StoreError> {
        self.scan_records(Table::StagedDocuments, &[])
    }
}

impl TransactionStore for TransactionalContext {
    fn add_document_in_transaction(
        &self,
        transaction_id: &str,
        key: &str,
        expected: Option<Etag>,
        data: &[u8],
        metadata: &Metadata,
    ) -> Result<Etag, StoreError> {
        let write = StagedWrite::Put {
            data: data.to_vec(),
            metadata: metadata.clone(),
        };
        self.stage(transaction_id, key, expected, write)
    }

    fn delete_document_in_transaction(
        &self,
        transaction_id: &str,
        key: &str,
        expected: Option<Etag>,
    ) -> Result<bool, StoreError> {
        if self.document_exists(key)? {
            self.stage(transaction_id, key, expected, StagedWrite::Delete)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Staged changes were checked against their expected etags when staged,
    /// and the lock kept other writers away since, so they apply unchecked.
    /// Each document keeps the etag its staging returned.
    fn complete_transaction(&self, transaction_id: &str) -> Result<Vec<String>, StoreError> {
        let mut modified = Vec::new();
        for (row, change) in self.staged_changes()? {
            if change.transaction_id != transaction_id {
                continue;
            }
            self.release(row, &change)?;
            match change.write {
                StagedWrite::Put { data, metadata } => {
                    let previous = self.current_etag(&change.key)?;
                    self.write_document_with_etag(&change.key, previous, change.etag, &data, &metadata)?;
                }
                StagedWrite::Delete => {
                    self.remove_document(&change.key, None)?;
                }
            }
            modified.push(change.key);
        }
        tracing::debug!(transaction_id, documents = modified.len(), "staged transaction completed");
        Ok(modified)
    }

    fn rollback_transaction(&self, transaction_id: &str) -> Result<(), StoreError> {
        for (row, change) in self.staged_changes()? {
            if change.transaction_id == transaction_id {
                self.release(row, &change)?;
            }
        }
        Ok(())
    }

    fn transaction_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids: BTreeSet<String> = self
            .staged_changes()?
            .into_iter()
            .map(|(_, change)| change.transaction_id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use quire_store::{DocumentStore, StalenessStore};

    #[test]
    fn staged_writes_apply_on_complete() {
        let (_, ctx) = context();
        ctx.add_document("old", None, b"gone soon", &Metadata::new()).unwrap();
        ctx.add_document_in_transaction("dtc", "new", None, b"hello", &Metadata::new()).unwrap();
        assert!(ctx.delete_document_in_transaction("dtc", "old", None).unwrap());
        assert!(ctx.document_by_key("new").unwrap().is_none());
        assert_eq!(ctx.transaction_ids().unwrap(), ["dtc"]);

        let mut modified = ctx.complete_transaction("dtc").unwrap();
        modified.sort();
        assert_eq!(modified, ["new", "old"]);
        assert_eq!(ctx.document_by_key("new").unwrap().unwrap().data, b"hello");
        assert!(ctx.document_by_key("old").unwrap().is_none());
        assert!(ctx.transaction_ids().unwrap().is_empty());
        ctx.add_document("new", None, b"unlocked", &Metadata::new()).unwrap();
    }

    #[test]
    fn rollback_discards_and_unlocks() {
        let (_, ctx) = context();
        ctx.add_document_in_transaction("dtc", "a", None, b"x", &Metadata::new()).unwrap();
        ctx.rollback_transaction("dtc").unwrap();
        assert!(ctx.transaction_ids().unwrap().is_empty());
        assert!(ctx.add_document("a", None, b"y", &Metadata::new()).unwrap().created);
    }

    #[test]
    fn other_transactions_cannot_stage_locked_documents() {
        let (_, ctx) = context();
        ctx.add_document_in_transaction("t1", "a", None, b"x", &Metadata::new()).unwrap();
        ctx.add_document_in_transaction("t1", "a", None, b"x2", &Metadata::new()).unwrap();
        let err = ctx.add_document_in_transaction("t2", "a", None, b"y", &Metadata::new()).unwrap_err();
        assert!(matches!(err, StoreError::DocumentLocked { transaction, .. } if transaction == "t1"));
    }

    #[test]
    fn completed_document_keeps_the_staged_etag() {
        let (_, ctx) = context();
        let staged = ctx.add_document_in_transaction("dtc", "d", None, b"v1", &Metadata::new()).unwrap();
        ctx.complete_transaction("dtc").unwrap();
        let document = ctx.document_by_key("d").unwrap().unwrap();
        assert_eq!(document.etag, staged);
        assert_eq!(ctx.most_recent_document_etag().unwrap(), staged);

        let replaced = ctx.add_document("d", Some(staged), b"v2", &Metadata::new()).unwrap();
        assert!(!replaced.created);
        assert_eq!(ctx.documents_after(Etag::ZERO, 10).unwrap().len(), 1);
    }

    #[test]
    fn staging_checks_etags() {
        let (_, ctx) = context();
        let etag = ctx.add_document("a", None, b"", &Metadata::new()).unwrap().etag;
        let stale = Etag::new(etag.value() + 100);
        assert!(matches!(
            ctx.add_document_in_transaction("t", "a", Some(stale), b"", &Metadata::new()),
            Err(StoreError::ConcurrencyViolation { .. })
        ));
        assert!(!ctx.delete_document_in_transaction("t", "missing", None).unwrap());
    }
}
