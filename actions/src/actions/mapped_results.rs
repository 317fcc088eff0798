use std::collections::BTreeSet;

use quire_store::{MappedResult, MappedResultStore, StoreError, Table};
use quire_types::Etag;

use crate::{keys, TransactionalContext};

impl TransactionalContext {
    pub(crate) fn remove_view_results(&self, view: &str) -> Result<u64, StoreError> {
        let rows = self.scan(Table::MappedResults, &keys::prefix(view))?;
        let removed = rows.len() as u64;
        for (key, _) in rows {
            self.delete(Table::MappedResults, key)?;
        }
        Ok(removed)
    }
}

impl MappedResultStore for TransactionalContext {
    fn put_mapped_result(
        &self,
        view: &str,
        document_key: &str,
        reduce_key: &str,
        data: &[u8],
    ) -> Result<Etag, StoreError> {
        let etag = self.next_etag()?;
        let result = MappedResult {
            view: view.to_string(),
            document_key: document_key.to_string(),
            reduce_key: reduce_key.to_string(),
            etag,
            data: data.to_vec(),
        };
        self.put_record(Table::MappedResults, keys::mapped_result(view, reduce_key, etag), &result)?;
        Ok(etag)
    }

    fn mapped_results(&self, view: &str, reduce_key: &str) -> Result<Vec<MappedResult>, StoreError> {
        Ok(self
            .scan_records::<MappedResult>(Table::MappedResults, &keys::mapped_result_prefix(view, reduce_key))?
            .into_iter()
            .map(|(_, result)| result)
            .collect())
    }

    fn delete_mapped_results_for_document(&self, view: &str, document_key: &str) -> Result<Vec<String>, StoreError> {
        let mut reduce_keys = BTreeSet::new();
        for (key, result) in self.scan_records::<MappedResult>(Table::MappedResults, &keys::prefix(view))? {
            if keys::same_name(&result.document_key, document_key) {
                self.delete(Table::MappedResults, key)?;
                reduce_keys.insert(result.reduce_key);
            }
        }
        Ok(reduce_keys.into_iter().collect())
    }

    fn delete_mapped_results_for_view(&self, view: &str) -> Result<u64, StoreError> {
        self.remove_view_results(view)
    }
}
