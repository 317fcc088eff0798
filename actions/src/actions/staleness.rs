use quire_store::{Direction, IndexStats, StalenessStore, StoreError, Table};
use quire_types::{Etag, Timestamp};

use crate::{keys, TransactionalContext};

impl TransactionalContext {
    pub(crate) fn require_index(&self, index: &str) -> Result<IndexStats, StoreError> {
        self.get_record::<IndexStats>(Table::IndexStats, &keys::index(index))?
            .ok_or_else(|| StoreError::NotFound(format!("index '{}'", index)))
    }

    fn last_etag(&self, table: Table) -> Result<Etag, StoreError> {
        Ok(self
            .etag_page(table, None, Direction::Backward, 1)?
            .first()
            .map_or(Etag::ZERO, |(etag, _)| *etag))
    }
}

impl StalenessStore for TransactionalContext {
    fn is_index_stale(&self, index: &str, cutoff: Option<Timestamp>) -> Result<bool, StoreError> {
        let stats = self.require_index(index)?;
        let has_work = self
            .pending_tasks()?
            .iter()
            .any(|(_, task)| keys::same_name(&task.index, index));
        if has_work {
            return Ok(true);
        }
        if stats.last_indexed_etag >= self.most_recent_document_etag()? {
            return Ok(false);
        }
        Ok(match cutoff {
            Some(cutoff) => stats.last_indexed_at <= cutoff,
            None => true,
        })
    }

    fn index_last_updated_at(&self, index: &str) -> Result<(Timestamp, Etag), StoreError> {
        let stats = self.require_index(index)?;
        Ok((stats.last_indexed_at, stats.last_indexed_etag))
    }

    fn most_recent_document_etag(&self) -> Result<Etag, StoreError> {
        self.last_etag(Table::DocumentEtags)
    }

    fn most_recent_attachment_etag(&self) -> Result<Etag, StoreError> {
        self.last_etag(Table::AttachmentEtags)
    }
}
