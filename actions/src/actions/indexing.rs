use quire_store::{IndexStats, IndexingStore, StoreError, Table};
use quire_types::{Etag, Timestamp};

use crate::{keys, TransactionalContext};

impl TransactionalContext {
    fn update_index(&self, name: &str, update: impl FnOnce(&mut IndexStats)) -> Result<(), StoreError> {
        let mut stats = self.require_index(name)?;
        update(&mut stats);
        self.put_record(Table::IndexStats, keys::index(name), &stats)
    }
}

impl IndexingStore for TransactionalContext {
    fn add_index(&self, name: &str) -> Result<(), StoreError> {
        let key = keys::index(name);
        if self.get(Table::IndexStats, &key)?.is_some() {
            return Err(StoreError::Duplicate(format!("index '{}'", name)));
        }
        self.put_record(Table::IndexStats, key, &IndexStats::new(name))
    }

    /// Deleting an index that does not exist is a no-op.
    fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        self.delete(Table::IndexStats, keys::index(name))?;
        let results = self.remove_view_results(name)?;
        let mut tasks = 0usize;
        for (key, task) in self.pending_tasks()? {
            if keys::same_name(&task.index, name) {
                self.delete(Table::Tasks, key)?;
                tasks += 1;
            }
        }
        tracing::debug!(index = name, results, tasks, "index deleted");
        Ok(())
    }

    fn index_stats(&self) -> Result<Vec<IndexStats>, StoreError> {
        Ok(self
            .scan_records::<IndexStats>(Table::IndexStats, &[])?
            .into_iter()
            .map(|(_, stats)| stats)
            .collect())
    }

    fn update_last_indexed(&self, name: &str, etag: Etag, at: Timestamp) -> Result<(), StoreError> {
        self.update_index(name, |stats| {
            stats.last_indexed_etag = etag;
            stats.last_indexed_at = at;
        })
    }

    fn increment_indexing_attempt(&self, name: &str) -> Result<(), StoreError> {
        self.update_index(name, |stats| stats.attempts += 1)
    }

    fn increment_successful_indexing(&self, name: &str) -> Result<(), StoreError> {
        self.update_index(name, |stats| stats.successes += 1)
    }

    fn increment_indexing_failure(&self, name: &str) -> Result<(), StoreError> {
        self.update_index(name, |stats| stats.errors += 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use quire_store::{MappedResultStore, Task, TaskKind, TaskStore};

    #[test]
    fn duplicate_index_is_rejected() {
        let (_, ctx) = context();
        ctx.add_index("users").unwrap();
        assert!(matches!(ctx.add_index("Users"), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn counters_accumulate() {
        let (_, ctx) = context();
        ctx.add_index("users").unwrap();
        ctx.increment_indexing_attempt("users").unwrap();
        ctx.increment_indexing_attempt("users").unwrap();
        ctx.increment_successful_indexing("users").unwrap();
        ctx.increment_indexing_failure("users").unwrap();
        let stats = &ctx.index_stats().unwrap()[0];
        assert_eq!((stats.attempts, stats.successes, stats.errors), (2, 1, 1));
        assert!(matches!(
            ctx.increment_indexing_attempt("missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_drops_results_and_tasks() {
        let (_, ctx) = context();
        ctx.add_index("users").unwrap();
        ctx.add_index("orders").unwrap();
        ctx.put_mapped_result("users", "users/1", "k", b"1").unwrap();
        ctx.add_task(Task {
            index: "users".into(),
            kind: TaskKind::RemoveFromIndex { keys: vec!["users/1".into()] },
            added_at: Timestamp::new(1),
        })
        .unwrap();

        ctx.delete_index("users").unwrap();
        assert_eq!(ctx.index_stats().unwrap().len(), 1);
        assert!(ctx.mapped_results("users", "k").unwrap().is_empty());
        assert!(!ctx.has_tasks().unwrap());
        ctx.delete_index("users").unwrap();
    }
}
