use quire_store::{Direction, StoreError, Table, Task, TaskStore};
use quire_types::TaskId;

use crate::{keys, TransactionalContext};

impl TransactionalContext {
    /// Pending tasks, oldest first.
    pub(crate) fn pending_tasks(&self) -> Result<Vec<(Vec<u8>, Task)>, StoreError> {
        self.scan_records(Table::Tasks, &[])
    }
}

impl TaskStore for TransactionalContext {
    fn add_task(&self, task: Task) -> Result<TaskId, StoreError> {
        let id = TaskId::new(self.next_sequence()?);
        self.put_record(Table::Tasks, keys::task(id), &task)?;
        Ok(id)
    }

    fn has_tasks(&self) -> Result<bool, StoreError> {
        Ok(!self.scan_page(Table::Tasks, None, Direction::Forward, 1)?.is_empty())
    }

    fn approximate_task_count(&self) -> Result<u64, StoreError> {
        self.count(Table::Tasks, &[])
    }

    fn claim_merged_task(&self) -> Result<Option<Task>, StoreError> {
        let mut pending = self.pending_tasks()?.into_iter();
        let Some((key, mut claimed)) = pending.next() else {
            return Ok(None);
        };
        self.delete(Table::Tasks, key)?;
        let mut merged = 0usize;
        for (key, task) in pending {
            if keys::same_name(&task.index, &claimed.index) && task.kind.same_kind(&claimed.kind) {
                claimed.kind.merge(task.kind);
                self.delete(Table::Tasks, key)?;
                merged += 1;
            }
        }
        tracing::trace!(index = %claimed.index, merged, "claimed task");
        Ok(Some(claimed))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use quire_store::TaskKind;
    use quire_types::Timestamp;

    fn remove(index: &str, keys: &[&str]) -> Task {
        Task {
            index: index.to_string(),
            kind: TaskKind::RemoveFromIndex {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
            added_at: Timestamp::new(1),
        }
    }

    #[test]
    fn claim_merges_same_index_and_kind() {
        let (_, ctx) = context();
        ctx.add_task(remove("users", &["a"])).unwrap();
        ctx.add_task(remove("orders", &["x"])).unwrap();
        ctx.add_task(remove("Users", &["b", "a"])).unwrap();
        ctx.add_task(Task {
            index: "users".into(),
            kind: TaskKind::TouchReferencing { keys: vec!["c".into()] },
            added_at: Timestamp::new(2),
        })
        .unwrap();
        assert_eq!(ctx.approximate_task_count().unwrap(), 4);

        let claimed = ctx.claim_merged_task().unwrap().unwrap();
        assert_eq!(claimed.index, "users");
        assert_eq!(claimed.kind.keys(), ["a", "b"]);
        assert_eq!(ctx.approximate_task_count().unwrap(), 2);

        let next = ctx.claim_merged_task().unwrap().unwrap();
        assert_eq!(next.index, "orders");
    }

    #[test]
    fn empty_queue_claims_nothing() {
        let (_, ctx) = context();
        assert!(!ctx.has_tasks().unwrap());
        assert_eq!(ctx.claim_merged_task().unwrap(), None);
    }
}
