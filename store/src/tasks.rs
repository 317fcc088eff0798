//! Background task facet.

use quire_types::{TaskId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// What a deferred task asks an index to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Remove entries produced by these documents.
    RemoveFromIndex { keys: Vec<String> },
    /// Re-index documents that reference these keys.
    TouchReferencing { keys: Vec<String> },
}

impl TaskKind {
    pub fn keys(&self) -> &[String] {
        match self {
            TaskKind::RemoveFromIndex { keys } | TaskKind::TouchReferencing { keys } => keys,
        }
    }

    /// Whether two tasks can be folded into one.
    pub fn same_kind(&self, other: &TaskKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Fold `other`'s keys into `self`, skipping duplicates.
    pub fn merge(&mut self, other: TaskKind) {
        let incoming = match other {
            TaskKind::RemoveFromIndex { keys } | TaskKind::TouchReferencing { keys } => keys,
        };
        let keys = match self {
            TaskKind::RemoveFromIndex { keys } | TaskKind::TouchReferencing { keys } => keys,
        };
        for key in incoming {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub index: String,
    pub kind: TaskKind,
    pub added_at: Timestamp,
}

/// Trait for deferred work queued by writers and claimed by background workers.
pub trait TaskStore {
    fn add_task(&self, task: Task) -> Result<TaskId, StoreError>;

    fn has_tasks(&self) -> Result<bool, StoreError>;

    fn approximate_task_count(&self) -> Result<u64, StoreError>;

    /// Claim the oldest task, merging every other pending task for the same
    /// index and of the same kind into it. All claimed tasks are removed.
    fn claim_merged_task(&self) -> Result<Option<Task>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_skips_duplicate_keys() {
        let mut kind = TaskKind::RemoveFromIndex {
            keys: vec!["a".into(), "b".into()],
        };
        kind.merge(TaskKind::RemoveFromIndex {
            keys: vec!["b".into(), "c".into()],
        });
        assert_eq!(kind.keys(), ["a", "b", "c"]);
    }

    #[test]
    fn kinds_compare_by_variant_only() {
        let remove = TaskKind::RemoveFromIndex { keys: vec!["a".into()] };
        let touch = TaskKind::TouchReferencing { keys: vec!["a".into()] };
        assert!(remove.same_kind(&TaskKind::RemoveFromIndex { keys: vec![] }));
        assert!(!remove.same_kind(&touch));
    }
}
