//! Capability facets and the backend contract for the Quire storage engine.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`StorageBackend`]. The per-transaction accessor exposes one context through
//! the narrow facet traits defined here; the rest of the engine depends only on
//! the traits.

pub mod attachment;
pub mod backend;
pub mod conflict;
pub mod document;
pub mod error;
pub mod general;
pub mod indexing;
pub mod mapped_results;
pub mod queue;
pub mod staleness;
pub mod tasks;
pub mod transaction;

pub use attachment::{Attachment, AttachmentStore};
pub use backend::{
    BackendFailure, CommitBatch, Direction, FailureCode, Mutation, StorageBackend, Table, Version,
    Versioned,
};
pub use conflict::{is_write_conflict, ConflictCodes};
pub use document::{AddDocumentResult, DocumentStore, JsonDocument, Metadata};
pub use error::{ContextState, StoreError};
pub use general::GeneralStore;
pub use indexing::{IndexStats, IndexingStore};
pub use mapped_results::{MappedResult, MappedResultStore};
pub use queue::{QueueStore, QueuedMessage, MAX_READ_COUNT};
pub use staleness::StalenessStore;
pub use tasks::{Task, TaskKind, TaskStore};
pub use transaction::{StagedChange, StagedWrite, TransactionStore};
