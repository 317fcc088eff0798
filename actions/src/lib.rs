//! Per-transaction storage actions for Quire.
//!
//! [`TransactionalStorage`] opens a backend and begins transactions. Each
//! transaction is driven through a [`StorageActionsAccessor`], which exposes
//! the capability facets from `quire-store` over one shared
//! [`TransactionalContext`], runs commit callbacks exactly once after a
//! successful commit, and classifies backend failures as write conflicts
//! using configured failure codes.

pub mod accessor;
pub mod config;
pub mod context;
pub mod error;
pub mod notifier;
pub mod storage;

mod actions;
mod codec;
mod keys;

pub use accessor::StorageActionsAccessor;
pub use config::{BackendKind, StorageConfig};
pub use context::TransactionalContext;
pub use error::EngineError;
pub use notifier::{CommitNotifier, NotifierState, OnCommit};
pub use storage::TransactionalStorage;
