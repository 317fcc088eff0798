use std::fmt;

use quire_types::{Etag, TransactionId};
use thiserror::Error;

use crate::backend::BackendFailure;

/// Lifecycle of one transactional context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Active,
    Committed,
    RolledBack,
}

impl ContextState {
    pub fn is_active(&self) -> bool {
        matches!(self, ContextState::Active)
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextState::Active => "active",
            ContextState::Committed => "committed",
            ContextState::RolledBack => "rolled back",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] BackendFailure),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("{transaction} is already {state}; its accessor cannot be used any more")]
    StaleContext {
        transaction: TransactionId,
        state: ContextState,
    },

    #[error("etag mismatch on '{key}': expected {expected}, found {actual:?}")]
    ConcurrencyViolation {
        key: String,
        expected: Etag,
        actual: Option<Etag>,
    },

    #[error("document '{key}' is locked by transaction '{transaction}'")]
    DocumentLocked { key: String, transaction: String },
}
