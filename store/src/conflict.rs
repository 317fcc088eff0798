//! Write-conflict classification.
//!
//! Conflicts under optimistic concurrency are expected and recoverable; every
//! other backend failure is a genuine fault. The set of codes that count as a
//! conflict is data supplied by the backend (and overridable by configuration)
//! so the same classifier serves any backend.

use std::collections::BTreeSet;
use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendFailure, FailureCode};
use crate::error::StoreError;

/// The failure codes a backend raises when a transaction loses a write race.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictCodes(BTreeSet<FailureCode>);

impl ConflictCodes {
    pub fn new(codes: impl IntoIterator<Item = FailureCode>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn contains(&self, code: FailureCode) -> bool {
        self.0.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FailureCode> + '_ {
        self.0.iter().copied()
    }

    /// See [`is_write_conflict`].
    pub fn is_write_conflict(&self, error: &(dyn Error + 'static)) -> bool {
        is_write_conflict(self, error)
    }
}

impl FromIterator<FailureCode> for ConflictCodes {
    fn from_iter<I: IntoIterator<Item = FailureCode>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Whether `error` is a backend failure whose code is in `codes`.
///
/// Recognizes a bare [`BackendFailure`] and one wrapped in
/// [`StoreError::Backend`]. Anything else is not a conflict.
pub fn is_write_conflict(codes: &ConflictCodes, error: &(dyn Error + 'static)) -> bool {
    if let Some(failure) = error.downcast_ref::<BackendFailure>() {
        return codes.contains(failure.code);
    }
    match error.downcast_ref::<StoreError>() {
        Some(StoreError::Backend(failure)) => codes.contains(failure.code),
        _ => false,
    }
}
