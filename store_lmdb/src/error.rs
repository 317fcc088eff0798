use quire_store::backend::codes;
use quire_store::{BackendFailure, FailureCode, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted record in '{table}': {reason}")]
    Corrupted { table: &'static str, reason: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid environment options: {0}")]
    Options(String),
}

impl LmdbError {
    /// The backend failure code this error surfaces as.
    pub fn code(&self) -> FailureCode {
        match self {
            LmdbError::Heed(heed::Error::Io(_)) | LmdbError::Io(_) => codes::DISK_IO,
            LmdbError::Heed(heed::Error::Mdb(heed::MdbError::MapFull)) => {
                codes::OUT_OF_DATABASE_SPACE
            }
            LmdbError::Corrupted { .. } => codes::RECORD_CORRUPTED,
            _ => codes::BACKEND_FAULT,
        }
    }
}

impl From<LmdbError> for BackendFailure {
    fn from(e: LmdbError) -> Self {
        BackendFailure::new(e.code(), e.to_string())
    }
}

impl From<LmdbError> for StoreError {
    fn from(e: LmdbError) -> Self {
        StoreError::Backend(e.into())
    }
}
