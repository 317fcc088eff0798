//! LMDB storage backend for Quire.
//!
//! Implements [`quire_store::StorageBackend`] using the `heed` LMDB bindings.
//! Each logical table maps to one named LMDB database within a single
//! environment; a private `_meta` database holds the schema version and the
//! last issued sequence number.

pub mod environment;
pub mod error;
pub mod integrity;
pub mod migration;
mod record;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
