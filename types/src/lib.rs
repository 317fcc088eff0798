//! Fundamental types for the Quire storage engine.
//!
//! This crate defines the small value types shared across every other crate in
//! the workspace: change tags, timestamps, the clock abstraction, and the
//! identifiers handed out by the storage backend.

pub mod etag;
pub mod id;
pub mod time;

pub use etag::Etag;
pub use id::{MessageId, TaskId, TransactionId};
pub use time::{Clock, SystemClock, Timestamp};
