//! Durable message queue facet.

use quire_types::{MessageId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Messages peeked more than this many times are considered poison and dropped.
pub const MAX_READ_COUNT: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub queue: String,
    pub data: Vec<u8>,
    pub enqueued_at: Timestamp,
    /// How many times the message has been handed out by [`QueueStore::peek`].
    pub read_count: u32,
}

/// Trait for the durable message backlog.
///
/// Queue names are case-insensitive. Messages are delivered in enqueue order
/// and stay in the queue until explicitly deleted.
pub trait QueueStore {
    fn enqueue(&self, queue: &str, data: &[u8]) -> Result<MessageId, StoreError>;

    /// Hand out every message in `queue`, bumping its read count.
    ///
    /// A message that has already been read [`MAX_READ_COUNT`] times is removed
    /// instead of being returned again.
    fn peek(&self, queue: &str) -> Result<Vec<QueuedMessage>, StoreError>;

    /// Returns `false` if no such message exists.
    fn delete_from_queue(&self, queue: &str, id: MessageId) -> Result<bool, StoreError>;
}
