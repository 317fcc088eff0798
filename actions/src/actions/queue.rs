use quire_store::{QueueStore, QueuedMessage, StoreError, Table, MAX_READ_COUNT};
use quire_types::MessageId;

use crate::{keys, TransactionalContext};

impl QueueStore for TransactionalContext {
    fn enqueue(&self, queue: &str, data: &[u8]) -> Result<MessageId, StoreError> {
        let id = MessageId::new(self.next_sequence()?);
        let message = QueuedMessage {
            id,
            queue: queue.to_string(),
            data: data.to_vec(),
            enqueued_at: self.now(),
            read_count: 0,
        };
        self.put_record(Table::Queues, keys::queue_message(queue, id), &message)?;
        Ok(id)
    }

    /// Messages that were already handed out `MAX_READ_COUNT` times are
    /// treated as poison and removed instead of being returned again.
    fn peek(&self, queue: &str) -> Result<Vec<QueuedMessage>, StoreError> {
        let mut visible = Vec::new();
        for (key, mut message) in self.scan_records::<QueuedMessage>(Table::Queues, &keys::prefix(queue))? {
            if message.read_count >= MAX_READ_COUNT {
                tracing::debug!(queue, id = %message.id, "dropping message read too many times");
                self.delete(Table::Queues, key)?;
                continue;
            }
            message.read_count += 1;
            self.put_record(Table::Queues, key, &message)?;
            visible.push(message);
        }
        Ok(visible)
    }

    fn delete_from_queue(&self, queue: &str, id: MessageId) -> Result<bool, StoreError> {
        let key = keys::queue_message(queue, id);
        if self.get(Table::Queues, &key)?.is_none() {
            return Ok(false);
        }
        self.delete(Table::Queues, key)?;
        Ok(true)
    }
}
