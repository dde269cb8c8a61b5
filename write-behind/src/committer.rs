use crate::Message;
use async_trait::async_trait;
use std::collections::HashSet;

/// Natural keys of the messages a commit could not persist
pub type FailureSet<K> = HashSet<K>;

/// Applies a batch of messages to durable storage.
///
/// Implementations decide the granularity: item by item (one failure does not
/// affect the rest) or all-or-nothing (an error fails every key). They never retry;
/// redelivery by the broker is the retry mechanism.
#[async_trait]
pub trait BatchCommitter<T: Message>: Send + Sync {
    async fn commit(&self, batch: &[T]) -> FailureSet<T::Key>;
}

/// Failure set covering every message of the batch
pub fn all_failed<T: Message>(batch: &[T]) -> FailureSet<T::Key> {
    batch.iter().map(|message| message.natural_key()).collect()
}
