//! In-process broker with AMQP-style settlement semantics.
//!
//! Queues hold message bodies; a [`LocalChannel`] fetches from queues and numbers its
//! deliveries with its own tag sequence. Deliveries stay unacknowledged on the channel
//! until they are acked, rejected, or the channel is closed, which returns every
//! unacknowledged delivery to the front of its queue. A channel's prefetch limit caps
//! how many deliveries it holds unacknowledged at once.

use crate::broker::{BrokerChannel, Delivery, DeliverySource, DeliveryTag, Publisher};
use crate::error::BrokerError;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    queues: Mutex<HashMap<String, QueueState>>,
    next_channel_id: AtomicU64,
}

/// Cheaply cloneable handle to an in-process broker
#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    inner: Arc<BrokerInner>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new channel with its own delivery tag sequence
    pub fn open_channel(&self) -> Arc<LocalChannel> {
        let id = self.inner.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(LocalChannel {
            id,
            broker: self.clone(),
            state: Mutex::new(ChannelState {
                next_tag: 1,
                prefetch: 0,
                unacked: BTreeMap::new(),
                closed: false,
            }),
            settled: Notify::new(),
        })
    }

    /// Opens a channel with the given prefetch limit and subscribes it to `queue`
    pub fn subscribe(&self, queue: &str, prefetch: usize) -> LocalSubscription {
        let channel = self.open_channel();
        channel.set_prefetch(prefetch);
        LocalSubscription {
            channel,
            queue: queue.to_string(),
        }
    }

    /// Number of messages waiting for delivery on `queue`
    pub fn ready_count(&self, queue: &str) -> usize {
        self.lock_queues()
            .get(queue)
            .map_or(0, |state| state.ready.len())
    }

    fn push_back(&self, queue: &str, message: StoredMessage) {
        let mut queues = self.lock_queues();
        let state = queues.entry(queue.to_string()).or_default();
        state.ready.push_back(message);
        state.notify.notify_waiters();
    }

    fn push_front(&self, queue: &str, messages: Vec<StoredMessage>) {
        let mut queues = self.lock_queues();
        let state = queues.entry(queue.to_string()).or_default();
        for message in messages.into_iter().rev() {
            state.ready.push_front(message);
        }
        state.notify.notify_waiters();
    }

    fn pop(&self, queue: &str, max: usize) -> Vec<StoredMessage> {
        let mut queues = self.lock_queues();
        match queues.get_mut(queue) {
            Some(state) => {
                let count = max.min(state.ready.len());
                state.ready.drain(..count).collect()
            }
            None => Vec::new(),
        }
    }

    fn notifier(&self, queue: &str) -> Arc<Notify> {
        self.lock_queues()
            .entry(queue.to_string())
            .or_default()
            .notify
            .clone()
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Publisher for LocalBroker {
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.push_back(
            queue,
            StoredMessage {
                body,
                redelivered: false,
            },
        );
        Ok(())
    }
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    message: StoredMessage,
}

#[derive(Debug)]
struct ChannelState {
    next_tag: DeliveryTag,
    /// Maximum number of unacknowledged deliveries, 0 for no limit
    prefetch: usize,
    unacked: BTreeMap<DeliveryTag, Unacked>,
    closed: bool,
}

#[derive(Debug)]
pub struct LocalChannel {
    id: u64,
    broker: LocalBroker,
    state: Mutex<ChannelState>,
    /// Signalled whenever deliveries leave the unacknowledged window
    settled: Notify,
}

impl LocalChannel {
    /// Limits the number of unacknowledged deliveries on this channel (0 lifts the limit)
    pub fn set_prefetch(&self, prefetch: usize) {
        self.lock_state().prefetch = prefetch;
        self.settled.notify_waiters();
    }

    /// Takes up to `max` messages from `queue` without waiting, never exceeding the
    /// prefetch limit
    pub fn fetch(self: &Arc<Self>, queue: &str, max: usize) -> Result<Vec<Delivery>, BrokerError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(BrokerError::ChannelClosed(self.id));
        }

        let window = if state.prefetch == 0 {
            max
        } else {
            max.min(state.prefetch.saturating_sub(state.unacked.len()))
        };
        if window == 0 {
            return Ok(Vec::new());
        }
        let messages = self.broker.pop(queue, window);
        let channel: Arc<dyn BrokerChannel> = self.clone();
        let deliveries = messages
            .into_iter()
            .map(|message| {
                let tag = state.next_tag;
                state.next_tag += 1;
                let delivery = Delivery {
                    tag,
                    channel: channel.clone(),
                    body: message.body.clone(),
                    redelivered: message.redelivered,
                };
                state.unacked.insert(
                    tag,
                    Unacked {
                        queue: queue.to_string(),
                        message,
                    },
                );
                delivery
            })
            .collect();
        Ok(deliveries)
    }

    /// Closes the channel; every unacknowledged delivery goes back to its queue
    pub fn close(&self) {
        let unacked = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.unacked)
        };
        self.settled.notify_waiters();

        let mut by_queue: HashMap<String, Vec<StoredMessage>> = HashMap::new();
        for (_, entry) in unacked {
            let mut message = entry.message;
            message.redelivered = true;
            by_queue.entry(entry.queue).or_default().push(message);
        }
        for (queue, messages) in by_queue {
            debug!(
                "Channel {} closed, returning {} deliveries to '{}'",
                self.id,
                messages.len(),
                queue
            );
            self.broker.push_front(&queue, messages);
        }
    }

    /// Number of deliveries on this channel awaiting settlement
    pub fn unacked_count(&self) -> usize {
        self.lock_state().unacked.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BrokerChannel for LocalChannel {
    fn id(&self) -> u64 {
        self.id
    }

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BrokerError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(BrokerError::ChannelClosed(self.id));
        }
        if !state.unacked.contains_key(&tag) {
            return Err(BrokerError::UnknownDeliveryTag {
                channel: self.id,
                tag,
            });
        }

        if multiple {
            // keep everything after `tag`, settle the rest
            let remaining = state.unacked.split_off(&(tag + 1));
            state.unacked = remaining;
        } else {
            state.unacked.remove(&tag);
        }
        drop(state);
        self.settled.notify_waiters();
        Ok(())
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        let entry = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(BrokerError::ChannelClosed(self.id));
            }
            state
                .unacked
                .remove(&tag)
                .ok_or(BrokerError::UnknownDeliveryTag {
                    channel: self.id,
                    tag,
                })?
        };
        self.settled.notify_waiters();

        if requeue {
            let mut message = entry.message;
            message.redelivered = true;
            self.broker.push_front(&entry.queue, vec![message]);
        }
        Ok(())
    }
}

/// A channel bound to one queue, usable as a consumer's delivery source
#[derive(Debug, Clone)]
pub struct LocalSubscription {
    channel: Arc<LocalChannel>,
    queue: String,
}

impl LocalSubscription {
    pub fn channel(&self) -> &Arc<LocalChannel> {
        &self.channel
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl DeliverySource for LocalSubscription {
    async fn next_batch(&self, max: usize) -> Result<Vec<Delivery>, BrokerError> {
        let notify = self.channel.broker.notifier(&self.queue);
        loop {
            // register interest before looking, so a publish or settlement in between
            // is not missed
            let published = notify.notified();
            let settled = self.channel.settled.notified();
            let batch = self.channel.fetch(&self.queue, max)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            tokio::select! {
                _ = published => {}
                _ = settled => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn publish_all(broker: &LocalBroker, queue: &str, count: usize) {
        for i in 0..count {
            broker
                .publish(queue, format!("m{i}").into_bytes())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fetch_assigns_increasing_tags_per_channel() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 3).await;
        let channel = broker.open_channel();

        let deliveries = channel.fetch("q", 10).unwrap();

        let tags: Vec<_> = deliveries.iter().map(|d| d.tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(deliveries[0].body, b"m0");
        assert_eq!(channel.unacked_count(), 3);
        assert_eq!(broker.ready_count("q"), 0);
    }

    #[tokio::test]
    async fn test_cumulative_ack_settles_earlier_deliveries() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 4).await;
        let channel = broker.open_channel();
        channel.fetch("q", 4).unwrap();

        channel.ack(3, true).await.unwrap();
        assert_eq!(channel.unacked_count(), 1);

        // nothing but delivery 4 comes back when the channel goes away
        channel.close();
        let again = broker.open_channel().fetch("q", 10).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].body, b"m3");
        assert!(again[0].redelivered);
    }

    #[tokio::test]
    async fn test_reject_with_requeue_redelivers_first() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 2).await;
        let channel = broker.open_channel();
        let first = channel.fetch("q", 1).unwrap();

        channel.reject(first[0].tag, true).await.unwrap();

        let next = channel.fetch("q", 1).unwrap();
        assert_eq!(next[0].body, b"m0");
        assert!(next[0].redelivered);
        assert_eq!(next[0].tag, 2);
    }

    #[tokio::test]
    async fn test_reject_without_requeue_discards() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 1).await;
        let channel = broker.open_channel();
        channel.fetch("q", 1).unwrap();

        channel.reject(1, false).await.unwrap();

        assert_eq!(broker.ready_count("q"), 0);
        assert_eq!(channel.unacked_count(), 0);
    }

    #[tokio::test]
    async fn test_settling_on_closed_channel_fails() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 1).await;
        let channel = broker.open_channel();
        channel.fetch("q", 1).unwrap();
        channel.close();

        assert!(matches!(
            channel.ack(1, false).await,
            Err(BrokerError::ChannelClosed(_))
        ));
        assert_eq!(broker.ready_count("q"), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_an_error() {
        let broker = LocalBroker::new();
        let channel = broker.open_channel();

        assert!(matches!(
            channel.ack(42, true).await,
            Err(BrokerError::UnknownDeliveryTag { tag: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_subscription_waits_for_publish() {
        let broker = LocalBroker::new();
        let subscription = broker.subscribe("q", 0);

        let waiter = tokio::spawn({
            let subscription = subscription.clone();
            async move { subscription.next_batch(10).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        publish_all(&broker, "q", 2).await;

        let batch = waiter.await.unwrap().unwrap();
        assert!(!batch.is_empty());
    }

    #[tokio::test]
    async fn test_prefetch_caps_unacknowledged_deliveries() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 5).await;
        let channel = broker.open_channel();
        channel.set_prefetch(3);

        assert_eq!(channel.fetch("q", 10).unwrap().len(), 3);
        assert!(channel.fetch("q", 10).unwrap().is_empty());

        channel.ack(2, true).await.unwrap();
        let next = channel.fetch("q", 10).unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(channel.unacked_count(), 3);
        assert_eq!(broker.ready_count("q"), 0);
    }

    #[tokio::test]
    async fn test_full_subscription_waits_for_settlement() {
        let broker = LocalBroker::new();
        publish_all(&broker, "q", 3).await;
        let subscription = broker.subscribe("q", 2);
        let first = subscription.next_batch(10).await.unwrap();
        assert_eq!(first.len(), 2);

        let waiter = tokio::spawn({
            let subscription = subscription.clone();
            async move { subscription.next_batch(10).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        subscription.channel().ack(first[1].tag, true).await.unwrap();

        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, b"m2");
    }
}
