//! Broker seams used by the pipeline.
//!
//! A delivery handle is only valid on the channel that produced it, so every
//! [`Delivery`] carries the channel it came from and the pipeline settles it there.

use crate::error::BrokerError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Broker-assigned handle identifying one delivery on one channel
pub type DeliveryTag = u64;

/// A broker channel that can settle deliveries it produced
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Identifier of the channel (for logging)
    fn id(&self) -> u64;

    /// Acknowledges a delivery. With `multiple`, every unacknowledged delivery up to
    /// and including `tag` on this channel is acknowledged as well.
    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BrokerError>;

    /// Rejects a delivery, optionally making it eligible for redelivery
    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;
}

/// Source of delivery batches for a consumer
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// Waits until at least one delivery is available and returns up to `max` of them
    async fn next_batch(&self, max: usize) -> Result<Vec<Delivery>, BrokerError>;
}

/// Publishes raw message bodies to a named queue
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;
}

/// A message delivered by the broker, still awaiting settlement
#[derive(Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub channel: Arc<dyn BrokerChannel>,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("channel", &self.channel.id())
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
