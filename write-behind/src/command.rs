use crate::Message;
use crate::broker::{BrokerChannel, DeliveryTag, Publisher};
use crate::error::BrokerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One unit of buffered work: a decoded message plus the handle needed to settle it.
///
/// The command keeps the channel that delivered the message, since settlement is
/// only valid on that same channel.
pub struct QueuedCommand<T> {
    pub delivery_tag: DeliveryTag,
    pub channel: Arc<dyn BrokerChannel>,
    pub payload: T,
}

impl<T> QueuedCommand<T> {
    pub fn new(delivery_tag: DeliveryTag, channel: Arc<dyn BrokerChannel>, payload: T) -> Self {
        Self {
            delivery_tag,
            channel,
            payload,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueuedCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedCommand")
            .field("delivery_tag", &self.delivery_tag)
            .field("channel", &self.channel.id())
            .field("payload", &self.payload)
            .finish()
    }
}

/// Wire format of a broker message body: the message kind and its JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wraps a message in an envelope tagged with its kind
    pub fn wrap<T: Message>(message: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: T::KIND.to_string(),
            payload: serde_json::to_value(message)?,
        })
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Encodes a message into an envelope and publishes it to `queue`
pub async fn publish_message<T: Message>(
    publisher: &dyn Publisher,
    queue: &str,
    message: &T,
) -> Result<(), BrokerError> {
    let body = Envelope::wrap(message)?.to_bytes()?;
    publisher.publish(queue, body).await
}
