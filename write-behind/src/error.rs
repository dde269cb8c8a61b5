use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Channel {0} is closed")]
    ChannelClosed(u64),

    #[error("Unknown delivery tag {tag} on channel {channel}")]
    UnknownDeliveryTag { channel: u64, tag: u64 },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker I/O error: {0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No handler registered for kind '{0}'")]
    UnknownKind(String),
}
