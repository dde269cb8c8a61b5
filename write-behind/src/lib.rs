//! `write-behind` buffers broker deliveries in memory and persists them in batches.
//!
//! A consumer hands every delivery to the [`CommandRegistry`], which routes it to the
//! [`WriteBehind`] pipeline responsible for the message kind. The pipeline keeps the
//! delivery in a bounded [`CommandQueue`] until the [`FlushDriver`] drains it, commits
//! the batch through a [`BatchCommitter`] and settles every delivery with the broker:
//! persisted messages are acknowledged, failed ones are rejected for redelivery.

pub mod broker;
pub mod command;
pub mod committer;
pub mod consumer;
pub mod error;
pub mod flusher;
pub mod local_broker;
pub mod pipeline;
pub mod queue;
pub mod reconciler;
pub mod registry;
mod stats;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::hash::Hash;

pub use broker::{BrokerChannel, Delivery, DeliverySource, DeliveryTag, Publisher};
pub use command::{Envelope, QueuedCommand, publish_message};
pub use committer::{BatchCommitter, FailureSet};
pub use consumer::Consumer;
pub use error::{BrokerError, DispatchError};
pub use flusher::FlushDriver;
pub use local_broker::{LocalBroker, LocalChannel, LocalSubscription};
pub use pipeline::{FlushReport, OverflowPolicy, PipelineOptions, WriteBehind};
pub use queue::CommandQueue;
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerOptions};
pub use registry::{CommandHandler, CommandRegistry, CommandRegistryBuilder};
pub use stats::StatsSnapshot;

/// A domain message that travels through the pipeline.
///
/// The natural key identifies the message for upserts and is how a committer reports
/// failures back, since a committer may reorder or partially apply a batch.
pub trait Message: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The natural key type
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// Kind code carried in the broker envelope and used for dispatch
    const KIND: &'static str;

    /// Returns the natural key of this message
    fn natural_key(&self) -> Self::Key;
}
