use crate::Message;
use crate::broker::{BrokerChannel, DeliveryTag};
use crate::command::QueuedCommand;
use crate::error::BrokerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A message used across the unit tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub key: String,
    pub text: String,
}

impl Note {
    pub(crate) fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            text: format!("note {key}"),
        }
    }
}

impl Message for Note {
    type Key = String;
    const KIND: &'static str = "note";

    fn natural_key(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Ack { tag: DeliveryTag, multiple: bool },
    Reject { tag: DeliveryTag, requeue: bool },
}

/// Channel that records every settlement call and can be told to fail some of them
#[derive(Default)]
pub(crate) struct RecordingChannel {
    id: u64,
    calls: Mutex<Vec<Settlement>>,
    failures_left: AtomicU32,
}

impl RecordingChannel {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            ..Default::default()
        })
    }

    /// Makes the next `count` settlement calls fail with an I/O error
    pub(crate) fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Settlement> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn acked_tags(&self) -> Vec<DeliveryTag> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Settlement::Ack { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn rejected_tags(&self) -> Vec<DeliveryTag> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Settlement::Reject { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Settlement) -> Result<(), BrokerError> {
        self.calls.lock().unwrap().push(call);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            Err(BrokerError::Io("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerChannel for RecordingChannel {
    fn id(&self) -> u64 {
        self.id
    }

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> Result<(), BrokerError> {
        self.record(Settlement::Ack { tag, multiple })
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        self.record(Settlement::Reject { tag, requeue })
    }
}

pub(crate) fn command(
    channel: &Arc<RecordingChannel>,
    tag: DeliveryTag,
    key: &str,
) -> QueuedCommand<Note> {
    QueuedCommand::new(tag, channel.clone(), Note::new(key))
}

pub(crate) fn setup_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
