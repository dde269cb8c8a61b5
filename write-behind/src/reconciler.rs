use crate::Message;
use crate::broker::{BrokerChannel, DeliveryTag};
use crate::command::QueuedCommand;
use crate::committer::FailureSet;
use crate::error::BrokerError;
use log::{debug, error, warn};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Acknowledge cumulatively (every earlier unacknowledged delivery on the same
    /// channel is acknowledged too). Only safe when a channel feeds a single queue.
    pub cumulative_ack: bool,
    /// Extra attempts for an ack/reject call that failed (default: 0)
    pub settle_retries: u32,
    /// Pause between settle attempts
    pub retry_backoff: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            cumulative_ack: true,
            settle_retries: 0,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Outcome of settling one batch with the broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub acked: usize,
    pub rejected: usize,
    pub settle_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Ack,
    RejectAndRequeue,
}

/// Maps commit outcomes back to broker deliveries.
///
/// Every command of the batch is settled in order: persisted messages are
/// acknowledged, failed ones are rejected with requeue so the broker redelivers
/// them. A failed ack/reject is logged and never interrupts the batch; the command
/// is consumed either way and the delivery then depends on the broker redelivering
/// it after the connection drops.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    opt: ReconcilerOptions,
}

impl Reconciler {
    pub fn new(opt: ReconcilerOptions) -> Self {
        Self { opt }
    }

    pub async fn reconcile<T: Message>(
        &self,
        batch: Vec<QueuedCommand<T>>,
        failures: &FailureSet<T::Key>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for command in batch {
            let key = command.payload.natural_key();
            let decision = if failures.contains(&key) {
                Decision::RejectAndRequeue
            } else {
                Decision::Ack
            };

            let result = self
                .settle(command.channel.as_ref(), command.delivery_tag, decision)
                .await;
            match (decision, result) {
                (Decision::Ack, Ok(())) => report.acked += 1,
                (Decision::RejectAndRequeue, Ok(())) => {
                    debug!(
                        "Rejected {} '{:?}' (delivery {}) for redelivery",
                        T::KIND,
                        key,
                        command.delivery_tag
                    );
                    report.rejected += 1;
                }
                (decision, Err(e)) => {
                    error!(
                        "Failed to {:?} {} '{:?}' (delivery {} on channel {}): {}",
                        decision,
                        T::KIND,
                        key,
                        command.delivery_tag,
                        command.channel.id(),
                        e
                    );
                    report.settle_failures += 1;
                }
            }
        }

        report
    }

    async fn settle(
        &self,
        channel: &dyn BrokerChannel,
        tag: DeliveryTag,
        decision: Decision,
    ) -> Result<(), BrokerError> {
        let mut attempt = 0;
        loop {
            let result = match decision {
                Decision::Ack => channel.ack(tag, self.opt.cumulative_ack).await,
                Decision::RejectAndRequeue => channel.reject(tag, true).await,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.opt.settle_retries => {
                    attempt += 1;
                    warn!(
                        "Settling delivery {} on channel {} failed: {} (attempt {} of {})",
                        tag,
                        channel.id(),
                        e,
                        attempt,
                        self.opt.settle_retries + 1
                    );
                    tokio::time::sleep(self.opt.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
