use crate::Message;
use crate::broker::{BrokerChannel, DeliveryTag};
use crate::command::QueuedCommand;
use crate::committer::{BatchCommitter, FailureSet, all_failed};
use crate::error::DispatchError;
use crate::queue::CommandQueue;
use crate::reconciler::{ReconcileReport, Reconciler, ReconcilerOptions};
use crate::registry::CommandHandler;
use crate::stats::{PipelineStats, StatsSnapshot};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio::time::timeout;

/// What happens to a delivery that arrives while the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Forget the delivery locally and log a warning. The broker is not told, so a
    /// later cumulative ack on the same channel settles it as if it was persisted.
    #[default]
    Drop,
    /// Reject the delivery with requeue so the broker redelivers it later
    Reject,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum number of buffered commands (default: 1000)
    pub capacity: usize,
    /// Upper bound for a single commit; a timed out commit fails the whole batch
    /// (default: 3 s)
    pub commit_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    pub reconciler: ReconcilerOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: 1000,
            commit_timeout: Duration::from_secs(3),
            overflow_policy: OverflowPolicy::default(),
            reconciler: ReconcilerOptions::default(),
        }
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Commands taken from the queue
    pub drained: usize,
    /// Commands whose message was not persisted
    pub failed: usize,
    /// Whether the commit hit the timeout
    pub timed_out: bool,
    pub settled: ReconcileReport,
}

enum CommitOutcome<K> {
    Done(FailureSet<K>),
    Panicked(JoinError),
    TimedOut,
}

/// Write-behind pipeline for one message kind: queue, committer and reconciler.
pub struct WriteBehind<T: Message> {
    queue: CommandQueue<T>,
    committer: Arc<dyn BatchCommitter<T>>,
    reconciler: Reconciler,
    options: PipelineOptions,
    /// Serializes flushes, scheduled or manual
    flush_lock: Mutex<()>,
    stats: PipelineStats,
}

impl<T: Message> WriteBehind<T> {
    pub fn new<C: BatchCommitter<T> + 'static>(committer: C, options: PipelineOptions) -> Self {
        Self {
            queue: CommandQueue::new(T::KIND, options.capacity),
            committer: Arc::new(committer),
            reconciler: Reconciler::new(options.reconciler.clone()),
            options,
            flush_lock: Mutex::new(()),
            stats: PipelineStats::default(),
        }
    }

    /// Buffers a command, applying the overflow policy when the queue is full.
    ///
    /// Returns whether the command was queued.
    pub async fn accept(&self, command: QueuedCommand<T>) -> bool {
        let command = match self.queue.offer(command) {
            Ok(()) => {
                self.stats.increment_queued();
                return true;
            }
            Err(command) => command,
        };

        self.stats.increment_overflowed();
        if self.options.overflow_policy == OverflowPolicy::Reject {
            if let Err(e) = command.channel.reject(command.delivery_tag, true).await {
                error!(
                    "Failed to reject overflowing {} delivery {} on channel {}: {}",
                    T::KIND,
                    command.delivery_tag,
                    command.channel.id(),
                    e
                );
            }
        }
        false
    }

    /// Drains the queue, commits the batch and settles every delivery.
    ///
    /// Only one flush runs at a time; a concurrent caller waits for the running one
    /// and then drains whatever arrived in the meantime.
    pub async fn flush(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;

        let batch = self.queue.drain_all();
        if batch.is_empty() {
            return FlushReport::default();
        }
        let drained = batch.len();
        let payloads: Vec<T> = batch.iter().map(|c| c.payload.clone()).collect();

        let (failures, timed_out) = match self.commit(&payloads).await {
            CommitOutcome::Done(failures) => (failures, false),
            CommitOutcome::Panicked(e) => {
                error!(
                    "Commit of {} {} message(s) panicked, requeueing the batch: {}",
                    drained,
                    T::KIND,
                    e
                );
                (all_failed(&payloads), false)
            }
            CommitOutcome::TimedOut => {
                error!(
                    "Commit of {} {} message(s) timed out after {:?}, requeueing the batch",
                    drained,
                    T::KIND,
                    self.options.commit_timeout
                );
                (all_failed(&payloads), true)
            }
        };

        let failed = payloads
            .iter()
            .filter(|payload| failures.contains(&payload.natural_key()))
            .count();
        let settled = self.reconciler.reconcile(batch, &failures).await;
        self.stats.record_flush(
            drained - failed,
            failed,
            settled.acked,
            settled.rejected,
            settled.settle_failures,
        );

        if failed > 0 {
            warn!(
                "Flushed {} {} message(s): {} failed and were requeued",
                drained,
                T::KIND,
                failed
            );
        } else {
            debug!("Flushed {} {} message(s)", drained, T::KIND);
        }

        FlushReport {
            drained,
            failed,
            timed_out,
            settled,
        }
    }

    /// Runs the commit in its own task, bounded by the commit timeout. A panicking or
    /// timed out commit counts as a failure of the whole batch.
    async fn commit(&self, payloads: &[T]) -> CommitOutcome<T::Key> {
        let committer = Arc::clone(&self.committer);
        let batch = payloads.to_vec();
        let mut task = tokio::spawn(async move { committer.commit(&batch).await });

        match timeout(self.options.commit_timeout, &mut task).await {
            Ok(Ok(failures)) => CommitOutcome::Done(failures),
            Ok(Err(e)) => CommitOutcome::Panicked(e),
            Err(_) => {
                task.abort();
                CommitOutcome::TimedOut
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    /// Number of commands currently buffered
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[async_trait]
impl<T: Message> CommandHandler for WriteBehind<T> {
    fn kind(&self) -> &str {
        T::KIND
    }

    async fn handle(
        &self,
        tag: DeliveryTag,
        channel: Arc<dyn BrokerChannel>,
        payload: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let message: T = serde_json::from_value(payload)?;
        self.accept(QueuedCommand::new(tag, channel, message)).await;
        Ok(())
    }
}
