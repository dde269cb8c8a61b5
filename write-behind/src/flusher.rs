use crate::Message;
use crate::pipeline::WriteBehind;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Flushes a pipeline on a fixed period.
///
/// Ticks are handled one after another by a single task, so at most one scheduled
/// flush per pipeline is in flight. Every flush runs in its own task: a panicking
/// committer is logged and the next tick still fires. On shutdown the driver runs
/// one last flush for whatever is still buffered.
#[derive(Debug)]
pub struct FlushDriver {
    kind: &'static str,
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FlushDriver {
    pub fn start<T: Message>(pipeline: Arc<WriteBehind<T>>, period: Duration) -> Self {
        let shutdown_token = CancellationToken::new();
        let handle = tokio::spawn(drive(pipeline, period, shutdown_token.clone()));

        Self {
            kind: T::KIND,
            shutdown_token,
            handle: Some(handle),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Stops the schedule and waits for the final flush
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Flush driver for '{}' terminated abnormally: {}", self.kind, e);
            }
        }
    }
}

impl Drop for FlushDriver {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

async fn drive<T: Message>(
    pipeline: Arc<WriteBehind<T>>,
    period: Duration,
    shutdown_token: CancellationToken,
) {
    info!("Flushing '{}' commands every {:?}", T::KIND, period);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Flush driver for '{}' shutting down, flushing remaining commands", T::KIND);
                run_flush(&pipeline).await;
                break;
            }
            _ = ticker.tick() => {}
        }
        run_flush(&pipeline).await;
    }
}

async fn run_flush<T: Message>(pipeline: &Arc<WriteBehind<T>>) {
    let pipeline = Arc::clone(pipeline);
    if let Err(e) = tokio::spawn(async move { pipeline.flush().await }).await {
        error!("Flush of '{}' commands failed: {}", T::KIND, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOptions;
    use crate::testing::{Note, RecordingChannel, Settlement, command, setup_logger};
    use crate::{BatchCommitter, FailureSet};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Panics on the first commit, accepts everything afterwards
    #[derive(Default)]
    struct FlakyCommitter {
        commits: AtomicUsize,
    }

    #[async_trait]
    impl BatchCommitter<Note> for FlakyCommitter {
        async fn commit(&self, _batch: &[Note]) -> FailureSet<String> {
            if self.commits.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("database exploded");
            }
            FailureSet::new()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_commit_requeues_and_scheduler_keeps_running() {
        setup_logger();
        let channel = RecordingChannel::new(1);
        let pipeline = Arc::new(WriteBehind::new(
            FlakyCommitter::default(),
            PipelineOptions::default(),
        ));
        pipeline.accept(command(&channel, 1, "first")).await;

        let driver = FlushDriver::start(pipeline.clone(), Duration::from_secs(1));
        // first tick fires immediately and panics inside the committer
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pipeline.depth(), 0);
        assert_eq!(
            channel.calls(),
            vec![Settlement::Reject {
                tag: 1,
                requeue: true
            }]
        );

        pipeline.accept(command(&channel, 2, "second")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(channel.acked_tags(), vec![2]);
        assert_eq!(pipeline.stats().failed, 1);
        driver.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_remaining_commands() {
        let channel = RecordingChannel::new(1);
        let pipeline = Arc::new(WriteBehind::new(
            FlakyCommitter {
                commits: AtomicUsize::new(1),
            },
            PipelineOptions::default(),
        ));
        let driver = FlushDriver::start(pipeline.clone(), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(10)).await;

        pipeline.accept(command(&channel, 5, "late")).await;
        driver.shutdown().await;

        assert_eq!(channel.acked_tags(), vec![5]);
        assert_eq!(pipeline.depth(), 0);
    }
}
