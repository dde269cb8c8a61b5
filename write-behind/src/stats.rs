use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one pipeline
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    queued: AtomicU64,
    overflowed: AtomicU64,
    flushes: AtomicU64,
    committed: AtomicU64,
    failed: AtomicU64,
    acked: AtomicU64,
    rejected: AtomicU64,
    settle_failures: AtomicU64,
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Commands accepted into the queue
    pub queued: u64,
    /// Commands turned away because the queue was full
    pub overflowed: u64,
    /// Flushes that found at least one command
    pub flushes: u64,
    /// Commands whose message was persisted
    pub committed: u64,
    /// Commands whose message could not be persisted
    pub failed: u64,
    pub acked: u64,
    pub rejected: u64,
    /// Ack/reject calls that did not reach the broker
    pub settle_failures: u64,
}

impl PipelineStats {
    pub(crate) fn increment_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_overflowed(&self) {
        self.overflowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(
        &self,
        committed: usize,
        failed: usize,
        acked: usize,
        rejected: usize,
        settle_failures: usize,
    ) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.committed.fetch_add(committed as u64, Ordering::Relaxed);
        self.failed.fetch_add(failed as u64, Ordering::Relaxed);
        self.acked.fetch_add(acked as u64, Ordering::Relaxed);
        self.rejected.fetch_add(rejected as u64, Ordering::Relaxed);
        self.settle_failures
            .fetch_add(settle_failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
        }
    }
}
