use confique::Config;
use serde::Deserialize;
use std::time::Duration;
use write_behind::{OverflowPolicy, PipelineOptions, ReconcilerOptions};

/// What to do with a delivery that arrives while its queue is full
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String")]
pub enum OverflowMode {
    /// Drop it locally and log a warning
    #[default]
    Drop,
    /// Reject it with requeue
    Reject,
}

impl TryFrom<String> for OverflowMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected drop or reject)"
            )),
        }
    }
}

impl From<OverflowMode> for OverflowPolicy {
    fn from(mode: OverflowMode) -> Self {
        match mode {
            OverflowMode::Drop => OverflowPolicy::Drop,
            OverflowMode::Reject => OverflowPolicy::Reject,
        }
    }
}

/// Configuration of the write-behind pipelines, shared by every message kind
#[derive(Debug, Config, Clone)]
pub struct PipelineConfig {
    /// Maximum number of buffered commands per kind (default: 1000).
    /// Also the number of deliveries a consumer fetches at once.
    #[config(env = "AUTHZ_PIPELINE_CAPACITY", default = 1000)]
    pub capacity: usize,

    /// Interval between scheduled flushes in milliseconds (default: 1000)
    #[config(env = "AUTHZ_PIPELINE_FLUSH_PERIOD_MS", default = 1000)]
    pub flush_period_ms: u64,

    /// Upper bound for one batch commit in seconds (default: 3)
    #[config(env = "AUTHZ_PIPELINE_COMMIT_TIMEOUT_SECS", default = 3)]
    pub commit_timeout_secs: u64,

    /// "drop" (default) or "reject"
    #[config(env = "AUTHZ_PIPELINE_OVERFLOW_POLICY", default = "drop")]
    pub overflow_policy: OverflowMode,

    /// Acknowledge cumulatively (default: true)
    #[config(env = "AUTHZ_PIPELINE_CUMULATIVE_ACK", default = true)]
    pub cumulative_ack: bool,

    /// Extra attempts for a failed ack/reject (default: 0)
    #[config(env = "AUTHZ_PIPELINE_ACK_RETRIES", default = 0)]
    pub ack_retries: u32,

    /// Pause between ack/reject attempts in milliseconds (default: 50)
    #[config(env = "AUTHZ_PIPELINE_ACK_RETRY_BACKOFF_MS", default = 50)]
    pub ack_retry_backoff_ms: u64,

    #[config(nested)]
    pub queues: QueueNames,
}

/// Broker queue names, one per message kind
#[derive(Debug, Config, Clone)]
pub struct QueueNames {
    #[config(env = "AUTHZ_QUEUE_AUDIT", default = "audit")]
    pub audit: String,

    #[config(env = "AUTHZ_QUEUE_AUTHORIZATION", default = "authorization")]
    pub authorization: String,

    #[config(env = "AUTHZ_QUEUE_CONSENT", default = "consent")]
    pub consent: String,
}

impl PipelineConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    /// Options for one pipeline built from this configuration
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            capacity: self.capacity,
            commit_timeout: self.commit_timeout(),
            overflow_policy: self.overflow_policy.into(),
            reconciler: ReconcilerOptions {
                cumulative_ack: self.cumulative_ack,
                settle_retries: self.ack_retries,
                retry_backoff: Duration::from_millis(self.ack_retry_backoff_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_mode_parsing() {
        assert_eq!(OverflowMode::try_from("drop".to_string()), Ok(OverflowMode::Drop));
        assert_eq!(
            OverflowMode::try_from(" REJECT ".to_string()),
            Ok(OverflowMode::Reject)
        );
        assert!(OverflowMode::try_from("block".to_string()).is_err());
    }
}
