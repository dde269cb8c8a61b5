//! Server configuration, loaded from `AUTHZ_*` environment variables and an optional
//! TOML file named by `AUTHZ_CONFIG_FILE`.

pub use crate::config::cache::{CacheConfig, CacheStore, InMemoryCacheConfig, RedisCacheConfig};
pub use crate::config::pipeline::{OverflowMode, PipelineConfig, QueueNames};
use confique::Config;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub mod cache;
pub mod pipeline;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_FILE_ENV: &str = "AUTHZ_CONFIG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for the authorization server
#[derive(Debug, Config, Clone)]
pub struct AppConfig {
    /// The port the server listens on (default: 8085)
    #[config(env = "AUTHZ_PORT", default = 8085)]
    pub port: u16,

    /// Timeout of each health check in seconds (default: 3)
    #[config(env = "AUTHZ_HEALTHCHECK_TIMEOUT", default = 3.0)]
    pub healthcheck_timeout: f64,

    #[config(nested)]
    pub pipeline: PipelineConfig,

    #[config(nested)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Loads the configuration from the environment (and the file named by
    /// `AUTHZ_CONFIG_FILE`, if set) and validates it. Environment variables take
    /// precedence over the file.
    pub fn new() -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file)
    }

    pub fn load_from(file: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        let config = builder.load()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration made of the built-in defaults only
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let config = Self::builder().load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pipeline = &self.pipeline;
        if pipeline.capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline capacity must be greater than zero".to_string(),
            ));
        }
        if pipeline.flush_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "flush period must be greater than zero".to_string(),
            ));
        }
        if pipeline.commit_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "commit timeout must be greater than zero".to_string(),
            ));
        }

        let queues = [
            &pipeline.queues.audit,
            &pipeline.queues.authorization,
            &pipeline.queues.consent,
        ];
        if queues.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::Invalid(
                "queue names must not be empty".to_string(),
            ));
        }
        if queues[0] == queues[1] || queues[0] == queues[2] || queues[1] == queues[2] {
            return Err(ConfigError::Invalid(
                "every message kind needs its own queue".to_string(),
            ));
        }

        // a record must stay cached until its batch had a chance to commit
        if self.cache.store != CacheStore::None {
            let ttl_ms = self.cache.ttl_secs.saturating_mul(1000);
            let window_ms = pipeline
                .flush_period_ms
                .saturating_add(pipeline.commit_timeout_secs.saturating_mul(1000));
            if ttl_ms <= window_ms {
                return Err(ConfigError::Invalid(format!(
                    "cache ttl ({}s) must exceed flush period ({}ms) plus commit timeout ({}s)",
                    self.cache.ttl_secs, pipeline.flush_period_ms, pipeline.commit_timeout_secs
                )));
            }
        }

        if self.cache.store == CacheStore::Redis {
            if self.cache.redis.url.is_empty() {
                return Err(ConfigError::Invalid(
                    "Redis URL is required for Redis cache".to_string(),
                ));
            }
            let url = Url::parse(&self.cache.redis.url)
                .map_err(|e| ConfigError::Invalid(format!("invalid Redis URL: {e}")))?;
            if !matches!(url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
                return Err(ConfigError::Invalid(format!(
                    "unsupported Redis URL scheme '{}'",
                    url.scheme()
                )));
            }
        }

        if self.healthcheck_timeout.is_nan() || self.healthcheck_timeout <= 0.0 {
            return Err(ConfigError::Invalid(
                "health check timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::from_defaults().unwrap();
        assert_eq!(config.port, 8085);
        assert_eq!(config.pipeline.capacity, 1000);
        assert_eq!(config.pipeline.flush_period_ms, 1000);
        assert_eq!(config.pipeline.commit_timeout_secs, 3);
        assert_eq!(config.pipeline.overflow_policy, OverflowMode::Drop);
        assert!(config.pipeline.cumulative_ack);
        assert_eq!(config.pipeline.ack_retries, 0);
        assert_eq!(config.pipeline.queues.audit, "audit");
        assert_eq!(config.pipeline.queues.authorization, "authorization");
        assert_eq!(config.pipeline.queues.consent, "consent");
        assert_eq!(config.cache.ttl_secs, 15);
        assert_eq!(config.cache.store, CacheStore::InMemory);
        assert_eq!(config.cache.memory.capacity_mib, 128);
        assert_eq!(config.cache.redis.url, "");
    }

    #[test]
    fn test_config_file_is_applied() {
        let path = std::env::temp_dir().join(format!("authz-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "port = 9000\n\n[pipeline]\ncapacity = 50\noverflow_policy = \"reject\"\n\n[pipeline.queues]\naudit = \"audit-events\"\n\n[cache]\nstore = \"none\""
        )
        .unwrap();

        let config = AppConfig::builder().file(&path).load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.pipeline.capacity, 50);
        assert_eq!(config.pipeline.overflow_policy, OverflowMode::Reject);
        assert_eq!(config.pipeline.queues.audit, "audit-events");
        assert_eq!(config.pipeline.queues.consent, "consent");
        assert_eq!(config.cache.store, CacheStore::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_defaults() {
        std::env::set_var("AUTHZ_CACHE_MEMORY_CAPACITY_MIB", "256");
        std::env::set_var("AUTHZ_PIPELINE_ACK_RETRIES", "2");

        let config = AppConfig::builder().env().load().unwrap();
        assert_eq!(config.cache.memory.capacity_mib, 256);
        assert_eq!(config.pipeline.ack_retries, 2);

        std::env::remove_var("AUTHZ_CACHE_MEMORY_CAPACITY_MIB");
        std::env::remove_var("AUTHZ_PIPELINE_ACK_RETRIES");
    }

    #[test]
    fn test_ttl_must_outlast_flush_window() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.cache.ttl_secs = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // irrelevant without a cache
        config.cache.store = CacheStore::None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_store_requires_valid_url() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.cache.store = CacheStore::Redis;
        assert!(config.validate().is_err());

        config.cache.redis.url = "http://localhost:6379".to_string();
        assert!(config.validate().is_err());

        config.cache.redis.url = "redis://localhost:6379".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_names_must_be_distinct() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.pipeline.queues.consent = "audit".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.pipeline.capacity = 0;
        assert!(config.validate().is_err());
    }
}
