//! Cache bridge between the synchronous write path and later reads.
//!
//! Records are written here before their durable write is queued, so a read issued
//! right after a write finds the record even though the batch has not committed yet.
//! The backend is picked once at startup; a miss is `Ok(None)`, never an error.

use crate::config::{CacheConfig, CacheStore};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod null;
pub mod redis;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Interface shared by all cache backends.
///
/// Every backend (in-memory, Redis, disabled) offers the same operations, so the
/// repository services never need to know which one is configured.
///
/// Values are stored as JSON and every entry carries its own expiry, chosen by the
/// caller on `set`. Implementations are `Send + Sync` and cheap to clone, so one
/// instance is shared by all services and request handlers.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stores a value that expires after `ttl`.
    ///
    /// Overwrites any previous value under `key` and restarts its expiry.
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Retrieves a value.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired. An error means the
    /// backend could not be reached or the stored value could not be decoded.
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;

    /// Checks that the backend is usable.
    ///
    /// For Redis this pings the server. The in-memory and disabled backends are
    /// always healthy.
    ///
    /// Returns `Ok(())` if healthy, or `Err` with a message for the health report.
    async fn health_check(&self) -> Result<(), String>;

    /// Removes a value; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// The configured cache backend.
///
/// Wraps each backend behind one type so callers work through [`CacheBackend`]
/// without generics. The variant is picked once by [`create_cache`] and never
/// changes while the server runs.
#[derive(Clone)]
pub enum Cache {
    /// In-memory cache backed by Moka
    InMemory(memory::InMemoryCache),
    Redis(redis::RedisCache),
    /// Caching disabled
    Null(null::NullCache),
}

impl Cache {
    /// Name of the backend, for health reports
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in-memory",
            Self::Redis(_) => "redis",
            Self::Null(_) => "none",
        }
    }
}

#[async_trait::async_trait]
impl CacheBackend for Cache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
            Self::Null(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
            Self::Null(cache) => cache.get(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
            Self::Null(cache) => cache.health_check().await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
            Self::Null(cache) => cache.delete(key).await,
        }
    }
}

/// Creates the cache backend selected by the configuration.
///
/// * `in-memory` builds a Moka cache bounded to `memory.capacity_mib`.
/// * `redis` connects to `redis.url` and fails if the URL is empty or the server
///   cannot be reached.
/// * `none` disables caching; every read misses and reads go to the store.
///
/// # Errors
///
/// Returns [`CacheError::Config`] when the selected backend cannot be created.
///
/// # Example
///
/// ```ignore
/// let config = AppConfig::new()?;
/// let cache = create_cache(&config.cache).await?;
/// ```
pub async fn create_cache(config: &CacheConfig) -> Result<Cache, CacheError> {
    match config.store {
        CacheStore::InMemory => {
            let cache = memory::InMemoryCache::new(config.memory.capacity_mib)
                .map_err(CacheError::Config)?;
            Ok(Cache::InMemory(cache))
        }
        CacheStore::Redis => {
            if config.redis.url.is_empty() {
                return Err(CacheError::Config(
                    "Redis URL is required for Redis cache".to_string(),
                ));
            }
            let cache = redis::RedisCache::new(&config.redis.url)
                .await
                .map_err(CacheError::Config)?;
            Ok(Cache::Redis(cache))
        }
        CacheStore::None => Ok(Cache::Null(null::NullCache::new())),
    }
}

/// Builds a cache key that does not expose `secret` (e.g. a token value).
///
/// The key is `prefix` followed by the hex SHA-256 digest of `secret`.
pub fn hashed_key(prefix: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{}:{:x}", prefix, hasher.finalize())
}
