//! Repository services called by the protocol layer.
//!
//! Writes go to the cache first and are then published for the write-behind
//! pipelines; reads consult the cache and fall back to the store.

use crate::cache::{Cache, CacheBackend};
use crate::persistence::PersistenceError;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use write_behind::BrokerError;

pub mod audit;
pub mod authorization;
pub mod client;
pub mod consent;

pub use audit::AuditService;
pub use authorization::AuthorizationService;
pub use client::{Cipher, CipherError, ClientService, PassthroughCipher};
pub use consent::ConsentService;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The record is cached but its durable write could not be queued
    #[error("Failed to publish {kind} message: {source}")]
    Publish {
        kind: &'static str,
        #[source]
        source: BrokerError,
    },
    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Failed to decrypt client secret: {0}")]
    Decryption(#[from] CipherError),
}

/// The shared cache plus the expiry applied to everything the services write
#[derive(Clone)]
pub struct CacheBridge {
    cache: Arc<Cache>,
    ttl: Duration,
}

impl CacheBridge {
    pub fn new(cache: Arc<Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads a cached value; cache errors are logged and treated as a miss
    pub async fn get<T: DeserializeOwned + Send + Sync>(&self, key: &str) -> Option<T> {
        match self.cache.get::<T>(key).await {
            Ok(Some(value)) => {
                debug!("Cache hit for key: {}", key);
                Some(value)
            }
            Ok(None) => {
                debug!("Cache miss for key: {}", key);
                None
            }
            Err(e) => {
                warn!("Cache error for key {}: {}", key, e);
                None
            }
        }
    }

    /// Caches a value; a failure is logged and reads fall through to the store
    pub async fn put<T: Serialize + Send + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set(key, value, self.ttl).await {
            warn!("Failed to cache value for {}: {}", key, e);
        }
    }
}
