use confique::Config;
use serde::Deserialize;

/// Specifies which cache store implementation to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String")]
pub enum CacheStore {
    #[default]
    InMemory,
    Redis,
    /// Caching disabled; every read goes to the store
    None,
}

impl TryFrom<String> for CacheStore {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            "none" | "" => Ok(Self::None),
            other => Err(format!(
                "unknown cache store '{other}' (expected in-memory, redis or none)"
            )),
        }
    }
}

/// Configuration for the cache bridge
#[derive(Debug, Config, Clone)]
pub struct CacheConfig {
    /// Expiry of cached records in seconds (default: 15).
    /// Must outlast one flush period plus one commit timeout.
    #[config(env = "AUTHZ_CACHE_TTL_SECS", default = 15)]
    pub ttl_secs: u64,

    /// Cache store type: "in-memory" (default), "redis" or "none"
    #[config(env = "AUTHZ_CACHE_STORE", default = "in-memory")]
    pub store: CacheStore,

    #[config(nested)]
    pub memory: InMemoryCacheConfig,

    #[config(nested)]
    pub redis: RedisCacheConfig,
}

/// In-memory cache specific configuration
#[derive(Debug, Config, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum capacity in MiB (default: 128)
    #[config(env = "AUTHZ_CACHE_MEMORY_CAPACITY_MIB", default = 128)]
    pub capacity_mib: usize,
}

/// Redis cache specific configuration
#[derive(Debug, Config, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection string, required when the store is "redis"
    #[config(env = "AUTHZ_CACHE_REDIS_URL", default = "")]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_store_parsing() {
        assert_eq!(
            CacheStore::try_from("in-memory".to_string()),
            Ok(CacheStore::InMemory)
        );
        assert_eq!(
            CacheStore::try_from("Redis".to_string()),
            Ok(CacheStore::Redis)
        );
        assert_eq!(CacheStore::try_from("none".to_string()), Ok(CacheStore::None));
        assert!(CacheStore::try_from("memcached".to_string()).is_err());
    }
}
