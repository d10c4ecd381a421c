//! Key-Value Store Abstraction
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Allows swapping between Redis and in-memory without API changes
//! - JSON encode/decode centralized in the helper functions

use crate::config::RedisConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

/// Durable string storage with optional expiry.
///
/// Both backends honor the same contract, except that the in-memory fallback
/// does not enforce TTLs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` at `key`. With `ttl` the record expires after that many
    /// seconds; every write restarts the clock.
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()>;

    /// Check for presence without reading the value.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Best-effort removal.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value. Undecodable records are treated as absent so
/// a corrupt history degrades to a fresh one instead of wedging the caller.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("[Storage] Discarding undecodable record at '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Encode and store a JSON value.
pub async fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Option<u64>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

/// Select the backing store at process start. Redis is tried once; if the
/// connection fails the in-memory fallback is used for the rest of the
/// process lifetime. There is no mid-session failover.
pub async fn connect(config: &RedisConfig) -> Arc<dyn KeyValueStore> {
    match RedisStore::connect(config).await {
        Ok(store) => {
            tracing::info!("[Storage] Connected to redis at {}:{}", config.host, config.port);
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "[Storage] Redis connection failed, falling back to in-memory store: {}",
                e
            );
            Arc::new(InMemoryStore::new())
        }
    }
}
