//! Cache layer
//!
//! In-process caching of hot lookups (event detail pages) backed by moka.
//! Values are stored as JSON so any serializable type can be cached.
//!
//! # Usage
//!
//! ```rust,ignore
//! use volunteerhub::cache::{create_cache, CacheLayer};
//! use volunteerhub::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("event:1", &event, cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`;
/// services hold the concrete [`MemoryCache`] through [`SharedCache`].
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

/// Cache handle shared between services
pub type SharedCache = Arc<MemoryCache>;

/// Create the process cache from configuration
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl))
}

/// Cache key of a single event
pub fn event_key(id: i64) -> String {
    format!("event:{}", id)
}
