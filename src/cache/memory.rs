//! In-memory cache implementation using moka
//!
//! Every entry carries its own TTL through a moka [`Expiry`] policy, so a
//! `set` with a short TTL expires sooner than the cache-wide default.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries (5 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Serialized value plus its requested lifetime
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Create a new memory cache with default settings
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a new memory cache with custom capacity and default TTL
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL used by callers that have no better lifetime in mind
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the current number of entries in the cache
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Listing {
        id: i64,
        name: String,
        seats: Option<i32>,
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();

        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = MemoryCache::new();

        let result: Option<String> = cache.get("nonexistent").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();

        cache.set("event:1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.delete("event:1").await.unwrap();

        let result: Option<String> = cache.get("event:1").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();

        cache.set("event:1", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("event:2", &2, Duration::from_secs(60)).await.unwrap();
        cache.clear().await.unwrap();

        assert_eq!(cache.get::<i32>("event:1").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("event:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_struct_values() {
        let cache = MemoryCache::new();
        let listing = Listing {
            id: 7,
            name: "Beach cleanup".to_string(),
            seats: Some(20),
        };

        cache.set("event:7", &listing, Duration::from_secs(60)).await.unwrap();

        let result: Option<Listing> = cache.get("event:7").await.unwrap();
        assert_eq!(result, Some(listing));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_error() {
        let cache = MemoryCache::new();
        cache.set("event:1", &"not a listing", Duration::from_secs(60)).await.unwrap();

        assert!(cache.get::<Listing>("event:1").await.is_err());
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(3600));

        cache.set("short", &1, Duration::from_millis(10)).await.unwrap();
        cache.set("long", &2, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<i32>("short").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_overwrite_existing_key() {
        let cache = MemoryCache::new();

        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.set("key1", &"value2".to_string(), Duration::from_secs(60)).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value2".to_string()));
    }

    #[tokio::test]
    async fn test_entry_count() {
        let cache = MemoryCache::new();
        assert_eq!(cache.entry_count(), 0);

        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            /// Entries disappear once their TTL has passed
            #[test]
            fn prop_entries_expire_after_ttl(
                key in "[a-z]{1,10}",
                value in "[a-z]{1,100}"
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let ttl = Duration::from_millis(10);
                    let cache = MemoryCache::with_capacity_and_ttl(1000, ttl);

                    cache.set(&key, &value, ttl).await.unwrap();
                    let result: Option<String> = cache.get(&key).await.unwrap();
                    prop_assert_eq!(result, Some(value.clone()));

                    tokio::time::sleep(Duration::from_millis(50)).await;
                    cache.cache.run_pending_tasks().await;

                    let result_after_ttl: Option<String> = cache.get(&key).await.unwrap();
                    prop_assert_eq!(result_after_ttl, None);

                    Ok(())
                })?;
            }

            /// A miss loads from the source once; later reads hit the cache
            #[test]
            fn prop_cache_aside_loads_once(
                id in 1i64..1000,
                name in "[a-z]{1,50}"
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let cache = MemoryCache::new();
                    let loads = AtomicUsize::new(0);
                    let key = format!("event:{}", id);
                    let source = Listing { id, name: name.clone(), seats: None };

                    for _ in 0..3 {
                        let cached: Option<Listing> = cache.get(&key).await.unwrap();
                        let listing = match cached {
                            Some(listing) => listing,
                            None => {
                                loads.fetch_add(1, Ordering::SeqCst);
                                cache.set(&key, &source, Duration::from_secs(60)).await.unwrap();
                                source.clone()
                            }
                        };
                        prop_assert_eq!(&listing, &source);
                    }

                    prop_assert_eq!(loads.load(Ordering::SeqCst), 1);
                    Ok(())
                })?;
            }
        }
    }
}
