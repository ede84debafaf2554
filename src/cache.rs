use crate::error::CacheError;
use crate::types::SearchQuery;
use futures::future::BoxFuture;
use futures::FutureExt;
use moka::Expiry;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SEARCH_NAMESPACE: &str = "etsy_search";
const TRENDING_NAMESPACE: &str = "etsy_trending";

/// Separator and escape characters must not appear raw inside a key field.
const KEY_FIELD: &AsciiSet = &CONTROLS.add(b':').add(b'%');

/// Deterministic cache key derived from a query's discriminating fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn search(query: &SearchQuery) -> Self {
        Self::from_fields(
            SEARCH_NAMESPACE,
            &[query.keyword.as_str(), query.product_type.as_str(), query.filter_mode.as_str()],
        )
    }

    pub fn trending() -> Self {
        Self(TRENDING_NAMESPACE.to_string())
    }

    fn from_fields(namespace: &str, fields: &[&str]) -> Self {
        let mut key = namespace.to_string();
        for field in fields {
            key.push(':');
            key.extend(utf8_percent_encode(field, KEY_FIELD));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key/value backend with per-entry TTL.
pub trait CacheStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>>;
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> BoxFuture<'a, Result<(), CacheError>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
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

/// In-process store backed by `moka`.
#[derive(Clone)]
pub struct MemoryStore {
    inner: moka::future::Cache<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>> {
        async move {
            let Some(entry) = self.inner.get(key).await else {
                return Ok(None);
            };
            if entry.expires_at <= Instant::now() {
                self.inner.invalidate(key).await;
                return Ok(None);
            }
            Ok(Some(entry.value))
        }
        .boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> BoxFuture<'a, Result<(), CacheError>> {
        async move {
            let entry = CacheEntry {
                value,
                ttl,
                expires_at: Instant::now() + ttl,
            };
            self.inner.insert(key.to_string(), entry).await;
            Ok(())
        }
        .boxed()
    }
}

/// TTL cache of serialized results behind a [`CacheStore`]. Without a store,
/// or when the store errors, reads miss and writes are dropped with a warning.
#[derive(Clone)]
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
    default_ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store: Some(store),
            default_ttl,
        }
    }

    pub fn in_memory(max_capacity: u64, default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new(max_capacity)), default_ttl)
    }

    /// A cache with no backing store.
    pub fn disabled() -> Self {
        Self {
            store: None,
            default_ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(value)) => {
                debug!("Cache hit for {}", key);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache error: {}", e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            warn!("Cache unavailable, not storing {}", key);
            return;
        };
        if let Err(e) = store.set(key, value, ttl).await {
            warn!("Cache save error: {}", e);
        }
    }

    /// Reads and deserializes a value; a value that no longer deserializes
    /// is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = self.get(key.as_str()).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache error: {}", CacheError::from(e));
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key.as_str(), raw, self.default_ttl).await,
            Err(e) => warn!("Cache save error: {}", CacheError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterMode;

    struct UnreachableStore;

    impl CacheStore for UnreachableStore {
        fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<String>, CacheError>> {
            async { Err(CacheError::Unavailable("connection refused".to_string())) }.boxed()
        }

        fn set<'a>(&'a self, _key: &'a str, _value: String, _ttl: Duration) -> BoxFuture<'a, Result<(), CacheError>> {
            async { Err(CacheError::Unavailable("connection refused".to_string())) }.boxed()
        }
    }

    fn query(keyword: &str, product_type: &str, filter_mode: FilterMode) -> SearchQuery {
        SearchQuery {
            keyword: keyword.to_string(),
            product_type: product_type.to_string(),
            filter_mode,
            max_results: 20,
        }
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let cache = ResultCache::in_memory(100, Duration::from_secs(60));
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = ResultCache::in_memory(100, Duration::from_secs(60));
        cache.set("short", "v".to_string(), Duration::from_millis(50)).await;
        assert!(cache.get("short").await.is_some());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("short").await, None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let cache = ResultCache::in_memory(100, Duration::from_secs(60));
        cache.set("k", "old".to_string(), Duration::from_millis(50)).await;
        cache.set("k", "new".to_string(), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_disabled_cache_is_pass_through() {
        let cache = ResultCache::disabled();
        assert!(!cache.is_enabled());
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_miss() {
        let cache = ResultCache::new(Arc::new(UnreachableStore), Duration::from_secs(60));
        cache.set("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
        let typed: Option<Vec<String>> = cache.get_json(&CacheKey::trending()).await;
        assert!(typed.is_none());
    }

    #[tokio::test]
    async fn test_json_round_trip_and_corrupt_value_is_miss() {
        let cache = ResultCache::in_memory(100, Duration::from_secs(60));
        let key = CacheKey::trending();
        cache.set_json(&key, &vec!["Boho".to_string()]).await;
        let terms: Option<Vec<String>> = cache.get_json(&key).await;
        assert_eq!(terms, Some(vec!["Boho".to_string()]));

        cache.set(key.as_str(), "{not json".to_string(), Duration::from_secs(60)).await;
        let terms: Option<Vec<String>> = cache.get_json(&key).await;
        assert!(terms.is_none());
    }

    #[test]
    fn test_search_key_is_deterministic() {
        let a = CacheKey::search(&query("mug", "ceramic", FilterMode::StarSeller));
        let b = CacheKey::search(&query("mug", "ceramic", FilterMode::StarSeller));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "etsy_search:mug:ceramic:star_seller");
    }

    #[test]
    fn test_search_keys_do_not_collide() {
        let a = CacheKey::search(&query("a:b", "c", FilterMode::All));
        let b = CacheKey::search(&query("a", "b:c", FilterMode::All));
        assert_ne!(a, b);
        let c = CacheKey::search(&query("mug", "ceramic", FilterMode::BestSeller));
        let d = CacheKey::search(&query("mug", "ceramic", FilterMode::StarSeller));
        assert_ne!(c, d);
        assert_ne!(CacheKey::trending().as_str(), c.as_str());
    }
}
