//! Embedding cache with per-namespace expiry.
//!
//! Every namespace is a [`TtlCache`]: a concurrent map of `(value, expires_at)`
//! entries. Expired entries are a miss on read and are overwritten by the
//! next `put`; there is no background sweep.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;

/// Source of the current time for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to make expiry deterministic.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Cache namespaces. Each one expires independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// N-gram tokens taken from topic fields.
    Token,
    /// Reviewer skill tags.
    Skill,
    /// Whole topic fields.
    Field,
    /// Composite reviewer vectors (mean of skill vectors).
    Reviewer,
}

impl Namespace {
    /// All namespaces, in a stable order.
    pub const ALL: [Namespace; 4] = [
        Namespace::Token,
        Namespace::Skill,
        Namespace::Field,
        Namespace::Reviewer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Token => "token",
            Namespace::Skill => "skill",
            Namespace::Field => "field",
            Namespace::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-to-live per namespace, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub token_secs: u64,
    pub skill_secs: u64,
    pub field_secs: u64,
    /// Reviewer vectors drift as skills change, so they live much shorter.
    pub reviewer_secs: u64,
}

impl CacheTtls {
    const HOUR: u64 = 60 * 60;
    const DAY: u64 = 24 * Self::HOUR;

    /// TTL for one namespace.
    pub fn ttl(&self, namespace: Namespace) -> Duration {
        let secs = match namespace {
            Namespace::Token => self.token_secs,
            Namespace::Skill => self.skill_secs,
            Namespace::Field => self.field_secs,
            Namespace::Reviewer => self.reviewer_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            token_secs: 30 * Self::DAY,
            skill_secs: 7 * Self::DAY,
            field_secs: 7 * Self::DAY,
            reviewer_secs: Self::HOUR,
        }
    }
}

/// A cached value and the instant after which it is stale.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// A concurrent keyed store whose entries expire after a fixed TTL.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache.
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Default TTL applied by [`TtlCache::put`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read a live entry. An entry read at or after its expiry is a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    /// Insert or refresh an entry with the cache's TTL.
    pub async fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.ttl).await;
    }

    /// Insert or refresh an entry with an explicit TTL.
    pub async fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| now < entry.expires_at);

            if entries.len() >= self.max_entries {
                if let Some(oldest_key) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest_key);
                }
            }
        }

        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Whether a live entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of stored entries, live or expired.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Count of (live, expired) entries at the current instant.
    async fn counts(&self) -> (usize, usize) {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let live = entries.values().filter(|e| now < e.expires_at).count();
        (live, entries.len() - live)
    }
}

/// Process-lifetime cache for every embedding the matcher resolves.
///
/// Owned by (or injected into) the service rather than living in a global,
/// so tests can supply their own clock and TTLs.
pub struct EmbeddingCache {
    token: TtlCache<Embedding>,
    skill: TtlCache<Embedding>,
    field: TtlCache<Embedding>,
    reviewer: TtlCache<Embedding>,
}

impl EmbeddingCache {
    /// Create a cache with the given TTLs, capacity per namespace and clock.
    pub fn new(ttls: &CacheTtls, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let make = |ns| TtlCache::new(ttls.ttl(ns), max_entries, clock.clone());
        Self {
            token: make(Namespace::Token),
            skill: make(Namespace::Skill),
            field: make(Namespace::Field),
            reviewer: make(Namespace::Reviewer),
        }
    }

    /// The store behind one namespace.
    pub fn namespace(&self, namespace: Namespace) -> &TtlCache<Embedding> {
        match namespace {
            Namespace::Token => &self.token,
            Namespace::Skill => &self.skill,
            Namespace::Field => &self.field,
            Namespace::Reviewer => &self.reviewer,
        }
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, namespace: Namespace, key: &str) -> Option<Embedding> {
        let hit = self.namespace(namespace).get(key).await;
        if hit.is_some() {
            debug!("Cache hit ({namespace}): {key}");
        }
        hit
    }

    /// Put an embedding in the cache with the namespace TTL.
    pub async fn put(&self, namespace: Namespace, key: impl Into<String>, embedding: Embedding) {
        self.namespace(namespace).put(key, embedding).await;
    }

    /// Put an embedding in the cache with an explicit TTL.
    pub async fn put_with_ttl(
        &self,
        namespace: Namespace,
        key: impl Into<String>,
        embedding: Embedding,
        ttl: Duration,
    ) {
        self.namespace(namespace)
            .put_with_ttl(key, embedding, ttl)
            .await;
    }

    /// Check if a live embedding is cached.
    pub async fn contains(&self, namespace: Namespace, key: &str) -> bool {
        self.namespace(namespace).contains(key).await
    }

    /// Clear every namespace.
    pub async fn clear(&self) {
        for ns in Namespace::ALL {
            self.namespace(ns).clear().await;
        }
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let mut namespaces = Vec::with_capacity(Namespace::ALL.len());
        for ns in Namespace::ALL {
            let store = self.namespace(ns);
            let (live, expired) = store.counts().await;
            namespaces.push(NamespaceStats {
                namespace: ns,
                live,
                expired,
                ttl_secs: store.ttl().as_secs(),
            });
        }
        CacheStats { namespaces }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespaces: Vec<NamespaceStats>,
}

impl CacheStats {
    /// Live entries across all namespaces.
    pub fn live_entries(&self) -> usize {
        self.namespaces.iter().map(|n| n.live).sum()
    }
}

/// Statistics for a single namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: Namespace,

    /// Entries that would be served on read.
    pub live: usize,

    /// Entries past their expiry, waiting to be overwritten.
    pub expired: usize,

    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manual_cache(max_entries: usize) -> (Arc<ManualClock>, EmbeddingCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = EmbeddingCache::new(&CacheTtls::default(), max_entries, clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let (_, cache) = manual_cache(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put(Namespace::Skill, "blockchain", embedding.clone()).await;

        let retrieved = cache.get(Namespace::Skill, "blockchain").await;
        assert_eq!(retrieved, Some(embedding));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (_, cache) = manual_cache(100);
        assert!(cache.get(Namespace::Token, "not cached").await.is_none());
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let (_, cache) = manual_cache(100);
        cache.put(Namespace::Skill, "rust", vec![1.0]).await;

        assert!(cache.contains(Namespace::Skill, "rust").await);
        assert!(!cache.contains(Namespace::Token, "rust").await);
        assert!(!cache.contains(Namespace::Field, "rust").await);
    }

    #[tokio::test]
    async fn test_reviewer_entries_expire_before_skills() {
        let (clock, cache) = manual_cache(100);
        cache.put(Namespace::Reviewer, "7|rust", vec![1.0]).await;
        cache.put(Namespace::Skill, "rust", vec![1.0]).await;

        clock.advance(Duration::from_secs(59 * 60));
        assert!(cache.contains(Namespace::Reviewer, "7|rust").await);

        clock.advance(Duration::from_secs(60));
        assert!(!cache.contains(Namespace::Reviewer, "7|rust").await);
        assert!(cache.contains(Namespace::Skill, "rust").await);

        clock.advance(Duration::from_secs(7 * 24 * 60 * 60));
        assert!(!cache.contains(Namespace::Skill, "rust").await);
    }

    #[tokio::test]
    async fn test_expired_entry_is_overwritten() {
        let (clock, cache) = manual_cache(100);
        cache
            .put_with_ttl(Namespace::Field, "title", vec![1.0], Duration::from_secs(10))
            .await;
        clock.advance(Duration::from_secs(10));
        assert!(cache.get(Namespace::Field, "title").await.is_none());

        let stats = cache.stats().await;
        let field = stats
            .namespaces
            .iter()
            .find(|n| n.namespace == Namespace::Field)
            .unwrap();
        assert_eq!((field.live, field.expired), (0, 1));

        cache.put(Namespace::Field, "title", vec![2.0]).await;
        assert_eq!(cache.get(Namespace::Field, "title").await, Some(vec![2.0]));
        assert_eq!(cache.namespace(Namespace::Field).len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_eviction_prefers_expired_then_oldest() {
        let clock = Arc::new(ManualClock::default());
        let store: TtlCache<u32> = TtlCache::new(Duration::from_secs(100), 2, clock.clone());

        store.put_with_ttl("a", 1, Duration::from_secs(5)).await;
        store.put("b", 2).await;
        clock.advance(Duration::from_secs(6));

        store.put("c", 3).await;
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("b").await, Some(2));
        assert_eq!(store.get("c").await, Some(3));

        store.put("d", 4).await;
        assert_eq!(store.len().await, 2);
        assert!(store.get("b").await.is_none());
        assert_eq!(store.get("d").await, Some(4));
    }

    #[test]
    fn test_clear_empties_every_namespace() {
        tokio_test::block_on(async {
            let (_, cache) = manual_cache(10);
            for ns in Namespace::ALL {
                cache.put(ns, "k", vec![1.0]).await;
            }
            assert_eq!(cache.stats().await.live_entries(), 4);

            cache.clear().await;
            assert_eq!(cache.stats().await.live_entries(), 0);
        });
    }

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.ttl(Namespace::Token), Duration::from_secs(30 * 86_400));
        assert_eq!(ttls.ttl(Namespace::Skill), Duration::from_secs(7 * 86_400));
        assert_eq!(ttls.ttl(Namespace::Field), Duration::from_secs(7 * 86_400));
        assert_eq!(ttls.ttl(Namespace::Reviewer), Duration::from_secs(3_600));
    }
}
