//! Public key cache.
//!
//! Resolved public keys are memoized by identity id so verifying a stream of
//! envelopes from the same senders avoids a store round trip per message.
//!
//! Entries expire after a TTL (or never, when the TTL is disabled), and the
//! least recently used entry is evicted once the cache reaches capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use p256::ecdsa::VerifyingKey;
use thiserror::Error;
use tracing::debug;

use crate::identity::IdentityId;

/// Errors from a public key cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No live entry for this id. Callers fall back to the identity store.
    #[error("Public key not cached: {0}")]
    NotFound(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Memo of identity id to public key.
///
/// Concurrent `get`s are safe, and a racing duplicate `set` for the same id is
/// harmless since the key for an id never changes.
pub trait PublicKeyCache: Send + Sync {
    fn get(&self, id: &IdentityId) -> Result<VerifyingKey, CacheError>;

    fn set(&self, id: &IdentityId, key: VerifyingKey) -> Result<(), CacheError>;
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct PublicKeyCacheConfig {
    /// How long an entry lives. `None` keeps entries until evicted.
    pub default_ttl: Option<Duration>,

    /// Maximum number of cached keys
    pub max_entries: usize,

    /// How often [`spawn_cleanup_task`] sweeps expired entries
    pub cleanup_interval: Duration,
}

impl Default for PublicKeyCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(3600)),
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Entries and statistics
// =============================================================================

struct CachedPublicKey {
    key: VerifyingKey,
    expires_at: Option<Instant>,
    last_used: Instant,
}

impl CachedPublicKey {
    fn new(key: VerifyingKey, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            key,
            expires_at: ttl.map(|ttl| now + ttl),
            last_used: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Entries removed by TTL expiry or LRU eviction
    pub evictions: u64,
}

// =============================================================================
// In-memory cache
// =============================================================================

/// In-process [`PublicKeyCache`] backed by a concurrent map.
pub struct MemoryPublicKeyCache {
    entries: DashMap<IdentityId, CachedPublicKey>,
    config: PublicKeyCacheConfig,
    stats: CacheStats,
}

impl MemoryPublicKeyCache {
    pub fn new(config: PublicKeyCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PublicKeyCacheConfig::default())
    }

    pub fn config(&self) -> &PublicKeyCacheConfig {
        &self.config
    }

    /// Whether a live entry exists, without touching its LRU position.
    pub fn contains(&self, id: &IdentityId) -> bool {
        self.entries
            .get(id)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Returns true if an entry was removed.
    pub fn remove(&self, id: &IdentityId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                self.stats.record_eviction();
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_used)
            .map(|entry| entry.key().clone());

        if let Some(id) = oldest {
            self.entries.remove(&id);
            self.stats.record_eviction();
        }
    }
}

impl Default for MemoryPublicKeyCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for MemoryPublicKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPublicKeyCache")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl PublicKeyCache for MemoryPublicKeyCache {
    fn get(&self, id: &IdentityId) -> Result<VerifyingKey, CacheError> {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(id);
                self.stats.record_miss();
                self.stats.record_eviction();
                return Err(CacheError::NotFound(id.to_string()));
            }

            entry.touch();
            self.stats.record_hit();
            return Ok(entry.key.clone());
        }

        self.stats.record_miss();
        Err(CacheError::NotFound(id.to_string()))
    }

    fn set(&self, id: &IdentityId, key: VerifyingKey) -> Result<(), CacheError> {
        if self.config.max_entries == 0 {
            return Ok(());
        }
        if !self.entries.contains_key(id) && self.entries.len() >= self.config.max_entries {
            self.evict_lru();
        }

        self.entries
            .insert(id.clone(), CachedPublicKey::new(key, self.config.default_ttl));
        self.stats.record_insert();
        Ok(())
    }
}

/// Periodically drop expired entries from `cache`.
///
/// Runs until the returned handle is aborted or the runtime shuts down.
pub fn spawn_cleanup_task(cache: Arc<MemoryPublicKeyCache>) -> tokio::task::JoinHandle<()> {
    let interval = cache.config().cleanup_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                debug!(entries_removed = removed, "Cleaned up expired public keys");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_identity_id;
    use crate::keys::generate_keypair;

    fn entry() -> (IdentityId, VerifyingKey) {
        let (_, verifying_key) = generate_keypair().unwrap();
        (derive_identity_id(&verifying_key), verifying_key)
    }

    #[test]
    fn test_set_and_get() {
        let cache = MemoryPublicKeyCache::with_defaults();
        let (id, key) = entry();

        cache.set(&id, key.clone()).unwrap();
        assert_eq!(cache.get(&id).unwrap(), key);
        assert!(cache.contains(&id));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.inserts, 1);
    }

    #[test]
    fn test_miss_is_not_found() {
        let cache = MemoryPublicKeyCache::with_defaults();
        let (id, _) = entry();

        assert!(matches!(cache.get(&id), Err(CacheError::NotFound(_))));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expiry() {
        let cache = MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            default_ttl: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        let (id, key) = entry();

        cache.set(&id, key).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(!cache.contains(&id));
        assert!(matches!(cache.get(&id), Err(CacheError::NotFound(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let cache = MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            default_ttl: None,
            ..Default::default()
        });
        let (id, key) = entry();

        cache.set(&id, key).unwrap();
        assert_eq!(cache.cleanup(), 0);
        assert!(cache.get(&id).is_ok());
    }

    #[test]
    fn test_cleanup() {
        let cache = MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            default_ttl: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        for _ in 0..3 {
            let (id, key) = entry();
            cache.set(&id, key).unwrap();
        }
        assert_eq!(cache.len(), 3);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.cleanup(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        let (first, first_key) = entry();
        let (second, second_key) = entry();
        let (third, third_key) = entry();

        cache.set(&first, first_key).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.set(&second, second_key).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        // Touch the first so the second becomes least recently used
        cache.get(&first).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        cache.set(&third, third_key).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&first));
        assert!(!cache.contains(&second));
        assert!(cache.contains(&third));
    }

    #[test]
    fn test_replacing_does_not_evict() {
        let cache = MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            max_entries: 1,
            ..Default::default()
        });
        let (id, key) = entry();

        cache.set(&id, key.clone()).unwrap();
        cache.set(&id, key).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps_expired_entries() {
        let cache = Arc::new(MemoryPublicKeyCache::new(PublicKeyCacheConfig {
            default_ttl: Some(Duration::from_millis(10)),
            cleanup_interval: Duration::from_millis(20),
            ..Default::default()
        }));
        let (id, key) = entry();
        cache.set(&id, key).unwrap();

        let task = spawn_cleanup_task(cache.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();

        // Swept without any lookup touching the entry
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_remove() {
        let cache = MemoryPublicKeyCache::with_defaults();
        let (id, key) = entry();

        cache.set(&id, key).unwrap();
        assert!(cache.remove(&id));
        assert!(!cache.remove(&id));
    }
}
