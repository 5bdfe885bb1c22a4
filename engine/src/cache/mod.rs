//! Intent Cache
//!
//! Process-wide TTL cache in front of the NLU analysis call, keyed by the
//! normalized utterance text. Repeated or near-duplicate requests (differing
//! only in case or spacing) are answered from memory.
//!
//! Expiry is lazy: a stale entry is replaced when its key is looked up, and
//! every miss purges all other stale entries. There is no background sweep
//! and no size bound; the map grows until `clear()` or process exit.
//!
//! The map sits behind a single mutex. The lock is never held across the
//! compute future, so two concurrent misses on the same key may both compute;
//! the later write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Normalize utterance text into a cache key: lowercase, whitespace runs
/// collapsed to a single space, trimmed.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// TTL cache keyed by normalized utterance
#[derive(Debug)]
pub struct IntentCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> IntentCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `utterance`, or compute and store it.
    ///
    /// Errors from `compute` are returned as-is and nothing is stored.
    pub async fn get_or_compute<F, Fut, E>(&self, utterance: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = normalize(utterance);

        {
            let mut entries = self.lock();
            match entries.get(&key) {
                Some(entry) if self.is_fresh(entry) => {
                    debug!("Intent cache hit for '{}'", preview(&key));
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    entries.remove(&key);
                    debug!("Intent cache entry expired for '{}'", preview(&key));
                }
                None => debug!("Intent cache miss for '{}'", preview(&key)),
            }
        }

        let value = compute().await?;

        let mut entries = self.lock();
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );

        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired intent cache entries", purged);
        }

        Ok(value)
    }

    /// Look up a fresh entry without computing anything
    pub fn get(&self, utterance: &str) -> Option<V> {
        let entries = self.lock();
        entries
            .get(&normalize(utterance))
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry unconditionally
    pub fn clear(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        tracing::info!("Intent cache cleared ({} entries)", count);
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        entry.stored_at.elapsed() < self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn preview(key: &str) -> String {
    key.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Create Project  X "), normalize("create project x"));
        assert_eq!(normalize("Show\tproject\n42"), "show project 42");
        assert_eq!(normalize("   "), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_computes_once() {
        let cache = IntentCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        for text in ["Create Project X", "  create   project x "] {
            let value = cache
                .get_or_compute(text, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recompute_after_ttl() {
        let cache = IntentCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);
        let compute = || async {
            Ok::<_, Infallible>(calls.fetch_add(1, Ordering::SeqCst))
        };

        assert_eq!(cache.get_or_compute("show tasks", compute).await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get_or_compute("show tasks", compute).await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get_or_compute("show tasks", compute).await.unwrap(), 1);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_purges_other_expired_entries() {
        let cache = IntentCache::new(Duration::from_secs(10));
        let ok = |v: u32| move || async move { Ok::<_, Infallible>(v) };

        cache.get_or_compute("first", ok(1)).await.unwrap();
        cache.get_or_compute("second", ok(2)).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        // Expired entries linger until the next miss
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("first"), None);

        cache.get_or_compute("third", ok(3)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("third"), Some(3));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: IntentCache<u32> = IntentCache::new(Duration::from_secs(60));

        let err = cache
            .get_or_compute("broken", || async { Err::<u32, _>("upstream down") })
            .await;
        assert_eq!(err, Err("upstream down"));
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute("broken", || async { Ok::<_, &str>(5) })
            .await;
        assert_eq!(ok, Ok(5));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = IntentCache::new(Duration::from_secs(60));
        cache
            .get_or_compute("a", || async { Ok::<_, Infallible>(1) })
            .await
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[tokio::test]
    async fn test_no_size_bound() {
        // Known gap: nothing caps the number of live entries
        let cache = IntentCache::new(Duration::from_secs(3600));
        for i in 0..2_000 {
            cache
                .get_or_compute(&format!("utterance {}", i), || async move {
                    Ok::<_, Infallible>(i)
                })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2_000);
    }
}
