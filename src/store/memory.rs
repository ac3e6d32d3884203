//! Process-local store backed by a concurrent map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use wildmatch::WildMatch;

use crate::store::{parse_counter, SharedStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Writes between opportunistic sweeps of expired entries.
const SWEEP_EVERY: u64 = 1024;

/// In-memory store. Clones share the same map.
///
/// Visible only inside one process, so breaker state does not survive a
/// restart. `incr` is atomic with respect to other users of the same map.
/// Expired entries are also swept every `SWEEP_EVERY` writes, since stale
/// rate-limit buckets are never read again.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.iter().filter(|r| !r.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.inner.len())
    }

    /// Must not be called while holding a reference into the map.
    fn note_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let removed = self.sweep();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired memory store entries");
            }
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), Entry::new(value.to_string(), ttl));
        self.note_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = Instant::now();
        let next = {
            let mut entry = self
                .inner
                .entry(key.to_string())
                .or_insert_with(|| Entry::new("0".to_string(), ttl));

            if entry.is_expired(now) {
                *entry = Entry::new("0".to_string(), ttl);
            }

            let next = parse_counter(key, &entry.value)? + 1;
            entry.value = next.to_string();
            if let Some(ttl) = ttl {
                entry.expires_at = Some(now + ttl);
            }
            next
        };
        self.note_write();
        Ok(next)
    }

    fn supports_pattern_delete(&self) -> bool {
        true
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, StoreError> {
        let matcher = WildMatch::new(pattern);
        let before = self.inner.len();
        self.inner.retain(|key, _| !matcher.matches(key));
        Ok(before - self.inner.len())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(self.sweep())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", "1", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("short", "x", Some(Duration::from_millis(20))).await.unwrap();
        store.set("long", "y", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(store.get("long").await.unwrap().as_deref(), Some("y"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_incr_is_consistent_under_contention() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.incr("counter", Some(Duration::from_secs(60))).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get("counter").await.unwrap().as_deref(), Some("400"));
    }

    #[tokio::test]
    async fn test_incr_restarts_expired_counter() {
        let store = MemoryStore::new();
        store.incr("c", Some(Duration::from_millis(10))).await.unwrap();
        store.incr("c", Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.incr("c", Some(Duration::from_millis(10))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_buckets_are_swept_without_being_read() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            let key = format!("rate_limit:ai:burst:{}:user-{}", i, i);
            store.incr(&key, Some(Duration::from_millis(5))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.incr("rate_limit:ai:minute:1", Some(Duration::from_secs(120))).await.unwrap();

        // Enough further writes to cross a sweep boundary.
        for _ in 0..SWEEP_EVERY {
            store.set("rate_limit:ai:day:1", "1", Some(Duration::from_secs(90_000))).await.unwrap();
        }
        assert_eq!(store.inner.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired_reports_removed_entries() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.set(&format!("k{}", i), "1", Some(Duration::from_millis(5))).await.unwrap();
        }
        store.set("live", "1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 10);
        assert_eq!(store.inner.len(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let store = MemoryStore::new();
        store.set("rate_limit:ai:burst:1", "1", None).await.unwrap();
        store.set("rate_limit:ai:burst:2:user-1", "1", None).await.unwrap();
        store.set("rate_limit:ai:minute:1", "1", None).await.unwrap();

        let removed = store.delete_pattern("rate_limit:ai:burst:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("rate_limit:ai:minute:1").await.unwrap().is_some());
    }
}
