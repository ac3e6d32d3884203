//! JSON file store for single-node deployments.
//!
//! Every write rewrites the file so breaker state survives a restart.
//! Expired entries are dropped before each rewrite. File I/O after `open`
//! runs on the blocking pool. The file is not locked against other
//! processes; use the Redis backend when several processes guard the same
//! dependency.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use wildmatch::WildMatch;

use crate::store::{parse_counter, SharedStore, StoreError};

type Entries = HashMap<String, FileEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    /// Expiry as seconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<f64>,
}

impl FileEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| unix_now() + ttl.as_secs_f64()),
        }
    }

    fn is_expired(&self, now: f64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn drop_expired(entries: &mut Entries) -> usize {
    let now = unix_now();
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    before - entries.len()
}

/// Write `bytes` to a sibling tmp file, then rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Store persisted to a JSON file.
pub struct FileStore {
    path: Arc<PathBuf>,
    entries: Mutex<Entries>,
}

impl FileStore {
    /// Open a store, loading the file if it exists. Expired entries are dropped.
    ///
    /// Reads synchronously; call it during startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Entries::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            entries = serde_json::from_reader(reader)?;
            drop_expired(&mut entries);
            tracing::info!(path = %path.display(), keys = entries.len(), "Loaded state store file");
        }

        Ok(Self {
            path: Arc::new(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sweep, serialize and write the map while the caller still holds the
    /// lock, so rewrites land in the order their changes were made.
    async fn persist(&self, entries: &mut MutexGuard<'_, Entries>) -> Result<(), StoreError> {
        drop_expired(entries);
        let bytes = serde_json::to_vec(&**entries)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Backend {
                backend: "file",
                reason: format!("write task failed: {}", e),
            })?
    }
}

#[async_trait]
impl SharedStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(unix_now()))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), FileEntry::new(value.to_string(), ttl));
        self.persist(&mut entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&mut entries).await?;
        }
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = unix_now();
        let current = match entries.get(key) {
            Some(e) if !e.is_expired(now) => parse_counter(key, &e.value)?,
            _ => 0,
        };
        let next = current + 1;
        entries.insert(key.to_string(), FileEntry::new(next.to_string(), ttl));
        self.persist(&mut entries).await?;
        Ok(next)
    }

    fn supports_pattern_delete(&self) -> bool {
        true
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, StoreError> {
        let matcher = WildMatch::new(pattern);
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !matcher.matches(key));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&mut entries).await?;
        }
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let removed = drop_expired(&mut entries);
        if removed > 0 {
            self.persist(&mut entries).await?;
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("circuit_breaker:ai:state", "open", None).await.unwrap();
        assert_eq!(store.incr("circuit_breaker:ai:failures", None).await.unwrap(), 1);
        assert_eq!(store.incr("circuit_breaker:ai:failures", None).await.unwrap(), 2);
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("circuit_breaker:ai:state").await.unwrap().as_deref(),
            Some("open")
        );
        assert_eq!(
            reopened.get("circuit_breaker:ai:failures").await.unwrap().as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).unwrap();

        store.set("k", "v", Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.incr("k", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rewrite_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();

        for i in 0..200 {
            let key = format!("rate_limit:ai:burst:{}:user-{}", i, i);
            store.incr(&key, Some(Duration::from_millis(5))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.set("circuit_breaker:ai:state", "closed", None).await.unwrap();

        let on_disk: HashMap<String, FileEntry> =
            serde_json::from_reader(BufReader::new(File::open(&path).unwrap())).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert!(on_disk.contains_key("circuit_breaker:ai:state"));
    }

    #[tokio::test]
    async fn test_purge_expired_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();
        store.set("k", "v", Some(Duration::from_millis(5))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        let on_disk: HashMap<String, FileEntry> =
            serde_json::from_reader(BufReader::new(File::open(&path).unwrap())).unwrap();
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).unwrap();
        store.set("rate_limit:ai:burst:7", "1", None).await.unwrap();
        store.set("rate_limit:ai:day:1", "1", None).await.unwrap();

        assert_eq!(store.delete_pattern("rate_limit:ai:burst:*").await.unwrap(), 1);
        assert!(store.get("rate_limit:ai:day:1").await.unwrap().is_some());
    }
}
