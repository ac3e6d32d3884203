//! Shared state store subsystem.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker / RateLimiter
//!     → SharedStore (get / set / delete / incr)
//!     → memory.rs (process-local, DashMap + TTL)
//!     → file.rs   (single node, JSON file survives restart)
//!     → redis.rs  (cross-process, feature = "redis")
//! ```
//!
//! # Design Decisions
//! - Values are strings; structured values are JSON encoded by the caller
//! - `incr` has a non-atomic default so every backend works, backends that
//!   can do better override it
//! - Pattern deletion is an optional capability, checked before use
//! - Rate-limit buckets are never read again once their window passes, so
//!   backends without native expiry are swept (see `sweeper.rs`)

pub mod file;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod sweeper;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sweeper::run_sweeper;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local filesystem failure (file backend).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend rejected or failed the command.
    #[error("{backend} error: {reason}")]
    Backend { backend: &'static str, reason: String },

    /// The backend does not offer this operation.
    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

/// Key-value store shared by every process guarding the same dependency.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a key. Expired or missing keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key. `ttl = None` keeps the key until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Increment an integer counter by one and return the new value.
    ///
    /// The default is a plain read-then-write. It races with other writers
    /// of the same key; backends with a native increment override it.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let current = match self.get(key).await? {
            Some(raw) => parse_counter(key, &raw)?,
            None => 0,
        };
        let next = current + 1;
        self.set(key, &next.to_string(), ttl).await?;
        Ok(next)
    }

    /// Whether `delete_pattern` is implemented.
    fn supports_pattern_delete(&self) -> bool {
        false
    }

    /// Delete every key matching a glob pattern (`*` and `?`).
    async fn delete_pattern(&self, _pattern: &str) -> Result<usize, StoreError> {
        Err(StoreError::Unsupported("delete_pattern"))
    }

    /// Drop expired keys still held by the backend and return how many.
    ///
    /// Backends that expire keys on their own keep the default no-op.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Parse a stored counter value.
pub fn parse_counter(key: &str, raw: &str) -> Result<u64, StoreError> {
    raw.trim().parse::<u64>().map_err(|e| StoreError::Backend {
        backend: "counter",
        reason: format!("key {} holds non-integer value {:?}: {}", key, raw, e),
    })
}

/// Read an integer counter, treating a missing key as zero.
pub async fn get_counter(store: &dyn SharedStore, key: &str) -> Result<u64, StoreError> {
    match store.get(key).await? {
        Some(raw) => parse_counter(key, &raw),
        None => Ok(0),
    }
}

/// Read a JSON encoded value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn SharedStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Write a JSON encoded value.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}
