//! Redis store for state shared across processes.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::store::{SharedStore, StoreError};

fn backend_error(e: redis::RedisError) -> StoreError {
    StoreError::Backend {
        backend: "Redis",
        reason: e.to_string(),
    }
}

pub struct RedisStore {
    connection_manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_string).map_err(backend_error)?;
        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(backend_error)?;

        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.get(key).await.map_err(backend_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(backend_error),
            None => conn.set(key, value).await.map_err(backend_error),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        conn.del(key).await.map_err(backend_error)
    }

    /// `INCR` and `EXPIRE` in one MULTI/EXEC transaction.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut conn = self.connection_manager.clone();
        match ttl {
            Some(ttl) => {
                let (count,): (u64,) = redis::pipe()
                    .atomic()
                    .incr(key, 1)
                    .expire(key, ttl.as_secs().max(1) as i64)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .map_err(backend_error)?;
                Ok(count)
            }
            None => conn.incr(key, 1).await.map_err(backend_error),
        }
    }

    fn supports_pattern_delete(&self) -> bool {
        true
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection_manager.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(backend_error)?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await.map_err(backend_error)?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
