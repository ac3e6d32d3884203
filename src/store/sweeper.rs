//! Periodic removal of expired keys.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::store::SharedStore;

/// Call `purge_expired` on `store` every `interval` until shutdown.
pub async fn run_sweeper(store: Arc<dyn SharedStore>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    tracing::info!(
        backend = store.backend_name(),
        interval_secs = interval.as_secs(),
        "Store sweeper starting"
    );

    let mut ticker = time::interval(interval);
    // The first tick completes immediately; nothing has expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired store keys"),
                    Err(e) => {
                        metrics::record_store_error("sweeper");
                        tracing::warn!(error = %e, "Failed to purge expired store keys");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Store sweeper received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_sweeper_purges_until_shutdown() {
        let store = MemoryStore::new();
        for i in 0..50 {
            store
                .set(&format!("rate_limit:ai:burst:{}", i), "1", Some(Duration::from_millis(5)))
                .await
                .unwrap();
        }
        store.set("circuit_breaker:ai:state", "closed", None).await.unwrap();

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(run_sweeper(
            Arc::new(store.clone()),
            Duration::from_millis(20),
            shutdown.subscribe(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 0, "sweeper left expired keys behind");
        assert_eq!(store.len(), 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
