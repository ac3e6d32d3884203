//! Resilience guard daemon.
//!
//! Hosts the shared breaker and rate-limit state for operators: serves the
//! admin API, publishes periodic health reports, exports metrics and
//! hot-reloads rate limits from the config file.
//!
//! ```text
//!   config.toml ──▶ loader ──▶ Components { store, breakers, limiter }
//!        │                          │
//!        ▼                          ├──▶ HealthMonitor (interval)
//!   ConfigWatcher ──▶ limiter       ├──▶ store sweeper (interval)
//!                                   └──▶ admin API (axum)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_guard::admin::{setup_admin_router, AdminState};
use resilience_guard::config::{load_config, watcher::ConfigWatcher, GuardConfig};
use resilience_guard::health::HealthMonitor;
use resilience_guard::lifecycle::{signals::wait_for_signal, Components, Shutdown};
use resilience_guard::observability::{logging, metrics};
use resilience_guard::store::run_sweeper;

#[derive(Parser, Debug)]
#[command(name = "resilience-guard", version, about = "Shared circuit breaker and rate limit daemon")]
struct Args {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilience-guard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let components = Components::build(&config).await?;
    let shutdown = Shutdown::new();

    let monitor = HealthMonitor::new(
        components.breakers.clone(),
        components.limiter.clone(),
        components.clock.clone(),
        config.health.clone(),
    );
    let latest = monitor.latest();
    let monitor_task = tokio::spawn(monitor.run(shutdown.subscribe()));
    let sweeper_task = tokio::spawn(run_sweeper(
        components.store.clone(),
        Duration::from_secs(config.store.sweep_interval_secs),
        shutdown.subscribe(),
    ));

    // Held until shutdown; dropping it stops the file watch.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let limiter = components.limiter.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(new_config) = updates.recv() => {
                            limiter.update_limits(new_config.rate_limits);
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState::new(components.clone(), latest, config.admin.api_key.as_str()));
        let mut stop = shutdown.subscribe();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await
        });

        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        shutdown.trigger();

        match server.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API server failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    } else {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        shutdown.trigger();
    }

    let _ = monitor_task.await;
    let _ = sweeper_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
