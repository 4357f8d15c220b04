//! ledger-server: tamper-evident audit ledger service
//!
//! Long-running service that:
//! - Drains the transactional outbox into per-tenant hash chains
//! - Parks exhausted entries in the dead-letter queue
//! - Reports queue-depth health on an interval

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ledger_server::config::Config;
use ledger_server::drain::{DrainConfig, DrainWorker};
use ledger_server::health;
use ledger_server::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_server=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting ledger-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;

    let shutdown = CancellationToken::new();
    let drain_config = DrainConfig {
        batch_size: config.drain_batch_size,
        lease_ms: config.outbox_lease_ms,
        poll_interval: config.drain_poll_interval(),
    };

    let mut workers = Vec::with_capacity(config.drain_worker_count);
    for i in 0..config.drain_worker_count {
        let worker = DrainWorker::new(
            format!("drain-{i}"),
            state.outbox.clone(),
            state.ledger.clone(),
            state.chain.clone(),
            state.dlq.clone(),
            drain_config.clone(),
            shutdown.clone(),
        );
        workers.push(tokio::spawn(worker.run()));
    }

    // periodic health log
    let health_handle = tokio::spawn({
        let outbox = state.outbox.clone();
        let dlq_store = state.dlq_store.clone();
        let token = shutdown.clone();
        let interval = Duration::from_secs(config.health_interval_secs);
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = health::check(outbox.as_ref(), dlq_store.as_ref()).await;
                        tracing::info!(
                            status = report.status.as_str(),
                            pending = report.pending_outbox,
                            dlq = report.dlq_depth,
                            "health"
                        );
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    for handle in workers {
        let _ = handle.await;
    }
    let _ = health_handle.await;
    state.pool.close().await;

    tracing::info!("ledger-server stopped");
    Ok(())
}
