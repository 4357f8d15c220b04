//! Ledger server configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ledger server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// S3 bucket for export files and manifests
    pub export_s3_bucket: String,
    /// Environment: development | staging | production
    pub environment: String,
    /// Number of concurrent drain workers
    pub drain_worker_count: usize,
    /// Outbox entries claimed per drain pass
    pub drain_batch_size: i64,
    /// Drain poll interval in milliseconds
    pub drain_poll_interval_ms: u64,
    /// Claim lease duration in milliseconds
    pub outbox_lease_ms: i64,
    /// Default delivery attempts before dead-lettering
    pub outbox_max_attempts: i32,
    /// Health log interval in seconds
    pub health_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            export_s3_bucket: std::env::var("EXPORT_S3_BUCKET")
                .unwrap_or_else(|_| "audit-ledger-exports".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            drain_worker_count: std::env::var("DRAIN_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            drain_batch_size: std::env::var("DRAIN_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            drain_poll_interval_ms: std::env::var("DRAIN_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_000),
            outbox_lease_ms: std::env::var("OUTBOX_LEASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
            outbox_max_attempts: std::env::var("OUTBOX_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            health_interval_secs: std::env::var("HEALTH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}
