//! DrainWorker: background worker that turns claimed outbox entries
//! into ledger events
//!
//! Claims a batch, groups it by tenant, and processes each tenant's
//! entries strictly in claim order while holding that tenant's chain
//! cursor. One transaction per entry. Failures increment the entry's
//! attempt count; exhausted entries route to the DLQ, so nothing is ever
//! dropped. Retry cadence is the poll loop itself; the worker never
//! sleeps-and-retries inline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chain::HashChainEngine;
use crate::dlq::DlqManager;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, OutboxStore};
use crate::types::{DrainStats, ErrorCategory, NewLedgerEvent, OutboxEntry};
use shared::util::now_millis;

/// Tuning knobs for one drain worker
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub batch_size: i64,
    pub lease_ms: i64,
    pub poll_interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            lease_ms: 30_000,
            poll_interval: Duration::from_secs(2),
        }
    }
}

pub struct DrainWorker {
    worker_id: String,
    outbox: Arc<dyn OutboxStore>,
    ledger: Arc<dyn LedgerStore>,
    chain: Arc<HashChainEngine>,
    dlq: Arc<DlqManager>,
    config: DrainConfig,
    shutdown: CancellationToken,
}

impl DrainWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        outbox: Arc<dyn OutboxStore>,
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<HashChainEngine>,
        dlq: Arc<DlqManager>,
        config: DrainConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            outbox,
            ledger,
            chain,
            dlq,
            config,
            shutdown,
        }
    }

    /// Run the drain loop until cancelled
    pub async fn run(self) {
        tracing::info!(worker = %self.worker_id, "DrainWorker started");

        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(worker = %self.worker_id, "DrainWorker shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let started = std::time::Instant::now();
                    match self.drain_once().await {
                        Ok(stats) if stats.claimed > 0 => {
                            tracing::debug!(
                                worker = %self.worker_id,
                                claimed = stats.claimed,
                                processed = stats.processed,
                                failed = stats.failed,
                                dead_lettered = stats.dead_lettered,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "drain pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(worker = %self.worker_id, "drain pass failed: {e}");
                        }
                    }
                }
            }
        }

        tracing::info!(worker = %self.worker_id, "DrainWorker stopped");
    }

    /// One claim-and-process pass. Public so tests and schedulers can
    /// drive it directly.
    pub async fn drain_once(&self) -> LedgerResult<DrainStats> {
        let batch = self
            .outbox
            .claim_batch(self.config.batch_size, &self.worker_id, self.config.lease_ms)
            .await?;

        let mut stats = DrainStats {
            claimed: batch.len() as u64,
            ..DrainStats::default()
        };
        if batch.is_empty() {
            return Ok(stats);
        }

        // claim order within each tenant is preserved by the claim query
        let mut by_tenant: BTreeMap<String, Vec<OutboxEntry>> = BTreeMap::new();
        for entry in batch {
            by_tenant.entry(entry.tenant_id.clone()).or_default().push(entry);
        }

        for (tenant_id, entries) in by_tenant {
            // one chain cursor per tenant for the whole group
            let mut guard = self.chain.lock_tenant(&tenant_id).await;

            for entry in entries {
                match self.process_entry(&mut guard, &tenant_id, &entry).await {
                    Ok(()) => stats.processed += 1,
                    Err(e) => {
                        stats.failed += 1;
                        // the cache may now disagree with the store
                        *guard = None;
                        if self.record_failure(&entry, &e).await? {
                            stats.dead_lettered += 1;
                        }
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn process_entry(
        &self,
        guard: &mut crate::chain::engine::ChainGuard,
        tenant_id: &str,
        entry: &OutboxEntry,
    ) -> LedgerResult<()> {
        let timestamp = now_millis();
        let link = self
            .chain
            .next_hash(
                guard,
                self.ledger.as_ref(),
                tenant_id,
                &entry.event_type,
                &entry.payload,
                timestamp,
            )
            .await?;

        let event = NewLedgerEvent {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            sequence_no: link.sequence_no,
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            actor: entry.actor.clone(),
            timestamp,
            chain_hash: link.chain_hash.clone(),
            prev_chain_hash: link.prev_chain_hash.clone(),
        };

        self.ledger.append_event(event, entry.id).await?;
        HashChainEngine::advance(guard, tenant_id, &link);
        Ok(())
    }

    /// Record one failed attempt; returns true when the entry was
    /// dead-lettered.
    async fn record_failure(&self, entry: &OutboxEntry, error: &LedgerError) -> LedgerResult<bool> {
        if error.is_transient() {
            tracing::warn!(
                outbox_id = %entry.id,
                tenant = %entry.tenant_id,
                attempt = entry.attempts + 1,
                max_attempts = entry.max_attempts,
                "ledger insert failed, will retry: {error}"
            );
        } else {
            tracing::error!(
                outbox_id = %entry.id,
                tenant = %entry.tenant_id,
                attempt = entry.attempts + 1,
                max_attempts = entry.max_attempts,
                "ledger insert failed: {error}"
            );
        }

        let updated = self.outbox.mark_failed(entry.id, &error.to_string()).await?;
        if updated.attempts < updated.max_attempts {
            return Ok(false);
        }

        self.dlq
            .move_to_dlq(&updated, &error.to_string(), categorize(error))
            .await?;
        Ok(true)
    }
}

/// Map an infrastructure error to the DLQ failure taxonomy. Chain
/// conflicts are retryable but still file as `Integrity` so a replayed
/// entry's history shows what actually went wrong.
fn categorize(error: &LedgerError) -> ErrorCategory {
    match error {
        LedgerError::Serialization(_) => ErrorCategory::Serialization,
        LedgerError::ChainConflict(_) => ErrorCategory::Integrity,
        e if e.is_transient() => ErrorCategory::Transient,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_taxonomy_tracks_transience() {
        let db = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert!(db.is_transient());
        assert_eq!(categorize(&db), ErrorCategory::Transient);

        let s3 = LedgerError::ObjectStore("timeout".into());
        assert!(s3.is_transient());
        assert_eq!(categorize(&s3), ErrorCategory::Transient);

        let conflict = LedgerError::ChainConflict("t".into());
        assert!(conflict.is_transient());
        assert_eq!(categorize(&conflict), ErrorCategory::Integrity);

        let bad_json = LedgerError::Serialization(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        );
        assert!(!bad_json.is_transient());
        assert_eq!(categorize(&bad_json), ErrorCategory::Serialization);

        let missing = LedgerError::NotFound("OutboxEntry".into());
        assert!(!missing.is_transient());
        assert_eq!(categorize(&missing), ErrorCategory::Unknown);
    }
}
