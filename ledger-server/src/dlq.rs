//! Dead-letter manager
//!
//! Parks permanently-failed outbox entries, supports tenant-scoped
//! inspection and single/bulk replay. Replay is an explicit
//! re-submission: it enqueues a *new* outbox entry (the dead original
//! and the DLQ row are both retained as history) and the replayed
//! event is appended at the current chain tip, not at its original
//! position.

use std::sync::Arc;

use uuid::Uuid;

use crate::chain::HashChainEngine;
use crate::error::LedgerResult;
use crate::store::{DlqStore, OutboxStore};
use crate::tenant::validate_tenant_id;
use crate::types::{BulkReplayOutcome, DlqEntry, ErrorCategory, OutboxEntry};
use shared::util::now_millis;

pub struct DlqManager {
    dlq: Arc<dyn DlqStore>,
    outbox: Arc<dyn OutboxStore>,
    chain: Arc<HashChainEngine>,
    /// max_attempts stamped on re-enqueued entries
    replay_max_attempts: i32,
}

impl DlqManager {
    pub fn new(
        dlq: Arc<dyn DlqStore>,
        outbox: Arc<dyn OutboxStore>,
        chain: Arc<HashChainEngine>,
        replay_max_attempts: i32,
    ) -> Self {
        Self {
            dlq,
            outbox,
            chain,
            replay_max_attempts,
        }
    }

    /// Park an exhausted outbox entry. Called exclusively by the drain
    /// worker; preserves the full payload so the entry stays replayable.
    pub async fn move_to_dlq(
        &self,
        entry: &OutboxEntry,
        last_error: &str,
        category: ErrorCategory,
    ) -> LedgerResult<DlqEntry> {
        let dead = DlqEntry {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id.clone(),
            outbox_id: entry.id,
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            actor: entry.actor.clone(),
            last_error: last_error.to_string(),
            error_category: category,
            attempt_count: entry.attempts,
            dead_at: now_millis(),
            replayed_at: None,
            replayed_by: None,
            replay_count: 0,
        };

        self.dlq.insert(dead.clone()).await?;
        self.outbox.mark_dead(entry.id).await?;

        tracing::warn!(
            dlq_id = %dead.id,
            outbox_id = %entry.id,
            tenant = %entry.tenant_id,
            event_type = %entry.event_type,
            category = category.as_str(),
            "outbox entry dead-lettered"
        );
        Ok(dead)
    }

    /// Tenant-scoped listing, newest-dead first
    pub async fn list(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<Vec<DlqEntry>> {
        validate_tenant_id(tenant_id)?;
        self.dlq.list(tenant_id, limit, offset).await
    }

    /// Read one entry
    pub async fn inspect(&self, tenant_id: &str, id: Uuid) -> LedgerResult<Option<DlqEntry>> {
        validate_tenant_id(tenant_id)?;
        self.dlq.get(tenant_id, id).await
    }

    /// Replay one entry: re-enqueue the payload as a fresh outbox
    /// entry, stamp the DLQ row, and reset the tenant's chain cursor so
    /// the next sequence is re-derived from persisted state.
    ///
    /// Returns false when the entry does not exist.
    pub async fn retry(&self, tenant_id: &str, id: Uuid, replayed_by: &str) -> LedgerResult<bool> {
        validate_tenant_id(tenant_id)?;

        let Some(entry) = self.dlq.get(tenant_id, id).await? else {
            return Ok(false);
        };

        self.outbox
            .enqueue(
                tenant_id,
                &entry.event_type,
                entry.payload.clone(),
                entry.actor.as_deref(),
                self.replay_max_attempts,
            )
            .await?;
        self.dlq.mark_replayed(id, replayed_by, now_millis()).await?;

        // cached chain position may predate the replay; force re-derivation
        self.chain.reset_tenant(tenant_id);

        tracing::info!(
            dlq_id = %id,
            tenant = %tenant_id,
            replayed_by = %replayed_by,
            "DLQ entry re-enqueued"
        );
        Ok(true)
    }

    /// Replay up to `limit` unreplayed entries oldest-first, counting
    /// individual failures without aborting the batch.
    pub async fn bulk_replay(
        &self,
        tenant_id: &str,
        replayed_by: &str,
        limit: i64,
    ) -> LedgerResult<BulkReplayOutcome> {
        validate_tenant_id(tenant_id)?;

        let entries = self.dlq.list_unreplayed(tenant_id, limit).await?;
        let mut outcome = BulkReplayOutcome::default();

        for entry in entries {
            match self.retry(tenant_id, entry.id, replayed_by).await {
                Ok(true) => outcome.replayed += 1,
                Ok(false) => outcome.errors += 1,
                Err(e) => {
                    outcome.errors += 1;
                    tracing::error!(dlq_id = %entry.id, tenant = %tenant_id, "replay failed: {e}");
                }
            }
        }

        tracing::info!(
            tenant = %tenant_id,
            replayed = outcome.replayed,
            errors = outcome.errors,
            "bulk replay complete"
        );
        Ok(outcome)
    }

    /// Unreplayed depth for health/alerting; no tenant filter means the
    /// cross-tenant aggregate.
    pub async fn count_unreplayed(&self, tenant_id: Option<&str>) -> LedgerResult<u64> {
        if let Some(tenant) = tenant_id {
            validate_tenant_id(tenant)?;
        }
        self.dlq.count_unreplayed(tenant_id).await
    }
}
