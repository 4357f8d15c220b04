//! Storage seams for the ledger subsystem
//!
//! Narrow interfaces with one production adapter (PostgreSQL, `db/`)
//! and one in-memory adapter (`memory`, the test backend). Core logic
//! depends only on these traits and never branches on the backend.
//!
//! Privileged mutation is deliberately split out: `AdminStore` is the
//! low-level client for the privilege-escalated procedures, and the
//! `PrivilegedGateway` in `tenant.rs` is its only caller.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::types::{DlqEntry, ExportManifest, IntegrityReport, LedgerEvent, NewLedgerEvent, OutboxEntry};

/// Durable queue of pending audit events.
///
/// `enqueue` here opens its own transaction and serves replay and
/// tests; business callers that must stay atomic with their own
/// mutation use `db::outbox::enqueue` on their open connection.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new pending entry
    async fn enqueue(
        &self,
        tenant_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
        max_attempts: i32,
    ) -> LedgerResult<OutboxEntry>;

    /// Atomically claim up to `limit` pending entries, oldest-first per
    /// tenant, stamping an expiring lease. Expired leases are
    /// reclaimable; tenants with a live claim are skipped entirely so
    /// no two workers ever hold entries for the same tenant.
    async fn claim_batch(
        &self,
        limit: i64,
        worker_id: &str,
        lease_ms: i64,
    ) -> LedgerResult<Vec<OutboxEntry>>;

    /// Record a failed attempt (increments `attempts`, releases the
    /// claim) and return the updated row so the caller can check
    /// exhaustion. Idempotent per attempt.
    async fn mark_failed(&self, id: Uuid, error: &str) -> LedgerResult<OutboxEntry>;

    /// Terminal `-> dead` transition once the entry is dead-lettered
    async fn mark_dead(&self, id: Uuid) -> LedgerResult<()>;

    /// Pending backlog across all tenants (health reporting)
    async fn count_pending(&self) -> LedgerResult<u64>;

    /// Entries in terminal `dead` status
    async fn count_dead(&self) -> LedgerResult<u64>;
}

/// Durable, immutable ledger of chained audit events
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the ledger row and mark the originating outbox entry
    /// processed in one transaction. The adapter must make a duplicate
    /// `(tenant_id, sequence_no)` insert fail rather than succeed;
    /// that constraint is the structural backstop of the chain.
    async fn append_event(
        &self,
        event: NewLedgerEvent,
        outbox_id: Uuid,
    ) -> LedgerResult<LedgerEvent>;

    /// Highest-sequence event for a tenant, if any
    async fn last_event(&self, tenant_id: &str) -> LedgerResult<Option<LedgerEvent>>;

    /// Events with `start_ms <= timestamp <= end_ms`, ordered by
    /// sequence, optionally capped
    async fn events_in_range(
        &self,
        tenant_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEvent>>;

    /// All surviving events with `timestamp <= through_ms`, ordered by
    /// sequence. Verification walks this prefix so the recomputation is
    /// anchored, not started mid-chain.
    async fn chain_prefix(&self, tenant_id: &str, through_ms: i64)
        -> LedgerResult<Vec<LedgerEvent>>;

    /// Events with `start_seq <= sequence_no <= end_seq`, ordered by
    /// sequence
    async fn events_by_seq(
        &self,
        tenant_id: &str,
        start_seq: i64,
        end_seq: i64,
    ) -> LedgerResult<Vec<LedgerEvent>>;
}

/// Holding area for permanently-failed outbox entries
#[async_trait]
pub trait DlqStore: Send + Sync {
    async fn insert(&self, entry: DlqEntry) -> LedgerResult<()>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> LedgerResult<Option<DlqEntry>>;

    /// Tenant-scoped inspection, newest-dead first
    async fn list(&self, tenant_id: &str, limit: i64, offset: i64) -> LedgerResult<Vec<DlqEntry>>;

    /// Unreplayed entries oldest-first (bulk replay order)
    async fn list_unreplayed(&self, tenant_id: &str, limit: i64) -> LedgerResult<Vec<DlqEntry>>;

    /// Stamp a replay; the row itself is retained as failure history
    async fn mark_replayed(&self, id: Uuid, replayed_by: &str, replayed_at: i64)
        -> LedgerResult<()>;

    /// Unreplayed depth, optionally tenant-scoped (health/alerting)
    async fn count_unreplayed(&self, tenant_id: Option<&str>) -> LedgerResult<u64>;
}

/// Immutable verification reports and export manifests
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn record_report(&self, report: &IntegrityReport) -> LedgerResult<()>;

    async fn record_manifest(&self, manifest: &ExportManifest) -> LedgerResult<()>;
}

/// External object storage for export blobs and manifests
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> LedgerResult<()>;

    async fn get(&self, key: &str) -> LedgerResult<Vec<u8>>;
}

/// Low-level client for the privilege-escalated stored procedures.
///
/// Nothing outside the `PrivilegedGateway` may depend on this trait.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Re-encrypt one row's sensitive columns under `key_version`
    /// without touching any chain-hash input
    async fn key_rotation_update(
        &self,
        tenant_id: &str,
        event_id: Uuid,
        key_version: i32,
    ) -> LedgerResult<()>;

    /// Delete rows with `timestamp < cutoff_ms`, optionally
    /// tenant-scoped; returns the deleted-row count
    async fn retention_delete(&self, cutoff_ms: i64, tenant_id: Option<&str>)
        -> LedgerResult<u64>;
}
