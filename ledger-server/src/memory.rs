//! In-memory store adapters
//!
//! The second backend behind the store seams: mutex-guarded maps with
//! the same contracts as the Postgres adapters. Tests run against
//! these; they also carry the tamper/corruption hooks that the real
//! ledger forbids by construction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::{
    AdminStore, DlqStore, LedgerStore, ObjectStore, OutboxStore, ReportStore,
};
use crate::types::{
    DlqEntry, ExportManifest, IntegrityReport, LedgerEvent, NewLedgerEvent, OutboxEntry,
    OutboxStatus,
};
use shared::util::now_millis;

fn injected_db_error(msg: &str) -> LedgerError {
    LedgerError::Database(sqlx::Error::Protocol(msg.to_string()))
}

// ── MemoryOutboxStore ─────────────────────────────────────────

#[derive(Default)]
pub struct MemoryOutboxStore {
    rows: Mutex<Vec<OutboxEntry>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, for assertions
    pub fn get(&self, id: Uuid) -> Option<OutboxEntry> {
        self.rows
            .lock()
            .expect("outbox lock")
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Force a row's lease into the past, simulating a crashed worker
    pub fn expire_lease(&self, id: Uuid) {
        let mut rows = self.rows.lock().expect("outbox lock");
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.lease_expires_at = Some(now_millis() - 1);
        }
    }

    pub(crate) fn set_processed(&self, id: Uuid) {
        let mut rows = self.rows.lock().expect("outbox lock");
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.status = OutboxStatus::Processed;
        }
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn enqueue(
        &self,
        tenant_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
        max_attempts: i32,
    ) -> LedgerResult<OutboxEntry> {
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            actor: actor.map(str::to_string),
            attempts: 0,
            max_attempts,
            status: OutboxStatus::Pending,
            created_at: now_millis(),
            claimed_by: None,
            claimed_at: None,
            lease_expires_at: None,
            last_error: None,
        };
        self.rows.lock().expect("outbox lock").push(entry.clone());
        Ok(entry)
    }

    async fn claim_batch(
        &self,
        limit: i64,
        worker_id: &str,
        lease_ms: i64,
    ) -> LedgerResult<Vec<OutboxEntry>> {
        let now = now_millis();
        let mut rows = self.rows.lock().expect("outbox lock");

        // tenants with a live claim are off-limits to everyone
        let busy: HashSet<String> = rows
            .iter()
            .filter(|r| {
                r.status == OutboxStatus::Claimed
                    && r.lease_expires_at.is_some_and(|exp| exp > now)
            })
            .map(|r| r.tenant_id.clone())
            .collect();

        let mut claimable: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                let reclaimable = r.status == OutboxStatus::Claimed
                    && r.lease_expires_at.is_some_and(|exp| exp <= now);
                (r.status == OutboxStatus::Pending || reclaimable)
                    && !busy.contains(&r.tenant_id)
            })
            .map(|(i, _)| i)
            .collect();
        claimable.sort_by_key(|&i| (rows[i].tenant_id.clone(), rows[i].created_at));
        claimable.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(claimable.len());
        for i in claimable {
            let row = &mut rows[i];
            row.status = OutboxStatus::Claimed;
            row.claimed_by = Some(worker_id.to_string());
            row.claimed_at = Some(now);
            row.lease_expires_at = Some(now + lease_ms);
            claimed.push(row.clone());
        }
        Ok(claimed)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> LedgerResult<OutboxEntry> {
        let mut rows = self.rows.lock().expect("outbox lock");
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("OutboxEntry {id}")))?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        row.status = OutboxStatus::Pending;
        row.claimed_by = None;
        row.claimed_at = None;
        row.lease_expires_at = None;
        Ok(row.clone())
    }

    async fn mark_dead(&self, id: Uuid) -> LedgerResult<()> {
        let mut rows = self.rows.lock().expect("outbox lock");
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.status = OutboxStatus::Dead;
            row.claimed_by = None;
            row.lease_expires_at = None;
        }
        Ok(())
    }

    async fn count_pending(&self) -> LedgerResult<u64> {
        let now = now_millis();
        let rows = self.rows.lock().expect("outbox lock");
        Ok(rows
            .iter()
            .filter(|r| {
                r.status == OutboxStatus::Pending
                    || (r.status == OutboxStatus::Claimed
                        && r.lease_expires_at.is_some_and(|exp| exp <= now))
            })
            .count() as u64)
    }

    async fn count_dead(&self) -> LedgerResult<u64> {
        let rows = self.rows.lock().expect("outbox lock");
        Ok(rows.iter().filter(|r| r.status == OutboxStatus::Dead).count() as u64)
    }
}

// ── MemoryLedgerStore ─────────────────────────────────────────

pub struct MemoryLedgerStore {
    outbox: Arc<MemoryOutboxStore>,
    events: Mutex<HashMap<String, Vec<LedgerEvent>>>,
    /// Event types whose append should fail (failure injection)
    fail_event_types: Mutex<HashSet<String>>,
}

impl MemoryLedgerStore {
    pub fn new(outbox: Arc<MemoryOutboxStore>) -> Self {
        Self {
            outbox,
            events: Mutex::new(HashMap::new()),
            fail_event_types: Mutex::new(HashSet::new()),
        }
    }

    /// Make every append of this event type fail until cleared
    pub fn fail_event_type(&self, event_type: &str) {
        self.fail_event_types
            .lock()
            .expect("fail set lock")
            .insert(event_type.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_event_types.lock().expect("fail set lock").clear();
    }

    /// Tamper hook: overwrite a stored payload in place, bypassing the
    /// immutability the real ledger enforces. Test-only by design.
    pub fn corrupt_payload(&self, tenant_id: &str, sequence_no: i64, payload: serde_json::Value) {
        let mut events = self.events.lock().expect("ledger lock");
        if let Some(rows) = events.get_mut(tenant_id) {
            if let Some(row) = rows.iter_mut().find(|e| e.sequence_no == sequence_no) {
                row.payload = payload;
            }
        }
    }

    /// Gap hook: drop one stored row outright
    pub fn remove_event(&self, tenant_id: &str, sequence_no: i64) {
        let mut events = self.events.lock().expect("ledger lock");
        if let Some(rows) = events.get_mut(tenant_id) {
            rows.retain(|e| e.sequence_no != sequence_no);
        }
    }

    pub fn all_events(&self, tenant_id: &str) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .expect("ledger lock")
            .get(tenant_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set_key_version(&self, tenant_id: &str, event_id: Uuid, key_version: i32) -> bool {
        let mut events = self.events.lock().expect("ledger lock");
        match events
            .get_mut(tenant_id)
            .and_then(|rows| rows.iter_mut().find(|e| e.id == event_id))
        {
            Some(row) => {
                row.key_version = key_version;
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete_before(&self, cutoff_ms: i64, tenant_id: Option<&str>) -> u64 {
        let mut events = self.events.lock().expect("ledger lock");
        let mut deleted = 0u64;
        for (tenant, rows) in events.iter_mut() {
            if tenant_id.is_some_and(|t| t != tenant) {
                continue;
            }
            let before = rows.len();
            rows.retain(|e| e.timestamp >= cutoff_ms);
            deleted += (before - rows.len()) as u64;
        }
        deleted
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append_event(
        &self,
        event: NewLedgerEvent,
        outbox_id: Uuid,
    ) -> LedgerResult<LedgerEvent> {
        if self
            .fail_event_types
            .lock()
            .expect("fail set lock")
            .contains(&event.event_type)
        {
            return Err(injected_db_error("injected append failure"));
        }

        let mut events = self.events.lock().expect("ledger lock");
        let rows = events.entry(event.tenant_id.clone()).or_default();
        if rows.iter().any(|e| e.sequence_no == event.sequence_no) {
            return Err(LedgerError::ChainConflict(event.tenant_id.clone()));
        }

        let stored = event.into_event(1);
        rows.push(stored.clone());
        rows.sort_by_key(|e| e.sequence_no);
        drop(events);

        // same "transaction": the outbox row flips with the insert
        self.outbox.set_processed(outbox_id);
        Ok(stored)
    }

    async fn last_event(&self, tenant_id: &str) -> LedgerResult<Option<LedgerEvent>> {
        let events = self.events.lock().expect("ledger lock");
        Ok(events
            .get(tenant_id)
            .and_then(|rows| rows.last())
            .cloned())
    }

    async fn events_in_range(
        &self,
        tenant_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let events = self.events.lock().expect("ledger lock");
        let mut rows: Vec<LedgerEvent> = events
            .get(tenant_id)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.timestamp >= start_ms && e.timestamp <= end_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn chain_prefix(
        &self,
        tenant_id: &str,
        through_ms: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let events = self.events.lock().expect("ledger lock");
        Ok(events
            .get(tenant_id)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.timestamp <= through_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn events_by_seq(
        &self,
        tenant_id: &str,
        start_seq: i64,
        end_seq: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let events = self.events.lock().expect("ledger lock");
        Ok(events
            .get(tenant_id)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.sequence_no >= start_seq && e.sequence_no <= end_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ── MemoryDlqStore ────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryDlqStore {
    rows: Mutex<Vec<DlqEntry>>,
}

impl MemoryDlqStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DlqStore for MemoryDlqStore {
    async fn insert(&self, entry: DlqEntry) -> LedgerResult<()> {
        self.rows.lock().expect("dlq lock").push(entry);
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> LedgerResult<Option<DlqEntry>> {
        let rows = self.rows.lock().expect("dlq lock");
        Ok(rows
            .iter()
            .find(|r| r.id == id && r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(&self, tenant_id: &str, limit: i64, offset: i64) -> LedgerResult<Vec<DlqEntry>> {
        let rows = self.rows.lock().expect("dlq lock");
        let mut scoped: Vec<DlqEntry> = rows
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        scoped.sort_by_key(|r| std::cmp::Reverse(r.dead_at));
        Ok(scoped
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_unreplayed(&self, tenant_id: &str, limit: i64) -> LedgerResult<Vec<DlqEntry>> {
        let rows = self.rows.lock().expect("dlq lock");
        let mut scoped: Vec<DlqEntry> = rows
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.replayed_at.is_none())
            .cloned()
            .collect();
        scoped.sort_by_key(|r| r.dead_at);
        scoped.truncate(limit.max(0) as usize);
        Ok(scoped)
    }

    async fn mark_replayed(
        &self,
        id: Uuid,
        replayed_by: &str,
        replayed_at: i64,
    ) -> LedgerResult<()> {
        let mut rows = self.rows.lock().expect("dlq lock");
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("DlqEntry {id}")))?;
        row.replayed_at = Some(replayed_at);
        row.replayed_by = Some(replayed_by.to_string());
        row.replay_count += 1;
        Ok(())
    }

    async fn count_unreplayed(&self, tenant_id: Option<&str>) -> LedgerResult<u64> {
        let rows = self.rows.lock().expect("dlq lock");
        Ok(rows
            .iter()
            .filter(|r| r.replayed_at.is_none())
            .filter(|r| tenant_id.is_none_or(|t| t == r.tenant_id))
            .count() as u64)
    }
}

// ── MemoryReportStore ─────────────────────────────────────────

#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<IntegrityReport>>,
    manifests: Mutex<Vec<ExportManifest>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<IntegrityReport> {
        self.reports.lock().expect("report lock").clone()
    }

    pub fn manifests(&self) -> Vec<ExportManifest> {
        self.manifests.lock().expect("report lock").clone()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn record_report(&self, report: &IntegrityReport) -> LedgerResult<()> {
        self.reports.lock().expect("report lock").push(report.clone());
        Ok(())
    }

    async fn record_manifest(&self, manifest: &ExportManifest) -> LedgerResult<()> {
        self.manifests
            .lock()
            .expect("report lock")
            .push(manifest.clone());
        Ok(())
    }
}

// ── MemoryObjectStore ─────────────────────────────────────────

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one byte of a stored object (export-corruption tests)
    pub fn corrupt(&self, key: &str, offset: usize) {
        let mut objects = self.objects.lock().expect("object lock");
        if let Some(bytes) = objects.get_mut(key) {
            if let Some(b) = bytes.get_mut(offset) {
                *b ^= 0x01;
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().expect("object lock").keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> LedgerResult<()> {
        self.objects
            .lock()
            .expect("object lock")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        self.objects
            .lock()
            .expect("object lock")
            .get(key)
            .cloned()
            .ok_or_else(|| LedgerError::ObjectStore(format!("no such key: {key}")))
    }
}

// ── MemoryAdminStore ──────────────────────────────────────────

/// Privileged mutation against the in-memory ledger. Only the
/// `PrivilegedGateway` constructs or calls this.
pub struct MemoryAdminStore {
    ledger: Arc<MemoryLedgerStore>,
}

impl MemoryAdminStore {
    pub fn new(ledger: Arc<MemoryLedgerStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl AdminStore for MemoryAdminStore {
    async fn key_rotation_update(
        &self,
        tenant_id: &str,
        event_id: Uuid,
        key_version: i32,
    ) -> LedgerResult<()> {
        if self.ledger.set_key_version(tenant_id, event_id, key_version) {
            Ok(())
        } else {
            Err(LedgerError::NotFound(format!("LedgerEvent {event_id}")))
        }
    }

    async fn retention_delete(
        &self,
        cutoff_ms: i64,
        tenant_id: Option<&str>,
    ) -> LedgerResult<u64> {
        Ok(self.ledger.delete_before(cutoff_ms, tenant_id))
    }
}
