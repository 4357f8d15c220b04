//! Domain types for the audit ledger subsystem
//!
//! Every timestamp is UTC epoch milliseconds (i64). Tenant ids are
//! UUID strings; they are validated at the boundary, stored as text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an outbox row. Rows are never deleted; they only
/// transition status, preserving the delivery trail.
///
/// Stored as TEXT; `as_str`/`parse` keep the column values and the
/// serde representation identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Processed,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Processed => "processed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "processed" => Some(Self::Processed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Durable intent record: an audit event awaiting ledger insertion.
///
/// Created inside the business transaction that originates the event,
/// mutated only by the drain worker and the DLQ manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: OutboxStatus,
    pub created_at: i64,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
    pub lease_expires_at: Option<i64>,
    pub last_error: Option<String>,
}

/// One immutable link of a tenant's hash chain.
///
/// `chain_hash = SHA-256(prev_chain_hash ‖ canonical(tenant_id,
/// sequence_no, event_type, payload, timestamp))`. `key_version`
/// stamps the encrypted-column generation and is rewritten in place by
/// key rotation; it is deliberately not a chain-hash input.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub sequence_no: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor: Option<String>,
    pub timestamp: i64,
    pub chain_hash: String,
    pub prev_chain_hash: String,
    pub key_version: i32,
}

/// A ledger event ready for insertion: sequence and hashes already
/// assigned by the chain engine, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewLedgerEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub sequence_no: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor: Option<String>,
    pub timestamp: i64,
    pub chain_hash: String,
    pub prev_chain_hash: String,
}

impl NewLedgerEvent {
    pub fn into_event(self, key_version: i32) -> LedgerEvent {
        LedgerEvent {
            id: self.id,
            tenant_id: self.tenant_id,
            sequence_no: self.sequence_no,
            event_type: self.event_type,
            payload: self.payload,
            actor: self.actor,
            timestamp: self.timestamp,
            chain_hash: self.chain_hash,
            prev_chain_hash: self.prev_chain_hash,
            key_version,
        }
    }
}

/// Cached per-tenant chain position. Owned exclusively by the chain
/// engine; recoverable from the ledger tail at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub tenant_id: String,
    pub last_sequence_no: i64,
    pub last_chain_hash: String,
}

/// Coarse failure classification recorded with each dead-lettered entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    Serialization,
    Integrity,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Serialization => "serialization",
            Self::Integrity => "integrity",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(Self::Transient),
            "serialization" => Some(Self::Serialization),
            "integrity" => Some(Self::Integrity),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A permanently-failed outbox entry, parked for inspection and replay.
/// Never deleted; replays stamp the row and re-enqueue a fresh copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub outbox_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor: Option<String>,
    pub last_error: String,
    pub error_category: ErrorCategory,
    pub attempt_count: i32,
    pub dead_at: i64,
    pub replayed_at: Option<i64>,
    pub replayed_by: Option<String>,
    pub replay_count: i32,
}

/// What a verification run covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Range,
    Export,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Export => "export",
        }
    }
}

/// Terminal verdict of a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Valid,
    Tampered,
    Incomplete,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Tampered => "tampered",
            Self::Incomplete => "incomplete",
        }
    }
}

/// Immutable record of one verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub id: Uuid,
    pub tenant_id: String,
    pub kind: ReportKind,
    pub start_seq: Option<i64>,
    pub end_seq: Option<i64>,
    pub manifest_ref: Option<String>,
    pub verified_at: i64,
    pub status: ReportStatus,
    pub broken_at_sequence_no: Option<i64>,
    pub initiated_by: String,
}

/// Immutable record of one export: what was written, where, and its digest
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExportManifest {
    pub export_id: Uuid,
    pub tenant_id: String,
    pub start_date: i64,
    pub end_date: i64,
    pub event_count: i64,
    pub sha256: String,
    pub ndjson_key: String,
    pub created_at: i64,
    pub exported_by: String,
}

/// Result of one export run
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub manifest: ExportManifest,
    pub ndjson_key: String,
    pub manifest_key: String,
}

/// Aggregate result of a bulk DLQ replay. Individual failures are
/// counted, never abort the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReplayOutcome {
    pub replayed: u64,
    pub errors: u64,
}

/// Counters from one drain pass, for logging and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainStats {
    pub claimed: u64,
    pub processed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}
