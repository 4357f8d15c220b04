//! Chain verification
//!
//! Recomputes a tenant's hash chain from stored rows and compares it
//! link by link. A range can only be trusted together with everything
//! before it, so `verify_range` always walks from the oldest surviving
//! row up through the end of the requested window. Every run records an
//! `IntegrityReport`.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chain::hash::{chain_hash, genesis_hash};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, ObjectStore, ReportStore};
use crate::tenant::validate_tenant_id;
use crate::types::{ExportManifest, IntegrityReport, LedgerEvent, ReportKind, ReportStatus};
use shared::util::now_millis;

/// Outcome of one chain walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: ReportStatus,
    pub broken_at: Option<i64>,
}

impl Verdict {
    fn valid() -> Self {
        Self {
            status: ReportStatus::Valid,
            broken_at: None,
        }
    }

    fn tampered(seq: i64) -> Self {
        Self {
            status: ReportStatus::Tampered,
            broken_at: Some(seq),
        }
    }

    fn incomplete(seq: i64) -> Self {
        Self {
            status: ReportStatus::Incomplete,
            broken_at: Some(seq),
        }
    }
}

pub struct IntegrityService {
    ledger: Arc<dyn LedgerStore>,
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
}

impl IntegrityService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            ledger,
            reports,
            objects,
        }
    }

    /// Verify the tenant's chain through the end of `[start_ms, end_ms]`.
    ///
    /// The walk anchors at the oldest surviving row: genesis when that
    /// row is sequence 0, otherwise its stored `prev_chain_hash` serves
    /// as the post-retention trust root. First recomputed-hash or
    /// prev-link mismatch reports `tampered` with the offending
    /// sequence; a sequence gap reports `incomplete`.
    pub async fn verify_range(
        &self,
        tenant_id: &str,
        start_ms: i64,
        end_ms: i64,
        initiated_by: &str,
    ) -> LedgerResult<IntegrityReport> {
        validate_tenant_id(tenant_id)?;

        let prefix = self.ledger.chain_prefix(tenant_id, end_ms).await?;
        let verdict = walk_chain(tenant_id, &prefix);

        // the reported span is the requested window, not the full prefix
        let window: Vec<&LedgerEvent> = prefix
            .iter()
            .filter(|e| e.timestamp >= start_ms)
            .collect();
        let report = IntegrityReport {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            kind: ReportKind::Range,
            start_seq: window.first().map(|e| e.sequence_no),
            end_seq: window.last().map(|e| e.sequence_no),
            manifest_ref: None,
            verified_at: now_millis(),
            status: verdict.status,
            broken_at_sequence_no: verdict.broken_at,
            initiated_by: initiated_by.to_string(),
        };
        self.reports.record_report(&report).await?;

        match verdict.status {
            ReportStatus::Valid => tracing::info!(
                tenant = %tenant_id,
                events = prefix.len(),
                "range verification passed"
            ),
            _ => tracing::warn!(
                tenant = %tenant_id,
                status = verdict.status.as_str(),
                broken_at = ?verdict.broken_at,
                "range verification failed"
            ),
        }
        Ok(report)
    }

    /// Verify a prior export against its manifest and the live ledger.
    ///
    /// Re-downloads both objects, recomputes the NDJSON digest, then
    /// checks that the exported lines still form a contiguous, correctly
    /// linked chain segment matching the stored rows.
    pub async fn verify_export(
        &self,
        tenant_id: &str,
        manifest_key: &str,
        initiated_by: &str,
    ) -> LedgerResult<IntegrityReport> {
        validate_tenant_id(tenant_id)?;

        let manifest_bytes = self.objects.get(manifest_key).await?;
        let manifest: ExportManifest = serde_json::from_slice(&manifest_bytes)?;
        if manifest.tenant_id != tenant_id {
            return Err(LedgerError::InvalidIdentifier(format!(
                "manifest {manifest_key} does not belong to tenant {tenant_id}"
            )));
        }

        let ndjson = self.objects.get(&manifest.ndjson_key).await?;
        let verdict = self.check_export(tenant_id, &manifest, &ndjson).await?;

        let events = parse_ndjson(&ndjson).unwrap_or_default();
        let report = IntegrityReport {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            kind: ReportKind::Export,
            start_seq: events.first().map(|e| e.sequence_no),
            end_seq: events.last().map(|e| e.sequence_no),
            manifest_ref: Some(manifest_key.to_string()),
            verified_at: now_millis(),
            status: verdict.status,
            broken_at_sequence_no: verdict.broken_at,
            initiated_by: initiated_by.to_string(),
        };
        self.reports.record_report(&report).await?;

        match verdict.status {
            ReportStatus::Valid => tracing::info!(
                tenant = %tenant_id,
                manifest = %manifest_key,
                "export verification passed"
            ),
            _ => tracing::warn!(
                tenant = %tenant_id,
                manifest = %manifest_key,
                status = verdict.status.as_str(),
                "export verification failed"
            ),
        }
        Ok(report)
    }

    async fn check_export(
        &self,
        tenant_id: &str,
        manifest: &ExportManifest,
        ndjson: &[u8],
    ) -> LedgerResult<Verdict> {
        let digest = hex::encode(Sha256::digest(ndjson));
        if digest != manifest.sha256 {
            // a flipped byte anywhere in the file lands here
            return Ok(Verdict {
                status: ReportStatus::Tampered,
                broken_at: None,
            });
        }

        let Some(events) = parse_ndjson(ndjson) else {
            return Ok(Verdict {
                status: ReportStatus::Tampered,
                broken_at: None,
            });
        };
        if events.len() as i64 != manifest.event_count {
            return Ok(Verdict {
                status: ReportStatus::Incomplete,
                broken_at: events.first().map(|e| e.sequence_no),
            });
        }
        if events.is_empty() {
            return Ok(Verdict::valid());
        }

        // exported lines must be a contiguous, self-consistent segment
        let first = &events[0];
        let mut expected_seq = first.sequence_no;
        let mut expected_prev = first.prev_chain_hash.clone();
        for event in &events {
            if event.sequence_no != expected_seq {
                return Ok(Verdict::incomplete(expected_seq));
            }
            if event.prev_chain_hash != expected_prev {
                return Ok(Verdict::tampered(event.sequence_no));
            }
            let recomputed = chain_hash(
                &expected_prev,
                tenant_id,
                event.sequence_no,
                &event.event_type,
                &event.payload,
                event.timestamp,
            );
            if recomputed != event.chain_hash {
                return Ok(Verdict::tampered(event.sequence_no));
            }
            expected_prev = recomputed;
            expected_seq += 1;
        }

        // and it must still match what the ledger holds
        let (start_seq, end_seq) = (
            events[0].sequence_no,
            events[events.len() - 1].sequence_no,
        );
        let live = self
            .ledger
            .events_by_seq(tenant_id, start_seq, end_seq)
            .await?;
        for event in &events {
            match live.iter().find(|l| l.sequence_no == event.sequence_no) {
                // hash equality alone would miss an in-place payload
                // edit that kept the stored hash
                Some(stored)
                    if stored.chain_hash == event.chain_hash
                        && stored.payload == event.payload => {}
                Some(stored) => return Ok(Verdict::tampered(stored.sequence_no)),
                // retention may have deleted the rows since the export
                None => return Ok(Verdict::incomplete(event.sequence_no)),
            }
        }

        Ok(Verdict::valid())
    }
}

/// Walk a stored chain segment, recomputing every link.
///
/// `events` must be ordered by `sequence_no` ascending, starting at the
/// tenant's oldest surviving row.
pub fn walk_chain(tenant_id: &str, events: &[LedgerEvent]) -> Verdict {
    let Some(first) = events.first() else {
        return Verdict::valid();
    };

    let mut expected_prev = if first.sequence_no == 0 {
        genesis_hash(tenant_id)
    } else {
        // retention removed the prefix; the oldest survivor's stored
        // prev link is the trust root
        first.prev_chain_hash.clone()
    };
    let mut expected_seq = first.sequence_no;

    for event in events {
        if event.sequence_no != expected_seq {
            return Verdict::incomplete(expected_seq);
        }
        if event.prev_chain_hash != expected_prev {
            return Verdict::tampered(event.sequence_no);
        }
        let recomputed = chain_hash(
            &expected_prev,
            tenant_id,
            event.sequence_no,
            &event.event_type,
            &event.payload,
            event.timestamp,
        );
        if recomputed != event.chain_hash {
            return Verdict::tampered(event.sequence_no);
        }
        expected_prev = recomputed;
        expected_seq += 1;
    }

    Verdict::valid()
}

fn parse_ndjson(bytes: &[u8]) -> Option<Vec<LedgerEvent>> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_chain(tenant: &str, n: i64) -> Vec<LedgerEvent> {
        let mut prev = genesis_hash(tenant);
        let mut events = Vec::new();
        for seq in 0..n {
            let payload = json!({"n": seq});
            let ts = 1_000 + seq;
            let hash = chain_hash(&prev, tenant, seq, "t.event", &payload, ts);
            events.push(LedgerEvent {
                id: Uuid::new_v4(),
                tenant_id: tenant.to_string(),
                sequence_no: seq,
                event_type: "t.event".to_string(),
                payload,
                actor: None,
                timestamp: ts,
                chain_hash: hash.clone(),
                prev_chain_hash: prev,
                key_version: 1,
            });
            prev = hash;
        }
        events
    }

    #[test]
    fn intact_chain_is_valid() {
        let tenant = Uuid::new_v4().to_string();
        let events = build_chain(&tenant, 5);
        assert_eq!(walk_chain(&tenant, &events), Verdict::valid());
    }

    #[test]
    fn empty_chain_is_valid() {
        let tenant = Uuid::new_v4().to_string();
        assert_eq!(walk_chain(&tenant, &[]), Verdict::valid());
    }

    #[test]
    fn modified_payload_is_tampered_at_that_sequence() {
        let tenant = Uuid::new_v4().to_string();
        let mut events = build_chain(&tenant, 4);
        events[1].payload = json!({"n": 999});
        let verdict = walk_chain(&tenant, &events);
        assert_eq!(verdict.status, ReportStatus::Tampered);
        assert_eq!(verdict.broken_at, Some(1));
    }

    #[test]
    fn relinked_prev_hash_is_tampered() {
        let tenant = Uuid::new_v4().to_string();
        let mut events = build_chain(&tenant, 4);
        events[2].prev_chain_hash = "0".repeat(64);
        let verdict = walk_chain(&tenant, &events);
        assert_eq!(verdict.status, ReportStatus::Tampered);
        assert_eq!(verdict.broken_at, Some(2));
    }

    #[test]
    fn missing_row_is_incomplete() {
        let tenant = Uuid::new_v4().to_string();
        let mut events = build_chain(&tenant, 4);
        events.remove(2);
        let verdict = walk_chain(&tenant, &events);
        assert_eq!(verdict.status, ReportStatus::Incomplete);
        assert_eq!(verdict.broken_at, Some(2));
    }

    #[test]
    fn retention_trimmed_chain_anchors_at_oldest_survivor() {
        let tenant = Uuid::new_v4().to_string();
        let events = build_chain(&tenant, 6);
        // drop the first three rows as retention deletion would
        let surviving = &events[3..];
        assert_eq!(walk_chain(&tenant, surviving), Verdict::valid());
    }

    #[test]
    fn tampering_the_oldest_survivor_is_caught() {
        let tenant = Uuid::new_v4().to_string();
        let mut events = build_chain(&tenant, 6);
        events.drain(0..3);
        events[0].payload = json!({"forged": true});
        let verdict = walk_chain(&tenant, &events);
        assert_eq!(verdict.status, ReportStatus::Tampered);
        assert_eq!(verdict.broken_at, Some(3));
    }
}
