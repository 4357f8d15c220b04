//! Checksummed NDJSON export
//!
//! Serializes a tenant's events for a time range into NDJSON, writes
//! the file and a manifest carrying its SHA-256 to the object store,
//! and records the manifest durably. The digest covers the exact bytes
//! uploaded, so a later `verify_export` can prove the file unchanged.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, ObjectStore, ReportStore};
use crate::tenant::validate_tenant_id;
use crate::types::{ExportManifest, ExportOutcome, LedgerEvent};
use shared::util::{millis_to_date, now_millis};

pub struct ExportService {
    ledger: Arc<dyn LedgerStore>,
    objects: Arc<dyn ObjectStore>,
    reports: Arc<dyn ReportStore>,
}

impl ExportService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        objects: Arc<dyn ObjectStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            ledger,
            objects,
            reports,
        }
    }

    /// Export the tenant's events in `[start_ms, end_ms]`, ordered by
    /// sequence and optionally capped at `limit` (lowest sequences
    /// first). Uploads `<tenant>/<date>/<export_id>.ndjson` plus its
    /// manifest and records the manifest row. An empty range still
    /// produces a (zero-event) export.
    pub async fn export_range(
        &self,
        tenant_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: Option<i64>,
        exported_by: &str,
    ) -> LedgerResult<ExportOutcome> {
        validate_tenant_id(tenant_id)?;
        if start_ms > end_ms {
            return Err(LedgerError::InvalidIdentifier(format!(
                "export range is inverted: {start_ms} > {end_ms}"
            )));
        }

        let mut events = self
            .ledger
            .events_in_range(tenant_id, start_ms, end_ms, limit)
            .await?;
        events.sort_by_key(|e| e.sequence_no);

        let body = to_ndjson(&events)?;
        let sha256 = hex::encode(Sha256::digest(&body));

        let export_id = Uuid::new_v4();
        let now = now_millis();
        let prefix = format!("{tenant_id}/{}", millis_to_date(now));
        let ndjson_key = format!("{prefix}/{export_id}.ndjson");
        let manifest_key = format!("{prefix}/{export_id}.manifest.json");

        let manifest = ExportManifest {
            export_id,
            tenant_id: tenant_id.to_string(),
            start_date: start_ms,
            end_date: end_ms,
            event_count: events.len() as i64,
            sha256,
            ndjson_key: ndjson_key.clone(),
            created_at: now,
            exported_by: exported_by.to_string(),
        };

        self.objects
            .put(&ndjson_key, body, "application/x-ndjson")
            .await?;
        self.objects
            .put(
                &manifest_key,
                serde_json::to_vec_pretty(&manifest)?,
                "application/json",
            )
            .await?;
        self.reports.record_manifest(&manifest).await?;

        tracing::info!(
            tenant = %tenant_id,
            export_id = %export_id,
            events = manifest.event_count,
            key = %ndjson_key,
            "export written"
        );
        Ok(ExportOutcome {
            manifest,
            ndjson_key,
            manifest_key,
        })
    }
}

/// One event per line, fields in declaration order, no trailing blank
/// line beyond the final newline. The digest is computed over exactly
/// these bytes.
fn to_ndjson(events: &[LedgerEvent]) -> LedgerResult<Vec<u8>> {
    let mut buf = Vec::new();
    for event in events {
        serde_json::to_writer(&mut buf, event)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ndjson_is_one_line_per_event() {
        let tenant = Uuid::new_v4().to_string();
        let events: Vec<LedgerEvent> = (0..3)
            .map(|seq| LedgerEvent {
                id: Uuid::new_v4(),
                tenant_id: tenant.clone(),
                sequence_no: seq,
                event_type: "t.event".to_string(),
                payload: json!({"n": seq}),
                actor: None,
                timestamp: 1_000 + seq,
                chain_hash: "h".repeat(64),
                prev_chain_hash: "p".repeat(64),
                key_version: 1,
            })
            .collect();

        let body = to_ndjson(&events).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));

        let back: LedgerEvent =
            serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(back.sequence_no, 0);
    }

    #[test]
    fn empty_export_is_empty_bytes() {
        assert!(to_ndjson(&[]).unwrap().is_empty());
    }
}
