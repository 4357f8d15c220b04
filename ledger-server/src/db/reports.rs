//! Verification reports and export manifests. Append-only tables.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::LedgerResult;
use crate::store::ReportStore;
use crate::types::{ExportManifest, IntegrityReport};

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn record_report(&self, report: &IntegrityReport) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO integrity_reports
                (id, tenant_id, kind, start_seq, end_seq, manifest_ref,
                 verified_at, status, broken_at_sequence_no, initiated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(report.id)
        .bind(&report.tenant_id)
        .bind(report.kind.as_str())
        .bind(report.start_seq)
        .bind(report.end_seq)
        .bind(report.manifest_ref.as_deref())
        .bind(report.verified_at)
        .bind(report.status.as_str())
        .bind(report.broken_at_sequence_no)
        .bind(&report.initiated_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_manifest(&self, manifest: &ExportManifest) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO export_manifests
                (export_id, tenant_id, start_date, end_date, event_count,
                 sha256, ndjson_key, created_at, exported_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(manifest.export_id)
        .bind(&manifest.tenant_id)
        .bind(manifest.start_date)
        .bind(manifest.end_date)
        .bind(manifest.event_count)
        .bind(&manifest.sha256)
        .bind(&manifest.ndjson_key)
        .bind(manifest.created_at)
        .bind(&manifest.exported_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
