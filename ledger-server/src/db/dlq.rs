//! Dead-letter queue persistence. Rows are insert-and-stamp only.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::DlqStore;
use crate::types::{DlqEntry, ErrorCategory};

type DlqRow = (
    Uuid,
    String,
    Uuid,
    String,
    serde_json::Value,
    Option<String>,
    String,
    String,
    i32,
    i64,
    Option<i64>,
    Option<String>,
    i32,
);

const DLQ_COLUMNS: &str = "id, tenant_id, outbox_id, event_type, payload, actor, last_error, \
     error_category, attempt_count, dead_at, replayed_at, replayed_by, replay_count";

fn row_to_entry(row: DlqRow) -> LedgerResult<DlqEntry> {
    let error_category = ErrorCategory::parse(&row.7).ok_or_else(|| {
        LedgerError::Database(sqlx::Error::Decode(
            format!("unknown error category: {}", row.7).into(),
        ))
    })?;
    Ok(DlqEntry {
        id: row.0,
        tenant_id: row.1,
        outbox_id: row.2,
        event_type: row.3,
        payload: row.4,
        actor: row.5,
        last_error: row.6,
        error_category,
        attempt_count: row.8,
        dead_at: row.9,
        replayed_at: row.10,
        replayed_by: row.11,
        replay_count: row.12,
    })
}

pub struct PgDlqStore {
    pool: PgPool,
}

impl PgDlqStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DlqStore for PgDlqStore {
    async fn insert(&self, entry: DlqEntry) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_dlq
                (id, tenant_id, outbox_id, event_type, payload, actor, last_error,
                 error_category, attempt_count, dead_at, replay_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.tenant_id)
        .bind(entry.outbox_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.actor.as_deref())
        .bind(&entry.last_error)
        .bind(entry.error_category.as_str())
        .bind(entry.attempt_count)
        .bind(entry.dead_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> LedgerResult<Option<DlqEntry>> {
        let row: Option<DlqRow> = sqlx::query_as(&format!(
            "SELECT {DLQ_COLUMNS} FROM audit_dlq WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_entry).transpose()
    }

    async fn list(&self, tenant_id: &str, limit: i64, offset: i64) -> LedgerResult<Vec<DlqEntry>> {
        let rows: Vec<DlqRow> = sqlx::query_as(&format!(
            r#"
            SELECT {DLQ_COLUMNS} FROM audit_dlq
            WHERE tenant_id = $1
            ORDER BY dead_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn list_unreplayed(&self, tenant_id: &str, limit: i64) -> LedgerResult<Vec<DlqEntry>> {
        let rows: Vec<DlqRow> = sqlx::query_as(&format!(
            r#"
            SELECT {DLQ_COLUMNS} FROM audit_dlq
            WHERE tenant_id = $1 AND replayed_at IS NULL
            ORDER BY dead_at
            LIMIT $2
            "#
        ))
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn mark_replayed(
        &self,
        id: Uuid,
        replayed_by: &str,
        replayed_at: i64,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_dlq
            SET replayed_at = $2, replayed_by = $3, replay_count = replay_count + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(replayed_at)
        .bind(replayed_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("DlqEntry {id}")));
        }
        Ok(())
    }

    async fn count_unreplayed(&self, tenant_id: Option<&str>) -> LedgerResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM audit_dlq
            WHERE replayed_at IS NULL AND ($1::text IS NULL OR tenant_id = $1)
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
