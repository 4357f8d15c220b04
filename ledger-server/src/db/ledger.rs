//! Ledger persistence
//!
//! `append_event` is the single write path: one transaction holding the
//! tenant's advisory lock inserts the chained row and flips the
//! originating outbox entry. The `UNIQUE (tenant_id, sequence_no)`
//! constraint turns any lost race into an insert failure the drain
//! worker retries, never into a forked chain.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::tenant::set_tenant_context;
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;
use crate::types::{LedgerEvent, NewLedgerEvent};

const EVENT_COLUMNS: &str = "id, tenant_id, sequence_no, event_type, payload, actor, \
     timestamp, chain_hash, prev_chain_hash, key_version";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append_event(
        &self,
        event: NewLedgerEvent,
        outbox_id: Uuid,
    ) -> LedgerResult<LedgerEvent> {
        let mut tx = self.pool.begin().await?;
        set_tenant_context(&mut tx, &event.tenant_id).await?;

        // serializes appends for this tenant across processes; released
        // at commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&event.tenant_id)
            .execute(&mut *tx)
            .await?;

        let stored: LedgerEvent = sqlx::query_as(&format!(
            r#"
            INSERT INTO ledger_events
                (id, tenant_id, sequence_no, event_type, payload, actor,
                 timestamp, chain_hash, prev_chain_hash, key_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(&event.tenant_id)
        .bind(event.sequence_no)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.actor.as_deref())
        .bind(event.timestamp)
        .bind(&event.chain_hash)
        .bind(&event.prev_chain_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            // a lost sequence race lands on the UNIQUE constraint
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::ChainConflict(event.tenant_id.clone())
            }
            _ => LedgerError::Database(e),
        })?;

        sqlx::query(
            r#"
            UPDATE audit_outbox
            SET status = 'processed', claimed_by = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(outbox_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn last_event(&self, tenant_id: &str) -> LedgerResult<Option<LedgerEvent>> {
        let mut tx = self.pool.begin().await?;
        set_tenant_context(&mut tx, tenant_id).await?;
        let row = sqlx::query_as::<_, LedgerEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM ledger_events
            WHERE tenant_id = $1
            ORDER BY sequence_no DESC
            LIMIT 1
            "#
        ))
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn events_in_range(
        &self,
        tenant_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let mut tx = self.pool.begin().await?;
        set_tenant_context(&mut tx, tenant_id).await?;
        let rows = sqlx::query_as::<_, LedgerEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM ledger_events
            WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp <= $3
            ORDER BY sequence_no
            LIMIT $4
            "#
        ))
        .bind(tenant_id)
        .bind(start_ms)
        .bind(end_ms)
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn chain_prefix(
        &self,
        tenant_id: &str,
        through_ms: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let mut tx = self.pool.begin().await?;
        set_tenant_context(&mut tx, tenant_id).await?;
        let rows = sqlx::query_as::<_, LedgerEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM ledger_events
            WHERE tenant_id = $1 AND timestamp <= $2
            ORDER BY sequence_no
            "#
        ))
        .bind(tenant_id)
        .bind(through_ms)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn events_by_seq(
        &self,
        tenant_id: &str,
        start_seq: i64,
        end_seq: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let mut tx = self.pool.begin().await?;
        set_tenant_context(&mut tx, tenant_id).await?;
        let rows = sqlx::query_as::<_, LedgerEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM ledger_events
            WHERE tenant_id = $1 AND sequence_no >= $2 AND sequence_no <= $3
            ORDER BY sequence_no
            "#
        ))
        .bind(tenant_id)
        .bind(start_seq)
        .bind(end_seq)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }
}
