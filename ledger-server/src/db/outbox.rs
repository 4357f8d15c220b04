//! Outbox persistence
//!
//! `enqueue` exists twice on purpose: the free function runs on the
//! caller's open connection so the outbox insert commits or rolls back
//! with the business mutation that caused it; the trait method wraps it
//! in a transaction of its own for replay and standalone callers.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::OutboxStore;
use crate::tenant::validate_tenant_id;
use crate::types::{OutboxEntry, OutboxStatus};
use shared::util::now_millis;

type OutboxRow = (
    Uuid,
    String,
    String,
    serde_json::Value,
    Option<String>,
    i32,
    i32,
    String,
    i64,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<String>,
);

const OUTBOX_COLUMNS: &str = "id, tenant_id, event_type, payload, actor, attempts, \
     max_attempts, status, created_at, claimed_by, claimed_at, lease_expires_at, last_error";

fn row_to_entry(row: OutboxRow) -> LedgerResult<OutboxEntry> {
    let status = OutboxStatus::parse(&row.7).ok_or_else(|| {
        LedgerError::Database(sqlx::Error::Decode(
            format!("unknown outbox status: {}", row.7).into(),
        ))
    })?;
    Ok(OutboxEntry {
        id: row.0,
        tenant_id: row.1,
        event_type: row.2,
        payload: row.3,
        actor: row.4,
        attempts: row.5,
        max_attempts: row.6,
        status,
        created_at: row.8,
        claimed_by: row.9,
        claimed_at: row.10,
        lease_expires_at: row.11,
        last_error: row.12,
    })
}

/// Insert a pending outbox entry on the caller's connection. Inside a
/// transaction this makes the audit intent atomic with the business
/// write that produced it.
pub async fn enqueue(
    conn: &mut PgConnection,
    tenant_id: &str,
    event_type: &str,
    payload: serde_json::Value,
    actor: Option<&str>,
    max_attempts: i32,
) -> LedgerResult<OutboxEntry> {
    super::tenant::set_tenant_context(conn, tenant_id).await?;

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

    sqlx::query(
        r#"
        INSERT INTO audit_outbox
            (id, tenant_id, event_type, payload, actor, attempts, max_attempts, status, created_at)
        VALUES ($1, $2, $3, $4, $5, 0, $6, 'pending', $7)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.event_type)
    .bind(&entry.payload)
    .bind(entry.actor.as_deref())
    .bind(entry.max_attempts)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(entry)
}

pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn enqueue(
        &self,
        tenant_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        actor: Option<&str>,
        max_attempts: i32,
    ) -> LedgerResult<OutboxEntry> {
        validate_tenant_id(tenant_id)?;
        let mut tx = self.pool.begin().await?;
        let entry = enqueue(&mut tx, tenant_id, event_type, payload, actor, max_attempts).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn claim_batch(
        &self,
        limit: i64,
        worker_id: &str,
        lease_ms: i64,
    ) -> LedgerResult<Vec<OutboxEntry>> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        // claiming crosses tenants on purpose
        super::tenant::clear_tenant_context(&mut tx).await?;

        // Single statement so concurrent workers race on locks, not on
        // stale reads. Tenant exclusivity is enforced twice: the `busy`
        // exclusion covers committed live leases, and the per-tenant
        // advisory try-lock covers claims still uncommitted in another
        // worker's transaction, which `SKIP LOCKED` alone would miss
        // for rows beyond that worker's LIMIT. The lock key matches the
        // one the ledger insert takes, so a tenant mid-append is
        // skipped the same way. Expired leases fall back into the
        // claimable set.
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            WITH busy AS (
                SELECT DISTINCT tenant_id FROM audit_outbox
                WHERE status = 'claimed' AND lease_expires_at > $3
            ), locked AS MATERIALIZED (
                SELECT tenant_id FROM (
                    SELECT DISTINCT tenant_id FROM audit_outbox
                    WHERE (status = 'pending'
                           OR (status = 'claimed' AND lease_expires_at <= $3))
                      AND tenant_id NOT IN (SELECT tenant_id FROM busy)
                ) candidates
                WHERE pg_try_advisory_xact_lock(hashtext(tenant_id))
            ), claimable AS (
                SELECT id FROM audit_outbox
                WHERE (status = 'pending'
                       OR (status = 'claimed' AND lease_expires_at <= $3))
                  AND tenant_id IN (SELECT tenant_id FROM locked)
                ORDER BY tenant_id, created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE audit_outbox o
            SET status = 'claimed',
                claimed_by = $2,
                claimed_at = $3,
                lease_expires_at = $4
            FROM claimable c
            WHERE o.id = c.id
            RETURNING o.id, o.tenant_id, o.event_type, o.payload, o.actor, o.attempts,
                      o.max_attempts, o.status, o.created_at, o.claimed_by, o.claimed_at,
                      o.lease_expires_at, o.last_error
            "#
        ))
        .bind(limit)
        .bind(worker_id)
        .bind(now)
        .bind(now + lease_ms)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut entries = rows
            .into_iter()
            .map(row_to_entry)
            .collect::<LedgerResult<Vec<_>>>()?;
        // RETURNING order is unspecified; restore claim order
        entries.sort_by(|a, b| {
            (a.tenant_id.as_str(), a.created_at).cmp(&(b.tenant_id.as_str(), b.created_at))
        });
        Ok(entries)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> LedgerResult<OutboxEntry> {
        let row: Option<OutboxRow> = sqlx::query_as(&format!(
            r#"
            UPDATE audit_outbox
            SET attempts = attempts + 1,
                last_error = $2,
                status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL
            WHERE id = $1
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_entry)
            .transpose()?
            .ok_or_else(|| LedgerError::NotFound(format!("OutboxEntry {id}")))
    }

    async fn mark_dead(&self, id: Uuid) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE audit_outbox
            SET status = 'dead', claimed_by = NULL, lease_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_pending(&self) -> LedgerResult<u64> {
        // an expired lease is backlog, not progress
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM audit_outbox
            WHERE status = 'pending'
               OR (status = 'claimed' AND lease_expires_at <= $1)
            "#,
        )
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_dead(&self) -> LedgerResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audit_outbox WHERE status = 'dead'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}
