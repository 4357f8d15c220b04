//! Tenant context plumbing and the privileged procedure client
//!
//! Row-level security on the ledger tables keys off the
//! transaction-local `app.current_tenant` setting; an unset or
//! malformed value matches no rows. `set_tenant_context` is the only
//! writer of that setting and always validates first.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::store::AdminStore;
use crate::tenant::validate_tenant_id;

/// Bind the tenant context to the current transaction. `set_config`
/// with `is_local = true` clears itself at commit or rollback, so the
/// context can never leak onto a pooled connection.
pub async fn set_tenant_context(conn: &mut PgConnection, tenant_id: &str) -> LedgerResult<()> {
    validate_tenant_id(tenant_id)?;
    sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
        .bind(tenant_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Explicitly blank the tenant context. Workers that iterate across
/// tenants call this before cross-tenant statements so a previously
/// bound tenant can never scope them accidentally.
pub async fn clear_tenant_context(conn: &mut PgConnection) -> LedgerResult<()> {
    sqlx::query("SELECT set_config('app.current_tenant', '', true)")
        .execute(conn)
        .await?;
    Ok(())
}

/// Client for the SECURITY DEFINER procedures, the only SQL surface
/// that can mutate committed ledger rows. Constructed exclusively by
/// the `PrivilegedGateway`.
pub struct PgAdminStore {
    pool: PgPool,
}

impl PgAdminStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminStore for PgAdminStore {
    async fn key_rotation_update(
        &self,
        tenant_id: &str,
        event_id: Uuid,
        key_version: i32,
    ) -> LedgerResult<()> {
        sqlx::query("SELECT ledger_key_rotation_update($1, $2, $3)")
            .bind(tenant_id)
            .bind(event_id)
            .bind(key_version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn retention_delete(
        &self,
        cutoff_ms: i64,
        tenant_id: Option<&str>,
    ) -> LedgerResult<u64> {
        let (deleted,): (i64,) = sqlx::query_as("SELECT ledger_retention_delete($1, $2)")
            .bind(cutoff_ms)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(deleted.max(0) as u64)
    }
}
