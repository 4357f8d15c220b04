//! Tenant context validation and the privileged mutation gateway
//!
//! Ledger rows are immutable to every normal code path. The two
//! sanctioned exceptions, key-rotation re-encryption and retention
//! deletion, run through `PrivilegedGateway`, the only caller of the
//! low-level `AdminStore`. Every identifier is validated as a UUID
//! before any store interaction; malformed input fails closed.
//!
//! The transaction-scoped `app.current_tenant` session variable itself
//! is set per-connection in `db::tenant`.

use std::sync::Arc;

use uuid::Uuid;

use crate::chain::HashChainEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::store::AdminStore;

/// Reject anything that is not a well-formed UUID. Runs before any
/// store interaction so malformed tenant context never reaches SQL.
pub fn validate_tenant_id(tenant_id: &str) -> LedgerResult<()> {
    if tenant_id.is_empty() {
        return Err(LedgerError::InvalidIdentifier(
            "tenant id must not be empty".to_string(),
        ));
    }
    Uuid::parse_str(tenant_id)
        .map(|_| ())
        .map_err(|_| LedgerError::InvalidIdentifier(format!("tenant id is not a UUID: {tenant_id}")))
}

/// Sole path to privilege-escalated ledger mutation
pub struct PrivilegedGateway {
    admin: Arc<dyn AdminStore>,
    chain: Arc<HashChainEngine>,
}

impl PrivilegedGateway {
    pub fn new(admin: Arc<dyn AdminStore>, chain: Arc<HashChainEngine>) -> Self {
        Self { admin, chain }
    }

    /// Re-encrypt one ledger row's sensitive columns under
    /// `key_version`. Chain-hash inputs are untouched, so verification
    /// over the row still holds afterwards.
    pub async fn key_rotation_update(
        &self,
        tenant_id: &str,
        event_id: &str,
        key_version: i32,
    ) -> LedgerResult<()> {
        validate_tenant_id(tenant_id)?;
        let event_uuid = Uuid::parse_str(event_id).map_err(|_| {
            LedgerError::InvalidIdentifier(format!("event id is not a UUID: {event_id}"))
        })?;
        if key_version <= 0 {
            return Err(LedgerError::InvalidIdentifier(format!(
                "key version must be positive, got {key_version}"
            )));
        }

        self.admin
            .key_rotation_update(tenant_id, event_uuid, key_version)
            .await?;
        self.chain.reset_tenant(tenant_id);

        tracing::info!(
            tenant = %tenant_id,
            event_id = %event_uuid,
            key_version,
            "key rotation applied to ledger row"
        );
        Ok(())
    }

    /// Delete ledger rows older than `cutoff_ms`, optionally scoped to
    /// one tenant. Returns the deleted-row count. Ranges over a deleted
    /// window verify `incomplete` afterwards; surviving history anchors
    /// at its oldest remaining row.
    pub async fn retention_delete(
        &self,
        cutoff_ms: i64,
        tenant_id: Option<&str>,
    ) -> LedgerResult<u64> {
        if let Some(tenant) = tenant_id {
            validate_tenant_id(tenant)?;
        }

        let deleted = self.admin.retention_delete(cutoff_ms, tenant_id).await?;

        match tenant_id {
            Some(tenant) => self.chain.reset_tenant(tenant),
            None => self.chain.reset_all(),
        }

        tracing::info!(
            cutoff_ms,
            tenant = tenant_id.unwrap_or("<all>"),
            deleted,
            "retention deletion executed"
        );
        Ok(deleted)
    }
}
