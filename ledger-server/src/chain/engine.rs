//! Chain position tracking
//!
//! One cached `ChainState` per tenant, each behind its own async mutex
//! in a keyed map, so unrelated tenants never serialize on each other.
//! The guard returned by `lock_tenant` is the tenant's single chain
//! cursor: sequence assignment, ledger insertion and cache advancement
//! all happen while it is held.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::hash::{chain_hash, genesis_hash};
use crate::error::LedgerResult;
use crate::store::LedgerStore;
use crate::types::ChainState;

/// Owned lock over one tenant's cached chain position
pub type ChainGuard = OwnedMutexGuard<Option<ChainState>>;

/// The next link of a tenant's chain, computed but not yet persisted
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub sequence_no: i64,
    pub chain_hash: String,
    pub prev_chain_hash: String,
}

/// Tracks the chain tip per tenant
///
/// The cache is lazily derived from the ledger tail and dropped by
/// `reset_tenant` whenever persisted history may have moved underneath
/// it (DLQ replay, retention deletion); the next `next_hash` call
/// re-derives from the source of truth.
pub struct HashChainEngine {
    states: DashMap<String, Arc<Mutex<Option<ChainState>>>>,
}

impl Default for HashChainEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HashChainEngine {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Acquire the tenant's chain cursor. Hold the guard across the
    /// ledger insert so no second in-flight computation can exist for
    /// this tenant in this process.
    pub async fn lock_tenant(&self, tenant_id: &str) -> ChainGuard {
        let slot = self
            .states
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        slot.lock_owned().await
    }

    /// Compute the next `(sequence_no, chain_hash)` pair without
    /// persisting anything. Persistence belongs to the caller so
    /// sequence assignment and ledger insertion share one transaction.
    pub async fn next_hash(
        &self,
        guard: &mut ChainGuard,
        ledger: &dyn LedgerStore,
        tenant_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        timestamp: i64,
    ) -> LedgerResult<ChainLink> {
        let state = match guard.take() {
            Some(state) => state,
            None => Self::derive_state(ledger, tenant_id).await?,
        };
        let sequence_no = state.last_sequence_no + 1;
        let prev_chain_hash = state.last_chain_hash.clone();
        **guard = Some(state);
        let hash = chain_hash(
            &prev_chain_hash,
            tenant_id,
            sequence_no,
            event_type,
            payload,
            timestamp,
        );

        Ok(ChainLink {
            sequence_no,
            chain_hash: hash,
            prev_chain_hash,
        })
    }

    /// Advance the cached tip after the corresponding ledger insert
    /// committed. Must be called with the same guard `next_hash` used.
    pub fn advance(guard: &mut ChainGuard, tenant_id: &str, link: &ChainLink) {
        **guard = Some(ChainState {
            tenant_id: tenant_id.to_string(),
            last_sequence_no: link.sequence_no,
            last_chain_hash: link.chain_hash.clone(),
        });
    }

    /// Drop the cached state so the next `next_hash` re-derives from
    /// the ledger. A cursor already checked out keeps writing into its
    /// orphaned slot, which is discarded; the fresh slot starts empty.
    pub fn reset_tenant(&self, tenant_id: &str) {
        self.states.remove(tenant_id);
    }

    /// Drop every cached cursor. Used after cross-tenant retention
    /// deletion.
    pub fn reset_all(&self) {
        self.states.clear();
    }

    async fn derive_state(ledger: &dyn LedgerStore, tenant_id: &str) -> LedgerResult<ChainState> {
        Ok(match ledger.last_event(tenant_id).await? {
            Some(last) => ChainState {
                tenant_id: last.tenant_id,
                last_sequence_no: last.sequence_no,
                last_chain_hash: last.chain_hash,
            },
            None => ChainState {
                tenant_id: tenant_id.to_string(),
                last_sequence_no: -1,
                last_chain_hash: genesis_hash(tenant_id),
            },
        })
    }
}
