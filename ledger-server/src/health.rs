//! Subsystem health derived from queue depths
//!
//! Pending outbox depth counts expired-lease claims as pending, so a
//! crashed worker's backlog is visible immediately.

use serde::Serialize;

use crate::store::{DlqStore, OutboxStore};
use shared::util::now_millis;

pub const PENDING_DEGRADED: u64 = 10_000;
pub const PENDING_UNHEALTHY: u64 = 50_000;
pub const DLQ_DEGRADED: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub pending_outbox: u64,
    pub dlq_depth: u64,
    pub store_reachable: bool,
    pub checked_at: i64,
}

/// Probe the stores and classify. Store errors never propagate; an
/// unreachable store is itself the unhealthy verdict.
pub async fn check(outbox: &dyn OutboxStore, dlq: &dyn DlqStore) -> HealthReport {
    let checked_at = now_millis();

    let pending = outbox.count_pending().await;
    let dead = dlq.count_unreplayed(None).await;

    match (pending, dead) {
        (Ok(pending_outbox), Ok(dlq_depth)) => HealthReport {
            status: classify(pending_outbox, dlq_depth),
            pending_outbox,
            dlq_depth,
            store_reachable: true,
            checked_at,
        },
        (pending, dead) => {
            if let Err(e) = &pending {
                tracing::error!("health probe: outbox unreachable: {e}");
            }
            if let Err(e) = &dead {
                tracing::error!("health probe: DLQ unreachable: {e}");
            }
            HealthReport {
                status: HealthStatus::Unhealthy,
                pending_outbox: pending.unwrap_or(0),
                dlq_depth: dead.unwrap_or(0),
                store_reachable: false,
                checked_at,
            }
        }
    }
}

fn classify(pending: u64, dlq_depth: u64) -> HealthStatus {
    if pending >= PENDING_UNHEALTHY {
        HealthStatus::Unhealthy
    } else if pending >= PENDING_DEGRADED || dlq_depth > DLQ_DEGRADED {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(classify(0, 0), HealthStatus::Healthy);
        assert_eq!(classify(9_999, 100), HealthStatus::Healthy);
        assert_eq!(classify(10_000, 0), HealthStatus::Degraded);
        assert_eq!(classify(0, 101), HealthStatus::Degraded);
        assert_eq!(classify(50_000, 0), HealthStatus::Unhealthy);
        assert_eq!(classify(60_000, 500), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn probe_counts_backlog() {
        use crate::memory::{MemoryDlqStore, MemoryOutboxStore};
        use crate::store::OutboxStore as _;

        let outbox = MemoryOutboxStore::new();
        let dlq = MemoryDlqStore::new();
        let tenant = uuid::Uuid::new_v4().to_string();
        outbox
            .enqueue(&tenant, "t.event", serde_json::json!({}), None, 5)
            .await
            .unwrap();

        let report = check(&outbox, &dlq).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.pending_outbox, 1);
        assert!(report.store_reachable);
    }
}
