//! Application state for the ledger server

use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::chain::HashChainEngine;
use crate::config::Config;
use crate::db::dlq::PgDlqStore;
use crate::db::ledger::PgLedgerStore;
use crate::db::outbox::PgOutboxStore;
use crate::db::reports::PgReportStore;
use crate::db::tenant::PgAdminStore;
use crate::dlq::DlqManager;
use crate::export::ExportService;
use crate::integrity::IntegrityService;
use crate::object_store::S3ObjectStore;
use crate::store::{DlqStore, LedgerStore, ObjectStore, OutboxStore, ReportStore};
use crate::tenant::PrivilegedGateway;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    pub outbox: Arc<dyn OutboxStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub dlq_store: Arc<dyn DlqStore>,
    pub reports: Arc<dyn ReportStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// Per-tenant chain cursors
    pub chain: Arc<HashChainEngine>,
    pub dlq: Arc<DlqManager>,
    pub integrity: Arc<IntegrityService>,
    pub export: Arc<ExportService>,
    /// Sole path to privileged ledger mutation
    pub gateway: Arc<PrivilegedGateway>,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3 = S3Client::new(&aws_config);

        let outbox: Arc<dyn OutboxStore> = Arc::new(PgOutboxStore::new(pool.clone()));
        let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
        let dlq_store: Arc<dyn DlqStore> = Arc::new(PgDlqStore::new(pool.clone()));
        let reports: Arc<dyn ReportStore> = Arc::new(PgReportStore::new(pool.clone()));
        let objects: Arc<dyn ObjectStore> =
            Arc::new(S3ObjectStore::new(s3, config.export_s3_bucket.clone()));
        let admin = Arc::new(PgAdminStore::new(pool.clone()));

        let chain = Arc::new(HashChainEngine::new());
        let dlq = Arc::new(DlqManager::new(
            dlq_store.clone(),
            outbox.clone(),
            chain.clone(),
            config.outbox_max_attempts,
        ));
        let integrity = Arc::new(IntegrityService::new(
            ledger.clone(),
            reports.clone(),
            objects.clone(),
        ));
        let export = Arc::new(ExportService::new(
            ledger.clone(),
            objects.clone(),
            reports.clone(),
        ));
        let gateway = Arc::new(PrivilegedGateway::new(admin, chain.clone()));

        Ok(Self {
            pool,
            outbox,
            ledger,
            dlq_store,
            reports,
            objects,
            chain,
            dlq,
            integrity,
            export,
            gateway,
        })
    }
}
