//! Shared test harness: the full subsystem wired over the in-memory
//! stores.

// not every test binary touches every part of the harness
#![allow(dead_code)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ledger_server::chain::HashChainEngine;
use ledger_server::dlq::DlqManager;
use ledger_server::drain::{DrainConfig, DrainWorker};
use ledger_server::export::ExportService;
use ledger_server::integrity::IntegrityService;
use ledger_server::memory::{
    MemoryAdminStore, MemoryDlqStore, MemoryLedgerStore, MemoryObjectStore, MemoryOutboxStore,
    MemoryReportStore,
};
use ledger_server::store::{DlqStore, LedgerStore, ObjectStore, OutboxStore, ReportStore};
use ledger_server::tenant::PrivilegedGateway;

pub struct Harness {
    pub outbox: Arc<MemoryOutboxStore>,
    pub ledger: Arc<MemoryLedgerStore>,
    pub dlq_store: Arc<MemoryDlqStore>,
    pub reports: Arc<MemoryReportStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub chain: Arc<HashChainEngine>,
    pub dlq: Arc<DlqManager>,
    pub integrity: IntegrityService,
    pub export: ExportService,
    pub gateway: PrivilegedGateway,
}

impl Harness {
    pub fn new() -> Self {
        let outbox = Arc::new(MemoryOutboxStore::new());
        let ledger = Arc::new(MemoryLedgerStore::new(outbox.clone()));
        let dlq_store = Arc::new(MemoryDlqStore::new());
        let reports = Arc::new(MemoryReportStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let chain = Arc::new(HashChainEngine::new());

        let dlq = Arc::new(DlqManager::new(
            dlq_store.clone() as Arc<dyn DlqStore>,
            outbox.clone() as Arc<dyn OutboxStore>,
            chain.clone(),
            5,
        ));
        let integrity = IntegrityService::new(
            ledger.clone() as Arc<dyn LedgerStore>,
            reports.clone() as Arc<dyn ReportStore>,
            objects.clone() as Arc<dyn ObjectStore>,
        );
        let export = ExportService::new(
            ledger.clone() as Arc<dyn LedgerStore>,
            objects.clone() as Arc<dyn ObjectStore>,
            reports.clone() as Arc<dyn ReportStore>,
        );
        let gateway = PrivilegedGateway::new(
            Arc::new(MemoryAdminStore::new(ledger.clone())),
            chain.clone(),
        );

        Self {
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
        }
    }

    pub fn worker(&self, worker_id: &str) -> DrainWorker {
        DrainWorker::new(
            worker_id,
            self.outbox.clone() as Arc<dyn OutboxStore>,
            self.ledger.clone() as Arc<dyn LedgerStore>,
            self.chain.clone(),
            self.dlq.clone(),
            DrainConfig::default(),
            CancellationToken::new(),
        )
    }
}

pub fn tenant() -> String {
    Uuid::new_v4().to_string()
}
