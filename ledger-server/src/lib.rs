//! Tamper-evident audit ledger subsystem
//!
//! Business code records audit intent through the transactional outbox;
//! drain workers move entries into per-tenant SHA-256 hash chains;
//! permanently-failed entries park in a replayable dead-letter queue.
//! Verification recomputes chains from stored rows, and exports ship
//! checksummed NDJSON to object storage.

pub mod chain;
pub mod config;
pub mod db;
pub mod dlq;
pub mod drain;
pub mod error;
pub mod export;
pub mod health;
pub mod integrity;
pub mod memory;
pub mod object_store;
pub mod state;
pub mod store;
pub mod tenant;
pub mod types;

pub use error::{LedgerError, LedgerResult};
