//! PostgreSQL adapters behind the store seams

pub mod dlq;
pub mod ledger;
pub mod outbox;
pub mod reports;
pub mod tenant;
