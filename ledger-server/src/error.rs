//! Unified infrastructure-layer error type for ledger-server
//!
//! `LedgerError` bridges store-layer failures (sqlx, object storage,
//! serde) and the caller-facing `AppError` with its stable reason
//! codes. It enables `?` propagation without manual
//! `.map_err(|e| { tracing::error!(...); AppError::internal(...) })`
//! boilerplate.

use shared::error::AppError;
use thiserror::Error;

/// Infrastructure and validation errors raised by the ledger subsystem
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error (sqlx)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error (export blobs / manifests)
    #[error("object storage error: {0}")]
    ObjectStore(String),

    /// Payload (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed identifier, rejected before any store interaction
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Referenced row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Chain position raced another writer; safe to retry after reset
    #[error("chain conflict for tenant {0}")]
    ChainConflict(String),
}

impl LedgerError {
    /// Whether a retry may succeed without operator intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::ObjectStore(_) | Self::ChainConflict(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidIdentifier(msg) => AppError::isolation(msg),
            LedgerError::NotFound(what) => AppError::not_found(what),
            LedgerError::Serialization(err) => AppError::validation(err.to_string()),
            LedgerError::ChainConflict(tenant) => {
                AppError::transient(format!("chain conflict for tenant {tenant}"))
            }
            LedgerError::Database(err) => {
                tracing::error!(error = %err, "ledger database error");
                AppError::database(err.to_string())
            }
            LedgerError::ObjectStore(msg) => {
                tracing::error!(error = %msg, "export object storage error");
                AppError::internal(msg)
            }
        }
    }
}

/// Convenience alias for ledger-layer results
pub type LedgerResult<T> = Result<T, LedgerError>;
