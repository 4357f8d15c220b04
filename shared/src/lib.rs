//! Shared types for the audit ledger platform
//!
//! Common pieces used by the ledger subsystem and the business services
//! that enqueue audit events into it: the reason-coded error type and
//! time utilities.

pub mod error;
pub mod util;

// Re-exports
pub use error::{AppError, ErrorCode};
pub use serde::{Deserialize, Serialize};
