//! Error types for the shared crate
//!
//! Standardized error type with stable reason codes. Administrative
//! callers receive these codes verbatim, so variants and code strings
//! must stay stable across releases.

use thiserror::Error;

/// Stable reason codes surfaced to administrative callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Success
    Success,
    /// Input validation failed (malformed tenant id, bad range, ...)
    Validation,
    /// Tenant isolation violation (missing/malformed tenant context)
    Isolation,
    /// Resource not found
    NotFound,
    /// Transient delivery failure (store timeout, lock contention)
    Transient,
    /// Integrity failure (hash mismatch, sequence gap)
    Integrity,
    /// Internal error
    Internal,
    /// Database error
    Database,
}

impl ErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "L0000",
            Self::Validation => "L0001",
            Self::Isolation => "L0002",
            Self::NotFound => "L0003",
            Self::Transient => "L0004",
            Self::Integrity => "L0005",
            Self::Internal => "L9001",
            Self::Database => "L9002",
        }
    }

    /// Get the default message for this code
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Validation => "Validation failed",
            Self::Isolation => "Tenant isolation violation",
            Self::NotFound => "Resource not found",
            Self::Transient => "Transient delivery failure",
            Self::Integrity => "Integrity check failed",
            Self::Internal => "Internal error",
            Self::Database => "Database error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Unified error type for the platform
#[derive(Debug, Error)]
pub enum AppError {
    /// Input validation failed
    #[error("{message}")]
    Validation { message: String },

    /// Tenant isolation violation, rejected before any store interaction
    #[error("Isolation violation: {message}")]
    Isolation { message: String },

    /// Resource not found
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Transient delivery failure, retryable
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Integrity failure, never auto-corrected
    #[error("Integrity failure: {message}")]
    Integrity { message: String },

    /// Database error
    #[error("Database error: {message}")]
    Database { message: String },

    /// Internal server error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    // ========== Convenient constructors ==========

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create an Isolation error
    pub fn isolation(message: impl Into<String>) -> Self {
        Self::Isolation { message: message.into() }
    }

    /// Create a NotFound error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a Transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    /// Create an Integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity { message: message.into() }
    }

    /// Create a Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Error inspection methods ==========

    /// Get the reason code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Isolation { .. } => ErrorCode::Isolation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Transient { .. } => ErrorCode::Transient,
            Self::Integrity { .. } => ErrorCode::Integrity,
            Self::Database { .. } => ErrorCode::Database,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message } => message.clone(),
            Self::Isolation { message } => message.clone(),
            Self::NotFound { resource } => format!("{resource} not found"),
            Self::Transient { message } => message.clone(),
            Self::Integrity { message } => message.clone(),
            Self::Database { message } => message.clone(),
            Self::Internal { message } => message.clone(),
        }
    }
}

/// Result type for platform operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::Validation.code(), "L0001");
        assert_eq!(ErrorCode::Isolation.code(), "L0002");
        assert_eq!(ErrorCode::Integrity.code(), "L0005");
    }

    #[test]
    fn constructors_map_to_codes() {
        assert_eq!(
            AppError::isolation("no tenant context").error_code(),
            ErrorCode::Isolation
        );
        assert_eq!(
            AppError::not_found("DlqEntry").message(),
            "DlqEntry not found"
        );
    }
}
