//! Error types for costbook
//!
//! This module defines the error types used throughout the costbook ledger.
//! All errors are derived from `thiserror` for convenient error handling
//! and automatic `From` implementations.
//!
//! # Example
//!
//! ```
//! use costbook_core::error::{LedgerError, Result};
//!
//! fn example_function() -> Result<()> {
//!     // This will automatically convert io::Error to LedgerError
//!     let _file = std::fs::read_to_string("nonexistent.txt")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::types::{ModelName, PaymentId, PaymentStatus, UserId};

/// Main error type for ledger operations
///
/// Besides the plumbing variants (IO, JSON), the ledger distinguishes
/// malformed input, which is never retried, from transient storage and
/// concurrency failures, which callers may retry with backoff.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed usage event; rejected, not retried
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The user does not exist and the provisioning policy rejects it
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// No rate is configured for the model or its category
    #[error("Unknown model: {0}")]
    UnknownModel(ModelName),

    /// A concurrent writer changed the row first; retry with backoff
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Storage is unavailable or the operation timed out
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Payment id does not resolve
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// Payment status cannot advance from `from` to `to`
    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: PaymentStatus,
        /// Requested status
        to: PaymentStatus,
    },

    /// User name already belongs to another user
    #[error("User name already taken: {0}")]
    DuplicateUserName(String),

    /// Invalid date format
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid timezone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl LedgerError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrencyConflict(_) | LedgerError::PersistenceFailure(_)
        )
    }
}

/// Convenience type alias for Results in costbook
///
/// # Example
///
/// ```
/// use costbook_core::Result;
///
/// fn process_data() -> Result<String> {
///     Ok("Processed successfully".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LedgerError::UnknownUser(UserId::new(42));
        assert_eq!(error.to_string(), "Unknown user: 42");

        let error = LedgerError::InvalidTransition {
            from: PaymentStatus::Failed,
            to: PaymentStatus::Completed,
        };
        assert_eq!(
            error.to_string(),
            "Invalid payment transition: failed -> completed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let ledger_error: LedgerError = io_error.into();
        assert!(matches!(ledger_error, LedgerError::Io(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::PersistenceFailure("down".into()).is_transient());
        assert!(LedgerError::ConcurrencyConflict("version".into()).is_transient());
        assert!(!LedgerError::InvalidEvent("negative".into()).is_transient());
        assert!(!LedgerError::UnknownUser(UserId::new(1)).is_transient());
    }
}
