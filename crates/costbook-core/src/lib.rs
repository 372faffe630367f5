//! Core types, traits, and utilities for costbook
//!
//! This crate provides the foundational types, error handling, timezone
//! configuration, clock, retry policy and the storage trait used by all
//! other costbook crates.

pub mod clock;
pub mod error;
pub mod retry;
pub mod store;
pub mod timezone;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use error::{LedgerError, Result};
pub use types::{
    CanonicalRecord, CurrentCosts, DailyDate, DateRange, EventId, ModelName, Money, PaymentId,
    UsageCategory, UsageEvent, UsageHistoryEntry, UserId,
};
