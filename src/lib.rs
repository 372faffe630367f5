//! costbook - usage-accounting ledger for metered AI usage
//!
//! This library provides functionality to:
//! - Normalize metered usage events (tokens, seconds, images, characters)
//!   into priced canonical records
//! - Maintain per-user day / month / all-time running costs with
//!   exactly-once application and day/month rollover
//! - Keep a per-day usage history with per-category, per-model breakdowns
//! - Track remaining spending budgets per day, month or all time
//! - Record payments and per-user model settings
//!
//! # Examples
//!
//! ```no_run
//! use costbook::{config::LedgerConfig, ledger::Ledger};
//! use costbook_core::types::{DateRange, UsageEvent, UserId};
//! use costbook_pricing::{CostCalculator, PricingTable};
//! use costbook_store::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> costbook_core::Result<()> {
//!     let store = Arc::new(JsonFileStore::open("ledger.json").await?);
//!     let pricing = Arc::new(CostCalculator::new(Arc::new(PricingTable::builtin())));
//!     let ledger = Ledger::new(store, pricing, LedgerConfig::default());
//!
//!     let event = UsageEvent::new(UserId::new(7), "transcription_seconds", 42.5, chrono::Utc::now());
//!     ledger.record_usage(event).await?;
//!
//!     let history = ledger.get_history(UserId::new(7), &DateRange::all()).await?;
//!     println!("{} days of usage", history.len());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod budget;
pub mod cli;
pub mod config;
pub mod history;
pub mod import;
pub mod ledger;
pub mod locks;
pub mod normalizer;
pub mod output;
pub mod payments;
pub mod rollover;
pub mod settings;

// Re-export commonly used types
pub use budget::{Budget, BudgetConfig, BudgetPeriod};
pub use config::{LedgerConfig, UnknownUserPolicy};
pub use costbook_core::{LedgerError, Result};
pub use ledger::{Ledger, Reconciliation, RecordOutcome, SweepReport};
pub use payments::PaymentBook;
pub use settings::SettingsBook;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
