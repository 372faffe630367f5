//! Common test utilities and helpers for costbook tests
//!
//! Builds ledgers on top of the in-memory store with a manual clock and a
//! small pricing table where 100 chat tokens cost exactly one cent.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use costbook::{LedgerConfig, ledger::Ledger};
use costbook_core::clock::ManualClock;
use costbook_core::retry::RetryConfig;
use costbook_core::store::LedgerStore;
use costbook_core::timezone::TimezoneConfig;
use costbook_core::types::{UsageCategory, UsageEvent, UserId};
use costbook_pricing::{CategoryRates, CostCalculator, PricingTable, Rate};
use costbook_store::MemoryStore;
use std::sync::Arc;

/// User charged by most tests
pub const ALICE: UserId = UserId::new(42);

/// Second user for isolation checks
pub const BOB: UserId = UserId::new(43);

/// $0.01 per 100 chat tokens, $0.02 per image
pub fn test_pricing() -> Arc<CostCalculator> {
    let table = PricingTable::new()
        .with_category(
            UsageCategory::ChatTokens,
            CategoryRates::new("gpt-3.5-turbo-0125", Rate::new(10_000, 100)),
        )
        .with_category(
            UsageCategory::NumberImages,
            CategoryRates::new("1024x1024", Rate::new(20_000, 1)),
        );
    Arc::new(CostCalculator::new(Arc::new(table)))
}

/// Retries with millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        enabled: true,
        max_retries: 5,
        initial_delay_ms: 1,
        max_delay_ms: 4,
    }
}

/// UTC ledger config with fast retries
pub fn test_config() -> LedgerConfig {
    LedgerConfig::default()
        .with_timezone(TimezoneConfig::utc())
        .with_retry(fast_retry())
}

/// Noon UTC on the given day
pub fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Ledger over a fresh in-memory store driven by a manual clock
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<Ledger>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(now, test_config())
    }

    pub fn with_config(now: DateTime<Utc>, config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let ledger = Ledger::new(store.clone(), test_pricing(), config).with_clock(clock.clone());
        Self {
            store,
            clock,
            ledger: Arc::new(ledger),
        }
    }

    /// Dyn handle on the store
    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }
}

/// Chat event worth `tokens / 100` cents
pub fn chat_event(user: UserId, id: &str, tokens: u32, at: DateTime<Utc>) -> UsageEvent {
    UsageEvent::new(user, "chat_tokens", f64::from(tokens), at).with_event_id(id)
}
