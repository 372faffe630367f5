//! Storage trait for ledger state
//!
//! This module defines the `LedgerStore` trait that every storage backend
//! implements. Usage accounting goes through a snapshot/commit pair: the
//! ledger loads everything one event touches, computes the new state in
//! memory and hands it back as a single [`AccountCommit`]. A backend must
//! apply a commit entirely or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    CurrentCosts, DailyDate, DateRange, EventId, Payment, PaymentId, UsageHistoryEntry, User,
    UserId, UserSettings,
};

/// State of one user's account as seen by a single usage event
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    /// Running aggregates, absent before the first event
    pub costs: Option<CurrentCosts>,
    /// History bucket for the event's date, absent before the first event that day
    pub history: Option<UsageHistoryEntry>,
    /// Whether the event id is already in the applied-event window
    pub already_applied: bool,
}

/// All writes produced by applying one usage event or one rollover
#[derive(Debug, Clone)]
pub struct AccountCommit {
    /// Owning user
    pub user_id: UserId,
    /// New running aggregates
    pub costs: CurrentCosts,
    /// New history bucket, `None` for rollover-only commits
    pub history: Option<UsageHistoryEntry>,
    /// Event id to add to the applied-event window, with ingestion time
    pub applied: Option<(EventId, DateTime<Utc>)>,
    /// Drop applied-event ids recorded before this instant
    pub prune_applied_before: Option<DateTime<Utc>>,
}

impl AccountCommit {
    /// Commit that only rewrites the running aggregates
    pub fn costs_only(costs: CurrentCosts) -> Self {
        Self {
            user_id: costs.user_id,
            costs,
            history: None,
            applied: None,
            prune_applied_before: None,
        }
    }
}

/// Storage backend for the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ==================== Users ====================

    /// Look up a user
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Register a user; returns the stored user if the id already exists.
    ///
    /// Fails with `DuplicateUserName` when another user owns the name.
    async fn insert_user(&self, user: User) -> Result<User>;

    /// All registered users, ordered by id
    async fn list_users(&self) -> Result<Vec<User>>;

    // ==================== Usage accounting ====================

    /// Load the state an event for `date` touches
    async fn load_account(
        &self,
        user_id: UserId,
        date: DailyDate,
        event_id: Option<&EventId>,
    ) -> Result<AccountSnapshot>;

    /// Apply a commit atomically
    async fn commit_account(&self, commit: AccountCommit) -> Result<()>;

    /// Running aggregates of a user
    async fn get_costs(&self, user_id: UserId) -> Result<Option<CurrentCosts>>;

    /// History buckets in `range`, ordered by date
    async fn get_history(&self, user_id: UserId, range: &DateRange)
    -> Result<Vec<UsageHistoryEntry>>;

    // ==================== Payments ====================

    /// Store a new payment
    async fn insert_payment(&self, payment: Payment) -> Result<()>;

    /// Look up a payment
    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Replace a payment if its stored version still equals `expected_version`.
    ///
    /// Fails with `ConcurrencyConflict` otherwise.
    async fn compare_and_swap_payment(&self, payment: Payment, expected_version: u64)
    -> Result<()>;

    /// Payments of a user, oldest first
    async fn list_payments(&self, user_id: UserId) -> Result<Vec<Payment>>;

    // ==================== Settings ====================

    /// Current settings of a user
    async fn get_settings(&self, user_id: UserId) -> Result<Option<UserSettings>>;

    /// Insert or replace the single settings row of a user
    async fn upsert_settings(&self, settings: UserSettings) -> Result<()>;
}
