//! In-memory store
//!
//! Thread-safe [`LedgerStore`] over a [`LedgerState`] behind a `RwLock`,
//! used by tests, benchmarks and `--in-memory` runs. Commits can be made to
//! fail or writes stall on demand to exercise retry and timeout paths.

use async_trait::async_trait;
use costbook_core::error::{LedgerError, Result};
use costbook_core::store::{AccountCommit, AccountSnapshot, LedgerStore};
use costbook_core::types::{
    CurrentCosts, DailyDate, DateRange, EventId, Payment, PaymentId, UsageHistoryEntry, User,
    UserId, UserSettings,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::state::LedgerState;

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<LedgerState>,
    fail_next_commits: AtomicU32,
    write_delay_ms: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` account commits fail with `PersistenceFailure`
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_next_commits.store(count, Ordering::SeqCst);
    }

    /// Stall every user insert and account commit for `delay` before it
    /// touches the state
    pub fn delay_writes(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    async fn injected_delay(&self) {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Copy of the whole state
    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.get_user(user_id))
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        self.injected_delay().await;
        self.state.write().await.insert_user(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().await.list_users())
    }

    async fn load_account(
        &self,
        user_id: UserId,
        date: DailyDate,
        event_id: Option<&EventId>,
    ) -> Result<AccountSnapshot> {
        self.state.read().await.load_account(user_id, date, event_id)
    }

    async fn commit_account(&self, commit: AccountCommit) -> Result<()> {
        self.injected_delay().await;
        if self.take_injected_failure() {
            debug!("Injected commit failure for user {}", commit.user_id);
            return Err(LedgerError::PersistenceFailure(
                "injected commit failure".to_string(),
            ));
        }
        self.state.write().await.commit_account(commit)
    }

    async fn get_costs(&self, user_id: UserId) -> Result<Option<CurrentCosts>> {
        self.state.read().await.get_costs(user_id)
    }

    async fn get_history(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<Vec<UsageHistoryEntry>> {
        self.state.read().await.get_history(user_id, range)
    }

    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        self.state.write().await.insert_payment(payment)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.get_payment(payment_id))
    }

    async fn compare_and_swap_payment(
        &self,
        payment: Payment,
        expected_version: u64,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .compare_and_swap_payment(payment, expected_version)
    }

    async fn list_payments(&self, user_id: UserId) -> Result<Vec<Payment>> {
        Ok(self.state.read().await.list_payments(user_id))
    }

    async fn get_settings(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        self.state.read().await.get_settings(user_id)
    }

    async fn upsert_settings(&self, settings: UserSettings) -> Result<()> {
        self.state.write().await.upsert_settings(settings)
    }
}
