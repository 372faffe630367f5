//! Usage ledger
//!
//! [`Ledger`] is the write path for metered usage and the read path for
//! running costs and history. Each event is normalized outside any lock,
//! then applied under the owning user's mutex: the account snapshot is
//! loaded, rollover, aggregate update and history merge are computed in
//! memory, and everything lands in one atomic store commit together with
//! the event id that makes the write exactly-once.
//!
//! # Examples
//!
//! ```no_run
//! use costbook::config::LedgerConfig;
//! use costbook::ledger::Ledger;
//! use costbook_core::types::{UsageEvent, UserId};
//! use costbook_pricing::{CostCalculator, PricingTable};
//! use costbook_store::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> costbook_core::Result<()> {
//! let ledger = Ledger::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(CostCalculator::new(Arc::new(PricingTable::builtin()))),
//!     LedgerConfig::default(),
//! );
//!
//! let event = UsageEvent::new(UserId::new(42), "chat_tokens", 1_200.0, chrono::Utc::now())
//!     .with_event_id("msg-1");
//! let outcome = ledger.record_usage(event).await?;
//! assert!(outcome.applied);
//!
//! let costs = ledger.get_current_costs(UserId::new(42)).await?;
//! println!("today: {}", costs.day);
//! # Ok(())
//! # }
//! ```

use costbook_core::clock::{Clock, SystemClock};
use costbook_core::error::{LedgerError, Result};
use costbook_core::retry::with_retry;
use costbook_core::store::{AccountCommit, LedgerStore};
use costbook_core::types::{
    CanonicalRecord, CurrentCosts, DailyDate, DateRange, Money, UsageEvent, UsageHistoryEntry,
    User, UserId,
};
use costbook_pricing::Pricing;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::apply_record;
use crate::budget::Budget;
use crate::config::{LedgerConfig, UnknownUserPolicy};
use crate::history::{self, UsageSummary};
use crate::locks::UserLocks;
use crate::normalizer::Normalizer;
use crate::rollover::roll_forward;

/// Result of recording one usage event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// False when the event id had already been applied
    pub applied: bool,
    /// The event was dated before the user's last update; it counted toward
    /// all-time cost and its own history day only
    pub late: bool,
    /// The normalized record
    pub record: CanonicalRecord,
}

/// All-time cost compared with the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: UserId,
    /// Running all-time aggregate
    pub all_time: Money,
    /// Sum of every history bucket
    pub history_total: Money,
    /// `all_time - history_total`
    pub drift: Money,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Outcome of a rollover sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Users inspected
    pub users: usize,
    /// Users whose day or month totals were reset
    pub rolled: usize,
    /// Users left unrolled after their rollover failed
    pub failed: usize,
}

/// Usage-accounting ledger
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    normalizer: Normalizer,
    locks: UserLocks,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl Ledger {
    /// Create a ledger on the system clock
    pub fn new(store: Arc<dyn LedgerStore>, pricing: Arc<dyn Pricing>, config: LedgerConfig) -> Self {
        Self {
            store,
            normalizer: Normalizer::new(pricing, config.timezone),
            locks: UserLocks::new(),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Today's calendar date in the ledger's timezone
    pub fn today(&self) -> DailyDate {
        self.config.timezone.date_of(&self.clock.now())
    }

    /// Run `operation` under the configured timeout
    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.operation_timeout, fut)
            .await
            .map_err(|_| {
                LedgerError::PersistenceFailure(format!(
                    "{operation} timed out after {}ms",
                    self.config.operation_timeout.as_millis()
                ))
            })?
    }

    // ==================== Users ====================

    /// Return the user, registering it first if needed
    ///
    /// Without a name the user is registered as `user-<id>`.
    pub async fn ensure_user(&self, user_id: UserId, user_name: Option<&str>) -> Result<User> {
        if let Some(user) = self.store.get_user(user_id).await? {
            return Ok(user);
        }

        let user = User {
            user_id,
            user_name: user_name
                .map(str::to_string)
                .unwrap_or_else(|| format!("user-{user_id}")),
            created_at: self.clock.now(),
        };
        let user = with_retry(&self.config.retry, "insert_user", || {
            self.store.insert_user(user.clone())
        })
        .await?;
        info!(user_id = %user.user_id, user_name = %user.user_name, "Registered user");
        Ok(user)
    }

    async fn resolve_user(&self, event: &UsageEvent) -> Result<Option<User>> {
        if let Some(user) = self.store.get_user(event.user_id).await? {
            return Ok(Some(user));
        }
        match self.config.unknown_user_policy {
            UnknownUserPolicy::AutoProvision => self
                .ensure_user(event.user_id, event.user_name.as_deref())
                .await
                .map(Some),
            UnknownUserPolicy::Reject => Err(LedgerError::UnknownUser(event.user_id)),
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(LedgerError::UnknownUser(user_id))
    }

    // ==================== Usage accounting ====================

    /// Record one metered usage event
    ///
    /// Applying an event id that is still in the applied-event window is a
    /// no-op reported as `applied: false`.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` for malformed events or costs that would overflow the
    /// user's totals, `UnknownUser` when the user is not registered and the
    /// policy rejects unknown users, and `PersistenceFailure` when the store
    /// stays unavailable or the operation times out.
    pub async fn record_usage(&self, event: UsageEvent) -> Result<RecordOutcome> {
        self.bounded("record_usage", async {
            let user = self.resolve_user(&event).await?;
            let record = self.normalizer.normalize(&event, user.as_ref())?;
            self.apply(record).await
        })
        .await
    }

    async fn apply(&self, record: CanonicalRecord) -> Result<RecordOutcome> {
        let _guard = self.locks.lock(record.user_id).await;
        let record = &record;
        with_retry(&self.config.retry, "record_usage", || self.apply_locked(record)).await
    }

    async fn apply_locked(&self, record: &CanonicalRecord) -> Result<RecordOutcome> {
        let snapshot = self
            .store
            .load_account(record.user_id, record.date, Some(&record.event_id))
            .await?;

        if snapshot.already_applied {
            debug!(
                event_id = %record.event_id,
                user_id = %record.user_id,
                "Skipping already applied event"
            );
            return Ok(RecordOutcome {
                applied: false,
                late: false,
                record: record.clone(),
            });
        }

        let update = apply_record(snapshot.costs, record)?;
        let entry = history::merge_record(snapshot.history, record)?;
        if update.late {
            warn!(
                event_id = %record.event_id,
                user_id = %record.user_id,
                date = %record.date,
                last_update = %update.costs.last_update,
                "Late usage event; counted toward all-time cost only"
            );
        }

        let now = self.clock.now();
        self.store
            .commit_account(AccountCommit {
                user_id: record.user_id,
                costs: update.costs,
                history: Some(entry),
                applied: Some((record.event_id.clone(), now)),
                prune_applied_before: now.checked_sub_signed(self.config.dedup_window),
            })
            .await?;

        Ok(RecordOutcome {
            applied: true,
            late: update.late,
            record: record.clone(),
        })
    }

    /// Current running costs, rolled forward to today
    ///
    /// A user without any usage gets a zeroed row dated today.
    pub async fn get_current_costs(&self, user_id: UserId) -> Result<CurrentCosts> {
        self.require_user(user_id).await?;
        let today = self.today();
        self.bounded("get_current_costs", self.roll_user(user_id, today))
            .await
            .map(|(costs, _)| costs)
    }

    /// Budget left in the configured period
    ///
    /// Spending is read after rollover, so the budget resets when a new day
    /// or month begins.
    pub async fn remaining_budget(&self, user_id: UserId) -> Result<Budget> {
        let costs = self.get_current_costs(user_id).await?;
        Ok(self.config.budget.status(&costs))
    }

    /// Roll one user's costs forward to `as_of`, committing only on change
    async fn roll_user(&self, user_id: UserId, as_of: DailyDate) -> Result<(CurrentCosts, bool)> {
        let _guard = self.locks.lock(user_id).await;
        with_retry(&self.config.retry, "rollover", || self.roll_locked(user_id, as_of)).await
    }

    async fn roll_locked(&self, user_id: UserId, as_of: DailyDate) -> Result<(CurrentCosts, bool)> {
        let Some(mut costs) = self.store.get_costs(user_id).await? else {
            return Ok((CurrentCosts::zeroed(user_id, as_of), false));
        };
        let rollover = roll_forward(&mut costs, as_of);
        if rollover.changed() {
            self.store
                .commit_account(AccountCommit::costs_only(costs))
                .await?;
            debug!(user_id = %user_id, ?rollover, as_of = %as_of, "Rolled over running costs");
        }
        Ok((costs, rollover.changed()))
    }

    /// History buckets of a user in `range`, ordered by date
    pub async fn get_history(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<Vec<UsageHistoryEntry>> {
        self.store.get_history(user_id, range).await
    }

    /// Per-category usage for the day and month of `as_of` (default today)
    pub async fn usage_summary(
        &self,
        user_id: UserId,
        as_of: Option<DailyDate>,
    ) -> Result<UsageSummary> {
        let as_of = as_of.unwrap_or_else(|| self.today());
        let range = DateRange::all()
            .with_since(as_of.month_start())
            .with_until(as_of);
        let entries = self.store.get_history(user_id, &range).await?;
        Ok(UsageSummary::from_entries(user_id, as_of, &entries))
    }

    /// Compare the all-time aggregate with the history log
    pub async fn reconcile(&self, user_id: UserId) -> Result<Reconciliation> {
        self.require_user(user_id).await?;
        let all_time = self
            .store
            .get_costs(user_id)
            .await?
            .map(|costs| costs.all_time)
            .unwrap_or(Money::ZERO);
        let entries = self.store.get_history(user_id, &DateRange::all()).await?;
        let history_total = history::total_cost(&entries);
        let reconciliation = Reconciliation {
            user_id,
            all_time,
            history_total,
            drift: all_time - history_total,
        };
        if !reconciliation.is_consistent() {
            warn!(
                user_id = %user_id,
                all_time = %all_time,
                history_total = %history_total,
                "All-time cost drifted from history"
            );
        }
        Ok(reconciliation)
    }

    /// Reset the all-time aggregate to the history total
    ///
    /// Day and month totals are left alone.
    pub async fn repair_all_time(&self, user_id: UserId) -> Result<Reconciliation> {
        self.require_user(user_id).await?;
        let today = self.today();
        let _guard = self.locks.lock(user_id).await;
        with_retry(&self.config.retry, "repair_all_time", || {
            self.repair_locked(user_id, today)
        })
        .await
    }

    async fn repair_locked(&self, user_id: UserId, today: DailyDate) -> Result<Reconciliation> {
        let entries = self.store.get_history(user_id, &DateRange::all()).await?;
        let history_total = history::total_cost(&entries);
        let mut costs = self
            .store
            .get_costs(user_id)
            .await?
            .unwrap_or_else(|| CurrentCosts::zeroed(user_id, today));
        let previous = costs.all_time;
        costs.all_time = history_total;
        self.store
            .commit_account(AccountCommit::costs_only(costs))
            .await?;
        info!(
            user_id = %user_id,
            previous = %previous,
            repaired = %history_total,
            "Repaired all-time cost from history"
        );
        Ok(Reconciliation {
            user_id,
            all_time: history_total,
            history_total,
            drift: Money::ZERO,
        })
    }

    // ==================== Rollover sweep ====================

    /// Roll every user forward to `as_of` (default today)
    ///
    /// A user whose rollover fails is logged and counted in
    /// [`SweepReport::failed`]; the sweep moves on to the next user.
    pub async fn sweep(&self, as_of: Option<DailyDate>) -> Result<SweepReport> {
        let as_of = as_of.unwrap_or_else(|| self.today());
        let users = self.store.list_users().await?;
        let mut report = SweepReport {
            users: users.len(),
            ..SweepReport::default()
        };
        for user in &users {
            match self
                .bounded("sweep", self.roll_user(user.user_id, as_of))
                .await
            {
                Ok((_, true)) => report.rolled += 1,
                Ok((_, false)) => {}
                Err(e) => {
                    warn!(user_id = %user.user_id, error = %e, "Failed to roll over user");
                    report.failed += 1;
                }
            }
        }
        info!(
            as_of = %as_of,
            users = report.users,
            rolled = report.rolled,
            failed = report.failed,
            "Rollover sweep finished"
        );
        Ok(report)
    }

    /// Sweep every `interval` on a background task
    ///
    /// Failed sweeps are logged and retried on the next tick.
    pub fn spawn_periodic_sweep(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep(None).await {
                    warn!(error = %e, "Periodic rollover sweep failed");
                }
            }
        })
    }
}
