//! Serializable ledger state shared by the store backends
//!
//! Both backends keep a [`LedgerState`] in memory and run every trait
//! operation against it through the methods here. The file backend also
//! serializes it as the on-disk format.

use chrono::{DateTime, Utc};
use costbook_core::error::{LedgerError, Result};
use costbook_core::store::{AccountCommit, AccountSnapshot};
use costbook_core::types::{
    CurrentCosts, DailyDate, DateRange, EventId, Payment, PaymentId, UsageHistoryEntry, User,
    UserId, UserSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything stored for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<CurrentCosts>,
    #[serde(default)]
    pub history: BTreeMap<DailyDate, UsageHistoryEntry>,
    /// Applied-event window: event id to ingestion time
    #[serde(default)]
    pub applied: BTreeMap<EventId, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<UserSettings>,
}

impl UserRecord {
    fn new(user: User) -> Self {
        Self {
            user,
            costs: None,
            history: BTreeMap::new(),
            applied: BTreeMap::new(),
            settings: None,
        }
    }
}

/// Whole ledger state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserRecord>,
    #[serde(default)]
    pub payments: BTreeMap<PaymentId, Payment>,
}

impl LedgerState {
    fn record(&self, user_id: UserId) -> Result<&UserRecord> {
        self.users
            .get(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))
    }

    fn record_mut(&mut self, user_id: UserId) -> Result<&mut UserRecord> {
        self.users
            .get_mut(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))
    }

    pub fn get_user(&self, user_id: UserId) -> Option<User> {
        self.users.get(&user_id).map(|record| record.user.clone())
    }

    pub fn insert_user(&mut self, user: User) -> Result<User> {
        if let Some(existing) = self.users.get(&user.user_id) {
            return Ok(existing.user.clone());
        }
        if self
            .users
            .values()
            .any(|record| record.user.user_name == user.user_name)
        {
            return Err(LedgerError::DuplicateUserName(user.user_name));
        }
        self.users
            .insert(user.user_id, UserRecord::new(user.clone()));
        Ok(user)
    }

    pub fn list_users(&self) -> Vec<User> {
        self.users.values().map(|record| record.user.clone()).collect()
    }

    pub fn load_account(
        &self,
        user_id: UserId,
        date: DailyDate,
        event_id: Option<&EventId>,
    ) -> Result<AccountSnapshot> {
        let record = self.record(user_id)?;
        Ok(AccountSnapshot {
            costs: record.costs,
            history: record.history.get(&date).cloned(),
            already_applied: event_id.is_some_and(|id| record.applied.contains_key(id)),
        })
    }

    pub fn commit_account(&mut self, commit: AccountCommit) -> Result<()> {
        let record = self.record_mut(commit.user_id)?;
        if let Some(cutoff) = commit.prune_applied_before {
            record.applied.retain(|_, applied_at| *applied_at >= cutoff);
        }
        if let Some((event_id, applied_at)) = commit.applied {
            record.applied.insert(event_id, applied_at);
        }
        if let Some(history) = commit.history {
            record.history.insert(history.date, history);
        }
        record.costs = Some(commit.costs);
        Ok(())
    }

    pub fn get_costs(&self, user_id: UserId) -> Result<Option<CurrentCosts>> {
        Ok(self.record(user_id)?.costs)
    }

    pub fn get_history(&self, user_id: UserId, range: &DateRange) -> Result<Vec<UsageHistoryEntry>> {
        Ok(self
            .record(user_id)?
            .history
            .values()
            .filter(|entry| range.contains(&entry.date))
            .cloned()
            .collect())
    }

    pub fn insert_payment(&mut self, payment: Payment) -> Result<()> {
        self.record(payment.user_id)?;
        if self.payments.contains_key(&payment.payment_id) {
            return Err(LedgerError::InvalidArgument(format!(
                "Payment {} already exists",
                payment.payment_id
            )));
        }
        self.payments.insert(payment.payment_id, payment);
        Ok(())
    }

    pub fn get_payment(&self, payment_id: PaymentId) -> Option<Payment> {
        self.payments.get(&payment_id).cloned()
    }

    pub fn compare_and_swap_payment(&mut self, payment: Payment, expected_version: u64) -> Result<()> {
        let stored = self
            .payments
            .get_mut(&payment.payment_id)
            .ok_or(LedgerError::PaymentNotFound(payment.payment_id))?;
        if stored.version != expected_version {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "payment {} is at version {}, expected {}",
                payment.payment_id, stored.version, expected_version
            )));
        }
        *stored = payment;
        Ok(())
    }

    pub fn list_payments(&self, user_id: UserId) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .values()
            .filter(|payment| payment.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by_key(|payment| payment.created_at);
        payments
    }

    pub fn get_settings(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        Ok(self.record(user_id)?.settings.clone())
    }

    pub fn upsert_settings(&mut self, settings: UserSettings) -> Result<()> {
        let user_id = settings.user_id;
        self.record_mut(user_id)?.settings = Some(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use costbook_core::types::{ModelName, Money, PaymentStatus};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn user(id: i64, name: &str) -> User {
        User {
            user_id: UserId::new(id),
            user_name: name.to_string(),
            created_at: ts(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> DailyDate {
        DailyDate::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_insert_user_is_idempotent_and_names_unique() {
        let mut state = LedgerState::default();
        state.insert_user(user(1, "alice")).unwrap();
        let again = state.insert_user(user(1, "renamed")).unwrap();
        assert_eq!(again.user_name, "alice");
        assert!(matches!(
            state.insert_user(user(2, "alice")),
            Err(LedgerError::DuplicateUserName(_))
        ));
        assert_eq!(state.list_users().len(), 1);
    }

    #[test]
    fn test_commit_prunes_applied_window() {
        let mut state = LedgerState::default();
        let user_id = UserId::new(1);
        state.insert_user(user(1, "alice")).unwrap();
        let d = date(2024, 3, 1);

        let mut commit = AccountCommit::costs_only(CurrentCosts::zeroed(user_id, d));
        commit.applied = Some((EventId::new("old"), ts() - chrono::Duration::days(3)));
        state.commit_account(commit).unwrap();

        let mut commit = AccountCommit::costs_only(CurrentCosts::zeroed(user_id, d));
        commit.applied = Some((EventId::new("new"), ts()));
        commit.prune_applied_before = Some(ts() - chrono::Duration::days(1));
        state.commit_account(commit).unwrap();

        let old = state
            .load_account(user_id, d, Some(&EventId::new("old")))
            .unwrap();
        let new = state
            .load_account(user_id, d, Some(&EventId::new("new")))
            .unwrap();
        assert!(!old.already_applied);
        assert!(new.already_applied);
    }

    #[test]
    fn test_history_range_filter() {
        let mut state = LedgerState::default();
        let user_id = UserId::new(1);
        state.insert_user(user(1, "alice")).unwrap();
        for day in [1, 5, 9] {
            let d = date(2024, 3, day);
            let mut commit = AccountCommit::costs_only(CurrentCosts::zeroed(user_id, d));
            commit.history = Some(UsageHistoryEntry::new(user_id, d));
            state.commit_account(commit).unwrap();
        }
        let range = DateRange::all()
            .with_since(date(2024, 3, 2))
            .with_until(date(2024, 3, 9));
        let entries = state.get_history(user_id, &range).unwrap();
        let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![date(2024, 3, 5), date(2024, 3, 9)]);
    }

    #[test]
    fn test_payment_compare_and_swap() {
        let mut state = LedgerState::default();
        state.insert_user(user(1, "alice")).unwrap();
        let payment = Payment {
            payment_id: PaymentId::generate(),
            user_id: UserId::new(1),
            amount: Money::from_micros(5_000_000),
            method: "card".to_string(),
            status: PaymentStatus::Pending,
            created_at: ts(),
            updated_at: ts(),
            version: 0,
        };
        state.insert_payment(payment.clone()).unwrap();

        let mut completed = payment.clone();
        completed.status = PaymentStatus::Completed;
        completed.version = 1;
        state.compare_and_swap_payment(completed.clone(), 0).unwrap();
        assert!(matches!(
            state.compare_and_swap_payment(completed, 0),
            Err(LedgerError::ConcurrencyConflict(_))
        ));
        assert_eq!(
            state.get_payment(payment.payment_id).unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[test]
    fn test_unknown_user_operations_fail() {
        let state = LedgerState::default();
        assert!(matches!(
            state.get_costs(UserId::new(9)),
            Err(LedgerError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = LedgerState::default();
        let user_id = UserId::new(1);
        state.insert_user(user(1, "alice")).unwrap();
        let d = date(2024, 3, 1);
        let mut commit = AccountCommit::costs_only(CurrentCosts::zeroed(user_id, d));
        commit.history = Some(UsageHistoryEntry::new(user_id, d));
        commit.applied = Some((EventId::new("e1"), ts()));
        state.commit_account(commit).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let restored: LedgerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_upsert_settings_replaces_previous() {
        let mut state = LedgerState::default();
        let user_id = UserId::new(1);
        state.insert_user(user(1, "alice")).unwrap();
        let settings = |model: &str| UserSettings {
            user_id,
            model_name: ModelName::new(model),
            brain: "tutor".to_string(),
            last_update: ts(),
        };

        state.upsert_settings(settings("gpt-3.5-turbo")).unwrap();
        state.upsert_settings(settings("gpt-4")).unwrap();
        assert_eq!(state.get_settings(user_id).unwrap(), Some(settings("gpt-4")));

        let mut stranger = settings("gpt-4");
        stranger.user_id = UserId::new(9);
        assert!(matches!(
            state.upsert_settings(stranger),
            Err(LedgerError::UnknownUser(_))
        ));
    }
}
