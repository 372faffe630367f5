//! JSON file store
//!
//! Keeps the whole ledger in one JSON document. Every mutation works on a
//! copy of the state, writes it to a temporary file next to the target,
//! renames it over the target and only then swaps the copy in. A failed
//! write leaves both the file and the in-memory state unchanged.
//!
//! Each commit clones and re-serializes the entire ledger under the write
//! lock, so a single write costs time proportional to the ledger size and
//! replaying N events costs O(N x ledger size). The store suits ledgers of
//! modest size; large imports are dominated by these rewrites.

use async_trait::async_trait;
use costbook_core::error::{LedgerError, Result};
use costbook_core::store::{AccountCommit, AccountSnapshot, LedgerStore};
use costbook_core::types::{
    CurrentCosts, DailyDate, DateRange, EventId, Payment, PaymentId, UsageHistoryEntry, User,
    UserId, UserSettings,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::state::LedgerState;

/// Ledger store persisted to a JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<LedgerState>,
}

impl JsonFileStore {
    /// Default ledger location under the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("costbook").join("ledger.json"))
    }

    /// Open a ledger file, starting empty if it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let state: LedgerState = serde_json::from_str(&contents)?;
                info!(
                    "Loaded ledger with {} users from {}",
                    state.users.len(),
                    path.display()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", path.display());
                LedgerState::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the state, persist it, then publish it
    async fn mutate<T>(&self, mutate: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let value = mutate(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(value)
    }

    async fn persist(&self, state: &LedgerState) -> Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error(&self.path, e))?;
        }

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| persistence_error(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(persistence_error(&self.path, e));
        }
        Ok(())
    }
}

fn persistence_error(path: &Path, err: std::io::Error) -> LedgerError {
    LedgerError::PersistenceFailure(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.get_user(user_id))
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        if let Some(existing) = self.state.read().await.get_user(user.user_id) {
            return Ok(existing);
        }
        self.mutate(|state| state.insert_user(user)).await
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
        self.mutate(|state| state.commit_account(commit)).await
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
        self.mutate(|state| state.insert_payment(payment)).await
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.get_payment(payment_id))
    }

    async fn compare_and_swap_payment(
        &self,
        payment: Payment,
        expected_version: u64,
    ) -> Result<()> {
        self.mutate(|state| state.compare_and_swap_payment(payment, expected_version))
            .await
    }

    async fn list_payments(&self, user_id: UserId) -> Result<Vec<Payment>> {
        Ok(self.state.read().await.list_payments(user_id))
    }

    async fn get_settings(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        self.state.read().await.get_settings(user_id)
    }

    async fn upsert_settings(&self, settings: UserSettings) -> Result<()> {
        self.mutate(|state| state.upsert_settings(settings)).await
    }
}
