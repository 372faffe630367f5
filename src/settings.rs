//! Per-user model settings
//!
//! Each user has at most one settings row. Partial updates fill the other
//! field with its default when the row does not exist yet.

use costbook_core::clock::{Clock, SystemClock};
use costbook_core::error::{LedgerError, Result};
use costbook_core::store::LedgerStore;
use costbook_core::types::{ModelName, UserId, UserSettings};
use std::sync::Arc;
use tracing::info;

use crate::locks::UserLocks;

/// Reads and writes user settings
pub struct SettingsBook {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl SettingsBook {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            locks: UserLocks::new(),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Settings of a user, `None` if never set
    pub async fn get_settings(&self, user_id: UserId) -> Result<Option<UserSettings>> {
        self.store.get_settings(user_id).await
    }

    /// Replace both fields
    pub async fn set_settings(
        &self,
        user_id: UserId,
        model_name: &str,
        brain: &str,
    ) -> Result<UserSettings> {
        let _guard = self.locks.lock(user_id).await;
        self.write(user_id, model_name, brain).await
    }

    /// Change the model, keeping the brain (default `assistant`)
    pub async fn update_model(&self, user_id: UserId, model_name: &str) -> Result<UserSettings> {
        let _guard = self.locks.lock(user_id).await;
        let brain = self
            .store
            .get_settings(user_id)
            .await?
            .map(|settings| settings.brain)
            .unwrap_or_else(|| UserSettings::DEFAULT_BRAIN.to_string());
        self.write(user_id, model_name, &brain).await
    }

    /// Change the brain, keeping the model (default `gpt-3.5-turbo-0125`)
    pub async fn update_brain(&self, user_id: UserId, brain: &str) -> Result<UserSettings> {
        let _guard = self.locks.lock(user_id).await;
        let model = self
            .store
            .get_settings(user_id)
            .await?
            .map(|settings| settings.model_name)
            .unwrap_or_else(|| ModelName::new(UserSettings::DEFAULT_MODEL));
        self.write(user_id, model.as_str(), brain).await
    }

    async fn write(&self, user_id: UserId, model_name: &str, brain: &str) -> Result<UserSettings> {
        if model_name.trim().is_empty() || brain.trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "model name and brain must not be empty".to_string(),
            ));
        }
        let settings = UserSettings {
            user_id,
            model_name: ModelName::new(model_name.trim()),
            brain: brain.trim().to_string(),
            last_update: self.clock.now(),
        };
        self.store.upsert_settings(settings.clone()).await?;
        info!(
            user_id = %user_id,
            model = %settings.model_name,
            brain = %settings.brain,
            "Updated user settings"
        );
        Ok(settings)
    }
}
