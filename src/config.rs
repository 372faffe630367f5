//! Ledger configuration
//!
//! [`LedgerConfig`] collects the knobs the ledger reads at run time. The
//! CLI builds one from its flags (see [`crate::cli::LedgerArgs`]); library
//! users start from [`LedgerConfig::default`] and adjust with the `with_*`
//! builders.

use costbook_core::retry::RetryConfig;
use costbook_core::timezone::TimezoneConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::budget::BudgetConfig;

/// How events for users that are not registered are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownUserPolicy {
    /// Register the user on its first event
    #[default]
    AutoProvision,
    /// Fail the event with `UnknownUser`
    Reject,
}

impl fmt::Display for UnknownUserPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoProvision => write!(f, "auto-provision"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for UnknownUserPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto-provision" | "auto_provision" | "auto" => Ok(Self::AutoProvision),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid unknown-user policy: {s}")),
        }
    }
}

/// Runtime configuration of a [`crate::ledger::Ledger`]
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Timezone that assigns events to calendar days
    pub timezone: TimezoneConfig,
    /// Handling of events for unregistered users
    pub unknown_user_policy: UnknownUserPolicy,
    /// How long applied event ids are remembered for deduplication
    pub dedup_window: chrono::Duration,
    /// Upper bound on one accounting operation, retries included
    pub operation_timeout: Duration,
    /// Backoff for transient store failures
    pub retry: RetryConfig,
    /// Spending limits per budget period
    pub budget: BudgetConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timezone: TimezoneConfig::default(),
            unknown_user_policy: UnknownUserPolicy::default(),
            dedup_window: chrono::Duration::days(7),
            operation_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl LedgerConfig {
    pub fn with_timezone(mut self, timezone: TimezoneConfig) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_unknown_user_policy(mut self, policy: UnknownUserPolicy) -> Self {
        self.unknown_user_policy = policy;
        self
    }

    pub fn with_dedup_window(mut self, window: chrono::Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "auto-provision".parse::<UnknownUserPolicy>().unwrap(),
            UnknownUserPolicy::AutoProvision
        );
        assert_eq!(
            "REJECT".parse::<UnknownUserPolicy>().unwrap(),
            UnknownUserPolicy::Reject
        );
        assert!("maybe".parse::<UnknownUserPolicy>().is_err());
        assert_eq!(UnknownUserPolicy::Reject.to_string(), "reject");
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.unknown_user_policy, UnknownUserPolicy::AutoProvision);
        assert_eq!(config.dedup_window, chrono::Duration::days(7));
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert!(config.retry.enabled);
        assert_eq!(config.budget.period, crate::budget::BudgetPeriod::Monthly);
        assert_eq!(config.budget.default_limit, None);
    }

    #[test]
    fn test_builders() {
        let config = LedgerConfig::default()
            .with_timezone(TimezoneConfig::utc())
            .with_unknown_user_policy(UnknownUserPolicy::Reject)
            .with_dedup_window(chrono::Duration::hours(1))
            .with_operation_timeout(Duration::from_millis(250))
            .with_retry(RetryConfig::disabled());
        assert_eq!(config.timezone.display_name(), "UTC");
        assert_eq!(config.unknown_user_policy, UnknownUserPolicy::Reject);
        assert_eq!(config.dedup_window, chrono::Duration::hours(1));
        assert!(!config.retry.enabled);
    }
}
