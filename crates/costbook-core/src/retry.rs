//! Retry with exponential backoff at the storage boundary
//!
//! Transient failures (`PersistenceFailure`, `ConcurrencyConflict`) are
//! retried; every other error is returned on the first attempt.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

/// Backoff policy for transient ledger errors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Execute an async ledger operation with retry logic.
///
/// `operation` names the call in log lines. Returns the first success, the
/// first non-transient error, or the last transient error once retries are
/// exhausted.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut make_call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !config.enabled {
        return make_call().await;
    }

    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match make_call().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation,
                        attempt = attempt + 1,
                        "Ledger operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation,
                    error = %error,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient ledger error, will retry after delay"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 0 {
                    warn!(
                        operation = operation,
                        error = %error,
                        attempts = attempt + 1,
                        "Ledger operation failed after all retry attempts"
                    );
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig {
            enabled: true,
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1_000));
        assert_eq!(config.delay_for_attempt(63), Duration::from_millis(1_000));
    }

    #[test]
    fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(with_retry(&fast_config(3), "commit", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LedgerError::PersistenceFailure("disk busy".into()))
                } else {
                    Ok(n)
                }
            }
        }));
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = tokio_test::block_on(with_retry(&fast_config(2), "commit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::PersistenceFailure("down".into())) }
        }));
        assert!(matches!(result, Err(LedgerError::PersistenceFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = tokio_test::block_on(with_retry(&fast_config(5), "commit", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::InvalidEvent("negative quantity".into())) }
        }));
        assert!(matches!(result, Err(LedgerError::InvalidEvent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> =
            tokio_test::block_on(with_retry(&RetryConfig::disabled(), "commit", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LedgerError::PersistenceFailure("down".into())) }
            }));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
