//! Payment records
//!
//! Payments are never deleted. Status changes follow
//! `pending -> completed | failed` and `completed -> refunded`, and are
//! written with a compare-and-swap on the payment's version so concurrent
//! updates cannot overwrite each other.

use costbook_core::clock::{Clock, SystemClock};
use costbook_core::error::{LedgerError, Result};
use costbook_core::retry::{RetryConfig, with_retry};
use costbook_core::store::LedgerStore;
use costbook_core::types::{Money, Payment, PaymentId, PaymentStatus, UserId};
use std::sync::Arc;
use tracing::{debug, info};

/// Records payments and advances their status
pub struct PaymentBook {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl PaymentBook {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retry,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record a pending payment
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for non-positive amounts or an empty method,
    /// `UnknownUser` when the user is not registered.
    pub async fn record_payment(
        &self,
        user_id: UserId,
        amount: Money,
        method: &str,
    ) -> Result<PaymentId> {
        if amount <= Money::ZERO {
            return Err(LedgerError::InvalidArgument(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        let method = method.trim();
        if method.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "payment method must not be empty".to_string(),
            ));
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(LedgerError::UnknownUser(user_id));
        }

        let now = self.clock.now();
        let payment = Payment {
            payment_id: PaymentId::generate(),
            user_id,
            amount,
            method: method.to_string(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let payment_id = payment.payment_id;
        with_retry(&self.retry, "insert_payment", || {
            self.store.insert_payment(payment.clone())
        })
        .await?;
        info!(
            payment_id = %payment_id,
            user_id = %user_id,
            amount = %amount,
            method = method,
            "Recorded payment"
        );
        Ok(payment_id)
    }

    /// Move a payment to `new_status`
    ///
    /// Setting the status a payment already has is a no-op. Lost
    /// compare-and-swap races are retried against the fresh row.
    pub async fn update_payment_status(
        &self,
        payment_id: PaymentId,
        new_status: PaymentStatus,
    ) -> Result<Payment> {
        with_retry(&self.retry, "update_payment_status", || {
            self.try_update_status(payment_id, new_status)
        })
        .await
    }

    async fn try_update_status(
        &self,
        payment_id: PaymentId,
        new_status: PaymentStatus,
    ) -> Result<Payment> {
        let current = self.get_payment(payment_id).await?;
        if current.status == new_status {
            debug!(payment_id = %payment_id, status = %new_status, "Payment already in status");
            return Ok(current);
        }
        if !current.status.can_transition_to(new_status) {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let expected_version = current.version;
        let updated = Payment {
            status: new_status,
            updated_at: self.clock.now(),
            version: expected_version + 1,
            ..current
        };
        self.store
            .compare_and_swap_payment(updated.clone(), expected_version)
            .await?;
        info!(
            payment_id = %payment_id,
            status = %new_status,
            version = updated.version,
            "Updated payment status"
        );
        Ok(updated)
    }

    /// Look up a payment
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or(LedgerError::PaymentNotFound(payment_id))
    }

    /// Payments of a user, oldest first
    pub async fn list_payments(&self, user_id: UserId) -> Result<Vec<Payment>> {
        self.store.list_payments(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use costbook_core::types::User;
    use costbook_store::MemoryStore;

    async fn setup() -> PaymentBook {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(User {
                user_id: UserId::new(1),
                user_name: "alice".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        PaymentBook::new(store, RetryConfig::disabled())
    }

    #[tokio::test]
    async fn test_record_and_complete() {
        let book = setup().await;
        let id = book
            .record_payment(UserId::new(1), Money::from_micros(5_000_000), "card")
            .await
            .unwrap();
        let pending = book.get_payment(id).await.unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
        assert_eq!(pending.version, 0);

        let completed = book
            .update_payment_status(id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.version, 1);

        let refunded = book
            .update_payment_status(id, PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.version, 2);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let book = setup().await;
        let id = book
            .record_payment(UserId::new(1), Money::from_micros(1), "card")
            .await
            .unwrap();
        assert!(matches!(
            book.update_payment_status(id, PaymentStatus::Refunded).await,
            Err(LedgerError::InvalidTransition { .. })
        ));
        book.update_payment_status(id, PaymentStatus::Failed)
            .await
            .unwrap();
        assert!(matches!(
            book.update_payment_status(id, PaymentStatus::Completed).await,
            Err(LedgerError::InvalidTransition {
                from: PaymentStatus::Failed,
                to: PaymentStatus::Completed
            })
        ));
    }

    #[tokio::test]
    async fn test_same_status_is_noop() {
        let book = setup().await;
        let id = book
            .record_payment(UserId::new(1), Money::from_micros(1), "card")
            .await
            .unwrap();
        let unchanged = book
            .update_payment_status(id, PaymentStatus::Pending)
            .await
            .unwrap();
        assert_eq!(unchanged.version, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let book = setup().await;
        assert!(matches!(
            book.record_payment(UserId::new(1), Money::ZERO, "card").await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            book.record_payment(UserId::new(1), Money::from_micros(1), " ").await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            book.record_payment(UserId::new(9), Money::from_micros(1), "card").await,
            Err(LedgerError::UnknownUser(_))
        ));
        assert!(matches!(
            book.get_payment(PaymentId::generate()).await,
            Err(LedgerError::PaymentNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_settle_on_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(User {
                user_id: UserId::new(1),
                user_name: "alice".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let book = Arc::new(PaymentBook::new(
            store,
            RetryConfig {
                enabled: true,
                max_retries: 5,
                initial_delay_ms: 1,
                max_delay_ms: 4,
            },
        ));
        let id = book
            .record_payment(UserId::new(1), Money::from_micros(100), "card")
            .await
            .unwrap();

        let tasks: Vec<_> = [PaymentStatus::Completed, PaymentStatus::Failed]
            .into_iter()
            .cycle()
            .take(8)
            .map(|status| {
                let book = Arc::clone(&book);
                tokio::spawn(async move { book.update_payment_status(id, status).await })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        let settled = book.get_payment(id).await.unwrap();
        assert_eq!(settled.version, 1);
        assert!(matches!(
            settled.status,
            PaymentStatus::Completed | PaymentStatus::Failed
        ));
        assert!(successes >= 1);
    }
}
