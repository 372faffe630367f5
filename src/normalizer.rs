//! Usage event normalization
//!
//! Turns a raw [`UsageEvent`] into a priced [`CanonicalRecord`]: the
//! category is parsed, the quantity converted to integer base units, the
//! model defaulted from the pricing table and the calendar date computed in
//! the configured timezone. Normalization has no side effects.

use costbook_core::error::{LedgerError, Result};
use costbook_core::timezone::TimezoneConfig;
use costbook_core::types::{CanonicalRecord, EventId, UsageCategory, UsageEvent, User};
use costbook_pricing::Pricing;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Converts raw events into canonical records
pub struct Normalizer {
    pricing: Arc<dyn Pricing>,
    timezone: TimezoneConfig,
}

impl Normalizer {
    /// Create a normalizer over a pricing source and a timezone
    pub fn new(pricing: Arc<dyn Pricing>, timezone: TimezoneConfig) -> Self {
        Self { pricing, timezone }
    }

    /// Timezone used for calendar dates
    pub fn timezone(&self) -> &TimezoneConfig {
        &self.timezone
    }

    /// Normalize an event for a resolved user
    ///
    /// Events without an id get a fresh one, so they are never deduplicated.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` when the user does not resolve, the category is
    /// unknown, or the quantity is negative, non-finite or fractional for a
    /// count category. Pricing errors are passed through.
    pub fn normalize(&self, event: &UsageEvent, user: Option<&User>) -> Result<CanonicalRecord> {
        let user = user.ok_or_else(|| {
            LedgerError::InvalidEvent(format!("user {} does not resolve", event.user_id))
        })?;
        if user.user_id != event.user_id {
            return Err(LedgerError::InvalidEvent(format!(
                "event for user {} resolved to user {}",
                event.user_id, user.user_id
            )));
        }

        let category = UsageCategory::from_str(&event.category).map_err(LedgerError::InvalidEvent)?;
        let quantity = to_base_units(category, event.quantity)?;

        let model = match &event.model {
            Some(model) => model.clone(),
            None => self.pricing.default_model(category)?,
        };
        let cost = self.pricing.price(category, &model, quantity)?;
        let event_id = event.event_id.clone().unwrap_or_else(EventId::generate);
        let date = self.timezone.date_of(&event.timestamp);

        debug!(
            event_id = %event_id,
            user_id = %user.user_id,
            category = %category,
            model = %model,
            quantity,
            cost = %cost,
            date = %date,
            "Normalized usage event"
        );

        Ok(CanonicalRecord {
            event_id,
            user_id: user.user_id,
            category,
            model,
            quantity,
            cost,
            timestamp: event.timestamp,
            date,
        })
    }
}

/// Convert a reported quantity into integer base units
fn to_base_units(category: UsageCategory, quantity: f64) -> Result<u64> {
    if !quantity.is_finite() {
        return Err(LedgerError::InvalidEvent(format!(
            "{category} quantity is not finite"
        )));
    }
    if quantity < 0.0 {
        return Err(LedgerError::InvalidEvent(format!(
            "{category} quantity {quantity} is negative"
        )));
    }
    if category.is_count() && quantity.fract() != 0.0 {
        return Err(LedgerError::InvalidEvent(format!(
            "{category} quantity {quantity} must be a whole number of {}",
            category.unit_label()
        )));
    }

    let base = (quantity * category.base_units_per_unit() as f64).round();
    if base >= u64::MAX as f64 {
        return Err(LedgerError::InvalidEvent(format!(
            "{category} quantity {quantity} is out of range"
        )));
    }
    Ok(base as u64)
}
