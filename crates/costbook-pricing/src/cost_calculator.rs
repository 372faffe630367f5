//! Cost calculator module for pricing usage quantities
//!
//! The ledger consumes pricing through the [`Pricing`] trait so deployments
//! can plug in their own price source. [`CostCalculator`] is the default
//! implementation backed by a [`PricingTable`].
//!
//! # Examples
//!
//! ```
//! use costbook_pricing::{CostCalculator, Pricing, PricingTable};
//! use costbook_core::types::{ModelName, Money, UsageCategory};
//! use std::sync::Arc;
//!
//! let calculator = CostCalculator::new(Arc::new(PricingTable::builtin()));
//!
//! // 1,500 chat tokens at $0.002 per 1K tokens
//! let cost = calculator
//!     .price(UsageCategory::ChatTokens, &ModelName::new("gpt-3.5-turbo-0125"), 1_500)
//!     .unwrap();
//! assert_eq!(cost, Money::from_micros(3_000));
//! ```

use crate::rates::{PricingTable, Rate};
use costbook_core::error::{LedgerError, Result};
use costbook_core::types::{ModelName, Money, UsageCategory};
use std::sync::Arc;
use tracing::debug;

/// Pricing collaborator consumed by the ledger
///
/// Implementations must be pure and non-blocking: the normalizer calls them
/// inline for every event.
pub trait Pricing: Send + Sync {
    /// Cost of `quantity` base units of `category` on `model`
    fn price(&self, category: UsageCategory, model: &ModelName, quantity: u64) -> Result<Money>;

    /// Model that events without a model are attributed to
    fn default_model(&self, category: UsageCategory) -> Result<ModelName>;
}

/// Calculates costs from a rate table
pub struct CostCalculator {
    /// Rate table
    table: Arc<PricingTable>,
}

impl CostCalculator {
    /// Create a new CostCalculator over a rate table
    pub fn new(table: Arc<PricingTable>) -> Self {
        Self { table }
    }

    /// The underlying rate table
    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    /// Calculate the cost of a quantity
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the category has no rates at all and
    /// `InvalidEvent` if the cost does not fit in a [`Money`]
    pub fn calculate_cost(
        &self,
        category: UsageCategory,
        model: &ModelName,
        quantity: u64,
    ) -> Result<Money> {
        let rates = self
            .table
            .category(category)
            .ok_or_else(|| LedgerError::UnknownModel(model.clone()))?;

        let cost = Self::calculate_from_rate(&rates.rate_for(model), category, quantity)?;
        debug!(
            "Calculated cost: {} for {} {} on {}",
            cost,
            category.format_quantity(quantity),
            category.unit_label(),
            model
        );
        Ok(cost)
    }

    /// Pure cost calculation, rounding half up to the micro-dollar
    ///
    /// `quantity` is in the category's base units; the rate is per reported
    /// unit batch. Fails with `InvalidEvent` when the cost exceeds the
    /// range of [`Money`].
    pub fn calculate_from_rate(
        rate: &Rate,
        category: UsageCategory,
        quantity: u64,
    ) -> Result<Money> {
        let denominator = i128::from(rate.per) * i128::from(category.base_units_per_unit());
        if denominator == 0 {
            return Ok(Money::ZERO);
        }
        let numerator = i128::from(quantity) * i128::from(rate.micros);
        let micros = (numerator + denominator / 2) / denominator;
        i64::try_from(micros).map(Money::from_micros).map_err(|_| {
            LedgerError::InvalidEvent(format!(
                "cost of {} {} is out of range",
                category.format_quantity(quantity),
                category.unit_label()
            ))
        })
    }
}

impl Pricing for CostCalculator {
    fn price(&self, category: UsageCategory, model: &ModelName, quantity: u64) -> Result<Money> {
        self.calculate_cost(category, model, quantity)
    }

    fn default_model(&self, category: UsageCategory) -> Result<ModelName> {
        self.table
            .category(category)
            .map(|rates| rates.default_model.clone())
            .ok_or_else(|| {
                LedgerError::Config(format!("No pricing configured for category {category}"))
            })
    }
}
