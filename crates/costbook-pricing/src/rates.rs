//! Rate tables for usage pricing
//!
//! A [`PricingTable`] holds, per usage category, a base rate, optional
//! per-model overrides and the model that events without a model are
//! attributed to. Tables are plain JSON so operators can ship their own:
//!
//! ```json
//! {
//!   "chat_tokens": {
//!     "default_model": "gpt-3.5-turbo-0125",
//!     "base": { "micros": 2000, "per": 1000 },
//!     "models": { "gpt-4": { "micros": 30000, "per": 1000 } }
//!   }
//! }
//! ```

use costbook_core::error::{LedgerError, Result};
use costbook_core::types::{ModelName, UsageCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Price of `per` reported units, in micro-dollars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// Micro-dollars charged per batch
    pub micros: i64,
    /// Batch size in reported units (tokens, seconds, images, characters)
    pub per: u64,
}

impl Rate {
    /// Rate of `micros` per `per` reported units
    pub const fn new(micros: i64, per: u64) -> Self {
        Self { micros, per }
    }
}

/// Rates of one usage category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRates {
    /// Model assumed when an event carries none
    pub default_model: ModelName,
    /// Rate for models without an override
    pub base: Rate,
    /// Per-model overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<ModelName, Rate>,
}

impl CategoryRates {
    /// Rates with only a base rate
    pub fn new(default_model: impl Into<String>, base: Rate) -> Self {
        Self {
            default_model: ModelName::new(default_model),
            base,
            models: BTreeMap::new(),
        }
    }

    /// Add a per-model override
    pub fn with_model(mut self, model: impl Into<String>, rate: Rate) -> Self {
        self.models.insert(ModelName::new(model), rate);
        self
    }

    /// Rate for a model, falling back to the base rate
    pub fn rate_for(&self, model: &ModelName) -> Rate {
        match self.models.get(model) {
            Some(rate) => *rate,
            None => {
                if !self.models.is_empty() {
                    debug!("No rate override for model {}, using base rate", model);
                }
                self.base
            }
        }
    }
}

/// Per-category rate table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    categories: BTreeMap<UsageCategory, CategoryRates>,
}

impl PricingTable {
    /// Empty table
    pub fn new() -> Self {
        Self {
            categories: BTreeMap::new(),
        }
    }

    /// Set the rates of a category
    pub fn with_category(mut self, category: UsageCategory, rates: CategoryRates) -> Self {
        self.categories.insert(category, rates);
        self
    }

    /// Built-in list prices
    ///
    /// Chat $0.002/1K tokens, transcription $0.006/minute, images by size
    /// ($0.016 / $0.018 / $0.020), speech $0.015/1K characters (`tts-1`) and
    /// $0.030/1K (`tts-1-hd`), vision $0.01/1K tokens.
    pub fn builtin() -> Self {
        Self::new()
            .with_category(
                UsageCategory::ChatTokens,
                CategoryRates::new("gpt-3.5-turbo-0125", Rate::new(2_000, 1_000))
                    .with_model("gpt-4", Rate::new(30_000, 1_000))
                    .with_model("gpt-4-turbo-preview", Rate::new(10_000, 1_000)),
            )
            .with_category(
                UsageCategory::TranscriptionSeconds,
                CategoryRates::new("whisper-1", Rate::new(6_000, 60)),
            )
            .with_category(
                UsageCategory::NumberImages,
                CategoryRates::new("1024x1024", Rate::new(20_000, 1))
                    .with_model("256x256", Rate::new(16_000, 1))
                    .with_model("512x512", Rate::new(18_000, 1))
                    .with_model("1024x1024", Rate::new(20_000, 1)),
            )
            .with_category(
                UsageCategory::TtsCharacters,
                CategoryRates::new("tts-1", Rate::new(15_000, 1_000))
                    .with_model("tts-1-hd", Rate::new(30_000, 1_000)),
            )
            .with_category(
                UsageCategory::VisionTokens,
                CategoryRates::new("gpt-4-vision-preview", Rate::new(10_000, 1_000)),
            )
    }

    /// Parse a table from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&contents)?;
        info!(
            "Loaded pricing for {} categories from {}",
            table.categories.len(),
            path.display()
        );
        Ok(table)
    }

    /// Serialize as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rates of a category
    pub fn category(&self, category: UsageCategory) -> Option<&CategoryRates> {
        self.categories.get(&category)
    }

    /// Reject batch sizes of zero and negative prices
    fn validate(&self) -> Result<()> {
        for (category, rates) in &self.categories {
            let all_rates = std::iter::once((&rates.default_model, &rates.base))
                .chain(rates.models.iter());
            for (model, rate) in all_rates {
                if rate.per == 0 {
                    return Err(LedgerError::Config(format!(
                        "{category}/{model}: batch size must be positive"
                    )));
                }
                if rate.micros < 0 {
                    return Err(LedgerError::Config(format!(
                        "{category}/{model}: price must not be negative"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}
