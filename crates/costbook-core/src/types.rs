//! Core domain types for costbook
//!
//! This module contains the fundamental types used throughout the ledger.
//! These types provide strong typing for identifiers, fixed-point money,
//! usage categories, calendar days and the persisted ledger rows.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

/// Number of micro-dollars in one dollar
pub const MICROS_PER_DOLLAR: i64 = 1_000_000;

/// Strongly-typed user identifier
///
/// User ids are 64-bit and immutable once the user is created.
///
/// # Examples
/// ```
/// use costbook_core::types::UserId;
///
/// let user: UserId = "1234567890123".parse().unwrap();
/// assert_eq!(user.get(), 1_234_567_890_123);
/// assert_eq!(user.to_string(), "1234567890123");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a new UserId
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw identifier
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Strongly-typed model name wrapper
///
/// Model names key the per-model breakdowns in usage history. For image
/// usage the "model" is the requested image size (e.g. `1024x1024`).
///
/// # Examples
/// ```
/// use costbook_core::types::ModelName;
///
/// let model = ModelName::new("tts-1-hd");
/// assert_eq!(model.as_str(), "tts-1-hd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    /// Create a new ModelName from any string-like type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Idempotency key of a usage event
///
/// Applying two events with the same id has the effect of applying one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create a new EventId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Generate a fresh payment id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Fixed-point monetary amount in micro-dollars
///
/// Costs are accumulated millions of times, so they are kept as integers
/// and never as floating point.
///
/// # Examples
/// ```
/// use costbook_core::types::Money;
///
/// let cost: Money = "0.015".parse().unwrap();
/// assert_eq!(cost.micros(), 15_000);
/// assert_eq!(cost.to_string(), "$0.015000");
///
/// let total = cost + Money::from_micros(5_000);
/// assert_eq!(total.format_with_precision(2), "$0.02");
/// ```
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero dollars
    pub const ZERO: Money = Money(0);

    /// Create from an amount of micro-dollars
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Amount in micro-dollars
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// Convert from floating-point dollars, rounding to the nearest micro-dollar
    ///
    /// Returns `None` for NaN, infinities and amounts outside the `i64` range.
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        let micros = (dollars * MICROS_PER_DOLLAR as f64).round();
        if micros.is_finite() && micros.abs() < i64::MAX as f64 {
            Some(Self(micros as i64))
        } else {
            None
        }
    }

    /// Lossy conversion to floating-point dollars, for display and JSON output only
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR as f64
    }

    /// Sum that fails instead of wrapping
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Whether the amount is exactly zero
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether the amount is below zero
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Format with a dollar sign and `places` decimals, rounding half away from zero
    pub fn format_with_precision(self, places: u32) -> String {
        let places = places.min(6);
        let divisor = 10u64.pow(6 - places);
        let abs = self.0.unsigned_abs();
        let rounded = (abs + divisor / 2) / divisor;
        let sign = if self.0 < 0 && rounded != 0 { "-" } else { "" };
        if places == 0 {
            return format!("{sign}${rounded}");
        }
        let scale = 10u64.pow(places);
        format!(
            "{sign}${}.{:0width$}",
            rounded / scale,
            rounded % scale,
            width = places as usize
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_with_precision(6))
    }
}

impl FromStr for Money {
    type Err = String;

    /// Parse a decimal dollar amount (`12`, `12.5`, `$0.000125`, `-3.10`) exactly
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let body = body.strip_prefix('$').unwrap_or(body);
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));

        let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(format!("Invalid amount: {s}"));
        }
        if frac.len() > 6 {
            return Err(format!("Amount has more than 6 decimal places: {s}"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("Amount out of range: {s}"))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}")
                .parse()
                .map_err(|_| format!("Invalid amount: {s}"))?
        };

        let micros = whole
            .checked_mul(MICROS_PER_DOLLAR)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| format!("Amount out of range: {s}"))?;

        Ok(Self(if negative { -micros } else { micros }))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// Metered usage category
///
/// # Examples
/// ```
/// use costbook_core::types::UsageCategory;
/// use std::str::FromStr;
///
/// let category = UsageCategory::from_str("tts_characters").unwrap();
/// assert_eq!(category, UsageCategory::TtsCharacters);
/// assert_eq!(UsageCategory::ChatTokens.to_string(), "chat_tokens");
/// assert!(UsageCategory::from_str("gpu_hours").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    /// Chat completion tokens
    ChatTokens,
    /// Seconds of transcribed audio
    TranscriptionSeconds,
    /// Number of generated images
    NumberImages,
    /// Characters converted to speech
    TtsCharacters,
    /// Tokens spent on image understanding
    VisionTokens,
}

impl UsageCategory {
    /// Every category, in display order
    pub const ALL: [UsageCategory; 5] = [
        Self::ChatTokens,
        Self::TranscriptionSeconds,
        Self::NumberImages,
        Self::TtsCharacters,
        Self::VisionTokens,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatTokens => "chat_tokens",
            Self::TranscriptionSeconds => "transcription_seconds",
            Self::NumberImages => "number_images",
            Self::TtsCharacters => "tts_characters",
            Self::VisionTokens => "vision_tokens",
        }
    }

    /// How many stored base units make up one reported unit
    ///
    /// Transcription is reported in (fractional) seconds and stored in
    /// milliseconds; every other category is an integer count.
    pub fn base_units_per_unit(&self) -> u64 {
        match self {
            Self::TranscriptionSeconds => 1000,
            _ => 1,
        }
    }

    /// Whether reported quantities must be whole numbers
    pub fn is_count(&self) -> bool {
        self.base_units_per_unit() == 1
    }

    /// Human-readable unit of the reported quantity
    pub fn unit_label(&self) -> &'static str {
        match self {
            Self::ChatTokens | Self::VisionTokens => "tokens",
            Self::TranscriptionSeconds => "seconds",
            Self::NumberImages => "images",
            Self::TtsCharacters => "characters",
        }
    }

    /// Format a stored base-unit quantity in reported units
    pub fn format_quantity(&self, base_units: u64) -> String {
        let per_unit = self.base_units_per_unit();
        if per_unit == 1 {
            base_units.to_string()
        } else {
            format!("{}.{:03}", base_units / per_unit, base_units % per_unit)
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UsageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| format!("Unrecognized usage category: {s}"))
    }
}

/// Date wrapper for daily aggregation
///
/// # Examples
/// ```
/// use costbook_core::types::DailyDate;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let daily = DailyDate::new(date);
/// assert_eq!(daily.format("%Y-%m-%d"), "2024-01-15");
/// assert_eq!(daily.month_key(), "2024-01");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyDate(NaiveDate);

impl DailyDate {
    /// Create a new DailyDate
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Get the inner NaiveDate
    pub fn inner(&self) -> &NaiveDate {
        &self.0
    }

    /// Calendar day of a timestamp in the given timezone
    pub fn from_timestamp_with_tz(ts: &DateTime<Utc>, tz: &Tz) -> Self {
        Self(ts.with_timezone(tz).date_naive())
    }

    /// Format with a chrono format string
    pub fn format(&self, fmt: &str) -> String {
        self.0.format(fmt).to_string()
    }

    /// Year and month as `YYYY-MM`
    pub fn month_key(&self) -> String {
        self.format("%Y-%m")
    }

    /// Whether both dates fall in the same calendar month of the same year
    pub fn same_month(&self, other: &DailyDate) -> bool {
        self.0.year() == other.0.year() && self.0.month() == other.0.month()
    }

    /// First day of this date's month
    pub fn month_start(&self) -> Self {
        Self(self.0.with_day(1).unwrap_or(self.0))
    }
}

impl fmt::Display for DailyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DailyDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map(Self)
    }
}

/// Inclusive range of calendar days; open ends match everything
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive)
    pub since: Option<DailyDate>,
    /// End date (inclusive)
    pub until: Option<DailyDate>,
}

impl DateRange {
    /// Range with no restrictions
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the start date
    pub fn with_since(mut self, date: DailyDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Set the end date
    pub fn with_until(mut self, date: DailyDate) -> Self {
        self.until = Some(date);
        self
    }

    /// Check whether a date falls in the range
    pub fn contains(&self, date: &DailyDate) -> bool {
        self.since.is_none_or(|since| *date >= since)
            && self.until.is_none_or(|until| *date <= until)
    }
}

/// Raw metered usage event as reported by a collaborator
///
/// The category is kept as a string so unrecognized categories can be
/// rejected by the normalizer instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Idempotency key; events without one are never deduplicated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// User being charged
    pub user_id: UserId,
    /// Display name used when the user is auto-provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Usage category wire name
    pub category: String,
    /// Reported quantity (tokens, seconds, images, characters)
    pub quantity: f64,
    /// Model or size variant; defaults to the category's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelName>,
    /// When the usage happened
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// Create an event without id, model or user name
    pub fn new(
        user_id: UserId,
        category: impl Into<String>,
        quantity: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: None,
            user_id,
            user_name: None,
            category: category.into(),
            quantity,
            model: None,
            timestamp,
        }
    }

    /// Set the idempotency key
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(EventId::new(event_id));
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(ModelName::new(model));
        self
    }

    /// Set the user name used for auto-provisioning
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// Normalized, priced representation of a usage event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Idempotency key
    pub event_id: EventId,
    /// User being charged
    pub user_id: UserId,
    /// Usage category
    pub category: UsageCategory,
    /// Model or size variant
    pub model: ModelName,
    /// Quantity in the category's base units
    pub quantity: u64,
    /// Priced cost
    pub cost: Money,
    /// When the usage happened
    pub timestamp: DateTime<Utc>,
    /// Calendar day of the timestamp in the ledger timezone
    pub date: DailyDate,
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Immutable identifier
    pub user_id: UserId,
    /// Unique display name
    pub user_name: String,
    /// When the user was registered
    pub created_at: DateTime<Utc>,
}

/// Running cost aggregates of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCosts {
    /// Owning user
    pub user_id: UserId,
    /// Cost accumulated on `last_update`
    pub day: Money,
    /// Cost accumulated in `last_update`'s month
    pub month: Money,
    /// Cost accumulated since the user was created; never reset
    pub all_time: Money,
    /// Most recent calendar day observed for this user
    pub last_update: DailyDate,
}

impl CurrentCosts {
    /// Zeroed aggregates anchored at `date`
    pub fn zeroed(user_id: UserId, date: DailyDate) -> Self {
        Self {
            user_id,
            day: Money::ZERO,
            month: Money::ZERO,
            all_time: Money::ZERO,
            last_update: date,
        }
    }
}

/// Accumulated usage of one model within a category
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Quantity in base units
    pub quantity: u64,
    /// Accumulated cost
    pub cost: Money,
    /// Number of merged events
    pub events: u64,
}

impl ModelUsage {
    /// Sum that fails if any counter would overflow
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            quantity: self.quantity.checked_add(other.quantity)?,
            cost: self.cost.checked_add(other.cost)?,
            events: self.events.checked_add(other.events)?,
        })
    }
}

// Display totals across models saturate; per-model buckets use checked_add.
impl Add for ModelUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            quantity: self.quantity.saturating_add(other.quantity),
            cost: Money(self.cost.0.saturating_add(other.cost.0)),
            events: self.events.saturating_add(other.events),
        }
    }
}

impl AddAssign for ModelUsage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Per-model breakdown of one usage category
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryUsage {
    /// Sub-totals keyed by model
    pub models: BTreeMap<ModelName, ModelUsage>,
}

impl CategoryUsage {
    /// Accumulate usage for a model
    pub fn add(&mut self, model: &ModelName, usage: ModelUsage) {
        *self.models.entry(model.clone()).or_default() += usage;
    }

    /// Merge another breakdown into this one
    pub fn merge(&mut self, other: &CategoryUsage) {
        for (model, usage) in &other.models {
            self.add(model, *usage);
        }
    }

    /// Sum over all models
    pub fn total(&self) -> ModelUsage {
        self.models
            .values()
            .fold(ModelUsage::default(), |acc, usage| acc + *usage)
    }
}

/// Usage bucket of one user on one calendar day
///
/// Entries are merge-only: per category and model, quantities, costs and
/// event counts accumulate, so merges commute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageHistoryEntry {
    /// Owning user
    pub user_id: UserId,
    /// Calendar day of the bucket
    pub date: DailyDate,
    /// Breakdown per usage category
    #[serde(default)]
    pub categories: BTreeMap<UsageCategory, CategoryUsage>,
}

impl UsageHistoryEntry {
    /// Empty bucket
    pub fn new(user_id: UserId, date: DailyDate) -> Self {
        Self {
            user_id,
            date,
            categories: BTreeMap::new(),
        }
    }

    /// Accumulate one canonical record
    ///
    /// Fails with `InvalidEvent`, leaving the bucket unchanged, when the
    /// model's counters would overflow.
    pub fn add_record(&mut self, record: &CanonicalRecord) -> Result<(), LedgerError> {
        let usage = ModelUsage {
            quantity: record.quantity,
            cost: record.cost,
            events: 1,
        };
        let current = self
            .categories
            .get(&record.category)
            .and_then(|category| category.models.get(&record.model))
            .copied()
            .unwrap_or_default();
        let updated = current.checked_add(usage).ok_or_else(|| {
            LedgerError::InvalidEvent(format!(
                "{} usage on {} overflows the history of {}",
                record.category, record.model, record.date
            ))
        })?;
        self.categories
            .entry(record.category)
            .or_default()
            .models
            .insert(record.model.clone(), updated);
        Ok(())
    }

    /// Merge another bucket for the same day into this one
    pub fn merge(&mut self, other: &UsageHistoryEntry) {
        for (category, usage) in &other.categories {
            self.categories.entry(*category).or_default().merge(usage);
        }
    }

    /// Total for one category across models
    pub fn category_total(&self, category: UsageCategory) -> ModelUsage {
        self.categories
            .get(&category)
            .map(CategoryUsage::total)
            .unwrap_or_default()
    }

    /// Total cost across categories
    pub fn total_cost(&self) -> Money {
        self.categories.values().map(|usage| usage.total().cost).sum()
    }
}

/// Lifecycle state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Initiated, awaiting the gateway
    Pending,
    /// Settled
    Completed,
    /// Rejected by the gateway
    Failed,
    /// Settled, then returned
    Refunded,
}

impl PaymentStatus {
    /// Whether a payment may advance from `self` to `next`
    ///
    /// Statuses only move forward: pending settles or fails, and a
    /// completed payment can only be refunded.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Completed, Self::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Invalid payment status: {s}")),
        }
    }
}

/// A payment made by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier
    pub payment_id: PaymentId,
    /// Paying user
    pub user_id: UserId,
    /// Paid amount
    pub amount: Money,
    /// Payment method reported by the gateway (card, paypal, ...)
    pub method: String,
    /// Current status
    pub status: PaymentStatus,
    /// When the payment was initiated
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped on every status change
    pub version: u64,
}

/// Per-user model selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Owning user
    pub user_id: UserId,
    /// Selected chat model
    pub model_name: ModelName,
    /// Selected behavior profile
    pub brain: String,
    /// When the settings last changed
    pub last_update: DateTime<Utc>,
}

impl UserSettings {
    /// Model assigned when a user first picks a brain
    pub const DEFAULT_MODEL: &'static str = "gpt-3.5-turbo-0125";
    /// Brain assigned when a user first picks a model
    pub const DEFAULT_BRAIN: &'static str = "assistant";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DailyDate {
        DailyDate::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_money_parsing() {
        assert_eq!("12".parse::<Money>().unwrap().micros(), 12_000_000);
        assert_eq!("$0.5".parse::<Money>().unwrap().micros(), 500_000);
        assert_eq!("0.000001".parse::<Money>().unwrap().micros(), 1);
        assert_eq!(".25".parse::<Money>().unwrap().micros(), 250_000);
        assert_eq!("-3.10".parse::<Money>().unwrap().micros(), -3_100_000);
        assert!("0.0000001".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(Money::from_micros(15_000).to_string(), "$0.015000");
        assert_eq!(Money::from_micros(-1_500_000).to_string(), "-$1.500000");
        assert_eq!(Money::from_micros(12_345_678).format_with_precision(2), "$12.35");
        assert_eq!(Money::from_micros(4_999).format_with_precision(2), "$0.00");
        assert_eq!(Money::from_micros(5_000).format_with_precision(2), "$0.01");
        assert_eq!(Money::from_micros(-1).format_with_precision(2), "$0.00");
        assert_eq!(Money::from_micros(2_500_000).format_with_precision(0), "$3");
    }

    #[test]
    fn test_money_arithmetic() {
        let total: Money = [10, 20, 30].into_iter().map(Money::from_micros).sum();
        assert_eq!(total, Money::from_micros(60));
        assert_eq!(total - Money::from_micros(60), Money::ZERO);
        assert_eq!(Money::from_dollars(0.01), Some(Money::from_micros(10_000)));
        assert_eq!(Money::from_dollars(f64::NAN), None);
    }

    #[test]
    fn test_category_parsing() {
        for category in UsageCategory::ALL {
            assert_eq!(category.as_str().parse::<UsageCategory>(), Ok(category));
        }
        assert_eq!(
            "Chat-Tokens".parse::<UsageCategory>(),
            Ok(UsageCategory::ChatTokens)
        );
        assert!("images".parse::<UsageCategory>().is_err());
    }

    #[test]
    fn test_category_quantity_format() {
        assert_eq!(UsageCategory::ChatTokens.format_quantity(1500), "1500");
        assert_eq!(
            UsageCategory::TranscriptionSeconds.format_quantity(61_250),
            "61.250"
        );
    }

    #[test]
    fn test_daily_date_months() {
        let jan_31 = date(2024, 1, 31);
        assert!(jan_31.same_month(&date(2024, 1, 1)));
        assert!(!jan_31.same_month(&date(2024, 2, 1)));
        assert!(!jan_31.same_month(&date(2023, 1, 31)));
        assert_eq!(jan_31.month_start(), date(2024, 1, 1));
        assert_eq!("2024-01-31".parse::<DailyDate>().unwrap(), jan_31);
    }

    #[test]
    fn test_daily_date_timezone() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(
            DailyDate::from_timestamp_with_tz(&ts, &Tz::UTC),
            date(2024, 1, 15)
        );
        assert_eq!(
            DailyDate::from_timestamp_with_tz(&ts, &chrono_tz::Asia::Tokyo),
            date(2024, 1, 16)
        );
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::all()
            .with_since(date(2024, 1, 10))
            .with_until(date(2024, 1, 20));
        assert!(range.contains(&date(2024, 1, 10)));
        assert!(range.contains(&date(2024, 1, 20)));
        assert!(!range.contains(&date(2024, 1, 9)));
        assert!(!range.contains(&date(2024, 1, 21)));
        assert!(DateRange::all().contains(&date(1999, 12, 31)));
    }

    #[test]
    fn test_history_entry_merge_commutes() {
        let user = UserId::new(7);
        let day = date(2024, 3, 1);
        let record = |category, model: &str, quantity, micros| CanonicalRecord {
            event_id: EventId::generate(),
            user_id: user,
            category,
            model: ModelName::new(model),
            quantity,
            cost: Money::from_micros(micros),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            date: day,
        };
        let a = record(UsageCategory::ChatTokens, "gpt-4", 100, 3_000);
        let b = record(UsageCategory::ChatTokens, "gpt-3.5", 50, 100);
        let c = record(UsageCategory::NumberImages, "1024x1024", 1, 20_000);

        let mut forward = UsageHistoryEntry::new(user, day);
        for r in [&a, &b, &c] {
            forward.add_record(r).unwrap();
        }
        let mut backward = UsageHistoryEntry::new(user, day);
        for r in [&c, &b, &a] {
            backward.add_record(r).unwrap();
        }

        assert_eq!(forward, backward);
        assert_eq!(forward.total_cost(), Money::from_micros(23_100));
        let chat = forward.category_total(UsageCategory::ChatTokens);
        assert_eq!(chat.quantity, 150);
        assert_eq!(chat.events, 2);
    }

    #[test]
    fn test_history_overflow_leaves_bucket_unchanged() {
        let user = UserId::new(1);
        let day = date(2024, 3, 1);
        let record = |micros| CanonicalRecord {
            event_id: EventId::generate(),
            user_id: user,
            category: UsageCategory::VisionTokens,
            model: ModelName::new("gpt-4-vision-preview"),
            quantity: 1,
            cost: Money::from_micros(micros),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            date: day,
        };

        let mut entry = UsageHistoryEntry::new(user, day);
        entry.add_record(&record(i64::MAX - 10)).unwrap();
        let before = entry.clone();
        let err = entry.add_record(&record(11)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEvent(_)));
        assert_eq!(entry, before);
        assert_eq!(Money::from_micros(i64::MAX).checked_add(Money::from_micros(1)), None);
    }

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Completed));
        assert_eq!("REFUNDED".parse::<PaymentStatus>(), Ok(Refunded));
    }

    #[test]
    fn test_usage_event_json() {
        let json = r#"{"event_id":"evt-1","user_id":9007199254740993,"category":"chat_tokens","quantity":100,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let event: UsageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.user_id.get(), 9_007_199_254_740_993);
        assert_eq!(event.event_id, Some(EventId::new("evt-1")));
        assert!(event.model.is_none());
    }
}
