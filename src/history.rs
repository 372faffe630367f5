//! Per-day usage history
//!
//! History buckets are merge-only, so the order in which records arrive
//! never changes the result. Summaries and reconciliation are derived from
//! the buckets alone.

use costbook_core::error::Result;
use costbook_core::types::{
    CanonicalRecord, DailyDate, ModelUsage, Money, UsageCategory, UsageHistoryEntry, UserId,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Merge a record into the bucket for its date
pub fn merge_record(
    existing: Option<UsageHistoryEntry>,
    record: &CanonicalRecord,
) -> Result<UsageHistoryEntry> {
    let mut entry =
        existing.unwrap_or_else(|| UsageHistoryEntry::new(record.user_id, record.date));
    entry.add_record(record)?;
    Ok(entry)
}

/// Sum of every bucket's cost
pub fn total_cost(entries: &[UsageHistoryEntry]) -> Money {
    entries.iter().map(UsageHistoryEntry::total_cost).sum()
}

/// Day and month usage of one category
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodUsage {
    pub day: ModelUsage,
    pub month: ModelUsage,
}

/// Per-category usage for the day and month containing `as_of`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub user_id: UserId,
    pub as_of: DailyDate,
    pub categories: BTreeMap<UsageCategory, PeriodUsage>,
}

impl UsageSummary {
    /// Summarize `entries`, which may span more than the month of `as_of`
    pub fn from_entries(user_id: UserId, as_of: DailyDate, entries: &[UsageHistoryEntry]) -> Self {
        let mut categories: BTreeMap<UsageCategory, PeriodUsage> = UsageCategory::ALL
            .into_iter()
            .map(|category| (category, PeriodUsage::default()))
            .collect();

        for entry in entries
            .iter()
            .filter(|entry| entry.date.same_month(&as_of) && entry.date <= as_of)
        {
            for (category, usage) in &entry.categories {
                let total = usage.total();
                let period = categories.entry(*category).or_default();
                period.month += total;
                if entry.date == as_of {
                    period.day += total;
                }
            }
        }

        Self {
            user_id,
            as_of,
            categories,
        }
    }

    /// Usage of one category
    pub fn category(&self, category: UsageCategory) -> PeriodUsage {
        self.categories.get(&category).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use costbook_core::types::{EventId, ModelName};

    fn date(d: u32) -> DailyDate {
        DailyDate::new(NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
    }

    fn record(day: u32, category: UsageCategory, model: &str, quantity: u64) -> CanonicalRecord {
        CanonicalRecord {
            event_id: EventId::generate(),
            user_id: UserId::new(1),
            category,
            model: ModelName::new(model),
            quantity,
            cost: Money::from_micros(quantity as i64),
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap(),
            date: date(day),
        }
    }

    #[test]
    fn test_merge_accumulates_per_model() {
        let chat = |model: &str, quantity: u64| record(1, UsageCategory::ChatTokens, model, quantity);
        let entry = merge_record(None, &chat("a", 10)).unwrap();
        let entry = merge_record(Some(entry), &chat("a", 5)).unwrap();
        let entry = merge_record(Some(entry), &chat("b", 7)).unwrap();

        let chat = &entry.categories[&UsageCategory::ChatTokens];
        assert_eq!(chat.models[&ModelName::new("a")].quantity, 15);
        assert_eq!(chat.models[&ModelName::new("a")].events, 2);
        assert_eq!(chat.models[&ModelName::new("b")].quantity, 7);
        assert_eq!(entry.total_cost(), Money::from_micros(22));
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let records = [
            record(2, UsageCategory::ChatTokens, "a", 3),
            record(2, UsageCategory::NumberImages, "256x256", 2),
            record(2, UsageCategory::ChatTokens, "b", 11),
        ];
        let forward = records
            .iter()
            .fold(None, |acc, r| Some(merge_record(acc, r).unwrap()));
        let backward = records
            .iter()
            .rev()
            .fold(None, |acc, r| Some(merge_record(acc, r).unwrap()));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_summary_splits_day_and_month() {
        let entries = vec![
            merge_record(None, &record(1, UsageCategory::ChatTokens, "a", 100)).unwrap(),
            merge_record(None, &record(5, UsageCategory::ChatTokens, "a", 50)).unwrap(),
            merge_record(None, &record(9, UsageCategory::ChatTokens, "a", 999)).unwrap(),
        ];
        let summary = UsageSummary::from_entries(UserId::new(1), date(5), &entries);
        let chat = summary.category(UsageCategory::ChatTokens);
        assert_eq!(chat.day.quantity, 50);
        assert_eq!(chat.month.quantity, 150);
        assert_eq!(summary.category(UsageCategory::VisionTokens), PeriodUsage::default());
        assert_eq!(total_cost(&entries), Money::from_micros(1_149));
    }
}
