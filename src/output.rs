//! Output formatting module for costbook
//!
//! This module provides formatters for displaying ledger data in different formats:
//! - Table format for human-readable terminal output
//! - JSON format for machine-readable output and integration with other tools
//!
//! # Examples
//!
//! ```
//! use costbook::output::get_formatter;
//! use costbook_core::types::{CurrentCosts, DailyDate, UserId};
//! use chrono::NaiveDate;
//!
//! let costs = CurrentCosts::zeroed(
//!     UserId::new(1),
//!     DailyDate::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
//! );
//!
//! // Human-readable table
//! println!("{}", get_formatter(false).format_costs(&costs));
//!
//! // Machine-readable JSON
//! println!("{}", get_formatter(true).format_costs(&costs));
//! ```

use colored::Colorize;
use costbook_core::types::{
    CurrentCosts, Money, Payment, PaymentStatus, UsageCategory, UsageHistoryEntry, User,
    UserSettings,
};
use prettytable::{Table, format, row};
use serde_json::{Value, json};

use crate::budget::Budget;
use crate::history::UsageSummary;
use crate::import::ImportReport;
use crate::ledger::{Reconciliation, RecordOutcome, SweepReport};

/// Trait for output formatters
///
/// Every CLI command renders its result through one of these methods, so a
/// new output format only needs a new implementation.
pub trait OutputFormatter {
    /// Format the outcome of recording one event
    fn format_record(&self, outcome: &RecordOutcome) -> String;

    /// Format running costs
    fn format_costs(&self, costs: &CurrentCosts) -> String;

    /// Format the remaining budget of a user
    fn format_budget(&self, budget: &Budget) -> String;

    /// Format history buckets with per-model breakdowns
    fn format_history(&self, entries: &[UsageHistoryEntry]) -> String;

    /// Format a day/month usage summary
    fn format_summary(&self, summary: &UsageSummary) -> String;

    /// Format a reconciliation result
    fn format_reconciliation(&self, reconciliation: &Reconciliation) -> String;

    /// Format a rollover sweep report
    fn format_sweep(&self, report: &SweepReport) -> String;

    /// Format an import report
    fn format_import(&self, report: &ImportReport) -> String;

    /// Format a registered user
    fn format_user(&self, user: &User) -> String;

    /// Format payments
    fn format_payments(&self, payments: &[Payment]) -> String;

    /// Format settings, `None` when the user has none
    fn format_settings(&self, settings: Option<&UserSettings>) -> String;
}

/// Table formatter for human-readable output
///
/// Quantities get thousands separators; costs keep four decimals so
/// sub-cent usage stays visible.
pub struct TableFormatter;

impl TableFormatter {
    /// Format a number with thousands separators
    fn format_number(n: u64) -> String {
        let s = n.to_string();
        let mut result = String::new();

        for (count, ch) in s.chars().rev().enumerate() {
            if count > 0 && count % 3 == 0 {
                result.push(',');
            }
            result.push(ch);
        }

        result.chars().rev().collect()
    }

    /// Format a base-unit quantity in its reported unit
    fn format_quantity(category: UsageCategory, base_units: u64) -> String {
        if category.is_count() {
            Self::format_number(base_units)
        } else {
            let per_unit = category.base_units_per_unit();
            format!(
                "{}.{:03}",
                Self::format_number(base_units / per_unit),
                base_units % per_unit
            )
        }
    }

    fn format_currency(amount: Money) -> String {
        amount.format_with_precision(4)
    }

    fn new_table() -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table
    }

    fn colored_status(status: PaymentStatus) -> String {
        let text = status.to_string();
        match status {
            PaymentStatus::Pending => text.yellow().to_string(),
            PaymentStatus::Completed => text.green().to_string(),
            PaymentStatus::Failed => text.red().to_string(),
            PaymentStatus::Refunded => text.cyan().to_string(),
        }
    }
}

impl OutputFormatter for TableFormatter {
    fn format_record(&self, outcome: &RecordOutcome) -> String {
        let record = &outcome.record;
        let status = if !outcome.applied {
            "duplicate, skipped".yellow().to_string()
        } else if outcome.late {
            "applied late".yellow().to_string()
        } else {
            "applied".green().to_string()
        };
        format!(
            "Event {} ({}): {} {} {} on {} = {} [{}]",
            record.event_id,
            record.date,
            record.category.format_quantity(record.quantity),
            record.category.unit_label(),
            record.category,
            record.model,
            Self::format_currency(record.cost),
            status
        )
    }

    fn format_costs(&self, costs: &CurrentCosts) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![
            b -> "User",
            b -> "As Of",
            b -> "Today",
            b -> "This Month",
            b -> "All Time"
        ]);
        table.add_row(row![
            costs.user_id,
            costs.last_update,
            r -> Self::format_currency(costs.day),
            r -> Self::format_currency(costs.month),
            r -> Self::format_currency(costs.all_time)
        ]);
        table.to_string()
    }

    fn format_budget(&self, budget: &Budget) -> String {
        let (limit, remaining) = match (budget.limit, budget.remaining) {
            (Some(limit), Some(remaining)) => {
                let left = Self::format_currency(remaining);
                let left = if budget.within_budget() {
                    left.green().to_string()
                } else {
                    left.red().to_string()
                };
                (Self::format_currency(limit), left)
            }
            _ => ("unlimited".to_string(), "unlimited".to_string()),
        };
        let mut table = Self::new_table();
        table.set_titles(row![
            b -> "User",
            b -> "Period",
            b -> "Limit",
            b -> "Spent",
            b -> "Remaining"
        ]);
        table.add_row(row![
            budget.user_id,
            budget.period,
            r -> limit,
            r -> Self::format_currency(budget.spent),
            r -> remaining
        ]);
        table.to_string()
    }

    fn format_history(&self, entries: &[UsageHistoryEntry]) -> String {
        if entries.is_empty() {
            return "No usage recorded in this range.\n".to_string();
        }

        let mut table = Self::new_table();
        table.set_titles(row![
            b -> "Date",
            b -> "Category",
            b -> "Model",
            b -> "Quantity",
            b -> "Events",
            b -> "Cost"
        ]);

        let mut total = Money::ZERO;
        for entry in entries {
            for (category, usage) in &entry.categories {
                for (model, model_usage) in &usage.models {
                    table.add_row(row![
                        entry.date,
                        category,
                        model,
                        r -> Self::format_quantity(*category, model_usage.quantity),
                        r -> Self::format_number(model_usage.events),
                        r -> Self::format_currency(model_usage.cost)
                    ]);
                }
            }
            total += entry.total_cost();
        }
        table.add_row(row![b -> "TOTAL", "", "", "", "", b -> Self::format_currency(total)]);
        table.to_string()
    }

    fn format_summary(&self, summary: &UsageSummary) -> String {
        let mut table = Self::new_table();
        table.set_titles(row![
            b -> "Category",
            b -> "Unit",
            b -> format!("Day ({})", summary.as_of),
            b -> "Day Cost",
            b -> format!("Month ({})", summary.as_of.month_key()),
            b -> "Month Cost"
        ]);
        for (category, period) in &summary.categories {
            table.add_row(row![
                category,
                category.unit_label(),
                r -> Self::format_quantity(*category, period.day.quantity),
                r -> Self::format_currency(period.day.cost),
                r -> Self::format_quantity(*category, period.month.quantity),
                r -> Self::format_currency(period.month.cost)
            ]);
        }
        format!("Usage of user {}\n{}", summary.user_id, table)
    }

    fn format_reconciliation(&self, reconciliation: &Reconciliation) -> String {
        let verdict = if reconciliation.is_consistent() {
            "consistent".green().to_string()
        } else {
            format!("drift {}", Self::format_currency(reconciliation.drift))
                .red()
                .to_string()
        };
        format!(
            "User {}: all-time {} vs history {} ({})",
            reconciliation.user_id,
            Self::format_currency(reconciliation.all_time),
            Self::format_currency(reconciliation.history_total),
            verdict
        )
    }

    fn format_sweep(&self, report: &SweepReport) -> String {
        let summary = format!("Rolled over {} of {} users", report.rolled, report.users);
        if report.failed > 0 {
            format!("{summary}, {} failed", report.failed.to_string().red())
        } else {
            summary
        }
    }

    fn format_import(&self, report: &ImportReport) -> String {
        let mut output = format!(
            "Imported {} events: {} applied ({} late), {} duplicates, {} failed\n",
            report.total,
            report.applied.to_string().green(),
            report.late,
            report.duplicates,
            if report.failures.is_empty() {
                "0".to_string()
            } else {
                report.failures.len().to_string().red().to_string()
            }
        );
        for failure in &report.failures {
            output.push_str(&format!("  line {}: {}\n", failure.line, failure.message));
        }
        output
    }

    fn format_user(&self, user: &User) -> String {
        format!(
            "User {} ({}) registered {}",
            user.user_id,
            user.user_name,
            user.created_at.format("%Y-%m-%d %H:%M UTC")
        )
    }

    fn format_payments(&self, payments: &[Payment]) -> String {
        if payments.is_empty() {
            return "No payments.\n".to_string();
        }
        let mut table = Self::new_table();
        table.set_titles(row![
            b -> "Payment",
            b -> "User",
            b -> "Amount",
            b -> "Method",
            b -> "Status",
            b -> "Created",
            b -> "Updated"
        ]);
        for payment in payments {
            table.add_row(row![
                payment.payment_id,
                payment.user_id,
                r -> payment.amount.format_with_precision(2),
                payment.method,
                Self::colored_status(payment.status),
                payment.created_at.format("%Y-%m-%d %H:%M"),
                payment.updated_at.format("%Y-%m-%d %H:%M")
            ]);
        }
        table.to_string()
    }

    fn format_settings(&self, settings: Option<&UserSettings>) -> String {
        match settings {
            Some(settings) => format!(
                "User {}: model {}, brain {} (updated {})",
                settings.user_id,
                settings.model_name,
                settings.brain,
                settings.last_update.format("%Y-%m-%d %H:%M UTC")
            ),
            None => "No settings stored.".to_string(),
        }
    }
}

/// JSON formatter for machine-readable output
///
/// Money is emitted twice: exact integer micro-dollars and a dollar float
/// for convenience.
pub struct JsonFormatter;

impl JsonFormatter {
    fn money(amount: Money) -> Value {
        json!({
            "micros": amount.micros(),
            "usd": amount.as_dollars(),
        })
    }

    fn render(value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    fn history_json(entry: &UsageHistoryEntry) -> Value {
        json!({
            "date": entry.date.to_string(),
            "total_cost": Self::money(entry.total_cost()),
            "categories": entry.categories.iter().map(|(category, usage)| {
                (category.to_string(), json!(usage.models.iter().map(|(model, u)| {
                    (model.to_string(), json!({
                        "quantity": u.quantity,
                        "events": u.events,
                        "cost": Self::money(u.cost),
                    }))
                }).collect::<serde_json::Map<_, _>>()))
            }).collect::<serde_json::Map<_, _>>(),
        })
    }

    fn payment_json(payment: &Payment) -> Value {
        json!({
            "payment_id": payment.payment_id.to_string(),
            "user_id": payment.user_id,
            "amount": Self::money(payment.amount),
            "method": payment.method,
            "status": payment.status.to_string(),
            "created_at": payment.created_at.to_rfc3339(),
            "updated_at": payment.updated_at.to_rfc3339(),
            "version": payment.version,
        })
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_record(&self, outcome: &RecordOutcome) -> String {
        let record = &outcome.record;
        Self::render(&json!({
            "applied": outcome.applied,
            "late": outcome.late,
            "record": {
                "event_id": record.event_id.as_str(),
                "user_id": record.user_id,
                "category": record.category.to_string(),
                "model": record.model.as_str(),
                "quantity": record.quantity,
                "cost": Self::money(record.cost),
                "timestamp": record.timestamp.to_rfc3339(),
                "date": record.date.to_string(),
            }
        }))
    }

    fn format_costs(&self, costs: &CurrentCosts) -> String {
        Self::render(&json!({
            "user_id": costs.user_id,
            "last_update": costs.last_update.to_string(),
            "day": Self::money(costs.day),
            "month": Self::money(costs.month),
            "all_time": Self::money(costs.all_time),
        }))
    }

    fn format_budget(&self, budget: &Budget) -> String {
        Self::render(&json!({
            "user_id": budget.user_id,
            "period": budget.period,
            "limit": budget.limit.map(Self::money),
            "spent": Self::money(budget.spent),
            "remaining": budget.remaining.map(Self::money),
            "within_budget": budget.within_budget(),
        }))
    }

    fn format_history(&self, entries: &[UsageHistoryEntry]) -> String {
        let total: Money = entries.iter().map(UsageHistoryEntry::total_cost).sum();
        Self::render(&json!({
            "history": entries.iter().map(Self::history_json).collect::<Vec<_>>(),
            "total_cost": Self::money(total),
        }))
    }

    fn format_summary(&self, summary: &UsageSummary) -> String {
        Self::render(&json!({
            "user_id": summary.user_id,
            "as_of": summary.as_of.to_string(),
            "categories": summary.categories.iter().map(|(category, period)| {
                (category.to_string(), json!({
                    "day": { "quantity": period.day.quantity, "cost": Self::money(period.day.cost) },
                    "month": { "quantity": period.month.quantity, "cost": Self::money(period.month.cost) },
                }))
            }).collect::<serde_json::Map<_, _>>(),
        }))
    }

    fn format_reconciliation(&self, reconciliation: &Reconciliation) -> String {
        Self::render(&json!({
            "user_id": reconciliation.user_id,
            "all_time": Self::money(reconciliation.all_time),
            "history_total": Self::money(reconciliation.history_total),
            "drift": Self::money(reconciliation.drift),
            "consistent": reconciliation.is_consistent(),
        }))
    }

    fn format_sweep(&self, report: &SweepReport) -> String {
        Self::render(&json!(report))
    }

    fn format_import(&self, report: &ImportReport) -> String {
        Self::render(&json!(report))
    }

    fn format_user(&self, user: &User) -> String {
        Self::render(&json!({
            "user_id": user.user_id,
            "user_name": user.user_name,
            "created_at": user.created_at.to_rfc3339(),
        }))
    }

    fn format_payments(&self, payments: &[Payment]) -> String {
        Self::render(&json!({
            "payments": payments.iter().map(Self::payment_json).collect::<Vec<_>>(),
        }))
    }

    fn format_settings(&self, settings: Option<&UserSettings>) -> String {
        Self::render(&match settings {
            Some(settings) => json!({
                "user_id": settings.user_id,
                "model_name": settings.model_name.as_str(),
                "brain": settings.brain,
                "last_update": settings.last_update.to_rfc3339(),
            }),
            None => Value::Null,
        })
    }
}

/// Get the appropriate formatter based on output preference
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(TableFormatter)
    }
}
