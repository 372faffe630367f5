//! CLI interface for costbook
//!
//! This module defines the command-line interface using clap. Ledger-wide
//! options (data file, pricing, timezone, policies) are global flags with
//! environment fallbacks so they can be set once per deployment.
//!
//! # Example
//!
//! ```bash
//! # Record 1,200 chat tokens for user 42
//! costbook record --user 42 --category chat_tokens --quantity 1200 --event-id msg-1
//!
//! # Replay a JSONL file of events
//! costbook import events.jsonl --concurrency 32
//!
//! # Show running costs and March history as JSON
//! costbook costs --user 42 --json
//! costbook history --user 42 --since 2024-03 --until 2024-03
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use costbook_core::error::{LedgerError, Result};
use costbook_core::retry::RetryConfig;
use costbook_core::timezone::TimezoneConfig;
use costbook_core::types::{DailyDate, DateRange, Money, PaymentId, PaymentStatus, UserId};
use costbook_store::JsonFileStore;
use std::path::PathBuf;
use std::time::Duration;

use crate::budget::{BudgetConfig, BudgetPeriod, parse_limit, parse_user_limit};
use crate::config::{LedgerConfig, UnknownUserPolicy};

/// Usage-accounting ledger for metered AI usage
#[derive(Parser, Debug, Clone)]
#[command(name = "costbook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Only show warnings and errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Ledger options
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Options that configure the ledger itself
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Ledger file (default: <data dir>/costbook/ledger.json)
    #[arg(long, env = "COSTBOOK_DATA", global = true)]
    pub data: Option<PathBuf>,

    /// Keep the ledger in memory only; nothing is persisted
    #[arg(long, global = true, conflicts_with = "data")]
    pub in_memory: bool,

    /// Pricing table JSON file (default: built-in list prices)
    #[arg(long, env = "COSTBOOK_PRICING", global = true)]
    pub pricing: Option<PathBuf>,

    /// Timezone for calendar days (e.g. "America/New_York", "Asia/Tokyo", "UTC")
    /// If not specified, uses the system's local timezone
    #[arg(long, short = 'z', env = "COSTBOOK_TIMEZONE", global = true)]
    pub timezone: Option<String>,

    /// Use UTC for calendar days (overrides --timezone)
    #[arg(long, global = true)]
    pub utc: bool,

    /// Events for unregistered users: auto-provision or reject
    #[arg(
        long,
        env = "COSTBOOK_UNKNOWN_USERS",
        default_value = "auto-provision",
        global = true
    )]
    pub unknown_users: UnknownUserPolicy,

    /// Hours an applied event id is remembered for deduplication (1 to 87600)
    #[arg(
        long,
        default_value = "168",
        value_parser = clap::value_parser!(u32).range(1..=87_600),
        global = true
    )]
    pub dedup_window_hours: u32,

    /// Timeout for one accounting operation in milliseconds
    #[arg(long, default_value = "5000", global = true)]
    pub timeout_ms: u64,

    /// Retries for transient storage failures (0 disables retrying)
    #[arg(long, default_value = "3", global = true)]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds, doubled per attempt
    #[arg(long, default_value = "50", global = true)]
    pub retry_delay_ms: u64,

    /// Budget period: daily, monthly or all-time
    #[arg(
        long,
        env = "COSTBOOK_BUDGET_PERIOD",
        default_value = "monthly",
        global = true
    )]
    pub budget_period: BudgetPeriod,

    /// Budget in dollars for users without their own (default: unlimited)
    #[arg(long, env = "COSTBOOK_DEFAULT_BUDGET", value_parser = parse_limit, global = true)]
    pub default_budget: Option<Money>,

    /// Per-user budget as USER=AMOUNT; repeat for more users
    #[arg(long = "user-budget", value_parser = parse_user_limit, global = true)]
    pub user_budgets: Vec<(UserId, Money)>,
}

impl LedgerArgs {
    /// Build the ledger configuration from the flags
    pub fn to_config(&self) -> Result<LedgerConfig> {
        let timezone = TimezoneConfig::from_cli(self.timezone.as_deref(), self.utc)?;
        let retry = if self.max_retries == 0 {
            RetryConfig::disabled()
        } else {
            RetryConfig {
                max_retries: self.max_retries,
                initial_delay_ms: self.retry_delay_ms,
                ..RetryConfig::default()
            }
        };
        Ok(LedgerConfig::default()
            .with_timezone(timezone)
            .with_unknown_user_policy(self.unknown_users)
            .with_dedup_window(chrono::Duration::hours(i64::from(self.dedup_window_hours)))
            .with_operation_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry(retry)
            .with_budget(self.budget()))
    }

    fn budget(&self) -> BudgetConfig {
        self.user_budgets.iter().fold(
            BudgetConfig::default()
                .with_period(self.budget_period)
                .with_default_limit(self.default_budget),
            |budget, &(user_id, limit)| budget.with_user_limit(user_id, limit),
        )
    }

    /// Ledger file to open
    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data {
            Some(path) => Ok(path.clone()),
            None => JsonFileStore::default_path().ok_or_else(|| {
                LedgerError::Config(
                    "Could not determine a data directory; pass --data".to_string(),
                )
            }),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record one usage event
    Record(RecordArgs),

    /// Replay usage events from a JSONL file
    Import {
        /// JSONL file with one event per line
        file: PathBuf,

        /// Maximum number of events applied concurrently
        #[arg(long, default_value = "16")]
        concurrency: usize,
    },

    /// Show running costs (rolled over to today)
    Costs {
        #[arg(long, short = 'u')]
        user: UserId,
    },

    /// Show the budget left in the current period
    Budget {
        #[arg(long, short = 'u')]
        user: UserId,
    },

    /// Show per-day usage history
    History {
        #[arg(long, short = 'u')]
        user: UserId,

        /// Start date (YYYY-MM-DD or YYYY-MM)
        #[arg(long)]
        since: Option<String>,

        /// End date (YYYY-MM-DD or YYYY-MM, inclusive)
        #[arg(long)]
        until: Option<String>,
    },

    /// Show per-category usage for a day and its month
    Summary {
        #[arg(long, short = 'u')]
        user: UserId,

        /// Day to summarize (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Compare all-time costs with the history log
    Reconcile {
        /// Only this user (default: every user)
        #[arg(long, short = 'u')]
        user: Option<UserId>,

        /// Reset drifted all-time costs to the history total
        #[arg(long)]
        repair: bool,
    },

    /// Roll every user's day and month totals forward
    Sweep {
        /// Roll to this day (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,

        /// Keep sweeping every N seconds
        #[arg(long)]
        every: Option<u64>,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Record a pending payment
    Pay {
        #[arg(long, short = 'u')]
        user: UserId,

        /// Amount in dollars (e.g. 5 or 12.50)
        #[arg(long)]
        amount: Money,

        /// Payment method
        #[arg(long, default_value = "card")]
        method: String,
    },

    /// Show or change the status of a payment
    PaymentStatus {
        /// Payment id
        payment_id: PaymentId,

        /// New status: completed, failed or refunded
        status: Option<PaymentStatus>,
    },

    /// List a user's payments
    Payments {
        #[arg(long, short = 'u')]
        user: UserId,
    },

    /// Read or change per-user model settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

/// Arguments for the record command
#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    #[arg(long, short = 'u')]
    pub user: UserId,

    /// Usage category (chat_tokens, transcription_seconds, number_images,
    /// tts_characters, vision_tokens)
    #[arg(long, short = 'c')]
    pub category: String,

    /// Quantity in the category's unit
    #[arg(long)]
    pub quantity: f64,

    /// Model or image size (default: the category's default model)
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Idempotency key; repeated ids are applied once
    #[arg(long)]
    pub event_id: Option<String>,

    /// User name used when the user is provisioned by this event
    #[arg(long)]
    pub name: Option<String>,

    /// Event time (RFC 3339, default now)
    #[arg(long)]
    pub at: Option<String>,
}

/// User subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Register a user
    Add {
        #[arg(long, short = 'u')]
        user: UserId,

        #[arg(long)]
        name: String,
    },

    /// List registered users
    List,
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Show a user's settings
    Get {
        #[arg(long, short = 'u')]
        user: UserId,
    },

    /// Change a user's model, brain or both
    Set {
        #[arg(long, short = 'u')]
        user: UserId,

        #[arg(long, short = 'm')]
        model: Option<String>,

        #[arg(long, short = 'b')]
        brain: Option<String>,
    },
}

/// Parse date filter from string
///
/// Supports both YYYY-MM-DD and YYYY-MM formats. For YYYY-MM format,
/// returns the first day of the month.
pub fn parse_date_filter(date_str: &str) -> Result<NaiveDate> {
    // Try YYYY-MM-DD format first
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(date);
    }

    // Try YYYY-MM format (convert to first day of month)
    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() == 2 {
        let year = parts[0]
            .parse::<i32>()
            .map_err(|_| LedgerError::InvalidDate(format!("Invalid year in '{date_str}'")))?;
        let month = parts[1]
            .parse::<u32>()
            .map_err(|_| LedgerError::InvalidDate(format!("Invalid month in '{date_str}'")))?;

        if !(1..=12).contains(&month) {
            return Err(LedgerError::InvalidDate(format!(
                "Month must be between 1-12, got {month}"
            )));
        }

        NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| LedgerError::InvalidDate(format!("Invalid date: {date_str}")))
    } else {
        Err(LedgerError::InvalidDate(format!(
            "Invalid date format '{}', expected YYYY-MM-DD or YYYY-MM",
            date_str
        )))
    }
}

/// Parse an inclusive end date; YYYY-MM means the last day of that month
pub fn parse_until_filter(date_str: &str) -> Result<NaiveDate> {
    let date = parse_date_filter(date_str)?;
    if NaiveDate::parse_from_str(date_str, "%Y-%m-%d").is_ok() {
        return Ok(date);
    }
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| LedgerError::InvalidDate(format!("Invalid date: {date_str}")))
}

/// Build a history range from optional --since/--until strings
pub fn parse_date_range(since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
    let mut range = DateRange::all();
    if let Some(since) = since {
        range = range.with_since(DailyDate::new(parse_date_filter(since)?));
    }
    if let Some(until) = until {
        range = range.with_until(DailyDate::new(parse_until_filter(until)?));
    }
    if let (Some(since), Some(until)) = (range.since, range.until)
        && since > until
    {
        return Err(LedgerError::InvalidDate(format!(
            "--since {since} is after --until {until}"
        )));
    }
    Ok(range)
}

/// Parse a single calendar day (YYYY-MM-DD)
pub fn parse_day(date_str: &str) -> Result<DailyDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map(DailyDate::new)
        .map_err(|_| {
            LedgerError::InvalidDate(format!("Invalid date '{date_str}', expected YYYY-MM-DD"))
        })
}

/// Parse an RFC 3339 event timestamp
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::InvalidDate(format!("Invalid timestamp '{ts}': {e}")))
}
