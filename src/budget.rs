//! Spending budgets
//!
//! A budget caps what a user may spend in one [`BudgetPeriod`]. Users can
//! have their own limit; everyone else falls back to the default limit,
//! and no limit at all means unlimited. Spending is read from the running
//! costs after rollover, so a new day or month starts with a fresh budget.

use costbook_core::types::{CurrentCosts, Money, UserId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Window a budget applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetPeriod {
    Daily,
    #[default]
    Monthly,
    AllTime,
}

impl BudgetPeriod {
    /// Cost spent in this period
    pub fn spent(self, costs: &CurrentCosts) -> Money {
        match self {
            Self::Daily => costs.day,
            Self::Monthly => costs.month,
            Self::AllTime => costs.all_time,
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly"),
            Self::AllTime => write!(f, "all-time"),
        }
    }
}

impl FromStr for BudgetPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "monthly" | "month" => Ok(Self::Monthly),
            "all-time" | "all_time" | "alltime" => Ok(Self::AllTime),
            _ => Err(format!("Invalid budget period: {s}")),
        }
    }
}

/// Budget limits of every user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetConfig {
    pub period: BudgetPeriod,
    /// Limit for users without their own; `None` is unlimited
    pub default_limit: Option<Money>,
    /// Per-user limits
    pub user_limits: BTreeMap<UserId, Money>,
}

impl BudgetConfig {
    pub fn with_period(mut self, period: BudgetPeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_default_limit(mut self, limit: Option<Money>) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_user_limit(mut self, user_id: UserId, limit: Money) -> Self {
        self.user_limits.insert(user_id, limit);
        self
    }

    /// Limit that applies to `user_id`
    pub fn limit_for(&self, user_id: UserId) -> Option<Money> {
        self.user_limits
            .get(&user_id)
            .copied()
            .or(self.default_limit)
    }

    /// Budget state of one user given their rolled-over costs
    pub fn status(&self, costs: &CurrentCosts) -> Budget {
        let spent = self.period.spent(costs);
        let limit = self.limit_for(costs.user_id);
        Budget {
            user_id: costs.user_id,
            period: self.period,
            limit,
            spent,
            remaining: limit
                .map(|limit| Money::from_micros(limit.micros().saturating_sub(spent.micros()))),
        }
    }
}

/// Remaining budget of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Budget {
    pub user_id: UserId,
    pub period: BudgetPeriod,
    /// `None` when the user is unlimited
    pub limit: Option<Money>,
    /// Cost spent in the current period
    pub spent: Money,
    /// `limit - spent`; negative once the user overspent
    pub remaining: Option<Money>,
}

impl Budget {
    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    /// Whether the user may still spend
    pub fn within_budget(&self) -> bool {
        self.remaining
            .is_none_or(|remaining| remaining > Money::ZERO)
    }
}

/// Parse a `USER=AMOUNT` per-user limit
pub fn parse_user_limit(s: &str) -> Result<(UserId, Money), String> {
    let (user, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid user budget '{s}', expected USER=AMOUNT"))?;
    let user = user
        .trim()
        .parse::<UserId>()
        .map_err(|_| format!("Invalid user id in budget '{s}'"))?;
    let amount = parse_limit(amount)?;
    Ok((user, amount))
}

/// Parse a non-negative budget amount in dollars
pub fn parse_limit(s: &str) -> Result<Money, String> {
    let amount = s.parse::<Money>()?;
    if amount.is_negative() {
        return Err(format!("Budget must not be negative: {s}"));
    }
    Ok(amount)
}
