//! Day and month rollover of running aggregates
//!
//! The day and month totals only describe the period containing
//! `last_update`. Before anything is added for a later date, the totals for
//! the periods that ended are reset. `all_time` is never touched.

use costbook_core::types::{CurrentCosts, DailyDate, Money};

/// What a rollover did to a costs row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    /// `as_of` equals `last_update`
    None,
    /// New day in the same month: day reset
    Day,
    /// New month: day and month reset
    Month,
    /// `as_of` precedes `last_update`; nothing reset
    Late,
}

impl Rollover {
    /// Whether the row changed
    pub fn changed(self) -> bool {
        matches!(self, Self::Day | Self::Month)
    }
}

/// Roll `costs` forward to `as_of`
pub fn roll_forward(costs: &mut CurrentCosts, as_of: DailyDate) -> Rollover {
    let last = costs.last_update;
    if as_of == last {
        return Rollover::None;
    }
    if as_of < last {
        return Rollover::Late;
    }

    costs.day = Money::ZERO;
    costs.last_update = as_of;
    if as_of.same_month(&last) {
        Rollover::Day
    } else {
        costs.month = Money::ZERO;
        Rollover::Month
    }
}
