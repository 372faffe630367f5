//! Running aggregate updates
//!
//! Applies one canonical record to a user's [`CurrentCosts`]. A record for
//! a later date first rolls the row forward; a record dated before
//! `last_update` is late and only counts toward `all_time`.

use costbook_core::error::{LedgerError, Result};
use costbook_core::types::{CanonicalRecord, CurrentCosts, Money};
use tracing::debug;

use crate::rollover::{Rollover, roll_forward};

/// Result of applying a record to a costs row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateUpdate {
    /// The new row
    pub costs: CurrentCosts,
    /// Rollover performed before the increment
    pub rollover: Rollover,
    /// Whether the record was dated before `last_update`
    pub late: bool,
}

/// Apply `record` to `current`, creating a zeroed row on first use
///
/// Fails with `InvalidEvent` when a running total would overflow; the
/// caller's row is never modified.
pub fn apply_record(
    current: Option<CurrentCosts>,
    record: &CanonicalRecord,
) -> Result<AggregateUpdate> {
    let mut costs =
        current.unwrap_or_else(|| CurrentCosts::zeroed(record.user_id, record.date));

    let rollover = roll_forward(&mut costs, record.date);
    let late = rollover == Rollover::Late;

    costs.all_time = add_cost(costs.all_time, record, "all_time")?;
    if !late {
        costs.day = add_cost(costs.day, record, "day")?;
        costs.month = add_cost(costs.month, record, "month")?;
    }

    debug!(
        user_id = %record.user_id,
        day = %costs.day,
        month = %costs.month,
        all_time = %costs.all_time,
        ?rollover,
        late,
        "Applied record to running aggregates"
    );

    Ok(AggregateUpdate {
        costs,
        rollover,
        late,
    })
}

fn add_cost(total: Money, record: &CanonicalRecord, period: &str) -> Result<Money> {
    total.checked_add(record.cost).ok_or_else(|| {
        LedgerError::InvalidEvent(format!(
            "event {} would overflow the {period} cost of user {}",
            record.event_id, record.user_id
        ))
    })
}
