use crate::calendar::WorkCalendar;
use crate::error::{ScheduleError, ScheduleResult};
use crate::task::{RelationType, Task};
use chrono::NaiveDate;

/// Start date a successor should have given its predecessor, relation and lag.
///
/// * SS: the predecessor's start, moved by `lag_days` business days.
/// * FS: the first business day after the predecessor's end, moved by `lag_days`.
///
/// Returns `Ok(None)` when the predecessor lacks the date the relation needs;
/// callers treat that as "leave the successor alone". A start that would fall
/// outside chrono's date range is a validation error.
pub fn resolve_start(
    calendar: &WorkCalendar,
    predecessor: &Task,
    rel_type: RelationType,
    lag_days: i64,
) -> ScheduleResult<Option<NaiveDate>> {
    let start = match rel_type {
        RelationType::StartToStart => {
            let Some(base) = predecessor.start_date else {
                return Ok(None);
            };
            calendar.add_workdays(base, lag_days)
        }
        RelationType::FinishToStart => {
            let Some(base) = predecessor.end_date else {
                return Ok(None);
            };
            calendar
                .next_available(base)
                .and_then(|start| calendar.add_workdays(start, lag_days))
        }
    };
    start
        .map(Some)
        .ok_or_else(|| ScheduleError::date_out_of_range(predecessor.id))
}
