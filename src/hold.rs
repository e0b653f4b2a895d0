use crate::audit::{NewEditLogEntry, TaskField};
use crate::calendar::{WorkCalendar, format_date};
use crate::error::{ScheduleError, ScheduleResult};
use crate::project::Project;
use crate::task::{Task, TaskId};
use chrono::{NaiveDate, NaiveDateTime};

/// Task name recorded on a release entry when nothing was in progress.
pub const ALL_TASKS: &str = "All Tasks";

/// What a release did to the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub hold_days: i64,
    pub in_progress: Option<TaskId>,
    /// Every task whose dates moved, ascending.
    pub shifted: Vec<TaskId>,
    pub log_entry: NewEditLogEntry,
}

pub fn place_on_hold(project: &mut Project, today: NaiveDate) -> ScheduleResult<()> {
    project.place_on_hold(today)?;
    Ok(())
}

/// Business days the project spent on hold: days in `(since, today]`,
/// never less than one. A missing start date counts as today.
pub fn hold_days(calendar: &WorkCalendar, since: Option<NaiveDate>, today: NaiveDate) -> i64 {
    let since = since.unwrap_or(today);
    calendar.elapsed_workdays(since, today).max(1)
}

/// The task that was being worked on when the hold began: started on or
/// before `today`, incomplete, not an exception, with the latest start.
/// Ties go to the first task in slice order.
pub fn find_in_progress(tasks: &[Task], today: NaiveDate) -> Option<usize> {
    let mut best: Option<(usize, NaiveDate)> = None;
    for (idx, task) in tasks.iter().enumerate() {
        let Some(start) = task.start_date else {
            continue;
        };
        if start > today || task.progress >= 100 || task.is_exception {
            continue;
        }
        match best {
            Some((_, best_start)) if start <= best_start => {}
            _ => best = Some((idx, start)),
        }
    }
    best.map(|(idx, _)| idx)
}

fn shift(
    calendar: &WorkCalendar,
    task_id: TaskId,
    date: NaiveDate,
    days: i64,
) -> ScheduleResult<NaiveDate> {
    calendar
        .add_workdays(date, days)
        .ok_or_else(|| ScheduleError::date_out_of_range(task_id))
}

/// Lift the hold and push the remaining work back by the time lost.
///
/// With a task in progress, its end moves by the hold length and every task
/// starting strictly after it shifts whole. Without one, every task starting
/// on or after `today` shifts. Nothing is cascaded.
pub fn release_hold(
    project: &mut Project,
    tasks: &mut [Task],
    calendar: &WorkCalendar,
    now: NaiveDateTime,
    edited_by: &str,
) -> ScheduleResult<ReleaseOutcome> {
    let today = now.date();
    let since = project.lift_hold()?;
    let days = hold_days(calendar, since, today);

    let mut shifted = Vec::new();
    let in_progress = find_in_progress(tasks, today);

    let shift_from = match in_progress {
        Some(idx) => {
            let task = &mut tasks[idx];
            if let Some(end) = task.end_date {
                task.end_date = Some(shift(calendar, task.id, end, days)?);
                shifted.push(task.id);
            }
            // find_in_progress only returns dated tasks
            task.start_date.map(|start| (task.id, start, false))
        }
        None => Some((0, today, true)),
    };

    if let Some((anchor_id, threshold, inclusive)) = shift_from {
        for task in tasks.iter_mut() {
            if in_progress.is_some() && task.id == anchor_id {
                continue;
            }
            let Some(start) = task.start_date else {
                continue;
            };
            let moves = if inclusive {
                start >= threshold
            } else {
                start > threshold
            };
            if !moves {
                continue;
            }
            task.start_date = Some(shift(calendar, task.id, start, days)?);
            task.end_date = task
                .end_date
                .map(|end| shift(calendar, task.id, end, days))
                .transpose()?;
            shifted.push(task.id);
        }
    }
    shifted.sort_unstable();

    let (task_id, task_name) = match in_progress {
        Some(idx) => (Some(tasks[idx].id), tasks[idx].name.clone()),
        None => (None, ALL_TASKS.to_string()),
    };
    let log_entry = NewEditLogEntry {
        task_id,
        project_id: project.id,
        task_name,
        field: TaskField::HoldRelease,
        old_value: format_date(since),
        new_value: format_date(Some(today)),
        reason: format!("Hold released after {days} workday(s)"),
        edited_by: edited_by.to_string(),
        edited_at: now,
    };

    Ok(ReleaseOutcome {
        hold_days: days,
        in_progress: task_id,
        shifted,
        log_entry,
    })
}
