use crate::audit::{FieldChange, NewEditLogEntry, TaskField};
use crate::calendar::{WorkCalendar, format_date};
use crate::cascade::{CascadeEngine, CascadeOutcome};
use crate::error::{ConstraintViolation, ScheduleError, ScheduleResult};
use crate::guard::{BatchVerdict, DateChangeGuard};
use crate::project::Project;
use crate::task::{BatchDateUpdate, Task, TaskId, TaskPatch, TaskUpdate};
use crate::task_validation::validate_task;
use chrono::NaiveDateTime;
use std::time::Instant;

fn find_index(tasks: &[Task], task_id: TaskId) -> ScheduleResult<usize> {
    tasks
        .iter()
        .position(|task| task.id == task_id)
        .ok_or_else(|| ScheduleError::task_not_found(task_id))
}

/// A predecessor must be another task of the same project.
pub(crate) fn ensure_predecessor(
    tasks: &[Task],
    task_id: TaskId,
    predecessor_id: Option<TaskId>,
) -> ScheduleResult<()> {
    let Some(pred) = predecessor_id else {
        return Ok(());
    };
    if pred == task_id {
        return Err(ScheduleError::validation(format!(
            "task {task_id} cannot be its own predecessor"
        )));
    }
    if !tasks.iter().any(|t| t.id == pred) {
        return Err(ScheduleError::validation(format!(
            "predecessor {pred} is not a task of this project"
        )));
    }
    Ok(())
}

fn apply_patch(task: &mut Task, patch: &TaskPatch) {
    if let Some(name) = &patch.name {
        task.name = name.clone();
    }
    if let Some(start) = patch.start_date {
        task.start_date = Some(start);
    }
    if let Some(end) = patch.end_date {
        task.end_date = Some(end);
    }
    if let Some(progress) = patch.progress {
        task.progress = progress;
    }
    if let Some(contractor) = &patch.contractor {
        task.contractor = contractor.clone();
    }
    if let Some(trade) = &patch.trade {
        task.trade = trade.clone();
    }
    if let Some(pred) = patch.predecessor_id {
        task.predecessor_id = pred;
    }
    if let Some(rel_type) = patch.rel_type {
        task.rel_type = rel_type;
    }
    if let Some(lag) = patch.lag_days {
        task.lag_days = lag;
    }
}

fn id_text(id: Option<TaskId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// Field-by-field differences between `task` and what `patch` would set.
pub fn diff_patch(task: &Task, patch: &TaskPatch) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: TaskField, old: String, new: String| {
        if old != new {
            changes.push(FieldChange {
                field,
                old_value: old,
                new_value: new,
            });
        }
    };

    if let Some(name) = &patch.name {
        push(TaskField::Name, task.name.clone(), name.clone());
    }
    if let Some(start) = patch.start_date {
        push(
            TaskField::StartDate,
            format_date(task.start_date),
            format_date(Some(start)),
        );
    }
    if let Some(end) = patch.end_date {
        push(
            TaskField::EndDate,
            format_date(task.end_date),
            format_date(Some(end)),
        );
    }
    if let Some(progress) = patch.progress {
        push(
            TaskField::Progress,
            task.progress.to_string(),
            progress.to_string(),
        );
    }
    if let Some(contractor) = &patch.contractor {
        push(
            TaskField::Contractor,
            task.contractor.clone(),
            contractor.clone(),
        );
    }
    if let Some(trade) = &patch.trade {
        push(TaskField::Trade, task.trade.clone(), trade.clone());
    }
    if let Some(pred) = patch.predecessor_id {
        push(
            TaskField::PredecessorId,
            id_text(task.predecessor_id),
            id_text(pred),
        );
    }
    if let Some(rel_type) = patch.rel_type {
        push(
            TaskField::RelType,
            task.rel_type.to_string(),
            rel_type.to_string(),
        );
    }
    if let Some(lag) = patch.lag_days {
        push(TaskField::LagDays, task.lag_days.to_string(), lag.to_string());
    }
    changes
}

/// Unaudited update of one task. Subject to the hold and go-live rules;
/// does not cascade.
pub fn update_task(
    project: &Project,
    tasks: &mut [Task],
    task_id: TaskId,
    update: &TaskUpdate,
) -> ScheduleResult<Task> {
    let idx = find_index(tasks, task_id)?;
    let patch = &update.patch;
    DateChangeGuard::for_project(project).check(&tasks[idx], patch.start_date, patch.end_date)?;
    if let Some(pred) = patch.predecessor_id {
        ensure_predecessor(tasks, task_id, pred)?;
    }

    let mut task = tasks[idx].clone();
    apply_patch(&mut task, patch);
    if let Some(start) = update.baseline_start {
        task.baseline_start = Some(start);
    }
    if let Some(end) = update.baseline_end {
        task.baseline_end = Some(end);
    }
    validate_task(&task).map_err(|err| ScheduleError::validation(err.to_string()))?;

    tasks[idx] = task.clone();
    Ok(task)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids that were written, in request order.
    pub updated: Vec<TaskId>,
    pub skipped: Vec<(TaskId, ConstraintViolation)>,
}

/// Drag/cascade batch: each entry is checked on its own. Entries blocked by
/// the project state are skipped, later ends are capped after go-live, and
/// ids that are not in `tasks` are ignored.
pub fn batch_update(
    project: &Project,
    tasks: &mut [Task],
    updates: &[BatchDateUpdate],
) -> BatchOutcome {
    let guard = DateChangeGuard::for_project(project);
    let mut outcome = BatchOutcome::default();

    for update in updates {
        let Some(task) = tasks.iter_mut().find(|t| t.id == update.id) else {
            continue;
        };
        match guard.admit_batch(task, update.start_date, update.end_date) {
            BatchVerdict::Skip(violation) => {
                tracing::warn!(
                    project_id = project.id,
                    task_id = task.id,
                    %violation,
                    "skipping batch entry"
                );
                outcome.skipped.push((task.id, violation));
            }
            BatchVerdict::Apply { start, end } => {
                if let Some(start) = start {
                    task.start_date = Some(start);
                }
                if let Some(end) = end {
                    task.end_date = Some(end);
                }
                if let Some(lag) = update.lag_days {
                    task.lag_days = lag;
                }
                if !outcome.updated.contains(&task.id) {
                    outcome.updated.push(task.id);
                }
            }
        }
    }

    outcome
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonedEditOutcome {
    pub changes: Vec<FieldChange>,
    pub cascade: CascadeOutcome,
    pub log_entries: Vec<NewEditLogEntry>,
}

/// Audited edit: one log entry per changed field, then a cascade that never
/// overwrites the edited task.
#[allow(clippy::too_many_arguments)]
pub fn reasoned_edit(
    project: &Project,
    tasks: &mut [Task],
    task_id: TaskId,
    patch: &TaskPatch,
    reason: &str,
    edited_by: &str,
    calendar: &WorkCalendar,
    deadline: Option<Instant>,
    now: NaiveDateTime,
) -> ScheduleResult<ReasonedEditOutcome> {
    let idx = find_index(tasks, task_id)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ScheduleError::validation("reason is required"));
    }
    DateChangeGuard::for_project(project).check(&tasks[idx], patch.start_date, patch.end_date)?;
    if let Some(pred) = patch.predecessor_id {
        ensure_predecessor(tasks, task_id, pred)?;
    }

    let changes = diff_patch(&tasks[idx], patch);
    let mut edited = tasks[idx].clone();
    apply_patch(&mut edited, patch);
    validate_task(&edited).map_err(|err| ScheduleError::validation(err.to_string()))?;
    tasks[idx] = edited;

    let task_name = tasks[idx].name.clone();
    let log_entries = changes
        .iter()
        .cloned()
        .map(|change| {
            NewEditLogEntry::from_change(
                task_id, project.id, &task_name, change, reason, edited_by, now,
            )
        })
        .collect();

    let cascade = CascadeEngine::new(calendar)
        .pinning(task_id)
        .with_deadline(deadline)
        .execute(tasks)?;

    Ok(ReasonedEditOutcome {
        changes,
        cascade,
        log_entries,
    })
}
