use crate::audit::{FieldChange, NewEditLogEntry, TaskField};
use crate::calendar::WorkCalendar;
use crate::cascade::{CascadeEngine, CascadeOutcome};
use crate::error::{ScheduleError, ScheduleResult};
use crate::project::ProjectId;
use crate::task::{RelationType, Task, TaskId};
use crate::task_validation::{MAX_SPAN_DAYS, validate_task};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_DURATION: i64 = 1;

/// Request to splice an unplanned task in after `task_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewException {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Business days; missing or zero means one.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub edited_by: String,
}

impl NewException {
    pub fn new(
        name: impl Into<String>,
        date: NaiveDate,
        task_id: TaskId,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            date: Some(date),
            duration: None,
            task_id: Some(task_id),
            description: description.into(),
            edited_by: String::new(),
        }
    }

    pub fn lasting(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn by(mut self, edited_by: impl Into<String>) -> Self {
        self.edited_by = edited_by.into();
        self
    }

    /// Check required fields before anything is touched.
    pub fn validate(self) -> ScheduleResult<ExceptionRequest> {
        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();
        let (Some(date), Some(target_id)) = (self.date, self.task_id) else {
            return Err(ScheduleError::validation(
                "exception requires name, date, description and task_id",
            ));
        };
        if name.is_empty() || description.is_empty() {
            return Err(ScheduleError::validation(
                "exception requires name, date, description and task_id",
            ));
        }
        // zero reads as "not given"
        let duration = match self.duration {
            None | Some(0) => DEFAULT_DURATION,
            Some(duration) => duration,
        };
        if !(1..=MAX_SPAN_DAYS).contains(&duration) {
            return Err(ScheduleError::validation(format!(
                "exception duration must be between 1 and {MAX_SPAN_DAYS} workdays, got {duration}"
            )));
        }
        Ok(ExceptionRequest {
            name,
            date,
            duration,
            target_id,
            description,
            edited_by: self.edited_by,
        })
    }
}

/// A validated exception request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRequest {
    pub name: String,
    pub date: NaiveDate,
    pub duration: i64,
    pub target_id: TaskId,
    pub description: String,
    pub edited_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceOutcome {
    pub exception_id: TaskId,
    /// Former dependents of the target, now linked to the exception.
    pub rewired: Vec<TaskId>,
    pub cascade: CascadeOutcome,
    pub log_entry: NewEditLogEntry,
}

/// Index of the target task, or `NotFound` when it is not part of this
/// project's task set.
pub fn target_index(tasks: &[Task], target_id: TaskId) -> ScheduleResult<usize> {
    tasks
        .iter()
        .position(|task| task.id == target_id)
        .ok_or_else(|| ScheduleError::task_not_found(target_id))
}

/// Insert the exception after its target, move the target's dependents
/// onto it and cascade. The target itself is pinned; the exception is
/// an ordinary FS successor of the target during the cascade.
pub fn splice_exception(
    tasks: &mut Vec<Task>,
    project_id: ProjectId,
    exception_id: TaskId,
    request: &ExceptionRequest,
    calendar: &WorkCalendar,
    deadline: Option<Instant>,
    now: NaiveDateTime,
) -> ScheduleResult<SpliceOutcome> {
    let target_idx = target_index(tasks, request.target_id)?;
    let target_name = tasks[target_idx].name.clone();

    let end = calendar
        .end_from_workdays(request.date, request.duration)
        .ok_or_else(|| ScheduleError::date_out_of_range(exception_id))?;
    let mut exception = Task::new(exception_id, project_id, request.name.clone())
        .with_dates(request.date, end)
        .with_predecessor(request.target_id, RelationType::FinishToStart, 0);
    exception.is_exception = true;
    exception.exception_description = request.description.clone();
    validate_task(&exception).map_err(|err| ScheduleError::validation(err.to_string()))?;

    let mut rewired = Vec::new();
    for task in tasks.iter_mut() {
        if task.predecessor_id == Some(request.target_id) {
            task.predecessor_id = Some(exception_id);
            rewired.push(task.id);
        }
    }
    tasks.push(exception);

    let cascade = CascadeEngine::new(calendar)
        .pinning(request.target_id)
        .with_deadline(deadline)
        .execute(tasks)?;

    let change = FieldChange {
        field: TaskField::Exception,
        old_value: String::new(),
        new_value: format!("{} ({}d)", request.name, request.duration),
    };
    let log_entry = NewEditLogEntry::from_change(
        request.target_id,
        project_id,
        &target_name,
        change,
        &request.description,
        &request.edited_by,
        now,
    );

    Ok(SpliceOutcome {
        exception_id,
        rewired,
        cascade,
        log_entry,
    })
}
