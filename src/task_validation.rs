use crate::task::Task;
use std::collections::HashSet;
use thiserror::Error;

const MAX_PROGRESS: u8 = 100;
/// Largest lag, either direction, in business days.
pub const MAX_LAG_DAYS: i64 = 3_650;
/// Longest task span in calendar days.
pub const MAX_SPAN_DAYS: i64 = 36_525;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskValidationError {
    message: String,
}

impl TaskValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_task(task: &Task) -> Result<(), TaskValidationError> {
    if task.progress > MAX_PROGRESS {
        return Err(TaskValidationError::new(format!(
            "task {} has invalid progress {} (must be between 0 and 100)",
            task.id, task.progress
        )));
    }

    if task.predecessor_id == Some(task.id) {
        return Err(TaskValidationError::new(format!(
            "task {} cannot be its own predecessor",
            task.id
        )));
    }

    if !(-MAX_LAG_DAYS..=MAX_LAG_DAYS).contains(&task.lag_days) {
        return Err(TaskValidationError::new(format!(
            "task {} has lag {} (must be within {MAX_LAG_DAYS} workdays)",
            task.id, task.lag_days
        )));
    }

    if let (Some(start), Some(end)) = (task.start_date, task.end_date) {
        let span = (end - start).num_days();
        if span.abs() > MAX_SPAN_DAYS {
            return Err(TaskValidationError::new(format!(
                "task {} spans {} days (must be within {MAX_SPAN_DAYS})",
                task.id, span
            )));
        }
    }

    if task.is_exception && task.exception_description.trim().is_empty() {
        return Err(TaskValidationError::new(format!(
            "exception task {} requires a description",
            task.id
        )));
    }

    Ok(())
}

/// Validate one project's task set: unique ids and a single owning project.
/// Predecessor ids that do not resolve are allowed; they read as no predecessor.
pub fn validate_task_collection(tasks: &[Task]) -> Result<(), TaskValidationError> {
    let mut seen_ids = HashSet::with_capacity(tasks.len());
    let project_id = tasks.first().map(|t| t.project_id);
    for task in tasks {
        if !seen_ids.insert(task.id) {
            return Err(TaskValidationError::new(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        if Some(task.project_id) != project_id {
            return Err(TaskValidationError::new(format!(
                "task {} belongs to project {} but the set belongs to project {}",
                task.id,
                task.project_id,
                project_id.unwrap_or_default()
            )));
        }
        validate_task(task)?;
    }
    Ok(())
}
