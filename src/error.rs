use crate::persistence::PersistenceError;
use crate::task::TaskId;
use thiserror::Error;

/// A request that is well-formed but not allowed in the project's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    #[error("cannot modify dates while project is on hold")]
    ProjectOnHold,
    #[error("project is already on hold")]
    AlreadyOnHold,
    #[error("project is not on hold")]
    NotOnHold,
    #[error("cannot delay start date of task {task_id} after go-live")]
    StartDelayedAfterGoLive { task_id: TaskId },
    #[error("cannot extend end date of task {task_id} after go-live")]
    EndExtendedAfterGoLive { task_id: TaskId },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("cascade exceeded its deadline after {passes} pass(es)")]
    DeadlineExceeded { passes: usize },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ScheduleError {
    pub fn validation(message: impl Into<String>) -> Self {
        ScheduleError::Validation(message.into())
    }

    /// Date arithmetic for `task_id` left the supported calendar range.
    pub fn date_out_of_range(task_id: TaskId) -> Self {
        ScheduleError::Validation(format!(
            "dates of task {task_id} fall outside the supported calendar range"
        ))
    }

    pub fn task_not_found(id: TaskId) -> Self {
        ScheduleError::NotFound { entity: "task", id }
    }

    pub fn project_not_found(id: i64) -> Self {
        ScheduleError::NotFound {
            entity: "project",
            id,
        }
    }

    pub fn exemption_not_found(id: i64) -> Self {
        ScheduleError::NotFound {
            entity: "exemption",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ScheduleError::NotFound { .. })
    }

    pub fn constraint(&self) -> Option<ConstraintViolation> {
        match self {
            ScheduleError::Constraint(violation) => Some(*violation),
            _ => None,
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
