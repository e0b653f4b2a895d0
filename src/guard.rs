use crate::error::ConstraintViolation;
use crate::project::Project;
use crate::task::Task;
use chrono::NaiveDate;

/// Outcome of checking one batch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    /// Apply these dates (an end may have been capped).
    Apply {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Skip(ConstraintViolation),
}

/// Date-change rules derived from the project's hold and go-live state.
///
/// On hold, no task date may change. After go-live, a non-exception task may
/// only move its start and end earlier (or keep them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateChangeGuard {
    on_hold: bool,
    live: bool,
}

impl DateChangeGuard {
    pub fn for_project(project: &Project) -> Self {
        Self {
            on_hold: project.is_on_hold(),
            live: project.is_live(),
        }
    }

    /// Check a proposed change for single-item paths. `None` means the field
    /// is not being set.
    pub fn check(
        &self,
        task: &Task,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), ConstraintViolation> {
        if self.on_hold && (changes(task.start_date, start) || changes(task.end_date, end)) {
            return Err(ConstraintViolation::ProjectOnHold);
        }
        if self.restricts(task) {
            if later(task.start_date, start) {
                return Err(ConstraintViolation::StartDelayedAfterGoLive { task_id: task.id });
            }
            if later(task.end_date, end) {
                return Err(ConstraintViolation::EndExtendedAfterGoLive { task_id: task.id });
            }
        }
        Ok(())
    }

    /// Batch variant: a held project skips every entry, a delayed start skips
    /// the entry, and an extended end is capped at the current end.
    pub fn admit_batch(
        &self,
        task: &Task,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> BatchVerdict {
        if self.on_hold {
            return BatchVerdict::Skip(ConstraintViolation::ProjectOnHold);
        }
        if !self.restricts(task) {
            return BatchVerdict::Apply { start, end };
        }
        if later(task.start_date, start) {
            return BatchVerdict::Skip(ConstraintViolation::StartDelayedAfterGoLive {
                task_id: task.id,
            });
        }
        let end = if later(task.end_date, end) {
            task.end_date
        } else {
            end
        };
        BatchVerdict::Apply { start, end }
    }

    fn restricts(&self, task: &Task) -> bool {
        self.live && !task.is_exception
    }
}

fn changes(current: Option<NaiveDate>, proposed: Option<NaiveDate>) -> bool {
    proposed.is_some() && proposed != current
}

fn later(current: Option<NaiveDate>, proposed: Option<NaiveDate>) -> bool {
    matches!((current, proposed), (Some(current), Some(proposed)) if proposed > current)
}
