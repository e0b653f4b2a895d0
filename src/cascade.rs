use crate::calendar::WorkCalendar;
use crate::error::{ScheduleError, ScheduleResult};
use crate::graph::TaskGraph;
use crate::relation::resolve_start;
use crate::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub passes: usize,
    /// Ids whose dates moved, ascending.
    pub changed: Vec<TaskId>,
    /// `false` when the pass bound was reached while tasks were still moving,
    /// which only happens on a cyclic predecessor graph.
    pub converged: bool,
}

/// Bounded relaxation of start dates over one project's predecessor links.
///
/// Every pass walks all tasks in order, recomputing each linked task's start
/// from its predecessor and shifting its end so the business-day duration is
/// kept. Updates are visible to later tasks in the same pass, so link order
/// does not matter. Iteration stops after a pass with no change or after
/// `tasks.len() + 1` passes.
pub struct CascadeEngine<'a> {
    calendar: &'a WorkCalendar,
    pinned: Option<TaskId>,
    deadline: Option<Instant>,
}

impl<'a> CascadeEngine<'a> {
    pub fn new(calendar: &'a WorkCalendar) -> Self {
        Self {
            calendar,
            pinned: None,
            deadline: None,
        }
    }

    /// Never overwrite `task_id`, even if it has a predecessor.
    pub fn pinning(mut self, task_id: TaskId) -> Self {
        self.pinned = Some(task_id);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn max_passes(task_count: usize) -> usize {
        task_count + 1
    }

    pub fn execute(&self, tasks: &mut [Task]) -> ScheduleResult<CascadeOutcome> {
        let index: HashMap<TaskId, usize> = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| (task.id, idx))
            .collect();
        let max_passes = Self::max_passes(tasks.len());

        let mut changed_ids = BTreeSet::new();
        let mut passes = 0;
        let mut converged = false;

        while passes < max_passes {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(ScheduleError::DeadlineExceeded { passes });
                }
            }
            passes += 1;

            let mut changed = false;
            for idx in 0..tasks.len() {
                if Some(tasks[idx].id) == self.pinned {
                    continue;
                }
                let Some(pred_id) = tasks[idx].predecessor_id else {
                    continue;
                };
                let Some(&pred_idx) = index.get(&pred_id) else {
                    continue;
                };
                if pred_idx == idx {
                    continue;
                }
                let Some(new_start) = resolve_start(
                    self.calendar,
                    &tasks[pred_idx],
                    tasks[idx].rel_type,
                    tasks[idx].lag_days,
                )?
                else {
                    continue;
                };

                let task = &mut tasks[idx];
                if task.start_date == Some(new_start) {
                    continue;
                }
                let duration = self.calendar.workday_count(task.start_date, task.end_date);
                let new_end = self
                    .calendar
                    .end_from_workdays(new_start, duration)
                    .ok_or_else(|| ScheduleError::date_out_of_range(task.id))?;
                task.start_date = Some(new_start);
                task.end_date = Some(new_end);
                changed_ids.insert(task.id);
                changed = true;
            }

            if !changed {
                converged = true;
                break;
            }
        }

        if !converged {
            let cyclic = TaskGraph::build(tasks).has_cycle();
            tracing::warn!(
                passes,
                task_count = tasks.len(),
                cyclic,
                "cascade reached its pass bound without converging"
            );
        }

        Ok(CascadeOutcome {
            passes,
            changed: changed_ids.into_iter().collect(),
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RelationType;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(id: TaskId, start: NaiveDate, end: NaiveDate) -> Task {
        Task::new(id, 1, format!("T{id}")).with_dates(start, end)
    }

    #[test]
    fn forward_reference_resolves_within_bound() {
        let cal = WorkCalendar::default();
        // Task 1 depends on task 3, which depends on task 2.
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 3)).with_predecessor(3, RelationType::FinishToStart, 0),
            task(2, d(2025, 3, 3), d(2025, 3, 4)),
            task(3, d(2025, 3, 3), d(2025, 3, 3)).with_predecessor(2, RelationType::FinishToStart, 0),
        ];
        let outcome = CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.changed, vec![1, 3]);
        assert_eq!(tasks[2].start_date, Some(d(2025, 3, 5)));
        assert_eq!(tasks[0].start_date, Some(d(2025, 3, 6)));
    }

    #[test]
    fn duration_is_preserved_across_weekend() {
        let cal = WorkCalendar::default();
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 6)),
            // three workdays Mon-Wed
            task(2, d(2025, 3, 3), d(2025, 3, 5)).with_predecessor(1, RelationType::FinishToStart, 0),
        ];
        CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        // Fri, Mon, Tue
        assert_eq!(tasks[1].start_date, Some(d(2025, 3, 7)));
        assert_eq!(tasks[1].end_date, Some(d(2025, 3, 11)));
    }

    #[test]
    fn pinned_task_is_not_overwritten() {
        let cal = WorkCalendar::default();
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 4)),
            task(2, d(2025, 3, 12), d(2025, 3, 13)).with_predecessor(1, RelationType::FinishToStart, 0),
            task(3, d(2025, 3, 3), d(2025, 3, 3)).with_predecessor(2, RelationType::FinishToStart, 0),
        ];
        let outcome = CascadeEngine::new(&cal)
            .pinning(2)
            .execute(&mut tasks)
            .unwrap();
        assert_eq!(tasks[1].start_date, Some(d(2025, 3, 12)));
        assert_eq!(tasks[2].start_date, Some(d(2025, 3, 14)));
        assert_eq!(outcome.changed, vec![3]);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let cal = WorkCalendar::default();
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 7)),
            task(2, d(2025, 3, 3), d(2025, 3, 4)).with_predecessor(1, RelationType::StartToStart, 2),
            task(3, d(2025, 3, 3), d(2025, 3, 4)).with_predecessor(2, RelationType::FinishToStart, 1),
        ];
        let first = CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        assert!(!first.changed.is_empty());
        let snapshot = tasks.clone();
        let second = CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        assert!(second.changed.is_empty());
        assert_eq!(second.passes, 1);
        assert_eq!(tasks, snapshot);
    }

    #[test]
    fn cycle_stops_at_pass_bound() {
        let cal = WorkCalendar::default();
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 3)).with_predecessor(2, RelationType::FinishToStart, 0),
            task(2, d(2025, 3, 3), d(2025, 3, 3)).with_predecessor(1, RelationType::FinishToStart, 0),
        ];
        let outcome = CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.passes, CascadeEngine::max_passes(2));
    }

    #[test]
    fn dangling_predecessor_is_ignored() {
        let cal = WorkCalendar::default();
        let mut tasks =
            vec![task(1, d(2025, 3, 3), d(2025, 3, 4)).with_predecessor(99, RelationType::FinishToStart, 0)];
        let outcome = CascadeEngine::new(&cal).execute(&mut tasks).unwrap();
        assert!(outcome.converged);
        assert!(outcome.changed.is_empty());
    }

    #[test]
    fn expired_deadline_aborts_before_mutating() {
        let cal = WorkCalendar::default();
        let mut tasks = vec![
            task(1, d(2025, 3, 3), d(2025, 3, 7)),
            task(2, d(2025, 3, 3), d(2025, 3, 4)).with_predecessor(1, RelationType::FinishToStart, 0),
        ];
        let snapshot = tasks.clone();
        let past = Instant::now() - Duration::from_millis(5);
        let err = CascadeEngine::new(&cal)
            .with_deadline(Some(past))
            .execute(&mut tasks)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DeadlineExceeded { passes: 0 }));
        assert_eq!(tasks, snapshot);
    }

    #[test]
    fn successor_past_the_calendar_end_is_a_validation_error() {
        let cal = WorkCalendar::default();
        let last = NaiveDate::MAX;
        let mut tasks = vec![
            task(1, last, last),
            task(2, d(2025, 3, 3), d(2025, 3, 4)).with_predecessor(1, RelationType::FinishToStart, 0),
        ];
        let err = CascadeEngine::new(&cal).execute(&mut tasks).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
    }
}
