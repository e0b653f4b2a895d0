use crate::error::{ScheduleError, ScheduleResult};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    /// Removed tasks, in traversal order.
    pub deleted: Vec<TaskId>,
    /// Surviving tasks whose predecessor link was cleared, ascending.
    pub unlinked: Vec<TaskId>,
}

/// Remove one task. Tasks that pointed at it keep their dates but lose the link.
pub fn delete_single(tasks: &mut Vec<Task>, task_id: TaskId) -> ScheduleResult<DeletionReport> {
    if !tasks.iter().any(|t| t.id == task_id) {
        return Err(ScheduleError::task_not_found(task_id));
    }
    Ok(remove_set(tasks, vec![task_id]))
}

/// Remove a task and everything that transitively depends on it.
pub fn delete_chain(tasks: &mut Vec<Task>, root: TaskId) -> ScheduleResult<DeletionReport> {
    let graph = TaskGraph::build(tasks);
    if !graph.contains(root) {
        return Err(ScheduleError::task_not_found(root));
    }
    let doomed = graph.dependents_closure(root);
    Ok(remove_set(tasks, doomed))
}

fn remove_set(tasks: &mut Vec<Task>, doomed: Vec<TaskId>) -> DeletionReport {
    let gone: HashSet<TaskId> = doomed.iter().copied().collect();
    tasks.retain(|task| !gone.contains(&task.id));

    let mut unlinked = Vec::new();
    for task in tasks.iter_mut() {
        if task.predecessor_id.is_some_and(|pred| gone.contains(&pred)) {
            task.unlink();
            unlinked.push(task.id);
        }
    }
    unlinked.sort_unstable();

    DeletionReport {
        deleted: doomed,
        unlinked,
    }
}
