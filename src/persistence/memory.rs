use super::{ChangeSet, PersistenceResult, ScheduleStore};
use crate::audit::{EditLogEntry, EditLogId};
use crate::exemption::{ExemptionId, WorkdayExemption};
use crate::project::{Project, ProjectId};
use crate::task::{Task, TaskId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug)]
struct MemoryState {
    projects: BTreeMap<ProjectId, Project>,
    tasks: BTreeMap<TaskId, Task>,
    edit_log: Vec<EditLogEntry>,
    exemptions: BTreeMap<ExemptionId, WorkdayExemption>,
    next_task_id: TaskId,
    next_log_id: EditLogId,
    next_exemption_id: ExemptionId,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            projects: BTreeMap::new(),
            tasks: BTreeMap::new(),
            edit_log: Vec::new(),
            exemptions: BTreeMap::new(),
            next_task_id: 1,
            next_log_id: 1,
            next_exemption_id: 1,
        }
    }
}

/// Process-local store. Each commit is applied under one write lock.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    state: RwLock<MemoryState>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn save_project(&self, project: &Project) -> PersistenceResult<()> {
        self.state
            .write()
            .projects
            .insert(project.id, project.clone());
        Ok(())
    }

    fn load_project(&self, project_id: ProjectId) -> PersistenceResult<Option<Project>> {
        Ok(self.state.read().projects.get(&project_id).cloned())
    }

    fn load_tasks(&self, project_id: ProjectId) -> PersistenceResult<Vec<Task>> {
        let state = self.state.read();
        Ok(state
            .tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect())
    }

    fn reserve_task_ids(&self, count: usize) -> PersistenceResult<Vec<TaskId>> {
        let mut state = self.state.write();
        let first = state.next_task_id;
        state.next_task_id += count as TaskId;
        Ok((first..first + count as TaskId).collect())
    }

    fn commit(&self, changes: ChangeSet) -> PersistenceResult<()> {
        let mut state = self.state.write();

        if let Some(project) = changes.project {
            state.projects.insert(project.id, project);
        }

        if !changes.deletes.is_empty() {
            let deleted: HashSet<TaskId> = changes.deletes.iter().copied().collect();
            state.tasks.retain(|id, _| !deleted.contains(id));
            state
                .edit_log
                .retain(|entry| entry.task_id.is_none_or(|id| !deleted.contains(&id)));
        }

        for task in changes.upserts {
            if task.id >= state.next_task_id {
                state.next_task_id = task.id + 1;
            }
            state.tasks.insert(task.id, task);
        }

        for entry in changes.log_entries {
            let id = state.next_log_id;
            state.next_log_id += 1;
            state.edit_log.push(EditLogEntry::from_new(id, entry));
        }

        Ok(())
    }

    fn edit_log(&self, project_id: ProjectId) -> PersistenceResult<Vec<EditLogEntry>> {
        let state = self.state.read();
        Ok(state
            .edit_log
            .iter()
            .rev()
            .filter(|entry| entry.project_id == project_id)
            .cloned()
            .collect())
    }

    fn insert_exemption(&self, mut exemption: WorkdayExemption) -> PersistenceResult<WorkdayExemption> {
        let mut state = self.state.write();
        exemption.id = state.next_exemption_id;
        state.next_exemption_id += 1;
        state.exemptions.insert(exemption.id, exemption.clone());
        Ok(exemption)
    }

    fn exemptions(&self) -> PersistenceResult<Vec<WorkdayExemption>> {
        let state = self.state.read();
        let mut all: Vec<WorkdayExemption> = state.exemptions.values().cloned().collect();
        all.sort_by_key(|e| (e.date, e.id));
        Ok(all)
    }

    fn delete_exemption(&self, exemption_id: ExemptionId) -> PersistenceResult<bool> {
        Ok(self
            .state
            .write()
            .exemptions
            .remove(&exemption_id)
            .is_some())
    }
}
