use crate::audit::EditLogEntry;
use crate::calendar::WorkCalendar;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::deletion::{self, DeletionReport};
use crate::edit::{self, BatchOutcome};
use crate::error::{ScheduleError, ScheduleResult};
use crate::exception::{self, NewException};
use crate::exemption::{ExemptionId, NewExemption, WorkdayExemption};
use crate::hold;
use crate::persistence::{
    ChangeSet, MemoryScheduleStore, ScheduleSnapshot, ScheduleStore, load_schedule_from_json,
    load_tasks_from_csv, save_schedule_to_csv, save_schedule_to_json,
};
use crate::project::{Project, ProjectId};
use crate::task::{BatchDateUpdate, NewTask, Task, TaskId, TaskPatch, TaskUpdate};
use crate::task_validation::validate_task;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// One mutex per project. Every operation holds its project's mutex from
/// the first read to the commit.
#[derive(Default)]
struct ProjectLocks {
    locks: Mutex<HashMap<ProjectId, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    fn handle(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(project_id).or_default().clone()
    }
}

/// Result of lifting a hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldRelease {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub hold_days: i64,
    pub in_progress: Option<TaskId>,
    pub shifted: Vec<TaskId>,
}

pub struct ScheduleEngine<S: ScheduleStore> {
    store: S,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: ProjectLocks,
    exemption_lock: Mutex<()>,
}

impl ScheduleEngine<MemoryScheduleStore> {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(MemoryScheduleStore::new(), clock, EngineConfig::default())
    }
}

#[cfg(feature = "sqlite")]
impl ScheduleEngine<crate::persistence::sqlite::SqliteScheduleStore> {
    /// Open the sqlite store named by the config, or an in-memory database.
    pub fn open(config: EngineConfig, clock: Arc<dyn Clock>) -> ScheduleResult<Self> {
        use crate::persistence::sqlite::SqliteScheduleStore;
        let store = match &config.database_path {
            Some(path) => SqliteScheduleStore::new(path)?,
            None => SqliteScheduleStore::in_memory()?,
        };
        Ok(Self::new(store, clock, config))
    }
}

/// Tasks in `after` that are new or differ from their `before` version.
fn changed_tasks(before: &[Task], after: &[Task]) -> Vec<Task> {
    let before: HashMap<TaskId, &Task> = before.iter().map(|t| (t.id, t)).collect();
    after
        .iter()
        .filter(|task| before.get(&task.id).is_none_or(|old| *old != *task))
        .cloned()
        .collect()
}

impl<S: ScheduleStore> ScheduleEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: ProjectLocks::default(),
            exemption_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn deadline(&self) -> Option<Instant> {
        self.config
            .cascade_timeout()
            .map(|timeout| Instant::now() + timeout)
    }

    /// Business-day calendar for one project. Exemptions are layered on
    /// only when the config asks for it.
    pub fn calendar(&self, project_id: ProjectId) -> ScheduleResult<WorkCalendar> {
        let calendar = self.config.base_calendar();
        if !self.config.honor_workday_exemptions {
            return Ok(calendar);
        }
        let exemptions: Vec<WorkdayExemption> = self
            .store
            .exemptions()?
            .into_iter()
            .filter(|e| e.project_id.is_none_or(|pid| pid == project_id))
            .collect();
        Ok(calendar.with_exemptions(&exemptions))
    }

    fn load_project(&self, project_id: ProjectId) -> ScheduleResult<Project> {
        self.store
            .load_project(project_id)?
            .ok_or_else(|| ScheduleError::project_not_found(project_id))
    }

    fn load(&self, project_id: ProjectId) -> ScheduleResult<(Project, Vec<Task>)> {
        let project = self.load_project(project_id)?;
        let tasks = self.store.load_tasks(project_id)?;
        Ok((project, tasks))
    }

    /// Sync project dates, collect changed tasks and hand everything to the
    /// store as one change set.
    fn commit(
        &self,
        mut project: Project,
        project_dirty: bool,
        before: &[Task],
        after: &[Task],
        mut changes: ChangeSet,
    ) -> ScheduleResult<Project> {
        let synced = project.sync_dates_from_schedule(after);
        if project_dirty || synced {
            changes.project = Some(project.clone());
        }
        changes.upserts.extend(changed_tasks(before, after));
        if !changes.is_empty() {
            self.store.commit(changes)?;
        }
        Ok(project)
    }

    // Projects

    /// Store the collaborator record the engine reads. Re-registering an
    /// existing id updates its descriptive fields only: the hold is kept, and
    /// go-live is applied as a request so it can latch but never revert.
    pub fn register_project(&self, mut project: Project) -> ScheduleResult<Project> {
        let project_id = project.id;
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let before = self.store.load_tasks(project_id)?;
        let mut tasks = before.clone();

        let went_live = match self.store.load_project(project_id)? {
            Some(stored) => {
                let requested = project.is_live();
                project.adopt_lifecycle(&stored);
                project.request_go_live(requested)
            }
            None => false,
        };
        if went_live {
            for task in &mut tasks {
                task.snapshot_baseline();
            }
        }

        let project = self.commit(project, true, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(project_id, went_live, "project registered");
        Ok(project)
    }

    pub fn project(&self, project_id: ProjectId) -> ScheduleResult<Project> {
        self.load_project(project_id)
    }

    /// Request a go-live value. Only `false -> true` has an effect; it
    /// snapshots every task's dates into its baseline.
    pub fn set_go_live(&self, project_id: ProjectId, go_live: bool) -> ScheduleResult<Project> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (mut project, before) = self.load(project_id)?;
        let mut tasks = before.clone();

        let went_live = project.request_go_live(go_live);
        if went_live {
            for task in &mut tasks {
                task.snapshot_baseline();
            }
        }

        let project = self.commit(
            project,
            went_live,
            &before,
            &tasks,
            ChangeSet::new(project_id),
        )?;
        if went_live {
            tracing::info!(project_id, baselines = tasks.len(), "project went live");
        } else if !go_live && project.is_live() {
            tracing::debug!(project_id, "ignoring request to leave go-live");
        }
        Ok(project)
    }

    pub fn set_dates_from_schedule(
        &self,
        project_id: ProjectId,
        enabled: bool,
    ) -> ScheduleResult<Project> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (mut project, tasks) = self.load(project_id)?;
        project.dates_from_schedule = enabled;
        self.commit(project, true, &tasks, &tasks, ChangeSet::new(project_id))
    }

    // Tasks

    pub fn list_tasks(&self, project_id: ProjectId) -> ScheduleResult<Vec<Task>> {
        let (_, tasks) = self.load(project_id)?;
        Ok(tasks)
    }

    pub fn task(&self, project_id: ProjectId, task_id: TaskId) -> ScheduleResult<Task> {
        self.list_tasks(project_id)?
            .into_iter()
            .find(|task| task.id == task_id)
            .ok_or_else(|| ScheduleError::task_not_found(task_id))
    }

    pub fn create_task(&self, project_id: ProjectId, new_task: NewTask) -> ScheduleResult<Task> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;

        let mut probe = new_task.clone().into_task(0, project_id);
        probe.predecessor_id = None;
        validate_task(&probe).map_err(|err| ScheduleError::validation(err.to_string()))?;
        if let Some(pred) = new_task.predecessor_id {
            edit::ensure_predecessor(&before, 0, Some(pred))?;
        }

        let id = self.reserve_one()?;
        let mut task = new_task.into_task(id, project_id);
        if project.is_live() {
            task.snapshot_baseline();
        }

        let mut tasks = before.clone();
        tasks.push(task.clone());
        self.commit(project, false, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(project_id, task_id = id, "task created");
        Ok(task)
    }

    fn reserve_one(&self) -> ScheduleResult<TaskId> {
        self.store
            .reserve_task_ids(1)?
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::validation("store returned no task id"))
    }

    /// Batch creation. `pred_index` refers to a position in `entries`; ids
    /// are assigned to every entry before links are wired. Indexes that are
    /// out of range or point at the entry itself are ignored.
    pub fn create_tasks(
        &self,
        project_id: ProjectId,
        entries: Vec<NewTask>,
    ) -> ScheduleResult<Vec<Task>> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.store.reserve_task_ids(entries.len())?;
        if ids.len() != entries.len() {
            return Err(ScheduleError::validation(format!(
                "store reserved {} ids for {} tasks",
                ids.len(),
                entries.len()
            )));
        }

        let mut created = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            let pred_index = entry.pred_index;
            tracing::debug!(
                project_id,
                index = idx,
                name = %entry.name,
                ?pred_index,
                rel_type = %entry.rel_type,
                lag_days = entry.lag_days,
                "batch entry"
            );
            let mut task = entry.into_task(ids[idx], project_id);
            task.predecessor_id = None;
            if project.is_live() {
                task.snapshot_baseline();
            }
            match pred_index {
                Some(pi) if pi < ids.len() && pi != idx => {
                    task.predecessor_id = Some(ids[pi]);
                    tracing::debug!(
                        project_id,
                        index = idx,
                        task_id = task.id,
                        predecessor_id = ids[pi],
                        "wired predecessor from batch index {pi}"
                    );
                }
                Some(pi) => {
                    tracing::debug!(project_id, index = idx, pred_index = pi, "ignoring batch index");
                }
                None => {}
            }
            validate_task(&task).map_err(|err| ScheduleError::validation(err.to_string()))?;
            created.push(task);
        }

        let mut tasks = before.clone();
        tasks.extend(created.iter().cloned());
        self.commit(project, false, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(
            project_id,
            created = created.len(),
            links = created.iter().filter(|t| t.predecessor_id.is_some()).count(),
            "batch created"
        );
        Ok(created)
    }

    /// Unaudited single-task update. No cascade.
    pub fn update_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        update: TaskUpdate,
    ) -> ScheduleResult<Task> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        let mut tasks = before.clone();

        let task = edit::update_task(&project, &mut tasks, task_id, &update)?;
        self.commit(project, false, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(project_id, task_id, "task updated");
        Ok(task)
    }

    pub fn batch_update(
        &self,
        project_id: ProjectId,
        updates: &[BatchDateUpdate],
    ) -> ScheduleResult<BatchOutcome> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        let mut tasks = before.clone();

        let outcome = edit::batch_update(&project, &mut tasks, updates);
        self.commit(project, false, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(
            project_id,
            requested = updates.len(),
            updated = outcome.updated.len(),
            skipped = outcome.skipped.len(),
            "batch update applied"
        );
        Ok(outcome)
    }

    /// Audited edit followed by a cascade. Returns the full task list.
    pub fn reasoned_edit(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        patch: &TaskPatch,
        reason: &str,
        edited_by: &str,
    ) -> ScheduleResult<Vec<Task>> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        let calendar = self.calendar(project_id)?;
        let mut tasks = before.clone();

        let outcome = edit::reasoned_edit(
            &project,
            &mut tasks,
            task_id,
            patch,
            reason,
            edited_by,
            &calendar,
            self.deadline(),
            self.clock.now(),
        )?;

        let mut changes = ChangeSet::new(project_id);
        changes.log_entries = outcome.log_entries;
        self.commit(project, false, &before, &tasks, changes)?;
        tracing::info!(
            project_id,
            task_id,
            fields = outcome.changes.len(),
            cascaded = outcome.cascade.changed.len(),
            passes = outcome.cascade.passes,
            "reasoned edit committed"
        );
        Ok(tasks)
    }

    /// Splice an exception in after its target task and cascade.
    pub fn add_exception(
        &self,
        project_id: ProjectId,
        request: NewException,
    ) -> ScheduleResult<Vec<Task>> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        let request = request.validate()?;
        exception::target_index(&before, request.target_id)?;
        let calendar = self.calendar(project_id)?;

        let exception_id = self.reserve_one()?;
        let mut tasks = before.clone();
        let outcome = exception::splice_exception(
            &mut tasks,
            project_id,
            exception_id,
            &request,
            &calendar,
            self.deadline(),
            self.clock.now(),
        )?;

        let mut changes = ChangeSet::new(project_id);
        changes.log_entries.push(outcome.log_entry);
        self.commit(project, false, &before, &tasks, changes)?;
        tracing::info!(
            project_id,
            target_id = request.target_id,
            exception_id,
            rewired = outcome.rewired.len(),
            cascaded = outcome.cascade.changed.len(),
            "exception spliced"
        );
        Ok(tasks)
    }

    pub fn delete_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> ScheduleResult<DeletionReport> {
        self.delete_with(project_id, task_id, deletion::delete_single)
    }

    /// Delete a task and all of its transitive dependents.
    pub fn delete_chain(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> ScheduleResult<DeletionReport> {
        self.delete_with(project_id, task_id, deletion::delete_chain)
    }

    fn delete_with<F>(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        delete: F,
    ) -> ScheduleResult<DeletionReport>
    where
        F: FnOnce(&mut Vec<Task>, TaskId) -> ScheduleResult<DeletionReport>,
    {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        let mut tasks = before.clone();

        let report = delete(&mut tasks, task_id)?;
        let mut changes = ChangeSet::new(project_id);
        changes.deletes = report.deleted.clone();
        self.commit(project, false, &before, &tasks, changes)?;
        tracing::info!(
            project_id,
            root = task_id,
            deleted = report.deleted.len(),
            unlinked = report.unlinked.len(),
            "tasks deleted"
        );
        Ok(report)
    }

    // Hold / release

    pub fn hold(&self, project_id: ProjectId) -> ScheduleResult<Project> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (mut project, tasks) = self.load(project_id)?;
        let today = self.clock.today();
        hold::place_on_hold(&mut project, today)?;
        let project = self.commit(project, true, &tasks, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(project_id, %today, "project on hold");
        Ok(project)
    }

    pub fn release(&self, project_id: ProjectId, edited_by: &str) -> ScheduleResult<HoldRelease> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (mut project, before) = self.load(project_id)?;
        let calendar = self.calendar(project_id)?;
        let mut tasks = before.clone();

        let outcome = hold::release_hold(
            &mut project,
            &mut tasks,
            &calendar,
            self.clock.now(),
            edited_by,
        )?;

        let mut changes = ChangeSet::new(project_id);
        changes.log_entries.push(outcome.log_entry);
        let project = self.commit(project, true, &before, &tasks, changes)?;
        tracing::info!(
            project_id,
            hold_days = outcome.hold_days,
            in_progress = ?outcome.in_progress,
            shifted = outcome.shifted.len(),
            "hold released"
        );
        Ok(HoldRelease {
            project,
            tasks,
            hold_days: outcome.hold_days,
            in_progress: outcome.in_progress,
            shifted: outcome.shifted,
        })
    }

    /// Audit entries of a project, newest first.
    pub fn edit_log(&self, project_id: ProjectId) -> ScheduleResult<Vec<EditLogEntry>> {
        self.load_project(project_id)?;
        Ok(self.store.edit_log(project_id)?)
    }

    // Workday exemptions

    pub fn add_global_exemption(&self, exemption: NewExemption) -> ScheduleResult<WorkdayExemption> {
        self.add_exemption(None, exemption)
    }

    pub fn add_project_exemption(
        &self,
        project_id: ProjectId,
        exemption: NewExemption,
    ) -> ScheduleResult<WorkdayExemption> {
        self.load_project(project_id)?;
        self.add_exemption(Some(project_id), exemption)
    }

    fn add_exemption(
        &self,
        project_id: Option<ProjectId>,
        exemption: NewExemption,
    ) -> ScheduleResult<WorkdayExemption> {
        let Some(date) = exemption.date else {
            return Err(ScheduleError::validation("exemption date is required"));
        };
        let _guard = self.exemption_lock.lock();
        let duplicate = self
            .store
            .exemptions()?
            .iter()
            .any(|e| e.project_id == project_id && e.date == date);
        if duplicate {
            return Err(ScheduleError::validation(format!(
                "an exemption already exists for {date}"
            )));
        }
        let stored = self.store.insert_exemption(WorkdayExemption {
            id: 0,
            project_id,
            date,
            description: exemption.description,
            recurring: exemption.recurring,
            created_by: exemption.created_by,
        })?;
        tracing::info!(exemption_id = stored.id, ?project_id, %date, "exemption added");
        Ok(stored)
    }

    /// A project's own exemptions plus the global ones, by date.
    pub fn project_exemptions(&self, project_id: ProjectId) -> ScheduleResult<Vec<WorkdayExemption>> {
        self.load_project(project_id)?;
        Ok(self
            .store
            .exemptions()?
            .into_iter()
            .filter(|e| e.project_id.is_none_or(|pid| pid == project_id))
            .collect())
    }

    pub fn all_exemptions(&self) -> ScheduleResult<Vec<WorkdayExemption>> {
        Ok(self.store.exemptions()?)
    }

    pub fn delete_exemption(&self, exemption_id: ExemptionId) -> ScheduleResult<()> {
        let _guard = self.exemption_lock.lock();
        if !self.store.delete_exemption(exemption_id)? {
            return Err(ScheduleError::exemption_not_found(exemption_id));
        }
        tracing::info!(exemption_id, "exemption deleted");
        Ok(())
    }

    // Snapshots

    pub fn export_snapshot(&self, project_id: ProjectId) -> ScheduleResult<ScheduleSnapshot> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, tasks) = self.load(project_id)?;
        Ok(ScheduleSnapshot::new(project, tasks)?)
    }

    pub fn export_json<P: AsRef<Path>>(&self, project_id: ProjectId, path: P) -> ScheduleResult<()> {
        let snapshot = self.export_snapshot(project_id)?;
        save_schedule_to_json(&snapshot, path)?;
        Ok(())
    }

    pub fn export_csv<P: AsRef<Path>>(&self, project_id: ProjectId, path: P) -> ScheduleResult<()> {
        let snapshot = self.export_snapshot(project_id)?;
        save_schedule_to_csv(&snapshot, path)?;
        Ok(())
    }

    /// Append tasks from another schedule. Every task gets a fresh id and
    /// links between imported tasks are remapped; links that leave the
    /// imported set are dropped. Dates, baselines and exception flags are
    /// kept as they are.
    pub fn import_tasks(&self, project_id: ProjectId, imported: Vec<Task>) -> ScheduleResult<Vec<Task>> {
        let lock = self.locks.handle(project_id);
        let _guard = lock.lock();
        let (project, before) = self.load(project_id)?;
        if imported.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.store.reserve_task_ids(imported.len())?;
        let remap: HashMap<TaskId, TaskId> = imported
            .iter()
            .zip(ids.iter())
            .map(|(task, &new_id)| (task.id, new_id))
            .collect();

        let mut created = Vec::with_capacity(imported.len());
        for (mut task, &new_id) in imported.into_iter().zip(ids.iter()) {
            task.id = new_id;
            task.project_id = project_id;
            match task.predecessor_id.and_then(|pred| remap.get(&pred).copied()) {
                Some(pred) if pred != new_id => task.predecessor_id = Some(pred),
                _ => task.unlink(),
            }
            validate_task(&task).map_err(|err| ScheduleError::validation(err.to_string()))?;
            created.push(task);
        }

        let mut tasks = before.clone();
        tasks.extend(created.iter().cloned());
        self.commit(project, false, &before, &tasks, ChangeSet::new(project_id))?;
        tracing::info!(project_id, imported = created.len(), "tasks imported");
        Ok(created)
    }

    pub fn import_json<P: AsRef<Path>>(&self, project_id: ProjectId, path: P) -> ScheduleResult<Vec<Task>> {
        let snapshot = load_schedule_from_json(path)?;
        self.import_tasks(project_id, snapshot.tasks)
    }

    pub fn import_csv<P: AsRef<Path>>(&self, project_id: ProjectId, path: P) -> ScheduleResult<Vec<Task>> {
        let tasks = load_tasks_from_csv(path)?;
        self.import_tasks(project_id, tasks)
    }
}
