use crate::audit::{EditLogEntry, NewEditLogEntry};
use crate::exemption::{ExemptionId, WorkdayExemption};
use crate::project::{Project, ProjectId};
use crate::task::{Task, TaskId};
use crate::task_validation;
use serde_json::Error as SerdeJsonError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(Box::new(value))
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Every write of one engine operation. A store applies a change set as a
/// unit: either all of it is visible afterwards or none of it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub project_id: ProjectId,
    pub project: Option<Project>,
    pub upserts: Vec<Task>,
    /// Deleted tasks; their edit-log entries go with them.
    pub deletes: Vec<TaskId>,
    pub log_entries: Vec<NewEditLogEntry>,
}

impl ChangeSet {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.upserts.is_empty()
            && self.deletes.is_empty()
            && self.log_entries.is_empty()
    }
}

/// Storage for projects, their tasks, audit entries and workday exemptions.
pub trait ScheduleStore: Send + Sync {
    /// Insert or replace a project record.
    fn save_project(&self, project: &Project) -> PersistenceResult<()>;
    fn load_project(&self, project_id: ProjectId) -> PersistenceResult<Option<Project>>;
    /// Tasks of one project, ordered by id.
    fn load_tasks(&self, project_id: ProjectId) -> PersistenceResult<Vec<Task>>;
    /// Hand out `count` fresh task ids. Ids are never reused, even when the
    /// change set they were meant for is never committed.
    fn reserve_task_ids(&self, count: usize) -> PersistenceResult<Vec<TaskId>>;
    fn commit(&self, changes: ChangeSet) -> PersistenceResult<()>;
    /// Audit entries of one project, newest first.
    fn edit_log(&self, project_id: ProjectId) -> PersistenceResult<Vec<EditLogEntry>>;
    /// Store an exemption, assigning its id. The incoming `id` is ignored.
    fn insert_exemption(&self, exemption: WorkdayExemption) -> PersistenceResult<WorkdayExemption>;
    /// All exemptions, ordered by date then id.
    fn exemptions(&self) -> PersistenceResult<Vec<WorkdayExemption>>;
    fn delete_exemption(&self, exemption_id: ExemptionId) -> PersistenceResult<bool>;
}

pub fn validate_tasks(tasks: &[Task]) -> PersistenceResult<()> {
    task_validation::validate_task_collection(tasks)
        .map_err(|err| PersistenceError::InvalidData(err.to_string()))
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    ScheduleSnapshot, load_schedule_from_json, load_tasks_from_csv, save_schedule_to_csv,
    save_schedule_to_json,
};
pub use memory::MemoryScheduleStore;
