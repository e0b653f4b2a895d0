pub mod audit;
pub mod calendar;
pub mod cascade;
pub mod clock;
pub mod config;
pub mod deletion;
pub mod edit;
pub mod engine;
pub mod error;
pub mod exception;
pub mod exemption;
pub mod graph;
pub mod guard;
pub mod hold;
pub mod logging;
pub mod persistence;
pub mod project;
pub mod relation;
pub mod task;
pub mod task_validation;

pub use audit::{EditLogEntry, TaskField};
pub use calendar::WorkCalendar;
pub use cascade::{CascadeEngine, CascadeOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use deletion::DeletionReport;
pub use edit::BatchOutcome;
pub use engine::{HoldRelease, ScheduleEngine};
pub use error::{ConstraintViolation, ScheduleError, ScheduleResult};
pub use exception::NewException;
pub use exemption::{NewExemption, WorkdayExemption};
pub use persistence::{MemoryScheduleStore, ScheduleStore};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteScheduleStore;
pub use project::{GoLive, HoldState, Project, ProjectId};
pub use task::{BatchDateUpdate, NewTask, RelationType, Task, TaskId, TaskPatch, TaskUpdate};
