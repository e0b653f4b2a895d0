use crate::project::ProjectId;
use crate::task::TaskId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EditLogId = i64;

/// Field named by an audit entry. `Exception` and `HoldRelease` describe
/// structural events rather than a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    Name,
    StartDate,
    EndDate,
    Progress,
    Contractor,
    Trade,
    PredecessorId,
    RelType,
    LagDays,
    Exception,
    #[serde(rename = "on_hold_release")]
    HoldRelease,
}

impl TaskField {
    pub const ALL: [TaskField; 11] = [
        TaskField::Name,
        TaskField::StartDate,
        TaskField::EndDate,
        TaskField::Progress,
        TaskField::Contractor,
        TaskField::Trade,
        TaskField::PredecessorId,
        TaskField::RelType,
        TaskField::LagDays,
        TaskField::Exception,
        TaskField::HoldRelease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskField::Name => "name",
            TaskField::StartDate => "start_date",
            TaskField::EndDate => "end_date",
            TaskField::Progress => "progress",
            TaskField::Contractor => "contractor",
            TaskField::Trade => "trade",
            TaskField::PredecessorId => "predecessor_id",
            TaskField::RelType => "rel_type",
            TaskField::LagDays => "lag_days",
            TaskField::Exception => "exception",
            TaskField::HoldRelease => "on_hold_release",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TaskField::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| format!("unknown audit field '{value}'"))
    }
}

/// One field-level change, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: TaskField,
    pub old_value: String,
    pub new_value: String,
}

/// Audit record before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEditLogEntry {
    /// `None` for project-level entries such as a release with no task in progress.
    pub task_id: Option<TaskId>,
    pub project_id: ProjectId,
    pub task_name: String,
    pub field: TaskField,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub edited_by: String,
    pub edited_at: NaiveDateTime,
}

impl NewEditLogEntry {
    pub fn from_change(
        task_id: TaskId,
        project_id: ProjectId,
        task_name: &str,
        change: FieldChange,
        reason: &str,
        edited_by: &str,
        edited_at: NaiveDateTime,
    ) -> Self {
        Self {
            task_id: Some(task_id),
            project_id,
            task_name: task_name.to_string(),
            field: change.field,
            old_value: change.old_value,
            new_value: change.new_value,
            reason: reason.to_string(),
            edited_by: edited_by.to_string(),
            edited_at,
        }
    }
}

/// Immutable audit record. Removed only together with its task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLogEntry {
    pub id: EditLogId,
    pub task_id: Option<TaskId>,
    pub project_id: ProjectId,
    pub task_name: String,
    pub field: TaskField,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub edited_by: String,
    pub edited_at: NaiveDateTime,
}

impl EditLogEntry {
    pub fn from_new(id: EditLogId, entry: NewEditLogEntry) -> Self {
        Self {
            id,
            task_id: entry.task_id,
            project_id: entry.project_id,
            task_name: entry.task_name,
            field: entry.field,
            old_value: entry.old_value,
            new_value: entry.new_value,
            reason: entry.reason,
            edited_by: entry.edited_by,
            edited_at: entry.edited_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_parse_back() {
        for field in TaskField::ALL {
            assert_eq!(field.as_str().parse::<TaskField>(), Ok(field));
        }
        assert!("duration".parse::<TaskField>().is_err());
    }

    #[test]
    fn serde_uses_the_same_names_as_display() {
        for field in TaskField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
    }
}
