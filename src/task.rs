use crate::project::ProjectId;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TaskId = i64;

/// How a task's start date is derived from its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    /// Finish-to-start: begin the business day after the predecessor ends.
    #[default]
    #[serde(rename = "FS")]
    FinishToStart,
    /// Start-to-start: begin with the predecessor.
    #[serde(rename = "SS")]
    StartToStart,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::FinishToStart => "FS",
            RelationType::StartToStart => "SS",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FS" | "" => Ok(RelationType::FinishToStart),
            "SS" => Ok(RelationType::StartToStart),
            other => Err(format!("unknown relation type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub baseline_start: Option<NaiveDate>,
    #[serde(default)]
    pub baseline_end: Option<NaiveDate>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub contractor: String,
    #[serde(default)]
    pub trade: String,
    /// Weak reference to another task of the same project. A reference that
    /// does not resolve is treated as no predecessor.
    #[serde(default)]
    pub predecessor_id: Option<TaskId>,
    #[serde(default)]
    pub rel_type: RelationType,
    #[serde(default)]
    pub lag_days: i64,
    #[serde(default)]
    pub is_exception: bool,
    #[serde(default)]
    pub exception_description: String,
}

impl Task {
    pub fn new(id: TaskId, project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            project_id,
            name: name.into(),
            start_date: None,
            end_date: None,
            baseline_start: None,
            baseline_end: None,
            progress: 0,
            contractor: String::new(),
            trade: String::new(),
            predecessor_id: None,
            rel_type: RelationType::FinishToStart,
            lag_days: 0,
            is_exception: false,
            exception_description: String::new(),
        }
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_predecessor(mut self, predecessor_id: TaskId, rel_type: RelationType, lag_days: i64) -> Self {
        self.predecessor_id = Some(predecessor_id);
        self.rel_type = rel_type;
        self.lag_days = lag_days;
        self
    }

    /// Drop the predecessor link, resetting the relation to FS with no lag.
    /// Dates are left as they are.
    pub fn unlink(&mut self) {
        self.predecessor_id = None;
        self.rel_type = RelationType::FinishToStart;
        self.lag_days = 0;
    }

    pub fn snapshot_baseline(&mut self) {
        self.baseline_start = self.start_date;
        self.baseline_end = self.end_date;
    }
}

/// Input for task creation. In batch creation `pred_index` refers to another
/// entry of the same batch and `predecessor_id` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub contractor: String,
    #[serde(default)]
    pub trade: String,
    #[serde(default)]
    pub predecessor_id: Option<TaskId>,
    #[serde(default)]
    pub pred_index: Option<usize>,
    #[serde(default)]
    pub rel_type: RelationType,
    #[serde(default)]
    pub lag_days: i64,
}

impl NewTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn dated(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn after_index(mut self, index: usize, rel_type: RelationType, lag_days: i64) -> Self {
        self.pred_index = Some(index);
        self.rel_type = rel_type;
        self.lag_days = lag_days;
        self
    }

    pub fn after_task(mut self, predecessor_id: TaskId, rel_type: RelationType, lag_days: i64) -> Self {
        self.predecessor_id = Some(predecessor_id);
        self.rel_type = rel_type;
        self.lag_days = lag_days;
        self
    }

    pub(crate) fn into_task(self, id: TaskId, project_id: ProjectId) -> Task {
        Task {
            id,
            project_id,
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
            baseline_start: None,
            baseline_end: None,
            progress: self.progress,
            contractor: self.contractor,
            trade: self.trade,
            predecessor_id: self.predecessor_id,
            rel_type: self.rel_type,
            lag_days: self.lag_days,
            is_exception: false,
            exception_description: String::new(),
        }
    }
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Fields a reasoned edit may change. `None` leaves a field untouched;
/// `predecessor_id: Some(None)` clears the link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contractor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub predecessor_id: Option<Option<TaskId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lag_days: Option<i64>,
}

impl TaskPatch {
    pub fn dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start_date: start,
            end_date: end,
            ..Self::default()
        }
    }

    pub fn touches_dates(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

/// Plain (unreasoned) update: the reasoned-edit fields plus baselines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(flatten)]
    pub patch: TaskPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_end: Option<NaiveDate>,
}

impl From<TaskPatch> for TaskUpdate {
    fn from(patch: TaskPatch) -> Self {
        Self {
            patch,
            baseline_start: None,
            baseline_end: None,
        }
    }
}

/// One entry of a drag/cascade batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDateUpdate {
    pub id: TaskId,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub lag_days: Option<i64>,
}

impl BatchDateUpdate {
    pub fn new(id: TaskId, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            id,
            start_date,
            end_date,
            lag_days: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_type_parses_case_insensitively() {
        assert_eq!("ss".parse::<RelationType>(), Ok(RelationType::StartToStart));
        assert_eq!("FS".parse::<RelationType>(), Ok(RelationType::FinishToStart));
        assert_eq!("".parse::<RelationType>(), Ok(RelationType::FinishToStart));
        assert!("FF".parse::<RelationType>().is_err());
    }

    #[test]
    fn relation_type_serializes_as_short_code() {
        let json = serde_json::to_string(&RelationType::StartToStart).unwrap();
        assert_eq!(json, "\"SS\"");
    }

    #[test]
    fn patch_distinguishes_clear_from_untouched_predecessor() {
        let untouched: TaskPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(untouched.predecessor_id, None);
        let cleared: TaskPatch = serde_json::from_str(r#"{"predecessor_id": null}"#).unwrap();
        assert_eq!(cleared.predecessor_id, Some(None));
        let set: TaskPatch = serde_json::from_str(r#"{"predecessor_id": 7}"#).unwrap();
        assert_eq!(set.predecessor_id, Some(Some(7)));
    }

    #[test]
    fn unlink_resets_relation_but_keeps_dates() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let mut task = Task::new(2, 1, "Framing")
            .with_dates(start, end)
            .with_predecessor(1, RelationType::StartToStart, 2);
        task.unlink();
        assert_eq!(task.predecessor_id, None);
        assert_eq!(task.rel_type, RelationType::FinishToStart);
        assert_eq!(task.lag_days, 0);
        assert_eq!(task.start_date, Some(start));
        assert_eq!(task.end_date, Some(end));
    }
}
