use crate::project::ProjectId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ExemptionId = i64;

/// A non-working calendar date, either global (`project_id == None`) or
/// scoped to one project. Recurring exemptions repeat every year on the
/// same month and day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdayExemption {
    pub id: ExemptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExemption {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub created_by: String,
}

impl NewExemption {
    pub fn on(date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            date: Some(date),
            description: description.into(),
            recurring: false,
            created_by: String::new(),
        }
    }

    pub fn recurring(mut self) -> Self {
        self.recurring = true;
        self
    }
}
