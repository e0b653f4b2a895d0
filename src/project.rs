use crate::error::ConstraintViolation;
use crate::task::Task;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ProjectId = i64;

/// Go-live latch. The only transition is `Planning -> Live`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoLive {
    #[default]
    Planning,
    Live,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HoldState {
    #[default]
    Active,
    OnHold {
        #[serde(default)]
        since: Option<NaiveDate>,
    },
}

/// The slice of a project record the schedule engine reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    go_live: GoLive,
    #[serde(default)]
    hold: HoldState,
    #[serde(default)]
    pub dates_from_schedule: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub est_completion: Option<NaiveDate>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            go_live: GoLive::Planning,
            hold: HoldState::Active,
            dates_from_schedule: false,
            start_date: None,
            est_completion: None,
        }
    }

    pub fn with_dates_from_schedule(mut self, enabled: bool) -> Self {
        self.dates_from_schedule = enabled;
        self
    }

    pub fn go_live_state(&self) -> GoLive {
        self.go_live
    }

    pub fn is_live(&self) -> bool {
        self.go_live == GoLive::Live
    }

    /// Apply a requested go-live value. Returns `true` only on the
    /// `Planning -> Live` transition; a request to leave `Live` is ignored.
    pub fn request_go_live(&mut self, value: bool) -> bool {
        match (self.go_live, value) {
            (GoLive::Planning, true) => {
                self.go_live = GoLive::Live;
                true
            }
            _ => false,
        }
    }

    /// Keep the lifecycle state (go-live latch and hold) of the stored
    /// record; only descriptive fields come from `self`.
    pub(crate) fn adopt_lifecycle(&mut self, stored: &Project) {
        self.go_live = stored.go_live;
        self.hold = stored.hold;
    }

    pub fn hold_state(&self) -> HoldState {
        self.hold
    }

    pub fn is_on_hold(&self) -> bool {
        matches!(self.hold, HoldState::OnHold { .. })
    }

    pub fn hold_start_date(&self) -> Option<NaiveDate> {
        match self.hold {
            HoldState::OnHold { since } => since,
            HoldState::Active => None,
        }
    }

    pub(crate) fn place_on_hold(&mut self, today: NaiveDate) -> Result<(), ConstraintViolation> {
        if self.is_on_hold() {
            return Err(ConstraintViolation::AlreadyOnHold);
        }
        self.hold = HoldState::OnHold { since: Some(today) };
        Ok(())
    }

    /// Clear the hold, returning the recorded hold start date.
    pub(crate) fn lift_hold(&mut self) -> Result<Option<NaiveDate>, ConstraintViolation> {
        match self.hold {
            HoldState::OnHold { since } => {
                self.hold = HoldState::Active;
                Ok(since)
            }
            HoldState::Active => Err(ConstraintViolation::NotOnHold),
        }
    }

    /// Derive start/completion from the schedule (min start, max end) when
    /// the project is configured to follow it. Returns whether anything changed.
    pub fn sync_dates_from_schedule(&mut self, tasks: &[Task]) -> bool {
        if !self.dates_from_schedule {
            return false;
        }
        let before = (self.start_date, self.est_completion);
        if let Some(start) = tasks.iter().filter_map(|t| t.start_date).min() {
            self.start_date = Some(start);
        }
        if let Some(end) = tasks.iter().filter_map(|t| t.end_date).max() {
            self.est_completion = Some(end);
        }
        before != (self.start_date, self.est_completion)
    }
}
