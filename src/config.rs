use crate::calendar::WorkCalendar;
use crate::error::{ScheduleError, ScheduleResult};
use crate::persistence::PersistenceError;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "SITE_SCHEDULE_DB";
pub const ENV_HONOR_EXEMPTIONS: &str = "SITE_SCHEDULE_HONOR_EXEMPTIONS";
pub const ENV_CASCADE_TIMEOUT_MS: &str = "SITE_SCHEDULE_CASCADE_TIMEOUT_MS";
pub const ENV_LOG: &str = "SITE_SCHEDULE_LOG";

fn default_working_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sqlite file; `None` keeps everything in memory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Treat stored workday exemptions as non-working days in date math.
    #[serde(default)]
    pub honor_workday_exemptions: bool,
    #[serde(default = "default_working_days")]
    pub working_days: Vec<Weekday>,
    #[serde(default)]
    pub cascade_timeout_ms: Option<u64>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            honor_workday_exemptions: false,
            working_days: default_working_days(),
            cascade_timeout_ms: None,
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ScheduleResult<Self> {
        let file = File::open(path).map_err(PersistenceError::from)?;
        let config: EngineConfig =
            serde_json::from_reader(file).map_err(PersistenceError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> ScheduleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for the
    /// `SITE_SCHEDULE_*` keys.
    pub fn from_lookup<F>(lookup: F) -> ScheduleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_HONOR_EXEMPTIONS) {
            config.honor_workday_exemptions = parse_flag(ENV_HONOR_EXEMPTIONS, &flag)?;
        }
        if let Some(ms) = lookup(ENV_CASCADE_TIMEOUT_MS) {
            let ms = ms.trim().parse::<u64>().map_err(|err| {
                ScheduleError::validation(format!("{ENV_CASCADE_TIMEOUT_MS}: {err}"))
            })?;
            config.cascade_timeout_ms = Some(ms);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.working_days.is_empty() {
            return Err(ScheduleError::validation(
                "working_days must name at least one weekday",
            ));
        }
        Ok(())
    }

    pub fn cascade_timeout(&self) -> Option<Duration> {
        self.cascade_timeout_ms.map(Duration::from_millis)
    }

    /// Calendar before any exemptions are layered on.
    pub fn base_calendar(&self) -> WorkCalendar {
        WorkCalendar::custom(self.working_days.iter().copied(), std::iter::empty())
    }
}

fn parse_flag(key: &str, value: &str) -> ScheduleResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ScheduleError::validation(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}
