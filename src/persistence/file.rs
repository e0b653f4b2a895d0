use super::{PersistenceError, PersistenceResult};
use crate::calendar::{DATE_FORMAT, format_date};
use crate::project::Project;
use crate::task::{RelationType, Task};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// One project's schedule as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub project: Project,
    pub tasks: Vec<Task>,
}

impl ScheduleSnapshot {
    pub fn new(project: Project, tasks: Vec<Task>) -> PersistenceResult<Self> {
        super::validate_tasks(&tasks)?;
        ensure_project(&project, &tasks)?;
        Ok(Self { project, tasks })
    }
}

fn ensure_project(project: &Project, tasks: &[Task]) -> PersistenceResult<()> {
    if let Some(task) = tasks.iter().find(|t| t.project_id != project.id) {
        return Err(PersistenceError::InvalidData(format!(
            "task {} belongs to project {}, not {}",
            task.id, task.project_id, project.id
        )));
    }
    Ok(())
}

pub fn save_schedule_to_json<P: AsRef<Path>>(
    snapshot: &ScheduleSnapshot,
    path: P,
) -> PersistenceResult<()> {
    super::validate_tasks(&snapshot.tasks)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

pub fn load_schedule_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<ScheduleSnapshot> {
    let file = File::open(path)?;
    let snapshot: ScheduleSnapshot = serde_json::from_reader(file)?;
    super::validate_tasks(&snapshot.tasks)?;
    ensure_project(&snapshot.project, &snapshot.tasks)?;
    Ok(snapshot)
}

#[derive(Serialize, Deserialize)]
struct TaskCsvRecord {
    id: i64,
    project_id: i64,
    name: String,
    start_date: String,
    end_date: String,
    baseline_start: String,
    baseline_end: String,
    progress: u8,
    contractor: String,
    trade: String,
    predecessor_id: String,
    rel_type: String,
    lag_days: i64,
    is_exception: bool,
    exception_description: String,
}

impl From<&Task> for TaskCsvRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            project_id: task.project_id,
            name: task.name.clone(),
            start_date: format_date(task.start_date),
            end_date: format_date(task.end_date),
            baseline_start: format_date(task.baseline_start),
            baseline_end: format_date(task.baseline_end),
            progress: task.progress,
            contractor: task.contractor.clone(),
            trade: task.trade.clone(),
            predecessor_id: task
                .predecessor_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            rel_type: task.rel_type.as_str().to_string(),
            lag_days: task.lag_days,
            is_exception: task.is_exception,
            exception_description: task.exception_description.clone(),
        }
    }
}

impl TaskCsvRecord {
    fn into_task(self) -> PersistenceResult<Task> {
        let mut task = Task::new(self.id, self.project_id, self.name);
        task.start_date = parse_date(&self.start_date)?;
        task.end_date = parse_date(&self.end_date)?;
        task.baseline_start = parse_date(&self.baseline_start)?;
        task.baseline_end = parse_date(&self.baseline_end)?;
        task.progress = self.progress;
        task.contractor = self.contractor;
        task.trade = self.trade;
        task.predecessor_id = parse_i64(&self.predecessor_id)?;
        task.rel_type = self
            .rel_type
            .parse::<RelationType>()
            .map_err(PersistenceError::InvalidData)?;
        task.lag_days = self.lag_days;
        task.is_exception = self.is_exception;
        task.exception_description = self.exception_description;
        Ok(task)
    }
}

/// Write the snapshot's tasks as CSV. Project fields are not part of the
/// CSV layout; use JSON to carry them.
pub fn save_schedule_to_csv<P: AsRef<Path>>(
    snapshot: &ScheduleSnapshot,
    path: P,
) -> PersistenceResult<()> {
    super::validate_tasks(&snapshot.tasks)?;
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for task in &snapshot.tasks {
        writer.serialize(TaskCsvRecord::from(task))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_tasks_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<Task>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut tasks = Vec::new();
    for record in reader.deserialize::<TaskCsvRecord>() {
        let record = record?;
        tasks.push(record.into_task()?);
    }

    if tasks.is_empty() {
        return Err(PersistenceError::InvalidData(
            "CSV file contained no tasks".into(),
        ));
    }

    super::validate_tasks(&tasks)?;
    Ok(tasks)
}

fn parse_date(input: &str) -> PersistenceResult<Option<NaiveDate>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid date '{input}': {e}")))
}

fn parse_i64(input: &str) -> PersistenceResult<Option<i64>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    input
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid integer '{input}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot() -> ScheduleSnapshot {
        let tasks = vec![
            Task::new(1, 4, "Excavation").with_dates(d(2025, 3, 3), d(2025, 3, 5)),
            Task::new(2, 4, "Footings, east wall")
                .with_dates(d(2025, 3, 6), d(2025, 3, 7))
                .with_predecessor(1, RelationType::StartToStart, 2),
            Task::new(3, 4, "Unscheduled"),
        ];
        ScheduleSnapshot::new(Project::new(4, "Lot 4"), tasks).unwrap()
    }

    #[test]
    fn csv_keeps_links_and_blank_dates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        let snapshot = snapshot();
        save_schedule_to_csv(&snapshot, &path).unwrap();
        let tasks = load_tasks_from_csv(&path).unwrap();
        assert_eq!(tasks, snapshot.tasks);
    }

    #[test]
    fn json_carries_project_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        let mut snapshot = snapshot();
        snapshot.project.request_go_live(true);
        save_schedule_to_json(&snapshot, &path).unwrap();
        let loaded = load_schedule_from_json(&path).unwrap();
        assert!(loaded.project.is_live());
        assert_eq!(loaded.tasks.len(), 3);
    }

    #[test]
    fn snapshot_rejects_foreign_tasks() {
        let tasks = vec![Task::new(1, 9, "Elsewhere")];
        assert!(ScheduleSnapshot::new(Project::new(4, "Lot 4"), tasks).is_err());
    }

    #[test]
    fn empty_csv_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_tasks_from_csv(&path),
            Err(PersistenceError::InvalidData(_))
        ));
    }
}
