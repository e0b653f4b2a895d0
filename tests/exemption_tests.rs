use chrono::NaiveDate;
use site_schedule::{
    EngineConfig, FixedClock, MemoryScheduleStore, NewExemption, NewTask, Project, RelationType,
    ScheduleEngine, ScheduleError, TaskPatch,
};
use std::sync::Arc;

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn engine_with(config: EngineConfig) -> ScheduleEngine<MemoryScheduleStore> {
    let engine = ScheduleEngine::new(
        MemoryScheduleStore::new(),
        Arc::new(FixedClock::at(d(2025, 3, 3))),
        config,
    );
    engine.register_project(Project::new(1, "Lot 1")).unwrap();
    engine.register_project(Project::new(2, "Lot 2")).unwrap();
    engine
}

fn honoring() -> EngineConfig {
    EngineConfig {
        honor_workday_exemptions: true,
        ..EngineConfig::default()
    }
}

#[test]
fn exemptions_are_unique_per_scope() {
    let engine = engine_with(EngineConfig::default());
    let global = engine
        .add_global_exemption(NewExemption::on(d(2025, 3, 6), "public holiday"))
        .unwrap();
    assert_eq!(global.project_id, None);

    let duplicate = engine.add_global_exemption(NewExemption::on(d(2025, 3, 6), "again"));
    assert!(matches!(duplicate, Err(ScheduleError::Validation(_))));

    let scoped = engine
        .add_project_exemption(1, NewExemption::on(d(2025, 3, 6), "site closed"))
        .unwrap();
    assert_eq!(scoped.project_id, Some(1));
    assert!(matches!(
        engine.add_project_exemption(1, NewExemption::on(d(2025, 3, 6), "again")),
        Err(ScheduleError::Validation(_))
    ));
    engine
        .add_project_exemption(2, NewExemption::on(d(2025, 3, 6), "site closed"))
        .unwrap();

    let undated = engine.add_global_exemption(NewExemption::default());
    assert!(matches!(undated, Err(ScheduleError::Validation(_))));
    assert!(engine
        .add_project_exemption(9, NewExemption::on(d(2025, 3, 7), "x"))
        .unwrap_err()
        .is_not_found());
    assert_eq!(engine.all_exemptions().unwrap().len(), 3);
}

#[test]
fn project_view_merges_global_and_own_by_date() {
    let engine = engine_with(EngineConfig::default());
    engine
        .add_project_exemption(1, NewExemption::on(d(2025, 4, 18), "site closed"))
        .unwrap();
    engine
        .add_global_exemption(NewExemption::on(d(2025, 1, 1), "new year").recurring())
        .unwrap();
    engine
        .add_project_exemption(2, NewExemption::on(d(2025, 2, 3), "other site"))
        .unwrap();

    let dates: Vec<NaiveDate> = engine
        .project_exemptions(1)
        .unwrap()
        .iter()
        .map(|e| e.date)
        .collect();
    assert_eq!(dates, vec![d(2025, 1, 1), d(2025, 4, 18)]);
    assert_eq!(engine.project_exemptions(2).unwrap().len(), 2);
}

#[test]
fn delete_exemption_reports_missing_ids() {
    let engine = engine_with(EngineConfig::default());
    let stored = engine
        .add_global_exemption(NewExemption::on(d(2025, 3, 6), "holiday"))
        .unwrap();
    engine.delete_exemption(stored.id).unwrap();
    assert!(engine.all_exemptions().unwrap().is_empty());
    assert!(engine.delete_exemption(stored.id).unwrap_err().is_not_found());
}

#[test]
fn date_math_ignores_exemptions_unless_configured() {
    for (config, expected_start) in [
        (EngineConfig::default(), d(2025, 3, 6)),
        (honoring(), d(2025, 3, 7)),
    ] {
        let engine = engine_with(config);
        engine
            .add_global_exemption(NewExemption::on(d(2025, 3, 6), "public holiday"))
            .unwrap();
        let a = engine
            .create_task(1, NewTask::new("Excavate").dated(d(2025, 3, 3), d(2025, 3, 5)))
            .unwrap();
        let b = engine
            .create_task(
                1,
                NewTask::new("Footings")
                    .dated(d(2025, 3, 3), d(2025, 3, 3))
                    .after_task(a.id, RelationType::FinishToStart, 0),
            )
            .unwrap();

        let patch = TaskPatch {
            progress: Some(20),
            ..TaskPatch::default()
        };
        let tasks = engine.reasoned_edit(1, a.id, &patch, "site visit", "pm").unwrap();
        let b = tasks.iter().find(|t| t.id == b.id).unwrap();
        assert_eq!(b.start_date, Some(expected_start));
    }
}

#[test]
fn project_exemptions_do_not_leak_into_other_projects() {
    let engine = engine_with(honoring());
    engine
        .add_project_exemption(2, NewExemption::on(d(2025, 3, 6), "other site closed"))
        .unwrap();
    assert!(engine.calendar(1).unwrap().is_available(d(2025, 3, 6)));
    assert!(!engine.calendar(2).unwrap().is_available(d(2025, 3, 6)));
}
