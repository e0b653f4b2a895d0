use chrono::NaiveDate;
use site_schedule::{
    FixedClock, MemoryScheduleStore, NewTask, Project, RelationType, ScheduleEngine, ScheduleError,
    TaskPatch,
};
use std::sync::Arc;

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn engine() -> ScheduleEngine<MemoryScheduleStore> {
    let engine = ScheduleEngine::in_memory(Arc::new(FixedClock::at(d(2025, 3, 3))));
    engine.register_project(Project::new(1, "Lot 1")).unwrap();
    engine
}

fn entry(name: &str, start: NaiveDate, end: NaiveDate) -> NewTask {
    NewTask::new(name).dated(start, end)
}

#[test]
fn empty_batch_creates_nothing() {
    let engine = engine();
    assert!(engine.create_tasks(1, Vec::new()).unwrap().is_empty());
    assert!(engine.create_tasks(7, Vec::new()).unwrap_err().is_not_found());
}

#[test]
fn links_resolve_by_index_including_forward_references() {
    site_schedule::logging::init_test();
    let engine = engine();
    let created = engine
        .create_tasks(
            1,
            vec![
                entry("Frame", d(2025, 3, 12), d(2025, 3, 14)).after_index(
                    2,
                    RelationType::FinishToStart,
                    0,
                ),
                entry("Excavate", d(2025, 3, 3), d(2025, 3, 5)),
                entry("Footings", d(2025, 3, 6), d(2025, 3, 11)).after_index(
                    1,
                    RelationType::StartToStart,
                    3,
                ),
            ],
        )
        .unwrap();

    let names: Vec<&str> = created.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Frame", "Excavate", "Footings"]);
    assert_eq!(created[0].predecessor_id, Some(created[2].id));
    assert_eq!(created[1].predecessor_id, None);
    assert_eq!(created[2].predecessor_id, Some(created[1].id));
    assert_eq!(created[2].rel_type, RelationType::StartToStart);
    assert_eq!(created[2].lag_days, 3);

    // creation stores dates as given
    assert_eq!(created[2].start_date, Some(d(2025, 3, 6)));
    assert_eq!(engine.list_tasks(1).unwrap().len(), 3);
}

#[test]
fn out_of_range_and_self_indexes_are_ignored() {
    let engine = engine();
    let created = engine
        .create_tasks(
            1,
            vec![
                entry("Excavate", d(2025, 3, 3), d(2025, 3, 5)).after_index(
                    0,
                    RelationType::FinishToStart,
                    0,
                ),
                entry("Footings", d(2025, 3, 6), d(2025, 3, 7)).after_index(
                    5,
                    RelationType::FinishToStart,
                    0,
                ),
            ],
        )
        .unwrap();
    assert!(created.iter().all(|t| t.predecessor_id.is_none()));
}

#[test]
fn predecessor_id_is_ignored_in_batches() {
    let engine = engine();
    let existing = engine
        .create_task(1, entry("Survey", d(2025, 3, 3), d(2025, 3, 3)))
        .unwrap();
    let created = engine
        .create_tasks(
            1,
            vec![entry("Excavate", d(2025, 3, 4), d(2025, 3, 5)).after_task(
                existing.id,
                RelationType::FinishToStart,
                0,
            )],
        )
        .unwrap();
    assert_eq!(created[0].predecessor_id, None);
}

#[test]
fn indexes_are_local_to_each_batch() {
    let engine = engine();
    let first = engine
        .create_tasks(
            1,
            vec![
                entry("A", d(2025, 3, 3), d(2025, 3, 3)),
                entry("B", d(2025, 3, 4), d(2025, 3, 4)).after_index(0, RelationType::FinishToStart, 0),
            ],
        )
        .unwrap();
    let second = engine
        .create_tasks(
            1,
            vec![
                entry("C", d(2025, 3, 5), d(2025, 3, 5)),
                entry("D", d(2025, 3, 6), d(2025, 3, 6)).after_index(0, RelationType::FinishToStart, 0),
            ],
        )
        .unwrap();

    assert_eq!(first[1].predecessor_id, Some(first[0].id));
    assert_eq!(second[1].predecessor_id, Some(second[0].id));
    let mut ids: Vec<i64> = first.iter().chain(&second).map(|t| t.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[test]
fn invalid_entry_rejects_the_whole_batch() {
    let engine = engine();
    let bad = NewTask {
        progress: 120,
        ..entry("Frame", d(2025, 3, 5), d(2025, 3, 6))
    };
    let err = engine
        .create_tasks(1, vec![entry("Excavate", d(2025, 3, 3), d(2025, 3, 4)), bad])
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));
    assert!(engine.list_tasks(1).unwrap().is_empty());
}

#[test]
fn batch_on_live_project_sets_baselines() {
    let engine = engine();
    engine.set_go_live(1, true).unwrap();
    let created = engine
        .create_tasks(1, vec![entry("Excavate", d(2025, 3, 3), d(2025, 3, 5))])
        .unwrap();
    assert_eq!(created[0].baseline_start, Some(d(2025, 3, 3)));
    assert_eq!(created[0].baseline_end, Some(d(2025, 3, 5)));
}

#[test]
fn batch_links_drive_later_cascades() {
    let engine = engine();
    let created = engine
        .create_tasks(
            1,
            vec![
                entry("Frame", d(2025, 3, 10), d(2025, 3, 11)).after_index(
                    1,
                    RelationType::FinishToStart,
                    0,
                ),
                entry("Footings", d(2025, 3, 5), d(2025, 3, 7)),
            ],
        )
        .unwrap();
    let (frame, footings) = (created[0].id, created[1].id);

    let tasks = engine
        .reasoned_edit(
            1,
            footings,
            &TaskPatch::dates(None, Some(d(2025, 3, 10))),
            "pump failure",
            "pm",
        )
        .unwrap();
    let frame = tasks.iter().find(|t| t.id == frame).unwrap();
    assert_eq!(frame.start_date, Some(d(2025, 3, 11)));
    assert_eq!(frame.end_date, Some(d(2025, 3, 12)));
}
