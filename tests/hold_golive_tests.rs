use chrono::NaiveDate;
use site_schedule::calendar::WorkCalendar;
use site_schedule::hold::ALL_TASKS;
use site_schedule::{
    BatchDateUpdate, ConstraintViolation, FixedClock, MemoryScheduleStore, NewException, NewTask,
    Project, ScheduleEngine, Task, TaskField, TaskId, TaskPatch, TaskUpdate,
};
use std::sync::Arc;

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup(today: NaiveDate) -> (ScheduleEngine<MemoryScheduleStore>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::at(today));
    let engine = ScheduleEngine::in_memory(clock.clone());
    engine.register_project(Project::new(1, "Lot 1")).unwrap();
    (engine, clock)
}

fn add(
    engine: &ScheduleEngine<MemoryScheduleStore>,
    name: &str,
    start: NaiveDate,
    end: NaiveDate,
    progress: u8,
) -> Task {
    let new_task = NewTask {
        progress,
        ..NewTask::new(name).dated(start, end)
    };
    engine.create_task(1, new_task).unwrap()
}

fn find(tasks: &[Task], id: TaskId) -> &Task {
    tasks.iter().find(|t| t.id == id).unwrap()
}

fn dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> TaskUpdate {
    TaskUpdate::from(TaskPatch::dates(start, end))
}

#[test]
fn go_live_snapshots_baselines_once() {
    let (engine, _) = setup(d(2025, 3, 3));
    let a = add(&engine, "Excavate", d(2025, 3, 3), d(2025, 3, 5), 0);
    assert_eq!(a.baseline_start, None);

    let project = engine.set_go_live(1, true).unwrap();
    assert!(project.is_live());
    let a = engine.task(1, a.id).unwrap();
    assert_eq!(a.baseline_start, Some(d(2025, 3, 3)));
    assert_eq!(a.baseline_end, Some(d(2025, 3, 5)));

    engine.update_task(1, a.id, dates(None, Some(d(2025, 3, 4)))).unwrap();

    // the latch never resets, and repeating it does not re-snapshot
    assert!(engine.set_go_live(1, false).unwrap().is_live());
    engine.set_go_live(1, true).unwrap();
    assert_eq!(engine.task(1, a.id).unwrap().baseline_end, Some(d(2025, 3, 5)));

    let late = add(&engine, "Footings", d(2025, 3, 10), d(2025, 3, 11), 0);
    assert_eq!(late.baseline_start, Some(d(2025, 3, 10)));
    assert_eq!(late.baseline_end, Some(d(2025, 3, 11)));
}

#[test]
fn live_tasks_only_move_earlier() {
    let (engine, _) = setup(d(2025, 3, 3));
    let a = add(&engine, "Excavate", d(2025, 3, 4), d(2025, 3, 6), 0);
    engine.set_go_live(1, true).unwrap();

    let err = engine
        .update_task(1, a.id, dates(Some(d(2025, 3, 5)), None))
        .unwrap_err();
    assert_eq!(
        err.constraint(),
        Some(ConstraintViolation::StartDelayedAfterGoLive { task_id: a.id })
    );
    let err = engine
        .reasoned_edit(1, a.id, &TaskPatch::dates(None, Some(d(2025, 3, 7))), "rain", "pm")
        .unwrap_err();
    assert_eq!(
        err.constraint(),
        Some(ConstraintViolation::EndExtendedAfterGoLive { task_id: a.id })
    );

    let earlier = engine
        .update_task(1, a.id, dates(Some(d(2025, 3, 3)), Some(d(2025, 3, 5))))
        .unwrap();
    assert_eq!(earlier.start_date, Some(d(2025, 3, 3)));
    assert_eq!(earlier.end_date, Some(d(2025, 3, 5)));
}

#[test]
fn exception_tasks_are_exempt_after_go_live() {
    let (engine, _) = setup(d(2025, 3, 3));
    let a = add(&engine, "Pour slab", d(2025, 3, 3), d(2025, 3, 4), 0);
    engine.set_go_live(1, true).unwrap();

    let tasks = engine
        .add_exception(1, NewException::new("Pump out", d(2025, 3, 5), a.id, "flooded"))
        .unwrap();
    let exception = tasks.iter().find(|t| t.is_exception).unwrap();

    let extended = engine
        .update_task(1, exception.id, dates(None, Some(d(2025, 3, 7))))
        .unwrap();
    assert_eq!(extended.end_date, Some(d(2025, 3, 7)));
}

#[test]
fn batch_after_go_live_caps_ends_and_skips_delays() {
    site_schedule::logging::init_test();
    let (engine, _) = setup(d(2025, 3, 3));
    let a = add(&engine, "Excavate", d(2025, 3, 3), d(2025, 3, 5), 0);
    let b = add(&engine, "Footings", d(2025, 3, 10), d(2025, 3, 12), 0);
    engine.set_go_live(1, true).unwrap();

    let outcome = engine
        .batch_update(
            1,
            &[
                BatchDateUpdate::new(a.id, Some(d(2025, 2, 28)), Some(d(2025, 3, 7))),
                BatchDateUpdate::new(b.id, Some(d(2025, 3, 11)), Some(d(2025, 3, 13))),
                BatchDateUpdate::new(99, Some(d(2025, 3, 1)), None),
            ],
        )
        .unwrap();

    assert_eq!(outcome.updated, vec![a.id]);
    assert_eq!(
        outcome.skipped,
        vec![(b.id, ConstraintViolation::StartDelayedAfterGoLive { task_id: b.id })]
    );
    let a = engine.task(1, a.id).unwrap();
    assert_eq!(a.start_date, Some(d(2025, 2, 28)));
    assert_eq!(a.end_date, Some(d(2025, 3, 5)));
    assert_eq!(engine.task(1, b.id).unwrap().start_date, Some(d(2025, 3, 10)));
}

#[test]
fn batch_before_go_live_applies_lag_and_dates() {
    let (engine, _) = setup(d(2025, 3, 3));
    let a = add(&engine, "Excavate", d(2025, 3, 3), d(2025, 3, 5), 0);
    let update = BatchDateUpdate {
        lag_days: Some(3),
        ..BatchDateUpdate::new(a.id, Some(d(2025, 3, 10)), Some(d(2025, 3, 12)))
    };
    let outcome = engine.batch_update(1, &[update]).unwrap();
    assert_eq!(outcome.updated, vec![a.id]);
    let a = engine.task(1, a.id).unwrap();
    assert_eq!(a.start_date, Some(d(2025, 3, 10)));
    assert_eq!(a.lag_days, 3);
}

#[test]
fn hold_blocks_date_changes_only() {
    let (engine, _) = setup(d(2025, 3, 10));
    let a = add(&engine, "Excavate", d(2025, 3, 10), d(2025, 3, 12), 0);

    let project = engine.hold(1).unwrap();
    assert!(project.is_on_hold());
    assert_eq!(project.hold_start_date(), Some(d(2025, 3, 10)));
    assert_eq!(
        engine.hold(1).unwrap_err().constraint(),
        Some(ConstraintViolation::AlreadyOnHold)
    );

    let err = engine
        .update_task(1, a.id, dates(Some(d(2025, 3, 11)), None))
        .unwrap_err();
    assert_eq!(err.constraint(), Some(ConstraintViolation::ProjectOnHold));

    let outcome = engine
        .batch_update(1, &[BatchDateUpdate::new(a.id, None, Some(d(2025, 3, 14)))])
        .unwrap();
    assert!(outcome.updated.is_empty());
    assert_eq!(outcome.skipped, vec![(a.id, ConstraintViolation::ProjectOnHold)]);

    let progress = TaskPatch {
        progress: Some(30),
        ..TaskPatch::default()
    };
    engine.reasoned_edit(1, a.id, &progress, "site visit", "pm").unwrap();
    let a = engine.task(1, a.id).unwrap();
    assert_eq!(a.progress, 30);
    assert_eq!(a.end_date, Some(d(2025, 3, 12)));

    engine
        .add_exception(1, NewException::new("Survey", d(2025, 3, 13), a.id, "council visit"))
        .unwrap();
}

#[test]
fn release_pushes_remaining_work_by_elapsed_business_days() {
    let (engine, clock) = setup(d(2025, 3, 10));
    let cal = WorkCalendar::default();
    let done = add(&engine, "Excavate", d(2025, 3, 3), d(2025, 3, 5), 100);
    let active = add(&engine, "Footings", d(2025, 3, 6), d(2025, 3, 12), 40);
    let next = add(&engine, "Slab", d(2025, 3, 17), d(2025, 3, 18), 0);
    let last = add(&engine, "Frame", d(2025, 3, 19), d(2025, 3, 21), 0);
    let before = engine.list_tasks(1).unwrap();

    engine.hold(1).unwrap();
    clock.set_today(d(2025, 3, 13));
    let released = engine.release(1, "pm").unwrap();

    assert_eq!(released.hold_days, 3);
    assert_eq!(released.in_progress, Some(active.id));
    assert_eq!(released.shifted, vec![active.id, next.id, last.id]);
    assert!(!released.project.is_on_hold());
    assert_eq!(released.project.hold_start_date(), None);

    let tasks = &released.tasks;
    assert_eq!(find(tasks, done.id), find(&before, done.id));
    assert_eq!(find(tasks, active.id).start_date, Some(d(2025, 3, 6)));
    assert_eq!(find(tasks, active.id).end_date, Some(d(2025, 3, 17)));
    for id in [next.id, last.id] {
        let (old, new) = (find(&before, id), find(tasks, id));
        assert_eq!(new.start_date, old.start_date.and_then(|s| cal.add_workdays(s, 3)));
        assert_eq!(new.end_date, old.end_date.and_then(|e| cal.add_workdays(e, 3)));
    }
    assert_eq!(find(tasks, next.id).start_date, Some(d(2025, 3, 20)));
    assert_eq!(engine.list_tasks(1).unwrap(), released.tasks);

    let log = engine.edit_log(1).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].field, TaskField::HoldRelease);
    assert_eq!(log[0].task_id, Some(active.id));
    assert_eq!(log[0].task_name, "Footings");
    assert_eq!(log[0].old_value, "2025-03-10");
    assert_eq!(log[0].new_value, "2025-03-13");
    assert_eq!(log[0].reason, "Hold released after 3 workday(s)");
    assert_eq!(log[0].edited_by, "pm");
}

#[test]
fn same_day_release_with_nothing_started_shifts_by_one() {
    let (engine, _) = setup(d(2025, 3, 3));
    let finished = add(&engine, "Survey", d(2025, 3, 3), d(2025, 3, 4), 100);
    let future = add(&engine, "Excavate", d(2025, 3, 10), d(2025, 3, 11), 0);

    engine.hold(1).unwrap();
    let released = engine.release(1, "pm").unwrap();

    assert_eq!(released.hold_days, 1);
    assert_eq!(released.in_progress, None);
    assert_eq!(find(&released.tasks, finished.id).start_date, Some(d(2025, 3, 4)));
    assert_eq!(find(&released.tasks, future.id).start_date, Some(d(2025, 3, 11)));
    assert_eq!(find(&released.tasks, future.id).end_date, Some(d(2025, 3, 12)));

    let log = engine.edit_log(1).unwrap();
    assert_eq!(log[0].task_id, None);
    assert_eq!(log[0].task_name, ALL_TASKS);
}

#[test]
fn release_without_hold_is_rejected() {
    let (engine, _) = setup(d(2025, 3, 3));
    let err = engine.release(1, "pm").unwrap_err();
    assert_eq!(err.constraint(), Some(ConstraintViolation::NotOnHold));
    assert!(engine.edit_log(1).unwrap().is_empty());
}

#[test]
fn hold_then_release_allows_edits_again() {
    let (engine, clock) = setup(d(2025, 3, 3));
    let a = add(&engine, "Excavate", d(2025, 3, 10), d(2025, 3, 11), 0);
    engine.hold(1).unwrap();
    clock.set_today(d(2025, 3, 4));
    engine.release(1, "pm").unwrap();

    let moved = engine
        .update_task(1, a.id, dates(Some(d(2025, 3, 17)), Some(d(2025, 3, 18))))
        .unwrap();
    assert_eq!(moved.start_date, Some(d(2025, 3, 17)));
}
