//! Teaching days and exam dates through the store

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use slotplan_core::{
    Cohort, Course, CourseRun, EngineConfig, EngineError, Slot, Snapshot, Teacher, TeachingDay,
};
use slotplan_engine::{SchedulingStore, TeachingDayState};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Courses 1 and 2 both offered in slot 1 (starting Monday 2024-01-08)
fn offered(config: EngineConfig) -> SchedulingStore {
    let mut store = SchedulingStore::new(config);
    store
        .import(Snapshot {
            courses: vec![Course::new(1, "A", "Alpha"), Course::new(2, "B", "Beta")],
            cohorts: vec![Cohort::new(1, date(2023, 8, 21))],
            teachers: vec![Teacher::new(1, "Robin").can_teach(1), Teacher::new(2, "Kim").can_teach(2)],
            slots: vec![Slot::new(1, date(2024, 1, 8)), Slot::new(2, date(2024, 2, 5))],
            course_runs: vec![
                CourseRun::new(1, 1, 1).cohort(1).teacher(1),
                CourseRun::new(2, 2, 1).cohort(1).teacher(2),
            ],
            ..Snapshot::default()
        })
        .unwrap();
    store
}

#[test]
fn import_materializes_default_pattern() {
    let store = offered(EngineConfig::default());
    assert_eq!(store.snapshot().course_slots.len(), 2);

    let days = store.teaching_days(1, Some(1));
    assert_eq!(days.len(), 8);
    assert_eq!(days.first(), Some(&date(2024, 1, 8)));
    assert_eq!(days.last(), Some(&date(2024, 2, 2)));
    assert_eq!(
        store.teaching_day_state(1, date(2024, 1, 9), None),
        None,
        "a Tuesday in week one is not a default day"
    );
}

#[test]
fn custom_offsets_drive_the_pattern() {
    let config = EngineConfig::default().with_teaching_day_offsets(vec![1, 2]);
    let store = offered(config);
    assert_eq!(
        store.teaching_days(1, None),
        vec![date(2024, 1, 9), date(2024, 1, 10)]
    );
}

#[test]
fn per_course_toggle_only_touches_that_offering() {
    let mut store = offered(EngineConfig::default());
    let thursday = date(2024, 1, 11);

    let state = store.toggle_course_slot_day(1, 1, thursday).unwrap();
    assert_eq!(state, Some(TeachingDayState { is_default: true, active: false }));
    assert!(!store.teaching_days(1, Some(1)).contains(&thursday));
    assert!(store.teaching_days(1, Some(2)).contains(&thursday));
    // Merged view reports the deactivated default
    assert_eq!(
        store.teaching_day_state(1, thursday, None),
        Some(TeachingDayState { is_default: true, active: false })
    );

    store.toggle_course_slot_day(1, 1, thursday).unwrap();
    assert!(store.teaching_days(1, Some(1)).contains(&thursday));
}

#[test]
fn apply_to_all_round_trips() {
    let mut store = offered(EngineConfig::default());
    let wednesday = date(2024, 1, 10);

    let on = store.toggle_teaching_day(1, wednesday).unwrap();
    assert_eq!(on, TeachingDayState { is_default: false, active: true });
    for course in [1, 2] {
        assert!(store.teaching_days(1, Some(course)).contains(&wednesday));
    }

    let off = store.toggle_teaching_day(1, wednesday).unwrap();
    assert!(!off.active);
    assert_eq!(store.teaching_day_state(1, wednesday, None), None);
    assert!(store.snapshot().course_slot_days.is_empty());
}

#[test]
fn unoffered_course_cannot_be_toggled() {
    let mut store = offered(EngineConfig::default());
    let err = store.toggle_course_slot_day(2, 1, date(2024, 2, 5)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[test]
fn imported_course_records_become_overrides() {
    let mut store = SchedulingStore::default();
    store
        .import(Snapshot {
            courses: vec![Course::new(1, "A", "Alpha")],
            slots: vec![Slot::new(1, date(2024, 1, 8))],
            teaching_days: vec![TeachingDay {
                slot_id: 1,
                date: date(2024, 1, 12),
                course_id: Some(1),
                is_default: false,
                active: true,
            }],
            ..Snapshot::default()
        })
        .unwrap();

    assert!(store.teaching_days(1, Some(1)).contains(&date(2024, 1, 12)));
    assert!(store
        .snapshot()
        .teaching_days
        .iter()
        .all(|t| t.course_id.is_none()));
}

#[test]
fn exam_date_lifecycle() {
    let mut store = offered(EngineConfig::default());
    assert!(store.exam_date(1).is_none());
    assert!(!store.is_exam_date_locked(1));

    store.set_exam_date(1, date(2024, 2, 2)).unwrap();
    assert!(store.is_exam_date_locked(1));

    store.unlock_exam_date(1).unwrap();
    assert!(!store.is_exam_date_locked(1));
    store.set_exam_date(1, date(2024, 2, 1)).unwrap();
    assert_eq!(store.exam_date(1).map(|e| (e.date, e.locked)), Some((date(2024, 2, 1), true)));
    assert_eq!(store.snapshot().exam_dates.len(), 1);

    store.lock_exam_date(1).unwrap();
    assert!(store.set_exam_date(1, date(2024, 3, 1)).is_err());
    assert!(store.unlock_exam_date(2).is_err());
}

#[test]
fn exam_lock_default_is_configurable() {
    let config = EngineConfig {
        lock_exam_on_set: false,
        ..EngineConfig::default()
    };
    let mut store = offered(config);
    store.set_exam_date(1, date(2024, 1, 25)).unwrap();
    assert!(!store.is_exam_date_locked(1));
}

#[test]
fn shrinking_a_slot_drops_out_of_range_records() {
    let mut store = offered(EngineConfig::default());
    store.toggle_course_slot_day(1, 1, date(2024, 2, 3)).unwrap();
    store.set_exam_date(1, date(2024, 2, 2)).unwrap();

    store.update_slot(1, "2024-01-08", Some(date(2024, 1, 28))).unwrap();

    assert!(store.exam_date(1).is_none());
    assert!(store.snapshot().course_slot_days.is_empty());
    assert_eq!(store.teaching_days(1, None).len(), 6);
}

#[test]
fn moving_a_slot_rebuilds_the_pattern() {
    let mut store = SchedulingStore::default();
    let slot = store.add_slot("2024-01-08", false).unwrap();
    assert_eq!(store.teaching_days(slot, None).len(), 8);

    store.update_slot(slot, "2024-01-09", None).unwrap();
    assert_eq!(
        store.teaching_days(slot, None),
        vec![
            date(2024, 1, 9),
            date(2024, 1, 12),
            date(2024, 1, 17),
            date(2024, 1, 19),
            date(2024, 1, 24),
            date(2024, 1, 26),
            date(2024, 1, 30),
            date(2024, 2, 3),
        ]
    );
    assert_eq!(store.snapshot().teaching_days.len(), 8);
}

#[test]
fn moved_slot_drops_stale_course_overrides() {
    let mut store = offered(EngineConfig::default());
    let thursday = date(2024, 1, 11);
    store.toggle_course_slot_day(1, 1, thursday).unwrap();

    // Friday start keeps clear of slot 2; Monday the 8th stays a default day
    store.update_slot(1, "2024-01-05", None).unwrap();

    let pattern = vec![
        date(2024, 1, 5),
        date(2024, 1, 8),
        date(2024, 1, 13),
        date(2024, 1, 15),
        date(2024, 1, 20),
        date(2024, 1, 22),
        date(2024, 1, 26),
        date(2024, 1, 30),
    ];
    assert_eq!(store.teaching_day_state(1, thursday, Some(1)), None);
    assert_eq!(store.teaching_days(1, Some(1)), pattern);
    assert_eq!(store.teaching_days(1, None), pattern);
    assert!(store.snapshot().course_slot_days.is_empty());

    // Thursday is now an added day: on, then deleted
    assert_eq!(
        store.toggle_course_slot_day(1, 1, thursday).unwrap(),
        Some(TeachingDayState { is_default: false, active: true })
    );
    assert_eq!(store.toggle_course_slot_day(1, 1, thursday).unwrap(), None);
}
