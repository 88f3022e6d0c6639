//! Invariants the store keeps after every command

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use slotplan_core::{
    Cohort, ConflictType, Course, CourseRun, EngineError, Slot, SlotRef, Snapshot, Teacher,
    TeacherAvailability,
};
use slotplan_engine::{validation, ChangeKind, SchedulingStore, StoreEvent};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Two courses, two teachers able to teach both, one cohort, two slots
fn staffed_store() -> SchedulingStore {
    let mut store = SchedulingStore::default();
    let alpha = store.add_course(Course::new(0, "A", "Alpha")).unwrap();
    let beta = store.add_course(Course::new(0, "B", "Beta")).unwrap();
    store
        .add_teacher(Teacher::new(0, "Robin").can_teach(alpha).can_teach(beta))
        .unwrap();
    store
        .add_teacher(Teacher::new(0, "Kim").can_teach(alpha).can_teach(beta))
        .unwrap();
    store.add_cohort(Cohort::new(0, date(2023, 8, 21))).unwrap();
    store.add_slot("2024-01-08", false).unwrap();
    store.add_slot("2024-02-05", false).unwrap();
    store
}

fn assert_no_overlap(store: &SchedulingStore) {
    let slots = store.slots();
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            assert!(
                !a.overlaps(b.start, b.end),
                "slots {} and {} overlap",
                a.id,
                b.id
            );
        }
    }
}

// =============================================================================
// Slots
// =============================================================================

#[test]
fn slot_ending_past_last_date_is_rejected() {
    let mut store = staffed_store();
    let before = store.snapshot().clone();

    let err = store.add_slot(NaiveDate::MAX, false).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDate(_)));
    let err = store.update_slot(1, NaiveDate::MAX, None).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDate(_)));
    assert_eq!(store.snapshot(), &before);

    let mut snapshot = before.clone();
    snapshot.slots.push(Slot::new(3, NaiveDate::MAX));
    let err = store.import(snapshot).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDate(_)));
    assert_eq!(store.snapshot(), &before);
}

#[test]
fn overlapping_slot_is_rejected_unchanged() {
    let mut store = staffed_store();
    let before = store.snapshot().clone();

    let err = store.add_slot("2024-01-20", false).unwrap_err();
    let conflict = err.conflict().expect("conflict");
    assert_eq!(conflict.conflict_type, ConflictType::SlotOverlap);
    assert_eq!(conflict.involved_slots, vec![1]);
    assert_eq!(store.snapshot(), &before);

    let err = store.update_slot(2, "2024-02-01", None).unwrap_err();
    assert!(err.conflict().is_some());
    assert_no_overlap(&store);
}

#[test]
fn slots_never_overlap_after_a_sequence_of_commands() {
    let mut store = SchedulingStore::default();
    for start in ["2024-01-08", "2024-02-05", "2024-01-20", "2024-03-04", "2024/04/01"] {
        let _ = store.add_slot(start, false);
        assert_no_overlap(&store);
    }
    assert_eq!(store.slots().len(), 4);

    let _ = store.update_slot(4, "2024-03-20", None);
    assert_no_overlap(&store);
    assert!(store.assert_all_slots_non_overlapping().is_ok());
}

#[test]
fn slot_days_stop_before_next_slot() {
    let mut store = SchedulingStore::default();
    let first = store.add_slot("2024-01-08", false).unwrap();
    let second = store.add_slot("2024-02-05", false).unwrap();
    // Pin the first slot's end well before its successor starts
    let mut snapshot = store.snapshot().clone();
    snapshot.slots[0] = Slot::new(first, date(2024, 1, 8)).ending(date(2024, 1, 31));
    store.import(snapshot).unwrap();

    let next_start = store.get_slot(SlotRef::Id(second)).unwrap().start;
    assert!(store.slot_days(SlotRef::Id(first)).iter().all(|d| *d < next_start));
    assert_eq!(store.slot_days(SlotRef::Id(first)).last(), Some(&date(2024, 1, 31)));
}

#[test]
fn slot_with_runs_cannot_be_deleted() {
    let mut store = staffed_store();
    store
        .add_course_run(CourseRun::new(0, 1, 1).cohort(1).teacher(1))
        .unwrap();

    let err = store.delete_slot(1).unwrap_err();
    assert_eq!(
        err.conflict().map(|c| c.conflict_type),
        Some(ConflictType::SlotInUse)
    );

    store.delete_slot(2).unwrap();
    assert!(store.get_slot(SlotRef::Id(2)).is_none());
    assert!(store.snapshot().slot_days.iter().all(|d| d.slot_id != 2));
    assert!(store.snapshot().teaching_days.iter().all(|t| t.slot_id != 2));
}

#[test]
fn unknown_ids_are_not_found() {
    let mut store = staffed_store();
    assert!(matches!(
        store.delete_course(42),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        store.toggle_slot_availability(1, SlotRef::Id(42)),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        store.toggle_slot_availability(1, date(2030, 1, 1)),
        Err(EngineError::InvalidArgument(_))
    ));
    assert_eq!(
        store.assign_teacher(42, 1).unwrap_err().to_string(),
        "course run 42 not found"
    );
}

// =============================================================================
// Course runs and repairs
// =============================================================================

#[test]
fn run_needs_a_cohort() {
    let mut store = staffed_store();
    let err = store.add_course_run(CourseRun::new(0, 1, 1)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));

    let run = store
        .add_course_run(CourseRun::new(0, 1, 1).cohort(1).teacher(1))
        .unwrap();
    let mut emptied = store.get_course_run(run).unwrap().clone();
    emptied.cohorts.clear();
    store.update_course_run(emptied).unwrap();
    assert!(store.course_runs().is_empty());
}

#[test]
fn teacher_keeps_one_course_per_slot() {
    let mut store = staffed_store();
    let alpha = store
        .add_course_run(CourseRun::new(0, 1, 1).cohort(1).teacher(1))
        .unwrap();
    let beta = store
        .add_course_run(CourseRun::new(0, 2, 1).cohort(1).teacher(2))
        .unwrap();

    store.assign_teacher(beta, 1).unwrap();
    let dropped = &store.last_repairs().dropped_assignments;
    assert_eq!(dropped.len(), 1);
    assert_eq!((dropped[0].teacher_id, dropped[0].kept_course_id), (1, 1));

    assert_eq!(store.get_course_run(alpha).unwrap().teachers, vec![1]);
    assert_eq!(store.get_course_run(beta).unwrap().teachers, vec![2]);
    assert!(!validation::has_exclusivity_conflict(store.snapshot()));
}

#[test]
fn exclusivity_holds_per_slot_for_imported_data() {
    let mut store = SchedulingStore::default();
    store
        .import(Snapshot {
            courses: vec![Course::new(1, "A", "Alpha"), Course::new(2, "B", "Beta")],
            cohorts: vec![Cohort::new(1, date(2023, 8, 21))],
            teachers: vec![Teacher::new(1, "Robin"), Teacher::new(2, "Kim")],
            slots: vec![Slot::new(1, date(2024, 1, 8))],
            course_runs: vec![
                CourseRun::new(1, 1, 1).cohort(1).teacher(1).teacher(2),
                CourseRun::new(2, 2, 1).cohort(1).teacher(2).teacher(1),
            ],
            ..Snapshot::default()
        })
        .unwrap();

    let mut courses_per_teacher: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
    for run in store.course_runs() {
        for teacher in &run.teachers {
            let courses = courses_per_teacher.entry((run.slot_id, *teacher)).or_default();
            if !courses.contains(&run.course_id) {
                courses.push(run.course_id);
            }
        }
    }
    assert!(courses_per_teacher.values().all(|c| c.len() == 1));
    // Run 2 lost both teachers and nobody else can take course 2
    assert_eq!(store.course_runs().len(), 1);
    assert_eq!(store.last_repairs().removed_offerings.len(), 1);
}

#[test]
fn no_orphaned_offerings_remain() {
    let mut store = staffed_store();
    store
        .add_course_run(CourseRun::new(0, 1, 2).cohort(1))
        .unwrap();
    store
        .add_course_run(CourseRun::new(0, 2, 2).cohort(1).teacher(2))
        .unwrap();
    assert_eq!(store.course_runs().len(), 2);

    // Robin goes on leave for slot 2; Kim still covers course 1 as compatible
    store.toggle_slot_availability(1, SlotRef::Id(2)).unwrap();
    assert_eq!(store.course_runs().len(), 2);

    store.toggle_slot_availability(2, SlotRef::Id(2)).unwrap();
    // Kim is assigned to course 2 so that run stays; course 1 has nobody
    assert_eq!(store.course_runs().len(), 1);
    assert_eq!(store.course_runs()[0].course_id, 2);

    for run in store.course_runs() {
        assert!(
            !run.teachers.is_empty()
                || validation::has_available_teacher(store.snapshot(), run.course_id, run.slot_id)
        );
    }
}

// =============================================================================
// Cascades
// =============================================================================

#[test]
fn deleting_entities_cascades() {
    let mut store = staffed_store();
    let second_cohort = store.add_cohort(Cohort::new(0, date(2024, 8, 19))).unwrap();
    store
        .add_course_run(CourseRun::new(0, 1, 1).cohort(1).cohort(second_cohort).teacher(1))
        .unwrap();
    store
        .add_course_run(CourseRun::new(0, 2, 2).cohort(1).teacher(2))
        .unwrap();
    store.toggle_day_availability(1, "2024-02-06").unwrap();

    store.delete_cohort(1).unwrap();
    assert_eq!(store.course_runs().len(), 1);
    assert_eq!(store.course_runs()[0].cohorts, vec![second_cohort]);

    store.delete_teacher(1).unwrap();
    assert!(store.availability().is_empty());
    // Kim is still compatible, so the now teacherless run survives
    assert_eq!(store.course_runs().len(), 1);
    assert!(store.course_runs()[0].teachers.is_empty());

    store.delete_course(1).unwrap();
    assert!(store.course_runs().is_empty());
    assert!(store.snapshot().course_slots.iter().all(|cs| cs.course_id != 1));
}

// =============================================================================
// Notifications
// =============================================================================

#[test]
fn every_command_notifies_subscribers() {
    let mut store = SchedulingStore::default();
    let events: Arc<Mutex<Vec<StoreEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let id = store.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    store.add_course(Course::new(0, "A", "Alpha")).unwrap();
    store.add_slot("2024-01-08", false).unwrap();
    // Rejected commands do not notify
    let _ = store.add_slot("2024-01-09", false);

    let kinds: Vec<ChangeKind> = events.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Course, ChangeKind::Slot]);

    assert!(store.unsubscribe(id));
    store.add_slot("2024-02-05", false).unwrap();
    assert_eq!(events.lock().unwrap().len(), 2);
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn repair_events_carry_the_report() {
    let mut store = staffed_store();
    let events: Arc<Mutex<Vec<StoreEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    store.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    store
        .add_course_run(CourseRun::new(0, 1, 1).cohort(1))
        .unwrap();
    let slot = store.get_slot(SlotRef::Id(1)).unwrap().clone();
    for teacher in [1, 2] {
        store
            .add_availability(TeacherAvailability::busy_slot(0, teacher, &slot))
            .unwrap();
    }

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, ChangeKind::Availability);
    assert_eq!(last.repairs.removed_offerings.len(), 1);
}

#[test]
fn explicit_validation_reports_nothing_on_clean_state() {
    let mut store = staffed_store();
    assert!(store.validate().is_empty());
    assert!(store.validate_teacher_assignments().is_empty());
    assert!(store.validate_courses_have_teachers().is_empty());
}

// =============================================================================
// Randomize
// =============================================================================

#[test]
fn randomized_courses_are_reproducible() {
    let mut a = staffed_store();
    let mut b = staffed_store();
    a.randomize_teacher_courses(1, 2, &mut StdRng::seed_from_u64(9)).unwrap();
    b.randomize_teacher_courses(1, 2, &mut StdRng::seed_from_u64(9)).unwrap();

    assert_eq!(a.teachers(), b.teachers());
    for teacher in a.teachers() {
        assert!((1..=2).contains(&teacher.compatible_courses.len()));
    }
}

#[test]
fn import_strips_self_prerequisites() {
    let mut store = SchedulingStore::default();
    store
        .import(Snapshot {
            courses: vec![
                Course::new(1, "A", "Alpha").requires(1),
                Course::new(2, "B", "Beta").requires(2).requires(1).requires(1),
            ],
            ..Snapshot::default()
        })
        .unwrap();

    assert_eq!(store.get_course(1).map(|c| c.prerequisites.clone()), Some(vec![]));
    assert_eq!(store.get_course(2).map(|c| c.prerequisites.clone()), Some(vec![1]));
    assert!(store.all_prerequisites(1).is_complete());
    assert!(store.all_prerequisites(2).is_complete());
}
