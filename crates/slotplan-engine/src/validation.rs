//! Assignment validation and repair
//!
//! Two repairs mutate the snapshot instead of rejecting a command:
//! teacher exclusivity per slot, and removal of course offerings no
//! teacher can take. Slot overlap is checked, never repaired.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use slotplan_core::{
    Conflict, ConflictType, CourseId, DroppedAssignment, RemovedOffering, Slot, SlotId, Snapshot,
    TeacherId,
};

use crate::availability::is_unavailable;

// ============================================================================
// Teacher exclusivity
// ============================================================================

/// Keep every teacher on a single course per slot.
///
/// Runs are visited in stored order; the first course a teacher is seen
/// with in a slot wins and the teacher is dropped from runs of any other
/// course in that slot.
pub fn validate_teacher_assignments(snapshot: &mut Snapshot) -> Vec<DroppedAssignment> {
    let mut first_seen: BTreeMap<SlotId, HashMap<TeacherId, CourseId>> = BTreeMap::new();
    let mut dropped = Vec::new();

    for run in snapshot.course_runs.iter_mut() {
        let seen = first_seen.entry(run.slot_id).or_default();
        let (course_id, slot_id, run_id) = (run.course_id, run.slot_id, run.id);

        run.teachers.retain(|teacher| {
            let kept = *seen.entry(*teacher).or_insert(course_id);
            if kept == course_id {
                return true;
            }
            dropped.push(DroppedAssignment {
                teacher_id: *teacher,
                slot_id,
                run_id,
                course_id,
                kept_course_id: kept,
            });
            false
        });
    }

    dropped
}

/// Whether a teacher id is tied to two courses in one slot
pub fn has_exclusivity_conflict(snapshot: &Snapshot) -> bool {
    let mut courses: HashMap<(SlotId, TeacherId), CourseId> = HashMap::new();
    snapshot.course_runs.iter().any(|run| {
        run.teachers.iter().any(|teacher| {
            *courses
                .entry((run.slot_id, *teacher))
                .or_insert(run.course_id)
                != run.course_id
        })
    })
}

// ============================================================================
// Orphaned offerings
// ============================================================================

/// A teacher who could take `course` in `slot`: compatible, and either
/// already assigned there or not unavailable for the slot
pub fn has_available_teacher(snapshot: &Snapshot, course: CourseId, slot: SlotId) -> bool {
    snapshot
        .teachers
        .iter()
        .filter(|t| t.is_compatible(course))
        .any(|t| {
            let assigned = snapshot
                .runs_in_slot(slot)
                .any(|r| r.course_id == course && r.teachers.contains(&t.id));
            assigned || !is_unavailable(snapshot, t.id, slot)
        })
}

/// Delete offerings left without any teacher.
///
/// For each (slot, course) pair with runs: when no run has an assigned
/// teacher and no compatible teacher is available, every run of the pair
/// is deleted and reported. The course-slot link stays.
pub fn validate_courses_have_teachers(snapshot: &mut Snapshot) -> Vec<RemovedOffering> {
    let pairs: BTreeSet<(SlotId, CourseId)> = snapshot
        .course_runs
        .iter()
        .map(|r| (r.slot_id, r.course_id))
        .collect();

    let mut removed = Vec::new();
    for (slot_id, course_id) in pairs {
        let staffed = snapshot
            .runs_in_slot(slot_id)
            .any(|r| r.course_id == course_id && !r.teachers.is_empty());
        if staffed || has_available_teacher(snapshot, course_id, slot_id) {
            continue;
        }

        let mut run_ids = Vec::new();
        let mut cohort_ids = Vec::new();
        for run in snapshot
            .course_runs
            .iter()
            .filter(|r| r.slot_id == slot_id && r.course_id == course_id)
        {
            run_ids.push(run.id);
            for cohort in &run.cohorts {
                if !cohort_ids.contains(cohort) {
                    cohort_ids.push(*cohort);
                }
            }
        }
        snapshot
            .course_runs
            .retain(|r| !(r.slot_id == slot_id && r.course_id == course_id));

        removed.push(RemovedOffering {
            course_id,
            course_name: snapshot
                .get_course(course_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            slot_id,
            run_ids,
            cohort_names: snapshot.cohort_names(&cohort_ids),
            cohort_ids,
        });
    }

    removed
}

// ============================================================================
// Slot overlap
// ============================================================================

/// First slot whose `[start, end]` intersects the given range
pub fn find_overlapping_slot(
    slots: &[Slot],
    start: NaiveDate,
    end: NaiveDate,
    ignore: Option<SlotId>,
) -> Option<&Slot> {
    slots
        .iter()
        .filter(|s| Some(s.id) != ignore)
        .find(|s| s.overlaps(start, end))
}

pub(crate) fn overlap_conflict(start: NaiveDate, end: NaiveDate, id: Option<SlotId>, other: &Slot) -> Conflict {
    Conflict {
        conflict_type: ConflictType::SlotOverlap,
        description: format!(
            "slot {} to {} overlaps slot {} ({} to {})",
            start, end, other.id, other.start, other.end
        ),
        involved_slots: id.into_iter().chain([other.id]).collect(),
    }
}

/// Check that no two slots share a day.
///
/// Slots are sorted by start; comparing neighbours is enough because any
/// overlap implies one between adjacent starts.
pub fn assert_all_slots_non_overlapping(slots: &[Slot]) -> Result<(), Conflict> {
    let mut ordered: Vec<&Slot> = slots.iter().collect();
    ordered.sort_by_key(|s| (s.start, s.id));

    for pair in ordered.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        if later.start <= earlier.end {
            return Err(overlap_conflict(earlier.start, earlier.end, Some(earlier.id), later));
        }
    }
    Ok(())
}
