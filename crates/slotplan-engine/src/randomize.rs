//! Random teacher/course compatibility for demos and tests

use rand::prelude::IndexedRandom;
use rand::Rng;
use slotplan_core::{CourseId, EngineError, Snapshot};

/// Give every teacher a random subset of all courses.
///
/// Subset sizes are drawn from `min..=max`, clamped to the number of
/// courses. Existing compatibility lists are replaced.
pub fn randomize_teacher_courses<R: Rng>(
    snapshot: &mut Snapshot,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Result<(), EngineError> {
    if min > max {
        return Err(EngineError::InvalidArgument(format!(
            "min ({}) must not exceed max ({})",
            min, max
        )));
    }

    let course_ids: Vec<CourseId> = snapshot.courses.iter().map(|c| c.id).collect();
    let upper = max.min(course_ids.len());
    let lower = min.min(upper);

    for teacher in snapshot.teachers.iter_mut() {
        let size = rng.random_range(lower..=upper);
        let mut picked: Vec<CourseId> = course_ids.choose_multiple(rng, size).copied().collect();
        picked.sort_unstable();
        teacher.compatible_courses = picked;
    }

    Ok(())
}
