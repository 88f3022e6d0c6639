//! Prerequisite closure and ordering checks
//!
//! The prerequisite graph is walked depth-first with a visited set, so a
//! cycle cannot loop forever. Unlike a plain visited-set walk, the closure
//! reports whether a cycle was met so callers can warn about it instead of
//! silently trusting an under-specified graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use slotplan_core::{
    CohortId, Course, CourseId, CourseRun, PrerequisiteViolation, Snapshot, ViolationKind,
};

use crate::slot_days::effective_end;

/// Transitive prerequisites of a course
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrerequisiteClosure {
    /// Every reachable prerequisite, graph is acyclic below the course
    Complete(BTreeSet<CourseId>),
    /// A cycle was met; `cycle` lists the courses on it in walk order
    Cyclic {
        prerequisites: BTreeSet<CourseId>,
        cycle: Vec<CourseId>,
    },
}

impl PrerequisiteClosure {
    /// The prerequisite ids, whether or not a cycle was met
    pub fn prerequisites(&self) -> &BTreeSet<CourseId> {
        match self {
            PrerequisiteClosure::Complete(ids) => ids,
            PrerequisiteClosure::Cyclic { prerequisites, .. } => prerequisites,
        }
    }

    pub fn into_prerequisites(self) -> BTreeSet<CourseId> {
        match self {
            PrerequisiteClosure::Complete(ids) => ids,
            PrerequisiteClosure::Cyclic { prerequisites, .. } => prerequisites,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PrerequisiteClosure::Complete(_))
    }

    pub fn contains(&self, course: CourseId) -> bool {
        self.prerequisites().contains(&course)
    }
}

struct Walk<'a> {
    courses: HashMap<CourseId, &'a Course>,
    visited: HashSet<CourseId>,
    /// Courses on the current walk path, mirrored by the work stack
    on_path: HashSet<CourseId>,
    found: BTreeSet<CourseId>,
    cycle: Option<Vec<CourseId>>,
}

impl<'a> Walk<'a> {
    fn prerequisites_of(&self, id: CourseId) -> &'a [CourseId] {
        self.courses
            .get(&id)
            .copied()
            .map_or(&[][..], |c| c.prerequisites.as_slice())
    }

    /// Depth-first walk from `root` on an explicit stack of
    /// (course, next prerequisite index) frames
    fn run(&mut self, root: CourseId) {
        let mut stack: Vec<(CourseId, usize)> = vec![(root, 0)];
        self.on_path.insert(root);

        while let Some(frame) = stack.last_mut() {
            let (id, next) = *frame;
            let Some(&prerequisite) = self.prerequisites_of(id).get(next) else {
                self.on_path.remove(&id);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            // Broken references are excluded from resolution
            if !self.courses.contains_key(&prerequisite) {
                continue;
            }
            if self.on_path.contains(&prerequisite) {
                if self.cycle.is_none() {
                    let from = stack.iter().position(|(p, _)| *p == prerequisite).unwrap_or(0);
                    self.cycle = Some(stack[from..].iter().map(|(p, _)| *p).collect());
                }
                continue;
            }
            if !self.visited.insert(prerequisite) {
                continue;
            }
            self.found.insert(prerequisite);
            self.on_path.insert(prerequisite);
            stack.push((prerequisite, 0));
        }
    }
}

/// Direct and transitive prerequisites of `course_id`.
///
/// The course itself is never part of its own closure. Unknown course ids
/// yield an empty complete closure.
pub fn all_prerequisites(courses: &[Course], course_id: CourseId) -> PrerequisiteClosure {
    let mut walk = Walk {
        courses: courses.iter().map(|c| (c.id, c)).collect(),
        visited: HashSet::from([course_id]),
        on_path: HashSet::new(),
        found: BTreeSet::new(),
        cycle: None,
    };
    walk.run(course_id);

    match walk.cycle {
        None => PrerequisiteClosure::Complete(walk.found),
        Some(cycle) => PrerequisiteClosure::Cyclic {
            prerequisites: walk.found,
            cycle,
        },
    }
}

/// Direct prerequisites that break ordering for some cohort.
///
/// A prerequisite is `Missing` when the cohort has no run of it at all and
/// `BeforePrerequisite` when its earliest run ends on or after the day the
/// dependent run starts.
pub fn find_prerequisite_violations(snapshot: &Snapshot) -> Vec<PrerequisiteViolation> {
    let mut violations = Vec::new();

    for cohort in &snapshot.cohorts {
        let runs: Vec<&CourseRun> = snapshot
            .course_runs
            .iter()
            .filter(|r| r.cohorts.contains(&cohort.id))
            .collect();

        for run in &runs {
            let Some(course) = snapshot.get_course(run.course_id) else {
                continue;
            };
            let Some(slot) = snapshot.get_slot(run.slot_id) else {
                continue;
            };

            for &prerequisite in &course.prerequisites {
                if prerequisite == course.id || snapshot.get_course(prerequisite).is_none() {
                    continue;
                }
                if let Some(kind) = classify(snapshot, &runs, prerequisite, slot.start) {
                    violations.push(PrerequisiteViolation {
                        cohort_id: cohort.id,
                        course_id: course.id,
                        run_id: run.id,
                        prerequisite_id: prerequisite,
                        kind,
                    });
                }
            }
        }
    }

    violations
}

fn classify(
    snapshot: &Snapshot,
    cohort_runs: &[&CourseRun],
    prerequisite: CourseId,
    dependent_start: chrono::NaiveDate,
) -> Option<ViolationKind> {
    let earliest_end = cohort_runs
        .iter()
        .filter(|r| r.course_id == prerequisite)
        .filter_map(|r| snapshot.get_slot(r.slot_id))
        .map(|slot| effective_end(snapshot, slot))
        .min();

    match earliest_end {
        None => Some(ViolationKind::Missing),
        Some(end) if end >= dependent_start => Some(ViolationKind::BeforePrerequisite),
        Some(_) => None,
    }
}

/// Cohorts with at least one prerequisite violation
pub fn cohorts_with_violations(violations: &[PrerequisiteViolation]) -> BTreeSet<CohortId> {
    violations.iter().map(|v| v.cohort_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use slotplan_core::{Cohort, Slot};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn chain() -> Vec<Course> {
        vec![
            Course::new(1, "A", "Alpha"),
            Course::new(2, "B", "Beta").requires(1),
            Course::new(3, "C", "Gamma").requires(2),
            Course::new(4, "D", "Delta").requires(3).requires(1).requires(99),
        ]
    }

    #[test]
    fn closure_collects_transitive_prerequisites() {
        let closure = all_prerequisites(&chain(), 4);
        assert!(closure.is_complete());
        assert_eq!(closure.into_prerequisites(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn closure_of_root_course_is_empty() {
        let closure = all_prerequisites(&chain(), 1);
        assert_eq!(closure, PrerequisiteClosure::Complete(BTreeSet::new()));
        assert_eq!(all_prerequisites(&chain(), 42).prerequisites().len(), 0);
    }

    #[test]
    fn closure_reports_cycles() {
        let mut courses = chain();
        // 1 -> 3 closes the loop 1 -> 3 -> 2 -> 1
        courses[0].prerequisites.push(3);
        let closure = all_prerequisites(&courses, 2);
        match &closure {
            PrerequisiteClosure::Cyclic { prerequisites, cycle } => {
                assert_eq!(prerequisites, &BTreeSet::from([1, 3]));
                assert_eq!(cycle, &vec![2, 1, 3]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(!closure.contains(2));
    }

    #[test]
    fn deep_chain_does_not_exhaust_the_stack() {
        let depth: CourseId = 200_000;
        let courses: Vec<Course> = (1..=depth)
            .map(|id| {
                let course = Course::new(id, format!("C{}", id), "Chain");
                if id > 1 {
                    course.requires(id - 1)
                } else {
                    course
                }
            })
            .collect();

        let closure = all_prerequisites(&courses, depth);
        assert!(closure.is_complete());
        assert_eq!(closure.prerequisites().len(), depth as usize - 1);

        let mut looped = courses;
        looped[0].prerequisites.push(depth);
        match all_prerequisites(&looped, depth) {
            PrerequisiteClosure::Cyclic { prerequisites, cycle } => {
                assert_eq!(prerequisites.len(), depth as usize - 1);
                assert_eq!(cycle.len(), depth as usize);
                assert_eq!(cycle.first(), Some(&depth));
            }
            PrerequisiteClosure::Complete(_) => panic!("expected a cycle"),
        }
    }

    #[test]
    fn closure_is_a_fixed_point() {
        let courses = chain();
        let first = all_prerequisites(&courses, 4).into_prerequisites();
        let mut second = first.clone();
        for id in &first {
            second.extend(all_prerequisites(&courses, *id).into_prerequisites());
        }
        assert_eq!(first, second);
    }

    fn scheduled(runs: Vec<CourseRun>, slots: Vec<Slot>) -> Snapshot {
        Snapshot {
            courses: vec![Course::new(1, "Y", "Course Y"), Course::new(2, "X", "Course X").requires(1)],
            cohorts: vec![Cohort::new(10, d(2023, 8, 21))],
            slots,
            course_runs: runs,
            ..Snapshot::default()
        }
    }

    #[test]
    fn unscheduled_prerequisite_is_missing() {
        let snapshot = scheduled(
            vec![CourseRun::new(1, 2, 1).cohort(10)],
            vec![Slot::new(1, d(2024, 1, 8))],
        );
        let violations = find_prerequisite_violations(&snapshot);
        assert_eq!(
            violations,
            vec![PrerequisiteViolation {
                cohort_id: 10,
                course_id: 2,
                run_id: 1,
                prerequisite_id: 1,
                kind: ViolationKind::Missing,
            }]
        );
    }

    #[test]
    fn prerequisite_in_same_or_later_slot_is_late() {
        let slots = vec![Slot::new(1, d(2024, 1, 8)), Slot::new(2, d(2024, 2, 5))];
        let snapshot = scheduled(
            vec![CourseRun::new(1, 2, 1).cohort(10), CourseRun::new(2, 1, 2).cohort(10)],
            slots,
        );
        let violations = find_prerequisite_violations(&snapshot);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::BeforePrerequisite);
    }

    #[test]
    fn prerequisite_in_earlier_slot_is_fine() {
        let slots = vec![Slot::new(1, d(2024, 1, 8)), Slot::new(2, d(2024, 2, 5))];
        let snapshot = scheduled(
            vec![CourseRun::new(1, 1, 1).cohort(10), CourseRun::new(2, 2, 2).cohort(10)],
            slots,
        );
        assert!(find_prerequisite_violations(&snapshot).is_empty());
    }

    #[test]
    fn only_direct_prerequisites_are_checked() {
        let mut snapshot = scheduled(
            vec![CourseRun::new(1, 3, 2).cohort(10), CourseRun::new(2, 2, 1).cohort(10)],
            vec![Slot::new(1, d(2024, 1, 8)), Slot::new(2, d(2024, 2, 5))],
        );
        snapshot.courses.push(Course::new(3, "Z", "Course Z").requires(2));
        // Z needs X (scheduled earlier), X needs Y (missing): only X's record
        let violations = find_prerequisite_violations(&snapshot);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].course_id, 2);
        assert_eq!(cohorts_with_violations(&violations), BTreeSet::from([10]));
    }
}
