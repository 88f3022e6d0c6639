//! The scheduling store
//!
//! [`SchedulingStore`] owns the snapshot and is the only way to change it.
//! Every command either fails without touching state or runs to completion
//! and commits: slot ends are normalized, both repair passes run, and
//! subscribers receive one [`StoreEvent`].

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rand::Rng;
use slotplan_core::{
    normalize_slots_in_place, Cohort, CohortId, Conflict, ConflictType, Course, CourseId, CourseRun,
    DroppedAssignment, EngineConfig, EngineError, EntityKind, ExamDate, IntoDateOnly,
    Persistence, PrerequisiteViolation, RemovedOffering, RepairReport, RunId, Slot, SlotId,
    SlotRef, Snapshot, Teacher, TeacherAvailability, TeacherId, AvailabilityId,
};
use tracing::{debug, info, warn};

use crate::availability::{self, expand_day_records, SlotToggle};
use crate::events::{ChangeKind, StoreEvent, SubscriptionId, Subscribers};
use crate::prerequisites::{self, PrerequisiteClosure};
use crate::randomize;
use crate::slot_days::{self, materialize_slot_days};
use crate::teaching_days::{self, TeachingDayState};
use crate::validation;

/// Store handle shared between threads.
///
/// All mutating calls go through the one mutex, so repair passes never
/// interleave. Subscribers run while the mutex is held and must not lock
/// it again; see [`SchedulingStore::subscribe`].
pub type SharedStore = Arc<Mutex<SchedulingStore>>;

/// Aggregate root for all scheduling data
#[derive(Debug)]
pub struct SchedulingStore {
    data: Snapshot,
    config: EngineConfig,
    subscribers: Subscribers,
    last_repairs: RepairReport,
}

impl Default for SchedulingStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn next_id<T>(items: &[T], id: impl Fn(&T) -> u32) -> u32 {
    items.iter().map(id).max().map_or(1, |max| max + 1)
}

fn dedup_ids(ids: &mut Vec<u32>) {
    let mut seen = Vec::with_capacity(ids.len());
    ids.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });
}

fn parse_date(value: impl IntoDateOnly, what: &str) -> Result<NaiveDate, EngineError> {
    value
        .into_date_only()
        .ok_or_else(|| EngineError::InvalidDate(format!("{} is not a valid date", what)))
}

impl SchedulingStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            data: Snapshot::default(),
            config,
            subscribers: Subscribers::default(),
            last_repairs: RepairReport::default(),
        }
    }

    /// Load a snapshot from `backend` and import it
    pub fn load(backend: &dyn Persistence, config: EngineConfig) -> Result<Self, EngineError> {
        let snapshot = backend.load()?;
        let mut store = Self::new(config);
        store.import(snapshot)?;
        Ok(store)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    /// Repairs applied by the most recent commit
    pub fn last_repairs(&self) -> &RepairReport {
        &self.last_repairs
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a callback run after every committed change.
    ///
    /// Callbacks run inside the mutating call, while the store is mutably
    /// borrowed (and, behind a [`SharedStore`], while its mutex is held).
    /// A callback that needs fresh state must not lock the store itself;
    /// it should hand the event to another thread, for example over a
    /// channel, and let that thread query once the command has returned.
    pub fn subscribe(&mut self, callback: impl FnMut(&StoreEvent) + Send + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ========================================================================
    // Commit pipeline
    // ========================================================================

    /// Re-derive slot ends. Every stored slot passed the end check on entry,
    /// so a failure here leaves the offending end as stored.
    fn renormalize_slots(&mut self) {
        if let Err(err) = normalize_slots_in_place(&mut self.data.slots, &self.config) {
            warn!(error = %err, "slot end kept as stored");
        }
    }

    fn run_repairs(&mut self) -> RepairReport {
        self.renormalize_slots();
        self.data.course_runs.retain(|r| !r.cohorts.is_empty());

        let report = RepairReport {
            dropped_assignments: validation::validate_teacher_assignments(&mut self.data),
            removed_offerings: validation::validate_courses_have_teachers(&mut self.data),
        };
        log_repairs(&report);
        report
    }

    fn finish(&mut self, kind: ChangeKind, repairs: RepairReport) {
        debug!(kind = %kind, repaired = !repairs.is_empty(), "change committed");
        self.last_repairs = repairs.clone();
        self.subscribers.notify(&StoreEvent { kind, repairs });
    }

    fn commit(&mut self, kind: ChangeKind) {
        let repairs = self.run_repairs();
        self.finish(kind, repairs);
    }

    /// Recompute everything derived from the slot set
    fn refresh_slot_derivations(&mut self) {
        self.renormalize_slots();
        self.data.slot_days = materialize_slot_days(&self.data.slots);

        let slot_ids: Vec<SlotId> = self.data.slots.iter().map(|s| s.id).collect();
        for slot_id in slot_ids {
            teaching_days::prune_outside_slot(&mut self.data, slot_id);
        }
        teaching_days::materialize_default_teaching_days(&mut self.data, &self.config);

        for record in self.data.availability.iter_mut() {
            if let Some(slot) = record.slot_id.and_then(|id| self.data.slots.iter().find(|s| s.id == id)) {
                record.from_date = slot.start;
                record.to_date = slot.end;
            }
        }
    }

    /// Cohort names follow chronological order: "Cohort 1", "Cohort 2", ...
    fn renumber_cohorts(&mut self) {
        self.data.cohorts.sort_by_key(|c| (c.start_date, c.id));
        for (position, cohort) in self.data.cohorts.iter_mut().enumerate() {
            cohort.name = format!("Cohort {}", position + 1);
        }
    }

    // ========================================================================
    // Import and persistence
    // ========================================================================

    /// Replace every collection with `snapshot` and rebuild derived records.
    ///
    /// Rejected without touching the store when the imported slots overlap
    /// or a slot's end lies past the last supported date.
    pub fn import(&mut self, mut snapshot: Snapshot) -> Result<RepairReport, EngineError> {
        normalize_slots_in_place(&mut snapshot.slots, &self.config)?;
        validation::assert_all_slots_non_overlapping(&snapshot.slots).map_err(EngineError::Conflict)?;

        for course in &mut snapshot.courses {
            let id = course.id;
            if course.prerequisites.contains(&id) {
                warn!(course = id, "dropping self-referencing prerequisite");
            }
            course.prerequisites.retain(|p| *p != id);
            dedup_ids(&mut course.prerequisites);
        }

        let dropped_runs = snapshot.course_runs.iter().filter(|r| r.cohorts.is_empty()).count();
        if dropped_runs > 0 {
            warn!(count = dropped_runs, "dropping imported course runs without cohorts");
        }
        snapshot.course_runs.retain(|r| !r.cohorts.is_empty());
        snapshot.availability = expand_day_records(std::mem::take(&mut snapshot.availability));

        self.data = snapshot;
        self.data.slot_days = materialize_slot_days(&self.data.slots);

        let pairs: Vec<(CourseId, SlotId)> = self
            .data
            .course_runs
            .iter()
            .map(|r| (r.course_id, r.slot_id))
            .collect();
        for (course_id, slot_id) in pairs {
            teaching_days::ensure_course_slot(&mut self.data, course_id, slot_id);
        }
        teaching_days::fold_course_teaching_days(&mut self.data, &self.config);
        self.refresh_slot_derivations();
        self.renumber_cohorts();

        info!(
            courses = self.data.courses.len(),
            teachers = self.data.teachers.len(),
            slots = self.data.slots.len(),
            runs = self.data.course_runs.len(),
            "snapshot imported"
        );
        self.commit(ChangeKind::Import);
        Ok(self.last_repairs.clone())
    }

    /// Normalize, validate and save the current state
    pub fn persist(&mut self, backend: &dyn Persistence) -> Result<(), EngineError> {
        validation::assert_all_slots_non_overlapping(&self.data.slots).map_err(EngineError::Conflict)?;
        let repairs = self.run_repairs();
        if !repairs.is_empty() {
            self.finish(ChangeKind::Repair, repairs);
        }

        backend.save(&self.data)?;
        info!(
            runs = self.data.course_runs.len(),
            slots = self.data.slots.len(),
            "snapshot persisted"
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn courses(&self) -> &[Course] {
        &self.data.courses
    }

    pub fn cohorts(&self) -> &[Cohort] {
        &self.data.cohorts
    }

    pub fn teachers(&self) -> &[Teacher] {
        &self.data.teachers
    }

    pub fn slots(&self) -> &[Slot] {
        &self.data.slots
    }

    pub fn course_runs(&self) -> &[CourseRun] {
        &self.data.course_runs
    }

    pub fn availability(&self) -> &[TeacherAvailability] {
        &self.data.availability
    }

    pub fn get_course(&self, id: CourseId) -> Option<&Course> {
        self.data.get_course(id)
    }

    pub fn get_cohort(&self, id: CohortId) -> Option<&Cohort> {
        self.data.get_cohort(id)
    }

    pub fn get_teacher(&self, id: TeacherId) -> Option<&Teacher> {
        self.data.get_teacher(id)
    }

    pub fn get_slot(&self, slot: impl Into<SlotRef>) -> Option<&Slot> {
        self.data.resolve_slot(slot)
    }

    pub fn get_course_run(&self, id: RunId) -> Option<&CourseRun> {
        self.data.get_run(id)
    }

    pub fn get_availability(&self, id: AvailabilityId) -> Option<&TeacherAvailability> {
        self.data.get_availability(id)
    }

    /// Transitive prerequisites, warning when the graph has a cycle
    pub fn all_prerequisites(&self, course_id: CourseId) -> PrerequisiteClosure {
        let closure = prerequisites::all_prerequisites(&self.data.courses, course_id);
        if let PrerequisiteClosure::Cyclic { cycle, .. } = &closure {
            warn!(course = course_id, cycle = ?cycle, "prerequisite cycle");
        }
        closure
    }

    pub fn find_prerequisite_violations(&self) -> Vec<PrerequisiteViolation> {
        prerequisites::find_prerequisite_violations(&self.data)
    }

    pub fn slot_days(&self, slot: impl Into<SlotRef>) -> Vec<NaiveDate> {
        slot_days::slot_days(&self.data, slot)
    }

    pub fn is_unavailable(&self, teacher: TeacherId, slot: impl Into<SlotRef>) -> bool {
        availability::is_unavailable(&self.data, teacher, slot)
    }

    pub fn unavailable_fraction(&self, teacher: TeacherId, slot: impl Into<SlotRef>) -> f64 {
        availability::unavailable_fraction(&self.data, teacher, slot)
    }

    pub fn is_unavailable_on_day(&self, teacher: TeacherId, date: NaiveDate) -> bool {
        availability::is_unavailable_on_day(&self.data, teacher, date)
    }

    pub fn teaching_day_state(
        &self,
        slot_id: SlotId,
        date: NaiveDate,
        course_id: Option<CourseId>,
    ) -> Option<TeachingDayState> {
        teaching_days::teaching_day_state(&self.data, &self.config, slot_id, date, course_id)
    }

    pub fn teaching_days(&self, slot_id: SlotId, course_id: Option<CourseId>) -> Vec<NaiveDate> {
        teaching_days::teaching_days(&self.data, &self.config, slot_id, course_id)
    }

    pub fn exam_date(&self, slot_id: SlotId) -> Option<&ExamDate> {
        self.data.exam_date(slot_id)
    }

    pub fn is_exam_date_locked(&self, slot_id: SlotId) -> bool {
        teaching_days::is_exam_date_locked(&self.data, slot_id)
    }

    pub fn find_overlapping_slot(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        ignore: Option<SlotId>,
    ) -> Option<&Slot> {
        validation::find_overlapping_slot(&self.data.slots, start, end, ignore)
    }

    pub fn assert_all_slots_non_overlapping(&self) -> Result<(), EngineError> {
        validation::assert_all_slots_non_overlapping(&self.data.slots).map_err(EngineError::Conflict)
    }

    // ========================================================================
    // Lookups used by commands
    // ========================================================================

    fn require_slot(&self, slot: impl Into<SlotRef>) -> Result<SlotId, EngineError> {
        let slot = slot.into();
        self.data
            .resolve_slot(slot)
            .map(|s| s.id)
            .ok_or_else(|| match slot {
                SlotRef::Id(id) => EngineError::not_found(EntityKind::Slot, id),
                SlotRef::Start(date) => {
                    EngineError::InvalidArgument(format!("no slot starts on {}", date))
                }
            })
    }

    fn require_teacher(&self, id: TeacherId) -> Result<(), EngineError> {
        self.data
            .get_teacher(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(EntityKind::Teacher, id))
    }

    fn run_index(&self, id: RunId) -> Result<usize, EngineError> {
        self.data
            .course_runs
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::CourseRun, id))
    }

    // ========================================================================
    // Courses
    // ========================================================================

    /// Add a course; its id is assigned by the store
    pub fn add_course(&mut self, mut course: Course) -> Result<CourseId, EngineError> {
        course.id = next_id(&self.data.courses, |c| c.id);
        course.prerequisites.retain(|p| *p != course.id);
        dedup_ids(&mut course.prerequisites);

        let id = course.id;
        debug!(course = id, code = %course.code, "course added");
        self.data.courses.push(course);
        self.commit(ChangeKind::Course);
        Ok(id)
    }

    pub fn update_course(&mut self, mut course: Course) -> Result<(), EngineError> {
        let existing = self
            .data
            .courses
            .iter_mut()
            .find(|c| c.id == course.id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Course, course.id))?;
        course.prerequisites.retain(|p| *p != course.id);
        dedup_ids(&mut course.prerequisites);
        *existing = course;
        self.commit(ChangeKind::Course);
        Ok(())
    }

    /// Delete a course with its runs and course-slot links
    pub fn delete_course(&mut self, id: CourseId) -> Result<(), EngineError> {
        if self.data.get_course(id).is_none() {
            return Err(EngineError::not_found(EntityKind::Course, id));
        }
        self.data.courses.retain(|c| c.id != id);
        self.data.course_runs.retain(|r| r.course_id != id);

        let links: Vec<_> = self
            .data
            .course_slots
            .iter()
            .filter(|cs| cs.course_id == id)
            .map(|cs| cs.id)
            .collect();
        for link in links {
            teaching_days::remove_course_slot(&mut self.data, link);
        }

        debug!(course = id, "course deleted");
        self.commit(ChangeKind::Course);
        Ok(())
    }

    // ========================================================================
    // Cohorts
    // ========================================================================

    pub fn add_cohort(&mut self, mut cohort: Cohort) -> Result<CohortId, EngineError> {
        cohort.id = next_id(&self.data.cohorts, |c| c.id);
        let id = cohort.id;
        self.data.cohorts.push(cohort);
        self.renumber_cohorts();
        debug!(cohort = id, "cohort added");
        self.commit(ChangeKind::Cohort);
        Ok(id)
    }

    pub fn update_cohort(&mut self, cohort: Cohort) -> Result<(), EngineError> {
        let existing = self
            .data
            .cohorts
            .iter_mut()
            .find(|c| c.id == cohort.id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Cohort, cohort.id))?;
        *existing = cohort;
        self.renumber_cohorts();
        self.commit(ChangeKind::Cohort);
        Ok(())
    }

    /// Delete a cohort, stripping it from runs; runs left empty go too
    pub fn delete_cohort(&mut self, id: CohortId) -> Result<(), EngineError> {
        if self.data.get_cohort(id).is_none() {
            return Err(EngineError::not_found(EntityKind::Cohort, id));
        }
        self.data.cohorts.retain(|c| c.id != id);
        for run in self.data.course_runs.iter_mut() {
            run.cohorts.retain(|c| *c != id);
        }
        self.data.course_runs.retain(|r| !r.cohorts.is_empty());
        self.renumber_cohorts();

        debug!(cohort = id, "cohort deleted");
        self.commit(ChangeKind::Cohort);
        Ok(())
    }

    // ========================================================================
    // Teachers
    // ========================================================================

    pub fn add_teacher(&mut self, mut teacher: Teacher) -> Result<TeacherId, EngineError> {
        teacher.id = next_id(&self.data.teachers, |t| t.id);
        dedup_ids(&mut teacher.compatible_courses);
        let id = teacher.id;
        self.data.teachers.push(teacher);
        debug!(teacher = id, "teacher added");
        self.commit(ChangeKind::Teacher);
        Ok(id)
    }

    pub fn update_teacher(&mut self, mut teacher: Teacher) -> Result<(), EngineError> {
        let existing = self
            .data
            .teachers
            .iter_mut()
            .find(|t| t.id == teacher.id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Teacher, teacher.id))?;
        dedup_ids(&mut teacher.compatible_courses);
        *existing = teacher;
        self.commit(ChangeKind::Teacher);
        Ok(())
    }

    /// Delete a teacher, removing it from runs and availability records
    pub fn delete_teacher(&mut self, id: TeacherId) -> Result<(), EngineError> {
        self.require_teacher(id)?;
        self.data.teachers.retain(|t| t.id != id);
        for run in self.data.course_runs.iter_mut() {
            run.teachers.retain(|t| *t != id);
        }
        self.data.availability.retain(|a| a.teacher_id != id);

        debug!(teacher = id, "teacher deleted");
        self.commit(ChangeKind::Teacher);
        Ok(())
    }

    /// Replace every teacher's compatible courses with a random subset
    pub fn randomize_teacher_courses(
        &mut self,
        min: usize,
        max: usize,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        randomize::randomize_teacher_courses(&mut self.data, min, max, rng)?;
        info!(teachers = self.data.teachers.len(), min, max, "teacher courses randomized");
        self.commit(ChangeKind::Teacher);
        Ok(())
    }

    // ========================================================================
    // Slots
    // ========================================================================

    fn check_slot_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        ignore: Option<SlotId>,
    ) -> Result<(), EngineError> {
        match validation::find_overlapping_slot(&self.data.slots, start, end, ignore) {
            Some(other) => Err(EngineError::Conflict(validation::overlap_conflict(
                start, end, ignore, other,
            ))),
            None => Ok(()),
        }
    }

    fn derived_end(&self, start: NaiveDate) -> Result<NaiveDate, EngineError> {
        slotplan_core::derive_slot_end(start, self.config.slot_length_days).ok_or_else(|| {
            EngineError::InvalidDate(format!(
                "slot starting {} ends past the last supported date",
                start
            ))
        })
    }

    /// Add a slot starting at `start`; the end is derived from the slot length
    pub fn add_slot(&mut self, start: impl IntoDateOnly, placeholder: bool) -> Result<SlotId, EngineError> {
        let start = parse_date(start, "slot start")?;
        let end = self.derived_end(start)?;
        self.check_slot_range(start, end, None)?;

        let id = next_id(&self.data.slots, |s| s.id);
        self.data.slots.push(Slot {
            id,
            start,
            end,
            fixed_end: false,
            placeholder,
        });
        self.refresh_slot_derivations();

        debug!(slot = id, %start, %end, "slot added");
        self.commit(ChangeKind::Slot);
        Ok(id)
    }

    /// Move a slot, optionally pinning its end date
    pub fn update_slot(
        &mut self,
        id: SlotId,
        start: impl IntoDateOnly,
        end: Option<NaiveDate>,
    ) -> Result<(), EngineError> {
        let start = parse_date(start, "slot start")?;
        if self.data.get_slot(id).is_none() {
            return Err(EngineError::not_found(EntityKind::Slot, id));
        }
        let derived = slotplan_core::derive_slot_end(start, self.config.slot_length_days);
        let end = match end {
            Some(end) if end < start => {
                return Err(EngineError::InvalidDate(format!(
                    "slot end {} precedes start {}",
                    end, start
                )))
            }
            Some(end) => end,
            None => self.derived_end(start)?,
        };
        self.check_slot_range(start, end, Some(id))?;

        if let Some(slot) = self.data.slots.iter_mut().find(|s| s.id == id) {
            slot.start = start;
            slot.end = end;
            slot.fixed_end = derived != Some(end);
        }
        self.refresh_slot_derivations();

        debug!(slot = id, %start, %end, "slot updated");
        self.commit(ChangeKind::Slot);
        Ok(())
    }

    pub fn set_slot_placeholder(&mut self, id: SlotId, placeholder: bool) -> Result<(), EngineError> {
        let slot = self
            .data
            .slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Slot, id))?;
        slot.placeholder = placeholder;
        self.commit(ChangeKind::Slot);
        Ok(())
    }

    /// Delete an empty slot. Slots that still hold course runs are rejected.
    pub fn delete_slot(&mut self, id: SlotId) -> Result<(), EngineError> {
        if self.data.get_slot(id).is_none() {
            return Err(EngineError::not_found(EntityKind::Slot, id));
        }
        let runs: Vec<RunId> = self.data.runs_in_slot(id).map(|r| r.id).collect();
        if !runs.is_empty() {
            return Err(EngineError::Conflict(Conflict {
                conflict_type: ConflictType::SlotInUse,
                description: format!("slot {} still has {} course run(s)", id, runs.len()),
                involved_slots: vec![id],
            }));
        }

        self.data.slots.retain(|s| s.id != id);
        let links: Vec<_> = self
            .data
            .course_slots
            .iter()
            .filter(|cs| cs.slot_id == id)
            .map(|cs| cs.id)
            .collect();
        for link in links {
            teaching_days::remove_course_slot(&mut self.data, link);
        }
        self.data.teaching_days.retain(|t| t.slot_id != id);
        self.data.exam_dates.retain(|e| e.slot_id != id);
        self.data.availability.retain(|a| a.slot_id != Some(id));
        self.refresh_slot_derivations();

        debug!(slot = id, "slot deleted");
        self.commit(ChangeKind::Slot);
        Ok(())
    }

    // ========================================================================
    // Course runs
    // ========================================================================

    fn check_run(&self, run: &mut CourseRun) -> Result<(), EngineError> {
        if self.data.get_course(run.course_id).is_none() {
            return Err(EngineError::not_found(EntityKind::Course, run.course_id));
        }
        if self.data.get_slot(run.slot_id).is_none() {
            return Err(EngineError::not_found(EntityKind::Slot, run.slot_id));
        }
        if let Some(missing) = run.cohorts.iter().find(|c| self.data.get_cohort(**c).is_none()) {
            return Err(EngineError::not_found(EntityKind::Cohort, *missing));
        }
        if let Some(missing) = run.teachers.iter().find(|t| self.data.get_teacher(**t).is_none()) {
            return Err(EngineError::not_found(EntityKind::Teacher, *missing));
        }
        dedup_ids(&mut run.cohorts);
        dedup_ids(&mut run.teachers);
        Ok(())
    }

    /// Schedule a course in a slot for at least one cohort
    pub fn add_course_run(&mut self, mut run: CourseRun) -> Result<RunId, EngineError> {
        if run.cohorts.is_empty() {
            return Err(EngineError::InvalidArgument(
                "a course run needs at least one cohort".into(),
            ));
        }
        self.check_run(&mut run)?;
        run.id = next_id(&self.data.course_runs, |r| r.id);

        let id = run.id;
        teaching_days::ensure_course_slot(&mut self.data, run.course_id, run.slot_id);
        debug!(run = id, course = run.course_id, slot = run.slot_id, "course run added");
        self.data.course_runs.push(run);
        self.commit(ChangeKind::CourseRun);
        Ok(id)
    }

    /// Replace a run. A run updated to zero cohorts is deleted.
    pub fn update_course_run(&mut self, mut run: CourseRun) -> Result<(), EngineError> {
        let index = self.run_index(run.id)?;
        if run.cohorts.is_empty() {
            debug!(run = run.id, "course run left without cohorts, deleting");
            self.data.course_runs.remove(index);
            self.commit(ChangeKind::CourseRun);
            return Ok(());
        }

        self.check_run(&mut run)?;
        teaching_days::ensure_course_slot(&mut self.data, run.course_id, run.slot_id);
        self.data.course_runs[index] = run;
        self.commit(ChangeKind::CourseRun);
        Ok(())
    }

    pub fn delete_course_run(&mut self, id: RunId) -> Result<(), EngineError> {
        let index = self.run_index(id)?;
        self.data.course_runs.remove(index);
        debug!(run = id, "course run deleted");
        self.commit(ChangeKind::CourseRun);
        Ok(())
    }

    /// Put a teacher on a run. The exclusivity repair may drop the teacher
    /// again when it already teaches another course in the slot.
    pub fn assign_teacher(&mut self, run_id: RunId, teacher: TeacherId) -> Result<(), EngineError> {
        self.require_teacher(teacher)?;
        let index = self.run_index(run_id)?;
        let run = &mut self.data.course_runs[index];
        if !run.teachers.contains(&teacher) {
            run.teachers.push(teacher);
        }
        self.commit(ChangeKind::CourseRun);
        Ok(())
    }

    pub fn unassign_teacher(&mut self, run_id: RunId, teacher: TeacherId) -> Result<(), EngineError> {
        let index = self.run_index(run_id)?;
        self.data.course_runs[index].teachers.retain(|t| *t != teacher);
        self.commit(ChangeKind::CourseRun);
        Ok(())
    }

    // ========================================================================
    // Availability
    // ========================================================================

    fn check_availability(&self, record: &mut TeacherAvailability) -> Result<(), EngineError> {
        self.require_teacher(record.teacher_id)?;
        match record.slot_id {
            Some(slot_id) => {
                let slot = self
                    .data
                    .get_slot(slot_id)
                    .ok_or_else(|| EngineError::not_found(EntityKind::Slot, slot_id))?;
                record.from_date = slot.start;
                record.to_date = slot.end;
            }
            None if record.to_date != record.from_date => {
                return Err(EngineError::InvalidArgument(
                    "day-level availability records cover a single day".into(),
                ));
            }
            None => {}
        }
        Ok(())
    }

    pub fn add_availability(&mut self, mut record: TeacherAvailability) -> Result<AvailabilityId, EngineError> {
        self.check_availability(&mut record)?;
        record.id = availability::next_availability_id(&self.data);
        let id = record.id;
        self.data.availability.push(record);
        self.commit(ChangeKind::Availability);
        Ok(id)
    }

    pub fn update_availability(&mut self, mut record: TeacherAvailability) -> Result<(), EngineError> {
        let index = self
            .data
            .availability
            .iter()
            .position(|a| a.id == record.id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Availability, record.id))?;
        self.check_availability(&mut record)?;
        self.data.availability[index] = record;
        self.commit(ChangeKind::Availability);
        Ok(())
    }

    pub fn delete_availability(&mut self, id: AvailabilityId) -> Result<(), EngineError> {
        if self.data.get_availability(id).is_none() {
            return Err(EngineError::not_found(EntityKind::Availability, id));
        }
        self.data.availability.retain(|a| a.id != id);
        self.commit(ChangeKind::Availability);
        Ok(())
    }

    /// Mark or unmark a whole slot busy for a teacher
    pub fn toggle_slot_availability(
        &mut self,
        teacher: TeacherId,
        slot: impl Into<SlotRef>,
    ) -> Result<SlotToggle, EngineError> {
        self.require_teacher(teacher)?;
        let slot_id = self.require_slot(slot)?;
        let outcome = availability::toggle_slot_availability(&mut self.data, teacher, slot_id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Slot, slot_id))?;

        debug!(teacher, slot = slot_id, outcome = ?outcome, "slot availability toggled");
        self.commit(ChangeKind::Availability);
        Ok(outcome)
    }

    /// Flip one busy day. Returns whether the day is now busy.
    pub fn toggle_day_availability(
        &mut self,
        teacher: TeacherId,
        date: impl IntoDateOnly,
    ) -> Result<bool, EngineError> {
        self.require_teacher(teacher)?;
        let date = parse_date(date, "availability day")?;
        let busy = availability::toggle_day_availability(&mut self.data, teacher, date);

        debug!(teacher, %date, busy, "day availability toggled");
        self.commit(ChangeKind::Availability);
        Ok(busy)
    }

    // ========================================================================
    // Teaching days and exam dates
    // ========================================================================

    pub fn toggle_course_slot_day(
        &mut self,
        slot_id: SlotId,
        course_id: CourseId,
        date: NaiveDate,
    ) -> Result<Option<TeachingDayState>, EngineError> {
        let state = teaching_days::toggle_course_slot_day(&mut self.data, &self.config, slot_id, course_id, date)?;
        debug!(slot = slot_id, course = course_id, %date, state = ?state, "course teaching day toggled");
        self.commit(ChangeKind::TeachingDay);
        Ok(state)
    }

    /// Toggle a date for every offering in the slot
    pub fn toggle_teaching_day(&mut self, slot_id: SlotId, date: NaiveDate) -> Result<TeachingDayState, EngineError> {
        let state = teaching_days::toggle_teaching_day(&mut self.data, &self.config, slot_id, date)?;
        debug!(slot = slot_id, %date, active = state.active, "teaching day toggled");
        self.commit(ChangeKind::TeachingDay);
        Ok(state)
    }

    pub fn set_exam_date(&mut self, slot_id: SlotId, date: NaiveDate) -> Result<(), EngineError> {
        teaching_days::set_exam_date(&mut self.data, &self.config, slot_id, date)?;
        debug!(slot = slot_id, %date, "exam date set");
        self.commit(ChangeKind::ExamDate);
        Ok(())
    }

    pub fn lock_exam_date(&mut self, slot_id: SlotId) -> Result<(), EngineError> {
        teaching_days::set_exam_lock(&mut self.data, slot_id, true)?;
        self.commit(ChangeKind::ExamDate);
        Ok(())
    }

    pub fn unlock_exam_date(&mut self, slot_id: SlotId) -> Result<(), EngineError> {
        teaching_days::set_exam_lock(&mut self.data, slot_id, false)?;
        self.commit(ChangeKind::ExamDate);
        Ok(())
    }

    // ========================================================================
    // Explicit validation
    // ========================================================================

    /// Run both repairs now and notify subscribers
    pub fn validate(&mut self) -> RepairReport {
        self.commit(ChangeKind::Repair);
        self.last_repairs.clone()
    }

    /// Run only the teacher exclusivity repair
    pub fn validate_teacher_assignments(&mut self) -> Vec<DroppedAssignment> {
        let dropped = validation::validate_teacher_assignments(&mut self.data);
        let report = RepairReport {
            dropped_assignments: dropped.clone(),
            removed_offerings: Vec::new(),
        };
        log_repairs(&report);
        self.finish(ChangeKind::Repair, report);
        dropped
    }

    /// Run only the orphaned offering repair
    pub fn validate_courses_have_teachers(&mut self) -> Vec<RemovedOffering> {
        let removed = validation::validate_courses_have_teachers(&mut self.data);
        let report = RepairReport {
            dropped_assignments: Vec::new(),
            removed_offerings: removed.clone(),
        };
        log_repairs(&report);
        self.finish(ChangeKind::Repair, report);
        removed
    }
}

fn log_repairs(report: &RepairReport) {
    for dropped in &report.dropped_assignments {
        warn!(
            teacher = dropped.teacher_id,
            slot = dropped.slot_id,
            run = dropped.run_id,
            course = dropped.course_id,
            kept_course = dropped.kept_course_id,
            "teacher dropped from conflicting course"
        );
    }
    for removed in &report.removed_offerings {
        warn!(
            course = removed.course_id,
            slot = removed.slot_id,
            cohorts = ?removed.cohort_names,
            "offering removed, no available teacher"
        );
    }
}
