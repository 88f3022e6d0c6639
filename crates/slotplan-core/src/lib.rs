//! # slotplan-core
//!
//! Core domain model for the slotplan academic scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Course`, `Cohort`, `Teacher`, `Slot`, `CourseRun`,
//!   `TeacherAvailability`, teaching-day and exam-date records
//! - The `Snapshot` aggregate holding every entity collection
//! - Date normalization (`date`) and engine configuration (`config`)
//! - Error, conflict and report types, and the `Persistence` trait
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use slotplan_core::{Course, Slot, Snapshot, Teacher};
//!
//! let mut snapshot = Snapshot::default();
//! snapshot.courses.push(Course::new(1, "MAT101", "Linear Algebra"));
//! snapshot.courses.push(Course::new(2, "MAT201", "Numerical Methods").requires(1));
//! snapshot.teachers.push(Teacher::new(1, "Robin").can_teach(1).can_teach(2));
//! snapshot.slots.push(Slot::new(1, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()));
//!
//! assert!(snapshot.get_teacher(1).unwrap().is_compatible(2));
//! ```

pub mod config;
pub mod date;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::EngineConfig;
pub use date::{derive_slot_end, normalize_date, normalize_slots_in_place, offset_date, IntoDateOnly};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a course
pub type CourseId = u32;

/// Unique identifier for a student cohort
pub type CohortId = u32;

/// Unique identifier for a teacher
pub type TeacherId = u32;

/// Unique identifier for a slot
pub type SlotId = u32;

/// Unique identifier for a course run (offering)
pub type RunId = u32;

/// Unique identifier for a teacher availability record
pub type AvailabilityId = u32;

/// Unique identifier for a course-slot link
pub type CourseSlotId = u32;

/// Unique identifier for a memoized slot day
pub type SlotDayId = u32;

// ============================================================================
// Course
// ============================================================================

/// Credit weight of a course. Only two sizes exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credits {
    /// Half-size course (7.5 points)
    #[default]
    Standard,
    /// Full-size course (15 points)
    Double,
}

impl Credits {
    pub fn points(self) -> f64 {
        match self {
            Credits::Standard => 7.5,
            Credits::Double => 15.0,
        }
    }
}

/// A course that can be offered in slots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    /// Short catalogue code (e.g. "MAT101")
    pub code: String,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub credits: Credits,
    /// Direct prerequisites. Unknown ids are tolerated and ignored.
    #[serde(default)]
    pub prerequisites: Vec<CourseId>,
}

impl Course {
    pub fn new(id: CourseId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            credits: Credits::Standard,
            prerequisites: Vec::new(),
        }
    }

    /// Set the credit weight
    pub fn credits(mut self, credits: Credits) -> Self {
        self.credits = credits;
        self
    }

    /// Add a direct prerequisite. Self references are ignored.
    pub fn requires(mut self, prerequisite: CourseId) -> Self {
        if prerequisite != self.id && !self.prerequisites.contains(&prerequisite) {
            self.prerequisites.push(prerequisite);
        }
        self
    }
}

// ============================================================================
// Cohort
// ============================================================================

/// A group of students moving through courses together
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: CohortId,
    /// Display name, renumbered from chronological position
    #[serde(default)]
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub planned_students: u32,
}

impl Cohort {
    pub fn new(id: CohortId, start_date: NaiveDate) -> Self {
        Self {
            id,
            name: String::new(),
            start_date,
            planned_students: 0,
        }
    }

    pub fn planned_students(mut self, count: u32) -> Self {
        self.planned_students = count;
        self
    }
}

// ============================================================================
// Teacher
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    /// Home department
    #[serde(default)]
    pub department: String,
    /// Courses this teacher is qualified to teach
    #[serde(default)]
    pub compatible_courses: Vec<CourseId>,
}

impl Teacher {
    pub fn new(id: TeacherId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            department: String::new(),
            compatible_courses: Vec::new(),
        }
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    /// Add a compatible course
    pub fn can_teach(mut self, course: CourseId) -> Self {
        if !self.compatible_courses.contains(&course) {
            self.compatible_courses.push(course);
        }
        self
    }

    pub fn is_compatible(&self, course: CourseId) -> bool {
        self.compatible_courses.contains(&course)
    }
}

// ============================================================================
// Slot
// ============================================================================

/// A fixed-length scheduling period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub start: NaiveDate,
    /// Inclusive end date. Derived from `start` unless `fixed_end` is set.
    pub end: NaiveDate,
    /// Keep `end` as stored instead of deriving it
    #[serde(default)]
    pub fixed_end: bool,
    #[serde(default)]
    pub placeholder: bool,
}

impl Slot {
    /// Create a slot with the default 28-day length.
    ///
    /// The end is clamped to `NaiveDate::MAX`; the store rejects such slots.
    pub fn new(id: SlotId, start: NaiveDate) -> Self {
        Self {
            id,
            start,
            end: derive_slot_end(start, EngineConfig::DEFAULT_SLOT_LENGTH_DAYS).unwrap_or(NaiveDate::MAX),
            fixed_end: false,
            placeholder: false,
        }
    }

    /// Override the derived end date
    pub fn ending(mut self, end: NaiveDate) -> Self {
        self.end = end;
        self.fixed_end = true;
        self
    }

    pub fn placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }

    /// Check if a date falls inside `[start, end]`
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Inclusive interval overlap with `[start, end]`
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Reference to a slot either by id or by its start date
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRef {
    Id(SlotId),
    Start(NaiveDate),
}

impl From<SlotId> for SlotRef {
    fn from(id: SlotId) -> Self {
        SlotRef::Id(id)
    }
}

impl From<NaiveDate> for SlotRef {
    fn from(date: NaiveDate) -> Self {
        SlotRef::Start(date)
    }
}

impl From<&Slot> for SlotRef {
    fn from(slot: &Slot) -> Self {
        SlotRef::Id(slot.id)
    }
}

// ============================================================================
// Course Runs and derived records
// ============================================================================

/// A course offered in one slot to one or more cohorts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseRun {
    pub id: RunId,
    pub course_id: CourseId,
    pub slot_id: SlotId,
    #[serde(default)]
    pub cohorts: Vec<CohortId>,
    #[serde(default)]
    pub teachers: Vec<TeacherId>,
    #[serde(default)]
    pub planned_students: u32,
}

impl CourseRun {
    pub fn new(id: RunId, course_id: CourseId, slot_id: SlotId) -> Self {
        Self {
            id,
            course_id,
            slot_id,
            cohorts: Vec::new(),
            teachers: Vec::new(),
            planned_students: 0,
        }
    }

    pub fn cohort(mut self, cohort: CohortId) -> Self {
        if !self.cohorts.contains(&cohort) {
            self.cohorts.push(cohort);
        }
        self
    }

    pub fn teacher(mut self, teacher: TeacherId) -> Self {
        if !self.teachers.contains(&teacher) {
            self.teachers.push(teacher);
        }
        self
    }
}

/// Whether an availability record marks the teacher busy or free
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityKind {
    #[default]
    Busy,
    Free,
}

/// An exception to a teacher's availability.
///
/// With `slot_id` set the record covers the whole slot; without it the
/// record covers the single day `from_date`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherAvailability {
    pub id: AvailabilityId,
    pub teacher_id: TeacherId,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    #[serde(default)]
    pub kind: AvailabilityKind,
}

impl TeacherAvailability {
    /// A single-day busy record
    pub fn busy_day(id: AvailabilityId, teacher_id: TeacherId, date: NaiveDate) -> Self {
        Self {
            id,
            teacher_id,
            from_date: date,
            to_date: date,
            slot_id: None,
            kind: AvailabilityKind::Busy,
        }
    }

    /// A whole-slot busy record
    pub fn busy_slot(id: AvailabilityId, teacher_id: TeacherId, slot: &Slot) -> Self {
        Self {
            id,
            teacher_id,
            from_date: slot.start,
            to_date: slot.end,
            slot_id: Some(slot.id),
            kind: AvailabilityKind::Busy,
        }
    }

    pub fn is_slot_level(&self) -> bool {
        self.slot_id.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.kind == AvailabilityKind::Busy
    }
}

/// Link between a course and a slot it is offered in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSlot {
    pub id: CourseSlotId,
    pub course_id: CourseId,
    pub slot_id: SlotId,
}

/// Memoized calendar day of a slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDay {
    /// Position in the materialized day list, renumbered on every rebuild
    #[serde(default)]
    pub id: SlotDayId,
    pub slot_id: SlotId,
    pub date: NaiveDate,
}

/// Per-offering teaching day override
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSlotDay {
    pub course_slot_id: CourseSlotId,
    pub date: NaiveDate,
    /// Date belongs to the default teaching pattern
    pub is_default: bool,
    pub active: bool,
}

/// Slot-wide teaching day record.
///
/// Records carrying a `course_id` are folded into `CourseSlotDay`
/// overrides on import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingDay {
    pub slot_id: SlotId,
    pub date: NaiveDate,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    pub is_default: bool,
    pub active: bool,
}

/// The exam date of a slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDate {
    pub slot_id: SlotId,
    pub date: NaiveDate,
    pub locked: bool,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Plain aggregate of every entity collection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub courses: Vec<Course>,
    pub cohorts: Vec<Cohort>,
    pub teachers: Vec<Teacher>,
    pub slots: Vec<Slot>,
    pub course_runs: Vec<CourseRun>,
    pub availability: Vec<TeacherAvailability>,
    pub course_slots: Vec<CourseSlot>,
    pub slot_days: Vec<SlotDay>,
    pub course_slot_days: Vec<CourseSlotDay>,
    pub teaching_days: Vec<TeachingDay>,
    pub exam_dates: Vec<ExamDate>,
}

impl Snapshot {
    pub fn get_course(&self, id: CourseId) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn get_cohort(&self, id: CohortId) -> Option<&Cohort> {
        self.cohorts.iter().find(|c| c.id == id)
    }

    pub fn get_teacher(&self, id: TeacherId) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == id)
    }

    pub fn get_slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn get_run(&self, id: RunId) -> Option<&CourseRun> {
        self.course_runs.iter().find(|r| r.id == id)
    }

    pub fn get_availability(&self, id: AvailabilityId) -> Option<&TeacherAvailability> {
        self.availability.iter().find(|a| a.id == id)
    }

    /// Resolve a slot reference by id or start date
    pub fn resolve_slot(&self, slot: impl Into<SlotRef>) -> Option<&Slot> {
        match slot.into() {
            SlotRef::Id(id) => self.get_slot(id),
            SlotRef::Start(date) => self.slots.iter().find(|s| s.start == date),
        }
    }

    /// Slots in ascending start order (ties by id)
    pub fn slots_by_start(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.slots.iter().collect();
        slots.sort_by_key(|s| (s.start, s.id));
        slots
    }

    pub fn runs_in_slot(&self, slot_id: SlotId) -> impl Iterator<Item = &CourseRun> {
        self.course_runs.iter().filter(move |r| r.slot_id == slot_id)
    }

    pub fn course_slot(&self, course_id: CourseId, slot_id: SlotId) -> Option<&CourseSlot> {
        self.course_slots
            .iter()
            .find(|cs| cs.course_id == course_id && cs.slot_id == slot_id)
    }

    pub fn exam_date(&self, slot_id: SlotId) -> Option<&ExamDate> {
        self.exam_dates.iter().find(|e| e.slot_id == slot_id)
    }

    /// Display names for a list of cohort ids, skipping unknown ids
    pub fn cohort_names(&self, ids: &[CohortId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.get_cohort(*id))
            .map(|c| c.name.clone())
            .collect()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Storage backend for snapshots
pub trait Persistence {
    fn load(&self) -> Result<Snapshot, PersistError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

// ============================================================================
// Result Types
// ============================================================================

/// A structural conflict that rejects a command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub description: String,
    pub involved_slots: Vec<SlotId>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictType {
    /// Two slots share at least one day
    SlotOverlap,
    /// A slot still has course runs
    SlotInUse,
    /// A slot date could not be normalized
    InvalidSlotDate,
}

/// Why a scheduled course breaks its prerequisite ordering
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Prerequisite is not scheduled for the cohort at all
    Missing,
    /// Prerequisite ends on or after the dependent course starts
    BeforePrerequisite,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "missing"),
            ViolationKind::BeforePrerequisite => write!(f, "before_prerequisite"),
        }
    }
}

/// Advisory prerequisite violation for one cohort
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteViolation {
    pub cohort_id: CohortId,
    pub course_id: CourseId,
    pub run_id: RunId,
    /// The prerequisite that is missing or scheduled too late
    pub prerequisite_id: CourseId,
    pub kind: ViolationKind,
}

/// A teacher removed from a run by the exclusivity repair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedAssignment {
    pub teacher_id: TeacherId,
    pub slot_id: SlotId,
    pub run_id: RunId,
    pub course_id: CourseId,
    /// Course the teacher keeps in this slot
    pub kept_course_id: CourseId,
}

/// A course offering deleted because no teacher can take it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedOffering {
    pub course_id: CourseId,
    pub course_name: String,
    pub slot_id: SlotId,
    pub run_ids: Vec<RunId>,
    pub cohort_ids: Vec<CohortId>,
    pub cohort_names: Vec<String>,
}

/// Everything the consistency repairs changed during one commit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub dropped_assignments: Vec<DroppedAssignment>,
    pub removed_offerings: Vec<RemovedOffering>,
}

impl RepairReport {
    pub fn is_empty(&self) -> bool {
        self.dropped_assignments.is_empty() && self.removed_offerings.is_empty()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Entity kinds, for `NotFound` errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Course,
    Cohort,
    Teacher,
    Slot,
    CourseRun,
    Availability,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Course => "course",
            EntityKind::Cohort => "cohort",
            EntityKind::Teacher => "teacher",
            EntityKind::Slot => "slot",
            EntityKind::CourseRun => "course run",
            EntityKind::Availability => "availability record",
        };
        f.write_str(name)
    }
}

/// Engine command error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Conflict: {0}")]
    Conflict(Conflict),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: u32 },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistError),
}

impl EngineError {
    pub fn not_found(entity: EntityKind, id: u32) -> Self {
        EngineError::NotFound { entity, id }
    }

    /// The conflict, if this error is a structural rejection
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            EngineError::Conflict(c) => Some(c),
            _ => None,
        }
    }
}

/// Persistence error
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Tests
// ============================================================================
