//! # slotplan-engine
//!
//! Consistency engine for academic slot schedules.
//!
//! This crate provides:
//! - Slot day expansion with adjacency truncation
//! - Prerequisite closure with explicit cycle reporting
//! - Teacher availability at day and slot granularity
//! - Teaching day patterns, per-offering overrides and exam dates
//! - Repair passes for teacher exclusivity and orphaned offerings
//! - `SchedulingStore`, the aggregate that applies commands and notifies
//!   subscribers
//!
//! ## Example
//!
//! ```rust
//! use slotplan_core::{Cohort, Course, CourseRun, EngineConfig, Teacher};
//! use slotplan_engine::SchedulingStore;
//! use chrono::NaiveDate;
//!
//! let mut store = SchedulingStore::new(EngineConfig::default());
//! let course = store.add_course(Course::new(0, "MAT101", "Linear Algebra")).unwrap();
//! let teacher = store.add_teacher(Teacher::new(0, "Robin").can_teach(course)).unwrap();
//! let cohort = store
//!     .add_cohort(Cohort::new(0, NaiveDate::from_ymd_opt(2023, 8, 21).unwrap()))
//!     .unwrap();
//! let slot = store.add_slot("2024-01-08", false).unwrap();
//!
//! let run = store
//!     .add_course_run(CourseRun::new(0, course, slot).cohort(cohort).teacher(teacher))
//!     .unwrap();
//! assert_eq!(store.slot_days(slotplan_core::SlotRef::Id(slot)).len(), 28);
//! assert!(store.get_course_run(run).is_some());
//! ```

pub mod availability;
pub mod events;
pub mod persist;
pub mod prerequisites;
pub mod randomize;
pub mod slot_days;
pub mod store;
pub mod teaching_days;
pub mod validation;

pub use availability::SlotToggle;
pub use events::{ChangeKind, StoreEvent, SubscriptionId};
pub use persist::{JsonFileStore, MemoryStore};
pub use prerequisites::PrerequisiteClosure;
pub use store::{SchedulingStore, SharedStore};
pub use teaching_days::TeachingDayState;
