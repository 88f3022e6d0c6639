//! Teaching days and exam dates
//!
//! Each slot has a default teaching pattern given by day offsets from the
//! slot start. Course offerings override it per date with `CourseSlotDay`
//! records:
//! - a default date is switched off by a deactivated record (reversible)
//! - a non-default date is switched on by an active record, and switching
//!   it off deletes the record
//!
//! Slot-wide `TeachingDay` records hold the apply-to-all state and seed
//! the overrides of offerings created later.

use chrono::NaiveDate;
use slotplan_core::{
    offset_date, CourseId, CourseSlot, CourseSlotDay, CourseSlotId, EngineConfig, EngineError, EntityKind,
    ExamDate, SlotId, Snapshot, TeachingDay,
};

use crate::slot_days::slot_days;

/// Teaching state of one date
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TeachingDayState {
    /// Date belongs to the default pattern
    pub is_default: bool,
    pub active: bool,
}

impl TeachingDayState {
    const DEFAULT_ACTIVE: Self = Self {
        is_default: true,
        active: true,
    };
}

/// Default teaching dates of a slot, clipped to its days
pub fn default_pattern(snapshot: &Snapshot, config: &EngineConfig, slot_id: SlotId) -> Vec<NaiveDate> {
    let Some(slot) = snapshot.get_slot(slot_id) else {
        return Vec::new();
    };
    let days = slot_days(snapshot, slot_id);

    let mut dates: Vec<NaiveDate> = config
        .teaching_day_offsets
        .iter()
        .filter_map(|offset| offset_date(slot.start, *offset))
        .filter(|date| days.contains(date))
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

fn require_slot_day(snapshot: &Snapshot, slot_id: SlotId, date: NaiveDate) -> Result<(), EngineError> {
    if snapshot.get_slot(slot_id).is_none() {
        return Err(EngineError::not_found(EntityKind::Slot, slot_id));
    }
    if !slot_days(snapshot, slot_id).contains(&date) {
        return Err(EngineError::InvalidArgument(format!(
            "{} is not a day of slot {}",
            date, slot_id
        )));
    }
    Ok(())
}

fn course_override(
    snapshot: &Snapshot,
    course_slot: CourseSlotId,
    date: NaiveDate,
) -> Option<&CourseSlotDay> {
    snapshot
        .course_slot_days
        .iter()
        .find(|o| o.course_slot_id == course_slot && o.date == date)
}

fn slot_record(snapshot: &Snapshot, slot_id: SlotId, date: NaiveDate) -> Option<&TeachingDay> {
    snapshot
        .teaching_days
        .iter()
        .find(|t| t.slot_id == slot_id && t.date == date && t.course_id.is_none())
}

fn course_state(
    snapshot: &Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    course_id: CourseId,
    date: NaiveDate,
) -> Option<TeachingDayState> {
    let found = snapshot
        .course_slot(course_id, slot_id)
        .and_then(|cs| course_override(snapshot, cs.id, date));

    match found {
        Some(o) => Some(TeachingDayState {
            is_default: o.is_default,
            active: o.active,
        }),
        None if default_pattern(snapshot, config, slot_id).contains(&date) => {
            Some(TeachingDayState::DEFAULT_ACTIVE)
        }
        None => None,
    }
}

/// Teaching state of `date` in a slot.
///
/// With a course, that offering's override wins over the default pattern.
/// Without one, the state is merged across every offering in the slot: any
/// active override reports active, otherwise any deactivated default
/// reports default-inactive. Slots without offerings use their slot-wide
/// record. `None` means the date is not a teaching day at all.
pub fn teaching_day_state(
    snapshot: &Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    date: NaiveDate,
    course_id: Option<CourseId>,
) -> Option<TeachingDayState> {
    if let Some(course_id) = course_id {
        return course_state(snapshot, config, slot_id, course_id, date);
    }

    let is_default = default_pattern(snapshot, config, slot_id).contains(&date);
    let overrides: Vec<&CourseSlotDay> = snapshot
        .course_slots
        .iter()
        .filter(|cs| cs.slot_id == slot_id)
        .filter_map(|cs| course_override(snapshot, cs.id, date))
        .collect();

    if overrides.iter().any(|o| o.active) {
        return Some(TeachingDayState {
            is_default,
            active: true,
        });
    }
    if overrides.iter().any(|o| o.is_default && !o.active) {
        return Some(TeachingDayState {
            is_default: true,
            active: false,
        });
    }

    if let Some(record) = slot_record(snapshot, slot_id, date) {
        if !record.is_default && !record.active {
            return None;
        }
        return Some(TeachingDayState {
            is_default: record.is_default,
            active: record.active,
        });
    }

    is_default.then_some(TeachingDayState::DEFAULT_ACTIVE)
}

/// Active teaching dates of a slot, for one offering or merged
pub fn teaching_days(
    snapshot: &Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    course_id: Option<CourseId>,
) -> Vec<NaiveDate> {
    slot_days(snapshot, slot_id)
        .into_iter()
        .filter(|date| {
            teaching_day_state(snapshot, config, slot_id, *date, course_id)
                .is_some_and(|s| s.active)
        })
        .collect()
}

/// Course-slot link for a pair, created on first use.
///
/// A new link inherits the slot-wide deviations from the default pattern.
pub fn ensure_course_slot(snapshot: &mut Snapshot, course_id: CourseId, slot_id: SlotId) -> CourseSlotId {
    if let Some(existing) = snapshot.course_slot(course_id, slot_id) {
        return existing.id;
    }

    let id = snapshot
        .course_slots
        .iter()
        .map(|cs| cs.id)
        .max()
        .map_or(1, |max| max + 1);
    snapshot.course_slots.push(CourseSlot {
        id,
        course_id,
        slot_id,
    });

    let inherited: Vec<CourseSlotDay> = snapshot
        .teaching_days
        .iter()
        .filter(|t| t.slot_id == slot_id && t.course_id.is_none())
        .filter(|t| t.is_default != t.active)
        .map(|t| CourseSlotDay {
            course_slot_id: id,
            date: t.date,
            is_default: t.is_default,
            active: t.active,
        })
        .collect();
    snapshot.course_slot_days.extend(inherited);

    id
}

/// Remove a course-slot link together with its day overrides
pub fn remove_course_slot(snapshot: &mut Snapshot, course_slot: CourseSlotId) {
    snapshot.course_slots.retain(|cs| cs.id != course_slot);
    snapshot
        .course_slot_days
        .retain(|o| o.course_slot_id != course_slot);
}

fn offered_course_slot(
    snapshot: &Snapshot,
    slot_id: SlotId,
    course_id: CourseId,
) -> Result<CourseSlotId, EngineError> {
    snapshot
        .course_slot(course_id, slot_id)
        .map(|cs| cs.id)
        .ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "course {} is not offered in slot {}",
                course_id, slot_id
            ))
        })
}

/// Toggle one date for one course offering.
///
/// Returns the new state, `None` when the date stopped being a teaching day.
pub fn toggle_course_slot_day(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    course_id: CourseId,
    date: NaiveDate,
) -> Result<Option<TeachingDayState>, EngineError> {
    require_slot_day(snapshot, slot_id, date)?;
    let course_slot = offered_course_slot(snapshot, slot_id, course_id)?;

    let position = snapshot
        .course_slot_days
        .iter()
        .position(|o| o.course_slot_id == course_slot && o.date == date);

    match position {
        Some(index) if snapshot.course_slot_days[index].is_default => {
            let record = &mut snapshot.course_slot_days[index];
            record.active = !record.active;
            Ok(Some(TeachingDayState {
                is_default: true,
                active: record.active,
            }))
        }
        Some(index) => {
            snapshot.course_slot_days.remove(index);
            Ok(None)
        }
        None => {
            let is_default = default_pattern(snapshot, config, slot_id).contains(&date);
            snapshot.course_slot_days.push(CourseSlotDay {
                course_slot_id: course_slot,
                date,
                is_default,
                active: !is_default,
            });
            Ok(Some(TeachingDayState {
                is_default,
                active: !is_default,
            }))
        }
    }
}

fn set_course_slot_day(
    snapshot: &mut Snapshot,
    course_slot: CourseSlotId,
    date: NaiveDate,
    is_default: bool,
    active: bool,
) {
    snapshot
        .course_slot_days
        .retain(|o| !(o.course_slot_id == course_slot && o.date == date));
    if is_default || active {
        snapshot.course_slot_days.push(CourseSlotDay {
            course_slot_id: course_slot,
            date,
            is_default,
            active,
        });
    }
}

fn set_slot_record(snapshot: &mut Snapshot, slot_id: SlotId, date: NaiveDate, is_default: bool, active: bool) {
    snapshot
        .teaching_days
        .retain(|t| !(t.slot_id == slot_id && t.date == date && t.course_id.is_none()));
    if is_default || active {
        snapshot.teaching_days.push(TeachingDay {
            slot_id,
            date,
            course_id: None,
            is_default,
            active,
        });
    }
}

/// Toggle one date for every offering in the slot at once.
///
/// The merged state is negated and written to each offering and to the
/// slot-wide record.
pub fn toggle_teaching_day(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    date: NaiveDate,
) -> Result<TeachingDayState, EngineError> {
    require_slot_day(snapshot, slot_id, date)?;

    let target = !teaching_day_state(snapshot, config, slot_id, date, None).is_some_and(|s| s.active);
    let is_default = default_pattern(snapshot, config, slot_id).contains(&date);

    let offerings: Vec<CourseSlotId> = snapshot
        .course_slots
        .iter()
        .filter(|cs| cs.slot_id == slot_id)
        .map(|cs| cs.id)
        .collect();
    for course_slot in offerings {
        set_course_slot_day(snapshot, course_slot, date, is_default, target);
    }
    set_slot_record(snapshot, slot_id, date, is_default, target);

    Ok(TeachingDayState {
        is_default,
        active: target,
    })
}

/// Align a record with the current pattern; `false` means drop it.
///
/// A default record whose date left the pattern (the slot moved) stands
/// for nothing anymore. An added date that joined the pattern becomes a
/// default one.
fn rebase_record(is_default: &mut bool, active: bool, date: NaiveDate, pattern: &[NaiveDate]) -> bool {
    let in_pattern = pattern.contains(&date);
    if *is_default && !in_pattern {
        return false;
    }
    *is_default = in_pattern;
    in_pattern || active
}

/// Create missing slot-wide records for default dates, rebase slot-wide
/// records and offering overrides on the current pattern, and drop
/// records that no longer fall on a day of their slot
pub fn materialize_default_teaching_days(snapshot: &mut Snapshot, config: &EngineConfig) {
    let slot_ids: Vec<SlotId> = snapshot.slots.iter().map(|s| s.id).collect();

    for slot_id in slot_ids {
        let days = slot_days(snapshot, slot_id);
        let pattern = default_pattern(snapshot, config, slot_id);

        snapshot.teaching_days.retain_mut(|t| {
            if t.slot_id != slot_id {
                return true;
            }
            if !days.contains(&t.date) {
                return false;
            }
            t.course_id.is_some() || rebase_record(&mut t.is_default, t.active, t.date, &pattern)
        });

        let links: Vec<CourseSlotId> = snapshot
            .course_slots
            .iter()
            .filter(|cs| cs.slot_id == slot_id)
            .map(|cs| cs.id)
            .collect();
        snapshot.course_slot_days.retain_mut(|o| {
            !links.contains(&o.course_slot_id)
                || rebase_record(&mut o.is_default, o.active, o.date, &pattern)
        });

        for date in pattern {
            if slot_record(snapshot, slot_id, date).is_none() {
                snapshot.teaching_days.push(TeachingDay {
                    slot_id,
                    date,
                    course_id: None,
                    is_default: true,
                    active: true,
                });
            }
        }
    }

    let known: Vec<SlotId> = snapshot.slots.iter().map(|s| s.id).collect();
    snapshot.teaching_days.retain(|t| known.contains(&t.slot_id));
    snapshot
        .teaching_days
        .retain(|t| t.course_id.is_some() || t.is_default || t.active);
}

/// Turn course-specific `TeachingDay` records into offering overrides.
///
/// Existing overrides win over folded records.
pub fn fold_course_teaching_days(snapshot: &mut Snapshot, config: &EngineConfig) {
    let (course_specific, slot_wide): (Vec<TeachingDay>, Vec<TeachingDay>) = snapshot
        .teaching_days
        .drain(..)
        .partition(|t| t.course_id.is_some());
    snapshot.teaching_days = slot_wide;

    for record in course_specific {
        let Some(course_id) = record.course_id else {
            continue;
        };
        if snapshot.get_slot(record.slot_id).is_none() {
            continue;
        }
        let course_slot = ensure_course_slot(snapshot, course_id, record.slot_id);
        if course_override(snapshot, course_slot, record.date).is_some() {
            continue;
        }
        let is_default = default_pattern(snapshot, config, record.slot_id).contains(&record.date);
        set_course_slot_day(snapshot, course_slot, record.date, is_default, record.active);
    }
}

/// Drop overrides and the exam date that fall outside the slot's days
pub fn prune_outside_slot(snapshot: &mut Snapshot, slot_id: SlotId) {
    let days = slot_days(snapshot, slot_id);
    let links: Vec<CourseSlotId> = snapshot
        .course_slots
        .iter()
        .filter(|cs| cs.slot_id == slot_id)
        .map(|cs| cs.id)
        .collect();

    snapshot
        .course_slot_days
        .retain(|o| !links.contains(&o.course_slot_id) || days.contains(&o.date));
    snapshot
        .exam_dates
        .retain(|e| e.slot_id != slot_id || days.contains(&e.date));
}

/// Set the single exam date of a slot, replacing any earlier one
pub fn set_exam_date(
    snapshot: &mut Snapshot,
    config: &EngineConfig,
    slot_id: SlotId,
    date: NaiveDate,
) -> Result<(), EngineError> {
    require_slot_day(snapshot, slot_id, date)?;
    snapshot.exam_dates.retain(|e| e.slot_id != slot_id);
    snapshot.exam_dates.push(ExamDate {
        slot_id,
        date,
        locked: config.lock_exam_on_set,
    });
    Ok(())
}

/// Flip the lock flag of a slot's exam date
pub fn set_exam_lock(snapshot: &mut Snapshot, slot_id: SlotId, locked: bool) -> Result<(), EngineError> {
    if snapshot.get_slot(slot_id).is_none() {
        return Err(EngineError::not_found(EntityKind::Slot, slot_id));
    }
    let exam = snapshot
        .exam_dates
        .iter_mut()
        .find(|e| e.slot_id == slot_id)
        .ok_or_else(|| EngineError::InvalidArgument(format!("slot {} has no exam date", slot_id)))?;
    exam.locked = locked;
    Ok(())
}

pub fn is_exam_date_locked(snapshot: &Snapshot, slot_id: SlotId) -> bool {
    snapshot.exam_date(slot_id).is_some_and(|e| e.locked)
}
