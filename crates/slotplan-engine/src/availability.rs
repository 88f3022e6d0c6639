//! Teacher availability
//!
//! Busy records come in two granularities:
//! - slot-level (`slot_id` set): the teacher is out for the whole slot
//! - day-level: the teacher is out on `from_date`
//!
//! Day-level answers never consult slot-level records. At slot granularity a
//! teacher is unavailable when a slot-level record exists or when every
//! single day of the slot is painted busy.

use chrono::NaiveDate;
use slotplan_core::date::date_range;
use slotplan_core::{
    AvailabilityId, SlotId, SlotRef, Snapshot, TeacherAvailability, TeacherId,
};

use crate::slot_days::slot_days;

/// What a slot availability toggle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotToggle {
    /// A slot-level record existed and was removed
    RemovedSlotRecord,
    /// Every day was painted busy; those day records were removed
    ClearedDays(usize),
    /// A new slot-level busy record was added
    AddedSlotRecord(AvailabilityId),
}

impl SlotToggle {
    /// Whether the slot is busy after the toggle
    pub fn now_busy(&self) -> bool {
        matches!(self, SlotToggle::AddedSlotRecord(_))
    }
}

fn has_slot_record(snapshot: &Snapshot, teacher: TeacherId, slot: SlotId) -> bool {
    snapshot
        .availability
        .iter()
        .any(|a| a.teacher_id == teacher && a.is_busy() && a.slot_id == Some(slot))
}

fn is_day_record_for(record: &TeacherAvailability, teacher: TeacherId, date: NaiveDate) -> bool {
    record.teacher_id == teacher
        && record.is_busy()
        && !record.is_slot_level()
        && record.from_date <= date
        && date <= record.to_date.max(record.from_date)
}

/// Any day-level busy record covering `date`
pub fn is_unavailable_on_day(snapshot: &Snapshot, teacher: TeacherId, date: NaiveDate) -> bool {
    snapshot
        .availability
        .iter()
        .any(|a| is_day_record_for(a, teacher, date))
}

/// Teacher is out for the whole slot.
///
/// Partial day coverage does not count.
pub fn is_unavailable(snapshot: &Snapshot, teacher: TeacherId, slot: impl Into<SlotRef>) -> bool {
    let Some(slot) = snapshot.resolve_slot(slot) else {
        return false;
    };
    if has_slot_record(snapshot, teacher, slot.id) {
        return true;
    }

    let days = slot_days(snapshot, slot.id);
    !days.is_empty()
        && days
            .iter()
            .all(|day| is_unavailable_on_day(snapshot, teacher, *day))
}

/// Share of the slot's days the teacher is busy, in `[0, 1]`
pub fn unavailable_fraction(
    snapshot: &Snapshot,
    teacher: TeacherId,
    slot: impl Into<SlotRef>,
) -> f64 {
    let Some(slot) = snapshot.resolve_slot(slot) else {
        return 0.0;
    };
    if has_slot_record(snapshot, teacher, slot.id) {
        return 1.0;
    }

    let days = slot_days(snapshot, slot.id);
    if days.is_empty() {
        return 0.0;
    }
    let busy = days
        .iter()
        .filter(|day| is_unavailable_on_day(snapshot, teacher, **day))
        .count();
    busy as f64 / days.len() as f64
}

pub(crate) fn next_availability_id(snapshot: &Snapshot) -> AvailabilityId {
    snapshot
        .availability
        .iter()
        .map(|a| a.id)
        .max()
        .map_or(1, |max| max + 1)
}

/// Mark or unmark a whole slot as busy in one action.
///
/// 1. an existing slot-level record is removed
/// 2. otherwise, a fully painted slot has its day records cleared
/// 3. otherwise, a slot-level busy record is added
///
/// Returns `None` for an unknown slot.
pub fn toggle_slot_availability(
    snapshot: &mut Snapshot,
    teacher: TeacherId,
    slot_id: SlotId,
) -> Option<SlotToggle> {
    let slot = snapshot.get_slot(slot_id)?.clone();

    if has_slot_record(snapshot, teacher, slot.id) {
        snapshot
            .availability
            .retain(|a| !(a.teacher_id == teacher && a.is_busy() && a.slot_id == Some(slot.id)));
        return Some(SlotToggle::RemovedSlotRecord);
    }

    let days = slot_days(snapshot, slot.id);
    let fully_painted = !days.is_empty()
        && days
            .iter()
            .all(|day| is_unavailable_on_day(snapshot, teacher, *day));

    if fully_painted {
        let before = snapshot.availability.len();
        snapshot.availability.retain(|a| {
            !(a.teacher_id == teacher
                && a.is_busy()
                && !a.is_slot_level()
                && days.contains(&a.from_date))
        });
        return Some(SlotToggle::ClearedDays(before - snapshot.availability.len()));
    }

    let id = next_availability_id(snapshot);
    snapshot
        .availability
        .push(TeacherAvailability::busy_slot(id, teacher, &slot));
    Some(SlotToggle::AddedSlotRecord(id))
}

/// Flip a single day-level busy record. Returns whether the day is now busy.
pub fn toggle_day_availability(snapshot: &mut Snapshot, teacher: TeacherId, date: NaiveDate) -> bool {
    if is_unavailable_on_day(snapshot, teacher, date) {
        snapshot
            .availability
            .retain(|a| !is_day_record_for(a, teacher, date));
        return false;
    }

    let id = next_availability_id(snapshot);
    snapshot
        .availability
        .push(TeacherAvailability::busy_day(id, teacher, date));
    true
}

/// Split multi-day day-level records into single-day records
pub fn expand_day_records(records: Vec<TeacherAvailability>) -> Vec<TeacherAvailability> {
    let mut next_id = records.iter().map(|a| a.id).max().map_or(1, |max| max + 1);
    let mut expanded = Vec::with_capacity(records.len());

    for record in records {
        if record.is_slot_level() || record.to_date <= record.from_date {
            expanded.push(TeacherAvailability {
                to_date: record.from_date.max(record.to_date),
                ..record
            });
            continue;
        }

        let mut first = true;
        for date in date_range(record.from_date, record.to_date) {
            let id = if first {
                first = false;
                record.id
            } else {
                next_id += 1;
                next_id - 1
            };
            expanded.push(TeacherAvailability {
                id,
                from_date: date,
                to_date: date,
                ..record.clone()
            });
        }
    }

    expanded
}
