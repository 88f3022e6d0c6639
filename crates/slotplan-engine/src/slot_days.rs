//! Slot day expansion
//!
//! A slot covers `[start, end]`, but stored end dates are not trusted to
//! respect adjacency: a slot's days stop the day before the next slot (by
//! start date) begins. Memoized `SlotDay` records are used when present;
//! recomputation yields the same dates.

use chrono::NaiveDate;
use slotplan_core::date::date_range;
use slotplan_core::{Slot, SlotDay, SlotRef, Snapshot};

/// Compute the calendar days of `slot` against the full slot set
pub fn compute_slot_days(slots: &[Slot], slot: &Slot) -> Vec<NaiveDate> {
    let successor_start = slots
        .iter()
        .filter(|other| other.id != slot.id && other.start > slot.start)
        .map(|other| other.start)
        .min();

    let end = match successor_start {
        Some(next) if next <= slot.end => next.pred_opt().unwrap_or(slot.start),
        _ => slot.end,
    };

    date_range(slot.start, end)
}

/// Days of a slot, preferring memoized records.
///
/// Unknown slot references yield no days.
pub fn slot_days(snapshot: &Snapshot, slot: impl Into<SlotRef>) -> Vec<NaiveDate> {
    let Some(slot) = snapshot.resolve_slot(slot) else {
        return Vec::new();
    };

    let mut memoized: Vec<NaiveDate> = snapshot
        .slot_days
        .iter()
        .filter(|d| d.slot_id == slot.id)
        .map(|d| d.date)
        .collect();

    if memoized.is_empty() {
        return compute_slot_days(&snapshot.slots, slot);
    }

    memoized.sort_unstable();
    memoized.dedup();
    memoized
}

/// Last effective day of a slot (its end after adjacency truncation)
pub fn effective_end(snapshot: &Snapshot, slot: &Slot) -> NaiveDate {
    slot_days(snapshot, slot.id).last().copied().unwrap_or(slot.end)
}

/// Recompute the memoized day records for every slot
pub fn materialize_slot_days(slots: &[Slot]) -> Vec<SlotDay> {
    let mut ordered: Vec<&Slot> = slots.iter().collect();
    ordered.sort_by_key(|s| (s.start, s.id));

    ordered
        .into_iter()
        .flat_map(|slot| {
            compute_slot_days(slots, slot)
                .into_iter()
                .map(move |date| (slot.id, date))
        })
        .zip(1..)
        .map(|((slot_id, date), id)| SlotDay { id, slot_id, date })
        .collect()
}
