//! Date-only normalization
//!
//! Every date the engine stores is a `NaiveDate`. Inputs arriving from the
//! outside (imports, user commands) go through [`normalize_date`], which
//! returns `None` instead of failing so callers decide whether an invalid
//! date is fatal.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone};

use crate::{EngineConfig, EngineError, Slot};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a date-like string into a calendar date.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, RFC 3339 timestamps and naive
/// date-times. Timestamps keep the date as written; the offset is ignored.
pub fn normalize_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|dt| dt.date())
}

/// Values that can be reduced to a calendar date
pub trait IntoDateOnly {
    fn into_date_only(self) -> Option<NaiveDate>;
}

impl IntoDateOnly for &str {
    fn into_date_only(self) -> Option<NaiveDate> {
        normalize_date(self)
    }
}

impl IntoDateOnly for &String {
    fn into_date_only(self) -> Option<NaiveDate> {
        normalize_date(self)
    }
}

impl IntoDateOnly for NaiveDate {
    fn into_date_only(self) -> Option<NaiveDate> {
        Some(self)
    }
}

impl IntoDateOnly for NaiveDateTime {
    fn into_date_only(self) -> Option<NaiveDate> {
        Some(self.date())
    }
}

impl<Tz: TimeZone> IntoDateOnly for DateTime<Tz> {
    fn into_date_only(self) -> Option<NaiveDate> {
        Some(self.date_naive())
    }
}

/// Last day of a slot starting at `start`: start + length - 1.
///
/// `None` when the end lies past the last representable date.
pub fn derive_slot_end(start: NaiveDate, length_days: i64) -> Option<NaiveDate> {
    start.checked_add_days(Days::new((length_days.max(1) - 1) as u64))
}

/// `start` shifted by `offset` days, `None` on overflow
pub fn offset_date(start: NaiveDate, offset: i64) -> Option<NaiveDate> {
    if offset >= 0 {
        start.checked_add_days(Days::new(offset as u64))
    } else {
        start.checked_sub_days(Days::new(offset.unsigned_abs()))
    }
}

/// Every date in `[start, end]`, empty when `end < start`
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    std::iter::successors(Some(start), |d| d.succ_opt())
        .take_while(|d| *d <= end)
        .collect()
}

/// Recompute derived slot ends.
///
/// Slots with `fixed_end` keep their stored end unless it precedes the
/// start, in which case the override is discarded. Fails on the first slot
/// whose end cannot be represented; earlier slots are already updated.
pub fn normalize_slots_in_place(slots: &mut [Slot], config: &EngineConfig) -> Result<(), EngineError> {
    for slot in slots.iter_mut() {
        if slot.fixed_end && slot.end < slot.start {
            slot.fixed_end = false;
        }
        if !slot.fixed_end {
            slot.end = derive_slot_end(slot.start, config.slot_length_days).ok_or_else(|| {
                EngineError::InvalidDate(format!(
                    "slot {} starting {} ends past the last supported date",
                    slot.id, slot.start
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn normalize_plain_dates() {
        assert_eq!(normalize_date("2024-01-08"), Some(d(2024, 1, 8)));
        assert_eq!(normalize_date(" 2024/01/08 "), Some(d(2024, 1, 8)));
    }

    #[test]
    fn normalize_timestamps_keep_written_date() {
        assert_eq!(normalize_date("2024-01-08T23:30:00+02:00"), Some(d(2024, 1, 8)));
        assert_eq!(normalize_date("2024-01-08T00:00:00Z"), Some(d(2024, 1, 8)));
        assert_eq!(normalize_date("2024-01-08T10:15:00"), Some(d(2024, 1, 8)));
        assert_eq!(normalize_date("2024-01-08 10:15:00.250"), Some(d(2024, 1, 8)));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date("2024-02-30"), None);
        assert_eq!(normalize_date("08.01.2024"), None);
    }

    #[test]
    fn into_date_only_impls() {
        let dt = d(2024, 3, 4).and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(dt.into_date_only(), Some(d(2024, 3, 4)));
        assert_eq!(d(2024, 3, 4).into_date_only(), Some(d(2024, 3, 4)));
        assert_eq!("2024-03-04".into_date_only(), Some(d(2024, 3, 4)));
        assert_eq!(dt.and_utc().into_date_only(), Some(d(2024, 3, 4)));
    }

    #[test]
    fn derive_end_is_inclusive() {
        assert_eq!(derive_slot_end(d(2024, 1, 8), 28), Some(d(2024, 2, 4)));
        assert_eq!(derive_slot_end(d(2024, 1, 8), 1), Some(d(2024, 1, 8)));
        // Non-positive lengths collapse to a single day
        assert_eq!(derive_slot_end(d(2024, 1, 8), 0), Some(d(2024, 1, 8)));
    }

    #[test]
    fn derive_end_past_last_date_is_none() {
        assert_eq!(derive_slot_end(NaiveDate::MAX, 28), None);
        assert_eq!(derive_slot_end(NaiveDate::MAX, 1), Some(NaiveDate::MAX));
        assert_eq!(offset_date(NaiveDate::MAX, 3), None);
        assert_eq!(offset_date(d(2024, 1, 8), -1), Some(d(2024, 1, 7)));
    }

    #[test]
    fn normalize_slots_rejects_unrepresentable_end() {
        let mut slots = vec![Slot::new(7, NaiveDate::MAX)];
        let err = normalize_slots_in_place(&mut slots, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDate(_)));
        assert!(err.to_string().contains("slot 7"));
    }

    #[test]
    fn date_range_bounds() {
        let days = date_range(d(2024, 2, 27), d(2024, 3, 1));
        assert_eq!(days, vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert!(date_range(d(2024, 3, 1), d(2024, 2, 1)).is_empty());
        assert_eq!(date_range(NaiveDate::MAX, NaiveDate::MAX), vec![NaiveDate::MAX]);
    }

    #[test]
    fn normalize_slots_recomputes_derived_end() {
        let config = EngineConfig::default();
        let mut stale = Slot::new(1, d(2024, 1, 8));
        stale.end = d(2024, 1, 31);
        let fixed = Slot::new(2, d(2024, 2, 5)).ending(d(2024, 2, 20));
        let mut broken = Slot::new(3, d(2024, 3, 4)).ending(d(2024, 3, 1));
        broken.end = d(2024, 3, 1);

        let mut slots = vec![stale, fixed, broken];
        normalize_slots_in_place(&mut slots, &config).unwrap();

        assert_eq!(slots[0].end, d(2024, 2, 4));
        assert_eq!(slots[1].end, d(2024, 2, 20));
        assert!(!slots[2].fixed_end);
        assert_eq!(slots[2].end, d(2024, 3, 31));
    }
}
