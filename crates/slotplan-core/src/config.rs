//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunable engine parameters.
///
/// Missing fields fall back to their defaults when deserialized, so a
/// configuration file only needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of every slot in calendar days
    pub slot_length_days: i64,
    /// Default teaching days as day offsets from the slot start
    pub teaching_day_offsets: Vec<i64>,
    /// Lock a freshly set exam date
    pub lock_exam_on_set: bool,
}

impl EngineConfig {
    pub const DEFAULT_SLOT_LENGTH_DAYS: i64 = 28;

    /// Mon+Thu in week 1, Tue+Thu in weeks 2 and 3, Mon+Fri in week 4
    pub const DEFAULT_TEACHING_DAY_OFFSETS: [i64; 8] = [0, 3, 8, 10, 15, 17, 21, 25];

    pub fn with_slot_length(mut self, days: i64) -> Self {
        self.slot_length_days = days;
        self
    }

    pub fn with_teaching_day_offsets(mut self, offsets: impl Into<Vec<i64>>) -> Self {
        self.teaching_day_offsets = offsets.into();
        self
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_length_days < 1 {
            return Err(format!(
                "slot_length_days must be at least 1, got {}",
                self.slot_length_days
            ));
        }
        if let Some(bad) = self
            .teaching_day_offsets
            .iter()
            .find(|o| **o < 0 || **o >= self.slot_length_days)
        {
            return Err(format!(
                "teaching day offset {} is outside a {}-day slot",
                bad, self.slot_length_days
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_length_days: Self::DEFAULT_SLOT_LENGTH_DAYS,
            teaching_day_offsets: Self::DEFAULT_TEACHING_DAY_OFFSETS.to_vec(),
            lock_exam_on_set: true,
        }
    }
}
