//! Change notifications
//!
//! Every committed command produces one [`StoreEvent`] tagged with the kind
//! of change and whatever the repair passes altered. Subscribers are called
//! in registration order.

use serde::Serialize;
use slotplan_core::RepairReport;

/// What a command changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Import,
    Course,
    Cohort,
    Teacher,
    Slot,
    CourseRun,
    Availability,
    TeachingDay,
    ExamDate,
    /// Explicit validation run
    Repair,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Import => "import",
            ChangeKind::Course => "course",
            ChangeKind::Cohort => "cohort",
            ChangeKind::Teacher => "teacher",
            ChangeKind::Slot => "slot",
            ChangeKind::CourseRun => "course_run",
            ChangeKind::Availability => "availability",
            ChangeKind::TeachingDay => "teaching_day",
            ChangeKind::ExamDate => "exam_date",
            ChangeKind::Repair => "repair",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification sent after a successful command
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreEvent {
    pub kind: ChangeKind,
    /// Repairs applied while committing this change
    pub repairs: RepairReport,
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&StoreEvent) + Send>;

/// Ordered subscriber list
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Callback)>,
}

impl Subscribers {
    pub fn subscribe(&mut self, callback: impl FnMut(&StoreEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Returns false when the id was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn notify(&mut self, event: &StoreEvent) {
        for (_, callback) in self.entries.iter_mut() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.len())
            .finish()
    }
}
