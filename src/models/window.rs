use serde::Serialize;

use crate::models::rule::{AppProto, RuleAction, TimeRange, Weekday};

/// Smallest interval of a day between two consecutive rule boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AtomicSlice {
    pub weekday: Weekday,
    pub range: TimeRange,
}

/// A block interval within a single weekday, after adjacent slices are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    pub weekday: Weekday,
    pub range: TimeRange,
}

/// The rule that governs one atomic slice of one weekday.
///
/// Only produced when that rule drops every protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DominantRecord {
    pub weekday: Weekday,
    pub range: TimeRange,
    pub rule_name: String,
    pub priority: u32,
    pub action: RuleAction,
    pub app_proto: AppProto,
}

/// A merged interval during which all traffic of a device is dropped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BlockWindow {
    /// Weekday digits, e.g. "12345" or "671"
    pub weekdays: String,

    pub range: TimeRange,
}

impl BlockWindow {
    pub fn new(weekdays: impl Into<String>, range: TimeRange) -> Self {
        Self {
            weekdays: weekdays.into(),
            range,
        }
    }

    /// Individual days of the group, in rendering order
    pub fn days(&self) -> impl Iterator<Item = Weekday> + '_ {
        self.weekdays.chars().filter_map(Weekday::from_digit)
    }
}

/// Result of locating a reference instant against the weekly windows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Window covering the instant, if any
    pub current: Option<BlockWindow>,

    /// Next window to start after the instant, wrapping into next week
    pub next: Option<BlockWindow>,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.next.is_none()
    }
}
