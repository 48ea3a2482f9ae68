use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Protocol label meaning "every protocol".
pub const ALL_PROTOCOLS: &str = "ALL";

/// The router UI reports the all-protocols sentinel under its localized label.
pub const ALL_PROTOCOLS_LOCALIZED: &str = "所有协议";

/// Error types for rule validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid weekdays: {0}")]
    InvalidWeekdays(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid enabled flag: {0}")]
    InvalidEnabled(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(i64),

    #[error("Malformed rule record: {0}")]
    Malformed(String),
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Wall-clock time within a day, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u16, minute: u16) -> RuleResult<Self> {
        if hour >= 24 || minute >= 60 {
            return Err(RuleError::InvalidTime(format!("{}:{}", hour, minute)));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    pub fn hour(&self) -> u16 {
        self.0 / 60
    }

    pub fn minute(&self) -> u16 {
        self.0 % 60
    }
}

impl FromStr for TimeOfDay {
    type Err = RuleError;

    /// Parse "HH:MM"; single-digit hours are tolerated the way the router UI emits them
    fn from_str(s: &str) -> RuleResult<Self> {
        let invalid = || RuleError::InvalidTime(s.to_string());

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let parse_part = |part: &str| -> RuleResult<u16> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u16>().map_err(|_| invalid())
        };

        Self::new(parse_part(hour)?, parse_part(minute)?).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Same-day time range, `start < end` always holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> RuleResult<Self> {
        if start >= end {
            return Err(RuleError::InvalidTimeRange(format!("{}-{}", start, end)));
        }
        Ok(Self { start, end })
    }

    /// Whether this range fully contains `other`
    pub fn covers(&self, other: &TimeRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Half-open membership test on minutes since midnight
    pub fn contains_minute(&self, minute: u16) -> bool {
        self.start.minutes() <= minute && minute < self.end.minutes()
    }
}

impl FromStr for TimeRange {
    type Err = RuleError;

    fn from_str(s: &str) -> RuleResult<Self> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| RuleError::InvalidTimeRange(s.to_string()))?;
        Self::new(start.parse()?, end.parse()?)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// ISO weekday, 1 = Monday .. 7 = Sunday
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Weekday(u8);

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday(1),
        Weekday(2),
        Weekday(3),
        Weekday(4),
        Weekday(5),
        Weekday(6),
        Weekday(7),
    ];

    pub fn new(number: u8) -> Option<Self> {
        (1..=7).contains(&number).then_some(Self(number))
    }

    pub fn from_digit(c: char) -> Option<Self> {
        c.to_digit(10).and_then(|d| Self::new(d as u8))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn as_digit(&self) -> char {
        char::from(b'0' + self.0)
    }

    /// Following day on the weekly ring (Sunday wraps to Monday)
    pub fn succ(&self) -> Self {
        Self(self.0 % 7 + 1)
    }

    /// Preceding day on the weekly ring (Monday wraps to Sunday)
    pub fn pred(&self) -> Self {
        Self((self.0 + 5) % 7 + 1)
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        Self(day.number_from_monday() as u8)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of weekdays, wire form is a digit string such as "124567"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(0b111_1111)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << (day.0 - 1);
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << (day.0 - 1)) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Days in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        Weekday::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl FromStr for WeekdaySet {
    type Err = RuleError;

    fn from_str(s: &str) -> RuleResult<Self> {
        s.chars()
            .map(|c| Weekday::from_digit(c).ok_or_else(|| RuleError::InvalidWeekdays(s.to_string())))
            .collect()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in self.iter() {
            write!(f, "{}", day)?;
        }
        Ok(())
    }
}

/// What a matching rule does with traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Drop,
    Accept,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Drop => "drop",
            RuleAction::Accept => "accept",
        }
    }
}

impl FromStr for RuleAction {
    type Err = RuleError;

    fn from_str(s: &str) -> RuleResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(RuleAction::Drop),
            "accept" => Ok(RuleAction::Accept),
            _ => Err(RuleError::InvalidAction(s.to_string())),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application protocol a rule matches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AppProto(String);

impl AppProto {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn all() -> Self {
        Self(ALL_PROTOCOLS.to_string())
    }

    pub fn is_all(&self) -> bool {
        self.0 == ALL_PROTOCOLS || self.0 == ALL_PROTOCOLS_LOCALIZED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated protocol-control rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    /// Display name (the router calls it the comment)
    pub name: String,

    /// Lower number takes precedence
    pub priority: u32,

    pub action: RuleAction,

    pub app_proto: AppProto,

    pub weekdays: WeekdaySet,

    pub time_range: TimeRange,

    pub enabled: bool,
}

impl Rule {
    /// Decode and validate one JSON rule record
    pub fn from_value(value: &serde_json::Value) -> RuleResult<Self> {
        let raw: RawRule = serde_json::from_value(value.clone())
            .map_err(|e| RuleError::Malformed(e.to_string()))?;
        Rule::try_from(raw)
    }

    /// Whether the rule applies on `day`
    pub fn active_on(&self, day: Weekday) -> bool {
        self.weekdays.contains(day)
    }
}

/// `enabled` arrives either as a JSON bool or as the router's "yes"/"no"
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnabledFlag {
    Bool(bool),
    Text(String),
}

impl EnabledFlag {
    pub fn to_bool(&self) -> RuleResult<bool> {
        match self {
            EnabledFlag::Bool(b) => Ok(*b),
            EnabledFlag::Text(s) => match s.trim().to_lowercase().as_str() {
                "yes" | "true" => Ok(true),
                "no" | "false" => Ok(false),
                _ => Err(RuleError::InvalidEnabled(s.clone())),
            },
        }
    }
}

/// Rule record as received, before validation.
///
/// Accepts both the engine's field names and the router's protocol-control
/// listing (`prio`, `week`, `comment`). Unknown fields such as `src_addr` or
/// `id` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    #[serde(alias = "prio")]
    pub priority: Option<i64>,
    pub action: Option<String>,
    pub app_proto: Option<String>,
    #[serde(alias = "week")]
    pub weekdays: Option<String>,
    pub time: Option<String>,
    pub enabled: Option<EnabledFlag>,
    #[serde(alias = "comment")]
    pub name: Option<String>,
}

impl TryFrom<RawRule> for Rule {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> RuleResult<Self> {
        let priority = raw.priority.ok_or(RuleError::MissingField("priority"))?;
        let priority = u32::try_from(priority).map_err(|_| RuleError::InvalidPriority(priority))?;
        let action = raw.action.ok_or(RuleError::MissingField("action"))?.parse()?;
        let app_proto = AppProto::new(raw.app_proto.ok_or(RuleError::MissingField("app_proto"))?);
        let weekdays = raw.weekdays.ok_or(RuleError::MissingField("weekdays"))?.parse()?;
        let time_range = raw.time.ok_or(RuleError::MissingField("time"))?.parse()?;
        let enabled = raw.enabled.ok_or(RuleError::MissingField("enabled"))?.to_bool()?;

        Ok(Rule {
            name: raw.name.unwrap_or_default(),
            priority,
            action,
            app_proto,
            weekdays,
            time_range,
            enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_formats_time_of_day() {
        let t: TimeOfDay = "05:07".parse().unwrap();
        assert_eq!(t.minutes(), 307);
        assert_eq!(t.to_string(), "05:07");

        let loose: TimeOfDay = "5:00".parse().unwrap();
        assert_eq!(loose.to_string(), "05:00");
    }

    #[test]
    fn rejects_out_of_range_times() {
        for bad in ["24:00", "12:60", "1200", "ab:cd", "", "12:", "-1:30", "123:00"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn time_range_requires_start_before_end() {
        assert!("22:00-06:00".parse::<TimeRange>().is_err());
        assert!("10:00-10:00".parse::<TimeRange>().is_err());
        let range: TimeRange = "00:00-23:59".parse().unwrap();
        assert_eq!(range.to_string(), "00:00-23:59");
        assert!(range.contains_minute(0));
        assert!(!range.contains_minute(23 * 60 + 59));
    }

    #[test]
    fn weekday_ring_wraps() {
        let sunday = Weekday::new(7).unwrap();
        let monday = Weekday::new(1).unwrap();
        assert_eq!(sunday.succ(), monday);
        assert_eq!(monday.pred(), sunday);
        assert_eq!(Weekday::new(4).unwrap().pred().number(), 3);
        assert!(Weekday::new(0).is_none());
        assert!(Weekday::new(8).is_none());
    }

    #[test]
    fn weekday_set_round_trips_through_digits() {
        let set: WeekdaySet = "742".parse().unwrap();
        assert_eq!(set.to_string(), "247");
        assert_eq!(set.len(), 3);
        assert!("128".parse::<WeekdaySet>().is_err());
        assert!("".parse::<WeekdaySet>().unwrap().is_empty());
    }

    #[test]
    fn decodes_router_shaped_record() {
        let rule = Rule::from_value(&json!({
            "prio": 28,
            "action": "drop",
            "app_proto": "所有协议",
            "src_addr": "kids",
            "week": "1234567",
            "time": "00:00-23:59",
            "id": 2,
            "enabled": "yes",
            "comment": "block all"
        }))
        .unwrap();

        assert_eq!(rule.priority, 28);
        assert_eq!(rule.action, RuleAction::Drop);
        assert!(rule.app_proto.is_all());
        assert_eq!(rule.weekdays, WeekdaySet::all());
        assert!(rule.enabled);
        assert_eq!(rule.name, "block all");
    }

    #[test]
    fn reports_the_first_missing_field() {
        let err = Rule::from_value(&json!({
            "priority": 1,
            "action": "drop",
            "app_proto": "ALL",
            "time": "00:00-01:00",
            "enabled": true
        }))
        .unwrap_err();
        assert_eq!(err, RuleError::MissingField("weekdays"));
    }

    #[test]
    fn rejects_bad_enabled_and_priority() {
        let base = json!({
            "priority": -3,
            "action": "drop",
            "app_proto": "ALL",
            "weekdays": "1",
            "time": "00:00-01:00",
            "enabled": true
        });
        assert_eq!(Rule::from_value(&base).unwrap_err(), RuleError::InvalidPriority(-3));

        let mut maybe = base.clone();
        maybe["priority"] = json!(1);
        maybe["enabled"] = json!("maybe");
        assert!(matches!(Rule::from_value(&maybe), Err(RuleError::InvalidEnabled(_))));
    }
}
