use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::rule::{TimeRange, WeekdaySet};
use crate::models::window::BlockWindow;

/// Error types for device identification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

// Six hex octets, separated consistently by ':' or '-' or not at all
static MAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}|(?:[0-9A-Fa-f]{2}-){5}[0-9A-Fa-f]{2}|[0-9A-Fa-f]{12})$",
    )
    .expect("MAC address pattern compiles")
});

/// Hardware address of a device, normalized to lowercase `aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(s: &str) -> DeviceResult<Self> {
        let trimmed = s.trim();
        if !MAC_RE.is_match(trimmed) {
            return Err(DeviceError::InvalidMacAddress(s.to_string()));
        }

        let hex: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
        Ok(Self(octets.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = DeviceError;

    fn from_str(s: &str) -> DeviceResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = DeviceError;

    fn try_from(s: String) -> DeviceResult<Self> {
        Self::parse(&s)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The MAC-level block rule currently installed on the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteActiveRule {
    /// Router-side row id, needed to edit or delete the rule
    pub id: Option<u64>,

    pub mac: MacAddress,

    /// Weekday digits as stored on the router
    pub week: String,

    /// "HH:MM-HH:MM" as stored on the router
    pub time: String,

    /// Free text; never compared
    pub comment: Option<String>,
}

impl RemoteActiveRule {
    /// Compare only the week and time fields against a desired rule.
    ///
    /// Week strings are compared as day sets and times as parsed ranges so that
    /// a router that re-orders digits or drops zero padding does not look like drift.
    pub fn matches(&self, desired: &DesiredRule) -> bool {
        let same_week = match (
            self.week.parse::<WeekdaySet>(),
            desired.week.parse::<WeekdaySet>(),
        ) {
            (Ok(remote), Ok(wanted)) => remote == wanted,
            _ => self.week == desired.week,
        };

        let same_time = match (self.time.parse::<TimeRange>(), desired.time.parse::<TimeRange>()) {
            (Ok(remote), Ok(wanted)) => remote == wanted,
            _ => self.time == desired.time,
        };

        same_week && same_time
    }
}

/// Rule the reconciler wants installed for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredRule {
    pub mac: MacAddress,
    pub week: String,
    pub time: String,
}

impl DesiredRule {
    pub fn from_window(mac: &MacAddress, window: &BlockWindow) -> Self {
        Self {
            mac: mac.clone(),
            week: window.weekdays.clone(),
            time: window.range.to_string(),
        }
    }
}
