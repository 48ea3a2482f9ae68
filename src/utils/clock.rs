use chrono::{DateTime, FixedOffset, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Clock and instant parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Instant has no UTC offset: {0}")]
    NaiveInstant(String),

    #[error("Invalid instant: {0}")]
    InvalidInstant(String),

    #[error("Invalid UTC offset: {0}")]
    InvalidOffset(String),
}

/// Result type for clock operations
pub type ClockResult<T> = Result<T, ClockError>;

/// Source of the current, offset-aware instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock expressed at a fixed offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

static OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("UTC offset pattern compiles")
});

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC`
pub fn parse_utc_offset(s: &str) -> ClockResult<FixedOffset> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| ClockError::InvalidOffset(s.to_string()));
    }

    let caps = OFFSET_RE
        .captures(trimmed)
        .ok_or_else(|| ClockError::InvalidOffset(s.to_string()))?;

    let hours: i32 = caps[2].parse().map_err(|_| ClockError::InvalidOffset(s.to_string()))?;
    let minutes: i32 = caps[3].parse().map_err(|_| ClockError::InvalidOffset(s.to_string()))?;
    if hours > 23 || minutes > 59 {
        return Err(ClockError::InvalidOffset(s.to_string()));
    }

    let seconds = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds).ok_or_else(|| ClockError::InvalidOffset(s.to_string()))
}

/// Parse an RFC 3339 instant.
///
/// An instant without an offset is refused rather than assumed to be UTC,
/// since minute-of-day depends on it.
pub fn parse_instant(s: &str) -> ClockResult<DateTime<FixedOffset>> {
    let trimmed = s.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant);
    }

    let naive_formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    if naive_formats
        .iter()
        .any(|fmt| chrono::NaiveDateTime::parse_from_str(trimmed, fmt).is_ok())
    {
        return Err(ClockError::NaiveInstant(s.to_string()));
    }

    Err(ClockError::InvalidInstant(s.to_string()))
}

/// True during the last minute of the local day, 23:59:00 up to midnight
pub fn is_frozen(now: &DateTime<FixedOffset>) -> bool {
    now.hour() == 23 && now.minute() == 59
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("utc").unwrap().local_minus_utc(), 0);
        for bad in ["8", "+8:00", "+24:00", "+08:60", "CST"] {
            assert!(parse_utc_offset(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn refuses_naive_instants() {
        assert!(parse_instant("2024-02-07T22:35:00+08:00").is_ok());
        assert_eq!(
            parse_instant("2024-02-07T22:35:00"),
            Err(ClockError::NaiveInstant("2024-02-07T22:35:00".to_string()))
        );
        assert!(matches!(parse_instant("yesterday"), Err(ClockError::InvalidInstant(_))));
    }

    #[test]
    fn freeze_covers_only_the_last_minute() {
        let at = |s: &str| parse_instant(s).unwrap();
        assert!(is_frozen(&at("2024-02-07T23:59:00+08:00")));
        assert!(is_frozen(&at("2024-02-07T23:59:59+08:00")));
        assert!(!is_frozen(&at("2024-02-07T23:58:59+08:00")));
        assert!(!is_frozen(&at("2024-02-08T00:00:00+08:00")));
    }

    #[test]
    fn system_clock_reports_in_its_offset() {
        let offset = parse_utc_offset("+08:00").unwrap();
        assert_eq!(SystemClock::new(offset).now().offset(), &offset);
    }
}
