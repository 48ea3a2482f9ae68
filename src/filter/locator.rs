use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::models::rule::Weekday;
use crate::models::window::{BlockWindow, Schedule};

/// Find the window active at `now` and the next one to start after it.
///
/// `now` must already be expressed in the timezone the windows are written
/// in; weekday and minute of day are read straight off it. Seconds are
/// ignored, matching the router's minute resolution.
pub fn locate_schedule<Tz: TimeZone>(windows: &[BlockWindow], now: &DateTime<Tz>) -> Schedule {
    if windows.is_empty() {
        return Schedule::default();
    }

    let today = Weekday::from(now.weekday());
    let minute = (now.hour() * 60 + now.minute()) as u16;

    let mut slots: Vec<(Weekday, &BlockWindow)> = windows
        .iter()
        .flat_map(|window| window.days().map(move |day| (day, window)))
        .collect();

    let current = slots
        .iter()
        .find(|(day, window)| *day == today && window.range.contains_minute(minute))
        .map(|(_, window)| (*window).clone());

    slots.sort_by_key(|(day, window)| (*day, window.range.start));
    let next = slots
        .iter()
        .find(|(day, window)| {
            *day > today || (*day == today && window.range.start.minutes() > minute)
        })
        // nothing left this week: the earliest window of next week
        .or_else(|| slots.first())
        .map(|(_, window)| (*window).clone());

    Schedule { current, next }
}
