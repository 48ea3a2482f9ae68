use crate::models::rule::{TimeRange, Weekday, WeekdaySet};
use crate::models::window::{BlockWindow, DayWindow, DominantRecord};

/// Largest gap, in minutes, still treated as adjacency within a day
pub const MERGE_GAP_MINUTES: u16 = 1;

fn joins(prev: &TimeRange, next: &TimeRange) -> bool {
    next.start.minutes() <= prev.end.minutes() + MERGE_GAP_MINUTES
}

fn merge_pass(sorted: &[DayWindow]) -> Vec<DayWindow> {
    let mut merged: Vec<DayWindow> = Vec::with_capacity(sorted.len());

    for window in sorted {
        match merged.last_mut() {
            Some(prev) if prev.weekday == window.weekday && joins(&prev.range, &window.range) => {
                prev.range.end = prev.range.end.max(window.range.end);
            }
            _ => merged.push(*window),
        }
    }

    merged
}

/// Join touching or near-touching block slices of the same weekday.
///
/// Repeats until a pass no longer shrinks the list.
pub fn merge_daily(records: &[DominantRecord]) -> Vec<DayWindow> {
    let mut windows: Vec<DayWindow> = records
        .iter()
        .map(|r| DayWindow {
            weekday: r.weekday,
            range: r.range,
        })
        .collect();
    windows.sort_by_key(|w| (w.weekday, w.range.start));

    loop {
        let merged = merge_pass(&windows);
        if merged.len() == windows.len() {
            return merged;
        }
        windows = merged;
    }
}

/// Render one connected run of the weekly ring, starting from its first day
fn render_run(run: WeekdaySet) -> String {
    let first = run
        .iter()
        .find(|day| !run.contains(day.pred()))
        .unwrap_or(Weekday::ALL[0]);

    let mut rendered = String::with_capacity(run.len());
    let mut day = first;
    for _ in 0..run.len() {
        rendered.push(day.as_digit());
        day = day.succ();
    }
    rendered
}

/// Split a set of days into runs that are connected on the ring 1-2-..-7-1.
///
/// A run that wraps past Sunday is rendered from its start, so "671" rather
/// than "167"; the full week renders as "1234567".
pub fn weekday_runs(days: WeekdaySet) -> Vec<String> {
    let mut visited = WeekdaySet::empty();
    let mut runs = Vec::new();

    for start in days.iter() {
        if visited.contains(start) {
            continue;
        }

        let mut run = WeekdaySet::empty();
        let mut stack = vec![start];
        while let Some(day) = stack.pop() {
            if visited.contains(day) {
                continue;
            }
            visited.insert(day);
            run.insert(day);

            for neighbour in [day.pred(), day.succ()] {
                if days.contains(neighbour) && !visited.contains(neighbour) {
                    stack.push(neighbour);
                }
            }
        }

        runs.push(render_run(run));
    }

    runs
}

/// Group same-range daily windows across the week into block windows
pub fn merge_weekly(daily: &[DayWindow]) -> Vec<BlockWindow> {
    // first-seen order keeps the output deterministic
    let mut groups: Vec<(TimeRange, WeekdaySet)> = Vec::new();
    for window in daily {
        match groups.iter_mut().find(|(range, _)| *range == window.range) {
            Some((_, days)) => days.insert(window.weekday),
            None => groups.push((window.range, std::iter::once(window.weekday).collect())),
        }
    }

    groups
        .into_iter()
        .flat_map(|(range, days)| {
            weekday_runs(days)
                .into_iter()
                .map(move |run| BlockWindow::new(run, range))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::{AppProto, RuleAction};
    use pretty_assertions::assert_eq;

    fn record(day: u8, time: &str) -> DominantRecord {
        DominantRecord {
            weekday: Weekday::new(day).unwrap(),
            range: time.parse().unwrap(),
            rule_name: "block".to_string(),
            priority: 15,
            action: RuleAction::Drop,
            app_proto: AppProto::all(),
        }
    }

    fn ranges(windows: &[DayWindow]) -> Vec<String> {
        windows.iter().map(|w| format!("{}:{}", w.weekday, w.range)).collect()
    }

    #[test]
    fn joins_adjacent_and_one_minute_gaps() {
        let merged = merge_daily(&[
            record(1, "00:00-03:00"),
            record(1, "03:00-11:59"),
            record(1, "12:00-18:00"),
            record(1, "18:02-20:00"),
        ]);
        assert_eq!(ranges(&merged), vec!["1:00:00-18:00", "1:18:02-20:00"]);
    }

    #[test]
    fn never_joins_across_days() {
        let merged = merge_daily(&[record(2, "00:00-23:59"), record(1, "00:00-23:59")]);
        assert_eq!(ranges(&merged), vec!["1:00:00-23:59", "2:00:00-23:59"]);
    }

    #[test]
    fn merges_regardless_of_input_order() {
        let merged = merge_daily(&[
            record(5, "10:00-11:00"),
            record(5, "09:00-10:00"),
            record(5, "11:00-12:00"),
        ]);
        assert_eq!(ranges(&merged), vec!["5:09:00-12:00"]);
    }

    #[test]
    fn runs_on_the_weekly_ring() {
        let runs = |s: &str| weekday_runs(s.parse().unwrap());
        assert_eq!(runs("1234567"), vec!["1234567"]);
        assert_eq!(runs("12345"), vec!["12345"]);
        assert_eq!(runs("124567"), vec!["456712"]);
        assert_eq!(runs("17"), vec!["71"]);
        assert_eq!(runs("135"), vec!["1", "3", "5"]);
        assert_eq!(runs("2367"), vec!["23", "67"]);
        assert!(runs("").is_empty());
    }

    #[test]
    fn every_day_collapses_to_one_window() {
        let records: Vec<DominantRecord> = (1..=7).map(|d| record(d, "00:00-23:59")).collect();
        let windows = merge_weekly(&merge_daily(&records));
        assert_eq!(windows, vec![BlockWindow::new("1234567", "00:00-23:59".parse().unwrap())]);
    }

    #[test]
    fn keeps_distinct_ranges_apart() {
        let daily = merge_daily(&[
            record(1, "05:00-23:59"),
            record(2, "05:00-23:59"),
            record(3, "05:00-22:10"),
            record(3, "22:25-23:59"),
            record(4, "05:00-23:59"),
        ]);
        let windows: Vec<String> = merge_weekly(&daily)
            .iter()
            .map(|w| format!("{} {}", w.weekdays, w.range))
            .collect();
        assert_eq!(
            windows,
            vec!["12 05:00-23:59", "4 05:00-23:59", "3 05:00-22:10", "3 22:25-23:59"]
        );
    }
}
