use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use lru::LruCache;

use crate::filter::dominant::resolve_dominant;
use crate::filter::locator::locate_schedule;
use crate::filter::merge::{merge_daily, merge_weekly};
use crate::filter::normalizer::enabled_rules;
use crate::models::rule::Rule;
use crate::models::window::{BlockWindow, Schedule};
use crate::utils::metrics_channel::increment_counter;

/// Default number of distinct rule snapshots kept by [`WindowCache`]
pub const DEFAULT_WINDOW_CACHE_CAPACITY: usize = 64;

/// Resolve a rule snapshot into the weekly windows where all traffic is dropped
pub fn compute_block_windows(rules: &[Rule]) -> Vec<BlockWindow> {
    let enabled = enabled_rules(rules);
    let dominant = resolve_dominant(&enabled);
    let daily = merge_daily(&dominant);
    merge_weekly(&daily)
}

/// Windows plus the schedule at `now`, in one call
pub fn schedule_at<Tz: TimeZone>(rules: &[Rule], now: &DateTime<Tz>) -> Schedule {
    locate_schedule(&compute_block_windows(rules), now)
}

fn rule_hash(rule: &Rule) -> u64 {
    let mut hasher = DefaultHasher::new();
    rule.hash(&mut hasher);
    hasher.finish()
}

/// Canonical key for a snapshot: enabled rules only, order removed.
///
/// Rules are compared in full on lookup, so a hash tie only costs a miss.
fn snapshot_key(rules: &[Rule]) -> Vec<Rule> {
    let mut key = enabled_rules(rules);
    key.sort_by_cached_key(rule_hash);
    key
}

/// Caller-owned memo of computed windows keyed by rule snapshot
pub struct WindowCache {
    entries: LruCache<Vec<Rule>, Arc<Vec<BlockWindow>>>,
}

impl WindowCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Windows for `rules`, computed at most once per distinct snapshot
    pub fn windows_for(&mut self, rules: &[Rule]) -> Arc<Vec<BlockWindow>> {
        let key = snapshot_key(rules);

        if let Some(windows) = self.entries.get(&key) {
            increment_counter("window_cache_hits");
            return windows.clone();
        }

        increment_counter("window_cache_misses");
        let windows = Arc::new(compute_block_windows(&key));
        self.entries.put(key, windows.clone());
        windows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WindowCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::normalizer::normalize_records;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wednesday_rules() -> Vec<Rule> {
        normalize_records(&[
            json!({"priority": 1, "action": "accept", "app_proto": "ALL",
                   "weekdays": "3", "time": "22:10-22:25", "enabled": true, "name": "allow"}),
            json!({"priority": 15, "action": "drop", "app_proto": "ALL",
                   "weekdays": "1234567", "time": "00:00-23:59", "enabled": true, "name": "block"}),
        ])
        .rules
    }

    #[test]
    fn every_day_rule_is_one_window() {
        let rules = normalize_records(&[json!({
            "priority": 15, "action": "drop", "app_proto": "ALL",
            "weekdays": "1234567", "time": "00:00-23:59", "enabled": true, "name": "block"
        })])
        .rules;

        assert_eq!(
            compute_block_windows(&rules),
            vec![BlockWindow::new("1234567", "00:00-23:59".parse().unwrap())]
        );
    }

    #[test]
    fn accept_splits_only_its_own_day() {
        let windows: Vec<String> = compute_block_windows(&wednesday_rules())
            .iter()
            .map(|w| format!("{} {}", w.weekdays, w.range))
            .collect();
        assert_eq!(
            windows,
            vec!["456712 00:00-23:59", "3 00:00-22:10", "3 22:25-23:59"]
        );
    }

    #[test]
    fn wednesday_evening_example() {
        let now = DateTime::parse_from_rfc3339("2024-02-07T22:35:00+08:00").unwrap();
        let schedule = schedule_at(&wednesday_rules(), &now);
        assert_eq!(
            schedule.current,
            Some(BlockWindow::new("3", "22:25-23:59".parse().unwrap()))
        );
        assert!(schedule.next.is_some());
    }

    #[test]
    fn no_enabled_rules_means_no_schedule() {
        let mut rules = wednesday_rules();
        rules.iter_mut().for_each(|r| r.enabled = false);

        assert!(compute_block_windows(&rules).is_empty());
        let now = DateTime::parse_from_rfc3339("2024-02-07T22:35:00+08:00").unwrap();
        let schedule = schedule_at(&rules, &now.with_timezone(&FixedOffset::east_opt(0).unwrap()));
        assert!(schedule.is_empty());
    }

    #[test]
    fn cache_ignores_rule_order_and_disabled_rules() {
        let mut cache = WindowCache::new(4);
        let rules = wednesday_rules();
        let first = cache.windows_for(&rules);

        let mut reordered: Vec<Rule> = rules.iter().rev().cloned().collect();
        let mut disabled = rules[0].clone();
        disabled.enabled = false;
        disabled.name = "ignored".to_string();
        reordered.push(disabled);

        let second = cache.windows_for(&reordered);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_distinguishes_different_snapshots() {
        let mut cache = WindowCache::new(4);
        let rules = wednesday_rules();
        cache.windows_for(&rules);
        cache.windows_for(&rules[1..]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.windows_for(&rules[1..]).len(), 1);
    }
}
