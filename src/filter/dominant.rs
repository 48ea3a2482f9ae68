use std::collections::BTreeSet;

use crate::models::rule::{Rule, RuleAction, TimeOfDay, TimeRange, Weekday};
use crate::models::window::{AtomicSlice, DominantRecord};

/// Cut a weekday at every boundary of the rules active on it.
///
/// Returns no slices when no rule applies on `day`.
pub fn atomic_slices(rules: &[Rule], day: Weekday) -> Vec<AtomicSlice> {
    let boundaries: BTreeSet<TimeOfDay> = rules
        .iter()
        .filter(|r| r.active_on(day))
        .flat_map(|r| [r.time_range.start, r.time_range.end])
        .collect();

    let points: Vec<TimeOfDay> = boundaries.into_iter().collect();
    points
        .windows(2)
        .filter_map(|pair| TimeRange::new(pair[0], pair[1]).ok())
        .map(|range| AtomicSlice { weekday: day, range })
        .collect()
}

/// Evaluation order the router applies: priority, then drop before accept.
///
/// The name only breaks exact ties so the outcome does not depend on input order.
fn precedence(rule: &Rule) -> (u32, bool, &str) {
    (rule.priority, rule.action != RuleAction::Drop, rule.name.as_str())
}

/// Find the drop-all rule that governs `slice`, if any
pub fn dominant_for_slice(rules: &[Rule], slice: &AtomicSlice) -> Option<DominantRecord> {
    let mut covering: Vec<&Rule> = rules
        .iter()
        .filter(|r| r.active_on(slice.weekday) && r.time_range.covers(&slice.range))
        .collect();
    covering.sort_by(|a, b| precedence(a).cmp(&precedence(b)));

    for rule in covering {
        if rule.action == RuleAction::Accept {
            // an accept masks every lower-precedence drop
            return None;
        }
        if rule.app_proto.is_all() {
            return Some(DominantRecord {
                weekday: slice.weekday,
                range: slice.range,
                rule_name: rule.name.clone(),
                priority: rule.priority,
                action: rule.action,
                app_proto: rule.app_proto.clone(),
            });
        }
    }

    None
}

/// Every slice of the week where dropping all protocols is the outcome
pub fn resolve_dominant(rules: &[Rule]) -> Vec<DominantRecord> {
    Weekday::ALL
        .into_iter()
        .flat_map(|day| atomic_slices(rules, day))
        .filter_map(|slice| dominant_for_slice(rules, &slice))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::{AppProto, WeekdaySet};

    fn rule(priority: u32, action: RuleAction, proto: &str, days: &str, time: &str, name: &str) -> Rule {
        Rule {
            name: name.to_string(),
            priority,
            action,
            app_proto: AppProto::new(proto),
            weekdays: days.parse::<WeekdaySet>().unwrap(),
            time_range: time.parse().unwrap(),
            enabled: true,
        }
    }

    #[test]
    fn slices_follow_boundaries() {
        let rules = vec![
            rule(15, RuleAction::Drop, "ALL", "1", "00:00-23:59", "drop"),
            rule(1, RuleAction::Accept, "ALL", "1", "10:00-11:00", "allow"),
        ];
        let slices: Vec<String> = atomic_slices(&rules, Weekday::new(1).unwrap())
            .iter()
            .map(|s| s.range.to_string())
            .collect();
        assert_eq!(slices, vec!["00:00-10:00", "10:00-11:00", "11:00-23:59"]);
        assert!(atomic_slices(&rules, Weekday::new(2).unwrap()).is_empty());
    }

    #[test]
    fn rules_confined_to_workdays_never_touch_the_weekend() {
        let mut disabled_accept = rule(15, RuleAction::Accept, "ALL", "12345", "10:00-11:59", "allow");
        disabled_accept.enabled = false;
        let rules = crate::filter::normalizer::enabled_rules(&[
            disabled_accept,
            rule(20, RuleAction::Drop, "ALL", "12345", "00:00-23:59", "block"),
        ]);

        let records = resolve_dominant(&rules);
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.weekday.number() <= 5));
    }

    #[test]
    fn drop_all_wins_over_higher_priority_specific_drop() {
        let rules = vec![
            rule(1, RuleAction::Drop, "other", "1", "00:00-03:00", "other protocols"),
            rule(15, RuleAction::Drop, "ALL", "1", "00:00-03:00", "block"),
            rule(15, RuleAction::Accept, "video", "1", "00:00-23:59", "allow video"),
        ];

        let records = resolve_dominant(&rules);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].priority, 15);
        assert_eq!(records[0].rule_name, "block");
        assert_eq!(records[0].range.to_string(), "00:00-03:00");
    }

    #[test]
    fn accept_masks_lower_priority_drop_all() {
        let rules = vec![
            rule(1, RuleAction::Accept, "ALL", "3", "22:10-22:25", "allow"),
            rule(15, RuleAction::Drop, "ALL", "1234567", "00:00-23:59", "block"),
        ];

        let wednesday: Vec<String> = resolve_dominant(&rules)
            .into_iter()
            .filter(|r| r.weekday.number() == 3)
            .map(|r| r.range.to_string())
            .collect();
        assert_eq!(wednesday, vec!["00:00-22:10", "22:25-23:59"]);
    }

    #[test]
    fn equal_priority_accept_loses_to_drop() {
        let rules = vec![
            rule(5, RuleAction::Accept, "ALL", "2", "08:00-09:00", "allow"),
            rule(5, RuleAction::Drop, "ALL", "2", "08:00-09:00", "block"),
        ];
        assert_eq!(resolve_dominant(&rules).len(), 1);
    }

    #[test]
    fn specific_drops_alone_produce_nothing() {
        let rules = vec![rule(1, RuleAction::Drop, "other", "1", "00:00-03:00", "other")];
        assert!(resolve_dominant(&rules).is_empty());
    }

    #[test]
    fn gaps_between_rules_have_no_record() {
        let rules = vec![
            rule(10, RuleAction::Drop, "ALL", "4", "08:00-09:00", "morning"),
            rule(10, RuleAction::Drop, "ALL", "4", "18:00-19:00", "evening"),
        ];
        let ranges: Vec<String> = resolve_dominant(&rules).iter().map(|r| r.range.to_string()).collect();
        assert_eq!(ranges, vec!["08:00-09:00", "18:00-19:00"]);
    }
}
