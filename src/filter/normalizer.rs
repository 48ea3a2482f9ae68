use serde_json::Value;

use crate::models::rule::{Rule, RuleError};
use crate::utils::metrics_channel::increment_counter;
use crate::warn;

/// A record that failed validation, with its position in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: RuleError,
}

/// Output of decoding a raw rule listing
#[derive(Debug, Clone, Default)]
pub struct NormalizedRules {
    /// Valid, enabled rules; order carries no meaning
    pub rules: Vec<Rule>,

    pub rejected: Vec<RejectedRecord>,
}

/// Keep only the rules that take part in evaluation
pub fn enabled_rules(rules: &[Rule]) -> Vec<Rule> {
    rules.iter().filter(|r| r.enabled).cloned().collect()
}

/// Decode JSON rule records, skipping the malformed ones.
///
/// A bad record never aborts the batch: it is logged, counted and reported
/// in [`NormalizedRules::rejected`].
pub fn normalize_records(records: &[Value]) -> NormalizedRules {
    let mut normalized = NormalizedRules::default();

    for (index, record) in records.iter().enumerate() {
        match Rule::from_value(record) {
            Ok(rule) if rule.enabled => normalized.rules.push(rule),
            Ok(_) => {}
            Err(error) => {
                warn!("Skipping rule record #{}: {}", index, error);
                increment_counter("rules_rejected");
                normalized.rejected.push(RejectedRecord { index, error });
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, enabled: bool) -> Value {
        json!({
            "priority": 10,
            "action": "drop",
            "app_proto": "ALL",
            "weekdays": "12345",
            "time": "08:00-12:00",
            "enabled": enabled,
            "name": name
        })
    }

    #[test]
    fn empty_input_yields_nothing() {
        let normalized = normalize_records(&[]);
        assert!(normalized.rules.is_empty());
        assert!(normalized.rejected.is_empty());
        assert!(enabled_rules(&[]).is_empty());
    }

    #[test]
    fn drops_disabled_rules() {
        let normalized = normalize_records(&[record("on", true), record("off", false)]);
        assert_eq!(normalized.rules.len(), 1);
        assert_eq!(normalized.rules[0].name, "on");

        let all: Vec<Rule> = [record("a", true), record("b", false)]
            .iter()
            .map(|v| Rule::from_value(v).unwrap())
            .collect();
        let kept = enabled_rules(&all);
        assert_eq!(kept.len(), 1);
        assert!(kept.iter().all(|r| r.enabled));
    }

    #[test]
    fn skips_malformed_record_and_keeps_the_rest() {
        let mut broken = record("broken", true);
        broken["time"] = json!("8am-noon");

        let normalized = normalize_records(&[record("good", true), broken, json!("not an object")]);
        assert_eq!(normalized.rules.len(), 1);
        assert_eq!(normalized.rejected.len(), 2);
        assert_eq!(normalized.rejected[0].index, 1);
        assert!(matches!(normalized.rejected[0].error, RuleError::InvalidTime(_)));
        assert!(matches!(normalized.rejected[1].error, RuleError::Malformed(_)));
    }
}
