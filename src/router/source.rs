use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::filter::normalizer::normalize_records;
use crate::models::device::MacAddress;
use crate::models::rule::Rule;
use crate::router::ikuai::RouterApi;
use crate::router::RouterError;
use crate::{debug, warn};

/// Rule source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for rule sources
pub type SourceResult<T> = Result<T, SourceError>;

/// Raw records of one device, or why they could not be read
pub type DeviceRecords = (MacAddress, SourceResult<Vec<Value>>);

/// Supplies the protocol-control rules attached to a device
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Raw rule records reaching `mac`, enabled or not
    async fn records_for(&self, mac: &MacAddress) -> SourceResult<Vec<Value>>;

    /// Records for every MAC of one cycle, in `macs` order.
    ///
    /// An outer error fails the whole cycle.
    async fn records_for_each(&self, macs: &[MacAddress]) -> SourceResult<Vec<DeviceRecords>> {
        let mut all = Vec::with_capacity(macs.len());
        for mac in macs {
            all.push((mac.clone(), self.records_for(mac).await));
        }
        Ok(all)
    }

    /// Valid, enabled rules for `mac`; malformed records are skipped
    async fn enabled_rules(&self, mac: &MacAddress) -> SourceResult<Vec<Rule>> {
        let records = self.records_for(mac).await?;
        Ok(normalize_records(&records).rules)
    }
}

/// Split a comma list the way the router stores it, dropping blanks.
///
/// Spaces (literal or `%20`) are removed entirely; an empty string is no names.
pub fn split_names(s: &str) -> Vec<String> {
    let cleaned = s.trim().replace(' ', "").replace("%20", "");
    if cleaned.is_empty() {
        return Vec::new();
    }
    cleaned.split(',').map(str::to_string).collect()
}

#[derive(Debug, Deserialize)]
struct MacGroupRow {
    group_name: String,

    #[serde(default)]
    addr_pool: String,
}

/// One listing of the router's MAC groups and protocol-control rules
struct RouterSnapshot {
    groups: HashMap<String, Vec<MacAddress>>,
    records: Vec<Value>,
}

impl RouterSnapshot {
    fn records_for(&self, mac: &MacAddress) -> Vec<Value> {
        let records: Vec<Value> = self
            .records
            .iter()
            .filter(|record| {
                record
                    .get("src_addr")
                    .and_then(Value::as_str)
                    .map(|src| reaches(src, mac, &self.groups))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        debug!("{} protocol rules reach {}", records.len(), mac);
        records
    }
}

/// Rules read live from the router's protocol-control table.
///
/// A rule reaches a device when its `src_addr` names a MAC group holding the
/// device, or names the device's MAC directly.
pub struct RouterRuleSource {
    api: Arc<dyn RouterApi>,
}

impl RouterRuleSource {
    pub fn new(api: Arc<dyn RouterApi>) -> Self {
        Self { api }
    }

    async fn mac_groups(&self) -> SourceResult<HashMap<String, Vec<MacAddress>>> {
        let mut groups = HashMap::new();

        for row in self.api.list_mac_groups().await? {
            let row: MacGroupRow = match serde_json::from_value(row) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping MAC group row: {}", e);
                    continue;
                }
            };

            let members = split_names(&row.addr_pool)
                .iter()
                .filter_map(|m| MacAddress::parse(m).ok())
                .collect();
            groups.insert(row.group_name, members);
        }

        Ok(groups)
    }

    async fn snapshot(&self) -> SourceResult<RouterSnapshot> {
        Ok(RouterSnapshot {
            groups: self.mac_groups().await?,
            records: self.api.list_acl_l7().await?,
        })
    }
}

fn reaches(src_addr: &str, mac: &MacAddress, groups: &HashMap<String, Vec<MacAddress>>) -> bool {
    split_names(src_addr).iter().any(|name| match groups.get(name) {
        Some(members) => members.contains(mac),
        None => MacAddress::parse(name).map(|m| m == *mac).unwrap_or(false),
    })
}

#[async_trait]
impl RuleSource for RouterRuleSource {
    async fn records_for(&self, mac: &MacAddress) -> SourceResult<Vec<Value>> {
        Ok(self.snapshot().await?.records_for(mac))
    }

    async fn records_for_each(&self, macs: &[MacAddress]) -> SourceResult<Vec<DeviceRecords>> {
        let snapshot = self.snapshot().await?;
        Ok(macs
            .iter()
            .map(|mac| (mac.clone(), Ok(snapshot.records_for(mac))))
            .collect())
    }
}

/// Rules read from a JSON file mapping each MAC to its rule records.
///
/// The file is re-read on every call so edits apply on the next cycle.
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn records_in(contents: &str, mac: &MacAddress) -> SourceResult<Vec<Value>> {
        let by_mac: HashMap<String, Vec<Value>> = serde_json::from_str(contents)?;

        let mut records = Vec::new();
        for (key, mut list) in by_mac {
            match MacAddress::parse(&key) {
                Ok(key_mac) if key_mac == *mac => records.append(&mut list),
                Ok(_) => {}
                Err(e) => warn!("Ignoring rules file entry: {}", e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    async fn records_for(&self, mac: &MacAddress) -> SourceResult<Vec<Value>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Self::records_in(&contents, mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::gateway::tests::FakeRouter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    fn acl_l7(comment: &str, src_addr: &str, enabled: &str) -> Value {
        json!({
            "id": 1, "prio": 15, "action": "drop", "app_proto": "所有协议",
            "src_addr": src_addr, "week": "1234567", "time": "00:00-23:59",
            "enabled": enabled, "comment": comment
        })
    }

    fn router() -> Arc<FakeRouter> {
        Arc::new(FakeRouter {
            mac_groups: vec![
                json!({"id": 1, "group_name": "kids", "addr_pool": "aa:bb:cc:dd:ee:ff, 11:22:33:44:55:66"}),
                json!({"id": 2, "group_name": "empty", "addr_pool": ""}),
            ],
            acl_l7: vec![
                acl_l7("by-group", "kids", "yes"),
                acl_l7("by-mac", "AA:BB:CC:DD:EE:FF", "yes"),
                acl_l7("disabled", "empty,kids", "no"),
                acl_l7("other", "empty", "yes"),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn splits_router_name_lists() {
        assert_eq!(split_names(" kids, tv%20box "), vec!["kids", "tvbox"]);
        assert!(split_names("  ").is_empty());
    }

    #[tokio::test]
    async fn resolves_rules_through_mac_groups() {
        let source = RouterRuleSource::new(router());
        let records = source.records_for(&mac("aa:bb:cc:dd:ee:ff")).await.unwrap();
        let comments: Vec<&str> = records.iter().map(|r| r["comment"].as_str().unwrap()).collect();
        assert_eq!(comments, vec!["by-group", "by-mac", "disabled"]);

        let rules = source.enabled_rules(&mac("aa:bb:cc:dd:ee:ff")).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.app_proto.is_all()));
    }

    #[tokio::test]
    async fn one_listing_serves_every_device() {
        let router = router();
        let source = RouterRuleSource::new(router.clone());
        let macs = [mac("aa:bb:cc:dd:ee:ff"), mac("11:22:33:44:55:66"), mac("00:00:00:00:00:01")];

        let all = source.records_for_each(&macs).await.unwrap();

        assert_eq!(*router.calls.lock().unwrap(), vec!["mac_group show", "acl_l7 show"]);
        let counts: Vec<(String, usize)> = all
            .iter()
            .map(|(mac, records)| (mac.to_string(), records.as_ref().unwrap().len()))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("aa:bb:cc:dd:ee:ff".to_string(), 3),
                ("11:22:33:44:55:66".to_string(), 2),
                ("00:00:00:00:00:01".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_device_has_no_rules() {
        let source = RouterRuleSource::new(router());
        assert!(source.enabled_rules(&mac("00:00:00:00:00:01")).await.unwrap().is_empty());
    }

    #[test]
    fn file_entries_match_any_mac_spelling() {
        let contents = json!({
            "AA-BB-CC-DD-EE-FF": [acl_l7("mine", "", "yes")],
            "11:22:33:44:55:66": [acl_l7("theirs", "", "yes")],
            "not-a-mac": [],
        })
        .to_string();

        let records = FileRuleSource::records_in(&contents, &mac("aa:bb:cc:dd:ee:ff")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["comment"], "mine");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let source = FileRuleSource::new("/nonexistent/policy-window-rules.json");
        assert!(matches!(
            source.records_for(&mac("aa:bb:cc:dd:ee:ff")).await,
            Err(SourceError::Io(_))
        ));
    }
}
