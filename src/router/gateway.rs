use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::device::{MacAddress, RemoteActiveRule};
use crate::router::ikuai::RouterApi;
use crate::router::{GatewayError, RouterError};
use crate::{debug, info};

/// Comment stamped on the block rules this service installs
pub const RULE_COMMENT: &str = "policy-window";

/// The router's single "block this MAC" rule per device
#[async_trait]
pub trait RemoteRuleGateway: Send + Sync {
    /// The enabled MAC-level rule for `mac`, if one is installed
    async fn get_active_rule(&self, mac: &MacAddress) -> Result<Option<RemoteActiveRule>, GatewayError>;

    /// Install the block rule for `mac`, replacing the active one
    async fn add_rule(&self, mac: &MacAddress, weekdays: &str, time_range: &str) -> Result<(), GatewayError>;

    /// Like [`add_rule`](Self::add_rule), given the active rule the caller
    /// just read, so the gateway need not look it up again
    async fn replace_rule(
        &self,
        mac: &MacAddress,
        _active: Option<&RemoteActiveRule>,
        weekdays: &str,
        time_range: &str,
    ) -> Result<(), GatewayError> {
        self.add_rule(mac, weekdays, time_range).await
    }

    /// Remove the active block rule for `mac`; no rule is not an error
    async fn remove_rule(&self, mac: &MacAddress) -> Result<(), GatewayError>;
}

/// Row of the router's `acl_mac` listing
#[derive(Debug, Deserialize)]
struct AclMacRow {
    #[serde(default)]
    id: Option<u64>,

    #[serde(default)]
    mac: String,

    #[serde(default)]
    week: String,

    #[serde(default)]
    time: String,

    #[serde(default)]
    enabled: String,

    #[serde(default)]
    comment: Option<String>,
}

impl AclMacRow {
    fn is_enabled(&self) -> bool {
        self.enabled.trim().eq_ignore_ascii_case("yes")
    }

    fn into_remote(self, mac: MacAddress) -> RemoteActiveRule {
        RemoteActiveRule {
            id: self.id,
            mac,
            week: self.week,
            time: self.time,
            comment: self.comment,
        }
    }
}

/// First enabled row for `mac`; rows that don't decode are skipped
fn find_active(rows: Vec<Value>, mac: &MacAddress) -> Option<RemoteActiveRule> {
    rows.into_iter()
        .filter_map(|row| serde_json::from_value::<AclMacRow>(row).ok())
        .find_map(|row| match MacAddress::parse(&row.mac) {
            Ok(row_mac) if row_mac == *mac && row.is_enabled() => Some(row.into_remote(row_mac)),
            _ => None,
        })
}

/// [`RemoteRuleGateway`] backed by the router's MAC access-control table
pub struct IkuaiGateway {
    api: Arc<dyn RouterApi>,
}

impl IkuaiGateway {
    pub fn new(api: Arc<dyn RouterApi>) -> Self {
        Self { api }
    }

    fn rule_param(mac: &MacAddress, weekdays: &str, time_range: &str) -> Value {
        json!({
            "mac": mac.as_str(),
            "week": weekdays,
            "time": time_range,
            "enabled": "yes",
            "comment": RULE_COMMENT,
        })
    }
}

#[async_trait]
impl RemoteRuleGateway for IkuaiGateway {
    async fn get_active_rule(&self, mac: &MacAddress) -> Result<Option<RemoteActiveRule>, GatewayError> {
        let rows = self.api.list_acl_mac().await?;
        Ok(find_active(rows, mac))
    }

    async fn add_rule(&self, mac: &MacAddress, weekdays: &str, time_range: &str) -> Result<(), GatewayError> {
        let active = self.get_active_rule(mac).await?;
        self.replace_rule(mac, active.as_ref(), weekdays, time_range).await
    }

    async fn replace_rule(
        &self,
        mac: &MacAddress,
        active: Option<&RemoteActiveRule>,
        weekdays: &str,
        time_range: &str,
    ) -> Result<(), GatewayError> {
        let mut param = Self::rule_param(mac, weekdays, time_range);

        match active {
            Some(RemoteActiveRule { id: Some(id), .. }) => {
                param["id"] = json!(id);
                self.api.edit_acl_mac(param).await?;
                info!("Replaced block rule #{} for {}: {} {}", id, mac, weekdays, time_range);
            }
            Some(RemoteActiveRule { id: None, .. }) => {
                return Err(RouterError::UnexpectedResponse(format!(
                    "active rule for {} has no id",
                    mac
                )));
            }
            None => {
                self.api.add_acl_mac(param).await?;
                info!("Added block rule for {}: {} {}", mac, weekdays, time_range);
            }
        }

        Ok(())
    }

    async fn remove_rule(&self, mac: &MacAddress) -> Result<(), GatewayError> {
        match self.get_active_rule(mac).await? {
            Some(RemoteActiveRule { id: Some(id), .. }) => {
                self.api.del_acl_mac(id).await?;
                info!("Removed block rule #{} for {}", id, mac);
                Ok(())
            }
            Some(RemoteActiveRule { id: None, .. }) => Err(RouterError::UnexpectedResponse(format!(
                "active rule for {} has no id",
                mac
            ))),
            None => {
                debug!("No block rule to remove for {}", mac);
                Ok(())
            }
        }
    }
}
