use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::router::{RouterError, RouterResult};

/// `Result` code the router returns for a successful call
pub const SUCCESS_CODE: i64 = 30000;

/// Row window requested by every listing call
const LIST_LIMIT: &str = "0,1000";

/// One call against the router's `/Action/call` endpoint.
///
/// The listing and mutation helpers are built on top of [`RouterApi::call`],
/// so a fake only has to answer `call`.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Invoke `func_name`/`action` with `param`, returning the `Data` payload
    async fn call(&self, func_name: &str, action: &str, param: Value) -> RouterResult<Value>;

    /// All rows of a listing
    async fn list(&self, func_name: &str) -> RouterResult<Vec<Value>> {
        let data = self
            .call(func_name, "show", json!({ "TYPE": "total,data", "limit": LIST_LIMIT }))
            .await?;

        match data.get("data") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(RouterError::UnexpectedResponse(format!(
                "{} listing is not an array: {}",
                func_name, other
            ))),
        }
    }

    /// MAC-level access rules
    async fn list_acl_mac(&self) -> RouterResult<Vec<Value>> {
        self.list("acl_mac").await
    }

    async fn add_acl_mac(&self, param: Value) -> RouterResult<Value> {
        self.call("acl_mac", "add", param).await
    }

    async fn edit_acl_mac(&self, param: Value) -> RouterResult<Value> {
        self.call("acl_mac", "edit", param).await
    }

    async fn del_acl_mac(&self, id: u64) -> RouterResult<Value> {
        self.call("acl_mac", "del", json!({ "id": id })).await
    }

    /// Protocol-control rules
    async fn list_acl_l7(&self) -> RouterResult<Vec<Value>> {
        self.list("acl_l7").await
    }

    async fn list_mac_groups(&self) -> RouterResult<Vec<Value>> {
        self.list("mac_group").await
    }
}

/// Response envelope shared by every call
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(rename = "Result")]
    result: i64,

    #[serde(rename = "ErrMsg", default)]
    err_msg: String,

    #[serde(rename = "Data", default)]
    data: Value,
}

impl ApiEnvelope {
    fn into_data(self) -> RouterResult<Value> {
        if self.result != SUCCESS_CODE {
            return Err(RouterError::Api {
                code: self.result,
                message: self.err_msg,
            });
        }
        Ok(self.data)
    }
}

fn http_error(e: reqwest::Error) -> RouterError {
    if e.is_timeout() {
        RouterError::Timeout
    } else {
        RouterError::Http(e)
    }
}

/// HTTP client for the router admin API
#[derive(Debug, Clone)]
pub struct IkuaiClient {
    endpoint: String,
    session: Option<String>,
    client: reqwest::Client,
}

impl IkuaiClient {
    /// Every request is bounded by `timeout`
    pub fn new(base_url: &str, session: Option<String>, timeout: Duration) -> RouterResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: format!("{}/Action/call", base_url.trim_end_matches('/')),
            session,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RouterApi for IkuaiClient {
    async fn call(&self, func_name: &str, action: &str, param: Value) -> RouterResult<Value> {
        let body = json!({
            "func_name": func_name,
            "action": action,
            "param": param,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(session) = &self.session {
            request = request.header(reqwest::header::COOKIE, format!("sess_key={}", session));
        }

        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RouterError::UnexpectedResponse(format!(
                "{} {} returned HTTP {}",
                func_name, action, status
            )));
        }

        let envelope: ApiEnvelope = response.json().await.map_err(http_error)?;
        crate::trace!("{} {} -> {}", func_name, action, envelope.result);
        envelope.into_data()
    }
}
