//! Everything that talks to the router admin API.

use thiserror::Error;

pub mod gateway;
pub mod ikuai;
pub mod source;

pub use gateway::{IkuaiGateway, RemoteRuleGateway};
pub use ikuai::{IkuaiClient, RouterApi};
pub use source::{FileRuleSource, RouterRuleSource, RuleSource, SourceError};

/// Router API errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Router API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected router response: {0}")]
    UnexpectedResponse(String),

    #[error("Router request timed out")]
    Timeout,
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors surfaced by a [`RemoteRuleGateway`]
pub type GatewayError = RouterError;
