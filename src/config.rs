use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::models::device::MacAddress;
use crate::router::source::split_names;
use crate::utils::clock::{parse_utc_offset, ClockError};
use crate::utils::logging::LogLevel;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid schedule offset: {0}")]
    UtcOffset(#[from] ClockError),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Service settings, read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the router admin API
    pub router_url: String,

    /// Session cookie for an already authenticated router session
    pub router_session: Option<String>,

    pub router_timeout: Duration,

    /// Offset the rule times are written in
    pub schedule_offset: FixedOffset,

    /// Devices whose block rule follows their protocol-control rules
    pub macs: Vec<MacAddress>,

    pub reconcile_interval: Duration,

    /// Read rules from this JSON file instead of the router
    pub rules_file: Option<PathBuf>,

    pub metrics_addr: SocketAddr,
    pub metrics_enabled: bool,

    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> ConfigResult<T> {
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, value: String) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> ConfigResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let router_url = lookup("ROUTER_URL").ok_or(ConfigError::Missing("ROUTER_URL"))?;
        if !(router_url.starts_with("http://") || router_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "ROUTER_URL",
                value: router_url,
            });
        }

        let raw_macs = lookup("RECONCILE_MACS").ok_or(ConfigError::Missing("RECONCILE_MACS"))?;
        let macs = split_names(&raw_macs)
            .iter()
            .map(|m| {
                MacAddress::parse(m).map_err(|_| ConfigError::Invalid {
                    key: "RECONCILE_MACS",
                    value: m.clone(),
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let schedule_offset = parse_utc_offset(&lookup("SCHEDULE_UTC_OFFSET").unwrap_or_else(|| "+08:00".to_string()))?;

        let interval_secs: u64 = parse_or(&lookup, "RECONCILE_INTERVAL_SECS", 60)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RECONCILE_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let metrics_enabled = match lookup("METRICS_ENABLED") {
            Some(value) => parse_bool("METRICS_ENABLED", value)?,
            None => true,
        };

        let default_metrics_addr = SocketAddr::from(([127, 0, 0, 1], 9091));

        Ok(Self {
            router_url,
            router_session: lookup("ROUTER_SESSION"),
            router_timeout: Duration::from_millis(parse_or(&lookup, "ROUTER_TIMEOUT_MS", 5000)?),
            schedule_offset,
            macs,
            reconcile_interval: Duration::from_secs(interval_secs),
            rules_file: lookup("RULES_FILE").map(PathBuf::from),
            metrics_addr: parse_or(&lookup, "METRICS_ADDR", default_metrics_addr)?,
            metrics_enabled,
            log_level: parse_or(&lookup, "LOG_LEVEL", LogLevel::Info)?,
            log_file: lookup("LOG_FILE"),
        })
    }
}
