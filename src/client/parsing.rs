//! Parsing for Redis and Sentinel text output.
//!
//! Provides robust, testable parsing functions using regex to replace
//! fragile string splitting throughout the codebase.
//!
//! All parsing functions are pure: same input always produces same output.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// Errors that can occur during parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to compile regex: {0}")]
    RegexCompilation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Parse key-value pairs from INFO command output.
///
/// INFO output format: `key:value` per line, with optional section headers
/// starting with `#`.
///
/// # Example
/// ```
/// use redis_failover_operator::client::parsing::parse_info_output;
///
/// let info = "role:master\nconnected_slaves:2\n";
/// let parsed = parse_info_output(info).unwrap();
/// assert_eq!(parsed.get("role"), Some(&"master".to_string()));
/// ```
pub fn parse_info_output(info: &str) -> Result<HashMap<String, String>, ParseError> {
    let kv_regex =
        Regex::new(r"^([\w-]+):(.+)$").map_err(|e| ParseError::RegexCompilation(e.to_string()))?;

    let mut result = HashMap::new();

    for line in info.lines() {
        let line = line.trim();

        // Skip empty lines and section headers
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().to_string());
        }
    }

    Ok(result)
}

/// Parse a specific value from INFO output by key name.
pub fn parse_info_value(info: &str, key: &str) -> Option<String> {
    parse_info_output(info)
        .ok()
        .and_then(|map| map.get(key).cloned())
}

/// Replication role reported by `INFO replication`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Master,
    Slave,
    #[default]
    Unknown,
}

/// Replication state parsed from `INFO replication` output.
#[derive(Debug, Clone, Default)]
pub struct ReplicationInfo {
    /// Role ("master" or "slave").
    pub role: Role,
    /// Address of the master this instance replicates from (slaves only).
    pub master_host: Option<String>,
    /// Port of the master this instance replicates from (slaves only).
    pub master_port: Option<u16>,
    /// Master link status ("up" or "down", slaves only).
    pub master_link_status: Option<String>,
    /// Whether an initial RDB sync from the master is in progress.
    pub master_sync_in_progress: bool,
}

impl ReplicationInfo {
    /// Parse from `INFO replication` output.
    pub fn parse(info: &str) -> Result<Self, ParseError> {
        let parsed = parse_info_output(info)?;

        let role = match parsed.get("role").map(String::as_str) {
            Some("master") => Role::Master,
            Some("slave") => Role::Slave,
            _ => Role::Unknown,
        };

        Ok(ReplicationInfo {
            role,
            master_host: parsed.get("master_host").cloned(),
            master_port: parsed
                .get("master_port")
                .and_then(|v| v.trim().parse().ok()),
            master_link_status: parsed.get("master_link_status").cloned(),
            master_sync_in_progress: parsed
                .get("master_sync_in_progress")
                .map(|v| v.trim() == "1")
                .unwrap_or(false),
        })
    }
}

/// Parse the server version from `INFO server` output.
pub fn parse_redis_version(info: &str) -> Result<String, ParseError> {
    parse_info_value(info, "redis_version")
        .ok_or_else(|| ParseError::MissingField("redis_version".to_string()))
}

/// State of the monitored master as reported by `SENTINEL MASTER <name>`.
///
/// The reply is a flat array of field/value pairs; this keeps only the
/// fields the operator acts on.
#[derive(Debug, Clone, Default)]
pub struct SentinelMasterInfo {
    /// IP the Sentinel currently monitors.
    pub ip: String,
    /// Port the Sentinel currently monitors.
    pub port: u16,
    /// Other Sentinels this one knows about (excluding itself).
    pub num_other_sentinels: i32,
    /// Slaves of the monitored master this Sentinel knows about.
    pub num_slaves: i32,
}

impl SentinelMasterInfo {
    /// Parse from the flat field/value pair list of `SENTINEL MASTER`.
    pub fn parse(pairs: &[String]) -> Result<Self, ParseError> {
        let map: HashMap<&str, &str> = pairs
            .chunks_exact(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();

        let field = |name: &str| -> Result<&str, ParseError> {
            map.get(name)
                .copied()
                .ok_or_else(|| ParseError::MissingField(name.to_string()))
        };

        Ok(SentinelMasterInfo {
            ip: field("ip")?.to_string(),
            port: field("port")?
                .parse()
                .map_err(|e| ParseError::Parse(format!("port: {e}")))?,
            num_other_sentinels: field("num-other-sentinels")?
                .parse()
                .map_err(|e| ParseError::Parse(format!("num-other-sentinels: {e}")))?,
            num_slaves: field("num-slaves")?
                .parse()
                .map_err(|e| ParseError::Parse(format!("num-slaves: {e}")))?,
        })
    }
}
