//! Administrative Redis/Sentinel client built on the fred crate.
//!
//! The operator opens a short-lived connection per administrative call; the
//! pods it manages come and go, so there is nothing to pool. Every command is
//! bounded by a per-call timeout so a hung pod cannot stall a reconciliation.

use std::time::Duration;

use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::client::parsing::{
    self, ParseError, ReplicationInfo, SentinelMasterInfo, parse_redis_version,
};
use crate::crd::{MONITORED_MASTER_NAME, REDIS_PORT};

/// Per-command timeout for Redis and Sentinel calls.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection establishment timeout.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur talking to Redis or Sentinel.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// A connection to a single Redis or Sentinel instance for administrative
/// commands.
pub struct RedisAdmin {
    client: Client,
}

impl RedisAdmin {
    /// Connect to a single instance at `host:port`.
    #[instrument(skip(password), fields(host = %host, port = %port))]
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, RedisError> {
        let mut config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(host, port),
            },
            ..Default::default()
        };

        if let Some(pass) = password {
            config.password = Some(pass.to_string());
        }

        let client = Builder::from_config(config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = COMMAND_TIMEOUT;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = CONNECTION_TIMEOUT;
                conn.max_command_attempts = 1;
            })
            .build()?;

        client.init().await?;
        debug!("Connected");

        Ok(Self { client })
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), RedisError> {
        self.client.quit().await?;
        Ok(())
    }

    async fn command(&self, name: &'static str, args: Vec<String>) -> Result<Value, RedisError> {
        let cmd = CustomCommand::new_static(name, ClusterHash::FirstKey, false);
        let value: Value = self.client.custom(cmd, args).await?;
        Ok(value)
    }

    /// Replication state from `INFO replication`.
    #[instrument(skip(self))]
    pub async fn replication_info(&self) -> Result<ReplicationInfo, RedisError> {
        let raw: String = self.client.info(Some(fred::types::InfoKind::Replication)).await?;
        Ok(ReplicationInfo::parse(&raw)?)
    }

    /// Server version from `INFO server`.
    #[instrument(skip(self))]
    pub async fn redis_version(&self) -> Result<String, RedisError> {
        let raw: String = self.client.info(Some(fred::types::InfoKind::Server)).await?;
        Ok(parse_redis_version(&raw)?)
    }

    /// Make this instance replicate from `host:port` (`SLAVEOF host port`).
    #[instrument(skip(self))]
    pub async fn slave_of(&self, host: &str, port: u16) -> Result<(), RedisError> {
        self.command("SLAVEOF", vec![host.to_string(), port.to_string()])
            .await?;
        Ok(())
    }

    /// Promote this instance to master (`SLAVEOF NO ONE`).
    #[instrument(skip(self))]
    pub async fn promote_to_master(&self) -> Result<(), RedisError> {
        self.command("SLAVEOF", vec!["NO".to_string(), "ONE".to_string()])
            .await?;
        Ok(())
    }

    /// Apply a single directive at runtime (`CONFIG SET directive value`).
    #[instrument(skip(self))]
    pub async fn config_set(&self, directive: &str, value: &str) -> Result<(), RedisError> {
        self.command(
            "CONFIG",
            vec!["SET".to_string(), directive.to_string(), value.to_string()],
        )
        .await?;
        Ok(())
    }

    /// State of the monitored master (`SENTINEL MASTER mymaster`).
    #[instrument(skip(self))]
    pub async fn monitored_master(&self) -> Result<SentinelMasterInfo, RedisError> {
        let value = self
            .command(
                "SENTINEL",
                vec!["MASTER".to_string(), MONITORED_MASTER_NAME.to_string()],
            )
            .await?;
        let pairs: Vec<String> = value.convert()?;
        Ok(SentinelMasterInfo::parse(&pairs)?)
    }

    /// Point this Sentinel at a new master
    /// (`SENTINEL MONITOR mymaster ip port quorum`).
    #[instrument(skip(self))]
    pub async fn sentinel_monitor(&self, ip: &str, quorum: i32) -> Result<(), RedisError> {
        self.command(
            "SENTINEL",
            vec![
                "MONITOR".to_string(),
                MONITORED_MASTER_NAME.to_string(),
                ip.to_string(),
                REDIS_PORT.to_string(),
                quorum.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Drop all monitored state so the Sentinel re-discovers peers and
    /// slaves (`SENTINEL RESET *`).
    #[instrument(skip(self))]
    pub async fn sentinel_reset(&self) -> Result<(), RedisError> {
        self.command(
            "SENTINEL",
            vec!["RESET".to_string(), "*".to_string()],
        )
        .await?;
        Ok(())
    }

    /// Set a per-master Sentinel option
    /// (`SENTINEL SET mymaster option value`).
    #[instrument(skip(self))]
    pub async fn sentinel_set(&self, option: &str, value: &str) -> Result<(), RedisError> {
        self.command(
            "SENTINEL",
            vec![
                "SET".to_string(),
                MONITORED_MASTER_NAME.to_string(),
                option.to_string(),
                value.to_string(),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Split a `directive value...` line into its directive and value parts.
///
/// Custom config entries are free-form lines from the spec; the directive is
/// the first word, the rest is passed through verbatim.
pub fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((directive, value)) if !directive.is_empty() => Some((directive, value.trim())),
        _ => None,
    }
}

/// Directives that only take effect at startup and must not be applied with
/// CONFIG SET.
const NON_RUNTIME_DIRECTIVES: &[&str] = &[
    "bind",
    "daemonize",
    "dir",
    "logfile",
    "pidfile",
    "port",
    "unixsocket",
];

/// Whether a Redis directive can be applied at runtime via CONFIG SET.
pub fn is_runtime_settable(directive: &str) -> bool {
    !NON_RUNTIME_DIRECTIVES
        .iter()
        .any(|d| d.eq_ignore_ascii_case(directive))
}

// parsing re-export used by callers that only need the text layer
pub use parsing::Role;
