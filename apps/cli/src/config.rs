//! Layered application configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! `MOORAGE_*` environment variables (nested with `__`, e.g.
//! `MOORAGE_POOL__MAX_SIZE=4`), then command-line flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use moorage_resource::PoolConfig;
use serde::{Deserialize, Serialize};

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `host:port` of the broker.
    pub address: String,
    /// Exchange every frame is published to.
    pub exchange: String,
    /// Upper bound on a single publish, reconnects included.
    #[serde(with = "humantime_serde")]
    pub publish_timeout: Duration,
    /// Connection attempts before `create` gives up; unset retries forever.
    pub connect_attempts: Option<u32>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5672".to_string(),
            exchange: "moorage.events".to_string(),
            publish_timeout: Duration::from_secs(5),
            connect_attempts: Some(5),
        }
    }
}

/// Periodic heartbeat publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Starts after the publisher pool.
    pub priority: i32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            priority: 2,
        }
    }
}

/// Everything `moorage run` needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: moorage_log::Config,
    pub broker: BrokerConfig,
    pub pool: PoolConfig,
    pub heartbeat: HeartbeatConfig,
}

impl AppConfig {
    /// Defaults, file and environment. Flags are merged by the caller.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            ensure!(path.is_file(), "config file {} does not exist", path.display());
            figment = figment.merge(Toml::file(path));
        }
        // MOORAGE_LOG and MOORAGE_CONFIG are read directly, not as config keys.
        Ok(figment.merge(
            Env::prefixed("MOORAGE_")
                .ignore(&["log", "log_format", "config", "service"])
                .split("__"),
        ))
    }

    /// Extract and validate.
    pub fn extract(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate().context("invalid [pool] section")?;
        ensure!(
            !self.broker.address.is_empty(),
            "broker.address must not be empty"
        );
        ensure!(
            !self.broker.publish_timeout.is_zero(),
            "broker.publish_timeout must be greater than zero"
        );
        ensure!(
            !self.heartbeat.enabled || !self.heartbeat.interval.is_zero(),
            "heartbeat.interval must be greater than zero"
        );
        Ok(())
    }
}
