//! Configuration management.

use av_controls_types::DEFAULT_BROKER_PORT;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    broker: BrokerConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// Seconds between WebSocket pings
    #[serde(default = "default_ping_interval")]
    ping_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BrokerConfig {
    /// Messages queued per connection before new ones are dropped
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_ping_interval() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    256
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    pub ping_interval: Duration,
    pub channel_capacity: usize,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/av-broker/ on Linux)
    /// 2. `.av-broker.toml` in current directory
    ///
    /// Environment variables use the `AVB_` prefix with `__` between
    /// section and key, e.g. `AVB_SERVER__PORT`.
    pub fn from_figment(
        port: Option<u16>,
        config_path: Option<PathBuf>,
        log_level: Option<String>,
    ) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".av-broker.toml"));
        let user_config = directories::ProjectDirs::from("", "", "av-broker")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // An explicit file beats both discovered ones
        if let Some(ref path) = config_path {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("AVB_").split("__"));

        if let Some(p) = port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref level) = log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }

        let config_file: ConfigFile = figment.extract()?;

        Ok(Self {
            host: config_file.server.host,
            port: config_file.server.port,
            ping_interval: Duration::from_secs(config_file.server.ping_interval_secs.max(1)),
            channel_capacity: config_file.broker.channel_capacity.max(1),
            log_file: config_file.logging.log_file,
            log_level: config_file.logging.log_level,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            host: file.server.host,
            port: file.server.port,
            ping_interval: Duration::from_secs(file.server.ping_interval_secs),
            channel_capacity: file.broker.channel_capacity,
            log_file: None,
            log_level: None,
        }
    }
}
