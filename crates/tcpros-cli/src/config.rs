//! CLI configuration.
//!
//! Settings live in `~/.config/tcpros/config.toml` by default. Every key is
//! optional:
//!
//! ```toml
//! node_name = "tcpros_cli"
//! package_path = ["/opt/ros/share"]
//!
//! [publisher]
//! base_port = 9000
//! overflow = "drop_oldest"
//!
//! [subscriber]
//! connect_timeout_secs = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tcpros_core::PathResolver;
use tcpros_transport::{DEFAULT_BASE_PORT, OverflowPolicy, PublisherConfig, SubscriberConfig, default_host};

use crate::error::{CliError, CliResult};

/// Configuration for the `tcpros` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node name used as the caller id.
    pub node_name: String,

    /// Package roots searched before `ROS_PACKAGE_PATH`.
    pub package_path: Vec<PathBuf>,

    pub publisher: PublisherSettings,

    pub subscriber: SubscriberSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            node_name: "tcpros_cli".to_string(),
            package_path: Vec::new(),
            publisher: PublisherSettings::default(),
            subscriber: SubscriberSettings::default(),
        }
    }
}

/// What to do when a subscriber falls behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    #[default]
    DropOldest,
    Disconnect,
}

impl From<OverflowSetting> for OverflowPolicy {
    fn from(setting: OverflowSetting) -> Self {
        match setting {
            OverflowSetting::DropOldest => OverflowPolicy::DropOldest,
            OverflowSetting::Disconnect => OverflowPolicy::Disconnect,
        }
    }
}

/// Publisher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Host to listen on; defaults to `ROS_HOSTNAME`, `ROS_IP` or loopback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub base_port: u16,

    pub port_search_limit: u16,

    /// Messages buffered per subscriber.
    pub queue_capacity: usize,

    pub overflow: OverflowSetting,

    pub latching: bool,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            host: None,
            base_port: DEFAULT_BASE_PORT,
            port_search_limit: 1000,
            queue_capacity: 64,
            overflow: OverflowSetting::DropOldest,
            latching: false,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSettings {
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            handshake_timeout_secs: 5,
        }
    }
}

impl CliConfig {
    /// Loads configuration from the default path, or defaults if it is absent.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| CliError::config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tcpros")
    }

    /// Serialises the configuration as TOML.
    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::config(format!("failed to serialize config: {e}")))
    }

    /// Package resolver over `package_path` followed by `ROS_PACKAGE_PATH`.
    pub fn resolver(&self) -> PathResolver {
        let mut resolver = PathResolver::new(self.package_path.iter().cloned());
        for root in PathResolver::from_env().roots() {
            resolver = resolver.with_root(root.clone());
        }
        resolver
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        let settings = &self.publisher;
        PublisherConfig::default()
            .with_host(settings.host.clone().unwrap_or_else(default_host))
            .with_base_port(settings.base_port)
            .with_port_search_limit(settings.port_search_limit)
            .with_queue_capacity(settings.queue_capacity)
            .with_overflow(settings.overflow.into())
            .with_latching(settings.latching)
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig::default()
            .with_connect_timeout(Duration::from_secs(self.subscriber.connect_timeout_secs))
            .with_handshake_timeout(Duration::from_secs(self.subscriber.handshake_timeout_secs))
    }
}
