//! Configuration loading

use anyhow::{Context, Result};
use arbor_services::mqtt::DEFAULT_BROKER;
use arbor_services::ServiceOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the system specification (JSON)
    #[serde(default = "default_system")]
    pub system: PathBuf,
    /// Host used for services that declare none
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            system: default_system(),
            bind_host: default_bind_host(),
        }
    }
}

fn default_system() -> PathBuf {
    PathBuf::from("system.json")
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker executable launched for mqtt services
    #[serde(default = "default_broker")]
    pub broker: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
        }
    }
}

fn default_broker() -> String {
    DEFAULT_BROKER.to_string()
}

impl Config {
    /// Convert to ServiceOptions
    pub fn to_service_options(&self) -> ServiceOptions {
        ServiceOptions {
            bind_host: self.daemon.bind_host.clone(),
            broker_command: self.mqtt.broker.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
