//! Configuration loading from disk.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::ProxyConfig;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting '{setting}': {reason}")]
    InvalidSetting { setting: &'static str, reason: String },
}

/// Load a configuration file.
///
/// Only process settings are checked here. Clusters, destinations and
/// routes are validated item by item when the snapshot is applied, so one
/// bad cluster does not keep the rest of the file from loading.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and check configuration text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    check_settings(&config)?;
    Ok(config)
}

fn check_settings(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.health.max_concurrent_probes == 0 {
        return Err(ConfigError::InvalidSetting {
            setting: "health.max_concurrent_probes",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.admin.enabled {
        config
            .admin
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidSetting {
                setting: "admin.bind_address",
                reason: e.to_string(),
            })?;
    }
    if config.observability.metrics_enabled {
        config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidSetting {
                setting: "observability.metrics_address",
                reason: e.to_string(),
            })?;
    }
    Ok(())
}
