// SPDX-License-Identifier: GPL-3.0-only

//! Application configuration
//!
//! Read from TOML. Every key is optional:
//!
//! ```toml
//! log_filter = "rtsp_topology=debug"
//!
//! [server]
//! address = "127.0.0.1"
//! port = 8554
//! session_cleanup_secs = 2
//!
//! [gateway]
//! max_tunnels = 8
//! ```

use crate::constants::{APP_NAME, CONFIG_FILE, gateway, logging, server};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// RTSP service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the RTSP service binds to
    pub address: String,
    /// RTSP service port
    pub port: u16,
    /// Seconds between expired session sweeps
    pub session_cleanup_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: server::DEFAULT_ADDRESS.to_string(),
            port: server::DEFAULT_PORT,
            session_cleanup_secs: server::SESSION_CLEANUP_INTERVAL.as_secs(),
        }
    }
}

impl ServerConfig {
    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Maximum number of concurrently open tunnels
    pub max_tunnels: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_tunnels: gateway::DEFAULT_MAX_TUNNELS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log filter used when RUST_LOG is unset
    pub log_filter: String,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: logging::DEFAULT_FILTER.to_string(),
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config at `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = Self::from_toml(&text, path)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Read `path` if given, else the per-user config file
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(default_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::Invalid("server.address is empty".to_string()));
        }
        if self.server.session_cleanup_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.session_cleanup_secs must be at least 1".to_string(),
            ));
        }
        if self.gateway.max_tunnels == 0 {
            return Err(ConfigError::Invalid(
                "gateway.max_tunnels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/rtsp-topology/config.toml`, if the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml("[server]\nport = 9000\n", Path::new("test.toml")).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.address, server::DEFAULT_ADDRESS);
        assert_eq!(config.gateway.max_tunnels, gateway::DEFAULT_MAX_TUNNELS);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_validation() {
        let path = Path::new("test.toml");
        assert!(matches!(
            Config::from_toml("[server]\nport = 0\n", path),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[gateway]\nmax_tunnels = 0\n", path),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[server]\nprot = 1\n", path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cleanup_interval() {
        let config = Config::default();
        assert_eq!(
            config.server.session_cleanup_interval(),
            server::SESSION_CLEANUP_INTERVAL
        );
    }
}
