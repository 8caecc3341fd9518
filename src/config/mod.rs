//! Configuration management for sync-clipboard
//!
//! Settings come from an optional TOML file; command-line flags override
//! them. The passphrase is never read from the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync::SyncConfig;

/// Name of the per-user config directory
pub const APP_DIR: &str = "sync-clipboard";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where clients connect to
    #[serde(default)]
    pub network: NetworkConfig,

    /// Sync loop tunables
    #[serde(default)]
    pub sync: SyncSettings,

    /// Relay server settings
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Peer or relay address to connect to
    #[serde(default = "default_address")]
    pub address: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Clipboard polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Largest encrypted frame accepted or sent, in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Frames buffered per subscriber before a slow client starts skipping
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_frame_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_channel_capacity() -> usize {
    16
}

// Default implementations
impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: NetworkConfig::default(),
            sync: SyncSettings::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Uses `path` when given (it must exist), otherwise
    /// `<config dir>/sync-clipboard/config.toml` when present, otherwise
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_path(&expand_path(path));
        }

        match Self::default_path().filter(|p| p.exists()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate poll_interval_ms range (10ms to 60s)
        if !(10..=60_000).contains(&self.sync.poll_interval_ms) {
            return Err(ConfigError::Validation(
                "poll_interval_ms must be between 10 and 60000".to_string(),
            ));
        }

        // Validate max_frame_size range (1KB to 256MB)
        if !(1024..=268_435_456).contains(&self.sync.max_frame_size) {
            return Err(ConfigError::Validation(
                "max_frame_size must be between 1024 and 268435456 bytes".to_string(),
            ));
        }

        if !(1..=4096).contains(&self.relay.channel_capacity) {
            return Err(ConfigError::Validation(
                "channel_capacity must be between 1 and 4096".to_string(),
            ));
        }

        if self.network.address.trim().is_empty() || self.relay.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "addresses must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Sync loop settings derived from this config
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
            max_frame_size: self.sync.max_frame_size,
        }
    }

    /// Write an example config file to `path`, or the default location
    pub fn write_example(path: Option<&Path>, force: bool) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => expand_path(path),
            None => Self::default_path().ok_or_else(|| {
                ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find config directory",
                ))
            })?,
        };

        if !force && path.exists() {
            return Err(ConfigError::Validation(format!(
                "{} already exists. Use --force to overwrite.",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Self::generate_example())?;

        Ok(path)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# sync-clipboard configuration
# Location: ~/.config/sync-clipboard/config.toml
# The shared passphrase is only accepted on the command line (--key).

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

# Where `client` connects and `listen` binds
[network]
address = "{}"
port = {}

[sync]
# How often the local clipboard is checked, in milliseconds
poll_interval_ms = {}
# Largest encrypted frame accepted or sent, in bytes
max_frame_size = {}

[relay]
# Address the relay server listens on
bind_address = "{}"
# Frames buffered per client before a slow client starts skipping
channel_capacity = {}
"#,
            config.log_level,
            config.network.address,
            config.network.port,
            config.sync.poll_interval_ms,
            config.sync.max_frame_size,
            config.relay.bind_address,
            config.relay.channel_capacity,
        )
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.address, "127.0.0.1");
        assert_eq!(config.network.port, 7878);
        assert_eq!(config.sync.poll_interval_ms, 500);
        assert_eq!(config.sync.max_frame_size, 16_777_216);
        assert_eq!(config.relay.channel_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let toml_str = r#"
            log_level = "debug"

            [network]
            address = "10.0.0.5"
            port = 9000

            [sync]
            poll_interval_ms = 250
        "#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.network.address, "10.0.0.5");
        assert_eq!(config.network.port, 9000);
        assert_eq!(config.sync.poll_interval_ms, 250);
        assert_eq!(config.sync.max_frame_size, 16_777_216);
    }

    #[test]
    fn test_validation_poll_interval() {
        let toml_str = r#"
            [sync]
            poll_interval_ms = 1
        "#;

        assert!(matches!(
            Config::from_toml(toml_str),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_max_frame_size() {
        let toml_str = r#"
            [sync]
            max_frame_size = 100
        "#;

        assert!(Config::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_validation_channel_capacity() {
        let toml_str = r#"
            [relay]
            channel_capacity = 0
        "#;

        assert!(Config::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_sync_config_conversion() {
        let mut config = Config::default();
        config.sync.poll_interval_ms = 1500;
        let sync = config.sync_config();
        assert_eq!(sync.poll_interval, Duration::from_millis(1500));
        assert_eq!(sync.max_frame_size, config.sync.max_frame_size);
    }

    #[test]
    fn test_write_example_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let written = Config::write_example(Some(&path), false).unwrap();
        assert_eq!(written, path);

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, Config::default());

        // Refuses to clobber without force
        assert!(Config::write_example(Some(&path), false).is_err());
        assert!(Config::write_example(Some(&path), true).is_ok());
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_generate_example() {
        let example = Config::generate_example();
        assert!(example.contains("sync-clipboard configuration"));
        assert!(example.contains("poll_interval_ms = 500"));
        assert!(example.contains("max_frame_size = 16777216"));
    }
}
