//! Application Configuration
//! 
//! This module provides configuration management for the gateway,
//! supporting a YAML configuration file with sensible defaults and
//! `BLOCK_SERVER_*` environment overrides for the operator flags.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::{info, warn};
use thiserror::Error;

pub use crate::transfer::config::TransferBackend;

const CONFIG_PATH_VAR: &str = "BLOCK_SERVER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// How requests are authorized
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Ask the accounting server for every request
    #[default]
    Remote,
    /// Compare against the magic token and allowed prefix (test/dev only)
    Static,
    /// No authorization at all
    Disabled,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "accounting" => Ok(AuthMode::Remote),
            "static" | "dummy" => Ok(AuthMode::Static),
            "disabled" | "none" | "noauth" => Ok(AuthMode::Disabled),
            _ => Err(format!("Unknown auth mode: {}", s)),
        }
    }
}

/// Where usage events go
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageMode {
    #[default]
    Log,
    Remote,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
    pub auth: AuthConfig,
    pub usage: UsageConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of actix worker threads, ignored in debug mode
    pub workers: usize,
    /// Debug mode runs a single worker and logs at debug level
    pub debug: bool,
    /// Maximum upload size in bytes
    pub max_payload_size: u64,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub backend: TransferBackend,
    /// Root directory of the local backend
    pub base_path: String,
    /// Directory for transient uploads and retrieval snapshots
    pub temp_path: String,
    /// Size of the blocking transfer pool
    pub pool_size: usize,
}

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Base url of the accounting server
    pub accounting_server: String,
    /// Sent as `APISECRET` on every accounting server call
    pub api_secret: Option<String>,
    pub magic_token: String,
    pub allowed_prefix: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UsageConfig {
    pub mode: UsageMode,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to the log4rs configuration file
    pub config_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            workers: 4,
            debug: false,
            max_payload_size: 5 * 1024 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn effective_workers(&self) -> usize {
        if self.debug {
            1
        } else {
            self.workers.max(1)
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            backend: TransferBackend::Local,
            base_path: "./data/blocks".to_string(),
            temp_path: "./data/temp".to_string(),
            pool_size: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Remote,
            accounting_server: "http://localhost:8000".to_string(),
            api_secret: Some("secret".to_string()),
            magic_token: "Token MAGICFARYDUST".to_string(),
            allowed_prefix: "test".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Path of the YAML file, `BLOCK_SERVER_CONFIG` or `config.yaml`
    pub fn config_path() -> PathBuf {
        env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from file, use defaults if not found, then apply env overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config = Self::from_yaml_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply the `BLOCK_SERVER_*` operator flags.
    ///
    /// `NOAUTH` wins over `DUMMY_AUTH` and `DUMMY`, which win over the configured mode.
    pub fn apply_env_overrides(&mut self) {
        if let Some(debug) = env_flag("BLOCK_SERVER_DEBUG") {
            self.server.debug = debug;
        }
        if let Some(port) = env_parse::<u16>("BLOCK_SERVER_PORT") {
            self.server.port = port;
        }
        if let Some(transfers) = env_parse::<usize>("BLOCK_SERVER_TRANSFERS") {
            self.transfer.pool_size = transfers;
        }
        if let Ok(token) = env::var("BLOCK_SERVER_MAGICAUTH") {
            self.auth.magic_token = token;
        }
        if let Ok(url) = env::var("BLOCK_SERVER_ACCOUNTING_SERVER") {
            self.auth.accounting_server = url;
        }
        if let Ok(secret) = env::var("BLOCK_SERVER_API_SECRET") {
            self.auth.api_secret = Some(secret);
        }
        if let Some(backend) = env_parse::<TransferBackend>("BLOCK_SERVER_BACKEND") {
            self.transfer.backend = backend;
        }
        if let Some(mode) = env_parse::<AuthMode>("BLOCK_SERVER_AUTH_MODE") {
            self.auth.mode = mode;
        }
        // The dummy backend comes with the magic-token authorizer
        if env_flag("BLOCK_SERVER_DUMMY") == Some(true) {
            self.transfer.backend = TransferBackend::Mock;
            self.auth.mode = AuthMode::Static;
        }
        if env_flag("BLOCK_SERVER_DUMMY_AUTH") == Some(true) {
            self.auth.mode = AuthMode::Static;
        }
        if env_flag("BLOCK_SERVER_NOAUTH") == Some(true) {
            self.auth.mode = AuthMode::Disabled;
        }
        if let Some(dummy_log) = env_flag("BLOCK_SERVER_DUMMY_LOG") {
            self.usage.mode = if dummy_log { UsageMode::Log } else { UsageMode::Remote };
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring {}={}: expected a boolean", name, value);
            None
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring {}={}: not a valid value", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const FLAGS: [&str; 10] = [
        "BLOCK_SERVER_DEBUG",
        "BLOCK_SERVER_BACKEND",
        "BLOCK_SERVER_AUTH_MODE",
        "BLOCK_SERVER_PORT",
        "BLOCK_SERVER_TRANSFERS",
        "BLOCK_SERVER_MAGICAUTH",
        "BLOCK_SERVER_DUMMY",
        "BLOCK_SERVER_DUMMY_AUTH",
        "BLOCK_SERVER_NOAUTH",
        "BLOCK_SERVER_DUMMY_LOG",
    ];

    fn clear_flags() {
        for flag in FLAGS {
            env::remove_var(flag);
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.transfer.pool_size, 10);
        assert_eq!(config.transfer.backend, TransferBackend::Local);
        assert_eq!(config.auth.mode, AuthMode::Remote);
        assert_eq!(config.auth.magic_token, "Token MAGICFARYDUST");
        assert_eq!(config.usage.mode, UsageMode::Log);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9000
  debug: true
transfer:
  backend: mock
  pool_size: 3
auth:
  mode: static
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.effective_workers(), 1);
        assert_eq!(config.transfer.backend, TransferBackend::Mock);
        assert_eq!(config.transfer.pool_size, 3);
        assert_eq!(config.transfer.temp_path, "./data/temp");
        assert_eq!(config.auth.mode, AuthMode::Static);
        assert_eq!(config.auth.allowed_prefix, "test");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(AppConfig::from_yaml_str("server: [not, a, map]").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/block_server.yaml")).unwrap();
        assert_eq!(config.server.port, 8888);
    }

    #[test]
    fn test_auth_mode_from_str() {
        assert_eq!("Remote".parse::<AuthMode>().unwrap(), AuthMode::Remote);
        assert_eq!("dummy".parse::<AuthMode>().unwrap(), AuthMode::Static);
        assert_eq!("noauth".parse::<AuthMode>().unwrap(), AuthMode::Disabled);
        assert!("sometimes".parse::<AuthMode>().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_flags();
        env::set_var("BLOCK_SERVER_PORT", "9999");
        env::set_var("BLOCK_SERVER_TRANSFERS", "2");
        env::set_var("BLOCK_SERVER_DUMMY", "true");
        env::set_var("BLOCK_SERVER_MAGICAUTH", "Token OTHER");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        clear_flags();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.transfer.pool_size, 2);
        assert_eq!(config.transfer.backend, TransferBackend::Mock);
        assert_eq!(config.auth.mode, AuthMode::Static);
        assert_eq!(config.auth.magic_token, "Token OTHER");
    }

    #[test]
    #[serial]
    fn test_dummy_backend_yields_to_noauth() {
        clear_flags();
        env::set_var("BLOCK_SERVER_DUMMY", "1");
        env::set_var("BLOCK_SERVER_NOAUTH", "1");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        clear_flags();

        assert_eq!(config.transfer.backend, TransferBackend::Mock);
        assert_eq!(config.auth.mode, AuthMode::Disabled);
    }

    #[test]
    #[serial]
    fn test_noauth_wins_over_dummy_auth() {
        clear_flags();
        env::set_var("BLOCK_SERVER_DUMMY_AUTH", "1");
        env::set_var("BLOCK_SERVER_NOAUTH", "1");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        clear_flags();

        assert_eq!(config.auth.mode, AuthMode::Disabled);
    }

    #[test]
    #[serial]
    fn test_named_backend_and_auth_mode() {
        clear_flags();
        env::set_var("BLOCK_SERVER_BACKEND", "Dummy");
        env::set_var("BLOCK_SERVER_AUTH_MODE", "static");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.transfer.backend, TransferBackend::Mock);
        assert_eq!(config.auth.mode, AuthMode::Static);

        // The boolean flags still have the last word
        env::set_var("BLOCK_SERVER_NOAUTH", "yes");
        config.apply_env_overrides();
        clear_flags();
        assert_eq!(config.auth.mode, AuthMode::Disabled);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clear_flags();
        env::set_var("BLOCK_SERVER_PORT", "not-a-port");
        env::set_var("BLOCK_SERVER_DEBUG", "maybe");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        clear_flags();

        assert_eq!(config.server.port, 8888);
        assert!(!config.server.debug);
    }
}
