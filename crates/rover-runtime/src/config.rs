// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration. Engine settings live under `[server]`.

use rover_coap::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Identity announced on the network and used as the default sender.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Broadcast a presence announcement once the server is up.
    #[serde(default = "default_true")]
    pub announce_on_start: bool,

    /// Reply wait used by the bus bridge when a command omits `reply_timeout`.
    #[serde(default = "default_reply_timeout")]
    pub default_reply_timeout_secs: f64,

    /// Marker file written before an OTA restart.
    #[serde(default = "default_ota_marker")]
    pub ota_marker_path: PathBuf,

    /// Delay between answering `/ota/enter` and restarting.
    #[serde(default = "default_ota_delay")]
    pub ota_restart_delay_ms: u64,

    /// Initial console log filter (`EnvFilter` syntax).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Run the built-in `echo` diagnostic task.
    #[serde(default = "default_true")]
    pub echo_task: bool,

    /// Pause before restarting a failed task.
    #[serde(default = "default_restart_delay")]
    pub supervisor_restart_delay_ms: u64,

    /// Protocol engine settings.
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_device_id() -> String {
    "esp32_robot".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reply_timeout() -> f64 {
    2.0
}

fn default_ota_marker() -> PathBuf {
    PathBuf::from("mode.ota")
}

fn default_ota_delay() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_restart_delay() -> u64 {
    5000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            announce_on_start: true,
            default_reply_timeout_secs: default_reply_timeout(),
            ota_marker_path: default_ota_marker(),
            ota_restart_delay_ms: default_ota_delay(),
            log_level: default_log_level(),
            echo_task: true,
            supervisor_restart_delay_ms: default_restart_delay(),
            server: ServerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id is empty".into()));
        }
        if !self.default_reply_timeout_secs.is_finite() || self.default_reply_timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_reply_timeout_secs must be > 0 (got {})",
                self.default_reply_timeout_secs
            )));
        }
        if self.ota_marker_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("ota_marker_path is empty".into()));
        }
        self.server
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn default_reply_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.default_reply_timeout_secs)
    }

    pub fn ota_restart_delay(&self) -> Duration {
        Duration::from_millis(self.ota_restart_delay_ms)
    }

    pub fn supervisor_restart_delay(&self) -> Duration {
        Duration::from_millis(self.supervisor_restart_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: RuntimeConfig = toml::from_str("").unwrap();
        assert_eq!(config.device_id, "esp32_robot");
        assert_eq!(config.server.port, 5683);
        assert_eq!(config.server.max_workers, 10);
        assert_eq!(config.default_reply_timeout(), Duration::from_secs(2));
        assert_eq!(config.ota_marker_path, PathBuf::from("mode.ota"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
device_id = "rover-7"
announce_on_start = false
default_reply_timeout_secs = 0.5

[server]
port = 6000
max_workers = 4
bind_address = "127.0.0.1"
"#
        )
        .unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.device_id, "rover-7");
        assert!(!config.announce_on_start);
        assert_eq!(config.default_reply_timeout(), Duration::from_millis(500));
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.max_workers, 4);
        assert_eq!(config.server.block_idle_timeout_secs, 15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = RuntimeConfig {
            default_reply_timeout_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RuntimeConfig::default();
        config.server.max_workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_generated_toml_parses_back() {
        let text = RuntimeConfig::default().to_toml().unwrap();
        let parsed: RuntimeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server, ServerConfig::default());
        assert_eq!(parsed.log_level, "info");
    }

    #[test]
    fn test_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "device_id = ").unwrap();
        assert!(matches!(
            RuntimeConfig::from_file(file.path()),
            Err(ConfigError::Toml(_))
        ));
    }
}
