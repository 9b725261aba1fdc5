use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "configs/console.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub session_name: String,
    /// Shown while no device is connected, or when the device reports no name.
    pub default_device_name: String,
    pub fraction_digits: u32,
    pub echo_timeout_ms: u64,
    pub dispatch_queue_capacity: usize,
    /// Number of round-trip samples kept for display and export.
    pub timing_history_capacity: usize,
    pub log_capacity: usize,
    pub enable_logging: bool,
    pub transport: TransportConfig,
    pub surface: SurfaceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Simulated,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub address: String,
    pub device_name: Option<String>,
    pub round_trip_ms: u64,
    pub send_separator: String,
    pub receive_separator: String,
}

/// Size of the virtual joystick pad used by the line console.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            session_name: "rover".to_string(),
            default_device_name: "Web Bluetooth Terminal".to_string(),
            fraction_digits: 2,
            echo_timeout_ms: 2000,
            dispatch_queue_capacity: 16,
            timing_history_capacity: 1024,
            log_capacity: 1000,
            enable_logging: true,
            transport: TransportConfig::default(),
            surface: SurfaceConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Simulated,
            address: "127.0.0.1:7878".to_string(),
            device_name: Some("HC-06".to_string()),
            round_trip_ms: 50,
            send_separator: "\n".to_string(),
            receive_separator: "\n".to_string(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 200.0,
            height: 200.0,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ConsoleConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    ConsoleConfig::from_toml_str(&content)
}

impl ConsoleConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }
}

impl TransportConfig {
    pub fn round_trip(&self) -> Duration {
        Duration::from_millis(self.round_trip_ms)
    }
}
