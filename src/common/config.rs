//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Device and emulator settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Log stream monitor settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Input transport settings
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device tool executable (name on PATH or absolute path)
    #[serde(default = "default_tool")]
    pub tool: PathBuf,

    /// Emulator platform to drive
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Override for the emulator info file written by the device tool
    #[serde(default)]
    pub emulator_info: Option<PathBuf>,

    /// Pin endpoint resolution to one SDK version
    #[serde(default)]
    pub sdk_version: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            platform: default_platform(),
            emulator_info: None,
            sdk_version: None,
        }
    }
}

fn default_tool() -> PathBuf {
    PathBuf::from("pebble")
}

fn default_platform() -> String {
    "basalt".to_string()
}

/// Log monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Marker that introduces a state report on a log line
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Grace period for the log process to exit before it is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Bound on joining the reader task during stop
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,

    /// Default timeout for waiting on a state event
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            stop_timeout_secs: default_stop_timeout(),
            join_timeout_secs: default_join_timeout(),
            wait_timeout_secs: default_wait_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

fn default_marker() -> String {
    crate::monitor::DEFAULT_MARKER.to_string()
}
fn default_stop_timeout() -> u64 {
    2
}
fn default_join_timeout() -> u64 {
    2
}
fn default_wait_timeout() -> u64 {
    5
}

/// Input transport settings
///
/// Durations are in milliseconds unless the field name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay between a failed attempt and the next one
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,

    /// How long a press holds the button before releasing
    #[serde(default = "default_hold")]
    pub hold_ms: u64,

    /// Settle time after a press-and-release
    #[serde(default = "default_press_settle")]
    pub press_settle_ms: u64,

    /// Settle time after a hold or release
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff(),
            hold_ms: default_hold(),
            press_settle_ms: default_press_settle(),
            settle_ms: default_settle(),
            connect_timeout_secs: default_connect_timeout(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_retries() -> u32 {
    2
}
fn default_backoff() -> u64 {
    1000
}
fn default_hold() -> u64 {
    100
}
fn default_press_settle() -> u64 {
    300
}
fn default_settle() -> u64 {
    200
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_send_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Locate the device tool executable
    ///
    /// Absolute paths are used as-is; bare names are searched on PATH
    pub fn tool_path(&self) -> Result<PathBuf> {
        let tool = &self.device.tool;
        if tool.is_absolute() {
            if tool.exists() {
                return Ok(tool.clone());
            }
            return Err(super::Error::tool_not_found(
                &tool.display().to_string(),
                &[tool.display().to_string()],
            ));
        }

        which::which(tool)
            .map_err(|_| super::Error::tool_not_found(&tool.display().to_string(), &["PATH"]))
    }

    /// Path of the emulator info file, honoring the configured override
    pub fn emulator_info_path(&self) -> PathBuf {
        self.device
            .emulator_info
            .clone()
            .unwrap_or_else(super::paths::emulator_info_path)
    }
}
