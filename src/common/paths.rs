//! Configuration, log, and emulator info paths

use std::io;
use std::path::PathBuf;

/// Name used for the config and data directories
const APP_NAME: &str = "emu-harness";

/// File the device tool writes describing running emulators
const EMULATOR_INFO_FILE: &str = "pb-emulator.json";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/emu-harness/`
/// - macOS: `~/Library/Application Support/emu-harness/`
/// - Windows: `%APPDATA%\emu-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Default location of the emulator info file
///
/// The device tool keeps it in the system temp directory, keyed by platform
/// and SDK version.
pub fn emulator_info_path() -> PathBuf {
    std::env::temp_dir().join(EMULATOR_INFO_FILE)
}

/// Ensure the log directory exists
pub fn ensure_log_dir() -> io::Result<Option<PathBuf>> {
    if let Some(dir) = log_dir() {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Some(dir))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_info_path_is_in_temp_dir() {
        let path = emulator_info_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with("pb-emulator.json"));
    }

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        }
    }
}
