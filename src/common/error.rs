//! Error types for the emulator harness
//!
//! Error messages name the operation and the button or event involved so a
//! failing functional test reads clearly without a backtrace.

use std::io;
use thiserror::Error;

use crate::input::TransportError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Input Delivery Errors ===
    #[error("Failed to {operation} {command} after {attempts} attempts: {source}")]
    InputDelivery {
        operation: &'static str,
        command: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Device connection error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unknown button '{0}'. Expected one of: back, up, select, down")]
    UnknownButton(String),

    // === Log Monitor Errors ===
    #[error("Failed to start log stream '{command}': {error}")]
    LogStreamStart { command: String, error: String },

    // === Device Tool Errors ===
    #[error("Device tool '{name}' not found. Searched: {searched}")]
    ToolNotFound { name: String, searched: String },

    // === Timeout Errors ===
    #[error("Timed out after {0:?} waiting for state event{1}")]
    EventTimeout(std::time::Duration, String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tool not found error with search paths
    pub fn tool_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::ToolNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create an event timeout error, naming the awaited tag if any
    pub fn event_timeout(timeout: std::time::Duration, tag: Option<&str>) -> Self {
        let suffix = tag.map(|t| format!(" '{}'", t)).unwrap_or_default();
        Self::EventTimeout(timeout, suffix)
    }

    /// Number of delivery attempts made, if this is an input delivery failure
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::InputDelivery { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_input_delivery_message_names_operation_and_attempts() {
        let err = Error::InputDelivery {
            operation: "press",
            command: "UP".to_string(),
            attempts: 3,
            source: TransportError::EndpointNotFound {
                device: "basalt".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("press UP"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("basalt"));
        assert_eq!(err.attempts(), Some(3));
    }

    #[test]
    fn test_io_errors_convert() {
        fn spawn_missing() -> Result<()> {
            std::process::Command::new("/nonexistent/harness-setup-tool").status()?;
            Ok(())
        }
        let err = spawn_missing().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error:"));
    }

    #[test]
    fn test_event_timeout_message() {
        let err = Error::event_timeout(Duration::from_secs(5), Some("button_up"));
        assert_eq!(
            err.to_string(),
            "Timed out after 5s waiting for state event 'button_up'"
        );
        let err = Error::event_timeout(Duration::from_millis(250), None);
        assert_eq!(err.to_string(), "Timed out after 250ms waiting for state event");
    }
}
