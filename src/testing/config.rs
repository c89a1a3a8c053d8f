//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::input::Button;
use crate::monitor::event::parse_clock;
use crate::monitor::StateEvent;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Optional setup steps to run before the test (e.g., installing the app)
    pub setup: Option<Vec<SetupStep>>,
    /// Overrides for the device under test
    #[serde(default)]
    pub device: DeviceSection,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// A setup step that runs before the test
#[derive(Deserialize, Debug)]
pub struct SetupStep {
    /// Shell command to execute
    pub shell: String,
}

/// Device settings for one scenario
#[derive(Deserialize, Debug, Default)]
pub struct DeviceSection {
    /// Emulator platform (default: from config)
    pub platform: Option<String>,
    /// Input host when `port` is given (default: localhost)
    pub host: Option<String>,
    /// Fixed input port, bypassing emulator info resolution
    pub port: Option<u16>,
    /// Command whose stdout is the device log
    pub log_command: Option<Vec<String>>,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Press and release a button
    Press {
        button: Button,
        /// Hold time in milliseconds (default: from config)
        hold_ms: Option<u64>,
    },
    /// Press a button and keep it held
    Hold { button: Button },
    /// Release every held button
    Release,
    /// Pause without touching the device
    Sleep { ms: u64 },
    /// Discard state events nobody has waited for yet
    Clear,
    /// Wait for a state event
    Await {
        /// Event tag (default: any event)
        event: Option<String>,
        /// Timeout in seconds (default: from config)
        timeout: Option<u64>,
        /// Assertions on the received event
        expect: Option<EventExpectation>,
    },
    /// Check that some captured log line contains a substring
    CheckLog { contains: String },
}

/// Assertions on a state event
#[derive(Deserialize, Debug, Default)]
pub struct EventExpectation {
    /// Fields that must have exactly these values
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// A clock field that must be close to a time
    pub clock: Option<ClockExpectation>,
}

/// Clock field assertion, e.g. `t` near `19:58`
#[derive(Deserialize, Debug)]
pub struct ClockExpectation {
    /// Field holding the clock (default: `t`)
    #[serde(default = "default_clock_key")]
    pub key: String,
    /// Expected value as `M:SS`
    pub value: String,
    /// Allowed difference in seconds (default: exact)
    #[serde(default)]
    pub tolerance_secs: u64,
}

fn default_clock_key() -> String {
    "t".to_string()
}

impl EventExpectation {
    /// Check an event against every assertion, describing the first mismatch
    pub fn check(&self, state: &StateEvent) -> Result<(), String> {
        let mut keys: Vec<_> = self.fields.keys().collect();
        keys.sort();
        for key in keys {
            let expected = &self.fields[key];
            match state.get(key) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(format!(
                        "Field '{}': expected '{}', got '{}'",
                        key, expected, actual
                    ))
                }
                None => {
                    return Err(format!(
                        "Field '{}' missing from '{}' event",
                        key, state.event
                    ))
                }
            }
        }

        if let Some(clock) = &self.clock {
            clock.check(state)?;
        }
        Ok(())
    }
}

impl ClockExpectation {
    pub fn check(&self, state: &StateEvent) -> Result<(), String> {
        let expected = parse_clock(&self.value)
            .ok_or_else(|| format!("Invalid expected clock '{}', use M:SS", self.value))?;
        let actual = state.clock(&self.key).ok_or_else(|| {
            format!(
                "Field '{}' is not a clock: {:?}",
                self.key,
                state.get(&self.key)
            )
        })?;

        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        if diff > Duration::from_secs(self.tolerance_secs) {
            return Err(format!(
                "Clock '{}': expected {}±{}s, got {}",
                self.key,
                self.value,
                self.tolerance_secs,
                state.get(&self.key).unwrap_or_default()
            ));
        }
        Ok(())
    }
}
