//! Structured state events extracted from device log lines

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// One state report from the device
///
/// Built once by the parser and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateEvent {
    /// Event tag, e.g. `button_up` or `mode_change`
    pub event: String,
    /// Remaining `key=value` pairs from the line
    pub fields: HashMap<String, String>,
}

impl StateEvent {
    pub fn new(event: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            event: event.into(),
            fields,
        }
    }

    /// Raw value of a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field parsed into any `FromStr` type
    pub fn parse_field<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.trim().parse().ok()
    }

    /// Boolean flag field encoded as `0`/`1`
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }

    /// Clock field encoded as `M:SS`
    ///
    /// Minutes are not wrapped, so `125:07` is two hours and change.
    pub fn clock(&self, key: &str) -> Option<Duration> {
        parse_clock(self.get(key)?)
    }

    /// Whether every expected field is present with exactly that value
    pub fn matches(&self, expected: &HashMap<String, String>) -> bool {
        expected
            .iter()
            .all(|(key, value)| self.get(key) == Some(value.as_str()))
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event)?;
        let mut keys: Vec<_> = self.fields.keys().collect();
        keys.sort();
        for key in keys {
            write!(f, ",{}={}", key, self.fields[key])?;
        }
        Ok(())
    }
}

/// Parse `M:SS` into a duration
pub fn parse_clock(text: &str) -> Option<Duration> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    let total = minutes.checked_mul(60)?.checked_add(seconds)?;
    Some(Duration::from_secs(total))
}
