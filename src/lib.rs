//! Emulator test harness
//!
//! Drives an app running in the watch emulator: button input goes in over
//! the emulator's phone proxy, and `TEST_STATE:` reports come back out of
//! the device log as structured events that tests can wait on.

pub mod cli;
pub mod commands;
pub mod common;
pub mod input;
pub mod monitor;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use input::{Button, InputClient};
pub use monitor::{LogMonitor, StateEvent};
