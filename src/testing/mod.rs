//! Scenario test runner
//!
//! Reads YAML test scenarios and plays them against the device: button
//! steps go through the input client, assertions are made against the
//! structured state events the monitor captures.

mod config;
mod runner;

pub use config::*;
pub use runner::{load_scenario, run_scenario, TestResult};
