//! Device log monitoring
//!
//! Tails the emulator's diagnostic log and turns `TEST_STATE:` reports into
//! [`StateEvent`]s that tests can wait on.

mod capture;
pub mod event;
pub mod parser;
pub mod source;

pub use capture::LogMonitor;
pub use event::StateEvent;
pub use source::{CommandSource, LogSource, LogStream, ReaderSource};

/// Marker the device prints before each state report
pub const DEFAULT_MARKER: &str = "TEST_STATE:";
