//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Stream state events from the device log
    Watch {
        /// Only show events with this tag
        #[arg(long, short)]
        event: Option<String>,

        /// Print events as JSON, one per line
        #[arg(long)]
        json: bool,

        /// Stop after this many seconds (default: until interrupted)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Wait for a single state event and print it
    Await {
        /// Event tag to wait for (default: any event)
        event: Option<String>,

        /// Required field values, as key=value
        /// Can be specified multiple times: --field m=Counting --field p=0
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,

        /// Timeout in seconds (default: from config)
        #[arg(long, short)]
        timeout: Option<u64>,
    },

    /// Press and release a button
    #[command(alias = "p")]
    Press {
        /// Button: back, up, select or down
        button: String,

        /// How long to hold before releasing, in milliseconds
        #[arg(long)]
        hold_ms: Option<u64>,

        /// Repeat the press this many times
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,
    },

    /// Press a button and leave it held
    Hold {
        /// Button: back, up, select or down
        button: String,
    },

    /// Release all held buttons
    Release,

    /// Show the input endpoint of the running emulator
    Endpoint,

    /// Show the effective configuration
    Config,

    /// Execute a test scenario defined in a YAML file
    Test {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },
}
