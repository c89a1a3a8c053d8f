//! Emulator test harness CLI
//!
//! Presses buttons on a running watch emulator and reads back the state
//! reports the app under test writes to the device log.

use std::path::PathBuf;

use clap::Parser;
use harness::cli::{self, DeviceOverrides};
use harness::commands::Commands;
use harness::common::{config::Config, logging, Result};
use harness::input::Endpoint;

#[derive(Parser)]
#[command(name = "harness", about = "Drive and observe an app in the watch emulator")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emulator platform (overrides the config file)
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Send input to this port on localhost instead of resolving it
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    debug: bool,

    /// Also write logs to the harness log file
    #[arg(long, global = true)]
    log_file: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.log_file {
        match logging::run_log_path() {
            Some(path) => {
                logging::init_with_file(cli.debug, &path);
            }
            None => logging::init_cli(cli.debug),
        }
    } else {
        logging::init_cli(cli.debug);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(platform) = cli.platform {
        config.device.platform = platform;
    }

    let overrides = DeviceOverrides {
        endpoint: cli.port.map(|port| Endpoint::new("localhost", port)),
        log_command: None,
    };

    tracing::debug!(platform = %config.device.platform, "Loaded configuration");
    cli::dispatch(cli.command, &config, &overrides).await
}
