//! CLI command handling
//!
//! Dispatches CLI commands against the configured device and formats output.

pub mod device;

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::input::Button;
use crate::monitor::StateEvent;
use crate::testing;

pub use device::DeviceOverrides;

/// How often `watch` wakes up to check for a closed stream
const WATCH_POLL: Duration = Duration::from_secs(1);

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config, overrides: &DeviceOverrides) -> Result<()> {
    match command {
        Commands::Watch {
            event,
            json,
            duration,
        } => {
            let mut monitor = device::log_monitor(config, overrides)?;
            monitor.start().await?;

            let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
            let mut shown = 0usize;

            loop {
                let slice = match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            break;
                        }
                        remaining.min(WATCH_POLL)
                    }
                    None => WATCH_POLL,
                };

                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    found = monitor.wait_for_event(event.as_deref(), slice) => {
                        match found {
                            Some(state) => {
                                print_event(&state, json)?;
                                shown += 1;
                            }
                            None if !monitor.is_running() => {
                                eprintln!("Log stream ended");
                                break;
                            }
                            None => {}
                        }
                    }
                }
            }

            monitor.stop().await;
            if !json {
                eprintln!("{} event(s) shown", shown);
            }
            Ok(())
        }

        Commands::Await {
            event,
            fields,
            timeout,
        } => {
            let expected = parse_field_filters(&fields)?;
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.monitor.wait_timeout());

            let mut monitor = device::log_monitor(config, overrides)?;
            monitor.start().await?;
            let found = monitor
                .wait_for_event_matching(event.as_deref(), &expected, timeout)
                .await;
            monitor.stop().await;

            match found {
                Some(state) => {
                    print_event(&state, false)?;
                    Ok(())
                }
                None => Err(Error::event_timeout(timeout, event.as_deref())),
            }
        }

        Commands::Press {
            button,
            hold_ms,
            count,
        } => {
            let button: Button = button.parse()?;
            let mut client = device::input_client(config, overrides);
            let hold = hold_ms
                .map(Duration::from_millis)
                .unwrap_or(client.settings().hold);

            let result = async {
                for _ in 0..count {
                    client.press_and_release(button, hold).await?;
                }
                Ok::<_, Error>(())
            }
            .await;
            client.close().await;
            result?;

            if count == 1 {
                println!("Pressed {}", button);
            } else {
                println!("Pressed {} {} times", button, count);
            }
            Ok(())
        }

        Commands::Hold { button } => {
            let button: Button = button.parse()?;
            let mut client = device::input_client(config, overrides);
            let result = client.hold(button).await;
            client.close().await;
            result?;

            println!("Holding {}. Use 'harness release' to let go.", button);
            Ok(())
        }

        Commands::Release => {
            let mut client = device::input_client(config, overrides);
            let result = client.release().await;
            client.close().await;
            result?;

            println!("Released all buttons");
            Ok(())
        }

        Commands::Endpoint => {
            let endpoint = device::resolver(config, overrides).resolve().await?;
            println!("Platform: {}", config.device.platform);
            println!("Endpoint: {}", endpoint);
            println!("URL: {}", endpoint.url());
            Ok(())
        }

        Commands::Config => {
            match paths::config_path() {
                Some(path) if path.exists() => println!("# {}", path.display()),
                Some(path) => println!("# {} (not found, using defaults)", path.display()),
                None => println!("# no config directory, using defaults"),
            }
            let text = toml::to_string_pretty(config)
                .map_err(|e| Error::Internal(format!("Failed to render config: {}", e)))?;
            print!("{}", text);
            Ok(())
        }

        Commands::Test { path, verbose } => {
            let result = testing::run_scenario(&path, config, overrides, verbose).await?;
            if result.passed {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "'{}' failed at step {}/{}: {}",
                    result.name,
                    result.steps_run,
                    result.steps_total,
                    result.error.unwrap_or_default()
                )))
            }
        }
    }
}

/// Parse `key=value` filters given on the command line
fn parse_field_filters(filters: &[String]) -> Result<HashMap<String, String>> {
    filters
        .iter()
        .map(|filter| match filter.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(Error::Config(format!(
                "Invalid field filter '{}', expected key=value",
                filter
            ))),
        })
        .collect()
}

fn print_event(state: &StateEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
    } else {
        println!("{}", state);
    }
    Ok(())
}
