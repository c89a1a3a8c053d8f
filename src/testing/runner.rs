//! Test runner implementation
//!
//! Executes test scenarios against the device, asserting on structured
//! state events rather than on screenshots or raw log text.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use colored::Colorize;
use tokio::process::Command as TokioCommand;

use crate::cli::device::{self, DeviceOverrides};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::input::{Endpoint, InputClient};
use crate::monitor::LogMonitor;

use super::config::{EventExpectation, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// Load a scenario file
pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;

    serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(
    path: &Path,
    config: &Config,
    overrides: &DeviceOverrides,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = load_scenario(path)?;
    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    // Run setup steps
    if let Some(setup_steps) = &scenario.setup {
        println!("\n{}", "Setup:".cyan());
        let scenario_dir = path.parent().unwrap_or(Path::new("."));
        for step in setup_steps {
            if verbose {
                println!("  $ {}", step.shell.dimmed());
            }

            let status = TokioCommand::new("sh")
                .arg("-c")
                .arg(&step.shell)
                .current_dir(scenario_dir)
                .stdin(Stdio::null())
                .stdout(if verbose {
                    Stdio::inherit()
                } else {
                    Stdio::null()
                })
                .stderr(if verbose {
                    Stdio::inherit()
                } else {
                    Stdio::null()
                })
                .status()
                .await?;

            if !status.success() {
                return Ok(TestResult {
                    name: scenario.name.clone(),
                    passed: false,
                    steps_run: 0,
                    steps_total,
                    error: Some(format!(
                        "Setup command '{}' failed with exit code {:?}",
                        step.shell,
                        status.code()
                    )),
                });
            }
            println!("  {} {}", "✓".green(), step.shell.dimmed());
        }
    }

    // Scenario settings win over the CLI's
    let mut config = config.clone();
    if let Some(platform) = &scenario.device.platform {
        config.device.platform = platform.clone();
    }
    let overrides = DeviceOverrides {
        endpoint: scenario
            .device
            .port
            .map(|port| {
                Endpoint::new(
                    scenario.device.host.as_deref().unwrap_or("localhost"),
                    port,
                )
            })
            .or_else(|| overrides.endpoint.clone()),
        log_command: scenario
            .device
            .log_command
            .clone()
            .or_else(|| overrides.log_command.clone()),
    };

    let mut monitor = device::log_monitor(&config, &overrides)?;
    monitor.start().await?;
    let mut client = device::input_client(&config, &overrides);

    if verbose {
        println!("  Platform: {}", config.device.platform.dimmed());
    }

    // Execute test steps
    println!("\n{}", "Steps:".cyan());

    let mut ctx = StepContext {
        monitor: &mut monitor,
        client: &mut client,
        config: &config,
        verbose,
    };
    let mut failure = None;

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        if let Err(e) = execute_step(&mut ctx, step, step_num).await {
            println!("  {} Step {}: {}", "✗".red(), step_num, e);
            failure = Some((step_num, e));
            break;
        }
    }

    // Cleanup: leave no button held and stop the log process
    if let Err(e) = client.release().await {
        tracing::debug!(error = %e, "Final release failed");
    }
    client.close().await;
    monitor.stop().await;

    if let Some((step_num, e)) = failure {
        return Ok(TestResult {
            name: scenario.name,
            passed: false,
            steps_run: step_num,
            steps_total,
            error: Some(e.to_string()),
        });
    }

    println!(
        "\n{} {}\n",
        "✓".green().bold(),
        "Test Passed".green().bold()
    );

    Ok(TestResult {
        name: scenario.name,
        passed: true,
        steps_run: steps_total,
        steps_total,
        error: None,
    })
}

/// What a step can act on
struct StepContext<'a> {
    monitor: &'a mut LogMonitor,
    client: &'a mut InputClient,
    config: &'a Config,
    verbose: bool,
}

/// Execute a single test step
async fn execute_step(ctx: &mut StepContext<'_>, step: &TestStep, step_num: usize) -> Result<()> {
    match step {
        TestStep::Press { button, hold_ms } => {
            let hold = hold_ms
                .map(Duration::from_millis)
                .unwrap_or(ctx.client.settings().hold);
            ctx.client.press_and_release(*button, hold).await?;
            println!(
                "  {} Step {}: press {}",
                "✓".green(),
                step_num,
                button.to_string().dimmed()
            );
        }
        TestStep::Hold { button } => {
            ctx.client.hold(*button).await?;
            println!(
                "  {} Step {}: hold {}",
                "✓".green(),
                step_num,
                button.to_string().dimmed()
            );
        }
        TestStep::Release => {
            ctx.client.release().await?;
            println!("  {} Step {}: release", "✓".green(), step_num);
        }
        TestStep::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            println!(
                "  {} Step {}: sleep {}",
                "✓".green(),
                step_num,
                format!("{}ms", ms).dimmed()
            );
        }
        TestStep::Clear => {
            ctx.monitor.clear_pending().await;
            println!("  {} Step {}: clear pending events", "✓".green(), step_num);
        }
        TestStep::Await {
            event,
            timeout,
            expect,
        } => {
            execute_await_step(ctx, event.as_deref(), *timeout, expect.as_ref(), step_num).await?;
        }
        TestStep::CheckLog { contains } => {
            let lines = ctx.monitor.all_lines();
            if !lines.iter().any(|line| line.contains(contains.as_str())) {
                return Err(Error::TestAssertion(format!(
                    "No log line contains '{}' ({} lines captured)",
                    contains,
                    lines.len()
                )));
            }
            println!(
                "  {} Step {}: check log {}",
                "✓".green(),
                step_num,
                contains.dimmed()
            );
        }
    }
    Ok(())
}

/// Execute an await step
async fn execute_await_step(
    ctx: &mut StepContext<'_>,
    event: Option<&str>,
    timeout: Option<u64>,
    expect: Option<&EventExpectation>,
    step_num: usize,
) -> Result<()> {
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.monitor.wait_timeout());

    let state = ctx
        .monitor
        .wait_for_event(event, timeout)
        .await
        .ok_or_else(|| Error::event_timeout(timeout, event))?;

    if ctx.verbose {
        println!("      {}", state.to_string().dimmed());
    }

    if let Some(exp) = expect {
        exp.check(&state).map_err(Error::TestAssertion)?;
    }

    println!(
        "  {} Step {}: await {}",
        "✓".green(),
        step_num,
        state.event.dimmed()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_scenario_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: broken\nsteps: [ {{ action: fly }} ]").unwrap();

        let err = load_scenario(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("parse")));
    }

    #[test]
    fn test_load_missing_scenario() {
        let err = load_scenario(Path::new("/nonexistent/scenario.yml")).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("/nonexistent/scenario.yml")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scenario_against_scripted_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripted.yml");
        std::fs::write(
            &path,
            r#"
name: Scripted log
device:
  log_command: ["sh", "-c", "echo boot; echo 'TEST_STATE:init,t=0:00,m=New'; echo 'TEST_STATE:button_up,t=1:00,m=New'; exec sleep 30"]
steps:
  - action: await
    event: button_up
    timeout: 5
    expect:
      fields:
        m: New
      clock:
        value: "0:59"
        tolerance_secs: 1
  - action: check_log
    contains: boot
"#,
        )
        .unwrap();

        // Final release goes nowhere; keep its retries short
        let mut config = Config::default();
        config.transport.retries = 0;
        config.transport.connect_timeout_secs = 1;
        config.device.emulator_info = Some(dir.path().join("absent.json"));

        let result = run_scenario(&path, &config, &DeviceOverrides::default(), false)
            .await
            .unwrap();
        assert!(result.passed, "scenario failed: {:?}", result.error);
        assert_eq!(result.steps_run, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_expectation_stops_the_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failing.yml");
        std::fs::write(
            &path,
            r#"
name: Wrong mode
device:
  log_command: ["sh", "-c", "echo 'TEST_STATE:mode_change,m=EditSec'; exec sleep 30"]
steps:
  - action: await
    event: mode_change
    timeout: 5
    expect:
      fields:
        m: Counting
  - action: clear
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.transport.retries = 0;
        config.device.emulator_info = Some(dir.path().join("absent.json"));

        let result = run_scenario(&path, &config, &DeviceOverrides::default(), false)
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.steps_run, 1);
        assert_eq!(result.steps_total, 2);
        assert!(result.error.unwrap().contains("Counting"));
    }
}
