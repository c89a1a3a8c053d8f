//! End-to-end integration tests for the harness
//!
//! These tests run the real monitor and input client against the
//! `mock_device` binary, which speaks the same WebSocket protocol as the
//! emulator and echoes every button frame into its log as a state event.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use harness::input::{Button, EmulatorInfoResolver, InputClient, TransportSettings};
use harness::monitor::{CommandSource, LogMonitor};

const MOCK_DEVICE: &str = env!("CARGO_BIN_EXE_mock_device");
const HARNESS: &str = env!("CARGO_BIN_EXE_harness");

/// Test context with a scratch directory and a config file
struct TestContext {
    temp_dir: tempfile::TempDir,
    config_path: PathBuf,
    info_path: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let info_path = temp_dir.path().join("pb-emulator.json");
        let config_path = temp_dir.path().join("config.toml");

        let config_content = format!(
            r#"
[device]
platform = "basalt"
emulator_info = "{info}"

[transport]
retries = 2
backoff_ms = 50
hold_ms = 20
press_settle_ms = 20
settle_ms = 20
connect_timeout_secs = 2
send_timeout_secs = 2
"#,
            info = info_path.display(),
        );
        fs::write(&config_path, config_content).expect("Failed to write config");

        Self {
            temp_dir,
            config_path,
            info_path,
        }
    }

    /// Run a harness command against this context's config
    fn run_harness(&self, args: &[&str]) -> HarnessOutput {
        let output = Command::new(HARNESS)
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .output()
            .expect("Failed to run harness");

        HarnessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }

    /// Run harness command expecting success
    fn run_harness_ok(&self, args: &[&str]) -> String {
        let output = self.run_harness(args);
        assert!(
            output.success,
            "harness {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            output.stdout,
            output.stderr
        );
        output.stdout
    }

    /// Start a mock device that registers itself in the info file
    fn spawn_mock(&self, extra: &[&str]) -> MockDevice {
        let mut child = Command::new(MOCK_DEVICE)
            .arg(&self.info_path)
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to start mock device");

        let stdout = child.stdout.take().expect("mock stdout");
        let mut lines = BufReader::new(stdout).lines();

        // The first line is printed after the info file is written
        let first = lines
            .next()
            .expect("mock exited before starting")
            .expect("read mock output");
        assert!(first.contains("listening"), "unexpected first line: {first}");

        let mut mock = MockDevice { child, lines };
        mock.expect_line("TEST_STATE:init");
        mock
    }
}

/// Output from a harness command
#[derive(Debug)]
struct HarnessOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

struct MockDevice {
    child: Child,
    lines: std::io::Lines<BufReader<std::process::ChildStdout>>,
}

impl MockDevice {
    /// Read mock output until a line contains `needle`
    fn expect_line(&mut self, needle: &str) -> String {
        for line in self.lines.by_ref() {
            let line = line.expect("read mock output");
            if line.contains(needle) {
                return line;
            }
        }
        panic!("mock device exited without printing '{needle}'");
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_for_file(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn fast_settings() -> TransportSettings {
    TransportSettings {
        retries: 2,
        backoff: Duration::from_millis(50),
        hold: Duration::from_millis(20),
        press_settle: Duration::from_millis(20),
        settle: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(2),
        send_timeout: Duration::from_secs(2),
    }
}

fn monitored_mock(ctx: &TestContext, extra: &[&str]) -> LogMonitor {
    let mut args = vec![ctx.info_path.display().to_string()];
    args.extend(extra.iter().map(|s| s.to_string()));
    LogMonitor::new(Arc::new(CommandSource::new(MOCK_DEVICE, args)))
}

#[tokio::test]
async fn test_press_round_trip_through_mock_device() {
    let ctx = TestContext::new();
    let mut monitor = monitored_mock(&ctx, &[]);
    monitor.start().await.unwrap();

    // init is printed once the endpoint is registered
    let init = monitor
        .wait_for_event(Some("init"), Duration::from_secs(10))
        .await
        .expect("mock device never reported init");
    assert_eq!(init.clock("t"), Some(Duration::ZERO));

    let resolver = EmulatorInfoResolver::new(&ctx.info_path, "basalt");
    let mut client = InputClient::websocket(Arc::new(resolver), fast_settings());

    client.press(Button::Up).await.unwrap();
    let pressed = monitor
        .wait_for_event(Some("button_up"), Duration::from_secs(5))
        .await
        .expect("no button_up event");
    assert_eq!(pressed.get("mask"), Some("2"));

    let released = monitor
        .wait_for_event(Some("release"), Duration::from_secs(5))
        .await
        .expect("no release event");
    assert_eq!(released.get("mask"), Some("0"));

    client.hold(Button::Down).await.unwrap();
    client.release().await.unwrap();
    let held = monitor
        .wait_for_event(None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(held.event, "button_down");
    assert!(monitor
        .wait_for_event(Some("release"), Duration::from_secs(5))
        .await
        .is_some());

    // Frames arrived in the order they were sent
    let counts: Vec<u32> = monitor
        .all_events()
        .iter()
        .filter_map(|e| e.parse_field("n"))
        .collect();
    assert_eq!(counts, vec![1, 2, 3, 4]);

    client.close().await;
    monitor.stop().await;
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn test_input_retries_through_refused_connections() {
    let ctx = TestContext::new();
    let mut monitor = monitored_mock(&ctx, &["--refuse-first", "2"]);
    monitor.start().await.unwrap();
    assert!(monitor
        .wait_for_event(Some("init"), Duration::from_secs(10))
        .await
        .is_some());

    let resolver = EmulatorInfoResolver::new(&ctx.info_path, "basalt");
    let mut client = InputClient::websocket(Arc::new(resolver), fast_settings());

    client.hold(Button::Select).await.unwrap();
    assert!(monitor
        .wait_for_event(Some("button_select"), Duration::from_secs(5))
        .await
        .is_some());

    let refused = monitor
        .all_lines()
        .iter()
        .filter(|line| line.contains("refused connection"))
        .count();
    assert_eq!(refused, 2);

    client.close().await;
    monitor.stop().await;
}

#[tokio::test]
async fn test_input_fails_after_bounded_attempts_without_device() {
    let ctx = TestContext::new();
    let resolver = EmulatorInfoResolver::new(&ctx.info_path, "basalt");
    let mut client = InputClient::websocket(Arc::new(resolver), fast_settings());

    let err = client.press(Button::Back).await.unwrap_err();
    assert_eq!(err.attempts(), Some(3));
    assert!(err.to_string().contains("basalt"));
}

#[test]
fn test_cli_press_reaches_device() {
    let ctx = TestContext::new();
    let mut mock = ctx.spawn_mock(&[]);
    wait_for_file(&ctx.info_path, Duration::from_secs(5));

    let stdout = ctx.run_harness_ok(&["press", "up"]);
    assert!(stdout.contains("Pressed UP"));
    assert!(mock.expect_line("TEST_STATE:").contains("button_up"));
    assert!(mock.expect_line("TEST_STATE:").contains("release"));

    ctx.run_harness_ok(&["hold", "back"]);
    assert!(mock.expect_line("TEST_STATE:").contains("button_back"));
    ctx.run_harness_ok(&["release"]);
    assert!(mock.expect_line("TEST_STATE:").contains("release"));
}

#[test]
fn test_cli_endpoint_resolves_mock_device() {
    let ctx = TestContext::new();
    let _mock = ctx.spawn_mock(&["--platform", "chalk"]);

    let stdout = ctx.run_harness_ok(&["--platform", "chalk", "endpoint"]);
    assert!(stdout.contains("Platform: chalk"));
    assert!(stdout.contains("ws://localhost:"));

    // Registered as chalk only
    let output = ctx.run_harness(&["endpoint"]);
    assert!(!output.success);
    assert!(output.stderr.contains("no running emulator found for 'basalt'"));
}

#[test]
fn test_cli_rejects_unknown_button() {
    let ctx = TestContext::new();
    let output = ctx.run_harness(&["press", "left"]);
    assert!(!output.success);
    assert!(output.stderr.contains("Unknown button 'left'"));
}

#[test]
fn test_cli_press_without_device_reports_attempts() {
    let ctx = TestContext::new();
    let output = ctx.run_harness(&["press", "select"]);
    assert!(!output.success);
    assert!(
        output.stderr.contains("after 3 attempts"),
        "stderr: {}",
        output.stderr
    );
}

#[test]
fn test_cli_config_shows_effective_values() {
    let ctx = TestContext::new();
    let stdout = ctx.run_harness_ok(&["--platform", "diorite", "config"]);
    assert!(stdout.contains("platform = \"diorite\""));
    assert!(stdout.contains("backoff_ms = 50"));
    assert!(stdout.contains("marker = \"TEST_STATE:\""));
}

#[test]
fn test_cli_scenario_against_mock_device() {
    let ctx = TestContext::new();
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("press_buttons.yml");
    let scenario = fs::read_to_string(fixture)
        .expect("Failed to read fixture")
        .replace("{mock_device}", MOCK_DEVICE)
        .replace("{info_path}", &ctx.info_path.display().to_string());
    let scenario_path = ctx.temp_dir.path().join("press_buttons.yml");
    fs::write(&scenario_path, scenario).expect("Failed to write scenario");

    let stdout = ctx.run_harness_ok(&["test", scenario_path.to_str().unwrap()]);
    assert!(stdout.contains("Test Passed"), "stdout: {stdout}");
}

#[test]
fn test_cli_scenario_failure_exits_nonzero() {
    let ctx = TestContext::new();
    let scenario_path = ctx.temp_dir.path().join("timeout.yml");
    fs::write(
        &scenario_path,
        format!(
            r#"
name: Nothing happens
device:
  log_command: ["{mock}", "{info}"]
steps:
  - action: await
    event: button_up
    timeout: 1
"#,
            mock = MOCK_DEVICE,
            info = ctx.info_path.display(),
        ),
    )
    .expect("Failed to write scenario");

    let output = ctx.run_harness(&["test", scenario_path.to_str().unwrap()]);
    assert!(!output.success);
    assert!(output.stderr.contains("waiting for state event 'button_up'"));
}
