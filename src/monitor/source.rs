//! Where device log lines come from
//!
//! A [`LogSource`] opens a readable stream of log text, spawning the process
//! that produces it when there is one. The monitor owns whatever `open`
//! returns, including the child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::common::{Error, Result};

/// An opened log stream
pub struct LogStream {
    /// Raw log text, one event per line
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Process producing the text, if the source spawned one
    pub process: Option<Child>,
}

/// Something that can produce a device log stream
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Short human-readable description for logs and errors
    fn describe(&self) -> String;

    /// Open the stream, spawning the producer if needed
    async fn open(&self) -> Result<LogStream>;
}

/// Spawns a command and reads its stdout
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandSource {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    /// Add an environment variable for the spawned process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The device tool's log tail for one emulator platform
    ///
    /// Equivalent to `PEBBLE_EMULATOR=<platform> pebble logs --emulator=<platform>`.
    pub fn device_logs(tool: &Path, platform: &str) -> Self {
        Self::new(tool, vec!["logs".to_string(), format!("--emulator={}", platform)])
            .env("PEBBLE_EMULATOR", platform)
    }
}

#[async_trait]
impl LogSource for CommandSource {
    fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    async fn open(&self) -> Result<LogStream> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let tool errors go to stderr
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::LogStreamStart {
            command: self.describe(),
            error: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::LogStreamStart {
            command: self.describe(),
            error: "Failed to get process stdout".to_string(),
        })?;

        tracing::debug!(command = %self.describe(), pid = ?child.id(), "Spawned log process");

        Ok(LogStream {
            reader: Box::new(stdout),
            process: Some(child),
        })
    }
}

/// Attaches to an already-open reader, e.g. a pipe from another process
///
/// The reader can be opened once; later opens fail.
pub struct ReaderSource {
    name: String,
    reader: Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>,
}

impl ReaderSource {
    pub fn new(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Mutex::new(Some(Box::new(reader))),
        }
    }
}

#[async_trait]
impl LogSource for ReaderSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn open(&self) -> Result<LogStream> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::LogStreamStart {
                command: self.name.clone(),
                error: "reader was already consumed".to_string(),
            })?;

        Ok(LogStream {
            reader,
            process: None,
        })
    }
}

/// Stop a log process: terminate gracefully, kill after `grace`
///
/// A process that already exited is left alone.
pub async fn terminate_process(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(%status, "Log process already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Could not query log process status");
        }
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SIGTERM lets the tool close its own connections first
            let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if result != 0 {
                tracing::debug!(pid, "SIGTERM failed, process likely gone");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(%status, "Log process exited");
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Failed waiting for log process");
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Log process ignored termination, killing"
            );
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill log process");
            }
        }
    }
}
