//! Background log capture
//!
//! The reader task pushes every line into a shared line log and every state
//! event into both a history log and an unbounded channel. The channel is
//! the queue that waiters consume; the history is a read-only copy so
//! snapshots never disturb what a waiter will see.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::config::MonitorConfig;
use crate::common::Result;

use super::event::StateEvent;
use super::parser::parse_line;
use super::source::{terminate_process, LogSource, LogStream};
use super::DEFAULT_MARKER;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state written by the reader task
#[derive(Clone)]
struct Ingest {
    marker: Arc<str>,
    lines: Arc<Mutex<Vec<String>>>,
    history: Arc<Mutex<Vec<StateEvent>>>,
    events_tx: mpsc::UnboundedSender<StateEvent>,
}

impl Ingest {
    fn line(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(%line, "Log line");

        match parse_line(&line, &self.marker) {
            Ok(Some(event)) => {
                tracing::debug!(event = %event, "State event");
                lock(&self.history).push(event.clone());
                // Receiver lives as long as the monitor
                let _ = self.events_tx.send(event);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%line, error = %e, "Dropping malformed state line");
            }
        }

        lock(&self.lines).push(line);
    }
}

/// A running capture
struct Running {
    task: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    process: Option<Child>,
}

/// Tails a device log stream and exposes its state events
pub struct LogMonitor {
    source: Arc<dyn LogSource>,
    ingest: Ingest,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StateEvent>>,
    stop_timeout: Duration,
    join_timeout: Duration,
    running: Option<Running>,
}

impl LogMonitor {
    /// Create a monitor with default marker and timeouts
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self::with_config(source, &MonitorConfig::default())
    }

    /// Create a monitor using configured marker and timeouts
    pub fn with_config(source: Arc<dyn LogSource>, config: &MonitorConfig) -> Self {
        let marker = if config.marker.is_empty() {
            DEFAULT_MARKER
        } else {
            config.marker.as_str()
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            source,
            ingest: Ingest {
                marker: Arc::from(marker),
                lines: Arc::new(Mutex::new(Vec::new())),
                history: Arc::new(Mutex::new(Vec::new())),
                events_tx,
            },
            events_rx: tokio::sync::Mutex::new(events_rx),
            stop_timeout: config.stop_timeout(),
            join_timeout: config.join_timeout(),
            running: None,
        }
    }

    /// Start capturing on a background task
    ///
    /// No-op while a capture is already running. A capture whose stream has
    /// ended is cleaned up and replaced.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                tracing::debug!("Log monitor already running");
                return Ok(());
            }
            self.stop().await;
        }

        let LogStream { reader, process } = self.source.open().await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(read_lines(reader, self.ingest.clone(), shutdown_rx));

        tracing::info!(source = %self.source.describe(), "Log monitor started");

        self.running = Some(Running {
            task,
            shutdown: shutdown_tx,
            process,
        });
        Ok(())
    }

    /// Stop capturing and terminate the log process
    ///
    /// Safe to call repeatedly and on a process that already exited.
    pub async fn stop(&mut self) {
        let Some(Running {
            task,
            shutdown,
            process,
        }) = self.running.take()
        else {
            return;
        };

        // Reader may have finished on its own
        let _ = shutdown.send(());

        if let Some(mut child) = process {
            terminate_process(&mut child, self.stop_timeout).await;
        }

        let abort = task.abort_handle();
        match tokio::time::timeout(self.join_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Log reader task failed"),
            Err(_) => {
                tracing::warn!("Log reader task did not exit in time, aborting");
                abort.abort();
            }
        }

        tracing::info!(
            lines = self.line_count(),
            events = lock(&self.ingest.history).len(),
            "Log monitor stopped"
        );
    }

    /// Whether the reader task is still consuming the stream
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Every raw line observed so far, in arrival order
    pub fn all_lines(&self) -> Vec<String> {
        lock(&self.ingest.lines).clone()
    }

    fn line_count(&self) -> usize {
        lock(&self.ingest.lines).len()
    }

    /// Every state event captured so far
    ///
    /// A snapshot: waiters still see events that have not been consumed.
    pub fn all_events(&self) -> Vec<StateEvent> {
        lock(&self.ingest.history).clone()
    }

    /// Discard queued events that no waiter has consumed yet
    pub async fn clear_pending(&self) {
        let mut rx = self.events_rx.lock().await;
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        tracing::debug!(discarded, "Cleared pending state events");
    }

    /// Wait for the next event with the given tag, or any event
    ///
    /// Events that don't match are consumed and dropped. Returns `None` once
    /// `timeout` elapses, including when the stream has already ended.
    pub async fn wait_for_event(&self, tag: Option<&str>, timeout: Duration) -> Option<StateEvent> {
        self.wait_until(timeout, |event| tag.map_or(true, |t| event.event == t))
            .await
    }

    /// Wait for an event with `tag` whose fields include every expected pair
    pub async fn wait_for_event_matching(
        &self,
        tag: Option<&str>,
        expected: &HashMap<String, String>,
        timeout: Duration,
    ) -> Option<StateEvent> {
        self.wait_until(timeout, |event| {
            tag.map_or(true, |t| event.event == t) && event.matches(expected)
        })
        .await
    }

    async fn wait_until<F>(&self, timeout: Duration, accept: F) -> Option<StateEvent>
    where
        F: Fn(&StateEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let Ok(mut rx) = tokio::time::timeout(timeout, self.events_rx.lock()).await else {
            return None;
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            // A zero timeout still takes an event that is already queued
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => {
                    if accept(&event) {
                        return Some(event);
                    }
                    tracing::debug!(event = %event.event, "Skipping non-matching state event");
                }
                Ok(None) => {
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        if let Some(mut running) = self.running.take() {
            let _ = running.shutdown.send(());
            if let Some(child) = running.process.as_mut() {
                let _ = child.start_kill();
            }
            running.task.abort();
        }
    }
}

/// Reader task: split the stream into lines until EOF or shutdown
async fn read_lines(
    reader: Box<dyn AsyncRead + Send + Unpin>,
    ingest: Ingest,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("Log reader shutting down");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    if !buf.is_empty() {
                        ingest.line(&buf);
                    }
                    tracing::debug!("Log stream closed");
                    break;
                }
                Ok(_) => {
                    ingest.line(&buf);
                    buf.clear();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Log stream read failed");
                    break;
                }
            }
        }
    }
}
