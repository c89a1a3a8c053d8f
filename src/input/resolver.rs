//! Endpoint resolution
//!
//! The device tool records every emulator it launches in a JSON file:
//!
//! ```json
//! { "basalt": { "4.4": { "qemu": { "pid": 4242, "port": 50161 },
//!                        "pypkjs": { "pid": 4243, "port": 50162 } } } }
//! ```
//!
//! Button frames go to the `pypkjs` port. The port changes whenever the
//! emulator restarts, which is why the input client re-resolves after a
//! failure instead of caching the endpoint forever.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::transport::{Endpoint, TransportError};

/// Maps the device under test to its input endpoint
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self) -> Result<Endpoint, TransportError>;
}

/// Always resolves to the same endpoint
#[derive(Debug, Clone)]
pub struct StaticResolver(pub Endpoint);

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self) -> Result<Endpoint, TransportError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ProcessInfo {
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct EmulatorEntry {
    #[serde(default)]
    qemu: Option<ProcessInfo>,
    #[serde(default)]
    pypkjs: Option<ProcessInfo>,
}

type EmulatorInfo = BTreeMap<String, BTreeMap<String, EmulatorEntry>>;

/// Resolves a platform through the device tool's emulator info file
#[derive(Debug, Clone)]
pub struct EmulatorInfoResolver {
    path: PathBuf,
    platform: String,
    version: Option<String>,
    host: String,
}

impl EmulatorInfoResolver {
    pub fn new(path: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            platform: platform.into(),
            version: None,
            host: "localhost".to_string(),
        }
    }

    /// Only accept the emulator for this SDK version
    pub fn version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    fn not_found(&self) -> TransportError {
        TransportError::EndpointNotFound {
            device: self.platform.clone(),
        }
    }

    fn pick<'a>(&self, versions: &'a BTreeMap<String, EmulatorEntry>) -> Option<&'a EmulatorEntry> {
        if let Some(version) = &self.version {
            return versions.get(version);
        }

        // Newest version whose emulator is still alive
        let mut candidates: Vec<_> = versions.iter().collect();
        candidates.sort_by_key(|(version, _)| Reverse(version_key(version)));
        candidates
            .into_iter()
            .map(|(_, entry)| entry)
            .find(|entry| entry.qemu.as_ref().and_then(|q| q.pid).map_or(true, pid_alive))
    }
}

/// Orders SDK versions numerically, so `4.10` is newer than `4.9`
fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}

#[async_trait]
impl EndpointResolver for EmulatorInfoResolver {
    async fn resolve(&self) -> Result<Endpoint, TransportError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No emulator info file");
                return Err(self.not_found());
            }
            Err(e) => {
                return Err(TransportError::EmulatorInfo {
                    path: self.path.display().to_string(),
                    error: e.to_string(),
                })
            }
        };

        let info: EmulatorInfo =
            serde_json::from_str(&content).map_err(|e| TransportError::EmulatorInfo {
                path: self.path.display().to_string(),
                error: e.to_string(),
            })?;

        let port = info
            .get(&self.platform)
            .and_then(|versions| self.pick(versions))
            .and_then(|entry| entry.pypkjs.as_ref())
            .and_then(|pypkjs| pypkjs.port)
            .ok_or_else(|| self.not_found())?;

        let endpoint = Endpoint::new(self.host.clone(), port);
        tracing::debug!(platform = %self.platform, %endpoint, "Resolved input endpoint");
        Ok(endpoint)
    }
}

/// Signal 0 tests process existence without side effects
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}
