//! Button input client
//!
//! Sends button frames to the device over a single cached connection. The
//! device may drop that connection at any time (an emulator restart is
//! enough), so every frame goes through one retry loop that discards the
//! link, re-resolves the endpoint and reconnects.

use std::sync::Arc;
use std::time::Duration;

use crate::common::config::TransportConfig;
use crate::common::{Error, Result};

use super::button::{Button, ButtonCommand};
use super::resolver::EndpointResolver;
use super::transport::{Connector, Endpoint, FrameSink, TransportError, WebSocketConnector};

/// Whether the client currently holds a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Retry, timeout and pacing settings
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Retries after the first failed attempt
    pub retries: u32,
    pub backoff: Duration,
    /// Default hold time for [`InputClient::press`]
    pub hold: Duration,
    /// Wait after a press-and-release so the UI can redraw
    pub press_settle: Duration,
    /// Wait after a hold or release
    pub settle: Duration,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            retries: config.retries,
            backoff: Duration::from_millis(config.backoff_ms),
            hold: Duration::from_millis(config.hold_ms),
            press_settle: Duration::from_millis(config.press_settle_ms),
            settle: Duration::from_millis(config.settle_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }
}

/// Client for injecting button input into the device
pub struct InputClient {
    resolver: Arc<dyn EndpointResolver>,
    connector: Arc<dyn Connector>,
    settings: TransportSettings,
    /// Cached until a delivery failure
    endpoint: Option<Endpoint>,
    link: Option<Box<dyn FrameSink>>,
}

impl InputClient {
    pub fn new(
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn Connector>,
        settings: TransportSettings,
    ) -> Self {
        Self {
            resolver,
            connector,
            settings,
            endpoint: None,
            link: None,
        }
    }

    /// Client talking to the device's WebSocket endpoint
    pub fn websocket(resolver: Arc<dyn EndpointResolver>, settings: TransportSettings) -> Self {
        Self::new(resolver, Arc::new(WebSocketConnector), settings)
    }

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Endpoint of the cached connection, if resolved
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Press and release a button using the configured hold time
    pub async fn press(&mut self, button: Button) -> Result<()> {
        let hold = self.settings.hold;
        self.press_and_release(button, hold).await
    }

    /// Press a button, hold it for `hold`, then release everything
    ///
    /// The two frames are delivered independently; a dropped connection
    /// between them is retried like any other.
    pub async fn press_and_release(&mut self, button: Button, hold: Duration) -> Result<()> {
        tracing::debug!(%button, hold_ms = hold.as_millis() as u64, "Pressing button");

        self.send_with_retry("press", button.to_string(), ButtonCommand::Press(button))
            .await?;
        tokio::time::sleep(hold).await;
        self.send_with_retry("release", button.to_string(), ButtonCommand::ReleaseAll)
            .await?;

        tokio::time::sleep(self.settings.press_settle).await;
        Ok(())
    }

    /// Press a button and keep it held until [`release`](Self::release)
    pub async fn hold(&mut self, button: Button) -> Result<()> {
        tracing::debug!(%button, "Holding button");
        self.send_with_retry("hold", button.to_string(), ButtonCommand::Press(button))
            .await?;
        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }

    /// Release every held button
    pub async fn release(&mut self) -> Result<()> {
        tracing::debug!("Releasing all buttons");
        let command = ButtonCommand::ReleaseAll;
        self.send_with_retry("release", command.to_string(), command)
            .await?;
        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }

    /// Close the connection; the endpoint stays cached
    pub async fn close(&mut self) {
        if self.link.is_some() {
            self.drop_link().await;
            tracing::info!("Input connection closed");
        }
    }

    /// Deliver one frame, reconnecting between attempts
    async fn send_with_retry(
        &mut self,
        operation: &'static str,
        label: String,
        command: ButtonCommand,
    ) -> Result<()> {
        let frame = command.to_frame();
        let attempts = self.settings.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(operation, button = %label, attempt, frame = ?frame, "Sending button frame");

            let error = match self.try_send(&frame).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            tracing::warn!(
                operation,
                button = %label,
                attempt,
                attempts,
                error = %error,
                "Button frame delivery failed"
            );

            // The device may have come back on a different port
            self.drop_link().await;
            self.endpoint = None;

            if attempt >= attempts {
                return Err(Error::InputDelivery {
                    operation,
                    command: label,
                    attempts: attempt,
                    source: error,
                });
            }

            tokio::time::sleep(self.settings.backoff).await;
        }
    }

    async fn try_send(&mut self, frame: &[u8]) -> std::result::Result<(), TransportError> {
        let link = match self.link.take() {
            Some(link) => link,
            None => self.connect().await?,
        };
        let link = self.link.insert(link);

        let timeout = self.settings.send_timeout;
        match tokio::time::timeout(timeout, link.send_frame(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::SendTimeout(timeout)),
        }
    }

    async fn connect(&mut self) -> std::result::Result<Box<dyn FrameSink>, TransportError> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let endpoint = self.resolver.resolve().await?;
                self.endpoint = Some(endpoint.clone());
                endpoint
            }
        };

        let timeout = self.settings.connect_timeout;
        let link = tokio::time::timeout(timeout, self.connector.connect(&endpoint))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                endpoint: endpoint.clone(),
                timeout,
            })??;

        tracing::info!(%endpoint, "Connected to device input endpoint");
        Ok(link)
    }

    async fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            if tokio::time::timeout(self.settings.send_timeout, link.close())
                .await
                .is_err()
            {
                tracing::debug!("Timed out closing input connection");
            }
        }
    }
}
