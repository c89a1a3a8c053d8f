//! Connection seam between the input client and the device
//!
//! The real device listens on the phone-proxy WebSocket and takes each
//! button frame as one binary message. Tests swap in their own connector.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Address of the device's input endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// WebSocket URL of the endpoint
    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport-level failures, retried by the input client
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no running emulator found for '{device}'")]
    EndpointNotFound { device: String },

    #[error("could not read emulator info '{path}': {error}")]
    EmulatorInfo { path: String, error: String },

    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: BoxError,
    },

    #[error("connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    #[error("send failed: {0}")]
    Send(#[source] BoxError),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),
}

impl TransportError {
    pub fn connect(endpoint: &Endpoint, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            endpoint: endpoint.clone(),
            source: source.into(),
        }
    }

    pub fn send(source: impl Into<BoxError>) -> Self {
        Self::Send(source.into())
    }
}

/// An open link that accepts frames
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Close the link; errors are irrelevant since the link is discarded
    async fn close(&mut self);
}

/// Opens links to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameSink>, TransportError>;
}

/// Connects over WebSocket and sends frames as binary messages
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameSink>, TransportError> {
        let (stream, _response) = connect_async(endpoint.url())
            .await
            .map_err(|e| TransportError::connect(endpoint, e))?;
        tracing::debug!(%endpoint, "WebSocket handshake complete");
        Ok(Box::new(WebSocketSink { stream }))
    }
}

struct WebSocketSink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.stream
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(TransportError::send)
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::trace!(error = %e, "WebSocket close failed");
        }
    }
}
