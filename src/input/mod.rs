//! Button input injection
//!
//! Buttons reach the device as three-byte frames over a connection to the
//! emulator's phone proxy. [`InputClient`] owns that connection and retries
//! each frame across reconnects.

pub mod button;
mod client;
pub mod resolver;
pub mod transport;

pub use button::{Button, ButtonCommand};
pub use client::{ConnectionState, InputClient, TransportSettings};
pub use resolver::{EmulatorInfoResolver, EndpointResolver, StaticResolver};
pub use transport::{Connector, Endpoint, FrameSink, TransportError, WebSocketConnector};
