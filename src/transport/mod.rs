//! Transport layer for the telemetry bridge.
//!
//! The bridge is a plain request/response WebSocket server: the dash sends an empty text
//! frame and the bridge answers with one JSON snapshot. [`ReconnectingChannel`] keeps such a
//! socket alive for the lifetime of the dash, reconnecting on a fixed interval whenever it
//! drops or fails to open in time.
//!
//! The wire itself sits behind the [`Connector`] and [`Socket`] traits so the channel can be
//! driven by scripted sockets in tests. [`WebSocketConnector`] is the production connector.

use async_trait::async_trait;

use crate::Result;

mod channel;
mod websocket;


pub use channel::{ChannelEvent, ChannelOptions, ReadyState, ReconnectingChannel};
pub use websocket::WebSocketConnector;

/// An open, message-oriented socket.
///
/// `recv` must be cancel-safe: the channel polls it inside `tokio::select!`.
#[async_trait]
pub trait Socket: Send {
    /// Send one text payload.
    async fn send(&mut self, payload: String) -> Result<()>;

    /// Next text payload. `None` once the peer has closed the socket.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the socket from our side.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sockets to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>>;
}
