use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use super::{Connector, Socket};
use crate::{Result, TelemetryError};

/// Connects to the bridge with `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>> {
        let (stream, response) = connect_async(url).await.map_err(|e| {
            TelemetryError::connection_failed_with_source(format!("connect to {url}"), Box::new(e))
        })?;
        debug!("WebSocket handshake with {} completed ({})", url, response.status());
        Ok(Box::new(WebSocket { stream }))
    }
}

struct WebSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

fn wire_error(context: &str, error: tokio_tungstenite::tungstenite::Error) -> TelemetryError {
    TelemetryError::connection_failed_with_source(context, Box::new(error))
}

#[async_trait]
impl Socket for WebSocket {
    async fn send(&mut self, payload: String) -> Result<()> {
        self.stream.send(Message::text(payload)).await.map_err(|e| wire_error("send", e))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(wire_error("receive", e))),
            };

            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => trace!("Skipping non UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Message::Close(frame) => {
                    debug!("Bridge closed the socket: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite on the next read or write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.map_err(|e| wire_error("close", e))
    }
}
