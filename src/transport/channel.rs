//! Auto-reconnecting channel.
//!
//! One background task owns the socket. The [`ReconnectingChannel`] handle only exchanges
//! messages with it: commands go in over an mpsc queue, the ready state comes back over a
//! watch channel and everything observable is reported as a [`ChannelEvent`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Connector, Socket};
use crate::{Result, TelemetryError};

/// Lifecycle state of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Something the owner of the channel can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection attempt has started
    Connecting,
    Open,
    /// One inbound text payload
    Message(String),
    /// The socket closed. Not emitted for timed-out attempts or failed reconnects.
    Close,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// An attempt that has not opened within this window is abandoned
    pub connect_timeout: Duration,
    /// Fixed delay between a closure and the next attempt
    pub reconnect_interval: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(2), reconnect_interval: Duration::from_secs(1) }
    }
}

#[derive(Debug)]
enum Command {
    Send(String),
    Refresh,
}

/// How an open socket stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Forced,
    Refreshed,
    Dropped,
}

/// A WebSocket-like channel that reconnects until it is closed by its owner.
///
/// The first connection attempt starts immediately. Dropping the handle closes the channel.
pub struct ReconnectingChannel {
    url: String,
    state: watch::Receiver<ReadyState>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl ReconnectingChannel {
    /// Start connecting to `url`.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: ChannelOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let url = url.into();
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            url: url.clone(),
            connector,
            options,
            state: state_tx,
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        (Self { url, state: state_rx, commands: command_tx, cancel }, event_rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queue `payload` for the open socket.
    pub fn send(&self, payload: impl Into<String>) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TelemetryError::invalid_state("send", state));
        }
        self.commands
            .send(Command::Send(payload.into()))
            .map_err(|_| TelemetryError::invalid_state("send", ReadyState::Closed))
    }

    /// Close the open socket and reconnect.
    ///
    /// Returns `false` without doing anything unless the channel is open.
    pub fn refresh(&self) -> bool {
        self.is_open() && self.commands.send(Command::Refresh).is_ok()
    }

    /// Close for good. Returns `false` when the channel was already closed.
    pub fn close(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        info!("Closing channel to {}", self.url);
        self.cancel.cancel();
        true
    }
}

impl fmt::Debug for ReconnectingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectingChannel")
            .field("url", &self.url)
            .field("state", &self.ready_state())
            .finish()
    }
}

impl Drop for ReconnectingChannel {
    fn drop(&mut self) {
        debug!("Dropping channel to {}", self.url);
        self.cancel.cancel();
    }
}

struct ChannelTask {
    url: String,
    connector: Arc<dyn Connector>,
    options: ChannelOptions,
    state: watch::Sender<ReadyState>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
}

impl ChannelTask {
    fn emit(&self, event: ChannelEvent) {
        // The owner may have stopped listening; the channel keeps running until cancelled
        let _ = self.events.send(event);
    }

    async fn run(mut self) {
        let mut reconnect_attempt = false;
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            self.state.send_replace(ReadyState::Connecting);
            self.emit(ChannelEvent::Connecting);
            debug!("Connecting to {} (attempt {}, reconnect: {})", self.url, attempts, reconnect_attempt);

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(
                    self.options.connect_timeout,
                    self.connector.connect(&self.url),
                ) => result,
            };

            match attempt {
                Err(_) => {
                    // Timed out attempts are retried silently
                    let e = TelemetryError::Timeout { duration: self.options.connect_timeout };
                    debug!("Connection to {} abandoned: {}", self.url, e);
                }
                Ok(Err(e)) => {
                    warn!("Connection to {} failed: {}", self.url, e);
                    self.state.send_replace(ReadyState::Closed);
                    self.emit(ChannelEvent::Error(e.to_string()));
                    if !reconnect_attempt {
                        self.emit(ChannelEvent::Close);
                    }
                }
                Ok(Ok(socket)) => {
                    // Anything queued for an earlier socket is stale
                    while self.commands.try_recv().is_ok() {}

                    self.state.send_replace(ReadyState::Open);
                    self.emit(ChannelEvent::Open);
                    info!("Connected to {}", self.url);

                    let outcome = self.pump(socket).await;
                    self.state.send_replace(ReadyState::Closed);
                    self.emit(ChannelEvent::Close);
                    if outcome == Outcome::Forced {
                        break;
                    }
                    debug!("Socket to {} stopped ({:?})", self.url, outcome);
                }
            }

            self.state.send_replace(ReadyState::Closed);
            reconnect_attempt = true;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.reconnect_interval) => {}
            }
        }

        self.state.send_replace(ReadyState::Closed);
        info!("Channel to {} closed after {} attempts", self.url, attempts);
    }

    async fn pump(&mut self, mut socket: Box<dyn Socket>) -> Outcome {
        let mut received: u64 = 0;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break Outcome::Forced,

                Some(command) = self.commands.recv() => match command {
                    Command::Send(payload) => {
                        if let Err(e) = socket.send(payload).await {
                            warn!("Send to {} failed: {}", self.url, e);
                            self.emit(ChannelEvent::Error(e.to_string()));
                            break Outcome::Dropped;
                        }
                    }
                    Command::Refresh => break Outcome::Refreshed,
                },

                inbound = socket.recv() => match inbound {
                    Some(Ok(payload)) => {
                        received += 1;
                        trace!("Message {}: {} bytes", received, payload.len());
                        self.emit(ChannelEvent::Message(payload));
                    }
                    Some(Err(e)) => {
                        warn!("Socket to {} errored: {}", self.url, e);
                        self.emit(ChannelEvent::Error(e.to_string()));
                        break Outcome::Dropped;
                    }
                    None => break Outcome::Dropped,
                },
            }
        };

        if outcome != Outcome::Dropped {
            self.state.send_replace(ReadyState::Closing);
            if let Err(e) = socket.close().await {
                debug!("Closing socket to {} failed: {}", self.url, e);
            }
        }
        outcome
    }
}
