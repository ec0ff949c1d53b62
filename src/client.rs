//! Client runtime: polls the bridge and drives the ingestion pipeline.
//!
//! [`DashClient::spawn`] starts one task that owns the [`DashContext`]. The task waits on
//! four sources at once: cancellation, commands from the client handle, channel events and
//! the poll ticker. Each branch runs to completion before the next one is polled, so a
//! dispatch cycle always finishes before the next snapshot is touched and registrations
//! take effect between cycles.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DashConfig;
use crate::context::DashContext;
use crate::dispatch::{Consumer, HandleAllocator, SubscriptionHandle};
use crate::metrics::{Engine, Published};
use crate::store::PauseState;
use crate::transport::{
    ChannelEvent, Connector, ReadyState, ReconnectingChannel, WebSocketConnector,
};
use crate::types::{PollRate, Snapshot};
use crate::{Result, TelemetryError};

enum Command {
    Register(SubscriptionHandle, Box<dyn Consumer>),
    Unregister(SubscriptionHandle),
    InstallOverride(String, oneshot::Sender<Result<()>>),
    ClearOverride(oneshot::Sender<Result<bool>>),
    TogglePause(oneshot::Sender<Result<PauseState>>),
    DumpState(oneshot::Sender<String>),
    Refresh,
}

/// Handle to a running dash pipeline.
///
/// Dropping the handle stops the pipeline and closes the connection.
pub struct DashClient {
    commands: mpsc::UnboundedSender<Command>,
    handles: HandleAllocator,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    ready_state: watch::Receiver<ReadyState>,
    cancel: CancellationToken,
}

impl DashClient {
    /// Connect to the configured bridge over WebSocket.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(config: &DashConfig, context: DashContext) -> Self {
        Self::spawn_with(config, Arc::new(WebSocketConnector::new()), context)
    }

    /// Connect through a custom connector.
    pub fn spawn_with(
        config: &DashConfig,
        connector: Arc<dyn Connector>,
        context: DashContext,
    ) -> Self {
        let url = config.url();
        info!("Starting dash client for {} at {} Hz", url, config.poll_rate.hz());

        let (channel, events) = ReconnectingChannel::connect(url, connector, config.channel_options());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(channel.ready_state());
        let cancel = CancellationToken::new();
        let handles = context.handles();

        let task = ClientTask {
            context,
            channel,
            events,
            commands: command_rx,
            snapshots: snapshot_tx,
            ready_state: state_tx,
            poll_rate: config.poll_rate,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self { commands: command_tx, handles, snapshots: snapshot_rx, ready_state: state_rx, cancel }
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| TelemetryError::invalid_state("submit", ReadyState::Closed))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.submit(command(tx))?;
        rx.await.map_err(|_| TelemetryError::invalid_state("await reply", ReadyState::Closed))
    }

    /// Add a consumer. It sees every snapshot dispatched after the registration is applied.
    pub fn register(&self, consumer: impl Consumer + 'static) -> SubscriptionHandle {
        let handle = self.handles.allocate();
        if self.submit(Command::Register(handle, Box::new(consumer))).is_err() {
            debug!("Client stopped, consumer {} was not registered", handle);
        }
        handle
    }

    /// Register an engine and return a receiver for its views.
    pub fn register_engine<E: Engine>(&self, engine: E) -> (SubscriptionHandle, watch::Receiver<E::View>) {
        let (published, views) = Published::new(engine);
        (self.register(published), views)
    }

    /// Remove a consumer. Unknown handles are ignored.
    pub fn unregister(&self, handle: SubscriptionHandle) {
        let _ = self.submit(Command::Unregister(handle));
    }

    /// Every dispatched snapshot, starting with the current one if any.
    pub fn snapshots(&self) -> impl Stream<Item = Arc<Snapshot>> + 'static {
        WatchStream::new(self.snapshots.clone()).filter_map(|opt| async move { opt })
    }

    /// Latest dispatched snapshot.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.borrow().clone()
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready_state.borrow()
    }

    /// Freeze the pipeline on a pasted snapshot.
    pub async fn install_override(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::InstallOverride(text, reply)).await?
    }

    pub async fn clear_override(&self) -> Result<bool> {
        self.request(Command::ClearOverride).await?
    }

    pub async fn toggle_pause(&self) -> Result<PauseState> {
        self.request(Command::TogglePause).await?
    }

    /// The current snapshot as JSON text.
    pub async fn dump_state(&self) -> Result<String> {
        self.request(Command::DumpState).await
    }

    /// Drop the socket and reconnect.
    pub fn refresh(&self) {
        let _ = self.submit(Command::Refresh);
    }

    /// Stop the pipeline. Returns `false` when it was already stopped.
    pub fn close(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

impl Drop for DashClient {
    fn drop(&mut self) {
        debug!("Dropping dash client");
        self.cancel.cancel();
    }
}

struct ClientTask {
    context: DashContext,
    channel: ReconnectingChannel,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    ready_state: watch::Sender<ReadyState>,
    poll_rate: PollRate,
    cancel: CancellationToken,
}

impl ClientTask {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_rate.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut dispatched: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(command) = self.commands.recv() => self.handle_command(command),

                event = self.events.recv() => match event {
                    Some(ChannelEvent::Message(payload)) => {
                        if let Some(report) = self.context.handle_message(&payload) {
                            dispatched += 1;
                            trace!(
                                "Cycle {}: {} consumers, {} failed",
                                dispatched, report.invoked, report.failed
                            );
                            self.snapshots.send_replace(self.context.current());
                        }
                    }
                    Some(ChannelEvent::Open) => info!("Bridge connected"),
                    Some(ChannelEvent::Close) => info!("Bridge connection lost, waiting for reconnect"),
                    Some(ChannelEvent::Error(e)) => debug!("Channel error: {}", e),
                    Some(ChannelEvent::Connecting) => {}
                    None => {
                        warn!("Channel stopped unexpectedly");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    // One ping per tick, only while connected
                    if self.channel.is_open() {
                        if let Err(e) = self.channel.send("") {
                            trace!("Ping skipped: {}", e);
                        }
                    }
                }
            }

            self.ready_state.send_if_modified(|state| {
                let current = self.channel.ready_state();
                let changed = *state != current;
                *state = current;
                changed
            });
        }

        self.channel.close();
        self.ready_state.send_replace(ReadyState::Closed);
        info!("Dash client stopped after {} dispatch cycles", dispatched);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register(handle, consumer) => {
                debug!("Registering consumer {} as {}", consumer.name(), handle);
                self.context.register_with(handle, consumer);
            }
            Command::Unregister(handle) => {
                if self.context.unregister(handle) {
                    debug!("Unregistered consumer {}", handle);
                }
            }
            Command::InstallOverride(text, reply) => {
                let _ = reply.send(self.context.install_override(&text));
            }
            Command::ClearOverride(reply) => {
                let _ = reply.send(self.context.clear_override());
            }
            Command::TogglePause(reply) => {
                let _ = reply.send(self.context.toggle_pause());
            }
            Command::DumpState(reply) => {
                let _ = reply.send(self.context.dump_state());
            }
            Command::Refresh => {
                if !self.channel.refresh() {
                    debug!("Refresh ignored, channel is {}", self.channel.ready_state());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FnConsumer;
    use crate::metrics::FuelEngine;
    use crate::transport::Socket;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Bridge that answers each ping with the next scripted snapshot.
    #[derive(Default)]
    struct ScriptedBridge {
        replies: Mutex<VecDeque<String>>,
        pings: AtomicUsize,
    }

    impl ScriptedBridge {
        fn with_replies(replies: impl IntoIterator<Item = String>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into_iter().collect()), ..Self::default() })
        }
    }

    struct BridgeSocket {
        bridge: Arc<ScriptedBridge>,
        outbox_tx: mpsc::UnboundedSender<String>,
        outbox_rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Socket for BridgeSocket {
        async fn send(&mut self, _payload: String) -> Result<()> {
            self.bridge.pings.fetch_add(1, Ordering::SeqCst);
            let reply = self.bridge.replies.lock().unwrap().pop_front();
            if let Some(reply) = reply {
                let _ = self.outbox_tx.send(reply);
            }
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.outbox_rx.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct BridgeConnector(Arc<ScriptedBridge>);

    #[async_trait]
    impl Connector for BridgeConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Socket>> {
            let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
            Ok(Box::new(BridgeSocket { bridge: Arc::clone(&self.0), outbox_tx, outbox_rx }))
        }
    }

    fn tick(position: i32) -> String {
        json!({
            "VersionMajor": 2,
            "VersionMinor": 11,
            "Position": position,
            "FuelUseActive": 1,
            "FuelLeft": 12.0,
            "FuelCapacity": 60.0,
            "FuelPerLap": 3.0,
            "DriverData": [],
        })
        .to_string()
    }

    fn spawn(bridge: &Arc<ScriptedBridge>) -> DashClient {
        DashClient::spawn_with(
            &DashConfig::default(),
            Arc::new(BridgeConnector(Arc::clone(bridge))),
            DashContext::in_memory(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pings_are_answered_and_dispatched_in_order() {
        let bridge = ScriptedBridge::with_replies([tick(1), tick(2), tick(3)]);
        let client = spawn(&bridge);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        client.register(FnConsumer::new("positions", move |cx| {
            log.lock().unwrap().push(cx.snapshot.position);
            Ok(())
        }));

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(bridge.pings.load(Ordering::SeqCst) > 3);
        assert_eq!(client.current().map(|s| s.position), Some(3));
        assert_eq!(client.ready_state(), ReadyState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn engines_publish_views() {
        let bridge = ScriptedBridge::with_replies([tick(1)]);
        let client = spawn(&bridge);
        let (_handle, mut fuel) = client.register_engine(FuelEngine::new());

        tokio::time::timeout(Duration::from_secs(5), fuel.changed()).await.unwrap().unwrap();
        assert_eq!(fuel.borrow().laps_remaining, Some(4.0));

        let mut snapshots = std::pin::pin!(client.snapshots());
        let first = tokio::time::timeout(Duration::from_secs(5), snapshots.next()).await.unwrap();
        assert_eq!(first.map(|s| s.position), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_consumers_stop_receiving() {
        let bridge = ScriptedBridge::with_replies((1..=10).map(tick));
        let client = spawn(&bridge);

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = client.register(FnConsumer::new("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        client.unregister(handle);
        let frozen = count.load(Ordering::SeqCst);
        assert!(frozen > 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn override_freezes_the_pipeline() {
        let bridge = ScriptedBridge::with_replies((1..=20).map(tick));
        let client = spawn(&bridge);

        assert!(client.toggle_pause().await.is_err());
        client.install_override(tick(42)).await.unwrap();
        assert!(client.install_override("[]").await.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.current().map(|s| s.position), Some(42));

        let dump: serde_json::Value = serde_json::from_str(&client.dump_state().await.unwrap()).unwrap();
        assert_eq!(dump["Position"], 42);

        assert!(client.clear_override().await.unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_ne!(client.current().map(|s| s.position), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_the_pipeline() {
        let bridge = ScriptedBridge::with_replies([tick(1)]);
        let client = spawn(&bridge);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(client.close());
        assert!(!client.close());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(client.dump_state().await.is_err());
        assert_eq!(client.ready_state(), ReadyState::Closed);
        let pings = bridge.pings.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(bridge.pings.load(Ordering::SeqCst), pings);
    }
}
