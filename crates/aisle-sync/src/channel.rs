//! # Realtime Channel Manager
//!
//! Owns the WebSocket connection lifecycle: explicit connect/disconnect,
//! exponential-backoff reconnection with a bounded budget, application-level
//! heartbeats, outbox replay on open, and inbound dispatch to subscribers.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Channel State Machine                             │
//! │                                                                         │
//! │                 connect()              dial ok                          │
//! │  ┌──────────────┐      ┌──────────────┐      ┌──────────────┐          │
//! │  │ DISCONNECTED │─────►│  CONNECTING  │─────►│     OPEN     │          │
//! │  └──────▲───▲───┘      └──────┬───────┘      └───┬──────┬───┘          │
//! │         │   │                 │ dial failed      │      │              │
//! │         │   │          ┌──────▼───────┐          │      │ disconnect() │
//! │         │   └──────────│   backoff    │   close  │      ▼              │
//! │         │    budget    │   timer      │   event  │  ┌──────────────┐   │
//! │         │    spent:    └──────────────┘          │  │   CLOSING    │   │
//! │         │    give up                             │  └──────┬───────┘   │
//! │         │◄───────────────────────────────────────┘         │           │
//! │         │◄─────────────────────────────────── close event ─┘           │
//! │                                                                         │
//! │  Only the transport's close event completes OPEN/CLOSING to            │
//! │  DISCONNECTED. Error events are advisory and change nothing.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Generation Guard
//!
//! Every dial carries a generation number. Dial results, reader events and
//! reconnect timers from an older generation are discarded, so a dial that
//! resolves after `disconnect()` can never resurrect the channel.
//!
//! ## Manager Task
//!
//! All state lives in a single task driven by [`ChannelManager::run`];
//! callers interact through the cloneable [`ChannelHandle`]. Dials and
//! connection readers run as short-lived helper tasks that report back over
//! internal channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

use aisle_core::{
    parse_inbound, ControlFrame, EventFrame, InboundFrame, SyncDomain, SyncEvent,
};

use crate::backoff::ReconnectPolicy;
use crate::config::{IdentitySettings, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::outbox::{EventSender, Outbox};
use crate::subscriptions::{
    SubscriberCallback, SubscriptionId, SubscriptionTable, LIFECYCLE_CONNECTED,
    LIFECYCLE_DISCONNECTED, LIFECYCLE_ERROR, LIFECYCLE_RECONNECT_EXHAUSTED,
};
use crate::transport::{ConnEvent, Connection, FrameSink, Transport};

// =============================================================================
// Channel State
// =============================================================================

/// Connection lifecycle state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and no dial in flight.
    Disconnected,

    /// A dial is in flight.
    Connecting,

    /// Connected; events flow both ways.
    Open,

    /// Close requested; waiting for the transport's close event.
    Closing,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Channel Status
// =============================================================================

/// Snapshot of channel health, readable from any task via the handle.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    /// Current lifecycle state.
    pub state: ChannelState,

    /// When an inbound event was last dispatched.
    pub last_sync: Option<DateTime<Utc>>,

    /// Events queued in the outbox.
    pub pending_events: usize,

    /// Reconnect attempts consumed since the last successful open.
    pub retry_attempts: u32,

    /// Most recent connection or send error.
    pub last_error: Option<String>,

    /// True once the reconnect budget is spent; cleared by `connect()` or a
    /// connectivity-restored signal.
    pub gave_up: bool,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        ChannelStatus {
            state: ChannelState::Disconnected,
            last_sync: None,
            pending_events: 0,
            retry_attempts: 0,
            last_error: None,
            gave_up: false,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Commands accepted by the manager task.
enum Command {
    Connect,
    Disconnect,
    Send(SyncEvent),
    ForceFullSync { user: Option<String> },
    Subscribe {
        channel: String,
        callback: SubscriberCallback,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    DiscardPending {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

// =============================================================================
// Channel Handle
// =============================================================================

/// Handle for interacting with the channel manager from other components.
#[derive(Clone)]
pub struct ChannelHandle {
    cmd_tx: mpsc::Sender<Command>,
    status: Arc<RwLock<ChannelStatus>>,
}

impl ChannelHandle {
    /// Requests a connection. No-op while connecting or open; grants a fresh
    /// reconnect budget when the channel had given up.
    pub async fn connect(&self) -> SyncResult<()> {
        self.send_cmd(Command::Connect).await
    }

    /// Closes the connection and suppresses automatic reconnection until the
    /// next `connect()`.
    pub async fn disconnect(&self) -> SyncResult<()> {
        self.send_cmd(Command::Disconnect).await
    }

    /// Sends an event now if open, otherwise queues it for replay.
    pub async fn send(&self, event: SyncEvent) -> SyncResult<()> {
        self.send_cmd(Command::Send(event)).await
    }

    /// Emits one resync event per domain. `user` overrides the configured
    /// identity for this batch.
    pub async fn force_full_sync(&self, user: Option<String>) -> SyncResult<()> {
        self.send_cmd(Command::ForceFullSync { user }).await
    }

    /// Registers a callback for a named channel. Channel names are the
    /// domain subscription names (`cartSync`, ...) plus the lifecycle names.
    pub async fn subscribe(
        &self,
        channel: &str,
        callback: SubscriberCallback,
    ) -> SyncResult<SubscriptionId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::Subscribe {
            channel: channel.to_string(),
            callback,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Removes a subscription. Returns false when the id was not found.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::Unsubscribe {
            id,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Drops every queued event. Returns how many were discarded.
    pub async fn discard_pending(&self) -> SyncResult<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::DiscardPending { reply: reply_tx })
            .await?;
        reply_rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the manager task. Queued events are lost.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.send_cmd(Command::Shutdown).await
    }

    /// Returns the current status snapshot.
    pub async fn status(&self) -> ChannelStatus {
        self.status.read().await.clone()
    }

    /// True while the channel is open.
    pub async fn is_connected(&self) -> bool {
        self.status.read().await.state == ChannelState::Open
    }

    async fn send_cmd(&self, cmd: Command) -> SyncResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

// =============================================================================
// Channel Manager
// =============================================================================

/// The manager task. Owns the connection, the outbox, the subscription table
/// and the reconnect policy; everything else talks to it through a
/// [`ChannelHandle`].
pub struct ChannelManager {
    url: Url,
    identity: IdentitySettings,
    heartbeat_interval: Duration,
    transport: Arc<dyn Transport>,

    state: ChannelState,
    sink: Option<Box<dyn FrameSink>>,
    outbox: Outbox,
    subscriptions: SubscriptionTable,
    policy: ReconnectPolicy,

    /// Bumped on every dial and on cancellation; stale helper-task messages
    /// are recognized by a generation mismatch.
    generation: u64,

    /// False after `disconnect()`: lost connections stay lost.
    reconnect_enabled: bool,

    /// Set when `connect()` arrives during `closing`; triggers a fresh dial
    /// once the close completes.
    reconnect_after_close: bool,

    /// True once the reconnect budget is spent.
    gave_up: bool,

    connectivity: watch::Receiver<bool>,
    connectivity_live: bool,

    status: Arc<RwLock<ChannelStatus>>,

    cmd_rx: mpsc::Receiver<Command>,
    dial_tx: mpsc::UnboundedSender<(u64, SyncResult<Connection>)>,
    dial_rx: mpsc::UnboundedReceiver<(u64, SyncResult<Connection>)>,
    conn_tx: mpsc::UnboundedSender<(u64, ConnEvent)>,
    conn_rx: mpsc::UnboundedReceiver<(u64, ConnEvent)>,
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
}

impl ChannelManager {
    /// Validates the endpoint, spawns the manager task and returns a handle.
    ///
    /// `connectivity` carries platform online/offline signals; a transition
    /// to online while disconnected triggers an immediate dial with a fresh
    /// reconnect budget.
    pub fn spawn(
        config: &SyncConfig,
        transport: Arc<dyn Transport>,
        connectivity: watch::Receiver<bool>,
    ) -> SyncResult<ChannelHandle> {
        let url = config.ws_endpoint()?;
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(100);
        let (dial_tx, dial_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(ChannelStatus::default()));

        let manager = ChannelManager {
            url,
            identity: config.identity.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            transport,
            state: ChannelState::Disconnected,
            sink: None,
            outbox: Outbox::new(),
            subscriptions: SubscriptionTable::new(),
            policy: ReconnectPolicy::new(
                config.backoff_floor(),
                config.backoff_ceiling(),
                config.channel.max_attempts,
            ),
            generation: 0,
            reconnect_enabled: false,
            reconnect_after_close: false,
            gave_up: false,
            connectivity,
            connectivity_live: true,
            status: status.clone(),
            cmd_rx,
            dial_tx,
            dial_rx,
            conn_tx,
            conn_rx,
            timer_tx,
            timer_rx,
        };

        // Spawn background task
        tokio::spawn(manager.run());

        Ok(ChannelHandle { cmd_tx, status })
    }

    /// Main manager loop.
    async fn run(mut self) {
        info!(url = %self.url, "Sync channel manager starting");

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Handle commands; all handles dropping means shutdown
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            info!("All channel handles dropped");
                            break;
                        }
                    }
                }

                // Dial results from connect tasks
                Some((generation, result)) = self.dial_rx.recv() => {
                    self.handle_dial_result(generation, result, &mut heartbeat).await;
                }

                // Frames, errors and closes from the connection reader
                Some((generation, event)) = self.conn_rx.recv() => {
                    self.handle_conn_event(generation, event).await;
                }

                // Reconnect timers
                Some(generation) = self.timer_rx.recv() => {
                    self.handle_timer(generation).await;
                }

                // Platform online/offline signal
                changed = self.connectivity.changed(), if self.connectivity_live => {
                    match changed {
                        Ok(()) => self.handle_connectivity_change().await,
                        Err(_) => self.connectivity_live = false,
                    }
                }

                // Periodic application-level ping
                _ = heartbeat.tick(), if self.state == ChannelState::Open => {
                    debug!("Sending heartbeat ping");
                    self.send_control(ControlFrame::Ping).await;
                }
            }
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        info!("Sync channel manager stopped");
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Applies one command. Returns true when the manager should stop.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Connect => self.handle_connect().await,
            Command::Disconnect => self.handle_disconnect().await,
            Command::Send(event) => self.send_or_queue(event).await,
            Command::ForceFullSync { user } => self.handle_force_full_sync(user).await,
            Command::Subscribe {
                channel,
                callback,
                reply,
            } => {
                let id = self.subscriptions.subscribe(&channel, callback);
                let _ = reply.send(id);
            }
            Command::Unsubscribe { id, reply } => {
                let removed = self.subscriptions.unsubscribe(id);
                let _ = reply.send(removed);
            }
            Command::DiscardPending { reply } => {
                let dropped = self.outbox.clear();
                self.status.write().await.pending_events = 0;
                let _ = reply.send(dropped);
            }
            Command::Shutdown => {
                info!("Sync channel manager shutting down");
                return true;
            }
        }
        false
    }

    async fn handle_connect(&mut self) {
        match self.state {
            ChannelState::Disconnected => {
                self.reconnect_enabled = true;
                self.gave_up = false;
                self.policy.reset();
                {
                    let mut status = self.status.write().await;
                    status.gave_up = false;
                    status.retry_attempts = 0;
                }
                self.begin_dial().await;
            }
            ChannelState::Connecting | ChannelState::Open => {
                debug!(state = %self.state, "Connect requested while already active");
            }
            ChannelState::Closing => {
                // Remembered until the close completes.
                self.reconnect_after_close = true;
            }
        }
    }

    async fn handle_disconnect(&mut self) {
        info!(state = %self.state, "Disconnect requested");
        self.reconnect_enabled = false;
        self.reconnect_after_close = false;

        match self.state {
            ChannelState::Open => {
                // The generation stays: the reader's close event completes
                // the transition to disconnected.
                self.set_state(ChannelState::Closing).await;
                if let Some(sink) = self.sink.as_mut() {
                    sink.close().await;
                }
            }
            ChannelState::Connecting => {
                // The in-flight dial's result no longer matches.
                self.generation += 1;
                self.set_state(ChannelState::Disconnected).await;
            }
            ChannelState::Disconnected => {
                // Invalidates any armed reconnect timer.
                self.generation += 1;
            }
            ChannelState::Closing => {}
        }
    }

    /// Emits one resync event per domain so the server pushes fresh state.
    async fn handle_force_full_sync(&mut self, user: Option<String>) {
        info!("Full sync requested for every domain");
        let user = user.or_else(|| self.identity.user_id.clone());
        for domain in SyncDomain::ALL {
            let event = SyncEvent::resync(domain, user.clone());
            self.send_or_queue(event).await;
        }
    }

    /// Queues the event, then replays the outbox at once when the channel
    /// is open.
    async fn send_or_queue(&mut self, event: SyncEvent) {
        if let Err(err) = encode_event(&event) {
            // An event that cannot serialize never will; queueing it would
            // wedge the outbox behind it.
            error!(error = %err, event_id = %event.id, "Dropping unserializable event");
            return;
        }

        let depth = self.outbox.enqueue(event);
        self.status.write().await.pending_events = depth;

        // Even when open the event goes through the outbox, so anything
        // still queued from an interrupted replay keeps its place in line.
        if self.state == ChannelState::Open {
            self.drain_outbox().await;
        }
    }

    // -------------------------------------------------------------------------
    // Dialing and Reconnection
    // -------------------------------------------------------------------------

    /// Starts a dial under a new generation and moves to `connecting`.
    async fn begin_dial(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.set_state(ChannelState::Connecting).await;

        info!(url = %self.url, generation, "Dialing sync endpoint");

        let transport = self.transport.clone();
        let url = self.url.clone();
        let dial_tx = self.dial_tx.clone();
        tokio::spawn(async move {
            let result = transport.connect(&url).await;
            let _ = dial_tx.send((generation, result));
        });
    }

    async fn handle_dial_result(
        &mut self,
        generation: u64,
        result: SyncResult<Connection>,
        heartbeat: &mut Interval,
    ) {
        if generation != self.generation {
            // The dial outlived a disconnect; close and forget it.
            if let Ok(mut conn) = result {
                debug!(generation, "Discarding connection from a cancelled dial");
                tokio::spawn(async move { conn.sink.close().await });
            }
            return;
        }

        match result {
            Ok(conn) => self.handle_open(conn, heartbeat).await,
            Err(err) => {
                warn!(error = %err, "Sync connect failed");
                self.record_error(&err).await;
                self.set_state(ChannelState::Disconnected).await;
                // A failed handshake surfaces as a disconnect, not an error
                // event; error events are reserved for live connections.
                self.notify_lifecycle(
                    LIFECYCLE_DISCONNECTED,
                    &json!({ "clean": false, "error": err.to_string() }),
                );
                if self.reconnect_enabled {
                    self.schedule_reconnect().await;
                }
            }
        }
    }

    async fn handle_open(&mut self, conn: Connection, heartbeat: &mut Interval) {
        let Connection { sink, mut source } = conn;
        self.sink = Some(sink);
        self.policy.reset();
        self.gave_up = false;
        self.set_state(ChannelState::Open).await;
        // First ping one full period after the connection opened.
        heartbeat.reset();

        {
            let mut status = self.status.write().await;
            status.retry_attempts = 0;
            status.last_error = None;
            status.gave_up = false;
        }

        info!(url = %self.url, "Sync channel open");

        // Reader task: pumps connection events into the manager loop, tagged
        // with this connection's generation.
        let generation = self.generation;
        let conn_tx = self.conn_tx.clone();
        tokio::spawn(async move {
            loop {
                let event = source.next().await;
                let done = matches!(event, ConnEvent::Closed { .. });
                if conn_tx.send((generation, event)).is_err() || done {
                    break;
                }
            }
        });

        self.notify_lifecycle(LIFECYCLE_CONNECTED, &json!({ "endpoint": self.url.as_str() }));
        self.drain_outbox().await;
    }

    /// Arms the next reconnect timer, or gives up when the budget is spent.
    async fn schedule_reconnect(&mut self) {
        match self.policy.next_delay() {
            Some(delay) => {
                let attempt = self.policy.attempts();
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.status.write().await.retry_attempts = attempt;

                let generation = self.generation;
                let timer_tx = self.timer_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = timer_tx.send(generation);
                });
            }
            None => {
                warn!(
                    attempts = self.policy.attempts(),
                    "Reconnect budget exhausted, giving up"
                );
                self.gave_up = true;
                self.status.write().await.gave_up = true;
                self.notify_lifecycle(
                    LIFECYCLE_RECONNECT_EXHAUSTED,
                    &json!({ "attempts": self.policy.attempts() }),
                );
            }
        }
    }

    async fn handle_timer(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, "Ignoring reconnect timer from a cancelled attempt");
            return;
        }
        if self.state != ChannelState::Disconnected || !self.reconnect_enabled || self.gave_up {
            return;
        }
        self.begin_dial().await;
    }

    /// A transition to online while down is treated like a fresh `connect()`:
    /// old attempt counts describe a network that no longer exists.
    async fn handle_connectivity_change(&mut self) {
        let online = *self.connectivity.borrow_and_update();
        info!(online, "Connectivity changed");
        if !online {
            return;
        }
        if self.state == ChannelState::Disconnected && self.reconnect_enabled {
            self.policy.reset();
            self.gave_up = false;
            self.status.write().await.gave_up = false;
            self.begin_dial().await;
        }
    }

    // -------------------------------------------------------------------------
    // Connection Events
    // -------------------------------------------------------------------------

    async fn handle_conn_event(&mut self, generation: u64, event: ConnEvent) {
        if generation != self.generation {
            debug!(generation, "Ignoring event from a closed connection");
            return;
        }

        match event {
            ConnEvent::Frame(text) => self.dispatch_frame(&text).await,
            ConnEvent::Error(err) => {
                // Advisory only: state changes ride on the close event.
                warn!(error = %err, "Sync channel error");
                self.record_error(&err).await;
                self.notify_lifecycle(LIFECYCLE_ERROR, &json!({ "error": err.to_string() }));
            }
            ConnEvent::Closed { clean } => self.handle_closed(clean).await,
        }
    }

    async fn dispatch_frame(&mut self, text: &str) {
        match parse_inbound(text) {
            Ok(InboundFrame::Ping) => {
                debug!("Channel ping received, answering with pong");
                self.send_control(ControlFrame::Pong).await;
            }
            Ok(InboundFrame::Pong) => {
                debug!("Heartbeat pong received");
            }
            Ok(InboundFrame::Event(event)) => {
                self.status.write().await.last_sync = Some(Utc::now());
                let delivered = self.subscriptions.notify(event.channel, &event.data);
                debug!(
                    channel = event.channel,
                    action = event.action.as_deref().unwrap_or("none"),
                    delivered,
                    "Inbound event dispatched"
                );
            }
            Ok(InboundFrame::Unknown { frame_type }) => {
                warn!(frame_type = %frame_type, "Unknown inbound frame type, dropping");
            }
            Err(err) => {
                warn!(error = %err, "Malformed inbound frame, dropping");
            }
        }
    }

    async fn handle_closed(&mut self, clean: bool) {
        info!(clean, state = %self.state, "Sync connection closed");
        self.sink = None;

        let was_closing = self.state == ChannelState::Closing;
        self.set_state(ChannelState::Disconnected).await;
        self.notify_lifecycle(LIFECYCLE_DISCONNECTED, &json!({ "clean": clean }));

        if was_closing {
            // Requested close finished. Dial again only when connect()
            // arrived while the close was in flight.
            if self.reconnect_after_close {
                self.reconnect_after_close = false;
                self.reconnect_enabled = true;
                self.gave_up = false;
                self.policy.reset();
                self.begin_dial().await;
            }
            return;
        }

        if self.reconnect_enabled {
            self.schedule_reconnect().await;
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Replays queued events over the live sink, oldest first.
    async fn drain_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        let mut sender = SinkSender { sink };
        let outcome = self.outbox.drain(&mut sender).await;
        if let Some(err) = outcome.error {
            warn!(error = %err, remaining = outcome.remaining, "Outbox replay interrupted");
            self.record_error(&err).await;
        }
        self.status.write().await.pending_events = self.outbox.len();
    }

    async fn send_control(&mut self, frame: ControlFrame) {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "Failed to encode control frame");
                return;
            }
        };
        let result = match self.sink.as_mut() {
            Some(sink) => sink.send(text).await,
            None => return,
        };
        if let Err(err) = result {
            warn!(error = %err, "Failed to send control frame");
            self.record_error(&err).await;
        }
    }

    async fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Channel state changed");
        }
        self.state = state;
        self.status.write().await.state = state;
    }

    async fn record_error(&self, err: &SyncError) {
        self.status.write().await.last_error = Some(err.to_string());
    }

    /// Delivers a lifecycle notification to subscribers of the named channel.
    fn notify_lifecycle(&self, channel: &'static str, payload: &serde_json::Value) {
        let delivered = self.subscriptions.notify(channel, payload);
        debug!(channel, delivered, "Lifecycle event dispatched");
    }
}

// =============================================================================
// Sink Adapters
// =============================================================================

/// Encodes an event into its outbound frame text.
fn encode_event(event: &SyncEvent) -> SyncResult<String> {
    EventFrame::from_event(event)
        .to_json()
        .map_err(SyncError::from)
}

/// Adapts the live sink to the outbox's replay seam.
struct SinkSender<'a> {
    sink: &'a mut dyn FrameSink,
}

#[async_trait]
impl EventSender for SinkSender<'_> {
    async fn send_event(&mut self, event: &SyncEvent) -> SyncResult<()> {
        let text = encode_event(event)?;
        self.sink.send(text).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedPeer, ScriptedTransport};
    use aisle_core::{CartSnapshot, SyncOperation, SyncPayload};
    use serde_json::Value;
    use std::sync::Mutex;

    fn test_config(max_attempts: u32) -> SyncConfig {
        let mut config = SyncConfig::new();
        config.endpoint.origin = "http://localhost:3000".to_string();
        config.identity.user_id = Some("user-1".to_string());
        config.channel.initial_backoff_ms = 1_000;
        config.channel.max_backoff_secs = 30;
        config.channel.max_attempts = max_attempts;
        config
    }

    async fn start(
        max_attempts: u32,
    ) -> (
        ChannelHandle,
        Arc<ScriptedTransport>,
        mpsc::UnboundedReceiver<ScriptedPeer>,
        watch::Sender<bool>,
    ) {
        let (transport, peers_rx) = ScriptedTransport::new();
        let (online_tx, online_rx) = watch::channel(true);
        let handle = ChannelManager::spawn(
            &test_config(max_attempts),
            transport.clone() as Arc<dyn Transport>,
            online_rx,
        )
        .unwrap();
        (handle, transport, peers_rx, online_tx)
    }

    fn cart_event() -> SyncEvent {
        SyncEvent::new(
            SyncOperation::Update,
            SyncPayload::Cart(CartSnapshot { items: vec![] }),
        )
    }

    async fn wait_for_status<F>(handle: &ChannelHandle, mut check: F)
    where
        F: FnMut(&ChannelStatus) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                if check(&handle.status().await) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status never matched");
    }

    async fn wait_for_state(handle: &ChannelHandle, want: ChannelState) {
        wait_for_status(handle, |status| status.state == want).await;
    }

    async fn wait_until<F>(mut check: F)
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                if check() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    async fn wait_for_frames(peer: &ScriptedPeer, count: usize) {
        wait_until(|| peer.sent().len() >= count).await;
    }

    /// Records every payload delivered to one subscription channel.
    fn recording_callback() -> (Arc<Mutex<Vec<Value>>>, SubscriberCallback) {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: SubscriberCallback =
            Box::new(move |value| sink.lock().unwrap().push(value.clone()));
        (seen, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_drains_queued_events_in_order() {
        let (handle, _transport, mut peers, _online) = start(3).await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            let event = cart_event();
            ids.push(event.id.clone());
            handle.send(event).await.unwrap();
        }

        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        wait_for_status(&handle, |status| status.pending_events == 0).await;
        wait_for_frames(&peer, 3).await;

        let sent = peer.sent();
        assert_eq!(sent.len(), 3);
        for (text, id) in sent.iter().zip(&ids) {
            let frame: Value = serde_json::from_str(text).unwrap();
            assert_eq!(frame["id"], json!(id.as_str()));
            assert_eq!(frame["type"], json!("cart"));
            assert_eq!(frame["action"], json!("update"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_open_delivers_immediately() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        handle.send(cart_event()).await.unwrap();
        wait_for_frames(&peer, 1).await;

        assert_eq!(handle.status().await.pending_events, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_queues_event_without_closing() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        peer.break_sends();
        handle.send(cart_event()).await.unwrap();
        wait_for_status(&handle, |status| status.pending_events == 1).await;

        // Send failures are advisory; only the close event may transition.
        assert_eq!(handle.status().await.state, ChannelState::Open);
        assert!(handle.status().await.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_send_never_overtakes_a_queued_event() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        // The first event hits a transient send failure and stays queued.
        peer.break_sends();
        let first = cart_event();
        let first_id = first.id.clone();
        handle.send(first).await.unwrap();
        wait_for_status(&handle, |status| status.pending_events == 1).await;

        // The socket recovers; a later event lines up behind the queued one.
        peer.repair_sends();
        let second = cart_event();
        let second_id = second.id.clone();
        handle.send(second).await.unwrap();
        wait_for_frames(&peer, 2).await;

        let ids: Vec<String> = peer
            .sent()
            .iter()
            .map(|text| {
                let frame: Value = serde_json::from_str(text).unwrap();
                frame["id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids, vec![first_id, second_id]);
        assert_eq!(handle.status().await.pending_events, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_connect_dials_once() {
        let (handle, transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let _peer = peers.recv().await.unwrap();

        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.dials(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_suppresses_reconnect() {
        let (handle, transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        handle.disconnect().await.unwrap();
        peer.close(true);
        wait_for_state(&handle, ChannelState::Disconnected).await;

        // Well past every backoff delay: no automatic redial.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.dials(), 1);

        // An explicit connect still works.
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        assert_eq!(transport.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_triggers_backoff_reconnect() {
        let (handle, transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        peer.close(false);
        wait_for_state(&handle, ChannelState::Disconnected).await;

        // The backoff timer fires and the channel redials on its own.
        let _peer2 = peers.recv().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        assert_eq!(transport.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_budget() {
        let (handle, transport, _peers, _online) = start(2).await;
        transport.refuse_next(3);

        let (exhausted, callback) = recording_callback();
        handle
            .subscribe(LIFECYCLE_RECONNECT_EXHAUSTED, callback)
            .await
            .unwrap();
        let (disconnects, callback) = recording_callback();
        handle
            .subscribe(LIFECYCLE_DISCONNECTED, callback)
            .await
            .unwrap();

        handle.connect().await.unwrap();
        wait_for_status(&handle, |status| status.gave_up).await;
        wait_until(|| exhausted.lock().unwrap().len() == 1).await;

        // Initial dial plus one per budgeted attempt.
        assert_eq!(transport.dials(), 3);
        assert_eq!(handle.status().await.retry_attempts, 2);
        assert_eq!(exhausted.lock().unwrap()[0]["attempts"], json!(2));

        // Every failed handshake surfaced as an unclean disconnect.
        {
            let disconnects = disconnects.lock().unwrap();
            assert_eq!(disconnects.len(), 3);
            assert!(disconnects.iter().all(|p| p["clean"] == json!(false)));
            assert!(disconnects[0]["error"].is_string());
        }

        // Terminal until asked again: no more dials, ever.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.dials(), 3);
        assert_eq!(handle.status().await.state, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_events_do_not_change_state() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        peer.push(ConnEvent::Error(SyncError::WebSocketError(
            "tls hiccup".to_string(),
        )));
        wait_for_status(&handle, |status| status.last_error.is_some()).await;
        assert_eq!(handle.status().await.state, ChannelState::Open);

        // The close event is what completes the transition.
        peer.close(false);
        wait_for_state(&handle, ChannelState::Disconnected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_event_dispatches_and_stamps_last_sync() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        let (seen, callback) = recording_callback();
        handle.subscribe("cartSync", callback).await.unwrap();

        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();
        assert!(handle.status().await.last_sync.is_none());

        peer.push_text(r#"{"type":"cart","action":"update","data":{"items":[]}}"#);
        wait_until(|| seen.lock().unwrap().len() == 1).await;
        assert_eq!(seen.lock().unwrap()[0], json!({"items": []}));
        assert!(handle.status().await.last_sync.is_some());

        // Unknown types and malformed frames are dropped without effect.
        peer.push_text(r#"{"type":"telemetry","data":{}}"#);
        peer.push_text("{not json");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(handle.status().await.state, ChannelState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_ping_answered_with_pong() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        peer.push_text(r#"{"type":"ping"}"#);
        wait_for_frames(&peer, 1).await;
        assert_eq!(peer.sent()[0], r#"{"type":"pong"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_while_open() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        // Default heartbeat is 30s; cover three full periods.
        tokio::time::sleep(Duration::from_secs(95)).await;
        let pings: Vec<String> = peer
            .sent()
            .into_iter()
            .filter(|text| text == r#"{"type":"ping"}"#)
            .collect();
        assert_eq!(pings.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_closing_redials_after_close() {
        let (handle, transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        handle.disconnect().await.unwrap();
        handle.connect().await.unwrap();
        peer.close(true);

        let _peer2 = peers.recv().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        assert_eq!(transport.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_full_sync_emits_one_resync_per_domain() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        handle.force_full_sync(None).await.unwrap();
        wait_for_frames(&peer, 5).await;

        let sent = peer.sent();
        let types: Vec<String> = sent
            .iter()
            .map(|text| {
                let frame: Value = serde_json::from_str(text).unwrap();
                assert_eq!(frame["action"], json!("sync"));
                assert_eq!(frame["originUser"], json!("user-1"));
                frame["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            types,
            vec!["cart", "route", "product_location", "crowdsource", "user_status"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_restored_grants_fresh_budget() {
        let (handle, transport, mut peers, online) = start(1).await;
        transport.refuse_next(2);

        handle.connect().await.unwrap();
        wait_for_status(&handle, |status| status.gave_up).await;
        assert_eq!(transport.dials(), 2);

        online.send(false).unwrap();
        online.send(true).unwrap();

        let _peer = peers.recv().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        assert_eq!(transport.dials(), 3);
        assert!(!handle.status().await.gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting_discards_dial_result() {
        let (handle, transport, _peers, _online) = start(3).await;
        transport.delay_dials(Duration::from_secs(5));

        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Connecting).await;

        handle.disconnect().await.unwrap();
        wait_for_state(&handle, ChannelState::Disconnected).await;

        // The dial resolves after the disconnect; its connection is dropped.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.dials(), 1);
        assert_eq!(handle.status().await.state, ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_events_carry_payloads() {
        let (handle, _transport, mut peers, _online) = start(3).await;
        let (connected, on_connect) = recording_callback();
        let (disconnected, on_disconnect) = recording_callback();
        handle.subscribe(LIFECYCLE_CONNECTED, on_connect).await.unwrap();
        handle
            .subscribe(LIFECYCLE_DISCONNECTED, on_disconnect)
            .await
            .unwrap();

        handle.connect().await.unwrap();
        wait_for_state(&handle, ChannelState::Open).await;
        let peer = peers.recv().await.unwrap();

        wait_until(|| connected.lock().unwrap().len() == 1).await;
        assert_eq!(
            connected.lock().unwrap()[0]["endpoint"],
            json!("ws://localhost:3000/ws")
        );

        peer.close(false);
        wait_until(|| disconnected.lock().unwrap().len() == 1).await;
        assert_eq!(disconnected.lock().unwrap()[0]["clean"], json!(false));
    }
}
