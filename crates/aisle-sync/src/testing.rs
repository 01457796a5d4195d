//! Test doubles for the sync channel.
//!
//! [`ScriptedTransport`] stands in for the WebSocket transport: tests decide
//! whether each dial is accepted or refused, and every accepted dial hands
//! the test a [`ScriptedPeer`] for driving the server side of the connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::transport::{ConnEvent, Connection, FrameSink, FrameSource, Transport};

/// Server side of one accepted dial.
pub struct ScriptedPeer {
    sent: Arc<Mutex<Vec<String>>>,
    events_tx: mpsc::UnboundedSender<ConnEvent>,
    fail_sends: Arc<AtomicBool>,
}

impl ScriptedPeer {
    /// Frames the client has sent on this connection so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes every later client send fail as if the socket dropped.
    pub fn break_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Lets sends succeed again after [`ScriptedPeer::break_sends`].
    pub fn repair_sends(&self) {
        self.fail_sends.store(false, Ordering::SeqCst);
    }

    /// Delivers an event to the client's reader.
    pub fn push(&self, event: ConnEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Delivers a text frame to the client's reader.
    pub fn push_text(&self, text: &str) {
        self.push(ConnEvent::Frame(text.to_string()));
    }

    /// Closes the connection from the server side.
    pub fn close(&self, clean: bool) {
        self.push(ConnEvent::Closed { clean });
    }
}

/// Transport whose dials follow a script. Dials are accepted unless the test
/// queued a refusal; accepted dials emit a [`ScriptedPeer`] on the receiver
/// returned from [`ScriptedTransport::new`].
pub struct ScriptedTransport {
    // true = refuse that dial
    plan: Mutex<VecDeque<bool>>,
    peers_tx: mpsc::UnboundedSender<ScriptedPeer>,
    dials: AtomicUsize,
    dial_delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(ScriptedTransport {
            plan: Mutex::new(VecDeque::new()),
            peers_tx,
            dials: AtomicUsize::new(0),
            dial_delay: Mutex::new(None),
        });
        (transport, peers_rx)
    }

    /// Refuses the next `n` dials.
    pub fn refuse_next(&self, n: usize) {
        let mut plan = self.plan.lock().unwrap();
        for _ in 0..n {
            plan.push_back(true);
        }
    }

    /// Makes every later dial stall for `delay` before resolving, leaving
    /// the channel sitting in `connecting`.
    pub fn delay_dials(&self, delay: Duration) {
        *self.dial_delay.lock().unwrap() = Some(delay);
    }

    /// Total dial attempts seen so far.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, _url: &Url) -> SyncResult<Connection> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let delay = *self.dial_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let refuse = self.plan.lock().unwrap().pop_front().unwrap_or(false);
        if refuse {
            return Err(SyncError::ConnectionFailed("scripted refusal".to_string()));
        }

        let sent = Arc::new(Mutex::new(Vec::new()));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let peer = ScriptedPeer {
            sent: sent.clone(),
            events_tx,
            fail_sends: fail_sends.clone(),
        };
        let _ = self.peers_tx.send(peer);

        Ok(Connection {
            sink: Box::new(ScriptedSink { sent, fail_sends }),
            source: Box::new(ScriptedSource { events_rx }),
        })
    }
}

struct ScriptedSink {
    sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn send(&mut self, text: String) -> SyncResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SyncError::Disconnected);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {}
}

struct ScriptedSource {
    events_rx: mpsc::UnboundedReceiver<ConnEvent>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next(&mut self) -> ConnEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            // Peer dropped without an explicit close.
            None => ConnEvent::Closed { clean: false },
        }
    }
}
