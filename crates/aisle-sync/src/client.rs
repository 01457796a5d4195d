//! # Sync Client
//!
//! The facade application code talks to. Wraps the channel manager behind a
//! small API whose mutation methods accept the data, stamp identity and hand
//! the event to the channel; a dead network never surfaces as an error from
//! them, only as a growing pending count.
//!
//! ## Facade Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           SyncClient                                    │
//! │                                                                         │
//! │  MUTATIONS (never return errors)       LIFECYCLE                        │
//! │  ─────────────────────────────────     ─────────────────────────────    │
//! │  sync_cart_update(items, user)         connect() / disconnect()         │
//! │  sync_route_generated(route, ...)      shutdown()                       │
//! │  sync_product_location(loc, ...)       set_online(bool)                 │
//! │  sync_crowdsource_update(report, ...)                                   │
//! │  sync_user_status(status, ...)         OBSERVATION                      │
//! │  force_full_sync(user)                 ─────────────────────────────    │
//! │  discard_pending()                     is_connected() / status()        │
//! │                                        subscribe() / unsubscribe()      │
//! │                                                                         │
//! │  Identity: every mutation takes optional user/store ids; `None` falls   │
//! │  back to the configured identity.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use aisle_core::{
    CartItem, CartSnapshot, CrowdsourceReport, ProductLocation, RoutePlan, SyncEvent,
    SyncOperation, SyncPayload, UserStatusUpdate,
};

use crate::channel::{ChannelHandle, ChannelManager, ChannelState};
use crate::config::{IdentitySettings, SyncConfig};
use crate::error::SyncResult;
use crate::subscriptions::{SubscriberCallback, SubscriptionId};
use crate::transport::{Transport, WsTransport};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Current channel state.
    pub state: ChannelState,

    /// Whether the channel is open right now.
    pub connected: bool,

    /// When an inbound event was last dispatched.
    pub last_sync: Option<DateTime<Utc>>,

    /// Operations queued for replay.
    pub pending_ops: usize,

    /// Reconnect attempts consumed since the last successful open.
    pub retry_count: u32,

    /// Last connection or send error.
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            state: ChannelState::Disconnected,
            connected: false,
            last_sync: None,
            pending_ops: 0,
            retry_count: 0,
            last_error: None,
        }
    }
}

// =============================================================================
// Sync Client
// =============================================================================

/// Application-facing sync client.
///
/// Construct one per app instance with [`SyncClient::start`], call
/// [`connect`](SyncClient::connect) once the user is signed in, and hand it
/// mutations as they happen. Dropping the client stops the channel manager.
pub struct SyncClient {
    identity: IdentitySettings,
    channel: ChannelHandle,
    online_tx: watch::Sender<bool>,
}

impl SyncClient {
    /// Validates the config and starts the channel manager over the real
    /// WebSocket transport. The channel stays down until `connect()`.
    pub fn start(config: SyncConfig) -> SyncResult<Self> {
        let transport = Arc::new(WsTransport::new(config.connect_timeout()));
        Self::start_with_transport(config, transport)
    }

    /// Starts the client over a caller-supplied transport.
    pub fn start_with_transport(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let (online_tx, online_rx) = watch::channel(true);
        let channel = ChannelManager::spawn(&config, transport, online_rx)?;

        info!("Sync client started");
        Ok(SyncClient {
            identity: config.identity.clone(),
            channel,
            online_tx,
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Opens the realtime channel (or grants a fresh reconnect budget).
    pub async fn connect(&self) {
        if let Err(err) = self.channel.connect().await {
            warn!(error = %err, "Connect request not delivered");
        }
    }

    /// Closes the channel and suppresses reconnection until `connect()`.
    pub async fn disconnect(&self) {
        if let Err(err) = self.channel.disconnect().await {
            warn!(error = %err, "Disconnect request not delivered");
        }
    }

    /// Stops the channel manager. Queued events are lost.
    pub async fn shutdown(&self) {
        if let Err(err) = self.channel.shutdown().await {
            warn!(error = %err, "Shutdown request not delivered");
        }
    }

    /// Feeds the platform online/offline signal to the channel. A transition
    /// to online while disconnected triggers an immediate redial.
    pub fn set_online(&self, online: bool) {
        let _ = self.online_tx.send(online);
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------
    // None of these return errors: while the channel is down the event is
    // queued and replayed later, and that is the success path.

    /// Syncs the current cart contents.
    pub async fn sync_cart_update(&self, items: Vec<CartItem>, user_id: Option<String>) {
        let event = self.event(
            SyncOperation::Update,
            SyncPayload::Cart(CartSnapshot { items }),
            user_id,
            None,
        );
        self.submit(event).await;
    }

    /// Syncs a freshly generated shopping route.
    pub async fn sync_route_generated(
        &self,
        route: RoutePlan,
        user_id: Option<String>,
        store_id: Option<String>,
    ) {
        let event = self.event(
            SyncOperation::Create,
            SyncPayload::Route(route),
            user_id,
            store_id,
        );
        self.submit(event).await;
    }

    /// Syncs an updated product location.
    pub async fn sync_product_location(
        &self,
        location: ProductLocation,
        store_id: Option<String>,
        user_id: Option<String>,
    ) {
        let event = self.event(
            SyncOperation::Update,
            SyncPayload::ProductLocation(location),
            user_id,
            store_id,
        );
        self.submit(event).await;
    }

    /// Syncs a crowdsourced report (stock level, price check, ...).
    pub async fn sync_crowdsource_update(
        &self,
        report: CrowdsourceReport,
        store_id: Option<String>,
        user_id: Option<String>,
    ) {
        let event = self.event(
            SyncOperation::Create,
            SyncPayload::Crowdsource(report),
            user_id,
            store_id,
        );
        self.submit(event).await;
    }

    /// Syncs the shopper's presence/status.
    pub async fn sync_user_status(
        &self,
        status: UserStatusUpdate,
        user_id: Option<String>,
        store_id: Option<String>,
    ) {
        let event = self.event(
            SyncOperation::Update,
            SyncPayload::UserStatus(status),
            user_id,
            store_id,
        );
        self.submit(event).await;
    }

    /// Requests fresh server state for every domain.
    pub async fn force_full_sync(&self, user_id: Option<String>) {
        let user = user_id.or_else(|| self.identity.user_id.clone());
        if let Err(err) = self.channel.force_full_sync(user).await {
            warn!(error = %err, "Full sync request not delivered");
        }
    }

    /// Drops every queued event. Returns how many were discarded.
    pub async fn discard_pending(&self) -> usize {
        match self.channel.discard_pending().await {
            Ok(dropped) => dropped,
            Err(err) => {
                warn!(error = %err, "Discard request not delivered");
                0
            }
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Registers a callback for a domain channel (`cartSync`, ...) or a
    /// lifecycle channel (`connected`, `disconnected`, ...).
    pub async fn subscribe(
        &self,
        channel: &str,
        callback: SubscriberCallback,
    ) -> SyncResult<SubscriptionId> {
        self.channel.subscribe(channel, callback).await
    }

    /// Removes a subscription. Returns false when the id was not found.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<bool> {
        self.channel.unsubscribe(id).await
    }

    /// True while the realtime channel is open.
    pub async fn is_connected(&self) -> bool {
        self.channel.is_connected().await
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        let channel = self.channel.status().await;
        SyncStatus {
            state: channel.state,
            connected: channel.state == ChannelState::Open,
            last_sync: channel.last_sync,
            pending_ops: channel.pending_events,
            retry_count: channel.retry_attempts,
            last_error: channel.last_error,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Builds an event with the caller's identity, falling back to the
    /// configured defaults.
    fn event(
        &self,
        operation: SyncOperation,
        payload: SyncPayload,
        user_id: Option<String>,
        store_id: Option<String>,
    ) -> SyncEvent {
        SyncEvent::with_origin(
            operation,
            payload,
            user_id.or_else(|| self.identity.user_id.clone()),
            store_id.or_else(|| self.identity.store_id.clone()),
        )
    }

    async fn submit(&self, event: SyncEvent) {
        if let Err(err) = self.channel.send(event).await {
            warn!(error = %err, "Sync event not delivered to the channel");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
