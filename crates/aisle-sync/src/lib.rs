//! # aisle-sync: Realtime Sync Engine for Aisle
//!
//! This crate keeps a shopper's state flowing between device and server over
//! a WebSocket channel, and keeps mutations safe in an outbox while the
//! network is away.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Client Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   SyncClient (Application Facade)                │  │
//! │  │                                                                  │  │
//! │  │  sync_cart_update / sync_route_generated / sync_product_location │  │
//! │  │  sync_crowdsource_update / sync_user_status / force_full_sync    │  │
//! │  │  Mutations never fail: a dead network only grows the outbox      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ ChannelHandle (commands)                │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                  ChannelManager (actor task)                     │  │
//! │  │                                                                  │  │
//! │  │  disconnected ─► connecting ─► open ─► closing lifecycle         │  │
//! │  │  Exponential backoff with a bounded budget, then give-up         │  │
//! │  │  Heartbeat pings while open, outbox replay on every open         │  │
//! │  │  Inbound frames dispatched to subscribers by domain channel      │  │
//! │  └──────┬──────────────────┬──────────────────┬─────────────────────┘  │
//! │         ▼                  ▼                  ▼                         │
//! │  ┌────────────────┐ ┌────────────────┐ ┌────────────────────────┐     │
//! │  │     Outbox     │ │   Transport    │ │   SubscriptionTable    │     │
//! │  │                │ │                │ │                        │     │
//! │  │ FIFO of events │ │ WebSocket via  │ │ cartSync / routeSync / │     │
//! │  │ sent-then-pop, │ │ a trait seam,  │ │ productLocationSync /  │     │
//! │  │ order is never │ │ swappable in   │ │ crowdsourceSync / ...  │     │
//! │  │ reshuffled     │ │ tests          │ │ + lifecycle channels   │     │
//! │  └────────────────┘ └────────────────┘ └────────────────────────┘     │
//! │                                                                         │
//! │  LIFECYCLE CHANNELS (subscribe like any domain):                       │
//! │  • "connected"           - channel opened, carries the endpoint        │
//! │  • "disconnected"        - channel closed, carries the clean flag      │
//! │  • "error"               - advisory socket errors                      │
//! │  • "reconnectExhausted"  - reconnect budget spent                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - `SyncClient` application facade
//! - [`channel`] - Channel manager actor (state machine, reconnect, dispatch)
//! - [`outbox`] - FIFO replay queue for offline mutations
//! - [`transport`] - WebSocket transport behind trait seams
//! - [`backoff`] - Reconnect delay policy with a bounded attempt budget
//! - [`subscriptions`] - Callback registry with per-subscriber panic isolation
//! - [`config`] - TOML config, env overrides, endpoint derivation
//! - [`error`] - Sync error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aisle_sync::{SyncClient, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let client = SyncClient::start(config)?;
//! client.connect().await;
//!
//! client.sync_cart_update(items, None).await;
//!
//! let status = client.status().await;
//! println!("connected: {}, pending: {}", status.connected, status.pending_ops);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod outbox;
pub mod subscriptions;
pub mod transport;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

// Facade
pub use client::{SyncClient, SyncStatus};
pub use config::{ChannelSettings, EndpointSettings, IdentitySettings, SyncConfig};
pub use error::{SyncError, SyncResult};

// Channel layer
pub use channel::{ChannelHandle, ChannelManager, ChannelState, ChannelStatus};
pub use outbox::{DrainOutcome, EventSender, Outbox};
pub use subscriptions::{
    SubscriberCallback, SubscriptionId, SubscriptionTable, LIFECYCLE_CONNECTED,
    LIFECYCLE_DISCONNECTED, LIFECYCLE_ERROR, LIFECYCLE_RECONNECT_EXHAUSTED,
};

// Transport seam
pub use backoff::ReconnectPolicy;
pub use transport::{ConnEvent, Connection, FrameSink, FrameSource, Transport, WsTransport};
