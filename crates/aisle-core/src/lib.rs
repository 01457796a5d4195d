//! # aisle-core: Pure Sync Domain Types for Aisle
//!
//! This crate is the shared vocabulary of the Aisle sync layer. It defines
//! the sync event model and the wire protocol as pure types with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Aisle Sync Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Application Code                             │   │
//! │  │    Cart updates ──► Route plans ──► Crowdsource reports        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ SyncClient facade                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    aisle-sync (channel + outbox)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ aisle-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   event   │  │  payload  │  │   wire    │  │   error   │  │   │
//! │  │   │ SyncEvent │  │ CartItem  │  │EventFrame │  │ CoreError │  │   │
//! │  │   │  Domain   │  │ RoutePlan │  │ RawFrame  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO TIMERS • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`event`] - Sync event model (domain, operation, immutable events)
//! - [`payload`] - Typed mutation payloads (cart, route, location, ...)
//! - [`wire`] - JSON wire frames and endpoint derivation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Immutable Events**: a [`SyncEvent`] never changes after construction;
//!    retransmission serializes the identical event
//! 2. **No I/O**: network, file system and timer access is FORBIDDEN here
//! 3. **Forward-Compatible Decoding**: inbound frames with unrecognized
//!    `type` values decode to [`wire::InboundFrame::Unknown`], never to errors
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use aisle_core::{SyncEvent, SyncOperation, SyncPayload, CartSnapshot, CartItem};
//!
//! let payload = SyncPayload::Cart(CartSnapshot {
//!     items: vec![CartItem::new("prod-42", "Oat milk", 2)],
//! });
//! let event = SyncEvent::new(SyncOperation::Update, payload);
//!
//! // The event domain is derived from the payload, so they can never disagree
//! assert_eq!(event.domain.subscription_name(), "cartSync");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod payload;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use aisle_core::SyncEvent` instead of
// `use aisle_core::event::SyncEvent`

pub use error::{CoreError, CoreResult};
pub use event::{SyncDomain, SyncEvent, SyncOperation};
pub use payload::*;
pub use wire::{derive_ws_endpoint, parse_inbound, ControlFrame, EventFrame, InboundEvent, InboundFrame};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default WebSocket path on the sync server.
///
/// ## Why a constant?
/// When no explicit endpoint is configured, the client derives the sync
/// endpoint from the application origin by swapping the scheme and appending
/// this path. Servers that mount the socket elsewhere are reached via the
/// explicit endpoint override instead.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Inbound-only frame type for server-pushed notifications.
///
/// ## Why a constant?
/// Notifications are never produced by this client, so they have no
/// [`SyncDomain`] variant. They still dispatch to a named channel like every
/// other inbound domain.
pub const NOTIFICATION_TYPE: &str = "notification";

/// Subscription channel that receives server-pushed notifications.
pub const NOTIFICATION_CHANNEL: &str = "notificationSync";
