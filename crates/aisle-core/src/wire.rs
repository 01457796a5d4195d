//! # Wire Protocol
//!
//! JSON frame types for the realtime sync channel.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Channel Frames                               │
//! │                                                                         │
//! │  OUTBOUND EVENTS (client → server)                                     │
//! │  ─────────────────────────────────                                     │
//! │  CLIENT ───► { type: "cart", action: "update", id, domain,             │
//! │               operation, payload, originUser?, createdAt }             │
//! │                                                                         │
//! │  `type` mirrors `domain` and `action` mirrors `operation` so a         │
//! │  primitive consumer can route on the envelope without understanding    │
//! │  the full event model.                                                 │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  CLIENT ───► { "type": "ping" }                                        │
//! │  SERVER ───► { "type": "pong" }        (optional; absence is fine)     │
//! │                                                                         │
//! │  INBOUND EVENTS (server → client)                                      │
//! │  ────────────────────────────────                                      │
//! │  SERVER ───► { type: "route", action: "update", data: {...},           │
//! │               userId?, storeId? }                                      │
//! │  SERVER ───► { type: "notification", data: {...} }                     │
//! │                                                                         │
//! │  Unrecognized `type` values are dropped, never errors: newer           │
//! │  servers may speak frame types this client predates.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decoding Strategy
//! Inbound text decodes in two phases: first into [`RawFrame`] (only `type`
//! is required), then classified into [`InboundFrame`]. A JSON parse failure
//! is an error; an unknown `type` is [`InboundFrame::Unknown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::event::{SyncDomain, SyncEvent, SyncOperation};
use crate::payload::SyncPayload;
use crate::{DEFAULT_WS_PATH, NOTIFICATION_CHANNEL, NOTIFICATION_TYPE};

// =============================================================================
// Outbound Event Frame
// =============================================================================

/// The serialized form of a [`SyncEvent`] on the wire.
///
/// Everything the event carries, plus the mirrored `type`/`action` pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Mirrors `domain`.
    #[serde(rename = "type")]
    pub frame_type: SyncDomain,

    /// Mirrors `operation`.
    pub action: SyncOperation,

    /// Event id (UUID v4).
    pub id: String,

    /// Data domain.
    pub domain: SyncDomain,

    /// Operation on the domain.
    pub operation: SyncOperation,

    /// Typed payload, serialized as the bare domain object.
    pub payload: SyncPayload,

    /// Originating user, omitted when unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_user: Option<String>,

    /// Originating store, omitted when unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_store: Option<String>,

    /// Event creation time (RFC 3339).
    pub created_at: DateTime<Utc>,
}

impl EventFrame {
    /// Builds the frame for an event. The event is cloned, not consumed:
    /// retransmission after a failed send reuses the identical event.
    pub fn from_event(event: &SyncEvent) -> Self {
        EventFrame {
            frame_type: event.domain,
            action: event.operation,
            id: event.id.clone(),
            domain: event.domain,
            operation: event.operation,
            payload: event.payload.clone(),
            origin_user: event.origin_user.clone(),
            origin_store: event.origin_store.clone(),
            created_at: event.created_at,
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Control Frames
// =============================================================================

/// Application-level keepalive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// `{"type":"ping"}`, sent by the client while the channel is open.
    Ping,
    /// `{"type":"pong"}`, the optional server reply.
    Pong,
}

impl ControlFrame {
    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// Phase-one decode of inbound text: only `type` is required, everything
/// else is optional so newer server fields never break decoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub frame_type: String,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub data: Option<serde_json::Value>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub store_id: Option<String>,
}

/// Phase-two classification of an inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Server-initiated keepalive; answered with [`ControlFrame::Pong`].
    Ping,

    /// Reply to a client ping.
    Pong,

    /// A domain event to dispatch to subscribers.
    Event(InboundEvent),

    /// Frame type this client does not recognize. Logged and dropped.
    Unknown { frame_type: String },
}

/// An inbound domain event, ready for subscription dispatch.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Channel the event dispatches to (`cartSync`, `routeSync`, ...).
    pub channel: &'static str,

    /// Server-declared action, passed through untyped.
    pub action: Option<String>,

    /// Domain data, opaque to the channel layer.
    pub data: serde_json::Value,

    /// User the event concerns, when the server scoped it.
    pub user_id: Option<String>,

    /// Store the event concerns, when the server scoped it.
    pub store_id: Option<String>,
}

impl RawFrame {
    /// Classifies a raw frame. Infallible: anything not recognized becomes
    /// [`InboundFrame::Unknown`].
    pub fn classify(self) -> InboundFrame {
        if self.frame_type == "ping" {
            return InboundFrame::Ping;
        }
        if self.frame_type == "pong" {
            return InboundFrame::Pong;
        }
        match channel_for_type(&self.frame_type) {
            Some(channel) => InboundFrame::Event(InboundEvent {
                channel,
                action: self.action,
                data: self.data.unwrap_or(serde_json::Value::Null),
                user_id: self.user_id,
                store_id: self.store_id,
            }),
            None => InboundFrame::Unknown {
                frame_type: self.frame_type,
            },
        }
    }
}

/// Parses inbound channel text into a classified frame.
pub fn parse_inbound(text: &str) -> CoreResult<InboundFrame> {
    let raw: RawFrame = serde_json::from_str(text)?;
    Ok(raw.classify())
}

/// Maps an inbound `type` tag to its dispatch channel.
///
/// Sync domains map through [`SyncDomain::subscription_name`]; the
/// inbound-only `notification` tag has its own channel.
fn channel_for_type(frame_type: &str) -> Option<&'static str> {
    if frame_type == NOTIFICATION_TYPE {
        return Some(NOTIFICATION_CHANNEL);
    }
    frame_type
        .parse::<SyncDomain>()
        .ok()
        .map(|domain| domain.subscription_name())
}

// =============================================================================
// Endpoint Derivation
// =============================================================================

/// Derives the sync endpoint from an application origin.
///
/// `http` origins map to `ws`, `https` to `wss`, host and port are kept and
/// the path becomes [`DEFAULT_WS_PATH`]. Origins already using a WebSocket
/// scheme keep it. An explicitly configured endpoint should be used verbatim
/// instead of calling this.
pub fn derive_ws_endpoint(origin: &str) -> CoreResult<Url> {
    let mut url = Url::parse(origin).map_err(|e| CoreError::InvalidOrigin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::InvalidOrigin {
                origin: origin.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    };
    // Infallible for http(s)/ws(s): all four are "special" schemes to the
    // url crate, and conversion between special schemes is permitted.
    url.set_scheme(scheme)
        .map_err(|_| CoreError::InvalidOrigin {
            origin: origin.to_string(),
            reason: format!("cannot switch scheme to '{}'", scheme),
        })?;

    url.set_path(DEFAULT_WS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// =============================================================================
// Unit Tests
// =============================================================================
