//! # Sync Event Model
//!
//! The event types that flow through the outbox and over the realtime
//! channel.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Event Model                               │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SyncEvent     │   │   SyncDomain    │   │  SyncOperation  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  Cart           │   │  Create         │       │
//! │  │  domain         │   │  Route          │   │  Update         │       │
//! │  │  operation      │   │  ProductLocation│   │  Delete         │       │
//! │  │  payload        │   │  Crowdsource    │   │  Sync           │       │
//! │  │  origin_user    │   │  UserStatus     │   └─────────────────┘       │
//! │  │  origin_store   │   └─────────────────┘                             │
//! │  │  created_at     │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Immutability
//! A `SyncEvent` is frozen at construction: there is no mutating API, the id
//! is minted exactly once, and a retransmission after a failed send
//! serializes the identical event. The event's `domain` is derived from its
//! payload, so the two can never disagree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::payload::SyncPayload;

// =============================================================================
// Sync Domain
// =============================================================================

/// The data domains that participate in sync.
///
/// The serialized form (`cart`, `product_location`, ...) is the literal
/// domain tag on the wire; [`SyncDomain::subscription_name`] gives the
/// channel inbound events dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    /// Shopping cart contents.
    Cart,
    /// Generated in-store navigation routes.
    Route,
    /// Where a product sits inside a store (aisle/section/shelf).
    ProductLocation,
    /// Shopper-submitted corrections and observations.
    Crowdsource,
    /// Shopper presence and activity.
    UserStatus,
}

impl SyncDomain {
    /// All domains, in the order full-resync events are emitted.
    pub const ALL: [SyncDomain; 5] = [
        SyncDomain::Cart,
        SyncDomain::Route,
        SyncDomain::ProductLocation,
        SyncDomain::Crowdsource,
        SyncDomain::UserStatus,
    ];

    /// The wire tag for this domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDomain::Cart => "cart",
            SyncDomain::Route => "route",
            SyncDomain::ProductLocation => "product_location",
            SyncDomain::Crowdsource => "crowdsource",
            SyncDomain::UserStatus => "user_status",
        }
    }

    /// The subscription channel inbound events for this domain dispatch to.
    pub fn subscription_name(&self) -> &'static str {
        match self {
            SyncDomain::Cart => "cartSync",
            SyncDomain::Route => "routeSync",
            SyncDomain::ProductLocation => "productLocationSync",
            SyncDomain::Crowdsource => "crowdsourceSync",
            SyncDomain::UserStatus => "userStatusSync",
        }
    }
}

impl fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncDomain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(SyncDomain::Cart),
            "route" => Ok(SyncDomain::Route),
            "product_location" => Ok(SyncDomain::ProductLocation),
            "crowdsource" => Ok(SyncDomain::Crowdsource),
            "user_status" => Ok(SyncDomain::UserStatus),
            other => Err(CoreError::UnknownDomain(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Operation
// =============================================================================

/// What a sync event does to its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// A new entity came into existence (route generated, report filed).
    Create,
    /// Existing state was revised (cart changed, status moved).
    Update,
    /// An entity was removed.
    Delete,
    /// Request a full re-send of the domain's state.
    Sync,
}

impl SyncOperation {
    /// The wire tag for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
            SyncOperation::Sync => "sync",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncOperation::Create),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            "sync" => Ok(SyncOperation::Sync),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Event
// =============================================================================

/// A single pending mutation, frozen at creation.
///
/// Events are minted by the facade, queued in the outbox, and serialized
/// into [`crate::wire::EventFrame`]s when the channel sends them. Fields are
/// public for reading; nothing mutates an event after `new` returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Unique identifier (UUID v4), minted once at construction.
    pub id: String,

    /// Data domain, derived from the payload.
    pub domain: SyncDomain,

    /// What this event does to the domain.
    pub operation: SyncOperation,

    /// The typed mutation payload.
    pub payload: SyncPayload,

    /// User the mutation belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_user: Option<String>,

    /// Store the mutation belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_store: Option<String>,

    /// When the event was created (client clock, UTC).
    pub created_at: DateTime<Utc>,
}

impl SyncEvent {
    /// Creates an event with no origin correlation.
    pub fn new(operation: SyncOperation, payload: SyncPayload) -> Self {
        Self::with_origin(operation, payload, None, None)
    }

    /// Creates an event carrying origin user/store correlation ids.
    pub fn with_origin(
        operation: SyncOperation,
        payload: SyncPayload,
        origin_user: Option<String>,
        origin_store: Option<String>,
    ) -> Self {
        SyncEvent {
            id: Uuid::new_v4().to_string(),
            domain: payload.domain(),
            operation,
            payload,
            origin_user,
            origin_store,
            created_at: Utc::now(),
        }
    }

    /// Creates the full-resync request event for one domain.
    ///
    /// `force_full_sync` emits one of these per [`SyncDomain::ALL`] entry.
    pub fn resync(domain: SyncDomain, origin_user: Option<String>) -> Self {
        Self::with_origin(
            SyncOperation::Sync,
            SyncPayload::Resync { domain },
            origin_user,
            None,
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
