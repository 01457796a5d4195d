//! # Mutation Payloads
//!
//! Typed payloads carried by [`crate::SyncEvent`]s, one shape per sync
//! domain. On the wire a payload serializes as the bare domain object; the
//! surrounding event frame carries the domain tag, so the union itself needs
//! no discriminator field.

use serde::{Deserialize, Serialize};

use crate::event::SyncDomain;

// =============================================================================
// Payload Union
// =============================================================================

/// The payload of a sync event, keyed by domain.
///
/// Constructing an event from a payload fixes the event's domain, which is
/// what makes a cart payload under a route tag unrepresentable.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SyncPayload {
    Cart(CartSnapshot),
    Route(RoutePlan),
    ProductLocation(ProductLocation),
    Crowdsource(CrowdsourceReport),
    UserStatus(UserStatusUpdate),
    /// Empty `{}` payload for full-resync requests. The domain lives out of
    /// band because the wire object itself carries no fields.
    Resync {
        #[serde(skip)]
        domain: SyncDomain,
    },
}

impl SyncPayload {
    /// The domain this payload belongs to.
    pub fn domain(&self) -> SyncDomain {
        match self {
            SyncPayload::Cart(_) => SyncDomain::Cart,
            SyncPayload::Route(_) => SyncDomain::Route,
            SyncPayload::ProductLocation(_) => SyncDomain::ProductLocation,
            SyncPayload::Crowdsource(_) => SyncDomain::Crowdsource,
            SyncPayload::UserStatus(_) => SyncDomain::UserStatus,
            SyncPayload::Resync { domain } => *domain,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// One line in the shopping cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product identifier.
    pub product_id: String,

    /// Display name snapshot at time of adding.
    pub name: String,

    /// Requested quantity.
    pub quantity: u32,

    /// Aisle hint for route planning, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aisle: Option<String>,

    /// Whether the shopper has picked this item up.
    #[serde(default)]
    pub collected: bool,
}

impl CartItem {
    pub fn new(product_id: &str, name: &str, quantity: u32) -> Self {
        CartItem {
            product_id: product_id.to_string(),
            name: name.to_string(),
            quantity,
            aisle: None,
            collected: false,
        }
    }
}

/// The full cart contents. Cart sync sends snapshots, not diffs, so a lost
/// frame never leaves the server with a partial cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
}

// =============================================================================
// Route
// =============================================================================

/// One stop on a generated in-store route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    /// Product to pick up at this stop.
    pub product_id: String,

    /// Aisle the stop is in.
    pub aisle: String,

    /// Visit order, starting at 0 from the entrance.
    pub position: u32,
}

/// A generated navigation route through one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    /// Store the route was planned for.
    pub store_id: String,

    /// Stops in walking order.
    pub stops: Vec<RouteStop>,

    /// Estimated walking distance, when the planner computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_meters: Option<u32>,
}

// =============================================================================
// Product Location
// =============================================================================

/// Where a product sits inside a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLocation {
    /// Product identifier.
    pub product_id: String,

    /// Store this placement belongs to.
    pub store_id: String,

    /// Aisle label as printed in the store ("12", "Produce").
    pub aisle: String,

    /// Section within the aisle, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Shelf level within the section, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf: Option<String>,
}

// =============================================================================
// Crowdsource
// =============================================================================

/// A shopper-submitted observation about a product.
///
/// Any subset of the optional facts may be present; the server merges them
/// into its confidence model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdsourceReport {
    /// Product the report is about.
    pub product_id: String,

    /// Corrected aisle, if the shopper reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aisle: Option<String>,

    /// Corrected section, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Observed stock state, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,

    /// Observed shelf price in cents, if reported. Integer cents, never
    /// floating point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
}

// =============================================================================
// User Status
// =============================================================================

/// Shopper presence states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopperPresence {
    /// Browsing the app outside a store.
    Browsing,
    /// Actively shopping a route in a store.
    Shopping,
    /// Finished and checked out.
    CheckedOut,
    /// App backgrounded or connectivity lost.
    Offline,
}

/// A change to the shopper's presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdate {
    pub presence: ShopperPresence,

    /// Store the shopper is in, when presence implies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_domain_mapping() {
        let cart = SyncPayload::Cart(CartSnapshot { items: vec![] });
        assert_eq!(cart.domain(), SyncDomain::Cart);

        let resync = SyncPayload::Resync {
            domain: SyncDomain::Crowdsource,
        };
        assert_eq!(resync.domain(), SyncDomain::Crowdsource);
    }

    #[test]
    fn test_payload_serializes_bare() {
        // The union adds no discriminator of its own.
        let payload = SyncPayload::UserStatus(UserStatusUpdate {
            presence: ShopperPresence::Shopping,
            store_id: Some("store-3".to_string()),
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"presence":"shopping","storeId":"store-3"}"#);
    }

    #[test]
    fn test_resync_serializes_empty() {
        let payload = SyncPayload::Resync {
            domain: SyncDomain::Cart,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_cart_item_camel_case() {
        let item = CartItem::new("prod-7", "Rye bread", 1);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"productId\":\"prod-7\""));
        assert!(json.contains("\"collected\":false"));
        assert!(!json.contains("aisle"));
    }

    #[test]
    fn test_crowdsource_partial_report() {
        let report = CrowdsourceReport {
            product_id: "prod-12".to_string(),
            aisle: Some("7".to_string()),
            section: None,
            in_stock: Some(false),
            price_cents: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"inStock\":false"));
        assert!(!json.contains("priceCents"));
    }
}
