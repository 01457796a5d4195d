//! # Subscription Table
//!
//! Fans inbound payloads out to per-channel subscriber callbacks.
//!
//! ## Channels
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Subscription Channels                             │
//! │                                                                         │
//! │  DOMAIN CHANNELS (inbound frames)                                      │
//! │  ────────────────────────────────                                      │
//! │  cartSync, routeSync, productLocationSync, crowdsourceSync,            │
//! │  userStatusSync, notificationSync                                      │
//! │                                                                         │
//! │  LIFECYCLE CHANNELS (channel manager)                                  │
//! │  ────────────────────────────────────                                  │
//! │  connected, disconnected, error, reconnectExhausted                    │
//! │                                                                         │
//! │  DELIVERY RULES:                                                       │
//! │  • Callbacks fire in subscription order within a channel               │
//! │  • A panicking callback is logged and skipped; the rest still run      │
//! │  • No subscribers is not an error                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, warn};

// =============================================================================
// Lifecycle Channel Names
// =============================================================================

/// Fired after the channel reaches open and the outbox replay has started.
pub const LIFECYCLE_CONNECTED: &str = "connected";

/// Fired whenever the channel leaves open.
pub const LIFECYCLE_DISCONNECTED: &str = "disconnected";

/// Fired for advisory socket errors; carries the error text.
pub const LIFECYCLE_ERROR: &str = "error";

/// Fired once the reconnect budget is spent; carries the attempt count.
pub const LIFECYCLE_RECONNECT_EXHAUSTED: &str = "reconnectExhausted";

// =============================================================================
// Subscription Table
// =============================================================================

/// Opaque handle to one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with the payload of each delivery on its channel.
pub type SubscriberCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// Insertion-ordered callback lists, one per channel name.
#[derive(Default)]
pub struct SubscriptionTable {
    channels: HashMap<String, Vec<(SubscriptionId, SubscriberCallback)>>,
    next_id: u64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        SubscriptionTable {
            channels: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a callback on `channel` and returns its id.
    pub fn subscribe(&mut self, channel: &str, callback: SubscriberCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push((id, callback));
        debug!(channel = %channel, subscription = id.0, "Subscribed");
        id
    }

    /// Removes a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subscribers in self.channels.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|(sub_id, _)| *sub_id != id);
            if subscribers.len() < before {
                debug!(subscription = id.0, "Unsubscribed");
                return true;
            }
        }
        false
    }

    /// Number of subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Delivers `payload` to every subscriber of `channel`, in subscription
    /// order. Returns how many callbacks ran to completion.
    ///
    /// A panic inside one callback never reaches the caller and never stops
    /// delivery to the callbacks after it.
    pub fn notify(&self, channel: &str, payload: &Value) -> usize {
        let Some(subscribers) = self.channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0usize;
        for (id, callback) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        channel = %channel,
                        subscription = id.0,
                        "Subscriber callback panicked; continuing with the rest"
                    );
                }
            }
        }
        delivered
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_fire_in_subscription_order() {
        let mut table = SubscriptionTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = log.clone();
            table.subscribe(
                "cartSync",
                Box::new(move |_payload| log.lock().unwrap().push(n)),
            );
        }

        let delivered = table.notify("cartSync", &json!({"items": []}));
        assert_eq!(delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_the_rest() {
        let mut table = SubscriptionTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let log = log.clone();
            table.subscribe(
                "routeSync",
                Box::new(move |_payload| log.lock().unwrap().push("first")),
            );
        }
        table.subscribe(
            "routeSync",
            Box::new(|_payload| panic!("subscriber bug")),
        );
        {
            let log = log.clone();
            table.subscribe(
                "routeSync",
                Box::new(move |_payload| log.lock().unwrap().push("third")),
            );
        }

        let delivered = table.notify("routeSync", &json!({}));
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut table = SubscriptionTable::new();
        let log = Arc::new(Mutex::new(0usize));

        let id = {
            let log = log.clone();
            table.subscribe(
                "userStatusSync",
                Box::new(move |_payload| *log.lock().unwrap() += 1),
            )
        };

        table.notify("userStatusSync", &json!({}));
        assert!(table.unsubscribe(id));
        table.notify("userStatusSync", &json!({}));

        assert_eq!(*log.lock().unwrap(), 1);
        assert!(!table.unsubscribe(id));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut table = SubscriptionTable::new();
        table.subscribe("cartSync", Box::new(|_| {}));
        table.subscribe("cartSync", Box::new(|_| {}));
        table.subscribe(LIFECYCLE_CONNECTED, Box::new(|_| {}));

        assert_eq!(table.subscriber_count("cartSync"), 2);
        assert_eq!(table.subscriber_count(LIFECYCLE_CONNECTED), 1);
        assert_eq!(table.subscriber_count("crowdsourceSync"), 0);
        assert_eq!(table.notify("crowdsourceSync", &json!({})), 0);
    }
}
