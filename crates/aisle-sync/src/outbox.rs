//! # Mutation Outbox
//!
//! FIFO queue of sync events that could not be sent because the channel was
//! down. Queued events replay in order on the next successful connection.
//!
//! ## Replay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outbox Replay Flow                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Outbox (front ──► back)                      │   │
//! │  │                                                                 │   │
//! │  │   [ cart/update ]  [ route/create ]  [ cart/update ]  ...       │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │  channel open                          │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   drain(sender)                                 │   │
//! │  │                                                                 │   │
//! │  │  1. Peek the front event (never pop first)                      │   │
//! │  │  2. sender.send_event(event).await                              │   │
//! │  │  3. Ok  ──► pop, continue with the next event                   │   │
//! │  │  4. Err ──► stop; failed event and everything behind it stay    │   │
//! │  │            queued for the next pass                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  INVARIANTS:                                                           │
//! │  • Events leave the queue only after their send succeeded              │
//! │  • Relative order is never reshuffled, across any number of passes     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use aisle_core::SyncEvent;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Event Sender Seam
// =============================================================================

/// Destination for a replay pass. The channel manager implements this over
/// its live connection; tests record instead of sending.
#[async_trait]
pub trait EventSender {
    /// Delivers one event. `Ok` means the event is on the wire and may be
    /// dropped from the queue.
    async fn send_event(&mut self, event: &SyncEvent) -> SyncResult<()>;
}

// =============================================================================
// Drain Outcome
// =============================================================================

/// Result of one replay pass over the outbox.
#[derive(Debug)]
pub struct DrainOutcome {
    /// Events sent and removed during this pass.
    pub sent: usize,

    /// Events still queued after this pass.
    pub remaining: usize,

    /// The error that stopped the pass, if it stopped early.
    pub error: Option<SyncError>,
}

impl DrainOutcome {
    /// True when the pass emptied the queue without failures.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0 && self.error.is_none()
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// In-memory FIFO of pending sync events.
///
/// Single-owner by design: the channel manager owns the one instance and is
/// the only code that enqueues or drains, so ordering needs no locking.
#[derive(Debug, Default)]
pub struct Outbox {
    events: VecDeque<SyncEvent>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Outbox {
            events: VecDeque::new(),
        }
    }

    /// Appends an event to the back of the queue. Returns the new queue depth.
    pub fn enqueue(&mut self, event: SyncEvent) -> usize {
        debug!(
            event_id = %event.id,
            domain = %event.domain,
            operation = %event.operation,
            "Queued event for later sync"
        );
        self.events.push_back(event);
        self.events.len()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Discards every queued event. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        if dropped > 0 {
            info!(dropped, "Discarded queued events");
        }
        self.events.clear();
        dropped
    }

    /// Replays queued events through `sender`, front to back.
    ///
    /// An event is removed only after its send returned `Ok`; the first
    /// failure ends the pass with the failed event still at the front.
    pub async fn drain<S>(&mut self, sender: &mut S) -> DrainOutcome
    where
        S: EventSender + Send + ?Sized,
    {
        let mut sent = 0usize;
        let mut error = None;

        while let Some(event) = self.events.front() {
            match sender.send_event(event).await {
                Ok(()) => {
                    debug!(event_id = %event.id, domain = %event.domain, "Replayed queued event");
                    self.events.pop_front();
                    sent += 1;
                }
                Err(err) => {
                    warn!(
                        event_id = %event.id,
                        domain = %event.domain,
                        error = %err,
                        "Replay stopped, event stays queued"
                    );
                    error = Some(err);
                    break;
                }
            }
        }

        if sent > 0 {
            info!(sent, remaining = self.events.len(), "Outbox replay pass finished");
        }

        DrainOutcome {
            sent,
            remaining: self.events.len(),
            error,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aisle_core::{CartSnapshot, SyncOperation, SyncPayload};

    fn cart_event() -> SyncEvent {
        SyncEvent::new(
            SyncOperation::Update,
            SyncPayload::Cart(CartSnapshot { items: vec![] }),
        )
    }

    /// Records delivered event ids; optionally fails the nth call.
    #[derive(Default)]
    struct RecordingSender {
        sent: Vec<String>,
        fail_at: Option<usize>,
        calls: usize,
    }

    #[async_trait]
    impl EventSender for RecordingSender {
        async fn send_event(&mut self, event: &SyncEvent) -> SyncResult<()> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_at == Some(call) {
                return Err(SyncError::Disconnected);
            }
            self.sent.push(event.id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drain_sends_in_fifo_order() {
        let mut outbox = Outbox::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let event = cart_event();
            ids.push(event.id.clone());
            outbox.enqueue(event);
        }

        let mut sender = RecordingSender::default();
        let outcome = outbox.drain(&mut sender).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.sent, 3);
        assert_eq!(sender.sent, ids);
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_keeps_event_and_everything_behind_it() {
        let mut outbox = Outbox::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let event = cart_event();
            ids.push(event.id.clone());
            outbox.enqueue(event);
        }

        // Third send fails; the pass must stop there.
        let mut sender = RecordingSender {
            fail_at: Some(2),
            ..Default::default()
        };
        let outcome = outbox.drain(&mut sender).await;

        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.remaining, 3);
        assert!(matches!(outcome.error, Some(SyncError::Disconnected)));
        assert_eq!(sender.sent, ids[..2].to_vec());

        // The failed event is still at the front, order intact.
        let mut retry = RecordingSender::default();
        let outcome = outbox.drain(&mut retry).await;
        assert!(outcome.is_complete());
        assert_eq!(retry.sent, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_drain_empty_outbox_is_a_no_op() {
        let mut outbox = Outbox::new();
        let mut sender = RecordingSender::default();
        let outcome = outbox.drain(&mut sender).await;
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.remaining, 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut outbox = Outbox::new();
        outbox.enqueue(cart_event());
        outbox.enqueue(cart_event());
        assert_eq!(outbox.len(), 2);

        assert_eq!(outbox.clear(), 2);
        assert!(outbox.is_empty());
        assert_eq!(outbox.clear(), 0);
    }
}
