//! # Reconnect Policy
//!
//! Decides how long to wait before each reconnection attempt, and when to
//! stop trying altogether.
//!
//! ## Backoff Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Exponential Backoff (deterministic, no jitter)             │
//! │                                                                         │
//! │  Attempt 1: floor           (e.g. 1s)                                   │
//! │  Attempt 2: floor × 2       (2s)                                        │
//! │  Attempt 3: floor × 4       (4s)                                        │
//! │  ...                                                                    │
//! │  Attempt n: ceiling         (e.g. 30s, never exceeded)                  │
//! │                                                                         │
//! │  After max_attempts the policy yields None: the channel gives up and    │
//! │  stays down until an explicit connect() or a connectivity-restored      │
//! │  signal.                                                                │
//! │                                                                         │
//! │  A successful open resets the schedule to the floor.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Attempt-counting wrapper around an exponential backoff schedule.
#[derive(Debug)]
pub struct ReconnectPolicy {
    backoff: ExponentialBackoff,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy that starts at `floor`, doubles per attempt, and
    /// caps at `ceiling`. `max_attempts == 0` means never give up.
    pub fn new(floor: Duration, ceiling: Duration, max_attempts: u32) -> Self {
        ReconnectPolicy {
            backoff: Self::schedule(floor, ceiling),
            max_attempts,
            attempts: 0,
        }
    }

    fn schedule(floor: Duration, ceiling: Duration) -> ExponentialBackoff {
        ExponentialBackoff {
            // Both intervals are set so the first delay is exactly the floor.
            current_interval: floor,
            initial_interval: floor,
            // No jitter: delays are reproducible across runs and in tests.
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: ceiling,
            // The attempt counter is the only give-up condition.
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay to wait before the next attempt, or `None` once the attempt
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.backoff.next_backoff()
    }

    /// Attempts consumed since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once the budget is spent and `next_delay` will return `None`.
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.attempts >= self.max_attempts
    }

    /// Restores the schedule to the floor and clears the attempt counter.
    /// Called after every successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_the_ceiling() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            0,
        );

        let delays: Vec<u128> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 8000]);
    }

    #[test]
    fn test_reset_restores_the_floor() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            0,
        );
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempts(), 2);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay().unwrap().as_millis(), 1000);
    }

    #[test]
    fn test_budget_exhaustion_yields_none() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            3,
        );

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.is_exhausted());
        assert!(policy.next_delay().is_none());

        // Reset hands back the full budget.
        policy.reset();
        assert!(!policy.is_exhausted());
        assert!(policy.next_delay().is_some());
    }

    #[test]
    fn test_zero_max_attempts_never_gives_up() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            0,
        );
        for _ in 0..20 {
            assert!(policy.next_delay().is_some());
        }
        assert!(!policy.is_exhausted());
    }
}
