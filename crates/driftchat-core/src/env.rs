//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the session state machines from system
//! resources (wall-clock time and randomness). This enables:
//!
//! - Deterministic Simulation: the harness provides a manually advanced clock
//!   and a seeded RNG, so every matchmaking race replays exactly.
//!
//! - Production Runtime: the runtime crate reads the system clock and OS
//!   entropy without any change to the orchestration logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use crate::types::Timestamp;

/// Abstract environment providing time and randomness.
///
/// Nothing in the core blocks or sleeps. Delays are expressed by scheduling
/// timers on a [`Clock`](crate::timer::Clock) and are driven by
/// `Tick { now }` events whose `now` comes from this trait.
pub trait Environment: Clone + 'static {
    /// Returns the current wall-clock time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return times >= previous calls.
    fn now(&self) -> Timestamp;

    /// Fills the provided buffer with random bytes.
    ///
    /// Simulation implementations MUST be seeded and log the seed so a failing
    /// run can be reproduced.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Draws a value uniformly-ish from the inclusive range `[low, high]`.
    ///
    /// Returns `low` when the range is empty or inverted. Modulo bias is
    /// irrelevant for latency jitter and canned-reply selection.
    fn random_range(&self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        let span = high - low;
        match span.checked_add(1) {
            Some(width) => low + self.random_u64() % width,
            None => self.random_u64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[derive(Clone)]
    struct CountingEnv {
        counter: Rc<Cell<u8>>,
    }

    impl Environment for CountingEnv {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(0)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for byte in buffer.iter_mut() {
                *byte = self.counter.get();
                self.counter.set(self.counter.get().wrapping_add(1));
            }
        }
    }

    #[test]
    fn random_range_stays_in_bounds() {
        let env = CountingEnv { counter: Rc::new(Cell::new(0)) };
        for _ in 0..64 {
            let value = env.random_range(1_000, 4_000);
            assert!((1_000..=4_000).contains(&value));
        }
    }

    #[test]
    fn random_range_degenerate_returns_low() {
        let env = CountingEnv { counter: Rc::new(Cell::new(7)) };
        assert_eq!(env.random_range(5, 5), 5);
        assert_eq!(env.random_range(9, 3), 9);
    }
}
