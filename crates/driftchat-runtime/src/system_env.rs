//! Production Environment implementation using system time and RNG.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait that uses wall-clock time and OS randomness.

use std::time::{SystemTime, UNIX_EPOCH};

use driftchat_core::{Environment, Timestamp};

/// Production environment using system time and cryptographic RNG.
///
/// This implementation:
/// - Uses `SystemTime::now()` as milliseconds since the Unix epoch, so
///   archived start times and durations are real wall-clock values
/// - Uses `getrandom` for randomness (match latency, canned replies)
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Timestamp {
        // A clock set before 1970 reads as the epoch.
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_millis(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Only latency jitter and reply choice depend on this, so zeros
            // degrade to fixed behaviour instead of failing.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
