//! Clock port and deterministic timer queue.
//!
//! Timers do not carry closures. Scheduling returns a [`TimerHandle`] and
//! stores a [`TimerEvent`]; the driver feeds `Tick { now }` into the client,
//! which pops due events one at a time and dispatches them. Because events are
//! popped individually, a handler that cancels another timer due at the same
//! instant prevents it from firing.
//!
//! # Invariants
//!
//! - Cancellation is idempotent: clearing an unknown, fired or already
//!   cleared handle is a no-op.
//! - Equal deadlines fire in scheduling order.
//! - A repeating timer fires at most once per `pop_due` call for a given
//!   deadline and is re-armed relative to its previous deadline.

use std::{collections::BTreeMap, time::Duration};

use crate::types::{SearchId, SessionId, Timestamp};

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// What a timer means when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// One elapsed unit of a bounded matchmaking search.
    MatchTick {
        /// Search the tick belongs to.
        search: SearchId,
    },
    /// Simulated matchmaking latency elapsed.
    MatchResolve {
        /// Search to resolve.
        search: SearchId,
    },
    /// Delayed reply from the peer responder.
    PeerReply {
        /// Session the reply goes to.
        session: SessionId,
        /// Reply body.
        text: String,
    },
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    /// Handle the timer was scheduled under.
    pub handle: TimerHandle,
    /// Scheduled deadline (not the time it was observed).
    pub deadline: Timestamp,
    /// Payload.
    pub event: TimerEvent,
}

/// Clock port.
///
/// Mirrors `setTimeout`/`setInterval`/`clearTimeout`/`clearInterval` with
/// typed events in place of callbacks.
pub trait Clock {
    /// Fire `event` once, `delay` after `now`.
    fn set_timeout(&mut self, now: Timestamp, delay: Duration, event: TimerEvent) -> TimerHandle;

    /// Fire `event` every `period`, first at `now + period`.
    fn set_interval(&mut self, now: Timestamp, period: Duration, event: TimerEvent)
    -> TimerHandle;

    /// Cancel a timer. Returns whether something was actually cancelled.
    fn clear(&mut self, handle: TimerHandle) -> bool;

    /// Remove and return the earliest timer due at or before `now`.
    fn pop_due(&mut self, now: Timestamp) -> Option<FiredTimer>;

    /// Number of armed timers.
    fn pending(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Scheduled {
    handle: TimerHandle,
    event: TimerEvent,
    period: Option<Duration>,
}

/// Deterministic in-memory [`Clock`] ordered by `(deadline, sequence)`.
///
/// Used unchanged in production and simulation; only the source of `now`
/// differs.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    next_handle: u64,
    queue: BTreeMap<(Timestamp, u64), Scheduled>,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    fn arm(&mut self, deadline: Timestamp, scheduled: Scheduled) {
        let seq = scheduled.handle.0;
        self.queue.insert((deadline, seq), scheduled);
    }

    fn schedule(
        &mut self,
        deadline: Timestamp,
        event: TimerEvent,
        period: Option<Duration>,
    ) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.arm(deadline, Scheduled { handle, event, period });
        handle
    }
}

impl Clock for TimerQueue {
    fn set_timeout(&mut self, now: Timestamp, delay: Duration, event: TimerEvent) -> TimerHandle {
        self.schedule(now.saturating_add(delay), event, None)
    }

    fn set_interval(
        &mut self,
        now: Timestamp,
        period: Duration,
        event: TimerEvent,
    ) -> TimerHandle {
        // A zero period would re-arm at the same deadline forever.
        let period = period.max(Duration::from_millis(1));
        self.schedule(now.saturating_add(period), event, Some(period))
    }

    fn clear(&mut self, handle: TimerHandle) -> bool {
        let key = self.queue.iter().find(|(_, s)| s.handle == handle).map(|(key, _)| *key);
        key.is_some_and(|key| self.queue.remove(&key).is_some())
    }

    fn pop_due(&mut self, now: Timestamp) -> Option<FiredTimer> {
        let key = *self.queue.keys().next()?;
        if key.0 > now {
            return None;
        }
        let scheduled = self.queue.remove(&key)?;
        let (deadline, _) = key;

        if let Some(period) = scheduled.period {
            // Re-arm under the same handle; the sequence number keeps
            // scheduling order stable across repeats.
            self.arm(deadline.saturating_add(period), scheduled.clone());
        }

        Some(FiredTimer { handle: scheduled.handle, deadline, event: scheduled.event })
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
