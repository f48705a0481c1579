//! Cancellable, timed matchmaking.
//!
//! ## State machine
//!
//! ```text
//!            start                  resolve (current search)
//!   Idle ────────────▶ Searching ───────────────────────────▶ Resolved
//!    ▲                  │   │  ▲                                  │
//!    │  cancel/timeout  │   │  └── start (restart: cancel first) ─┘
//!    └──────────────────┘   └── tick: elapsed += 1
//! ```
//!
//! Transitions are computed by the pure [`MatchmakingState::step`], which
//! returns effects. [`Matchmaking`] applies those effects against the
//! [`Clock`] port.
//!
//! ## Races
//!
//! Every run has its own [`SearchId`]. Tick and resolve inputs for any other
//! id are ignored, so a cancel or restart observed before a resolve always
//! wins, and a late resolve can never create a session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    timer::{Clock, TimerEvent, TimerHandle},
    types::{ChatMode, SearchId},
};

/// Criteria passed to the matchmaking backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFilters {
    /// Preferred region, any if `None`.
    pub region: Option<String>,
    /// Interests to match on.
    pub interests: Vec<String>,
    /// Requested chat mode.
    pub chat_mode: ChatMode,
}

/// Matchmaking timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakingConfig {
    /// Lower bound of simulated match latency.
    pub min_latency: Duration,
    /// Upper bound of simulated match latency.
    pub max_latency: Duration,
    /// Length of one elapsed unit for bounded waits.
    pub tick_period: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_secs(1),
            max_latency: Duration::from_secs(4),
            tick_period: Duration::from_secs(1),
        }
    }
}

/// Observable matchmaking state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchmakingState {
    /// No search running.
    #[default]
    Idle,
    /// Search in flight.
    Searching {
        /// Current run.
        search: SearchId,
        /// Elapsed ticks.
        elapsed: u32,
        /// Ticks before giving up; `None` waits forever.
        wait_budget: Option<u32>,
        /// Criteria of this run.
        filters: MatchFilters,
    },
    /// Last run ended with a match. Accepts a new `start`.
    Resolved {
        /// Run that matched.
        search: SearchId,
    },
}

/// Input to [`MatchmakingState::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchInput {
    /// Begin a run, cancelling any run in flight.
    Start {
        /// Fresh id for the run.
        search: SearchId,
        /// Criteria.
        filters: MatchFilters,
        /// Ticks before timing out.
        wait_budget: Option<u32>,
    },
    /// Stop the current run.
    Cancel,
    /// One tick elapsed for `search`.
    Tick {
        /// Run the tick belongs to.
        search: SearchId,
    },
    /// A participant was found for `search`.
    Resolve {
        /// Run that resolved.
        search: SearchId,
    },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A partner was found.
    Matched {
        /// Run that matched.
        search: SearchId,
        /// Criteria the run used.
        filters: MatchFilters,
    },
    /// Wait budget exhausted. Not an error.
    TimedOut {
        /// Run that timed out.
        search: SearchId,
    },
    /// Cancelled by the user or by a restart.
    Cancelled {
        /// Run that was cancelled.
        search: SearchId,
    },
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEffect {
    /// Clear both pending timers.
    CancelTimers,
    /// Arm the elapsed-tick interval.
    ScheduleTick {
        /// Run to tick.
        search: SearchId,
    },
    /// Arm the resolve timeout.
    ScheduleResolve {
        /// Run to resolve.
        search: SearchId,
    },
    /// Report a terminal outcome.
    Report(MatchOutcome),
}

impl MatchmakingState {
    /// Whether a run is in flight.
    pub fn is_searching(&self) -> bool {
        matches!(self, Self::Searching { .. })
    }

    /// Id of the run in flight.
    pub fn current_search(&self) -> Option<SearchId> {
        match self {
            Self::Searching { search, .. } => Some(*search),
            Self::Idle | Self::Resolved { .. } => None,
        }
    }

    /// Pure transition function.
    pub fn step(&self, input: MatchInput) -> (Self, Vec<MatchEffect>) {
        match (self, input) {
            (_, MatchInput::Start { search, filters, wait_budget }) => {
                let mut effects = Vec::new();
                if let Self::Searching { search: previous, .. } = self {
                    effects.push(MatchEffect::CancelTimers);
                    effects.push(MatchEffect::Report(MatchOutcome::Cancelled { search: *previous }));
                }
                if wait_budget.is_some() {
                    effects.push(MatchEffect::ScheduleTick { search });
                }
                effects.push(MatchEffect::ScheduleResolve { search });
                (Self::Searching { search, elapsed: 0, wait_budget, filters }, effects)
            },

            (Self::Searching { search, .. }, MatchInput::Cancel) => (
                Self::Idle,
                vec![
                    MatchEffect::CancelTimers,
                    MatchEffect::Report(MatchOutcome::Cancelled { search: *search }),
                ],
            ),

            (
                Self::Searching { search, elapsed, wait_budget, filters },
                MatchInput::Tick { search: ticked },
            ) if *search == ticked => {
                let elapsed = elapsed.saturating_add(1);
                match wait_budget {
                    Some(budget) if elapsed >= *budget => (
                        Self::Idle,
                        vec![
                            MatchEffect::CancelTimers,
                            MatchEffect::Report(MatchOutcome::TimedOut { search: *search }),
                        ],
                    ),
                    _ => (
                        Self::Searching {
                            search: *search,
                            elapsed,
                            wait_budget: *wait_budget,
                            filters: filters.clone(),
                        },
                        Vec::new(),
                    ),
                }
            },

            (Self::Searching { search, filters, .. }, MatchInput::Resolve { search: resolved })
                if *search == resolved =>
            {
                (
                    Self::Resolved { search: *search },
                    vec![
                        MatchEffect::CancelTimers,
                        MatchEffect::Report(MatchOutcome::Matched {
                            search: *search,
                            filters: filters.clone(),
                        }),
                    ],
                )
            },

            // Cancel while not searching, or tick/resolve for a stale run.
            (state, _) => (state.clone(), Vec::new()),
        }
    }
}

/// Matchmaking process bound to a clock.
#[derive(Debug, Clone)]
pub struct Matchmaking {
    state: MatchmakingState,
    config: MatchmakingConfig,
    next_search: u64,
    tick: Option<TimerHandle>,
    resolve: Option<TimerHandle>,
    last_request: Option<(MatchFilters, Option<u32>)>,
}

impl Matchmaking {
    /// Create an idle process.
    pub fn new(config: MatchmakingConfig) -> Self {
        Self {
            state: MatchmakingState::Idle,
            config,
            next_search: 0,
            tick: None,
            resolve: None,
            last_request: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &MatchmakingState {
        &self.state
    }

    /// Whether a run is in flight.
    pub fn is_searching(&self) -> bool {
        self.state.is_searching()
    }

    /// Whether `search` is the run in flight.
    pub fn is_current(&self, search: SearchId) -> bool {
        self.state.current_search() == Some(search)
    }

    /// Criteria of the run in flight.
    pub fn current_filters(&self) -> Option<&MatchFilters> {
        match &self.state {
            MatchmakingState::Searching { filters, .. } => Some(filters),
            MatchmakingState::Idle | MatchmakingState::Resolved { .. } => None,
        }
    }

    /// Criteria and budget of the most recent `start`.
    pub fn last_request(&self) -> Option<&(MatchFilters, Option<u32>)> {
        self.last_request.as_ref()
    }

    /// Start a run, cancelling any run in flight first.
    ///
    /// Returns the new id and the outcome of the run it replaced, if any.
    pub fn start<C, E>(
        &mut self,
        clock: &mut C,
        env: &E,
        filters: MatchFilters,
        wait_budget: Option<u32>,
    ) -> (SearchId, Vec<MatchOutcome>)
    where
        C: Clock + ?Sized,
        E: Environment,
    {
        self.next_search += 1;
        let search = SearchId(self.next_search);
        self.last_request = Some((filters.clone(), wait_budget));
        tracing::info!(%search, ?wait_budget, "matchmaking started");
        let outcomes = self.apply(MatchInput::Start { search, filters, wait_budget }, clock, env);
        (search, outcomes)
    }

    /// Stop the run in flight. Safe to call any number of times.
    pub fn cancel<C, E>(&mut self, clock: &mut C, env: &E) -> Option<MatchOutcome>
    where
        C: Clock + ?Sized,
        E: Environment,
    {
        self.apply(MatchInput::Cancel, clock, env).into_iter().next()
    }

    /// Feed an elapsed tick.
    pub fn on_tick<C, E>(&mut self, clock: &mut C, env: &E, search: SearchId) -> Option<MatchOutcome>
    where
        C: Clock + ?Sized,
        E: Environment,
    {
        self.apply(MatchInput::Tick { search }, clock, env).into_iter().next()
    }

    /// Feed a resolution. `None` means the run is stale and must not produce
    /// a session.
    pub fn on_resolve<C, E>(
        &mut self,
        clock: &mut C,
        env: &E,
        search: SearchId,
    ) -> Option<MatchOutcome>
    where
        C: Clock + ?Sized,
        E: Environment,
    {
        self.apply(MatchInput::Resolve { search }, clock, env).into_iter().next()
    }

    /// Forget the current run and the last request.
    ///
    /// Search ids keep counting up so results addressed to an earlier run
    /// stay stale. Timers must already be cancelled or discarded.
    pub fn reset(&mut self) {
        self.state = MatchmakingState::Idle;
        self.tick = None;
        self.resolve = None;
        self.last_request = None;
    }

    fn apply<C, E>(&mut self, input: MatchInput, clock: &mut C, env: &E) -> Vec<MatchOutcome>
    where
        C: Clock + ?Sized,
        E: Environment,
    {
        let (next, effects) = self.state.step(input);
        self.state = next;

        let now = env.now();
        let mut outcomes = Vec::new();
        for effect in effects {
            match effect {
                MatchEffect::CancelTimers => {
                    if let Some(handle) = self.tick.take() {
                        clock.clear(handle);
                    }
                    if let Some(handle) = self.resolve.take() {
                        clock.clear(handle);
                    }
                },
                MatchEffect::ScheduleTick { search } => {
                    let handle = clock.set_interval(
                        now,
                        self.config.tick_period,
                        TimerEvent::MatchTick { search },
                    );
                    self.tick = Some(handle);
                },
                MatchEffect::ScheduleResolve { search } => {
                    let latency = self.draw_latency(env);
                    tracing::debug!(%search, latency_ms = latency.as_millis(), "resolve scheduled");
                    let handle =
                        clock.set_timeout(now, latency, TimerEvent::MatchResolve { search });
                    self.resolve = Some(handle);
                },
                MatchEffect::Report(outcome) => {
                    tracing::info!(?outcome, "matchmaking finished");
                    outcomes.push(outcome);
                },
            }
        }
        outcomes
    }

    fn draw_latency<E: Environment>(&self, env: &E) -> Duration {
        let low = u64::try_from(self.config.min_latency.as_millis()).unwrap_or(u64::MAX);
        let high = u64::try_from(self.config.max_latency.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(env.random_range(low, high))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{timer::TimerQueue, types::Timestamp};

    #[derive(Clone)]
    struct FixedEnv {
        now: Rc<Cell<u64>>,
    }

    impl FixedEnv {
        fn at(secs: u64) -> Self {
            Self { now: Rc::new(Cell::new(secs * 1_000)) }
        }

        fn advance_to(&self, secs: u64) {
            self.now.set(secs * 1_000);
        }
    }

    impl Environment for FixedEnv {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.now.get())
        }

        // Zero bytes: latency always draws the lower bound.
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0);
        }
    }

    fn config(latency_secs: u64) -> MatchmakingConfig {
        MatchmakingConfig {
            min_latency: Duration::from_secs(latency_secs),
            max_latency: Duration::from_secs(latency_secs),
            tick_period: Duration::from_secs(1),
        }
    }

    /// Pop every timer due at the env's current time and feed it back.
    fn drive(
        mm: &mut Matchmaking,
        clock: &mut TimerQueue,
        env: &FixedEnv,
    ) -> Vec<MatchOutcome> {
        let mut outcomes = Vec::new();
        while let Some(fired) = clock.pop_due(env.now()) {
            let outcome = match fired.event {
                TimerEvent::MatchTick { search } => mm.on_tick(clock, env, search),
                TimerEvent::MatchResolve { search } => mm.on_resolve(clock, env, search),
                TimerEvent::PeerReply { .. } => None,
            };
            outcomes.extend(outcome);
        }
        outcomes
    }

    #[test]
    fn step_start_from_idle_schedules_timers() {
        let (next, effects) = MatchmakingState::Idle.step(MatchInput::Start {
            search: SearchId(1),
            filters: MatchFilters::default(),
            wait_budget: Some(5),
        });
        assert!(next.is_searching());
        assert_eq!(
            effects,
            vec![
                MatchEffect::ScheduleTick { search: SearchId(1) },
                MatchEffect::ScheduleResolve { search: SearchId(1) },
            ]
        );
    }

    #[test]
    fn step_unbounded_wait_has_no_tick() {
        let (_, effects) = MatchmakingState::Idle.step(MatchInput::Start {
            search: SearchId(1),
            filters: MatchFilters::default(),
            wait_budget: None,
        });
        assert_eq!(effects, vec![MatchEffect::ScheduleResolve { search: SearchId(1) }]);
    }

    #[test]
    fn step_ignores_stale_resolve() {
        let state = MatchmakingState::Searching {
            search: SearchId(2),
            elapsed: 0,
            wait_budget: None,
            filters: MatchFilters::default(),
        };
        let (next, effects) = state.step(MatchInput::Resolve { search: SearchId(1) });
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn resolve_reports_match() {
        let env = FixedEnv::at(0);
        let mut clock = TimerQueue::new();
        let mut mm = Matchmaking::new(config(2));

        let (search, _) = mm.start(&mut clock, &env, MatchFilters::default(), None);
        env.advance_to(2);
        let outcomes = drive(&mut mm, &mut clock, &env);

        assert!(matches!(outcomes.as_slice(), [MatchOutcome::Matched { search: s, .. }] if *s == search));
        assert!(matches!(mm.state(), MatchmakingState::Resolved { .. }));
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn wait_budget_times_out_before_slow_match() {
        let env = FixedEnv::at(0);
        let mut clock = TimerQueue::new();
        let mut mm = Matchmaking::new(config(10));

        let (search, _) = mm.start(&mut clock, &env, MatchFilters::default(), Some(3));
        let mut outcomes = Vec::new();
        for t in 1..=10 {
            env.advance_to(t);
            outcomes.extend(drive(&mut mm, &mut clock, &env));
        }

        assert_eq!(outcomes, vec![MatchOutcome::TimedOut { search }]);
        assert_eq!(mm.state(), &MatchmakingState::Idle);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn timeout_wins_tie_with_resolve() {
        let env = FixedEnv::at(0);
        let mut clock = TimerQueue::new();
        let mut mm = Matchmaking::new(config(3));

        let (search, _) = mm.start(&mut clock, &env, MatchFilters::default(), Some(3));
        env.advance_to(3);
        let outcomes = drive(&mut mm, &mut clock, &env);

        assert_eq!(outcomes, vec![MatchOutcome::TimedOut { search }]);
    }

    #[test]
    fn cancel_is_idempotent_and_suppresses_resolve() {
        let env = FixedEnv::at(0);
        let mut clock = TimerQueue::new();
        let mut mm = Matchmaking::new(config(2));

        let (search, _) = mm.start(&mut clock, &env, MatchFilters::default(), Some(5));
        assert_eq!(mm.cancel(&mut clock, &env), Some(MatchOutcome::Cancelled { search }));
        assert_eq!(mm.cancel(&mut clock, &env), None);

        env.advance_to(10);
        assert!(drive(&mut mm, &mut clock, &env).is_empty());
        assert_eq!(mm.state(), &MatchmakingState::Idle);
    }

    #[test]
    fn restart_cancels_previous_run() {
        let env = FixedEnv::at(0);
        let mut clock = TimerQueue::new();
        let mut mm = Matchmaking::new(config(2));

        let (first, _) = mm.start(&mut clock, &env, MatchFilters::default(), None);
        env.advance_to(1);
        let (second, replaced) = mm.start(&mut clock, &env, MatchFilters::default(), None);
        assert_eq!(replaced, vec![MatchOutcome::Cancelled { search: first }]);

        // A late resolve for the first run is ignored.
        assert_eq!(mm.on_resolve(&mut clock, &env, first), None);
        assert!(mm.is_current(second));

        env.advance_to(3);
        let outcomes = drive(&mut mm, &mut clock, &env);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], MatchOutcome::Matched { search, .. } if *search == second));
    }
}
