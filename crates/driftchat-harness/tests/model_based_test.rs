//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! client behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (Simulation)   Results + State
//! ```

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use driftchat_client::{ClientError, ClientEvent};
use driftchat_core::{ErrorKind, HistoryId, MatchFilters, ParticipantId, SessionId};
use driftchat_harness::{
    ModelWorld, ObservableState, Operation, OperationError, OperationResult, Simulation,
    SmallBudget, SmallDelay, SmallText, model_config,
    model::{participant_name, resolve_slot},
};
use proptest::prelude::*;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    sim: Simulation,
}

impl RealWorld {
    fn new(seed: u64) -> Self {
        Self { sim: Simulation::with_config(seed, model_config()) }
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        let event = match op {
            Operation::StartSearch { wait_budget } => ClientEvent::StartSearch {
                filters: MatchFilters::default(),
                wait_budget: wait_budget.map(SmallBudget::ticks),
            },
            Operation::CancelSearch => ClientEvent::CancelSearch,
            Operation::AdvanceTime { delay } => {
                self.sim.advance(Duration::from_secs(delay.secs()));
                return OperationResult::Ok;
            },
            Operation::SetOnline { online } => ClientEvent::ConnectivityChanged { online: *online },
            Operation::Send { slot, text } => {
                ClientEvent::SendMessage { session: self.session_at(*slot), text: text.text() }
            },
            Operation::Close { slot } => ClientEvent::CloseSession { session: self.session_at(*slot) },
            Operation::Switch { slot } => {
                ClientEvent::SwitchActive { session: slot.map(|s| self.session_at(s)) }
            },
            Operation::Skip => ClientEvent::SkipStranger,
            Operation::SendFriendRequest { participant } => ClientEvent::SendFriendRequest {
                participant: ParticipantId::new(participant_name(*participant)),
            },
            Operation::OpenHistory { slot } => {
                ClientEvent::OpenHistory { history: self.history_at(*slot) }
            },
            Operation::DeleteHistory { slot } => {
                ClientEvent::DeleteHistory { history: self.history_at(*slot) }
            },
            Operation::ClearHistory => ClientEvent::ClearHistory,
        };

        match self.sim.handle(event) {
            Ok(_) => OperationResult::Ok,
            Err(e) => OperationResult::Error(classify(&e)),
        }
    }

    /// Session in the given slot, or an id that never exists.
    fn session_at(&self, slot: u8) -> SessionId {
        let sessions = self.sim.client().registry().sessions();
        resolve_slot(slot, sessions.len())
            .map_or_else(|| SessionId::stranger(u64::MAX), |i| sessions[i].id.clone())
    }

    /// Record in the given slot, or an id that never exists.
    fn history_at(&self, slot: u8) -> HistoryId {
        let records = self.sim.client().history().records();
        resolve_slot(slot, records.len()).map_or(HistoryId(u64::MAX), |i| records[i].id)
    }

    fn observable_state(&self) -> ObservableState {
        let snapshot = self.sim.snapshot();
        ObservableState {
            sessions: snapshot
                .sessions
                .iter()
                .map(|s| {
                    let messages = s.messages.iter().map(|m| (m.text.clone(), m.status)).collect();
                    (s.id.to_string(), messages)
                })
                .collect(),
            active: snapshot.active.map(|id| id.to_string()),
            searching: self.sim.client().matchmaking().is_searching(),
            history: snapshot.history.iter().map(|r| (r.id.0, r.messages.len())).collect(),
            queued: snapshot.queued,
            sent_requests: snapshot.sent_requests.iter().map(ToString::to_string).collect(),
            online: snapshot.online,
        }
    }
}

fn classify(error: &ClientError) -> OperationError {
    match error.kind() {
        Some(ErrorKind::Validation) => OperationError::Validation,
        Some(ErrorKind::NotFound) => OperationError::NotFound,
        Some(ErrorKind::State) | None => OperationError::State,
    }
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let text = (any::<u8>(), prop::bool::weighted(0.1))
        .prop_map(|(seed, blank)| SmallText { seed, blank });

    prop_oneof![
        // Weight towards operations that create sessions and history
        3 => prop::option::weighted(0.6, any::<u8>())
            .prop_map(|b| Operation::StartSearch { wait_budget: b.map(SmallBudget) }),
        1 => Just(Operation::CancelSearch),
        4 => any::<u8>().prop_map(|d| Operation::AdvanceTime { delay: SmallDelay(d) }),
        2 => any::<bool>().prop_map(|online| Operation::SetOnline { online }),
        5 => (any::<u8>(), text).prop_map(|(slot, text)| Operation::Send { slot, text }),
        2 => any::<u8>().prop_map(|slot| Operation::Close { slot }),
        1 => prop::option::of(any::<u8>()).prop_map(|slot| Operation::Switch { slot }),
        2 => Just(Operation::Skip),
        1 => any::<u8>().prop_map(|participant| Operation::SendFriendRequest { participant }),
        2 => any::<u8>().prop_map(|slot| Operation::OpenHistory { slot }),
        1 => any::<u8>().prop_map(|slot| Operation::DeleteHistory { slot }),
        1 => Just(Operation::ClearHistory),
    ]
}

proptest! {
    /// Verify that results and observable state match between model and real
    /// client after every operation.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut model = ModelWorld::new();
        let mut real = RealWorld::new(seed);

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
        }
    }

    /// Verify model invariants hold after any operation sequence.
    #[test]
    fn prop_model_invariants(
        ops in prop::collection::vec(operation_strategy(), 0..100)
    ) {
        let mut model = ModelWorld::new();
        for op in &ops {
            let _ = model.apply(op);
        }
        let state = model.observable_state();

        // Invariant: active is none or names an open session
        if let Some(active) = &state.active {
            prop_assert!(state.sessions.iter().any(|(id, _)| id == active));
        }

        // Invariant: at most one stranger session
        let strangers = state.sessions.iter().filter(|(id, _)| id.starts_with("stranger:")).count();
        prop_assert!(strangers <= 1, "{} stranger sessions", strangers);

        // Invariant: history is most recent first
        prop_assert!(state.history.windows(2).all(|w| w[0].0 > w[1].0));

        // Invariant: nothing is queued while online
        if state.online {
            prop_assert_eq!(state.queued, 0);
        }
    }

    /// Cancelling before the resolve fires never creates a session.
    #[test]
    fn prop_cancel_before_resolve_creates_nothing(
        seed in any::<u64>(),
        restarts in 0..5usize,
    ) {
        let mut real = RealWorld::new(seed);
        for _ in 0..restarts {
            real.apply(&Operation::StartSearch { wait_budget: None });
            real.apply(&Operation::AdvanceTime { delay: SmallDelay(1) });
        }
        real.apply(&Operation::StartSearch { wait_budget: None });
        real.apply(&Operation::CancelSearch);
        real.apply(&Operation::AdvanceTime { delay: SmallDelay(7) });

        prop_assert!(real.observable_state().sessions.is_empty());
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    /// Basic smoke test for the model.
    #[test]
    fn model_basic_operations() {
        let mut model = ModelWorld::new();

        // Nothing open yet
        let result = model.apply(&Operation::Send {
            slot: 0,
            text: SmallText { seed: 1, blank: false },
        });
        assert_eq!(result, OperationResult::Error(OperationError::NotFound));

        // Match after the pinned latency
        assert!(model.apply(&Operation::StartSearch { wait_budget: None }).is_ok());
        model.apply(&Operation::AdvanceTime { delay: SmallDelay(2) });
        assert_eq!(model.matches(), 1);

        // Blank text is rejected before the slot is looked at
        let result = model.apply(&Operation::Send {
            slot: 9,
            text: SmallText { seed: 0, blank: true },
        });
        assert_eq!(result, OperationResult::Error(OperationError::Validation));

        // Archive, then replays refuse writes
        model.apply(&Operation::Close { slot: 0 });
        assert!(model.apply(&Operation::OpenHistory { slot: 0 }).is_ok());
        let result = model.apply(&Operation::Send {
            slot: 0,
            text: SmallText { seed: 2, blank: false },
        });
        assert_eq!(result, OperationResult::Error(OperationError::State));
    }

    /// The same script gives the same state on both sides.
    #[test]
    fn real_follows_model_on_a_fixed_script() {
        let script = [
            Operation::StartSearch { wait_budget: Some(SmallBudget(4)) },
            Operation::AdvanceTime { delay: SmallDelay(3) },
            Operation::SetOnline { online: false },
            Operation::Send { slot: 0, text: SmallText { seed: 1, blank: false } },
            Operation::Skip,
            Operation::AdvanceTime { delay: SmallDelay(2) },
            Operation::SetOnline { online: true },
            Operation::OpenHistory { slot: 0 },
            Operation::OpenHistory { slot: 0 },
            Operation::SendFriendRequest { participant: 7 },
            Operation::SendFriendRequest { participant: 15 },
            Operation::DeleteHistory { slot: 0 },
        ];

        let mut model = ModelWorld::new();
        let mut real = RealWorld::new(3);
        for op in &script {
            assert_eq!(model.apply(op), real.apply(op), "{op:?}");
        }
        assert_eq!(model.observable_state(), real.observable_state());
        assert_eq!(model.observable_state().sent_requests, vec!["stranger-7".to_string()]);
    }
}
