//! Property-based tests for the core state machines.
//!
//! Timer ordering, registry invariants under arbitrary install/close/switch
//! sequences, and the matchmaking transition function's terminal outcomes.

#![allow(clippy::unwrap_used)]

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use driftchat_core::{
    ChatMode, ChatSession, Clock, EndedBy, Friend, FriendGraph, HistoryArchiver, MatchEffect,
    MatchFilters, MatchInput, MatchOutcome, MatchmakingState, Participant, ParticipantId,
    SearchId, SessionKind, SessionRegistry, TimerEvent, TimerQueue, Timestamp,
};
use proptest::prelude::*;

fn participant(id: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        name: id.to_string(),
        avatar: String::new(),
        bio: String::new(),
        region: "LATAM".to_string(),
    }
}

proptest! {
    /// Timers fire by deadline, ties by scheduling order, and a cleared
    /// timer never fires.
    #[test]
    fn prop_timers_fire_in_order(
        delays in prop::collection::vec(0u64..50, 1..40),
        cancel in prop::collection::vec(any::<bool>(), 40),
    ) {
        let mut clock = TimerQueue::new();
        let now = Timestamp::from_millis(0);

        let handles: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, delay)| {
                let search = SearchId(i as u64);
                clock.set_timeout(now, Duration::from_millis(*delay), TimerEvent::MatchResolve { search })
            })
            .collect();

        let mut cancelled = BTreeSet::new();
        for (i, handle) in handles.iter().enumerate() {
            if cancel[i] {
                prop_assert!(clock.clear(*handle));
                // Idempotent.
                prop_assert!(!clock.clear(*handle));
                cancelled.insert(i as u64);
            }
        }

        let mut fired = Vec::new();
        while let Some(timer) = clock.pop_due(Timestamp::from_secs(1)) {
            fired.push(timer);
        }

        prop_assert_eq!(fired.len(), delays.len() - cancelled.len());
        prop_assert_eq!(clock.pending(), 0);
        for pair in fired.windows(2) {
            prop_assert!((pair[0].deadline, pair[0].handle) < (pair[1].deadline, pair[1].handle));
        }
        for timer in &fired {
            if let TimerEvent::MatchResolve { search } = timer.event {
                prop_assert!(!cancelled.contains(&search.0));
            }
        }
    }

    /// Registry invariants hold after any install/close/switch sequence.
    #[test]
    fn prop_registry_invariants(ops in prop::collection::vec(registry_op(), 0..80)) {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(3);
        let mut friends = FriendGraph::new();
        for i in 0..4 {
            friends.add_friend(Friend::from(participant(&format!("f{i}"))));
        }

        let mut archived = 0usize;
        for (step, op) in ops.into_iter().enumerate() {
            let now = Timestamp::from_secs(step as u64);
            match op {
                RegistryOp::Stranger => {
                    let id = registry.next_stranger_id();
                    let session = ChatSession::stranger(
                        id,
                        participant(&format!("s{step}")),
                        ChatMode::Text,
                        now,
                    );
                    let report = registry.install(session, &mut archiver, &friends, now);
                    archived += usize::from(report.archived.is_some());
                },
                RegistryOp::Friend(slot) => {
                    let friend = friends.friends()[usize::from(slot) % 4].clone();
                    registry.install(ChatSession::friend(&friend, now), &mut archiver, &friends, now);
                },
                RegistryOp::Close(slot) => {
                    if registry.is_empty() {
                        continue;
                    }
                    let id = registry.sessions()[usize::from(slot) % registry.len()].id.clone();
                    let retired = registry
                        .retire(&id, &mut archiver, &friends, EndedBy::You, now)
                        .unwrap();
                    archived += usize::from(retired.archived.is_some());
                },
                RegistryOp::Switch(slot) => {
                    let target = slot
                        .filter(|_| !registry.is_empty())
                        .map(|s| registry.sessions()[usize::from(s) % registry.len()].id.clone());
                    registry.switch_active(target.as_ref()).unwrap();
                },
            }

            if let Some(active) = registry.active() {
                prop_assert!(registry.contains(active));
            }
            prop_assert!(registry.of_kind(SessionKind::Stranger).count() <= 1);
            prop_assert!(archiver.len() <= 3);
            prop_assert_eq!(archiver.len(), archived.min(3));

            let mut ids = BTreeSet::new();
            prop_assert!(registry.sessions().iter().all(|s| ids.insert(s.id.clone())));
        }
    }

    /// Every search reports at most one terminal outcome, and nothing is
    /// matched after a cancel or a newer start.
    #[test]
    fn prop_matchmaking_reports_once(inputs in prop::collection::vec(match_input(), 0..60)) {
        let mut state = MatchmakingState::default();
        let mut next = 0u64;
        let mut outcomes: BTreeMap<SearchId, MatchOutcome> = BTreeMap::new();

        for input in inputs {
            let input = match input {
                Input::Start(budget) => {
                    next += 1;
                    MatchInput::Start {
                        search: SearchId(next),
                        filters: MatchFilters::default(),
                        wait_budget: budget,
                    }
                },
                Input::Cancel => MatchInput::Cancel,
                Input::Tick(back) => MatchInput::Tick { search: SearchId(next.saturating_sub(u64::from(back))) },
                Input::Resolve(back) => {
                    MatchInput::Resolve { search: SearchId(next.saturating_sub(u64::from(back))) }
                },
            };

            let before = state.current_search();
            let (after, effects) = state.step(input);

            for effect in effects {
                if let MatchEffect::Report(outcome) = effect {
                    let search = match &outcome {
                        MatchOutcome::Matched { search, .. }
                        | MatchOutcome::TimedOut { search }
                        | MatchOutcome::Cancelled { search } => *search,
                    };
                    // Only the run that was in flight can end.
                    prop_assert_eq!(Some(search), before);
                    prop_assert!(outcomes.insert(search, outcome).is_none(), "{} reported twice", search);
                }
            }
            state = after;
        }
    }
}

#[derive(Debug, Clone)]
enum RegistryOp {
    Stranger,
    Friend(u8),
    Close(u8),
    Switch(Option<u8>),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        3 => Just(RegistryOp::Stranger),
        2 => any::<u8>().prop_map(RegistryOp::Friend),
        3 => any::<u8>().prop_map(RegistryOp::Close),
        1 => prop::option::of(any::<u8>()).prop_map(RegistryOp::Switch),
    ]
}

#[derive(Debug, Clone)]
enum Input {
    Start(Option<u32>),
    Cancel,
    Tick(u8),
    Resolve(u8),
}

fn match_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        2 => prop::option::of(0u32..4).prop_map(Input::Start),
        1 => Just(Input::Cancel),
        3 => (0u8..2).prop_map(Input::Tick),
        2 => (0u8..2).prop_map(Input::Resolve),
    ]
}

#[test]
fn interval_rearms_from_previous_deadline() {
    let mut clock = TimerQueue::new();
    let search = SearchId(1);
    clock.set_interval(Timestamp::from_secs(0), Duration::from_secs(1), TimerEvent::MatchTick { search });

    // Observed late: every missed period still fires once, in order.
    let deadlines: Vec<Timestamp> = std::iter::from_fn(|| clock.pop_due(Timestamp::from_millis(3_500)))
        .map(|t| t.deadline)
        .collect();

    assert_eq!(deadlines, vec![
        Timestamp::from_secs(1),
        Timestamp::from_secs(2),
        Timestamp::from_secs(3),
    ]);
    assert_eq!(clock.next_deadline(), Some(Timestamp::from_secs(4)));
}
