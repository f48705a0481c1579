//! Fuzz target for [`ChatClient`] session bookkeeping
//!
//! Keep the registry, archive and offline queue consistent under any event
//! order, including stale ids and events racing a search.
//!
//! # Strategy
//!
//! - Event sequences: model operations plus peer traffic, blocks, friend
//!   requests and logout
//! - Stale ids: slots resolve against current state, but events may target
//!   sessions and records closed earlier in the sequence
//! - Time: advance in whole seconds so matches, timeouts and peer replies
//!   interleave with user actions
//!
//! # Invariants
//!
//! - Active pointer is `None` or names an open session
//! - At most one stranger session
//! - History never exceeds its cap and stays most recent first
//! - Every open replay is read-only and belongs to a live record
//! - Nothing is queued while online
//! - A rejected event leaves the snapshot untouched
//! - NEVER panic on stale ids

#![no_main]

use arbitrary::Arbitrary;
use driftchat_client::{CannedResponder, ClientConfig, ClientEvent};
use driftchat_core::{
    ChatSession, Friend, FriendRequest, HistoryId, MatchFilters, ParticipantId, RequestId,
    SessionId, SessionKind,
};
use driftchat_harness::{Operation, Simulation, model::participant_name, participant};
use libfuzzer_sys::fuzz_target;

const HISTORY_LIMIT: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Op(Operation),
    PeerMessage { slot: u8 },
    PeerLeft { slot: u8 },
    Block { slot: u8 },
    ReceiveRequest { from: u8 },
    AcceptRequest { slot: u8 },
    OpenFriendChat { from: u8 },
    Unfriend { from: u8 },
    StaleSession { seq: u8 },
    StaleHistory { id: u8 },
    Logout,
}

/// Fuzz input with deterministic seed.
#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    events: Vec<FuzzEvent>,
}

fuzz_target!(|input: FuzzInput| {
    let config = ClientConfig { history_limit: HISTORY_LIMIT, ..ClientConfig::default() };
    let mut sim =
        Simulation::with_config(input.seed, config).with_responder(CannedResponder::default());

    for event in input.events {
        let event = match to_client_event(&mut sim, event) {
            Some(event) => event,
            None => continue,
        };

        let before = sim.snapshot();
        if sim.handle(event).is_err() {
            assert_eq!(before, sim.snapshot(), "rejected event mutated state");
        }
        check_invariants(&sim);
    }
});

fn to_client_event(sim: &mut Simulation, event: FuzzEvent) -> Option<ClientEvent> {
    let sessions = sim.client().registry().sessions().to_vec();
    let session_at = |slot: u8| -> Option<SessionId> {
        (!sessions.is_empty()).then(|| sessions[usize::from(slot) % sessions.len()].id.clone())
    };

    let event = match event {
        FuzzEvent::Op(op) => return from_operation(sim, op, &sessions),
        FuzzEvent::PeerMessage { slot } => {
            ClientEvent::PeerMessage { session: session_at(slot)?, text: "yo".to_string() }
        },
        FuzzEvent::PeerLeft { slot } => ClientEvent::PeerLeft { session: session_at(slot)? },
        FuzzEvent::Block { slot } => ClientEvent::Block { session: session_at(slot)? },
        FuzzEvent::ReceiveRequest { from } => {
            let from = Friend::from(participant(&format!("stranger-{}", from % 8)));
            ClientEvent::FriendRequestReceived(FriendRequest {
                id: RequestId::new(format!("req-{}", from.id)),
                from,
                timestamp: sim.now(),
            })
        },
        FuzzEvent::AcceptRequest { slot } => {
            let requests = sim.client().friends().requests();
            if requests.is_empty() {
                return None;
            }
            let request = requests[usize::from(slot) % requests.len()].id.clone();
            ClientEvent::AcceptRequest { request }
        },
        FuzzEvent::OpenFriendChat { from } => ClientEvent::OpenFriendChat {
            friend: ParticipantId::new(format!("stranger-{}", from % 8)),
        },
        FuzzEvent::Unfriend { from } => ClientEvent::Unfriend {
            friend: ParticipantId::new(format!("stranger-{}", from % 8)),
        },
        FuzzEvent::StaleSession { seq } => ClientEvent::SendMessage {
            session: SessionId::stranger(u64::from(seq)),
            text: "late".to_string(),
        },
        FuzzEvent::StaleHistory { id } => {
            ClientEvent::OpenHistory { history: HistoryId(u64::from(id)) }
        },
        FuzzEvent::Logout => ClientEvent::Logout,
    };
    Some(event)
}

fn from_operation(
    sim: &mut Simulation,
    op: Operation,
    sessions: &[ChatSession],
) -> Option<ClientEvent> {
    let session_at =
        |slot: u8| sessions.get(usize::from(slot) % sessions.len().max(1)).map(|s| s.id.clone());
    let records: Vec<HistoryId> = sim.client().history().records().iter().map(|r| r.id).collect();
    let record_at = |slot: u8| records.get(usize::from(slot) % records.len().max(1)).copied();

    let event = match op {
        Operation::StartSearch { wait_budget } => ClientEvent::StartSearch {
            filters: MatchFilters::default(),
            wait_budget: wait_budget.map(|b| b.ticks()),
        },
        Operation::CancelSearch => ClientEvent::CancelSearch,
        Operation::AdvanceTime { delay } => {
            sim.advance(std::time::Duration::from_secs(delay.secs()));
            return None;
        },
        Operation::SetOnline { online } => ClientEvent::ConnectivityChanged { online },
        Operation::Send { slot, text } => {
            ClientEvent::SendMessage { session: session_at(slot)?, text: text.text() }
        },
        Operation::Close { slot } => ClientEvent::CloseSession { session: session_at(slot)? },
        Operation::Switch { slot } => ClientEvent::SwitchActive {
            session: match slot {
                Some(slot) => Some(session_at(slot)?),
                None => None,
            },
        },
        Operation::Skip => ClientEvent::SkipStranger,
        Operation::SendFriendRequest { participant } => ClientEvent::SendFriendRequest {
            participant: ParticipantId::new(participant_name(participant)),
        },
        Operation::OpenHistory { slot } => ClientEvent::OpenHistory { history: record_at(slot)? },
        Operation::DeleteHistory { slot } => {
            ClientEvent::DeleteHistory { history: record_at(slot)? }
        },
        Operation::ClearHistory => ClientEvent::ClearHistory,
    };
    Some(event)
}

fn check_invariants(sim: &Simulation) {
    let client = sim.client();
    let registry = client.registry();

    if let Some(active) = registry.active() {
        assert!(registry.contains(active), "active session {active} is not open");
    }

    assert!(registry.of_kind(SessionKind::Stranger).count() <= 1, "two stranger sessions");

    let records = client.history().records();
    assert!(records.len() <= HISTORY_LIMIT, "history over cap: {}", records.len());
    for pair in records.iter().collect::<Vec<_>>().windows(2) {
        assert!(pair[0].id > pair[1].id, "history out of order");
    }

    for replay in registry.of_kind(SessionKind::History) {
        assert!(replay.is_read_only, "writable replay {}", replay.id);
        assert!(
            records.iter().any(|r| SessionId::history(r.id) == replay.id),
            "replay {} outlived its record",
            replay.id
        );
    }

    if client.is_online() {
        assert!(client.queue().is_empty(), "messages queued while online");
    }
}
