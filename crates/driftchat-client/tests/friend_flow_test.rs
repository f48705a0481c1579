//! Friend graph flows through the client.
//!
//! Random request/accept/block/unfriend sequences must keep the friend,
//! request, sent and blocked sets mutually consistent.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;

use driftchat_client::{ChatClient, ClientAction, ClientConfig, ClientEvent};
use driftchat_core::{
    Environment, Friend, FriendRequest, Participant, ParticipantId, RequestId, SendRequestOutcome,
    SessionId, Timestamp,
};
use proptest::prelude::*;

#[derive(Clone)]
struct FixedEnv;

impl Environment for FixedEnv {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(1_000)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

fn person(n: u8) -> Friend {
    Friend::from(Participant {
        id: ParticipantId::new(format!("p{n}")),
        name: format!("P{n}"),
        avatar: String::new(),
        bio: String::new(),
        region: "EU".to_string(),
    })
}

fn request(n: u8) -> FriendRequest {
    FriendRequest {
        id: RequestId::new(format!("r{n}")),
        from: person(n),
        timestamp: Timestamp::from_secs(1_000),
    }
}

#[derive(Debug, Clone)]
enum Step {
    Receive(u8),
    Accept(u8),
    Decline(u8),
    Send(u8),
    Added(u8),
    Unfriend(u8),
    Open(u8),
    Block(u8),
}

fn step() -> impl Strategy<Value = Step> {
    let who = 0u8..6;
    prop_oneof![
        who.clone().prop_map(Step::Receive),
        who.clone().prop_map(Step::Accept),
        who.clone().prop_map(Step::Decline),
        who.clone().prop_map(Step::Send),
        who.clone().prop_map(Step::Added),
        who.clone().prop_map(Step::Unfriend),
        who.clone().prop_map(Step::Open),
        who.prop_map(Step::Block),
    ]
}

fn to_event(client: &ChatClient<FixedEnv>, step: &Step) -> ClientEvent {
    let id = |n: u8| ParticipantId::new(format!("p{n}"));
    match *step {
        Step::Receive(n) => ClientEvent::FriendRequestReceived(request(n)),
        Step::Accept(n) => ClientEvent::AcceptRequest { request: RequestId::new(format!("r{n}")) },
        Step::Decline(n) => {
            ClientEvent::DeclineRequest { request: RequestId::new(format!("r{n}")) }
        },
        Step::Send(n) => ClientEvent::SendFriendRequest { participant: id(n) },
        Step::Added(n) => ClientEvent::FriendAdded(person(n)),
        Step::Unfriend(n) => ClientEvent::Unfriend { friend: id(n) },
        Step::Open(n) => ClientEvent::OpenFriendChat { friend: id(n) },
        Step::Block(n) => {
            let session = SessionId::friend(&id(n));
            if client.registry().contains(&session) {
                ClientEvent::Block { session }
            } else {
                ClientEvent::Unfriend { friend: id(n) }
            }
        },
    }
}

proptest! {
    #[test]
    fn prop_friend_sets_stay_consistent(steps in prop::collection::vec(step(), 0..60)) {
        let mut client = ChatClient::new(FixedEnv, ClientConfig::default());

        for step in &steps {
            let event = to_event(&client, step);
            let _ = client.handle(event);

            let friends = client.friends();
            let ids: BTreeSet<_> = friends.friends().iter().map(|f| f.id.clone()).collect();

            prop_assert_eq!(ids.len(), friends.friends().len(), "duplicate friend");
            prop_assert!(ids.is_disjoint(friends.blocked()));
            prop_assert!(ids.is_disjoint(friends.sent_requests()));
            prop_assert!(friends.blocked().is_disjoint(friends.sent_requests()));
            for request in friends.requests() {
                prop_assert!(!ids.contains(&request.from.id));
                prop_assert!(!friends.is_blocked(&request.from.id));
            }
            for session in client.registry().sessions() {
                prop_assert!(!friends.is_blocked(&session.participant_id));
            }
        }
    }
}

#[test]
fn accepted_request_opens_a_friend_chat() {
    let mut client = ChatClient::new(FixedEnv, ClientConfig::default());
    client.handle(ClientEvent::FriendRequestReceived(request(1))).unwrap();

    let actions =
        client.handle(ClientEvent::AcceptRequest { request: RequestId::new("r1") }).unwrap();
    assert_eq!(actions, vec![ClientAction::FriendAdded { friend: ParticipantId::new("p1") }]);

    client.handle(ClientEvent::OpenFriendChat { friend: ParticipantId::new("p1") }).unwrap();
    let session = SessionId::friend(&ParticipantId::new("p1"));
    assert_eq!(client.registry().active(), Some(&session));

    // Accepting twice is a stale id.
    let again = client.handle(ClientEvent::AcceptRequest { request: RequestId::new("r1") });
    assert!(again.unwrap_err().is_stale());
}

#[test]
fn requests_from_blocked_people_are_dropped() {
    let mut client = ChatClient::new(FixedEnv, ClientConfig::default());
    client.handle(ClientEvent::FriendAdded(person(2))).unwrap();
    client.handle(ClientEvent::OpenFriendChat { friend: ParticipantId::new("p2") }).unwrap();
    let session = SessionId::friend(&ParticipantId::new("p2"));

    let actions = client.handle(ClientEvent::Block { session }).unwrap();
    assert!(actions.contains(&ClientAction::FriendRemoved { friend: ParticipantId::new("p2") }));

    let actions = client.handle(ClientEvent::FriendRequestReceived(request(2))).unwrap();
    assert!(actions.is_empty());
    assert!(client.friends().requests().is_empty());

    let actions =
        client.handle(ClientEvent::SendFriendRequest { participant: ParticipantId::new("p2") });
    assert!(matches!(
        actions.unwrap().as_slice(),
        [ClientAction::FriendRequestSent { outcome: SendRequestOutcome::Blocked, .. }]
    ));
    assert!(client.friends().sent_requests().is_empty());

    let actions =
        client.handle(ClientEvent::SendFriendRequest { participant: ParticipantId::new("p3") });
    assert!(matches!(
        actions.unwrap().as_slice(),
        [ClientAction::FriendRequestSent { outcome: SendRequestOutcome::Sent, .. }]
    ));
}
