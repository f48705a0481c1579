//! Friend graph: friends, incoming requests, sent requests, blocks.
//!
//! ## Invariants
//!
//! - The sent-request set never contains a friend's id.
//! - At most one pending incoming request per sender.
//! - Blocked participants are neither friends nor pending in either direction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    types::{Friend, FriendRequest, ParticipantId, RequestId, Timestamp},
};

/// Result of [`FriendGraph::send_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendRequestOutcome {
    /// Target is already a friend. Nothing changed.
    AlreadyFriend,
    /// A request to the target is already pending. Nothing changed.
    AlreadySent,
    /// Target is blocked. Nothing changed.
    Blocked,
    /// Request recorded.
    Sent,
}

/// Result of [`FriendGraph::decline_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineOutcome {
    /// The request was removed.
    Declined,
    /// Nothing to remove (accepted or declined elsewhere).
    AlreadyGone,
}

/// Result of [`FriendGraph::receive_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingOutcome {
    /// Stored as a new pending request.
    Queued,
    /// Dropped: sender already a friend, already pending, or blocked.
    Ignored,
}

/// Friends and friend requests.
#[derive(Debug, Clone, Default)]
pub struct FriendGraph {
    friends: Vec<Friend>,
    requests: Vec<FriendRequest>,
    sent: BTreeSet<ParticipantId>,
    blocked: BTreeSet<ParticipantId>,
}

impl FriendGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Friends in the order they were added.
    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    /// Pending incoming requests, oldest first.
    pub fn requests(&self) -> &[FriendRequest] {
        &self.requests
    }

    /// Participants we sent a request to.
    pub fn sent_requests(&self) -> &BTreeSet<ParticipantId> {
        &self.sent
    }

    /// Blocked participants.
    pub fn blocked(&self) -> &BTreeSet<ParticipantId> {
        &self.blocked
    }

    /// Look up a friend.
    pub fn friend(&self, id: &ParticipantId) -> Option<&Friend> {
        self.friends.iter().find(|f| &f.id == id)
    }

    /// Whether `id` is a friend.
    pub fn is_friend(&self, id: &ParticipantId) -> bool {
        self.friend(id).is_some()
    }

    /// Whether a request to `id` is pending.
    pub fn has_sent_request(&self, id: &ParticipantId) -> bool {
        self.sent.contains(id)
    }

    /// Whether `id` is blocked.
    pub fn is_blocked(&self, id: &ParticipantId) -> bool {
        self.blocked.contains(id)
    }

    /// Accept a pending request.
    ///
    /// The sender joins the friends list and any pending outgoing marker for
    /// them is dropped.
    pub fn accept_request(&mut self, id: &RequestId) -> Result<Friend, CoreError> {
        let index = self
            .requests
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| CoreError::RequestNotFound { request: id.clone() })?;
        let request = self.requests.remove(index);
        let friend = request.from;

        self.sent.remove(&friend.id);
        if !self.is_friend(&friend.id) {
            self.friends.push(friend.clone());
        }
        tracing::info!(request = %id, friend = %friend.id, "friend request accepted");
        Ok(friend)
    }

    /// Decline a pending request. Idempotent.
    pub fn decline_request(&mut self, id: &RequestId) -> DeclineOutcome {
        let before = self.requests.len();
        self.requests.retain(|r| &r.id != id);
        if self.requests.len() == before {
            DeclineOutcome::AlreadyGone
        } else {
            tracing::debug!(request = %id, "friend request declined");
            DeclineOutcome::Declined
        }
    }

    /// Record an outgoing request.
    pub fn send_request(&mut self, target: &ParticipantId) -> SendRequestOutcome {
        if self.is_blocked(target) {
            return SendRequestOutcome::Blocked;
        }
        if self.is_friend(target) {
            return SendRequestOutcome::AlreadyFriend;
        }
        if !self.sent.insert(target.clone()) {
            return SendRequestOutcome::AlreadySent;
        }
        tracing::debug!(%target, "friend request sent");
        SendRequestOutcome::Sent
    }

    /// Store an incoming request unless it is redundant or blocked.
    pub fn receive_request(&mut self, request: FriendRequest) -> IncomingOutcome {
        let from = &request.from.id;
        let duplicate = self.requests.iter().any(|r| &r.from.id == from || r.id == request.id);
        if self.is_friend(from) || self.is_blocked(from) || duplicate {
            return IncomingOutcome::Ignored;
        }
        self.requests.push(request);
        IncomingOutcome::Queued
    }

    /// Add a friend directly (e.g. the peer accepted our request).
    pub fn add_friend(&mut self, friend: Friend) -> bool {
        self.sent.remove(&friend.id);
        self.requests.retain(|r| r.from.id != friend.id);
        if self.is_friend(&friend.id) || self.is_blocked(&friend.id) {
            return false;
        }
        self.friends.push(friend);
        true
    }

    /// Remove a friend.
    pub fn unfriend(&mut self, id: &ParticipantId) -> Result<Friend, CoreError> {
        let index = self
            .friends
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| CoreError::NotFriend { participant: id.clone() })?;
        tracing::info!(friend = %id, "unfriended");
        Ok(self.friends.remove(index))
    }

    /// Block a participant, dropping every relationship with them.
    pub fn block(&mut self, id: &ParticipantId) {
        self.friends.retain(|f| &f.id != id);
        self.requests.retain(|r| &r.from.id != id);
        self.sent.remove(id);
        self.blocked.insert(id.clone());
    }

    /// Update a friend's presence. Going offline stamps `last_seen`.
    pub fn set_presence(
        &mut self,
        id: &ParticipantId,
        online: bool,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        let friend = self
            .friends
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| CoreError::NotFriend { participant: id.clone() })?;
        if friend.is_online && !online {
            friend.last_seen = Some(now);
        }
        friend.is_online = online;
        Ok(())
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
