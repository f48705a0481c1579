//! Client events and actions.
//!
//! Events flow in (user intent, timer ticks, backend and network reports);
//! actions flow out for the driver to execute or render.

use driftchat_core::{
    ChatHistory, ChatMode, ChatSession, FlushReport, Friend, FriendRequest, HistoryId,
    MatchFilters, MatchOutcome, MatchmakingState, MessageId, Participant, ParticipantId,
    RequestId, SearchId, SendRequestOutcome, SessionId, Timestamp, Transition,
};
use serde::{Deserialize, Serialize};

use crate::config::{Profile, Settings};

/// Input to [`ChatClient::handle`](crate::ChatClient::handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Start (or restart) matchmaking.
    StartSearch {
        /// Search criteria.
        filters: MatchFilters,
        /// Ticks to wait before giving up. `None` waits forever.
        wait_budget: Option<u32>,
    },
    /// Cancel matchmaking. Safe to repeat.
    CancelSearch,
    /// The backend pushed a partner for `search`.
    MatchFound {
        /// Search the match belongs to.
        search: SearchId,
        /// Matched participant.
        participant: Participant,
    },
    /// Fire every timer due at `now`.
    Tick {
        /// Current time.
        now: Timestamp,
    },
    /// Connectivity provider report.
    ConnectivityChanged {
        /// Whether the network is reachable.
        online: bool,
    },
    /// Send a message from the local user.
    SendMessage {
        /// Target session.
        session: SessionId,
        /// Message body.
        text: String,
    },
    /// Peer typing indicator.
    SetTyping {
        /// Session the indicator belongs to.
        session: SessionId,
        /// Whether the peer is typing.
        typing: bool,
    },
    /// Message received from the peer.
    PeerMessage {
        /// Session it arrived on.
        session: SessionId,
        /// Message body.
        text: String,
    },
    /// The stranger left the chat.
    PeerLeft {
        /// Stranger session.
        session: SessionId,
    },
    /// User closed a session.
    CloseSession {
        /// Session to close.
        session: SessionId,
    },
    /// End the stranger chat and search again with the last criteria.
    SkipStranger,
    /// Close a session and block its participant.
    Block {
        /// Session whose participant is blocked.
        session: SessionId,
    },
    /// Change the displayed session.
    SwitchActive {
        /// Session to show, or none.
        session: Option<SessionId>,
    },
    /// Open or focus the chat with a friend.
    OpenFriendChat {
        /// Friend to chat with.
        friend: ParticipantId,
    },
    /// Send a friend request.
    SendFriendRequest {
        /// Target participant.
        participant: ParticipantId,
    },
    /// An incoming friend request arrived.
    FriendRequestReceived(FriendRequest),
    /// The other side accepted a request we sent.
    FriendAdded(Friend),
    /// Accept an incoming request.
    AcceptRequest {
        /// Request to accept.
        request: RequestId,
    },
    /// Decline an incoming request. Safe to repeat.
    DeclineRequest {
        /// Request to decline.
        request: RequestId,
    },
    /// Remove a friend.
    Unfriend {
        /// Friend to remove.
        friend: ParticipantId,
    },
    /// Friend came online or went offline.
    FriendPresence {
        /// Friend whose presence changed.
        friend: ParticipantId,
        /// Whether they are online.
        online: bool,
    },
    /// Open an archived chat read-only.
    OpenHistory {
        /// Record to open.
        history: HistoryId,
    },
    /// Delete an archived chat.
    DeleteHistory {
        /// Record to delete.
        history: HistoryId,
    },
    /// Delete every archived chat.
    ClearHistory,
    /// Switch a session between text and video.
    SetChatMode {
        /// Target session.
        session: SessionId,
        /// New mode.
        mode: ChatMode,
    },
    /// Replace the user preferences.
    UpdateSettings(Settings),
    /// Replace the user profile.
    UpdateProfile(Profile),
    /// Tear down all per-user state.
    Logout,
}

/// Output of [`ChatClient::handle`](crate::ChatClient::handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Matchmaking started.
    SearchStarted {
        /// New search.
        search: SearchId,
    },
    /// Matchmaking ended. `TimedOut` is the "no match found" case.
    SearchEnded(MatchOutcome),
    /// A session was created or re-opened.
    SessionOpened {
        /// The session.
        session: SessionId,
    },
    /// A session was removed from the registry.
    SessionClosed {
        /// The session.
        session: SessionId,
    },
    /// The active session changed.
    ActiveChanged {
        /// New active session.
        active: Option<SessionId>,
    },
    /// A stranger chat was archived.
    Archived {
        /// New history record.
        history: HistoryId,
    },
    /// A history record was deleted.
    HistoryDeleted {
        /// Deleted record.
        history: HistoryId,
    },
    /// A local message was appended.
    MessageSent {
        /// Session it went to.
        session: SessionId,
        /// Message id.
        message: MessageId,
        /// Whether it waits for connectivity.
        queued: bool,
    },
    /// A peer or system message was appended.
    MessageReceived {
        /// Session it landed in.
        session: SessionId,
        /// Message id.
        message: MessageId,
    },
    /// Connectivity edge.
    Connectivity(Transition),
    /// Queued messages were settled (sent on reconnect, failed on logout).
    QueueSettled(FlushReport),
    /// Outcome of a friend request we sent.
    FriendRequestSent {
        /// Target participant.
        participant: ParticipantId,
        /// What happened.
        outcome: SendRequestOutcome,
    },
    /// A participant joined the friends list.
    FriendAdded {
        /// New friend.
        friend: ParticipantId,
    },
    /// A participant left the friends list.
    FriendRemoved {
        /// Former friend.
        friend: ParticipantId,
    },
    /// Show a user notification.
    Notify {
        /// Title line.
        title: String,
        /// Body text.
        body: String,
    },
    /// Write a value to the persistence store.
    Persist {
        /// Store key.
        key: String,
        /// Encoded value.
        value: String,
    },
}

/// Owned view of the whole client state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    /// Open sessions in list order.
    pub sessions: Vec<ChatSession>,
    /// Active session.
    pub active: Option<SessionId>,
    /// Matchmaking state.
    pub matchmaking: MatchmakingState,
    /// Archived chats, most recent first.
    pub history: Vec<ChatHistory>,
    /// Friends.
    pub friends: Vec<Friend>,
    /// Pending incoming requests.
    pub requests: Vec<FriendRequest>,
    /// Participants with a pending outgoing request.
    pub sent_requests: Vec<ParticipantId>,
    /// Blocked participants.
    pub blocked: Vec<ParticipantId>,
    /// Messages waiting for connectivity.
    pub queued: usize,
    /// Current connectivity.
    pub online: bool,
}
