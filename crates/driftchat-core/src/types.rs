//! Data model shared by every state machine.
//!
//! Sessions, messages and history records are plain data. All mutation goes
//! through the owning component (`SessionRegistry`, `FriendGraph`,
//! `HistoryArchiver`); the setters here only enforce per-value invariants such
//! as monotonic message status.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Create a timestamp from whole seconds since the epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    /// Milliseconds since the epoch.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward by `delay`, saturating at `u64::MAX`.
    pub fn saturating_add(self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Identifier of a matched or befriended participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap a participant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an archived chat.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HistoryId(pub u64);

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an incoming friend request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap a request identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a message, unique within its session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

/// Identifier of one matchmaking run.
///
/// Every `start` allocates a fresh id so that timers and backend answers
/// belonging to an earlier run can be recognised and dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SearchId(pub u64);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session identifier.
///
/// Friend and history ids are derived deterministically from their source so
/// that re-opening never creates a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Id for the `seq`-th stranger session of this process.
    pub fn stranger(seq: u64) -> Self {
        Self(format!("stranger:{seq}"))
    }

    /// Id of the chat with a friend.
    pub fn friend(friend: &ParticipantId) -> Self {
        Self(format!("friend:{friend}"))
    }

    /// Id of the read-only replay of an archived chat.
    pub fn history(history: HistoryId) -> Self {
        Self(format!("history:{history}"))
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The local user.
    Me,
    /// The remote participant.
    Peer,
    /// Client-generated notice ("X is no longer your friend").
    System,
}

/// Delivery status of a message.
///
/// Transitions are monotonic: `Sending -> Sent` or `Sending -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Queued locally, not yet handed to the network.
    Sending,
    /// Delivered.
    Sent,
    /// Given up on.
    Failed,
}

impl MessageStatus {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Sending, Self::Sent | Self::Failed))
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the owning session.
    pub id: MessageId,
    /// Author.
    pub sender: Sender,
    /// Body text.
    pub text: String,
    /// When the message was appended.
    pub timestamp: Timestamp,
    /// Whether the local user has seen it.
    pub is_read: bool,
    /// Delivery status.
    pub status: MessageStatus,
}

/// Kind of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Ephemeral chat with a matched stranger. At most one exists.
    Stranger,
    /// Persistent chat with an accepted friend.
    Friend,
    /// Read-only replay of an archived stranger chat.
    History,
}

/// Text or video chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Text only.
    #[default]
    Text,
    /// Video with text side channel.
    Video,
}

/// Who ended a stranger chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndedBy {
    /// The local user closed, skipped or blocked.
    You,
    /// The peer left.
    Stranger,
}

/// Snapshot of the person on the other side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable participant id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar URL or emoji.
    pub avatar: String,
    /// Free-form bio.
    pub bio: String,
    /// Coarse region label.
    pub region: String,
}

/// An accepted friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    /// Stable participant id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Avatar URL or emoji.
    pub avatar: String,
    /// Free-form bio.
    pub bio: String,
    /// Coarse region label.
    pub region: String,
    /// Current presence.
    pub is_online: bool,
    /// Last time the friend was seen online.
    pub last_seen: Option<Timestamp>,
}

impl Friend {
    /// Snapshot of this friend as a session participant.
    pub fn to_participant(&self) -> Participant {
        Participant {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            bio: self.bio.clone(),
            region: self.region.clone(),
        }
    }
}

impl From<Participant> for Friend {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            name: participant.name,
            avatar: participant.avatar,
            bio: participant.bio,
            region: participant.region,
            is_online: true,
            last_seen: None,
        }
    }
}

/// Pending incoming friend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Request id.
    pub id: RequestId,
    /// Requesting person.
    pub from: Friend,
    /// When the request arrived.
    pub timestamp: Timestamp,
}

/// A chat session owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Session id.
    pub id: SessionId,
    /// Session kind.
    pub kind: SessionKind,
    /// Participant id, duplicated from the snapshot for lookups.
    pub participant_id: ParticipantId,
    /// Participant snapshot taken when the session was created.
    pub participant: Participant,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// Whether the peer is currently typing.
    pub is_typing: bool,
    /// Messages received while the session was not active.
    pub unread_count: u32,
    /// Text or video.
    pub chat_mode: ChatMode,
    /// History replays reject sends and typing updates.
    pub is_read_only: bool,
    /// When the chat began. Required to archive a stranger chat.
    pub started_at: Option<Timestamp>,
    /// Next message id to hand out.
    next_message_id: u64,
}

impl ChatSession {
    /// A freshly matched stranger chat.
    pub fn stranger(
        id: SessionId,
        participant: Participant,
        chat_mode: ChatMode,
        started_at: Timestamp,
    ) -> Self {
        Self::new(id, SessionKind::Stranger, participant, chat_mode, Some(started_at))
    }

    /// A chat with an accepted friend.
    pub fn friend(friend: &Friend, started_at: Timestamp) -> Self {
        Self::new(
            SessionId::friend(&friend.id),
            SessionKind::Friend,
            friend.to_participant(),
            ChatMode::Text,
            Some(started_at),
        )
    }

    /// Read-only replay of an archived record.
    ///
    /// Messages are copied verbatim so the replay is content-identical to
    /// what was archived.
    pub fn replay(record: &ChatHistory) -> Self {
        let next_message_id = record.messages.iter().map(|m| m.id.0 + 1).max().unwrap_or(0);
        Self {
            id: SessionId::history(record.id),
            kind: SessionKind::History,
            participant_id: record.participant_id.clone(),
            participant: record.participant.clone(),
            messages: record.messages.clone(),
            is_typing: false,
            unread_count: 0,
            chat_mode: record.chat_mode,
            is_read_only: true,
            started_at: Some(record.start_time),
            next_message_id,
        }
    }

    fn new(
        id: SessionId,
        kind: SessionKind,
        participant: Participant,
        chat_mode: ChatMode,
        started_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            kind,
            participant_id: participant.id.clone(),
            participant,
            messages: Vec::new(),
            is_typing: false,
            unread_count: 0,
            chat_mode,
            is_read_only: false,
            started_at,
            next_message_id: 0,
        }
    }

    /// Append a message and return its id.
    ///
    /// Messages authored locally are born read; peer and system messages are
    /// born unread.
    pub fn append(
        &mut self,
        sender: Sender,
        text: impl Into<String>,
        status: MessageStatus,
        timestamp: Timestamp,
    ) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        self.messages.push(Message {
            id,
            sender,
            text: text.into(),
            timestamp,
            is_read: sender == Sender::Me,
            status,
        });
        id
    }

    /// Look up a message by id.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// First locally-authored message still `Sending` with exactly this text.
    pub fn first_sending_with_text(&self, text: &str) -> Option<MessageId> {
        self.messages
            .iter()
            .find(|m| m.sender == Sender::Me && m.status == MessageStatus::Sending && m.text == text)
            .map(|m| m.id)
    }

    /// Move a message to `next` status if the transition is monotonic.
    ///
    /// Returns `false` for unknown ids and rejected transitions; the message
    /// is left untouched in both cases.
    pub fn set_status(&mut self, id: MessageId, next: MessageStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if message.status.can_transition_to(next) => {
                message.status = next;
                true
            },
            _ => false,
        }
    }

    /// Mark every message read and reset the unread counter.
    pub fn mark_all_read(&mut self) {
        for message in &mut self.messages {
            message.is_read = true;
        }
        self.unread_count = 0;
    }
}

/// Archived stranger chat, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    /// Record id.
    pub id: HistoryId,
    /// Participant snapshot at termination.
    pub participant: Participant,
    /// Participant id.
    pub participant_id: ParticipantId,
    /// Whole seconds between start and termination.
    pub duration_secs: u64,
    /// Number of archived messages.
    pub message_count: usize,
    /// Who ended the chat.
    pub ended_by: EndedBy,
    /// When the chat began.
    pub start_time: Timestamp,
    /// Whether the participant was (or was being) befriended.
    pub became_friend: bool,
    /// Text or video.
    pub chat_mode: ChatMode,
    /// Full message list at termination.
    pub messages: Vec<Message>,
}
