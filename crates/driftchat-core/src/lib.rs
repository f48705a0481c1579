//! Driftchat core state machines.
//!
//! Everything here is Sans-IO: no sockets, no sleeping, no wall clock. Time
//! and randomness come from an [`Environment`], delays are scheduled on a
//! [`Clock`] as typed [`TimerEvent`]s, and the client crate drives both.
//!
//! ## Architecture
//!
//! ```text
//! driftchat-core
//!   ├─ Matchmaking        (cancellable timed search, SearchId-guarded)
//!   ├─ DeliveryQueue      (offline sends, flushed on reconnect)
//!   ├─ ConnectivityMonitor(online/offline edges)
//!   ├─ FriendGraph        (friends, requests, blocks)
//!   ├─ HistoryArchiver    (archived stranger chats, read-only replays)
//!   ├─ SessionRegistry    (open sessions + active pointer)
//!   └─ TimerQueue         (deterministic Clock)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connectivity;
pub mod delivery;
pub mod env;
pub mod error;
pub mod friends;
pub mod history;
pub mod matchmaking;
pub mod registry;
pub mod timer;
pub mod types;

pub use connectivity::{ConnectivityMonitor, Transition};
pub use delivery::{DeliveryQueue, FlushReport, QueuedMessage, SendOutcome};
pub use env::Environment;
pub use error::{CoreError, ErrorKind};
pub use friends::{DeclineOutcome, FriendGraph, IncomingOutcome, SendRequestOutcome};
pub use history::{ArchiveReceipt, DeleteReport, HistoryArchiver};
pub use matchmaking::{
    MatchEffect, MatchFilters, MatchInput, MatchOutcome, Matchmaking, MatchmakingConfig,
    MatchmakingState,
};
pub use registry::{InstallReport, Retired, SessionRegistry};
pub use timer::{Clock, FiredTimer, TimerEvent, TimerHandle, TimerQueue};
pub use types::{
    ChatHistory, ChatMode, ChatSession, EndedBy, Friend, FriendRequest, HistoryId, Message,
    MessageId, MessageStatus, Participant, ParticipantId, RequestId, SearchId, Sender, SessionId,
    SessionKind, Timestamp,
};
