//! Operations for model-based testing.
//!
//! Operations represent everything a user, the network or the passage of time
//! can do to a client. They are generated randomly by proptest (or by the
//! fuzzer via `Arbitrary`) and applied to both the model and the real client.

use arbitrary::Arbitrary;

/// Index into the open-session list, reduced modulo its length.
pub type SessionSlot = u8;

/// Index into the history list, reduced modulo its length.
pub type HistorySlot = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Start or restart matchmaking.
    StartSearch {
        /// Wait budget; `None` waits forever.
        wait_budget: Option<SmallBudget>,
    },

    /// Cancel matchmaking.
    CancelSearch,

    /// Advance simulation time, firing due timers.
    AdvanceTime {
        /// How far to advance.
        delay: SmallDelay,
    },

    /// Connectivity report.
    SetOnline {
        /// Whether the network is reachable.
        online: bool,
    },

    /// Send a message to a session.
    Send {
        /// Target session.
        slot: SessionSlot,
        /// Message body.
        text: SmallText,
    },

    /// Close a session.
    Close {
        /// Session to close.
        slot: SessionSlot,
    },

    /// Change the active session.
    Switch {
        /// Session to activate, or none.
        slot: Option<SessionSlot>,
    },

    /// Skip the current stranger and search again.
    Skip,

    /// Send a friend request.
    SendFriendRequest {
        /// Target participant number.
        participant: u8,
    },

    /// Open an archived chat.
    OpenHistory {
        /// Record to open.
        slot: HistorySlot,
    },

    /// Delete an archived chat.
    DeleteHistory {
        /// Record to delete.
        slot: HistorySlot,
    },

    /// Delete all archived chats.
    ClearHistory,
}

/// Wait budget in ticks, 0 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallBudget(pub u8);

impl SmallBudget {
    /// Budget in ticks.
    pub fn ticks(self) -> u32 {
        u32::from(self.0 % 6)
    }
}

/// Time advance in whole seconds, 0 to 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallDelay(pub u8);

impl SmallDelay {
    /// Delay in seconds.
    pub fn secs(self) -> u64 {
        u64::from(self.0 % 8)
    }
}

/// Message body drawn from a tiny alphabet so duplicates are common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallText {
    /// Which of four bodies to use.
    pub seed: u8,
    /// Send whitespace instead.
    pub blank: bool,
}

impl SmallText {
    /// Expand to the message body.
    pub fn text(self) -> String {
        if self.blank { "  ".to_string() } else { format!("m{}", self.seed % 4) }
    }
}

/// Participant id targeted by `SendFriendRequest`.
pub fn participant_name(participant: u8) -> String {
    format!("stranger-{}", participant % 8)
}

/// Resolve a slot against a list of the given length.
pub fn resolve_slot(slot: u8, len: usize) -> Option<usize> {
    (len > 0).then(|| usize::from(slot) % len)
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Rejected input (blank text).
    Validation,

    /// Referenced session or record does not exist.
    NotFound,

    /// Target cannot accept the operation (read-only replay).
    State,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
