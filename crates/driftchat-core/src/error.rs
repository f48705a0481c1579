//! Core error types.
//!
//! Nothing in the core is fatal. Every variant describes a rejected request
//! that left state untouched, so callers surface it as a transient notice.

use thiserror::Error;

use crate::types::{HistoryId, ParticipantId, RequestId, SessionId, SessionKind};

/// Classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input rejected locally (e.g. empty text).
    Validation,
    /// The referenced id no longer exists. Expected with concurrent UI actions.
    NotFound,
    /// The target exists but cannot accept the operation.
    State,
}

/// Errors from core state machine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Message text was empty or whitespace only.
    #[error("message text is empty")]
    EmptyMessage,

    /// Session not present in the registry.
    #[error("session not found: {session}")]
    SessionNotFound {
        /// The session id that was not found.
        session: SessionId,
    },

    /// Friend request id is stale (already accepted or declined).
    #[error("friend request not found: {request}")]
    RequestNotFound {
        /// The request id that was not found.
        request: RequestId,
    },

    /// History record does not exist.
    #[error("history record not found: {history}")]
    HistoryNotFound {
        /// The history id that was not found.
        history: HistoryId,
    },

    /// Participant is not in the friends list.
    #[error("not a friend: {participant}")]
    NotFriend {
        /// The participant that is not a friend.
        participant: ParticipantId,
    },

    /// Write attempted on a read-only history replay.
    #[error("session is read-only: {session}")]
    ReadOnlySession {
        /// The read-only session.
        session: SessionId,
    },

    /// Operation needs a different session kind.
    #[error("session {session} is {actual:?}, expected {expected:?}")]
    WrongSessionKind {
        /// The session that was targeted.
        session: SessionId,
        /// Kind the operation requires.
        expected: SessionKind,
        /// Kind the session has.
        actual: SessionKind,
    },

    /// Stranger session cannot be archived without a start time.
    #[error("session {session} has no start time")]
    MissingStartTime {
        /// The session lacking a start time.
        session: SessionId,
    },
}

impl CoreError {
    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyMessage => ErrorKind::Validation,
            Self::SessionNotFound { .. }
            | Self::RequestNotFound { .. }
            | Self::HistoryNotFound { .. }
            | Self::NotFriend { .. } => ErrorKind::NotFound,
            Self::ReadOnlySession { .. }
            | Self::WrongSessionKind { .. }
            | Self::MissingStartTime { .. } => ErrorKind::State,
        }
    }

    /// Returns true if the error stems from an id that went stale.
    ///
    /// Stale ids are routine when two UI actions race; callers typically log
    /// and move on.
    pub fn is_stale(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_is_validation() {
        assert_eq!(CoreError::EmptyMessage.kind(), ErrorKind::Validation);
        assert!(!CoreError::EmptyMessage.is_stale());
    }

    #[test]
    fn missing_ids_are_stale() {
        let err = CoreError::SessionNotFound { session: SessionId::stranger(3) };
        assert!(err.is_stale());

        let err = CoreError::RequestNotFound { request: RequestId::new("req-1") };
        assert!(err.is_stale());
    }

    #[test]
    fn read_only_is_state_error() {
        let err = CoreError::ReadOnlySession { session: SessionId::history(HistoryId(1)) };
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn error_display() {
        let err = CoreError::SessionNotFound { session: SessionId::stranger(3) };
        assert_eq!(err.to_string(), "session not found: stranger:3");
    }
}
