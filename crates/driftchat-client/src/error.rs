//! Client error types.

use driftchat_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A core state machine rejected the request.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A persisted value could not be decoded.
    #[error("corrupt value under {key}: {reason}")]
    Corrupt {
        /// Store key that held the value.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A value could not be encoded for persistence.
    #[error("failed to encode {key}: {reason}")]
    Encode {
        /// Store key the value was meant for.
        key: String,
        /// Encoder message.
        reason: String,
    },
}

impl ClientError {
    /// Core taxonomy bucket, if this came from a core state machine.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Core(e) => Some(e.kind()),
            Self::Corrupt { .. } | Self::Encode { .. } => None,
        }
    }

    /// Returns true if the request referenced an id that no longer exists.
    ///
    /// Stale ids are expected when UI actions race each other; callers
    /// usually just drop these.
    pub fn is_stale(&self) -> bool {
        match self {
            Self::Core(e) => e.is_stale(),
            Self::Corrupt { .. } | Self::Encode { .. } => false,
        }
    }
}
