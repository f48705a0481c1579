//! Runtime errors.

use driftchat_client::ClientError;
use thiserror::Error;

/// Errors surfaced through a [`RuntimeHandle`](crate::RuntimeHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The client rejected the event. State is unchanged.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The runtime loop has stopped.
    #[error("runtime is not running")]
    Closed,
}
