//! Reference model for model-based testing.
//!
//! The model is a simplified rendition of the chat client that keeps only
//! what a user can observe: open sessions and their messages, the active
//! pointer, the archive, the offline queue and outgoing friend requests.
//! It serves as the oracle against which the real client is verified.
//!
//! # Design Principles
//!
//! - Simplicity: the model should be obviously correct
//! - Observable behaviour only: no timers, no backends, no ports
//! - Deterministic: matchmaking latency is pinned by [`model_config`]

pub mod operation;
mod world;

pub use operation::{
    HistorySlot, Operation, OperationError, OperationResult, SessionSlot, SmallBudget, SmallDelay,
    SmallText, participant_name, resolve_slot,
};
pub use world::{MODEL_LATENCY_SECS, ModelMessage, ModelWorld, ObservableState, model_config};
