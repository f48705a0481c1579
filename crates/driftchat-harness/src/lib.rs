//! Deterministic simulation harness for the driftchat client.
//!
//! A seeded [`SimEnv`] with a manual clock, scriptable and recording port
//! implementations, and a [`Simulation`] driver that fires timers at their
//! own deadlines. Same seed, same run.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and the real client,
//! and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;
pub mod sim_ports;
pub mod simulation;

pub use model::{
    MODEL_LATENCY_SECS, ModelMessage, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult, SmallBudget, SmallDelay, SmallText, model_config,
};
pub use sim_env::SimEnv;
pub use sim_ports::{Notification, RecordingNotifier, ScriptedMatchmaker, participant};
pub use simulation::Simulation;
