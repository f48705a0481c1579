//! Driftchat production runtime.
//!
//! This crate provides the production driver for the client using:
//! - Tokio for the event loop, channels and the tick timer
//! - System time and OS randomness
//!
//! ## Architecture
//!
//! ```text
//! driftchat-runtime
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ Runtime            (select loop: commands, connectivity, ticks)
//!   ├─ RuntimeHandle      (cloneable command sender)
//!   └─ TracingNotifier    (NotificationSink that logs)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod runtime;
mod system_env;

pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeConfig, RuntimeHandle, TracingNotifier};
pub use system_env::SystemEnv;
