//! Driftchat client orchestrator.
//!
//! Composes the core state machines behind one event-in / action-out
//! interface and defines the ports the client needs from the outside world.
//!
//! ## Architecture
//!
//! ```text
//! driftchat-client
//!   ├─ ChatClient         (handle(event) -> actions)
//!   ├─ ports              (store, notifications, matchmaking, peer replies, connectivity)
//!   └─ config             (ClientConfig, persisted Settings and Profile)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod config;
mod error;
mod event;
pub mod ports;

pub use client::ChatClient;
pub use config::{ClientConfig, PROFILE_KEY, Persisted, Profile, SETTINGS_KEY, Settings};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, ClientSnapshot};
pub use ports::{
    CannedResponder, ConnectivityHub, ConnectivityListener, ConnectivityProvider,
    MatchmakingTransport, MemoryStore, NotificationSink, PeerReply, PeerResponder,
    PersistenceStore, SilentPeer, SimulatedMatchmaker, Subscription,
};
