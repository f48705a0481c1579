//! Client configuration and persisted preferences.
//!
//! [`ClientConfig`] is fixed at construction. [`Settings`] and [`Profile`]
//! are user-editable and live in the [`PersistenceStore`] as JSON under
//! stable keys. A missing key loads the default; a value that fails to decode
//! is reported as [`ClientError::Corrupt`] rather than silently replaced.

use driftchat_core::{ChatMode, MatchmakingConfig};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{error::ClientError, ports::PersistenceStore};

/// Store key for [`Settings`].
pub const SETTINGS_KEY: &str = "driftchat.settings";

/// Store key for [`Profile`].
pub const PROFILE_KEY: &str = "driftchat.profile";

/// Static client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Matchmaking latency and tick timing.
    pub matchmaking: MatchmakingConfig,
    /// Maximum number of archived chats kept.
    pub history_limit: usize,
    /// Show the typing indicator while a peer reply is pending.
    pub peer_typing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { matchmaking: MatchmakingConfig::default(), history_limit: 100, peer_typing: true }
    }
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Emit notifications for matches, messages and friend requests.
    pub notifications_enabled: bool,
    /// Chat mode used when a search does not request one.
    pub default_chat_mode: ChatMode,
    /// Seconds to wait for a match before giving up. `None` waits forever.
    pub wait_budget_secs: Option<u32>,
    /// Region preference passed to matchmaking.
    pub preferred_region: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            default_chat_mode: ChatMode::Text,
            wait_budget_secs: None,
            preferred_region: None,
        }
    }
}

/// The local user's public profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Avatar URL or identifier.
    pub avatar: String,
    /// Short bio.
    pub bio: String,
    /// Home region.
    pub region: String,
}

/// A value stored as JSON under a fixed key.
pub trait Persisted: Serialize + DeserializeOwned + Default {
    /// Store key.
    const KEY: &'static str;

    /// Load from `store`, defaulting when absent.
    fn load(store: &dyn PersistenceStore) -> Result<Self, ClientError> {
        match store.get(Self::KEY) {
            None => Ok(Self::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ClientError::Corrupt {
                key: Self::KEY.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Encode to the stored representation.
    fn encode(&self) -> Result<String, ClientError> {
        serde_json::to_string(self)
            .map_err(|e| ClientError::Encode { key: Self::KEY.to_string(), reason: e.to_string() })
    }

    /// Write to `store`.
    fn save(&self, store: &mut dyn PersistenceStore) -> Result<(), ClientError> {
        store.set(Self::KEY, self.encode()?);
        Ok(())
    }
}

impl Persisted for Settings {
    const KEY: &'static str = SETTINGS_KEY;
}

impl Persisted for Profile {
    const KEY: &'static str = PROFILE_KEY;
}
