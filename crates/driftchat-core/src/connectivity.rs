//! Online/offline tracking.
//!
//! The monitor only reports real edges. A provider that repeats
//! `online = true` does not trigger a second queue flush.

use serde::{Deserialize, Serialize};

/// A change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Went from online to offline.
    Lost,
    /// Went from offline to online.
    Restored,
}

/// Tracks the last observed connectivity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityMonitor {
    online: bool,
}

impl ConnectivityMonitor {
    /// Start in the given state.
    pub fn new(online: bool) -> Self {
        Self { online }
    }

    /// Whether sends currently go straight out.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record an observation and return the edge it caused, if any.
    pub fn observe(&mut self, online: bool) -> Option<Transition> {
        if self.online == online {
            return None;
        }
        self.online = online;
        let transition = if online { Transition::Restored } else { Transition::Lost };
        tracing::debug!(?transition, "connectivity changed");
        Some(transition)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
