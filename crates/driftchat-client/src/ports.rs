//! Outward ports.
//!
//! The client never talks to storage, the OS notification center, the
//! matchmaking backend or the network monitor directly. Each of those sits
//! behind a narrow trait so the same orchestration runs in production, in the
//! simulation harness, and in unit tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use driftchat_core::{MatchFilters, Participant, ParticipantId, SearchId, SessionId};

/// Key-value store for settings and profile.
pub trait PersistenceStore {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: String);
}

/// In-memory [`PersistenceStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}

/// Fire-and-forget user notifications.
pub trait NotificationSink {
    /// Show a notification. The result is never consumed.
    fn notify(&mut self, title: &str, body: &str);
}

/// A delayed reply produced by a [`PeerResponder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReply {
    /// Delay before the reply lands.
    pub delay: Duration,
    /// Reply body.
    pub text: String,
}

/// Source of automatic peer replies after an online send.
///
/// `entropy` is drawn from the client's environment so seeded simulations
/// replay the same replies.
pub trait PeerResponder {
    /// Decide whether and how the peer answers `text`.
    fn respond(&mut self, session: &SessionId, text: &str, entropy: u64) -> Option<PeerReply>;
}

/// Responder that never answers. Real peers reply over the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPeer;

impl PeerResponder for SilentPeer {
    fn respond(&mut self, _session: &SessionId, _text: &str, _entropy: u64) -> Option<PeerReply> {
        None
    }
}

/// Demo responder that picks a canned reply after a random delay.
#[derive(Debug, Clone)]
pub struct CannedResponder {
    replies: Vec<String>,
    min_delay: Duration,
    max_delay: Duration,
}

impl CannedResponder {
    /// Create a responder choosing from `replies` with a delay in
    /// `[min_delay, max_delay]`.
    pub fn new(replies: Vec<String>, min_delay: Duration, max_delay: Duration) -> Self {
        Self { replies, min_delay, max_delay: max_delay.max(min_delay) }
    }
}

impl Default for CannedResponder {
    fn default() -> Self {
        let replies = ["Hey there!", "Haha, nice", "Where are you from?", "Tell me more", "lol"]
            .into_iter()
            .map(str::to_string)
            .collect();
        Self::new(replies, Duration::from_millis(1_500), Duration::from_millis(4_000))
    }
}

impl PeerResponder for CannedResponder {
    fn respond(&mut self, _session: &SessionId, _text: &str, entropy: u64) -> Option<PeerReply> {
        if self.replies.is_empty() {
            return None;
        }
        let count = u64::try_from(self.replies.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(entropy % count).unwrap_or(0);
        let text = self.replies.get(index)?.clone();

        let low = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let high = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let span = high.saturating_sub(low).saturating_add(1);
        let delay = Duration::from_millis(low.saturating_add((entropy >> 32) % span));

        Some(PeerReply { delay, text })
    }
}

/// Matchmaking backend.
///
/// `find` is asked once the matchmaking latency elapses. Returning `None`
/// means the backend will deliver the participant later through
/// `ClientEvent::MatchFound`; the search keeps running until then.
pub trait MatchmakingTransport {
    /// Produce a partner for `search`, if one is available now.
    fn find(&mut self, search: SearchId, filters: &MatchFilters) -> Option<Participant>;

    /// Abandon `search`. Called for cancellations and timeouts.
    fn stop(&mut self, search: SearchId);
}

/// Local stand-in for a matchmaking backend.
///
/// Synthesizes a fresh anonymous participant for every search, honouring the
/// requested region.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMatchmaker {
    issued: u64,
}

const NAMES: [&str; 8] = ["Wren", "Juno", "Kai", "Sol", "Ines", "Milo", "Noor", "Tove"];
const REGIONS: [&str; 4] = ["NA", "EU", "APAC", "LATAM"];

impl SimulatedMatchmaker {
    /// Create a matchmaker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchmakingTransport for SimulatedMatchmaker {
    fn find(&mut self, search: SearchId, filters: &MatchFilters) -> Option<Participant> {
        self.issued += 1;
        let slot = usize::try_from(self.issued).unwrap_or(0);
        let name = NAMES[slot % NAMES.len()];
        let region = filters
            .region
            .clone()
            .unwrap_or_else(|| REGIONS[slot % REGIONS.len()].to_string());
        let bio = if filters.interests.is_empty() {
            String::new()
        } else {
            format!("Into {}", filters.interests.join(", "))
        };

        tracing::debug!(%search, issued = self.issued, "simulated match");
        Some(Participant {
            id: ParticipantId::new(format!("stranger-{}", self.issued)),
            name: name.to_string(),
            avatar: String::new(),
            bio,
            region,
        })
    }

    fn stop(&mut self, search: SearchId) {
        tracing::debug!(%search, "simulated search stopped");
    }
}

/// Callback invoked with every online/offline report.
pub type ConnectivityListener = Box<dyn FnMut(bool) + Send>;

/// Network reachability source.
pub trait ConnectivityProvider {
    /// Register a listener. It stays registered until the returned
    /// subscription is unsubscribed or dropped.
    fn subscribe(&self, listener: ConnectivityListener) -> Subscription;
}

/// Handle to a registered listener.
///
/// `unsubscribe` may be called any number of times.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the teardown for a listener.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Remove the listener. Returns whether this call removed it.
    pub fn unsubscribe(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                cancel();
                true
            },
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    online: Option<bool>,
    listeners: BTreeMap<u64, ConnectivityListener>,
}

/// Shared [`ConnectivityProvider`] fed by [`ConnectivityHub::set_online`].
///
/// Used directly by tests and wrapped by platform-specific monitors.
/// Listeners are called with the hub lock held and must not call back into
/// the hub.
#[derive(Clone, Default)]
pub struct ConnectivityHub {
    inner: Arc<Mutex<Listeners>>,
}

impl ConnectivityHub {
    /// Create a hub with no listeners and unknown state.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report reachability to every listener.
    pub fn set_online(&self, online: bool) {
        let mut inner = self.lock();
        inner.online = Some(online);
        for listener in inner.listeners.values_mut() {
            listener(online);
        }
    }

    /// Last reported state.
    pub fn last_reported(&self) -> Option<bool> {
        self.lock().online
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl ConnectivityProvider for ConnectivityHub {
    fn subscribe(&self, listener: ConnectivityListener) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(id, listener);
            id
        };

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || {
            inner.lock().unwrap_or_else(PoisonError::into_inner).listeners.remove(&id);
        })
    }
}

impl std::fmt::Debug for ConnectivityHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityHub")
            .field("online", &self.last_reported())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
