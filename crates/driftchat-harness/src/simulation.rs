//! Deterministic client driver.
//!
//! Owns a [`ChatClient`] on a [`SimEnv`] and plays the role the runtime plays
//! in production: it executes `Notify` and `Persist` actions against
//! in-memory ports and advances virtual time one timer deadline at a time, so
//! every timer handler observes its own scheduled instant as "now".

use std::time::Duration;

use driftchat_client::{
    ChatClient, ClientAction, ClientConfig, ClientError, ClientEvent, ClientSnapshot,
    MatchmakingTransport, MemoryStore, NotificationSink, PeerResponder, PersistenceStore,
};
use driftchat_core::{Environment, Timestamp};

use crate::{sim_env::SimEnv, sim_ports::RecordingNotifier};

/// A client plus the simulated world around it.
pub struct Simulation {
    env: SimEnv,
    client: ChatClient<SimEnv>,
    store: MemoryStore,
    notifier: RecordingNotifier,
    actions: Vec<ClientAction>,
}

impl Simulation {
    /// Create a simulation with default configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, ClientConfig::default())
    }

    /// Create a simulation with the given configuration.
    pub fn with_config(seed: u64, config: ClientConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let client = ChatClient::new(env.clone(), config);
        Self {
            env,
            client,
            store: MemoryStore::new(),
            notifier: RecordingNotifier::new(),
            actions: Vec::new(),
        }
    }

    /// Swap the matchmaking backend.
    #[must_use]
    pub fn with_transport(mut self, transport: impl MatchmakingTransport + 'static) -> Self {
        self.client = self.client.with_transport(transport);
        self
    }

    /// Swap the peer responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl PeerResponder + 'static) -> Self {
        self.client = self.client.with_responder(responder);
        self
    }

    /// The simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The client under test.
    pub fn client(&self) -> &ChatClient<SimEnv> {
        &self.client
    }

    /// Backing store for `Persist` actions.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Recorder for `Notify` actions.
    pub fn notifier(&self) -> &RecordingNotifier {
        &self.notifier
    }

    /// Every action emitted so far.
    pub fn actions(&self) -> &[ClientAction] {
        &self.actions
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ClientSnapshot {
        self.client.snapshot()
    }

    /// Current virtual time.
    pub fn now(&self) -> Timestamp {
        self.env.now()
    }

    /// Feed one event and execute its actions.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        let actions = self.client.handle(event)?;
        self.execute(&actions);
        Ok(actions)
    }

    /// Advance virtual time, firing each timer at its own deadline.
    pub fn advance(&mut self, by: Duration) -> Vec<ClientAction> {
        let target = self.env.now().saturating_add(by);
        let mut emitted = Vec::new();

        while let Some(deadline) = self.client.next_deadline().filter(|d| *d <= target) {
            self.env.set_time(deadline);
            emitted.extend(self.tick());
        }
        self.env.set_time(target);
        emitted.extend(self.tick());
        emitted
    }

    /// Advance to an absolute instant.
    pub fn advance_to(&mut self, at: Timestamp) -> Vec<ClientAction> {
        let by = at.duration_since(self.env.now());
        self.advance(by)
    }

    fn tick(&mut self) -> Vec<ClientAction> {
        let now = self.env.now();
        match self.client.handle(ClientEvent::Tick { now }) {
            Ok(actions) => {
                self.execute(&actions);
                actions
            },
            Err(e) => {
                tracing::warn!(error = %e, "tick rejected");
                Vec::new()
            },
        }
    }

    fn execute(&mut self, actions: &[ClientAction]) {
        for action in actions {
            match action {
                ClientAction::Notify { title, body } => self.notifier.notify(title, body),
                ClientAction::Persist { key, value } => self.store.set(key, value.clone()),
                _ => {},
            }
        }
        self.actions.extend_from_slice(actions);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use driftchat_client::Settings;
    use driftchat_core::MatchFilters;

    use super::*;

    #[test]
    fn advance_fires_timers_at_their_deadlines() {
        let mut sim = Simulation::new(7);
        sim.handle(ClientEvent::StartSearch { filters: MatchFilters::default(), wait_budget: None })
            .unwrap();

        sim.advance(Duration::from_secs(10));
        let stranger = sim.client().registry().stranger().unwrap();
        let started = stranger.started_at.unwrap();

        assert!(started >= Timestamp::from_secs(1));
        assert!(started <= Timestamp::from_secs(4));
        assert_eq!(sim.now(), Timestamp::from_secs(10));
    }

    #[test]
    fn persist_actions_reach_the_store() {
        let mut sim = Simulation::new(1);
        sim.handle(ClientEvent::UpdateSettings(Settings::default())).unwrap();
        assert!(sim.store().get(driftchat_client::SETTINGS_KEY).is_some());
    }
}
