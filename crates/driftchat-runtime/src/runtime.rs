//! Async driver for [`ChatClient`].
//!
//! The client is a pure state machine; this loop is the only place that
//! touches the outside world. It multiplexes three sources into
//! `ChatClient::handle`:
//!
//! - commands from any number of [`RuntimeHandle`]s,
//! - connectivity reports bridged from a [`ConnectivityProvider`],
//! - a periodic tick that fires due timers.
//!
//! Resulting `Notify` and `Persist` actions are executed against the
//! configured ports. The client is not `Send`, so `run` is awaited on the
//! current task (e.g. joined with the UI future) rather than spawned.

use std::time::Duration;

use driftchat_client::{
    ChatClient, ClientAction, ClientConfig, ClientError, ClientEvent, ConnectivityProvider,
    MatchmakingTransport, NotificationSink, PeerResponder, Persisted, PersistenceStore, Profile,
    Settings, Subscription,
};
use driftchat_core::Environment;
use tokio::sync::{mpsc, oneshot};

use crate::error::RuntimeError;

/// Runtime loop configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often due timers are fired.
    pub tick_interval: Duration,
    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_interval: Duration::from_millis(100), command_buffer: 64 }
    }
}

type Reply = oneshot::Sender<Result<Vec<ClientAction>, ClientError>>;

enum Command {
    Event { event: ClientEvent, reply: Reply },
    Shutdown,
}

/// Cloneable sender side of a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event { event, .. } => f.debug_tuple("Event").field(event).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl RuntimeHandle {
    /// Feed an event to the client and wait for its actions.
    ///
    /// # Errors
    ///
    /// `RuntimeError::Client` if the client rejected the event,
    /// `RuntimeError::Closed` if the loop is gone.
    pub async fn send(&self, event: ClientEvent) -> Result<Vec<ClientAction>, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Event { event, reply })
            .await
            .map_err(|_| RuntimeError::Closed)?;
        let actions = response.await.map_err(|_| RuntimeError::Closed)??;
        Ok(actions)
    }

    /// Ask the loop to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.commands.send(Command::Shutdown).await.map_err(|_| RuntimeError::Closed)
    }
}

/// Production driver owning the client and its ports.
pub struct Runtime<E: Environment, S: PersistenceStore, N: NotificationSink> {
    env: E,
    client: ChatClient<E>,
    store: S,
    notifier: N,
    config: RuntimeConfig,
    commands: mpsc::Receiver<Command>,
    connectivity_tx: mpsc::UnboundedSender<bool>,
    connectivity: mpsc::UnboundedReceiver<bool>,
    subscription: Option<Subscription>,
}

impl<E, S, N> Runtime<E, S, N>
where
    E: Environment,
    S: PersistenceStore,
    N: NotificationSink,
{
    /// Build a runtime, restoring settings and profile from `store`.
    ///
    /// # Errors
    ///
    /// `ClientError::Corrupt` if a stored value cannot be decoded.
    pub fn new(
        env: E,
        client_config: ClientConfig,
        store: S,
        notifier: N,
        config: RuntimeConfig,
    ) -> Result<(Self, RuntimeHandle), ClientError> {
        let settings = Settings::load(&store)?;
        let profile = Profile::load(&store)?;
        tracing::info!(
            notifications = settings.notifications_enabled,
            profile = %profile.name,
            "preferences restored"
        );

        let client = ChatClient::new(env.clone(), client_config).with_settings(settings, profile);
        let (commands_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (connectivity_tx, connectivity) = mpsc::unbounded_channel();

        let runtime = Self {
            env,
            client,
            store,
            notifier,
            config,
            commands,
            connectivity_tx,
            connectivity,
            subscription: None,
        };
        Ok((runtime, RuntimeHandle { commands: commands_tx }))
    }

    /// Use another matchmaking backend.
    #[must_use]
    pub fn with_transport(mut self, transport: impl MatchmakingTransport + 'static) -> Self {
        self.client = self.client.with_transport(transport);
        self
    }

    /// Use another peer responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl PeerResponder + 'static) -> Self {
        self.client = self.client.with_responder(responder);
        self
    }

    /// Bridge a connectivity source into the loop.
    ///
    /// Replaces (and unsubscribes) any previous source.
    pub fn connect(&mut self, provider: &impl ConnectivityProvider) {
        let tx = self.connectivity_tx.clone();
        let subscription = provider.subscribe(Box::new(move |online| {
            // The loop may already be gone; late reports are moot.
            let _ = tx.send(online);
        }));
        if let Some(mut previous) = self.subscription.replace(subscription) {
            previous.unsubscribe();
        }
    }

    /// The client state machine.
    pub fn client(&self) -> &ChatClient<E> {
        &self.client
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Notification sink.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run until shutdown or until every handle is dropped.
    ///
    /// Returns the runtime so callers can inspect final state.
    pub async fn run(mut self) -> Self {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(tick_ms = self.config.tick_interval.as_millis(), "runtime started");

        loop {
            tokio::select! {
                biased;

                Some(online) = self.connectivity.recv() => {
                    self.dispatch(ClientEvent::ConnectivityChanged { online });
                },

                command = self.commands.recv() => match command {
                    Some(Command::Event { event, reply }) => {
                        let result = self.client.handle(event);
                        if let Ok(actions) = &result {
                            self.execute(actions);
                        }
                        // The caller may have stopped waiting.
                        let _ = reply.send(result);
                    },
                    Some(Command::Shutdown) | None => break,
                },

                _ = ticker.tick() => {
                    let now = self.env.now();
                    self.dispatch(ClientEvent::Tick { now });
                },
            }
        }

        // Commands queued behind the shutdown get `Closed`.
        self.commands.close();
        while self.commands.try_recv().is_ok() {}

        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        tracing::info!("runtime stopped");
        self
    }

    /// Handle an internally generated event, logging rejections.
    fn dispatch(&mut self, event: ClientEvent) {
        match self.client.handle(event) {
            Ok(actions) => self.execute(&actions),
            Err(e) => tracing::warn!(error = %e, "event rejected"),
        }
    }

    fn execute(&mut self, actions: &[ClientAction]) {
        for action in actions {
            match action {
                ClientAction::Notify { title, body } => self.notifier.notify(title, body),
                ClientAction::Persist { key, value } => self.store.set(key, value.clone()),
                other => tracing::trace!(action = ?other, "action"),
            }
        }
    }
}

/// [`NotificationSink`] that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&mut self, title: &str, body: &str) {
        tracing::info!(%title, %body, "notification");
    }
}
