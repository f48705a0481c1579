//! Chat client state machine.
//!
//! The `ChatClient` is the top-level orchestrator. It composes matchmaking,
//! the offline queue, the friend graph, the history archive and the session
//! registry, and exposes them through a single `handle(event) -> actions`
//! entry point.
//!
//! ## Design
//!
//! - Single-threaded: every event is one non-interleaved transaction.
//! - Time comes from the [`Environment`]; delays are [`TimerQueue`] entries
//!   fired by `ClientEvent::Tick`.
//! - Rejected requests return `Err` and leave state untouched. Stale timers
//!   and stale backend answers are dropped silently.

use driftchat_core::{
    ChatSession, Clock, ConnectivityMonitor, CoreError, DeliveryQueue, EndedBy, Environment,
    FriendGraph, FriendRequest, HistoryArchiver, HistoryId, IncomingOutcome, InstallReport,
    MatchFilters, MatchOutcome, Matchmaking, Participant, ParticipantId, Retired, SearchId,
    SendOutcome, Sender, SessionId, SessionKind, SessionRegistry, TimerEvent, TimerQueue,
    Timestamp, Transition,
};

use crate::{
    config::{ClientConfig, Persisted, Profile, Settings},
    error::ClientError,
    event::{ClientAction, ClientEvent, ClientSnapshot},
    ports::{MatchmakingTransport, PeerResponder, SilentPeer, SimulatedMatchmaker},
};

/// Chat client state machine.
///
/// Pure orchestration: returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct ChatClient<E: Environment> {
    /// Environment for time/randomness.
    env: E,

    /// Static configuration.
    config: ClientConfig,

    /// User preferences.
    settings: Settings,

    /// Local user profile.
    profile: Profile,

    /// Pending timers.
    clock: TimerQueue,

    /// Matchmaking process.
    matchmaking: Matchmaking,

    /// Online/offline edges.
    connectivity: ConnectivityMonitor,

    /// Messages sent while offline.
    queue: DeliveryQueue,

    /// Friends, requests and blocks.
    friends: FriendGraph,

    /// Archived stranger chats.
    history: HistoryArchiver,

    /// Open sessions.
    registry: SessionRegistry,

    /// Matchmaking backend.
    transport: Box<dyn MatchmakingTransport>,

    /// Automatic peer replies.
    responder: Box<dyn PeerResponder>,
}

impl<E: Environment> ChatClient<E> {
    /// Create a client with the simulated matchmaker and a silent peer.
    pub fn new(env: E, config: ClientConfig) -> Self {
        Self {
            env,
            matchmaking: Matchmaking::new(config.matchmaking.clone()),
            history: HistoryArchiver::new(config.history_limit),
            config,
            settings: Settings::default(),
            profile: Profile::default(),
            clock: TimerQueue::new(),
            connectivity: ConnectivityMonitor::default(),
            queue: DeliveryQueue::new(),
            friends: FriendGraph::new(),
            registry: SessionRegistry::new(),
            transport: Box::new(SimulatedMatchmaker::new()),
            responder: Box::new(SilentPeer),
        }
    }

    /// Use another matchmaking backend.
    #[must_use]
    pub fn with_transport(mut self, transport: impl MatchmakingTransport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Use another peer responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl PeerResponder + 'static) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Start from previously persisted preferences.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings, profile: Profile) -> Self {
        self.settings = settings;
        self.profile = profile;
        self
    }

    /// Current preferences.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Static configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Matchmaking process.
    pub fn matchmaking(&self) -> &Matchmaking {
        &self.matchmaking
    }

    /// Friend graph.
    pub fn friends(&self) -> &FriendGraph {
        &self.friends
    }

    /// History archive.
    pub fn history(&self) -> &HistoryArchiver {
        &self.history
    }

    /// Offline queue.
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Whether sends currently go straight out.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Earliest pending timer, for drivers that sleep until it.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.clock.next_deadline()
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.clock.pending()
    }

    /// Owned view of the whole state.
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            sessions: self.registry.sessions().to_vec(),
            active: self.registry.active().cloned(),
            matchmaking: self.matchmaking.state().clone(),
            history: self.history.records().iter().cloned().collect(),
            friends: self.friends.friends().to_vec(),
            requests: self.friends.requests().to_vec(),
            sent_requests: self.friends.sent_requests().iter().cloned().collect(),
            blocked: self.friends.blocked().iter().cloned().collect(),
            queued: self.queue.len(),
            online: self.connectivity.is_online(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the request is rejected. State is unchanged
    /// in that case.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::StartSearch { filters, wait_budget } => {
                Ok(self.handle_start_search(filters, wait_budget))
            },
            ClientEvent::CancelSearch => Ok(self.handle_cancel_search()),
            ClientEvent::MatchFound { search, participant } => {
                Ok(self.handle_match_found(search, participant))
            },
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::ConnectivityChanged { online } => Ok(self.handle_connectivity(online)),
            ClientEvent::SendMessage { session, text } => self.handle_send(session, &text),
            ClientEvent::SetTyping { session, typing } => {
                self.registry.set_typing(&session, typing)?;
                Ok(Vec::new())
            },
            ClientEvent::PeerMessage { session, text } => self.handle_peer_message(session, &text),
            ClientEvent::PeerLeft { session } => self.handle_peer_left(&session),
            ClientEvent::CloseSession { session } => self.handle_close(&session),
            ClientEvent::SkipStranger => self.handle_skip(),
            ClientEvent::Block { session } => self.handle_block(&session),
            ClientEvent::SwitchActive { session } => {
                self.registry.switch_active(session.as_ref())?;
                Ok(vec![ClientAction::ActiveChanged { active: session }])
            },
            ClientEvent::OpenFriendChat { friend } => self.handle_open_friend_chat(&friend),
            ClientEvent::SendFriendRequest { participant } => {
                let outcome = self.friends.send_request(&participant);
                Ok(vec![ClientAction::FriendRequestSent { participant, outcome }])
            },
            ClientEvent::FriendRequestReceived(request) => {
                Ok(self.handle_request_received(request))
            },
            ClientEvent::FriendAdded(friend) => {
                let id = friend.id.clone();
                if self.friends.add_friend(friend) {
                    Ok(vec![ClientAction::FriendAdded { friend: id }])
                } else {
                    Ok(Vec::new())
                }
            },
            ClientEvent::AcceptRequest { request } => {
                let friend = self.friends.accept_request(&request)?;
                Ok(vec![ClientAction::FriendAdded { friend: friend.id }])
            },
            ClientEvent::DeclineRequest { request } => {
                let outcome = self.friends.decline_request(&request);
                tracing::debug!(%request, ?outcome, "decline handled");
                Ok(Vec::new())
            },
            ClientEvent::Unfriend { friend } => self.handle_unfriend(friend),
            ClientEvent::FriendPresence { friend, online } => {
                self.friends.set_presence(&friend, online, self.env.now())?;
                Ok(Vec::new())
            },
            ClientEvent::OpenHistory { history } => self.handle_open_history(history),
            ClientEvent::DeleteHistory { history } => self.handle_delete_history(history),
            ClientEvent::ClearHistory => Ok(self.handle_clear_history()),
            ClientEvent::SetChatMode { session, mode } => {
                self.registry.set_chat_mode(&session, mode)?;
                Ok(Vec::new())
            },
            ClientEvent::UpdateSettings(settings) => {
                let value = settings.encode()?;
                self.settings = settings;
                Ok(vec![ClientAction::Persist { key: Settings::KEY.to_string(), value }])
            },
            ClientEvent::UpdateProfile(profile) => {
                let value = profile.encode()?;
                self.profile = profile;
                Ok(vec![ClientAction::Persist { key: Profile::KEY.to_string(), value }])
            },
            ClientEvent::Logout => Ok(self.handle_logout()),
        }
    }

    /// Start matchmaking, cancelling any run in flight.
    fn handle_start_search(
        &mut self,
        filters: MatchFilters,
        wait_budget: Option<u32>,
    ) -> Vec<ClientAction> {
        let (search, replaced) =
            self.matchmaking.start(&mut self.clock, &self.env, filters, wait_budget);

        let mut actions = Vec::new();
        for outcome in replaced {
            actions.extend(self.search_ended(outcome));
        }
        actions.push(ClientAction::SearchStarted { search });
        actions
    }

    /// Handle search cancellation.
    fn handle_cancel_search(&mut self) -> Vec<ClientAction> {
        match self.matchmaking.cancel(&mut self.clock, &self.env) {
            Some(outcome) => self.search_ended(outcome),
            None => Vec::new(),
        }
    }

    /// Report a finished search and release the backend for it.
    fn search_ended(&mut self, outcome: MatchOutcome) -> Vec<ClientAction> {
        match &outcome {
            MatchOutcome::TimedOut { search } | MatchOutcome::Cancelled { search } => {
                self.transport.stop(*search);
            },
            MatchOutcome::Matched { .. } => {},
        }
        let mut actions = Vec::new();
        if matches!(outcome, MatchOutcome::TimedOut { .. }) {
            actions.extend(self.notification("No match found", "Try again or widen your filters"));
        }
        actions.push(ClientAction::SearchEnded(outcome));
        actions
    }

    /// Handle a backend-pushed match.
    fn handle_match_found(
        &mut self,
        search: SearchId,
        participant: Participant,
    ) -> Vec<ClientAction> {
        if !self.matchmaking.is_current(search) {
            tracing::warn!(%search, "match for stale search dropped");
            return Vec::new();
        }
        self.complete_match(search, participant)
    }

    /// Resolve the current search with `participant` and install its session.
    fn complete_match(&mut self, search: SearchId, participant: Participant) -> Vec<ClientAction> {
        let Some(outcome) = self.matchmaking.on_resolve(&mut self.clock, &self.env, search) else {
            return Vec::new();
        };
        let chat_mode = match &outcome {
            MatchOutcome::Matched { filters, .. } => filters.chat_mode,
            MatchOutcome::TimedOut { .. } | MatchOutcome::Cancelled { .. } => {
                return self.search_ended(outcome);
            },
        };

        let now = self.env.now();
        let name = participant.name.clone();
        let id = self.registry.next_stranger_id();
        let session = ChatSession::stranger(id, participant, chat_mode, now);
        let report = self.registry.install(session, &mut self.history, &self.friends, now);

        let mut actions = self.search_ended(outcome);
        actions.extend(self.installed(report));
        actions.extend(self.notification("Match found", &format!("You are now chatting with {name}")));
        actions
    }

    /// Actions describing an install.
    fn installed(&self, report: InstallReport) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if let Some(displaced) = report.displaced {
            actions.push(ClientAction::SessionClosed { session: displaced });
        }
        if let Some(history) = report.archived {
            actions.push(ClientAction::Archived { history });
        }
        actions.extend(report.evicted.into_iter().map(|session| ClientAction::SessionClosed { session }));
        actions.push(ClientAction::SessionOpened { session: report.session });
        actions.push(ClientAction::ActiveChanged { active: self.registry.active().cloned() });
        actions
    }

    /// Actions describing a retirement.
    fn retired(retired: Retired) -> Vec<ClientAction> {
        let mut actions = vec![ClientAction::SessionClosed { session: retired.session.id }];
        if let Some(history) = retired.archived {
            actions.push(ClientAction::Archived { history });
        }
        actions.extend(retired.evicted.into_iter().map(|session| ClientAction::SessionClosed { session }));
        actions.push(ClientAction::ActiveChanged { active: retired.active });
        actions
    }

    /// Fire every timer due at `now`, one at a time.
    fn handle_tick(&mut self, now: Timestamp) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        while let Some(fired) = self.clock.pop_due(now) {
            actions.extend(self.handle_timer(fired.event));
        }
        actions
    }

    /// Dispatch one fired timer.
    fn handle_timer(&mut self, event: TimerEvent) -> Vec<ClientAction> {
        match event {
            TimerEvent::MatchTick { search } => {
                match self.matchmaking.on_tick(&mut self.clock, &self.env, search) {
                    Some(outcome) => self.search_ended(outcome),
                    None => Vec::new(),
                }
            },
            TimerEvent::MatchResolve { search } => {
                let filters = match self.matchmaking.current_filters() {
                    Some(filters) if self.matchmaking.is_current(search) => filters.clone(),
                    _ => {
                        tracing::debug!(%search, "stale resolve dropped");
                        return Vec::new();
                    },
                };
                match self.transport.find(search, &filters) {
                    Some(participant) => self.complete_match(search, participant),
                    None => {
                        tracing::debug!(%search, "backend has no partner yet");
                        Vec::new()
                    },
                }
            },
            TimerEvent::PeerReply { session, text } => self.deliver_peer_reply(session, &text),
        }
    }

    /// Land a delayed responder reply if its session is still open.
    fn deliver_peer_reply(&mut self, session: SessionId, text: &str) -> Vec<ClientAction> {
        if !self.registry.contains(&session) {
            tracing::debug!(%session, "reply for closed session dropped");
            return Vec::new();
        }
        match self.handle_peer_message(session, text) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "peer reply rejected");
                Vec::new()
            },
        }
    }

    /// Handle a connectivity report.
    fn handle_connectivity(&mut self, online: bool) -> Vec<ClientAction> {
        match self.connectivity.observe(online) {
            Some(Transition::Restored) => {
                let report = self.queue.flush(&mut self.registry);
                tracing::info!(updated = report.updated, "connectivity restored, queue flushed");
                vec![ClientAction::Connectivity(Transition::Restored), ClientAction::QueueSettled(report)]
            },
            Some(Transition::Lost) => {
                tracing::info!("connectivity lost");
                vec![ClientAction::Connectivity(Transition::Lost)]
            },
            None => Vec::new(),
        }
    }

    /// Handle a local send.
    fn handle_send(
        &mut self,
        session: SessionId,
        text: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let online = self.connectivity.is_online();
        let outcome = self.queue.send(&mut self.registry, online, &session, text, now)?;

        let actions = vec![ClientAction::MessageSent {
            session: session.clone(),
            message: outcome.message_id(),
            queued: matches!(outcome, SendOutcome::Queued(_)),
        }];

        if let SendOutcome::Delivered(_) = outcome {
            let entropy = self.env.random_u64();
            if let Some(reply) = self.responder.respond(&session, text, entropy) {
                if self.config.peer_typing {
                    self.registry.set_typing(&session, true)?;
                }
                self.clock.set_timeout(
                    now,
                    reply.delay,
                    TimerEvent::PeerReply { session: session.clone(), text: reply.text },
                );
                tracing::debug!(%session, delay_ms = reply.delay.as_millis(), "peer reply scheduled");
            }
        }
        Ok(actions)
    }

    /// Handle an incoming peer message.
    fn handle_peer_message(
        &mut self,
        session: SessionId,
        text: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let message = self.registry.receive(&session, Sender::Peer, text, now)?;
        self.registry.set_typing(&session, false)?;

        let mut actions = vec![ClientAction::MessageReceived { session: session.clone(), message }];
        if self.registry.active() != Some(&session) {
            let title = self
                .registry
                .get(&session)
                .map(|s| s.participant.name.clone())
                .unwrap_or_default();
            actions.extend(self.notification(&title, text));
        }
        Ok(actions)
    }

    /// The stranger left: archive as ended by them and close.
    fn handle_peer_left(&mut self, session: &SessionId) -> Result<Vec<ClientAction>, ClientError> {
        self.require_kind(session, SessionKind::Stranger)?;
        let retired = self.registry.retire(
            session,
            &mut self.history,
            &self.friends,
            EndedBy::Stranger,
            self.env.now(),
        )?;
        Ok(Self::retired(retired))
    }

    /// User closed a session. Stranger chats are archived.
    fn handle_close(&mut self, session: &SessionId) -> Result<Vec<ClientAction>, ClientError> {
        let retired = self.registry.retire(
            session,
            &mut self.history,
            &self.friends,
            EndedBy::You,
            self.env.now(),
        )?;
        Ok(Self::retired(retired))
    }

    /// End the stranger chat and search again with the previous criteria.
    fn handle_skip(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let mut actions = Vec::new();
        if let Some(stranger) = self.registry.stranger().map(|s| s.id.clone()) {
            actions.extend(self.handle_close(&stranger)?);
        }

        let (filters, wait_budget) = match self.matchmaking.last_request() {
            Some((filters, budget)) => (filters.clone(), *budget),
            None => (self.default_filters(), self.settings.wait_budget_secs),
        };
        actions.extend(self.handle_start_search(filters, wait_budget));
        Ok(actions)
    }

    /// Close a session and block its participant.
    fn handle_block(&mut self, session: &SessionId) -> Result<Vec<ClientAction>, ClientError> {
        let participant = self
            .registry
            .get(session)
            .map(|s| s.participant_id.clone())
            .ok_or_else(|| CoreError::SessionNotFound { session: session.clone() })?;

        let mut actions = self.handle_close(session)?;

        let was_friend = self.friends.is_friend(&participant);
        self.friends.block(&participant);
        if was_friend {
            actions.push(ClientAction::FriendRemoved { friend: participant.clone() });
        }
        tracing::info!(%participant, "participant blocked");
        Ok(actions)
    }

    /// Open or focus the chat with a friend.
    fn handle_open_friend_chat(
        &mut self,
        friend: &ParticipantId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let record = self
            .friends
            .friend(friend)
            .cloned()
            .ok_or_else(|| CoreError::NotFriend { participant: friend.clone() })?;

        let id = SessionId::friend(friend);
        if self.registry.contains(&id) {
            self.registry.switch_active(Some(&id))?;
            return Ok(vec![ClientAction::ActiveChanged { active: Some(id) }]);
        }

        let now = self.env.now();
        let session = ChatSession::friend(&record, now);
        let report = self.registry.install(session, &mut self.history, &self.friends, now);
        Ok(self.installed(report))
    }

    /// Store an incoming friend request.
    fn handle_request_received(
        &mut self,
        request: FriendRequest,
    ) -> Vec<ClientAction> {
        let name = request.from.name.clone();
        match self.friends.receive_request(request) {
            IncomingOutcome::Queued => self
                .notification("Friend request", &format!("{name} wants to be friends"))
                .into_iter()
                .collect(),
            IncomingOutcome::Ignored => Vec::new(),
        }
    }

    /// Remove a friend, leaving a system note in any open chat with them.
    fn handle_unfriend(&mut self, friend: ParticipantId) -> Result<Vec<ClientAction>, ClientError> {
        let removed = self.friends.unfriend(&friend)?;

        let mut actions = Vec::new();
        let session = SessionId::friend(&friend);
        if self.registry.contains(&session) {
            let note = format!("{} is no longer in your friends list", removed.name);
            let message = self.registry.receive(&session, Sender::System, &note, self.env.now())?;
            actions.push(ClientAction::MessageReceived { session, message });
        }
        actions.push(ClientAction::FriendRemoved { friend });
        Ok(actions)
    }

    /// Open an archived chat read-only.
    fn handle_open_history(&mut self, history: HistoryId) -> Result<Vec<ClientAction>, ClientError> {
        let session = self.history.open_read_only(history, &mut self.registry)?;
        Ok(vec![
            ClientAction::SessionOpened { session: session.clone() },
            ClientAction::ActiveChanged { active: Some(session) },
        ])
    }

    /// Delete an archived chat and its replay.
    fn handle_delete_history(
        &mut self,
        history: HistoryId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let report = self.history.delete(history, &mut self.registry)?;
        let mut actions = Vec::new();
        if let Some(session) = report.closed {
            actions.push(ClientAction::SessionClosed { session });
            actions.push(ClientAction::ActiveChanged { active: self.registry.active().cloned() });
        }
        actions.push(ClientAction::HistoryDeleted { history: report.record.id });
        Ok(actions)
    }

    /// Delete every archived chat and close every replay.
    fn handle_clear_history(&mut self) -> Vec<ClientAction> {
        let closed = self.history.clear_all(&mut self.registry);
        if closed.is_empty() {
            return Vec::new();
        }
        let mut actions: Vec<ClientAction> =
            closed.into_iter().map(|session| ClientAction::SessionClosed { session }).collect();
        actions.push(ClientAction::ActiveChanged { active: self.registry.active().cloned() });
        actions
    }

    /// Tear down all per-user state. Settings stay in the store.
    fn handle_logout(&mut self) -> Vec<ClientAction> {
        let mut actions = self.handle_cancel_search();
        self.matchmaking.reset();

        let report = self.queue.fail_all(&mut self.registry);
        actions.push(ClientAction::QueueSettled(report));

        actions.extend(
            self.registry
                .sessions()
                .iter()
                .map(|s| ClientAction::SessionClosed { session: s.id.clone() }),
        );
        self.registry.clear();
        self.history = HistoryArchiver::new(self.config.history_limit);
        self.friends.clear();
        self.clock = TimerQueue::new();
        self.profile = Profile::default();

        actions.push(ClientAction::ActiveChanged { active: None });
        tracing::info!("logged out");
        actions
    }

    fn require_kind(&self, session: &SessionId, expected: SessionKind) -> Result<(), ClientError> {
        let actual = self
            .registry
            .get(session)
            .map(|s| s.kind)
            .ok_or_else(|| CoreError::SessionNotFound { session: session.clone() })?;
        if actual != expected {
            return Err(CoreError::WrongSessionKind {
                session: session.clone(),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    fn default_filters(&self) -> MatchFilters {
        MatchFilters {
            region: self.settings.preferred_region.clone(),
            interests: Vec::new(),
            chat_mode: self.settings.default_chat_mode,
        }
    }

    fn notification(&self, title: &str, body: &str) -> Option<ClientAction> {
        self.settings
            .notifications_enabled
            .then(|| ClientAction::Notify { title: title.to_string(), body: body.to_string() })
    }
}
