//! Session registry.
//!
//! Owns every open [`ChatSession`] plus the single active pointer.
//!
//! ## Invariants
//!
//! - The active pointer is `None` or names a session in the registry.
//! - At most one `Stranger` session exists. Installing another retires the
//!   previous one through the [`HistoryArchiver`] first.
//! - Sessions keep insertion order. Closing the active session activates the
//!   first remaining session in that order, or nothing.
//!
//! All mutation goes through the methods below; callers never get a mutable
//! reference to a session.

use crate::{
    error::CoreError,
    friends::FriendGraph,
    history::HistoryArchiver,
    types::{
        ChatMode, ChatSession, EndedBy, HistoryId, MessageId, MessageStatus, Sender, SessionId,
        SessionKind, Timestamp,
    },
};

/// Outcome of [`SessionRegistry::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Id of the installed (and now active) session.
    pub session: SessionId,
    /// Stranger session that had to make room, if any.
    pub displaced: Option<SessionId>,
    /// History record created for the displaced session.
    pub archived: Option<HistoryId>,
    /// Read-only sessions closed because the history cap evicted their record.
    pub evicted: Vec<SessionId>,
}

/// Outcome of [`SessionRegistry::retire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retired {
    /// The removed session.
    pub session: ChatSession,
    /// History record, for stranger sessions with a start time.
    pub archived: Option<HistoryId>,
    /// Active session after removal.
    pub active: Option<SessionId>,
    /// Read-only sessions closed because the history cap evicted their record.
    pub evicted: Vec<SessionId>,
}

/// Registry of open sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    /// Open sessions in insertion order.
    sessions: Vec<ChatSession>,
    /// Currently displayed session.
    active: Option<SessionId>,
    /// Sequence for stranger session ids.
    next_stranger: u64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for the next stranger session.
    pub fn next_stranger_id(&mut self) -> SessionId {
        self.next_stranger += 1;
        SessionId::stranger(self.next_stranger)
    }

    /// All open sessions in list order.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    /// Whether a session is open.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.get(id).is_some()
    }

    /// Id of the active session.
    pub fn active(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    /// The active session.
    pub fn active_session(&self) -> Option<&ChatSession> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    /// The stranger session, if one is open.
    pub fn stranger(&self) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.kind == SessionKind::Stranger)
    }

    /// Sessions of one kind in list order.
    pub fn of_kind(&self, kind: SessionKind) -> impl Iterator<Item = &ChatSession> + '_ {
        self.sessions.iter().filter(move |s| s.kind == kind)
    }

    /// Install a session and make it active.
    ///
    /// A stranger session displaces the current one, which is archived first
    /// when it has a start time. Any other session with an existing id
    /// replaces it in place.
    pub fn install(
        &mut self,
        session: ChatSession,
        archiver: &mut HistoryArchiver,
        friends: &FriendGraph,
        now: Timestamp,
    ) -> InstallReport {
        let mut report = InstallReport {
            session: session.id.clone(),
            displaced: None,
            archived: None,
            evicted: Vec::new(),
        };

        if session.kind == SessionKind::Stranger {
            let previous = self.stranger().map(|s| s.id.clone());
            if let Some(previous) = previous {
                // Lookup just succeeded, retire cannot miss.
                if let Ok(retired) = self.retire(&previous, archiver, friends, EndedBy::You, now) {
                    report.displaced = Some(previous);
                    report.archived = retired.archived;
                    report.evicted = retired.evicted;
                }
            }
        }

        self.insert(session);
        report
    }

    /// Add or replace a session by id and activate it.
    pub(crate) fn insert(&mut self, session: ChatSession) {
        let id = session.id.clone();
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(slot) => *slot = session,
            None => self.sessions.push(session),
        }
        tracing::debug!(session = %id, "session installed");
        self.activate(&id);
    }

    /// Remove a session.
    ///
    /// If it was active, the first remaining session in list order becomes
    /// active, or nothing when the registry is now empty.
    pub fn close(&mut self, id: &SessionId) -> Result<ChatSession, CoreError> {
        let index = self
            .sessions
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| CoreError::SessionNotFound { session: id.clone() })?;

        let session = self.sessions.remove(index);
        if self.active.as_ref() == Some(id) {
            self.active = None;
            if let Some(next) = self.sessions.first().map(|s| s.id.clone()) {
                self.activate(&next);
            }
        }

        tracing::debug!(session = %id, active = ?self.active, "session closed");
        Ok(session)
    }

    /// Close a session, archiving it first if it is a stranger chat with a
    /// start time.
    pub fn retire(
        &mut self,
        id: &SessionId,
        archiver: &mut HistoryArchiver,
        friends: &FriendGraph,
        ended_by: EndedBy,
        now: Timestamp,
    ) -> Result<Retired, CoreError> {
        let session =
            self.get(id).ok_or_else(|| CoreError::SessionNotFound { session: id.clone() })?;

        let mut archived = None;
        let mut evicted_records = Vec::new();
        if session.kind == SessionKind::Stranger && session.started_at.is_some() {
            let became_friend = friends.is_friend(&session.participant_id)
                || friends.has_sent_request(&session.participant_id);
            let receipt = archiver.archive(session, ended_by, became_friend, now)?;
            archived = Some(receipt.id);
            evicted_records = receipt.evicted;
        }

        let session = self.close(id)?;
        let evicted = self.close_replays(&evicted_records);

        Ok(Retired { session, archived, active: self.active.clone(), evicted })
    }

    /// Close the read-only replays of the given history records.
    pub(crate) fn close_replays(&mut self, records: &[HistoryId]) -> Vec<SessionId> {
        records
            .iter()
            .map(|record| SessionId::history(*record))
            .filter(|id| self.close(id).is_ok())
            .collect()
    }

    /// Change the active session.
    ///
    /// `None` clears the pointer. An unknown id leaves everything untouched
    /// and reports `SessionNotFound`.
    pub fn switch_active(&mut self, id: Option<&SessionId>) -> Result<(), CoreError> {
        match id {
            None => {
                self.active = None;
                Ok(())
            },
            Some(id) if self.contains(id) => {
                self.activate(id);
                Ok(())
            },
            Some(id) => Err(CoreError::SessionNotFound { session: id.clone() }),
        }
    }

    fn activate(&mut self, id: &SessionId) {
        if let Some(session) = self.sessions.iter_mut().find(|s| &s.id == id) {
            session.mark_all_read();
            self.active = Some(id.clone());
        }
    }

    fn writable_mut(&mut self, id: &SessionId) -> Result<&mut ChatSession, CoreError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| CoreError::SessionNotFound { session: id.clone() })?;
        if session.is_read_only {
            return Err(CoreError::ReadOnlySession { session: id.clone() });
        }
        Ok(session)
    }

    /// Append a locally-authored message.
    pub(crate) fn append_outgoing(
        &mut self,
        id: &SessionId,
        text: &str,
        status: MessageStatus,
        now: Timestamp,
    ) -> Result<MessageId, CoreError> {
        let session = self.writable_mut(id)?;
        Ok(session.append(Sender::Me, text, status, now))
    }

    /// Append a peer or system message.
    ///
    /// Bumps the unread counter unless the session is active.
    pub fn receive(
        &mut self,
        id: &SessionId,
        sender: Sender,
        text: &str,
        now: Timestamp,
    ) -> Result<MessageId, CoreError> {
        let is_active = self.active.as_ref() == Some(id);
        let session = self.writable_mut(id)?;
        let message = session.append(sender, text, MessageStatus::Sent, now);
        if is_active {
            session.mark_all_read();
        } else {
            session.unread_count += 1;
        }
        Ok(message)
    }

    /// Update the peer-typing indicator.
    pub fn set_typing(&mut self, id: &SessionId, typing: bool) -> Result<(), CoreError> {
        self.writable_mut(id)?.is_typing = typing;
        Ok(())
    }

    /// Switch between text and video.
    pub fn set_chat_mode(&mut self, id: &SessionId, mode: ChatMode) -> Result<(), CoreError> {
        self.writable_mut(id)?.chat_mode = mode;
        Ok(())
    }

    /// Move a queued message to `status`. Returns whether it changed.
    pub(crate) fn set_message_status(
        &mut self,
        id: &SessionId,
        message: MessageId,
        status: MessageStatus,
    ) -> bool {
        self.sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .is_some_and(|s| s.set_status(message, status))
    }

    /// Drop every session and the active pointer.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Friend, Participant, ParticipantId};

    fn participant(id: &str) -> Participant {
        Participant {
            id: ParticipantId::new(id),
            name: id.to_uppercase(),
            avatar: String::new(),
            bio: String::new(),
            region: "NA".to_string(),
        }
    }

    fn friend(id: &str) -> Friend {
        Friend::from(participant(id))
    }

    fn stranger(registry: &mut SessionRegistry, id: &str, at: u64) -> ChatSession {
        let session_id = registry.next_stranger_id();
        ChatSession::stranger(session_id, participant(id), ChatMode::Text, Timestamp::from_secs(at))
    }

    #[test]
    fn install_activates_session() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();

        let session = stranger(&mut registry, "s1", 0);
        let report = registry.install(session, &mut archiver, &friends, Timestamp::from_secs(1));

        assert_eq!(registry.active(), Some(&report.session));
        assert_eq!(report.displaced, None);
    }

    #[test]
    fn second_stranger_displaces_and_archives_first() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();

        let first = stranger(&mut registry, "s1", 0);
        let first_id = first.id.clone();
        registry.install(first, &mut archiver, &friends, Timestamp::from_secs(0));

        let second = stranger(&mut registry, "s2", 30);
        let report = registry.install(second, &mut archiver, &friends, Timestamp::from_secs(30));

        assert_eq!(report.displaced, Some(first_id.clone()));
        assert!(report.archived.is_some());
        assert!(!registry.contains(&first_id));
        assert_eq!(registry.of_kind(SessionKind::Stranger).count(), 1);
        assert_eq!(archiver.records()[0].duration_secs, 30);
        assert_eq!(archiver.records()[0].ended_by, EndedBy::You);
    }

    #[test]
    fn close_active_picks_first_remaining() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();
        let now = Timestamp::from_secs(0);

        let a = friend("a");
        let b = friend("b");
        registry.install(ChatSession::friend(&a, now), &mut archiver, &friends, now);
        registry.install(ChatSession::friend(&b, now), &mut archiver, &friends, now);
        let c = stranger(&mut registry, "c", 0);
        let c_id = c.id.clone();
        registry.install(c, &mut archiver, &friends, now);

        assert_eq!(registry.active(), Some(&c_id));
        registry.close(&c_id).unwrap();
        assert_eq!(registry.active(), Some(&SessionId::friend(&a.id)));
    }

    #[test]
    fn close_inactive_keeps_active() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();
        let now = Timestamp::from_secs(0);

        let a = friend("a");
        let b = friend("b");
        registry.install(ChatSession::friend(&a, now), &mut archiver, &friends, now);
        registry.install(ChatSession::friend(&b, now), &mut archiver, &friends, now);

        registry.close(&SessionId::friend(&a.id)).unwrap();
        assert_eq!(registry.active(), Some(&SessionId::friend(&b.id)));
    }

    #[test]
    fn close_last_clears_active() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();
        let session = stranger(&mut registry, "s1", 0);
        let id = session.id.clone();
        registry.install(session, &mut archiver, &friends, Timestamp::from_secs(0));

        registry.close(&id).unwrap();
        assert_eq!(registry.active(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn switch_to_unknown_is_not_found() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();
        let session = stranger(&mut registry, "s1", 0);
        let id = session.id.clone();
        registry.install(session, &mut archiver, &friends, Timestamp::from_secs(0));

        let missing = SessionId::stranger(99);
        let result = registry.switch_active(Some(&missing));
        assert!(matches!(result, Err(CoreError::SessionNotFound { .. })));
        assert_eq!(registry.active(), Some(&id));

        registry.switch_active(None).unwrap();
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn receive_counts_unread_when_inactive() {
        let mut registry = SessionRegistry::new();
        let mut archiver = HistoryArchiver::new(10);
        let friends = FriendGraph::new();
        let now = Timestamp::from_secs(0);

        let a = friend("a");
        let a_id = SessionId::friend(&a.id);
        registry.install(ChatSession::friend(&a, now), &mut archiver, &friends, now);
        registry.switch_active(None).unwrap();

        registry.receive(&a_id, Sender::Peer, "yo", now).unwrap();
        registry.receive(&a_id, Sender::Peer, "there?", now).unwrap();
        assert_eq!(registry.get(&a_id).unwrap().unread_count, 2);

        registry.switch_active(Some(&a_id)).unwrap();
        let session = registry.get(&a_id).unwrap();
        assert_eq!(session.unread_count, 0);
        assert!(session.messages.iter().all(|m| m.is_read));
    }
}
