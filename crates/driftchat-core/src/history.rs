//! History archiver.
//!
//! Turns terminated stranger sessions into immutable [`ChatHistory`] records
//! (most recent first) and materializes read-only replays of them.
//!
//! ## Invariants
//!
//! - One record per terminated stranger session, created at termination.
//! - A replay's session id is `SessionId::history(record.id)`, so opening the
//!   same record twice activates the existing replay.
//! - Deleting a record closes its replay. Clearing closes all replays.

use std::collections::VecDeque;

use crate::{
    error::CoreError,
    registry::SessionRegistry,
    types::{ChatHistory, ChatSession, EndedBy, HistoryId, SessionId, SessionKind, Timestamp},
};

/// Result of archiving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    /// New record id (now the head of the list).
    pub id: HistoryId,
    /// Oldest records dropped to respect the cap.
    pub evicted: Vec<HistoryId>,
}

/// Result of deleting a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    /// The removed record.
    pub record: ChatHistory,
    /// Replay session closed along with it.
    pub closed: Option<SessionId>,
}

/// Ordered archive of past stranger chats.
#[derive(Debug, Clone)]
pub struct HistoryArchiver {
    /// Records, most recent first.
    records: VecDeque<ChatHistory>,
    /// Next record id.
    next_id: u64,
    /// Maximum number of records kept.
    limit: usize,
}

impl HistoryArchiver {
    /// Create an empty archive keeping at most `limit` records.
    pub fn new(limit: usize) -> Self {
        Self { records: VecDeque::new(), next_id: 1, limit: limit.max(1) }
    }

    /// Records, most recent first.
    pub fn records(&self) -> &VecDeque<ChatHistory> {
        &self.records
    }

    /// Look up a record.
    pub fn get(&self, id: HistoryId) -> Option<&ChatHistory> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the archive is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot a terminated stranger session into a new head record.
    ///
    /// Duration is whole seconds between the session start and `now`.
    pub fn archive(
        &mut self,
        session: &ChatSession,
        ended_by: EndedBy,
        became_friend: bool,
        now: Timestamp,
    ) -> Result<ArchiveReceipt, CoreError> {
        if session.kind != SessionKind::Stranger {
            return Err(CoreError::WrongSessionKind {
                session: session.id.clone(),
                expected: SessionKind::Stranger,
                actual: session.kind,
            });
        }
        let start_time = session
            .started_at
            .ok_or_else(|| CoreError::MissingStartTime { session: session.id.clone() })?;

        let id = HistoryId(self.next_id);
        self.next_id += 1;

        let record = ChatHistory {
            id,
            participant: session.participant.clone(),
            participant_id: session.participant_id.clone(),
            duration_secs: now.duration_since(start_time).as_secs(),
            message_count: session.messages.len(),
            ended_by,
            start_time,
            became_friend,
            chat_mode: session.chat_mode,
            messages: session.messages.clone(),
        };
        tracing::info!(
            history = %id,
            session = %session.id,
            duration_secs = record.duration_secs,
            messages = record.message_count,
            ?ended_by,
            "chat archived"
        );
        self.records.push_front(record);

        let mut evicted = Vec::new();
        while self.records.len() > self.limit {
            if let Some(old) = self.records.pop_back() {
                evicted.push(old.id);
            }
        }

        Ok(ArchiveReceipt { id, evicted })
    }

    /// Activate the replay of a record, creating it on first open.
    pub fn open_read_only(
        &self,
        id: HistoryId,
        registry: &mut SessionRegistry,
    ) -> Result<SessionId, CoreError> {
        let record = self.get(id).ok_or(CoreError::HistoryNotFound { history: id })?;
        let session_id = SessionId::history(id);

        if registry.contains(&session_id) {
            registry.switch_active(Some(&session_id))?;
        } else {
            registry.insert(ChatSession::replay(record));
        }
        Ok(session_id)
    }

    /// Remove a record and close its replay if open.
    pub fn delete(
        &mut self,
        id: HistoryId,
        registry: &mut SessionRegistry,
    ) -> Result<DeleteReport, CoreError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(CoreError::HistoryNotFound { history: id })?;
        let record = self.records.remove(index).ok_or(CoreError::HistoryNotFound { history: id })?;

        let replay = SessionId::history(id);
        let was_active = registry.active() == Some(&replay);
        let closed = registry.close_replays(&[id]).into_iter().next();
        // Deleting the record being viewed leaves nothing active.
        if was_active {
            registry.switch_active(None)?;
        }
        tracing::debug!(history = %id, ?closed, "history record deleted");
        Ok(DeleteReport { record, closed })
    }

    /// Empty the archive and close every replay.
    pub fn clear_all(&mut self, registry: &mut SessionRegistry) -> Vec<SessionId> {
        self.records.clear();
        let replays: Vec<SessionId> =
            registry.of_kind(SessionKind::History).map(|s| s.id.clone()).collect();
        for id in &replays {
            if let Err(e) = registry.close(id) {
                tracing::warn!(session = %id, error = %e, "replay already closed");
            }
        }
        replays
    }
}
