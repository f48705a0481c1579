//! Offline message delivery queue.
//!
//! Online sends are appended as `Sent`. Offline sends are appended as
//! `Sending` and remembered here until connectivity returns; the flush then
//! marks each matching message `Sent` in enqueue order and empties the queue.
//! There is exactly one flush attempt per reconnect.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    registry::SessionRegistry,
    types::{MessageId, MessageStatus, SessionId, Timestamp},
};

/// A message waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Target session.
    pub session: SessionId,
    /// Message body.
    pub text: String,
    /// When it was queued.
    pub timestamp: Timestamp,
}

/// Result of [`DeliveryQueue::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Online: appended as `Sent`.
    Delivered(MessageId),
    /// Offline: appended as `Sending` and queued.
    Queued(MessageId),
}

impl SendOutcome {
    /// Id of the appended message.
    pub fn message_id(self) -> MessageId {
        match self {
            Self::Delivered(id) | Self::Queued(id) => id,
        }
    }
}

/// Result of a flush or failure pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages whose status changed.
    pub updated: usize,
    /// Entries whose session or message no longer exists.
    pub orphaned: usize,
}

/// FIFO of messages sent while offline.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    entries: VecDeque<QueuedMessage>,
}

impl DeliveryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued entries in enqueue order.
    pub fn entries(&self) -> &VecDeque<QueuedMessage> {
        &self.entries
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an outgoing message to a session.
    ///
    /// Empty or whitespace-only text is rejected before anything changes.
    pub fn send(
        &mut self,
        registry: &mut SessionRegistry,
        online: bool,
        session: &SessionId,
        text: &str,
        now: Timestamp,
    ) -> Result<SendOutcome, CoreError> {
        if text.trim().is_empty() {
            return Err(CoreError::EmptyMessage);
        }

        if online {
            let id = registry.append_outgoing(session, text, MessageStatus::Sent, now)?;
            return Ok(SendOutcome::Delivered(id));
        }

        let id = registry.append_outgoing(session, text, MessageStatus::Sending, now)?;
        self.entries.push_back(QueuedMessage {
            session: session.clone(),
            text: text.to_string(),
            timestamp: now,
        });
        tracing::debug!(%session, queued = self.entries.len(), "offline send queued");
        Ok(SendOutcome::Queued(id))
    }

    /// Mark queued messages `Sent` in enqueue order and empty the queue.
    pub fn flush(&mut self, registry: &mut SessionRegistry) -> FlushReport {
        self.settle(registry, MessageStatus::Sent)
    }

    /// Mark queued messages `Failed` and empty the queue.
    pub fn fail_all(&mut self, registry: &mut SessionRegistry) -> FlushReport {
        self.settle(registry, MessageStatus::Failed)
    }

    fn settle(&mut self, registry: &mut SessionRegistry, status: MessageStatus) -> FlushReport {
        let mut report = FlushReport::default();
        for entry in std::mem::take(&mut self.entries) {
            let message =
                registry.get(&entry.session).and_then(|s| s.first_sending_with_text(&entry.text));
            match message {
                Some(id) if registry.set_message_status(&entry.session, id, status) => {
                    report.updated += 1;
                },
                _ => {
                    tracing::warn!(session = %entry.session, "queued message has no target");
                    report.orphaned += 1;
                },
            }
        }
        tracing::debug!(?status, updated = report.updated, orphaned = report.orphaned, "queue settled");
        report
    }
}
