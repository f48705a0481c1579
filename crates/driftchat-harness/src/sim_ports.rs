//! Scriptable and recording port implementations.
//!
//! Handles are cheap clones over shared state so a test can keep one copy and
//! move another into the client.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use driftchat_client::{MatchmakingTransport, NotificationSink};
use driftchat_core::{MatchFilters, Participant, ParticipantId, SearchId};

/// Notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// [`NotificationSink`] that remembers everything it was asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    seen: Rc<RefCell<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications in emission order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.borrow().clone()
    }

    /// Number of notifications.
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Whether nothing was shown.
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&mut self, title: &str, body: &str) {
        self.seen
            .borrow_mut()
            .push(Notification { title: title.to_string(), body: body.to_string() });
    }
}

#[derive(Debug, Default)]
struct Script {
    answers: VecDeque<Option<Participant>>,
    finds: Vec<(SearchId, MatchFilters)>,
    stops: Vec<SearchId>,
}

/// [`MatchmakingTransport`] answering from a script.
///
/// Each `find` pops the next scripted answer. `None` (or an exhausted
/// script) leaves the search waiting for a pushed `MatchFound`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMatchmaker {
    script: Rc<RefCell<Script>>,
}

impl ScriptedMatchmaker {
    /// Create a matchmaker with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a participant for the next `find`.
    pub fn push_match(&self, participant: Participant) {
        self.script.borrow_mut().answers.push_back(Some(participant));
    }

    /// Queue a "no partner yet" answer.
    pub fn push_pending(&self) {
        self.script.borrow_mut().answers.push_back(None);
    }

    /// Every `find` call seen so far.
    pub fn finds(&self) -> Vec<(SearchId, MatchFilters)> {
        self.script.borrow().finds.clone()
    }

    /// Every search that was stopped.
    pub fn stops(&self) -> Vec<SearchId> {
        self.script.borrow().stops.clone()
    }
}

impl MatchmakingTransport for ScriptedMatchmaker {
    fn find(&mut self, search: SearchId, filters: &MatchFilters) -> Option<Participant> {
        let mut script = self.script.borrow_mut();
        script.finds.push((search, filters.clone()));
        script.answers.pop_front().flatten()
    }

    fn stop(&mut self, search: SearchId) {
        self.script.borrow_mut().stops.push(search);
    }
}

/// Participant fixture with a predictable id.
pub fn participant(id: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        name: id.to_string(),
        avatar: String::new(),
        bio: String::new(),
        region: "EU".to_string(),
    }
}
