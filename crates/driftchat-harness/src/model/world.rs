//! Model world.
//!
//! A deliberately naive rendition of the client: plain vectors, string ids
//! and closed-form matchmaking timing. It is the oracle the real
//! [`ChatClient`](driftchat_client::ChatClient) is checked against.

use std::{collections::BTreeSet, time::Duration};

use driftchat_client::ClientConfig;
use driftchat_core::{MatchmakingConfig, MessageStatus};

use super::operation::{
    Operation, OperationError, OperationResult, participant_name, resolve_slot,
};

/// Fixed matchmaking latency used by model runs.
pub const MODEL_LATENCY_SECS: u64 = 2;

/// Client configuration the model's timing assumes.
pub fn model_config() -> ClientConfig {
    ClientConfig {
        matchmaking: MatchmakingConfig {
            min_latency: Duration::from_secs(MODEL_LATENCY_SECS),
            max_latency: Duration::from_secs(MODEL_LATENCY_SECS),
            tick_period: Duration::from_secs(1),
        },
        ..ClientConfig::default()
    }
}

/// Message as seen by the oracle: body and delivery status.
pub type ModelMessage = (String, MessageStatus);

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Open sessions in list order with their messages.
    pub sessions: Vec<(String, Vec<ModelMessage>)>,
    /// Active session id.
    pub active: Option<String>,
    /// Whether a search is in flight.
    pub searching: bool,
    /// History records, most recent first: id and message count.
    pub history: Vec<(u64, usize)>,
    /// Offline queue length.
    pub queued: usize,
    /// Participants with a pending outgoing request.
    pub sent_requests: Vec<String>,
    /// Connectivity.
    pub online: bool,
}

#[derive(Debug, Clone)]
struct ModelSession {
    id: String,
    stranger: bool,
    read_only: bool,
    messages: Vec<ModelMessage>,
}

#[derive(Debug, Clone)]
struct ModelRecord {
    id: u64,
    messages: Vec<ModelMessage>,
}

#[derive(Debug, Clone, Copy)]
struct ModelSearch {
    started_ms: u64,
    budget: Option<u32>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    now_ms: u64,
    online: bool,
    sessions: Vec<ModelSession>,
    active: Option<String>,
    history: Vec<ModelRecord>,
    history_limit: usize,
    next_history: u64,
    next_stranger: u64,
    queue: Vec<(String, String)>,
    sent: BTreeSet<String>,
    search: Option<ModelSearch>,
    last_budget: Option<Option<u32>>,
    matches: u64,
}

impl Default for ModelWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelWorld {
    /// Create an empty, online world at t = 0.
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            online: true,
            sessions: Vec::new(),
            active: None,
            history: Vec::new(),
            history_limit: model_config().history_limit,
            next_history: 1,
            next_stranger: 0,
            queue: Vec::new(),
            sent: BTreeSet::new(),
            search: None,
            last_budget: None,
            matches: 0,
        }
    }

    /// Number of stranger sessions ever created.
    pub fn matches(&self) -> u64 {
        self.matches
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::StartSearch { wait_budget } => {
                self.start(wait_budget.map(|b| b.ticks()));
                OperationResult::Ok
            },
            Operation::CancelSearch => {
                self.search = None;
                OperationResult::Ok
            },
            Operation::AdvanceTime { delay } => {
                self.advance(delay.secs());
                OperationResult::Ok
            },
            Operation::SetOnline { online } => {
                self.set_online(*online);
                OperationResult::Ok
            },
            Operation::Send { slot, text } => self.send(*slot, &text.text()),
            Operation::Close { slot } => match self.session_at(*slot) {
                Some(id) => {
                    self.retire(&id);
                    OperationResult::Ok
                },
                None => OperationResult::Error(OperationError::NotFound),
            },
            Operation::Switch { slot: None } => {
                self.active = None;
                OperationResult::Ok
            },
            Operation::Switch { slot: Some(slot) } => match self.session_at(*slot) {
                Some(id) => {
                    self.active = Some(id);
                    OperationResult::Ok
                },
                None => OperationResult::Error(OperationError::NotFound),
            },
            Operation::Skip => {
                if let Some(id) = self.sessions.iter().find(|s| s.stranger).map(|s| s.id.clone()) {
                    self.retire(&id);
                }
                self.start(self.last_budget.flatten());
                OperationResult::Ok
            },
            Operation::SendFriendRequest { participant } => {
                self.sent.insert(participant_name(*participant));
                OperationResult::Ok
            },
            Operation::OpenHistory { slot } => self.open_history(*slot),
            Operation::DeleteHistory { slot } => self.delete_history(*slot),
            Operation::ClearHistory => {
                self.history.clear();
                let replays: Vec<String> =
                    self.sessions.iter().filter(|s| s.read_only).map(|s| s.id.clone()).collect();
                for id in replays {
                    self.close(&id);
                }
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            sessions: self.sessions.iter().map(|s| (s.id.clone(), s.messages.clone())).collect(),
            active: self.active.clone(),
            searching: self.search.is_some(),
            history: self.history.iter().map(|r| (r.id, r.messages.len())).collect(),
            queued: self.queue.len(),
            sent_requests: self.sent.iter().cloned().collect(),
            online: self.online,
        }
    }

    fn start(&mut self, budget: Option<u32>) {
        self.search = Some(ModelSearch { started_ms: self.now_ms, budget });
        self.last_budget = Some(budget);
    }

    fn advance(&mut self, secs: u64) {
        let target = self.now_ms + secs * 1_000;
        if let Some(search) = self.search {
            let resolve_at = search.started_ms + MODEL_LATENCY_SECS * 1_000;
            // Ticks are armed before the resolve timer, so they win ties.
            let timeout_at =
                search.budget.map(|b| search.started_ms + u64::from(b.max(1)) * 1_000);
            match timeout_at {
                Some(at) if at <= resolve_at => {
                    if at <= target {
                        self.search = None;
                    }
                },
                _ => {
                    if resolve_at <= target {
                        self.search = None;
                        self.install_stranger();
                    }
                },
            }
        }
        self.now_ms = target;
    }

    fn install_stranger(&mut self) {
        if let Some(id) = self.sessions.iter().find(|s| s.stranger).map(|s| s.id.clone()) {
            self.retire(&id);
        }
        self.next_stranger += 1;
        self.matches += 1;
        let id = format!("stranger:{}", self.next_stranger);
        self.sessions.push(ModelSession {
            id: id.clone(),
            stranger: true,
            read_only: false,
            messages: Vec::new(),
        });
        self.active = Some(id);
    }

    fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        if !online {
            return;
        }
        for (session, text) in std::mem::take(&mut self.queue) {
            let message = self.sessions.iter_mut().find(|s| s.id == session).and_then(|s| {
                s.messages.iter_mut().find(|(t, status)| *t == text && *status == MessageStatus::Sending)
            });
            if let Some((_, status)) = message {
                *status = MessageStatus::Sent;
            }
        }
    }

    fn send(&mut self, slot: u8, text: &str) -> OperationResult {
        if text.trim().is_empty() {
            return OperationResult::Error(OperationError::Validation);
        }
        let Some(index) = resolve_slot(slot, self.sessions.len()) else {
            return OperationResult::Error(OperationError::NotFound);
        };
        let online = self.online;
        let session = &mut self.sessions[index];
        if session.read_only {
            return OperationResult::Error(OperationError::State);
        }
        if online {
            session.messages.push((text.to_string(), MessageStatus::Sent));
        } else {
            session.messages.push((text.to_string(), MessageStatus::Sending));
            let id = session.id.clone();
            self.queue.push((id, text.to_string()));
        }
        OperationResult::Ok
    }

    fn open_history(&mut self, slot: u8) -> OperationResult {
        let Some(index) = resolve_slot(slot, self.history.len()) else {
            return OperationResult::Error(OperationError::NotFound);
        };
        let record = &self.history[index];
        let id = format!("history:{}", record.id);
        if !self.sessions.iter().any(|s| s.id == id) {
            let messages = record.messages.clone();
            self.sessions.push(ModelSession {
                id: id.clone(),
                stranger: false,
                read_only: true,
                messages,
            });
        }
        self.active = Some(id);
        OperationResult::Ok
    }

    fn delete_history(&mut self, slot: u8) -> OperationResult {
        let Some(index) = resolve_slot(slot, self.history.len()) else {
            return OperationResult::Error(OperationError::NotFound);
        };
        let record = self.history.remove(index);
        let replay = format!("history:{}", record.id);
        let was_active = self.active.as_deref() == Some(replay.as_str());
        self.close(&replay);
        if was_active {
            self.active = None;
        }
        OperationResult::Ok
    }

    fn session_at(&self, slot: u8) -> Option<String> {
        resolve_slot(slot, self.sessions.len()).map(|i| self.sessions[i].id.clone())
    }

    /// Archive (strangers only) then close.
    fn retire(&mut self, id: &str) {
        let Some(session) = self.sessions.iter().find(|s| s.id == id) else {
            return;
        };
        if session.stranger {
            let record = ModelRecord { id: self.next_history, messages: session.messages.clone() };
            self.next_history += 1;
            self.history.insert(0, record);
            let mut evicted = Vec::new();
            while self.history.len() > self.history_limit {
                if let Some(old) = self.history.pop() {
                    evicted.push(old.id);
                }
            }
            self.close(id);
            for old in evicted {
                self.close(&format!("history:{old}"));
            }
        } else {
            self.close(id);
        }
    }

    fn close(&mut self, id: &str) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return;
        }
        if self.active.as_deref() == Some(id) {
            self.active = self.sessions.first().map(|s| s.id.clone());
        }
    }
}
