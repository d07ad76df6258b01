//! Work triggered once a cycle completes: auxiliary lookups and follow-up suggestions.
//!
//! Suggestions are fetched on a worker thread; the result comes back over a
//! channel and is written by message id, so it lands on the right message even
//! if the conversation moved on in the meantime.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use al_base::config::ModelSelection;
use al_base::state::{Conversation, Message, Role};

use crate::infra::api::{ApiError, ChatBackend, LookupKind, LookupTrigger};
use crate::state::persistence::Preferences;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Lookup { kind: LookupKind, message_id: String },
    FetchSuggestions { message_id: String, messages: Vec<Message> },
}

/// Suggestion response delivered back to the session
#[derive(Debug)]
pub struct SuggestionResult {
    pub message_id: String,
    pub result: Result<Vec<String>, ApiError>,
}

/// Decide what to fire for the just-completed cycle, from the last message.
pub fn plan_after_complete(conv: &Conversation, prefs: &Preferences, requested: &HashSet<String>) -> Vec<Effect> {
    let Some(last) = conv.last_message() else {
        return Vec::new();
    };
    let mut effects = Vec::new();

    if prefs.auto_image_search {
        effects.push(Effect::Lookup { kind: LookupKind::Images, message_id: last.message_id.clone() });
    }
    if prefs.auto_video_search {
        effects.push(Effect::Lookup { kind: LookupKind::Videos, message_id: last.message_id.clone() });
    }

    if last.role == Role::Assistant
        && last.has_sources()
        && last.suggestions.is_none()
        && !requested.contains(&last.message_id)
    {
        effects.push(Effect::FetchSuggestions {
            message_id: last.message_id.clone(),
            messages: conv.messages().to_vec(),
        });
    }
    effects
}

pub struct Coordinator {
    backend: Arc<dyn ChatBackend>,
    lookups: Arc<dyn LookupTrigger>,
    tx: Sender<SuggestionResult>,
    rx: Receiver<SuggestionResult>,
    /// Every assistant id a suggestion request was ever issued for
    requested: HashSet<String>,
    in_flight: usize,
}

impl Coordinator {
    pub fn new(backend: Arc<dyn ChatBackend>, lookups: Arc<dyn LookupTrigger>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { backend, lookups, tx, rx, requested: HashSet::new(), in_flight: 0 }
    }

    /// Suggestion requests not yet answered.
    pub fn pending(&self) -> usize {
        self.in_flight
    }

    /// Plan and fire the effects of a completed cycle. Never blocks on the network.
    pub fn after_complete(&mut self, conv: &Conversation, prefs: &Preferences, chat_model: &ModelSelection) -> Vec<Effect> {
        let effects = plan_after_complete(conv, prefs, &self.requested);
        for effect in &effects {
            match effect {
                Effect::Lookup { kind, message_id } => {
                    if let Err(e) = self.lookups.trigger(*kind, message_id) {
                        tracing::warn!(?kind, %message_id, "auxiliary lookup failed: {}", e);
                    }
                }
                Effect::FetchSuggestions { message_id, messages } => {
                    self.spawn_suggestions(message_id.clone(), messages.clone(), chat_model.clone());
                }
            }
        }
        effects
    }

    fn spawn_suggestions(&mut self, message_id: String, messages: Vec<Message>, chat_model: ModelSelection) {
        self.requested.insert(message_id.clone());
        self.in_flight += 1;
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = backend.suggestions(&messages, &chat_model);
            let _ = tx.send(SuggestionResult { message_id, result });
        });
    }

    /// Apply every suggestion result that has arrived. Returns the ids that got suggestions.
    pub fn drain(&mut self, conv: &mut Conversation) -> Vec<String> {
        let mut applied = Vec::new();
        while let Ok(res) = self.rx.try_recv() {
            if let Some(id) = self.apply(conv, res) {
                applied.push(id);
            }
        }
        applied
    }

    /// Block until all pending suggestion requests answered or `timeout` passed.
    pub fn wait(&mut self, conv: &mut Conversation, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut applied = self.drain(conv);
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(res) => applied.extend(self.apply(conv, res)),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        applied
    }

    fn apply(&mut self, conv: &mut Conversation, res: SuggestionResult) -> Option<String> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match res.result {
            Ok(suggestions) => {
                if conv.set_suggestions(&res.message_id, suggestions) {
                    Some(res.message_id)
                } else {
                    tracing::debug!(message_id = %res.message_id, "suggestions arrived for a message no longer present");
                    None
                }
            }
            Err(e) => {
                tracing::warn!(message_id = %res.message_id, "suggestion generation failed: {}", e);
                None
            }
        }
    }
}
