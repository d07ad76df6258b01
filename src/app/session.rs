//! Conversation session: the only place conversation state is mutated.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use al_base::config::{FocusMode, ModelSelection, OptimizationMode};
use al_base::ids::{new_chat_id, new_message_id};
use al_base::state::{Conversation, Message};

use super::effects::Coordinator;
use super::reducer::{Cycle, ReduceOutcome, abort_cycle, apply_event};
use crate::infra::api::{
    ApiError, AttachedFile, ChatBackend, ChatRequest, ChatStore, LookupTrigger, OutboundMessage, StoredChat,
    StreamEvent, start_streaming,
};
use crate::infra::config::AppConfig;
use crate::infra::constants::TITLE_MAX_CHARS;
use crate::state::persistence::{PreferenceSource, Preferences, log_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// A cycle is already open
    Busy,
    /// Chat or embedding model not selected yet
    ConfigNotReady,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Busy => write!(f, "An answer is still being generated, please wait"),
            SendError::ConfigNotReady => write!(f, "Chat and embedding models are not configured yet"),
        }
    }
}

impl std::error::Error for SendError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Something the user should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

pub struct Session {
    conversation: Conversation,
    cycle: Cycle,
    backend: Arc<dyn ChatBackend>,
    effects: Coordinator,
    preferences: Arc<dyn PreferenceSource>,
    /// Preferences as read when the current cycle opened
    cycle_prefs: Preferences,
    chat_model: ModelSelection,
    embedding_model: ModelSelection,
    focus_mode: FocusMode,
    optimization_mode: OptimizationMode,
    files: Vec<AttachedFile>,
    /// Receiver of the open cycle; dropped when the cycle closes
    stream_rx: Option<Receiver<StreamEvent>>,
    notices: Vec<Notice>,
    error_log: Option<PathBuf>,
}

impl Session {
    pub fn new(
        chat_id: Option<String>,
        backend: Arc<dyn ChatBackend>,
        lookups: Arc<dyn LookupTrigger>,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        let chat_id = chat_id.unwrap_or_else(new_chat_id);
        Self {
            conversation: Conversation::new(chat_id),
            cycle: Cycle::default(),
            effects: Coordinator::new(Arc::clone(&backend), lookups),
            backend,
            cycle_prefs: Preferences::default(),
            preferences,
            chat_model: ModelSelection::default(),
            embedding_model: ModelSelection::default(),
            focus_mode: FocusMode::default(),
            optimization_mode: OptimizationMode::default(),
            files: Vec::new(),
            stream_rx: None,
            notices: Vec::new(),
            error_log: None,
        }
    }

    /// Write an error log file into `dir` for every error the stream reports.
    pub fn with_error_log(mut self, dir: PathBuf) -> Self {
        self.error_log = Some(dir);
        self
    }

    /// Take models and modes from the loaded configuration.
    pub fn configure(&mut self, config: &AppConfig) {
        self.set_models(config.chat_model.clone(), config.embedding_model.clone());
        self.focus_mode = config.focus_mode;
        self.optimization_mode = config.optimization_mode;
    }

    pub fn set_models(&mut self, chat_model: ModelSelection, embedding_model: ModelSelection) {
        self.chat_model = chat_model;
        self.embedding_model = embedding_model;
    }

    pub fn set_focus_mode(&mut self, mode: FocusMode) {
        self.focus_mode = mode;
    }

    pub fn set_optimization_mode(&mut self, mode: OptimizationMode) {
        self.optimization_mode = mode;
    }

    pub fn focus_mode(&self) -> FocusMode {
        self.focus_mode
    }

    pub fn optimization_mode(&self) -> OptimizationMode {
        self.optimization_mode
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn chat_id(&self) -> &str {
        self.conversation.chat_id()
    }

    pub fn is_loading(&self) -> bool {
        self.conversation.loading
    }

    /// Waiting for the first token of an answer.
    pub fn show_loading_placeholder(&self) -> bool {
        self.conversation.loading && !self.conversation.answer_started
    }

    /// First message, shortened for display as a window or list title.
    pub fn title(&self) -> Option<String> {
        let content = &self.conversation.messages().first()?.content;
        if content.chars().count() <= TITLE_MAX_CHARS {
            return Some(content.clone());
        }
        let cut: String = content.chars().take(TITLE_MAX_CHARS).collect();
        Some(format!("{}...", cut.trim()))
    }

    pub fn files(&self) -> &[AttachedFile] {
        &self.files
    }

    pub fn attach_file(&mut self, file: AttachedFile) {
        if !self.files.iter().any(|f| f.id == file.id) {
            self.files.push(file);
        }
    }

    pub fn detach_file(&mut self, file_id: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id != file_id);
        self.files.len() != before
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push(Notice { level, text: text.into() });
    }

    fn check_ready(&mut self) -> Result<(), SendError> {
        let err = if self.conversation.loading {
            SendError::Busy
        } else if !(self.chat_model.is_set() && self.embedding_model.is_set()) {
            SendError::ConfigNotReady
        } else {
            return Ok(());
        };
        tracing::info!("send rejected: {}", err);
        self.notify(NoticeLevel::Error, err.to_string());
        Err(err)
    }

    /// Open a new cycle for `text`. Returns the user message id.
    ///
    /// The request carries the history of completed cycles only; the user
    /// message added here reaches history when the cycle completes.
    pub fn send_message(&mut self, text: &str, message_id: Option<String>) -> Result<String, SendError> {
        self.check_ready()?;

        let message_id = message_id.unwrap_or_else(new_message_id);
        let chat_id = self.conversation.chat_id().to_string();
        let history = self.conversation.history().to_vec();
        self.cycle_prefs = self.preferences.load();

        self.conversation.push_message(Message::new_user(message_id.clone(), chat_id.clone(), text.to_string()));
        self.conversation.loading = true;
        self.conversation.answer_started = false;
        self.cycle = Cycle::start(text.to_string());

        let request = ChatRequest {
            content: text.to_string(),
            message: OutboundMessage { message_id: message_id.clone(), chat_id: chat_id.clone(), content: text.to_string() },
            chat_id,
            files: self.files.iter().map(|f| f.id.clone()).collect(),
            focus_mode: self.focus_mode,
            optimization_mode: self.optimization_mode,
            history,
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
            system_instructions: self.cycle_prefs.system_instructions.clone(),
        };

        let (tx, rx) = mpsc::channel();
        self.stream_rx = Some(rx);
        start_streaming(Arc::clone(&self.backend), request, tx);
        tracing::debug!(%message_id, "cycle opened");
        Ok(message_id)
    }

    /// Roll back to just before the turn preceding `message_id` and send that turn again
    /// under its original id. `Ok(None)` if there is no preceding turn.
    pub fn rewrite(&mut self, message_id: &str) -> Result<Option<String>, SendError> {
        self.check_ready()?;

        let index = match self.conversation.position(message_id) {
            Some(i) if i > 0 => i,
            _ => {
                tracing::debug!(%message_id, "nothing to rewrite");
                return Ok(None);
            }
        };
        let resend = &self.conversation.messages()[index - 1];
        let (text, original_id) = (resend.content.clone(), resend.message_id.clone());

        // With one pair or less, the preceding slice would still hold the pair itself
        let keep = if self.conversation.len() > 2 { index - 1 } else { 0 };
        self.conversation.truncate(keep);

        self.send_message(&text, Some(original_id)).map(Some)
    }

    /// Apply every stream event already delivered, without blocking.
    pub fn process_stream_events(&mut self) -> Vec<ReduceOutcome> {
        let Some(rx) = self.stream_rx.take() else {
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(evt) => outcomes.push(self.handle_stream_event(evt)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
            if !self.cycle.is_open() {
                break;
            }
        }
        self.restore_receiver(rx, disconnected, &mut outcomes);
        outcomes
    }

    /// Wait up to `timeout` for the next stream event and apply it.
    pub fn wait_stream_event(&mut self, timeout: Duration) -> Option<ReduceOutcome> {
        let rx = self.stream_rx.take()?;
        let mut outcomes = Vec::new();
        let mut disconnected = false;
        match rx.recv_timeout(timeout) {
            Ok(evt) => outcomes.push(self.handle_stream_event(evt)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => disconnected = true,
        }
        self.restore_receiver(rx, disconnected, &mut outcomes);
        outcomes.pop()
    }

    /// Block until the open cycle closes.
    pub fn run_cycle(&mut self) -> Vec<ReduceOutcome> {
        let mut outcomes = Vec::new();
        while let Some(rx) = self.stream_rx.take() {
            let mut disconnected = false;
            match rx.recv() {
                Ok(evt) => outcomes.push(self.handle_stream_event(evt)),
                Err(_) => disconnected = true,
            }
            self.restore_receiver(rx, disconnected, &mut outcomes);
        }
        outcomes
    }

    fn restore_receiver(&mut self, rx: Receiver<StreamEvent>, disconnected: bool, outcomes: &mut Vec<ReduceOutcome>) {
        if !self.cycle.is_open() {
            return;
        }
        if disconnected {
            // Worker ended without a Closed event
            outcomes.push(self.handle_stream_event(StreamEvent::Closed));
            return;
        }
        self.stream_rx = Some(rx);
    }

    fn handle_stream_event(&mut self, evt: StreamEvent) -> ReduceOutcome {
        match evt {
            StreamEvent::Event(event) => {
                let outcome = apply_event(&mut self.conversation, &mut self.cycle, event);
                match &outcome {
                    ReduceOutcome::Completed => {
                        tracing::debug!(messages = self.conversation.len(), "cycle complete");
                        self.effects.after_complete(&self.conversation, &self.cycle_prefs, &self.chat_model);
                    }
                    ReduceOutcome::Errored(message) => {
                        let message = message.clone();
                        self.record_error(&format!("Server error event\n\n{}", message));
                        self.notify(NoticeLevel::Error, message);
                    }
                    _ => {}
                }
                outcome
            }
            StreamEvent::Failed(e) => {
                if !abort_cycle(&mut self.conversation, &mut self.cycle) {
                    return ReduceOutcome::Ignored;
                }
                tracing::error!("answer stream failed: {}", e);
                self.record_error(&format!("Transport failure\n\n{}", e));
                self.notify(NoticeLevel::Error, e.to_string());
                ReduceOutcome::Errored(e.to_string())
            }
            StreamEvent::Closed => {
                if !abort_cycle(&mut self.conversation, &mut self.cycle) {
                    return ReduceOutcome::Ignored;
                }
                tracing::warn!("answer stream ended before messageEnd");
                ReduceOutcome::Errored("answer stream ended before completion".to_string())
            }
        }
    }

    fn record_error(&self, details: &str) {
        if let Some(dir) = &self.error_log {
            let path = log_error(dir, &format!("Chat: {}\n{}", self.conversation.chat_id(), details));
            tracing::debug!("error logged to {}", path.display());
        }
    }

    /// Apply suggestion results that have arrived. Returns the message ids updated.
    pub fn process_side_effects(&mut self) -> Vec<String> {
        self.effects.drain(&mut self.conversation)
    }

    /// Wait up to `timeout` for outstanding suggestion requests.
    pub fn wait_side_effects(&mut self, timeout: Duration) -> Vec<String> {
        self.effects.wait(&mut self.conversation, timeout)
    }

    pub fn pending_side_effects(&self) -> usize {
        self.effects.pending()
    }

    /// Replace the conversation with a stored one. Refused while a cycle is open.
    pub fn hydrate(&mut self, chat: StoredChat) -> bool {
        self.hydrate_as(self.conversation.chat_id().to_string(), chat)
    }

    fn hydrate_as(&mut self, chat_id: String, chat: StoredChat) -> bool {
        if self.conversation.loading {
            self.notify(NoticeLevel::Error, SendError::Busy.to_string());
            return false;
        }
        tracing::info!(%chat_id, messages = chat.messages.len(), "hydrating conversation");
        self.conversation = Conversation::from_messages(chat_id, chat.messages);
        self.cycle = Cycle::default();
        self.focus_mode = chat.focus_mode;
        self.files = chat.files;
        true
    }

    /// Fetch `chat_id` from `store` and adopt it. `Ok(false)` if it does not exist.
    pub fn load(&mut self, chat_id: &str, store: &dyn ChatStore) -> Result<bool, ApiError> {
        match store.load_chat(chat_id)? {
            Some(chat) => Ok(self.hydrate_as(chat_id.to_string(), chat)),
            None => {
                self.notify(NoticeLevel::Info, format!("No conversation with id {}", chat_id));
                Ok(false)
            }
        }
    }
}
