//! Transport seams: the answer stream, follow-up suggestions, auxiliary lookups
//! and stored-chat retrieval.

pub mod error;
pub mod frames;
pub mod http;

use std::io::Read;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use serde::Serialize;

use al_base::config::{FocusMode, ModelSelection, OptimizationMode};
use al_base::event::ChatEvent;
use al_base::state::{HistoryEntry, Message};

pub use error::ApiError;
pub use frames::{EventStream, FrameParser};
pub use http::HttpBackend;

/// Body of a send-turn request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub content: String,
    pub message: OutboundMessage,
    pub chat_id: String,
    pub files: Vec<String>,
    pub focus_mode: FocusMode,
    pub optimization_mode: OptimizationMode,
    /// Completed cycles only, never the one being opened
    pub history: Vec<HistoryEntry>,
    pub chat_model: ModelSelection,
    pub embedding_model: ModelSelection,
    pub system_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub message_id: String,
    pub chat_id: String,
    pub content: String,
}

/// A file attached to the chat, referenced by id in every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: String,
    pub extension: String,
    pub id: String,
}

impl AttachedFile {
    pub fn new(name: &str, id: &str) -> Self {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default().to_string();
        Self { name: name.to_string(), extension, id: id.to_string() }
    }
}

/// A previously stored conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChat {
    pub messages: Vec<Message>,
    pub focus_mode: FocusMode,
    pub files: Vec<AttachedFile>,
}

/// Auxiliary media lookups offered next to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Images,
    Videos,
}

/// Server side of a conversation.
pub trait ChatBackend: Send + Sync {
    /// Open a send-turn request and hand back the raw response body.
    fn open_chat(&self, request: &ChatRequest) -> Result<Box<dyn Read + Send>, ApiError>;

    /// Generate follow-up questions for the given conversation.
    fn suggestions(&self, messages: &[Message], chat_model: &ModelSelection) -> Result<Vec<String>, ApiError>;
}

/// Retrieval of stored conversations.
pub trait ChatStore {
    /// `Ok(None)` when no chat with this id exists.
    fn load_chat(&self, chat_id: &str) -> Result<Option<StoredChat>, ApiError>;
}

/// Handle for the presentation layer's image/video lookups.
///
/// Called on the session's thread, so implementations must only signal
/// (queue, send on a channel) and never block on the lookup itself.
pub trait LookupTrigger: Send + Sync {
    fn trigger(&self, kind: LookupKind, message_id: &str) -> Result<(), ApiError>;
}

/// Lookups disabled.
pub struct NoLookups;

impl LookupTrigger for NoLookups {
    fn trigger(&self, _kind: LookupKind, _message_id: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Events sent from the streaming worker to the session
#[derive(Debug)]
pub enum StreamEvent {
    /// One decoded frame
    Event(ChatEvent),
    /// Request or body read failed; nothing further follows
    Failed(ApiError),
    /// Body ended
    Closed,
}

/// Open the request on a worker thread and forward decoded events in order.
pub fn start_streaming(backend: Arc<dyn ChatBackend>, request: ChatRequest, tx: Sender<StreamEvent>) {
    std::thread::spawn(move || {
        let body = match backend.open_chat(&request) {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(e));
                return;
            }
        };

        for item in EventStream::new(body) {
            let evt = match item {
                Ok(event) => StreamEvent::Event(event),
                Err(e) => {
                    let _ = tx.send(StreamEvent::Failed(e));
                    return;
                }
            };
            // Receiver gone: the session already closed this cycle
            if tx.send(evt).is_err() {
                return;
            }
        }
        let _ = tx.send(StreamEvent::Closed);
    });
}
