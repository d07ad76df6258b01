//! Wire events carried by the newline-delimited answer stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::Source;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    /// Retrieval results for the answer being generated
    Sources {
        #[serde(default)]
        data: Vec<Source>,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// A content fragment
    Message {
        #[serde(default)]
        data: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// The answer is complete
    MessageEnd {
        #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// The server gave up on this cycle
    Error {
        #[serde(default)]
        data: String,
    },
}

impl ChatEvent {
    /// Interpret an already-parsed JSON frame.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Sources { .. } => "sources",
            ChatEvent::Message { .. } => "message",
            ChatEvent::MessageEnd { .. } => "messageEnd",
            ChatEvent::Error { .. } => "error",
        }
    }
}
