use serde::{Deserialize, Serialize};

use super::Role;

/// Speaker label used in the compact history sent back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "human", alias = "user")]
    Human,
    #[serde(rename = "assistant")]
    Assistant,
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Speaker::Human,
            Role::Assistant => Speaker::Assistant,
        }
    }
}

/// A `(speaker, text)` pair; serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry(pub Speaker, pub String);

impl HistoryEntry {
    pub fn human(text: impl Into<String>) -> Self {
        Self(Speaker::Human, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self(Speaker::Assistant, text.into())
    }

    pub fn speaker(&self) -> Speaker {
        self.0
    }

    pub fn text(&self) -> &str {
        &self.1
    }
}
