use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One retrieval result backing an assistant answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Source {
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Caller-generated for user turns, server-assigned for assistant turns
    pub message_id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Set at most once, before or alongside the first content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// Set at most once, after the turn completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl Message {
    /// Create a user message; its content never changes afterwards.
    pub fn new_user(message_id: String, chat_id: String, content: String) -> Self {
        Self {
            message_id,
            chat_id,
            role: Role::User,
            content,
            created_at: Utc::now(),
            sources: None,
            suggestions: None,
        }
    }

    /// Create an assistant message, seeded with the first fragment (possibly empty).
    pub fn new_assistant(message_id: String, chat_id: String, content: String, sources: Option<Vec<Source>>) -> Self {
        Self {
            message_id,
            chat_id,
            role: Role::Assistant,
            content,
            created_at: Utc::now(),
            sources,
            suggestions: None,
        }
    }

    pub fn has_sources(&self) -> bool {
        self.sources.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Test helpers for building Message instances with sensible defaults.
/// Not gated behind `#[cfg(test)]` so downstream crates can use them.
pub mod test_helpers {
    use super::*;

    /// Builder for constructing test messages.
    /// Auto-increments IDs per role prefix (U1, A1).
    pub struct MessageBuilder {
        msg: Message,
    }

    impl MessageBuilder {
        fn base(id: String, role: Role, content: &str) -> Self {
            Self {
                msg: Message {
                    message_id: id,
                    chat_id: "chat".to_string(),
                    role,
                    content: content.to_string(),
                    created_at: DateTime::<Utc>::default(),
                    sources: None,
                    suggestions: None,
                },
            }
        }

        pub fn user(content: &str) -> Self {
            use std::sync::atomic::{AtomicUsize, Ordering};
            static COUNTER: AtomicUsize = AtomicUsize::new(1);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            Self::base(format!("U{}", n), Role::User, content)
        }

        pub fn assistant(content: &str) -> Self {
            use std::sync::atomic::{AtomicUsize, Ordering};
            static COUNTER: AtomicUsize = AtomicUsize::new(1);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            Self::base(format!("A{}", n), Role::Assistant, content)
        }

        pub fn id(mut self, id: &str) -> Self {
            self.msg.message_id = id.to_string();
            self
        }

        pub fn chat(mut self, chat_id: &str) -> Self {
            self.msg.chat_id = chat_id.to_string();
            self
        }

        /// Attach sources built from `(title, url)` pairs.
        pub fn sources(mut self, sources: &[(&str, &str)]) -> Self {
            self.msg.sources = Some(
                sources
                    .iter()
                    .map(|(title, url)| {
                        let mut metadata = Map::new();
                        metadata.insert("title".to_string(), Value::String(title.to_string()));
                        metadata.insert("url".to_string(), Value::String(url.to_string()));
                        Source { page_content: String::new(), metadata }
                    })
                    .collect(),
            );
            self
        }

        pub fn suggestions(mut self, suggestions: &[&str]) -> Self {
            self.msg.suggestions = Some(suggestions.iter().map(|s| s.to_string()).collect());
            self
        }

        pub fn build(self) -> Message {
            self.msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_helpers::MessageBuilder;

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let msg = MessageBuilder::user("hello").id("m1").build();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["chatId"], "chat");
        assert_eq!(json["role"], "user");
        assert!(json.get("sources").is_none());
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn deserializes_stored_message_without_created_at() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "messageId": "abc",
            "chatId": "c1",
            "role": "assistant",
            "content": "answer",
            "sources": [{"pageContent": "text", "metadata": {"title": "T", "url": "https://x.test"}}],
        }))
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.has_sources());
        let source = &msg.sources.as_ref().unwrap()[0];
        assert_eq!(source.title(), Some("T"));
        assert_eq!(source.url(), Some("https://x.test"));
    }

    #[test]
    fn empty_source_list_counts_as_no_sources() {
        let mut msg = MessageBuilder::assistant("a").build();
        assert!(!msg.has_sources());
        msg.sources = Some(Vec::new());
        assert!(!msg.has_sources());
    }
}
