//! reqwest implementation of the chat backend and chat store.

use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use al_base::config::{FocusMode, ModelSelection};
use al_base::state::Message;

use super::{ApiError, AttachedFile, ChatBackend, ChatRequest, ChatStore, StoredChat};
use crate::infra::constants::REQUEST_TIMEOUT_SECS;

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // No client-wide timeout: answer streams stay open for as long as the server generates.
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionsRequest<'a> {
    chat_history: &'a [Message],
    chat_model: SuggestionsModel<'a>,
}

#[derive(Debug, Serialize)]
struct SuggestionsModel<'a> {
    provider: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Err(ApiError::Api { status, body })
}

impl ChatBackend for HttpBackend {
    fn open_chat(&self, request: &ChatRequest) -> Result<Box<dyn Read + Send>, ApiError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .header("content-type", "application/json")
            .json(request)
            .send()?;
        Ok(Box::new(check_status(response)?))
    }

    fn suggestions(&self, messages: &[Message], chat_model: &ModelSelection) -> Result<Vec<String>, ApiError> {
        let body = SuggestionsRequest {
            chat_history: messages,
            chat_model: SuggestionsModel { provider: &chat_model.provider, model: &chat_model.name },
        };
        let response = self
            .client
            .post(self.url("/api/suggestions"))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()?;
        let text = check_status(response)?.text()?;
        let parsed: SuggestionsResponse = serde_json::from_str(&text)?;
        Ok(parsed.suggestions)
    }
}

impl ChatStore for HttpBackend {
    fn load_chat(&self, chat_id: &str) -> Result<Option<StoredChat>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/chats/{}", chat_id)))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = check_status(response)?.text()?;
        parse_stored_chat(serde_json::from_str(&text)?).map(Some)
    }
}

/// Decode a stored-chat payload. Each message's `metadata` (a JSON-encoded
/// object, or a plain object) is merged over the message's own fields.
pub fn parse_stored_chat(payload: Value) -> Result<StoredChat, ApiError> {
    let raw_messages = payload
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Parse("stored chat has no messages array".to_string()))?;

    let mut messages = Vec::with_capacity(raw_messages.len());
    for raw in raw_messages {
        let mut fields: Map<String, Value> = raw.as_object().cloned().unwrap_or_default();
        match fields.remove("metadata") {
            Some(Value::String(metadata)) => {
                let extra: Map<String, Value> = serde_json::from_str(&metadata)?;
                fields.extend(extra);
            }
            Some(Value::Object(extra)) => fields.extend(extra),
            None | Some(Value::Null) => {}
            Some(other) => tracing::warn!("ignoring message metadata that is not an object: {}", other),
        }
        messages.push(serde_json::from_value::<Message>(Value::Object(fields))?);
    }

    let chat = payload.get("chat");
    let focus_mode = chat
        .and_then(|c| c.get("focusMode"))
        .and_then(Value::as_str)
        .and_then(|m| m.parse::<FocusMode>().ok())
        .unwrap_or_default();
    let files = chat
        .and_then(|c| c.get("files"))
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|f| {
                    let name = f.get("name")?.as_str()?;
                    let id = f.get("fileId").or_else(|| f.get("id"))?.as_str()?;
                    Some(AttachedFile::new(name, id))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(StoredChat { messages, focus_mode, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use al_base::state::Role;
    use serde_json::json;

    #[test]
    fn merges_metadata_into_messages() {
        let payload = json!({
            "messages": [
                {
                    "messageId": "u1", "chatId": "c", "role": "user", "content": "q",
                    "metadata": "{\"createdAt\":\"2024-05-01T10:00:00Z\"}"
                },
                {
                    "messageId": "a1", "chatId": "c", "role": "assistant", "content": "ans",
                    "metadata": "{\"createdAt\":\"2024-05-01T10:00:05Z\",\"sources\":[{\"pageContent\":\"x\",\"metadata\":{\"url\":\"https://s.test\"}}]}"
                }
            ],
            "chat": {"focusMode": "youtubeSearch", "files": [{"name": "notes.md", "fileId": "f9"}]}
        });
        let stored = parse_stored_chat(payload).unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].role, Role::Assistant);
        assert_eq!(stored.messages[1].sources.as_ref().unwrap()[0].url(), Some("https://s.test"));
        assert_eq!(stored.messages[0].created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(stored.focus_mode, FocusMode::YoutubeSearch);
        assert_eq!(stored.files, vec![AttachedFile::new("notes.md", "f9")]);
    }

    #[test]
    fn object_metadata_is_merged_too() {
        let payload = json!({
            "messages": [
                {
                    "messageId": "a1", "chatId": "c", "role": "assistant", "content": "ans",
                    "metadata": {"createdAt": "2024-05-01T10:00:05Z", "suggestions": ["why?"]}
                },
                {"messageId": "u2", "chatId": "c", "role": "user", "content": "q", "metadata": 7}
            ]
        });
        let stored = parse_stored_chat(payload).unwrap();
        assert_eq!(stored.messages[0].suggestions, Some(vec!["why?".to_string()]));
        assert_eq!(stored.messages[0].created_at.to_rfc3339(), "2024-05-01T10:00:05+00:00");
        assert_eq!(stored.messages[1].content, "q");
    }

    #[test]
    fn missing_chat_block_uses_defaults() {
        let stored = parse_stored_chat(json!({"messages": []})).unwrap();
        assert!(stored.messages.is_empty());
        assert_eq!(stored.focus_mode, FocusMode::WebSearch);
        assert!(stored.files.is_empty());
    }

    #[test]
    fn malformed_metadata_is_a_parse_error() {
        let payload = json!({"messages": [{"messageId": "u1", "chatId": "c", "role": "user", "content": "q", "metadata": "{"}]});
        assert!(matches!(parse_stored_chat(payload), Err(ApiError::Parse(_))));
        assert!(matches!(parse_stored_chat(json!({})), Err(ApiError::Parse(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:3000/").unwrap();
        assert_eq!(backend.url("/api/chat"), "http://localhost:3000/api/chat");
    }
}
